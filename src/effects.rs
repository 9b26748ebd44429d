use std::ops::Range;

/// Side effects of a single value. Heaps are abstract ranges: two accesses may alias when their
/// ranges overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Effects {
    /// True if this cannot continue execution in the current block.
    pub terminal: bool,

    /// True if this value can cause execution to terminate abruptly, and that this abrupt termination is
    /// observable. Calls are the usual example.
    pub exit_sideways: bool,

    /// True if the instruction may change semantics if hoisted above some control flow. Loads are
    /// control-dependent because the control flow guarding them may be what makes the pointer valid.
    pub control_dependent: bool,

    /// True if this writes to the local state. This is for modeling Upsilons: they do not write
    /// to the heap but they cannot be removed either.
    pub writes_local_state: bool,

    /// True if this reads from the local state. This is only used for Phi.
    pub reads_local_state: bool,

    pub writes: Range<usize>,
    pub reads: Range<usize>,
}

impl Effects {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_call() -> Self {
        Self {
            exit_sideways: true,
            control_dependent: true,
            writes: 0..usize::MAX,
            reads: 0..usize::MAX,
            ..Self::default()
        }
    }

    pub fn writes_heap(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn reads_heap(&self) -> bool {
        !self.reads.is_empty()
    }

    /// True when the value only moves control or SSA state around: it may read memory and it may
    /// be a terminal, but it never writes the heap and never leaves the procedure sideways.
    pub fn is_bookkeeping(&self) -> bool {
        !self.exit_sideways && !self.writes_heap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_are_not_bookkeeping() {
        assert!(!Effects::for_call().is_bookkeeping());
        assert!(Effects::none().is_bookkeeping());
    }

    #[test]
    fn heap_reads_are_bookkeeping() {
        let effects = Effects {
            reads: 1..2,
            control_dependent: true,
            ..Effects::none()
        };

        assert!(effects.reads_heap());
        assert!(effects.is_bookkeeping());
    }
}
