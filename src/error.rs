use thiserror::Error;

use crate::{block::BlockId, value::ValueId};

/// Everything that can go wrong before cost estimation starts.
///
/// Estimation itself never fails: loops it cannot reason about simply get an unknown cost. The
/// variants below describe a malformed procedure or a malformed configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A cache line must hold at least one element.
    #[error("cache line size must be at least one element")]
    ZeroLineSize,

    #[error("procedure has no blocks")]
    EmptyProcedure,

    #[error("{block} does not end in a terminal")]
    MissingTerminal { block: BlockId },

    /// A Jump, Branch or Return appears before the end of its block.
    #[error("{block} has a terminal before its last value")]
    MisplacedTerminal { block: BlockId },

    #[error("{block} has {found} successors but its terminal needs {expected}")]
    SuccessorCount {
        block: BlockId,
        expected: usize,
        found: usize,
    },

    #[error("{block} jumps to {target}, which does not exist")]
    DanglingSuccessor { block: BlockId, target: BlockId },

    /// The Upsilon has no Phi, or names a value that is not a Phi.
    #[error("upsilon {value} does not feed a phi")]
    DanglingUpsilon { value: ValueId },
}

pub type Result<T> = std::result::Result<T, Error>;
