use crate::{
    analysis::scalar_evolution::SymbolicEvaluator,
    block::BlockId,
    opcode::Opcode,
    procedure::Procedure,
    value::ValueId,
};

use super::cache::CacheModel;

/// Address computations of one block, clustered by the cache line they are expected to touch.
/// Each group is kept as its first member, the representative.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceGroups {
    representatives: Vec<ValueId>,
}

impl ReferenceGroups {
    /// Single left-to-right pass over the `ElementAddress` values of `block`. A reference joins
    /// the first group whose representative has the same number of operands, the same base and
    /// leading indices, and a last index less than one cache line above the representative's.
    /// Any reference below the representative joins it.
    pub fn build<E: SymbolicEvaluator + ?Sized>(
        proc: &Procedure,
        evaluator: &E,
        cache: &CacheModel,
        block: BlockId,
    ) -> Self {
        let mut this = Self::default();

        for value in proc.block(block).iter().copied() {
            if proc.value(value).opcode() != Opcode::ElementAddress {
                continue;
            }

            let group = this
                .representatives
                .iter()
                .copied()
                .find(|representative| {
                    shares_cache_line(proc, evaluator, cache, value, *representative)
                });

            match group {
                Some(representative) => {
                    log::trace!("{} joins the group of {}", value, representative)
                }
                None => {
                    log::trace!("{} starts a reference group", value);
                    this.representatives.push(value);
                }
            }
        }

        this
    }

    pub fn representatives(&self) -> &[ValueId] {
        &self.representatives
    }

    pub fn len(&self) -> usize {
        self.representatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.representatives.is_empty()
    }

    pub fn display<'a>(&'a self, proc: &'a Procedure) -> ReferenceGroupsDisplay<'a> {
        ReferenceGroupsDisplay { groups: self, proc }
    }
}

/// Same SSA value, or two integer constants holding the same number.
fn identical_operands(proc: &Procedure, lhs: ValueId, rhs: ValueId) -> bool {
    if lhs == rhs {
        return true;
    }

    match (proc.value(lhs).as_int(), proc.value(rhs).as_int()) {
        (Some(lhs), Some(rhs)) => lhs == rhs,
        _ => false,
    }
}

fn shares_cache_line<E: SymbolicEvaluator + ?Sized>(
    proc: &Procedure,
    evaluator: &E,
    cache: &CacheModel,
    reference: ValueId,
    representative: ValueId,
) -> bool {
    let reference = proc.value(reference);
    let representative = proc.value(representative);

    let num_operands = reference.num_children();
    if num_operands == 0 || representative.num_children() != num_operands {
        return false;
    }

    let leading = num_operands - 1;
    let same_prefix = reference.children()[..leading]
        .iter()
        .zip(&representative.children()[..leading])
        .all(|(lhs, rhs)| identical_operands(proc, *lhs, *rhs));
    if !same_prefix {
        return false;
    }

    let (last, representative_last) = (reference.child(leading), representative.child(leading));
    if !evaluator.is_scevable(last) || !evaluator.is_scevable(representative_last) {
        return false;
    }

    let (Some(lhs), Some(rhs)) = (evaluator.scev(last), evaluator.scev(representative_last)) else {
        return false;
    };

    evaluator
        .constant_difference(&lhs, &rhs)
        .map_or(false, |distance| distance < i64::from(cache.line_size()))
}

pub struct ReferenceGroupsDisplay<'a> {
    groups: &'a ReferenceGroups,
    proc: &'a Procedure,
}

impl std::fmt::Display for ReferenceGroupsDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Printing Reference Groups (GEPs): ")?;
        if self.groups.is_empty() {
            write!(f, "(empty)")?;
        }
        writeln!(f)?;

        for representative in self.groups.representatives.iter() {
            writeln!(f, "Ref group: {}", self.proc.value(*representative))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::{loop_analysis::LoopAnalysis, scalar_evolution::ScalarEvolution},
        block::BasicBlockBuilder,
        phi_children::PhiChildren,
        typ::{pointer_type, Type},
    };

    use super::*;

    /// A single loop whose body computes `base[0][i + offset]` for every offset, plus
    /// `other[0][i]` and `base[0][load]`.
    fn strip(offsets: &[i64]) -> (Procedure, BlockId, Vec<ValueId>) {
        let mut proc = Procedure::new();
        let entry = proc.add_named_block("entry");
        let header = proc.add_named_block("for.cond");
        let body = proc.add_named_block("for.body");
        let exit = proc.add_named_block("for.end");

        let mut b = BasicBlockBuilder::new(&mut proc, header);
        let i = b.phi(Type::Int64);
        let n = b.const64(100);
        let cond = b.binary(Opcode::LessThan, i, n);
        b.branch(cond, body, exit);

        b.switch_to_block(entry);
        let base = b.argument(0, pointer_type());
        let other = b.argument(1, pointer_type());
        let zero = b.const64(0);
        b.upsilon(zero, i);
        b.jump(Some(header));

        b.switch_to_block(body);
        let mut references = vec![];
        for offset in offsets.iter().copied() {
            let zero = b.const64(0);
            let offset = b.const64(offset);
            let index = b.binary(Opcode::Add, i, offset);
            references.push(b.element_address(base, &[zero, index]));
        }

        let zero = b.const64(0);
        references.push(b.element_address(other, &[zero, i]));

        let loaded = b.load(Type::Int64, references[0]);
        references.push(b.element_address(base, &[zero, loaded]));

        let one = b.const64(1);
        let next = b.binary(Opcode::Add, i, one);
        b.upsilon(next, i);
        b.jump(Some(header));

        b.switch_to_block(exit);
        b.return_(None);

        (proc, body, references)
    }

    fn group_strip(offsets: &[i64], line_size: u32) -> (Procedure, ReferenceGroups, Vec<ValueId>) {
        let (mut proc, body, references) = strip(offsets);
        let loops = LoopAnalysis::new(&mut proc);
        let phi_children = PhiChildren::new(&proc);
        let se = ScalarEvolution::new(&proc, &loops, &phi_children);

        let cache = CacheModel::with_line_size(line_size).unwrap();
        let groups = ReferenceGroups::build(&proc, &se, &cache, body);
        (proc, groups, references)
    }

    #[test]
    fn references_within_a_line_share_a_group() {
        let (_, groups, refs) = group_strip(&[0, 3, 4], 4);

        // [0] and [3] cluster, [4] is a full line away, then `other` and the indirect access.
        assert_eq!(groups.representatives(), &[refs[0], refs[2], refs[3], refs[4]]);
    }

    #[test]
    fn lower_references_join_the_group_above() {
        // The distance is signed: everything below [5] joins it, however far down.
        let (_, groups, refs) = group_strip(&[5, 2, 1], 4);
        assert_eq!(groups.representatives(), &[refs[0], refs[3], refs[4]]);

        let (_, groups, refs) = group_strip(&[100, 0], 4);
        assert_eq!(groups.representatives(), &[refs[0], refs[2], refs[3]]);

        let (_, groups, refs) = group_strip(&[0, 100], 4);
        assert_eq!(groups.representatives(), &[refs[0], refs[1], refs[2], refs[3]]);
    }

    #[test]
    fn first_matching_group_wins() {
        let (_, groups, refs) = group_strip(&[0, 4, 2], 4);

        // [2] is within a line of both representatives and goes with the first one.
        assert_eq!(groups.representatives(), &[refs[0], refs[1], refs[3], refs[4]]);
    }

    #[test]
    fn wider_lines_merge_more() {
        let (_, groups, _) = group_strip(&[0, 3, 4, 7], 8);
        assert_eq!(groups.len(), 3);

        let (_, groups, _) = group_strip(&[0, 3, 4, 7], 1);
        assert_eq!(groups.len(), 6);
    }

    #[test]
    fn dump_lists_representatives() {
        let (proc, groups, refs) = group_strip(&[0], 4);
        let dump = groups.display(&proc).to_string();

        assert!(dump.starts_with("Printing Reference Groups (GEPs): \n"));
        assert_eq!(dump.matches("Ref group: ").count(), 3);
        assert!(dump.contains(&proc.value(refs[0]).to_string()));

        let empty = ReferenceGroups::default().display(&proc).to_string();
        assert_eq!(empty, "Printing Reference Groups (GEPs): (empty)\n");
    }
}
