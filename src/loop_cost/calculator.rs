use crate::{
    analysis::loop_analysis::LoopId,
    procedure::Procedure,
    utils::index_set::IndexSet,
    value::ValueId,
};

use super::{
    perfect_nest, trip_count, AccessOrder, CacheModel, LoopCostAnalysis, LoopCosts, NestContext,
    ReferenceGroups,
};

/// True when `operand` is computed from `iv`. The search does not look through other Phis, so
/// indices derived from a different induction variable never match.
pub fn depends_on(proc: &Procedure, operand: ValueId, iv: ValueId) -> bool {
    let mut worklist = vec![operand];
    let mut seen = IndexSet::<ValueId>::new();

    while let Some(value) = worklist.pop() {
        if value == iv {
            return true;
        }

        if !seen.insert(value) || proc.value(value).is_phi() {
            continue;
        }

        worklist.extend(proc.value(value).children().iter().copied());
    }

    false
}

/// Lines touched by one reference group when the loop with induction variable `iv` runs
/// `this_loop_penalty` times. When the loop shows up in several indices the last one decides.
pub fn reference_penalty(
    proc: &Procedure,
    reference: ValueId,
    iv: ValueId,
    this_loop_penalty: f64,
    cache: &CacheModel,
    access_order: AccessOrder,
) -> f64 {
    let reference = proc.value(reference);
    let num_indices = reference.num_children().saturating_sub(1);
    let contiguous = access_order.contiguous_index(num_indices);

    let mut penalty = 1.0;
    for index in 1..=num_indices {
        if !depends_on(proc, reference.child(index), iv) {
            continue;
        }

        penalty = if index == contiguous {
            this_loop_penalty / f64::from(cache.line_size())
        } else {
            this_loop_penalty
        };
    }

    penalty
}

impl LoopCostAnalysis<'_> {
    /// Costs every loop of `nest` as if it were the innermost one. Every loop of the nest gets an
    /// entry; it stays unknown when the nest is not perfect, when the innermost loop does work in
    /// more than one block, or when the loop has no canonical induction variable.
    pub fn calculate_loop_costs(&self, nest: &[LoopId], costs: &mut LoopCosts) {
        for l in nest.iter().copied() {
            costs.record_unknown(l, self.loops.name(self.proc, l));
        }

        if !perfect_nest::is_perfect_nest(self.proc, self.loops, nest) {
            log::debug!("not a perfect nest");
            return;
        }

        let Some(innermost) = nest.last().copied() else {
            return;
        };
        let Some(body) = perfect_nest::inner_single_block(self.proc, self.loops, innermost) else {
            log::debug!(
                "{}: work is spread over several blocks",
                self.loops.name(self.proc, innermost)
            );
            return;
        };

        let context = NestContext {
            reference_groups: ReferenceGroups::build(
                self.proc,
                self.evaluator,
                &self.options.cache,
                body,
            ),
            trip_counts: trip_count::set_trip_counts(self.proc, self.loops, self.evaluator, nest),
        };
        log::debug!("{}", context.reference_groups.display(self.proc));
        costs.record_nest(&context);

        for l in nest.iter().copied() {
            let Some(iv) =
                self.loops
                    .canonical_induction_variable(self.proc, self.phi_children, l)
            else {
                log::debug!(
                    "{}: could not find induction variable",
                    self.loops.name(self.proc, l)
                );
                continue;
            };

            let (this_loop_penalty, other_loop_penalties) = context.penalties(l);
            log::debug!(
                "{}: induction variable {}, this loop penalty {}, other loop penalties {}",
                self.loops.name(self.proc, l),
                iv,
                this_loop_penalty,
                other_loop_penalties
            );

            let mut cost = 0.0;
            for reference in context.reference_groups.representatives().iter().copied() {
                let penalty = reference_penalty(
                    self.proc,
                    reference,
                    iv,
                    this_loop_penalty,
                    &self.options.cache,
                    self.options.access_order,
                );

                cost += penalty * other_loop_penalties;
                log::debug!("{}: penalty {}, accumulated cost {}", reference, penalty, cost);
            }

            costs.set_cost(l, cost);
        }
    }
}
