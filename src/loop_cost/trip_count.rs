use crate::{
    analysis::{
        loop_analysis::{LoopAnalysis, LoopId},
        scalar_evolution::SymbolicEvaluator,
    },
    procedure::Procedure,
};

/// Trip count assumed when neither the loop nor its neighbours in the nest have a known one.
pub const STATIC_TRIP_COUNT: u32 = 1000;

/// One trip count per loop of `nest`, in nest order. Counts the evaluator cannot recover are
/// estimated from the neighbouring loops; see [`normalize_trip_counts`].
pub fn set_trip_counts<E: SymbolicEvaluator + ?Sized>(
    proc: &Procedure,
    loops: &LoopAnalysis,
    evaluator: &E,
    nest: &[LoopId],
) -> Vec<(LoopId, u32)> {
    let recorded: Vec<u32> = nest
        .iter()
        .map(|l| {
            loops
                .get_exiting_block(proc, *l)
                .map_or(0, |exiting| evaluator.small_constant_trip_count(*l, exiting))
        })
        .collect();

    let normalized = normalize_trip_counts(&recorded);
    for ((l, recorded), normalized) in nest.iter().zip(&recorded).zip(&normalized) {
        if recorded != normalized {
            log::debug!(
                "{}: unknown trip count, assuming {}",
                loops.name(proc, *l),
                normalized
            );
        }
    }

    nest.iter().copied().zip(normalized).collect()
}

/// Replaces every 0 by the integer average of its neighbours (or the only neighbour at either end
/// of the nest), and by [`STATIC_TRIP_COUNT`] when that is still 0. Neighbours are read as
/// recorded, never as already replaced.
pub fn normalize_trip_counts(recorded: &[u32]) -> Vec<u32> {
    let last = recorded.len().saturating_sub(1);

    (0..recorded.len())
        .map(|index| {
            if recorded[index] != 0 {
                return recorded[index];
            }

            let estimate = if recorded.len() == 1 {
                0
            } else if index == 0 {
                recorded[1]
            } else if index == last {
                recorded[last - 1]
            } else {
                let sum = u64::from(recorded[index - 1]) + u64::from(recorded[index + 1]);
                (sum / 2) as u32
            };

            match estimate {
                0 => STATIC_TRIP_COUNT,
                estimate => estimate,
            }
        })
        .collect()
}
