//! Cache-aware cost estimation for perfect loop nests.
//!
//! For every loop of a perfect nest the estimator asks: if this loop were the innermost one, how
//! many cache lines would the innermost body touch? Each reference group costs one line per
//! iteration when the loop walks it with a stride (`trip count`), one line every `line size`
//! iterations when the loop walks it contiguously (`trip count / line size`), and a single line
//! when the reference does not depend on the loop at all. The sum is scaled by the trip counts of
//! the other loops of the nest.
//!
//! Loops that are not part of a perfect nest, and loops without a canonical induction variable,
//! have an unknown cost of `-1.0`.

pub mod cache;
pub mod calculator;
pub mod perfect_nest;
pub mod reference_groups;
pub mod trip_count;

use indexmap::IndexMap;

use crate::{
    analysis::{
        loop_analysis::{LoopAnalysis, LoopId},
        scalar_evolution::{ScalarEvolution, SymbolicEvaluator},
    },
    error::Result,
    phi_children::PhiChildren,
    procedure::Procedure,
    Options,
};

pub use cache::CacheModel;
pub use reference_groups::ReferenceGroups;
pub use trip_count::STATIC_TRIP_COUNT;

/// Cost of a loop that could not be estimated.
pub const UNKNOWN_COST: f64 = -1.0;

/// Loops of a perfect nest, outermost first.
pub type LoopNest = Vec<LoopId>;

/// Memory layout of multi-dimensional arrays. Decides which index of an address computation
/// walks consecutive elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessOrder {
    /// The last index is contiguous.
    #[default]
    RowMajor,
    /// The second index is contiguous. The first one is the pointer-level offset.
    ColumnMajor,
}

impl AccessOrder {
    /// Position (counted from 1) of the contiguous index among `num_indices` indices.
    pub fn contiguous_index(self, num_indices: usize) -> usize {
        match self {
            AccessOrder::RowMajor => num_indices,
            AccessOrder::ColumnMajor => 2,
        }
    }
}

/// Transient state of one nest: its reference groups and trip counts. Built fresh for each nest
/// and dropped once the nest is costed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestContext {
    pub reference_groups: ReferenceGroups,
    pub trip_counts: Vec<(LoopId, u32)>,
}

impl NestContext {
    pub fn trip_count_of(&self, loop_: LoopId) -> Option<u32> {
        self.trip_counts
            .iter()
            .find(|(l, _)| *l == loop_)
            .map(|(_, count)| *count)
    }

    /// The trip count of `loop_` and the product of the trip counts of every other loop.
    pub fn penalties(&self, loop_: LoopId) -> (f64, f64) {
        let mut this_loop = 1.0;
        let mut other_loops = 1.0;

        for (l, count) in self.trip_counts.iter() {
            if *l == loop_ {
                this_loop = f64::from(*count);
            } else {
                other_loops *= f64::from(*count);
            }
        }

        (this_loop, other_loops)
    }
}

/// Result of one analysis run over a procedure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopCosts {
    costs: IndexMap<LoopId, f64>,
    trip_counts: Vec<(LoopId, u32)>,
    reference_groups: Vec<ReferenceGroups>,
    names: IndexMap<LoopId, String>,
}

impl LoopCosts {
    /// Cost of `loop_`, or [`UNKNOWN_COST`] when it was not estimated.
    pub fn loop_cost_of(&self, loop_: LoopId) -> f64 {
        self.costs.get(&loop_).copied().unwrap_or(UNKNOWN_COST)
    }

    /// Cost of `loop_` when it is known.
    pub fn cost(&self, loop_: LoopId) -> Option<f64> {
        self.costs
            .get(&loop_)
            .copied()
            .filter(|cost| *cost != UNKNOWN_COST)
    }

    pub fn trip_count_of(&self, loop_: LoopId) -> Option<u32> {
        self.trip_counts
            .iter()
            .rev()
            .find(|(l, _)| *l == loop_)
            .map(|(_, count)| *count)
    }

    /// Every loop of every nest, with its cost, in nest order.
    pub fn costs(&self) -> impl Iterator<Item = (LoopId, f64)> + '_ {
        self.costs.iter().map(|(l, cost)| (*l, *cost))
    }

    /// Trip counts of every costed nest, in nest order.
    pub fn trip_counts(&self) -> impl Iterator<Item = (LoopId, u32)> + '_ {
        self.trip_counts.iter().copied()
    }

    /// Reference groups of every costed nest.
    pub fn reference_groups(&self) -> &[ReferenceGroups] {
        &self.reference_groups
    }

    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    pub fn name_of(&self, loop_: LoopId) -> Option<&str> {
        self.names.get(&loop_).map(String::as_str)
    }

    /// The loop whose header block is called `name`, if it was seen by the analysis.
    pub fn loop_named(&self, name: &str) -> Option<LoopId> {
        self.names
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(l, _)| *l)
    }

    pub fn display_costs(&self) -> LoopCostsDisplay<'_> {
        LoopCostsDisplay { costs: self }
    }

    pub fn display_trip_counts(&self) -> TripCountsDisplay<'_> {
        TripCountsDisplay { costs: self }
    }

    pub(crate) fn record_unknown(&mut self, loop_: LoopId, name: String) {
        self.costs.insert(loop_, UNKNOWN_COST);
        self.names.insert(loop_, name);
    }

    pub(crate) fn record_nest(&mut self, context: &NestContext) {
        self.trip_counts.extend(context.trip_counts.iter().copied());
        self.reference_groups.push(context.reference_groups.clone());
    }

    pub(crate) fn set_cost(&mut self, loop_: LoopId, cost: f64) {
        self.costs.insert(loop_, cost);
    }

    fn display_name(&self, loop_: LoopId) -> String {
        self.name_of(loop_)
            .map_or_else(|| loop_.to_string(), str::to_owned)
    }
}

/// `%e` rendering: six decimals and a signed exponent of at least two digits.
pub fn scientific(value: f64) -> String {
    let formatted = format!("{:.6e}", value);

    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => formatted,
    }
}

pub struct LoopCostsDisplay<'a> {
    costs: &'a LoopCosts,
}

impl std::fmt::Display for LoopCostsDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Printing Loop Costs: ")?;
        if self.costs.costs.is_empty() {
            write!(f, "(empty)")?;
        }
        writeln!(f)?;

        for (l, cost) in self.costs.costs() {
            writeln!(
                f,
                "Loop: {}\tCosts: {}",
                self.costs.display_name(l),
                scientific(cost)
            )?;
        }

        Ok(())
    }
}

pub struct TripCountsDisplay<'a> {
    costs: &'a LoopCosts,
}

impl std::fmt::Display for TripCountsDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Printing Trip Counts: ")?;
        if self.costs.trip_counts.is_empty() {
            write!(f, "(empty)")?;
        }
        writeln!(f)?;

        for (l, count) in self.costs.trip_counts() {
            writeln!(
                f,
                "Loop: {}\tTripCount: {}",
                self.costs.display_name(l),
                count
            )?;
        }

        Ok(())
    }
}

/// Finds the perfect nests of a procedure and costs each of them.
pub struct LoopCostAnalysis<'a> {
    proc: &'a Procedure,
    loops: &'a LoopAnalysis,
    phi_children: &'a PhiChildren,
    evaluator: &'a dyn SymbolicEvaluator,
    options: Options,
}

impl<'a> LoopCostAnalysis<'a> {
    pub fn new(
        proc: &'a Procedure,
        loops: &'a LoopAnalysis,
        phi_children: &'a PhiChildren,
        evaluator: &'a dyn SymbolicEvaluator,
        options: Options,
    ) -> Self {
        Self {
            proc,
            loops,
            phi_children,
            evaluator,
            options,
        }
    }

    /// Validates `proc`, builds the loop forest and scalar evolution, and costs every perfect
    /// nest.
    pub fn run(proc: &mut Procedure, options: &Options) -> Result<LoopCosts> {
        proc.validate()?;

        let loops = LoopAnalysis::new(proc);
        let proc = &*proc;
        let phi_children = PhiChildren::new(proc);
        let evaluator = ScalarEvolution::new(proc, &loops, &phi_children);

        log::info!(
            "computing loop costs: {} blocks, {} loops, line size {}, {:?}",
            proc.num_blocks(),
            loops.num_loops(),
            options.cache.line_size(),
            options.access_order
        );

        let analysis = LoopCostAnalysis::new(proc, &loops, &phi_children, &evaluator, *options);
        Ok(analysis.compute())
    }

    pub fn compute(&self) -> LoopCosts {
        let mut costs = LoopCosts::default();

        for nest in perfect_nest::populate_perfect_loop_nests(self.proc, self.loops) {
            log::debug!(
                "perfect nest: {}",
                nest.iter()
                    .map(|l| self.loops.name(self.proc, *l))
                    .collect::<Vec<_>>()
                    .join(" > ")
            );
            self.calculate_loop_costs(&nest, &mut costs);
        }

        log::debug!("{}", costs.display_costs());
        log::debug!("{}", costs.display_trip_counts());

        costs
    }
}
