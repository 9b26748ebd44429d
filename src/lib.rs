pub mod analysis;
pub mod block;
pub mod dominators;
pub mod effects;
pub mod error;
pub mod kernels;
pub mod loop_cost;
pub mod natural_loops;
pub mod opcode;
pub mod phi_children;
pub mod procedure;
pub mod rpo;
pub mod sparse_collection;
pub mod typ;
pub mod utils;
pub mod value;

#[cfg(test)]
mod tests;

pub use analysis::loop_analysis::{LoopAnalysis, LoopId};
pub use block::{BasicBlock, BasicBlockBuilder, BlockId};
pub use error::{Error, Result};
pub use loop_cost::{AccessOrder, CacheModel, LoopCostAnalysis, LoopCosts, UNKNOWN_COST};
pub use opcode::Opcode;
pub use procedure::Procedure;
pub use typ::Type;
pub use value::{Value, ValueId};

/// Knobs of one loop cost analysis run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub cache: CacheModel,
    pub access_order: AccessOrder,
}

/// Runs the loop cost analysis over `proc`.
pub fn compute_loop_costs(proc: &mut Procedure, options: &Options) -> Result<LoopCosts> {
    LoopCostAnalysis::run(proc, options)
}
