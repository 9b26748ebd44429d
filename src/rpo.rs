use crate::{block::BlockId, dominators::graph_post_order, procedure::Procedure};

/// Compute the Block post-order for a Procedure. In the returned Vec a BlockId will
/// appear after all of its successors, back edges aside.
pub fn compute_po(proc: &Procedure) -> Vec<BlockId> {
    graph_post_order(proc)
}

/// Compute the Block reverse-post-order for a Procedure. In the returned Vec a
/// BlockId will appear before any of its successors, back edges aside.
///
/// RPO has the nice property that a Value's operands are defined "earlier" in the ordering,
/// Phis excepted. Blocks unreachable from the entry block are left out.
pub fn compute_rpo(proc: &Procedure) -> Vec<BlockId> {
    let mut po = compute_po(proc);
    po.reverse();
    po
}
