//! Perfect loop nests.
//!
//! A nest is perfect when every loop but the innermost holds exactly one sub-loop and nothing
//! else: its own header and latch only test and step the induction variable, and every other
//! block it owns either belongs to the sub-loop or just falls through to the next block.
//!
//! Rotated (bottom-tested) loops never take part in a perfect nest.

use crate::{
    analysis::loop_analysis::{LoopAnalysis, LoopId},
    block::BlockId,
    procedure::Procedure,
};

use super::LoopNest;

/// True when the header and latch of `loop_` hold nothing but loop control: Phis, Upsilons,
/// the induction update, the exit test and branches. Loops without a unique latch never qualify.
pub fn has_simple_header_latch(proc: &Procedure, loops: &LoopAnalysis, loop_: LoopId) -> bool {
    let Some(latch) = loops.get_loop_latch(proc, loop_) else {
        return false;
    };

    let header = loops.get_header(loop_);
    [header, latch].iter().all(|block| {
        proc.block(*block)
            .iter()
            .all(|value| proc.value(*value).effects().is_bookkeeping())
    })
}

/// True when every block of `loop_`, except its header, its latch and empty jump stubs, lives
/// in its only sub-loop. False for loops with zero or several sub-loops.
pub fn blocks_perfectly_nested_under(proc: &Procedure, loops: &LoopAnalysis, loop_: LoopId) -> bool {
    let [subloop] = loops.get_sub_loops(loop_) else {
        return false;
    };

    let header = loops.get_header(loop_);
    let latch = loops.get_loop_latch(proc, loop_);

    loops.get_blocks(loop_).iter().copied().all(|block| {
        block == header
            || Some(block) == latch
            || loops.contains_block(*subloop, block)
            || proc.block(block).is_jump_stub(proc)
    })
}

/// The one block of `loop_` that does real work: neither the header, nor the latch, nor a jump
/// stub. None when there are several such blocks or none at all.
pub fn inner_single_block(proc: &Procedure, loops: &LoopAnalysis, loop_: LoopId) -> Option<BlockId> {
    let header = loops.get_header(loop_);
    let latch = loops.get_loop_latch(proc, loop_);

    let mut found = None;
    for block in loops.get_blocks(loop_).iter().copied() {
        if block == header || Some(block) == latch || proc.block(block).is_jump_stub(proc) {
            continue;
        }

        if found.is_some() {
            return None;
        }
        found = Some(block);
    }

    found
}

/// Every maximal perfect nest of the procedure, outermost loop first. Nests come out in the
/// order their innermost loops are reached by a pre-order walk of the loop forest.
pub fn populate_perfect_loop_nests(proc: &Procedure, loops: &LoopAnalysis) -> Vec<LoopNest> {
    let mut nests = vec![];

    for loop_ in loops.top_level_loops().iter().copied() {
        populate_perfect_loop_nests_under(proc, loops, loop_, &mut nests);
    }

    nests
}

/// Collects the perfect nests rooted at or below `loop_`. Returns true when `loop_` heads the last
/// nest pushed, so the caller may extend it outwards.
fn populate_perfect_loop_nests_under(
    proc: &Procedure,
    loops: &LoopAnalysis,
    loop_: LoopId,
    nests: &mut Vec<LoopNest>,
) -> bool {
    if loops.is_innermost(loop_) {
        if !loops.is_rotated(proc, loop_) && has_simple_header_latch(proc, loops, loop_) {
            nests.push(vec![loop_]);
            return true;
        }
        return false;
    }

    // Every sub-loop is visited, even after one of them fails.
    let mut perfect_subnest = true;
    for subloop in loops.get_sub_loops(loop_).iter().copied() {
        perfect_subnest &= populate_perfect_loop_nests_under(proc, loops, subloop, nests);
    }

    if perfect_subnest
        && loops.get_sub_loops(loop_).len() == 1
        && !loops.is_rotated(proc, loop_)
        && has_simple_header_latch(proc, loops, loop_)
        && blocks_perfectly_nested_under(proc, loops, loop_)
    {
        if let Some(nest) = nests.last_mut() {
            nest.insert(0, loop_);
            return true;
        }
    }

    false
}

/// Checks a nest top-down, independently of how it was found.
pub fn is_perfect_nest(proc: &Procedure, loops: &LoopAnalysis, nest: &[LoopId]) -> bool {
    let Some((innermost, outer)) = nest.split_last() else {
        return false;
    };

    if !loops.is_innermost(*innermost)
        || loops.is_rotated(proc, *innermost)
        || !has_simple_header_latch(proc, loops, *innermost)
    {
        return false;
    }

    let mut subloop = *innermost;
    for loop_ in outer.iter().rev().copied() {
        if loops.get_sub_loops(loop_) != [subloop]
            || loops.is_rotated(proc, loop_)
            || !has_simple_header_latch(proc, loops, loop_)
            || !blocks_perfectly_nested_under(proc, loops, loop_)
        {
            return false;
        }
        subloop = loop_;
    }

    true
}
