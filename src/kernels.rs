//! Small loop nests in the shape a C front end emits after `mem2reg` and `indvars`: every loop is
//! tested in its header, steps in its own latch block, and leaves through an empty end block.
//!
//! Header blocks are named the way clang names them (`for.cond`, `for.cond1`, `for.cond4`, ...),
//! so diagnostics read like the source loops.

use crate::{
    block::{BasicBlockBuilder, BlockId},
    effects::Effects,
    opcode::Opcode,
    procedure::Procedure,
    typ::{pointer_type, Type},
    value::ValueId,
};

/// Upper bound of a counted loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Constant(i64),
    /// An incoming argument, unknown at compile time.
    Argument(usize),
}

/// Nesting order of the three loops of a matrix multiply, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoopOrder {
    #[default]
    Ijk,
    Ikj,
    Jik,
    Jki,
    Kij,
    Kji,
}

impl LoopOrder {
    pub const ALL: [LoopOrder; 6] = [
        LoopOrder::Ijk,
        LoopOrder::Ikj,
        LoopOrder::Jik,
        LoopOrder::Jki,
        LoopOrder::Kij,
        LoopOrder::Kji,
    ];

    /// Nesting level of `i`, `j` and `k`.
    pub fn levels(self) -> [usize; 3] {
        match self {
            LoopOrder::Ijk => [0, 1, 2],
            LoopOrder::Ikj => [0, 2, 1],
            LoopOrder::Jik => [1, 0, 2],
            LoopOrder::Jki => [2, 0, 1],
            LoopOrder::Kij => [1, 2, 0],
            LoopOrder::Kji => [2, 1, 0],
        }
    }
}

impl std::fmt::Display for LoopOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopOrder::Ijk => "ijk",
            LoopOrder::Ikj => "ikj",
            LoopOrder::Jik => "jik",
            LoopOrder::Jki => "jki",
            LoopOrder::Kij => "kij",
            LoopOrder::Kji => "kji",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for LoopOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoopOrder::ALL
            .iter()
            .copied()
            .find(|order| order.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown loop order `{}`", s))
    }
}

fn suffixed(name: &str, suffix: usize) -> String {
    if suffix == 0 {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

/// Builds `for (iv = 0; iv != bound; ++iv)` loops, one per bound, nested outermost first.
///
/// `entry_work` runs once in the entry block and its result is handed to the other hooks.
/// `header_work(level)` runs in each header before the exit test. `body_work(level, ivs)` runs
/// in each body block before it enters the next level; `ivs` holds the induction variables of
/// this level and every enclosing one.
fn build_nest<T>(
    bounds: &[Bound],
    entry_work: impl FnOnce(&mut BasicBlockBuilder<'_>) -> T,
    mut header_work: impl FnMut(&mut BasicBlockBuilder<'_>, &T, usize),
    mut body_work: impl FnMut(&mut BasicBlockBuilder<'_>, &T, usize, &[ValueId]),
) -> Procedure {
    let depth = bounds.len();
    let mut proc = Procedure::new();
    let entry = proc.add_named_block("entry");

    let mut headers = Vec::with_capacity(depth);
    let mut bodies = Vec::with_capacity(depth);
    for level in 0..depth {
        let suffix = if level == 0 { 0 } else { 3 * level - 2 };
        headers.push(proc.add_named_block(suffixed("for.cond", suffix)));
        bodies.push(proc.add_named_block(suffixed("for.body", 3 * level)));
    }

    let mut latches = vec![BlockId::default(); depth];
    let mut ends = vec![BlockId::default(); depth];
    for level in (0..depth).rev() {
        let (inc, end) = if level + 1 == depth {
            (0, 0)
        } else {
            (8 * depth - 3 * level, 8 * depth - 3 * level + 2)
        };
        latches[level] = proc.add_named_block(suffixed("for.inc", inc));
        ends[level] = proc.add_named_block(suffixed("for.end", end));
    }

    let mut b = BasicBlockBuilder::new(&mut proc, entry);

    let ivs: Vec<ValueId> = headers
        .iter()
        .map(|header| {
            b.switch_to_block(*header);
            b.phi(Type::Int64)
        })
        .collect();

    b.switch_to_block(entry);
    let state = entry_work(&mut b);

    if depth == 0 {
        b.return_(None);
        return proc;
    }

    let zero = b.const64(0);
    b.upsilon(zero, ivs[0]);
    b.jump(Some(headers[0]));

    for level in 0..depth {
        b.switch_to_block(headers[level]);
        header_work(&mut b, &state, level);
        let bound = match bounds[level] {
            Bound::Constant(n) => b.const64(n),
            Bound::Argument(index) => b.argument(index, Type::Int64),
        };
        let cond = b.binary(Opcode::NotEqual, ivs[level], bound);
        b.branch(cond, bodies[level], ends[level]);

        b.switch_to_block(bodies[level]);
        body_work(&mut b, &state, level, &ivs[..=level]);
        if level + 1 < depth {
            let zero = b.const64(0);
            b.upsilon(zero, ivs[level + 1]);
            b.jump(Some(headers[level + 1]));
        } else {
            b.jump(Some(latches[level]));
        }

        b.switch_to_block(latches[level]);
        let one = b.const64(1);
        let next = b.binary(Opcode::Add, ivs[level], one);
        b.upsilon(next, ivs[level]);
        b.jump(Some(headers[level]));

        b.switch_to_block(ends[level]);
        if level == 0 {
            b.return_(None);
        } else {
            b.jump(Some(latches[level - 1]));
        }
    }

    proc
}

/// `a[iv0]...[ivN] += 1` in the innermost body. The array is argument 0.
fn bump(b: &mut BasicBlockBuilder<'_>, array: ValueId, ivs: &[ValueId]) {
    let zero = b.const64(0);
    let indices: Vec<ValueId> = std::iter::once(zero).chain(ivs.iter().copied()).collect();

    let address = b.element_address(array, &indices);
    let value = b.load(Type::Int32, address);
    let one = b.const32(1);
    let sum = b.binary(Opcode::Add, value, one);
    b.store(sum, address);
}

/// A perfect nest of counted loops that increments one array element per innermost iteration.
pub fn counted_nest(bounds: &[Bound]) -> Procedure {
    let depth = bounds.len();

    build_nest(
        bounds,
        |b| b.argument(0, pointer_type()),
        |_, _, _| {},
        |b, array, level, ivs| {
            if level + 1 == depth {
                bump(b, *array, ivs);
            }
        },
    )
}

/// `c[i][j] = c[i][j] + a[i][k] * b[k][j]` over `size × size` matrices, with the loops nested in
/// `order`. `c`, `a` and `b` are arguments 0, 1 and 2.
pub fn matmul(size: i64, order: LoopOrder) -> Procedure {
    let [i_level, j_level, k_level] = order.levels();

    build_nest(
        &[Bound::Constant(size); 3],
        |b| {
            [
                b.argument(0, pointer_type()),
                b.argument(1, pointer_type()),
                b.argument(2, pointer_type()),
            ]
        },
        |_, _, _| {},
        |b, &[c, a, m]: &[ValueId; 3], level, ivs| {
            if level != 2 {
                return;
            }

            let (i, j, k) = (ivs[i_level], ivs[j_level], ivs[k_level]);
            let zero = b.const64(0);

            let c_ij = b.element_address(c, &[zero, i, j]);
            let c_val = b.load(Type::Int32, c_ij);
            let a_ik = b.element_address(a, &[zero, i, k]);
            let a_val = b.load(Type::Int32, a_ik);
            let b_kj = b.element_address(m, &[zero, k, j]);
            let b_val = b.load(Type::Int32, b_kj);
            let product = b.binary(Opcode::Mul, a_val, b_val);
            let sum = b.binary(Opcode::Add, c_val, product);
            let c_ij = b.element_address(c, &[zero, i, j]);
            b.store(sum, c_ij);
        },
    )
}

/// `for i { s[i] = 0; for j { s[i] += a[i][j]; } }`: the outer loop does work of its own, so only
/// the inner loop is a perfect nest. `s` and `a` are arguments 0 and 1.
pub fn imperfect_nest(size: i64) -> Procedure {
    build_nest(
        &[Bound::Constant(size); 2],
        |b| [b.argument(0, pointer_type()), b.argument(1, pointer_type())],
        |_, _, _| {},
        |b, &[s, a]: &[ValueId; 2], level, ivs| {
            let zero = b.const64(0);
            let s_i = b.element_address(s, &[zero, ivs[0]]);

            if level == 0 {
                let init = b.const32(0);
                b.store(init, s_i);
                return;
            }

            let a_ij = b.element_address(a, &[zero, ivs[0], ivs[1]]);
            let a_val = b.load(Type::Int32, a_ij);
            let s_val = b.load(Type::Int32, s_i);
            let sum = b.binary(Opcode::Add, s_val, a_val);
            b.store(sum, s_i);
        },
    )
}

/// A two-deep nest whose inner header calls out before testing the bound. `callee` and `a` are
/// arguments 0 and 1.
pub fn side_effecting_header(size: i64) -> Procedure {
    build_nest(
        &[Bound::Constant(size); 2],
        |b| [b.argument(0, pointer_type()), b.argument(1, pointer_type())],
        |b, &[callee, _]: &[ValueId; 2], level| {
            if level == 1 {
                b.ccall(Type::Void, callee, &[], Effects::for_call());
            }
        },
        |b, &[_, a]: &[ValueId; 2], level, ivs| {
            if level == 1 {
                bump(b, a, ivs);
            }
        },
    )
}

/// A two-deep nest whose inner loop runs up to argument 1. The array is argument 0.
pub fn symbolic_bounds(size: i64) -> Procedure {
    counted_nest(&[Bound::Constant(size), Bound::Argument(1)])
}

/// `for i { for j { a[i][j] += 1; } for k { b[i][k] += 1; } }`: the outer loop holds two
/// sub-loops, so each of them is a nest of its own. `a` and `b` are arguments 0 and 1.
pub fn sibling_loops(size: i64) -> Procedure {
    let mut proc = Procedure::new();
    let entry = proc.add_named_block("entry");
    let outer = proc.add_named_block("for.cond");
    let outer_body = proc.add_named_block("for.body");
    let first = proc.add_named_block("for.cond1");
    let first_body = proc.add_named_block("for.body3");
    let first_latch = proc.add_named_block("for.inc");
    let first_end = proc.add_named_block("for.end");
    let second = proc.add_named_block("for.cond5");
    let second_body = proc.add_named_block("for.body7");
    let second_latch = proc.add_named_block("for.inc11");
    let second_end = proc.add_named_block("for.end13");
    let outer_latch = proc.add_named_block("for.inc14");
    let outer_end = proc.add_named_block("for.end16");

    let mut b = BasicBlockBuilder::new(&mut proc, outer);
    let i = b.phi(Type::Int64);
    b.switch_to_block(first);
    let j = b.phi(Type::Int64);
    b.switch_to_block(second);
    let k = b.phi(Type::Int64);

    b.switch_to_block(entry);
    let a = b.argument(0, pointer_type());
    let m = b.argument(1, pointer_type());
    let zero = b.const64(0);
    b.upsilon(zero, i);
    b.jump(Some(outer));

    b.switch_to_block(outer);
    let bound = b.const64(size);
    let cond = b.binary(Opcode::NotEqual, i, bound);
    b.branch(cond, outer_body, outer_end);

    b.switch_to_block(outer_body);
    let zero = b.const64(0);
    b.upsilon(zero, j);
    b.jump(Some(first));

    let inner_loops = [
        (first, first_body, first_latch, first_end, j, a),
        (second, second_body, second_latch, second_end, k, m),
    ];
    for (header, body, latch, end, iv, array) in inner_loops {
        b.switch_to_block(header);
        let bound = b.const64(size);
        let cond = b.binary(Opcode::NotEqual, iv, bound);
        b.branch(cond, body, end);

        b.switch_to_block(body);
        bump(&mut b, array, &[i, iv]);
        b.jump(Some(latch));

        b.switch_to_block(latch);
        let one = b.const64(1);
        let next = b.binary(Opcode::Add, iv, one);
        b.upsilon(next, iv);
        b.jump(Some(header));
    }

    b.switch_to_block(first_end);
    let zero = b.const64(0);
    b.upsilon(zero, k);
    b.jump(Some(second));

    b.switch_to_block(second_end);
    b.jump(Some(outer_latch));

    b.switch_to_block(outer_latch);
    let one = b.const64(1);
    let next = b.binary(Opcode::Add, i, one);
    b.upsilon(next, i);
    b.jump(Some(outer));

    b.switch_to_block(outer_end);
    b.return_(None);

    proc
}

/// `for i { for j { if (a[i][j] != 0) a[i][j] = 0; else b[i][j] = 1; } }`: a perfect nest whose
/// innermost loop does its work in two blocks. `a` and `b` are arguments 0 and 1.
pub fn branching_body(size: i64) -> Procedure {
    build_nest(
        &[Bound::Constant(size); 2],
        |b| [b.argument(0, pointer_type()), b.argument(1, pointer_type())],
        |_, _, _| {},
        |b, &[a, m]: &[ValueId; 2], level, ivs| {
            if level != 1 {
                return;
            }

            let then_block = b.procedure.add_named_block("if.then");
            let else_block = b.procedure.add_named_block("if.else");
            let join = b.procedure.add_named_block("if.end");

            let zero = b.const64(0);
            let a_ij = b.element_address(a, &[zero, ivs[0], ivs[1]]);
            let value = b.load(Type::Int32, a_ij);
            let nil = b.const32(0);
            let cond = b.binary(Opcode::NotEqual, value, nil);
            b.branch(cond, then_block, else_block);

            b.switch_to_block(then_block);
            let nil = b.const32(0);
            b.store(nil, a_ij);
            b.jump(Some(join));

            b.switch_to_block(else_block);
            let zero = b.const64(0);
            let b_ij = b.element_address(m, &[zero, ivs[0], ivs[1]]);
            let one = b.const32(1);
            b.store(one, b_ij);
            b.jump(Some(join));

            // The nest closes the loop from the join block.
            b.switch_to_block(join);
        },
    )
}

/// `do { a[i] += 1; } while (++i != size);`: the exit test sits in the latch, after the body.
pub fn rotated_loop(size: i64) -> Procedure {
    let mut proc = Procedure::new();
    let entry = proc.add_named_block("entry");
    let body = proc.add_named_block("do.body");
    let latch = proc.add_named_block("do.cond");
    let exit = proc.add_named_block("do.end");

    let mut b = BasicBlockBuilder::new(&mut proc, body);
    let i = b.phi(Type::Int64);

    b.switch_to_block(entry);
    let array = b.argument(0, pointer_type());
    let zero = b.const64(0);
    b.upsilon(zero, i);
    b.jump(Some(body));

    b.switch_to_block(body);
    bump(&mut b, array, &[i]);
    b.jump(Some(latch));

    b.switch_to_block(latch);
    let one = b.const64(1);
    let next = b.binary(Opcode::Add, i, one);
    b.upsilon(next, i);
    let bound = b.const64(size);
    let cond = b.binary(Opcode::NotEqual, next, bound);
    b.branch(cond, body, exit);

    b.switch_to_block(exit);
    b.return_(None);

    proc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_names(proc: &Procedure) -> Vec<String> {
        proc.block_ids().map(|block| proc.block_name(block)).collect()
    }

    #[test]
    fn matmul_blocks_follow_clang() {
        let proc = matmul(5000, LoopOrder::Ijk);

        assert_eq!(
            block_names(&proc),
            [
                "entry",
                "for.cond",
                "for.body",
                "for.cond1",
                "for.body3",
                "for.cond4",
                "for.body6",
                "for.inc",
                "for.end",
                "for.inc21",
                "for.end23",
                "for.inc24",
                "for.end26",
            ]
        );
        assert_eq!(proc.validate(), Ok(()));
    }

    #[test]
    fn kernels_are_well_formed() {
        let kernels = [
            counted_nest(&[Bound::Constant(3)]),
            counted_nest(&[]),
            imperfect_nest(10),
            side_effecting_header(10),
            symbolic_bounds(10),
            rotated_loop(10),
            sibling_loops(10),
            branching_body(10),
        ];

        for proc in kernels.iter() {
            assert_eq!(proc.validate(), Ok(()), "{}", proc.display_());
        }
    }

    #[test]
    fn loop_orders_round_trip_through_their_names() {
        for order in LoopOrder::ALL {
            assert_eq!(order.to_string().parse::<LoopOrder>(), Ok(order));

            let mut levels = order.levels();
            levels.sort();
            assert_eq!(levels, [0, 1, 2]);
        }

        assert!("ijj".parse::<LoopOrder>().is_err());
        assert_eq!("IKJ".parse::<LoopOrder>(), Ok(LoopOrder::Ikj));
    }
}
