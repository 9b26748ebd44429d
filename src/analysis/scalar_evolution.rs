//! Affine scalar evolution.
//!
//! Every integer value gets an expression `constant + Σ coefficient·atom`. An atom is either the
//! iteration counter of a loop (0 on the first test of the loop's exit condition, then 1, 2, ...)
//! or an SSA value the analysis cannot see through: loads, arguments, non-constant products and
//! Phis that are not simple recurrences.
//!
//! Expressions are computed eagerly, in reverse post-order, in three sweeps:
//!
//! 1. every Phi is opaque and the rest of the procedure is evaluated on top of that,
//! 2. each header Phi whose in-loop inputs all read `phi + c` and whose single out-of-loop input
//!    is `start` is recognised as the recurrence `start + c·iteration(L)`,
//! 3. the procedure is evaluated again with the recognised recurrences substituted.

use std::collections::BTreeMap;

use num_integer::Integer;

use crate::{
    analysis::loop_analysis::{LoopAnalysis, LoopId},
    block::BlockId,
    opcode::Opcode,
    phi_children::PhiChildren,
    procedure::Procedure,
    rpo::compute_rpo,
    utils::index_set::IndexMap,
    value::ValueId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Atom {
    Iteration(LoopId),
    Value(ValueId),
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Atom::Iteration(l) => write!(f, "{{{}}}", l),
            Atom::Value(v) => write!(f, "{}", v),
        }
    }
}

/// `constant + Σ coefficient·atom`. Terms never carry a zero coefficient.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scev {
    constant: i64,
    terms: BTreeMap<Atom, i64>,
}

impl Scev {
    pub fn constant(value: i64) -> Self {
        Self {
            constant: value,
            terms: BTreeMap::new(),
        }
    }

    pub fn atom(atom: Atom) -> Self {
        Self {
            constant: 0,
            terms: BTreeMap::from([(atom, 1)]),
        }
    }

    pub fn opaque(value: ValueId) -> Self {
        Self::atom(Atom::Value(value))
    }

    pub fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    pub fn constant_part(&self) -> i64 {
        self.constant
    }

    pub fn coefficient(&self, atom: Atom) -> i64 {
        self.terms.get(&atom).copied().unwrap_or(0)
    }

    pub fn atoms(&self) -> impl Iterator<Item = Atom> + '_ {
        self.terms.keys().copied()
    }

    /// `None` on overflow.
    pub fn add(&self, other: &Scev) -> Option<Scev> {
        let mut result = self.clone();
        result.constant = result.constant.checked_add(other.constant)?;

        for (atom, coefficient) in other.terms.iter() {
            let sum = result.coefficient(*atom).checked_add(*coefficient)?;
            if sum == 0 {
                result.terms.remove(atom);
            } else {
                result.terms.insert(*atom, sum);
            }
        }

        Some(result)
    }

    pub fn scale(&self, factor: i64) -> Option<Scev> {
        if factor == 0 {
            return Some(Scev::constant(0));
        }

        let mut terms = BTreeMap::new();
        for (atom, coefficient) in self.terms.iter() {
            terms.insert(*atom, coefficient.checked_mul(factor)?);
        }

        Some(Scev {
            constant: self.constant.checked_mul(factor)?,
            terms,
        })
    }

    pub fn sub(&self, other: &Scev) -> Option<Scev> {
        self.add(&other.scale(-1)?)
    }
}

impl std::fmt::Display for Scev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.terms.is_empty() || self.constant != 0 {
            write!(f, "{}", self.constant)?;
            if !self.terms.is_empty() {
                write!(f, " + ")?;
            }
        }

        for (i, (atom, coefficient)) in self.terms.iter().enumerate() {
            if i != 0 {
                write!(f, " + ")?;
            }

            if *coefficient == 1 {
                write!(f, "{}", atom)?;
            } else {
                write!(f, "{}*{}", coefficient, atom)?;
            }
        }

        Ok(())
    }
}

/// What the loop cost estimator needs to know about values and loops.
pub trait SymbolicEvaluator {
    fn is_scevable(&self, value: ValueId) -> bool;

    fn scev(&self, value: ValueId) -> Option<Scev>;

    /// Number of times the exit test in `exiting_block` runs, or 0 when it is not a small
    /// compile-time constant.
    fn small_constant_trip_count(&self, loop_: LoopId, exiting_block: BlockId) -> u32;

    fn constant_difference(&self, lhs: &Scev, rhs: &Scev) -> Option<i64> {
        lhs.sub(rhs)?.as_constant()
    }
}

/// A recognised `start + step·iteration(L)` header Phi.
#[derive(Debug, Clone, Copy)]
struct Recurrence {
    loop_: LoopId,
    start: ValueId,
    step: i64,
}

pub struct ScalarEvolution<'a> {
    proc: &'a Procedure,
    loops: &'a LoopAnalysis,
    expressions: IndexMap<Scev, ValueId>,
}

impl<'a> ScalarEvolution<'a> {
    pub fn new(proc: &'a Procedure, loops: &'a LoopAnalysis, phi_children: &PhiChildren) -> Self {
        let mut this = Self {
            proc,
            loops,
            expressions: IndexMap::new(),
        };

        let rpo = compute_rpo(proc);
        let no_recurrences = IndexMap::new();
        this.evaluate(&rpo, &no_recurrences);

        let mut recurrences = IndexMap::new();
        for phi in phi_children.phis().iter().copied() {
            if let Some(recurrence) = this.recognise(phi_children, phi) {
                log::trace!(
                    "{} is {{{}, +, {}}}<{}>",
                    phi,
                    recurrence.start,
                    recurrence.step,
                    loops.name(proc, recurrence.loop_)
                );
                recurrences.insert(phi, recurrence);
            }
        }

        if !recurrences.is_empty() {
            this.evaluate(&rpo, &recurrences);
        }

        this
    }

    fn evaluate(&mut self, rpo: &[BlockId], recurrences: &IndexMap<Recurrence, ValueId>) {
        for block in rpo.iter().copied() {
            for value in self.proc.block(block).iter().copied() {
                if !self.proc.value(value).typ().is_int() {
                    continue;
                }

                let expression = self
                    .expression_of(value, recurrences)
                    .unwrap_or_else(|| Scev::opaque(value));
                self.expressions.insert(value, expression);
            }
        }
    }

    /// Expression of an operand, opaque when it has not been evaluated.
    fn operand(&self, value: ValueId) -> Scev {
        self.expressions
            .get(&value)
            .cloned()
            .unwrap_or_else(|| Scev::opaque(value))
    }

    fn expression_of(
        &self,
        value: ValueId,
        recurrences: &IndexMap<Recurrence, ValueId>,
    ) -> Option<Scev> {
        let val = self.proc.value(value);

        match val.opcode() {
            Opcode::Const32 | Opcode::Const64 => val.as_int().map(Scev::constant),
            Opcode::Identity | Opcode::SExt32 | Opcode::ZExt32 | Opcode::Trunc => {
                Some(self.operand(val.child(0)))
            }
            Opcode::Add => self.operand(val.child(0)).add(&self.operand(val.child(1))),
            Opcode::Sub => self.operand(val.child(0)).sub(&self.operand(val.child(1))),
            Opcode::Neg => self.operand(val.child(0)).scale(-1),
            Opcode::Mul => {
                let lhs = self.operand(val.child(0));
                let rhs = self.operand(val.child(1));

                match (lhs.as_constant(), rhs.as_constant()) {
                    (Some(factor), _) => rhs.scale(factor),
                    (None, Some(factor)) => lhs.scale(factor),
                    (None, None) => None,
                }
            }
            Opcode::Shl => {
                let amount = self.operand(val.child(1)).as_constant()?;
                if !(0..63).contains(&amount) {
                    return None;
                }
                self.operand(val.child(0)).scale(1i64 << amount)
            }
            Opcode::Phi => {
                let recurrence = recurrences.get(&value)?;
                let iteration = Scev::atom(Atom::Iteration(recurrence.loop_))
                    .scale(recurrence.step)?;
                self.operand(recurrence.start).add(&iteration)
            }
            _ => None,
        }
    }

    /// Matches a header Phi fed by exactly one value from outside the loop and by `phi + step`
    /// from every in-loop predecessor.
    fn recognise(&self, phi_children: &PhiChildren, phi: ValueId) -> Option<Recurrence> {
        let header = self.proc.value(phi).owner()?;
        let loop_ = self.loops.get_loop_for(header)?;
        if self.loops.get_header(loop_) != header || !self.proc.value(phi).typ().is_int() {
            return None;
        }

        let mut start = None;
        let mut step = None;
        let this = Scev::opaque(phi);

        for (upsilon, incoming) in phi_children.incoming(phi, self.proc) {
            if self.loops.contains_value(loop_, self.proc, upsilon) {
                let delta = self.operand(incoming).sub(&this)?.as_constant()?;
                if step.map_or(false, |step| step != delta) {
                    return None;
                }
                step = Some(delta);
            } else {
                if start.is_some() {
                    return None;
                }
                start = Some(incoming);
            }
        }

        Some(Recurrence {
            loop_,
            start: start?,
            step: step?,
        })
    }

    /// Smallest `k >= 0` for which `exit(a + b·k)` holds, where `exit` compares against zero.
    fn first_exit(exit: Opcode, a: i128, b: i128) -> Option<i128> {
        let k = match exit {
            Opcode::Equal => {
                if b == 0 {
                    (a == 0).then_some(0)?
                } else if (-a).is_multiple_of(&b) && -a / b >= 0 {
                    -a / b
                } else {
                    return None;
                }
            }
            Opcode::NotEqual => {
                if a != 0 {
                    0
                } else if b != 0 {
                    1
                } else {
                    return None;
                }
            }
            Opcode::LessThan if a < 0 => 0,
            Opcode::LessThan if b < 0 => Integer::div_floor(&a, &-b) + 1,
            Opcode::LessEqual if a <= 0 => 0,
            Opcode::LessEqual if b < 0 => Integer::div_ceil(&a, &-b),
            Opcode::GreaterThan if a > 0 => 0,
            Opcode::GreaterThan if b > 0 => Integer::div_floor(&-a, &b) + 1,
            Opcode::GreaterEqual if a >= 0 => 0,
            Opcode::GreaterEqual if b > 0 => Integer::div_ceil(&-a, &b),
            _ => return None,
        };

        Some(k)
    }
}

impl SymbolicEvaluator for ScalarEvolution<'_> {
    /// Every integer value has an expression, possibly just itself as an opaque atom.
    fn is_scevable(&self, value: ValueId) -> bool {
        self.expressions.contains(&value)
    }

    fn scev(&self, value: ValueId) -> Option<Scev> {
        self.expressions.get(&value).cloned()
    }

    fn small_constant_trip_count(&self, loop_: LoopId, exiting_block: BlockId) -> u32 {
        let block = self.proc.block(exiting_block);
        let Some(terminal) = block.terminal(self.proc) else {
            return 0;
        };

        let branch = self.proc.value(terminal);
        if branch.opcode() != Opcode::Branch {
            return 0;
        }

        let exit_on_true = match (
            self.loops.contains_block(loop_, block.taken()),
            self.loops.contains_block(loop_, block.not_taken()),
        ) {
            (false, true) => true,
            (true, false) => false,
            _ => return 0,
        };

        let condition = self.proc.value(branch.child(0));
        let (opcode, difference) = if condition.opcode().is_comparison() {
            let lhs = self.operand(condition.child(0));
            let rhs = self.operand(condition.child(1));
            (condition.opcode(), lhs.sub(&rhs))
        } else {
            (Opcode::NotEqual, Some(self.operand(branch.child(0))))
        };

        if opcode.is_unsigned_comparison() {
            return 0;
        }

        let exit = if exit_on_true {
            Some(opcode)
        } else {
            opcode.invert_opcode(condition.typ())
        };

        let (Some(exit), Some(difference)) = (exit, difference) else {
            return 0;
        };

        let iteration = Atom::Iteration(loop_);
        if difference.atoms().any(|atom| atom != iteration) {
            return 0;
        }

        let a = difference.constant_part() as i128;
        let b = difference.coefficient(iteration) as i128;

        Self::first_exit(exit, a, b)
            .and_then(|k| u32::try_from(k + 1).ok())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{block::BasicBlockBuilder, opcode::Opcode, typ::Type};

    use super::*;

    /// `for (i = start; i <cmp> bound; i += step) { t = i * 2; u = t + i; }` with the exit
    /// test in the header and the body branch taken when the comparison holds.
    fn counted_loop(start: i64, cmp: Opcode, bound: i64, step: i64) -> (Procedure, [ValueId; 3]) {
        let mut proc = Procedure::new();
        let entry = proc.add_named_block("entry");
        let header = proc.add_named_block("for.cond");
        let body = proc.add_named_block("for.body");
        let exit = proc.add_named_block("for.end");

        let mut b = BasicBlockBuilder::new(&mut proc, header);
        let i = b.phi(Type::Int64);
        let n = b.const64(bound);
        let cond = b.binary(cmp, i, n);
        b.branch(cond, body, exit);

        b.switch_to_block(entry);
        let s = b.const64(start);
        b.upsilon(s, i);
        b.jump(Some(header));

        b.switch_to_block(body);
        let two = b.const64(2);
        let t = b.binary(Opcode::Mul, i, two);
        let u = b.binary(Opcode::Add, t, i);
        let step = b.const64(step);
        let next = b.binary(Opcode::Add, i, step);
        b.upsilon(next, i);
        b.jump(Some(header));

        b.switch_to_block(exit);
        b.return_(None);

        (proc, [i, t, u])
    }

    fn trip_count(start: i64, cmp: Opcode, bound: i64, step: i64) -> u32 {
        let (mut proc, _) = counted_loop(start, cmp, bound, step);
        let loops = LoopAnalysis::new(&mut proc);
        let phi_children = PhiChildren::new(&proc);
        let se = ScalarEvolution::new(&proc, &loops, &phi_children);

        let l = loops.top_level_loops()[0];
        let exiting = loops.get_exiting_block(&proc, l).unwrap();
        se.small_constant_trip_count(l, exiting)
    }

    #[test]
    fn affine_expressions() {
        let (mut proc, [i, t, u]) = counted_loop(3, Opcode::NotEqual, 100, 1);
        let loops = LoopAnalysis::new(&mut proc);
        let phi_children = PhiChildren::new(&proc);
        let se = ScalarEvolution::new(&proc, &loops, &phi_children);

        let l = loops.top_level_loops()[0];
        let iteration = Atom::Iteration(l);

        let i = se.scev(i).unwrap();
        assert_eq!(i.constant_part(), 3);
        assert_eq!(i.coefficient(iteration), 1);

        let t = se.scev(t).unwrap();
        assert_eq!(t.constant_part(), 6);
        assert_eq!(t.coefficient(iteration), 2);

        let u = se.scev(u).unwrap();
        assert_eq!(se.constant_difference(&u, &t), None);
        assert_eq!(u.sub(&t).unwrap(), i);
        assert_eq!(u.to_string(), "9 + 3*{loop0}");
    }

    #[test]
    fn header_tested_loops_count_the_final_test() {
        assert_eq!(trip_count(0, Opcode::NotEqual, 5000, 1), 5001);
        assert_eq!(trip_count(0, Opcode::LessThan, 10, 1), 11);
        assert_eq!(trip_count(0, Opcode::LessThan, 10, 3), 5);
        assert_eq!(trip_count(0, Opcode::LessEqual, 10, 1), 12);
        assert_eq!(trip_count(10, Opcode::GreaterThan, 0, -1), 11);
        assert_eq!(trip_count(10, Opcode::GreaterEqual, 0, -2), 7);
        assert_eq!(trip_count(5, Opcode::LessThan, 0, 1), 1);
    }

    #[test]
    fn unsolvable_loops_are_unknown() {
        // Steps over the bound and never hits it.
        assert_eq!(trip_count(0, Opcode::NotEqual, 5, 2), 0);
        // Runs away from the bound.
        assert_eq!(trip_count(0, Opcode::LessThan, 10, -1), 0);
        assert_eq!(trip_count(0, Opcode::Below, 10, 1), 0);
        assert_eq!(trip_count(0, Opcode::LessThan, i64::from(u32::MAX) + 5, 1), 0);
    }

    #[test]
    fn symbolic_bound_is_unknown() {
        let mut proc = Procedure::new();
        let entry = proc.add_block();
        let header = proc.add_block();
        let body = proc.add_block();
        let exit = proc.add_block();

        let mut b = BasicBlockBuilder::new(&mut proc, header);
        let i = b.phi(Type::Int64);
        let n = b.argument(0, Type::Int64);
        let cond = b.binary(Opcode::LessThan, i, n);
        b.branch(cond, body, exit);
        b.switch_to_block(entry);
        let zero = b.const64(0);
        b.upsilon(zero, i);
        b.jump(Some(header));
        b.switch_to_block(body);
        let one = b.const64(1);
        let next = b.binary(Opcode::Add, i, one);
        b.upsilon(next, i);
        b.jump(Some(header));
        b.switch_to_block(exit);
        b.return_(None);

        let loops = LoopAnalysis::new(&mut proc);
        let phi_children = PhiChildren::new(&proc);
        let se = ScalarEvolution::new(&proc, &loops, &phi_children);

        let l = loops.top_level_loops()[0];
        assert_eq!(se.small_constant_trip_count(l, header), 0);
        assert!(se.is_scevable(n));
        assert_eq!(se.scev(n), Some(Scev::opaque(n)));
    }
}
