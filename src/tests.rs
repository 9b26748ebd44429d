use crate::{
    self as loopcost,
    kernels::{self, Bound, LoopOrder},
    loop_cost::STATIC_TRIP_COUNT,
    AccessOrder, CacheModel, Error, LoopAnalysis, LoopCosts, Opcode, Options, Procedure, Type,
    UNKNOWN_COST,
};

fn assert_close(actual: f64, expected: f64) {
    let error = ((actual - expected) / expected).abs();
    assert!(
        error < 1e-4,
        "expected about {}, got {} (relative error {})",
        expected,
        actual,
        error
    );
}

fn run(proc: &mut Procedure, options: &Options) -> LoopCosts {
    loopcost::compute_loop_costs(proc, options).expect("procedure is well formed")
}

fn cost_of(costs: &LoopCosts, name: &str) -> f64 {
    let l = costs
        .loop_named(name)
        .unwrap_or_else(|| panic!("no loop named {}", name));
    costs.loop_cost_of(l)
}

fn trip_count_of(costs: &LoopCosts, name: &str) -> Option<u32> {
    costs.loop_named(name).and_then(|l| costs.trip_count_of(l))
}

#[test]
fn test_matmul() {
    let mut proc = kernels::matmul(5000, LoopOrder::Ijk);
    let costs = run(&mut proc, &Options::default());

    for name in ["for.cond", "for.cond1", "for.cond4"] {
        assert_eq!(trip_count_of(&costs, name), Some(5001));
    }

    assert_close(cost_of(&costs, "for.cond4"), 1.5637e11);
    assert_close(cost_of(&costs, "for.cond1"), 6.2563e10);
    assert_close(cost_of(&costs, "for.cond"), 2.5018e11);

    let others = 5001.0 * 5001.0;
    assert_eq!(cost_of(&costs, "for.cond4"), 6252.25 * others);
    assert_eq!(cost_of(&costs, "for.cond1"), 2501.5 * others);
    assert_eq!(cost_of(&costs, "for.cond"), 10003.0 * others);

    // c[i][j] is read and written through two address computations that share a group.
    assert_eq!(costs.reference_groups().len(), 1);
    assert_eq!(costs.reference_groups()[0].len(), 3);
}

#[test]
fn test_matmul_dumps() {
    let mut proc = kernels::matmul(5000, LoopOrder::Ijk);
    let costs = run(&mut proc, &Options::default());

    assert_eq!(
        costs.display_costs().to_string(),
        "Printing Loop Costs: \n\
         Loop: for.cond\tCosts: 2.501750e+11\n\
         Loop: for.cond1\tCosts: 6.256252e+10\n\
         Loop: for.cond4\tCosts: 1.563688e+11\n"
    );
    assert_eq!(
        costs.display_trip_counts().to_string(),
        "Printing Trip Counts: \n\
         Loop: for.cond\tTripCount: 5001\n\
         Loop: for.cond1\tTripCount: 5001\n\
         Loop: for.cond4\tTripCount: 5001\n"
    );
}

#[test]
fn test_column_major() {
    let mut proc = kernels::matmul(5000, LoopOrder::Ijk);
    let options = Options {
        access_order: AccessOrder::ColumnMajor,
        ..Options::default()
    };
    let costs = run(&mut proc, &options);

    // The discount moves from the last index to the second one: i now walks c and a
    // contiguously, j walks both c and b with a stride.
    let others = 5001.0 * 5001.0;
    assert_eq!(cost_of(&costs, "for.cond"), 2501.5 * others);
    assert_eq!(cost_of(&costs, "for.cond1"), 10003.0 * others);
    assert_eq!(cost_of(&costs, "for.cond4"), 6252.25 * others);
}

#[test]
fn test_loop_orders() {
    // With 100 iterations per loop, the loop walking i, j or k costs the same wherever it sits.
    let expected = [201.0 * 10000.0, 51.0 * 10000.0, 126.0 * 10000.0];
    let headers = ["for.cond", "for.cond1", "for.cond4"];

    for order in LoopOrder::ALL {
        let mut proc = kernels::matmul(99, order);
        let costs = run(&mut proc, &Options::default());

        for (variable, level) in order.levels().iter().enumerate() {
            assert_eq!(
                cost_of(&costs, headers[*level]),
                expected[variable],
                "{} order, variable {}",
                order,
                variable
            );
        }
    }
}

#[test]
fn test_line_size() {
    let mut proc = kernels::matmul(99, LoopOrder::Ijk);
    let options = Options {
        cache: CacheModel::with_line_size(1).unwrap(),
        ..Options::default()
    };
    let costs = run(&mut proc, &options);

    // Contiguous and strided walks cost the same with one element per line.
    assert_eq!(cost_of(&costs, "for.cond"), 201.0 * 10000.0);
    assert_eq!(cost_of(&costs, "for.cond1"), 201.0 * 10000.0);
    assert_eq!(cost_of(&costs, "for.cond4"), 201.0 * 10000.0);

    assert_eq!(CacheModel::with_line_size(0), Err(Error::ZeroLineSize));
}

#[test]
fn test_idempotence() {
    let mut proc = kernels::matmul(1000, LoopOrder::Kij);
    let first = run(&mut proc, &Options::default());
    let second = run(&mut proc, &Options::default());

    assert_eq!(first, second);
    assert_eq!(
        first.display_costs().to_string(),
        second.display_costs().to_string()
    );
    assert_eq!(
        first.trip_counts().collect::<Vec<_>>(),
        second.trip_counts().collect::<Vec<_>>()
    );
}

#[test]
fn test_imperfect_nest() {
    let mut proc = kernels::imperfect_nest(99);
    let costs = run(&mut proc, &Options::default());
    let loops = LoopAnalysis::new(&mut proc);
    let outer = loops.top_level_loops()[0];
    let inner = loops.get_sub_loops(outer)[0];

    assert_eq!(costs.loop_cost_of(outer), UNKNOWN_COST);
    assert_eq!(costs.cost(outer), None);
    assert_eq!(costs.trip_count_of(outer), None);

    // s[i] is loop invariant, a[i][j] is walked contiguously.
    assert_eq!(costs.cost(inner), Some(1.0 + 100.0 / 4.0));
    assert_eq!(costs.trip_count_of(inner), Some(100));
}

#[test]
fn test_rotated_loop() {
    let mut proc = kernels::rotated_loop(99);
    let costs = run(&mut proc, &Options::default());
    let loops = LoopAnalysis::new(&mut proc);

    assert!(costs.is_empty());
    assert_eq!(costs.loop_cost_of(loops.top_level_loops()[0]), UNKNOWN_COST);
    assert_eq!(
        costs.display_costs().to_string(),
        "Printing Loop Costs: (empty)\n"
    );
}

#[test]
fn test_side_effecting_header() {
    let mut proc = kernels::side_effecting_header(99);
    let costs = run(&mut proc, &Options::default());
    let loops = LoopAnalysis::new(&mut proc);

    assert!(costs.is_empty());
    for l in loops.get_loops_in_pre_order(loops.top_level_loops()[0]) {
        assert_eq!(costs.loop_cost_of(l), UNKNOWN_COST);
    }
}

#[test]
fn test_sibling_loops() {
    let mut proc = kernels::sibling_loops(99);
    let costs = run(&mut proc, &Options::default());
    let loops = LoopAnalysis::new(&mut proc);
    let outer = loops.top_level_loops()[0];

    assert_eq!(costs.loop_cost_of(outer), UNKNOWN_COST);
    assert_eq!(costs.trip_count_of(outer), None);

    // Each sub-loop is costed as a nest of one.
    for name in ["for.cond1", "for.cond5"] {
        assert_eq!(trip_count_of(&costs, name), Some(100));
        assert_eq!(cost_of(&costs, name), 25.0);
    }
    assert_eq!(costs.reference_groups().len(), 2);
}

#[test]
fn test_branching_body() {
    let mut proc = kernels::branching_body(99);
    let costs = run(&mut proc, &Options::default());

    for name in ["for.cond", "for.cond1"] {
        assert_eq!(cost_of(&costs, name), UNKNOWN_COST);
        assert_eq!(trip_count_of(&costs, name), None);
    }
    assert!(costs.costs().all(|(_, cost)| cost == UNKNOWN_COST));
    assert_eq!(costs.trip_counts().count(), 0);
    assert!(costs.reference_groups().is_empty());
    assert_eq!(
        costs.display_trip_counts().to_string(),
        "Printing Trip Counts: (empty)\n"
    );
}

/// `for (i = 0; i != 100; i += 2) for (j = 0; j != 10; ++j) a[i][j] += 1;`
fn strided_outer_loop() -> Procedure {
    let mut proc = Procedure::new();
    let entry = proc.add_named_block("entry");
    let outer = proc.add_named_block("for.cond");
    let outer_body = proc.add_named_block("for.body");
    let inner = proc.add_named_block("for.cond1");
    let inner_body = proc.add_named_block("for.body3");
    let inner_latch = proc.add_named_block("for.inc");
    let inner_end = proc.add_named_block("for.end");
    let outer_latch = proc.add_named_block("for.inc5");
    let outer_end = proc.add_named_block("for.end7");

    let mut b = loopcost::BasicBlockBuilder::new(&mut proc, outer);
    let i = b.phi(Type::Int64);
    b.switch_to_block(inner);
    let j = b.phi(Type::Int64);

    b.switch_to_block(entry);
    let array = b.argument(0, crate::typ::pointer_type());
    let zero = b.const64(0);
    b.upsilon(zero, i);
    b.jump(Some(outer));

    b.switch_to_block(outer);
    let n = b.const64(100);
    let cond = b.binary(Opcode::NotEqual, i, n);
    b.branch(cond, outer_body, outer_end);

    b.switch_to_block(outer_body);
    let zero = b.const64(0);
    b.upsilon(zero, j);
    b.jump(Some(inner));

    b.switch_to_block(inner);
    let m = b.const64(10);
    let cond = b.binary(Opcode::NotEqual, j, m);
    b.branch(cond, inner_body, inner_end);

    b.switch_to_block(inner_body);
    let zero = b.const64(0);
    let address = b.element_address(array, &[zero, i, j]);
    let value = b.load(Type::Int32, address);
    let one = b.const32(1);
    let sum = b.binary(Opcode::Add, value, one);
    b.store(sum, address);
    b.jump(Some(inner_latch));

    b.switch_to_block(inner_latch);
    let one = b.const64(1);
    let next = b.binary(Opcode::Add, j, one);
    b.upsilon(next, j);
    b.jump(Some(inner));

    b.switch_to_block(inner_end);
    b.jump(Some(outer_latch));

    b.switch_to_block(outer_latch);
    let two = b.const64(2);
    let next = b.binary(Opcode::Add, i, two);
    b.upsilon(next, i);
    b.jump(Some(outer));

    b.switch_to_block(outer_end);
    b.return_(None);

    proc
}

#[test]
fn test_missing_induction_variable() {
    let mut proc = strided_outer_loop();
    let costs = run(&mut proc, &Options::default());

    // Stepping by two is not a canonical induction variable, but the trip count is still known.
    assert_eq!(cost_of(&costs, "for.cond"), UNKNOWN_COST);
    assert_eq!(trip_count_of(&costs, "for.cond"), Some(51));

    assert_eq!(trip_count_of(&costs, "for.cond1"), Some(11));
    assert_eq!(cost_of(&costs, "for.cond1"), 11.0 / 4.0 * 51.0);
}

#[test]
fn test_trip_count_fallback() {
    let mut proc = kernels::symbolic_bounds(99);
    let costs = run(&mut proc, &Options::default());

    // The inner loop takes its only neighbour's count.
    assert_eq!(trip_count_of(&costs, "for.cond"), Some(100));
    assert_eq!(trip_count_of(&costs, "for.cond1"), Some(100));
    assert_eq!(cost_of(&costs, "for.cond1"), 25.0 * 100.0);
    assert_eq!(cost_of(&costs, "for.cond"), 100.0 * 100.0);

    let mut proc = kernels::counted_nest(&[
        Bound::Constant(9),
        Bound::Argument(1),
        Bound::Constant(29),
    ]);
    let costs = run(&mut proc, &Options::default());
    assert_eq!(
        costs.trip_counts().map(|(_, count)| count).collect::<Vec<_>>(),
        [10, 20, 30]
    );

    let mut proc = kernels::counted_nest(&[Bound::Argument(1), Bound::Argument(2)]);
    let costs = run(&mut proc, &Options::default());
    assert_eq!(
        costs.trip_counts().map(|(_, count)| count).collect::<Vec<_>>(),
        [STATIC_TRIP_COUNT, STATIC_TRIP_COUNT]
    );
}

#[test]
fn test_single_loop() {
    let mut proc = kernels::counted_nest(&[Bound::Constant(99)]);
    let costs = run(&mut proc, &Options::default());

    assert_eq!(trip_count_of(&costs, "for.cond"), Some(100));
    assert_eq!(cost_of(&costs, "for.cond"), 25.0);

    let mut proc = kernels::counted_nest(&[Bound::Argument(1)]);
    let costs = run(&mut proc, &Options::default());
    assert_eq!(trip_count_of(&costs, "for.cond"), Some(STATIC_TRIP_COUNT));
    assert_eq!(cost_of(&costs, "for.cond"), 250.0);
}

#[test]
fn test_malformed_procedures() {
    let mut proc = Procedure::new();
    assert_eq!(
        loopcost::compute_loop_costs(&mut proc, &Options::default()),
        Err(Error::EmptyProcedure)
    );

    let mut proc = Procedure::new();
    let entry = proc.add_block();
    let mut b = loopcost::BasicBlockBuilder::new(&mut proc, entry);
    b.const64(1);
    assert_eq!(
        loopcost::compute_loop_costs(&mut proc, &Options::default()),
        Err(Error::MissingTerminal { block: entry })
    );
}
