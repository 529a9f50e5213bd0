use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use statechart_layout::config::{LayoutConfig, MeasureConfig};
use statechart_layout::flow_utils::materialize_default;
use statechart_layout::ir::{Direction, EventId, Flow, StateId, StateType, Transition};
use statechart_layout::layout::{
    LayeredSolver, LayoutEngine, SizeMap, build_graph, build_layout_request, flatten,
};
use statechart_layout::measure::Measurer;
use std::hint::black_box;

/// `groups` compound states, each holding a chain of `per_group` leaves with
/// a back edge and a jump into the next group.
fn nested_chain_flow(groups: usize, per_group: usize) -> Flow {
    let mut flow = Flow::new(format!("bench-{groups}-{per_group}"));
    for g in 0..groups {
        let group = format!("g{g}");
        let state = flow.ensure_state(&group, None);
        state.kind = StateType::Compound;
        state.initial_state = Some(StateId::new(format!("g{g}_0")));
        for i in 0..per_group {
            let leaf = format!("g{g}_{i}");
            let state = flow.ensure_state(&leaf, Some(&group));
            if i + 1 < per_group {
                state.transitions.push(go(&format!("g{g}_{}", i + 1)));
            } else {
                state.transitions.push(go(&format!("g{g}_0")));
                if g + 1 < groups {
                    state.transitions.push(go(&format!("g{}_0", g + 1)));
                }
            }
            if i % 3 == 0 {
                state.transitions.push(Transition {
                    event: Some(EventId::new("tick")),
                    ..Transition::default()
                });
            }
        }
    }
    flow.initial_state = Some(StateId::new("g0"));
    flow
}

fn go(target: &str) -> Transition {
    Transition {
        event: Some(EventId::new("next")),
        target: Some(StateId::new(target)),
        ..Transition::default()
    }
}

fn sizes(flow: &Flow) -> SizeMap {
    Measurer::new(MeasureConfig {
        system_fonts: false,
        ..MeasureConfig::default()
    })
    .size_map(flow)
}

const SHAPES: [(usize, usize); 3] = [(3, 4), (6, 8), (10, 12)];

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_graph");
    let config = LayoutConfig::default();
    for (groups, per_group) in SHAPES {
        let flow = nested_chain_flow(groups, per_group);
        let full = materialize_default(&flow);
        let sizes = sizes(&flow);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{groups}x{per_group}")),
            &full,
            |b, full| {
                b.iter(|| {
                    let graph = build_graph(&sizes, black_box(full), Direction::Vertical, &config);
                    black_box(graph.edge_count());
                });
            },
        );
    }
    group.finish();
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    let config = LayoutConfig::default();
    for (groups, per_group) in SHAPES {
        let flow = nested_chain_flow(groups, per_group);
        let sizes = sizes(&flow);
        let request = build_layout_request(&flow, &sizes, &config);
        for engine in [LayoutEngine::Dagre, LayoutEngine::Ranked] {
            let solver = LayeredSolver::new(config.clone()).with_engine(engine);
            group.bench_with_input(
                BenchmarkId::new(format!("{engine:?}").to_lowercase(), format!("{groups}x{per_group}")),
                &request,
                |b, request| {
                    b.iter(|| {
                        let solved = solver.solve(black_box(request.clone())).expect("layout failed");
                        black_box(flatten(&sizes, &solved).len());
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_measure(c: &mut Criterion) {
    let flow = nested_chain_flow(6, 8);
    c.bench_function("measure_flow_6x8", |b| {
        b.iter(|| black_box(sizes(black_box(&flow)).len()));
    });
}

criterion_group!(benches, bench_build, bench_solve, bench_measure);
criterion_main!(benches);
