use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use jc_columnar::{ColumnGraph, EventDataset, Expr, Pred, ROOT};
use std::hint::black_box;

fn make_dataset(n: usize) -> EventDataset {
    // Deterministic pseudo-events: two back-to-back jets plus soft activity.
    let mut jet_pt = Vec::with_capacity(n);
    let mut jet_eta = Vec::with_capacity(n);
    let mut met = Vec::with_capacity(n);
    for i in 0..n {
        let lead = 50.0 + (i % 400) as f64;
        jet_pt.push(vec![lead, lead * 0.95, 18.0]);
        jet_eta.push(vec![((i % 26) as f64) * 0.1 - 1.3, 0.4, 2.1]);
        met.push(5.0 + (i % 17) as f64);
    }
    EventDataset::builder()
        .jagged_f64("Jet_pt", jet_pt)
        .jagged_f64("Jet_eta", jet_eta)
        .f64("met", met)
        .build()
        .unwrap()
}

fn bench_shared_graph_eval(c: &mut Criterion) {
    let mut group = c.benchmark_group("columnar_graph");

    for n in [1_000usize, 10_000] {
        let ds = make_dataset(n);
        let mut g = ColumnGraph::new(&ds);
        let d = g.define(ROOT, "lead_pt", Expr::element("Jet_pt", 0)).unwrap();
        let d = g.define(d, "sublead_pt", Expr::element("Jet_pt", 1)).unwrap();
        let d = g.define(d, "avg_pt", Expr::formula("0.5 * (lead_pt + sublead_pt)")).unwrap();
        // Many branches sharing the upstream defines.
        let branches: Vec<_> = (0..8)
            .map(|i| {
                g.filter(d, "cut", Pred::formula(&format!("avg_pt > {}", 60 + 20 * i)))
                    .unwrap()
            })
            .collect();
        g.freeze();

        group.bench_with_input(BenchmarkId::new("eight_branches", n), &n, |b, &nn| {
            b.iter(|| {
                let mut cursor = g.cursor();
                let mut survivors = 0u64;
                for row in 0..nn {
                    g.begin_event(&mut cursor, &ds, row);
                    for &branch in &branches {
                        if g.passes(&ds, &mut cursor, branch).unwrap() {
                            survivors += 1;
                        }
                    }
                }
                black_box(survivors)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_shared_graph_eval);
criterion_main!(benches);
