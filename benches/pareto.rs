//! Benchmarks for Pareto flag computation

#![allow(clippy::cast_precision_loss, clippy::suboptimal_flops)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use qa_pareto_eval::pareto::{pareto_flags, FrontierReport, RunPoint};

fn create_points(n: usize) -> Vec<RunPoint> {
    (0..n)
        .map(|i| {
            let i_f = i as f64;
            let n_f = n as f64;
            // Zig-zag accuracy so roughly half the runs end up dominated
            let wobble = if i % 2 == 0 { 0.0 } else { -15.0 };
            let accuracy_pct = (i_f / n_f).mul_add(60.0, 30.0) + wobble;
            let num_gpus = 1 + (i % 4) as u32;
            let duration_hours = (i_f / n_f).mul_add(4.0, 0.1);

            RunPoint {
                id: format!("model_{i}-{}", if i % 3 == 0 { "no" } else { "en" }),
                base_id: format!("model_{i}"),
                lang: Some(if i % 3 == 0 { "no" } else { "en" }.to_string()),
                family: "other".to_string(),
                param_count_b: i_f,
                accuracy_pct,
                duration_hours,
                num_gpus,
                gpu_hours: duration_hours * f64::from(num_gpus),
            }
        })
        .collect()
}

fn benchmark_pareto_flags(c: &mut Criterion) {
    let mut group = c.benchmark_group("pareto_flags");

    for size in &[10, 50, 100, 500] {
        let points = create_points(*size);

        group.bench_function(format!("flags_{size}_runs"), |b| {
            b.iter(|| pareto_flags(black_box(&points)));
        });
    }

    group.finish();
}

fn benchmark_frontier_report(c: &mut Criterion) {
    let points = create_points(200);
    c.bench_function("frontier_report_200_runs", |b| {
        b.iter(|| FrontierReport::analyze(black_box(&points), &["en", "no"]));
    });
}

criterion_group!(benches, benchmark_pareto_flags, benchmark_frontier_report);
criterion_main!(benches);
