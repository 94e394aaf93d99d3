use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use pitch_radar::config::FitConfig;
use pitch_radar::count_model::fit_count_model;
use pitch_radar::fit::ModelFit;
use pitch_radar::summarize::{histogram, summarize_all};

fn squad_columns(players: usize) -> (Vec<f64>, Vec<f64>) {
    let counts = (0..players).map(|i| (5 + (i * 37) % 60) as f64).collect();
    let minutes = (0..players).map(|i| (450 + (i * 211) % 2700) as f64).collect();
    (counts, minutes)
}

fn fitted_counts(players: usize) -> (ModelFit, FitConfig) {
    let cfg = FitConfig::default().with_budget(1_500, 2_000);
    let (counts, minutes) = squad_columns(players);
    let fit = fit_count_model(&counts, &minutes, &cfg).expect("bench fit");
    (fit, cfg)
}

fn bench_histogram(c: &mut Criterion) {
    let values = (0..6_000).map(|i| ((i * 7919) % 6_000) as f64 / 6_000.0).collect::<Vec<_>>();
    c.bench_function("histogram_25_bins", |b| {
        b.iter(|| black_box(histogram(black_box(&values), 25)))
    });
}

fn bench_summarize_all(c: &mut Criterion) {
    let (fit, cfg) = fitted_counts(60);
    c.bench_function("summarize_all_60_players", |b| {
        b.iter(|| black_box(summarize_all(black_box(&fit), &cfg).expect("summaries")))
    });
}

fn bench_count_fit(c: &mut Criterion) {
    let cfg = FitConfig::default().with_budget(500, 200);
    let (counts, minutes) = squad_columns(25);
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);
    group.bench_function("count_model_500_iterations", |b| {
        b.iter(|| black_box(fit_count_model(&counts, &minutes, &cfg).expect("fit")))
    });
    group.finish();
}

criterion_group!(perf, bench_histogram, bench_summarize_all, bench_count_fit);
criterion_main!(perf);
