use pitch_radar::adj_pass_model::{PassColumns, fit_adj_pass_model};
use pitch_radar::config::FitConfig;
use pitch_radar::count_model::fit_count_model;
use pitch_radar::dispatch::{ModelInput, estimate};
use pitch_radar::error::ModelError;
use pitch_radar::expected_model::fit_expected_model;
use pitch_radar::fit::{ModelFit, ModelKind};
use pitch_radar::per90_model::combine_per90;
use pitch_radar::success_model::fit_success_model;

fn quick() -> FitConfig {
    FitConfig::default().with_budget(3_000, 400)
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

#[test]
fn count_model_skips_players_without_minutes() {
    let fit = fit_count_model(&[10.0, 0.0, 30.0], &[900.0, 0.0, 900.0], &quick()).expect("count fit");
    assert_eq!(fit.kind(), ModelKind::Count);
    assert_eq!(fit.observed(), &[true, false, true]);
    assert_eq!(fit.samples().columns(), 2);
    assert_eq!(fit.samples().draws(), 400);
    assert!(fit.samples().flat().iter().all(|v| *v > 0.0));
    assert!(matches!(
        fit.player_samples(1),
        Err(ModelError::UnknownPlayer { index: 1 })
    ));
}

#[test]
fn filtered_rows_do_not_change_the_fit() {
    let cfg = quick().with_seed(7);
    let with_gap = fit_count_model(&[10.0, 0.0, 30.0], &[900.0, 0.0, 900.0], &cfg).expect("fit");
    let compact = fit_count_model(&[10.0, 30.0], &[900.0, 900.0], &cfg).expect("fit");
    assert!(compact.observed().iter().all(|o| *o));
    assert_eq!(with_gap.samples(), compact.samples());
}

#[test]
fn same_seed_same_draws() {
    let cfg = quick().with_seed(11);
    let a = fit_success_model(&[40.0, 12.0, 70.0], &[50.0, 20.0, 80.0], &cfg).expect("fit");
    let b = fit_success_model(&[40.0, 12.0, 70.0], &[50.0, 20.0, 80.0], &cfg).expect("fit");
    assert_eq!(a, b);
}

#[test]
fn success_draws_are_percentages_ordered_by_rate() {
    let fit = fit_success_model(&[45.0, 0.0, 20.0, 9.0], &[50.0, 0.0, 40.0, 30.0], &quick())
        .expect("success fit");
    assert_eq!(fit.observed(), &[true, false, true, true]);
    assert!(fit.samples().flat().iter().all(|v| *v > 0.0 && *v < 100.0));
    let best = mean(fit.player_samples(0).unwrap());
    let worst = mean(fit.player_samples(3).unwrap());
    assert!(best > worst, "{best} !> {worst}");
}

#[test]
fn per90_is_drawwise_product_on_shared_players() {
    let cfg = quick();
    let expected = fit_expected_model(&[4.2, 0.0, 1.1, 2.5], &[38.0, 5.0, 14.0, 22.0], &cfg).expect("xSpA");
    let count = fit_count_model(&[30.0, 12.0, 0.0, 25.0], &[900.0, 900.0, 0.0, 900.0], &cfg).expect("count");
    let per90 = combine_per90(&expected, &count).expect("xSp90");

    assert_eq!(per90.kind(), ModelKind::ExpectedPer90);
    assert_eq!(per90.observed(), &[true, false, false, true]);
    assert_eq!(per90.samples().columns(), 2);
    for row in [0, 3] {
        let x = expected.player_samples(row).unwrap();
        let c = count.player_samples(row).unwrap();
        let p = per90.player_samples(row).unwrap();
        for k in 0..p.len() {
            assert_eq!(p[k], x[k] * c[k]);
        }
    }
}

#[test]
fn per90_rejects_parents_in_wrong_order() {
    let cfg = quick();
    let count = fit_count_model(&[3.0, 8.0], &[900.0, 900.0], &cfg).expect("count");
    let expected = fit_expected_model(&[0.5, 1.5], &[6.0, 10.0], &cfg).expect("xSpA");
    let err = combine_per90(&count, &expected).unwrap_err();
    assert!(matches!(err, ModelError::InputShape(_)));
}

#[test]
fn adj_pass_blend_sits_between_components() {
    let passes = PassColumns::from_pairs([&[5.0, 3.0], &[20.0, 15.0]], [&[10.0, 8.0], &[40.0, 30.0]]);
    let fit = fit_adj_pass_model(passes, &quick()).expect("adj_pass fit");
    let ModelFit::AdjPass(adj) = &fit else {
        panic!("expected adj_pass fit, got {}", fit.kind());
    };

    let expected_tendency = (10.0 / 40.0 + 8.0 / 30.0) / 2.0;
    assert!((adj.long_tendency - expected_tendency).abs() < 1e-12);
    for col in 0..2 {
        let blend = mean(adj.samples.column(col));
        let (s, l) = (adj.short_means[col], adj.long_means[col]);
        assert!(blend >= s.min(l) - 1e-9 && blend <= s.max(l) + 1e-9);
        let direct = adj.long_tendency * l + (1.0 - adj.long_tendency) * s;
        assert!((blend - direct).abs() < 1e-9);
    }
}

#[test]
fn adj_pass_drops_players_without_long_completions() {
    let passes = PassColumns::from_pairs(
        [&[5.0, 0.0, 3.0], &[20.0, 11.0, 15.0]],
        [&[10.0, 2.0, 8.0], &[40.0, 25.0, 30.0]],
    );
    let fit = fit_adj_pass_model(passes, &quick()).expect("adj_pass fit");
    assert_eq!(fit.observed(), &[true, false, true]);
    assert!(fit.samples().flat().iter().all(|p| *p > 0.0 && *p < 1.0));
}

#[test]
fn dispatch_checks_kind_then_shape() {
    let cfg = quick();
    let err = estimate(ModelInput::Columns(&[1.0], &[90.0]), "goals", &cfg).unwrap_err();
    assert!(matches!(err, ModelError::UnsupportedModelKind(_)));
    assert!(err.to_string().contains("'goals'"));

    let err = estimate(ModelInput::Columns(&[1.0], &[10.0]), "adj_pass", &cfg).unwrap_err();
    assert!(err.to_string().contains("attempted long passes"));

    let fit = estimate(ModelInput::Columns(&[4.0, 9.0], &[900.0, 900.0]), "count", &cfg).expect("count");
    assert_eq!(fit.kind(), ModelKind::Count);
}
