//! Integration tests exercising the full frame pipeline:
//! lattice → evidence → field update → gain schedule → edge extraction.

use ef_core::{
    EdgePipeline, EvidenceGenerator, EvidenceStrategy, FieldEstimator, GainScheduler, Lattice,
    PhaseSignature, PipelineConfig, Region, ScaleLadder, Spacing,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn rng() -> SmallRng {
    SmallRng::seed_from_u64(42)
}

fn vertical_step(size: usize, at: usize) -> Lattice {
    Lattice::from_fn(size, |x, _| if x >= at { 1.0 } else { 0.0 }).unwrap()
}

fn noisy_step(size: usize, at: usize, amplitude: f64, rng: &mut SmallRng) -> Lattice {
    Lattice::from_fn(size, |x, _| {
        let base = if x >= at { 0.8 } else { 0.2 };
        base + rng.random_range(-amplitude..amplitude)
    })
    .unwrap()
}

/// Five identical frames of a vertical step: a narrow band forms on the step
/// and strengthens monotonically instead of flickering.
#[test]
fn step_edge_band_converges_without_flicker() {
    let n = 64;
    let mut pipeline = EdgePipeline::new(n, PipelineConfig::default()).unwrap();
    let frame = vertical_step(n, 32);

    let mut band_history = Vec::new();
    let mut last = None;
    for _ in 0..5 {
        let out = pipeline.process(&frame).unwrap();
        assert_eq!(out.schedule.region, Region::Static);
        band_history.push(out.edges.get(31, n / 2));
        last = Some(out);
    }

    for pair in band_history.windows(2) {
        assert!(pair[1] >= pair[0], "band flickered: {band_history:?}");
    }
    let edges = last.unwrap().edges;
    assert!(edges.get(31, n / 2) > 0.3, "band too weak: {band_history:?}");

    for y in 0..n {
        let lit: Vec<usize> = (0..n).filter(|&x| edges.get(x, y) > 0.0).collect();
        assert!(
            (2..=3).contains(&lit.len()),
            "row {y}: expected a 2-3 px band, got columns {lit:?}"
        );
        assert!(lit.iter().all(|x| (30..=33).contains(x)), "row {y}: band off-centre {lit:?}");
    }
}

/// Per-pixel noise makes raw evidence flicker; φ moves far less per frame.
#[test]
fn field_damps_evidence_flicker() {
    let mut rng = rng();
    let n = 32;
    let ladder = ScaleLadder::generate(0.5, 4.0, 3, Spacing::Dyadic).unwrap();
    let generator = EvidenceGenerator::new(
        EvidenceStrategy::Sobel,
        &ladder,
        PhaseSignature::default(),
        0.0,
        1.0,
    )
    .unwrap();
    let config = PipelineConfig::default();
    let mut estimator = FieldEstimator::new(n, ladder, 0.0).unwrap();
    let mut scheduler = GainScheduler::new(
        config.scheduler.clone(),
        ef_core::Gains::new(1.0, 1.0, 0.5),
        PhaseSignature::default(),
    );

    let mut previous_evidence: Option<Vec<f64>> = None;
    let mut evidence_change = 0.0;
    let mut field_change = 0.0;
    for t in 0..20 {
        let lattice = noisy_step(n, 16, 0.05, &mut rng);
        let evidence = generator.generate(&lattice);
        let stats = estimator
            .update(t, &evidence, &scheduler.gains(), config.estimator.learning_rate)
            .unwrap();
        scheduler.schedule(&estimator, &evidence);

        let current = evidence.layers()[0].magnitude.clone();
        if let Some(prev) = &previous_evidence
            && t >= 10
        {
            evidence_change += current
                .iter()
                .zip(prev)
                .map(|(a, b)| (a - b).abs())
                .sum::<f64>()
                / current.len() as f64;
            field_change += stats.mean_change;
        }
        previous_evidence = Some(current);
    }

    assert!(
        field_change < 0.5 * evidence_change,
        "field change {field_change} vs evidence change {evidence_change}"
    );
    let gains = scheduler.gains();
    assert!((0.1..=3.0).contains(&gains.c));
}

/// Separate pipelines own separate state; identical inputs give identical output.
#[test]
fn pipelines_are_independent_and_deterministic() {
    let n = 16;
    let mut a = EdgePipeline::new(n, PipelineConfig::default()).unwrap();
    let mut b = EdgePipeline::new(n, PipelineConfig::default()).unwrap();
    let mut c = EdgePipeline::new(n, PipelineConfig::default()).unwrap();

    let step = vertical_step(n, 8);
    let flat = Lattice::square(n, vec![0.5; n * n]).unwrap();

    for _ in 0..4 {
        let out_a = a.process(&step).unwrap();
        let out_b = b.process(&flat).unwrap();
        let out_c = c.process(&step).unwrap();
        assert_eq!(out_a.edges, out_c.edges);
        assert_eq!(out_b.edges.edge_pixels(), 0);
    }
    assert_eq!(a.scheduler().gains(), c.scheduler().gains());
}

/// Wavelet evidence feeds a windowed coherence score into the scheduler:
/// neutral on the first frame, always within [0, 1] afterwards.
#[test]
fn wavelet_pipeline_calibrates_coherence() {
    let mut rng = rng();
    let n = 24;
    let mut config = PipelineConfig::default();
    config.evidence.strategy = EvidenceStrategy::Wavelet;
    config.ladder.count = 3;
    let mut pipeline = EdgePipeline::new(n, config).unwrap();

    let first = pipeline.process(&noisy_step(n, 12, 0.1, &mut rng)).unwrap();
    assert_eq!(first.schedule.coherence, 0.5, "cold start should be neutral");

    for _ in 0..6 {
        let out = pipeline.process(&noisy_step(n, 12, 0.1, &mut rng)).unwrap();
        assert!((0.0..=1.0).contains(&out.schedule.coherence));
        assert!(out.edges.values.iter().all(|v| (0.0..=1.0).contains(v)));
    }
    assert!(pipeline.scheduler().coherence_range().len() >= 1);
}

/// A config document selects the strategy and ladder end to end.
#[test]
fn toml_config_drives_pipeline() {
    let config: PipelineConfig = toml::from_str(
        r#"
        [ladder]
        min = 1.0
        max = 5.0
        count = 8
        spacing = "golden"

        [estimator]
        extract_threshold = 0.15
        "#,
    )
    .unwrap();
    let mut pipeline = EdgePipeline::new(16, config).unwrap();
    assert_eq!(pipeline.estimator().ladder().len(), 4);
    let out = pipeline.process(&vertical_step(16, 8)).unwrap();
    assert_eq!(out.edges.edge_pixels(), 0, "one frame cannot clear 0.15 yet");
    for _ in 0..3 {
        pipeline.process(&vertical_step(16, 8)).unwrap();
    }
    assert!(pipeline.estimator().latest_edges(0.15).unwrap().edge_pixels() > 0);
}
