//! End-to-end engine behaviour against synthetic oracles.

use std::sync::Arc;

use async_trait::async_trait;
use qcut_core::engine::{CancelToken, CutJob, DirectExecutor, EngineSettings, ReconstructionEngine};
use qcut_core::{
    CalibrationSettings, CutBasis, CutConstraints, CutError, ExecutionOracle, FragmentRequest,
    Observable, OracleError, OracleResult, PlanTag, SamplingPlanCache, calibrate,
};
use qcut_ir::{Circuit, InstructionKind, NoiseModel, QubitId, StandardGate};

/// Deterministic, circuit-dependent value in [-1, 1].
///
/// The value is a smooth function of the rotation angles and the number of
/// Z and signed-measurement instructions, so every basis term contributes
/// something different.
struct Landscape;

#[async_trait]
impl ExecutionOracle for Landscape {
    fn name(&self) -> &str {
        "landscape"
    }

    async fn execute(&self, request: &FragmentRequest) -> OracleResult<f64> {
        let mut phase = 0.3 * (request.observable.qubits().len() as f64);
        let mut weight = 1.0;
        for inst in request.circuit.instructions() {
            match &inst.kind {
                InstructionKind::Gate(StandardGate::Rz(t)) => phase += t,
                InstructionKind::Gate(StandardGate::Z) => weight = -weight,
                InstructionKind::SignedMeasure => weight *= 0.6,
                _ => {}
            }
        }
        Ok(weight * phase.cos())
    }
}

struct Broken;

#[async_trait]
impl ExecutionOracle for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn execute(&self, _request: &FragmentRequest) -> OracleResult<f64> {
        Err(OracleError::Execution("device offline".into()))
    }
}

fn job(gates: usize) -> CutJob {
    let mut c = Circuit::with_size("ladder", 6);
    for q in 0..6 {
        c.h(QubitId(q)).unwrap();
    }
    for i in 0..gates {
        c.rz(0.2 * (i + 1) as f64, QubitId(2)).unwrap();
        c.cz(QubitId(2), QubitId(3)).unwrap();
    }
    let constraints = CutConstraints {
        max_fragment_qubits: 3,
        min_fragment_qubits: 3,
        max_fragment_depth: None,
        max_cuts: 4,
    };
    let obs = Observable::z_product([QubitId(2), QubitId(3)]);
    CutJob::prepare(&c, &constraints, CutBasis::Rzz, &obs, NoiseModel::IDEAL).unwrap()
}

fn engine(seed: u64, workers: usize) -> ReconstructionEngine {
    ReconstructionEngine::new(EngineSettings { seed, workers }, 0xC0FFEE, CancelToken::new())
}

#[tokio::test]
async fn sampled_estimate_converges_to_exact_sum() {
    let job = job(2);
    let exec = DirectExecutor::new(Arc::new(Landscape));
    let exact = engine(7, 8).exact_expectation(&job, &exec).await.unwrap();

    // Mean absolute error over eight seeds, per sample count.
    let counts = [200_u64, 2_000, 20_000];
    let mut errors = Vec::new();
    let mut std_errors = Vec::new();
    for &n in &counts {
        let mut total = 0.0;
        let mut se = 0.0;
        for seed in 0..8 {
            let summary = engine(seed, 8).estimate(&job, &exec, n).await.unwrap();
            let err = (summary.stats.mean() - exact).abs();
            se = summary.stats.std_error();
            assert!(err < 5.0 * se, "n {n} seed {seed}: error {err} vs se {se}");
            total += err;
        }
        errors.push(total / 8.0);
        std_errors.push(se);
    }

    for w in std_errors.windows(2) {
        let ratio = w[0] / w[1];
        assert!((2.5..4.0).contains(&ratio), "se ratio {ratio}, expected about √10");
    }
    assert!(
        errors[2] < errors[0],
        "errors {errors:?} did not shrink with the sample count"
    );
}

#[tokio::test]
async fn estimate_is_bit_identical_across_worker_counts() {
    let job = job(2);
    let exec = DirectExecutor::new(Arc::new(Landscape));
    let serial = engine(3, 1).estimate(&job, &exec, 500).await.unwrap();
    let wide = engine(3, 32).estimate(&job, &exec, 500).await.unwrap();
    assert_eq!(serial.stats.mean().to_bits(), wide.stats.mean().to_bits());
    assert_eq!(serial.stats.variance().to_bits(), wide.stats.variance().to_bits());
    assert_eq!(serial.oracle_calls, wide.oracle_calls);

    let other_seed = engine(4, 8).estimate(&job, &exec, 500).await.unwrap();
    assert_ne!(serial.stats.mean().to_bits(), other_seed.stats.mean().to_bits());
}

#[tokio::test]
async fn pilot_draws_are_independent_of_production_draws() {
    let job = job(1);
    let exec = DirectExecutor::new(Arc::new(Landscape));
    let eng = engine(9, 4);
    let pilot = eng.for_pilot();
    assert_ne!(pilot.config_id(), eng.config_id());

    let mut production = Vec::new();
    let mut piloted = Vec::new();
    for i in 0..16 {
        production.push(eng.run_draw(&job, &exec, i).await.unwrap().assignment);
        piloted.push(pilot.run_draw(&job, &exec, i).await.unwrap().assignment);
    }
    assert_ne!(production, piloted);
}

#[tokio::test]
async fn double_failure_voids_the_estimate() {
    let job = job(1);
    let exec = DirectExecutor::new(Arc::new(Broken));
    let err = engine(1, 2).estimate(&job, &exec, 10).await.unwrap_err();
    match err {
        CutError::ExecutionFailure {
            draw_index,
            assignment,
            source,
        } => {
            assert_eq!(draw_index, 0);
            assert_eq!(assignment.0.len(), 1);
            assert!(source.to_string().contains("device offline"));
        }
        other => panic!("expected ExecutionFailure, got {other}"),
    }
}

#[tokio::test]
async fn calibrated_plan_meets_target_when_run() {
    let job = job(1);
    let exec = DirectExecutor::new(Arc::new(Landscape));
    let eng = engine(21, 8);
    let settings = CalibrationSettings {
        target_precision: 0.1,
        pilot_samples: 400,
        sample_ceiling: 1_000_000,
    };
    let tag = PlanTag::for_job(&job, settings.target_precision);
    let plan = calibrate(tag, &job, &eng, &exec, &settings).await.unwrap();
    assert!(!plan.under_budget);
    assert!((plan.kappa - 9.0).abs() < 1e-9);

    let summary = eng.estimate(&job, &exec, plan.samples).await.unwrap();
    // Pilot variance is itself an estimate; allow some slack.
    assert!(summary.stats.std_error() < 1.5 * settings.target_precision);
}

#[tokio::test]
async fn shared_cache_calibrates_each_tag_once() {
    let job = Arc::new(job(1));
    let cache = SamplingPlanCache::new();
    let settings = CalibrationSettings {
        target_precision: 0.05,
        pilot_samples: 50,
        sample_ceiling: 100_000,
    };
    let tag = PlanTag::for_job(&job, settings.target_precision);

    let mut handles = Vec::new();
    for _ in 0..6 {
        let cache = cache.clone();
        let job = job.clone();
        let tag = tag.clone();
        handles.push(tokio::spawn(async move {
            let key = tag.clone();
            cache
                .get_or_calibrate(&key, move || async move {
                    let exec = DirectExecutor::new(Arc::new(Landscape));
                    calibrate(tag, &job, &engine(5, 4), &exec, &settings).await
                })
                .await
                .unwrap()
        }));
    }
    let mut samples = Vec::new();
    for h in handles {
        samples.push(h.await.unwrap().samples);
    }
    assert!(samples.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(cache.snapshot().await.len(), 1);
}
