//! Prediction service: single-flight guard, input check, process run, scan.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dosecast_config::{ArtifactLayout, PredictionPolicy};
use dosecast_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{PredictionError, PredictionResult};
use crate::guard::SingleFlight;
use crate::model::{ArtifactSet, PatientKey, PredictionOutcome, RunState, RunStatus};
use crate::runner::{Invocation, PredictionRunner};
use crate::scanner::ArtifactScanner;

/// Coordinates prediction runs for the whole process.
///
/// Clones share one guard, so at most one external process runs at a time no
/// matter how many handlers hold the service.
#[derive(Clone)]
pub struct PredictionService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    layout: ArtifactLayout,
    policy: PredictionPolicy,
    runner: Arc<dyn PredictionRunner>,
    guard: SingleFlight,
    scanner: ArtifactScanner,
    metrics: Metrics,
    shutdown: CancellationToken,
}

impl PredictionService {
    /// Construct a service over the given layout, policy and runner.
    #[must_use]
    pub fn new(
        layout: ArtifactLayout,
        policy: PredictionPolicy,
        runner: Arc<dyn PredictionRunner>,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                scanner: ArtifactScanner::new(layout.clone()),
                guard: SingleFlight::new(metrics.clone()),
                layout,
                policy,
                runner,
                metrics,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Run a prediction for `patient`, or fail fast with [`PredictionError::Busy`].
    ///
    /// Unless `force` (or the configured rerun flag) is set, a patient whose
    /// prediction images already exist is answered from disk with
    /// [`RunStatus::Exists`] without invoking the process.
    ///
    /// # Errors
    ///
    /// Returns `Busy` when another run holds the slot, `MissingInput` when the
    /// patient has no input data, a process error (`Spawn`, `ProcessFailed`,
    /// `TimedOut`, `Cancelled`) when the run fails, and `NoArtifacts` when the
    /// run succeeded but produced nothing.
    #[instrument(name = "prediction.predict", skip(self, patient), fields(patient = %patient))]
    pub async fn predict(
        &self,
        patient: &PatientKey,
        force: bool,
    ) -> PredictionResult<PredictionOutcome> {
        let Some(permit) = self.inner.guard.try_acquire() else {
            self.inner.metrics.inc_prediction_busy();
            info!("prediction rejected; another run holds the slot");
            return Err(PredictionError::Busy);
        };

        let result = self.predict_exclusive(patient, force).await;
        drop(permit);

        let outcome = match &result {
            Ok(outcome) => outcome.status.as_str(),
            Err(err) => {
                warn!(error = %err, detail = %err.detail(), "prediction failed");
                err.outcome_label()
            }
        };
        self.inner.metrics.inc_prediction_run(outcome);
        result
    }

    async fn predict_exclusive(
        &self,
        patient: &PatientKey,
        force: bool,
    ) -> PredictionResult<PredictionOutcome> {
        let input_dir = self.inner.layout.input_dir(patient.as_str());
        self.ensure_input(patient, input_dir.clone()).await?;

        if !force && !self.inner.policy.rerun_existing {
            let existing = self.scan(patient).await?;
            if !existing.prediction.is_empty() {
                info!(
                    images = existing.prediction.len(),
                    "prediction already exists; skipping run"
                );
                return Ok(PredictionOutcome {
                    patient: patient.clone(),
                    status: RunStatus::Exists,
                    artifacts: existing,
                    elapsed: Duration::ZERO,
                });
            }
        }

        let invocation = Invocation::from_policy(
            &self.inner.policy,
            input_dir,
            self.inner.layout.output_dir(patient.as_str()),
        );
        info!(program = %invocation.program, "starting prediction process");

        let started = Instant::now();
        let run = self.inner.runner.run(&invocation, &self.inner.shutdown).await;
        let elapsed = started.elapsed();
        self.inner.metrics.observe_prediction_duration(elapsed);

        let report = run?.judge(self.inner.policy.stderr_policy)?;
        info!(
            exit_code = ?report.exit_code,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "prediction process finished"
        );

        let artifacts = self.scan(patient).await?;
        if artifacts.is_empty() {
            return Err(PredictionError::NoArtifacts {
                patient: patient.to_string(),
            });
        }
        Ok(PredictionOutcome {
            patient: patient.clone(),
            status: RunStatus::Success,
            artifacts,
            elapsed,
        })
    }

    /// Scan existing artifacts for `patient` without running anything.
    ///
    /// # Errors
    ///
    /// Returns [`PredictionError::NoArtifacts`] when every category is empty.
    pub async fn artifacts(&self, patient: &PatientKey) -> PredictionResult<ArtifactSet> {
        let set = self.scan(patient).await?;
        if set.is_empty() {
            return Err(PredictionError::NoArtifacts {
                patient: patient.to_string(),
            });
        }
        Ok(set)
    }

    /// Whether a run currently holds the slot.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.inner.guard.state()
    }

    /// Directory layout the service reads from.
    #[must_use]
    pub fn layout(&self) -> &ArtifactLayout {
        &self.inner.layout
    }

    /// Kill any in-flight process. Later runs fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    async fn scan(&self, patient: &PatientKey) -> PredictionResult<ArtifactSet> {
        let scanner = self.inner.scanner.clone();
        let patient = patient.clone();
        tokio::task::spawn_blocking(move || scanner.scan(&patient))
            .await
            .map_err(|source| PredictionError::Join {
                operation: "scan",
                source,
            })?
    }

    async fn ensure_input(&self, patient: &PatientKey, input_dir: PathBuf) -> PredictionResult<()> {
        let probe = input_dir.clone();
        let present = tokio::task::spawn_blocking(move || dir_has_entries(&probe))
            .await
            .map_err(|source| PredictionError::Join {
                operation: "input_check",
                source,
            })?
            .map_err(|source| PredictionError::io("input_check", &input_dir, source))?;
        if present {
            Ok(())
        } else {
            Err(PredictionError::MissingInput {
                patient: patient.to_string(),
                path: input_dir,
            })
        }
    }
}

fn dir_has_entries(dir: &Path) -> io::Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ProcessReport;
    use anyhow::Result;
    use async_trait::async_trait;
    use dosecast_config::StderrPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    enum Behaviour {
        /// Wait for `release`, then write prediction images.
        Gated,
        /// Sleep briefly, then write prediction images.
        Sleep(Duration),
        /// Succeed without writing anything.
        Empty,
        /// Fail to start.
        SpawnFailure,
        /// Exit zero but print to stderr.
        NoisySuccess,
        /// Run until cancelled.
        UntilCancelled,
    }

    struct FakeRunner {
        behaviour: Behaviour,
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: Notify,
        release: Notify,
    }

    impl FakeRunner {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                started: Notify::new(),
                release: Notify::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn write_predictions(output_dir: &Path) -> io::Result<()> {
            for category in ["ct", "dose", "prediction"] {
                let dir = output_dir.join(category);
                fs::create_dir_all(&dir)?;
                for slice in 1..=3 {
                    fs::write(dir.join(format!("{category}_slice_{slice}.png")), b"png")?;
                }
            }
            Ok(())
        }

        fn report(stderr: &str) -> ProcessReport {
            ProcessReport {
                exit_code: Some(0),
                success: true,
                stdout: String::new(),
                stderr: stderr.to_string(),
                elapsed: Duration::from_millis(1),
            }
        }
    }

    #[async_trait]
    impl PredictionRunner for FakeRunner {
        async fn run(
            &self,
            invocation: &Invocation,
            cancel: &CancellationToken,
        ) -> PredictionResult<ProcessReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.started.notify_one();

            let result = match &self.behaviour {
                Behaviour::Gated => {
                    self.release.notified().await;
                    Self::write_predictions(&invocation.output_dir)
                        .map(|()| Self::report(""))
                        .map_err(|err| PredictionError::io("fake", &invocation.output_dir, err))
                }
                Behaviour::Sleep(delay) => {
                    tokio::time::sleep(*delay).await;
                    Self::write_predictions(&invocation.output_dir)
                        .map(|()| Self::report(""))
                        .map_err(|err| PredictionError::io("fake", &invocation.output_dir, err))
                }
                Behaviour::Empty => Ok(Self::report("")),
                Behaviour::SpawnFailure => Err(PredictionError::Spawn {
                    program: invocation.program.clone(),
                    source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
                }),
                Behaviour::NoisySuccess => Self::write_predictions(&invocation.output_dir)
                    .map(|()| Self::report("RuntimeWarning: divide by zero"))
                    .map_err(|err| PredictionError::io("fake", &invocation.output_dir, err)),
                Behaviour::UntilCancelled => {
                    cancel.cancelled().await;
                    Err(PredictionError::Cancelled)
                }
            };
            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    struct Fixture {
        _root: TempDir,
        layout: ArtifactLayout,
        metrics: Metrics,
    }

    impl Fixture {
        fn new(patients: &[&str]) -> Result<Self> {
            let root = tempfile::tempdir()?;
            let layout = ArtifactLayout {
                input_root: root.path().join("patients"),
                output_root: root.path().join("predictions"),
                public_base_url: String::new(),
                image_extension: "png".to_string(),
            };
            for patient in patients {
                let dir = layout.input_dir(patient);
                fs::create_dir_all(&dir)?;
                fs::write(dir.join("ct.npy"), b"volume")?;
            }
            Ok(Self {
                _root: root,
                layout,
                metrics: Metrics::new()?,
            })
        }

        fn service(&self, runner: Arc<FakeRunner>, policy: PredictionPolicy) -> PredictionService {
            PredictionService::new(self.layout.clone(), policy, runner, self.metrics.clone())
        }
    }

    #[tokio::test]
    async fn concurrent_request_is_rejected_then_accepted_after_release() -> Result<()> {
        let fixture = Fixture::new(&["pt1", "pt2"])?;
        let runner = FakeRunner::new(Behaviour::Gated);
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());
        let pt1 = PatientKey::parse("pt1")?;
        let pt2 = PatientKey::parse("pt2")?;

        let first = tokio::spawn({
            let service = service.clone();
            let pt1 = pt1.clone();
            async move { service.predict(&pt1, false).await }
        });
        runner.started.notified().await;
        assert_eq!(service.state(), RunState::Running);

        assert!(matches!(service.predict(&pt1, false).await, Err(PredictionError::Busy)));
        assert!(matches!(service.predict(&pt2, true).await, Err(PredictionError::Busy)));

        runner.release.notify_one();
        let outcome = first.await??;
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(outcome.artifacts.prediction.len(), 3);
        assert_eq!(service.state(), RunState::Idle);

        runner.release.notify_one();
        let second = service.predict(&pt2, false).await?;
        assert_eq!(second.status, RunStatus::Success);

        assert_eq!(runner.calls(), 2);
        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.metrics.snapshot().prediction_busy_rejections_total, 2);
        Ok(())
    }

    #[tokio::test]
    async fn at_most_one_process_runs_under_load() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        let runner = FakeRunner::new(Behaviour::Sleep(Duration::from_millis(50)));
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());
        let patient = PatientKey::parse("pt1")?;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            let patient = patient.clone();
            handles.push(tokio::spawn(async move { service.predict(&patient, true).await }));
        }
        let mut succeeded = 0;
        let mut busy = 0;
        for handle in handles {
            match handle.await? {
                Ok(_) => succeeded += 1,
                Err(PredictionError::Busy) => busy += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(succeeded + busy, 16);
        assert!(succeeded >= 1);
        assert_eq!(runner.max_active.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_slot() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        let runner = FakeRunner::new(Behaviour::SpawnFailure);
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());
        let patient = PatientKey::parse("pt1")?;

        assert!(matches!(
            service.predict(&patient, false).await,
            Err(PredictionError::Spawn { .. })
        ));
        assert_eq!(service.state(), RunState::Idle);
        assert!(matches!(
            service.predict(&patient, false).await,
            Err(PredictionError::Spawn { .. })
        ));
        assert_eq!(runner.calls(), 2);
        assert_eq!(fixture.metrics.snapshot().prediction_running, 0);
        Ok(())
    }

    #[tokio::test]
    async fn existing_prediction_short_circuits_unless_forced() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        FakeRunner::write_predictions(&fixture.layout.output_dir("pt1"))?;
        let runner = FakeRunner::new(Behaviour::Sleep(Duration::from_millis(1)));
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());
        let patient = PatientKey::parse("pt1")?;

        let cached = service.predict(&patient, false).await?;
        assert_eq!(cached.status, RunStatus::Exists);
        assert_eq!(cached.elapsed, Duration::ZERO);
        assert_eq!(runner.calls(), 0);

        let forced = service.predict(&patient, true).await?;
        assert_eq!(forced.status, RunStatus::Success);
        assert_eq!(runner.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rerun_policy_disables_short_circuit() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        FakeRunner::write_predictions(&fixture.layout.output_dir("pt1"))?;
        let runner = FakeRunner::new(Behaviour::Sleep(Duration::from_millis(1)));
        let policy = PredictionPolicy {
            rerun_existing: true,
            ..PredictionPolicy::default()
        };
        let service = fixture.service(Arc::clone(&runner), policy);

        let outcome = service.predict(&PatientKey::parse("pt1")?, false).await?;
        assert_eq!(outcome.status, RunStatus::Success);
        assert_eq!(runner.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn missing_input_is_rejected_before_running() -> Result<()> {
        let fixture = Fixture::new(&[])?;
        let runner = FakeRunner::new(Behaviour::Empty);
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());

        let result = service.predict(&PatientKey::parse("ghost")?, false).await;
        assert!(matches!(result, Err(PredictionError::MissingInput { .. })));
        assert_eq!(runner.calls(), 0);
        assert_eq!(service.state(), RunState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn successful_run_without_images_is_not_found() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        let service = fixture.service(FakeRunner::new(Behaviour::Empty), PredictionPolicy::default());
        let result = service.predict(&PatientKey::parse("pt1")?, false).await;
        assert!(matches!(result, Err(PredictionError::NoArtifacts { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn stderr_policy_is_applied_to_runner_reports() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        let patient = PatientKey::parse("pt1")?;

        let lenient = fixture.service(
            FakeRunner::new(Behaviour::NoisySuccess),
            PredictionPolicy::default(),
        );
        assert_eq!(lenient.predict(&patient, true).await?.status, RunStatus::Success);

        let strict = fixture.service(
            FakeRunner::new(Behaviour::NoisySuccess),
            PredictionPolicy {
                stderr_policy: StderrPolicy::Fail,
                ..PredictionPolicy::default()
            },
        );
        let result = strict.predict(&patient, true).await;
        match result {
            Err(err @ PredictionError::ProcessFailed { .. }) => {
                assert_eq!(err.detail(), "RuntimeWarning: divide by zero");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_cancels_the_running_process() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        let runner = FakeRunner::new(Behaviour::UntilCancelled);
        let service = fixture.service(Arc::clone(&runner), PredictionPolicy::default());

        let running = tokio::spawn({
            let service = service.clone();
            async move { service.predict(&PatientKey::parse("pt1")?, true).await }
        });
        runner.started.notified().await;
        service.shutdown();

        assert!(matches!(running.await?, Err(PredictionError::Cancelled)));
        assert_eq!(service.state(), RunState::Idle);
        Ok(())
    }

    #[tokio::test]
    async fn artifacts_scan_reports_not_found_for_empty_output() -> Result<()> {
        let fixture = Fixture::new(&["pt1"])?;
        fs::create_dir_all(fixture.layout.output_dir("pt1").join("ct"))?;
        let service = fixture.service(FakeRunner::new(Behaviour::Empty), PredictionPolicy::default());
        let result = service.artifacts(&PatientKey::parse("pt1")?).await;
        assert!(matches!(result, Err(PredictionError::NoArtifacts { .. })));
        Ok(())
    }
}
