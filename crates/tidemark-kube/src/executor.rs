//! Upgrade executor
//!
//! Drives one upgrade attempt through its phases:
//!
//! ```text
//! Init -> GateChecked -> StateRead -> Confirmed -> Installing(i) -> Reconciling(j) -> Done
//! ```
//!
//! Nothing in the cluster is written before `Installing`, so any failure up
//! to and including `Confirmed` ends in [`UpgradeOutcome::Aborted`]. Past
//! that point the cluster may be partially upgraded and the outcome is
//! [`UpgradeOutcome::Failed`]. Nothing is retried or rolled back.

use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use semver::Version;
use tidemark_core::{GateDecision, VersionGate, parse_version};
use tokio_util::sync::CancellationToken;

use crate::cluster::ClusterClient;
use crate::error::{KubeError, Result, UpgradeError};
use crate::managers::InstallContext;
use crate::progress::{ProgressEvent, ProgressSink, QuietProgressReporter, Step};
use crate::reconcile::StaleResourceReconciler;
use crate::registry::ManagerRegistry;
use crate::state::ClusterStateReader;

/// Caller-supplied options for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeOptions {
    /// Version to upgrade to, parsed leniently
    pub target_version: String,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
}

impl UpgradeOptions {
    pub fn new(target_version: impl Into<String>) -> Self {
        Self {
            target_version: target_version.into(),
            assume_yes: false,
        }
    }

    /// Builder: skip the confirmation prompt
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }
}

/// What the operator is asked to approve
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub namespace: String,
    pub current: Version,
    pub target: Version,
    pub decision: GateDecision,
    pub cloud_mode_enabled: bool,
}

impl ConfirmationRequest {
    /// Question shown to the operator
    pub fn prompt(&self) -> String {
        format!(
            "About to {} Tidemark from version {} (current) to {}. Are you sure?",
            self.decision.verb(),
            self.current,
            self.target
        )
    }
}

/// Asks the operator to approve a run
///
/// Called on the blocking thread pool, so implementations may wait on a
/// terminal. A cancelled run stops waiting for the answer.
pub trait Confirmer: Send + Sync {
    /// `Ok(false)` and `Err` both decline the run
    fn confirm(&self, request: &ConfirmationRequest) -> Result<bool>;
}

/// Confirmer that always gives the same answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticConfirmer(pub bool);

impl Confirmer for StaticConfirmer {
    fn confirm(&self, _request: &ConfirmationRequest) -> Result<bool> {
        Ok(self.0)
    }
}

/// Where a run currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradePhase {
    Init,
    GateChecked,
    StateRead,
    Confirmed,
    /// Running the manager at this position
    Installing(usize),
    /// Sweeping the managed descriptor at this position
    Reconciling(usize),
    Done,
}

impl UpgradePhase {
    /// Whether the cluster may have been written to
    pub fn cluster_modified(&self) -> bool {
        matches!(
            self,
            Self::Installing(_) | Self::Reconciling(_) | Self::Done
        )
    }
}

impl fmt::Display for UpgradePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::GateChecked => write!(f, "gate-checked"),
            Self::StateRead => write!(f, "state-read"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Installing(i) => write!(f, "installing({})", i),
            Self::Reconciling(j) => write!(f, "reconciling({})", j),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeReport {
    pub namespace: String,
    pub decision: GateDecision,
    pub from: Version,
    pub to: Version,
    pub cloud_mode_enabled: bool,
    /// Managers that ran, in order
    pub managers: Vec<String>,
    /// Deleted object count per swept descriptor, in sweep order
    pub deleted: IndexMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UpgradeReport {
    pub fn total_deleted(&self) -> usize {
        self.deleted.values().sum()
    }
}

/// Terminal state of a run
#[derive(Debug)]
pub enum UpgradeOutcome {
    /// Every manager ran and every sweep completed
    Done(UpgradeReport),
    /// Stopped before anything in the cluster was written
    Aborted(UpgradeError),
    /// Stopped after the cluster may have been partially modified
    Failed(UpgradeError),
}

impl UpgradeOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn report(&self) -> Option<&UpgradeReport> {
        match self {
            Self::Done(report) => Some(report),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UpgradeError> {
        match self {
            Self::Done(_) => None,
            Self::Aborted(e) | Self::Failed(e) => Some(e),
        }
    }

    /// Whether the cluster may be left partially upgraded
    pub fn partially_modified(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Error message including every source in the chain
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Runs one upgrade attempt against a cluster
pub struct UpgradeExecutor<C: ClusterClient> {
    client: C,
    options: UpgradeOptions,
    registry: ManagerRegistry,
    gate: VersionGate,
    confirmer: Arc<dyn Confirmer>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
}

impl<C: ClusterClient> UpgradeExecutor<C> {
    /// Executor with the built-in registry, a quiet reporter and a confirmer
    /// that declines (set one with [`with_confirmer`](Self::with_confirmer)
    /// unless `assume_yes` is set)
    pub fn new(client: C, options: UpgradeOptions) -> Self {
        Self {
            client,
            options,
            registry: ManagerRegistry::builtin(),
            gate: VersionGate::new(),
            confirmer: Arc::new(StaticConfirmer(false)),
            progress: Arc::new(QuietProgressReporter::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_registry(mut self, registry: ManagerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_gate(mut self, gate: VersionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn options(&self) -> &UpgradeOptions {
        &self.options
    }

    /// Run the attempt to completion
    pub async fn run(&self) -> UpgradeOutcome {
        let mut phase = UpgradePhase::Init;
        let result = self.drive(&mut phase).await;

        match result {
            Ok(report) => {
                tracing::info!(
                    namespace = %report.namespace,
                    from = %report.from,
                    to = %report.to,
                    managers = report.managers.len(),
                    deleted = report.total_deleted(),
                    "upgrade complete"
                );
                UpgradeOutcome::Done(report)
            }
            Err(error) if phase.cluster_modified() => {
                tracing::error!(
                    %phase,
                    kind = error.kind(),
                    error = %error_chain(&error),
                    "upgrade failed, cluster may be partially upgraded"
                );
                UpgradeOutcome::Failed(error)
            }
            Err(error) => {
                tracing::warn!(
                    %phase,
                    kind = error.kind(),
                    error = %error_chain(&error),
                    "upgrade aborted, cluster unchanged"
                );
                UpgradeOutcome::Aborted(error)
            }
        }
    }

    async fn drive(&self, phase: &mut UpgradePhase) -> std::result::Result<UpgradeReport, UpgradeError> {
        let started_at = Utc::now();
        let target = parse_version(&self.options.target_version)?;
        tracing::debug!(%target, "parsed target version");
        self.check_cancelled()?;

        let reader = ClusterStateReader::new(&self.client);

        let recorded = self
            .step(
                Step::ReadVersion,
                async { reader.read_version().await.map_err(UpgradeError::from) },
                |r| Some(format!("{} in namespace {}", r.version, r.namespace)),
            )
            .await?;

        let decision = self
            .step(
                Step::VersionGate,
                async {
                    self.gate
                        .check(&recorded.version, &target)
                        .map_err(UpgradeError::from)
                },
                |d| Some(format!("{} {} -> {}", d, recorded.version, target)),
            )
            .await?;
        *phase = UpgradePhase::GateChecked;

        if decision.is_downgrade() {
            let message = format!(
                "target version {} is older than the installed version {}",
                target, recorded.version
            );
            tracing::warn!(from = %recorded.version, to = %target, "downgrade requested");
            self.progress.emit(&ProgressEvent::Warning { message });
        }

        let state = self
            .step(
                Step::ReadState,
                async { reader.complete(recorded.clone()).await.map_err(UpgradeError::from) },
                |s| s.cloud_mode_enabled.then(|| "cloud mode".to_string()),
            )
            .await?;
        *phase = UpgradePhase::StateRead;

        let request = ConfirmationRequest {
            namespace: state.namespace.clone(),
            current: state.current_version.clone(),
            target: target.clone(),
            decision,
            cloud_mode_enabled: state.cloud_mode_enabled,
        };
        self.confirm(&request).await?;
        *phase = UpgradePhase::Confirmed;

        let ctx = InstallContext::from_state(&state, target.clone());
        let managers = self.registry.build(&ctx).map_err(UpgradeError::Registry)?;
        tracing::info!(
            managers = ?managers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            "installing"
        );

        let mut installed = Vec::with_capacity(managers.len());
        for (i, manager) in managers.iter().enumerate() {
            self.check_cancelled()?;
            *phase = UpgradePhase::Installing(i);

            let name = manager.name().to_string();
            self.step(
                Step::Install {
                    manager: name.clone(),
                },
                async {
                    manager
                        .install_from_scratch(&self.client)
                        .await
                        .map_err(|cause| UpgradeError::ManagerInstall {
                            name: name.clone(),
                            cause,
                        })
                },
                |_| None,
            )
            .await?;
            installed.push(name);
        }

        let reconciler = StaleResourceReconciler::new(&self.client);
        let mut deleted = IndexMap::new();
        for (j, descriptor) in state.managed_resources().iter().enumerate() {
            self.check_cancelled()?;
            *phase = UpgradePhase::Reconciling(j);

            let kind = descriptor.kind.to_string();
            let count = self
                .step(
                    Step::Reconcile { kind: kind.clone() },
                    async {
                        reconciler
                            .sweep(descriptor, &target)
                            .await
                            .map_err(|cause| UpgradeError::Reconcile {
                                kind: kind.clone(),
                                cause,
                            })
                    },
                    |n| (*n > 0).then(|| format!("deleted {}", n)),
                )
                .await?;
            deleted.insert(descriptor.to_string(), count);
        }
        *phase = UpgradePhase::Done;

        Ok(UpgradeReport {
            namespace: state.namespace,
            decision,
            from: state.current_version,
            to: target,
            cloud_mode_enabled: state.cloud_mode_enabled,
            managers: installed,
            deleted,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Ask for approval unless `assume_yes` is set
    async fn confirm(&self, request: &ConfirmationRequest) -> std::result::Result<(), UpgradeError> {
        if self.options.assume_yes {
            tracing::debug!("confirmation skipped (assume yes)");
            return Ok(());
        }

        // Prompts block, so they run off the async workers and stay cancellable
        let confirmer = Arc::clone(&self.confirmer);
        let pending = request.clone();
        self.step(
            Step::Confirm,
            async move {
                let answer = tokio::task::spawn_blocking(move || confirmer.confirm(&pending))
                    .await
                    .map_err(|e| KubeError::Prompt(e.to_string()))
                    .and_then(|answer| answer);
                match answer {
                    Ok(true) => Ok(()),
                    Ok(false) => Err(UpgradeError::UserDeclined),
                    Err(e) => {
                        tracing::warn!(error = %e, "confirmation failed, treating as declined");
                        Err(UpgradeError::UserDeclined)
                    }
                }
            },
            |_| None,
        )
        .await
    }

    fn check_cancelled(&self) -> std::result::Result<(), UpgradeError> {
        if self.cancel.is_cancelled() {
            return Err(UpgradeError::Cancelled);
        }
        Ok(())
    }

    /// Run one step, racing it against cancellation and reporting progress
    async fn step<T, F, D>(
        &self,
        step: Step,
        work: F,
        detail: D,
    ) -> std::result::Result<T, UpgradeError>
    where
        F: Future<Output = std::result::Result<T, UpgradeError>>,
        D: FnOnce(&T) -> Option<String>,
    {
        self.progress
            .emit(&ProgressEvent::StepStarted { step: step.clone() });
        tracing::debug!(step = %step, "step started");

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(UpgradeError::Cancelled),
            result = work => result,
        };

        match &result {
            Ok(value) => {
                let detail = detail(value);
                tracing::info!(step = %step, detail = detail.as_deref().unwrap_or(""), "step succeeded");
                self.progress
                    .emit(&ProgressEvent::StepSucceeded { step, detail });
            }
            Err(error) => {
                let error = error_chain(error);
                tracing::debug!(step = %step, %error, "step failed");
                self.progress.emit(&ProgressEvent::StepFailed { step, error });
            }
        }

        result
    }
}
