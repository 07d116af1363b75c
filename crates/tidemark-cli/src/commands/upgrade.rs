//! Upgrade command - move an existing installation to another version

use std::sync::Arc;

use console::style;
use tidemark_core::parse_version;
use tidemark_kube::{
    JsonProgressReporter, KubeClusterClient, ProgressReporter, ProgressSink, UpgradeError,
    UpgradeExecutor, UpgradeOptions, UpgradeOutcome,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::confirm::InquireConfirmer;
use crate::display::{OutputFormat, ReportRenderer};
use crate::error::{CliError, Result};

/// Resolved arguments of `tidemark upgrade`
#[derive(Debug, Clone)]
pub struct UpgradeArgs {
    pub target_version: String,
    pub assume_yes: bool,
    pub output: OutputFormat,
    pub kube_context: Option<String>,
    pub debug: bool,
}

/// Run the upgrade command
pub async fn run(args: UpgradeArgs) -> Result<()> {
    // Reject a bad target before touching the cluster
    if let Err(e) = parse_version(&args.target_version) {
        return Err(CliError::from_upgrade(&UpgradeError::from(e), false));
    }

    if args.output == OutputFormat::Text {
        eprintln!(
            "{} Upgrading Tidemark to version {}",
            style("→").blue().bold(),
            style(&args.target_version).yellow()
        );
    }

    let client = KubeClusterClient::for_context(args.kube_context.as_deref())
        .await
        .map_err(|e| CliError::Connection {
            message: e.to_string(),
        })?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("interrupt received, stopping after the current step");
                    cancel.cancel();
                }
                Err(err) => tracing::warn!(%err, "failed to install Ctrl+C handler"),
            }
        }
    });

    let text_reporter = Arc::new(if args.debug {
        ProgressReporter::new().verbose()
    } else {
        ProgressReporter::new()
    });
    let progress: Arc<dyn ProgressSink> = match args.output {
        OutputFormat::Text => text_reporter.clone(),
        OutputFormat::Json => Arc::new(JsonProgressReporter::new()),
    };

    let options = UpgradeOptions::new(&args.target_version).assume_yes(args.assume_yes);
    let executor = UpgradeExecutor::new(client, options)
        .with_confirmer(Arc::new(InquireConfirmer))
        .with_progress(progress)
        .with_cancellation(cancel);

    let outcome = executor.run().await;
    interrupt.abort();

    let mut renderer = ReportRenderer::new();
    match outcome {
        UpgradeOutcome::Done(report) => {
            if args.output == OutputFormat::Text {
                text_reporter.print_summary(true);
            }
            renderer.render(&report, args.output)?;
            Ok(())
        }
        UpgradeOutcome::Aborted(error) => {
            if args.output == OutputFormat::Json {
                renderer.render_failure(&error, false)?;
            }
            Err(CliError::from_upgrade(&error, false))
        }
        UpgradeOutcome::Failed(error) => {
            match args.output {
                OutputFormat::Text => text_reporter.print_summary(false),
                OutputFormat::Json => renderer.render_failure(&error, true)?,
            }
            Err(CliError::from_upgrade(&error, true))
        }
    }
}
