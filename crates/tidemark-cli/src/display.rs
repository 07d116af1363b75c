//! Display formatting for CLI output
//!
//! Renders the final report of an upgrade run, either as styled text or as
//! a single JSON object for scripts.

use clap::ValueEnum;
use console::style;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use tidemark_kube::{UpgradeError, UpgradeReport, error_chain};

/// Output format of the final report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Format count with proper pluralization
pub fn pluralize(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{} {}", count, singular)
    } else {
        format!("{} {}", count, plural)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Report rendering
// ═══════════════════════════════════════════════════════════════════════════

/// Renderer for the report of a finished run
pub struct ReportRenderer {
    writer: Box<dyn Write>,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportRenderer {
    /// Create a new renderer that writes to stdout
    pub fn new() -> Self {
        Self {
            writer: Box::new(io::stdout()),
        }
    }

    /// Create a renderer that writes to a custom writer (for testing)
    pub fn with_writer<W: Write + 'static>(writer: W) -> Self {
        Self {
            writer: Box::new(writer),
        }
    }

    /// Render a successful run
    pub fn render(&mut self, report: &UpgradeReport, format: OutputFormat) -> io::Result<()> {
        match format {
            OutputFormat::Text => self.render_text(report),
            OutputFormat::Json => writeln!(self.writer, "{}", report_json(report)),
        }
    }

    /// Render a failed or aborted run (JSON only; text goes through miette)
    pub fn render_failure(&mut self, error: &UpgradeError, partial: bool) -> io::Result<()> {
        let value = serde_json::json!({
            "status": if partial { "failed" } else { "aborted" },
            "error": error.kind(),
            "message": error_chain(error),
        });
        writeln!(self.writer, "{}", value)
    }

    fn render_text(&mut self, report: &UpgradeReport) -> io::Result<()> {
        let verb = if report.decision.is_downgrade() {
            "Downgraded"
        } else {
            "Upgraded"
        };
        writeln!(
            self.writer,
            "{} {} Tidemark in {} from {} to {}",
            style("✓").green().bold(),
            verb,
            style(&report.namespace).cyan(),
            style(&report.from).yellow(),
            style(&report.to).yellow()
        )?;

        writeln!(
            self.writer,
            "  {} applied, {} removed",
            pluralize(report.managers.len(), "manager", "managers"),
            pluralize(report.total_deleted(), "stale object", "stale objects")
        )?;
        for (descriptor, count) in report.deleted.iter().filter(|(_, c)| **c > 0) {
            writeln!(self.writer, "    - {}: {}", descriptor, count)?;
        }
        if report.cloud_mode_enabled {
            writeln!(self.writer, "  {}", style("cloud mode enabled").dim())?;
        }
        Ok(())
    }
}

/// JSON summary of a successful run
pub fn report_json(report: &UpgradeReport) -> serde_json::Value {
    serde_json::json!({
        "status": "done",
        "namespace": report.namespace,
        "decision": report.decision.to_string(),
        "from": report.from.to_string(),
        "to": report.to.to_string(),
        "cloudModeEnabled": report.cloud_mode_enabled,
        "managers": report.managers,
        "deleted": report.deleted,
        "startedAt": report.started_at,
        "finishedAt": report.finished_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use indexmap::IndexMap;
    use std::sync::{Arc, Mutex};
    use tidemark_core::GateDecision;

    /// A thread-safe buffer for testing
    #[derive(Clone, Default)]
    struct TestBuffer {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl TestBuffer {
        fn contents(&self) -> String {
            let guard = self.inner.lock().unwrap();
            String::from_utf8(guard.clone()).unwrap()
        }
    }

    impl Write for TestBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.inner.lock().unwrap().write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn report() -> UpgradeReport {
        let mut deleted = IndexMap::new();
        deleted.insert("deployments.apps in tidemark-system".to_string(), 2);
        deleted.insert("configmaps in tidemark-system".to_string(), 0);
        UpgradeReport {
            namespace: "tidemark-system".to_string(),
            decision: GateDecision::Upgrade,
            from: semver::Version::new(1, 2, 0),
            to: semver::Version::new(1, 3, 0),
            cloud_mode_enabled: false,
            managers: vec!["deployment".to_string(), "config".to_string()],
            deleted,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_pluralize() {
        assert_eq!(pluralize(1, "manager", "managers"), "1 manager");
        assert_eq!(pluralize(0, "manager", "managers"), "0 managers");
    }

    #[test]
    fn test_text_report() {
        let buffer = TestBuffer::default();
        let mut renderer = ReportRenderer::with_writer(buffer.clone());
        renderer.render(&report(), OutputFormat::Text).unwrap();

        let out = console::strip_ansi_codes(&buffer.contents()).to_string();
        assert!(out.contains("Upgraded Tidemark in tidemark-system from 1.2.0 to 1.3.0"));
        assert!(out.contains("2 managers applied, 2 stale objects removed"));
        assert!(out.contains("deployments.apps in tidemark-system: 2"));
        assert!(!out.contains("configmaps"));
    }

    #[test]
    fn test_json_report() {
        let value = report_json(&report());
        assert_eq!(value["status"], "done");
        assert_eq!(value["to"], "1.3.0");
        assert_eq!(value["managers"][1], "config");
        assert_eq!(value["deleted"]["deployments.apps in tidemark-system"], 2);
    }

    #[test]
    fn test_failure_json() {
        let buffer = TestBuffer::default();
        let mut renderer = ReportRenderer::with_writer(buffer.clone());
        renderer
            .render_failure(&UpgradeError::NamespaceNotFound, false)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(buffer.contents().trim()).unwrap();
        assert_eq!(value["status"], "aborted");
        assert_eq!(value["error"], "namespace-not-found");
    }
}
