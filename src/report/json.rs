//! Machine-readable run report.

use crate::error::Result;
use crate::runner::RunReport;

/// Renders a [`RunReport`] as pretty-printed JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReporter;

impl JsonReporter {
    pub fn render(&self, report: &RunReport) -> Result<String> {
        serde_json::to_string_pretty(report).map_err(|e| anyhow::anyhow!(e).into())
    }
}
