//! Plain-text renderings returned to the assistant.

use std::fmt::Write as _;
use std::path::Path;

use crate::service::{Diagnostics, HealthReport, LoadResponse};
use crate::supervisor::{EnsureOutcome, StartupFailure};

pub struct LoadSummary<'a> {
    pub path: &'a Path,
    pub response: &'a LoadResponse,
    pub outcome: &'a EnsureOutcome,
    pub session_id: &'a str,
    pub session_url: &'a str,
}

impl LoadSummary<'_> {
    pub fn render(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        let columns = &self.response.columns;
        let column_lines = columns
            .iter()
            .map(|column| format!("  - {} ({})", column.name, column.dtype))
            .collect::<Vec<_>>()
            .join("\n");
        let server_pid = self
            .response
            .server_pid
            .or(self.outcome.pid)
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "?".to_string());
        let browser_action = self.response.browser_action.as_deref().unwrap_or("unknown");

        format!(
            "Loaded **{file_name}**: {rows} rows, {count} columns\n\n\
             Columns:\n{column_lines}\n\n\
             Interactive view: {url}\n\
             Server: pid={server_pid} ({status}) | Browser: {browser_action} | Session: {session}",
            rows = group_thousands(self.response.rows),
            count = columns.len(),
            url = self.session_url,
            status = self.outcome.status,
            session = self.session_id,
        )
    }
}

pub fn not_running(failure: &StartupFailure) -> String {
    format!("Buckaroo server is NOT running.\n\n{failure}")
}

pub fn diagnostics_unavailable(health: &HealthReport) -> String {
    let pid = health
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "?".to_string());
    let health_json = serde_json::to_string_pretty(health).unwrap_or_default();
    format!(
        "Server is running (pid={pid}) but /diagnostics endpoint unavailable. \
         Server may be an older version.\n\nHealth: {health_json}"
    )
}

pub fn diagnostics_report(diag: &Diagnostics) -> String {
    let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "None".to_string());

    let mut static_lines = Vec::new();
    let mut warnings = Vec::new();
    for (name, asset) in &diag.static_files {
        let state = if asset.is_usable() { "OK" } else { "PROBLEM" };
        static_lines.push(format!(
            "  {name}: {state} ({} bytes)",
            group_thousands(asset.size_bytes)
        ));
        if !asset.exists {
            warnings.push(format!("  MISSING: {name}"));
        } else if asset.size_bytes == 0 {
            warnings.push(format!("  EMPTY: {name} (0 bytes, will cause blank page)"));
        }
    }
    let dependency_lines = diag
        .dependencies
        .iter()
        .map(|(name, installed)| {
            let state = if *installed { "installed" } else { "MISSING" };
            format!("  {name}: {state}")
        })
        .collect::<Vec<_>>();

    let pid = diag
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "None".to_string());
    let uptime = diag
        .uptime_s
        .map(|uptime| uptime.to_string())
        .unwrap_or_else(|| "None".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "## Buckaroo Server Diagnostics\n");
    let _ = writeln!(out, "Server: pid={pid} uptime={uptime}s");
    let _ = writeln!(
        out,
        "Python: {} ({})",
        show(&diag.python_version),
        show(&diag.python_executable)
    );
    let _ = writeln!(out, "Buckaroo: {}", show(&diag.buckaroo_version));
    let _ = writeln!(out, "Tornado: {}", show(&diag.tornado_version));
    let _ = writeln!(out, "Platform: {}\n", show(&diag.platform));
    let _ = writeln!(out, "### Static files\n{}\n", static_lines.join("\n"));
    let _ = writeln!(out, "### Dependencies\n{}\n", dependency_lines.join("\n"));
    let _ = writeln!(out, "### Log files");
    let _ = writeln!(out, "  Log dir: {}", show(&diag.log_dir));
    let _ = writeln!(out, "  Static path: {}", show(&diag.static_path));
    if !warnings.is_empty() {
        let _ = writeln!(out, "\n### WARNINGS\n{}", warnings.join("\n"));
    }
    out
}

/// `1234567` -> `1,234,567`
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
