//! Output formatting utilities for the CLI

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use tether_core::ThreadState;
use tether_discovery::DiscoveredServer;

/// Format discovered servers as an ASCII table, already ranked
pub fn format_discovered(servers: &[DiscoveredServer]) -> String {
    if servers.is_empty() {
        return "No servers discovered".to_string();
    }

    #[derive(Tabled)]
    struct ServerRow {
        #[tabled(rename = "NAME")]
        name: String,
        #[tabled(rename = "HOST")]
        host: String,
        #[tabled(rename = "PORT")]
        port: u16,
        #[tabled(rename = "SOURCE")]
        source: String,
        #[tabled(rename = "AGENT")]
        agent: String,
    }

    let rows: Vec<ServerRow> = servers
        .iter()
        .map(|s| ServerRow {
            name: s.name.clone().unwrap_or_else(|| "-".to_string()),
            host: s.host.clone(),
            port: s.port,
            source: s.source.to_string(),
            agent: if s.agent_server { "yes" } else { "-" }.to_string(),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format threads as an ASCII table, most recently updated first
pub fn format_threads(threads: &[ThreadState]) -> String {
    if threads.is_empty() {
        return "No threads".to_string();
    }

    #[derive(Tabled)]
    struct ThreadRow {
        #[tabled(rename = "THREAD")]
        id: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "CWD")]
        cwd: String,
        #[tabled(rename = "PREVIEW")]
        preview: String,
    }

    let rows: Vec<ThreadRow> = threads
        .iter()
        .map(|t| ThreadRow {
            id: truncate(&t.key.thread_id, 16),
            status: t.status.to_string(),
            cwd: t.cwd.clone().unwrap_or_else(|| "-".to_string()),
            preview: truncate(&t.preview, 48),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(110))
        .to_string()
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an informational message in cyan with an info symbol prefix
pub fn print_info(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Cyan),
        Print("ℹ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
