//! Terminal rendering for the docpress CLI.
//!
//! Table output targets humans; `json` and `yaml` exist for scripting. Every
//! command renders its own table view and routes structured payloads through
//! [`structured`] so the machine formats stay uniform.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// How command output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable tables and key/value listings
    #[default]
    Table,
    /// Pretty-printed JSON
    Json,
    /// YAML
    Yaml,
}

/// Serialize a payload as JSON or YAML.
///
/// `Table` falls back to JSON here, so commands that have no tabular view of
/// a payload still print something machine-readable rather than nothing.
pub fn structured<T: Serialize>(value: &T, format: OutputFormat) {
    let rendered = match format {
        OutputFormat::Yaml => serde_yaml::to_string(value).unwrap_or_else(|e| {
            format!("serialization error: {}\n", e)
        }),
        _ => serde_json::to_string_pretty(value)
            .map(|mut s| {
                s.push('\n');
                s
            })
            .unwrap_or_else(|e| format!("serialization error: {}\n", e)),
    };
    print!("{}", rendered);
}

/// Render rows as a bordered table.
pub fn table<T: Tabled>(rows: &[T]) {
    if rows.is_empty() {
        println!("{}", "(nothing to show)".dimmed());
        return;
    }
    println!("{}", Table::new(rows).with(Style::sharp()));
}

/// Green check line for completed operations.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Red cross line, written to stderr.
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Dim context line for progress and hints.
pub fn info(msg: &str) {
    println!("{} {}", "·".blue(), msg.dimmed());
}

/// One `label  value` line; labels are right-aligned so values line up.
pub fn field(label: &str, value: &str) {
    println!("{}  {}", format!("{:>16}", label).cyan(), value);
}

/// Underlined section title.
pub fn heading(title: &str) {
    println!();
    println!("{}", title.bold().underline());
    println!();
}
