use std::io::IsTerminal;
use std::time::Duration;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::search::engine::SearchHit;

const DEFAULT_WIDTH: usize = 120;
const TAGS_WIDTH: usize = 24;

/// Output capabilities, decided once at startup.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub interactive: bool,
}

impl Output {
    pub fn detect() -> Self {
        Self {
            interactive: std::io::stdout().is_terminal() && std::io::stderr().is_terminal(),
        }
    }

    /// Spinner on stderr; hidden when output is not a terminal.
    pub fn spinner(&self, message: &str) -> ProgressBar {
        if !self.interactive {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        pb
    }

    pub fn width(&self) -> usize {
        if !self.interactive {
            return DEFAULT_WIDTH;
        }
        crossterm::terminal::size()
            .map(|(cols, _)| cols as usize)
            .unwrap_or(DEFAULT_WIDTH)
    }
}

/// Cut `text` to at most `max` characters, ending with an ellipsis when cut.
pub fn truncate(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

/// One row of the result table, already reduced to plain strings.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: String,
    pub timestamp: String,
    pub exit: String,
    pub tags: String,
    pub command: String,
}

impl Row {
    pub fn from_hit(hit: &SearchHit) -> Self {
        let entry = &hit.entry;
        Self {
            id: entry.id.to_string(),
            timestamp: entry.formatted_timestamp(),
            exit: entry
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
            tags: entry.tag_list().join(","),
            command: entry.command.replace('\n', " "),
        }
    }
}

/// Lay out rows as `id | timestamp | exit | tags | command` fitted to `width`.
pub fn render_table(rows: &[Row], width: usize) -> Vec<String> {
    let id_w = rows.iter().map(|r| r.id.len()).max().unwrap_or(0).max(2);
    let ts_w = 19;
    let exit_w = rows.iter().map(|r| r.exit.len()).max().unwrap_or(0).max(4);
    let tags_w = rows
        .iter()
        .map(|r| r.tags.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(4, TAGS_WIDTH);
    let fixed = 2 + id_w + 3 + ts_w + 3 + exit_w + 3 + tags_w + 3;
    let cmd_w = width.saturating_sub(fixed).max(20);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format!(
        "  {:<id_w$} | {:<ts_w$} | {:<exit_w$} | {:<tags_w$} | {}",
        "id", "timestamp", "exit", "tags", "command"
    ));
    lines.push(format!("  {}", "-".repeat((fixed + cmd_w).saturating_sub(2).min(width))));
    for r in rows {
        lines.push(format!(
            "  {:<id_w$} | {:<ts_w$} | {:<exit_w$} | {:<tags_w$} | {}",
            r.id,
            r.timestamp,
            r.exit,
            truncate(&r.tags, tags_w),
            truncate(&r.command, cmd_w)
        ));
    }
    lines
}

pub fn print_header(title: &str, count: usize) {
    println!();
    println!(
        "  {} {}  {}",
        "◉".cyan(),
        title.bold(),
        format!("{} commands", count).dimmed()
    );
}

pub fn print_empty(message: &str) {
    println!("\n  {} {}\n", "●".dimmed(), message.dimmed());
}

pub fn print_hits(output: &Output, hits: &[SearchHit]) {
    let rows: Vec<Row> = hits.iter().map(Row::from_hit).collect();
    let mut lines = render_table(&rows, output.width()).into_iter();
    if let Some(header) = lines.next() {
        println!("{}", header.bold());
    }
    if let Some(rule) = lines.next() {
        println!("{}", rule.dimmed());
    }
    for (line, hit) in lines.zip(hits) {
        match hit.entry.exit_code {
            Some(0) | None => println!("{}", line),
            Some(_) => println!("{}", line.red()),
        }
    }
    println!();
}

/// `- id N: reason` lines under an AI-ranked table.
pub fn print_reasons(hits: &[SearchHit]) {
    for hit in hits {
        if let Some(reason) = &hit.reason {
            println!("  {} id {}: {}", "-".dimmed(), hit.entry.id, reason);
        }
    }
}

pub fn notice(message: &str) {
    eprintln!("  {} {}", "!".yellow(), message.yellow());
}
