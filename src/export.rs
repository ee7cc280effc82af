use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::db::models::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Markdown,
    Csv,
}

impl ExportFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Markdown,
        }
    }
}

/// `~/Desktop/repty-export-<stamp>.md`, or the current directory when there
/// is no desktop directory.
pub fn default_export_path() -> PathBuf {
    let name = format!(
        "repty-export-{}.md",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    match dirs::desktop_dir().filter(|d| d.is_dir()) {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

pub fn export_entries(path: &Path, entries: &[Entry]) -> Result<ExportFormat> {
    let format = ExportFormat::for_path(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    match format {
        ExportFormat::Csv => write_csv(path, entries)?,
        ExportFormat::Markdown => std::fs::write(path, render_markdown(entries))
            .with_context(|| format!("Failed to write {}", path.display()))?,
    }
    Ok(format)
}

fn write_csv(path: &Path, entries: &[Entry]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["id", "timestamp", "exit_code", "cwd", "tags", "command"])?;
    for e in entries {
        writer.write_record([
            e.id.to_string(),
            e.formatted_timestamp(),
            e.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            e.cwd.clone().unwrap_or_default(),
            e.tag_list().join(","),
            e.command.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn md_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn render_markdown(entries: &[Entry]) -> String {
    let mut out = String::from("# repty export\n\n");
    out.push_str("| id | timestamp | exit | cwd | tags | command |\n");
    out.push_str("|---:|---|---:|---|---|---|\n");
    for e in entries {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | `{}` |\n",
            e.id,
            e.formatted_timestamp(),
            e.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            md_cell(e.cwd.as_deref().unwrap_or("")),
            md_cell(&e.tag_list().join(", ")),
            md_cell(&e.command.replace('`', "'")),
        ));
    }
    out
}
