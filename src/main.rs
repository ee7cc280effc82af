mod capture;
mod cli;
mod config;
mod db;
mod display;
mod export;
mod llm;
mod privacy;
mod search;
mod shell;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, ConfigAction, TagAction};
use config::settings::{load_config, masked, save_config, Config, Paths};
use db::schema::Store;
use display::Output;
use search::engine::{RankSource, SearchEngine};
use shell::hooks::HookChange;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let output = Output::detect();
    if !output.interactive {
        colored::control::set_override(false);
    }

    let paths = Paths::discover()?;
    let mut config = load_config(&paths)?;

    match cli.command {
        Commands::Log {
            command,
            cwd,
            exit_code,
            tags,
        } => {
            let store = open_store(&paths)?;
            let request = capture::log::LogRequest {
                command,
                cwd,
                exit_code,
                tags,
            };
            capture::log::handle_log(&store, &config, &paths, &request)?;
        }
        Commands::Search { query, limit } => {
            handle_search(&paths, &config, &output, &query.join(" "), limit)?
        }
        Commands::Ai { query, limit } => {
            handle_ai(&paths, &config, &output, &query.join(" "), limit).await?
        }
        Commands::Recent { limit } => handle_recent(&paths, &config, &output, limit)?,
        Commands::Save {
            description,
            command,
            cwd,
        } => {
            let store = open_store(&paths)?;
            let cwd = cwd.or_else(current_dir);
            let id = capture::log::save_favorite(&store, &description, &command, cwd)?;
            println!(
                "\n  {} {} {}\n",
                "★".yellow(),
                "Saved favorite".green(),
                format!("id {}", id).dimmed()
            );
        }
        Commands::Tag { action } => handle_tag(&paths, action)?,
        Commands::Export { file, limit } => handle_export(&paths, file, limit)?,
        Commands::Init { shell: target } => {
            print!("{}", shell::hooks::hook_script(target, &shell::hooks::current_binary()))
        }
        Commands::InstallHooks => {
            let home = user_home()?;
            print_hook_outcomes(shell::hooks::install_all(&home, &shell::hooks::current_binary()));
            println!("  {}\n", "Open a new shell to start recording.".dimmed());
        }
        Commands::UninstallHooks => {
            let home = user_home()?;
            print_hook_outcomes(shell::hooks::remove_all(&home));
        }
        Commands::Setup { yes, no_hooks, key } => {
            handle_setup(&paths, &mut config, &output, yes, no_hooks, key)?
        }
        Commands::Uninstall { yes } => handle_uninstall(&paths, &output, yes)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => println!("{}", masked(&config)?),
            ConfigAction::SetKey { key } => {
                config.llm.api_key = Some(key);
                save_config(&paths, &config)?;
                println!("\n  {} {}\n", "✓".green(), "API key saved.".green());
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("REPTY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn open_store(paths: &Paths) -> Result<Store> {
    paths.ensure_home()?;
    Store::open(&paths.db()).with_context(|| format!("Failed to open {}", paths.db().display()))
}

fn current_dir() -> Option<String> {
    std::env::current_dir()
        .ok()
        .map(|p| p.to_string_lossy().to_string())
}

fn user_home() -> Result<PathBuf> {
    dirs::home_dir().context("Could not find home directory")
}

fn handle_search(
    paths: &Paths,
    config: &Config,
    output: &Output,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let store = open_store(paths)?;
    let limit = limit.unwrap_or(config.search.default_limit);
    let hits = SearchEngine::new(&store, config).search(query, limit)?;

    if hits.is_empty() {
        display::print_empty("No matching commands found.");
        return Ok(());
    }
    display::print_header(&format!("Search: \"{}\"", query), hits.len());
    display::print_hits(output, &hits);
    Ok(())
}

async fn handle_ai(
    paths: &Paths,
    config: &Config,
    output: &Output,
    query: &str,
    limit: Option<usize>,
) -> Result<()> {
    let store = open_store(paths)?;
    let limit = limit.unwrap_or(config.search.default_limit);
    let client = llm::ranker::LlmRankingClient::new(config.llm.clone());

    let spinner = output.spinner("Asking the model...");
    let outcome = SearchEngine::new(&store, config)
        .ai_search(query, limit, &client)
        .await;
    spinner.finish_and_clear();
    let outcome = outcome?;

    if let RankSource::Fallback { reason } = &outcome.source {
        display::notice(&format!(
            "AI search failed ({}). Falling back to local search...",
            reason
        ));
    }

    if outcome.hits.is_empty() {
        display::print_empty("No matching commands found.");
        return Ok(());
    }
    display::print_header(&format!("AI: \"{}\"", query), outcome.hits.len());
    display::print_hits(output, &outcome.hits);
    display::print_reasons(&outcome.hits);
    Ok(())
}

fn handle_recent(
    paths: &Paths,
    config: &Config,
    output: &Output,
    limit: Option<usize>,
) -> Result<()> {
    let store = open_store(paths)?;
    let limit = limit.unwrap_or(config.search.recent_limit);
    let hits = SearchEngine::new(&store, config).recent(limit)?;

    if hits.is_empty() {
        display::print_empty("No commands recorded yet.");
        return Ok(());
    }
    display::print_header("Recent", hits.len());
    display::print_hits(output, &hits);
    Ok(())
}

fn handle_tag(paths: &Paths, action: TagAction) -> Result<()> {
    let store = open_store(paths)?;
    match action {
        TagAction::Add { tag, id } => {
            let id = match id {
                Some(id) => id,
                None => resolve_last_id(&store, paths)?,
            };
            let tags = store.add_tag(id, &tag)?;
            println!(
                "\n  {} Tagged id {}: {}\n",
                "✓".green(),
                id.to_string().bold(),
                tags.iter().collect::<Vec<_>>().join(", ").cyan()
            );
        }
        TagAction::Rm { tag, id } => {
            if store.remove_tag(id, &tag)? {
                println!("\n  {} Removed '{}' from id {}\n", "✓".green(), tag, id);
            } else {
                display::print_empty(&format!("id {} has no tag '{}'.", id, tag));
            }
        }
    }
    Ok(())
}

/// Id recorded by the last `repty log`, else the newest non-internal entry.
fn resolve_last_id(store: &Store, paths: &Paths) -> Result<i64> {
    if let Some(state) = capture::state::read_state(&paths.state()) {
        if store.get_by_id(state.last_command_id)?.is_some() {
            return Ok(state.last_command_id);
        }
    }
    match store.last_user_command()? {
        Some(entry) => Ok(entry.id),
        None => bail!("No commands recorded yet; pass --id"),
    }
}

fn handle_export(paths: &Paths, file: Option<PathBuf>, limit: Option<usize>) -> Result<()> {
    let store = open_store(paths)?;
    let entries = store.all_for_export(limit)?;
    let path = file.unwrap_or_else(export::default_export_path);
    let format = export::export_entries(&path, &entries)?;
    println!(
        "\n  {} Exported {} commands as {} to {}\n",
        "✓".green(),
        entries.len().to_string().bold(),
        match format {
            export::ExportFormat::Csv => "CSV",
            export::ExportFormat::Markdown => "Markdown",
        },
        path.display().to_string().cyan()
    );
    Ok(())
}

fn handle_setup(
    paths: &Paths,
    config: &mut Config,
    output: &Output,
    yes: bool,
    no_hooks: bool,
    key: Option<String>,
) -> Result<()> {
    println!();
    let store = open_store(paths)?;
    println!(
        "  {} Database ready at {} ({} commands)",
        "✓".green(),
        paths.db().display().to_string().cyan(),
        store.count()?
    );

    if let Some(key) = key {
        config.llm.api_key = Some(key);
        save_config(paths, config)?;
        println!("  {} API key saved to {}", "✓".green(), paths.config().display());
    } else if !paths.config().exists() {
        save_config(paths, config)?;
        println!("  {} Wrote default config to {}", "✓".green(), paths.config().display());
    }

    if no_hooks {
        println!("  {} Skipping shell hooks", "●".dimmed());
    } else if yes || confirm(output, "Add repty hooks to ~/.bashrc and ~/.zshrc?")? {
        print_hook_outcomes(shell::hooks::install_all(
            &user_home()?,
            &shell::hooks::current_binary(),
        ));
    } else {
        println!("  {} Skipped. Run `repty install-hooks` later.", "●".dimmed());
    }
    println!();
    Ok(())
}

fn handle_uninstall(paths: &Paths, output: &Output, yes: bool) -> Result<()> {
    if !yes {
        if !output.interactive {
            bail!("Refusing to delete data without confirmation; pass -y");
        }
        if !confirm(output, "Remove repty hooks and delete all recorded history?")? {
            println!("\n  {} {}\n", "●".dimmed(), "Nothing removed.".dimmed());
            return Ok(());
        }
    }

    print_hook_outcomes(shell::hooks::remove_all(&user_home()?));

    let db = paths.db();
    let mut files = vec![
        db.clone(),
        sibling(&db, "-wal"),
        sibling(&db, "-shm"),
        paths.config(),
        paths.env_file(),
        paths.state(),
    ];
    files.retain(|f| f.exists());
    for file in files {
        match std::fs::remove_file(&file) {
            Ok(()) => println!("  {} Deleted {}", "✓".green(), file.display()),
            Err(e) => println!("  {} {}: {}", "✗".red(), file.display(), e),
        }
    }
    match std::fs::remove_dir(&paths.home) {
        Ok(()) => println!("  {} Deleted {}", "✓".green(), paths.home.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => println!("  {} Kept {}: {}", "●".dimmed(), paths.home.display(), e),
    }
    println!();
    Ok(())
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn confirm(output: &Output, prompt: &str) -> Result<bool> {
    if !output.interactive {
        return Ok(false);
    }
    print!("  {} {} [y/N] ", "?".cyan(), prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

// ─── Rich output helpers ────────────────────────────────────

fn print_hook_outcomes(outcomes: Vec<(PathBuf, Result<HookChange>)>) {
    println!();
    for (rc, outcome) in outcomes {
        match outcome {
            Ok(change @ (HookChange::Installed | HookChange::Removed)) => {
                println!("  {} {}: {}", "✓".green(), rc.display(), change)
            }
            Ok(change) => println!("  {} {}: {}", "●".dimmed(), rc.display(), change),
            Err(e) => println!("  {} {}: {:#}", "✗".red(), rc.display(), e),
        }
    }
}
