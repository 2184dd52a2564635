//! CLI command implementations

use crate::output::{ellipsize_start, format_bytes, format_count, print_json, print_output};
use crate::progress::TransferProgress;
use crate::select::Selection;
use crate::{ConfigAction, OutputFormat, RepoArgs};
use anyhow::{anyhow, bail, Context, Result};
use console::style;
use hfmd_core::{HfmdCore, JobReport, TransferJob};
use hfmd_types::{
    FileClass, FileDescriptor, RepoKind, RepoRef, SearchQuery, Settings, TaskState, TransferEvent,
};
use indicatif::ProgressBar;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Exit status after Ctrl-C, as shells report for SIGINT
const EXIT_INTERRUPTED: u8 = 130;

/// Build a repository reference from the command line.
///
/// A leading `datasets/` selects the dataset namespace, as in Hub URLs.
fn repo_ref(target: &RepoArgs, default_revision: &str) -> Result<RepoRef> {
    let (kind, id) = match target.repo.strip_prefix("datasets/") {
        Some(id) => (RepoKind::Dataset, id),
        None if target.dataset => (RepoKind::Dataset, target.repo.as_str()),
        None => (RepoKind::Model, target.repo.as_str()),
    };
    let id = id.trim_matches('/');

    if id.is_empty() || id.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
        bail!("Invalid repository id: {:?}", target.repo);
    }

    let revision = target.revision.as_deref().unwrap_or(default_revision);
    Ok(RepoRef::new(kind, id, revision))
}

fn spinner(message: impl Into<String>, format: OutputFormat) -> ProgressBar {
    if format == OutputFormat::Json {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ============================================================================
// Hub Commands
// ============================================================================

pub async fn search(
    core: &HfmdCore,
    query: Option<String>,
    datasets: bool,
    author: Option<String>,
    sort: String,
    limit: u32,
    format: OutputFormat,
) -> Result<()> {
    let kind = if datasets {
        RepoKind::Dataset
    } else {
        RepoKind::Model
    };
    let query = SearchQuery {
        search: query,
        author,
        sort: Some(sort),
        descending: true,
        limit: Some(limit),
    };

    let pb = spinner("Searching...", format);
    let results = core.search(kind, &query).await;
    pb.finish_and_clear();
    let results = results?;

    match format {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct RepoRow {
                id: String,
                downloads: String,
                likes: String,
                task: String,
                updated: String,
            }

            let rows: Vec<RepoRow> = results
                .iter()
                .map(|r| RepoRow {
                    id: r.id.clone(),
                    downloads: r.downloads.map(format_count).unwrap_or_default(),
                    likes: r.likes.map(format_count).unwrap_or_default(),
                    task: r.pipeline_tag.clone().unwrap_or_default(),
                    updated: r
                        .last_modified
                        .map(|d| d.format("%Y-%m-%d").to_string())
                        .unwrap_or_default(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => {
            if results.is_empty() {
                println!("{}", style("No repositories found").dim());
                return Ok(());
            }

            for repo in &results {
                let mut stats = Vec::new();
                if let Some(downloads) = repo.downloads {
                    stats.push(format!("↓ {}", format_count(downloads)));
                }
                if let Some(likes) = repo.likes {
                    stats.push(format!("♥ {}", format_count(likes)));
                }
                if let Some(task) = &repo.pipeline_tag {
                    stats.push(task.clone());
                }
                println!(
                    "{} {}  {}",
                    style("•").cyan(),
                    style(&repo.id).bold(),
                    style(stats.join("  ")).dim()
                );
            }
        }
    }

    Ok(())
}

pub async fn list_files(core: &HfmdCore, target: RepoArgs, format: OutputFormat) -> Result<()> {
    let repo = repo_ref(&target, &core.get_settings().await.default_revision)?;

    let pb = spinner(format!("Listing {}...", repo), format);
    let files = core.list_files(&repo).await;
    pb.finish_and_clear();
    let files = files.with_context(|| format!("Failed to list files of {}", repo))?;

    match format {
        OutputFormat::Json => print_json(&files)?,
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct FileRow {
                path: String,
                class: FileClass,
                size: String,
            }

            let rows: Vec<FileRow> = files
                .iter()
                .map(|f| FileRow {
                    path: ellipsize_start(&f.path, 60),
                    class: f.class(),
                    size: f.size.map(format_bytes).unwrap_or_else(|| "?".to_string()),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
        OutputFormat::Human => print_file_groups(&repo, &files),
    }

    Ok(())
}

fn print_file_groups(repo: &RepoRef, files: &[FileDescriptor]) {
    if files.is_empty() {
        println!("{}", style("Repository has no files").dim());
        return;
    }

    let mut groups: BTreeMap<FileClass, Vec<&FileDescriptor>> = BTreeMap::new();
    for file in files {
        groups.entry(file.class()).or_default().push(file);
    }

    for (class, members) in &groups {
        let size: u64 = members.iter().filter_map(|f| f.size).sum();
        println!(
            "{} {}",
            style(class.label()).bold().cyan(),
            style(format!("({} files, {})", members.len(), format_bytes(size))).dim()
        );
        for file in members {
            println!(
                "  {}  {}",
                file.path,
                style(file.size.map(format_bytes).unwrap_or_default()).dim()
            );
        }
    }

    let total: u64 = files.iter().filter_map(|f| f.size).sum();
    println!();
    println!(
        "{} file(s), {} total in {}",
        style(files.len()).bold(),
        style(format_bytes(total)).bold(),
        repo
    );
}

pub async fn show_card(core: &HfmdCore, target: RepoArgs, format: OutputFormat) -> Result<()> {
    let repo = repo_ref(&target, &core.get_settings().await.default_revision)?;

    match core.fetch_card(&repo).await? {
        Some(card) => print_output(&card, format)?,
        None if format == OutputFormat::Json => print_json(&serde_json::Value::Null)?,
        None => println!("{}", style(format!("{} has no card", repo)).dim()),
    }

    Ok(())
}

// ============================================================================
// Download Command
// ============================================================================

pub async fn download(
    core: &HfmdCore,
    target: RepoArgs,
    out_dir: Option<PathBuf>,
    selection: Selection,
    jobs: Option<u32>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let settings = core.get_settings().await;
    let repo = repo_ref(&target, &settings.default_revision)?;

    if let Some(jobs) = jobs {
        core.settings.write().await.max_concurrent_transfers = jobs;
    }

    let pb = spinner(format!("Listing {}...", repo), format);
    let listed = core.list_files(&repo).await;
    pb.finish_and_clear();
    let listed = listed.with_context(|| format!("Failed to list files of {}", repo))?;

    let files = selection.apply(&listed)?;
    if files.is_empty() {
        if format == OutputFormat::Json {
            print_json(&Vec::<FileDescriptor>::new())?;
        } else {
            println!("{}", style("Nothing selected").dim());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let destination = out_dir.unwrap_or_else(|| settings.default_destination.join(&repo.id));
    let total: u64 = files.iter().filter_map(|f| f.size).sum();
    if format != OutputFormat::Json {
        println!(
            "{} Downloading {} file(s) ({}) from {} into {}",
            style("↓").cyan().bold(),
            files.len(),
            format_bytes(total),
            style(&repo).cyan(),
            destination.display()
        );
    }

    // Ctrl-C cancels the job; partial files stay for the next run
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping transfers");
            interrupt.cancel();
        }
    });

    let job = TransferJob::new(destination.clone(), repo, files).with_cancellation(cancel);

    let mut events = core.subscribe();
    let mut updates = core.subscribe_progress();
    let renderer = tokio::spawn(async move {
        let mut progress = TransferProgress::new(format != OutputFormat::Json);
        loop {
            // Lifecycle first so a bar exists before its byte counts arrive
            let received = tokio::select! {
                biased;
                event = events.recv() => event,
                update = updates.recv() => update,
            };
            match received {
                Ok(event) => {
                    let done = matches!(event, TransferEvent::JobFinished { .. });
                    progress.handle_event(&event);
                    if done {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Progress renderer skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        progress.clear();
    });

    let report = core.download(job).await;
    if let Err(e) = renderer.await {
        debug!("Progress renderer stopped: {}", e);
    }

    match format {
        OutputFormat::Json => print_json(&report)?,
        _ => print_report(&report, &destination),
    }

    Ok(exit_code(&report))
}

fn print_report(report: &JobReport, destination: &std::path::Path) {
    for (path, error) in report.failures() {
        println!("{} {}: {}", style("✗").red().bold(), path, style(error).red());
    }

    let completed = report.count(TaskState::Completed);
    let skipped = report.count(TaskState::Skipped);
    let failed = report.count(TaskState::Failed);
    let cancelled = report.count(TaskState::Cancelled);

    let icon = if failed > 0 || cancelled > 0 {
        style("!").yellow().bold()
    } else {
        style("✓").green().bold()
    };
    println!(
        "{} {} downloaded, {} already present, {} failed, {} cancelled",
        icon, completed, skipped, failed, cancelled
    );
    if cancelled > 0 || failed > 0 {
        println!(
            "  {}",
            style("Run the same command again to resume the remaining files").dim()
        );
    } else {
        println!("  Files are in {}", destination.display());
    }
}

fn exit_code(report: &JobReport) -> ExitCode {
    if report.any_cancelled() {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

// ============================================================================
// Config Commands
// ============================================================================

const CONFIG_KEYS: &[&str] = &[
    "endpoint",
    "default_destination",
    "default_revision",
    "max_concurrent_transfers",
    "chunk_size",
    "connect_timeout_secs",
    "user_agent",
    "token",
];

fn config_value(settings: &Settings, key: &str) -> Result<String> {
    let value = match key {
        "endpoint" => settings.endpoint.clone(),
        "default_destination" => settings.default_destination.display().to_string(),
        "default_revision" => settings.default_revision.clone(),
        "max_concurrent_transfers" => settings.max_concurrent_transfers.to_string(),
        "chunk_size" => settings.chunk_size.to_string(),
        "connect_timeout_secs" => settings.connect_timeout_secs.to_string(),
        "user_agent" => settings.user_agent.clone(),
        "token" => match &settings.token {
            Some(_) => "(set)".to_string(),
            None => "(not set)".to_string(),
        },
        _ => return Err(anyhow!("Unknown config key: {} (known: {})", key, CONFIG_KEYS.join(", "))),
    };
    Ok(value)
}

fn set_config_value(settings: &mut Settings, key: &str, value: String) -> Result<()> {
    match key {
        "endpoint" => settings.endpoint = value,
        "default_destination" => settings.default_destination = PathBuf::from(value),
        "default_revision" => settings.default_revision = value,
        "max_concurrent_transfers" => settings.max_concurrent_transfers = value.parse()?,
        "chunk_size" => {
            let size: usize = value.parse()?;
            if size == 0 {
                bail!("chunk_size must be greater than zero");
            }
            settings.chunk_size = size;
        }
        "connect_timeout_secs" => settings.connect_timeout_secs = value.parse()?,
        "user_agent" => settings.user_agent = value,
        "token" => settings.token = Some(value).filter(|t| !t.is_empty()),
        _ => return Err(anyhow!("Unknown config key: {} (known: {})", key, CONFIG_KEYS.join(", "))),
    }
    Ok(())
}

pub async fn config_action(
    core: &HfmdCore,
    action: Option<ConfigAction>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        None | Some(ConfigAction::Show) => {
            let settings = core.storage.load_settings().await?;

            match format {
                OutputFormat::Json => {
                    let mut shown = settings.clone();
                    if shown.token.is_some() {
                        shown.token = Some("(set)".to_string());
                    }
                    print_json(&shown)?;
                }
                _ => {
                    println!("hfmd Configuration:");
                    println!("  (stored in {})", core.storage.data_dir().display());
                    println!();
                    for key in CONFIG_KEYS {
                        println!("  {}: {}", key, config_value(&settings, key)?);
                    }
                }
            }
        }

        Some(ConfigAction::Get { key }) => {
            let settings = core.storage.load_settings().await?;
            let value = if key == "token" {
                settings.token.clone().unwrap_or_default()
            } else {
                config_value(&settings, &key)?
            };
            println!("{}", value);
        }

        Some(ConfigAction::Set { key, value }) => {
            let mut settings = core.storage.load_settings().await?;
            set_config_value(&mut settings, &key, value)?;

            core.update_settings(settings).await?;
            println!("{} Config updated", style("✓").green().bold());
        }

        Some(ConfigAction::Reset) => {
            use dialoguer::Confirm;

            let confirmed = Confirm::new()
                .with_prompt("Reset all settings to defaults?")
                .default(false)
                .interact()?;

            if confirmed {
                core.update_settings(Settings::default()).await?;
                println!("{} Settings reset to defaults", style("✓").green().bold());
            }
        }
    }

    Ok(())
}
