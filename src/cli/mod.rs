//! # CLI Module
//!
//! Command-line interface for the anime file identifier.
//!
//! ## Usage
//! ```bash
//! # Identify and rename everything under a folder
//! anime-ident identify ~/Downloads/anime
//!
//! # Only show what would be renamed
//! anime-ident identify ~/Downloads/anime --test-mode
//!
//! # JSON output
//! anime-ident identify ep01.mkv --output json
//!
//! # Identify files as they finish downloading
//! anime-ident watch ~/Downloads/complete
//!
//! # Show the torrent catalog and retry backlog
//! anime-ident db list
//! ```

use anime_identifier::config::AppConfig;
use anime_identifier::core::catalog::SqliteCatalog;
use anime_identifier::core::pipeline::Pipeline;
use anime_identifier::core::plugin::{CollectorPlugin, RenamePlugin};
use anime_identifier::core::record::IdentificationResult;
use anime_identifier::core::session::AniDbSession;
use anime_identifier::core::watcher::{is_media_file, FolderWatcher, SettleQueue, WatcherConfig};
use anime_identifier::error::{IdentifierError, PipelineError, Result};
use anime_identifier::events::{
    ActionEvent, Event, EventChannel, EventReceiver, EventSender, HashEvent, LookupEvent,
    PipelineEvent, PipelineSummary, WatcherEvent,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::{style, Term};
use crossbeam_channel::{select, tick, unbounded};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Anime Identifier - name your anime files from AniDB
#[derive(Parser, Debug)]
#[command(name = "anime-ident")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: <config_dir>/anime-identifier/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identify files and folders
    Identify {
        /// Files or directories to identify
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,

        /// Output format
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
    /// Watch directories and identify new media files
    Watch {
        /// Directories to watch
        #[arg(required = true)]
        dirs: Vec<PathBuf>,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Inspect the catalog database
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
}

#[derive(Subcommand, Debug)]
enum DbCommand {
    /// List torrents and backlog entries
    List,
}

/// Options shared by the commands that run the pipeline
#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// Don't rename anything, only log what would happen
    #[arg(short, long)]
    test_mode: bool,

    /// Skip unreadable files instead of stopping
    #[arg(long)]
    skip_unreadable: bool,

    /// AniDB username
    #[arg(short, long)]
    username: Option<String>,

    /// AniDB password
    #[arg(short, long)]
    password: Option<String>,

    /// Rename template
    #[arg(long)]
    pattern: Option<String>,

    /// Move renamed files into this directory
    #[arg(short, long)]
    destination: Option<PathBuf>,
}

impl RunArgs {
    /// Overlay command-line flags on the loaded config
    fn apply(self, config: &mut AppConfig) {
        if self.test_mode {
            config.pipeline.test_mode = true;
        }
        if self.skip_unreadable {
            config.pipeline.skip_unreadable = true;
        }
        if let Some(username) = self.username {
            config.anidb.username = username;
        }
        if let Some(password) = self.password {
            config.anidb.password = password;
        }
        if let Some(pattern) = self.pattern {
            config.pipeline.rename_pattern = pattern;
        }
        if let Some(destination) = self.destination {
            config.pipeline.destination = Some(destination);
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with colors
    Pretty,
    /// JSON output for scripting
    Json,
}

/// Run the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    anime_identifier::init_tracing(&config.logging.level);

    match cli.command {
        Commands::Identify {
            paths,
            run,
            output,
            verbose,
        } => {
            run.apply(&mut config);
            run_identify(&config, &paths, output, verbose)
        }
        Commands::Watch { dirs, run } => {
            run.apply(&mut config);
            run_watch(&config, &dirs)
        }
        Commands::Db {
            command: DbCommand::List,
        } => run_db_list(&config),
    }
}

/// Build the pipeline with the rename plugin and a collector
fn build_pipeline(
    config: &AppConfig,
    events: EventSender,
) -> Result<(Pipeline, CollectorPlugin)> {
    if config.anidb.username.is_empty() || config.anidb.password.is_empty() {
        return Err(IdentifierError::Config(
            "AniDB username and password are required (config [anidb] or --username/--password)"
                .to_string(),
        ));
    }

    let collector = CollectorPlugin::new();
    let pipeline = Pipeline::builder()
        .credentials(config.credentials())
        .test_mode(config.pipeline.test_mode)
        .hash_failure(config.hash_failure_policy())
        .plugin(Box::new(RenamePlugin::new(config.rename_config())))
        .plugin(Box::new(collector.clone()))
        .events(events)
        .build(AniDbSession::new(config.session_config()));

    Ok((pipeline, collector))
}

/// Expand directories into the media files below them
fn collect_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(
                WalkDir::new(path)
                    .follow_links(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|p| is_media_file(p)),
            );
        } else {
            files.push(path.clone());
        }
    }
    files
}

/// What the event thread saw during a run
#[derive(Debug, Default)]
struct RunLog {
    not_found: Vec<String>,
    failures: Vec<String>,
}

fn spawn_event_thread(
    receiver: EventReceiver,
    progress: Option<ProgressBar>,
    verbose: bool,
) -> thread::JoinHandle<RunLog> {
    thread::spawn(move || {
        let mut log = RunLog::default();
        let tick = |message: String| {
            if let Some(ref pb) = progress {
                pb.inc(1);
                if verbose {
                    pb.set_message(message);
                }
            }
        };

        for event in receiver.iter() {
            match event {
                Event::Hash(HashEvent::Hashed { path, .. }) => {
                    if let Some(ref pb) = progress {
                        pb.set_message(file_label(&path));
                    }
                }
                Event::Hash(HashEvent::Skipped { path, message }) => {
                    tick(format!("skipped {}", file_label(&path)));
                    log.failures.push(format!("{}: {}", path.display(), message));
                }
                Event::Lookup(LookupEvent::NotFound { path, locator }) => {
                    tick(format!("not found {}", file_label(&path)));
                    log.not_found.push(locator);
                }
                Event::Lookup(LookupEvent::Failed { path, message, .. }) => {
                    tick(format!("failed {}", file_label(&path)));
                    log.failures.push(format!("{}: {}", path.display(), message));
                }
                Event::Action(ActionEvent::Processed { path }) => {
                    tick(format!("done {}", file_label(&path)));
                }
                Event::Pipeline(PipelineEvent::StageFailed { stage, message }) => {
                    log.failures.push(format!("{} stage: {}", stage, message));
                }
                Event::Pipeline(PipelineEvent::Stopped { .. }) => {
                    if let Some(ref pb) = progress {
                        pb.finish_and_clear();
                    }
                }
                _ => {}
            }
        }
        log
    })
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run_identify(
    config: &AppConfig,
    paths: &[PathBuf],
    output: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let term = Term::stderr();

    if matches!(output, OutputFormat::Pretty) {
        term.write_line(&format!(
            "{} {}",
            style("Anime Identifier").bold().cyan(),
            style(concat!("v", env!("CARGO_PKG_VERSION"))).dim()
        ))
        .ok();
        term.write_line("").ok();
    }

    let files = collect_files(paths);
    if files.is_empty() {
        warn!("No media files found");
        return Ok(());
    }

    let (sender, receiver) = EventChannel::new();
    let (mut pipeline, collector) = build_pipeline(config, sender.clone())?;

    let progress = if matches!(output, OutputFormat::Pretty) {
        let pb = ProgressBar::new(files.len() as u64);
        if let Ok(bar_style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(bar_style.progress_chars("█▓░"));
        }
        Some(pb)
    } else {
        None
    };

    let event_thread = spawn_event_thread(receiver, progress.clone(), verbose);

    let outcome = identify_all(&mut pipeline, &files, progress.as_ref());

    // Both the pipeline and this function hold senders
    drop(pipeline);
    drop(sender);
    let log = event_thread.join().unwrap_or_default();

    let summary = outcome?;
    let results = collector.results();

    match output {
        OutputFormat::Pretty => print_pretty_results(&term, &summary, &results, &log, config),
        OutputFormat::Json => print_json_results(&summary, &results, &log),
    }

    Ok(())
}

fn identify_all(
    pipeline: &mut Pipeline,
    files: &[PathBuf],
    progress: Option<&ProgressBar>,
) -> std::result::Result<PipelineSummary, PipelineError> {
    pipeline.start()?;
    let queued = pipeline.submit(files)?;
    // Anything that is not a regular file was skipped at submit
    if let Some(pb) = progress {
        pb.set_length(queued as u64);
    }
    pipeline.shutdown()
}

fn print_pretty_results(
    term: &Term,
    summary: &PipelineSummary,
    results: &[IdentificationResult],
    log: &RunLog,
    config: &AppConfig,
) {
    term.write_line(&format!("{} Identification Complete", style("✓").green().bold()))
        .ok();
    term.write_line("").ok();

    term.write_line(&format!(
        "  {} files submitted in {:.1}s",
        style(summary.submitted).cyan(),
        summary.duration_ms as f64 / 1000.0
    ))
    .ok();
    term.write_line(&format!("  {} identified", style(summary.identified).green()))
        .ok();
    if summary.not_found > 0 {
        term.write_line(&format!("  {} not found", style(summary.not_found).yellow()))
            .ok();
    }
    let failed = summary.lookup_failed + summary.hash_skipped;
    if failed > 0 {
        term.write_line(&format!("  {} failed", style(failed).red())).ok();
    }
    term.write_line("").ok();

    for result in results {
        let record = &result.record;
        term.write_line(&format!(
            "  {} {} - {} [{}] {}",
            style("●").green(),
            style(&record.romaji_name).bold(),
            record.episode_number,
            record.group_short_name,
            style(format!("crc {}", record.crc_status())).dim()
        ))
        .ok();
        term.write_line(&format!("    {}", style(result.path().display()).dim()))
            .ok();
    }

    if !log.not_found.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Not found:").bold().underlined()))
            .ok();
        for locator in &log.not_found {
            term.write_line(&format!("  {}", locator)).ok();
        }
    }

    if !log.failures.is_empty() {
        term.write_line("").ok();
        term.write_line(&format!("{}", style("Failures:").bold().underlined()))
            .ok();
        for failure in &log.failures {
            term.write_line(&format!("  {}", style(failure).red())).ok();
        }
    }

    if config.pipeline.test_mode {
        term.write_line("").ok();
        term.write_line(&format!(
            "{}",
            style("Test mode: no files were renamed.").dim()
        ))
        .ok();
    }
}

fn print_json_results(summary: &PipelineSummary, results: &[IdentificationResult], log: &RunLog) {
    let output = serde_json::json!({
        "summary": summary,
        "identified": results,
        "not_found": log.not_found,
        "failures": log.failures,
    });

    match serde_json::to_string_pretty(&output) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!(error = %e, "Failed to serialize results"),
    }
}

fn run_watch(config: &AppConfig, dirs: &[PathBuf]) -> Result<()> {
    let (sender, receiver) = EventChannel::new();
    let (mut pipeline, _collector) = build_pipeline(config, sender.clone())?;
    let event_thread = spawn_event_thread(receiver, None, false);

    let watcher_config = WatcherConfig::default();
    let mut settling = SettleQueue::new(watcher_config.debounce_duration);
    let (detected_tx, detected_rx) = unbounded::<PathBuf>();
    let watcher_events = sender.clone();
    let mut watcher = FolderWatcher::new(watcher_config, move |event| {
        if let WatcherEvent::FileDetected { path } = &event {
            let _ = detected_tx.send(path.clone());
        }
        watcher_events.send(Event::Watcher(event));
    })?;

    for dir in dirs {
        watcher.watch(dir)?;
        sender.send(Event::Watcher(WatcherEvent::Started { path: dir.clone() }));
        info!(dir = %dir.display(), "Watching");
    }

    pipeline.start()?;

    // Any stdin line (or EOF) stops the watch
    let (stop_tx, stop_rx) = unbounded::<()>();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = stop_tx.send(());
    });

    Term::stderr()
        .write_line(&format!(
            "{} {}",
            style("Watching for new files.").cyan(),
            style("Press Enter to stop.").dim()
        ))
        .ok();

    // Downloads fire many events per file; submit each once it settles
    let ticker = tick(Duration::from_millis(250));
    let mut submit_error = None;
    'watch: loop {
        select! {
            recv(detected_rx) -> path => match path {
                Ok(path) => settling.touch(path, Instant::now()),
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                for path in settling.ready(Instant::now()) {
                    if let Err(e) = pipeline.submit_one(&path) {
                        submit_error = Some(e);
                        break 'watch;
                    }
                }
            }
            recv(stop_rx) -> _ => break,
        }
    }
    if settling.pending_len() > 0 {
        info!(pending = settling.pending_len(), "Stopped before some files settled");
    }

    drop(watcher);
    let outcome = pipeline.shutdown();
    drop(pipeline);
    drop(sender);
    let log = event_thread.join().unwrap_or_default();

    for failure in &log.failures {
        warn!("{}", failure);
    }
    // A stage failure is the cause of a refused submit, so report it first
    let summary = outcome?;
    if let Some(e) = submit_error {
        return Err(e.into());
    }

    info!(
        identified = summary.identified,
        not_found = summary.not_found,
        "Stopped watching"
    );
    Ok(())
}

fn run_db_list(config: &AppConfig) -> Result<()> {
    let term = Term::stdout();
    let catalog = SqliteCatalog::open(&config.database_path())?;

    term.write_line(&format!("{}", style("Torrents").bold().underlined()))
        .ok();
    let torrents = catalog.torrents()?;
    if torrents.is_empty() {
        term.write_line(&format!("  {}", style("(none)").dim())).ok();
    }
    for torrent in torrents {
        let copied = if torrent.copied {
            style("copied").green()
        } else {
            style("pending").yellow()
        };
        term.write_line(&format!(
            "  {:>4}  {}  {}  {}",
            torrent.id, torrent.hash_string, copied, torrent.name
        ))
        .ok();
    }

    term.write_line("").ok();
    term.write_line(&format!("{}", style("Backlog").bold().underlined()))
        .ok();
    let backlog = catalog.backlog()?;
    if backlog.is_empty() {
        term.write_line(&format!("  {}", style("(none)").dim())).ok();
    }
    let now = chrono::Utc::now();
    for entry in backlog {
        let expire = entry.expire.format("%Y-%m-%d %H:%M").to_string();
        let expire = if entry.is_expired(now) {
            style(expire).red()
        } else {
            style(expire).dim()
        };
        term.write_line(&format!(
            "  {:>4}  runs {:>3}  expires {}  {}",
            entry.id,
            entry.runs,
            expire,
            entry.path.display()
        ))
        .ok();
    }

    Ok(())
}
