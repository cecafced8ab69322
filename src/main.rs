//! CLI entry point for `attachpoll`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};

use attachpoll::config::{self, Config};
use attachpoll::export::DirectorySink;
use attachpoll::scheduler;
use attachpoll::source::ImapSource;
use attachpoll::store::{CursorStore, SqliteCursorStore};
use attachpoll::sync::{ResetOutcome, SyncEngine, SyncOptions};

#[derive(Parser)]
#[command(
    name = "attachpoll",
    version,
    about = "Poll a mailbox and save new PDF attachments",
    long_about = "Poll an IMAP mailbox on a fixed interval and save attachments of newly \
arrived messages to a directory. Progress is kept in a SQLite cursor so messages are \
never processed twice."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (overridden by $ATTACHPOLL_CONFIG)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Seconds between two checks
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,

    /// Point the cursor at the newest message without extracting, then exit
    #[arg(long, conflicts_with = "once")]
    reset: bool,

    /// Run a single check, then exit
    #[arg(long)]
    once: bool,

    /// Save every attachment, not only PDFs
    #[arg(long)]
    all_attachments: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the stored cursor
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        _ => {}
    }

    let mut config = config::load_config(cli.config.as_deref())?;
    config.apply_env_overrides();
    if let Some(secs) = cli.interval {
        config.sync.interval_secs = secs;
    }
    if cli.all_attachments {
        config.sync.extension.clear();
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    if let Some(Commands::Status { json }) = cli.command {
        return cmd_status(&config, json);
    }

    config.validate()?;
    let engine = build_engine(&config)?;

    if cli.reset {
        cmd_reset(engine)
    } else if cli.once {
        cmd_once(engine)
    } else {
        cmd_poll(engine, &config)
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_dir = config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "attachpoll.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Wire the IMAP source, SQLite cursor and attachment directory together.
fn build_engine(config: &Config) -> anyhow::Result<SyncEngine> {
    let store = SqliteCursorStore::open(&config.storage.database).with_context(|| {
        format!(
            "Cannot open cursor database {}",
            config.storage.database.display()
        )
    })?;
    let sink = DirectorySink::new(&config.storage.attachments_dir)?;
    let source = ImapSource::new(config.imap.clone());

    Ok(SyncEngine::new(
        Box::new(source),
        Box::new(store),
        Box::new(sink),
        SyncOptions::from_config(config),
    ))
}

/// Poll forever, until SIGINT/SIGTERM.
fn cmd_poll(engine: SyncEngine, config: &Config) -> anyhow::Result<()> {
    let period = Duration::from_secs(config.sync.interval_secs);
    tracing::info!(
        interval_secs = config.sync.interval_secs,
        mailbox = %config.imap.mailbox,
        extension = config.sync.accepted_extension().as_deref().unwrap_or("*"),
        attachments_dir = %config.storage.attachments_dir.display(),
        "Starting email attachment monitor"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Cannot start async runtime")?;
    runtime.block_on(scheduler::run(engine, period));
    Ok(())
}

/// One cycle, then exit.
fn cmd_once(mut engine: SyncEngine) -> anyhow::Result<()> {
    let report = engine.run_cycle()?;

    println!();
    println!("  {:<25} {}", "Search", report.predicate);
    println!("  {:<25} {}", "Messages found", report.messages_found);
    println!("  {:<25} {}", "New messages", report.messages_new);
    println!(
        "  {:<25} {}",
        "With attachments", report.messages_processed
    );
    println!(
        "  {:<25} {}",
        "Attachments saved",
        report.attachments_saved.len()
    );
    if report.attachments_failed > 0 {
        println!("  {:<25} {}", "Failed to save", report.attachments_failed);
    }
    if let Some(total) = report.fallback_total {
        println!("  {:<25} {}", "Total (ALL fallback)", total);
    }
    println!("  {:<25} {}", "Cursor advanced", report.cursor_advanced);
    for saved in &report.attachments_saved {
        println!("    {}", saved.location);
    }
    println!();
    Ok(())
}

/// Fast-forward the cursor to the newest message.
fn cmd_reset(mut engine: SyncEngine) -> anyhow::Result<()> {
    match engine.reset()? {
        ResetOutcome::Reset(cursor) => println!(
            "  Reset cursor to latest message: {} ({})",
            cursor.last_message_id.as_deref().unwrap_or("-"),
            cursor.last_processed_at.as_deref().unwrap_or("-")
        ),
        ResetOutcome::EmptyMailbox => println!("  No messages found in mailbox; cursor unchanged."),
    }
    Ok(())
}

/// Print the stored cursor.
fn cmd_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = SqliteCursorStore::open(&config.storage.database)?;
    let cursor = store.read()?;
    let updated_at = store.updated_at()?;

    if json {
        let out = serde_json::json!({
            "database": config.storage.database.to_string_lossy(),
            "cursor": cursor,
            "updated_at": updated_at,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Database", config.storage.database.display());
    if cursor.is_empty() {
        println!("  {:<20} (not set)", "Cursor");
    } else {
        println!(
            "  {:<20} {}",
            "Last message",
            cursor.last_message_id.as_deref().unwrap_or("-")
        );
        println!(
            "  {:<20} {}",
            "Last UID",
            cursor.last_sequence.as_deref().unwrap_or("-")
        );
        println!(
            "  {:<20} {}",
            "Last processed",
            cursor.last_processed_at.as_deref().unwrap_or("-")
        );
    }
    if let Some(updated_at) = updated_at {
        println!("  {:<20} {}", "Updated", updated_at);
    }
    println!();
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "attachpoll", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
