use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use learn_core::SessionSettings;
use learn_core::model::{SessionMode, UserId};
use services::{
    Clock, IdentityProvider, SessionLoopService, SessionPersistence, StaticIdentity,
};
use storage::{FileSnapshotStore, Storage, UnavailableRemoteStore};
use tracing_subscriber::EnvFilter;

mod lesson;
mod runner;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingLesson,
    UnknownArg(String),
    InvalidMode { raw: String },
    InvalidUser { raw: String },
    InvalidSettle { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingLesson => write!(f, "--lesson is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidMode { raw } => write!(f, "invalid --mode value: {raw}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidSettle { raw } => write!(f, "invalid --settle-ms value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

struct Args {
    lesson: PathBuf,
    mode: SessionMode,
    db_url: String,
    snapshot_dir: PathBuf,
    user: Option<UserId>,
    settle_ms: Option<u64>,
    offline: bool,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --lesson <file.json> [--mode study|test] [--db <sqlite_url>]");
    eprintln!("                      [--snapshots <dir>] [--user <uuid>] [--settle-ms <ms>] [--offline]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --mode study");
    eprintln!("  --db sqlite:learn.sqlite3");
    eprintln!("  --snapshots .learn-snapshots");
    eprintln!("  no --user: guest session, progress kept locally only");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  LEARN_MODE, LEARN_DB_URL, LEARN_SNAPSHOT_DIR, LEARN_USER_ID, LEARN_SETTLE_MS, RUST_LOG");
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut lesson = None;
        let mut mode = std::env::var("LEARN_MODE")
            .ok()
            .and_then(|value| value.parse::<SessionMode>().ok())
            .unwrap_or(SessionMode::Study);
        let mut db_url = std::env::var("LEARN_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:learn.sqlite3".into()), normalize_sqlite_url);
        let mut snapshot_dir = std::env::var("LEARN_SNAPSHOT_DIR")
            .ok()
            .map_or_else(|| PathBuf::from(".learn-snapshots"), PathBuf::from);
        let mut user = std::env::var("LEARN_USER_ID")
            .ok()
            .and_then(|value| value.parse::<UserId>().ok());
        let mut settle_ms = std::env::var("LEARN_SETTLE_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok());
        let mut offline = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--lesson" => lesson = Some(PathBuf::from(require_value(args, "--lesson")?)),
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    mode = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--snapshots" => {
                    snapshot_dir = PathBuf::from(require_value(args, "--snapshots")?);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    user = Some(
                        value
                            .parse()
                            .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?,
                    );
                }
                "--settle-ms" => {
                    let value = require_value(args, "--settle-ms")?;
                    settle_ms = Some(
                        value
                            .parse()
                            .map_err(|_| ArgsError::InvalidSettle { raw: value.clone() })?,
                    );
                }
                "--offline" => offline = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            lesson: lesson.ok_or(ArgsError::MissingLesson)?,
            mode,
            db_url,
            snapshot_dir,
            user,
            settle_ms,
            offline,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

async fn open_storage(args: &Args) -> Result<Storage, Box<dyn std::error::Error>> {
    if args.offline {
        tracing::info!(dir = %args.snapshot_dir.display(), "running offline");
        return Ok(Storage {
            snapshots: Arc::new(FileSnapshotStore::open(&args.snapshot_dir)?),
            remote: Arc::new(UnavailableRemoteStore),
        });
    }

    // Schema migrations run here, before any session is opened.
    prepare_sqlite_file(&args.db_url)?;
    Ok(Storage::sqlite(&args.db_url, &args.snapshot_dir).await?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let lesson = lesson::load_lesson(&args.lesson)?;
    let storage = open_storage(&args).await?;

    let identity: Arc<dyn IdentityProvider> = Arc::new(match args.user {
        Some(user) => StaticIdentity::user(user),
        None => StaticIdentity::guest(),
    });
    let persistence = SessionPersistence::new(Clock::system(), storage, identity);

    let mut settings = SessionSettings::default();
    if let Some(ms) = args.settle_ms {
        settings = settings.with_settle_delay_ms(ms)?;
    }
    let service = SessionLoopService::new(persistence, Arc::new(runner::ConsoleAudio))
        .with_settings(settings);

    let controller = service.start(lesson, args.mode).await?;
    tracing::info!(
        session = %controller.session_id(),
        mode = %args.mode,
        resumed = controller.was_resumed(),
        "session started"
    );
    runner::run(controller).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
