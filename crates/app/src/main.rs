use std::fmt;
use std::io;
use std::sync::Arc;

use learn_core::model::{SessionId, StudyMode, TopicId};
use services::{
    FlowError, GatewayConfig, HttpSessionGateway, InMemoryStudyServer, SessionGateway,
    SessionOrchestrator, TopicFixture,
};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

mod terminal;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    MissingTopicId,
    InvalidTopicId { raw: String },
    InvalidMode { raw: String },
    InvalidSessionId { raw: String },
    InvalidDbUrl { raw: String },
    MissingServer,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::MissingTopicId => write!(f, "--topic-id is required"),
            ArgsError::InvalidTopicId { raw } => write!(f, "invalid --topic-id value: {raw}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --mode value: {raw} (expected written or practical)")
            }
            ArgsError::InvalidSessionId { raw } => write!(f, "invalid --session-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::MissingServer => write!(
                f,
                "{} is not set; pass --offline to study against the built-in server",
                services::config::ENV_BASE_URL
            ),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- --topic-id <id> [--mode written|practical] [--session-id <id>] [--db <sqlite_url>] [--offline]"
    );
    eprintln!();
    eprintln!("Without --session-id the topic is studied session-less.");
    eprintln!("--offline uses an in-memory study server with generated questions.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --mode written");
    eprintln!("  --db sqlite:study.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_TOPIC_ID, STUDY_MODE, STUDY_SESSION_ID, STUDY_DB_URL");
    eprintln!("  STUDY_API_BASE_URL, STUDY_API_TOKEN, STUDY_API_TIMEOUT_SECS");
    eprintln!("  RUST_LOG (default info)");
}

struct Args {
    topic_id: TopicId,
    mode: StudyMode,
    session_id: Option<SessionId>,
    db_url: String,
    offline: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut topic_id = std::env::var("STUDY_TOPIC_ID")
            .ok()
            .map(|raw| parse_topic_id(&raw))
            .transpose()?;
        let mut mode = std::env::var("STUDY_MODE")
            .ok()
            .map(|raw| parse_mode(&raw))
            .transpose()?
            .unwrap_or(StudyMode::Written);
        let mut session_id = std::env::var("STUDY_SESSION_ID")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| parse_session_id(&raw))
            .transpose()?;
        let mut db_url = std::env::var("STUDY_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://study.sqlite3".into(), normalize_sqlite_url);
        let mut offline = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--topic-id" => {
                    let value = require_value(args, "--topic-id")?;
                    topic_id = Some(parse_topic_id(&value)?);
                }
                "--mode" => {
                    let value = require_value(args, "--mode")?;
                    mode = parse_mode(&value)?;
                }
                "--session-id" => {
                    let value = require_value(args, "--session-id")?;
                    session_id = Some(parse_session_id(&value)?);
                }
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
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
            topic_id: topic_id.ok_or(ArgsError::MissingTopicId)?,
            mode,
            session_id,
            db_url,
            offline,
        })
    }
}

fn parse_topic_id(raw: &str) -> Result<TopicId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidTopicId {
        raw: raw.to_string(),
    })
}

fn parse_session_id(raw: &str) -> Result<SessionId, ArgsError> {
    raw.parse().map_err(|_| ArgsError::InvalidSessionId {
        raw: raw.to_string(),
    })
}

fn parse_mode(raw: &str) -> Result<StudyMode, ArgsError> {
    StudyMode::parse(raw).ok_or_else(|| ArgsError::InvalidMode {
        raw: raw.to_string(),
    })
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
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
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

fn build_gateway(args: &Args) -> Result<Arc<dyn SessionGateway>, Box<dyn std::error::Error>> {
    if args.offline {
        let server = InMemoryStudyServer::new();
        server.add_topic(TopicFixture::generated(
            args.topic_id,
            &format!("Topic {}", args.topic_id),
            4,
            5,
            3,
        ))?;
        return Ok(Arc::new(server));
    }

    let config = GatewayConfig::from_env()?.ok_or(ArgsError::MissingServer)?;
    tracing::info!(base_url = %config.base_url, "using study server");
    Ok(Arc::new(HttpSessionGateway::new(config)?))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup so resume handles survive restarts.
    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let gateway = build_gateway(&args)?;

    let mut orchestrator = SessionOrchestrator::new(
        gateway,
        Arc::clone(&storage.handles),
        args.topic_id,
        args.mode,
        args.session_id,
    );

    match orchestrator.initialize().await {
        Ok(_) => {}
        Err(FlowError::NotFound) => {
            tracing::warn!("session not found, starting a new one");
            orchestrator.restart().await?;
        }
        Err(err) => return Err(err.into()),
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    terminal::drive(&mut orchestrator, &mut input).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
