use clap::Parser;
use gitgate::audit::AuditLogger;
use gitgate::error::AppResult;
use gitgate::{ConfigStore, Dispatcher, GitExecutor, ReplyFormatter, Request, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Console transport: reads `<machine> <path> <subcommand> [args...]` lines
/// from stdin and prints one reply per request.
#[derive(Debug, Parser)]
#[command(name = "gitgate", version, about)]
struct Args {
    /// Config file (.toml or .json)
    #[arg(short, long, default_value = "gitgate.toml")]
    config: PathBuf,

    /// Identity every request on this console is attributed to
    #[arg(short, long)]
    requester: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> AppResult<()> {
    let store = Arc::new(ConfigStore::open(&args.config)?);
    let config = store.snapshot();

    info!(
        machine = %config.machine_name,
        roots = config.allowed_paths.len(),
        users = config.allowed_user_ids.len(),
        commands = config.allowed_git_commands.len(),
        "starting gitgate"
    );

    // The git binary is fixed for the process; reloads change policy only.
    let executor = Arc::new(GitExecutor::new(&config.git_binary));
    let mut dispatcher = Dispatcher::new(executor);
    if let Some(path) = &config.audit_log {
        dispatcher = dispatcher.with_audit(Arc::new(AuditLogger::with_path(path)?));
    }
    let dispatcher = Arc::new(dispatcher);

    #[cfg(unix)]
    spawn_reload_on_hangup(Arc::clone(&store))?;

    let requester = UserId::new(args.requester);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        let Some(request) = parse_line(&requester, &line) else {
            if !line.trim().is_empty() {
                println!("usage: <machine> <path> <git-subcommand> [args...]");
            }
            continue;
        };

        let dispatcher = Arc::clone(&dispatcher);
        // Each request is judged against the snapshot current when it arrived.
        let config = store.snapshot();

        in_flight.spawn(async move {
            let reply = match dispatcher.dispatch(&config, &request).await {
                Ok(result) => Some(ReplyFormatter::execution(&config.machine_name, &request, &result)),
                Err(e) => ReplyFormatter::failure(&e),
            };

            if let Some(reply) = reply {
                println!("{}", reply.to_text());
            }
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "request task failed");
        }
    }

    Ok(())
}

/// `[/git] <machine> <path> <subcommand> [args...]`
fn parse_line(requester: &UserId, line: &str) -> Option<Request> {
    let mut words = line.split_whitespace().peekable();
    if words.peek() == Some(&"/git") {
        words.next();
    }

    let machine = words.next()?;
    let path = words.next()?;
    let subcommand = words.next()?;

    Some(Request {
        requester_id: requester.clone(),
        machine: machine.to_string(),
        target_path: path.to_string(),
        subcommand: subcommand.to_string(),
        extra_args: words.map(str::to_string).collect(),
    })
}

#[cfg(unix)]
fn spawn_reload_on_hangup(store: Arc<ConfigStore>) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangups = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangups.recv().await.is_some() {
            if let Err(e) = store.reload() {
                warn!(error = %e, "config reload failed; keeping previous config");
            }
        }
    });
    Ok(())
}
