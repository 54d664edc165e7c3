use eventodb_server::state::AppState;
use evento_store::MessageStore;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Exit codes: 0 success, 1 generic error, 2 misconfiguration.
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Serve,
    Migrate,
}

#[derive(Debug)]
struct Config {
    data_dir: PathBuf,
    bind_addr: String,
    admin_token: Option<String>,
    test_mode: bool,
    log_level: String,
}

#[tokio::main]
async fn main() {
    let (command, config) = match parse_args(env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("error: {message}");
            eprintln!("{USAGE}");
            std::process::exit(EXIT_USAGE);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_level))
        .init();

    let store = match MessageStore::open(&config.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(dir = %config.data_dir.display(), error = %e, "failed to open store");
            std::process::exit(EXIT_ERROR);
        }
    };

    match command {
        Command::Migrate => {
            match store.migrate() {
                Ok(count) => {
                    info!(namespaces = count, "migrations applied");
                }
                Err(e) => {
                    tracing::error!(error = %e, "migration failed");
                    std::process::exit(EXIT_ERROR);
                }
            }
        }
        Command::Serve => serve(store, config).await,
    }
}

async fn serve(store: Arc<MessageStore>, config: Config) {
    if config.test_mode {
        info!("test mode enabled: token-less requests auto-provision namespaces");
    }
    let state = AppState::new(store, config.admin_token.clone(), config.test_mode);
    let router = eventodb_server::build_router(state);
    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %config.bind_addr, error = %e, "failed to bind");
            std::process::exit(EXIT_ERROR);
        }
    };
    info!(addr = %config.bind_addr, data_dir = %config.data_dir.display(), "server listening");
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server error");
        std::process::exit(EXIT_ERROR);
    }
    info!("server shut down gracefully");
}

const USAGE: &str = "usage: eventodb-server [serve|migrate] [options]
options:
  --data-dir <path>      data directory (env EVENTODB_DATA_DIR, default ./data)
  --bind <addr>          bind address (env EVENTODB_BIND_ADDR, default 0.0.0.0:8080)
  --admin-token <token>  admin bearer token (env EVENTODB_ADMIN_TOKEN)
  --test-mode            auto-provision namespaces for token-less requests
                         (env EVENTODB_TEST_MODE=1)
  --log-level <filter>   tracing filter (env LOG_LEVEL, default info)";

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Command, Config), String> {
    let mut command = None;
    let mut config = Config {
        data_dir: env::var("EVENTODB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data")),
        bind_addr: env::var("EVENTODB_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_owned()),
        admin_token: env::var("EVENTODB_ADMIN_TOKEN").ok(),
        test_mode: env::var("EVENTODB_TEST_MODE").is_ok_and(|v| v == "1" || v == "true"),
        log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned()),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "serve" | "migrate" => {
                if command.is_some() {
                    return Err("multiple subcommands given".to_owned());
                }
                command = Some(if arg == "serve" {
                    Command::Serve
                } else {
                    Command::Migrate
                });
            }
            "--data-dir" => {
                config.data_dir = PathBuf::from(take_value(&mut args, "--data-dir")?);
            }
            "--bind" => config.bind_addr = take_value(&mut args, "--bind")?,
            "--admin-token" => config.admin_token = Some(take_value(&mut args, "--admin-token")?),
            "--test-mode" => config.test_mode = true,
            "--log-level" => config.log_level = take_value(&mut args, "--log-level")?,
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok((command.unwrap_or(Command::Serve), config))
}

fn take_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} needs a value"))
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
