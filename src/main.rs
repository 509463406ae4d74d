use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use zoltraak::{load_file, Server, Settings};

#[derive(Debug, Parser)]
#[command(name = "zoltraak", version, about = "A RESP-compatible in-memory key-value server")]
struct Args {
    /// Port to listen on.
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind.
    #[arg(long)]
    bind: Option<String>,

    /// Working directory for the snapshot and append log.
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Enable the append-only log ("yes" or "no").
    #[arg(long)]
    appendonly: Option<String>,

    /// Replicate from a primary.
    #[arg(long, num_args = 2, value_names = ["HOST", "PORT"])]
    replicaof: Option<Vec<String>>,

    /// Optional config file, also the target of CONFIG REWRITE.
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::default();

    if let Some(path) = &args.config_file {
        if let Err(err) = load_file(path, &mut settings) {
            error!(path = %path.display(), %err, "could not read config file");
            return ExitCode::FAILURE;
        }
    }

    // Flags override the config file.
    if let Some(port) = args.port {
        settings.port = port;
    }
    if let Some(bind) = args.bind {
        settings.bind = bind;
    }
    if let Some(dir) = args.dir {
        settings.dir = dir;
    }
    if let Some(appendonly) = &args.appendonly {
        match appendonly.as_str() {
            "yes" => settings.appendonly = true,
            "no" => settings.appendonly = false,
            other => {
                error!(value = other, "--appendonly takes 'yes' or 'no'");
                return ExitCode::FAILURE;
            }
        }
    }

    let replicaof = match &args.replicaof {
        Some(pair) => {
            let Ok(port) = pair[1].parse::<u16>() else {
                error!(value = %pair[1], "--replicaof port is not a number");
                return ExitCode::FAILURE;
            };
            Some((pair[0].clone(), port))
        }
        None => None,
    };

    let server = match Server::bootstrap(settings.clone(), replicaof) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let listener = match TcpListener::bind((settings.bind.as_str(), settings.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(%err, bind = %settings.bind, port = settings.port, "could not bind");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = server.run(listener) => {
            if let Err(err) = result {
                error!(%err, "server stopped");
                return ExitCode::FAILURE;
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }
    ExitCode::SUCCESS
}
