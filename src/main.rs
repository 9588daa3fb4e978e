use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use marginalia::config::{Cli, Command, Config, default_config_dir, default_config_path};
use marginalia::dom;
use marginalia::handler::AppState;
use marginalia::restore;
use marginalia::store::{FileStorage, HighlightStore};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let args = Cli::parse();

    // --config puts data next to the config file, otherwise ~/.marginalia/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let storage = FileStorage::new(data_dir.join(cfg.app.get_store())).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to open highlight storage");
        std::process::exit(1);
    });
    let store = HighlightStore::new(Arc::new(storage));

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg, store).await,
        Command::Render { url, input, output } => render(&store, &url, &input, output.as_deref()),
        Command::List { url } => list(&store, url.as_deref()),
        Command::Delete { id } => delete(&store, &id),
    };

    if let Err(e) = result {
        tracing::error!(error = %marginalia::unpack_error(&*e), "command failed");
        std::process::exit(1);
    }
}

async fn serve(cfg: &Config, store: HighlightStore) -> Result<()> {
    tracing::info!("marginalia.svc starting");
    let state = AppState::new(store, cfg.app.default_color);
    let app = marginalia::routes(state);

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;

    tracing::info!("marginalia.svc running on {}", &address);
    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("ctrl+c signal received, preparing to shutdown");
                signal_token.cancel();
            }
            _ = signal_token.cancelled() => {}
        }
    });

    let token = cancellation_token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("server stopped unexpectedly")?;
    cancellation_token.cancel();

    tracing::info!("marginalia.svc going off, graceful shutdown complete");
    Ok(())
}

fn render(store: &HighlightStore, url: &str, input: &Path, output: Option<&Path>) -> Result<()> {
    let html = std::fs::read_to_string(input).with_context(|| format!("failed to read {:?}", input))?;
    let records = store.list_by_url(url)?;

    let mut doc = dom::parse_html(&html);
    let report = restore::restore_all(&mut doc, &records);
    tracing::info!(
        url,
        restored = report.restored.len(),
        failed = report.failed.len(),
        "rendered highlights"
    );

    let rendered = doc.to_html();
    match output {
        Some(path) => std::fs::write(path, rendered).with_context(|| format!("failed to write {:?}", path))?,
        None => println!("{}", rendered),
    }
    Ok(())
}

fn list(store: &HighlightStore, url: Option<&str>) -> Result<()> {
    let records = match url {
        Some(url) => store.list_by_url(url)?,
        None => store.list_all()?,
    };
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

fn delete(store: &HighlightStore, id: &str) -> Result<()> {
    if store.remove(id)? {
        tracing::info!(id, "highlight deleted");
    } else {
        tracing::warn!(id, "no highlight with that id");
    }
    Ok(())
}
