//! # repofs-daemon
//!
//! HTTP front end for repofs. Each tenant `(org, repo)` is a git remote
//! mirrored under the working directory; requests read, replace or delete
//! files in that mirror and every change is committed and pushed before the
//! response is sent.
//!
//! ## Usage
//!
//! ```text
//! WORKDIR=/srv/repofs repofs-daemon --listen 0.0.0.0:2070
//!
//! curl http://localhost:2070/acme/site/README.md
//! curl -X PUT --data-binary @notes.md http://localhost:2070/acme/site/notes.md
//! curl -X DELETE -d 'remove notes' http://localhost:2070/acme/site/notes.md
//! ```

mod routes;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use repofs_mirror::{MirrorConfig, MirrorService, SettingsFile};

/// Git-backed multi-tenant file server.
#[derive(Parser)]
#[command(name = "repofs-daemon", about = "Git-backed multi-tenant file server")]
struct Cli {
    /// Root directory holding `<org>/<repo>` mirrors.
    #[arg(long, env = "WORKDIR")]
    workdir: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "REPOFS_LISTEN", default_value = "0.0.0.0:2070")]
    listen: SocketAddr,

    /// Optional TOML settings file with a `[git]` table.
    #[arg(long, env = "REPOFS_CONFIG", default_value = "repofs.toml")]
    config: PathBuf,

    /// Emit JSON log lines instead of text.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let settings = SettingsFile::load_or_default(&cli.config)?;
    let config = MirrorConfig::new(&cli.workdir, settings.git);
    config.validate()?;

    std::fs::create_dir_all(&config.workdir)
        .with_context(|| format!("creating working directory {}", config.workdir.display()))?;

    tracing::info!("Working directory: {}", config.workdir.display());
    tracing::info!("Remote template: {}", config.git.remote_url_template);

    let service = Arc::new(MirrorService::new(&config));
    let app = routes::router(service);

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("binding {}", cli.listen))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("repofs-daemon shutting down");
    Ok(())
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("repofs_daemon=info".parse()?)
        .add_directive("repofs_mirror=info".parse()?)
        .add_directive("repofs_vcs=info".parse()?)
        .add_directive("tower_http=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
