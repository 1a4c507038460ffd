//! Blobstack server - minimal object storage with presigned capability URLs.
//!
//! Replays the metadata log, then serves the HTTP API until interrupted.
//! Shutdown is a cooperative drain: the accept loop stops, in-flight
//! connections finish, and only then is the metadata log closed.
//!
//! # Usage
//!
//! ```text
//! BLOBSTACK_SECRET_FILE=/etc/blobstack/secret blobstack-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BLOBSTACK_LISTEN` | `0.0.0.0:8088` | Bind address |
//! | `BLOBSTACK_DATA_DIR` | `./data` | Blob storage root |
//! | `BLOBSTACK_LOG_FILE` | `<data_dir>/metadata.log` | Metadata log path |
//! | `BLOBSTACK_SECRET` | *(unset)* | Inline signing secret |
//! | `BLOBSTACK_SECRET_FILE` | *(unset)* | Path to signing-secret file |
//! | `BLOBSTACK_GENERATE_SECRET` | `false` | Generate a random secret |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//!
//! Exactly one secret source must be configured; startup fails otherwise.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use rand::Rng;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use blobstack_core::{BlobConfig, MetadataStore};
use blobstack_http::{AppState, BlobHttpService};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Resolve the token-signing secret from the configured source.
///
/// Precedence: generated > inline env value > secret file. Startup is fatal
/// when no source is configured -- serving with an empty or guessable secret
/// would let anyone forge capability tokens.
fn resolve_secret(config: &BlobConfig) -> Result<Vec<u8>> {
    if config.generate_secret {
        let mut secret = vec![0_u8; 32];
        rand::rng().fill_bytes(&mut secret);
        warn!("using a generated signing secret; tokens will not verify across restarts");
        return Ok(secret);
    }
    if let Some(inline) = &config.secret {
        return Ok(inline.clone().into_bytes());
    }
    if let Some(path) = &config.secret_file {
        return std::fs::read(path).with_context(|| format!("failed to read secret file '{path}'"));
    }
    anyhow::bail!(
        "no signing secret configured; set BLOBSTACK_SECRET, BLOBSTACK_SECRET_FILE, \
         or BLOBSTACK_GENERATE_SECRET=1"
    )
}

/// Run the accept loop, serving connections until a shutdown signal is
/// received, then drain in-flight connections.
async fn serve(listener: TcpListener, service: BlobHttpService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    // Wait for in-flight requests to complete.
    graceful.shutdown().await;
    info!("all connections drained");

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BlobConfig::from_env();

    init_tracing(&config.log_level)?;

    let secret = resolve_secret(&config)?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data dir '{}'", config.data_dir))?;

    // A corrupt log aborts startup: the process never serves requests with
    // an unreconstructable index.
    let store = MetadataStore::new();
    store
        .initialize(config.log_path())
        .with_context(|| format!("failed to replay metadata log '{}'", config.log_path().display()))?;

    info!(
        listen = %config.listen,
        data_dir = %config.data_dir,
        log_file = %config.log_path().display(),
        version = VERSION,
        "starting Blobstack server",
    );

    let state = Arc::new(AppState::new(store, secret, config.data_dir.clone()));
    let service = BlobHttpService::new(Arc::clone(&state));

    let addr: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await?;

    // Drain finished; refuse any late mutations and drop the log handle.
    state.store.close();

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_should_prefer_inline_secret_over_file() {
        let config = BlobConfig {
            secret: Some("inline".to_owned()),
            secret_file: Some("/nonexistent".to_owned()),
            ..BlobConfig::default()
        };
        assert_eq!(resolve_secret(&config).unwrap(), b"inline");
    }

    #[test]
    fn test_should_read_secret_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from-file").unwrap();

        let config = BlobConfig {
            secret_file: Some(file.path().to_string_lossy().into_owned()),
            ..BlobConfig::default()
        };
        assert_eq!(resolve_secret(&config).unwrap(), b"from-file");
    }

    #[test]
    fn test_should_generate_secret_when_asked() {
        let config = BlobConfig {
            generate_secret: true,
            ..BlobConfig::default()
        };
        let secret = resolve_secret(&config).unwrap();
        assert_eq!(secret.len(), 32);
    }

    #[test]
    fn test_should_fail_without_secret_source() {
        let config = BlobConfig::default();
        assert!(resolve_secret(&config).is_err());
    }
}
