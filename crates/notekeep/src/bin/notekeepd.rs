//! `notekeepd`: runs the verification pipeline until Ctrl-C.
//!
//! Configuration comes from `NOTEKEEP_*` variables (or a `.env` file).
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::sync::Arc;

use notekeep::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), NotekeepError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let transport = HttpMailTransport::new(config.mail.clone())?;
    let policy = FilePolicyStore::open_or_seed(&config.policy.path).await?;
    tracing::info!(path = %policy.path().display(), "policy store ready");

    let cache = Arc::new(MemoryCache::new());
    let purger = cache.spawn_purge(config.cache_purge_interval);

    let app = Notekeep::builder()
        .config(config)
        .build(MemoryUserStore::new(), Arc::clone(&cache), transport, policy)
        .await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "could not listen for Ctrl-C, shutting down");
    }

    let stats = app.shutdown().await?;
    purger.abort();
    if stats.pending > 0 {
        tracing::warn!(pending = stats.pending, "undelivered verification emails dropped");
    }
    Ok(())
}
