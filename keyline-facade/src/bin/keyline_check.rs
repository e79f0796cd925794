//! keyline-check - Verify that a store configuration builds and serves requests.
//!
//! Loads the properties file named by the first argument (or `KEYLINE_CONFIG`),
//! builds the client, writes, reads back and deletes a scratch key, then shuts
//! the client down.

use std::env;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use keyline_client::build;
use keyline_common::StoreProperties;
use keyline_facade::StoreFacade;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "KEYLINE_CONFIG";

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let path = env::args()
        .nth(1)
        .or_else(|| env::var(CONFIG_ENV).ok())
        .with_context(|| format!("usage: keyline-check <properties.json> (or set {CONFIG_ENV})"))?;
    let properties = StoreProperties::from_path(&path)
        .with_context(|| format!("failed to load store properties from {path}"))?;

    let client = build(&properties).context("failed to build store client")?;
    let store = StoreFacade::new(client.clone());
    let outcome = round_trip(&store);
    client.shutdown();
    outcome
}

fn round_trip(store: &StoreFacade) -> Result<()> {
    let checked = store.checked();
    let key = format!("keyline:check:{}", store.client().id());

    checked.set_with_ttl(&key, "ok", Duration::from_secs(30))?;
    let value: Option<String> = checked.get(&key)?;
    ensure!(value.as_deref() == Some("ok"), "scratch key read back as {value:?}");

    let ttl = checked.get_expire(&key)?;
    checked.delete(&[key.as_str()])?;
    info!(key = %key, ttl_ms = ttl.as_millis(), "store check passed");
    Ok(())
}
