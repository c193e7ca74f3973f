//! Process-wide connection-pool registry keyed by connection parameters.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::{StoreConfig, StoreError};

static POOLS: OnceLock<Mutex<HashMap<String, SqlitePool>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, SqlitePool>> {
    POOLS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns the pool for `config.url`, building it on first use. Identical
/// connection parameters always share one pool within the process.
pub async fn shared_pool(config: &StoreConfig) -> Result<SqlitePool, StoreError> {
    {
        let pools = registry()
            .lock()
            .map_err(|_| StoreError::storage("pool registry lock poisoned"))?;
        if let Some(pool) = pools.get(&config.url) {
            return Ok(pool.clone());
        }
    }

    let pool = build_pool(config).await?;

    let mut pools = registry()
        .lock()
        .map_err(|_| StoreError::storage("pool registry lock poisoned"))?;
    // A concurrent caller may have won the build race; keep the first pool.
    if let Some(existing) = pools.get(&config.url) {
        return Ok(existing.clone());
    }

    pools.insert(config.url.clone(), pool.clone());
    Ok(pool)
}

/// Builds a standalone pool outside the shared registry. Used by tests and
/// by callers that need isolated in-memory databases.
pub async fn build_pool(config: &StoreConfig) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|error| StoreError::invalid_request(format!("invalid store url: {error}")))?
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await
        .map_err(|error| StoreError::storage(format!("failed to connect store pool: {error}")))
}
