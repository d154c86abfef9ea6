//! Data-directory plumbing shared by the `inferticket` binary and its tests.
//!
//! Layout under the data directory:
//! - `store/`: one JSON document per partition
//! - `locks/`: lock files shared by every process using this directory
//! - `config.json`: optional [`ClientConfig`] overrides

use anyhow::{Context, Result};
use inferticket_client::ClientConfig;
use inferticket_store::{
    FileLock, FileLockConfig, ImportPayload, ImportSummary, JsonFileKv, StoreConfig, TicketStore,
};
use inferticket_types::TicketCounts;
use std::path::Path;
use std::sync::Arc;

/// Opens the file-backed ticket store under `data_dir`.
pub async fn open_store(data_dir: &Path) -> Result<TicketStore> {
    let kv = JsonFileKv::open(data_dir.join("store"))
        .await
        .with_context(|| format!("opening ticket store in {}", data_dir.display()))?;
    let lock = FileLock::new(data_dir.join("locks"), FileLockConfig::default());
    let store = TicketStore::open(Arc::new(kv), Arc::new(lock), StoreConfig::default())
        .await
        .context("loading tickets")?;
    Ok(store)
}

/// Reads `config.json` from `data_dir` if present, then applies `base_url`.
pub fn load_config(data_dir: &Path, base_url: Option<&str>) -> Result<ClientConfig> {
    let path = data_dir.join("config.json");
    let mut config = if path.exists() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
    } else {
        ClientConfig::default()
    };
    if let Some(url) = base_url {
        config.base_url = url.to_string();
    }
    config.validate().context("invalid client configuration")?;
    Ok(config)
}

/// Writes a partitioned export of `store` to `path`.
pub async fn export_to(store: &TicketStore, path: &Path) -> Result<usize> {
    let export = store.export_tickets().await?;
    let total = export.active.len() + export.archived.len();
    let json = serde_json::to_string_pretty(&export)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(total)
}

/// Imports tickets from a JSON file (an export, or a flat legacy list).
pub async fn import_from(store: &TicketStore, path: &Path) -> Result<ImportSummary> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let payload = ImportPayload::from_json(&text)
        .with_context(|| format!("{} is not a ticket export", path.display()))?;
    Ok(store.import_tickets(payload).await?)
}

/// One-line summary of the store.
pub fn format_status(counts: &TicketCounts) -> String {
    format!(
        "{} available, {} reserved, {} used",
        counts.available(),
        counts.reserved,
        counts.archived
    )
}
