//! Turning the `clients:` section into live adapters.

use std::collections::BTreeMap;
use std::sync::Arc;

use pruner_config::{ClientConfig, ClientKind};
use pruner_torrent_core::TorrentClient;
use tracing::{debug, warn};

use crate::deluge::DelugeClient;
use crate::error::{AdapterError, AdapterResult};
use crate::qbittorrent::QbittorrentClient;
use crate::transmission::TransmissionClient;

/// Adapters keyed by their `clients:` entry name.
pub type ClientRegistry = BTreeMap<String, Arc<dyn TorrentClient>>;

/// Build the adapter for one `clients:` entry.
///
/// # Errors
///
/// Returns [`AdapterError::Unsupported`] for types without an adapter, or the
/// adapter's own construction error.
pub fn build_client(name: &str, config: &ClientConfig) -> AdapterResult<Arc<dyn TorrentClient>> {
    let client: Arc<dyn TorrentClient> = match config.client_kind() {
        ClientKind::QBittorrent => Arc::new(QbittorrentClient::from_config(name, &config.config)?),
        ClientKind::Transmission => {
            Arc::new(TransmissionClient::from_config(name, &config.config)?)
        }
        ClientKind::Deluge { v2 } => {
            Arc::new(DelugeClient::from_config(name, &config.config, v2)?)
        }
        ClientKind::Unsupported => {
            return Err(AdapterError::Unsupported {
                client: name.to_string(),
                kind: config.kind.clone(),
            });
        }
    };
    Ok(client)
}

/// Build every configured adapter. Entries that cannot be built are logged
/// and left out; profiles naming them are skipped at run time.
#[must_use]
pub fn build_clients(clients: &BTreeMap<String, ClientConfig>) -> ClientRegistry {
    clients
        .iter()
        .filter_map(|(name, config)| match build_client(name, config) {
            Ok(client) => {
                debug!(client = %name, kind = client.kind(), "client ready");
                Some((name.clone(), client))
            }
            Err(err) => {
                warn!(client = %name, error = %err, "skipping client");
                None
            }
        })
        .collect()
}
