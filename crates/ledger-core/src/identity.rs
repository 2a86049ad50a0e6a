//! Stable per-installation device identity.

use crate::services::LedgerStore;
use crate::Result;

const CLIENT_ID_KEY: &str = "client_id";

/// Identity attached to every mutation this device sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    client_id: String,
}

impl DeviceIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    /// Load the persisted client id, generating and storing one on first use.
    pub async fn load_or_create(store: &LedgerStore) -> Result<Self> {
        if let Some(client_id) = store.get_setting(CLIENT_ID_KEY).await? {
            if !client_id.trim().is_empty() {
                return Ok(Self::new(client_id));
            }
        }

        let client_id = uuid::Uuid::now_v7().to_string();
        store.set_setting(CLIENT_ID_KEY, &client_id).await?;
        tracing::info!("Generated new device client id {client_id}");
        Ok(Self::new(client_id))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}
