//! Uniform access to a persona's durable message history.
//!
//! The backing store is a tagged union selected once per identity change:
//! identified users read and clear through the remote message collection,
//! guests use per-persona slots in the device-local database. The two
//! variants behave identically from the caller's perspective; an identity
//! change swaps the variant and forces a reload, never a merge.

pub mod local;
pub mod remote;

use std::sync::Arc;

use crate::api::ApiClient;
use crate::error::Result;
use crate::model::{Identity, Message};

pub use local::LocalHistory;
pub use remote::RemoteHistory;

/// History store variant for the current identity.
pub enum HistoryStore {
    /// Identified: remote message collection, exclusively.
    Remote(RemoteHistory),
    /// Guest: device-local slots, exclusively.
    Local(Arc<LocalHistory>),
}

impl HistoryStore {
    /// Select the variant for an identity. Remote failures never fall
    /// back to the local variant; the boundary is hard.
    pub fn select(identity: &Identity, api: Arc<ApiClient>, local: Arc<LocalHistory>) -> Self {
        if identity.is_identified() {
            Self::Remote(RemoteHistory::new(api))
        } else {
            Self::Local(local)
        }
    }

    /// Load the full message history for a persona.
    pub async fn load(&self, persona_id: i64, identity: &Identity) -> Result<Vec<Message>> {
        match self {
            Self::Remote(remote) => remote.load(persona_id, identity).await,
            Self::Local(local) => local.load(persona_id),
        }
    }

    /// Persist the timeline after a user send or a completed assistant
    /// reply. Remote: no-op (already appended server-side). Local: the
    /// persona's slot is overwritten with the full timeline.
    pub async fn append(&self, persona_id: i64, timeline: &[Message]) -> Result<()> {
        match self {
            Self::Remote(remote) => remote.append(persona_id).await,
            Self::Local(local) => local.replace(persona_id, timeline),
        }
    }

    /// Clear the stored history for a persona.
    pub async fn clear(&self, persona_id: i64, identity: &Identity) -> Result<()> {
        match self {
            Self::Remote(remote) => remote.clear(persona_id, identity).await,
            Self::Local(local) => local.clear(persona_id),
        }
    }

    /// Whether this is the remote variant.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::config::ApiConfig;
    use tempfile::TempDir;

    #[test]
    fn selection_follows_identity() {
        let api = Arc::new(ApiClient::new(&ApiConfig::default()));
        let dir = TempDir::new().unwrap();
        let local = Arc::new(LocalHistory::open(dir.path()).unwrap());

        let guest = HistoryStore::select(&Identity::Guest, api.clone(), local.clone());
        assert!(!guest.is_remote());

        let identified =
            HistoryStore::select(&Identity::Identified("u-1".into()), api, local);
        assert!(identified.is_remote());
    }
}
