use std::sync::Arc;

use crate::config::SyncSettings;
use crate::services::{Backend, SharedTokenProvider, SyncClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub client: SyncClient,
    /// Identity tokens pushed in by the presentation layer
    pub tokens: Arc<SharedTokenProvider>,
}

impl AppState {
    /// Builds the sync engine around `backend`
    pub fn new(backend: Arc<dyn Backend>, settings: SyncSettings) -> Self {
        let tokens = Arc::new(SharedTokenProvider::new());
        let client = SyncClient::new(backend, tokens.clone(), settings);
        Self { client, tokens }
    }
}
