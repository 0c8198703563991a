//! Shared application state

use crate::progress::SessionStore;
use yt2mp3_core::Config;

/// State shared across request handlers. Config is resolved once at startup;
/// the session store is the only mutable piece.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
        }
    }
}
