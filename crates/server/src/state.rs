//! Shared handler state.

use std::sync::Arc;

use pgo_store::ProfileStore;

/// State handed to every handler. Cloning shares the store.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}
