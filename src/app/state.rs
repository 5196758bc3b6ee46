//! Application state management.

use std::sync::Arc;

use crate::domain::DatabaseClient;

use super::service::AppService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AppService>,
    pub db_client: Arc<dyn DatabaseClient>,
}

impl AppState {
    /// Create a new application state
    #[must_use]
    pub fn new(service: Arc<AppService>, db_client: Arc<dyn DatabaseClient>) -> Self {
        Self { service, db_client }
    }
}
