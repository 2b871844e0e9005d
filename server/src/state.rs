use std::sync::Arc;

use crate::db::Database;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Bearer token required on every API route; `None` disables the check.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Database, api_token: Option<String>) -> Self {
        Self {
            db,
            api_token: api_token.map(Arc::from),
        }
    }
}
