//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use course_access_core::ports::DatabaseService;
use course_access_core::{AccessResolver, ProgressRecorder, StatisticsAggregator};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub access: AccessResolver,
    pub progress: ProgressRecorder,
    pub statistics: StatisticsAggregator,
}

impl AppState {
    /// Wires the core services around one store.
    pub fn new(db: Arc<dyn DatabaseService>, config: Arc<Config>) -> Self {
        Self {
            access: AccessResolver::new(db.clone()),
            progress: ProgressRecorder::new(db.clone()),
            statistics: StatisticsAggregator::new(db.clone()),
            db,
            config,
        }
    }
}
