//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use pact_engine_core::ports::{IdentityService, PactStore, SubscriptionService};
use pact_engine_core::CheckInRecorder;
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
///
/// Handlers never read the caller from here; identity arrives per request via the
/// auth middleware.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PactStore>,
    pub subscriptions: Arc<dyn SubscriptionService>,
    pub identity: Arc<dyn IdentityService>,
    pub recorder: CheckInRecorder,
    pub config: Arc<Config>,
}
