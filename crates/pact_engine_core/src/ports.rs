//! crates/pact_engine_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engine's collaborators.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the managed backend, the identity provider and billing.

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::{
    CheckIn, NewPact, Pact, PactStatus, RoastRequest, RoastThread, SubscriptionTier,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A stored record violates a domain invariant.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait PactStore: Send + Sync {
    // --- Pacts ---
    async fn get_pact(&self, pact_id: Uuid) -> PortResult<Pact>;

    async fn create_pact(&self, pact: NewPact) -> PortResult<Pact>;

    async fn set_pact_status(&self, pact_id: Uuid, status: PactStatus) -> PortResult<()>;

    /// Exact count of `active` pacts owned by the group.
    async fn count_active_pacts(&self, group_id: Uuid) -> PortResult<u32>;

    // --- Check-ins ---

    /// Atomically inserts a check-in.
    ///
    /// Returns `Ok(None)` when a check-in for the same (pact, user, date) already
    /// exists. The store must enforce this as a uniqueness constraint.
    async fn insert_check_in(&self, check_in: CheckIn) -> PortResult<Option<CheckIn>>;

    /// All check-ins of a pact, ordered by `check_in_date` ascending.
    async fn get_check_ins_for_pact(&self, pact_id: Uuid) -> PortResult<Vec<CheckIn>>;
}

#[async_trait]
pub trait RoastThreadService: Send + Sync {
    /// Opens a thread for a fold. Repeated calls for one check-in yield the same thread.
    async fn create_thread(&self, check_in_id: Uuid) -> PortResult<RoastThread>;
}

/// Hands roast requests to a worker without waiting for them.
pub trait RoastQueue: Send + Sync {
    fn enqueue(&self, request: RoastRequest) -> PortResult<()>;
}

#[async_trait]
pub trait SubscriptionService: Send + Sync {
    async fn tier_for_group(&self, group_id: Uuid) -> PortResult<SubscriptionTier>;
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolves an auth session token issued by the identity provider to a user id.
    async fn resolve_session(&self, token: &str) -> PortResult<Uuid>;
}
