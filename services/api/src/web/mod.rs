pub mod middleware;
pub mod rest;
pub mod state;

// Re-export the handlers to make them easily accessible
// to the binary that builds the web server router.
pub use middleware::require_auth;
pub use rest::{
    archive_pact_handler, check_in_handler, create_pact_handler, due_handler,
    pact_limit_handler, stats_handler,
};
