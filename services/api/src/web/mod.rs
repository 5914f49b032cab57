pub mod auth;
pub mod extract;
pub mod lessons;
pub mod middleware;
pub mod products;
pub mod protocol;
pub mod rest;
pub mod router;
pub mod state;
pub mod views;

// Re-export the router builder so the binary and the integration tests
// construct exactly the same application.
pub use middleware::require_auth;
pub use router::build_router;
