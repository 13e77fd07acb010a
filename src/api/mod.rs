// API module
//
// HTTP surface of the node, used by clients and by peers during sync

pub mod handlers;
pub mod routes;
pub mod schema;

// Re-export main components for easier access
pub use routes::configure_routes;
