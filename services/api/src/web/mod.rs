pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

// Re-export the route handlers so the binary can assemble the router
// without reaching into submodules.
pub use middleware::require_auth;
pub use rest::{
    add_item_handler, import_items_handler, list_items_handler, remove_item_handler, ApiDoc,
};
