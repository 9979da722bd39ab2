//! Server Module
//!
//! HTTP surface of the asset server: the request orchestrator, the router
//! and the transport that writes cached or streamed content.

pub mod handlers;
pub mod routes;
pub mod transport;

pub use handlers::{
    asset_handler, AppState, VarLookup, CSP_BODY_LIMIT, REQUEST_ID_HEADER, REQUEST_ID_PREFIX,
};
pub use routes::create_router;
