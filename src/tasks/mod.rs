//! Background Tasks Module
//!
//! Long-lived tasks spawned at startup.
//!
//! # Tasks
//! - Request IDs: produces unique response identifiers ahead of demand

mod request_id;

pub use request_id::{spawn_request_id_generator, RequestIds, REQUEST_ID_QUEUE};
