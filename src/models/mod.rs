//! Log record models
//!
//! Serializable records written to the structured log.

pub mod access_log;

pub use access_log::AccessLog;
