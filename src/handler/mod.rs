//! Request handler module
//!
//! Method policy, path resolution and file loading for the content root.

pub mod error;
pub mod router;
pub mod static_files;

// Re-export main entry point
pub use error::ServeError;
pub use router::handle_request;
