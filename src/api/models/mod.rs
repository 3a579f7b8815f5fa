//! API models
//!
//! Request and response shapes plus the unified error type shared by every
//! transport.

pub mod errors;
pub mod requests;
pub mod responses;

pub use errors::{ApiError, ApiResult};
