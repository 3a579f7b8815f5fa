//! Gateway API
//!
//! Models, transport-independent services, and the REST edge.

pub mod models;
#[cfg(feature = "http")]
pub mod rest;
pub mod service;
