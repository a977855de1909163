//! Shared building blocks for the warehouse explorer service.
//!
//! - `config`: service settings and the logical database registry
//! - `errors`: boundary error taxonomy and its HTTP mapping
//! - `middleware`: request id propagation
//! - `models`: request/response payloads
//! - `response`: error envelope
//! - `utils`: SQL identifier and pattern helpers

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
pub mod utils;
