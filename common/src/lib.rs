//! Shared building blocks for the document database console.
//!
//! - `config`: environment-driven service configuration
//! - `errors`: the error taxonomy and its HTTP mapping
//! - `middleware`: request-scoped middleware
//! - `models`: wire models shared by handlers
//! - `response`: response envelopes

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;

pub use errors::{AppError, AppResult};
