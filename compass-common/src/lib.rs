//! # Compass Common Library
//!
//! Shared code for the Compass performance-management backend:
//! - Error types
//! - Configuration and data-directory resolution
//! - Database pool and schema initialisation
//! - Domain models and enums
//! - Change signals dispatched by the entity store
//! - Persian (Jalali) calendar helpers

pub mod config;
pub mod db;
pub mod error;
pub mod ids;
pub mod jalali;
pub mod models;
pub mod signals;

pub use error::{Error, Result};
pub use signals::Signal;
