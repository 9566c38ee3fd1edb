//! Database access layer
//!
//! Pool construction and schema creation. Entity queries live in the server
//! crate next to the handlers that use them.

pub mod init;

pub use init::{create_all_tables, init_database};
