//! Entity identifier helpers
//!
//! Every entity is keyed by a UUIDv4 stored as TEXT.

use crate::{Error, Result};
use uuid::Uuid;

/// Generate a new entity id
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

/// Parse an entity id from a path segment or payload field
pub fn parse_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|_| Error::InvalidInput(format!("Invalid id: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let id = new_id();
        assert_eq!(parse_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_id("not-a-uuid").is_err());
    }
}
