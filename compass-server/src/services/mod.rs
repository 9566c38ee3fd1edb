//! Domain services layered over the entity store
//!
//! Handlers write entities through `db`, then hand a [`compass_common::Signal`]
//! to [`dispatch`]. Everything derived from a write (access rows, snapshots,
//! timeline events) is computed here, inside the caller's transaction, so a
//! request commits all of its consequences or none of them.

pub mod access;
pub mod dispatch;
pub mod performance;
pub mod pipeline;
pub mod roles;
pub mod visibility;
