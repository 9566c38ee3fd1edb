//! HTTP API handlers

pub mod career;
pub mod feedbacks;
pub mod forms;
pub mod health;
pub mod notes;
pub mod one_on_ones;
pub mod org;
pub mod performance;
pub mod profile;
pub mod users;
