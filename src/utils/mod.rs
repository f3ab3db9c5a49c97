//! Utility functions and helpers.

pub mod clock;
pub mod hash;
pub mod http;
