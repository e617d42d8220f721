//! Shared fixtures for the end-to-end session tests.

pub mod helpers;

pub use helpers::*;
