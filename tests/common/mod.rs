//! Common test utilities and helpers
//!
//! This module provides shared test infrastructure including:
//! - Identity fixtures and raw credentials
//! - A session store mock with error injection
//! - API test client

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;
pub use test_app::*;
