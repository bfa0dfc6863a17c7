//! Integration tests for the portal gateway
//!
//! These tests drive the full router, authentication middleware included,
//! against in-memory, mocked, and SQLite session stores.

mod api_tests;
mod auth_pipeline_tests;
