//! Common test utilities and fixtures for symbol-indexer integration tests
//!
//! This module provides:
//! - `TestWorkspace` for laying out upload, archive, store and temp
//!   directories under a `TempDir`
//! - `FakeBackend`, a scriptable `IndexingBackend` that records calls and
//!   tracks how many packages it processes concurrently

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fake_backend;
pub mod workspace;

pub use fake_backend::{FakeBackend, Script};
pub use workspace::TestWorkspace;
