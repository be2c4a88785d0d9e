//! Shared helpers for unit and integration tests.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::{assert_completes_within, wait_until, DEFAULT_TEST_TIMEOUT};
pub use fixtures::{fast_sync, push_only_sync, query, spawn_pair, NodePair};
