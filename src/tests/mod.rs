//! Unit tests for the test runner and its event bus

pub mod events_test;
pub mod runner_test;
