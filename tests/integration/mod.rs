//! Integration tests for Citrus
//! These tests focus on components working together rather than individual units

// Shared helpers
pub mod test_harness;

// Test modules
pub mod builder_dsl_test;
pub mod http_client_test;
pub mod http_server_test;
pub mod yaml_suite_test;
