//! Citrus integration test framework.
//!
//! Tests are sequences of [`actions::TestAction`]s that exchange messages
//! with [`endpoints::Endpoint`]s and validate what comes back. Tests are
//! written in YAML (see [`dsl`]) or with the fluent builders in
//! [`dsl::builder`], and executed by a [`testcase::TestRunner`].

pub mod actions;
pub mod common;
pub mod context;
pub mod dsl;
pub mod endpoints;
pub mod error;
pub mod functions;
pub mod kubernetes;
pub mod message;
pub mod report;
pub mod selenium;
pub mod settings;
pub mod sql;
pub mod testcase;
pub mod tools;
pub mod validation;

#[cfg(test)]
mod tests;

pub use actions::{ActionRef, TestAction};
pub use context::{TestContext, TestContextFactory};
pub use endpoints::{Endpoint, EndpointDefinition, EndpointRegistry};
pub use error::{CitrusError, CitrusResult, ErrorCategory, ErrorCode};
pub use message::{Message, MessageType};
pub use settings::{CitrusConfig, CitrusSettings};
pub use testcase::{load_tests, SuiteResult, TestCase, TestResult, TestRunner, TestStatus};
