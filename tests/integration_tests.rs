//! Integration tests for Citrus
//! These tests run YAML projects end to end against real endpoints

mod integration;
