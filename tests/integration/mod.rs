// Integration tests for RustyPush
// This module organizes all integration tests

pub mod common;
