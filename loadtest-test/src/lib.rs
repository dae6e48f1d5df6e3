//! Test utilities for the load tester.
//!
//! This crate provides utilities to facilitate testing of the load tester against a real HTTP
//! server. See the modules for all available utilities.

pub mod server;
pub mod tracing;
