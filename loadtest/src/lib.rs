//! This is a load testing library which runs [`Profile`]s of simulated clients against a product
//! API.
//!
//! Every simulated client repeatedly draws a weighted random operation, sends one request, and
//! then pauses for a uniformly distributed wait time. The default mix is read-heavy:
//!
//! - three reads of a random product in `1..=100`, accepting both found and not found,
//! - one health probe,
//! - one create of product details, with an identifier drawn from a counter shared by all
//!   clients of the profile,
//! - one read of a product in `100_000..=999_999`, which must not be found.
//!
//! Use [`run`] to execute profiles for a given duration and obtain a [`Report`].
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod counter;
pub mod error;
pub mod http;
pub mod observability;
pub mod operation;
pub mod profile;
pub mod report;
pub mod runner;

pub use crate::profile::Profile;
pub use crate::report::Report;
pub use crate::runner::run;
