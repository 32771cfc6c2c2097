//! # Scaffolder Testing Utils
//!
//! Shared testing utilities for the scaffolder task pool.
//! This crate provides task builders, misbehaving executors and worker
//! spawners, and configuration helpers used by the tests of the other crates.
//!
//! ## Features
//!
//! - **Task Builders**: render/validate/transform tasks with sensible payloads
//! - **Mock Executors**: slow, hanging, panicking and failing executors
//! - **Scripted Spawners**: workers that reject, hang, crash or reply wrongly
//! - **Helpers**: small configurations with short timeouts
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! scaffolder-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
