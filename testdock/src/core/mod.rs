//! # testdock Core Infrastructure
//!
//! File: testdock/src/core/mod.rs
//!
//! ## Overview
//!
//! Foundational pieces shared by every other module:
//! - `config`: engine connection settings and container defaults
//! - `error`: the library error enum and `Result` alias
//!
pub mod config;
pub mod error;
