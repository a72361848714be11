//! # testdock Archive Utilities (`common::archive`)
//!
//! File: testdock/src/common/archive/mod.rs
//!
//! Archive handling needed to talk to the engine. Currently this is only the
//! build context upload used by image builds.
//!

pub mod context;
