//! xblsync - incremental image sync for Xbox title and achievement art.
//!
//! Core library; the `xblsync` binary is a thin wrapper over [`cli`].

// Model types use `from_str` methods that return Option<Self>,
// not Result<Self, Error> as std::str::FromStr requires.
#![allow(clippy::should_implement_trait)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod http;
pub mod models;
pub mod services;
pub mod storage;
