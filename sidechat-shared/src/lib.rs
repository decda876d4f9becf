#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Shared building blocks for the Sidechat client: wire models,
//! configuration, AI answer stream assembly and read/unread tracking.

pub mod config;
pub mod models;
pub mod read_tracking;
pub mod streaming;
