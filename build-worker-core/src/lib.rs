#![doc = "build-worker-core: core pipeline library for build-worker."]

//! This crate contains the whole build pipeline: running the project's build,
//! locating the static output it produced, rewriting root-relative asset paths,
//! and uploading the output tree to an object store.
//! Concrete store clients and configuration loading live in the `build-worker` crate.
//!
//! # Usage
//! Build a [`config::RunContext`], pick a [`contract::BuildInvoker`] and a
//! [`contract::Uploader`], and hand them to [`run::run`].

pub mod build;
pub mod config;
pub mod contract;
pub mod locate;
pub mod rewrite;
pub mod run;
pub mod source;
pub mod upload;
