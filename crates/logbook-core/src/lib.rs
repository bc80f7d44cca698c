//! Core types and the mention-aware document consistency engine for Logbook.
//!
//! This crate has no database dependencies. Storage backends implement
//! [`store::LogStore`]; the codec, mention extraction, relabeling, rename
//! propagation and rescans sit above that seam.

// `LogStore` impls use `async fn`; the trait itself declares `Send` futures.
#![allow(async_fn_in_trait)]

pub mod actions;
pub mod cascade;
pub mod document;
pub mod entity;
pub mod error;
pub mod mention;
pub mod ordering;
pub mod rewrite;
pub mod session;
pub mod store;

pub use error::{Error, Result};
