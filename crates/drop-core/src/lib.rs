//! Core types and trait definitions for the drop access core.
//!
//! No HTTP or database code lives here. Storage backends, the blob store,
//! and the payment provider are traits implemented by other crates.

#![allow(async_fn_in_trait)]

pub mod blob;
pub mod bundle;
pub mod error;
pub mod ledger;
pub mod payment;
pub mod session;
pub mod store;
pub mod user;

pub use error::{Error, Result};
