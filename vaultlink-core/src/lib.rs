//! vaultlink core library: link graph store, link resolution, rewrites and the
//! engines that keep them in step.
//!
//! The mutating entry points live in [`engine`]: [`engine::add`],
//! [`engine::delete`] and [`engine::disambiguate`] keep a persisted
//! [`store::SqliteStore`] consistent with the documents of a [`vault::Vault`],
//! while [`engine::build`] populates the store from a full scan.

pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod paths;
pub mod progress;
pub mod query;
pub mod resolve;
pub mod rewrite;
pub mod store;
pub mod types;
pub mod vault;
