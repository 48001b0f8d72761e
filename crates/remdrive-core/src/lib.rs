//! Remdrive Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `ItemId`, `CachedEntry`, `Anchor`, `ChangeSet`, `RemotePath`
//! - **Port definitions** - Traits for adapters: `IMetadataStore`, `IRemoteLister`,
//!   `IChangeNotifier`
//! - **Configuration** - Typed config with YAML loading and defaults
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure data types and policies with no I/O.
//! Ports define trait interfaces that adapter crates implement: the metadata
//! store is implemented by `remdrive-store`, and the sync coordinator in
//! `remdrive-sync` drives both ports.

pub mod config;
pub mod domain;
pub mod ports;
