//! AeroLink Egress
//!
//! Everything that talks HTTP to the remote stores:
//! - `backend`: the transport boundary and its bounded response buffer
//! - `executor`: bounded-retry execution with scoped timeout overrides
//! - `auth`: credential lifecycle for the document store account
//! - `store`: path-addressed JSON CRUD with transparent re-auth
//! - `retention`: storage-bounded pruning over the document tree
//! - `ingest`: fixed-endpoint ingest backend with API-key auth
//! - `sink`: `TelemetrySink` implementations over both backends

pub mod auth;
pub mod backend;
pub mod executor;
pub mod ingest;
pub mod retention;
pub mod sink;
pub mod store;
