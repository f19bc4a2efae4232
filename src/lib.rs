//! NEM market-data ingestion and fan-out backend.
//!
//! Pipeline: directory scan → archive fetch → record parse → tiered persist
//! (relational, raw archive, hot KV) → WebSocket fan-out, with a property
//! validator riding sideband. The binary wires these together in `main.rs`;
//! everything is exported here so the integration tests can drive the same
//! components directly.

pub mod alerts;
pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod duid;
pub mod hub;
pub mod ingest;
pub mod models;
pub mod parsers;
pub mod scrapers;
pub mod storage;
pub mod timemap;
pub mod trading;
pub mod validator;
