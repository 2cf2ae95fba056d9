//! tickerpoll core: domain types and the data layer of the ingestion loop.
//!
//! This crate contains everything below the batch cycle:
//! - Domain types (tickers, bars, dedup keys)
//! - Bar provider trait with the Polygon aggregates implementation
//! - Circuit breaker shared by provider requests
//! - Universe loader, durable cursor, append-only CSV bar store
//! - Dedup merger keyed on (ticker, timestamp)

pub mod data;
pub mod domain;
