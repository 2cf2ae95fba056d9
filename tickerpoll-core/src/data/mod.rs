//! Data layer: providers, universe, cursor, store, and dedup

pub mod circuit_breaker;
pub mod cursor;
pub mod dedup;
pub mod polygon;
pub mod provider;
pub mod store;
pub mod universe;

pub use circuit_breaker::CircuitBreaker;
pub use cursor::{CursorError, CursorStore, FileCursor, MemoryCursor};
pub use dedup::dedupe;
pub use polygon::{backoff_delay, PolygonInitError, PolygonProvider, PolygonSettings};
pub use provider::{BarProvider, FetchError};
pub use store::{BarStore, CsvBarStore, IndexedStore, StoreError, STORE_HEADER};
pub use universe::{LoadError, Universe};
