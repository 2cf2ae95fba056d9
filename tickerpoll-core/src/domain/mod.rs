//! Domain types for tickerpoll

pub mod bar;
pub mod ticker;

pub use bar::{Bar, DedupKey};
pub use ticker::Ticker;
