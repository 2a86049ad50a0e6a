//! Shared services used by every client surface.

mod store;

pub use store::LedgerStore;
