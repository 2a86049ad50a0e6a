//! Data models for the ledger client

mod entity;
mod mutation;
mod sync_conflict;

pub use entity::{
    Collection, Entity, EntityId, EntityType, Payment, PaymentType, Product, Rate, Supplier,
};
pub use mutation::{MutationAction, PendingMutation};
pub use sync_conflict::{ConflictRecord, ResolutionAction, SyncConflict};
