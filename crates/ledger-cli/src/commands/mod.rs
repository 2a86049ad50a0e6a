pub mod add;
pub mod cache;
pub mod common;
pub mod delete;
pub mod pending;
pub mod sync;
pub mod update;
pub mod watch;
