//! Identity store and the engine thread that owns it.
//!
//! The store is never shared directly: [`spawn_engine`] moves it onto a
//! dedicated thread and hands back a clone-safe [`EngineHandle`]. Every
//! read and write goes through that thread, one request at a time.

pub mod config;
pub mod engine;
pub mod store;

pub use config::{Config, ConfigError};
pub use engine::{
    spawn_engine, AddResult, Collaborators, CompareResult, EngineError, EngineHandle,
    EngineStatus, EnrollResult, MatchedIdentity, Recognition,
};
pub use store::{IdentityStore, StoreError, SNAPSHOT_FILE};
