//! Session registry
//!
//! Tracks the logical sessions (tabs) a user has open, gives them stable ids
//! and distinguishable titles, disconnects their transports when they close,
//! and carries the set across restarts through a [`SessionStore`].

mod autosave;
mod error;
mod registry;
mod service;
pub mod store;
mod tab;

pub use autosave::{spawn_autosave, Autosave, DEFAULT_AUTOSAVE_DELAY};
pub use error::RegistryError;
pub use registry::{SessionRegistry, HOST_MANAGER_TAB_ID, MAX_SPLIT_SCREEN_TABS};
pub use service::{RegistryConfig, TabService};
pub use store::{FileSessionStore, HttpSessionStore, MemorySessionStore, SessionDocument, SessionStore};
pub use tab::{HostConfig, NewTab, Tab, TabType};
