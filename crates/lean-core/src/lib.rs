//! lean engine: resolves manifest requirements against a remote store of
//! prebuilt C/C++ packages and keeps a local cache in sync.
//!
//! The engine never prints; progress flows through [`Reporter`].

pub mod config;
pub mod diff;
pub mod graph;
pub mod host;
pub mod index;
pub mod install;
pub mod io;
pub mod locator;
pub mod manifest;
pub mod paths;
pub mod placement;
pub mod platform;
pub mod provenance;
pub mod remote;
pub mod request;
pub mod session;
pub mod sync;

pub mod reporter;

#[cfg(test)]
pub(crate) mod testing;

pub use reporter::{NullReporter, Reporter};
pub use session::{SyncError, SyncSession};
