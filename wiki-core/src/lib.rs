//! Versioned document-tree core for a collaborative wiki: content-addressed
//! blobs, immutable revision snapshots, a change-request branching workflow,
//! and a three-way tree-and-content merge.
//!
//! The crate has no transport, no authentication, and no persistence layer
//! of its own — callers supply an authenticated [`store::Context`] to every
//! operation and hold onto a [`store::WikiStore`] as the engine's "database".
//! [`ops`] is the flat external operation surface a transport layer would
//! sit behind; the other modules are its components.

#[macro_use]
extern crate log;

pub mod apply;
pub mod blob;
pub mod change_request;
pub mod config;
pub mod diff;
pub mod editor;
pub mod error;
pub mod hash;
pub mod id;
pub mod linediff;
pub mod merge;
pub mod model;
pub mod ops;
pub mod revision;
pub mod slug;
pub mod store;
pub mod tree;

pub use config::WikiConfig;
pub use error::{ErrorKind, WikiError, WikiErrorExt, WikiGenericError, WikiResult, WikiResultExt};
pub use store::{Context, Role, WikiStore};
