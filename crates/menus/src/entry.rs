//! Entry cache: parsed desktop entries mirrored from the filesystem.
//!
//! - `CachedDir` tree with lazy per-directory scanning
//! - Category interning (`Atom`)
//! - Use-count claims, explicit pruning, change subscriptions

mod atoms;
mod cache;
#[allow(clippy::module_inception)]
mod entry;

pub use atoms::{Atom, CategoryAtoms};
pub use cache::{DirId, EntryCache, SubscriberCallback, SubscriberId};
pub use entry::{Entry, EntryKind};
