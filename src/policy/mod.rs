//! Immutable fingerprint -> group-set policy index.

pub mod fingerprint;
pub mod loader;

use std::collections::{HashMap, HashSet};

pub use fingerprint::Fingerprint;
pub use loader::load_policy;

/// An opaque short name for a key, derived from a `.pub` file's basename.
/// Used only to bridge policy files (which reference names) and the
/// fingerprint index; it never appears in `Policy` itself.
pub type KeyName = String;

/// The name of a POSIX group as it appears in policy files and peer group
/// sets.
pub type GroupName = String;

/// Immutable mapping `Fingerprint -> set<GroupName>`, built once at
/// startup and shared read-only with every session.
pub type Policy = HashMap<Fingerprint, HashSet<GroupName>>;
