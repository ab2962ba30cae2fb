//! Merge functions for co-authoring keyed collections
//!
//! Independent features contribute fragments (an env var, a volume, a port,
//! a policy rule...) to the same object. Every contribution goes through
//! the same primitive: find the existing entry with the fragment's key, and
//! resolve the collision with a [`MergeFunction`]; append when nothing
//! matches.
//!
//! Three canonical policies exist:
//! - [`override_current`]: the new fragment wins (default)
//! - [`ignore_new`]: the existing fragment is kept
//! - [`error_on_merge_attempt`]: the collision is reported as
//!   [`MergeError::MergeAttempted`]

pub mod container;
pub mod env;
pub mod rbac;
pub mod volume;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use container::{add_capabilities_to_container, add_port_to_container};
pub use env::{EnvFromKey, EnvFromManager, EnvVarManager};
pub use volume::{
    VolumeManager, add_volume_mount_to_container, add_volume_to_pod, merge_config_map_items,
};

/// Outcome of a refused merge
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// A fragment with the same key already exists and the policy forbids merging
    #[error("merge attempted on an existing entry")]
    MergeAttempted,

    /// Both fragments are individually valid but cannot be combined
    #[error("conflicting fragments: {message}")]
    Conflict { message: String },
}

impl MergeError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn is_merge_attempted(&self) -> bool {
        matches!(self, MergeError::MergeAttempted)
    }
}

/// Resolve `(current, new)` into the entry to keep
pub type MergeFunction<T> = fn(&T, &T) -> Result<T, MergeError>;

/// New fragment replaces the existing one
pub fn override_current<T: Clone>(_current: &T, new: &T) -> Result<T, MergeError> {
    Ok(new.clone())
}

/// Existing fragment is kept
pub fn ignore_new<T: Clone>(current: &T, _new: &T) -> Result<T, MergeError> {
    Ok(current.clone())
}

/// Any collision is an error
pub fn error_on_merge_attempt<T>(_current: &T, _new: &T) -> Result<T, MergeError> {
    Err(MergeError::MergeAttempted)
}

/// Named merge policy, resolvable for any fragment type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    #[default]
    Override,
    Ignore,
    Fail,
}

impl MergePolicy {
    pub fn function<T: Clone>(self) -> MergeFunction<T> {
        match self {
            MergePolicy::Override => override_current::<T>,
            MergePolicy::Ignore => ignore_new::<T>,
            MergePolicy::Fail => error_on_merge_attempt::<T>,
        }
    }
}

/// Insert `new` into `items`, merging with every entry sharing its key
///
/// All merges are computed before anything is written, so an error leaves
/// `items` untouched.
pub fn merge_keyed<T, K, F>(
    items: &mut Vec<T>,
    new: T,
    key: F,
    merge: MergeFunction<T>,
) -> Result<(), MergeError>
where
    F: Fn(&T) -> K,
    K: PartialEq,
{
    let new_key = key(&new);
    let mut merged = Vec::new();
    for (idx, item) in items.iter().enumerate() {
        if key(item) == new_key {
            merged.push((idx, merge(item, &new)?));
        }
    }

    if merged.is_empty() {
        items.push(new);
    } else {
        for (idx, value) in merged {
            items[idx] = value;
        }
    }
    Ok(())
}

/// Same as [`merge_keyed`] for an optional list field
pub fn merge_keyed_opt<T, K, F>(
    items: &mut Option<Vec<T>>,
    new: T,
    key: F,
    merge: MergeFunction<T>,
) -> Result<(), MergeError>
where
    F: Fn(&T) -> K,
    K: PartialEq,
{
    merge_keyed(items.get_or_insert_with(Vec::new), new, key, merge)
}

/// Insert a keyed map entry (selectors, secret entries, config data)
pub fn merge_map_entry<V: Clone>(
    map: &mut BTreeMap<String, V>,
    key: impl Into<String>,
    value: V,
    merge: MergeFunction<V>,
) -> Result<(), MergeError> {
    let key = key.into();
    let resolved = match map.get(&key) {
        Some(current) => merge(current, &value)?,
        None => value,
    };
    map.insert(key, resolved);
    Ok(())
}
