//! Tether Core - Core types shared by the Tether reconciliation engine
//!
//! This crate provides the client-free building blocks:
//! - `ResourceKind`: The closed set of kinds the operator manages
//! - `labels`: Marker and part-of labels that scope garbage collection
//! - `PlatformInfo`: API capabilities of the live cluster
//! - `merge`: Conflict policies for co-authoring keyed fragments
//! - `config`: Operator configuration file

pub mod config;
pub mod error;
pub mod kind;
pub mod labels;
pub mod merge;
pub mod platform;

pub use config::{OwnerKindConfig, TetherConfig};
pub use error::{CoreError, Result};
pub use kind::ResourceKind;
pub use labels::{
    MANAGED_BY_STORE_LABEL, MANAGED_KEYS_ANNOTATION, ManagedKeys, PART_OF_LABEL,
    PRIMARY_CONTROLLER_LABEL, PartOfLabelValue,
};
pub use merge::{MergeError, MergeFunction, MergePolicy};
pub use platform::PlatformInfo;
