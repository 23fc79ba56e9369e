#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error types (`CompositeError`)
//! - [`policy`]: Sharing policies and the policy tree (`SharingPolicy`, `PolicyTree`, `build_policy`)
//! - [`constituents`]: Constituent registry (`ConstituentRegistry`)
//! - [`anchor`]: Anchor module and execution context (`AnchorDelegate`, `AnchorContext`)
//! - [`manifest`]: Composite manifest validation and content (`CompositeManifestValidator`, `ModuleContent`)
//! - [`lifecycle`]: Composite state machine (`CompositeModule`, `CompositeServices`)
//! - [`host`]: Framework-side entry point (`CompositeHost`)
//! - [`memory`]: In-memory root runtime (`InMemoryRuntime`, `RecordingStartLevel`)
//!
//! # Architecture
//!
//! ```text
//! CompositeHost ──owns──> PolicyTree
//!      |
//!      └──owns──> CompositeModule ──> ConstituentRegistry <──events── AnchorContext
//!                      |                                                  ^
//!                      └──> AnchorDelegate ──create_execution_context()───┘
//! ```

pub mod anchor;
pub mod constituents;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod manifest;
pub mod memory;
pub mod policy;

// --- Public API Re-exports ---

// Host
pub use host::CompositeHost;

// Lifecycle
pub use lifecycle::{
    BASELINE_START_LEVEL, CascadeReport, CompositeModule, CompositeServices, StartLevelFactory,
};

// Error
pub use error::CompositeError;

// Policy
pub use policy::{NodeId, PolicyNode, PolicyTree, SharingPolicy, build_policy};

// Constituents
pub use constituents::ConstituentRegistry;

// Anchor
pub use anchor::{AnchorContext, AnchorDelegate};

// Manifest
pub use manifest::{
    COMPOSITE_CONFIGURATION_ENTRY, CompositeConfiguration, CompositeManifestValidator,
    ModuleContent, composite_content, validate_composite_manifest,
};

// In-memory runtime
pub use memory::{
    InMemoryRuntime, MemoryModule, RecordingStartLevel, RecordingStartLevels, StartLevelCall,
};
