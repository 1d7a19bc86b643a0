//! # NVMe Compliance Object Resource Registry
//!
//! This crate is the bookkeeping layer of an NVMe compliance test harness. Test
//! cases in a group ask it for protocol entities (queues, commands, buffers),
//! find entities an earlier test in the same group created, and tear them down
//! when the group ends. It performs no I/O and no protocol validation.
//!
//! ## Crate Structure
//!
//! - **`entity`**: The closed set of entity kinds and the shared `Entity` handle
//!   with its buffer, queue and command bodies.
//! - **`factory`**: Builds a fresh entity for a kind, threading the device context
//!   to the kinds that need one.
//! - **`registry`**: The group-lifetime name table (`ResourceRegistry`) and its
//!   lock-guarded wrapper (`SharedRegistry`).
//! - **`device`**: The opaque device context handed from the harness to entities.
//! - **`config`**: Figment-based configuration for logging and group teardown.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The `RsrcError` enum returned by every fallible operation.

pub mod config;
pub mod device;
pub mod entity;
pub mod error;
pub mod factory;
pub mod logging;
pub mod registry;

pub use config::{HarnessConfig, RegistryConfig, TeardownPolicy};
pub use device::DeviceContext;
pub use entity::{Entity, EntityKind, SharedEntity, ADMIN_QUEUE_KINDS};
pub use error::{RsrcError, RsrcResult};
pub use registry::{
    ResourceRegistry, SharedRegistry, ACQ_GROUP_ID, ASQ_GROUP_ID, IOCQ_GROUP_ID, IOSQ_GROUP_ID,
};
