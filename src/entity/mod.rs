//! Protocol entities managed by the registry.
//!
//! An entity is any protocol object a test can ask the registry for: a memory
//! buffer, one of the four queue flavours, or one of the typed commands. The set
//! is closed: [`EntityKind`] enumerates every variant and the factory matches on
//! it exhaustively, so adding a kind is a compile-checked change.
//!
//! Entities are handed out as [`SharedEntity`] (`Arc<Entity>`). The registry is
//! one co-owner among any number of tests; the entity is dropped when the last
//! holder lets go. The kind and identity are immutable, the body sits behind a
//! mutex so every co-owner can still configure it.

pub mod buffer;
pub mod command;
pub mod queue;

pub use buffer::{DataPattern, MemBuffer};
pub use command::{Command, CommandSet, PrpMask};
pub use queue::{Queue, QueueRole};

use crate::error::{RsrcError, RsrcResult};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Shared handle to a registered entity.
pub type SharedEntity = Arc<Entity>;

// =============================================================================
// Entity Kind
// =============================================================================

/// Closed enumeration of every entity the factory can build.
///
/// The discriminant is the raw tag tests use when they select a kind from a
/// table rather than by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EntityKind {
    /// Host memory buffer
    MemBuffer = 0x00,
    /// Admin submission queue
    Asq = 0x01,
    /// Admin completion queue
    Acq = 0x02,
    /// IO submission queue
    Iosq = 0x03,
    /// IO completion queue
    Iocq = 0x04,
    /// Identify admin command
    Identify = 0x05,
    /// Create IO completion queue admin command
    CreateIocq = 0x06,
    /// Create IO submission queue admin command
    CreateIosq = 0x07,
    /// Delete IO completion queue admin command
    DeleteIocq = 0x08,
    /// Delete IO submission queue admin command
    DeleteIosq = 0x09,
    /// Get features admin command
    GetFeatures = 0x0A,
    /// Set features admin command
    SetFeatures = 0x0B,
    /// NVM write command
    Write = 0x0C,
    /// NVM read command
    Read = 0x0D,
}

/// The admin queue pair that outlives every group.
pub const ADMIN_QUEUE_KINDS: [EntityKind; 2] = [EntityKind::Asq, EntityKind::Acq];

impl EntityKind {
    /// Every kind, in tag order.
    pub const ALL: [EntityKind; 14] = [
        EntityKind::MemBuffer,
        EntityKind::Asq,
        EntityKind::Acq,
        EntityKind::Iosq,
        EntityKind::Iocq,
        EntityKind::Identify,
        EntityKind::CreateIocq,
        EntityKind::CreateIosq,
        EntityKind::DeleteIocq,
        EntityKind::DeleteIosq,
        EntityKind::GetFeatures,
        EntityKind::SetFeatures,
        EntityKind::Write,
        EntityKind::Read,
    ];

    /// Raw tag of this kind.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Protocol name used in diagnostics.
    pub fn protocol_name(self) -> &'static str {
        match self {
            EntityKind::MemBuffer => "MemBuffer",
            EntityKind::Asq => "ASQ",
            EntityKind::Acq => "ACQ",
            EntityKind::Iosq => "IOSQ",
            EntityKind::Iocq => "IOCQ",
            EntityKind::Identify => "Identify",
            EntityKind::CreateIocq => "CreateIOCQ",
            EntityKind::CreateIosq => "CreateIOSQ",
            EntityKind::DeleteIocq => "DeleteIOCQ",
            EntityKind::DeleteIosq => "DeleteIOSQ",
            EntityKind::GetFeatures => "GetFeatures",
            EntityKind::SetFeatures => "SetFeatures",
            EntityKind::Write => "Write",
            EntityKind::Read => "Read",
        }
    }

    /// Name accepted by [`FromStr`] and used in configuration files.
    pub fn config_name(self) -> &'static str {
        match self {
            EntityKind::MemBuffer => "mem_buffer",
            EntityKind::Asq => "asq",
            EntityKind::Acq => "acq",
            EntityKind::Iosq => "iosq",
            EntityKind::Iocq => "iocq",
            EntityKind::Identify => "identify",
            EntityKind::CreateIocq => "create_iocq",
            EntityKind::CreateIosq => "create_iosq",
            EntityKind::DeleteIocq => "delete_iocq",
            EntityKind::DeleteIosq => "delete_iosq",
            EntityKind::GetFeatures => "get_features",
            EntityKind::SetFeatures => "set_features",
            EntityKind::Write => "write",
            EntityKind::Read => "read",
        }
    }

    /// Whether construction needs a live device context.
    pub fn requires_device(self) -> bool {
        !matches!(self, EntityKind::MemBuffer)
    }

    /// True for the four queue kinds.
    pub fn is_queue(self) -> bool {
        matches!(
            self,
            EntityKind::Asq | EntityKind::Acq | EntityKind::Iosq | EntityKind::Iocq
        )
    }

    /// True for the admin and NVM command kinds.
    pub fn is_command(self) -> bool {
        !self.is_queue() && self != EntityKind::MemBuffer
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.protocol_name())
    }
}

impl TryFrom<u8> for EntityKind {
    type Error = RsrcError;

    fn try_from(tag: u8) -> RsrcResult<Self> {
        EntityKind::ALL
            .get(usize::from(tag))
            .copied()
            .ok_or(RsrcError::UnknownKind(tag))
    }
}

impl FromStr for EntityKind {
    type Err = RsrcError;

    fn from_str(s: &str) -> RsrcResult<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.config_name() == wanted)
            .ok_or_else(|| RsrcError::UnknownKindName(s.to_string()))
    }
}

// =============================================================================
// Entity
// =============================================================================

/// Kind-specific state of an entity.
#[derive(Debug)]
pub(crate) enum EntityBody {
    /// Memory buffer contents
    Buffer(MemBuffer),
    /// Admin or IO queue
    Queue(Queue),
    /// Admin or NVM command
    Command(Command),
}

/// A protocol object with group lifetime.
#[derive(Debug)]
pub struct Entity {
    id: Uuid,
    kind: EntityKind,
    body: Mutex<EntityBody>,
}

impl Entity {
    /// Build an entity from its kind and initial body.
    ///
    /// Only the factory calls this; it guarantees the body matches the kind.
    pub(crate) fn new(kind: EntityKind, body: EntityBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            body: Mutex::new(body),
        }
    }

    /// Kind this entity was built as. Never changes.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Unique identity, stable for the life of the entity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Lock the body as a buffer, `None` if this is not a buffer.
    pub fn buffer(&self) -> Option<MappedMutexGuard<'_, MemBuffer>> {
        MutexGuard::try_map(self.body.lock(), |body| match body {
            EntityBody::Buffer(buf) => Some(buf),
            _ => None,
        })
        .ok()
    }

    /// Lock the body as a queue, `None` if this is not a queue.
    pub fn queue(&self) -> Option<MappedMutexGuard<'_, Queue>> {
        MutexGuard::try_map(self.body.lock(), |body| match body {
            EntityBody::Queue(q) => Some(q),
            _ => None,
        })
        .ok()
    }

    /// Lock the body as a command, `None` if this is not a command.
    pub fn command(&self) -> Option<MappedMutexGuard<'_, Command>> {
        MutexGuard::try_map(self.body.lock(), |body| match body {
            EntityBody::Command(cmd) => Some(cmd),
            _ => None,
        })
        .ok()
    }
}

impl Drop for Entity {
    fn drop(&mut self) {
        tracing::trace!(kind = %self.kind, id = %self.id, "Object destroyed");
    }
}
