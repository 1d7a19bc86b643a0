//! Entity factory.
//!
//! Maps a kind to a freshly built entity. This is the only place that dispatches
//! on [`EntityKind`] to pick a constructor; the registry treats what comes back
//! as opaque. Construction touches nothing but the new allocation.

use crate::device::DeviceContext;
use crate::entity::{
    Command, Entity, EntityBody, EntityKind, MemBuffer, Queue, QueueRole, SharedEntity,
};
use crate::error::{RsrcError, RsrcResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Build a new entity of `kind`.
///
/// Kinds that drive the device fail with `AllocationFailed` when `device`
/// holds no descriptor at all. Any descriptor that is present, negative ones
/// included, is passed to the entity unchanged.
pub fn create(kind: EntityKind, device: DeviceContext) -> RsrcResult<SharedEntity> {
    if kind.requires_device() && !device.is_present() {
        debug!(%kind, "Object requires a device context");
        return Err(RsrcError::AllocationFailed {
            kind,
            reason: format!("requires a device context, have {device}"),
        });
    }

    let body = match kind {
        EntityKind::MemBuffer => EntityBody::Buffer(MemBuffer::new()),
        EntityKind::Asq => EntityBody::Queue(Queue::new(QueueRole::AdminSubmission, device)),
        EntityKind::Acq => EntityBody::Queue(Queue::new(QueueRole::AdminCompletion, device)),
        EntityKind::Iosq => EntityBody::Queue(Queue::new(QueueRole::IoSubmission, device)),
        EntityKind::Iocq => EntityBody::Queue(Queue::new(QueueRole::IoCompletion, device)),
        EntityKind::Identify
        | EntityKind::CreateIocq
        | EntityKind::CreateIosq
        | EntityKind::DeleteIocq
        | EntityKind::DeleteIosq
        | EntityKind::GetFeatures
        | EntityKind::SetFeatures
        | EntityKind::Write
        | EntityKind::Read => {
            let cmd = Command::new(kind, device).ok_or_else(|| RsrcError::AllocationFailed {
                kind,
                reason: "no opcode defined".into(),
            })?;
            EntityBody::Command(cmd)
        }
    };

    info!(%kind, "Obj {kind} is born with group lifetime");
    Ok(Arc::new(Entity::new(kind, body)))
}

/// Build a new entity from a raw kind tag.
pub fn create_from_tag(tag: u8, device: DeviceContext) -> RsrcResult<SharedEntity> {
    let kind = EntityKind::try_from(tag).map_err(|err| {
        debug!(tag, "Unknown obj type specified: 0x{tag:02X}");
        err
    })?;
    create(kind, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_builds_with_device() {
        let device = DeviceContext::from_raw_fd(4);
        for kind in EntityKind::ALL {
            let entity = create(kind, device).unwrap();
            assert_eq!(entity.kind(), kind);
            assert_eq!(entity.queue().is_some(), kind.is_queue(), "{kind}");
            assert_eq!(entity.command().is_some(), kind.is_command(), "{kind}");
        }
    }

    #[test]
    fn test_buffer_needs_no_device() {
        let entity = create(EntityKind::MemBuffer, DeviceContext::none()).unwrap();
        assert!(entity.buffer().is_some_and(|buf| buf.is_empty()));
    }

    #[test]
    fn test_device_kinds_fail_without_device() {
        let err = create(EntityKind::Iosq, DeviceContext::none()).unwrap_err();
        assert!(matches!(
            err,
            RsrcError::AllocationFailed {
                kind: EntityKind::Iosq,
                ..
            }
        ));
    }

    #[test]
    fn test_negative_descriptor_is_forwarded() {
        let bad = DeviceContext::from_raw_fd(-1);
        for kind in EntityKind::ALL {
            assert!(create(kind, bad).is_ok(), "{kind}");
        }

        let iosq = create(EntityKind::Iosq, bad).unwrap();
        assert_eq!(iosq.queue().map(|q| q.device().raw_fd()), Some(Some(-1)));
        let write = create(EntityKind::Write, bad).unwrap();
        assert_eq!(write.command().map(|c| c.device()), Some(bad));
    }

    #[test]
    fn test_queue_roles_follow_kind() {
        let device = DeviceContext::from_raw_fd(4);
        let acq = create(EntityKind::Acq, device).unwrap();
        let role = acq.queue().map(|q| q.role());
        assert_eq!(role, Some(QueueRole::AdminCompletion));
    }

    #[test]
    fn test_each_call_builds_a_distinct_entity() {
        let a = create(EntityKind::MemBuffer, DeviceContext::none()).unwrap();
        let b = create(EntityKind::MemBuffer, DeviceContext::none()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_unknown_tag() {
        let err = create_from_tag(0x42, DeviceContext::from_raw_fd(4)).unwrap_err();
        assert_eq!(err, RsrcError::UnknownKind(0x42));

        let read = create_from_tag(EntityKind::Read.tag(), DeviceContext::from_raw_fd(4)).unwrap();
        assert_eq!(read.kind(), EntityKind::Read);
    }
}
