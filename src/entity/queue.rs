//! Admin and IO queue containers.
//!
//! The registry only stores queues; ring handling and doorbells belong to the
//! protocol layer. What lives here is the configuration a test settles on before
//! issuing the create command: queue id, depth and the queue-pair wiring.

use crate::device::DeviceContext;
use crate::error::{RsrcError, RsrcResult};

/// Smallest queue depth the protocol allows.
pub const MIN_QUEUE_ENTRIES: u32 = 2;
/// Largest admin queue depth.
pub const MAX_ADMIN_QUEUE_ENTRIES: u32 = 4096;
/// Largest IO queue depth.
pub const MAX_IO_QUEUE_ENTRIES: u32 = 65536;

/// Which of the four queue flavours a [`Queue`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Admin submission queue
    AdminSubmission,
    /// Admin completion queue
    AdminCompletion,
    /// IO submission queue
    IoSubmission,
    /// IO completion queue
    IoCompletion,
}

impl QueueRole {
    /// Admin queues always use queue id 0.
    pub fn is_admin(self) -> bool {
        matches!(self, QueueRole::AdminSubmission | QueueRole::AdminCompletion)
    }
}

/// A submission or completion queue bound to a device.
#[derive(Debug, Clone)]
pub struct Queue {
    role: QueueRole,
    device: DeviceContext,
    qid: u16,
    num_entries: u32,
    /// For IO submission queues: the completion queue it posts to
    cq_id: Option<u16>,
    /// For IO submission queues: arbitration priority (0 = urgent .. 3 = low)
    priority: u8,
    /// For IO completion queues: interrupt vector, `None` when polled
    irq_vector: Option<u16>,
    initialized: bool,
}

impl Queue {
    /// Create an uninitialized queue of the given role.
    pub fn new(role: QueueRole, device: DeviceContext) -> Self {
        Self {
            role,
            device,
            qid: 0,
            num_entries: 0,
            cq_id: None,
            priority: 0,
            irq_vector: None,
            initialized: false,
        }
    }

    /// Configure an admin queue.
    pub fn init_admin(&mut self, num_entries: u32) -> RsrcResult<()> {
        if !self.role.is_admin() {
            return Err(RsrcError::InvalidQueueConfig(format!(
                "{:?} cannot be initialized as an admin queue",
                self.role
            )));
        }
        check_depth(num_entries, MAX_ADMIN_QUEUE_ENTRIES)?;
        self.qid = 0;
        self.num_entries = num_entries;
        self.initialized = true;
        Ok(())
    }

    /// Configure an IO submission queue posting to completion queue `cq_id`.
    pub fn init_io_sq(
        &mut self,
        qid: u16,
        num_entries: u32,
        cq_id: u16,
        priority: u8,
    ) -> RsrcResult<()> {
        if self.role != QueueRole::IoSubmission {
            return Err(RsrcError::InvalidQueueConfig(format!(
                "{:?} cannot be initialized as an IO submission queue",
                self.role
            )));
        }
        check_io_qid(qid)?;
        check_io_qid(cq_id)?;
        check_depth(num_entries, MAX_IO_QUEUE_ENTRIES)?;
        if priority > 3 {
            return Err(RsrcError::InvalidQueueConfig(format!(
                "priority {priority} out of range 0..=3"
            )));
        }
        self.qid = qid;
        self.num_entries = num_entries;
        self.cq_id = Some(cq_id);
        self.priority = priority;
        self.initialized = true;
        Ok(())
    }

    /// Configure an IO completion queue, polled when `irq_vector` is `None`.
    pub fn init_io_cq(
        &mut self,
        qid: u16,
        num_entries: u32,
        irq_vector: Option<u16>,
    ) -> RsrcResult<()> {
        if self.role != QueueRole::IoCompletion {
            return Err(RsrcError::InvalidQueueConfig(format!(
                "{:?} cannot be initialized as an IO completion queue",
                self.role
            )));
        }
        check_io_qid(qid)?;
        check_depth(num_entries, MAX_IO_QUEUE_ENTRIES)?;
        self.qid = qid;
        self.num_entries = num_entries;
        self.irq_vector = irq_vector;
        self.initialized = true;
        Ok(())
    }

    /// Submission or completion, admin or IO.
    pub fn role(&self) -> QueueRole {
        self.role
    }

    /// Device context the queue was built with.
    pub fn device(&self) -> DeviceContext {
        self.device
    }

    /// Queue id; 0 for the admin pair.
    pub fn qid(&self) -> u16 {
        self.qid
    }

    /// Queue depth in entries.
    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    /// Completion queue an IO submission queue posts to.
    pub fn cq_id(&self) -> Option<u16> {
        self.cq_id
    }

    /// Arbitration priority class (0 urgent to 3 low).
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Interrupt vector of an IO completion queue, `None` when polled.
    pub fn irq_vector(&self) -> Option<u16> {
        self.irq_vector
    }

    /// True once an `init_*` call succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

fn check_depth(num_entries: u32, max: u32) -> RsrcResult<()> {
    if !(MIN_QUEUE_ENTRIES..=max).contains(&num_entries) {
        return Err(RsrcError::InvalidQueueConfig(format!(
            "{num_entries} entries out of range {MIN_QUEUE_ENTRIES}..={max}"
        )));
    }
    Ok(())
}

fn check_io_qid(qid: u16) -> RsrcResult<()> {
    if qid == 0 {
        return Err(RsrcError::InvalidQueueConfig(
            "queue id 0 is reserved for the admin queues".into(),
        ));
    }
    Ok(())
}
