//! Admin and NVM command containers.
//!
//! A command is its 16 command dwords plus the host buffers it references. The
//! factory fixes the opcode and command set from the kind; tests fill in the rest.

use crate::device::DeviceContext;
use crate::entity::{EntityKind, MemBuffer};
use crate::error::{RsrcError, RsrcResult};

/// Number of dwords in a submission queue entry.
pub const COMMAND_DWORDS: usize = 16;

const FUA_BIT: u32 = 1 << 30;
const NLB_MASK: u32 = 0xFFFF;

bitflags::bitflags! {
    /// Which data pointer fields a command may populate when it is sent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PrpMask: u8 {
        /// PRP entry 1 may point at a page
        const PRP1_PAGE = 1 << 0;
        /// PRP entry 2 may point at a page
        const PRP2_PAGE = 1 << 1;
        /// PRP entry 2 may point at a PRP list
        const PRP2_LIST = 1 << 2;
        /// The metadata pointer is populated
        const MPTR = 1 << 3;
    }
}

/// Command set a command is submitted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandSet {
    /// Admin submission queue
    Admin,
    /// IO submission queues
    Nvm,
}

/// Opcode and command set for a command kind, `None` for non-command kinds.
pub fn opcode_for(kind: EntityKind) -> Option<(CommandSet, u8)> {
    match kind {
        EntityKind::DeleteIosq => Some((CommandSet::Admin, 0x00)),
        EntityKind::CreateIosq => Some((CommandSet::Admin, 0x01)),
        EntityKind::DeleteIocq => Some((CommandSet::Admin, 0x04)),
        EntityKind::CreateIocq => Some((CommandSet::Admin, 0x05)),
        EntityKind::Identify => Some((CommandSet::Admin, 0x06)),
        EntityKind::SetFeatures => Some((CommandSet::Admin, 0x09)),
        EntityKind::GetFeatures => Some((CommandSet::Admin, 0x0A)),
        EntityKind::Write => Some((CommandSet::Nvm, 0x01)),
        EntityKind::Read => Some((CommandSet::Nvm, 0x02)),
        EntityKind::MemBuffer
        | EntityKind::Asq
        | EntityKind::Acq
        | EntityKind::Iosq
        | EntityKind::Iocq => None,
    }
}

/// A submission queue entry under construction.
#[derive(Debug, Clone)]
pub struct Command {
    kind: EntityKind,
    set: CommandSet,
    device: DeviceContext,
    dwords: [u32; COMMAND_DWORDS],
    data: Option<(PrpMask, MemBuffer)>,
    meta: Option<MemBuffer>,
}

impl Command {
    /// Build an empty command of `kind`.
    ///
    /// Returns `None` when `kind` is not a command kind.
    pub fn new(kind: EntityKind, device: DeviceContext) -> Option<Self> {
        let (set, opcode) = opcode_for(kind)?;
        let mut dwords = [0; COMMAND_DWORDS];
        dwords[0] = u32::from(opcode);
        Some(Self {
            kind,
            set,
            device,
            dwords,
            data: None,
            meta: None,
        })
    }

    /// Kind this command was built as.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Admin or NVM command set.
    pub fn command_set(&self) -> CommandSet {
        self.set
    }

    /// Device context the command was built with.
    pub fn device(&self) -> DeviceContext {
        self.device
    }

    /// Opcode from CDW0 bits 7:0.
    pub fn opcode(&self) -> u8 {
        (self.dwords[0] & 0xFF) as u8
    }

    /// Raw command dword `index`, `None` past the end.
    pub fn dword(&self, index: usize) -> Option<u32> {
        self.dwords.get(index).copied()
    }

    /// Namespace id (CDW1).
    pub fn nsid(&self) -> u32 {
        self.dwords[1]
    }

    /// Set the namespace id.
    pub fn set_nsid(&mut self, nsid: u32) {
        self.dwords[1] = nsid;
    }

    /// Zero-based number of logical blocks (CDW12 bits 15:0).
    pub fn nlb(&self) -> u16 {
        (self.dwords[12] & NLB_MASK) as u16
    }

    /// Set the block count. Read and write only.
    pub fn set_nlb(&mut self, nlb: u16) -> RsrcResult<()> {
        self.require_nvm_io("nlb")?;
        self.dwords[12] = (self.dwords[12] & !NLB_MASK) | u32::from(nlb);
        Ok(())
    }

    /// Force unit access (CDW12 bit 30).
    pub fn fua(&self) -> bool {
        self.dwords[12] & FUA_BIT != 0
    }

    /// Set or clear force unit access. Read and write only.
    pub fn set_fua(&mut self, fua: bool) -> RsrcResult<()> {
        self.require_nvm_io("fua")?;
        if fua {
            self.dwords[12] |= FUA_BIT;
        } else {
            self.dwords[12] &= !FUA_BIT;
        }
        Ok(())
    }

    /// Attach the data payload and the pointer fields it may use.
    ///
    /// Only NVM commands carry metadata, so `MPTR` is refused elsewhere.
    pub fn set_data_buffer(&mut self, mask: PrpMask, buffer: MemBuffer) -> RsrcResult<()> {
        if mask.contains(PrpMask::MPTR) {
            self.require_nvm_io("mptr")?;
        }
        self.data = Some((mask, buffer));
        Ok(())
    }

    /// Pointer fields allowed for the attached payload.
    pub fn prp_mask(&self) -> PrpMask {
        self.data.as_ref().map(|(mask, _)| *mask).unwrap_or_default()
    }

    /// Attached data payload, if any.
    pub fn data_buffer(&self) -> Option<&MemBuffer> {
        self.data.as_ref().map(|(_, buf)| buf)
    }

    /// Allocate a zeroed metadata buffer of `size` bytes, replacing any previous one.
    pub fn alloc_meta_buffer(&mut self, size: u32) -> RsrcResult<()> {
        self.require_nvm_io("meta_buffer")?;
        if size == 0 || size % 4 != 0 {
            return Err(RsrcError::InvalidMetaSize(size));
        }
        self.meta = Some(MemBuffer::zeroed(size as usize));
        Ok(())
    }

    /// Metadata buffer, if one was allocated.
    pub fn meta_buffer(&self) -> Option<&MemBuffer> {
        self.meta.as_ref()
    }

    fn require_nvm_io(&self, field: &'static str) -> RsrcResult<()> {
        match self.kind {
            EntityKind::Read | EntityKind::Write => Ok(()),
            kind => Err(RsrcError::UnsupportedField { kind, field }),
        }
    }
}
