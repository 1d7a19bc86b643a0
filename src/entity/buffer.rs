//! Host memory buffers used as data and metadata payloads.

/// Fill pattern applied by [`MemBuffer::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataPattern {
    /// Every byte holds the same value
    Const(u8),
    /// Byte `i` holds `i mod 256`
    Inc8,
    /// Little-endian dword `i` holds `i`; a trailing partial dword is truncated
    Inc32,
}

/// Host memory buffer.
///
/// Created empty by the factory; the owning test sizes it with [`MemBuffer::init`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemBuffer {
    data: Vec<u8>,
}

impl MemBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Resize to `len` bytes and fill with `pattern`, discarding old contents.
    pub fn init(&mut self, len: usize, pattern: DataPattern) {
        self.data.clear();
        self.data.resize(len, 0);
        match pattern {
            DataPattern::Const(value) => self.data.fill(value),
            DataPattern::Inc8 => {
                for (i, byte) in self.data.iter_mut().enumerate() {
                    *byte = i as u8;
                }
            }
            DataPattern::Inc32 => {
                for (i, chunk) in self.data.chunks_mut(4).enumerate() {
                    let word = (i as u32).to_le_bytes();
                    chunk.copy_from_slice(&word[..chunk.len()]);
                }
            }
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read-only view of the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Byte-for-byte comparison against another buffer.
    pub fn matches(&self, other: &MemBuffer) -> bool {
        self.data == other.data
    }
}
