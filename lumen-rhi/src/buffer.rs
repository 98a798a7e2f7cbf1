//! GPU buffer descriptors and the backend-agnostic buffer contract.

use std::any::Any;
use enumflags2::BitFlags;
use crate::barrier::{ResourceId, ResourceState};
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};

#[enumflags2::bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex = 1 << 0,
    Index = 1 << 1,
    Constant = 1 << 2,
    Storage = 1 << 3,
    Indirect = 1 << 4,
    CopySource = 1 << 5,
    CopyDest = 1 << 6,
}

/// Independent usage bits. Any combination is representable; whether a combination is
/// supported is checked when the buffer is created.
pub type BufferUsages = BitFlags<BufferUsage>;

/// Which CPU accessor the buffer memory supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CpuAccess {
    /// Device-local; the CPU cannot touch it.
    #[default]
    None,
    /// Upload memory, written by [`Buffer::write`].
    Write,
    /// Readback memory, read by [`Buffer::read`].
    Read,
}

/// Buffer descriptor for creating GPU buffers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub debug_name: String,
    /// Size of the buffer in bytes.
    pub size: u64,
    pub usage: BufferUsages,
    pub cpu_access: CpuAccess,
    /// State the resource is in right after creation.
    pub initial_state: ResourceState,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            debug_name: "Unnamed buffer".to_string(),
            size: 0,
            usage: BitFlags::empty(),
            cpu_access: CpuAccess::None,
            initial_state: ResourceState::Common,
        }
    }
}

impl BufferDesc {
    pub fn new(name: &str, size: u64, usage: impl Into<BufferUsages>) -> Self {
        Self {
            debug_name: name.to_owned(),
            size,
            usage: usage.into(),
            ..Default::default()
        }
    }

    /// Create a vertex buffer descriptor.
    pub fn vertex(name: &str, size: u64) -> Self {
        Self::new(name, size, BufferUsage::Vertex | BufferUsage::CopyDest)
    }

    /// Create an index buffer descriptor.
    pub fn index(name: &str, size: u64) -> Self {
        Self::new(name, size, BufferUsage::Index | BufferUsage::CopyDest)
    }

    /// Create a constant buffer descriptor.
    pub fn constant(name: &str, size: u64) -> Self {
        Self::new(name, size, BufferUsage::Constant | BufferUsage::CopyDest)
    }

    /// Create a CPU-writable staging buffer. Starts in `CopySource`.
    pub fn upload(name: &str, size: u64) -> Self {
        Self {
            cpu_access: CpuAccess::Write,
            initial_state: ResourceState::CopySource,
            ..Self::new(name, size, BufferUsage::CopySource)
        }
    }

    /// Create a CPU-readable buffer for GPU to CPU transfers. Starts in `CopyDest`.
    pub fn readback(name: &str, size: u64) -> Self {
        Self {
            cpu_access: CpuAccess::Read,
            initial_state: ResourceState::CopyDest,
            ..Self::new(name, size, BufferUsage::CopyDest)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<BufferUsages>) -> Self {
        self.usage |= usage.into();
        self
    }

    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> RhiResult<()> {
        if self.size == 0 {
            return Err(RhiError::invalid_descriptor(format!("buffer `{}` has zero size", self.debug_name)));
        }
        if self.size > caps.max_buffer_size {
            return Err(RhiError::invalid_descriptor(format!(
                "buffer `{}` is {} bytes, device limit is {}",
                self.debug_name, self.size, caps.max_buffer_size
            )));
        }
        if !self.initial_state.valid_for_buffer() {
            return Err(RhiError::invalid_descriptor(format!(
                "buffer `{}` cannot start in {:?}",
                self.debug_name, self.initial_state
            )));
        }
        Ok(())
    }
}

/// A linear GPU allocation. The descriptor is immutable for the buffer's lifetime.
pub trait Buffer: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ResourceId;

    fn desc(&self) -> &BufferDesc;

    #[inline]
    fn size(&self) -> u64 { self.desc().size }

    /// Copy `data` into the buffer at `offset`. Requires [`CpuAccess::Write`].
    ///
    /// The caller must make sure no GPU work in flight reads the range.
    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Copy buffer contents at `offset` into `out`. Requires [`CpuAccess::Read`].
    fn read(&self, offset: u64, out: &mut [u8]) -> RhiResult<()>;

    fn as_any(&self) -> &dyn Any;
}
