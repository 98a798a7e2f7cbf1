//! Swapchain contract: a ring of back buffers cycled by present.
//!
//! Not thread-safe; drive it from the thread that owns device submission. Presenting
//! before the frame's rendering has been submitted is a caller error.

use derive_builder::Builder;
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};
use crate::texture::{Format, Texture};

/// Swapchain configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct SwapchainDesc {
    #[builder(setter(into))]
    pub debug_name: String,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    pub buffer_count: u32,
    pub vsync: bool,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            debug_name: "swapchain".to_string(),
            width: 1280,
            height: 720,
            format: Format::Bgra8Unorm,
            buffer_count: 2,
            vsync: true,
        }
    }
}

impl SwapchainDesc {
    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> RhiResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RhiError::invalid_descriptor(format!(
                "swapchain `{}` has an empty extent {}x{}",
                self.debug_name, self.width, self.height
            )));
        }
        if self.width > caps.max_texture_dimension || self.height > caps.max_texture_dimension {
            return Err(RhiError::invalid_descriptor(format!(
                "swapchain `{}` extent {}x{} exceeds the device limit {}",
                self.debug_name, self.width, self.height, caps.max_texture_dimension
            )));
        }
        if !(2..=4).contains(&self.buffer_count) {
            return Err(RhiError::invalid_descriptor(format!(
                "swapchain `{}` needs 2 to 4 back buffers, got {}",
                self.debug_name, self.buffer_count
            )));
        }
        if self.format.is_depth() {
            return Err(RhiError::invalid_descriptor(format!("swapchain `{}` cannot use a depth format", self.debug_name)));
        }
        Ok(())
    }
}

pub trait Swapchain: Send {
    fn desc(&self) -> &SwapchainDesc;

    /// Acquire the back buffer for the next frame and return its index.
    fn begin_frame(&mut self) -> RhiResult<u32>;

    fn current_back_buffer_index(&self) -> u32;

    fn back_buffer(&self, index: u32) -> &dyn Texture;

    #[inline]
    fn current_back_buffer(&self) -> &dyn Texture {
        self.back_buffer(self.current_back_buffer_index())
    }

    #[inline]
    fn buffer_count(&self) -> u32 { self.desc().buffer_count }

    #[inline]
    fn extent(&self) -> (u32, u32) {
        let desc = self.desc();
        (desc.width, desc.height)
    }

    /// Queue the current back buffer for presentation. It must be in `Present` state
    /// by the time the queue reaches it.
    fn present(&mut self) -> RhiResult<()>;

    /// Recreate the back buffers. The caller must wait for the GPU to go idle first.
    ///
    /// A zero extent reports `SwapchainOutOfDate`; one beyond the device limit is an
    /// `InvalidDescriptor` and leaves the swapchain unchanged.
    fn resize(&mut self, width: u32, height: u32) -> RhiResult<()>;
}
