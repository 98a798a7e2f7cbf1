use lumen_core::log;
use crate::barrier::ResourceState;
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};
use crate::swapchain::{Swapchain, SwapchainDesc};
use crate::texture::{Texture, TextureDesc, TextureUsage};
use super::queue::{QueueItem, QueueSender, WeakQueueSender};
use super::resource::SoftTexture;

/// Offscreen swapchain. Presenting hands the back buffer to the queue, which checks
/// its state and counts the present.
pub struct SoftSwapchain {
    desc: SwapchainDesc,
    back_buffers: Vec<SoftTexture>,
    current: u32,
    capabilities: DeviceCapabilities,
    queue: QueueSender,
    release: Option<WeakQueueSender>,
}

impl SoftSwapchain {
    pub(crate) fn new(
        desc: &SwapchainDesc,
        capabilities: DeviceCapabilities,
        queue: QueueSender,
        release: Option<WeakQueueSender>,
    ) -> RhiResult<Self> {
        desc.validate(&capabilities)?;
        let back_buffers = Self::create_back_buffers(desc, release.as_ref())?;
        log::debug!(
            "Created swapchain `{}` ({}x{} {:?}, {} buffers)",
            desc.debug_name, desc.width, desc.height, desc.format, desc.buffer_count
        );
        Ok(Self { desc: desc.clone(), back_buffers, current: 0, capabilities, queue, release })
    }

    fn create_back_buffers(desc: &SwapchainDesc, release: Option<&WeakQueueSender>) -> RhiResult<Vec<SoftTexture>> {
        (0..desc.buffer_count)
            .map(|index| {
                let texture_desc = TextureDesc::new_2d(
                    &format!("{}.back_buffer{}", desc.debug_name, index),
                    desc.width,
                    desc.height,
                    desc.format,
                )
                .with_usage(TextureUsage::RenderTarget | TextureUsage::CopySource | TextureUsage::CopyDest)
                .with_initial_state(ResourceState::Present);
                SoftTexture::new(&texture_desc, release.cloned())
            })
            .collect()
    }
}

impl Swapchain for SoftSwapchain {
    fn desc(&self) -> &SwapchainDesc { &self.desc }

    fn begin_frame(&mut self) -> RhiResult<u32> {
        Ok(self.current)
    }

    #[inline]
    fn current_back_buffer_index(&self) -> u32 { self.current }

    fn back_buffer(&self, index: u32) -> &dyn Texture {
        &self.back_buffers[index as usize]
    }

    fn present(&mut self) -> RhiResult<()> {
        let back_buffer = self.back_buffers[self.current as usize].storage().clone();
        self.queue.send(QueueItem::Present { back_buffer })?;
        self.current = (self.current + 1) % self.desc.buffer_count;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        if width == 0 || height == 0 {
            return Err(RhiError::SwapchainOutOfDate);
        }
        if (width, height) == (self.desc.width, self.desc.height) {
            return Ok(());
        }

        let desc = SwapchainDesc { width, height, ..self.desc.clone() };
        desc.validate(&self.capabilities)?;
        self.back_buffers = Self::create_back_buffers(&desc, self.release.as_ref())?;
        self.desc = desc;
        self.current = 0;
        log::debug!("Resized swapchain `{}` to {}x{}", self.desc.debug_name, width, height);
        Ok(())
    }
}
