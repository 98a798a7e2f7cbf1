use std::sync::Arc;
use parking_lot::Mutex;
use lumen_core::log;
use crate::buffer::{Buffer, BufferDesc};
use crate::command::{CommandList, CommandListKind};
use crate::device::{Device, DeviceDesc, GraphicsApi};
use crate::diagnostics::{QueueStats, ValidationMessage};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, PipelineKind};
use crate::pool::{CommandListHandle, CommandListPool, CommandListPoolDesc};
use crate::shader::{Shader, ShaderDesc};
use crate::swapchain::{Swapchain, SwapchainDesc};
use crate::synchronization::Fence;
use crate::texture::{Texture, TextureDesc};
use super::command::SoftCommandList;
use super::fence::{FenceState, SoftFence};
use super::queue::{GpuQueue, QueueItem};
use super::resource::{SoftBuffer, SoftPipeline, SoftShader, SoftTexture};
use super::swapchain::SoftSwapchain;

struct FrameState {
    index: usize,
    /// Frame fence value each slot's last frame signals.
    fence_values: Vec<u64>,
    next_value: u64,
}

pub struct SoftDevice {
    desc: DeviceDesc,
    queue: GpuQueue,
    frame: Mutex<FrameState>,
    frame_fence: Arc<FenceState>,
}

impl SoftDevice {
    pub(crate) fn new(desc: &DeviceDesc) -> RhiResult<Self> {
        let queue = GpuQueue::new(&desc.debug_name, desc.enable_validation, desc.enable_gpu_validation)?;
        let frame_fence = Arc::new(FenceState::new(0));
        queue.register(&frame_fence);
        Ok(Self {
            desc: desc.clone(),
            queue,
            frame: Mutex::new(FrameState {
                index: 0,
                fence_values: vec![0; desc.frame_buffer_count as usize],
                next_value: 0,
            }),
            frame_fence,
        })
    }
}

impl Device for SoftDevice {
    #[inline]
    fn api(&self) -> GraphicsApi { GraphicsApi::Software }

    #[inline]
    fn desc(&self) -> &DeviceDesc { &self.desc }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<Arc<dyn Buffer>> {
        desc.validate(self.capabilities())?;
        Ok(Arc::new(SoftBuffer::new(desc, self.queue.release_sender())?))
    }

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<Arc<dyn Texture>> {
        desc.validate(self.capabilities())?;
        Ok(Arc::new(SoftTexture::new(desc, self.queue.release_sender())?))
    }

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> RhiResult<Arc<dyn Shader>> {
        desc.validate(self.capabilities())?;
        Ok(Arc::new(SoftShader::new(desc)))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> RhiResult<Arc<dyn Pipeline>> {
        desc.validate(self.capabilities())?;
        let mut shaders = vec![desc.vertex_shader];
        shaders.extend(desc.pixel_shader);
        Ok(Arc::new(SoftPipeline::new(&desc.debug_name, PipelineKind::Graphics, &shaders)))
    }

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> RhiResult<Arc<dyn Pipeline>> {
        desc.validate()?;
        Ok(Arc::new(SoftPipeline::new(&desc.debug_name, PipelineKind::Compute, &[desc.compute_shader])))
    }

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<Box<dyn Swapchain>> {
        Ok(Box::new(SoftSwapchain::new(
            desc,
            self.capabilities().clone(),
            self.queue.sender(),
            self.queue.release_sender(),
        )?))
    }

    fn create_command_list(&self, kind: CommandListKind, debug_name: &str) -> RhiResult<CommandListHandle> {
        let max_groups = self.capabilities().max_dispatch_group_count;
        Ok(CommandListHandle::new(Box::new(SoftCommandList::new(kind, debug_name, max_groups))))
    }

    fn create_command_list_pool(&self, desc: &CommandListPoolDesc) -> RhiResult<CommandListPool> {
        let kind = desc.kind;
        let name = desc.debug_name.clone();
        let max_groups = self.capabilities().max_dispatch_group_count;
        CommandListPool::new(
            desc,
            Box::new(move || -> RhiResult<Box<dyn CommandList>> {
                Ok(Box::new(SoftCommandList::new(kind, &name, max_groups)))
            }),
        )
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<Arc<dyn Fence>> {
        let fence = SoftFence::new(initial_value);
        self.queue.register(fence.state());
        Ok(Arc::new(fence))
    }

    fn submit_batch(&self, lists: &[CommandListHandle]) -> RhiResult<()> {
        profiling::scope!("SoftDevice::submit_batch");

        let recorded: Vec<_> = lists
            .iter()
            .filter_map(|handle| {
                let mut list = handle.lock();
                match list.as_any_mut().downcast_mut::<SoftCommandList>() {
                    Some(list) => list.take_for_submit(),
                    None => {
                        debug_assert!(false, "command list `{}` was not created by this device", list.debug_name());
                        log::error!("Command list `{}` was not created by this device, skipped", list.debug_name());
                        None
                    }
                }
            })
            .collect();

        if recorded.is_empty() {
            return Ok(());
        }
        log::trace!("Submitting {} command lists", recorded.len());
        self.queue.send(QueueItem::Execute(recorded))
    }

    fn signal_fence(&self, fence: &dyn Fence, value: u64) -> RhiResult<()> {
        let Some(fence) = fence.as_any().downcast_ref::<SoftFence>() else {
            return Err(RhiError::invalid_usage("fence was not created by the software backend"));
        };
        self.queue.send(QueueItem::Signal { fence: fence.state().clone(), value })
    }

    #[profiling::function]
    fn wait_idle(&self) -> RhiResult<()> {
        let idle = Arc::new(FenceState::new(0));
        self.queue.register(&idle);
        self.queue.send(QueueItem::Signal { fence: idle.clone(), value: 1 })?;
        idle.wait(1)
    }

    #[profiling::function]
    fn begin_frame(&self) -> RhiResult<usize> {
        let (index, value) = {
            let frame = self.frame.lock();
            (frame.index, frame.fence_values[frame.index])
        };
        self.frame_fence.wait(value)?;
        Ok(index)
    }

    fn end_frame(&self) -> RhiResult<()> {
        let mut frame = self.frame.lock();
        let value = frame.next_value + 1;
        self.queue.send(QueueItem::Signal { fence: self.frame_fence.clone(), value })?;

        let index = frame.index;
        frame.next_value = value;
        frame.fence_values[index] = value;
        frame.index = (index + 1) % frame.fence_values.len();
        Ok(())
    }

    fn current_frame_index(&self) -> usize {
        self.frame.lock().index
    }

    fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    fn take_validation_messages(&self) -> Vec<ValidationMessage> {
        self.queue.take_messages()
    }
}

impl Drop for SoftDevice {
    fn drop(&mut self) {
        // Outstanding work still references resources the caller may be tearing down.
        if let Err(err) = self.wait_idle() {
            log::warn!("Software device `{}` dropped with a lost queue: {}", self.desc.debug_name, err);
        }
        log::debug!("Destroyed software device `{}`", self.desc.debug_name);
    }
}
