//! Device - the root factory and the submission / synchronization authority.

use std::sync::Arc;
use derive_builder::Builder;
use lumen_core::log;
use crate::buffer::{Buffer, BufferDesc};
use crate::command::CommandListKind;
use crate::diagnostics::{QueueStats, ValidationMessage};
use crate::error::{RhiError, RhiResult};
use crate::parallel::ParallelCommandContext;
use crate::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, Pipeline};
use crate::pool::{CommandListHandle, CommandListPool, CommandListPoolDesc};
use crate::shader::{Shader, ShaderDesc, ShaderModel};
use crate::soft::SoftDevice;
use crate::swapchain::{Swapchain, SwapchainDesc};
use crate::synchronization::Fence;
use crate::texture::{Texture, TextureDesc};

/// Deepest frame pipelining a device accepts.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum GraphicsApi {
    None,
    DirectX12,
    Vulkan,
    /// Pick the best backend compiled into this build.
    #[default]
    Auto,
    /// CPU reference backend executing work on a dedicated queue thread.
    Software,
}

impl GraphicsApi {
    /// Backends compiled into this build, best first.
    pub fn available() -> &'static [GraphicsApi] {
        &[GraphicsApi::Software]
    }

    /// Resolve `Auto` to a concrete backend. Other values resolve to themselves.
    pub fn resolve(self) -> GraphicsApi {
        match self {
            GraphicsApi::Auto => Self::available().first().copied().unwrap_or(GraphicsApi::None),
            api => api,
        }
    }
}

/// Device-wide limits and features. Fixed at creation time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub shader_model: ShaderModel,
    pub max_texture_dimension: u32,
    pub max_buffer_size: u64,
    pub max_color_attachments: u32,
    /// Largest thread group count per dispatch dimension.
    pub max_dispatch_group_count: u32,
    pub supports_mesh_shaders: bool,
    pub supports_ray_tracing: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            shader_model: ShaderModel::SM_6_6,
            max_texture_dimension: 16384,
            max_buffer_size: 1 << 30,
            max_color_attachments: 8,
            max_dispatch_group_count: 65535,
            supports_mesh_shaders: false,
            supports_ray_tracing: false,
        }
    }
}

/// Device creation parameters.
#[derive(Clone, Debug, PartialEq, Eq, Builder)]
#[builder(default)]
pub struct DeviceDesc {
    #[builder(setter(into))]
    pub debug_name: String,
    pub api: GraphicsApi,
    /// Frames the CPU may record ahead of the GPU.
    pub frame_buffer_count: u32,
    /// Backend validation layer. Costs CPU time on the queue.
    pub enable_validation: bool,
    /// Additional execution-time checks such as copy ranges.
    pub enable_gpu_validation: bool,
    pub capabilities: DeviceCapabilities,
}

impl Default for DeviceDesc {
    fn default() -> Self {
        Self {
            debug_name: "device".to_string(),
            api: GraphicsApi::Auto,
            frame_buffer_count: 2,
            enable_validation: cfg!(all(debug_assertions, feature = "validation")),
            enable_gpu_validation: false,
            capabilities: DeviceCapabilities::default(),
        }
    }
}

impl DeviceDesc {
    pub(crate) fn validate(&self) -> RhiResult<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frame_buffer_count) {
            return Err(RhiError::invalid_descriptor(format!(
                "frame_buffer_count must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frame_buffer_count
            )));
        }
        Ok(())
    }
}

/// Create the device for `desc.api`. This is the only place a backend is chosen.
pub fn create_device(desc: &DeviceDesc) -> RhiResult<Arc<dyn Device>> {
    desc.validate()?;

    let api = desc.api.resolve();
    match api {
        GraphicsApi::Software => {
            let device = SoftDevice::new(desc)?;
            log::info!(
                "Created {:?} device `{}` (frames in flight: {}, validation: {}, gpu validation: {})",
                api, desc.debug_name, desc.frame_buffer_count, desc.enable_validation, desc.enable_gpu_validation
            );
            Ok(Arc::new(device))
        }
        _ => {
            log::error!("Graphics backend {:?} is not compiled into this build", api);
            Err(RhiError::BackendUnavailable(api))
        }
    }
}

/// The backend-agnostic device.
///
/// Factory methods may be called from any thread. Submission, fence waits and frame
/// pacing belong to a single coordinating thread; the device serializes its own
/// submission bookkeeping so independent `submit` calls execute in call order.
pub trait Device: Send + Sync {
    fn api(&self) -> GraphicsApi;

    fn desc(&self) -> &DeviceDesc;

    #[inline]
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.desc().capabilities
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<Arc<dyn Buffer>>;

    fn create_texture(&self, desc: &TextureDesc) -> RhiResult<Arc<dyn Texture>>;

    fn create_shader(&self, desc: &ShaderDesc<'_>) -> RhiResult<Arc<dyn Shader>>;

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> RhiResult<Arc<dyn Pipeline>>;

    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> RhiResult<Arc<dyn Pipeline>>;

    fn create_swapchain(&self, desc: &SwapchainDesc) -> RhiResult<Box<dyn Swapchain>>;

    /// Create a standalone command list outside any pool.
    fn create_command_list(&self, kind: CommandListKind, debug_name: &str) -> RhiResult<CommandListHandle>;

    fn create_command_list_pool(&self, desc: &CommandListPoolDesc) -> RhiResult<CommandListPool>;

    fn create_fence(&self, initial_value: u64) -> RhiResult<Arc<dyn Fence>>;

    /// Enqueue closed command lists as one ordered batch. Does not block.
    fn submit_batch(&self, lists: &[CommandListHandle]) -> RhiResult<()>;

    #[inline]
    fn submit(&self, list: &CommandListHandle) -> RhiResult<()> {
        self.submit_batch(std::slice::from_ref(list))
    }

    /// Finalize the context, submit its lists in worker-index order, then release it.
    fn submit_parallel(&self, context: ParallelCommandContext<'_>) -> RhiResult<()> {
        profiling::scope!("Device::submit_parallel");
        let mut context = context;
        context.finalize();

        let lists = context.command_lists();
        let result = if lists.is_empty() { Ok(()) } else { self.submit_batch(&lists) };

        context.release();
        result
    }

    /// Enqueue a GPU-side signal of `fence` to `value` behind all work submitted so far.
    fn signal_fence(&self, fence: &dyn Fence, value: u64) -> RhiResult<()>;

    /// Block until `fence` reaches `value`. Fails with `DeviceLost` if the queue died first.
    #[inline]
    fn wait_fence(&self, fence: &dyn Fence, value: u64) -> RhiResult<()> {
        fence.wait(value)
    }

    /// Block until every submitted piece of work has executed.
    fn wait_idle(&self) -> RhiResult<()>;

    /// Wait until the resources of the frame slot about to be reused are free on the GPU,
    /// and return that slot index.
    fn begin_frame(&self) -> RhiResult<usize>;

    /// Mark the end of the frame's submissions and advance to the next frame slot.
    fn end_frame(&self) -> RhiResult<()>;

    fn current_frame_index(&self) -> usize;

    #[inline]
    fn frame_count(&self) -> usize {
        self.desc().frame_buffer_count as usize
    }

    fn queue_stats(&self) -> QueueStats;

    /// Drain the findings of the validation layer. Empty when validation is off.
    fn take_validation_messages(&self) -> Vec<ValidationMessage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_resolves_to_an_available_backend() {
        let resolved = GraphicsApi::Auto.resolve();
        assert!(GraphicsApi::available().contains(&resolved));
        assert_eq!(GraphicsApi::Vulkan.resolve(), GraphicsApi::Vulkan);
    }

    #[test]
    fn frame_count_is_bounded() {
        let mut desc = DeviceDesc::default();
        assert!(desc.validate().is_ok());
        desc.frame_buffer_count = 0;
        assert!(desc.validate().is_err());
        desc.frame_buffer_count = MAX_FRAMES_IN_FLIGHT + 1;
        assert!(desc.validate().is_err());
    }

    #[test]
    fn builder_fills_defaults() {
        let desc = DeviceDescBuilder::default()
            .api(GraphicsApi::Software)
            .frame_buffer_count(3)
            .debug_name("test")
            .build()
            .unwrap();
        assert_eq!(desc.api, GraphicsApi::Software);
        assert_eq!(desc.frame_buffer_count, 3);
        assert_eq!(desc.debug_name, "test");
        assert_eq!(desc.capabilities, DeviceCapabilities::default());
    }
}
