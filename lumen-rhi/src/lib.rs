//! Lumen RHI (Render Hardware Interface).
//!
//! Backend-agnostic devices, resources and command lists, plus the CPU-side machinery for
//! multi-threaded recording: a thread-safe command list pool and a per-phase parallel
//! recording context. Exactly one backend is chosen at device creation.

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod device;
pub mod diagnostics;
pub mod parallel;
pub mod pipeline;
pub mod pool;
pub mod shader;
pub mod soft;
pub mod swapchain;
pub mod texture;
mod error;
mod synchronization;

pub use barrier::{Barrier, BarrierResource, ResourceId, ResourceState};
pub use buffer::{Buffer, BufferDesc, BufferUsage, BufferUsages, CpuAccess};
pub use command::{
    ColorAttachment, CommandList, CommandListId, CommandListKind, CommandListStatus, DepthAttachment,
    IndexFormat, RenderPassDesc, ScissorRect, Viewport,
};
pub use device::{
    create_device, Device, DeviceCapabilities, DeviceDesc, DeviceDescBuilder, DeviceDescBuilderError,
    GraphicsApi, MAX_FRAMES_IN_FLIGHT,
};
pub use diagnostics::{QueueStats, ValidationKind, ValidationMessage};
pub use error::{RhiError, RhiResult};
pub use parallel::ParallelCommandContext;
pub use pipeline::{
    CompareOp, ComputePipelineDesc, CullMode, FillMode, GraphicsPipelineDesc, GraphicsPipelineState,
    GraphicsPipelineStateBuilder, GraphicsPipelineStateBuilderError, Pipeline, PipelineKind, PrimitiveTopology,
    VertexAttribute, VertexFormat,
};
pub use pool::{CommandListAllocator, CommandListHandle, CommandListPool, CommandListPoolDesc};
pub use shader::{BindingKind, Shader, ShaderBinding, ShaderDesc, ShaderModel, ShaderReflection, ShaderType};
pub use swapchain::{Swapchain, SwapchainDesc, SwapchainDescBuilder, SwapchainDescBuilderError};
pub use synchronization::Fence;
pub use texture::{Format, Texture, TextureDesc, TextureDimension, TextureUsage, TextureUsages};
