//! The command list contract.
//!
//! A command list is a single-writer, totally ordered recording:
//! `Initial -> Recording (begin) -> Closed (end) -> Submitted`, and back to `Initial`
//! through [`CommandList::reset`]. Recording calls outside `Recording`, state-less draws
//! and out-of-range copies are caller errors checked by debug assertions only.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use lumen_core::collections::SmallVec;
use crate::barrier::{Barrier, BarrierResource, ResourceState};
use crate::buffer::Buffer;
use crate::pipeline::Pipeline;
use crate::texture::Texture;

/// Process-unique identity of a command list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandListId(u64);

impl CommandListId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 { self.0 }
}

/// Queue class a command list records for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CommandListKind {
    #[default]
    Graphics,
    Compute,
    Copy,
}

impl CommandListKind {
    pub fn supports_draw(self) -> bool {
        self == CommandListKind::Graphics
    }

    pub fn supports_dispatch(self) -> bool {
        self != CommandListKind::Copy
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandListStatus {
    Initial,
    Recording,
    Closed,
    Submitted,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { x: 0.0, y: 0.0, width, height, min_depth: 0.0, max_depth: 1.0 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ScissorRect {
    pub fn new(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u64 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// A color target of a render pass.
#[derive(Clone, Copy, Debug)]
pub struct ColorAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub clear_value: [f32; 4],
    /// Clear the attachment to `clear_value` when the pass begins.
    pub clear: bool,
    /// Keep the results when the pass ends. When false the backend may discard them.
    pub store: bool,
}

impl<'a> ColorAttachment<'a> {
    /// Load the previous contents and store the results.
    pub fn load(texture: &'a dyn Texture) -> Self {
        Self { texture, clear_value: [0.0; 4], clear: false, store: true }
    }

    pub fn clear(texture: &'a dyn Texture, clear_value: [f32; 4]) -> Self {
        Self { texture, clear_value, clear: true, store: true }
    }

    pub fn discard_on_end(mut self) -> Self {
        self.store = false;
        self
    }
}

/// The depth/stencil target of a render pass. Depth and stencil aspects clear and
/// store independently.
///
/// Only a `read_only` attachment may be bound in `DepthRead`; the store flags never imply it.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment<'a> {
    pub texture: &'a dyn Texture,
    pub depth_clear_value: f32,
    pub stencil_clear_value: u8,
    pub clear_depth: bool,
    pub clear_stencil: bool,
    pub store_depth: bool,
    pub store_stencil: bool,
    /// The pass only tests against depth and stencil. Must not clear.
    pub read_only: bool,
}

impl<'a> DepthAttachment<'a> {
    pub fn load(texture: &'a dyn Texture) -> Self {
        Self {
            texture,
            depth_clear_value: 0.0,
            stencil_clear_value: 0,
            clear_depth: false,
            clear_stencil: false,
            store_depth: true,
            store_stencil: true,
            read_only: false,
        }
    }

    /// Bind for depth testing only, for example while the texture is also sampled.
    pub fn read_only(texture: &'a dyn Texture) -> Self {
        Self { store_depth: false, store_stencil: false, read_only: true, ..Self::load(texture) }
    }

    pub fn clear(texture: &'a dyn Texture, depth: f32) -> Self {
        Self {
            depth_clear_value: depth,
            clear_depth: true,
            clear_stencil: texture.format().has_stencil(),
            ..Self::load(texture)
        }
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderPassDesc<'a> {
    pub color_attachments: SmallVec<[ColorAttachment<'a>; 8]>,
    pub depth_attachment: Option<DepthAttachment<'a>>,
}

impl<'a> RenderPassDesc<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, attachment: ColorAttachment<'a>) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth(mut self, attachment: DepthAttachment<'a>) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }
}

/// A recording target for GPU work. Not safe to record from two threads at once; the
/// pool hands each recorder its own list behind a lock.
pub trait CommandList: Send {
    fn id(&self) -> CommandListId;

    fn kind(&self) -> CommandListKind;

    fn status(&self) -> CommandListStatus;

    fn debug_name(&self) -> &str;

    /// `Initial -> Recording`.
    fn begin(&mut self);

    /// `Recording -> Closed`. No recording calls are valid afterwards until a reset.
    fn end(&mut self);

    /// Drop all recorded content and return to `Initial`. Content already submitted
    /// stays owned by the queue until it has executed.
    fn reset(&mut self);

    /// Transition `resource` from the caller-asserted `before` state to `after`.
    fn resource_barrier(&mut self, resource: BarrierResource<'_>, before: ResourceState, after: ResourceState);

    fn barriers(&mut self, barriers: &[Barrier<'_>]) {
        for barrier in barriers {
            self.resource_barrier(barrier.resource, barrier.before, barrier.after);
        }
    }

    fn buffer_barrier(&mut self, buffer: &dyn Buffer, before: ResourceState, after: ResourceState) {
        self.resource_barrier(BarrierResource::Buffer(buffer), before, after);
    }

    fn texture_barrier(&mut self, texture: &dyn Texture, before: ResourceState, after: ResourceState) {
        self.resource_barrier(BarrierResource::Texture(texture), before, after);
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>);

    fn end_render_pass(&mut self);

    fn set_pipeline(&mut self, pipeline: &dyn Pipeline);

    fn set_viewport(&mut self, viewport: Viewport);

    fn set_scissor(&mut self, scissor: ScissorRect);

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &dyn Buffer, offset: u64);

    fn set_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, format: IndexFormat);

    fn set_constant_buffer(&mut self, slot: u32, buffer: &dyn Buffer);

    /// Bind `texture` for sampling. It must be in `ShaderResource` when the draw executes.
    fn set_texture(&mut self, slot: u32, texture: &dyn Texture);

    fn push_constants(&mut self, offset: u32, data: &[u8]);

    #[inline]
    fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.draw_instanced(vertex_count, 1, first_vertex, 0);
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    #[inline]
    fn draw_indexed(&mut self, index_count: u32, first_index: u32, vertex_offset: i32) {
        self.draw_indexed_instanced(index_count, 1, first_index, vertex_offset, 0);
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    /// Requires `src` in `CopySource`, `dst` in `CopyDest`,
    /// `src_offset + size <= src.size()` and `dst_offset + size <= dst.size()`.
    fn copy_buffer(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Buffer, dst_offset: u64, size: u64);

    /// Copy the whole top mip level. Both textures must share extent and format.
    fn copy_texture(&mut self, src: &dyn Texture, dst: &dyn Texture);

    /// Upload tightly packed texels starting at `src_offset` into the top mip level of `dst`.
    fn copy_buffer_to_texture(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Texture);

    /// Read back the top mip level of `src`, tightly packed, into `dst` at `dst_offset`.
    fn copy_texture_to_buffer(&mut self, src: &dyn Texture, dst: &dyn Buffer, dst_offset: u64);

    fn begin_event(&mut self, name: &str);

    fn end_event(&mut self);

    fn set_marker(&mut self, name: &str);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
