//! Software command list: records a self-contained command stream the queue thread replays.

use std::any::Any;
use std::sync::Arc;
use lumen_core::collections::SmallVec;
use lumen_core::log;
use crate::barrier::{BarrierResource, ResourceState};
use crate::buffer::Buffer;
use crate::command::{
    CommandList, CommandListId, CommandListKind, CommandListStatus, IndexFormat, RenderPassDesc, ScissorRect, Viewport,
};
use crate::pipeline::{Pipeline, PipelineKind};
use crate::texture::Texture;
use super::resource::{buffer_storage, texture_storage, BufferStorage, SoftPipeline, TextureStorage, Tracked};

/// Largest push constant block any pipeline may declare.
pub(crate) const MAX_PUSH_CONSTANT_SIZE: u32 = 256;

pub(crate) enum ResourceRef {
    Buffer(Arc<BufferStorage>),
    Texture(Arc<TextureStorage>),
}

impl ResourceRef {
    pub fn tracked(&self) -> &dyn Tracked {
        match self {
            ResourceRef::Buffer(buffer) => buffer.as_ref(),
            ResourceRef::Texture(texture) => texture.as_ref(),
        }
    }
}

pub(crate) struct ColorTarget {
    pub texture: Arc<TextureStorage>,
    pub clear: Option<[f32; 4]>,
}

pub(crate) struct DepthTarget {
    pub texture: Arc<TextureStorage>,
    pub clear_depth: Option<f32>,
    pub clear_stencil: Option<u8>,
    pub read_only: bool,
}

pub(crate) struct BoundPipeline {
    pub name: String,
    pub kind: PipelineKind,
    pub push_constant_size: u32,
}

pub(crate) enum Command {
    Barrier { resource: ResourceRef, before: ResourceState, after: ResourceState },
    BeginRenderPass { colors: SmallVec<[ColorTarget; 8]>, depth: Option<DepthTarget> },
    EndRenderPass,
    SetPipeline(BoundPipeline),
    SetViewport(Viewport),
    SetScissor(ScissorRect),
    SetVertexBuffer { slot: u32, buffer: Arc<BufferStorage> },
    SetIndexBuffer { buffer: Arc<BufferStorage>, offset: u64, format: IndexFormat },
    SetConstantBuffer { slot: u32, buffer: Arc<BufferStorage> },
    SetTexture { slot: u32, texture: Arc<TextureStorage> },
    PushConstants { end: u32 },
    Draw { vertex_count: u32, instance_count: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32 },
    Dispatch { groups: [u32; 3] },
    CopyBuffer { src: Arc<BufferStorage>, src_offset: u64, dst: Arc<BufferStorage>, dst_offset: u64, size: u64 },
    CopyTexture { src: Arc<TextureStorage>, dst: Arc<TextureStorage> },
    CopyBufferToTexture { src: Arc<BufferStorage>, src_offset: u64, dst: Arc<TextureStorage> },
    CopyTextureToBuffer { src: Arc<TextureStorage>, dst: Arc<BufferStorage>, dst_offset: u64 },
    BeginEvent(String),
    EndEvent,
    Marker(String),
}

/// A closed command stream handed over to the queue.
pub(crate) struct RecordedList {
    pub id: CommandListId,
    pub name: String,
    pub commands: Vec<Command>,
}

pub struct SoftCommandList {
    id: CommandListId,
    kind: CommandListKind,
    name: String,
    status: CommandListStatus,
    commands: Vec<Command>,
    in_render_pass: bool,
    event_depth: u32,
    max_dispatch_group_count: u32,
}

impl SoftCommandList {
    pub(crate) fn new(kind: CommandListKind, name: &str, max_dispatch_group_count: u32) -> Self {
        Self {
            id: CommandListId::next(),
            kind,
            name: name.to_owned(),
            max_dispatch_group_count,
            status: CommandListStatus::Initial,
            commands: Vec::new(),
            in_render_pass: false,
            event_depth: 0,
        }
    }

    /// Move the recorded commands out for execution. The list becomes `Submitted`.
    pub(crate) fn take_for_submit(&mut self) -> Option<RecordedList> {
        if self.status != CommandListStatus::Closed {
            debug_assert!(false, "command list `{}` submitted in {:?} state", self.name, self.status);
            log::error!("Command list `{}` submitted in {:?} state, skipped", self.name, self.status);
            return None;
        }

        self.status = CommandListStatus::Submitted;
        Some(RecordedList {
            id: self.id,
            name: self.name.clone(),
            commands: std::mem::take(&mut self.commands),
        })
    }

    #[inline]
    fn debug_check_recording(&self) {
        debug_assert_eq!(
            self.status,
            CommandListStatus::Recording,
            "command list `{}` is not recording",
            self.name
        );
    }

    #[inline]
    fn push(&mut self, command: Command) {
        self.debug_check_recording();
        self.commands.push(command);
    }

    fn debug_check_draw(&self) {
        debug_assert!(self.kind.supports_draw(), "{:?} command list `{}` cannot draw", self.kind, self.name);
        debug_assert!(self.in_render_pass, "draw outside a render pass in `{}`", self.name);
    }
}

impl std::fmt::Debug for SoftCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftCommandList")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &self.status)
            .field("commands", &self.commands.len())
            .finish()
    }
}

impl CommandList for SoftCommandList {
    #[inline]
    fn id(&self) -> CommandListId { self.id }

    #[inline]
    fn kind(&self) -> CommandListKind { self.kind }

    #[inline]
    fn status(&self) -> CommandListStatus { self.status }

    fn debug_name(&self) -> &str { &self.name }

    fn begin(&mut self) {
        debug_assert_eq!(self.status, CommandListStatus::Initial, "begin on `{}` without reset", self.name);
        self.status = CommandListStatus::Recording;
    }

    fn end(&mut self) {
        self.debug_check_recording();
        debug_assert!(!self.in_render_pass, "command list `{}` closed inside a render pass", self.name);
        debug_assert_eq!(self.event_depth, 0, "command list `{}` closed with open debug events", self.name);
        self.status = CommandListStatus::Closed;
    }

    fn reset(&mut self) {
        self.commands.clear();
        self.in_render_pass = false;
        self.event_depth = 0;
        self.status = CommandListStatus::Initial;
    }

    fn resource_barrier(&mut self, resource: BarrierResource<'_>, before: ResourceState, after: ResourceState) {
        debug_assert!(resource.state_is_valid(after), "{:?} is not a valid state for this resource", after);
        debug_assert!(!self.in_render_pass, "barrier inside a render pass in `{}`", self.name);
        let resource = match resource {
            BarrierResource::Buffer(buffer) => buffer_storage(buffer).map(ResourceRef::Buffer),
            BarrierResource::Texture(texture) => texture_storage(texture).map(ResourceRef::Texture),
        };
        if let Some(resource) = resource {
            self.push(Command::Barrier { resource, before, after });
        }
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>) {
        debug_assert!(self.kind.supports_draw(), "{:?} command list `{}` cannot render", self.kind, self.name);
        debug_assert!(!self.in_render_pass, "nested render pass in `{}`", self.name);
        debug_assert!(
            !desc.color_attachments.is_empty() || desc.depth_attachment.is_some(),
            "render pass without attachments in `{}`",
            self.name
        );

        let colors = desc
            .color_attachments
            .iter()
            .filter_map(|attachment| {
                let texture = texture_storage(attachment.texture)?;
                Some(ColorTarget { texture, clear: attachment.clear.then_some(attachment.clear_value) })
            })
            .collect();
        let depth = desc.depth_attachment.as_ref().and_then(|attachment| {
            debug_assert!(
                !attachment.is_read_only() || !(attachment.clear_depth || attachment.clear_stencil),
                "read-only depth attachment cleared in `{}`",
                self.name
            );
            Some(DepthTarget {
                texture: texture_storage(attachment.texture)?,
                clear_depth: attachment.clear_depth.then_some(attachment.depth_clear_value),
                clear_stencil: attachment.clear_stencil.then_some(attachment.stencil_clear_value),
                read_only: attachment.is_read_only(),
            })
        });

        self.in_render_pass = true;
        self.push(Command::BeginRenderPass { colors, depth });
    }

    fn end_render_pass(&mut self) {
        debug_assert!(self.in_render_pass, "end_render_pass without a render pass in `{}`", self.name);
        self.in_render_pass = false;
        self.push(Command::EndRenderPass);
    }

    fn set_pipeline(&mut self, pipeline: &dyn Pipeline) {
        let push_constant_size = pipeline
            .as_any()
            .downcast_ref::<SoftPipeline>()
            .map(SoftPipeline::push_constant_size)
            .unwrap_or(MAX_PUSH_CONSTANT_SIZE);
        self.push(Command::SetPipeline(BoundPipeline {
            name: pipeline.debug_name().to_owned(),
            kind: pipeline.kind(),
            push_constant_size,
        }));
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        debug_assert!(viewport.width > 0.0 && viewport.height > 0.0, "empty viewport in `{}`", self.name);
        self.push(Command::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: ScissorRect) {
        self.push(Command::SetScissor(scissor));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: &dyn Buffer, offset: u64) {
        debug_assert!(offset <= buffer.size(), "vertex buffer offset past the end of `{}`", buffer.desc().debug_name);
        if let Some(buffer) = buffer_storage(buffer) {
            self.push(Command::SetVertexBuffer { slot, buffer });
        }
    }

    fn set_index_buffer(&mut self, buffer: &dyn Buffer, offset: u64, format: IndexFormat) {
        if let Some(buffer) = buffer_storage(buffer) {
            self.push(Command::SetIndexBuffer { buffer, offset, format });
        }
    }

    fn set_constant_buffer(&mut self, slot: u32, buffer: &dyn Buffer) {
        if let Some(buffer) = buffer_storage(buffer) {
            self.push(Command::SetConstantBuffer { slot, buffer });
        }
    }

    fn set_texture(&mut self, slot: u32, texture: &dyn Texture) {
        if let Some(texture) = texture_storage(texture) {
            self.push(Command::SetTexture { slot, texture });
        }
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) {
        let end = offset as u64 + data.len() as u64;
        debug_assert!(end <= MAX_PUSH_CONSTANT_SIZE as u64, "push constants overflow in `{}`", self.name);
        self.push(Command::PushConstants { end: end.min(u32::MAX as u64) as u32 });
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.debug_check_draw();
        self.push(Command::Draw { vertex_count, instance_count });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.debug_check_draw();
        self.push(Command::DrawIndexed { index_count, instance_count, first_index });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        debug_assert!(self.kind.supports_dispatch(), "{:?} command list `{}` cannot dispatch", self.kind, self.name);
        debug_assert!(!self.in_render_pass, "dispatch inside a render pass in `{}`", self.name);
        debug_assert!(
            [group_count_x, group_count_y, group_count_z].iter().all(|&count| count <= self.max_dispatch_group_count),
            "dispatch ({}, {}, {}) in `{}` exceeds the device limit of {} groups per dimension",
            group_count_x, group_count_y, group_count_z, self.name, self.max_dispatch_group_count
        );
        self.push(Command::Dispatch { groups: [group_count_x, group_count_y, group_count_z] });
    }

    fn copy_buffer(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Buffer, dst_offset: u64, size: u64) {
        debug_assert!(!self.in_render_pass, "copy inside a render pass in `{}`", self.name);
        debug_assert!(
            src_offset.checked_add(size).is_some_and(|end| end <= src.size()),
            "copy reads past the end of `{}`",
            src.desc().debug_name
        );
        debug_assert!(
            dst_offset.checked_add(size).is_some_and(|end| end <= dst.size()),
            "copy writes past the end of `{}`",
            dst.desc().debug_name
        );
        if let (Some(src), Some(dst)) = (buffer_storage(src), buffer_storage(dst)) {
            self.push(Command::CopyBuffer { src, src_offset, dst, dst_offset, size });
        }
    }

    fn copy_texture(&mut self, src: &dyn Texture, dst: &dyn Texture) {
        debug_assert!(!self.in_render_pass, "copy inside a render pass in `{}`", self.name);
        debug_assert!(
            src.extent() == dst.extent() && src.format() == dst.format(),
            "copy between mismatched textures `{}` and `{}`",
            src.desc().debug_name,
            dst.desc().debug_name
        );
        if let (Some(src), Some(dst)) = (texture_storage(src), texture_storage(dst)) {
            self.push(Command::CopyTexture { src, dst });
        }
    }

    fn copy_buffer_to_texture(&mut self, src: &dyn Buffer, src_offset: u64, dst: &dyn Texture) {
        debug_assert!(!self.in_render_pass, "copy inside a render pass in `{}`", self.name);
        if let (Some(src), Some(dst)) = (buffer_storage(src), texture_storage(dst)) {
            self.push(Command::CopyBufferToTexture { src, src_offset, dst });
        }
    }

    fn copy_texture_to_buffer(&mut self, src: &dyn Texture, dst: &dyn Buffer, dst_offset: u64) {
        debug_assert!(!self.in_render_pass, "copy inside a render pass in `{}`", self.name);
        if let (Some(src), Some(dst)) = (texture_storage(src), buffer_storage(dst)) {
            self.push(Command::CopyTextureToBuffer { src, dst, dst_offset });
        }
    }

    fn begin_event(&mut self, name: &str) {
        self.event_depth += 1;
        self.push(Command::BeginEvent(name.to_owned()));
    }

    fn end_event(&mut self) {
        debug_assert!(self.event_depth > 0, "end_event without begin_event in `{}`", self.name);
        self.event_depth = self.event_depth.saturating_sub(1);
        self.push(Command::EndEvent);
    }

    fn set_marker(&mut self, name: &str) {
        self.push(Command::Marker(name.to_owned()));
    }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
