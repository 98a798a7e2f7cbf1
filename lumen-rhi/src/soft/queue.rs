//! The software queue: one thread replaying submitted work strictly in submission order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use parking_lot::Mutex;
use lumen_core::collections::hashmap::HashMap;
use lumen_core::log;
use crate::barrier::{ResourceId, ResourceState};
use crate::command::{CommandListId, IndexFormat, ScissorRect, Viewport};
use crate::diagnostics::{QueueStats, ValidationKind, ValidationMessage};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::PipelineKind;
use crate::texture::Format;
use super::command::{BoundPipeline, ColorTarget, Command, DepthTarget, RecordedList};
use super::fence::{FenceRegistry, FenceState};
use super::resource::{checked_range, BufferStorage, TextureStorage, Tracked};
use super::validation::StateTracker;

// Buffers in `Common` are implicitly promoted for copies and read-only bindings.
const BUFFER_COPY_SOURCE: &[ResourceState] = &[ResourceState::CopySource, ResourceState::Common];
const BUFFER_COPY_DEST: &[ResourceState] = &[ResourceState::CopyDest, ResourceState::Common];
const VERTEX_BUFFER: &[ResourceState] = &[ResourceState::VertexBuffer, ResourceState::Common];
const INDEX_BUFFER: &[ResourceState] = &[ResourceState::IndexBuffer, ResourceState::Common];
const CONSTANT_BUFFER: &[ResourceState] = &[ResourceState::ConstantBuffer, ResourceState::Common];

pub(crate) enum QueueItem {
    Execute(Vec<RecordedList>),
    Signal { fence: Arc<FenceState>, value: u64 },
    Present { back_buffer: Arc<TextureStorage> },
    /// The resource was destroyed; drop its tracked state.
    Forget(ResourceId),
    Shutdown,
}

#[derive(Clone)]
pub(crate) struct QueueSender(flume::Sender<QueueItem>);

impl QueueSender {
    pub fn send(&self, item: QueueItem) -> RhiResult<()> {
        self.0.send(item).map_err(|_| {
            log::error!("Software queue has shut down, work dropped");
            RhiError::DeviceLost
        })
    }

    pub fn downgrade(&self) -> WeakQueueSender {
        WeakQueueSender(self.0.downgrade())
    }
}

/// Held by resource storage. Weak so queued work that owns a resource never keeps the
/// channel alive.
#[derive(Clone)]
pub(crate) struct WeakQueueSender(flume::WeakSender<QueueItem>);

impl WeakQueueSender {
    pub fn forget(&self, id: ResourceId) {
        if let Some(sender) = self.0.upgrade() {
            // A stopped queue has no tracked state left to drop.
            let _ = sender.send(QueueItem::Forget(id));
        }
    }
}

pub(crate) struct GpuQueue {
    sender: QueueSender,
    worker: Option<JoinHandle<()>>,
    stats: Arc<Mutex<QueueStats>>,
    messages: Arc<Mutex<Vec<ValidationMessage>>>,
    fences: FenceRegistry,
    validation: bool,
}

impl GpuQueue {
    pub fn new(name: &str, validation: bool, gpu_validation: bool) -> RhiResult<Self> {
        let (sender, receiver) = flume::unbounded();
        let stats = Arc::new(Mutex::new(QueueStats::default()));
        let messages = Arc::new(Mutex::new(Vec::new()));

        let mut executor = Executor {
            stats: stats.clone(),
            messages: messages.clone(),
            tracker: validation.then(StateTracker::default),
            gpu_validation,
        };
        let fences = FenceRegistry::default();
        let lost = fences.clone();
        let worker = std::thread::Builder::new()
            .name(format!("{}-queue", name))
            .spawn(move || {
                if panic::catch_unwind(AssertUnwindSafe(|| executor.run(&receiver))).is_err() {
                    log::error!("Software queue thread panicked, device lost");
                }
                // Refuse new work before waking waiters so nobody parks on a dead queue.
                drop(receiver);
                lost.mark_lost();
            })
            .map_err(|err| {
                log::error!("Failed to spawn the software queue thread: {}", err);
                RhiError::DeviceLost
            })?;

        Ok(Self {
            sender: QueueSender(sender),
            worker: Some(worker),
            stats,
            messages,
            fences,
            validation,
        })
    }

    pub fn sender(&self) -> QueueSender {
        self.sender.clone()
    }

    /// Sender resources notify on destruction, `None` when nothing tracks their state.
    pub fn release_sender(&self) -> Option<WeakQueueSender> {
        self.validation.then(|| self.sender.downgrade())
    }

    /// Fences this queue signals. They fail their waiters with `DeviceLost` once the queue stops.
    pub fn register(&self, fence: &Arc<FenceState>) {
        self.fences.register(fence);
    }

    #[inline]
    pub fn send(&self, item: QueueItem) -> RhiResult<()> {
        self.sender.send(item)
    }

    pub fn stats(&self) -> QueueStats {
        *self.stats.lock()
    }

    pub fn take_messages(&self) -> Vec<ValidationMessage> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Execute everything already queued, then stop the thread.
    fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        // The thread may already be gone; joining still reports how it ended.
        let _ = self.sender.send(QueueItem::Shutdown);
        if worker.join().is_err() {
            log::error!("Software queue thread failed to stop cleanly");
        }
    }
}

impl Drop for GpuQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bindings of the list being replayed. Every list starts from a clean slate.
#[derive(Default)]
struct Bindings {
    pipeline: Option<BoundPipeline>,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    vertex_buffers: HashMap<u32, Arc<BufferStorage>>,
    index_buffer: Option<(Arc<BufferStorage>, u64, IndexFormat)>,
    constant_buffers: HashMap<u32, Arc<BufferStorage>>,
    textures: HashMap<u32, Arc<TextureStorage>>,
}

struct Executor {
    stats: Arc<Mutex<QueueStats>>,
    messages: Arc<Mutex<Vec<ValidationMessage>>>,
    /// Present only when the validation layer is enabled.
    tracker: Option<StateTracker>,
    gpu_validation: bool,
}

impl Executor {
    fn run(&mut self, receiver: &flume::Receiver<QueueItem>) {
        log::debug!("Software queue started");
        for item in receiver.iter() {
            match item {
                QueueItem::Execute(lists) => self.execute_batch(lists),
                QueueItem::Signal { fence, value } => {
                    self.stats.lock().fence_signals += 1;
                    fence.signal(value);
                }
                QueueItem::Present { back_buffer } => self.present(&back_buffer),
                QueueItem::Forget(id) => self.forget(id),
                QueueItem::Shutdown => break,
            }
        }
        log::debug!("Software queue stopped");
    }

    fn execute_batch(&mut self, lists: Vec<RecordedList>) {
        profiling::scope!("Executor::execute_batch");
        for list in lists {
            self.execute_list(list);
        }
        self.update_tracked_count();
    }

    fn forget(&mut self, id: ResourceId) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.forget(id);
        }
        self.update_tracked_count();
    }

    fn update_tracked_count(&self) {
        let count = self.tracker.as_ref().map_or(0, StateTracker::len);
        self.stats.lock().tracked_resources = count as u64;
    }

    fn execute_list(&mut self, list: RecordedList) {
        log::trace!("Executing command list `{}` ({} commands)", list.name, list.commands.len());

        let id = list.id;
        let mut stats = QueueStats { command_lists: 1, ..Default::default() };
        let mut bindings = Bindings::default();
        let mut event_depth = 0usize;

        for command in list.commands {
            match command {
                Command::Barrier { resource, before, after } => {
                    stats.barriers += 1;
                    let resource = resource.tracked();
                    let mismatch = self.tracker.as_mut().and_then(|tracker| tracker.transition(resource, before, after));
                    if let Some(actual) = mismatch {
                        self.report(
                            ValidationKind::BarrierStateMismatch,
                            Some(id),
                            Some(resource.id()),
                            format!(
                                "barrier on `{}` expects {:?} but the resource is in {:?}",
                                resource.name(), before, actual
                            ),
                        );
                    }
                }
                Command::BeginRenderPass { colors, depth } => {
                    stats.render_passes += 1;
                    self.begin_render_pass(id, &colors, depth.as_ref());
                }
                Command::EndRenderPass => {}
                Command::SetPipeline(pipeline) => bindings.pipeline = Some(pipeline),
                Command::SetViewport(viewport) => bindings.viewport = Some(viewport),
                Command::SetScissor(scissor) => bindings.scissor = Some(scissor),
                Command::SetVertexBuffer { slot, buffer } => {
                    bindings.vertex_buffers.insert(slot, buffer);
                }
                Command::SetIndexBuffer { buffer, offset, format } => {
                    bindings.index_buffer = Some((buffer, offset, format));
                }
                Command::SetConstantBuffer { slot, buffer } => {
                    bindings.constant_buffers.insert(slot, buffer);
                }
                Command::SetTexture { slot, texture } => {
                    bindings.textures.insert(slot, texture);
                }
                Command::PushConstants { end } => self.validate_push_constants(id, &bindings, end),
                Command::Draw { vertex_count, instance_count } => {
                    stats.draws += 1;
                    stats.vertices = stats.vertices.saturating_add(vertex_count as u64 * instance_count as u64);
                    self.validate_draw(id, &bindings, None);
                }
                Command::DrawIndexed { index_count, instance_count, first_index } => {
                    stats.draws += 1;
                    stats.vertices = stats.vertices.saturating_add(index_count as u64 * instance_count as u64);
                    self.validate_draw(id, &bindings, Some((first_index, index_count)));
                }
                Command::Dispatch { groups } => {
                    stats.dispatches += 1;
                    let groups = groups.iter().fold(1u64, |total, &g| total.saturating_mul(g as u64));
                    stats.thread_groups = stats.thread_groups.saturating_add(groups);
                    self.validate_dispatch(id, &bindings);
                }
                Command::CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                    stats.copies += 1;
                    self.copy_buffer(id, &src, src_offset, &dst, dst_offset, size);
                }
                Command::CopyTexture { src, dst } => {
                    stats.copies += 1;
                    self.copy_texture(id, &src, &dst);
                }
                Command::CopyBufferToTexture { src, src_offset, dst } => {
                    stats.copies += 1;
                    self.copy_buffer_to_texture(id, &src, src_offset, &dst);
                }
                Command::CopyTextureToBuffer { src, dst, dst_offset } => {
                    stats.copies += 1;
                    self.copy_texture_to_buffer(id, &src, &dst, dst_offset);
                }
                Command::BeginEvent(name) => {
                    log::trace!("{:indent$}> {}", "", name, indent = event_depth * 2);
                    event_depth += 1;
                }
                Command::EndEvent => event_depth = event_depth.saturating_sub(1),
                Command::Marker(name) => log::trace!("{:indent$}* {}", "", name, indent = event_depth * 2),
            }
        }

        *self.stats.lock() += stats;
    }

    fn report(
        &self,
        kind: ValidationKind,
        command_list: Option<CommandListId>,
        resource: Option<ResourceId>,
        message: String,
    ) {
        let message = ValidationMessage { kind, command_list, resource, message };
        log::warn!("Validation: {}", message);
        self.messages.lock().push(message);
    }

    /// Report `resource` unless its tracked state is one of `allowed`.
    fn expect_state(
        &mut self,
        list: Option<CommandListId>,
        resource: &dyn Tracked,
        allowed: &[ResourceState],
        kind: ValidationKind,
        usage: &str,
    ) {
        let Some(tracker) = self.tracker.as_mut() else {
            return;
        };
        let state = tracker.state_of(resource);
        if !allowed.contains(&state) {
            self.report(
                kind,
                list,
                Some(resource.id()),
                format!("`{}` used as {} in {:?}, expected one of {:?}", resource.name(), usage, state, allowed),
            );
        }
    }

    /// Skipped work never touches memory. Reported as a finding when GPU validation is on.
    fn out_of_bounds(&self, list: CommandListId, resource: &dyn Tracked, message: String) {
        if self.gpu_validation {
            self.report(ValidationKind::OutOfBounds, Some(list), Some(resource.id()), message);
        } else {
            log::error!("{}, skipped", message);
        }
    }

    fn begin_render_pass(&mut self, list: CommandListId, colors: &[ColorTarget], depth: Option<&DepthTarget>) {
        for target in colors {
            self.expect_state(
                Some(list),
                &*target.texture,
                &[ResourceState::RenderTarget],
                ValidationKind::AttachmentState,
                "color attachment",
            );
            if let Some(color) = target.clear {
                let texel = target.texture.desc.format.encode_color(color);
                fill(&target.texture, &texel);
            }
        }

        if let Some(target) = depth {
            let allowed: &[ResourceState] = if target.read_only {
                &[ResourceState::DepthRead, ResourceState::DepthWrite]
            } else {
                &[ResourceState::DepthWrite]
            };
            self.expect_state(Some(list), &*target.texture, allowed, ValidationKind::AttachmentState, "depth attachment");
            if target.clear_depth.is_some() || target.clear_stencil.is_some() {
                clear_depth_stencil(&target.texture, target.clear_depth, target.clear_stencil);
            }
        }
    }

    fn validate_push_constants(&mut self, list: CommandListId, bindings: &Bindings, end: u32) {
        if self.tracker.is_none() {
            return;
        }
        match &bindings.pipeline {
            Some(pipeline) if end > pipeline.push_constant_size => self.report(
                ValidationKind::BindingState,
                Some(list),
                None,
                format!(
                    "push constants end at byte {} but pipeline `{}` declares {}",
                    end, pipeline.name, pipeline.push_constant_size
                ),
            ),
            Some(_) => {}
            None => self.report(
                ValidationKind::MissingState,
                Some(list),
                None,
                "push constants set without a pipeline".to_string(),
            ),
        }
    }

    fn validate_pipeline(&mut self, list: CommandListId, bindings: &Bindings, expected: PipelineKind, operation: &str) {
        match &bindings.pipeline {
            Some(pipeline) if pipeline.kind == expected => {}
            Some(pipeline) => self.report(
                ValidationKind::MissingState,
                Some(list),
                None,
                format!("{} with {:?} pipeline `{}`", operation, pipeline.kind, pipeline.name),
            ),
            None => self.report(ValidationKind::MissingState, Some(list), None, format!("{} without a pipeline", operation)),
        }
    }

    fn validate_draw(&mut self, list: CommandListId, bindings: &Bindings, indexed: Option<(u32, u32)>) {
        if let Some(scissor) = bindings.scissor {
            if scissor.width == 0 || scissor.height == 0 {
                log::trace!("Draw in {:?} is culled by an empty scissor", list);
            }
        }

        if let (Some((first_index, index_count)), Some((buffer, offset, format))) = (indexed, &bindings.index_buffer) {
            let size = (first_index as u64 + index_count as u64) * format.size();
            if self.gpu_validation && checked_range(*offset, size, buffer.desc.size).is_none() {
                self.out_of_bounds(
                    list,
                    &**buffer,
                    format!("indexed draw reads {} bytes at {} from `{}`", size, offset, buffer.desc.debug_name),
                );
            }
        }

        if self.tracker.is_none() {
            return;
        }

        self.validate_pipeline(list, bindings, PipelineKind::Graphics, "draw");
        if bindings.viewport.is_none() {
            self.report(ValidationKind::MissingState, Some(list), None, "draw without a viewport".to_string());
        }
        for buffer in bindings.vertex_buffers.values() {
            self.expect_state(Some(list), &**buffer, VERTEX_BUFFER, ValidationKind::BindingState, "vertex buffer");
        }
        if indexed.is_some() {
            match &bindings.index_buffer {
                Some((buffer, _, _)) => {
                    self.expect_state(Some(list), &**buffer, INDEX_BUFFER, ValidationKind::BindingState, "index buffer")
                }
                None => self.report(
                    ValidationKind::MissingState,
                    Some(list),
                    None,
                    "indexed draw without an index buffer".to_string(),
                ),
            }
        }
        self.validate_shader_bindings(list, bindings, &[ResourceState::ShaderResource]);
    }

    fn validate_dispatch(&mut self, list: CommandListId, bindings: &Bindings) {
        if self.tracker.is_none() {
            return;
        }
        self.validate_pipeline(list, bindings, PipelineKind::Compute, "dispatch");
        self.validate_shader_bindings(
            list,
            bindings,
            &[ResourceState::ShaderResource, ResourceState::UnorderedAccess],
        );
    }

    fn validate_shader_bindings(&mut self, list: CommandListId, bindings: &Bindings, texture_states: &[ResourceState]) {
        for buffer in bindings.constant_buffers.values() {
            self.expect_state(Some(list), &**buffer, CONSTANT_BUFFER, ValidationKind::BindingState, "constant buffer");
        }
        for texture in bindings.textures.values() {
            self.expect_state(Some(list), &**texture, texture_states, ValidationKind::BindingState, "shader texture");
        }
    }

    fn copy_buffer(
        &mut self,
        list: CommandListId,
        src: &BufferStorage,
        src_offset: u64,
        dst: &BufferStorage,
        dst_offset: u64,
        size: u64,
    ) {
        self.expect_state(Some(list), src, BUFFER_COPY_SOURCE, ValidationKind::CopyState, "copy source");
        self.expect_state(Some(list), dst, BUFFER_COPY_DEST, ValidationKind::CopyState, "copy destination");

        let (Some(src_range), Some(dst_range)) = (
            checked_range(src_offset, size, src.desc.size),
            checked_range(dst_offset, size, dst.desc.size),
        ) else {
            self.out_of_bounds(
                list,
                dst,
                format!(
                    "copy of {} bytes from `{}`+{} to `{}`+{} exceeds a buffer",
                    size, src.desc.debug_name, src_offset, dst.desc.debug_name, dst_offset
                ),
            );
            return;
        };

        if std::ptr::eq(src, dst) {
            src.data.lock().copy_within(src_range, dst_range.start);
        } else {
            let src_data = src.data.lock();
            dst.data.lock()[dst_range].copy_from_slice(&src_data[src_range]);
        }
    }

    fn copy_texture(&mut self, list: CommandListId, src: &TextureStorage, dst: &TextureStorage) {
        self.expect_state(Some(list), src, &[ResourceState::CopySource], ValidationKind::CopyState, "copy source");
        self.expect_state(Some(list), dst, &[ResourceState::CopyDest], ValidationKind::CopyState, "copy destination");

        if std::ptr::eq(src, dst) {
            return;
        }
        if src.desc.byte_size() != dst.desc.byte_size() {
            self.out_of_bounds(
                list,
                dst,
                format!("texture copy `{}` -> `{}` between different sizes", src.desc.debug_name, dst.desc.debug_name),
            );
            return;
        }
        let src_data = src.data.lock();
        dst.data.lock().copy_from_slice(&src_data);
    }

    fn copy_buffer_to_texture(&mut self, list: CommandListId, src: &BufferStorage, src_offset: u64, dst: &TextureStorage) {
        self.expect_state(Some(list), src, BUFFER_COPY_SOURCE, ValidationKind::CopyState, "copy source");
        self.expect_state(Some(list), dst, &[ResourceState::CopyDest], ValidationKind::CopyState, "copy destination");

        let size = dst.desc.byte_size();
        let Some(range) = checked_range(src_offset, size, src.desc.size) else {
            self.out_of_bounds(
                list,
                src,
                format!(
                    "upload of {} bytes into `{}` reads past the end of `{}`",
                    size, dst.desc.debug_name, src.desc.debug_name
                ),
            );
            return;
        };
        let src_data = src.data.lock();
        dst.data.lock().copy_from_slice(&src_data[range]);
    }

    fn copy_texture_to_buffer(&mut self, list: CommandListId, src: &TextureStorage, dst: &BufferStorage, dst_offset: u64) {
        self.expect_state(Some(list), src, &[ResourceState::CopySource], ValidationKind::CopyState, "copy source");
        self.expect_state(Some(list), dst, BUFFER_COPY_DEST, ValidationKind::CopyState, "copy destination");

        let size = src.desc.byte_size();
        let Some(range) = checked_range(dst_offset, size, dst.desc.size) else {
            self.out_of_bounds(
                list,
                dst,
                format!(
                    "readback of {} bytes from `{}` writes past the end of `{}`",
                    size, src.desc.debug_name, dst.desc.debug_name
                ),
            );
            return;
        };
        let src_data = src.data.lock();
        dst.data.lock()[range].copy_from_slice(&src_data);
    }

    fn present(&mut self, back_buffer: &TextureStorage) {
        self.stats.lock().presents += 1;
        self.expect_state(
            None,
            back_buffer,
            &[ResourceState::Present],
            ValidationKind::PresentState,
            "presented back buffer",
        );
    }
}

fn fill(texture: &TextureStorage, texel: &[u8]) {
    let mut data = texture.data.lock();
    for chunk in data.chunks_exact_mut(texel.len()) {
        chunk.copy_from_slice(texel);
    }
}

const D24_DEPTH_MASK: u32 = 0x00ff_ffff;

/// Clear the depth and stencil aspects independently.
fn clear_depth_stencil(texture: &TextureStorage, depth: Option<f32>, stencil: Option<u8>) {
    let format = texture.desc.format;
    let depth_bits = depth.map(|depth| {
        let texel = format.encode_depth_stencil(depth, 0);
        u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]])
    });

    let mut data = texture.data.lock();
    for texel in data.chunks_exact_mut(4) {
        let old = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
        let new = match format {
            Format::D24UnormS8Uint => {
                let depth = depth_bits.map_or(old & D24_DEPTH_MASK, |bits| bits & D24_DEPTH_MASK);
                let stencil = stencil.map_or(old & !D24_DEPTH_MASK, |s| (s as u32) << 24);
                depth | stencil
            }
            _ => depth_bits.unwrap_or(old),
        };
        texel.copy_from_slice(&new.to_le_bytes());
    }
}
