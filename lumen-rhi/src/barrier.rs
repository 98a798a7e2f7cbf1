//! Resource states and explicit transition barriers.
//!
//! The RHI keeps no per-resource state table. Whoever records a barrier is the source of
//! truth for the `before` state; the backend only executes the transition. A wrong
//! `before` state is caught, if at all, by the backend validation layer.

use std::sync::atomic::{AtomicU64, Ordering};
use crate::buffer::Buffer;
use crate::texture::Texture;

/// Process-unique identity of a buffer or texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 { self.0 }
}

/// Mutually exclusive usage intents of a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Contents are undefined. As a `before` state it discards the previous contents.
    #[default]
    Undefined,
    Common,
    VertexBuffer,
    IndexBuffer,
    ConstantBuffer,
    RenderTarget,
    DepthWrite,
    DepthRead,
    ShaderResource,
    UnorderedAccess,
    CopySource,
    CopyDest,
    IndirectArgument,
    Present,
}

impl ResourceState {
    /// States in which the GPU only reads the resource. Several command lists may use a
    /// resource concurrently while it stays in one of these.
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            ResourceState::VertexBuffer
                | ResourceState::IndexBuffer
                | ResourceState::ConstantBuffer
                | ResourceState::DepthRead
                | ResourceState::ShaderResource
                | ResourceState::CopySource
                | ResourceState::IndirectArgument
                | ResourceState::Present
        )
    }

    /// States in which the GPU may write the resource. Transitions into these must be
    /// serialized against every other use of the resource by the caller.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::UnorderedAccess
                | ResourceState::CopyDest
        )
    }

    /// Whether the state is meaningful for a buffer.
    pub fn valid_for_buffer(self) -> bool {
        !matches!(
            self,
            ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::DepthRead
                | ResourceState::Present
        )
    }

    /// Whether the state is meaningful for a texture.
    pub fn valid_for_texture(self) -> bool {
        !matches!(
            self,
            ResourceState::VertexBuffer
                | ResourceState::IndexBuffer
                | ResourceState::ConstantBuffer
                | ResourceState::IndirectArgument
        )
    }
}

/// The resource a barrier transitions.
#[derive(Clone, Copy)]
pub enum BarrierResource<'a> {
    Buffer(&'a dyn Buffer),
    Texture(&'a dyn Texture),
}

impl<'a> BarrierResource<'a> {
    pub fn id(&self) -> ResourceId {
        match self {
            BarrierResource::Buffer(buffer) => buffer.id(),
            BarrierResource::Texture(texture) => texture.id(),
        }
    }

    pub fn state_is_valid(&self, state: ResourceState) -> bool {
        match self {
            BarrierResource::Buffer(_) => state.valid_for_buffer(),
            BarrierResource::Texture(_) => state.valid_for_texture(),
        }
    }
}

impl<'a> From<&'a dyn Buffer> for BarrierResource<'a> {
    fn from(value: &'a dyn Buffer) -> Self {
        BarrierResource::Buffer(value)
    }
}

impl<'a> From<&'a dyn Texture> for BarrierResource<'a> {
    fn from(value: &'a dyn Texture) -> Self {
        BarrierResource::Texture(value)
    }
}

/// One `before -> after` transition, for batched submission through
/// [`CommandList::barriers`](crate::CommandList::barriers).
#[derive(Clone, Copy)]
pub struct Barrier<'a> {
    pub resource: BarrierResource<'a>,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl<'a> Barrier<'a> {
    pub fn buffer(buffer: &'a dyn Buffer, before: ResourceState, after: ResourceState) -> Self {
        Self { resource: BarrierResource::Buffer(buffer), before, after }
    }

    pub fn texture(texture: &'a dyn Texture, before: ResourceState, after: ResourceState) -> Self {
        Self { resource: BarrierResource::Texture(texture), before, after }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ResourceState; 14] = [
        ResourceState::Undefined,
        ResourceState::Common,
        ResourceState::VertexBuffer,
        ResourceState::IndexBuffer,
        ResourceState::ConstantBuffer,
        ResourceState::RenderTarget,
        ResourceState::DepthWrite,
        ResourceState::DepthRead,
        ResourceState::ShaderResource,
        ResourceState::UnorderedAccess,
        ResourceState::CopySource,
        ResourceState::CopyDest,
        ResourceState::IndirectArgument,
        ResourceState::Present,
    ];

    #[test]
    fn read_only_and_write_states_are_disjoint() {
        for state in ALL {
            assert!(!(state.is_read_only() && state.is_write()), "{:?}", state);
        }
    }

    #[test]
    fn attachment_states_are_texture_only() {
        assert!(!ResourceState::RenderTarget.valid_for_buffer());
        assert!(ResourceState::RenderTarget.valid_for_texture());
        assert!(!ResourceState::VertexBuffer.valid_for_texture());
        assert!(ResourceState::CopyDest.valid_for_buffer());
        assert!(ResourceState::CopyDest.valid_for_texture());
    }

    #[test]
    fn resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(b.raw() > a.raw());
    }
}
