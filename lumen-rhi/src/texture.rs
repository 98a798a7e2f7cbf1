//! Texture descriptors, formats and the backend-agnostic texture contract.

use std::any::Any;
use enumflags2::BitFlags;
use lumen_core::collections::SmallVec;
use crate::barrier::{ResourceId, ResourceState};
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Format {
    #[default]
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba32Float,
    R32Float,
    R32Uint,
    D32Float,
    D24UnormS8Uint,
}

impl Format {
    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Format::Rgba8Unorm | Format::Bgra8Unorm => 4,
            Format::Rgba32Float => 16,
            Format::R32Float | Format::R32Uint => 4,
            Format::D32Float | Format::D24UnormS8Uint => 4,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float | Format::D24UnormS8Uint)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint)
    }

    /// Encode an RGBA clear color into one texel of this format.
    pub fn encode_color(self, color: [f32; 4]) -> SmallVec<[u8; 16]> {
        let unorm8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        let mut texel = SmallVec::new();
        match self {
            Format::Rgba8Unorm => texel.extend(color.iter().map(|&c| unorm8(c))),
            Format::Bgra8Unorm => {
                texel.extend([color[2], color[1], color[0], color[3]].iter().map(|&c| unorm8(c)))
            }
            Format::Rgba32Float => color.iter().for_each(|c| texel.extend_from_slice(&c.to_le_bytes())),
            Format::R32Float => texel.extend_from_slice(&color[0].to_le_bytes()),
            Format::R32Uint => texel.extend_from_slice(&(color[0].max(0.0) as u32).to_le_bytes()),
            Format::D32Float | Format::D24UnormS8Uint => return self.encode_depth_stencil(color[0], 0),
        }
        texel
    }

    /// Encode a depth/stencil clear value into one texel of this format.
    pub fn encode_depth_stencil(self, depth: f32, stencil: u8) -> SmallVec<[u8; 16]> {
        let mut texel = SmallVec::new();
        match self {
            Format::D24UnormS8Uint => {
                let depth = (depth.clamp(0.0, 1.0) * 0x00ff_ffff as f32).round() as u32;
                texel.extend_from_slice(&(depth | (stencil as u32) << 24).to_le_bytes());
            }
            _ => texel.extend_from_slice(&depth.to_le_bytes()),
        }
        texel
    }
}

#[enumflags2::bitflags]
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    ShaderResource = 1 << 0,
    RenderTarget = 1 << 1,
    DepthStencil = 1 << 2,
    UnorderedAccess = 1 << 3,
    CopySource = 1 << 4,
    CopyDest = 1 << 5,
}

pub type TextureUsages = BitFlags<TextureUsage>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    D1,
    #[default]
    D2,
    D3,
    Cube,
}

/// Texture descriptor for creating GPU textures.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub debug_name: String,
    pub format: Format,
    pub dimension: TextureDimension,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, 1 otherwise.
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: TextureUsages,
    /// State the resource is in right after creation.
    pub initial_state: ResourceState,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            debug_name: String::new(),
            format: Format::Rgba8Unorm,
            dimension: TextureDimension::D2,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            usage: TextureUsage::ShaderResource.into(),
            initial_state: ResourceState::Undefined,
        }
    }
}

impl TextureDesc {
    /// Create a new sampled 2D texture descriptor.
    pub fn new_2d(name: &str, width: u32, height: u32, format: Format) -> Self {
        Self {
            debug_name: name.to_owned(),
            format,
            width,
            height,
            usage: TextureUsage::ShaderResource | TextureUsage::CopyDest,
            ..Default::default()
        }
    }

    /// Color attachment that is later sampled or copied out.
    pub fn render_target(name: &str, width: u32, height: u32, format: Format) -> Self {
        Self {
            usage: TextureUsage::RenderTarget | TextureUsage::ShaderResource | TextureUsage::CopySource,
            ..Self::new_2d(name, width, height, format)
        }
    }

    pub fn depth_stencil(name: &str, width: u32, height: u32, format: Format) -> Self {
        Self {
            usage: TextureUsage::DepthStencil.into(),
            ..Self::new_2d(name, width, height, format)
        }
    }

    /// Create a cube map texture descriptor.
    pub fn new_cube(name: &str, size: u32, format: Format) -> Self {
        Self {
            dimension: TextureDimension::Cube,
            array_layers: 6,
            ..Self::new_2d(name, size, size, format)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.debug_name = name.into();
        self
    }

    pub fn with_usage(mut self, usage: impl Into<TextureUsages>) -> Self {
        self.usage |= usage.into();
        self
    }

    pub fn with_initial_state(mut self, state: ResourceState) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Number of texels in the top mip level across all layers.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64 * self.array_layers as u64
    }

    /// Byte size of the top mip level across all layers, tightly packed.
    pub fn byte_size(&self) -> u64 {
        self.texel_count() * self.format.bytes_per_texel() as u64
    }

    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> RhiResult<()> {
        let name = &self.debug_name;
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.array_layers == 0 {
            return Err(RhiError::invalid_descriptor(format!("texture `{}` has an empty extent", name)));
        }
        let max = caps.max_texture_dimension;
        if self.width > max || self.height > max || self.depth > max {
            return Err(RhiError::invalid_descriptor(format!(
                "texture `{}` is {}x{}x{}, device limit is {}",
                name, self.width, self.height, self.depth, max
            )));
        }
        let max_mips = 32 - self.width.max(self.height).leading_zeros();
        if self.mip_levels == 0 || self.mip_levels > max_mips {
            return Err(RhiError::invalid_descriptor(format!(
                "texture `{}` requests {} mip levels, at most {} fit",
                name, self.mip_levels, max_mips
            )));
        }
        if self.dimension == TextureDimension::Cube && (self.width != self.height || self.array_layers % 6 != 0) {
            return Err(RhiError::invalid_descriptor(format!("cube texture `{}` must be square with 6n layers", name)));
        }
        if self.dimension != TextureDimension::D3 && self.depth != 1 {
            return Err(RhiError::invalid_descriptor(format!("texture `{}` has depth but is not 3D", name)));
        }
        if self.usage.contains(TextureUsage::DepthStencil) != self.format.is_depth() {
            return Err(RhiError::invalid_descriptor(format!(
                "texture `{}`: depth-stencil usage requires a depth format and vice versa",
                name
            )));
        }
        if self.format.is_depth() && self.usage.contains(TextureUsage::RenderTarget) {
            return Err(RhiError::invalid_descriptor(format!("depth texture `{}` cannot be a color target", name)));
        }
        if !self.initial_state.valid_for_texture() {
            return Err(RhiError::invalid_descriptor(format!(
                "texture `{}` cannot start in {:?}",
                name, self.initial_state
            )));
        }
        Ok(())
    }
}

/// An image resource. The descriptor is immutable for the texture's lifetime.
pub trait Texture: Send + Sync + std::fmt::Debug {
    fn id(&self) -> ResourceId;

    fn desc(&self) -> &TextureDesc;

    #[inline]
    fn extent(&self) -> (u32, u32) {
        let desc = self.desc();
        (desc.width, desc.height)
    }

    #[inline]
    fn format(&self) -> Format { self.desc().format }

    fn as_any(&self) -> &dyn Any;
}
