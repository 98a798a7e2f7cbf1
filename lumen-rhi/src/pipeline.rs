//! Graphics and compute pipeline descriptors.

use std::any::Any;
use derive_builder::Builder;
use lumen_core::collections::SmallVec;
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};
use crate::shader::{Shader, ShaderType};
use crate::texture::Format;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    #[default]
    GreaterOrEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: String,
    pub format: VertexFormat,
    pub offset: u32,
    pub slot: u32,
}

/// Fixed-function state of a graphics pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Builder)]
#[builder(default)]
pub struct GraphicsPipelineState {
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub fill_mode: FillMode,
    pub front_counter_clockwise: bool,
    pub blend_enable: bool,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
}

impl Default for GraphicsPipelineState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            fill_mode: FillMode::Solid,
            front_counter_clockwise: true,
            blend_enable: false,
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::GreaterOrEqual,
        }
    }
}

/// Graphics pipeline descriptor.
///
/// Shaders are borrowed: they must outlive the pipeline created from this descriptor.
#[derive(Clone)]
pub struct GraphicsPipelineDesc<'a> {
    pub debug_name: String,
    pub vertex_shader: &'a dyn Shader,
    pub pixel_shader: Option<&'a dyn Shader>,
    pub vertex_layout: Vec<VertexAttribute>,
    pub state: GraphicsPipelineState,
    pub color_formats: SmallVec<[Format; 8]>,
    pub depth_format: Option<Format>,
}

impl<'a> GraphicsPipelineDesc<'a> {
    pub fn new(name: &str, vertex_shader: &'a dyn Shader) -> Self {
        Self {
            debug_name: name.to_owned(),
            vertex_shader,
            pixel_shader: None,
            vertex_layout: Vec::new(),
            state: GraphicsPipelineState::default(),
            color_formats: SmallVec::new(),
            depth_format: None,
        }
    }

    pub fn with_pixel_shader(mut self, shader: &'a dyn Shader) -> Self {
        self.pixel_shader = Some(shader);
        self
    }

    pub fn with_color(mut self, format: Format) -> Self {
        self.color_formats.push(format);
        self
    }

    pub fn with_depth(mut self, format: Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_state(mut self, state: GraphicsPipelineState) -> Self {
        self.state = state;
        self
    }

    pub fn with_vertex_attribute(mut self, semantic: &str, format: VertexFormat, offset: u32, slot: u32) -> Self {
        self.vertex_layout.push(VertexAttribute { semantic: semantic.to_owned(), format, offset, slot });
        self
    }

    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> RhiResult<()> {
        let name = &self.debug_name;
        if !matches!(self.vertex_shader.shader_type(), ShaderType::Vertex | ShaderType::Mesh) {
            return Err(RhiError::invalid_descriptor(format!(
                "pipeline `{}`: `{}` is a {:?} shader, expected vertex or mesh",
                name,
                self.vertex_shader.debug_name(),
                self.vertex_shader.shader_type()
            )));
        }
        if let Some(pixel) = self.pixel_shader {
            if pixel.shader_type() != ShaderType::Pixel {
                return Err(RhiError::invalid_descriptor(format!(
                    "pipeline `{}`: `{}` is not a pixel shader",
                    name,
                    pixel.debug_name()
                )));
            }
        }
        if self.color_formats.len() > caps.max_color_attachments as usize {
            return Err(RhiError::invalid_descriptor(format!(
                "pipeline `{}` has {} color targets, device limit is {}",
                name,
                self.color_formats.len(),
                caps.max_color_attachments
            )));
        }
        if self.color_formats.iter().any(|f| f.is_depth()) {
            return Err(RhiError::invalid_descriptor(format!("pipeline `{}` uses a depth format as color target", name)));
        }
        if self.depth_format.is_some_and(|f| !f.is_depth()) {
            return Err(RhiError::invalid_descriptor(format!("pipeline `{}` depth format is not a depth format", name)));
        }
        if (self.state.depth_test || self.state.depth_write) && self.depth_format.is_none() {
            return Err(RhiError::invalid_descriptor(format!("pipeline `{}` enables depth without a depth target", name)));
        }
        Ok(())
    }
}

/// Compute pipeline descriptor. The shader must outlive the created pipeline.
#[derive(Clone)]
pub struct ComputePipelineDesc<'a> {
    pub debug_name: String,
    pub compute_shader: &'a dyn Shader,
}

impl<'a> ComputePipelineDesc<'a> {
    pub fn new(name: &str, compute_shader: &'a dyn Shader) -> Self {
        Self { debug_name: name.to_owned(), compute_shader }
    }

    pub(crate) fn validate(&self) -> RhiResult<()> {
        if self.compute_shader.shader_type() != ShaderType::Compute {
            return Err(RhiError::invalid_descriptor(format!(
                "pipeline `{}`: `{}` is not a compute shader",
                self.debug_name,
                self.compute_shader.debug_name()
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

pub trait Pipeline: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> PipelineKind;

    fn debug_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}
