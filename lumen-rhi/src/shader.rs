//! Shader objects. Bytecode comes precompiled from the shader toolchain and is never
//! interpreted by the RHI.

use std::any::Any;
use crate::device::DeviceCapabilities;
use crate::error::{RhiError, RhiResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
    Compute,
    Geometry,
    Hull,
    Domain,
    Mesh,
    Amplification,
}

impl ShaderType {
    pub fn is_graphics(self) -> bool {
        !matches!(self, ShaderType::Compute)
    }

    pub fn requires_mesh_shading(self) -> bool {
        matches!(self, ShaderType::Mesh | ShaderType::Amplification)
    }
}

/// Highest shader model the device accepts bytecode for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShaderModel {
    pub major: u8,
    pub minor: u8,
}

impl ShaderModel {
    pub const SM_6_0: ShaderModel = ShaderModel { major: 6, minor: 0 };
    pub const SM_6_5: ShaderModel = ShaderModel { major: 6, minor: 5 };
    pub const SM_6_6: ShaderModel = ShaderModel { major: 6, minor: 6 };
}

impl Default for ShaderModel {
    fn default() -> Self { ShaderModel::SM_6_6 }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    ConstantBuffer,
    Texture,
    Sampler,
    StorageBuffer,
    StorageTexture,
}

/// A single shader resource binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderBinding {
    pub name: String,
    pub slot: u32,
    pub kind: BindingKind,
}

/// Reflection data produced alongside the bytecode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub bindings: Vec<ShaderBinding>,
    pub push_constant_size: u32,
    /// Compute thread group size, zero for other stages.
    pub thread_group_size: [u32; 3],
}

#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub debug_name: String,
    pub shader_type: ShaderType,
    pub entry_point: String,
    pub bytecode: &'a [u8],
    pub reflection: ShaderReflection,
    /// Shader model the bytecode targets.
    pub shader_model: ShaderModel,
}

impl<'a> ShaderDesc<'a> {
    pub fn new(name: &str, shader_type: ShaderType, bytecode: &'a [u8]) -> Self {
        Self {
            debug_name: name.to_owned(),
            shader_type,
            entry_point: "main".to_owned(),
            bytecode,
            reflection: ShaderReflection::default(),
            shader_model: ShaderModel::SM_6_0,
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    pub fn with_reflection(mut self, reflection: ShaderReflection) -> Self {
        self.reflection = reflection;
        self
    }

    pub fn with_shader_model(mut self, shader_model: ShaderModel) -> Self {
        self.shader_model = shader_model;
        self
    }

    pub(crate) fn validate(&self, caps: &DeviceCapabilities) -> RhiResult<()> {
        if self.bytecode.is_empty() {
            return Err(RhiError::invalid_descriptor(format!("shader `{}` has no bytecode", self.debug_name)));
        }
        if self.shader_model > caps.shader_model {
            return Err(RhiError::invalid_descriptor(format!(
                "shader `{}` targets SM {}.{}, device supports {}.{}",
                self.debug_name,
                self.shader_model.major,
                self.shader_model.minor,
                caps.shader_model.major,
                caps.shader_model.minor
            )));
        }
        if self.shader_type.requires_mesh_shading() && !caps.supports_mesh_shaders {
            return Err(RhiError::invalid_descriptor(format!(
                "shader `{}` is a {:?} shader but mesh shading is unsupported",
                self.debug_name, self.shader_type
            )));
        }
        Ok(())
    }
}

pub trait Shader: Send + Sync + std::fmt::Debug {
    fn shader_type(&self) -> ShaderType;

    fn debug_name(&self) -> &str;

    fn entry_point(&self) -> &str;

    fn bytecode(&self) -> &[u8];

    fn reflection(&self) -> &ShaderReflection;

    fn as_any(&self) -> &dyn Any;
}
