//! Software resources: CPU memory behind the buffer, texture, shader and pipeline contracts.

use std::any::Any;
use std::ops::Range;
use std::sync::Arc;
use parking_lot::Mutex;
use lumen_core::log;
use crate::barrier::{ResourceId, ResourceState};
use crate::buffer::{Buffer, BufferDesc, CpuAccess};
use crate::error::{RhiError, RhiResult};
use crate::pipeline::{Pipeline, PipelineKind};
use crate::shader::{Shader, ShaderDesc, ShaderReflection, ShaderType};
use crate::texture::{Texture, TextureDesc};
use super::queue::WeakQueueSender;

/// Byte range `offset..offset + size` if it fits in `limit`.
pub(crate) fn checked_range(offset: u64, size: u64, limit: u64) -> Option<Range<usize>> {
    let end = offset.checked_add(size)?;
    if end > limit {
        return None;
    }
    Some(usize::try_from(offset).ok()?..usize::try_from(end).ok()?)
}

fn allocate_memory(size: u64) -> RhiResult<Vec<u8>> {
    let len = usize::try_from(size).map_err(|_| RhiError::OutOfMemory)?;
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|_| RhiError::OutOfMemory)?;
    data.resize(len, 0);
    Ok(data)
}

/// Anything the validation layer tracks a state for.
pub(crate) trait Tracked {
    fn id(&self) -> ResourceId;
    fn name(&self) -> &str;
    fn initial_state(&self) -> ResourceState;
}

pub(crate) struct BufferStorage {
    pub id: ResourceId,
    pub desc: BufferDesc,
    pub data: Mutex<Vec<u8>>,
    pub release: Option<WeakQueueSender>,
}

impl Drop for BufferStorage {
    fn drop(&mut self) {
        if let Some(release) = &self.release {
            release.forget(self.id);
        }
    }
}

impl Tracked for BufferStorage {
    fn id(&self) -> ResourceId { self.id }
    fn name(&self) -> &str { &self.desc.debug_name }
    fn initial_state(&self) -> ResourceState { self.desc.initial_state }
}

pub(crate) struct TextureStorage {
    pub id: ResourceId,
    pub desc: TextureDesc,
    pub data: Mutex<Vec<u8>>,
    pub release: Option<WeakQueueSender>,
}

impl Drop for TextureStorage {
    fn drop(&mut self) {
        if let Some(release) = &self.release {
            release.forget(self.id);
        }
    }
}

impl Tracked for TextureStorage {
    fn id(&self) -> ResourceId { self.id }
    fn name(&self) -> &str { &self.desc.debug_name }
    fn initial_state(&self) -> ResourceState { self.desc.initial_state }
}

pub struct SoftBuffer {
    storage: Arc<BufferStorage>,
}

impl SoftBuffer {
    /// `release` is told when the last reference to the memory goes away.
    pub(crate) fn new(desc: &BufferDesc, release: Option<WeakQueueSender>) -> RhiResult<Self> {
        let data = allocate_memory(desc.size)?;
        Ok(Self {
            storage: Arc::new(BufferStorage {
                id: ResourceId::next(),
                desc: desc.clone(),
                data: Mutex::new(data),
                release,
            }),
        })
    }

    pub(crate) fn storage(&self) -> &Arc<BufferStorage> { &self.storage }
}

impl std::fmt::Debug for SoftBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftBuffer")
            .field("id", &self.storage.id)
            .field("name", &self.storage.desc.debug_name)
            .field("size", &self.storage.desc.size)
            .finish()
    }
}

impl Buffer for SoftBuffer {
    #[inline]
    fn id(&self) -> ResourceId { self.storage.id }

    #[inline]
    fn desc(&self) -> &BufferDesc { &self.storage.desc }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        let desc = &self.storage.desc;
        if desc.cpu_access != CpuAccess::Write {
            return Err(RhiError::invalid_usage(format!("buffer `{}` is not CPU writable", desc.debug_name)));
        }
        let range = checked_range(offset, data.len() as u64, desc.size).ok_or_else(|| {
            RhiError::invalid_usage(format!(
                "write of {} bytes at {} overflows buffer `{}` ({} bytes)",
                data.len(), offset, desc.debug_name, desc.size
            ))
        })?;
        self.storage.data.lock()[range].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> RhiResult<()> {
        let desc = &self.storage.desc;
        if desc.cpu_access != CpuAccess::Read {
            return Err(RhiError::invalid_usage(format!("buffer `{}` is not CPU readable", desc.debug_name)));
        }
        let range = checked_range(offset, out.len() as u64, desc.size).ok_or_else(|| {
            RhiError::invalid_usage(format!(
                "read of {} bytes at {} overflows buffer `{}` ({} bytes)",
                out.len(), offset, desc.debug_name, desc.size
            ))
        })?;
        out.copy_from_slice(&self.storage.data.lock()[range]);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any { self }
}

pub struct SoftTexture {
    storage: Arc<TextureStorage>,
}

impl SoftTexture {
    pub(crate) fn new(desc: &TextureDesc, release: Option<WeakQueueSender>) -> RhiResult<Self> {
        let data = allocate_memory(desc.byte_size())?;
        Ok(Self {
            storage: Arc::new(TextureStorage {
                id: ResourceId::next(),
                desc: desc.clone(),
                data: Mutex::new(data),
                release,
            }),
        })
    }

    pub(crate) fn storage(&self) -> &Arc<TextureStorage> { &self.storage }
}

impl std::fmt::Debug for SoftTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let desc = &self.storage.desc;
        f.debug_struct("SoftTexture")
            .field("id", &self.storage.id)
            .field("name", &desc.debug_name)
            .field("extent", &(desc.width, desc.height, desc.depth))
            .field("format", &desc.format)
            .finish()
    }
}

impl Texture for SoftTexture {
    #[inline]
    fn id(&self) -> ResourceId { self.storage.id }

    #[inline]
    fn desc(&self) -> &TextureDesc { &self.storage.desc }

    fn as_any(&self) -> &dyn Any { self }
}

fn foreign_object(kind: &str, name: &str) {
    debug_assert!(false, "{} `{}` was not created by the software backend", kind, name);
    log::error!("{} `{}` was not created by the software backend, command dropped", kind, name);
}

pub(crate) fn buffer_storage(buffer: &dyn Buffer) -> Option<Arc<BufferStorage>> {
    let storage = buffer.as_any().downcast_ref::<SoftBuffer>().map(|b| b.storage.clone());
    if storage.is_none() {
        foreign_object("Buffer", &buffer.desc().debug_name);
    }
    storage
}

pub(crate) fn texture_storage(texture: &dyn Texture) -> Option<Arc<TextureStorage>> {
    let storage = texture.as_any().downcast_ref::<SoftTexture>().map(|t| t.storage.clone());
    if storage.is_none() {
        foreign_object("Texture", &texture.desc().debug_name);
    }
    storage
}

#[derive(Debug)]
pub struct SoftShader {
    name: String,
    shader_type: ShaderType,
    entry_point: String,
    bytecode: Box<[u8]>,
    reflection: ShaderReflection,
}

impl SoftShader {
    pub(crate) fn new(desc: &ShaderDesc<'_>) -> Self {
        Self {
            name: desc.debug_name.clone(),
            shader_type: desc.shader_type,
            entry_point: desc.entry_point.clone(),
            bytecode: desc.bytecode.into(),
            reflection: desc.reflection.clone(),
        }
    }
}

impl Shader for SoftShader {
    fn shader_type(&self) -> ShaderType { self.shader_type }

    fn debug_name(&self) -> &str { &self.name }

    fn entry_point(&self) -> &str { &self.entry_point }

    fn bytecode(&self) -> &[u8] { &self.bytecode }

    fn reflection(&self) -> &ShaderReflection { &self.reflection }

    fn as_any(&self) -> &dyn Any { self }
}

#[derive(Debug)]
pub struct SoftPipeline {
    name: String,
    kind: PipelineKind,
    push_constant_size: u32,
}

impl SoftPipeline {
    pub(crate) fn new(name: &str, kind: PipelineKind, shaders: &[&dyn Shader]) -> Self {
        let push_constant_size = shaders
            .iter()
            .map(|shader| shader.reflection().push_constant_size)
            .max()
            .unwrap_or(0);
        Self { name: name.to_owned(), kind, push_constant_size }
    }

    pub(crate) fn push_constant_size(&self) -> u32 { self.push_constant_size }
}

impl Pipeline for SoftPipeline {
    fn kind(&self) -> PipelineKind { self.kind }

    fn debug_name(&self) -> &str { &self.name }

    fn as_any(&self) -> &dyn Any { self }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_range_rejects_overflow() {
        assert_eq!(checked_range(0, 16, 16), Some(0..16));
        assert_eq!(checked_range(8, 8, 16), Some(8..16));
        assert_eq!(checked_range(8, 9, 16), None);
        assert_eq!(checked_range(u64::MAX, 2, u64::MAX), None);
    }

    #[test]
    fn cpu_access_is_enforced() {
        let upload = SoftBuffer::new(&BufferDesc::upload("upload", 8), None).unwrap();
        assert!(upload.write(0, &[1, 2, 3, 4]).is_ok());
        assert!(upload.write(6, &[1, 2, 3, 4]).is_err());
        assert!(upload.read(0, &mut [0; 4]).is_err());

        let readback = SoftBuffer::new(&BufferDesc::readback("readback", 8), None).unwrap();
        assert!(readback.write(0, &[1]).is_err());
        let mut out = [0xffu8; 8];
        readback.read(0, &mut out).unwrap();
        assert_eq!(out, [0; 8]);
    }
}
