//! Hand-off from decoded meshes to the renderer.
//!
//! The loader never talks to a graphics API directly. Buffer creation and
//! material lookup go through [`GpuBufferFactory`] and [`MaterialResolver`],
//! which a backend implements; [`registry::BufferRegistry`] is a host-memory
//! implementation used by tooling and tests.

/// Interleaving of position, normal and uv streams into packed vertices
pub mod merge;
/// Mesh and buffer registries plus the upload entry point
pub mod registry;

use std::fmt;

use crate::error::LoadResult;

/// Opaque buffer handle returned by a [`GpuBufferFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferHandle(pub u32);

/// Handle of a registered material. Handle 0 is the default material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialHandle(pub u32);

impl MaterialHandle {
    pub const DEFAULT: MaterialHandle = MaterialHandle(0);
}

/// Index of a mesh in a [`registry::MeshRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshHandle(pub u32);

impl fmt::Display for MeshHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

impl fmt::Display for BufferUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferUsage::Vertex => f.write_str("vertex"),
            BufferUsage::Index => f.write_str("index"),
        }
    }
}

/// Creates immutable GPU buffers.
///
/// The returned handle must be usable as soon as the call returns. `data` is
/// only borrowed for the duration of the call.
///
/// [`release_buffer`](GpuBufferFactory::release_buffer) is called when an
/// upload fails after some of its buffers were already created.
pub trait GpuBufferFactory {
    fn create_immutable_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
    ) -> LoadResult<BufferHandle>;

    fn release_buffer(&mut self, handle: BufferHandle, usage: BufferUsage);
}

/// Resolves a material name hash to a registered material.
///
/// Unknown hashes resolve to [`MaterialHandle::DEFAULT`].
pub trait MaterialResolver {
    fn lookup_material_handle(&self, name_hash: u64) -> MaterialHandle;
}

impl<F> MaterialResolver for F
where
    F: Fn(u64) -> MaterialHandle,
{
    fn lookup_material_handle(&self, name_hash: u64) -> MaterialHandle {
        self(name_hash)
    }
}
