//! Parser for `MESH` chunks.
//!
//! Layout, in order, with no padding:
//!
//! ```text
//! FourCC  magic = "MESH"
//! i32     version (2)
//! i32     num_vertices
//! 15 x    vertex stream (see `vertex_stream`)
//! i32     num_indices
//! i32     indices[num_indices]
//! i32     num_segments
//!         segments[num_segments]: string material, i32 primitive_type,
//!                                 i32 first_index, i32 triangle_count
//! Vec3    bound_center
//! f32     bound_radius
//! Vec3    bound_min
//! Vec3    bound_max
//! ```

use smallvec::SmallVec;

use crate::data::parser_utils::{ByteCursor, FixedString, FourCC, Vec3};
use crate::error::{LoadError, LoadResult};
use crate::models::vertex_stream::{MAX_VERTEX_STREAMS, VertexSlot, VertexStream};

/// Only supported `MESH` chunk version.
pub const MESH_VERSION: i32 = 2;
/// Most submeshes a single mesh may declare.
pub const MAX_SUBMESHES: usize = 4;
/// The only supported segment primitive type.
pub const PRIMITIVE_TRIANGLE_LIST: i32 = 2;
/// Size of one on-disk index.
pub const INDEX_SIZE: usize = 4;

/// One material range of a mesh's index buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmeshRecord {
    pub material_name: FixedString,
    /// Hash of `material_name`, the key for material lookups.
    pub material_hash: u64,
    /// First index, stored exactly as found on disk.
    pub indices_start: u32,
    /// Number of indices (`triangle_count * 3`).
    pub indices_count: u32,
}

/// Bounding sphere and box in model space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingVolume {
    pub sphere_center: Vec3,
    pub sphere_radius: f32,
    pub box_min: Vec3,
    pub box_max: Vec3,
}

impl BoundingVolume {
    fn read(cursor: &mut ByteCursor<'_>) -> LoadResult<Self> {
        let sphere_center = cursor.vec3()?;
        let sphere_radius = cursor.f32()?;
        let box_min = cursor.vec3()?;
        let box_max = cursor.vec3()?;
        Ok(BoundingVolume {
            sphere_center,
            sphere_radius,
            box_min,
            box_max,
        })
    }
}

/// Everything decoded from one `MESH` chunk.
///
/// Vertex and index data are borrowed from the loaded file, which therefore
/// has to outlive this record until it has been uploaded.
#[derive(Debug, Clone)]
pub struct MeshLoadRecord<'a> {
    pub num_vertices: u32,
    pub num_indices: u32,
    pub streams: [Option<VertexStream<'a>>; MAX_VERTEX_STREAMS],
    /// Raw little-endian `u32` index block, `num_indices * 4` bytes.
    pub indices: &'a [u8],
    pub submeshes: SmallVec<[SubmeshRecord; MAX_SUBMESHES]>,
    pub bounds: BoundingVolume,
}

impl<'a> MeshLoadRecord<'a> {
    /// Decode a `MESH` chunk starting at the cursor.
    pub fn read(cursor: &mut ByteCursor<'a>) -> LoadResult<Self> {
        cursor.expect_four_cc(FourCC::MESH)?;
        let version = cursor.i32()?;
        if version != MESH_VERSION {
            return Err(LoadError::UnsupportedVersion {
                chunk: FourCC::MESH,
                version,
                expected: MESH_VERSION,
            });
        }

        let num_vertices = read_count(cursor, "num_vertices")?;

        let mut streams = [None; MAX_VERTEX_STREAMS];
        for slot in VertexSlot::ALL {
            streams[slot.index()] = VertexStream::read(cursor, num_vertices as usize, slot)?;
        }

        let num_indices = read_count(cursor, "num_indices")?;
        let indices_size = (num_indices as usize).checked_mul(INDEX_SIZE).ok_or(
            LoadError::MalformedMesh {
                field: "num_indices",
                value: num_indices as i32,
            },
        )?;
        let indices = cursor.take(indices_size)?;

        let num_segments = cursor.i32()?;
        let submeshes = read_submesh_table(cursor, num_segments)?;

        let bounds = BoundingVolume::read(cursor)?;

        Ok(MeshLoadRecord {
            num_vertices,
            num_indices,
            streams,
            indices,
            submeshes,
            bounds,
        })
    }

    pub fn stream(&self, slot: VertexSlot) -> Option<&VertexStream<'a>> {
        self.streams[slot.index()].as_ref()
    }

    pub fn present_slots(&self) -> impl Iterator<Item = VertexSlot> + '_ {
        self.streams.iter().flatten().map(|s| s.slot)
    }

    /// Indices decoded from the raw block.
    pub fn index_values(&self) -> impl Iterator<Item = u32> + '_ {
        self.indices
            .chunks_exact(INDEX_SIZE)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }
}

fn read_count(cursor: &mut ByteCursor<'_>, field: &'static str) -> LoadResult<u32> {
    let value = cursor.i32()?;
    if value < 0 {
        return Err(LoadError::MalformedMesh { field, value });
    }
    Ok(value as u32)
}

/// Decode `count` segment records into submeshes.
///
/// The count is checked against [`MAX_SUBMESHES`] before anything is read.
pub fn read_submesh_table(
    cursor: &mut ByteCursor<'_>,
    count: i32,
) -> LoadResult<SmallVec<[SubmeshRecord; MAX_SUBMESHES]>> {
    if count < 0 {
        return Err(LoadError::MalformedMesh {
            field: "num_segments",
            value: count,
        });
    }
    if count as usize > MAX_SUBMESHES {
        return Err(LoadError::TooManySubmeshes {
            count,
            capacity: MAX_SUBMESHES,
        });
    }

    let mut submeshes = SmallVec::new();
    for submesh in 0..count as usize {
        let material_name = cursor.fixed_string()?;
        let primitive_type = cursor.i32()?;
        if primitive_type != PRIMITIVE_TRIANGLE_LIST {
            return Err(LoadError::UnsupportedPrimitive {
                submesh,
                primitive_type,
            });
        }
        let first_index = cursor.i32()?;
        let triangle_count = cursor.i32()?;
        if first_index < 0 {
            return Err(LoadError::MalformedMesh {
                field: "first_index",
                value: first_index,
            });
        }
        let indices_count = u32::try_from(triangle_count)
            .ok()
            .and_then(|t| t.checked_mul(3))
            .ok_or(LoadError::MalformedMesh {
                field: "triangle_count",
                value: triangle_count,
            })?;

        submeshes.push(SubmeshRecord {
            material_hash: material_name.hash(),
            material_name,
            indices_start: first_index as u32,
            indices_count,
        });
    }
    Ok(submeshes)
}
