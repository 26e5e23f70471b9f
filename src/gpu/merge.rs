use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::error::{LoadError, LoadResult};
use crate::models::mesh::MeshLoadRecord;
use crate::models::vertex_stream::{VertexDataType, VertexSlot, VertexStream};
use crate::recognized::Recognized;

/// Assets store positions in centimeters; the renderer works in meters.
pub const CENTIMETERS_TO_METERS: f32 = 0.01;

/// Interleaved vertex record handed to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PackedVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

pub const PACKED_VERTEX_SIZE: usize = std::mem::size_of::<PackedVertex>();

const _: () = assert!(PACKED_VERTEX_SIZE == 32);

/// A validated float32 stream with at least `N` components per vertex.
struct FloatStream<'a, const N: usize> {
    data: &'a [u8],
    stride: usize,
}

impl<'a, const N: usize> FloatStream<'a, N> {
    fn new(stream: &VertexStream<'a>, num_vertices: usize) -> LoadResult<Self> {
        let unsupported = || LoadError::UnsupportedVertexFormat {
            slot: stream.slot,
            data_type: match stream.data_type {
                Recognized::Known(t) => t.raw_code(),
                Recognized::Unknown(raw) => raw,
            },
            dimension: stream.dimension,
            expected_dimension: N as i32,
        };

        if stream.data_type != Recognized::Known(VertexDataType::Float32) {
            return Err(unsupported());
        }
        if (stream.dimension as usize) < N || stream.stride < N * 4 {
            return Err(unsupported());
        }
        if stream.data.len() < num_vertices.saturating_mul(stream.stride) {
            return Err(LoadError::InvalidStreamDescriptor {
                slot: stream.slot,
                field: "payload size",
                value: stream.data.len() as i64,
            });
        }

        Ok(FloatStream {
            data: stream.data,
            stride: stream.stride,
        })
    }

    fn get(&self, index: usize) -> [f32; N] {
        let start = index * self.stride;
        let mut out = [0.0; N];
        for (value, bytes) in out
            .iter_mut()
            .zip(self.data[start..start + N * 4].chunks_exact(4))
        {
            *value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }
        out
    }
}

fn optional_stream<'a, const N: usize>(
    record: &MeshLoadRecord<'a>,
    slot: VertexSlot,
) -> LoadResult<Option<FloatStream<'a, N>>> {
    let num_vertices = record.num_vertices as usize;
    let stream = record
        .stream(slot)
        .map(|s| FloatStream::new(s, num_vertices))
        .transpose()?;
    if stream.is_none() {
        debug!(%slot, "stream absent, filling with zeros");
    }
    Ok(stream)
}

/// Interleave the position, normal and first uv streams of `record`.
///
/// Positions are converted from centimeters to meters. Missing normal or uv
/// streams are zero filled; a missing position stream is an error unless the
/// mesh has no vertices. Only float32 streams are accepted.
pub fn merge_vertex_streams(record: &MeshLoadRecord<'_>) -> LoadResult<Vec<PackedVertex>> {
    let num_vertices = record.num_vertices as usize;
    if num_vertices == 0 {
        return Ok(Vec::new());
    }

    let position = record
        .stream(VertexSlot::Position)
        .ok_or(LoadError::MissingVertexStream {
            slot: VertexSlot::Position,
        })?;
    let position = FloatStream::<3>::new(position, num_vertices)?;
    let normal = optional_stream::<3>(record, VertexSlot::Normal)?;
    let uv = optional_stream::<2>(record, VertexSlot::TexCoord0)?;

    let vertices = (0..num_vertices)
        .map(|i| PackedVertex {
            position: position.get(i).map(|c| c * CENTIMETERS_TO_METERS),
            normal: normal.as_ref().map_or([0.0; 3], |s| s.get(i)),
            uv: uv.as_ref().map_or([0.0; 2], |s| s.get(i)),
        })
        .collect();
    Ok(vertices)
}
