//! Vertex attribute stream descriptors.
//!
//! Every MESH chunk carries exactly 15 stream headers in a fixed slot order.
//! A header is `(data_type: i32, dimension: i32, stride: i32)` followed by
//! `num_vertices * stride` raw bytes when that product is non-zero. Payloads
//! are borrowed from the file buffer, never copied, until the merge step.

use std::fmt;

use crate::data::parser_utils::ByteCursor;
use crate::error::{LoadError, LoadResult};
use crate::recognized::{FromRawCode, Recognized};

/// Number of fixed vertex stream slots in a MESH chunk.
pub const MAX_VERTEX_STREAMS: usize = 15;

/// Semantic meaning of each fixed stream slot, in on-disk order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexSlot {
    Position,
    Normal,
    Tangent,
    Bitangent,
    Color,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
    BoneIndex,
    BoneWeight,
}

impl VertexSlot {
    pub const ALL: [VertexSlot; MAX_VERTEX_STREAMS] = [
        VertexSlot::Position,
        VertexSlot::Normal,
        VertexSlot::Tangent,
        VertexSlot::Bitangent,
        VertexSlot::Color,
        VertexSlot::TexCoord0,
        VertexSlot::TexCoord1,
        VertexSlot::TexCoord2,
        VertexSlot::TexCoord3,
        VertexSlot::TexCoord4,
        VertexSlot::TexCoord5,
        VertexSlot::TexCoord6,
        VertexSlot::TexCoord7,
        VertexSlot::BoneIndex,
        VertexSlot::BoneWeight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            VertexSlot::Position => "position",
            VertexSlot::Normal => "normal",
            VertexSlot::Tangent => "tangent",
            VertexSlot::Bitangent => "bitangent",
            VertexSlot::Color => "color",
            VertexSlot::TexCoord0 => "texcoord0",
            VertexSlot::TexCoord1 => "texcoord1",
            VertexSlot::TexCoord2 => "texcoord2",
            VertexSlot::TexCoord3 => "texcoord3",
            VertexSlot::TexCoord4 => "texcoord4",
            VertexSlot::TexCoord5 => "texcoord5",
            VertexSlot::TexCoord6 => "texcoord6",
            VertexSlot::TexCoord7 => "texcoord7",
            VertexSlot::BoneIndex => "bone index",
            VertexSlot::BoneWeight => "bone weight",
        }
    }
}

impl fmt::Display for VertexSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Component storage type of a vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VertexDataType {
    Byte,
    Int16,
    Int32,
    Float32,
}

impl VertexDataType {
    pub fn raw_code(self) -> i32 {
        match self {
            VertexDataType::Byte => 0,
            VertexDataType::Int16 => 1,
            VertexDataType::Int32 => 2,
            VertexDataType::Float32 => 3,
        }
    }
}

impl FromRawCode<i32> for VertexDataType {
    fn from_raw_code(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(VertexDataType::Byte),
            1 => Some(VertexDataType::Int16),
            2 => Some(VertexDataType::Int32),
            3 => Some(VertexDataType::Float32),
            _ => None,
        }
    }
}

impl fmt::Display for VertexDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VertexDataType::Byte => "byte",
            VertexDataType::Int16 => "int16",
            VertexDataType::Int32 => "int32",
            VertexDataType::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// A decoded stream header plus its borrowed payload.
#[derive(Debug, Clone, Copy)]
pub struct VertexStream<'a> {
    pub slot: VertexSlot,
    pub data_type: Recognized<VertexDataType>,
    pub dimension: i32,
    /// Byte distance between consecutive vertices.
    pub stride: usize,
    /// `num_vertices * stride` bytes, borrowed from the file buffer.
    pub data: &'a [u8],
}

impl<'a> VertexStream<'a> {
    /// Decode one stream header and step over its payload.
    ///
    /// Returns `None` for slots whose payload size is zero; the cursor is then
    /// left just past the 12 byte header.
    pub fn read(
        cursor: &mut ByteCursor<'a>,
        num_vertices: usize,
        slot: VertexSlot,
    ) -> LoadResult<Option<Self>> {
        let raw_data_type = cursor.i32()?;
        let dimension = cursor.i32()?;
        let stride = cursor.i32()?;

        if dimension < 0 {
            return Err(LoadError::InvalidStreamDescriptor {
                slot,
                field: "dimension",
                value: dimension.into(),
            });
        }
        if stride < 0 {
            return Err(LoadError::InvalidStreamDescriptor {
                slot,
                field: "stride",
                value: stride.into(),
            });
        }

        let stride = stride as usize;
        let payload_size =
            num_vertices
                .checked_mul(stride)
                .ok_or(LoadError::InvalidStreamDescriptor {
                    slot,
                    field: "payload size",
                    value: i64::MAX,
                })?;
        if payload_size == 0 {
            return Ok(None);
        }

        let data = cursor.take(payload_size)?;
        Ok(Some(VertexStream {
            slot,
            data_type: Recognized::from_raw(raw_data_type),
            dimension,
            stride,
            data,
        }))
    }

    /// Bytes of vertex `index`, `stride` long.
    pub fn vertex(&self, index: usize) -> Option<&'a [u8]> {
        let start = index.checked_mul(self.stride)?;
        self.data.get(start..start + self.stride)
    }

    pub fn vertex_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.data.len() / self.stride
        }
    }
}
