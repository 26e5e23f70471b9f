use std::io;

use thiserror::Error;

use crate::data::parser_utils::FourCC;
use crate::models::vertex_stream::VertexSlot;

/// Everything that can abort loading a single model file.
///
/// All variants are terminal for the current load: no partial mesh is ever
/// registered once one of these has been returned.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("bad magic at 0x{offset:X}: expected {expected}, got {got}")]
    BadMagic {
        offset: usize,
        expected: FourCC,
        got: FourCC,
    },
    #[error("unsupported {chunk} version {version} (expected {expected})")]
    UnsupportedVersion {
        chunk: FourCC,
        version: i32,
        expected: i32,
    },
    #[error("malformed mesh: {field} is {value}")]
    MalformedMesh { field: &'static str, value: i32 },
    #[error("malformed model: {field} is {value}")]
    MalformedModel { field: &'static str, value: i32 },
    #[error("mesh declares {count} submeshes, at most {capacity} are supported")]
    TooManySubmeshes { count: i32, capacity: usize },
    #[error(
        "truncated input at 0x{offset:X}: need 0x{needed:X} bytes, have 0x{available:X}"
    )]
    TruncatedInput {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("string at 0x{offset:X} has negative length {length}")]
    InvalidLength { offset: usize, length: i32 },
    #[error("invalid {slot} stream descriptor: {field} is {value}")]
    InvalidStreamDescriptor {
        slot: VertexSlot,
        field: &'static str,
        value: i64,
    },
    #[error("submesh {submesh} uses primitive type {primitive_type}, only triangle lists are supported")]
    UnsupportedPrimitive { submesh: usize, primitive_type: i32 },
    #[error("node {node} has unknown entity type {entity_type}")]
    UnknownEntityType { node: usize, entity_type: i32 },
    #[error("{slot} stream has data type {data_type} with {dimension} components, expected float32 x{expected_dimension}")]
    UnsupportedVertexFormat {
        slot: VertexSlot,
        data_type: i32,
        dimension: i32,
        expected_dimension: i32,
    },
    #[error("mesh has no {slot} stream")]
    MissingVertexStream { slot: VertexSlot },
    #[error("{registry} registry is full ({capacity} entries)")]
    CapacityExceeded {
        registry: &'static str,
        capacity: usize,
    },
    #[error("buffer creation failed: {0}")]
    BufferCreation(String),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("I/O error")]
    IoError(#[from] io::Error),
}

pub type LoadResult<T> = Result<T, LoadError>;
