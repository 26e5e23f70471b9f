/// `MESH` chunk parsing: vertex streams, indices, submeshes and bounds
pub mod mesh;
/// `MDL1` model files: node list, mesh entities and bones
pub mod model;
/// Vertex stream headers and slot semantics
pub mod vertex_stream;
/// `MDL1` encoder for authoring synthetic assets
pub mod writer;
