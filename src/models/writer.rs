//! Encoder for `MDL1` files.
//!
//! Writes exactly the layout the readers in [`crate::models`] consume. Used to
//! author small synthetic assets for tooling and tests.

use bon::Builder;

use crate::data::parser_utils::{FourCC, Mat4x3, Vec3};
use crate::models::mesh::{BoundingVolume, MESH_VERSION, PRIMITIVE_TRIANGLE_LIST};
use crate::models::model::{Bone, ENTITY_MESH, ENTITY_NONE, MODEL_VERSION};
use crate::models::vertex_stream::{VertexDataType, VertexSlot};

/// Raw stream header and payload, written verbatim into its slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDesc {
    pub slot: VertexSlot,
    pub data_type: i32,
    pub dimension: i32,
    pub stride: i32,
    pub data: Vec<u8>,
}

/// One material range of a mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmeshDesc {
    pub material: String,
    pub primitive_type: i32,
    pub first_index: i32,
    pub triangle_count: i32,
}

impl SubmeshDesc {
    pub fn new(material: impl Into<String>, first_index: i32, triangle_count: i32) -> Self {
        Self {
            material: material.into(),
            primitive_type: PRIMITIVE_TRIANGLE_LIST,
            first_index,
            triangle_count,
        }
    }
}

/// Mesh contents to encode.
///
/// Positions, normals and uvs become tightly packed float32 streams in slots
/// 0, 1 and 5. Empty attribute lists are written as empty streams.
/// `extra_streams` replace whatever would otherwise be written for their slot.
#[derive(Debug, Clone, Default, Builder)]
pub struct MeshDesc {
    #[builder(default)]
    pub positions: Vec<[f32; 3]>,
    #[builder(default)]
    pub normals: Vec<[f32; 3]>,
    #[builder(default)]
    pub uvs: Vec<[f32; 2]>,
    #[builder(default)]
    pub indices: Vec<u32>,
    #[builder(default)]
    pub submeshes: Vec<SubmeshDesc>,
    #[builder(default)]
    pub bounds: BoundingVolume,
    #[builder(default)]
    pub bones: Vec<Bone>,
    #[builder(default)]
    pub extra_streams: Vec<StreamDesc>,
}

/// One scene-graph node to encode.
#[derive(Debug, Clone)]
pub struct NodeDesc {
    pub name: String,
    pub local_to_parent: Mat4x3,
    pub parent: i32,
    pub mesh: Option<MeshDesc>,
}

impl NodeDesc {
    pub fn new(name: impl Into<String>, parent: i32, mesh: Option<MeshDesc>) -> Self {
        Self {
            name: name.into(),
            local_to_parent: Mat4x3::IDENTITY,
            parent,
            mesh,
        }
    }

    pub fn with_transform(mut self, local_to_parent: Mat4x3) -> Self {
        self.local_to_parent = local_to_parent;
        self
    }
}

/// Little-endian byte sink mirroring [`ByteCursor`](crate::data::parser_utils::ByteCursor).
#[derive(Debug, Default, Clone)]
pub struct ModelWriter {
    buf: Vec<u8>,
}

impl ModelWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a complete model file.
    pub fn encode_model(nodes: &[NodeDesc]) -> Vec<u8> {
        let mut w = Self::new();
        w.model(nodes);
        w.into_bytes()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes(&[v])
    }

    pub fn four_cc(&mut self, tag: FourCC) -> &mut Self {
        self.bytes(tag.as_bytes())
    }

    /// Length-prefixed string, written in full regardless of its length.
    pub fn string(&mut self, s: &[u8]) -> &mut Self {
        self.i32(s.len() as i32).bytes(s)
    }

    pub fn vec3(&mut self, v: &Vec3) -> &mut Self {
        self.f32(v.x).f32(v.y).f32(v.z)
    }

    pub fn mat4x3(&mut self, m: &Mat4x3) -> &mut Self {
        self.vec3(&m.base_x)
            .vec3(&m.base_y)
            .vec3(&m.base_z)
            .vec3(&m.translation)
    }

    pub fn vertex_stream(&mut self, data_type: i32, dimension: i32, stride: i32, data: &[u8]) -> &mut Self {
        self.i32(data_type).i32(dimension).i32(stride).bytes(data)
    }

    fn float_stream<const N: usize>(&mut self, values: &[[f32; N]]) -> &mut Self {
        let float = VertexDataType::Float32.raw_code();
        if values.is_empty() {
            return self.vertex_stream(float, N as i32, 0, &[]);
        }
        let data: Vec<u8> = values
            .iter()
            .flatten()
            .flat_map(|c| c.to_le_bytes())
            .collect();
        self.vertex_stream(float, N as i32, (N * 4) as i32, &data)
    }

    /// A full `MESH` chunk.
    pub fn mesh_data(&mut self, mesh: &MeshDesc) -> &mut Self {
        self.four_cc(FourCC::MESH)
            .i32(MESH_VERSION)
            .i32(mesh.positions.len() as i32);

        for slot in VertexSlot::ALL {
            if let Some(extra) = mesh.extra_streams.iter().find(|s| s.slot == slot) {
                self.vertex_stream(extra.data_type, extra.dimension, extra.stride, &extra.data);
                continue;
            }
            match slot {
                VertexSlot::Position => self.float_stream(&mesh.positions),
                VertexSlot::Normal => self.float_stream(&mesh.normals),
                VertexSlot::TexCoord0 => self.float_stream(&mesh.uvs),
                _ => self.vertex_stream(VertexDataType::Float32.raw_code(), 0, 0, &[]),
            };
        }

        self.i32(mesh.indices.len() as i32);
        for index in &mesh.indices {
            self.u32(*index);
        }

        self.i32(mesh.submeshes.len() as i32);
        for submesh in &mesh.submeshes {
            self.string(submesh.material.as_bytes())
                .i32(submesh.primitive_type)
                .i32(submesh.first_index)
                .i32(submesh.triangle_count);
        }

        self.vec3(&mesh.bounds.sphere_center)
            .f32(mesh.bounds.sphere_radius)
            .vec3(&mesh.bounds.box_min)
            .vec3(&mesh.bounds.box_max)
    }

    /// A mesh entity: mesh chunk, bone table and the two trailing legacy fields.
    pub fn mesh_entity(&mut self, mesh: &MeshDesc) -> &mut Self {
        self.mesh_data(mesh).i32(mesh.bones.len() as i32);
        for bone in &mesh.bones {
            self.i32(bone.node_index).mat4x3(&bone.inv_rest_matrix);
        }
        self.vec3(&Vec3::default()).u8(1)
    }

    pub fn node(&mut self, node: &NodeDesc) -> &mut Self {
        self.string(node.name.as_bytes())
            .mat4x3(&node.local_to_parent)
            .i32(node.parent);
        match &node.mesh {
            Some(mesh) => self.i32(ENTITY_MESH).mesh_entity(mesh),
            None => self.i32(ENTITY_NONE),
        }
    }

    pub fn model(&mut self, nodes: &[NodeDesc]) -> &mut Self {
        self.four_cc(FourCC::MODEL)
            .i32(MODEL_VERSION)
            .i32(nodes.len() as i32);
        for node in nodes {
            self.node(node);
        }
        self
    }
}
