//! Parser for `MDL1` model files.
//!
//! A model is a flat list of scene-graph nodes. Each node may embed a mesh
//! entity (a `MESH` chunk followed by a bone table and two deprecated fields):
//!
//! ```text
//! FourCC magic = "MDL1"
//! i32    version (2)
//! i32    num_nodes
//! nodes: string name, Mat4x3 local_to_parent, i32 parent, i32 entity_type,
//!        [mesh entity if entity_type == 0]
//!
//! mesh entity: MESH chunk, i32 num_bones,
//!              bones[num_bones]: i32 node_index, Mat4x3 inv_rest_matrix,
//!              Vec3 emissive_color (ignored), u8 cast_shadow (ignored)
//! ```

use tracing::{debug, trace};

use crate::data::parser_utils::{ByteCursor, FixedString, FourCC, Mat4x3};
use crate::error::{LoadError, LoadResult};
use crate::models::mesh::MeshLoadRecord;

/// Only supported `MDL1` file version.
pub const MODEL_VERSION: i32 = 2;
/// Node entity type: no payload follows.
pub const ENTITY_NONE: i32 = -1;
/// Node entity type: a mesh entity follows.
pub const ENTITY_MESH: i32 = 0;

/// Skeletal binding of one bone.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bone {
    /// Index of the node that deforms the mesh.
    pub node_index: i32,
    /// Model space to bone space.
    pub inv_rest_matrix: Mat4x3,
}

/// One entry of the model's node list.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: FixedString,
    pub local_to_parent: Mat4x3,
    /// Raw parent index, `-1` for roots.
    pub parent_index: i32,
    /// Index into [`DecodedModel::meshes`] when this node carries a mesh.
    pub mesh: Option<usize>,
}

impl Node {
    pub fn parent(&self) -> Option<usize> {
        usize::try_from(self.parent_index).ok()
    }
}

/// A node's mesh payload together with its bone table.
#[derive(Debug, Clone)]
pub struct MeshEntity<'a> {
    pub mesh: MeshLoadRecord<'a>,
    pub bones: Vec<Bone>,
}

impl<'a> MeshEntity<'a> {
    pub fn read(cursor: &mut ByteCursor<'a>) -> LoadResult<Self> {
        let mesh = MeshLoadRecord::read(cursor)?;
        let num_bones = cursor.i32()?;
        let bones = read_bones(cursor, num_bones)?;
        // Deprecated emissive color and cast shadow flag.
        let _emissive_color = cursor.vec3()?;
        let _cast_shadow = cursor.u8()?;
        Ok(MeshEntity { mesh, bones })
    }
}

/// Decode `count` bone records.
pub fn read_bones(cursor: &mut ByteCursor<'_>, count: i32) -> LoadResult<Vec<Bone>> {
    if count < 0 {
        return Err(LoadError::MalformedMesh {
            field: "num_bones",
            value: count,
        });
    }

    // Each bone is 52 bytes; don't let a bogus count reserve more than the
    // remaining input could possibly hold.
    let mut bones = Vec::with_capacity((count as usize).min(cursor.remaining() / 52));
    for _ in 0..count {
        let node_index = cursor.i32()?;
        let inv_rest_matrix = cursor.mat4x3()?;
        bones.push(Bone {
            node_index,
            inv_rest_matrix,
        });
    }
    Ok(bones)
}

/// Decode `count` nodes, collecting every embedded mesh entity in file order.
pub fn read_nodes<'a>(
    cursor: &mut ByteCursor<'a>,
    count: i32,
) -> LoadResult<(Vec<Node>, Vec<MeshEntity<'a>>)> {
    if count < 0 {
        return Err(LoadError::MalformedModel {
            field: "num_nodes",
            value: count,
        });
    }

    let mut nodes = Vec::new();
    let mut meshes = Vec::new();
    for index in 0..count as usize {
        let name = cursor.fixed_string()?;
        let local_to_parent = cursor.mat4x3()?;
        let parent_index = cursor.i32()?;
        let entity_type = cursor.i32()?;
        trace!(node = index, %name, parent_index, entity_type, "decoded node");

        let mesh = match entity_type {
            ENTITY_NONE => None,
            ENTITY_MESH => {
                meshes.push(MeshEntity::read(cursor)?);
                Some(meshes.len() - 1)
            }
            _ => {
                return Err(LoadError::UnknownEntityType {
                    node: index,
                    entity_type,
                });
            }
        };

        nodes.push(Node {
            name,
            local_to_parent,
            parent_index,
            mesh,
        });
    }
    Ok((nodes, meshes))
}

/// A fully decoded model file.
#[derive(Debug, Clone)]
pub struct DecodedModel<'a> {
    pub nodes: Vec<Node>,
    /// Mesh entities in the order their nodes appear.
    pub meshes: Vec<MeshEntity<'a>>,
    /// Bytes consumed by the decode; equals the input length for files without
    /// trailing data.
    pub consumed: usize,
}

impl<'a> DecodedModel<'a> {
    /// The mesh of the last mesh-bearing node, for callers that treat a model
    /// file as a single mesh.
    pub fn primary_mesh(&self) -> Option<&MeshLoadRecord<'a>> {
        self.meshes.last().map(|entity| &entity.mesh)
    }

    pub fn into_mesh_records(self) -> Vec<MeshLoadRecord<'a>> {
        self.meshes.into_iter().map(|entity| entity.mesh).collect()
    }
}

/// Decode a complete `MDL1` file.
///
/// Any structural problem aborts the whole decode; nothing partial is returned.
pub fn decode_model(file_data: &[u8]) -> LoadResult<DecodedModel<'_>> {
    let mut cursor = ByteCursor::new(file_data);

    cursor.expect_four_cc(FourCC::MODEL)?;
    let version = cursor.i32()?;
    if version != MODEL_VERSION {
        return Err(LoadError::UnsupportedVersion {
            chunk: FourCC::MODEL,
            version,
            expected: MODEL_VERSION,
        });
    }

    let num_nodes = cursor.i32()?;
    let (nodes, meshes) = read_nodes(&mut cursor, num_nodes)?;

    if !cursor.is_empty() {
        debug!(
            trailing = cursor.remaining(),
            "model has trailing bytes after the node list"
        );
    }
    debug!(
        nodes = nodes.len(),
        meshes = meshes.len(),
        bytes = cursor.offset(),
        "decoded model"
    );

    Ok(DecodedModel {
        nodes,
        meshes,
        consumed: cursor.offset(),
    })
}

/// Decode the first `length` bytes of `stream` and return every mesh found.
pub fn load_model_from_stream(stream: &[u8], length: usize) -> LoadResult<Vec<MeshLoadRecord<'_>>> {
    let file_data = stream.get(..length).ok_or(LoadError::TruncatedInput {
        offset: 0,
        needed: length,
        available: stream.len(),
    })?;
    Ok(decode_model(file_data)?.into_mesh_records())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::Vec3;
    use crate::models::writer::{MeshDesc, ModelWriter, NodeDesc, SubmeshDesc};

    fn quad_mesh() -> MeshDesc {
        MeshDesc::builder()
            .positions(vec![
                [0.0, 0.0, 0.0],
                [100.0, 0.0, 0.0],
                [100.0, 100.0, 0.0],
                [0.0, 100.0, 0.0],
            ])
            .normals(vec![[0.0, 0.0, 1.0]; 4])
            .uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]])
            .indices(vec![0, 1, 2, 0, 2, 3])
            .submeshes(vec![SubmeshDesc::new("stone", 0, 2)])
            .build()
    }

    #[test]
    fn decodes_node_list_and_mesh() {
        let translated = Mat4x3 {
            translation: Vec3::new(1.0, 2.0, 3.0),
            ..Mat4x3::IDENTITY
        };
        let bytes = ModelWriter::encode_model(&[
            NodeDesc::new("root", -1, None),
            NodeDesc::new("quad", 0, Some(quad_mesh())).with_transform(translated),
        ]);

        let model = decode_model(&bytes).unwrap();
        assert_eq!(model.consumed, bytes.len());
        assert_eq!(model.nodes.len(), 2);
        assert_eq!(model.nodes[0].name.to_string(), "root");
        assert_eq!(model.nodes[0].parent(), None);
        assert_eq!(model.nodes[0].mesh, None);
        assert_eq!(model.nodes[1].parent(), Some(0));
        assert_eq!(model.nodes[1].mesh, Some(0));
        assert_eq!(model.nodes[1].local_to_parent, translated);
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.meshes[0].mesh.num_vertices, 4);
        assert_eq!(model.meshes[0].mesh.submeshes[0].indices_count, 6);
    }

    #[test]
    fn bones_are_retained() {
        let mut mesh = quad_mesh();
        mesh.bones = vec![
            Bone {
                node_index: 0,
                inv_rest_matrix: Mat4x3::IDENTITY,
            },
            Bone {
                node_index: 1,
                inv_rest_matrix: Mat4x3 {
                    translation: Vec3::new(0.0, -5.0, 0.0),
                    ..Mat4x3::IDENTITY
                },
            },
        ];
        let bytes = ModelWriter::encode_model(&[NodeDesc::new("skinned", -1, Some(mesh.clone()))]);
        let model = decode_model(&bytes).unwrap();
        assert_eq!(model.meshes[0].bones, mesh.bones);
        assert_eq!(model.consumed, bytes.len());
    }

    #[test]
    fn every_mesh_node_is_collected() {
        let mut second = quad_mesh();
        second.submeshes = vec![SubmeshDesc::new("moss", 3, 1)];
        let bytes = ModelWriter::encode_model(&[
            NodeDesc::new("a", -1, Some(quad_mesh())),
            NodeDesc::new("empty", 0, None),
            NodeDesc::new("b", 0, Some(second)),
        ]);

        let model = decode_model(&bytes).unwrap();
        assert_eq!(model.meshes.len(), 2);
        assert_eq!(model.nodes[2].mesh, Some(1));
        let primary = model.primary_mesh().unwrap();
        assert_eq!(primary.submeshes[0].material_name.to_string(), "moss");

        let records = load_model_from_stream(&bytes, bytes.len()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn empty_model_has_no_meshes() {
        let bytes = ModelWriter::encode_model(&[]);
        let model = decode_model(&bytes).unwrap();
        assert!(model.nodes.is_empty());
        assert!(model.primary_mesh().is_none());
        assert_eq!(bytes.len(), 12);
    }

    #[test]
    fn wrong_file_magic() {
        let mut bytes = ModelWriter::encode_model(&[]);
        bytes[..4].copy_from_slice(b"MDL2");
        assert!(matches!(
            decode_model(&bytes),
            Err(LoadError::BadMagic { expected, .. }) if expected == FourCC::MODEL
        ));
    }

    #[test]
    fn wrong_file_version() {
        let mut bytes = ModelWriter::encode_model(&[]);
        bytes[4..8].copy_from_slice(&1i32.to_le_bytes());
        assert!(matches!(
            decode_model(&bytes),
            Err(LoadError::UnsupportedVersion { version: 1, expected: 2, .. })
        ));
    }

    #[test]
    fn negative_node_count() {
        let mut bytes = ModelWriter::encode_model(&[]);
        bytes[8..12].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(matches!(
            decode_model(&bytes),
            Err(LoadError::MalformedModel {
                field: "num_nodes",
                value: -1
            })
        ));
    }

    #[test]
    fn unknown_entity_type() {
        let mut w = ModelWriter::new();
        w.four_cc(FourCC::MODEL);
        w.i32(MODEL_VERSION);
        w.i32(1);
        w.string(b"light");
        w.mat4x3(&Mat4x3::IDENTITY);
        w.i32(-1);
        w.i32(3);
        assert!(matches!(
            decode_model(&w.into_bytes()),
            Err(LoadError::UnknownEntityType {
                node: 0,
                entity_type: 3
            })
        ));
    }

    #[test]
    fn negative_bone_count() {
        let mut w = ModelWriter::new();
        w.i32(-2);
        let bytes = w.into_bytes();
        let mut cursor = ByteCursor::new(&bytes);
        let count = cursor.i32().unwrap();
        assert!(matches!(
            read_bones(&mut cursor, count),
            Err(LoadError::MalformedMesh {
                field: "num_bones",
                value: -2
            })
        ));
    }

    #[test]
    fn huge_bone_count_is_truncated_not_oom() {
        let mut cursor = ByteCursor::new(&[0u8; 10]);
        assert!(matches!(
            read_bones(&mut cursor, i32::MAX),
            Err(LoadError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn stream_length_is_respected() {
        let mut bytes =
            ModelWriter::encode_model(&[NodeDesc::new("quad", -1, Some(quad_mesh()))]);
        let length = bytes.len();
        bytes.extend_from_slice(b"garbage");

        assert_eq!(load_model_from_stream(&bytes, length).unwrap().len(), 1);
        assert!(matches!(
            load_model_from_stream(&bytes, bytes.len() + 1),
            Err(LoadError::TruncatedInput { offset: 0, .. })
        ));
        assert!(matches!(
            load_model_from_stream(&bytes, length - 1),
            Err(LoadError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn trailing_bytes_are_tolerated() {
        let mut bytes = ModelWriter::encode_model(&[NodeDesc::new("quad", -1, Some(quad_mesh()))]);
        let length = bytes.len();
        bytes.extend_from_slice(&[0u8; 3]);
        let model = decode_model(&bytes).unwrap();
        assert_eq!(model.consumed, length);
    }
}
