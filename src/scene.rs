//! Scene descriptions and scene resource loading.
//!
//! A scene document lists entities (a model file plus a material file) and
//! instances that place an entity in the world:
//!
//! ```json
//! {
//!     "entities": [
//!         { "name": "wall", "model": "models/dungeon_wall_01.model", "material": "materials.json" }
//!     ],
//!     "instances": [
//!         { "entity": "wall", "transform": { "position": [0, 0, 3], "rotation": [0, 90, 0], "scale": [1, 1, 1] } }
//!     ]
//! }
//! ```

use std::collections::HashMap;

use bitflags::bitflags;
use glam::{EulerRot, Mat4, Quat};
use rootcause::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, error, warn};

use crate::data::DataFileLoader;
use crate::data::parser_utils::hash_name;
use crate::error::LoadError;
use crate::gpu::registry::{MeshRegistry, upload_meshes_to_gpu};
use crate::gpu::{GpuBufferFactory, MaterialResolver, MeshHandle};
use crate::models::model::decode_model;

/// Most render objects a scene may produce.
pub const MAX_RENDERING_OBJECTS: usize = 0xFFFF;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntityFlags: u32 {
        /// Rendered from a built-in procedural shape instead of a model file.
        const PREDEFINED_SHAPE = 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    /// Model path relative to the asset root.
    pub model: String,
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub flags: u32,
}

impl EntityDef {
    pub fn name_hash(&self) -> u64 {
        hash_name(self.name.as_bytes())
    }

    pub fn entity_flags(&self) -> EntityFlags {
        EntityFlags::from_bits_truncate(self.flags)
    }
}

fn unit_scale() -> [f32; 3] {
    [1.0; 3]
}

/// Instance placement. `rotation` holds XYZ euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: unit_scale(),
        }
    }
}

impl Transform {
    pub fn rotation_quat(&self) -> Quat {
        let [x, y, z] = self.rotation.map(f32::to_radians);
        Quat::from_euler(EulerRot::XYZ, x, y, z)
    }

    /// Translation * rotation * scale.
    pub fn to_world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            self.scale.into(),
            self.rotation_quat(),
            self.position.into(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInstance {
    pub entity: String,
    #[serde(default)]
    pub transform: Transform,
}

impl EntityInstance {
    pub fn entity_hash(&self) -> u64 {
        hash_name(self.entity.as_bytes())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDef {
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    #[serde(default)]
    pub instances: Vec<EntityInstance>,
}

impl SceneDef {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One mesh placed in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub mesh: MeshHandle,
    pub world: Mat4,
}

#[derive(Debug, Default)]
pub struct SceneResources {
    pub render_objects: Vec<RenderObject>,
    /// Meshes uploaded for each entity, keyed by entity name hash.
    pub entity_meshes: HashMap<u64, SmallVec<[MeshHandle; 1]>>,
    /// Entities dropped because their model could not be loaded.
    pub failed_entities: Vec<String>,
}

/// Load every entity's model, upload its meshes and place one render object
/// per mesh for each instance.
///
/// A model that fails to load is logged and drops only its own entity.
/// Running out of mesh, buffer or render object capacity aborts the load.
pub fn load_scene_resources<L, F, R>(
    scene: &SceneDef,
    loader: &L,
    factory: &mut F,
    resolver: &R,
    meshes: &mut MeshRegistry,
) -> Result<SceneResources, Report>
where
    L: DataFileLoader + ?Sized,
    F: GpuBufferFactory + ?Sized,
    R: MaterialResolver + ?Sized,
{
    let mut resources = SceneResources::default();

    for entity in &scene.entities {
        if entity.entity_flags().contains(EntityFlags::PREDEFINED_SHAPE) {
            warn!(entity = %entity.name, "predefined shapes are not supported, skipping entity");
            continue;
        }

        match load_entity_meshes(entity, loader, factory, resolver, meshes) {
            Ok(handles) => {
                resources.entity_meshes.insert(entity.name_hash(), handles);
            }
            Err(e @ LoadError::CapacityExceeded { .. }) => {
                Err::<(), _>(e).context(format!("Failed to load entity {}", entity.name))?;
            }
            Err(e) => {
                error!(entity = %entity.name, path = %entity.model, error = %e, "failed to load model");
                resources.failed_entities.push(entity.name.clone());
            }
        }
    }

    for instance in &scene.instances {
        let Some(handles) = resources.entity_meshes.get(&instance.entity_hash()) else {
            warn!(entity = %instance.entity, "instance references an entity with no meshes");
            continue;
        };

        let world = instance.transform.to_world_matrix();
        for &mesh in handles {
            if resources.render_objects.len() >= MAX_RENDERING_OBJECTS {
                Err::<(), _>(LoadError::CapacityExceeded {
                    registry: "render object",
                    capacity: MAX_RENDERING_OBJECTS,
                })
                .context(format!("Failed to place instance of {}", instance.entity))?;
            }
            resources.render_objects.push(RenderObject { mesh, world });
        }
    }

    debug!(
        entities = resources.entity_meshes.len(),
        failed = resources.failed_entities.len(),
        render_objects = resources.render_objects.len(),
        "loaded scene resources"
    );
    Ok(resources)
}

fn load_entity_meshes<L, F, R>(
    entity: &EntityDef,
    loader: &L,
    factory: &mut F,
    resolver: &R,
    meshes: &mut MeshRegistry,
) -> Result<SmallVec<[MeshHandle; 1]>, LoadError>
where
    L: DataFileLoader + ?Sized,
    F: GpuBufferFactory + ?Sized,
    R: MaterialResolver + ?Sized,
{
    // Decoded records borrow `file_data`, which lives until every upload is done.
    let file_data = loader.read_whole_file(&entity.model)?;
    let model = decode_model(&file_data)?;
    if model.meshes.len() > 1 {
        warn!(
            entity = %entity.name,
            meshes = model.meshes.len(),
            "model has several mesh nodes, placing all of them"
        );
    }

    let records: Vec<_> = model.meshes.iter().map(|mesh_entity| &mesh_entity.mesh).collect();
    upload_meshes_to_gpu(&records, factory, resolver, meshes)
}
