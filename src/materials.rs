//! Material definitions and the material registry.
//!
//! Submeshes refer to materials by the hash of their name. The registry maps
//! those hashes to handles in registration order; unresolved hashes fall back
//! to handle 0, which is whichever material was registered first.

use std::collections::HashMap;

use bitflags::bitflags;
use bon::Builder;
use tracing::{debug, trace};

use crate::data::parser_utils::FixedString;
use crate::gpu::{MaterialHandle, MaterialResolver};

bitflags! {
    /// Pipeline state derived from a material definition.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MaterialFlags: u32 {
        const DOUBLE_SIDED = 0x1;
        const ALPHA_TEST = 0x2;
        const OPAQUE = 0x4;
        const TRANSPARENT = 0x8;
        const WRAP = 0x100;
        const CLAMP = 0x200;
        const DEPTH_TEST = 0x400;
        const DEPTH_WRITE = 0x800;
    }
}

/// One entry of a materials document.
#[derive(Debug, Clone, PartialEq, Builder)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialDef {
    #[builder(into)]
    pub name: String,
    #[builder(into, default)]
    #[cfg_attr(feature = "serde", serde(default))]
    pub albedo_map: String,
    /// Ambient occlusion, roughness and metalness packed into one texture.
    #[builder(into, default)]
    #[cfg_attr(feature = "serde", serde(default))]
    pub arm_map: String,
    #[builder(into, default)]
    #[cfg_attr(feature = "serde", serde(default))]
    pub normal_map: String,
    #[builder(default)]
    #[cfg_attr(feature = "serde", serde(default))]
    pub double_sided: bool,
}

impl MaterialDef {
    /// Hash of the name as a mesh file would store it, truncated to the same
    /// fixed capacity as submesh material names.
    pub fn name_hash(&self) -> u64 {
        FixedString::from_bytes(self.name.as_bytes()).hash()
    }

    /// Every material is opaque, wrap-addressed and depth tested/written;
    /// only culling varies.
    pub fn flags(&self) -> MaterialFlags {
        let mut flags = MaterialFlags::OPAQUE
            | MaterialFlags::WRAP
            | MaterialFlags::DEPTH_TEST
            | MaterialFlags::DEPTH_WRITE;
        if self.double_sided {
            flags |= MaterialFlags::DOUBLE_SIDED;
        }
        flags
    }
}

#[cfg(feature = "json")]
#[derive(serde::Deserialize)]
struct MaterialsDocument {
    materials: Vec<MaterialDef>,
}

/// Parse a `{ "materials": [...] }` document.
#[cfg(feature = "json")]
pub fn parse_material_defs(json: &str) -> Result<Vec<MaterialDef>, serde_json::Error> {
    let document: MaterialsDocument = serde_json::from_str(json)?;
    Ok(document.materials)
}

/// A registered material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub def: MaterialDef,
    pub name_hash: u64,
    pub flags: MaterialFlags,
}

#[derive(Debug, Default)]
pub struct MaterialRegistry {
    materials: Vec<Material>,
    by_name: HashMap<u64, MaterialHandle>,
}

impl MaterialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every definition whose name hash is not known yet.
    ///
    /// Returns how many materials were added.
    pub fn add_materials<I>(&mut self, defs: I) -> usize
    where
        I: IntoIterator<Item = MaterialDef>,
    {
        let before = self.materials.len();
        for def in defs {
            let name_hash = def.name_hash();
            if self.by_name.contains_key(&name_hash) {
                trace!(name = %def.name, "material already registered");
                continue;
            }

            let handle = MaterialHandle(self.materials.len() as u32);
            self.by_name.insert(name_hash, handle);
            self.materials.push(Material {
                flags: def.flags(),
                name_hash,
                def,
            });
        }

        let added = self.materials.len() - before;
        debug!(added, total = self.materials.len(), "registered materials");
        added
    }

    pub fn lookup_material_handle(&self, name_hash: u64) -> MaterialHandle {
        self.by_name
            .get(&name_hash)
            .copied()
            .unwrap_or(MaterialHandle::DEFAULT)
    }

    pub fn get(&self, handle: MaterialHandle) -> Option<&Material> {
        self.materials.get(handle.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }
}

impl MaterialResolver for MaterialRegistry {
    fn lookup_material_handle(&self, name_hash: u64) -> MaterialHandle {
        MaterialRegistry::lookup_material_handle(self, name_hash)
    }
}
