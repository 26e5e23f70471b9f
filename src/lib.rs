/// Byte-level readers and whole-file sources
pub mod data;
/// Error definitions
pub mod error;
/// Vertex merging, buffer creation and mesh registration
pub mod gpu;
/// Material definitions and the material registry
pub mod materials;
/// MDL1 model and MESH chunk formats
pub mod models;
/// Generic wrapper for values that may or may not match a known variant.
pub mod recognized;
/// Scene documents and loading every model a scene references
#[cfg(feature = "json")]
pub mod scene;

pub use error::{LoadError, LoadResult};
pub use models::model::{decode_model, load_model_from_stream};
pub use gpu::registry::{upload_mesh_to_gpu, upload_meshes_to_gpu};

#[cfg(feature = "vfs")]
pub use vfs;
