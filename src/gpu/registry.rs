//! Fixed-capacity registries for uploaded meshes and their buffers.
//!
//! Registries are owned values passed by reference through the loading path.
//! Mutation is single-writer; callers that load from several threads must
//! serialize access themselves.

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{LoadError, LoadResult};
use crate::gpu::merge::{PackedVertex, merge_vertex_streams};
use crate::gpu::{
    BufferHandle, BufferUsage, GpuBufferFactory, MaterialHandle, MaterialResolver, MeshHandle,
};
use crate::models::mesh::{BoundingVolume, MAX_SUBMESHES, MeshLoadRecord};

pub const MAX_RENDERING_MESHES: usize = 1024;
pub const MAX_VERTEX_BUFFERS: usize = 1024;
pub const MAX_INDEX_BUFFERS: usize = 1024;

/// In-memory buffer store implementing [`GpuBufferFactory`].
///
/// Vertex and index buffers live in separate tables; a handle is the index
/// into the table matching the buffer's usage. Released slots are reused by
/// the next buffer of the same usage.
#[derive(Debug, Default)]
pub struct BufferRegistry {
    vertex_buffers: Vec<Option<Box<[u8]>>>,
    index_buffers: Vec<Option<Box<[u8]>>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_buffer(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.vertex_buffers
            .get(handle.0 as usize)
            .and_then(|b| b.as_deref())
    }

    pub fn index_buffer(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.index_buffers
            .get(handle.0 as usize)
            .and_then(|b| b.as_deref())
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffers.iter().flatten().count()
    }

    pub fn index_buffer_count(&self) -> usize {
        self.index_buffers.iter().flatten().count()
    }

    /// Total bytes held across both tables.
    pub fn total_bytes(&self) -> usize {
        self.vertex_buffers
            .iter()
            .chain(&self.index_buffers)
            .flatten()
            .map(|b| b.len())
            .sum()
    }

    fn table_mut(&mut self, usage: BufferUsage) -> (&mut Vec<Option<Box<[u8]>>>, usize, &'static str) {
        match usage {
            BufferUsage::Vertex => (&mut self.vertex_buffers, MAX_VERTEX_BUFFERS, "vertex buffer"),
            BufferUsage::Index => (&mut self.index_buffers, MAX_INDEX_BUFFERS, "index buffer"),
        }
    }
}

impl GpuBufferFactory for BufferRegistry {
    fn create_immutable_buffer(
        &mut self,
        data: &[u8],
        usage: BufferUsage,
    ) -> LoadResult<BufferHandle> {
        let (table, capacity, registry) = self.table_mut(usage);
        if let Some(free) = table.iter().position(Option::is_none) {
            table[free] = Some(data.into());
            return Ok(BufferHandle(free as u32));
        }
        if table.len() >= capacity {
            return Err(LoadError::CapacityExceeded { registry, capacity });
        }
        table.push(Some(data.into()));
        Ok(BufferHandle((table.len() - 1) as u32))
    }

    fn release_buffer(&mut self, handle: BufferHandle, usage: BufferUsage) {
        let (table, _, _) = self.table_mut(usage);
        if let Some(slot) = table.get_mut(handle.0 as usize) {
            *slot = None;
        }
        while table.last().is_some_and(Option::is_none) {
            table.pop();
        }
    }
}

/// A submesh with its material resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    pub material: MaterialHandle,
    pub material_hash: u64,
    pub indices_start: u32,
    pub indices_count: u32,
}

/// A registered, uploaded mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub num_vertices: u32,
    pub num_indices: u32,
    pub submeshes: SmallVec<[Submesh; MAX_SUBMESHES]>,
    pub bounds: BoundingVolume,
}

#[derive(Debug, Default)]
pub struct MeshRegistry {
    meshes: Vec<Mesh>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.meshes.len() >= MAX_RENDERING_MESHES
    }

    /// Number of meshes that can still be registered.
    pub fn remaining_capacity(&self) -> usize {
        MAX_RENDERING_MESHES.saturating_sub(self.meshes.len())
    }

    pub fn get(&self, handle: MeshHandle) -> Option<&Mesh> {
        self.meshes.get(handle.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeshHandle, &Mesh)> {
        self.meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| (MeshHandle(i as u32), mesh))
    }

    pub fn register(&mut self, mesh: Mesh) -> LoadResult<MeshHandle> {
        if self.is_full() {
            return Err(LoadError::CapacityExceeded {
                registry: "mesh",
                capacity: MAX_RENDERING_MESHES,
            });
        }
        self.meshes.push(mesh);
        Ok(MeshHandle((self.meshes.len() - 1) as u32))
    }
}

/// Vertex and index buffers created for one mesh.
#[derive(Clone, Copy)]
struct MeshBuffers {
    vertex: BufferHandle,
    index: BufferHandle,
}

impl MeshBuffers {
    fn create<F>(vertices: &[PackedVertex], indices: &[u8], factory: &mut F) -> LoadResult<Self>
    where
        F: GpuBufferFactory + ?Sized,
    {
        let vertex =
            factory.create_immutable_buffer(bytemuck::cast_slice(vertices), BufferUsage::Vertex)?;
        match factory.create_immutable_buffer(indices, BufferUsage::Index) {
            Ok(index) => Ok(MeshBuffers { vertex, index }),
            Err(e) => {
                factory.release_buffer(vertex, BufferUsage::Vertex);
                Err(e)
            }
        }
    }

    fn release<F>(self, factory: &mut F)
    where
        F: GpuBufferFactory + ?Sized,
    {
        factory.release_buffer(self.index, BufferUsage::Index);
        factory.release_buffer(self.vertex, BufferUsage::Vertex);
    }
}

/// Merge `record`'s vertex streams, create its vertex and index buffers and
/// register the resulting mesh.
///
/// The file buffer `record` borrows from must stay alive until this returns.
/// Nothing is registered when an error is returned.
pub fn upload_mesh_to_gpu<F, R>(
    record: &MeshLoadRecord<'_>,
    factory: &mut F,
    resolver: &R,
    meshes: &mut MeshRegistry,
) -> LoadResult<MeshHandle>
where
    F: GpuBufferFactory + ?Sized,
    R: MaterialResolver + ?Sized,
{
    let handles = upload_meshes_to_gpu(&[record], factory, resolver, meshes)?;
    Ok(handles[0])
}

/// Upload every mesh of one model file as a unit.
///
/// All records are merged and mesh capacity is checked before any buffer is
/// created. If anything fails, the buffers created so far are released and
/// no mesh is registered.
pub fn upload_meshes_to_gpu<F, R>(
    records: &[&MeshLoadRecord<'_>],
    factory: &mut F,
    resolver: &R,
    meshes: &mut MeshRegistry,
) -> LoadResult<SmallVec<[MeshHandle; 1]>>
where
    F: GpuBufferFactory + ?Sized,
    R: MaterialResolver + ?Sized,
{
    if meshes.remaining_capacity() < records.len() {
        return Err(LoadError::CapacityExceeded {
            registry: "mesh",
            capacity: MAX_RENDERING_MESHES,
        });
    }

    let merged = records
        .iter()
        .map(|record| merge_vertex_streams(record))
        .collect::<LoadResult<Vec<_>>>()?;

    let mut created: SmallVec<[MeshBuffers; 1]> = SmallVec::with_capacity(records.len());
    for (record, vertices) in records.iter().zip(&merged) {
        match MeshBuffers::create(vertices, record.indices, factory) {
            Ok(buffers) => created.push(buffers),
            Err(e) => {
                for buffers in created.into_iter().rev() {
                    buffers.release(factory);
                }
                return Err(e);
            }
        }
    }

    let mut handles = SmallVec::with_capacity(records.len());
    for (record, buffers) in records.iter().zip(created) {
        let submeshes = record
            .submeshes
            .iter()
            .map(|s| Submesh {
                material: resolver.lookup_material_handle(s.material_hash),
                material_hash: s.material_hash,
                indices_start: s.indices_start,
                indices_count: s.indices_count,
            })
            .collect();

        // capacity was reserved above
        let handle = meshes.register(Mesh {
            vertex_buffer: buffers.vertex,
            index_buffer: buffers.index,
            num_vertices: record.num_vertices,
            num_indices: record.num_indices,
            submeshes,
            bounds: record.bounds,
        })?;

        debug!(
            %handle,
            vertices = record.num_vertices,
            indices = record.num_indices,
            submeshes = record.submeshes.len(),
            "uploaded mesh"
        );
        handles.push(handle);
    }
    Ok(handles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::{ByteCursor, hash_name};
    use crate::models::vertex_stream::VertexSlot;
    use crate::models::writer::{MeshDesc, ModelWriter, StreamDesc, SubmeshDesc};

    fn mesh_bytes() -> Vec<u8> {
        let desc = MeshDesc::builder()
            .positions(vec![[100.0, 0.0, 0.0], [0.0, 100.0, 0.0], [0.0, 0.0, 100.0]])
            .normals(vec![[0.0, 0.0, 1.0]; 3])
            .uvs(vec![[0.0, 0.0]; 3])
            .indices(vec![0, 1, 2, 2, 1, 0])
            .submeshes(vec![
                SubmeshDesc::new("wall", 0, 1),
                SubmeshDesc::new("trim", 3, 1),
            ])
            .build();
        let mut w = ModelWriter::new();
        w.mesh_data(&desc);
        w.into_bytes()
    }

    fn int16_position_bytes() -> Vec<u8> {
        let desc = MeshDesc::builder()
            .positions(vec![[0.0; 3]])
            .extra_streams(vec![StreamDesc {
                slot: VertexSlot::Position,
                data_type: 1,
                dimension: 3,
                stride: 6,
                data: vec![0; 6],
            }])
            .build();
        let mut w = ModelWriter::new();
        w.mesh_data(&desc);
        w.into_bytes()
    }

    struct FailingFactory;

    impl GpuBufferFactory for FailingFactory {
        fn create_immutable_buffer(
            &mut self,
            _data: &[u8],
            usage: BufferUsage,
        ) -> LoadResult<BufferHandle> {
            Err(LoadError::BufferCreation(format!("no {usage} buffers")))
        }

        fn release_buffer(&mut self, _handle: BufferHandle, _usage: BufferUsage) {}
    }

    /// Wraps a [`BufferRegistry`] and fails once `budget` buffers were created.
    struct LimitedFactory {
        buffers: BufferRegistry,
        budget: usize,
        released: Vec<(BufferHandle, BufferUsage)>,
    }

    impl LimitedFactory {
        fn new(budget: usize) -> Self {
            LimitedFactory {
                buffers: BufferRegistry::new(),
                budget,
                released: Vec::new(),
            }
        }
    }

    impl GpuBufferFactory for LimitedFactory {
        fn create_immutable_buffer(
            &mut self,
            data: &[u8],
            usage: BufferUsage,
        ) -> LoadResult<BufferHandle> {
            if self.budget == 0 {
                return Err(LoadError::BufferCreation(format!("out of {usage} memory")));
            }
            self.budget -= 1;
            self.buffers.create_immutable_buffer(data, usage)
        }

        fn release_buffer(&mut self, handle: BufferHandle, usage: BufferUsage) {
            self.released.push((handle, usage));
            self.buffers.release_buffer(handle, usage);
        }
    }

    #[test]
    fn upload_registers_buffers_and_resolves_materials() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();

        let wall = hash_name(b"wall");
        let resolver = move |hash: u64| {
            if hash == wall {
                MaterialHandle(7)
            } else {
                MaterialHandle::DEFAULT
            }
        };

        let mut buffers = BufferRegistry::new();
        let mut meshes = MeshRegistry::new();
        let handle = upload_mesh_to_gpu(&record, &mut buffers, &resolver, &mut meshes).unwrap();
        assert_eq!(handle, MeshHandle(0));

        let mesh = meshes.get(handle).unwrap();
        assert_eq!(mesh.num_vertices, 3);
        assert_eq!(mesh.num_indices, 6);
        assert_eq!(mesh.submeshes[0].material, MaterialHandle(7));
        assert_eq!(mesh.submeshes[1].material, MaterialHandle::DEFAULT);
        assert_eq!(mesh.submeshes[1].indices_start, 3);
        assert_eq!(mesh.bounds, record.bounds);

        let vertex_data = buffers.vertex_buffer(mesh.vertex_buffer).unwrap();
        assert_eq!(vertex_data.len(), 96);
        let first: PackedVertex = bytemuck::pod_read_unaligned(&vertex_data[..32]);
        assert_eq!(first.position, [1.0, 0.0, 0.0]);
        assert_eq!(buffers.index_buffer(mesh.index_buffer).unwrap(), record.indices);
        assert_eq!(buffers.total_bytes(), 96 + 24);
    }

    #[test]
    fn failed_buffer_creation_registers_nothing() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;
        assert!(matches!(
            upload_mesh_to_gpu(&record, &mut FailingFactory, &resolver, &mut meshes),
            Err(LoadError::BufferCreation(msg)) if msg == "no vertex buffers"
        ));
        assert!(meshes.is_empty());
    }

    #[test]
    fn full_index_table_releases_vertex_buffer() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        let mut buffers = BufferRegistry::new();
        for _ in 0..MAX_INDEX_BUFFERS {
            buffers
                .create_immutable_buffer(&[0; 4], BufferUsage::Index)
                .unwrap();
        }

        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;
        assert!(matches!(
            upload_mesh_to_gpu(&record, &mut buffers, &resolver, &mut meshes),
            Err(LoadError::CapacityExceeded { registry: "index buffer", .. })
        ));
        assert!(meshes.is_empty());
        assert_eq!(buffers.vertex_buffer_count(), 0);
        assert_eq!(buffers.index_buffer_count(), MAX_INDEX_BUFFERS);
    }

    #[test]
    fn index_buffer_failure_releases_vertex_buffer() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        let mut factory = LimitedFactory::new(1);
        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;

        assert!(matches!(
            upload_mesh_to_gpu(&record, &mut factory, &resolver, &mut meshes),
            Err(LoadError::BufferCreation(msg)) if msg == "out of index memory"
        ));
        assert!(meshes.is_empty());
        assert_eq!(factory.released, vec![(BufferHandle(0), BufferUsage::Vertex)]);
        assert_eq!(factory.buffers.total_bytes(), 0);
    }

    #[test]
    fn later_buffer_failure_rolls_back_earlier_meshes() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        // enough for the first mesh and the second mesh's vertex buffer
        let mut factory = LimitedFactory::new(3);
        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;

        assert!(
            upload_meshes_to_gpu(&[&record, &record], &mut factory, &resolver, &mut meshes).is_err()
        );
        assert!(meshes.is_empty());
        assert_eq!(factory.released.len(), 3);
        assert_eq!(factory.buffers.vertex_buffer_count(), 0);
        assert_eq!(factory.buffers.index_buffer_count(), 0);
    }

    #[test]
    fn unmergeable_mesh_fails_before_any_buffer() {
        let good = mesh_bytes();
        let bad = int16_position_bytes();
        let good = MeshLoadRecord::read(&mut ByteCursor::new(&good)).unwrap();
        let bad = MeshLoadRecord::read(&mut ByteCursor::new(&bad)).unwrap();
        let mut factory = LimitedFactory::new(usize::MAX);
        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;

        assert!(matches!(
            upload_meshes_to_gpu(&[&good, &bad], &mut factory, &resolver, &mut meshes),
            Err(LoadError::UnsupportedVertexFormat { slot: VertexSlot::Position, .. })
        ));
        assert!(meshes.is_empty());
        assert_eq!(factory.budget, usize::MAX);
        assert!(factory.released.is_empty());
    }

    #[test]
    fn empty_mesh_uploads_empty_buffers() {
        let mut w = ModelWriter::new();
        w.mesh_data(&MeshDesc::builder().build());
        let bytes = w.into_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();

        let mut buffers = BufferRegistry::new();
        let mut meshes = MeshRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;
        let handle = upload_mesh_to_gpu(&record, &mut buffers, &resolver, &mut meshes).unwrap();

        let mesh = meshes.get(handle).unwrap();
        assert_eq!(mesh.num_vertices, 0);
        assert_eq!(buffers.vertex_buffer(mesh.vertex_buffer), Some(&[][..]));
        assert_eq!(buffers.index_buffer(mesh.index_buffer), Some(&[][..]));
    }

    #[test]
    fn released_slots_are_reused() {
        let mut buffers = BufferRegistry::new();
        let a = buffers.create_immutable_buffer(&[1], BufferUsage::Vertex).unwrap();
        let b = buffers.create_immutable_buffer(&[2], BufferUsage::Vertex).unwrap();
        buffers.release_buffer(a, BufferUsage::Vertex);
        assert_eq!(buffers.vertex_buffer(a), None);
        assert_eq!(buffers.vertex_buffer_count(), 1);

        let c = buffers.create_immutable_buffer(&[3], BufferUsage::Vertex).unwrap();
        assert_eq!(c, a);
        assert_eq!(buffers.vertex_buffer(b), Some(&[2][..]));
        assert_eq!(buffers.vertex_buffer(c), Some(&[3][..]));
    }

    #[test]
    fn mesh_capacity_is_checked_for_the_whole_model() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        let mut meshes = MeshRegistry::new();
        let mut buffers = BufferRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;
        for _ in 0..MAX_RENDERING_MESHES - 1 {
            upload_mesh_to_gpu(&record, &mut buffers, &resolver, &mut meshes).unwrap();
        }
        assert_eq!(meshes.remaining_capacity(), 1);

        assert!(matches!(
            upload_meshes_to_gpu(&[&record, &record], &mut buffers, &resolver, &mut meshes),
            Err(LoadError::CapacityExceeded { registry: "mesh", .. })
        ));
        assert_eq!(meshes.len(), MAX_RENDERING_MESHES - 1);
        assert_eq!(buffers.vertex_buffer_count(), MAX_RENDERING_MESHES - 1);
    }

    #[test]
    fn buffer_tables_are_bounded() {
        let mut buffers = BufferRegistry::new();
        for i in 0..MAX_INDEX_BUFFERS {
            let handle = buffers
                .create_immutable_buffer(&[0; 4], BufferUsage::Index)
                .unwrap();
            assert_eq!(handle, BufferHandle(i as u32));
        }
        assert!(matches!(
            buffers.create_immutable_buffer(&[0; 4], BufferUsage::Index),
            Err(LoadError::CapacityExceeded {
                registry: "index buffer",
                capacity: MAX_INDEX_BUFFERS
            })
        ));
        // the vertex table is independent
        assert_eq!(
            buffers
                .create_immutable_buffer(&[], BufferUsage::Vertex)
                .unwrap(),
            BufferHandle(0)
        );
    }

    #[test]
    fn mesh_registry_is_bounded() {
        let bytes = mesh_bytes();
        let record = MeshLoadRecord::read(&mut ByteCursor::new(&bytes)).unwrap();
        let mut meshes = MeshRegistry::new();
        let template = Mesh {
            vertex_buffer: BufferHandle(0),
            index_buffer: BufferHandle(0),
            num_vertices: 0,
            num_indices: 0,
            submeshes: SmallVec::new(),
            bounds: BoundingVolume::default(),
        };
        for _ in 0..MAX_RENDERING_MESHES {
            meshes.register(template.clone()).unwrap();
        }

        let mut buffers = BufferRegistry::new();
        let resolver = |_: u64| MaterialHandle::DEFAULT;
        assert!(matches!(
            upload_mesh_to_gpu(&record, &mut buffers, &resolver, &mut meshes),
            Err(LoadError::CapacityExceeded { registry: "mesh", .. })
        ));
        // rejected before any buffer was created
        assert_eq!(buffers.vertex_buffer_count(), 0);
        assert_eq!(meshes.iter().count(), MAX_RENDERING_MESHES);
    }
}
