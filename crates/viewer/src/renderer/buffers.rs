//! GPU vertex buffers for the current model.
//!
//! Each mesh keeps its wire-format planar layout on the GPU: separate
//! position/normal/uv buffers bound to vertex slots 0/1/2. Draws are
//! non-indexed triangle soup. One fixed unit-cube edge-list buffer is shared
//! by every model's bounding overlay and positioned via the bounding
//! transform matrix instead of being re-uploaded per model.

use wgpu::util::DeviceExt;
use wgpu::{Buffer, Device};

use hangar_data::ShipModel;

/// Unit-cube edges as 24 line-list vertices.
const BOUNDING_EDGES: [f32; 72] = [
    -0.5, 0.5, 0.5, 0.5, 0.5, 0.5, //
    0.5, 0.5, 0.5, 0.5, -0.5, 0.5, //
    0.5, -0.5, 0.5, -0.5, -0.5, 0.5, //
    -0.5, -0.5, 0.5, -0.5, 0.5, 0.5, //
    0.5, 0.5, 0.5, 0.5, 0.5, -0.5, //
    0.5, 0.5, -0.5, 0.5, -0.5, -0.5, //
    0.5, -0.5, -0.5, 0.5, -0.5, 0.5, //
    0.5, 0.5, -0.5, -0.5, 0.5, -0.5, //
    -0.5, -0.5, -0.5, 0.5, -0.5, -0.5, //
    -0.5, -0.5, -0.5, -0.5, 0.5, -0.5, //
    -0.5, 0.5, -0.5, -0.5, 0.5, 0.5, //
    -0.5, -0.5, 0.5, -0.5, -0.5, -0.5,
];

pub const BOUNDING_VERTEX_COUNT: u32 = (BOUNDING_EDGES.len() / 3) as u32;

const POSITION_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const NORMAL_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
const UV_ATTRS: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![2 => Float32x2];

pub fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &POSITION_ATTRS,
    }
}

pub fn normal_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &NORMAL_ATTRS,
    }
}

pub fn uv_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: 8,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &UV_ATTRS,
    }
}

/// One mesh's GPU buffers.
pub struct MeshBufferSet {
    pub position: Buffer,
    pub normal: Buffer,
    pub uv: Buffer,
    pub vertex_count: u32,
}

/// All buffers for the current model plus the shared bounding cube.
#[derive(Default)]
pub struct MeshBuffers {
    meshes: Vec<MeshBufferSet>,
    bounding: Option<Buffer>,
    loaded: bool,
}

impl MeshBuffers {
    pub fn build(device: &Device, model: &ShipModel) -> Self {
        let meshes: Vec<MeshBufferSet> = model
            .meshes
            .iter()
            .enumerate()
            .map(|(i, mesh)| MeshBufferSet {
                position: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("mesh_{i}_position")),
                    contents: bytemuck::cast_slice(&mesh.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                normal: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("mesh_{i}_normal")),
                    contents: bytemuck::cast_slice(&mesh.normals),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                uv: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("mesh_{i}_uv")),
                    contents: bytemuck::cast_slice(&mesh.uvs),
                    usage: wgpu::BufferUsages::VERTEX,
                }),
                vertex_count: mesh.vertex_count() as u32,
            })
            .collect();

        let bounding = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bounding_edges"),
            contents: bytemuck::cast_slice(&BOUNDING_EDGES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let loaded = !meshes.is_empty();
        Self {
            meshes,
            bounding: Some(bounding),
            loaded,
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    pub fn meshes(&self) -> &[MeshBufferSet] {
        &self.meshes
    }

    pub fn bounding(&self) -> Option<&Buffer> {
        self.bounding.as_ref()
    }

    /// Free every buffer. Safe when nothing was built; `build` can be called
    /// again afterwards.
    pub fn destroy(&mut self) {
        for mesh in self.meshes.drain(..) {
            mesh.position.destroy();
            mesh.normal.destroy();
            mesh.uv.destroy();
        }
        if let Some(bounding) = self.bounding.take() {
            bounding.destroy();
        }
        self.loaded = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_cube_has_twelve_edges() {
        assert_eq!(BOUNDING_VERTEX_COUNT, 24);
        // Every vertex is a corner of the unit cube.
        for corner in BOUNDING_EDGES.chunks_exact(3) {
            for c in corner {
                assert!(c.abs() == 0.5);
            }
        }
        // Each edge connects two distinct corners.
        for edge in BOUNDING_EDGES.chunks_exact(6) {
            assert_ne!(edge[..3], edge[3..]);
        }
    }

    #[test]
    fn vertex_layouts_match_wire_strides() {
        assert_eq!(position_layout().array_stride, 12);
        assert_eq!(normal_layout().array_stride, 12);
        assert_eq!(uv_layout().array_stride, 8);
        assert_eq!(uv_layout().attributes[0].shader_location, 2);
    }

    #[test]
    fn destroy_on_empty_set_is_a_noop() {
        let mut buffers = MeshBuffers::default();
        assert!(!buffers.loaded());
        buffers.destroy();
        assert!(!buffers.loaded());
    }
}
