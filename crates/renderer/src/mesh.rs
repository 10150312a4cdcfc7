//! Vertex and index buffers for the loaded model.

use std::sync::Arc;

use glam::Vec3;
use tracing::info;

use viewer_resources::Model;
use viewer_rhi::RhiResult;
use viewer_rhi::buffer::{Buffer, BufferUsage};
use viewer_rhi::command::CommandPool;
use viewer_rhi::device::Device;
use viewer_rhi::vertex::Vertex;

/// Vertex color used for every loaded vertex; the fragment shader samples
/// the texture for the actual color.
pub const DEFAULT_VERTEX_COLOR: Vec3 = Vec3::ONE;

/// Convert loaded mesh vertices to the pipeline's vertex layout.
pub fn to_vertices(model: &Model) -> Vec<Vertex> {
    model
        .vertices
        .iter()
        .map(|v| Vertex::new(v.position, DEFAULT_VERTEX_COLOR, v.tex_coord))
        .collect()
}

/// Device-local vertex and index buffers, filled once at start-up.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn upload(device: Arc<Device>, pool: &CommandPool, model: &Model) -> RhiResult<Self> {
        let vertices = to_vertices(model);

        let vertex_buffer = Buffer::upload(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = Buffer::upload(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&model.indices),
        )?;

        info!(
            "Mesh uploaded: {} vertices, {} indices",
            vertices.len(),
            model.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: model.indices.len() as u32,
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use viewer_resources::MeshVertex;

    #[test]
    fn test_to_vertices_keeps_order_and_attributes() {
        let model = Model {
            vertices: vec![
                MeshVertex {
                    position: Vec3::new(1.0, 2.0, 3.0),
                    tex_coord: Vec2::new(0.25, 0.75),
                },
                MeshVertex {
                    position: Vec3::new(-1.0, 0.0, 0.0),
                    tex_coord: Vec2::ZERO,
                },
            ],
            indices: vec![0, 1],
            ..Default::default()
        };

        let vertices = to_vertices(&model);
        assert_eq!(vertices.len(), 2);
        assert_eq!(vertices[0].position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(vertices[0].tex_coord, Vec2::new(0.25, 0.75));
        assert_eq!(vertices[0].color, DEFAULT_VERTEX_COLOR);
        assert_eq!(vertices[1].position, Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_vertex_bytes_are_tightly_packed() {
        let model = Model {
            vertices: vec![MeshVertex::default(); 3],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let vertices = to_vertices(&model);
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 3 * 32);
    }
}
