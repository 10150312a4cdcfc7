//! Wavefront OBJ model loading.
//!
//! Faces are triangulated and every face corner becomes its own vertex, so
//! the index list is simply `0..n`. Texture V is flipped (`1 - v`) because
//! OBJ puts the origin at the bottom left while Vulkan samples from the top.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use glam::{Vec2, Vec3};
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// A mesh vertex as stored in the file.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MeshVertex {
    pub position: Vec3,
    pub tex_coord: Vec2,
}

/// A triangle-list mesh with sequential indices.
#[derive(Debug, Default)]
pub struct Model {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
    /// Axis-aligned bounding box minimum
    pub aabb_min: Vec3,
    /// Axis-aligned bounding box maximum
    pub aabb_max: Vec3,
}

impl Model {
    /// Load a model from an `.obj` file. Materials are ignored.
    pub fn load_obj(path: &Path) -> ResourceResult<Self> {
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        debug!("Loading OBJ model from {:?}", path);

        let mut reader = BufReader::new(File::open(path)?);
        let model = Self::from_obj_reader(&mut reader, path)?;

        info!(
            "Loaded model {:?}: {} vertices, {} triangles",
            path,
            model.vertices.len(),
            model.triangle_count()
        );

        Ok(model)
    }

    /// Parse OBJ text from `reader`. `source` is only used in error messages.
    pub fn from_obj_reader<R: BufRead>(reader: &mut R, source: &Path) -> ResourceResult<Self> {
        let (models, _materials) = tobj::load_obj_buf(reader, &load_options(), |_| {
            Ok(Default::default())
        })?;

        let meshes: Vec<&tobj::Mesh> = models.iter().map(|m| &m.mesh).collect();
        flatten_meshes(&meshes).map_err(|message| ResourceError::InvalidData {
            path: source.to_path_buf(),
            message,
        })
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

fn load_options() -> tobj::LoadOptions {
    tobj::LoadOptions {
        triangulate: true,
        // Positions and texcoords share one index stream
        single_index: true,
        ..Default::default()
    }
}

/// Expand indexed meshes into one vertex per face corner.
///
/// Returns a message describing the problem when a mesh has no texture
/// coordinates or references data that does not exist.
pub fn flatten_meshes(meshes: &[&tobj::Mesh]) -> Result<Model, String> {
    let corner_count: usize = meshes.iter().map(|mesh| mesh.indices.len()).sum();
    if corner_count == 0 {
        return Err("model contains no faces".to_string());
    }

    let mut vertices = Vec::with_capacity(corner_count);
    let mut aabb_min = Vec3::splat(f32::MAX);
    let mut aabb_max = Vec3::splat(f32::MIN);

    for (mesh_index, mesh) in meshes.iter().enumerate() {
        if !mesh.indices.is_empty() && mesh.texcoords.is_empty() {
            return Err(format!("mesh {} has no texture coordinates", mesh_index));
        }

        for &index in &mesh.indices {
            let i = index as usize;
            let (Some(p), Some(t)) = (
                mesh.positions.get(3 * i..3 * i + 3),
                mesh.texcoords.get(2 * i..2 * i + 2),
            ) else {
                return Err(format!(
                    "mesh {} references vertex {} out of range",
                    mesh_index, index
                ));
            };

            let position = Vec3::new(p[0], p[1], p[2]);
            aabb_min = aabb_min.min(position);
            aabb_max = aabb_max.max(position);

            vertices.push(MeshVertex {
                position,
                tex_coord: Vec2::new(t[0], 1.0 - t[1]),
            });
        }
    }

    let indices = (0..vertices.len() as u32).collect();

    Ok(Model {
        vertices,
        indices,
        aabb_min,
        aabb_max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> tobj::Mesh {
        tobj::Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, //
                0.0, 1.0, 0.5,
            ],
            texcoords: vec![
                0.0, 0.0, //
                1.0, 0.0, //
                1.0, 1.0, //
                0.0, 0.25,
            ],
            indices: vec![0, 1, 2, 2, 3, 0],
            ..Default::default()
        }
    }

    #[test]
    fn test_flatten_does_not_deduplicate() {
        let mesh = quad();
        let model = flatten_meshes(&[&mesh]).unwrap();
        assert_eq!(model.vertices.len(), 6);
        assert_eq!(model.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(model.triangle_count(), 2);
        // Corner 2 appears twice
        assert_eq!(model.vertices[2], model.vertices[3]);
    }

    #[test]
    fn test_flatten_flips_v() {
        let mesh = quad();
        let model = flatten_meshes(&[&mesh]).unwrap();
        assert_eq!(model.vertices[0].tex_coord, Vec2::new(0.0, 1.0));
        assert_eq!(model.vertices[2].tex_coord, Vec2::new(1.0, 0.0));
        assert_eq!(model.vertices[4].tex_coord, Vec2::new(0.0, 0.75));
    }

    #[test]
    fn test_flatten_computes_bounds() {
        let mesh = quad();
        let model = flatten_meshes(&[&mesh]).unwrap();
        assert_eq!(model.aabb_min, Vec3::ZERO);
        assert_eq!(model.aabb_max, Vec3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn test_flatten_concatenates_meshes() {
        let a = quad();
        let b = quad();
        let model = flatten_meshes(&[&a, &b]).unwrap();
        assert_eq!(model.vertices.len(), 12);
        assert_eq!(model.indices.last(), Some(&11));
    }

    #[test]
    fn test_flatten_requires_tex_coords() {
        let mut mesh = quad();
        mesh.texcoords.clear();
        let err = flatten_meshes(&[&mesh]).unwrap_err();
        assert!(err.contains("texture coordinates"));
    }

    #[test]
    fn test_flatten_rejects_out_of_range_index() {
        let mut mesh = quad();
        mesh.indices.push(9);
        assert!(flatten_meshes(&[&mesh]).is_err());
    }

    #[test]
    fn test_flatten_rejects_empty() {
        assert!(flatten_meshes(&[]).is_err());
    }

    #[test]
    fn test_from_obj_reader_triangulates() {
        let obj = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";
        let mut reader = std::io::Cursor::new(obj.as_bytes());
        let model = Model::from_obj_reader(&mut reader, Path::new("quad.obj")).unwrap();
        assert_eq!(model.triangle_count(), 2);
        assert_eq!(model.vertices.len(), 6);
    }

    #[test]
    fn test_load_obj_missing_file() {
        let result = Model::load_obj(Path::new("definitely/not/here.obj"));
        assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
    }
}
