//! Integration tests for model and texture loading.

use std::path::{Path, PathBuf};

use viewer_resources::{Model, ResourceError, TextureData};

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("viewer_resources_{}_{}", std::process::id(), name))
}

const TRIANGLE_PAIR_OBJ: &str = "\
# two triangles sharing an edge
o pair
v -1.0 -1.0 0.0
v  1.0 -1.0 0.0
v  1.0  1.0 0.0
v -1.0  1.0 2.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 1.0
f 1/1 2/2 3/3
f 3/3 4/4 1/1
";

#[test]
fn test_load_obj_from_disk() {
    let path = temp_path("pair.obj");
    std::fs::write(&path, TRIANGLE_PAIR_OBJ).unwrap();

    let model = Model::load_obj(&path).expect("Failed to load OBJ model");
    std::fs::remove_file(&path).ok();

    assert_eq!(model.vertices.len(), 6);
    assert_eq!(model.indices, (0..6).collect::<Vec<u32>>());
    assert_eq!(model.triangle_count(), 2);

    // V is flipped on load
    assert_eq!(model.vertices[0].tex_coord.y, 1.0);
    assert_eq!(model.vertices[2].tex_coord.y, 0.0);

    assert!(model.aabb_min.x < model.aabb_max.x);
    assert!(model.aabb_min.y < model.aabb_max.y);
    assert!(model.aabb_min.z < model.aabb_max.z);
}

#[test]
fn test_load_obj_without_tex_coords_is_invalid() {
    let path = temp_path("no_uv.obj");
    std::fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n").unwrap();

    let result = Model::load_obj(&path);
    std::fs::remove_file(&path).ok();

    assert!(matches!(result, Err(ResourceError::InvalidData { .. })));
}

#[test]
fn test_load_png_texture() {
    let path = temp_path("checker.png");
    let image = image::RgbaImage::from_fn(4, 2, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([0, 0, 0, 255])
        }
    });
    image.save(&path).unwrap();

    let texture = TextureData::load(&path).expect("Failed to load texture");
    std::fs::remove_file(&path).ok();

    assert_eq!((texture.width, texture.height), (4, 2));
    assert_eq!(texture.pixels.len(), 4 * 2 * 4);
    assert_eq!(&texture.pixels[0..4], &[255, 255, 255, 255]);
    assert_eq!(&texture.pixels[4..8], &[0, 0, 0, 255]);
}

#[test]
fn test_rgb_png_is_expanded_to_rgba() {
    let path = temp_path("rgb.png");
    let image = image::RgbImage::from_pixel(3, 3, image::Rgb([10, 20, 30]));
    image.save(&path).unwrap();

    let texture = TextureData::load(&path).expect("Failed to load texture");
    std::fs::remove_file(&path).ok();

    assert_eq!(texture.pixels.len(), 3 * 3 * 4);
    assert_eq!(&texture.pixels[0..4], &[10, 20, 30, 255]);
}

#[test]
fn test_load_viking_room_if_present() {
    let model_path = Path::new("../../models/viking_room.obj");

    // Skip test if file doesn't exist (CI environment may not have assets)
    if !model_path.exists() {
        println!("Skipping test: model file not found at {:?}", model_path);
        return;
    }

    let model = Model::load_obj(model_path).expect("Failed to load viking room");
    assert!(!model.is_empty());
    assert_eq!(model.indices.len(), model.vertices.len());
}
