//! Uniform buffer payload for the vertex shader.
//!
//! The layout must match the `UniformBufferObject` block bound at set 0,
//! binding 0. `#[repr(C)]` plus `Pod` lets the struct be copied byte for byte
//! into mapped memory.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Degrees the model turns around +Z per second.
pub const ROTATION_DEGREES_PER_SECOND: f32 = 90.0;

pub const EYE: Vec3 = Vec3::new(2.0, 2.0, 2.0);
pub const FOV_Y_DEGREES: f32 = 45.0;
pub const Z_NEAR: f32 = 0.1;
pub const Z_FAR: f32 = 10.0;

/// Model, view and projection matrices, column-major.
///
/// # Memory Layout
///
/// - Offset 0: model (64 bytes)
/// - Offset 64: view (64 bytes)
/// - Offset 128: proj (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelViewProjection {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl ModelViewProjection {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Matrices for `seconds` after start-up on a surface with the given aspect ratio.
    pub fn at_time(seconds: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z((seconds * ROTATION_DEGREES_PER_SECOND).to_radians());
        let view = Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Z);

        // glam targets a 0..1 depth range already; only Y needs flipping for Vulkan clip space
        let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
        proj.y_axis.y *= -1.0;

        Self { model, view, proj }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_size_and_alignment() {
        assert_eq!(ModelViewProjection::SIZE, 192);
        assert_eq!(std::mem::align_of::<ModelViewProjection>(), 16);
    }

    #[test]
    fn test_at_time_zero_is_deterministic() {
        let a = ModelViewProjection::at_time(0.0, 800.0 / 600.0);
        let b = ModelViewProjection::at_time(0.0, 800.0 / 600.0);
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_eq!(a.model, Mat4::IDENTITY);
    }

    #[test]
    fn test_model_rotates_quarter_turn_per_second() {
        let ubo = ModelViewProjection::at_time(1.0, 1.0);
        let x = ubo.model * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((x.x - 0.0).abs() < 1e-5);
        assert!((x.y - 1.0).abs() < 1e-5);
        assert!((x.z - 0.0).abs() < 1e-5);
    }

    #[test]
    fn test_view_looks_at_origin() {
        let ubo = ModelViewProjection::at_time(0.0, 1.0);
        let origin = ubo.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        // In view space the origin lies straight ahead, down -Z
        assert!(origin.x.abs() < 1e-5);
        assert!(origin.y.abs() < 1e-5);
        assert!((origin.z + EYE.length()).abs() < 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let ubo = ModelViewProjection::at_time(0.0, 1.0);
        let glam_proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), 1.0, Z_NEAR, Z_FAR);
        assert_eq!(ubo.proj.y_axis.y, -glam_proj.y_axis.y);
        assert_eq!(ubo.proj.x_axis, glam_proj.x_axis);
        assert_eq!(ubo.proj.z_axis, glam_proj.z_axis);
    }

    #[test]
    fn test_depth_range_zero_to_one() {
        let ubo = ModelViewProjection::at_time(0.0, 1.0);
        let near = ubo.proj * Vec4::new(0.0, 0.0, -Z_NEAR, 1.0);
        let far = ubo.proj * Vec4::new(0.0, 0.0, -Z_FAR, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_aspect_ratio_scales_x() {
        let square = ModelViewProjection::at_time(0.0, 1.0);
        let wide = ModelViewProjection::at_time(0.0, 2.0);
        assert!((square.proj.x_axis.x / wide.proj.x_axis.x - 2.0).abs() < 1e-5);
    }
}
