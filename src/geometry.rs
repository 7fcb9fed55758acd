// Hard-coded triangle geometry

use glam::Vec3;

/// One vertex as laid out in the vertex buffer (binding 0, location 0)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
}

impl Vertex {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Vec3::new(x, y, z),
        }
    }
}

/// Clip-space triangle spanning the viewport. Vulkan's Y axis points down,
/// so this order is counter-clockwise on screen and survives back-face culling.
pub const TRIANGLE: [Vertex; 3] = [
    Vertex::new(-1.0, -1.0, 0.0),
    Vertex::new(0.0, 1.0, 0.0),
    Vertex::new(1.0, -1.0, 0.0),
];

#[cfg(test)]
mod tests {
    use super::*;

    /// Twice the signed area using the rasterizer's formula:
    /// positive means counter-clockwise in framebuffer coordinates.
    fn vulkan_signed_area(v: &[Vertex; 3]) -> f32 {
        let mut sum = 0.0;
        for i in 0..3 {
            let a = v[i].position;
            let b = v[(i + 1) % 3].position;
            sum += a.x * b.y - b.x * a.y;
        }
        -sum
    }

    #[test]
    fn vertex_is_three_packed_floats() {
        assert_eq!(std::mem::size_of::<Vertex>(), 12);
        assert_eq!(std::mem::offset_of!(Vertex, position), 0);
    }

    #[test]
    fn triangle_is_front_facing() {
        assert!(vulkan_signed_area(&TRIANGLE) > 0.0);
    }

    #[test]
    fn triangle_is_in_clip_space() {
        for v in TRIANGLE {
            assert!((-1.0..=1.0).contains(&v.position.x));
            assert!((-1.0..=1.0).contains(&v.position.y));
            assert!((0.0..=1.0).contains(&v.position.z));
        }
    }
}
