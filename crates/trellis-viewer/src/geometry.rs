//! Procedural geometry for the demo scene.

use glam::{Vec3, Vec4};
use trellis_engine::render::{Buffer, Primitive, StorageHint, VertexData};

/// Unit cube centered on the origin, one color per face pair.
pub fn cube(size: f32) -> Buffer<VertexData> {
    let h = size * 0.5;
    let faces: [(Vec3, Vec3, Vec3, Vec4); 6] = [
        (Vec3::Z, Vec3::X, Vec3::Y, Vec4::new(0.90, 0.30, 0.25, 1.0)),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y, Vec4::new(0.90, 0.30, 0.25, 1.0)),
        (Vec3::X, Vec3::NEG_Z, Vec3::Y, Vec4::new(0.25, 0.75, 0.35, 1.0)),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y, Vec4::new(0.25, 0.75, 0.35, 1.0)),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z, Vec4::new(0.25, 0.45, 0.90, 1.0)),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z, Vec4::new(0.25, 0.45, 0.90, 1.0)),
    ];

    let mut buffer = Buffer::with_primitive(Primitive::Triangles);
    for (normal, u, v, color) in faces {
        let c = normal * h;
        let corners = [
            c - u * h - v * h,
            c + u * h - v * h,
            c + u * h + v * h,
            c - u * h + v * h,
        ];
        for i in [0, 1, 2, 0, 2, 3] {
            buffer.add_vertex(VertexData::from_glam(corners[i], normal, color));
        }
    }
    buffer
}

/// Square line grid on the XZ plane.
pub fn grid(half_extent: i32, spacing: f32) -> Buffer<VertexData> {
    let mut buffer = Buffer::with_primitive(Primitive::Lines);
    let edge = half_extent as f32 * spacing;
    let color = Vec4::new(0.45, 0.45, 0.50, 1.0);

    for i in -half_extent..=half_extent {
        let t = i as f32 * spacing;
        for (a, b) in [
            (Vec3::new(t, 0.0, -edge), Vec3::new(t, 0.0, edge)),
            (Vec3::new(-edge, 0.0, t), Vec3::new(edge, 0.0, t)),
        ] {
            buffer.add_vertex(VertexData::from_glam(a, Vec3::ZERO, color));
            buffer.add_vertex(VertexData::from_glam(b, Vec3::ZERO, color));
        }
    }
    buffer
}

/// X/Y/Z axis lines in red/green/blue.
pub fn axes(length: f32) -> Buffer<VertexData> {
    let mut buffer = Buffer::with_primitive(Primitive::Lines);
    for axis in [Vec3::X, Vec3::Y, Vec3::Z] {
        let color = axis.extend(1.0);
        buffer.add_vertex(VertexData::from_glam(Vec3::ZERO, Vec3::ZERO, color));
        buffer.add_vertex(VertexData::from_glam(axis * length, Vec3::ZERO, color));
    }
    buffer
}

/// Empty line strip meant to be appended to every frame.
pub fn trail() -> Buffer<VertexData> {
    let mut buffer = Buffer::with_primitive(Primitive::LineStrip);
    buffer.set_storage_hint(StorageHint::Stream);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_twelve_triangles() {
        let c = cube(1.0);
        assert_eq!(c.len(), 36);
        assert!(c.data().iter().all(|v| v.position.iter().all(|p| p.abs() <= 0.5 + 1e-6)));
    }

    #[test]
    fn grid_line_count() {
        // 2 * (2n + 1) lines, 2 vertices each.
        assert_eq!(grid(2, 1.0).len(), 2 * 5 * 2);
    }

    #[test]
    fn axes_are_three_lines() {
        let a = axes(2.0);
        assert_eq!(a.len(), 6);
        assert_eq!(a.primitive(), Primitive::Lines);
    }
}
