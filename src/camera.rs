//! Look-to camera and perspective projection.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3, perspective};

/// cgmath produces OpenGL clip space (z in -1..1), wgpu wants z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub forward: Vector3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    /// A camera looking along the direction given by `yaw` (around Y, zero
    /// looks down +X) and `pitch` (up from the horizon).
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        let (sin_pitch, cos_pitch) = pitch.into().0.sin_cos();
        let (sin_yaw, cos_yaw) = yaw.into().0.sin_cos();
        Self {
            position: position.into(),
            forward: Vector3::new(cos_pitch * cos_yaw, sin_pitch, cos_pitch * sin_yaw).normalize(),
            up: Vector3::unit_y(),
        }
    }

    pub fn look_to(position: Point3<f32>, forward: Vector3<f32>, up: Vector3<f32>) -> Self {
        Self {
            position,
            forward: forward.normalize(),
            up,
        }
    }

    pub fn look_at(position: Point3<f32>, target: Point3<f32>) -> Self {
        Self::look_to(position, target - position, Vector3::unit_y())
    }

    /// Camera for `face` of a cube map centred at `centre`, faces ordered
    /// +X, -X, +Y, -Y, +Z, -Z. Pair it with [`Projection::cube_face`].
    pub fn cube_face(centre: Point3<f32>, face: u32) -> Self {
        let (forward, up) = match face {
            0 => (Vector3::unit_x(), Vector3::unit_y()),
            1 => (-Vector3::unit_x(), Vector3::unit_y()),
            2 => (Vector3::unit_y(), -Vector3::unit_z()),
            3 => (-Vector3::unit_y(), Vector3::unit_z()),
            4 => (Vector3::unit_z(), Vector3::unit_y()),
            _ => (-Vector3::unit_z(), Vector3::unit_y()),
        };
        Self::look_to(centre, forward, up)
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward, self.up)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
    mirror_x: bool,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
            mirror_x: false,
        }
    }

    /// 90 degree square projection for rendering into a cube face. Cube faces
    /// are addressed with u running against a right-handed camera's x axis,
    /// so the image is mirrored horizontally.
    pub fn cube_face(znear: f32, zfar: f32) -> Self {
        Self {
            aspect: 1.0,
            fovy: Rad(std::f32::consts::FRAC_PI_2),
            znear,
            zfar,
            mirror_x: true,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn znear(&self) -> f32 {
        self.znear
    }

    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        let proj = OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar);
        if self.mirror_x {
            Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0) * proj
        } else {
            proj
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use cgmath::{Deg, Vector4};

    #[test]
    fn depth_lands_in_wgpu_range() {
        let projection = Projection::new(800, 600, Deg(45.0), 0.1, 100.0);
        let near = projection.calc_matrix() * Vector4::new(0.0, 0.0, -0.1, 1.0);
        let far = projection.calc_matrix() * Vector4::new(0.0, 0.0, -100.0, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-4);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn cube_faces_look_down_their_axis() {
        let centre = Point3::new(0.0, 2.0, 0.0);
        let projection = Projection::cube_face(0.1, 1000.0);
        let axes = [
            Vector3::unit_x(),
            -Vector3::unit_x(),
            Vector3::unit_y(),
            -Vector3::unit_y(),
            Vector3::unit_z(),
            -Vector3::unit_z(),
        ];
        for (face, axis) in axes.iter().enumerate() {
            let camera = Camera::cube_face(centre, face as u32);
            let point = centre + *axis * 5.0;
            let clip = projection.calc_matrix() * camera.calc_matrix() * point.to_homogeneous();
            assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-4);
            assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-4);
            assert!(clip.w > 0.0);
        }
    }

    #[test]
    fn positive_x_face_maps_minus_z_to_the_right() {
        // u grows towards -Z on the +X face of a cube map.
        let camera = Camera::cube_face(Point3::new(0.0, 0.0, 0.0), 0);
        let projection = Projection::cube_face(0.1, 100.0);
        let point = Point3::new(5.0, 0.0, -1.0);
        let clip = projection.calc_matrix() * camera.calc_matrix() * point.to_homogeneous();
        assert!(clip.x / clip.w > 0.0);
    }
}
