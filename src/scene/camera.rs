use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    Perspective,
    Orthographic,
}

/// A glTF camera plus the matrices derived from where it sits.
///
/// Projection matrices use GL clip space (depth in `[-1, 1]`).
#[derive(Debug, Clone)]
pub struct Camera {
    pub name: Option<String>,

    // === Projection ===
    pub projection_type: ProjectionType,
    /// Vertical field of view in radians.
    pub yfov: f32,
    pub aspect: f32,
    pub near: f32,
    /// `None` gives an infinite perspective projection.
    pub far: Option<f32>,
    pub xmag: f32,
    pub ymag: f32,

    // Cached matrices, read by the renderer
    pub(crate) world_matrix: Mat4,
    pub(crate) view_matrix: Mat4,
    pub(crate) projection_matrix: Mat4,
    pub(crate) view_projection_matrix: Mat4,
}

impl Camera {
    #[must_use]
    pub fn new_perspective(yfov: f32, aspect: f32, near: f32, far: Option<f32>) -> Self {
        let mut cam = Self {
            name: None,
            projection_type: ProjectionType::Perspective,
            yfov,
            aspect,
            near,
            far,
            xmag: 1.0,
            ymag: 1.0,

            world_matrix: Mat4::IDENTITY,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection_matrix: Mat4::IDENTITY,
        };
        cam.update_projection_matrix();
        cam
    }

    #[must_use]
    pub fn new_orthographic(xmag: f32, ymag: f32, near: f32, far: f32) -> Self {
        let mut cam = Self {
            projection_type: ProjectionType::Orthographic,
            xmag,
            ymag,
            ..Self::new_perspective(1.0, 1.0, near, Some(far))
        };
        cam.update_projection_matrix();
        cam
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
        self.update_projection_matrix();
    }

    pub fn update_projection_matrix(&mut self) {
        self.projection_matrix = match self.projection_type {
            ProjectionType::Perspective => match self.far {
                Some(far) => Mat4::perspective_rh_gl(self.yfov, self.aspect, self.near, far),
                None => infinite_perspective_gl(self.yfov, self.aspect, self.near),
            },
            ProjectionType::Orthographic => {
                let far = self.far.unwrap_or(self.near + 1.0);
                Mat4::orthographic_rh_gl(-self.xmag, self.xmag, -self.ymag, self.ymag, self.near, far)
            }
        };
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    /// Places the camera at `world_transform` (e.g. its node's world matrix).
    pub fn update_view_projection(&mut self, world_transform: &Mat4) {
        self.world_matrix = *world_transform;
        self.view_matrix = world_transform.inverse();
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
    }

    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) {
        let view = Mat4::look_at_rh(eye, target, up);
        self.update_view_projection(&view.inverse());
    }

    /// Places the camera on +Z of the box center, far enough back for the
    /// box's bounding sphere to fit the vertical field of view.
    pub fn frame_bounds(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        let radius = ((max - min).length() * 0.5).max(f32::EPSILON);
        let distance = match self.projection_type {
            ProjectionType::Perspective => radius / (self.yfov * 0.5).tan().max(f32::EPSILON),
            ProjectionType::Orthographic => radius * 2.0,
        };
        self.near = (distance - radius).max(distance * 0.001).max(1e-4);
        if self.far.is_some() {
            self.far = Some(distance + radius * 2.0);
        }
        self.update_projection_matrix();
        self.look_at(center + Vec3::Z * distance, center, Vec3::Y);
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world_matrix.w_axis.truncate()
    }

    #[inline]
    #[must_use]
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view_matrix
    }

    #[inline]
    #[must_use]
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection_matrix
    }

    #[inline]
    #[must_use]
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection_matrix
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new_perspective(45f32.to_radians(), 16.0 / 9.0, 0.01, Some(100.0))
    }
}

/// glTF infinite perspective projection.
fn infinite_perspective_gl(yfov: f32, aspect: f32, near: f32) -> Mat4 {
    let f = 1.0 / (yfov * 0.5).tan();
    Mat4::from_cols(
        Vec4::new(f / aspect, 0.0, 0.0, 0.0),
        Vec4::new(0.0, f, 0.0, 0.0),
        Vec4::new(0.0, 0.0, -1.0, -1.0),
        Vec4::new(0.0, 0.0, -2.0 * near, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_sets_position_and_view() {
        let mut cam = Camera::default();
        cam.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        assert!(cam.position().abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1e-5));

        let origin_in_view = cam.view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin_in_view.abs_diff_eq(Vec3::new(0.0, 0.0, -5.0), 1e-5));
    }

    #[test]
    fn frame_bounds_centers_the_box() {
        let mut cam = Camera::new_perspective(std::f32::consts::FRAC_PI_2, 1.0, 0.1, Some(100.0));
        cam.frame_bounds(Vec3::new(1.0, 1.0, 1.0), Vec3::new(3.0, 3.0, 3.0));

        let center = cam.view_matrix().transform_point3(Vec3::splat(2.0));
        assert!(center.x.abs() < 1e-4 && center.y.abs() < 1e-4);
        assert!(center.z < -cam.near);
        assert!(cam.position().z > 3.0);
    }

    #[test]
    fn infinite_projection_maps_near_plane_to_minus_one() {
        let cam = Camera::new_perspective(1.0, 1.0, 0.5, None);
        let clip = *cam.projection_matrix() * Vec4::new(0.0, 0.0, -0.5, 1.0);
        assert!((clip.z / clip.w + 1.0).abs() < 1e-5);
    }
}
