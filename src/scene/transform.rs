use glam::{Mat3, Mat4, Quat, Vec3};

/// Node transform component.
///
/// Holds the local translation / rotation / scale, the cached local matrix
/// and the derived world, inverse-world and normal matrices. The local matrix
/// is only recomposed when the public TRS fields changed since the last
/// update (shadow-state dirty check), which is what keeps per-frame hierarchy
/// updates cheap for static scenes.
#[derive(Debug, Clone)]
pub struct Transform {
    // === Public properties ===
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,

    // === Matrix cache ===
    pub(crate) local_matrix: Mat4,
    pub(crate) world_matrix: Mat4,
    pub(crate) inverse_world_matrix: Mat4,
    pub(crate) normal_matrix: Mat4,
    /// Parent world matrix used for the last world update.
    pub(crate) parent_world: Mat4,

    // === Dirty-check state ===
    last_translation: Vec3,
    last_rotation: Quat,
    last_scale: Vec3,
    force_update: bool,
}

impl Transform {
    #[must_use]
    pub fn new() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,

            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
            inverse_world_matrix: Mat4::IDENTITY,
            normal_matrix: Mat4::IDENTITY,
            parent_world: Mat4::IDENTITY,

            last_translation: Vec3::ZERO,
            last_rotation: Quat::IDENTITY,
            last_scale: Vec3::ONE,
            force_update: true,
        }
    }

    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
            ..Self::new()
        }
    }

    /// Builds a transform from an explicit local matrix.
    ///
    /// The matrix is decomposed once; from then on the node is driven by its
    /// TRS fields like any other node. Shear is lost.
    #[must_use]
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (translation, rotation, scale) = decompose(&matrix);
        Self::from_trs(translation, rotation, scale)
    }

    // ========================================================================
    // Dirty-checked update
    // ========================================================================

    /// Recomposes the local matrix if TRS changed. Returns whether it did.
    pub fn update_local_matrix(&mut self) -> bool {
        let changed = self.translation != self.last_translation
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
            || self.force_update;

        if changed {
            self.local_matrix =
                Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);

            self.last_translation = self.translation;
            self.last_rotation = self.rotation;
            self.last_scale = self.scale;
            self.force_update = false;
        }

        changed
    }

    /// Writes the world matrix and refreshes its inverse and normal matrix.
    pub(crate) fn set_world_matrix(&mut self, parent_world: Mat4, world: Mat4) {
        self.parent_world = parent_world;
        self.world_matrix = world;
        self.inverse_world_matrix = world.inverse();
        self.normal_matrix = self.inverse_world_matrix.transpose();
    }

    /// Forces the next update to recompose the local matrix.
    pub fn mark_dirty(&mut self) {
        self.force_update = true;
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.force_update
            || self.translation != self.last_translation
            || self.rotation != self.last_rotation
            || self.scale != self.last_scale
    }

    // ========================================================================
    // Getters
    // ========================================================================

    #[inline]
    #[must_use]
    pub fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    #[inline]
    #[must_use]
    pub fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    #[inline]
    #[must_use]
    pub fn inverse_world_matrix(&self) -> &Mat4 {
        &self.inverse_world_matrix
    }

    /// Transpose of the inverse world matrix.
    #[inline]
    #[must_use]
    pub fn normal_matrix(&self) -> &Mat4 {
        &self.normal_matrix
    }

    /// Local matrix composed from the current TRS, ignoring the cache.
    #[must_use]
    pub fn compose(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a local matrix into translation, rotation and scale.
///
/// Each basis column is normalized before the rotation is extracted so the
/// scale does not leak into the quaternion; the scale is the original column
/// lengths and the rotation is renormalized.
#[must_use]
pub fn decompose(matrix: &Mat4) -> (Vec3, Quat, Vec3) {
    let translation = matrix.w_axis.truncate();

    let x = matrix.x_axis.truncate();
    let y = matrix.y_axis.truncate();
    let z = matrix.z_axis.truncate();
    let scale = Vec3::new(x.length(), y.length(), z.length());

    let basis = Mat3::from_cols(x.normalize_or_zero(), y.normalize_or_zero(), z.normalize_or_zero());
    let rotation = Quat::from_mat3(&basis).normalize();

    (translation, rotation, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_check_tracks_trs_changes() {
        let mut t = Transform::new();
        assert!(t.update_local_matrix());
        assert!(!t.update_local_matrix());

        t.translation = Vec3::new(1.0, 2.0, 3.0);
        assert!(t.is_dirty());
        assert!(t.update_local_matrix());
        assert!(!t.is_dirty());

        t.mark_dirty();
        assert!(t.update_local_matrix());
    }

    #[test]
    fn decompose_splits_scale_from_rotation() {
        let rotation = Quat::from_rotation_z(0.7);
        let m = Mat4::from_scale_rotation_translation(Vec3::new(2.0, 3.0, 4.0), rotation, Vec3::X);
        let (t, r, s) = decompose(&m);

        assert!(t.abs_diff_eq(Vec3::X, 1e-5));
        assert!(s.abs_diff_eq(Vec3::new(2.0, 3.0, 4.0), 1e-5));
        assert!(r.abs_diff_eq(rotation, 1e-5) || r.abs_diff_eq(-rotation, 1e-5));
    }
}
