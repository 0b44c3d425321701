use glam::Mat4;

use crate::errors::{KilnError, Result};
use crate::resources::AccessorReader;
use crate::scene::node::Node;

/// Skinning data: an ordered joint list and its inverse bind matrices.
///
/// `joints[i]` corresponds to `u_jointMatrix[i]` in the vertex shader.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub name: Option<String>,
    pub joints: Vec<usize>,
    /// MAT4 accessor; `None` means identity for every joint.
    pub inverse_bind_matrices: Option<usize>,
    pub skeleton: Option<usize>,
}

/// Per-frame joint palette.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointMatrices {
    pub joints: Vec<Mat4>,
    /// Transpose of the inverse of each joint matrix.
    pub normals: Vec<Mat4>,
}

impl Skin {
    #[must_use]
    pub fn new(joints: Vec<usize>, inverse_bind_matrices: Option<usize>) -> Self {
        Self {
            name: None,
            joints,
            inverse_bind_matrices,
            skeleton: None,
        }
    }

    /// Computes `inverse(world(mesh node)) * world(joint) * inverseBind` for
    /// every joint, using the world matrices of the last hierarchy update.
    ///
    /// # Errors
    /// Fails if a joint index is out of range or the inverse bind accessor
    /// cannot be read.
    pub fn compute_joint_matrices(
        &self,
        nodes: &[Node],
        reader: AccessorReader<'_>,
        mesh_world_inverse: &Mat4,
    ) -> Result<JointMatrices> {
        let inverse_binds = match self.inverse_bind_matrices {
            Some(accessor) => Some(reader.floats(accessor)?),
            None => None,
        };

        let mut out = JointMatrices {
            joints: Vec::with_capacity(self.joints.len()),
            normals: Vec::with_capacity(self.joints.len()),
        };

        for (i, &joint) in self.joints.iter().enumerate() {
            let node = nodes
                .get(joint)
                .ok_or_else(|| KilnError::out_of_bounds("skin joint", joint))?;

            let ibm = inverse_binds
                .and_then(|floats| floats.get(i * 16..i * 16 + 16))
                .map_or(Mat4::IDENTITY, Mat4::from_cols_slice);

            let matrix = *mesh_world_inverse * *node.world_matrix() * ibm;
            out.normals.push(matrix.inverse().transpose());
            out.joints.push(matrix);
        }

        Ok(out)
    }
}
