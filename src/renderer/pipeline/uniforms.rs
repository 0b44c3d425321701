use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// A value destined for a shader uniform.
///
/// Leaves carry scalars, vectors, matrices or homogeneous scalar arrays;
/// `Struct` and `Array` nest. [`ShaderProgram::update_uniform`] walks the
/// tree and resolves each leaf against the program's reflected uniforms.
///
/// [`ShaderProgram::update_uniform`]: crate::renderer::pipeline::ShaderProgram::update_uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    /// Named members, uploaded as `name.member`.
    Struct(Vec<(String, UniformValue)>),
    /// Arrays of structs upload per element as `name[i]`; anything else is
    /// flattened and uploaded once.
    Array(Vec<UniformValue>),
}

impl UniformValue {
    /// Builds a struct value from `(member, value)` pairs.
    #[must_use]
    pub fn structure<I, S>(members: I) -> Self
    where
        I: IntoIterator<Item = (S, UniformValue)>,
        S: Into<String>,
    {
        Self::Struct(members.into_iter().map(|(n, v)| (n.into(), v)).collect())
    }

    /// Whether this array needs per-element uploads.
    #[must_use]
    pub fn is_struct_array(&self) -> bool {
        matches!(self, Self::Array(items) if items.iter().any(|i| matches!(i, Self::Struct(_))))
    }

    /// Appends the value's components as floats (column-major for matrices).
    pub fn flatten_f32(&self, out: &mut Vec<f32>) {
        match self {
            Self::Float(v) => out.push(*v),
            Self::Int(v) => out.push(*v as f32),
            Self::Vec2(v) => out.extend_from_slice(&v.to_array()),
            Self::Vec3(v) => out.extend_from_slice(&v.to_array()),
            Self::Vec4(v) => out.extend_from_slice(&v.to_array()),
            Self::Mat3(m) => out.extend_from_slice(&m.to_cols_array()),
            Self::Mat4(m) => out.extend_from_slice(&m.to_cols_array()),
            Self::FloatArray(v) => out.extend_from_slice(v),
            Self::IntArray(v) => out.extend(v.iter().map(|&i| i as f32)),
            Self::Struct(members) => members.iter().for_each(|(_, v)| v.flatten_f32(out)),
            Self::Array(items) => items.iter().for_each(|v| v.flatten_f32(out)),
        }
    }

    /// Appends the value's components as integers (floats are truncated).
    pub fn flatten_i32(&self, out: &mut Vec<i32>) {
        match self {
            Self::Int(v) => out.push(*v),
            Self::IntArray(v) => out.extend_from_slice(v),
            Self::Array(items) => items.iter().for_each(|v| v.flatten_i32(out)),
            Self::Struct(members) => members.iter().for_each(|(_, v)| v.flatten_i32(out)),
            other => {
                let mut floats = Vec::new();
                other.flatten_f32(&mut floats);
                out.extend(floats.into_iter().map(|f| f as i32));
            }
        }
    }
}

macro_rules! impl_from {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for UniformValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

impl_from!(f32, Float);
impl_from!(i32, Int);
impl_from!(Vec2, Vec2);
impl_from!(Vec3, Vec3);
impl_from!(Vec4, Vec4);
impl_from!(Mat3, Mat3);
impl_from!(Mat4, Mat4);
impl_from!(Vec<f32>, FloatArray);
impl_from!(Vec<i32>, IntArray);

impl From<bool> for UniformValue {
    fn from(value: bool) -> Self {
        Self::Int(i32::from(value))
    }
}

impl From<&[Mat4]> for UniformValue {
    fn from(value: &[Mat4]) -> Self {
        Self::Array(value.iter().copied().map(Self::Mat4).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrices_flatten_column_major() {
        let m = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let mut out = Vec::new();
        UniformValue::from(m).flatten_f32(&mut out);
        assert_eq!(&out[12..15], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn struct_arrays_are_detected() {
        let light = UniformValue::structure([("intensity", UniformValue::Float(1.0))]);
        assert!(UniformValue::Array(vec![light]).is_struct_array());
        assert!(!UniformValue::Array(vec![UniformValue::Float(1.0)]).is_struct_array());
    }
}
