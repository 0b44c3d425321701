use glam::{Mat4, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct SpotLight {
    /// Radians.
    pub inner_cone: f32,
    /// Radians.
    pub outer_cone: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            inner_cone: 0.0,
            outer_cone: std::f32::consts::FRAC_PI_4,
        }
    }
}

// KHR_lights_punctual light types
#[derive(Debug, Clone, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot(SpotLight),
}

impl LightKind {
    /// Value of the `type` member in the light uniform struct.
    #[must_use]
    pub fn shader_type(&self) -> i32 {
        match self {
            Self::Directional => 0,
            Self::Point => 1,
            Self::Spot(_) => 2,
        }
    }
}

/// A punctual light. Position and direction come from the node that
/// references it: the light shines down the node's local -Z.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: Option<String>,
    pub color: Vec3,
    /// Candela for point and spot lights, lux for directional.
    pub intensity: f32,
    /// `None` means infinite range.
    pub range: Option<f32>,
    pub kind: LightKind,
}

impl Light {
    #[must_use]
    pub fn new_directional(color: Vec3, intensity: f32) -> Self {
        Self {
            name: None,
            color,
            intensity,
            range: None,
            kind: LightKind::Directional,
        }
    }

    #[must_use]
    pub fn new_point(color: Vec3, intensity: f32, range: Option<f32>) -> Self {
        Self {
            name: None,
            color,
            intensity,
            range,
            kind: LightKind::Point,
        }
    }

    #[must_use]
    pub fn new_spot(
        color: Vec3,
        intensity: f32,
        range: Option<f32>,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            name: None,
            color,
            intensity,
            range,
            kind: LightKind::Spot(SpotLight {
                inner_cone,
                outer_cone,
            }),
        }
    }
}

/// A light placed in the world: the light plus its node's world matrix.
#[derive(Debug, Clone, Copy)]
pub struct PlacedLight<'a> {
    pub light: &'a Light,
    pub world: Mat4,
}

impl PlacedLight<'_> {
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }

    #[must_use]
    pub fn direction(&self) -> Vec3 {
        self.world.transform_vector3(Vec3::NEG_Z).normalize_or_zero()
    }
}
