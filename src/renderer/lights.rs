//! Punctual light gathering for the fragment shader's `u_Lights` array.

use glam::{Quat, Vec3};

use crate::document::Document;
use crate::renderer::pipeline::UniformValue;
use crate::scene::{Light, LightKind, PlacedLight, Scene};

/// Lights of `scene` in traversal order, placed at their nodes' world matrices.
#[must_use]
pub fn scene_lights<'a>(document: &'a Document, scene: &Scene) -> Vec<PlacedLight<'a>> {
    scene
        .gather_nodes(&document.nodes)
        .into_iter()
        .filter_map(|index| {
            let node = document.nodes.get(index)?;
            let light = document.lights.get(node.light?)?;
            Some(PlacedLight {
                light,
                world: *node.world_matrix(),
            })
        })
        .collect()
}

/// Key and fill directional lights used when a scene brings none.
#[must_use]
pub fn default_lights() -> [UniformValue; 2] {
    let key = Quat::from_xyzw(-0.353_553_4, -0.353_553_4, -0.146_446_6, 0.853_553_4).normalize();
    let fill = Quat::from_xyzw(0.853_553_4, 0.146_446_6, -0.353_553_4, -0.353_553_4).normalize();
    let light = Light::new_directional(Vec3::ONE, 1.0);
    let fill_light = Light::new_directional(Vec3::ONE, 0.5);
    [
        light_uniform(&light, Vec3::ZERO, key * Vec3::NEG_Z),
        light_uniform(&fill_light, Vec3::ZERO, fill * Vec3::NEG_Z),
    ]
}

/// The `Light` struct value for one placed light.
#[must_use]
pub fn placed_light_uniform(placed: &PlacedLight<'_>) -> UniformValue {
    light_uniform(placed.light, placed.position(), placed.direction())
}

fn light_uniform(light: &Light, position: Vec3, direction: Vec3) -> UniformValue {
    let (inner, outer) = match &light.kind {
        LightKind::Spot(spot) => (spot.inner_cone.cos(), spot.outer_cone.cos()),
        _ => (1.0, std::f32::consts::FRAC_1_SQRT_2),
    };
    UniformValue::structure([
        ("direction", UniformValue::Vec3(direction)),
        // zero means unlimited
        ("range", UniformValue::Float(light.range.unwrap_or(0.0))),
        ("color", UniformValue::Vec3(light.color)),
        ("intensity", UniformValue::Float(light.intensity)),
        ("position", UniformValue::Vec3(position)),
        ("innerConeCos", UniformValue::Float(inner)),
        ("outerConeCos", UniformValue::Float(outer)),
        ("type", UniformValue::Int(light.kind.shader_type())),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_light_points_down() {
        let [key, _] = default_lights();
        let UniformValue::Struct(members) = key else {
            panic!("light is a struct");
        };
        let Some((_, UniformValue::Vec3(direction))) = members.iter().find(|(n, _)| n == "direction")
        else {
            panic!("direction member");
        };
        assert!(direction.y < 0.0);
        assert!((direction.length() - 1.0).abs() < 1e-4);
    }
}
