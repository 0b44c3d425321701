use glam::{Mat4, Vec3};

use crate::document::Document;
use crate::resources::Semantic;
use crate::scene::scene::Scene;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    #[must_use]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Axis-aligned box enclosing the eight transformed corners.
    #[must_use]
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);

        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }

        Self { min, max }
    }
}

/// World-space bounds of every renderable primitive in `scene`.
///
/// Uses the POSITION accessor's declared `min`/`max` when present and scans
/// the data otherwise. World matrices must be current. Returns `None` for a
/// scene without geometry.
#[must_use]
pub fn scene_bounds(document: &Document, scene: &Scene) -> Option<BoundingBox> {
    let reader = document.reader();
    let mut bounds: Option<BoundingBox> = None;

    for index in scene.gather_nodes(&document.nodes) {
        let Some(node) = document.nodes.get(index) else {
            continue;
        };
        let Some(mesh) = node.mesh.and_then(|m| document.meshes.get(m)) else {
            continue;
        };

        for primitive in mesh.primitives.iter().filter(|p| p.is_renderable()) {
            let Some(position) = primitive.attribute(&Semantic::Position) else {
                continue;
            };
            let Ok(accessor) = reader.accessor(position) else {
                continue;
            };

            let local = match (&accessor.min, &accessor.max) {
                (Some(min), Some(max)) if min.len() >= 3 && max.len() >= 3 => BoundingBox {
                    min: Vec3::from_slice(min),
                    max: Vec3::from_slice(max),
                },
                _ => match reader.floats(position).ok().and_then(scan_positions) {
                    Some(b) => b,
                    None => continue,
                },
            };

            let world = local.transform(node.world_matrix());
            bounds = Some(match bounds {
                Some(b) => b.union(&world),
                None => world,
            });
        }
    }

    bounds
}

fn scan_positions(floats: &[f32]) -> Option<BoundingBox> {
    let mut points = floats.chunks_exact(3).map(Vec3::from_slice);
    let first = points.next()?;
    Some(points.fold(BoundingBox { min: first, max: first }, |b, p| BoundingBox {
        min: b.min.min(p),
        max: b.max.max(p),
    }))
}
