//! Scene graph
//!
//! - [`Node`]: hierarchy entry with a [`Transform`] and optional components
//! - [`Scene`]: ordered root list
//! - [`transform_system`]: world matrix propagation
//! - [`partition`]: alpha-mode partitioning and depth sorting
//! - [`Camera`], [`Light`], [`Skin`]: node components

pub mod bounds;
pub mod camera;
pub mod light;
pub mod node;
pub mod partition;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod skin;
pub mod transform;
pub mod transform_system;

pub use bounds::{BoundingBox, scene_bounds};
pub use camera::{Camera, ProjectionType};
pub use light::{Light, LightKind, PlacedLight, SpotLight};
pub use node::Node;
pub use partition::{depth_sort, partition};
pub use scene::{Scene, includes_node};
pub use skin::{JointMatrices, Skin};
pub use transform::{Transform, decompose};
pub use transform_system::compute_world_transforms;
