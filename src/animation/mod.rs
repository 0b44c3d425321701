//! Keyframe animation
//!
//! Channels sample glTF keyframe streams with a forward-scan cursor and
//! write translation / rotation / scale or morph weights into nodes. The
//! scene graph picks the changes up through the transform dirty check.

pub mod binding;
pub mod clip;
pub mod tracks;

pub use binding::{ChannelTarget, TargetPath};
pub use clip::{Animation, AnimationChannel, AnimationSampler};
pub use tracks::{InterpolationMode, KeyframeCursor, SampledValue, hermite};
