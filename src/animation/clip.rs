use glam::{Quat, Vec3};
use log::warn;

use crate::animation::binding::{ChannelTarget, TargetPath};
use crate::animation::tracks::{InterpolationMode, KeyframeCursor};
use crate::resources::{AccessorReader, Mesh};
use crate::scene::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationSampler {
    /// Scalar accessor of key times in seconds.
    pub input: usize,
    /// Accessor of key values, read through its normalized float view.
    pub output: usize,
    pub interpolation: InterpolationMode,
}

impl AnimationSampler {
    #[must_use]
    pub fn new(input: usize, output: usize, interpolation: InterpolationMode) -> Self {
        Self {
            input,
            output,
            interpolation,
        }
    }
}

/// A sampler bound to a node property, with its own playback cursor.
#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub sampler: usize,
    pub target: ChannelTarget,
    cursor: KeyframeCursor,
    warned: bool,
}

impl AnimationChannel {
    #[must_use]
    pub fn new(sampler: usize, node: usize, path: TargetPath) -> Self {
        Self {
            sampler,
            target: ChannelTarget {
                node: Some(node),
                path,
            },
            cursor: KeyframeCursor::default(),
            warned: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn cursor(&self) -> &KeyframeCursor {
        &self.cursor
    }

    fn warn_once(&mut self, animation: &str, reason: &str) {
        if !self.warned {
            warn!("Animation '{animation}': channel on {:?} skipped: {reason}", self.target);
            self.warned = true;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Animation {
    pub name: Option<String>,
    pub channels: Vec<AnimationChannel>,
    pub samplers: Vec<AnimationSampler>,
}

impl Animation {
    #[must_use]
    pub fn new(samplers: Vec<AnimationSampler>, channels: Vec<AnimationChannel>) -> Self {
        Self {
            name: None,
            channels,
            samplers,
        }
    }

    /// Longest key time over all samplers.
    #[must_use]
    pub fn duration(&self, reader: AccessorReader<'_>) -> f32 {
        self.samplers
            .iter()
            .filter_map(|s| reader.floats(s.input).ok())
            .filter_map(|times| times.last().copied())
            .fold(0.0_f32, f32::max)
    }

    /// Rewinds every channel cursor to the first key.
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.cursor.reset();
        }
    }

    /// Samples every channel at `time` and writes the results into the
    /// target nodes' local transforms or morph weights.
    ///
    /// Malformed channels (missing accessors, bad node index, short output)
    /// are skipped with one warning each; the rest still apply.
    pub fn advance(
        &mut self,
        nodes: &mut [Node],
        meshes: &[Mesh],
        reader: AccessorReader<'_>,
        time: f32,
    ) {
        let name = self.name.as_deref().unwrap_or("<unnamed>");

        for channel in &mut self.channels {
            let Some(node_index) = channel.target.node else {
                continue;
            };
            let Some(sampler) = self.samplers.get(channel.sampler).copied() else {
                channel.warn_once(name, "sampler index out of range");
                continue;
            };
            let (input, output) = match (reader.floats(sampler.input), reader.floats(sampler.output)) {
                (Ok(input), Ok(output)) => (input, output),
                _ => {
                    channel.warn_once(name, "input or output accessor unreadable");
                    continue;
                }
            };
            let Some(node) = nodes.get_mut(node_index) else {
                channel.warn_once(name, "target node out of range");
                continue;
            };

            let path = channel.target.path;
            let stride = path.fixed_stride().unwrap_or_else(|| {
                let keys = input.len() * sampler.interpolation.elements_per_key();
                if keys == 0 { 0 } else { output.len() / keys }
            });

            let Some(value) = channel.cursor.sample(
                input,
                output,
                stride,
                sampler.interpolation,
                path == TargetPath::Rotation,
                time,
            ) else {
                channel.warn_once(name, "keyframe data shorter than its key count");
                continue;
            };

            match path {
                TargetPath::Translation => node.transform.translation = Vec3::from_slice(&value),
                TargetPath::Rotation => node.transform.rotation = Quat::from_slice(&value),
                TargetPath::Scale => node.transform.scale = Vec3::from_slice(&value),
                TargetPath::Weights => {
                    let target_count = node
                        .mesh
                        .and_then(|m| meshes.get(m))
                        .map_or(value.len(), Mesh::target_count);
                    let weights = node.weights.get_or_insert_with(Vec::new);
                    weights.clear();
                    weights.extend(value.iter().copied().take(target_count));
                    weights.resize(target_count, 0.0);
                }
            }
        }
    }
}
