/// The node property an animation channel drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetPath {
    Translation, // Maps to transform.translation
    Rotation,    // Maps to transform.rotation
    Scale,       // Maps to transform.scale
    Weights,     // Maps to node morph weights
}

impl TargetPath {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "translation" => Some(Self::Translation),
            "rotation" => Some(Self::Rotation),
            "scale" => Some(Self::Scale),
            "weights" => Some(Self::Weights),
            _ => None,
        }
    }

    /// Components per output element; `None` for weights, whose stride
    /// depends on the key count.
    #[must_use]
    pub fn fixed_stride(self) -> Option<usize> {
        match self {
            Self::Translation | Self::Scale => Some(3),
            Self::Rotation => Some(4),
            Self::Weights => None,
        }
    }
}

/// Where a channel writes: a node and one of its properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelTarget {
    /// `None` when the channel targets something outside the node table
    /// (an extension); such channels are ignored.
    pub node: Option<usize>,
    pub path: TargetPath,
}
