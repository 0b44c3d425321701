//! Textures, samplers and decoded images.
//!
//! Images arrive already decoded (the loader owns file formats). Their pixel
//! buffer is uploaded to the GPU exactly once, on the first bind of a texture
//! that references them, and is dropped from the CPU side right after.

/// Texture dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    #[default]
    D2,
    /// Six faces in +X, -X, +Y, -Y, +Z, -Z order.
    Cube,
}

/// A decoded image.
#[derive(Debug, Clone)]
pub struct Image {
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    /// Pixel data. `None` once it has been handed to the GPU.
    pub(crate) pixels: Option<Vec<u8>>,
}

impl Image {
    #[must_use]
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat, pixels: Vec<u8>) -> Self {
        Self {
            name: None,
            width,
            height,
            format,
            pixels: Some(pixels),
        }
    }

    /// 1×1 RGBA8 image of the given color.
    #[must_use]
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, wgpu::TextureFormat::Rgba8Unorm, rgba.to_vec())
    }

    /// Whether the CPU-side pixels are still resident.
    #[inline]
    #[must_use]
    pub fn is_resident(&self) -> bool {
        self.pixels.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_power_of_two(&self) -> bool {
        self.width.is_power_of_two() && self.height.is_power_of_two()
    }

    #[must_use]
    pub fn pixels(&self) -> Option<&[u8]> {
        self.pixels.as_deref()
    }

    /// Drops the CPU-side pixels once nothing else needs to upload them.
    pub(crate) fn release_pixels(&mut self) {
        self.pixels = None;
    }
}

/// Whether a set of images may share a mip chain: every image is
/// power-of-two and all have the same dimensions.
#[must_use]
pub fn mipmap_compatible<'a>(images: impl IntoIterator<Item = &'a Image>) -> bool {
    let mut dims = None;
    for image in images {
        if !image.is_power_of_two() {
            return false;
        }
        match dims {
            None => dims = Some((image.width, image.height)),
            Some(d) if d != (image.width, image.height) => return false,
            Some(_) => {}
        }
    }
    true
}

/// glTF sampler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sampler {
    pub mag_filter: wgpu::FilterMode,
    pub min_filter: wgpu::FilterMode,
    /// `None` disables mipmapped minification.
    pub mipmap_filter: Option<wgpu::FilterMode>,
    pub wrap_s: wgpu::AddressMode,
    pub wrap_t: wgpu::AddressMode,
}

impl Default for Sampler {
    fn default() -> Self {
        Self {
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: Some(wgpu::FilterMode::Linear),
            wrap_s: wgpu::AddressMode::Repeat,
            wrap_t: wgpu::AddressMode::Repeat,
        }
    }
}

impl Sampler {
    /// Builds a sampler from the numeric GL enums stored in glTF.
    #[must_use]
    pub fn from_gl(mag: Option<u32>, min: Option<u32>, wrap_s: Option<u32>, wrap_t: Option<u32>) -> Self {
        fn wrap(code: Option<u32>) -> wgpu::AddressMode {
            match code {
                Some(33071) => wgpu::AddressMode::ClampToEdge,
                Some(33648) => wgpu::AddressMode::MirrorRepeat,
                _ => wgpu::AddressMode::Repeat,
            }
        }

        let mag_filter = match mag {
            Some(9728) => wgpu::FilterMode::Nearest,
            _ => wgpu::FilterMode::Linear,
        };
        let (min_filter, mipmap_filter) = match min {
            Some(9728) => (wgpu::FilterMode::Nearest, None),
            Some(9729) => (wgpu::FilterMode::Linear, None),
            Some(9984) => (wgpu::FilterMode::Nearest, Some(wgpu::FilterMode::Nearest)),
            Some(9985) => (wgpu::FilterMode::Linear, Some(wgpu::FilterMode::Nearest)),
            Some(9986) => (wgpu::FilterMode::Nearest, Some(wgpu::FilterMode::Linear)),
            _ => (wgpu::FilterMode::Linear, Some(wgpu::FilterMode::Linear)),
        };

        Self {
            mag_filter,
            min_filter,
            mipmap_filter,
            wrap_s: wrap(wrap_s),
            wrap_t: wrap(wrap_t),
        }
    }

    /// The state forced onto textures that cannot be mipmapped.
    #[must_use]
    pub fn non_mipmapped(self) -> Self {
        Self {
            mipmap_filter: None,
            wrap_s: wgpu::AddressMode::ClampToEdge,
            wrap_t: wgpu::AddressMode::ClampToEdge,
            ..self
        }
    }
}

/// A texture: one image (2D) or six (cube map) plus an optional sampler.
#[derive(Debug, Clone, Default)]
pub struct Texture {
    pub name: Option<String>,
    pub kind: TextureKind,
    /// Image indices. Cube maps list six faces.
    pub sources: Vec<usize>,
    pub sampler: Option<usize>,
}

impl Texture {
    #[must_use]
    pub fn new_2d(source: usize, sampler: Option<usize>) -> Self {
        Self {
            name: None,
            kind: TextureKind::D2,
            sources: vec![source],
            sampler,
        }
    }

    #[must_use]
    pub fn new_cube(faces: [usize; 6], sampler: Option<usize>) -> Self {
        Self {
            name: None,
            kind: TextureKind::Cube,
            sources: faces.to_vec(),
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampler_from_gl_enums() {
        let s = Sampler::from_gl(Some(9728), Some(9729), Some(33071), Some(33648));
        assert_eq!(s.mag_filter, wgpu::FilterMode::Nearest);
        assert_eq!(s.min_filter, wgpu::FilterMode::Linear);
        assert_eq!(s.mipmap_filter, None);
        assert_eq!(s.wrap_s, wgpu::AddressMode::ClampToEdge);
        assert_eq!(s.wrap_t, wgpu::AddressMode::MirrorRepeat);

        let defaults = Sampler::from_gl(None, None, None, None);
        assert_eq!(defaults, Sampler::default());
    }

    #[test]
    fn released_pixels_are_gone() {
        let mut image = Image::solid([255, 0, 0, 255]);
        assert!(image.is_resident());
        assert_eq!(image.pixels().map(<[u8]>::len), Some(4));
        image.release_pixels();
        assert!(!image.is_resident());
        assert!(image.pixels().is_none());
    }

    #[test]
    fn mip_chains_need_matching_power_of_two_images() {
        let square = |n| Image::new(n, n, wgpu::TextureFormat::Rgba8Unorm, Vec::new());
        assert!(mipmap_compatible(&[square(4), square(4)]));
        assert!(!mipmap_compatible(&[square(4), square(8)]));
        assert!(!mipmap_compatible(&[square(3)]));
    }
}
