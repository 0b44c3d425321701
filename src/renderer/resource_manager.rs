//! GPU Resource Manager
//!
//! Lazily creates the GPU objects a document needs and keeps them keyed by
//! `(DocumentId, table index)`:
//!
//! - vertex buffers, one per attribute accessor
//! - index buffers, one per index accessor (8-bit indices widened to 16-bit)
//! - textures, one per document texture
//!
//! Every object is created on first request and reused afterwards. Requests
//! that fail (missing accessor, undecodable data, evicted pixels) are
//! remembered so they are reported once and never retried. GPU objects live
//! until [`ResourceManager::unload`] drops a document or
//! [`ResourceManager::destroy`] drops everything.

use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::document::{Document, DocumentId};
use crate::renderer::device::{
    BufferId, BufferTarget, GpuDevice, ImageData, TextureDescriptor, TextureId,
    VertexAttributeLayout,
};
use crate::resources::{AccessorData, ComponentType, Sampler, TextureKind, mipmap_compatible};

type ResourceKey = (DocumentId, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ResourceKind {
    Vertex,
    Index,
    Texture,
}

/// A vertex stream ready for `enable_vertex_attribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBuffer {
    pub buffer: BufferId,
    pub layout: VertexAttributeLayout,
}

/// An index stream ready for `draw_elements`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBuffer {
    pub buffer: BufferId,
    pub format: wgpu::IndexFormat,
    pub count: u32,
}

#[derive(Default)]
pub struct ResourceManager {
    vertex_buffers: FxHashMap<ResourceKey, VertexBuffer>,
    index_buffers: FxHashMap<ResourceKey, IndexBuffer>,
    textures: FxHashMap<ResourceKey, TextureId>,
    failed: FxHashSet<(DocumentId, ResourceKind, usize)>,
}

impl ResourceManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Vertex and index buffers
    // ========================================================================

    /// Buffer holding the contents of attribute accessor `accessor`.
    pub fn vertex_buffer(
        &mut self,
        device: &mut impl GpuDevice,
        document: &Document,
        accessor: usize,
    ) -> Option<VertexBuffer> {
        let key = (document.id(), accessor);
        if let Some(entry) = self.vertex_buffers.get(&key) {
            return Some(*entry);
        }
        if self.failed.contains(&(key.0, ResourceKind::Vertex, accessor)) {
            return None;
        }

        let reader = document.reader();
        let created = reader.accessor(accessor).and_then(|desc| {
            let data = reader.data(accessor)?;
            let buffer = device.create_buffer(BufferTarget::Vertex, data.as_bytes())?;
            Ok(VertexBuffer {
                buffer,
                layout: VertexAttributeLayout {
                    components: desc.element_type.components() as u8,
                    component_type: desc.component_type,
                    normalized: desc.normalized,
                    stride: 0,
                    offset: 0,
                },
            })
        });

        match created {
            Ok(entry) => {
                debug!("Created vertex buffer for accessor {accessor}");
                self.vertex_buffers.insert(key, entry);
                Some(entry)
            }
            Err(err) => {
                warn!("Vertex buffer for accessor {accessor} unavailable: {err}");
                self.failed.insert((key.0, ResourceKind::Vertex, accessor));
                None
            }
        }
    }

    /// Buffer holding index accessor `accessor`. 8-bit indices are widened
    /// to 16-bit on upload.
    pub fn index_buffer(
        &mut self,
        device: &mut impl GpuDevice,
        document: &Document,
        accessor: usize,
    ) -> Option<IndexBuffer> {
        let key = (document.id(), accessor);
        if let Some(entry) = self.index_buffers.get(&key) {
            return Some(*entry);
        }
        if self.failed.contains(&(key.0, ResourceKind::Index, accessor)) {
            return None;
        }

        let created = document.reader().data(accessor).and_then(|data| {
            let (bytes, format) = match data {
                AccessorData::U8(v) => {
                    let widened: Vec<u16> = v.iter().map(|&i| u16::from(i)).collect();
                    (bytemuck::cast_slice(&widened).to_vec(), wgpu::IndexFormat::Uint16)
                }
                AccessorData::U16(_) => (data.as_bytes().to_vec(), wgpu::IndexFormat::Uint16),
                AccessorData::U32(_) => (data.as_bytes().to_vec(), wgpu::IndexFormat::Uint32),
                other => {
                    return Err(crate::errors::KilnError::InvalidAccessor {
                        accessor,
                        reason: format!("{:?} cannot be used as indices", component_of(other)),
                    });
                }
            };
            let buffer = device.create_buffer(BufferTarget::Index, &bytes)?;
            Ok(IndexBuffer {
                buffer,
                format,
                count: data.len() as u32,
            })
        });

        match created {
            Ok(entry) => {
                debug!("Created index buffer for accessor {accessor} ({} indices)", entry.count);
                self.index_buffers.insert(key, entry);
                Some(entry)
            }
            Err(err) => {
                warn!("Index buffer for accessor {accessor} unavailable: {err}");
                self.failed.insert((key.0, ResourceKind::Index, accessor));
                None
            }
        }
    }

    // ========================================================================
    // Textures
    // ========================================================================

    /// GPU texture for document texture `index`.
    ///
    /// The first call uploads the referenced images. An image's CPU pixels
    /// are dropped once every texture that references it has been uploaded
    /// or has failed. Mipmaps are generated only when every image is
    /// power-of-two and all share the same dimensions; otherwise the sampler
    /// is forced to non-mipmapped clamp-to-edge.
    pub fn texture(
        &mut self,
        device: &mut impl GpuDevice,
        document: &mut Document,
        index: usize,
    ) -> Option<TextureId> {
        let key = (document.id(), index);
        if let Some(&texture) = self.textures.get(&key) {
            return Some(texture);
        }
        if self.failed.contains(&(key.0, ResourceKind::Texture, index)) {
            return None;
        }

        let result = upload_texture(device, document, index);
        let texture = match result {
            Ok(texture) => {
                debug!("Uploaded texture {index}");
                self.textures.insert(key, texture);
                Some(texture)
            }
            Err(reason) => {
                warn!("Texture {index} unavailable: {reason}");
                self.failed.insert((key.0, ResourceKind::Texture, index));
                None
            }
        };
        self.release_uploaded_images(document, index);
        texture
    }

    /// Drops the pixels of `index`'s images that no pending texture needs.
    fn release_uploaded_images(&self, document: &mut Document, index: usize) {
        let id = document.id();
        let Some(sources) = document.textures.get(index).map(|t| t.sources.clone()) else {
            return;
        };

        for source in sources {
            let pending = document.textures.iter().enumerate().any(|(other, texture)| {
                texture.sources.contains(&source)
                    && !self.textures.contains_key(&(id, other))
                    && !self.failed.contains(&(id, ResourceKind::Texture, other))
            });
            if !pending && let Some(image) = document.images.get_mut(source) {
                image.release_pixels();
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Releases every GPU object created for `document`.
    pub fn unload(&mut self, device: &mut impl GpuDevice, document: DocumentId) {
        let mut released = 0usize;
        self.vertex_buffers.retain(|&(doc, _), entry| {
            let keep = doc != document;
            if !keep {
                device.delete_buffer(entry.buffer);
                released += 1;
            }
            keep
        });
        self.index_buffers.retain(|&(doc, _), entry| {
            let keep = doc != document;
            if !keep {
                device.delete_buffer(entry.buffer);
                released += 1;
            }
            keep
        });
        self.textures.retain(|&(doc, _), &mut texture| {
            let keep = doc != document;
            if !keep {
                device.delete_texture(texture);
                released += 1;
            }
            keep
        });
        self.failed.retain(|&(doc, _, _)| doc != document);
        debug!("Unloaded document {document:?}: released {released} GPU objects");
    }

    /// Releases everything.
    pub fn destroy(&mut self, device: &mut impl GpuDevice) {
        for (_, entry) in self.vertex_buffers.drain() {
            device.delete_buffer(entry.buffer);
        }
        for (_, entry) in self.index_buffers.drain() {
            device.delete_buffer(entry.buffer);
        }
        for (_, texture) in self.textures.drain() {
            device.delete_texture(texture);
        }
        self.failed.clear();
    }

    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.vertex_buffers.len() + self.index_buffers.len()
    }

    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

fn component_of(data: &AccessorData) -> ComponentType {
    match data {
        AccessorData::I8(_) => ComponentType::I8,
        AccessorData::U8(_) => ComponentType::U8,
        AccessorData::I16(_) => ComponentType::I16,
        AccessorData::U16(_) => ComponentType::U16,
        AccessorData::U32(_) => ComponentType::U32,
        AccessorData::F32(_) => ComponentType::F32,
    }
}

fn upload_texture(
    device: &mut impl GpuDevice,
    document: &Document,
    index: usize,
) -> std::result::Result<TextureId, String> {
    let texture = document
        .textures
        .get(index)
        .ok_or_else(|| "index out of range".to_string())?;
    let sampler = match texture.sampler {
        Some(s) => *document
            .samplers
            .get(s)
            .ok_or_else(|| format!("sampler {s} out of range"))?,
        None => Sampler::default(),
    };

    let expected = match texture.kind {
        TextureKind::D2 => 1,
        TextureKind::Cube => 6,
    };
    if texture.sources.len() != expected {
        return Err(format!(
            "expected {expected} source images, found {}",
            texture.sources.len()
        ));
    }

    let mut images = Vec::with_capacity(expected);
    let mut faces = Vec::with_capacity(expected);
    for &source in &texture.sources {
        let image = document
            .images
            .get(source)
            .ok_or_else(|| format!("image {source} out of range"))?;
        let pixels = image
            .pixels()
            .ok_or_else(|| format!("image {source} pixels were already released"))?;
        faces.push(ImageData {
            width: image.width,
            height: image.height,
            format: image.format,
            pixels,
        });
        images.push(image);
    }
    let Some(first) = images.first() else {
        return Err("no source images".to_string());
    };

    let mipmappable = mipmap_compatible(images.iter().copied());
    let sampler = if mipmappable { sampler } else { sampler.non_mipmapped() };

    let desc = TextureDescriptor {
        kind: texture.kind,
        width: first.width,
        height: first.height,
        format: first.format,
        generate_mipmaps: mipmappable && sampler.mipmap_filter.is_some(),
        sampler,
    };
    device.create_texture(&desc, &faces).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::headless::HeadlessDevice;
    use crate::resources::{ElementType, Image, Texture};

    fn document_with_images(sizes: &[(u32, u32)]) -> Document {
        let mut document = Document::new();
        for &(w, h) in sizes {
            let pixels = vec![255; (w * h * 4) as usize];
            document
                .images
                .push(Image::new(w, h, wgpu::TextureFormat::Rgba8Unorm, pixels));
        }
        document
    }

    #[test]
    fn vertex_buffers_are_created_once() {
        let mut device = HeadlessDevice::default();
        let mut document = Document::new();
        let accessor = document.push_f32_accessor(&[0.0; 9], ElementType::Vec3);
        let mut manager = ResourceManager::new();

        let first = manager.vertex_buffer(&mut device, &document, accessor).unwrap();
        let second = manager.vertex_buffer(&mut device, &document, accessor).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.layout.components, 3);
        assert_eq!(device.live_buffers(), 1);
    }

    #[test]
    fn u8_indices_are_widened() {
        let mut device = HeadlessDevice::default();
        let mut document = Document::new();
        let buffer = document.buffers.len();
        document.buffers.push(crate::resources::Buffer::new(vec![0, 1, 2]));
        document.buffer_views.push(crate::resources::BufferView {
            buffer,
            byte_offset: 0,
            byte_length: 3,
            byte_stride: None,
        });
        document.accessors.push(crate::resources::Accessor::new(
            Some(0),
            ComponentType::U8,
            ElementType::Scalar,
            3,
        ));
        let mut manager = ResourceManager::new();

        let indices = manager.index_buffer(&mut device, &document, 0).unwrap();
        assert_eq!(indices.format, wgpu::IndexFormat::Uint16);
        assert_eq!(indices.count, 3);
    }

    #[test]
    fn missing_accessor_fails_once() {
        let mut device = HeadlessDevice::default();
        let document = Document::new();
        let mut manager = ResourceManager::new();

        assert!(manager.vertex_buffer(&mut device, &document, 7).is_none());
        assert!(manager.vertex_buffer(&mut device, &document, 7).is_none());
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn non_power_of_two_disables_mipmaps() {
        let mut device = HeadlessDevice::default();
        let mut document = document_with_images(&[(3, 5)]);
        document.textures.push(Texture::new_2d(0, None));
        let mut manager = ResourceManager::new();

        let id = manager.texture(&mut device, &mut document, 0).unwrap();
        let desc = device.texture(id).unwrap();
        assert!(!desc.generate_mipmaps);
        assert_eq!(desc.sampler.wrap_s, wgpu::AddressMode::ClampToEdge);
        assert!(!document.images[0].is_resident());
    }

    #[test]
    fn mismatched_cube_faces_disable_mipmaps() {
        let mut device = HeadlessDevice::default();
        let mut document =
            document_with_images(&[(4, 4), (4, 4), (4, 4), (4, 4), (4, 4), (8, 8)]);
        document.textures.push(Texture::new_cube([0, 1, 2, 3, 4, 5], None));
        let mut manager = ResourceManager::new();

        let id = manager.texture(&mut device, &mut document, 0).unwrap();
        assert!(!device.texture(id).unwrap().generate_mipmaps);
    }

    #[test]
    fn matching_power_of_two_images_keep_mipmaps_and_wrap() {
        let mut device = HeadlessDevice::default();
        let mut document = document_with_images(&[(4, 4); 6]);
        let sampler = Sampler::from_gl(None, None, Some(33648), Some(33071));
        document.samplers.push(sampler);
        document.textures.push(Texture::new_cube([0, 1, 2, 3, 4, 5], Some(0)));
        let mut manager = ResourceManager::new();

        let id = manager.texture(&mut device, &mut document, 0).unwrap();
        let desc = device.texture(id).unwrap();
        assert!(desc.generate_mipmaps);
        assert_eq!(desc.sampler, sampler);
    }

    #[test]
    fn textures_sharing_an_image_both_upload() {
        let mut device = HeadlessDevice::default();
        let mut document = document_with_images(&[(4, 4)]);
        document.samplers.push(Sampler::default().non_mipmapped());
        document.textures.push(Texture::new_2d(0, None));
        document.textures.push(Texture::new_2d(0, Some(0)));
        let mut manager = ResourceManager::new();

        assert!(manager.texture(&mut device, &mut document, 0).is_some());
        assert!(document.images[0].is_resident());

        let second = manager.texture(&mut device, &mut document, 1).unwrap();
        assert!(!device.texture(second).unwrap().generate_mipmaps);
        assert!(!document.images[0].is_resident());
        assert_eq!(device.live_textures(), 2);
    }

    #[test]
    fn failed_creation_keeps_pixels_for_other_textures() {
        let mut device = HeadlessDevice::default();
        let mut document = document_with_images(&[(4, 4)]);
        document.textures.push(Texture::new_2d(0, None));
        document.textures.push(Texture::new_2d(0, None));
        let mut manager = ResourceManager::new();

        device.set_texture_budget(Some(0));
        assert!(manager.texture(&mut device, &mut document, 0).is_none());
        assert!(document.images[0].is_resident());

        device.set_texture_budget(None);
        assert!(manager.texture(&mut device, &mut document, 0).is_none());
        assert!(manager.texture(&mut device, &mut document, 1).is_some());
        assert!(!document.images[0].is_resident());
    }

    #[test]
    fn unload_releases_only_that_document() {
        let mut device = HeadlessDevice::default();
        let mut a = document_with_images(&[(2, 2)]);
        a.textures.push(Texture::new_2d(0, None));
        let mut b = document_with_images(&[(2, 2)]);
        b.textures.push(Texture::new_2d(0, None));
        let mut manager = ResourceManager::new();

        manager.texture(&mut device, &mut a, 0).unwrap();
        manager.texture(&mut device, &mut b, 0).unwrap();
        assert_eq!(device.live_textures(), 2);

        manager.unload(&mut device, a.id());
        assert_eq!(device.live_textures(), 1);
        assert_eq!(manager.texture_count(), 1);
    }
}
