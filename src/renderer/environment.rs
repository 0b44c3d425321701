//! Image-based lighting inputs.
//!
//! The environment is owned by the renderer, not by a document: hosts decode
//! and prefilter the maps themselves and hand the images over once through
//! [`Environment::upload`].

use log::warn;

use crate::errors::{KilnError, Result};
use crate::renderer::device::{GpuDevice, ImageData, TextureDescriptor, TextureId};
use crate::resources::{Image, Sampler, TextureKind, mipmap_compatible};

/// Decoded environment images, cube faces in +X, -X, +Y, -Y, +Z, -Z order.
#[derive(Debug, Clone)]
pub struct EnvironmentImages {
    /// Lambertian (irradiance) cube.
    pub diffuse: [Image; 6],
    /// GGX prefiltered cube.
    pub specular: [Image; 6],
    pub specular_mip_count: u32,
    /// GGX BRDF lookup table.
    pub brdf_lut: Image,
    pub sheen: Option<SheenImages>,
}

/// Charlie-prefiltered cube and its lookup table.
#[derive(Debug, Clone)]
pub struct SheenImages {
    pub cube: [Image; 6],
    pub mip_count: u32,
    pub lut: Image,
}

/// Environment textures resident on the GPU.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Environment {
    pub diffuse: TextureId,
    pub specular: TextureId,
    pub brdf_lut: TextureId,
    pub sheen: Option<(TextureId, TextureId)>,
    /// Mip count of the prefiltered cube(s), uploaded as `u_MipCount`.
    pub mip_count: u32,
}

impl Environment {
    /// Uploads every environment image.
    ///
    /// When both a specular and a sheen cube are given and their mip counts
    /// differ, a warning is logged and the sheen count wins. If any upload
    /// fails, the textures created so far are deleted.
    pub fn upload(device: &mut impl GpuDevice, images: EnvironmentImages) -> Result<Self> {
        let mut created = Vec::new();
        let result = upload_all(device, &images, &mut created);
        if result.is_err() {
            for texture in created {
                device.delete_texture(texture);
            }
        }
        result
    }

    pub fn destroy(self, device: &mut impl GpuDevice) {
        device.delete_texture(self.diffuse);
        device.delete_texture(self.specular);
        device.delete_texture(self.brdf_lut);
        if let Some((cube, lut)) = self.sheen {
            device.delete_texture(cube);
            device.delete_texture(lut);
        }
    }
}

fn upload_all(
    device: &mut impl GpuDevice,
    images: &EnvironmentImages,
    created: &mut Vec<TextureId>,
) -> Result<Environment> {
    let cube_sampler = Sampler {
        wrap_s: wgpu::AddressMode::ClampToEdge,
        wrap_t: wgpu::AddressMode::ClampToEdge,
        ..Sampler::default()
    };
    let lut_sampler = Sampler::default().non_mipmapped();

    let diffuse = upload_faces(
        device,
        TextureKind::Cube,
        &images.diffuse,
        cube_sampler.non_mipmapped(),
        created,
    )?;
    let specular = upload_faces(device, TextureKind::Cube, &images.specular, cube_sampler, created)?;
    let brdf_lut = upload_faces(
        device,
        TextureKind::D2,
        std::slice::from_ref(&images.brdf_lut),
        lut_sampler,
        created,
    )?;

    let mut mip_count = images.specular_mip_count;
    let sheen = match &images.sheen {
        Some(sheen) => {
            if sheen.mip_count != mip_count {
                warn!(
                    "Sheen environment has {} mips but specular has {mip_count}; using {}",
                    sheen.mip_count, sheen.mip_count
                );
            }
            mip_count = sheen.mip_count;
            let cube = upload_faces(device, TextureKind::Cube, &sheen.cube, cube_sampler, created)?;
            let lut = upload_faces(
                device,
                TextureKind::D2,
                std::slice::from_ref(&sheen.lut),
                lut_sampler,
                created,
            )?;
            Some((cube, lut))
        }
        None => None,
    };

    Ok(Environment {
        diffuse,
        specular,
        brdf_lut,
        sheen,
        mip_count,
    })
}

/// Uploads one texture and records it in `created`. Images that cannot
/// share a mip chain fall back to non-mipmapped clamp-to-edge sampling.
fn upload_faces(
    device: &mut impl GpuDevice,
    kind: TextureKind,
    images: &[Image],
    sampler: Sampler,
    created: &mut Vec<TextureId>,
) -> Result<TextureId> {
    let first = images
        .first()
        .ok_or_else(|| KilnError::Device("environment texture without images".to_string()))?;
    let faces: Vec<ImageData<'_>> = images
        .iter()
        .map(|image| ImageData {
            width: image.width,
            height: image.height,
            format: image.format,
            pixels: image.pixels().unwrap_or_default(),
        })
        .collect();

    let sampler = if mipmap_compatible(images) {
        sampler
    } else {
        sampler.non_mipmapped()
    };
    let desc = TextureDescriptor {
        kind,
        width: first.width,
        height: first.height,
        format: first.format,
        generate_mipmaps: sampler.mipmap_filter.is_some(),
        sampler,
    };
    let texture = device.create_texture(&desc, &faces)?;
    created.push(texture);
    Ok(texture)
}
