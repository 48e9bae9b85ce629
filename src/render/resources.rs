//! GPU-side copies of scene data: textures with mip chains, environment maps, meshes and
//! the render targets that follow the surface size.

use super::pipeline::{DEPTH_FORMAT, SHADOW_FORMAT};
use super::uniforms::Vertex;
use crate::assets::{ColorSpace, EnvironmentLevel, EnvironmentMap, TextureImage};
use crate::scene::MeshGeometry;
use image::imageops::FilterType;
use image::{ImageBuffer, Rgba};
use wgpu::util::DeviceExt;

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// One mip level of 8-bit RGBA pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct MipLevel {
    pub width: u32,
    pub height: u32,
    pub rgba8: Vec<u8>,
}

pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Full chain down to 1x1, each level filtered from the one above it.
pub fn mip_chain(image: &TextureImage) -> Vec<MipLevel> {
    let mut levels = vec![MipLevel {
        width: image.width.max(1),
        height: image.height.max(1),
        rgba8: image.rgba8.clone(),
    }];
    let count = mip_level_count(image.width, image.height);
    for _ in 1..count {
        let Some(previous) = levels.last() else {
            break;
        };
        let width = (previous.width / 2).max(1);
        let height = (previous.height / 2).max(1);
        let Some(source) = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(
            previous.width,
            previous.height,
            &previous.rgba8,
        ) else {
            log::warn!(
                "Texture data does not match {}x{}; mip chain truncated",
                previous.width,
                previous.height
            );
            break;
        };
        let resized = image::imageops::resize(&source, width, height, FilterType::Triangle);
        levels.push(MipLevel {
            width,
            height,
            rgba8: resized.into_raw(),
        });
    }
    levels
}

pub fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    image: &TextureImage,
    color_space: ColorSpace,
) -> GpuTexture {
    let levels = mip_chain(image);
    let format = match color_space {
        ColorSpace::Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        ColorSpace::Linear => wgpu::TextureFormat::Rgba8Unorm,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: levels[0].width,
            height: levels[0].height,
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len() as u32,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (mip, level) in levels.iter().enumerate() {
        write_level(queue, &texture, mip as u32, level.width, level.height, 4, &level.rgba8);
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

/// Uploads every level of the reflection chain as RGBA32F mips.
pub fn upload_environment(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    map: &EnvironmentMap,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: map.width().max(1),
            height: map.height().max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: map.level_count().max(1),
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (mip, level) in map.levels.iter().enumerate() {
        write_level(
            queue,
            &texture,
            mip as u32,
            level.width,
            level.height,
            16,
            bytemuck::cast_slice(&level.rgba32f),
        );
    }
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture { texture, view }
}

fn write_level(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    mip_level: u32,
    width: u32,
    height: u32,
    bytes_per_texel: u32,
    data: &[u8],
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * bytes_per_texel),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Stand-ins bound while a texture is pending, failed or simply absent.
pub struct Fallbacks {
    pub white: GpuTexture,
    pub flat_normal: GpuTexture,
    pub black_environment: GpuTexture,
}

impl Fallbacks {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let black = EnvironmentMap::from_base_level(EnvironmentLevel {
            width: 1,
            height: 1,
            rgba32f: vec![0.0, 0.0, 0.0, 1.0],
        });
        Self {
            white: upload_texture(
                device,
                queue,
                "fallback_white",
                &TextureImage::solid([255, 255, 255, 255]),
                ColorSpace::Linear,
            ),
            flat_normal: upload_texture(
                device,
                queue,
                "fallback_normal",
                &TextureImage::solid([128, 128, 255, 255]),
                ColorSpace::Linear,
            ),
            black_environment: upload_environment(device, queue, "fallback_environment", &black),
        }
    }
}

pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    /// `None` for geometry with nothing to draw.
    pub fn new(device: &wgpu::Device, label: &str, geometry: &MeshGeometry) -> Option<Self> {
        if geometry.vertex_count() == 0 {
            return None;
        }
        let vertices = Vertex::interleave(geometry);
        let indices = draw_indices(geometry);
        if indices.is_empty() {
            return None;
        }
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Some(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }
}

/// Index list for a draw: the geometry's own, or sequential triangles when it has none.
/// Trailing indices that do not form a whole triangle are dropped.
pub fn draw_indices(geometry: &MeshGeometry) -> Vec<u32> {
    let mut indices = if geometry.indices.is_empty() {
        (0..geometry.positions.len() as u32).collect()
    } else {
        geometry.indices.clone()
    };
    indices.truncate(indices.len() - indices.len() % 3);
    indices
}

pub struct ShadowMap {
    pub size: u32,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl ShadowMap {
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let size = size.clamp(1, device.limits().max_texture_dimension_2d);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow_map"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            size,
            texture,
            view,
        }
    }
}

/// Depth buffer plus, when multisampling, the color buffer that resolves into the surface.
pub struct FrameTargets {
    pub width: u32,
    pub height: u32,
    pub depth: wgpu::TextureView,
    pub msaa_color: Option<wgpu::TextureView>,
}

impl FrameTargets {
    pub fn new(
        device: &wgpu::Device,
        width: u32,
        height: u32,
        color_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let depth = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("depth_target"),
                size,
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        let msaa_color = (sample_count > 1).then(|| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("msaa_color_target"),
                    size,
                    mip_level_count: 1,
                    sample_count,
                    dimension: wgpu::TextureDimension::D2,
                    format: color_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });
        Self {
            width: size.width,
            height: size.height,
            depth,
            msaa_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{draw_indices, mip_chain, mip_level_count};
    use crate::assets::TextureImage;
    use crate::scene::MeshGeometry;

    #[test]
    fn mip_count_follows_the_longest_side() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1000, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let image = TextureImage {
            width: 4,
            height: 2,
            rgba8: [200u8, 100, 50, 255].repeat(8),
        };
        let chain = mip_chain(&image);
        let sizes: Vec<(u32, u32)> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(4, 2), (2, 1), (1, 1)]);
        for level in &chain {
            assert_eq!(level.rgba8.len(), (level.width * level.height * 4) as usize);
        }
        // A uniform image stays uniform through filtering.
        assert_eq!(&chain[2].rgba8, &[200, 100, 50, 255]);
    }

    #[test]
    fn short_texture_data_truncates_the_chain() {
        let image = TextureImage {
            width: 4,
            height: 4,
            rgba8: vec![0; 8],
        };
        assert_eq!(mip_chain(&image).len(), 1);
    }

    #[test]
    fn unindexed_geometry_draws_whole_triangles() {
        let geometry = MeshGeometry {
            positions: vec![[0.0; 3]; 7],
            normals: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
        };
        assert_eq!(draw_indices(&geometry), vec![0, 1, 2, 3, 4, 5]);

        let plane = MeshGeometry::plane(1.0, 1.0);
        assert_eq!(draw_indices(&plane), plane.indices);
    }
}
