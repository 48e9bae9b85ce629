//! glTF 2.0 import into a scene-independent model description.

use super::texture::{ColorSpace, TextureImage};
use super::AssetError;
use crate::scene::{AlphaMode, MeshGeometry, Transform};
use glam::{Quat, Vec3};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ImportedModel {
    pub name: String,
    pub roots: Vec<ImportedNode>,
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
    pub images: Vec<ImportedImage>,
}

#[derive(Debug, Clone)]
pub struct ImportedNode {
    pub name: String,
    pub transform: Transform,
    pub mesh: Option<usize>,
    pub children: Vec<ImportedNode>,
}

#[derive(Debug, Clone)]
pub struct ImportedMesh {
    pub name: String,
    pub primitives: Vec<ImportedPrimitive>,
}

#[derive(Debug, Clone)]
pub struct ImportedPrimitive {
    pub geometry: MeshGeometry,
    /// Index into [`ImportedModel::materials`]; `None` means the glTF default material.
    pub material: Option<usize>,
}

/// Metallic-roughness material. Texture fields index [`ImportedModel::images`].
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedMaterial {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub roughness_factor: f32,
    pub metallic_factor: f32,
    pub double_sided: bool,
    pub alpha_mode: AlphaMode,
}

#[derive(Debug, Clone)]
pub struct ImportedImage {
    pub image: TextureImage,
    pub color_space: ColorSpace,
}

pub fn import_gltf(path: &Path) -> Result<ImportedModel, AssetError> {
    let (document, buffers, images) = gltf::import(path).map_err(|source| AssetError::Gltf {
        path: path.display().to_string(),
        source,
    })?;

    // Base color is the only color-encoded channel we sample.
    let srgb_images: HashSet<usize> = document
        .materials()
        .filter_map(|material| {
            material
                .pbr_metallic_roughness()
                .base_color_texture()
                .map(|info| info.texture().source().index())
        })
        .collect();

    let images = images
        .iter()
        .enumerate()
        .map(|(index, data)| ImportedImage {
            image: convert_image(data),
            color_space: if srgb_images.contains(&index) {
                ColorSpace::Srgb
            } else {
                ColorSpace::Linear
            },
        })
        .collect();

    let materials = document.materials().map(|m| import_material(&m)).collect();

    let mut meshes = Vec::new();
    for mesh in document.meshes() {
        let name = mesh.name().unwrap_or("mesh").to_string();
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping non-triangle primitive in mesh '{}' ({:?})",
                    name,
                    primitive.mode()
                );
                continue;
            }
            primitives.push(ImportedPrimitive {
                geometry: read_geometry(&primitive, &buffers, &name)?,
                material: primitive.material().index(),
            });
        }
        meshes.push(ImportedMesh { name, primitives });
    }

    let roots = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map(|scene| scene.nodes().map(|node| import_node(&node)).collect())
        .unwrap_or_default();

    let name = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("gltf")
        .to_string();

    Ok(ImportedModel {
        name,
        roots,
        meshes,
        materials,
        images,
    })
}

fn import_node(node: &gltf::Node) -> ImportedNode {
    let (translation, rotation, scale) = node.transform().decomposed();
    ImportedNode {
        name: node.name().unwrap_or("node").to_string(),
        transform: Transform {
            position: Vec3::from_array(translation),
            rotation: Quat::from_array(rotation),
            scale: Vec3::from_array(scale),
        },
        mesh: node.mesh().map(|mesh| mesh.index()),
        children: node.children().map(|child| import_node(&child)).collect(),
    }
}

fn import_material(material: &gltf::Material) -> ImportedMaterial {
    let pbr = material.pbr_metallic_roughness();
    let alpha_mode = match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask {
            cutoff: material.alpha_cutoff().unwrap_or(0.5),
        },
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    };
    ImportedMaterial {
        name: material.name().unwrap_or("material").to_string(),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: pbr
            .base_color_texture()
            .map(|info| info.texture().source().index()),
        normal_texture: material
            .normal_texture()
            .map(|info| info.texture().source().index()),
        occlusion_texture: material
            .occlusion_texture()
            .map(|info| info.texture().source().index()),
        metallic_roughness_texture: pbr
            .metallic_roughness_texture()
            .map(|info| info.texture().source().index()),
        roughness_factor: pbr.roughness_factor(),
        metallic_factor: pbr.metallic_factor(),
        double_sided: material.double_sided(),
        alpha_mode,
    }
}

fn read_geometry(
    primitive: &gltf::Primitive,
    buffers: &[gltf::buffer::Data],
    mesh_name: &str,
) -> Result<MeshGeometry, AssetError> {
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or_else(|| AssetError::MissingPositions {
            mesh: mesh_name.to_string(),
        })?
        .collect();
    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..positions.len() as u32).collect(),
    };
    let uvs: Vec<[f32; 2]> = match reader.read_tex_coords(0) {
        Some(coords) => coords.into_f32().collect(),
        None => vec![[0.0, 0.0]; positions.len()],
    };
    let normals: Vec<[f32; 3]> = match reader.read_normals() {
        Some(normals) => normals.collect(),
        None => MeshGeometry::compute_vertex_normals(&positions, &indices),
    };

    Ok(MeshGeometry {
        positions,
        normals,
        uvs,
        indices,
    })
}

fn convert_image(data: &gltf::image::Data) -> TextureImage {
    use gltf::image::Format;

    let (channels, bytes_per_channel) = match data.format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
        #[allow(unreachable_patterns)]
        _ => (4, 1),
    };

    let texel_count = data.width as usize * data.height as usize;
    let stride = channels * bytes_per_channel;
    let mut rgba8 = Vec::with_capacity(texel_count * 4);
    for texel in data.pixels.chunks_exact(stride).take(texel_count) {
        let mut out = [0u8, 0, 0, 255];
        for channel in 0..channels {
            let bytes = &texel[channel * bytes_per_channel..(channel + 1) * bytes_per_channel];
            out[channel] = channel_to_u8(bytes);
        }
        if channels == 1 {
            out[1] = out[0];
            out[2] = out[0];
        }
        rgba8.extend_from_slice(&out);
    }
    // Truncated pixel data still yields a complete image.
    rgba8.resize(texel_count * 4, 255);

    TextureImage {
        width: data.width,
        height: data.height,
        rgba8,
    }
}

fn channel_to_u8(bytes: &[u8]) -> u8 {
    match bytes.len() {
        1 => bytes[0],
        2 => (u16::from_ne_bytes([bytes[0], bytes[1]]) >> 8) as u8,
        4 => {
            let value = f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
        }
        _ => 255,
    }
}
