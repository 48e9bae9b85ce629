//! CPU mirrors of the shader-side buffers, plus the math that fills them.

use super::camera::PerspectiveCamera;
use super::settings::RendererSettings;
use crate::scene::{AlphaMode, DrawItem, LightView, Material, MeshGeometry};
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }

    /// Interleave a geometry's attribute streams. Short streams are padded with defaults.
    pub fn interleave(geometry: &MeshGeometry) -> Vec<Vertex> {
        geometry
            .positions
            .iter()
            .enumerate()
            .map(|(index, position)| Vertex {
                position: *position,
                normal: geometry.normals.get(index).copied().unwrap_or([0.0, 1.0, 0.0]),
                uv: geometry.uvs.get(index).copied().unwrap_or([0.0, 0.0]),
            })
            .collect()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_radiance: [f32; 4],
    pub shadow: [f32; 4],
    pub environment: [f32; 4],
    pub tone: [f32; 4],
    pub modes: [u32; 4],
}

/// What the frame knows about its inputs beyond the camera and settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub light: Option<LightView>,
    pub shadows_active: bool,
    pub environment_levels: Option<u32>,
    pub background_present: bool,
    pub encode_srgb: bool,
}

impl FrameUniforms {
    pub fn new(
        camera: &PerspectiveCamera,
        settings: &RendererSettings,
        inputs: &FrameInputs,
    ) -> Self {
        let view_proj = camera.view_projection();
        let (light_direction, light_radiance, light_view_proj, shadow) = match &inputs.light {
            Some(light) => {
                let radiance = light.color * light.intensity;
                let shadow = if inputs.shadows_active {
                    [
                        1.0,
                        light.shadow.bias,
                        light.shadow.normal_bias,
                        1.0 / light.shadow.map_size.max(1) as f32,
                    ]
                } else {
                    [0.0; 4]
                };
                (
                    light.direction().extend(0.0).to_array(),
                    radiance.extend(0.0).to_array(),
                    light_view_projection(light),
                    shadow,
                )
            }
            None => ([0.0, 1.0, 0.0, 0.0], [0.0; 4], Mat4::IDENTITY, [0.0; 4]),
        };

        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            light_view_proj: light_view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).to_array(),
            light_direction,
            light_radiance,
            shadow,
            environment: [
                if inputs.environment_levels.is_some() { 1.0 } else { 0.0 },
                inputs.environment_levels.unwrap_or(1) as f32,
                if inputs.background_present { 1.0 } else { 0.0 },
                0.0,
            ],
            tone: [settings.tone_mapping_exposure, 0.0, 0.0, 0.0],
            modes: [
                settings.tone_mapping.shader_index(),
                u32::from(inputs.encode_srgb),
                0,
                0,
            ],
        }
    }
}

/// Orthographic projection looking from the light position at its target.
pub fn light_view_projection(light: &LightView) -> Mat4 {
    let forward = (light.target - light.position)
        .try_normalize()
        .unwrap_or(Vec3::NEG_Y);
    let up = if forward.abs().dot(Vec3::Y) > 0.99 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let view = Mat4::look_at_rh(light.position, light.target, up);
    let extent = light.shadow.camera_half_extent;
    let projection = Mat4::orthographic_rh(
        -extent,
        extent,
        -extent,
        extent,
        light.shadow.camera_near,
        light.shadow.camera_far,
    );
    projection * view
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub base_color: [f32; 4],
    pub params: [f32; 4],
    pub flags: [u32; 4],
}

impl MaterialUniforms {
    pub fn from_material(material: &Material) -> Self {
        match material {
            Material::Standard(standard) => {
                let (alpha_mode, cutoff) = alpha_flags(standard.alpha_mode);
                Self {
                    base_color: standard.base_color_factor,
                    params: [
                        standard.roughness,
                        standard.metalness,
                        standard.env_map_intensity,
                        cutoff,
                    ],
                    flags: [alpha_mode, u32::from(standard.normal.is_some()), 0, 0],
                }
            }
            Material::Basic(basic) => Self {
                base_color: basic.color,
                params: [1.0, 0.0, 0.0, 0.0],
                flags: [0, 0, 1, 0],
            },
        }
    }
}

fn alpha_flags(mode: AlphaMode) -> (u32, f32) {
    match mode {
        AlphaMode::Opaque => (0, 0.0),
        AlphaMode::Mask { cutoff } => (1, cutoff),
        AlphaMode::Blend => (2, 0.0),
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ObjectUniforms {
    pub model: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub flags: [u32; 4],
}

impl ObjectUniforms {
    pub fn from_draw(draw: &DrawItem) -> Self {
        Self {
            model: draw.world.to_cols_array_2d(),
            normal_matrix: draw.world.inverse().transpose().to_cols_array_2d(),
            flags: [u32::from(draw.receive_shadow), 0, 0, 0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LightCameraUniforms {
    pub view_proj: [[f32; 4]; 4],
}
