//! Bind group layouts and render pipelines.

use super::uniforms::{LightCameraUniforms, ObjectUniforms, Vertex};
use std::num::NonZeroU64;
use wgpu::{BindGroupLayout, Device, RenderPipeline, TextureFormat};

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

const COMMON_SOURCE: &str = include_str!("shaders/common.wgsl");
const PBR_SOURCE: &str = include_str!("shaders/pbr.wgsl");
const SKY_SOURCE: &str = include_str!("shaders/sky.wgsl");
const SHADOW_SOURCE: &str = include_str!("shaders/shadow.wgsl");

pub struct Layouts {
    pub frame: BindGroupLayout,
    pub material: BindGroupLayout,
    pub object: BindGroupLayout,
    pub light_camera: BindGroupLayout,
}

impl Layouts {
    pub fn new(device: &Device) -> Self {
        let frame = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX_FRAGMENT, false, None),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                texture_entry(3, false),
                texture_entry(4, false),
            ],
        });

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("material_layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::FRAGMENT, false, None),
                texture_entry(1, true),
                texture_entry(2, true),
                texture_entry(3, true),
                texture_entry(4, true),
                texture_entry(5, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let object = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object_layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                true,
                NonZeroU64::new(std::mem::size_of::<ObjectUniforms>() as u64),
            )],
        });

        let light_camera = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("light_camera_layout"),
            entries: &[uniform_entry(
                0,
                wgpu::ShaderStages::VERTEX,
                false,
                NonZeroU64::new(std::mem::size_of::<LightCameraUniforms>() as u64),
            )],
        });

        Self {
            frame,
            material,
            object,
            light_camera,
        }
    }
}

fn uniform_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    has_dynamic_offset: bool,
    min_binding_size: Option<NonZeroU64>,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Face culling and blending combination of a lit draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PbrVariant {
    pub double_sided: bool,
    pub blended: bool,
}

impl PbrVariant {
    const ALL: [PbrVariant; 4] = [
        PbrVariant { double_sided: false, blended: false },
        PbrVariant { double_sided: true, blended: false },
        PbrVariant { double_sided: false, blended: true },
        PbrVariant { double_sided: true, blended: true },
    ];

    fn index(self) -> usize {
        usize::from(self.double_sided) + 2 * usize::from(self.blended)
    }
}

pub struct Pipelines {
    pbr: Vec<RenderPipeline>,
    pub sky: RenderPipeline,
    pub shadow: RenderPipeline,
}

impl Pipelines {
    pub fn new(
        device: &Device,
        layouts: &Layouts,
        color_format: TextureFormat,
        sample_count: u32,
    ) -> Self {
        let pbr_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pbr_shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{COMMON_SOURCE}\n{PBR_SOURCE}").into()),
        });
        let sky_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sky_shader"),
            source: wgpu::ShaderSource::Wgsl(format!("{COMMON_SOURCE}\n{SKY_SOURCE}").into()),
        });
        let shadow_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shadow_shader"),
            source: wgpu::ShaderSource::Wgsl(SHADOW_SOURCE.into()),
        });

        let pbr_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pbr_pipeline_layout"),
            bind_group_layouts: &[&layouts.frame, &layouts.material, &layouts.object],
            push_constant_ranges: &[],
        });
        let pbr = PbrVariant::ALL
            .iter()
            .map(|variant| {
                create_pbr_pipeline(
                    device,
                    &pbr_layout,
                    &pbr_shader,
                    *variant,
                    color_format,
                    sample_count,
                )
            })
            .collect();

        let sky = create_sky_pipeline(device, layouts, &sky_shader, color_format, sample_count);
        let shadow = create_shadow_pipeline(device, layouts, &shadow_shader);

        Self { pbr, sky, shadow }
    }

    pub fn pbr(&self, variant: PbrVariant) -> &RenderPipeline {
        &self.pbr[variant.index()]
    }
}

fn multisample(sample_count: u32) -> wgpu::MultisampleState {
    wgpu::MultisampleState {
        count: sample_count,
        mask: !0,
        alpha_to_coverage_enabled: false,
    }
}

fn create_pbr_pipeline(
    device: &Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    variant: PbrVariant,
    color_format: TextureFormat,
    sample_count: u32,
) -> RenderPipeline {
    let label = format!(
        "pbr_pipeline{}{}",
        if variant.double_sided { "_double_sided" } else { "" },
        if variant.blended { "_blended" } else { "" }
    );
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: variant.blended.then_some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: if variant.double_sided {
                None
            } else {
                Some(wgpu::Face::Back)
            },
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: !variant.blended,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: multisample(sample_count),
        multiview: None,
        cache: None,
    })
}

fn create_sky_pipeline(
    device: &Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
    color_format: TextureFormat,
    sample_count: u32,
) -> RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("sky_pipeline_layout"),
        bind_group_layouts: &[&layouts.frame],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("sky_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: false,
            depth_compare: wgpu::CompareFunction::Always,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: multisample(sample_count),
        multiview: None,
        cache: None,
    })
}

fn create_shadow_pipeline(
    device: &Device,
    layouts: &Layouts,
    shader: &wgpu::ShaderModule,
) -> RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("shadow_pipeline_layout"),
        bind_group_layouts: &[&layouts.light_camera, &layouts.object],
        push_constant_ranges: &[],
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("shadow_pipeline"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            buffers: &[Vertex::desc()],
            compilation_options: Default::default(),
        },
        fragment: None,
        primitive: wgpu::PrimitiveState {
            cull_mode: None,
            ..wgpu::PrimitiveState::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: SHADOW_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState {
                constant: 2,
                slope_scale: 2.0,
                clamp: 0.0,
            },
        }),
        multisample: multisample(1),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::PbrVariant;

    #[test]
    fn pbr_variants_have_distinct_slots() {
        let mut slots: Vec<usize> = PbrVariant::ALL.iter().map(|v| v.index()).collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }
}
