pub mod camera;
mod egui_overlay;
mod pipeline;
mod resources;
mod settings;
mod uniforms;

pub use egui_overlay::EguiFrameOutput;
pub use settings::{RendererSettings, ToneMapping};

use crate::app::viewport::OutputSurface;
use crate::assets::{EnvironmentMap, TextureHandle};
use crate::scene::{AlphaMode, DrawItem, GeometryId, Material, MaterialId, MaterialLibrary, Scene};
use camera::PerspectiveCamera;
use egui_overlay::EguiOverlay;
use glam::Vec3;
use pipeline::{Layouts, PbrVariant, Pipelines};
use resources::{Fallbacks, FrameTargets, GpuMesh, GpuTexture, ShadowMap};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use uniforms::{
    light_view_projection, FrameInputs, FrameUniforms, LightCameraUniforms, MaterialUniforms,
    ObjectUniforms,
};
use wgpu::util::DeviceExt;
use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error("failed to request device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    UnsupportedSurface,
    #[error("surface error: {0}")]
    Surface(wgpu::SurfaceError),
}

/// Texture slots of one material bind group, in binding order. `None` binds a fallback.
type MaterialKey = [Option<TextureHandle>; 5];

struct MaterialBinding {
    key: MaterialKey,
    uniforms: MaterialUniforms,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct EnvironmentSlot {
    source: Arc<EnvironmentMap>,
    gpu: GpuTexture,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameBindingKey {
    environment: Option<*const EnvironmentMap>,
    background: Option<*const EnvironmentMap>,
    shadow_size: u32,
}

/// Surface format for presenting, and the view format the scene is drawn through.
/// A linear surface with an sRGB view is preferred; egui wants the linear one.
pub fn choose_formats(
    available: &[wgpu::TextureFormat],
) -> Option<(wgpu::TextureFormat, wgpu::TextureFormat)> {
    available
        .iter()
        .copied()
        .find(|format| !format.is_srgb() && format.add_srgb_suffix() != *format)
        .map(|format| (format, format.add_srgb_suffix()))
        .or_else(|| available.first().map(|format| (*format, *format)))
}

/// New target size when the frame no longer matches the current targets.
fn targets_resize(current: (u32, u32), width: u32, height: u32) -> Option<(u32, u32)> {
    let wanted = (width.max(1), height.max(1));
    (wanted != current).then_some(wanted)
}

fn align_to(value: u64, alignment: u64) -> u64 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}

fn is_blended(materials: &MaterialLibrary, id: MaterialId) -> bool {
    matches!(
        materials.get(id),
        Some(Material::Standard(standard)) if standard.alpha_mode == AlphaMode::Blend
    )
}

/// Opaque draws in scene order, then blended draws from far to near.
fn order_draws(draws: &[DrawItem], materials: &MaterialLibrary, eye: Vec3) -> Vec<usize> {
    let (mut blended, opaque): (Vec<usize>, Vec<usize>) =
        (0..draws.len()).partition(|index| is_blended(materials, draws[*index].material));
    let distance = |index: usize| draws[index].world.w_axis.truncate().distance_squared(eye);
    blended.sort_by(|a, b| distance(*b).total_cmp(&distance(*a)));
    opaque.into_iter().chain(blended).collect()
}

fn material_key(material: &Material) -> MaterialKey {
    match material {
        Material::Standard(standard) => [
            standard.base_color,
            standard.normal,
            standard.occlusion,
            standard.roughness_map,
            standard.metalness_map,
        ],
        Material::Basic(_) => [None; 5],
    }
}

pub struct RenderContext {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    scene_format: wgpu::TextureFormat,
    sample_count: u32,
    logical_size: (u32, u32),
    pixel_ratio: f32,
    layouts: Layouts,
    pipelines: Pipelines,
    targets: FrameTargets,
    fallbacks: Fallbacks,
    material_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: Option<(FrameBindingKey, wgpu::BindGroup)>,
    light_camera_buffer: wgpu::Buffer,
    light_camera_bind_group: wgpu::BindGroup,
    object_stride: u64,
    object_capacity: u64,
    object_buffer: wgpu::Buffer,
    object_bind_group: wgpu::BindGroup,
    shadow_map: ShadowMap,
    textures: HashMap<TextureHandle, GpuTexture>,
    environment: Option<EnvironmentSlot>,
    background: Option<EnvironmentSlot>,
    materials: HashMap<MaterialId, MaterialBinding>,
    meshes: HashMap<GeometryId, Option<GpuMesh>>,
    overlay: EguiOverlay,
}

impl RenderContext {
    pub fn new(window: Arc<Window>, settings: &RendererSettings) -> Result<Self, RenderError> {
        pollster::block_on(Self::new_async(window, settings))
    }

    async fn new_async(
        window: Arc<Window>,
        settings: &RendererSettings,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance.create_surface(Arc::clone(&window))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        let info = adapter.get_info();
        log::info!("Using GPU adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("envscene_device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let (surface_format, scene_format) =
            choose_formats(&caps.formats).ok_or(RenderError::UnsupportedSurface)?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: if scene_format == surface_format {
                Vec::new()
            } else {
                vec![scene_format]
            },
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let requested = settings.msaa_samples.max(1);
        let sample_count = if adapter
            .get_texture_format_features(scene_format)
            .flags
            .sample_count_supported(requested)
        {
            requested
        } else {
            log::warn!("{requested}x MSAA unsupported for {scene_format:?}; rendering without");
            1
        };
        log::info!(
            "Surface {:?} (scene view {:?}), {}x{}, MSAA {}",
            surface_format,
            scene_format,
            config.width,
            config.height,
            sample_count
        );

        let layouts = Layouts::new(&device);
        let pipelines = Pipelines::new(&device, &layouts, scene_format, sample_count);
        let targets = FrameTargets::new(
            &device,
            config.width,
            config.height,
            scene_format,
            sample_count,
        );
        let fallbacks = Fallbacks::new(&device, &queue);

        let material_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("material_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            anisotropy_clamp: 8,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniforms"),
            size: std::mem::size_of::<FrameUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let light_camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("light_camera_uniforms"),
            contents: bytemuck::bytes_of(&LightCameraUniforms {
                view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let light_camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("light_camera_bind_group"),
            layout: &layouts.light_camera,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_camera_buffer.as_entire_binding(),
            }],
        });

        let object_stride = align_to(
            std::mem::size_of::<ObjectUniforms>() as u64,
            u64::from(device.limits().min_uniform_buffer_offset_alignment),
        );
        let object_capacity = 16;
        let (object_buffer, object_bind_group) =
            create_object_buffer(&device, &layouts, object_stride, object_capacity);

        let shadow_map = ShadowMap::new(&device, crate::scene::LightShadow::default().map_size);
        let overlay = EguiOverlay::new(&device, surface_format);

        Ok(Self {
            logical_size: (config.width, config.height),
            pixel_ratio: 1.0,
            window,
            surface,
            device,
            queue,
            config,
            scene_format,
            sample_count,
            layouts,
            pipelines,
            targets,
            fallbacks,
            material_sampler,
            shadow_sampler,
            frame_buffer,
            frame_bind_group: None,
            light_camera_buffer,
            light_camera_bind_group,
            object_stride,
            object_capacity,
            object_buffer,
            object_bind_group,
            shadow_map,
            textures: HashMap::new(),
            environment: None,
            background: None,
            materials: HashMap::new(),
            meshes: HashMap::new(),
            overlay,
        })
    }

    fn reconfigure(&mut self) {
        let max = self.device.limits().max_texture_dimension_2d;
        let (width, height) = self.logical_size;
        let width = ((width.max(1) as f32 * self.pixel_ratio).round() as u32).clamp(1, max);
        let height = ((height.max(1) as f32 * self.pixel_ratio).round() as u32).clamp(1, max);
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.resize_targets(width, height);
        log::debug!("Surface configured at {width}x{height}");
    }

    /// Depth and MSAA targets must match the acquired frame, which some backends pin to
    /// the window extent regardless of the configured size.
    fn resize_targets(&mut self, width: u32, height: u32) {
        let Some((width, height)) =
            targets_resize((self.targets.width, self.targets.height), width, height)
        else {
            return;
        };
        self.targets = FrameTargets::new(
            &self.device,
            width,
            height,
            self.scene_format,
            self.sample_count,
        );
    }

    pub fn render(
        &mut self,
        scene: &Scene,
        camera: &PerspectiveCamera,
        settings: &RendererSettings,
        ui: Option<&EguiFrameOutput>,
    ) -> Result<(), RenderError> {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("Surface lost or outdated; reconfiguring");
                self.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timed out acquiring the next frame; skipping it");
                return Ok(());
            }
            Err(err) => return Err(RenderError::Surface(err)),
        };
        let frame_size = surface_texture.texture.size();
        if (frame_size.width, frame_size.height) != (self.config.width, self.config.height) {
            log::debug!(
                "Frame acquired at {}x{}, configured {}x{}",
                frame_size.width,
                frame_size.height,
                self.config.width,
                self.config.height
            );
        }
        self.resize_targets(frame_size.width, frame_size.height);
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let scene_view = surface_texture.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.scene_format),
            ..Default::default()
        });

        let draws = scene.draw_list();
        let light = scene.directional_light();
        let shadows_active =
            settings.shadow_map_enabled && light.is_some_and(|light| light.cast_shadow);
        if let Some(light) = &light {
            if light.shadow.map_size != self.shadow_map.size {
                self.shadow_map = ShadowMap::new(&self.device, light.shadow.map_size);
            }
        }

        self.sync_environments(scene);
        self.sync_frame_bind_group();
        self.sync_meshes(scene, &draws);
        self.sync_materials(scene, &draws);
        self.write_objects(&draws);

        let frame = FrameUniforms::new(
            camera,
            settings,
            &FrameInputs {
                light,
                shadows_active,
                environment_levels: self.environment.as_ref().map(|slot| slot.source.level_count()),
                background_present: scene.background.is_some(),
                encode_srgb: !self.scene_format.is_srgb(),
            },
        );
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&frame));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame_encoder"),
            });

        if let (true, Some(light)) = (shadows_active, &light) {
            self.queue.write_buffer(
                &self.light_camera_buffer,
                0,
                bytemuck::bytes_of(&LightCameraUniforms {
                    view_proj: light_view_projection(light).to_cols_array_2d(),
                }),
            );
            self.encode_shadow_pass(&mut encoder, &draws);
        }

        let order = order_draws(&draws, &scene.materials, camera.position);
        self.encode_main_pass(&mut encoder, &scene_view, scene, &draws, &order);

        let mut commands = Vec::new();
        if let Some(ui) = ui {
            let screen =
                egui_overlay::screen_descriptor(ui, frame_size.width, frame_size.height);
            commands = self
                .overlay
                .prepare(&self.device, &self.queue, &mut encoder, ui, &screen);
            self.overlay.paint(&mut encoder, &surface_view, ui, &screen);
        }
        commands.push(encoder.finish());
        self.queue.submit(commands);
        self.window.pre_present_notify();
        surface_texture.present();

        if let Some(ui) = ui {
            self.overlay.finish(ui);
        }
        Ok(())
    }

    fn sync_environments(&mut self, scene: &Scene) {
        sync_environment_slot(
            &self.device,
            &self.queue,
            &mut self.environment,
            scene.environment.as_ref(),
            "environment_map",
        );
        let shared = match (&scene.background, &scene.environment) {
            (Some(background), Some(environment)) => Arc::ptr_eq(background, environment),
            _ => false,
        };
        let background = if shared {
            None
        } else {
            scene.background.as_ref()
        };
        sync_environment_slot(
            &self.device,
            &self.queue,
            &mut self.background,
            background,
            "background_map",
        );
    }

    fn sync_frame_bind_group(&mut self) {
        let environment = self.environment.as_ref();
        let background = self.background.as_ref().or(environment);
        let key = FrameBindingKey {
            environment: environment.map(|slot| Arc::as_ptr(&slot.source)),
            background: background.map(|slot| Arc::as_ptr(&slot.source)),
            shadow_size: self.shadow_map.size,
        };
        if matches!(&self.frame_bind_group, Some((current, _)) if *current == key) {
            return;
        }
        let black = &self.fallbacks.black_environment.view;
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &self.layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(
                        environment.map_or(black, |slot| &slot.gpu.view),
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(
                        background.map_or(black, |slot| &slot.gpu.view),
                    ),
                },
            ],
        });
        self.frame_bind_group = Some((key, bind_group));
    }

    fn sync_meshes(&mut self, scene: &Scene, draws: &[DrawItem]) {
        for draw in draws {
            self.meshes.entry(draw.geometry).or_insert_with(|| {
                let label = format!("geometry_{}", draw.geometry.index());
                let mesh = scene
                    .geometry(draw.geometry)
                    .and_then(|geometry| GpuMesh::new(&self.device, &label, geometry));
                if mesh.is_none() {
                    log::warn!(
                        "Geometry {} on node {:?} has nothing to draw",
                        draw.geometry.index(),
                        draw.node
                    );
                }
                mesh
            });
        }
    }

    fn sync_materials(&mut self, scene: &Scene, draws: &[DrawItem]) {
        for draw in draws {
            let Some(material) = scene.materials.get(draw.material) else {
                continue;
            };

            // Upload whatever finished loading since the last frame.
            let wanted = material_key(material);
            for handle in wanted.iter().flatten() {
                if self.textures.contains_key(handle) {
                    continue;
                }
                if let Some((image, color_space)) = scene.textures.ready_image(*handle) {
                    let label = scene
                        .textures
                        .get(*handle)
                        .map_or("texture", |slot| slot.label.as_str());
                    let texture = resources::upload_texture(
                        &self.device,
                        &self.queue,
                        label,
                        image,
                        color_space,
                    );
                    log::debug!("Uploaded texture {label} ({}x{})", image.width, image.height);
                    self.textures.insert(*handle, texture);
                }
            }
            let key = wanted.map(|slot| slot.filter(|handle| self.textures.contains_key(handle)));
            let uniforms = MaterialUniforms::from_material(material);

            if let Some(binding) = self.materials.get_mut(&draw.material) {
                if binding.uniforms != uniforms {
                    self.queue
                        .write_buffer(&binding.buffer, 0, bytemuck::bytes_of(&uniforms));
                    binding.uniforms = uniforms;
                }
                if binding.key == key {
                    continue;
                }
            }

            let buffer = match self.materials.remove(&draw.material) {
                Some(existing) => existing.buffer,
                None => self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(material.name()),
                    contents: bytemuck::bytes_of(&uniforms),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                }),
            };
            let textures = &self.textures;
            let white = &self.fallbacks.white;
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(material.name()),
                layout: &self.layouts.material,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(texture_view(
                            textures,
                            key[0],
                            white,
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(texture_view(
                            textures,
                            key[1],
                            &self.fallbacks.flat_normal,
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(texture_view(
                            textures,
                            key[2],
                            white,
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(texture_view(
                            textures,
                            key[3],
                            white,
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::TextureView(texture_view(
                            textures,
                            key[4],
                            white,
                        )),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: wgpu::BindingResource::Sampler(&self.material_sampler),
                    },
                ],
            });
            self.materials.insert(
                draw.material,
                MaterialBinding {
                    key,
                    uniforms,
                    buffer,
                    bind_group,
                },
            );
        }
    }

    fn write_objects(&mut self, draws: &[DrawItem]) {
        let count = draws.len().max(1) as u64;
        if count > self.object_capacity {
            self.object_capacity = count.next_power_of_two();
            let (buffer, bind_group) = create_object_buffer(
                &self.device,
                &self.layouts,
                self.object_stride,
                self.object_capacity,
            );
            self.object_buffer = buffer;
            self.object_bind_group = bind_group;
        }
        let stride = self.object_stride as usize;
        let mut bytes = vec![0u8; draws.len() * stride];
        for (index, draw) in draws.iter().enumerate() {
            let object = ObjectUniforms::from_draw(draw);
            let offset = index * stride;
            bytes[offset..offset + std::mem::size_of::<ObjectUniforms>()]
                .copy_from_slice(bytemuck::bytes_of(&object));
        }
        if !bytes.is_empty() {
            self.queue.write_buffer(&self.object_buffer, 0, &bytes);
        }
    }

    fn object_offset(&self, index: usize) -> u32 {
        (index as u64 * self.object_stride) as u32
    }

    fn encode_shadow_pass(&self, encoder: &mut wgpu::CommandEncoder, draws: &[DrawItem]) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow_pass"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.shadow_map.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipelines.shadow);
        pass.set_bind_group(0, &self.light_camera_bind_group, &[]);
        for (index, draw) in draws.iter().enumerate() {
            if !draw.cast_shadow {
                continue;
            }
            let Some(Some(mesh)) = self.meshes.get(&draw.geometry) else {
                continue;
            };
            pass.set_bind_group(1, &self.object_bind_group, &[self.object_offset(index)]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }

    fn encode_main_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene_view: &wgpu::TextureView,
        scene: &Scene,
        draws: &[DrawItem],
        order: &[usize],
    ) {
        let Some((_, frame_bind_group)) = &self.frame_bind_group else {
            return;
        };
        let (view, resolve_target, store) = match &self.targets.msaa_color {
            Some(msaa) => (msaa, Some(scene_view), wgpu::StoreOp::Discard),
            None => (scene_view, None, wgpu::StoreOp::Store),
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("main_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.targets.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_bind_group(0, frame_bind_group, &[]);

        if scene.background.is_some() {
            pass.set_pipeline(&self.pipelines.sky);
            pass.draw(0..3, 0..1);
        }

        for &index in order {
            let draw = &draws[index];
            let (Some(material), Some(binding), Some(Some(mesh))) = (
                scene.materials.get(draw.material),
                self.materials.get(&draw.material),
                self.meshes.get(&draw.geometry),
            ) else {
                continue;
            };
            let variant = PbrVariant {
                double_sided: material.double_sided(),
                blended: is_blended(&scene.materials, draw.material),
            };
            pass.set_pipeline(self.pipelines.pbr(variant));
            pass.set_bind_group(1, &binding.bind_group, &[]);
            pass.set_bind_group(2, &self.object_bind_group, &[self.object_offset(index)]);
            pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

impl OutputSurface for RenderContext {
    fn set_size(&mut self, width: u32, height: u32) {
        self.logical_size = (width, height);
        self.reconfigure();
    }

    fn set_pixel_ratio(&mut self, pixel_ratio: f32) {
        self.pixel_ratio = pixel_ratio;
        self.reconfigure();
    }
}

fn sync_environment_slot(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    slot: &mut Option<EnvironmentSlot>,
    wanted: Option<&Arc<EnvironmentMap>>,
    label: &str,
) {
    match wanted {
        None => *slot = None,
        Some(source) => {
            if matches!(slot, Some(current) if Arc::ptr_eq(&current.source, source)) {
                return;
            }
            log::info!(
                "Uploading {label} {}x{} with {} levels",
                source.width(),
                source.height(),
                source.level_count()
            );
            *slot = Some(EnvironmentSlot {
                source: Arc::clone(source),
                gpu: resources::upload_environment(device, queue, label, source),
            });
        }
    }
}

fn texture_view<'a>(
    textures: &'a HashMap<TextureHandle, GpuTexture>,
    handle: Option<TextureHandle>,
    fallback: &'a GpuTexture,
) -> &'a wgpu::TextureView {
    handle
        .and_then(|handle| textures.get(&handle))
        .map_or(&fallback.view, |texture| &texture.view)
}

fn create_object_buffer(
    device: &wgpu::Device,
    layouts: &Layouts,
    stride: u64,
    capacity: u64,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("object_uniforms"),
        size: stride * capacity,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("object_bind_group"),
        layout: &layouts.object,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<ObjectUniforms>() as u64),
            }),
        }],
    });
    (buffer, bind_group)
}
