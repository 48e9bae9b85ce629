use crate::assets::{
    AssetLoader, AssetOutcome, AssetPayload, AssetRequest, ColorSpace, TextureStore,
};
use crate::config::{DemoConfig, SurfaceTextures};
use crate::render::camera::{OrbitControls, PerspectiveCamera};
use crate::render::RendererSettings;
use crate::scene::material_sync::update_all_materials;
use crate::scene::{
    DirectionalLight, GlobalParams, LightShadow, Material, Mesh, MeshGeometry, NodeContent,
    NodeId, Scene, StandardMaterial, Transform,
};
use glam::{Quat, Vec3};
use std::sync::Arc;

/// All mutable demo state. Owned by the application and lent out to each subsystem.
pub struct DemoState {
    pub scene: Scene,
    pub params: GlobalParams,
    pub renderer: RendererSettings,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub camera_node: NodeId,
    model_scale: f32,
}

impl DemoState {
    /// Assemble the static part of the scene and fire every asset request.
    pub fn new(config: &DemoConfig, loader: &mut AssetLoader, aspect: f32) -> Self {
        let mut scene = Scene::new();
        let plane = scene.add_geometry(MeshGeometry::plane(8.0, 8.0));

        let floor_material = surface_material(
            "floor",
            &config.assets.floor,
            &config.params,
            loader,
            &mut scene.textures,
        );
        let floor_material = scene.materials.add(floor_material);
        scene.add_node(
            scene.root(),
            "floor",
            Transform {
                position: Vec3::new(0.0, -0.001, 0.0),
                rotation: Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
                scale: Vec3::ONE,
            },
            NodeContent::Mesh(Mesh {
                geometry: plane,
                material: floor_material,
                cast_shadow: false,
                receive_shadow: false,
            }),
        );

        let wall_material = surface_material(
            "wall",
            &config.assets.wall,
            &config.params,
            loader,
            &mut scene.textures,
        );
        let wall_material = scene.materials.add(wall_material);
        scene.add_node(
            scene.root(),
            "wall",
            Transform::from_position(Vec3::new(0.0, 4.0, -4.0)),
            NodeContent::Mesh(Mesh {
                geometry: plane,
                material: wall_material,
                cast_shadow: false,
                receive_shadow: false,
            }),
        );

        let light = &config.light;
        scene.add_node(
            scene.root(),
            "directionalLight",
            Transform::from_position(Vec3::from_array(light.position)),
            NodeContent::DirectionalLight(DirectionalLight {
                color: Vec3::from_array(light.color),
                intensity: light.intensity,
                target: Vec3::from_array(light.target),
                cast_shadow: light.cast_shadow,
                shadow: LightShadow {
                    map_size: light.shadow_map_size.max(1),
                    camera_far: light.shadow_camera_far,
                    bias: light.shadow_bias,
                    normal_bias: light.shadow_normal_bias,
                    ..LightShadow::default()
                },
            }),
        );

        let camera_config = &config.camera;
        let mut camera = PerspectiveCamera::new(
            camera_config.fov_y_degrees,
            aspect,
            camera_config.near,
            camera_config.far,
        );
        camera.position = Vec3::from_array(camera_config.position);
        let camera_node = scene.add_node(
            scene.root(),
            "camera",
            Transform::from_position(camera.position),
            NodeContent::Camera,
        );
        let mut controls = OrbitControls::new(Vec3::from_array(camera_config.target));
        controls.enable_damping = camera_config.enable_damping;
        controls.damping_factor = camera_config.damping_factor;
        controls.update(&mut camera);

        loader.load_environment(&config.assets.environment);
        loader.load_model(&config.assets.model);
        log::info!(
            "Scene assembled, {} asset request(s) in flight",
            loader.in_flight()
        );

        Self {
            scene,
            params: config.params,
            renderer: config.renderer,
            camera,
            controls,
            camera_node,
            model_scale: config.assets.model_scale,
        }
    }

    /// Run the continuation for one finished load. Returns a status line for failures.
    pub fn apply_outcome(&mut self, outcome: AssetOutcome) -> Option<String> {
        let AssetOutcome { request, result } = outcome;
        let payload = match result {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Asset load failed: {}", err);
                if let AssetRequest::Texture { handle, .. } = &request {
                    self.scene.textures.fail(*handle, err.to_string());
                }
                return Some(format!("Missing {}: {}", request.path(), err));
            }
        };

        match (request, payload) {
            (AssetRequest::Texture { handle, path }, AssetPayload::Texture(image)) => {
                log::debug!("Texture ready: {} ({}x{})", path, image.width, image.height);
                self.scene.textures.fill(handle, image);
            }
            (AssetRequest::Environment { path }, AssetPayload::Environment(environment)) => {
                log::info!(
                    "Environment ready: {} ({:?}, {}x{}, {} levels)",
                    path,
                    environment.mapping,
                    environment.width(),
                    environment.height(),
                    environment.level_count()
                );
                let environment = Arc::new(environment);
                self.scene.background = Some(Arc::clone(&environment));
                self.scene.environment = Some(environment);
            }
            (AssetRequest::Model { path }, AssetPayload::Model(model)) => {
                let meshes = model.meshes.len();
                let root = self.scene.root();
                self.scene.attach_model(
                    root,
                    model,
                    Transform {
                        scale: Vec3::splat(self.model_scale),
                        ..Transform::IDENTITY
                    },
                );
                update_all_materials(&mut self.scene, &self.params);
                let mut mesh_nodes = 0;
                self.scene.traverse(|_, node| {
                    if matches!(node.content, NodeContent::Mesh(_)) {
                        mesh_nodes += 1;
                    }
                });
                log::info!("Model ready: {} ({} meshes)", path, meshes);
                log::debug!(
                    "Scene now has {} mesh nodes, {} materials, {} textures ({} pending)",
                    mesh_nodes,
                    self.scene.materials.len(),
                    self.scene.textures.len(),
                    self.scene.textures.pending_count()
                );
            }
            (request, _) => {
                log::warn!("Unexpected payload for {}", request.path());
            }
        }
        None
    }

    /// Mirror the controlled camera into its scene node.
    pub fn sync_camera_node(&mut self) {
        let position = self.camera.position;
        if let Some(node) = self.scene.node_mut(self.camera_node) {
            node.transform.position = position;
        }
    }
}

fn surface_material(
    name: &str,
    textures: &SurfaceTextures,
    params: &GlobalParams,
    loader: &mut AssetLoader,
    store: &mut TextureStore,
) -> Material {
    let color = loader.load_texture(store, &textures.color, ColorSpace::Srgb);
    let normal = loader.load_texture(store, &textures.normal, ColorSpace::Linear);
    let arm = loader.load_texture(store, &textures.arm, ColorSpace::Linear);
    Material::Standard(StandardMaterial {
        name: name.to_string(),
        base_color: Some(color),
        normal: Some(normal),
        occlusion: Some(arm),
        roughness_map: Some(arm),
        metalness_map: Some(arm),
        env_map_intensity: params.env_map_intensity,
        double_sided: true,
        ..StandardMaterial::default()
    })
}

#[cfg(test)]
mod tests {
    use super::DemoState;
    use crate::assets::model::{ImportedMaterial, ImportedMesh, ImportedNode, ImportedPrimitive};
    use crate::assets::{
        AssetLoader, AssetOutcome, AssetPayload, AssetRequest, EnvironmentLevel, EnvironmentMap,
        ImportedModel, TextureState,
    };
    use crate::config::DemoConfig;
    use crate::scene::{AlphaMode, Material, MeshGeometry, NodeContent, Transform};
    use glam::Vec3;

    fn missing_root_state() -> (DemoState, AssetLoader) {
        let mut config = DemoConfig::default();
        config.asset_root =
            std::env::temp_dir().join(format!("envscene-setup-empty-{}", std::process::id()));
        let mut loader = AssetLoader::new(&config.asset_root);
        let state = DemoState::new(&config, &mut loader, 16.0 / 9.0);
        (state, loader)
    }

    #[test]
    fn initial_scene_has_planes_light_and_camera() {
        let (state, mut loader) = missing_root_state();
        assert_eq!(loader.in_flight(), 8);
        assert_eq!(state.scene.draw_list().len(), 2);
        let light = state.scene.directional_light().unwrap();
        assert_eq!(light.intensity, 6.0);
        assert_eq!(light.position, Vec3::new(-4.0, 6.5, 2.5));
        assert_eq!(light.shadow.camera_far, 15.0);
        assert!(matches!(
            state.scene.node(state.camera_node).unwrap().content,
            NodeContent::Camera
        ));
        assert_eq!(state.camera.target(), Vec3::new(0.0, 3.5, 0.0));
        assert_eq!(state.scene.textures.pending_count(), 6);
        loader.wait_all();
    }

    #[test]
    fn floor_and_wall_share_one_arm_texture_per_surface() {
        let (state, mut loader) = missing_root_state();
        for (_, material) in state.scene.materials.iter() {
            let Material::Standard(material) = material else {
                panic!("planes use standard materials");
            };
            assert!(material.double_sided);
            assert_eq!(material.occlusion, material.roughness_map);
            assert_eq!(material.roughness_map, material.metalness_map);
            assert_ne!(material.base_color, material.normal);
        }
        loader.wait_all();
    }

    #[test]
    fn failed_loads_become_status_lines_and_failed_textures() {
        let (mut state, mut loader) = missing_root_state();
        let outcomes = loader.wait_all();
        assert_eq!(outcomes.len(), 8);

        let statuses: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| state.apply_outcome(outcome))
            .collect();
        assert_eq!(statuses.len(), 8);
        assert!(statuses.iter().any(|line| line.contains("2k.hdr")));
        assert_eq!(state.scene.textures.pending_count(), 0);
        assert!(state.scene.environment.is_none());
        // Planes still draw with fallback textures.
        assert_eq!(state.scene.draw_list().len(), 2);
    }

    #[test]
    fn camera_node_follows_controls() {
        let (mut state, mut loader) = missing_root_state();
        state.controls.rotate(100.0, 0.0, 720.0);
        for _ in 0..10 {
            state.controls.update(&mut state.camera);
        }
        state.sync_camera_node();
        let node = state.scene.node(state.camera_node).unwrap();
        assert_eq!(node.transform.position, state.camera.position);
        loader.wait_all();
    }

    #[test]
    fn configured_intensity_reaches_planes_before_any_model() {
        let mut config = DemoConfig::default();
        config.asset_root =
            std::env::temp_dir().join(format!("envscene-setup-intensity-{}", std::process::id()));
        config.params.env_map_intensity = 2.5;
        let mut loader = AssetLoader::new(&config.asset_root);
        let mut state = DemoState::new(&config, &mut loader, 1.0);
        for outcome in loader.wait_all() {
            state.apply_outcome(outcome);
        }

        assert_eq!(state.params.env_map_intensity, 2.5);
        let intensities: Vec<f32> = state
            .scene
            .materials
            .iter()
            .filter_map(|(_, material)| match material {
                Material::Standard(standard) => Some(standard.env_map_intensity),
                Material::Basic(_) => None,
            })
            .collect();
        assert_eq!(intensities, vec![2.5, 2.5]);
        // Shadow flags still wait for the first material sync.
        for draw in state.scene.draw_list() {
            assert!(!draw.cast_shadow && !draw.receive_shadow);
        }
    }

    #[test]
    fn texture_state_reports_failure_reason() {
        let (mut state, mut loader) = missing_root_state();
        for outcome in loader.wait_all() {
            state.apply_outcome(outcome);
        }
        let handle = state
            .scene
            .materials
            .iter()
            .find_map(|(_, material)| match material {
                Material::Standard(standard) => standard.base_color,
                Material::Basic(_) => None,
            })
            .unwrap();
        let slot = state.scene.textures.get(handle).unwrap();
        assert!(matches!(&slot.state, TextureState::Failed(reason) if !reason.is_empty()));
    }

    #[test]
    fn model_outcome_attaches_scaled_subtree_and_syncs_materials() {
        let (mut state, mut loader) = missing_root_state();
        loader.wait_all();
        state.params.env_map_intensity = 4.0;

        let model = ImportedModel {
            name: "FlightHelmet".to_string(),
            roots: vec![ImportedNode {
                name: "Hose".to_string(),
                transform: Transform::IDENTITY,
                mesh: Some(0),
                children: Vec::new(),
            }],
            meshes: vec![ImportedMesh {
                name: "Hose".to_string(),
                primitives: vec![ImportedPrimitive {
                    geometry: MeshGeometry::plane(0.1, 0.1),
                    material: Some(0),
                }],
            }],
            materials: vec![ImportedMaterial {
                name: "HoseMat".to_string(),
                base_color_factor: [1.0; 4],
                base_color_texture: None,
                normal_texture: None,
                occlusion_texture: None,
                metallic_roughness_texture: None,
                roughness_factor: 1.0,
                metallic_factor: 1.0,
                double_sided: false,
                alpha_mode: AlphaMode::Opaque,
            }],
            images: Vec::new(),
        };
        let status = state.apply_outcome(AssetOutcome {
            request: AssetRequest::Model {
                path: "models/FlightHelmet/glTF/FlightHelmet.gltf".to_string(),
            },
            result: Ok(AssetPayload::Model(model)),
        });
        assert_eq!(status, None);

        let draws = state.scene.draw_list();
        assert_eq!(draws.len(), 3);
        // Sync reached the planes and the new mesh alike.
        assert!(draws.iter().all(|draw| draw.cast_shadow && draw.receive_shadow));
        for (_, material) in state.scene.materials.iter() {
            if let Material::Standard(standard) = material {
                assert_eq!(standard.env_map_intensity, 4.0);
            }
        }
        let helmet = draws.last().unwrap();
        assert!((helmet.world.x_axis.x - 10.0).abs() < 1e-5);
    }

    #[test]
    fn environment_outcome_sets_background_and_environment() {
        let (mut state, mut loader) = missing_root_state();
        loader.wait_all();
        let environment = EnvironmentMap::from_base_level(EnvironmentLevel {
            width: 4,
            height: 2,
            rgba32f: vec![1.0; 32],
        });
        state.apply_outcome(AssetOutcome {
            request: AssetRequest::Environment {
                path: "environmentMaps/0/2k.hdr".to_string(),
            },
            result: Ok(AssetPayload::Environment(environment)),
        });
        let background = state.scene.background.as_ref().unwrap();
        let lighting = state.scene.environment.as_ref().unwrap();
        assert!(std::sync::Arc::ptr_eq(background, lighting));
    }
}
