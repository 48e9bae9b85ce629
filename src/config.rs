use crate::render::RendererSettings;
use crate::scene::GlobalParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Looked up in the working directory at startup.
pub const CONFIG_FILE: &str = "envscene.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "envscene".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub enable_damping: bool,
    pub damping_factor: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_degrees: 75.0,
            near: 0.1,
            far: 100.0,
            position: [4.0, 5.0, 4.0],
            target: [0.0, 3.5, 0.0],
            enable_damping: true,
            damping_factor: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub color: [f32; 3],
    pub intensity: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub cast_shadow: bool,
    pub shadow_map_size: u32,
    pub shadow_camera_far: f32,
    pub shadow_bias: f32,
    pub shadow_normal_bias: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0],
            intensity: 6.0,
            position: [-4.0, 6.5, 2.5],
            target: [0.0, 4.0, 0.0],
            cast_shadow: true,
            shadow_map_size: 512,
            shadow_camera_far: 15.0,
            shadow_bias: -0.004,
            shadow_normal_bias: 0.027,
        }
    }
}

/// Color, normal and packed AO/roughness/metalness maps of one surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceTextures {
    pub color: String,
    pub normal: String,
    pub arm: String,
}

impl SurfaceTextures {
    fn polyhaven(name: &str) -> Self {
        Self {
            color: format!("textures/{name}/{name}_diff_1k.jpg"),
            normal: format!("textures/{name}/{name}_nor_gl_1k.png"),
            arm: format!("textures/{name}/{name}_arm_1k.jpg"),
        }
    }
}

/// Paths relative to [`DemoConfig::asset_root`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPaths {
    pub floor: SurfaceTextures,
    pub wall: SurfaceTextures,
    pub environment: String,
    pub model: String,
    pub model_scale: f32,
}

impl Default for AssetPaths {
    fn default() -> Self {
        Self {
            floor: SurfaceTextures::polyhaven("wood_cabinet_worn_long"),
            wall: SurfaceTextures::polyhaven("castle_brick_broken_06"),
            environment: "environmentMaps/0/2k.hdr".to_string(),
            model: "models/FlightHelmet/glTF/FlightHelmet.gltf".to_string(),
            model_scale: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub asset_root: PathBuf,
    pub window: WindowConfig,
    pub assets: AssetPaths,
    pub params: GlobalParams,
    pub renderer: RendererSettings,
    pub light: LightConfig,
    pub camera: CameraConfig,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("static"),
            window: WindowConfig::default(),
            assets: AssetPaths::default(),
            params: GlobalParams::default(),
            renderer: RendererSettings::default(),
            light: LightConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<DemoConfig> {
    let json = std::fs::read_to_string(path)?;
    let config: DemoConfig = serde_json::from_str(&json)?;
    Ok(config)
}

/// A missing file means defaults; a broken one is reported and also falls back to defaults.
pub fn load_or_default(path: &Path) -> DemoConfig {
    match load_config(path) {
        Ok(config) => {
            log::info!("Loaded config from {}", path.display());
            config
        }
        Err(ConfigError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("No config at {}, using defaults", path.display());
            DemoConfig::default()
        }
        Err(err) => {
            log::warn!("Ignoring config {}: {}", path.display(), err);
            DemoConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_config, load_or_default, ConfigError, DemoConfig};
    use crate::render::ToneMapping;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("envscene-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn defaults_describe_the_demo_scene() {
        let config = DemoConfig::default();
        assert_eq!(config.asset_root, PathBuf::from("static"));
        assert_eq!(config.params.env_map_intensity, 1.0);
        assert_eq!(config.renderer.tone_mapping, ToneMapping::Reinhard);
        assert_eq!(config.renderer.tone_mapping_exposure, 1.0);
        assert_eq!(config.light.intensity, 6.0);
        assert_eq!(config.light.shadow_map_size, 512);
        assert_eq!(config.camera.position, [4.0, 5.0, 4.0]);
        assert_eq!(
            config.assets.floor.normal,
            "textures/wood_cabinet_worn_long/wood_cabinet_worn_long_nor_gl_1k.png"
        );
        assert_eq!(config.assets.model_scale, 10.0);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let path = temp_file(
            "partial.json",
            r#"{ "asset_root": "assets", "params": { "env_map_intensity": 2.5 },
                 "renderer": { "tone_mapping": "AcesFilmic" }, "light": { "intensity": 3.0 } }"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.asset_root, PathBuf::from("assets"));
        assert_eq!(config.params.env_map_intensity, 2.5);
        assert_eq!(config.renderer.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(config.renderer.tone_mapping_exposure, 1.0);
        assert_eq!(config.light.intensity, 3.0);
        assert_eq!(config.light.position, [-4.0, 6.5, 2.5]);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn round_trips_through_json() {
        let config = DemoConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let loaded: DemoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_and_malformed_files_fall_back_to_defaults() {
        let missing = std::env::temp_dir().join("envscene-config-does-not-exist.json");
        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));
        assert_eq!(load_or_default(&missing), DemoConfig::default());

        let broken = temp_file("broken.json", "{ not json");
        assert!(matches!(load_config(&broken), Err(ConfigError::Json(_))));
        assert_eq!(load_or_default(&broken), DemoConfig::default());
    }
}
