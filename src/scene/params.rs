use serde::{Deserialize, Serialize};

/// Scene-wide shading parameters owned by the application and passed by reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalParams {
    pub env_map_intensity: f32,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            env_map_intensity: 1.0,
        }
    }
}
