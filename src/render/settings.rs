use serde::{Deserialize, Serialize};

/// Operator applied when resolving scene radiance into display values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ToneMapping {
    None,
    Linear,
    #[default]
    Reinhard,
    Cineon,
    AcesFilmic,
}

impl ToneMapping {
    pub const ALL: [ToneMapping; 5] = [
        ToneMapping::None,
        ToneMapping::Linear,
        ToneMapping::Reinhard,
        ToneMapping::Cineon,
        ToneMapping::AcesFilmic,
    ];

    /// Name shown in the debug panel.
    pub fn label(self) -> &'static str {
        match self {
            ToneMapping::None => "No",
            ToneMapping::Linear => "Linear",
            ToneMapping::Reinhard => "Reinhard",
            ToneMapping::Cineon => "Cineon",
            ToneMapping::AcesFilmic => "ACESFilmc",
        }
    }

    #[cfg(test)]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mode| mode.label() == label)
    }

    /// Selector read by the shaders' tone-mapping switch.
    pub fn shader_index(self) -> u32 {
        match self {
            ToneMapping::None => 0,
            ToneMapping::Linear => 1,
            ToneMapping::Reinhard => 2,
            ToneMapping::Cineon => 3,
            ToneMapping::AcesFilmic => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSettings {
    pub tone_mapping: ToneMapping,
    pub tone_mapping_exposure: f32,
    pub shadow_map_enabled: bool,
    pub msaa_samples: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            tone_mapping: ToneMapping::Reinhard,
            tone_mapping_exposure: 1.0,
            shadow_map_enabled: true,
            msaa_samples: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ToneMapping;

    #[test]
    fn labels_round_trip_and_keep_panel_spelling() {
        for mode in ToneMapping::ALL {
            assert_eq!(ToneMapping::from_label(mode.label()), Some(mode));
        }
        assert_eq!(ToneMapping::from_label("ACESFilmc"), Some(ToneMapping::AcesFilmic));
        assert_eq!(ToneMapping::from_label("ACESFilmic"), None);
    }

    #[test]
    fn shader_indices_are_distinct() {
        let mut indices: Vec<u32> = ToneMapping::ALL.iter().map(|m| m.shader_index()).collect();
        indices.dedup();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
