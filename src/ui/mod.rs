use crate::render::{RendererSettings, ToneMapping};
use crate::scene::material_sync::update_all_materials;
use crate::scene::{GlobalParams, NodeContent, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// The single field a binding reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingTarget {
    EnvMapIntensity,
    LightIntensity,
    LightPosition(Axis),
    ToneMapping,
    ToneMappingExposure,
}

/// Work to run after a binding wrote its field, before the next event or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChange {
    SyncMaterials,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BindingValue {
    Number(f32),
    Choice(usize),
}

/// Everything a binding may write to, borrowed for the duration of one panel pass.
pub struct BindingContext<'a> {
    pub params: &'a mut GlobalParams,
    pub scene: &'a mut Scene,
    pub renderer: &'a mut RendererSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub label: &'static str,
    pub target: BindingTarget,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Non-empty for enum bindings; the value is an index into this list.
    pub choices: Vec<&'static str>,
    pub on_change: Option<OnChange>,
}

impl Binding {
    fn number(
        label: &'static str,
        target: BindingTarget,
        min: f32,
        max: f32,
        step: f32,
        on_change: Option<OnChange>,
    ) -> Self {
        Self {
            label,
            target,
            min,
            max,
            step,
            choices: Vec::new(),
            on_change,
        }
    }

    #[cfg(test)]
    pub fn is_choice(&self) -> bool {
        !self.choices.is_empty()
    }

    #[cfg(test)]
    pub fn choice_index(&self, label: &str) -> Option<usize> {
        self.choices.iter().position(|choice| *choice == label)
    }

    /// Clamp to the range, then snap to the nearest step above `min`.
    ///
    /// Steps are decimal (0.001, 0.01), so snapping counts whole steps in decimal units.
    /// Values already on the grid come back unchanged.
    pub fn quantize(&self, value: f32) -> f32 {
        if !value.is_finite() {
            return self.min;
        }
        let value = value.clamp(self.min, self.max);
        if self.step <= 0.0 {
            return value;
        }
        let scale = 10f64.powi(step_decimals(self.step));
        let min = (f64::from(self.min) * scale).round();
        let max = (f64::from(self.max) * scale).round();
        let step = (f64::from(self.step) * scale).round().max(1.0);
        let steps = ((f64::from(value) * scale - min) / step).round();
        let snapped = (min + steps * step).clamp(min, max);
        (snapped / scale) as f32
    }

    pub fn read(&self, ctx: &BindingContext<'_>) -> BindingValue {
        match self.target {
            BindingTarget::EnvMapIntensity => BindingValue::Number(ctx.params.env_map_intensity),
            BindingTarget::LightIntensity => BindingValue::Number(
                ctx.scene
                    .directional_light()
                    .map(|light| light.intensity)
                    .unwrap_or(0.0),
            ),
            BindingTarget::LightPosition(axis) => {
                let position = ctx
                    .scene
                    .find_directional_light()
                    .and_then(|id| ctx.scene.node(id))
                    .map(|node| node.transform.position)
                    .unwrap_or_default();
                BindingValue::Number(match axis {
                    Axis::X => position.x,
                    Axis::Y => position.y,
                    Axis::Z => position.z,
                })
            }
            BindingTarget::ToneMapping => BindingValue::Choice(
                ToneMapping::ALL
                    .iter()
                    .position(|mode| *mode == ctx.renderer.tone_mapping)
                    .unwrap_or(0),
            ),
            BindingTarget::ToneMappingExposure => {
                BindingValue::Number(ctx.renderer.tone_mapping_exposure)
            }
        }
    }

    /// Write `value` into the target field and return the hook the caller must run.
    pub fn apply(&self, value: BindingValue, ctx: &mut BindingContext<'_>) -> Option<OnChange> {
        match (self.target, value) {
            (BindingTarget::ToneMapping, BindingValue::Choice(index)) => {
                let index = index.min(ToneMapping::ALL.len() - 1);
                ctx.renderer.tone_mapping = ToneMapping::ALL[index];
            }
            (BindingTarget::ToneMapping, BindingValue::Number(_)) => {
                log::debug!("Ignoring numeric value for enum binding {}", self.label);
                return None;
            }
            (target, BindingValue::Number(raw)) => {
                let value = self.quantize(raw);
                if !write_number(target, value, ctx) {
                    log::debug!("Binding {} has no target in the scene", self.label);
                    return None;
                }
            }
            (_, BindingValue::Choice(_)) => {
                log::debug!("Ignoring choice value for numeric binding {}", self.label);
                return None;
            }
        }
        self.on_change
    }
}

fn write_number(target: BindingTarget, value: f32, ctx: &mut BindingContext<'_>) -> bool {
    match target {
        BindingTarget::EnvMapIntensity => {
            ctx.params.env_map_intensity = value;
            true
        }
        BindingTarget::ToneMappingExposure => {
            ctx.renderer.tone_mapping_exposure = value;
            true
        }
        BindingTarget::LightIntensity | BindingTarget::LightPosition(_) => {
            let Some(node) = ctx
                .scene
                .find_directional_light()
                .and_then(|id| ctx.scene.node_mut(id))
            else {
                return false;
            };
            match (target, &mut node.content) {
                (BindingTarget::LightIntensity, NodeContent::DirectionalLight(light)) => {
                    light.intensity = value;
                }
                (BindingTarget::LightPosition(Axis::X), _) => node.transform.position.x = value,
                (BindingTarget::LightPosition(Axis::Y), _) => node.transform.position.y = value,
                (BindingTarget::LightPosition(Axis::Z), _) => node.transform.position.z = value,
                _ => return false,
            }
            true
        }
        BindingTarget::ToneMapping => false,
    }
}

/// Decimal places needed to write `step` exactly, up to six.
fn step_decimals(step: f32) -> i32 {
    let step = f64::from(step);
    (0..=6)
        .find(|decimals| {
            let scaled = step * 10f64.powi(*decimals);
            (scaled - scaled.round()).abs() < 1e-6 * scaled.max(1.0)
        })
        .unwrap_or(6)
}

pub fn run_hook(hook: OnChange, ctx: &mut BindingContext<'_>) {
    match hook {
        OnChange::SyncMaterials => update_all_materials(ctx.scene, ctx.params),
    }
}

pub fn default_bindings() -> Vec<Binding> {
    let light_axis = |label, axis| {
        Binding::number(label, BindingTarget::LightPosition(axis), -10.0, 10.0, 0.001, None)
    };
    vec![
        Binding::number(
            "envMapIntensity",
            BindingTarget::EnvMapIntensity,
            0.0,
            10.0,
            0.001,
            Some(OnChange::SyncMaterials),
        ),
        Binding::number("lightIntensity", BindingTarget::LightIntensity, 0.0, 10.0, 0.001, None),
        light_axis("lightX", Axis::X),
        light_axis("lightY", Axis::Y),
        light_axis("lightZ", Axis::Z),
        Binding {
            label: "toneMapping",
            target: BindingTarget::ToneMapping,
            min: 0.0,
            max: (ToneMapping::ALL.len() - 1) as f32,
            step: 1.0,
            choices: ToneMapping::ALL.iter().map(|mode| mode.label()).collect(),
            on_change: None,
        },
        Binding::number(
            "toneMappingExposure",
            BindingTarget::ToneMappingExposure,
            0.0,
            10.0,
            0.01,
            None,
        ),
    ]
}

/// Floating parameter window plus a read-only asset status list.
pub struct DebugPanel {
    bindings: Vec<Binding>,
    status: Vec<String>,
    pending_assets: usize,
}

impl DebugPanel {
    pub fn new(bindings: Vec<Binding>) -> Self {
        Self {
            bindings,
            status: Vec::new(),
            pending_assets: 0,
        }
    }

    pub fn push_status(&mut self, line: impl Into<String>) {
        self.status.push(line.into());
    }

    pub fn set_pending_assets(&mut self, pending: usize) {
        self.pending_assets = pending;
    }

    /// Draw the panel; every changed binding and its hook are applied before this returns.
    pub fn show(&mut self, egui_ctx: &egui::Context, ctx: &mut BindingContext<'_>) -> bool {
        let mut changed = false;
        let bindings = &self.bindings;
        let status = &self.status;
        let pending = self.pending_assets;

        egui::Window::new("Debug")
            .default_pos([12.0, 12.0])
            .resizable(false)
            .show(egui_ctx, |ui| {
                for binding in bindings {
                    let edited = match binding.read(ctx) {
                        BindingValue::Number(mut value) => {
                            let response = ui.add(
                                egui::Slider::new(&mut value, binding.min..=binding.max)
                                    .step_by(f64::from(binding.step))
                                    .text(binding.label),
                            );
                            response.changed().then_some(BindingValue::Number(value))
                        }
                        BindingValue::Choice(current) => {
                            let mut selected = current;
                            egui::ComboBox::from_label(binding.label)
                                .selected_text(
                                    binding.choices.get(current).copied().unwrap_or_default(),
                                )
                                .show_ui(ui, |ui| {
                                    for (index, choice) in binding.choices.iter().enumerate() {
                                        ui.selectable_value(&mut selected, index, *choice);
                                    }
                                });
                            (selected != current).then_some(BindingValue::Choice(selected))
                        }
                    };
                    if let Some(value) = edited {
                        log::debug!("{} -> {:?}", binding.label, value);
                        if let Some(hook) = binding.apply(value, ctx) {
                            run_hook(hook, ctx);
                        }
                        changed = true;
                    }
                }

                if pending > 0 || !status.is_empty() {
                    ui.separator();
                }
                if pending > 0 {
                    ui.label(format!("Loading {pending} asset(s)..."));
                }
                for line in status {
                    ui.colored_label(egui::Color32::from_rgb(230, 160, 60), line.as_str());
                }
            });

        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        BasicMaterial, DirectionalLight, LightShadow, Material, Mesh, MeshGeometry,
        StandardMaterial, Transform,
    };
    use glam::Vec3;

    fn demo_scene() -> Scene {
        let mut scene = Scene::new();
        scene.add_node(
            scene.root(),
            "directionalLight",
            Transform::from_position(Vec3::new(-4.0, 6.5, 2.5)),
            NodeContent::DirectionalLight(DirectionalLight {
                color: Vec3::ONE,
                intensity: 6.0,
                target: Vec3::new(0.0, 4.0, 0.0),
                cast_shadow: true,
                shadow: LightShadow::default(),
            }),
        );
        let geometry = scene.add_geometry(MeshGeometry::plane(8.0, 8.0));
        for material in [
            Material::Standard(StandardMaterial::default()),
            Material::Basic(BasicMaterial {
                name: "helper".to_string(),
                color: [1.0; 4],
                double_sided: false,
            }),
        ] {
            let material = scene.materials.add(material);
            scene.add_node(
                scene.root(),
                "mesh",
                Transform::IDENTITY,
                NodeContent::Mesh(Mesh {
                    geometry,
                    material,
                    cast_shadow: false,
                    receive_shadow: false,
                }),
            );
        }
        scene
    }

    fn binding(label: &str) -> Binding {
        default_bindings()
            .into_iter()
            .find(|binding| binding.label == label)
            .unwrap()
    }

    #[test]
    fn default_bindings_match_panel_layout() {
        let labels: Vec<&str> = default_bindings().iter().map(|b| b.label).collect();
        assert_eq!(
            labels,
            vec![
                "envMapIntensity",
                "lightIntensity",
                "lightX",
                "lightY",
                "lightZ",
                "toneMapping",
                "toneMappingExposure"
            ]
        );
        assert_eq!(binding("toneMappingExposure").step, 0.01);
        assert!(binding("toneMapping").is_choice());
        assert!(!binding("lightX").is_choice());
        assert_eq!(binding("lightZ").min, -10.0);
        assert_eq!(
            binding("toneMapping").choices,
            vec!["No", "Linear", "Reinhard", "Cineon", "ACESFilmc"]
        );
    }

    #[test]
    fn env_map_intensity_hook_syncs_standard_materials_only() {
        let mut scene = demo_scene();
        let mut params = GlobalParams::default();
        let mut renderer = RendererSettings::default();
        let basic_before: Vec<Material> = scene
            .materials
            .iter()
            .filter(|(_, m)| matches!(m, Material::Basic(_)))
            .map(|(_, m)| m.clone())
            .collect();
        let mut ctx = BindingContext {
            params: &mut params,
            scene: &mut scene,
            renderer: &mut renderer,
        };

        let hook = binding("envMapIntensity").apply(BindingValue::Number(3.5), &mut ctx);
        assert_eq!(hook, Some(OnChange::SyncMaterials));
        run_hook(OnChange::SyncMaterials, &mut ctx);

        assert_eq!(params.env_map_intensity, 3.5);
        for (_, material) in scene.materials.iter() {
            if let Material::Standard(standard) = material {
                assert_eq!(standard.env_map_intensity, 3.5);
            }
        }
        let basic_after: Vec<Material> = scene
            .materials
            .iter()
            .filter(|(_, m)| matches!(m, Material::Basic(_)))
            .map(|(_, m)| m.clone())
            .collect();
        assert_eq!(basic_before, basic_after);
    }

    #[test]
    fn light_intensity_binding_touches_only_intensity() {
        let mut scene = demo_scene();
        let mut params = GlobalParams::default();
        let mut renderer = RendererSettings::default();
        let light_before = scene.directional_light().unwrap();
        let params_before = params;
        let renderer_before = renderer;
        let mut ctx = BindingContext {
            params: &mut params,
            scene: &mut scene,
            renderer: &mut renderer,
        };

        let intensity = binding("lightIntensity");
        assert_eq!(intensity.read(&ctx), BindingValue::Number(6.0));
        assert_eq!(intensity.apply(BindingValue::Number(8.0), &mut ctx), None);

        let light_after = scene.directional_light().unwrap();
        assert_eq!(light_after.intensity, 8.0);
        assert_eq!(
            crate::scene::LightView {
                intensity: light_before.intensity,
                ..light_after
            },
            light_before
        );
        assert_eq!(params, params_before);
        assert_eq!(renderer, renderer_before);
    }

    #[test]
    fn light_position_bindings_move_the_light_node() {
        let mut scene = demo_scene();
        let mut params = GlobalParams::default();
        let mut renderer = RendererSettings::default();
        let mut ctx = BindingContext {
            params: &mut params,
            scene: &mut scene,
            renderer: &mut renderer,
        };
        binding("lightY").apply(BindingValue::Number(9.25), &mut ctx);
        let light = scene.directional_light().unwrap();
        assert!((light.position - Vec3::new(-4.0, 9.25, 2.5)).length() < 1e-5);
    }

    #[test]
    fn tone_mapping_selection_leaves_exposure_alone() {
        let mut scene = demo_scene();
        let mut params = GlobalParams::default();
        let mut renderer = RendererSettings {
            tone_mapping_exposure: 1.7,
            ..RendererSettings::default()
        };
        let mut ctx = BindingContext {
            params: &mut params,
            scene: &mut scene,
            renderer: &mut renderer,
        };
        let tone = binding("toneMapping");
        let index = tone.choice_index("ACESFilmc").unwrap();
        assert_eq!(tone.apply(BindingValue::Choice(index), &mut ctx), None);
        assert_eq!(renderer.tone_mapping, ToneMapping::AcesFilmic);
        assert_eq!(renderer.tone_mapping_exposure, 1.7);
    }

    #[test]
    fn numeric_values_are_clamped_and_snapped() {
        let exposure = binding("toneMappingExposure");
        assert_eq!(exposure.quantize(42.0), 10.0);
        assert_eq!(exposure.quantize(-1.0), 0.0);
        assert!((exposure.quantize(1.234) - 1.23).abs() < 1e-6);
        assert!((exposure.quantize(1.236) - 1.24).abs() < 1e-6);
        assert_eq!(exposure.quantize(f32::NAN), 0.0);

        let light_x = binding("lightX");
        assert!((light_x.quantize(-3.2504) - (-3.25)).abs() < 1e-5);
        assert_eq!(light_x.quantize(-11.0), -10.0);
    }

    #[test]
    fn values_on_the_step_grid_are_kept_exactly() {
        for label in ["envMapIntensity", "lightX", "toneMappingExposure"] {
            let binding = binding(label);
            let scale = if binding.step < 0.005 { 1000 } else { 100 };
            let low = (binding.min as i32) * scale;
            let high = (binding.max as i32) * scale;
            for units in (low..=high).step_by(7) {
                let value = (f64::from(units) / f64::from(scale)) as f32;
                assert_eq!(binding.quantize(value), value, "{label} at {value}");
            }
        }
        assert_eq!(binding("envMapIntensity").quantize(3.5), 3.5);
        assert_eq!(binding("lightY").quantize(6.5), 6.5);
    }

    #[test]
    fn bindings_without_a_light_do_nothing() {
        let mut scene = Scene::new();
        let mut params = GlobalParams::default();
        let mut renderer = RendererSettings::default();
        let mut ctx = BindingContext {
            params: &mut params,
            scene: &mut scene,
            renderer: &mut renderer,
        };
        assert_eq!(binding("lightIntensity").apply(BindingValue::Number(2.0), &mut ctx), None);
        assert_eq!(binding("lightIntensity").read(&ctx), BindingValue::Number(0.0));
    }
}
