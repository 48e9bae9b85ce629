use super::{GlobalParams, Material, NodeContent, Scene};

/// Push the global reflection intensity and shadow flags onto every standard-shaded mesh
/// reachable from the root. Basic materials and non-mesh nodes are left alone.
pub fn update_all_materials(scene: &mut Scene, params: &GlobalParams) {
    let mut touched = 0usize;
    for id in scene.depth_first() {
        let material_id = match scene.node(id).map(|node| &node.content) {
            Some(NodeContent::Mesh(mesh)) => mesh.material,
            _ => continue,
        };
        let Some(Material::Standard(material)) = scene.materials.get_mut(material_id) else {
            continue;
        };
        material.env_map_intensity = params.env_map_intensity;

        if let Some(NodeContent::Mesh(mesh)) = scene.node_mut(id).map(|node| &mut node.content) {
            mesh.cast_shadow = true;
            mesh.receive_shadow = true;
        }
        touched += 1;
    }
    log::debug!(
        "Material sync: {} meshes at envMapIntensity {}",
        touched,
        params.env_map_intensity
    );
}
