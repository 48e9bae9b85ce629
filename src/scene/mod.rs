pub mod material_sync;
mod params;

pub use params::GlobalParams;

use crate::assets::{EnvironmentMap, ImportedModel, TextureHandle, TextureStore};
use glam::{Mat4, Quat, Vec3};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(usize);

impl MaterialId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(usize);

impl GeometryId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Local transform relative to the parent node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Indexed triangle list.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshGeometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshGeometry {
    /// Single-segment plane in the XY plane, facing +Z, centered on the origin.
    /// Texture coordinates start at the top-left corner, like glTF.
    pub fn plane(width: f32, height: f32) -> Self {
        let (hw, hh) = (width * 0.5, height * 0.5);
        Self {
            positions: vec![[-hw, hh, 0.0], [hw, hh, 0.0], [-hw, -hh, 0.0], [hw, -hh, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 4],
            uvs: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]],
            indices: vec![0, 2, 1, 2, 3, 1],
        }
    }

    /// Area-weighted vertex normals for geometry that ships without them.
    pub fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for triangle in indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            if a >= positions.len() || b >= positions.len() || c >= positions.len() {
                continue;
            }
            let (pa, pb, pc) = (
                Vec3::from_array(positions[a]),
                Vec3::from_array(positions[b]),
                Vec3::from_array(positions[c]),
            );
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
            .collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlphaMode {
    Opaque,
    Mask { cutoff: f32 },
    Blend,
}

/// Physically based metallic-roughness material.
///
/// `occlusion`, `roughness_map` and `metalness_map` read the R, G and B channels of their
/// texture, so one packed AO/roughness/metalness image can back all three.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardMaterial {
    pub name: String,
    pub base_color_factor: [f32; 4],
    pub base_color: Option<TextureHandle>,
    pub normal: Option<TextureHandle>,
    pub occlusion: Option<TextureHandle>,
    pub roughness_map: Option<TextureHandle>,
    pub metalness_map: Option<TextureHandle>,
    pub roughness: f32,
    pub metalness: f32,
    pub env_map_intensity: f32,
    pub double_sided: bool,
    pub alpha_mode: AlphaMode,
}

impl Default for StandardMaterial {
    fn default() -> Self {
        Self {
            name: "standard".to_string(),
            base_color_factor: [1.0, 1.0, 1.0, 1.0],
            base_color: None,
            normal: None,
            occlusion: None,
            roughness_map: None,
            metalness_map: None,
            roughness: 1.0,
            metalness: 0.0,
            env_map_intensity: 1.0,
            double_sided: false,
            alpha_mode: AlphaMode::Opaque,
        }
    }
}

/// Unlit flat color.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub name: String,
    pub color: [f32; 4],
    pub double_sided: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Standard(StandardMaterial),
    Basic(BasicMaterial),
}

impl Material {
    pub fn name(&self) -> &str {
        match self {
            Material::Standard(material) => &material.name,
            Material::Basic(material) => &material.name,
        }
    }

    pub fn double_sided(&self) -> bool {
        match self {
            Material::Standard(material) => material.double_sided,
            Material::Basic(material) => material.double_sided,
        }
    }
}

/// Materials shared by id between meshes.
#[derive(Debug, Default)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn add(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.0)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (MaterialId, &Material)> {
        self.materials
            .iter()
            .enumerate()
            .map(|(index, material)| (MaterialId(index), material))
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Orthographic shadow camera and map settings of a directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightShadow {
    pub map_size: u32,
    pub camera_near: f32,
    pub camera_far: f32,
    pub camera_half_extent: f32,
    /// Added to the receiver depth in light space; negative values fight acne.
    pub bias: f32,
    /// World-space offset of the receiver along its normal.
    pub normal_bias: f32,
}

impl Default for LightShadow {
    fn default() -> Self {
        Self {
            map_size: 512,
            camera_near: 0.5,
            camera_far: 500.0,
            camera_half_extent: 5.0,
            bias: 0.0,
            normal_bias: 0.0,
        }
    }
}

/// Shines from the node position towards `target` (world space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub target: Vec3,
    pub cast_shadow: bool,
    pub shadow: LightShadow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Group,
    Mesh(Mesh),
    DirectionalLight(DirectionalLight),
    Camera,
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub content: NodeContent,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mesh ready for drawing: world matrix resolved, flags copied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    pub node: NodeId,
    pub geometry: GeometryId,
    pub material: MaterialId,
    pub world: Mat4,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// World-space view of the scene's directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightView {
    pub position: Vec3,
    pub target: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadow: bool,
    pub shadow: LightShadow,
}

impl LightView {
    /// Unit vector from the lit surface towards the light.
    pub fn direction(&self) -> Vec3 {
        (self.position - self.target)
            .try_normalize()
            .unwrap_or(Vec3::Y)
    }
}

/// The node tree plus everything nodes reference by id. The root owns every node.
pub struct Scene {
    nodes: Vec<SceneNode>,
    geometries: Vec<MeshGeometry>,
    pub materials: MaterialLibrary,
    pub textures: TextureStore,
    pub background: Option<Arc<EnvironmentMap>>,
    pub environment: Option<Arc<EnvironmentMap>>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: vec![SceneNode {
                name: "Scene".to_string(),
                transform: Transform::IDENTITY,
                content: NodeContent::Group,
                parent: None,
                children: Vec::new(),
            }],
            geometries: Vec::new(),
            materials: MaterialLibrary::default(),
            textures: TextureStore::new(),
            background: None,
            environment: None,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a child to `parent`. Falls back to the root for an unknown parent.
    pub fn add_node(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        transform: Transform,
        content: NodeContent,
    ) -> NodeId {
        let parent = if parent.0 < self.nodes.len() {
            parent
        } else {
            self.root()
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneNode {
            name: name.into(),
            transform,
            content,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_geometry(&mut self, geometry: MeshGeometry) -> GeometryId {
        self.geometries.push(geometry);
        GeometryId(self.geometries.len() - 1)
    }

    pub fn geometry(&self, id: GeometryId) -> Option<&MeshGeometry> {
        self.geometries.get(id.0)
    }

    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    /// Pre-order ids of every node reachable from the root.
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn traverse<F>(&self, mut visit: F)
    where
        F: FnMut(NodeId, &SceneNode),
    {
        for id in self.depth_first() {
            visit(id, &self.nodes[id.0]);
        }
    }

    pub fn world_matrix(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = self.node(id);
        while let Some(node) = current {
            matrix = node.transform.matrix() * matrix;
            current = node.parent.and_then(|parent| self.node(parent));
        }
        matrix
    }

    pub fn draw_list(&self) -> Vec<DrawItem> {
        let mut draws = Vec::new();
        let mut stack = vec![(self.root(), Mat4::IDENTITY)];
        while let Some((id, parent_world)) = stack.pop() {
            let node = &self.nodes[id.0];
            let world = parent_world * node.transform.matrix();
            if let NodeContent::Mesh(mesh) = &node.content {
                draws.push(DrawItem {
                    node: id,
                    geometry: mesh.geometry,
                    material: mesh.material,
                    world,
                    cast_shadow: mesh.cast_shadow,
                    receive_shadow: mesh.receive_shadow,
                });
            }
            stack.extend(node.children.iter().rev().map(|child| (*child, world)));
        }
        draws
    }

    pub fn find_directional_light(&self) -> Option<NodeId> {
        self.depth_first().into_iter().find(|id| {
            matches!(
                self.nodes[id.0].content,
                NodeContent::DirectionalLight(_)
            )
        })
    }

    pub fn directional_light(&self) -> Option<LightView> {
        let id = self.find_directional_light()?;
        let NodeContent::DirectionalLight(light) = &self.nodes[id.0].content else {
            return None;
        };
        Some(LightView {
            position: self.world_matrix(id).w_axis.truncate(),
            target: light.target,
            color: light.color,
            intensity: light.intensity,
            cast_shadow: light.cast_shadow,
            shadow: light.shadow,
        })
    }

    /// Copy an imported glTF model into the scene under `parent`; returns the new subtree root.
    pub fn attach_model(
        &mut self,
        parent: NodeId,
        model: ImportedModel,
        transform: Transform,
    ) -> NodeId {
        let ImportedModel {
            name,
            roots,
            meshes,
            materials,
            images,
        } = model;

        let textures: Vec<TextureHandle> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| {
                self.textures.insert_ready(
                    format!("{name}#image{index}"),
                    image.image,
                    image.color_space,
                )
            })
            .collect();
        let texture = |index: Option<usize>| index.and_then(|i| textures.get(i).copied());

        let material_ids: Vec<MaterialId> = materials
            .into_iter()
            .map(|imported| {
                let metallic_roughness = texture(imported.metallic_roughness_texture);
                self.materials.add(Material::Standard(StandardMaterial {
                    name: imported.name,
                    base_color_factor: imported.base_color_factor,
                    base_color: texture(imported.base_color_texture),
                    normal: texture(imported.normal_texture),
                    occlusion: texture(imported.occlusion_texture),
                    roughness_map: metallic_roughness,
                    metalness_map: metallic_roughness,
                    roughness: imported.roughness_factor,
                    metalness: imported.metallic_factor,
                    env_map_intensity: 1.0,
                    double_sided: imported.double_sided,
                    alpha_mode: imported.alpha_mode,
                }))
            })
            .collect();
        let mut default_material = None;

        // Each glTF mesh may hold several primitives; one geometry per primitive.
        let mut mesh_parts: Vec<Vec<(GeometryId, Option<usize>)>> =
            Vec::with_capacity(meshes.len());
        for mesh in meshes {
            let parts = mesh
                .primitives
                .into_iter()
                .map(|primitive| (self.add_geometry(primitive.geometry), primitive.material))
                .collect();
            mesh_parts.push(parts);
        }

        let model_root = self.add_node(parent, name, transform, NodeContent::Group);
        let mut pending: Vec<(NodeId, crate::assets::model::ImportedNode)> =
            roots.into_iter().rev().map(|node| (model_root, node)).collect();
        while let Some((parent_id, imported)) = pending.pop() {
            let node_id = self.add_node(
                parent_id,
                imported.name.clone(),
                imported.transform,
                NodeContent::Group,
            );
            if let Some(parts) = imported.mesh.and_then(|index| mesh_parts.get(index)) {
                for (part, (geometry, material)) in parts.iter().enumerate() {
                    let material = match material.and_then(|i| material_ids.get(i).copied()) {
                        Some(material) => material,
                        None => *default_material.get_or_insert_with(|| {
                            self.materials
                                .add(Material::Standard(StandardMaterial::default()))
                        }),
                    };
                    self.add_node(
                        node_id,
                        format!("{}#{}", imported.name, part),
                        Transform::IDENTITY,
                        NodeContent::Mesh(Mesh {
                            geometry: *geometry,
                            material,
                            cast_shadow: false,
                            receive_shadow: false,
                        }),
                    );
                }
            }
            pending.extend(
                imported
                    .children
                    .into_iter()
                    .rev()
                    .map(|child| (node_id, child)),
            );
        }
        model_root
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}
