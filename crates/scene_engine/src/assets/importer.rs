//! Model import
//!
//! Importing is split in two so it can run on worker threads: a
//! [`ModelImporter`] turns a file into an [`ImportedModel`], which is plain
//! `Send` data, and [`ImportedModel::instantiate`] later builds the
//! `Rc`-based scene objects on the thread that owns the graph.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::foundation::math::{Box3, DMat4, DQuat, DVec3, Quaternion, Vec2, Vec3, Vec4};
use crate::scene::mesh::pack_normal;
use crate::scene::{
    BufferGroup, BufferGroupRef, MaterialDomain, MaterialRef, MeshGeometry, MeshInfo, MeshRef, SceneGraphLeaf,
    SceneGraphNode, SceneTypeFactory, SkinnedMeshJoint,
};

/// Errors produced while importing a model file
#[derive(Error, Debug)]
pub enum ImportError {
    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid model description
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The description parsed but is inconsistent
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// No importer handles this file type
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),
}

/// Reads model files into [`ImportedModel`]s. Called from worker threads.
pub trait ModelImporter: Send + Sync {
    /// Import the model stored at `path`
    fn import(&self, path: &Path) -> Result<ImportedModel, ImportError>;
}

/// Material parameters of an imported model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialDescription {
    /// Name, unique within the model
    pub name: String,
    /// Blending domain
    pub domain: MaterialDomain,
    /// Base or diffuse color
    pub base_color: [f32; 3],
    /// Specular color
    pub specular_color: [f32; 3],
    /// Emissive color
    pub emissive_color: [f32; 3],
    /// Emissive multiplier
    pub emissive_intensity: f32,
    /// Metalness
    pub metalness: f32,
    /// Roughness
    pub roughness: f32,
    /// Opacity
    pub opacity: f32,
    /// Alpha test threshold
    pub alpha_cutoff: f32,
    /// Specular transmission
    pub transmission_factor: f32,
    /// Index of refraction
    pub ior: f32,
    /// Render back faces
    pub double_sided: bool,
    /// Specular-gloss parameterization
    pub use_specular_gloss_model: bool,
}

impl Default for MaterialDescription {
    fn default() -> Self {
        Self {
            name: String::new(),
            domain: MaterialDomain::Opaque,
            base_color: [1.0, 1.0, 1.0],
            specular_color: [0.0, 0.0, 0.0],
            emissive_color: [0.0, 0.0, 0.0],
            emissive_intensity: 1.0,
            metalness: 0.0,
            roughness: 0.0,
            opacity: 1.0,
            alpha_cutoff: 0.5,
            transmission_factor: 0.0,
            ior: 1.5,
            double_sided: false,
            use_specular_gloss_model: false,
        }
    }
}

/// Range of a mesh drawn with one material
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryDescription {
    /// Material name
    pub material: Option<String>,
    /// First index, relative to the mesh
    pub index_offset: u32,
    /// Index count
    pub num_indices: u32,
    /// First vertex, relative to the mesh
    pub vertex_offset: u32,
    /// Vertex count
    pub num_vertices: u32,
}

/// Vertex streams and draw ranges of one mesh
///
/// Optional streams are either empty or as long as `positions`. A mesh
/// without `geometries` is drawn as a single geometry using `material`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDescription {
    /// Mesh name
    pub name: String,
    /// Positions
    pub positions: Vec<[f32; 3]>,
    /// Unit normals
    pub normals: Vec<[f32; 3]>,
    /// Tangents with handedness in `w`
    pub tangents: Vec<[f32; 4]>,
    /// Primary texture coordinates
    pub tex_coords: Vec<[f32; 2]>,
    /// Secondary texture coordinates
    pub tex_coords2: Vec<[f32; 2]>,
    /// Skin joint indices
    pub joint_indices: Vec<[u16; 4]>,
    /// Skin joint weights
    pub joint_weights: Vec<[f32; 4]>,
    /// Triangle list indices, relative to the mesh
    pub indices: Vec<u32>,
    /// Material of the implicit single geometry
    pub material: Option<String>,
    /// Draw ranges
    pub geometries: Vec<GeometryDescription>,
}

impl MeshDescription {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Draw ranges, with the implicit single geometry filled in
    fn resolved_geometries(&self) -> Vec<GeometryDescription> {
        if !self.geometries.is_empty() {
            return self.geometries.clone();
        }
        vec![GeometryDescription {
            material: self.material.clone(),
            index_offset: 0,
            num_indices: u32::try_from(self.indices.len()).unwrap_or(u32::MAX),
            vertex_offset: 0,
            num_vertices: u32::try_from(self.positions.len()).unwrap_or(u32::MAX),
        }]
    }
}

/// Binding of a node to a skinned mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinDescription {
    /// Index into [`ImportedModel::meshes`] of the bind-pose mesh
    pub mesh: usize,
    /// Joint node paths relative to the model root, e.g. `"hips/spine"`
    pub joints: Vec<String>,
    /// Column-major inverse bind matrices, one per joint; identity if empty
    pub inverse_bind_matrices: Vec<[f64; 16]>,
}

/// A node of an imported model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDescription {
    /// Node name
    pub name: String,
    /// Translation
    pub translation: Option<[f64; 3]>,
    /// XYZW rotation quaternion
    pub rotation: Option<[f64; 4]>,
    /// Scaling
    pub scaling: Option<[f64; 3]>,
    /// Index into [`ImportedModel::meshes`] of a static mesh drawn here
    pub mesh: Option<usize>,
    /// Skinned mesh drawn here
    pub skin: Option<SkinDescription>,
    /// Child nodes, in order
    pub children: Vec<NodeDescription>,
}

/// Scene-independent description of a model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportedModel {
    /// Model name, used for the root node
    pub name: String,
    /// Materials
    pub materials: Vec<MaterialDescription>,
    /// Meshes; all of them share one vertex and one index buffer
    pub meshes: Vec<MeshDescription>,
    /// Top-level nodes
    pub nodes: Vec<NodeDescription>,
    /// File the model was read from
    #[serde(skip)]
    pub source_file: String,
}

fn invalid(message: String) -> ImportError {
    ImportError::InvalidModel(message)
}

fn walk_nodes<'a>(nodes: &'a [NodeDescription], visit: &mut impl FnMut(&'a NodeDescription)) {
    for node in nodes {
        visit(node);
        walk_nodes(&node.children, visit);
    }
}

impl ImportedModel {
    /// Check cross-references and stream lengths
    pub fn validate(&self) -> Result<(), ImportError> {
        let material_names: Vec<&str> = self.materials.iter().map(|m| m.name.as_str()).collect();

        for mesh in &self.meshes {
            let vertices = mesh.vertex_count();
            let streams = [
                ("normals", mesh.normals.len()),
                ("tangents", mesh.tangents.len()),
                ("tex_coords", mesh.tex_coords.len()),
                ("tex_coords2", mesh.tex_coords2.len()),
                ("joint_indices", mesh.joint_indices.len()),
                ("joint_weights", mesh.joint_weights.len()),
            ];
            for (stream, len) in streams {
                if len != 0 && len != vertices {
                    return Err(invalid(format!(
                        "mesh '{}' has {len} {stream} for {vertices} positions",
                        mesh.name
                    )));
                }
            }
            if let Some(index) = mesh.indices.iter().find(|&&index| index as usize >= vertices) {
                return Err(invalid(format!("mesh '{}' references vertex {index} of {vertices}", mesh.name)));
            }

            for geometry in mesh.resolved_geometries() {
                let index_end = geometry.index_offset as usize + geometry.num_indices as usize;
                let vertex_end = geometry.vertex_offset as usize + geometry.num_vertices as usize;
                if index_end > mesh.indices.len() || vertex_end > vertices {
                    return Err(invalid(format!("a geometry of mesh '{}' is out of range", mesh.name)));
                }
                if let Some(material) = &geometry.material {
                    if !material_names.contains(&material.as_str()) {
                        return Err(invalid(format!("mesh '{}' uses unknown material '{material}'", mesh.name)));
                    }
                }
            }
        }

        let mut result = Ok(());
        walk_nodes(&self.nodes, &mut |node| {
            if result.is_err() {
                return;
            }
            if node.mesh.is_some() && node.skin.is_some() {
                result = Err(invalid(format!("node '{}' has both a mesh and a skin", node.name)));
            } else if node.mesh.is_some_and(|mesh| mesh >= self.meshes.len()) {
                result = Err(invalid(format!("node '{}' references a missing mesh", node.name)));
            } else if let Some(skin) = &node.skin {
                if skin.mesh >= self.meshes.len() {
                    result = Err(invalid(format!("skin of node '{}' references a missing mesh", node.name)));
                } else if !skin.inverse_bind_matrices.is_empty()
                    && skin.inverse_bind_matrices.len() != skin.joints.len()
                {
                    result = Err(invalid(format!(
                        "skin of node '{}' has {} joints but {} inverse bind matrices",
                        node.name,
                        skin.joints.len(),
                        skin.inverse_bind_matrices.len()
                    )));
                }
            }
        });
        result
    }

    /// Build the model's node tree.
    ///
    /// Returns a free-standing root node named after the model, ready to be
    /// attached to a graph. All meshes share one buffer group.
    pub fn instantiate(&self, factory: &dyn SceneTypeFactory) -> SceneGraphNode {
        let materials: HashMap<&str, MaterialRef> = self
            .materials
            .iter()
            .map(|description| (description.name.as_str(), self.build_material(description, factory)))
            .collect();

        let group = self.build_buffer_group().into_ref();
        let mut index_offset = 0;
        let mut vertex_offset = 0;
        let meshes: Vec<MeshRef> = self
            .meshes
            .iter()
            .map(|description| {
                let mesh = build_mesh(description, factory, &group, &materials, index_offset, vertex_offset);
                index_offset += mesh.total_indices;
                vertex_offset += mesh.total_vertices;
                Rc::new(mesh)
            })
            .collect();

        let root = SceneGraphNode::named(self.name.clone());
        let mut skins = Vec::new();
        for description in &self.nodes {
            let node = build_node(description, factory, &meshes, &mut skins);
            root.link_child(&node);
        }
        root.reverse_children();

        for (leaf, skin) in skins {
            bind_joints(&root, &leaf, skin);
        }

        log::debug!(
            "Instantiated model '{}': {} meshes, {} materials",
            self.name,
            meshes.len(),
            materials.len()
        );
        root
    }

    fn build_material(&self, description: &MaterialDescription, factory: &dyn SceneTypeFactory) -> MaterialRef {
        let mut material = factory.create_material(&description.name);
        material.model_file_name.clone_from(&self.source_file);
        material.domain = description.domain;
        material.base_or_diffuse_color = Vec3::from(description.base_color);
        material.specular_color = Vec3::from(description.specular_color);
        material.emissive_color = Vec3::from(description.emissive_color);
        material.emissive_intensity = description.emissive_intensity;
        material.metalness = description.metalness;
        material.roughness = description.roughness;
        material.opacity = description.opacity;
        material.alpha_cutoff = description.alpha_cutoff;
        material.transmission_factor = description.transmission_factor;
        material.ior = description.ior;
        material.double_sided = description.double_sided;
        material.use_specular_gloss_model = description.use_specular_gloss_model;
        material.into_ref()
    }

    /// Concatenate every mesh's streams; a stream present in any mesh is
    /// zero-filled for the meshes that lack it.
    fn build_buffer_group(&self) -> BufferGroup {
        let any = |has: fn(&MeshDescription) -> bool| self.meshes.iter().any(has);
        let with_normals = any(|m| !m.normals.is_empty());
        let with_tangents = any(|m| !m.tangents.is_empty());
        let with_tex_coords = any(|m| !m.tex_coords.is_empty());
        let with_tex_coords2 = any(|m| !m.tex_coords2.is_empty());
        let with_joints = any(|m| !m.joint_indices.is_empty());

        let mut group = BufferGroup::new();
        for mesh in &self.meshes {
            let vertices = mesh.vertex_count();
            group.index_data.extend_from_slice(&mesh.indices);
            group.position_data.extend(mesh.positions.iter().copied().map(Vec3::from));

            if with_normals {
                group.normal_data.extend(
                    padded(&mesh.normals, vertices).map(|n| pack_normal(&Vec3::from(n), 0.0)),
                );
            }
            if with_tangents {
                group.tangent_data.extend(
                    padded(&mesh.tangents, vertices).map(|t| pack_normal(&Vec3::new(t[0], t[1], t[2]), t[3])),
                );
            }
            if with_tex_coords {
                group.tex_coord1_data.extend(padded(&mesh.tex_coords, vertices).map(Vec2::from));
            }
            if with_tex_coords2 {
                group.tex_coord2_data.extend(padded(&mesh.tex_coords2, vertices).map(Vec2::from));
            }
            if with_joints {
                group.joint_data.extend(padded(&mesh.joint_indices, vertices));
                group.weight_data.extend(padded(&mesh.joint_weights, vertices).map(Vec4::from));
            }
        }
        group
    }
}

fn padded<T: Copy + Default>(values: &[T], len: usize) -> impl Iterator<Item = T> + '_ {
    values.iter().copied().chain(std::iter::repeat(T::default())).take(len)
}

fn build_mesh(
    description: &MeshDescription,
    factory: &dyn SceneTypeFactory,
    group: &BufferGroupRef,
    materials: &HashMap<&str, MaterialRef>,
    index_offset: u32,
    vertex_offset: u32,
) -> MeshInfo {
    let geometries: Vec<MeshGeometry> = description
        .resolved_geometries()
        .into_iter()
        .map(|geometry| {
            let first = geometry.vertex_offset as usize;
            let last = first + geometry.num_vertices as usize;
            let bounds = description
                .positions
                .get(first..last)
                .unwrap_or_default()
                .iter()
                .fold(Box3::empty(), |bounds, p| {
                    let p = Vec3::from(*p);
                    bounds.union(&Box3 { min: p, max: p })
                });
            MeshGeometry {
                material: geometry.material.as_deref().and_then(|name| materials.get(name)).cloned(),
                object_space_bounds: bounds,
                index_offset_in_mesh: geometry.index_offset,
                vertex_offset_in_mesh: geometry.vertex_offset,
                num_indices: geometry.num_indices,
                num_vertices: geometry.num_vertices,
                ..MeshGeometry::default()
            }
        })
        .collect();

    let mut mesh = factory.create_mesh(&description.name);
    mesh.object_space_bounds = geometries
        .iter()
        .fold(Box3::empty(), |bounds, geometry| bounds.union(&geometry.object_space_bounds));
    mesh.geometries = geometries;
    *mesh.buffers.get_mut() = Some(Rc::clone(group));
    mesh.index_offset = index_offset;
    mesh.vertex_offset = vertex_offset;
    mesh.total_indices = u32::try_from(description.indices.len()).unwrap_or(u32::MAX);
    mesh.total_vertices = u32::try_from(description.positions.len()).unwrap_or(u32::MAX);
    mesh
}

fn build_node<'a>(
    description: &'a NodeDescription,
    factory: &dyn SceneTypeFactory,
    meshes: &[MeshRef],
    skins: &mut Vec<(SceneGraphLeaf, &'a SkinDescription)>,
) -> SceneGraphNode {
    let node = SceneGraphNode::named(description.name.clone());
    node.set_transform(
        description.translation.map(DVec3::from).as_ref(),
        description
            .rotation
            .map(|[x, y, z, w]| DQuat::new_normalize(Quaternion::new(w, x, y, z)))
            .as_ref(),
        description.scaling.map(DVec3::from).as_ref(),
    );

    if let Some(mesh) = description.mesh.and_then(|index| meshes.get(index)) {
        node.set_leaf(Some(factory.create_mesh_instance(Rc::clone(mesh))));
    } else if let Some(skin) = &description.skin {
        if let Some(prototype) = meshes.get(skin.mesh) {
            let leaf = SceneGraphLeaf::skinned_mesh_instance(prototype);
            node.set_leaf(Some(leaf.clone()));
            skins.push((leaf, skin));
        }
    }

    for child in &description.children {
        node.link_child(&build_node(child, factory, meshes, skins));
    }
    node.reverse_children();
    node
}

/// Follow a `/`-separated path of child names below `root`
fn find_relative(root: &SceneGraphNode, path: &str) -> Option<SceneGraphNode> {
    path.split('/')
        .filter(|part| !part.is_empty())
        .try_fold(root.clone(), |node, name| node.children().find(|child| child.name() == name))
}

fn bind_joints(root: &SceneGraphNode, leaf: &SceneGraphLeaf, skin: &SkinDescription) {
    let mut joints = Vec::with_capacity(skin.joints.len());
    for (index, path) in skin.joints.iter().enumerate() {
        let Some(node) = find_relative(root, path) else {
            log::warn!("Joint '{path}' of a skinned mesh not found, using the model root");
            joints.push(SkinnedMeshJoint {
                node: root.downgrade(),
                inverse_bind_matrix: DMat4::identity(),
            });
            continue;
        };
        let inverse_bind_matrix = skin
            .inverse_bind_matrices
            .get(index)
            .map_or_else(DMat4::identity, |m| DMat4::from_column_slice(m));

        if node.leaf().is_none() {
            node.set_leaf(Some(SceneGraphLeaf::skinned_mesh_reference(leaf)));
        }
        joints.push(SkinnedMeshJoint {
            node: node.downgrade(),
            inverse_bind_matrix,
        });
    }

    if let Some(mut skinned) = leaf.as_skinned_mesh_instance_mut() {
        skinned.joints = joints;
    }
}

/// Importer for `.ron` model descriptions
#[derive(Debug, Default, Clone, Copy)]
pub struct RonModelImporter;

impl RonModelImporter {
    /// Create the importer
    pub fn new() -> Self {
        Self
    }

    /// Parse and validate a description held in memory
    pub fn import_str(&self, contents: &str) -> Result<ImportedModel, ImportError> {
        let model: ImportedModel = ron::from_str(contents)?;
        model.validate()?;
        Ok(model)
    }
}

impl ModelImporter for RonModelImporter {
    fn import(&self, path: &Path) -> Result<ImportedModel, ImportError> {
        if path.extension().and_then(|ext| ext.to_str()) != Some("ron") {
            return Err(ImportError::UnsupportedFormat(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        let mut model = self.import_str(&contents)?;
        model.source_file = path.display().to_string();
        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        log::info!(
            "Imported model '{}' from {}: {} meshes, {} materials",
            model.name,
            model.source_file,
            model.meshes.len(),
            model.materials.len()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::DefaultSceneTypeFactory;

    const TWO_MESHES: &str = r#"(
        name: "props",
        materials: [ (name: "wood", roughness: 0.7), (name: "glass", domain: AlphaBlended, opacity: 0.2) ],
        meshes: [
            (
                name: "plank",
                positions: [(0.0, 0.0, 0.0), (2.0, 0.0, 0.0), (2.0, 1.0, 0.0)],
                normals: [(0.0, 0.0, 1.0), (0.0, 0.0, 1.0), (0.0, 0.0, 1.0)],
                indices: [0, 1, 2],
                material: Some("wood"),
            ),
            (
                name: "pane",
                positions: [(0.0, 0.0, 0.0), (0.0, 1.0, 0.0), (1.0, 1.0, 0.0), (1.0, 0.0, 0.0)],
                indices: [0, 1, 2, 2, 3, 0],
                geometries: [
                    (material: Some("glass"), index_offset: 0, num_indices: 3, vertex_offset: 0, num_vertices: 3),
                    (material: Some("wood"), index_offset: 3, num_indices: 3, vertex_offset: 0, num_vertices: 4),
                ],
            ),
        ],
        nodes: [
            (name: "first", mesh: Some(0), translation: Some((1.0, 0.0, 0.0))),
            (name: "second", mesh: Some(1), children: [ (name: "inner") ]),
        ],
    )"#;

    #[test]
    fn test_meshes_share_one_buffer_group() {
        let model = RonModelImporter::new().import_str(TWO_MESHES).unwrap();
        let root = model.instantiate(&DefaultSceneTypeFactory);

        let names: Vec<String> = root.children().map(|child| child.name()).collect();
        assert_eq!(names, ["first", "second"]);
        assert_eq!(root.name(), "props");

        let plank = root.first_child().and_then(|node| node.leaf()).and_then(|leaf| leaf.mesh()).unwrap();
        let pane = root.children().nth(1).and_then(|node| node.leaf()).and_then(|leaf| leaf.mesh()).unwrap();
        assert!(Rc::ptr_eq(&plank.buffer_group().unwrap(), &pane.buffer_group().unwrap()));
        assert_eq!((pane.index_offset, pane.vertex_offset), (3, 3));
        assert_eq!(pane.geometries.len(), 2);
        assert_eq!(plank.object_space_bounds.max, Vec3::new(2.0, 1.0, 0.0));

        let group = plank.buffer_group().unwrap();
        let group = group.borrow();
        assert_eq!(group.position_data.len(), 7);
        assert_eq!(group.normal_data.len(), 7);
        assert_eq!(group.normal_data[3], 0);
        assert!(group.tex_coord1_data.is_empty());
        assert_eq!(group.index_data.len(), 9);

        let glass = pane.geometries[0].material.as_ref().unwrap();
        assert_eq!(glass.borrow().domain, MaterialDomain::AlphaBlended);
        let wood = plank.geometries[0].material.as_ref().unwrap();
        assert!(Rc::ptr_eq(wood, pane.geometries[1].material.as_ref().unwrap()));
    }

    #[test]
    fn test_validation_rejects_inconsistent_models() {
        let importer = RonModelImporter::new();
        let short_normals = r#"(meshes: [(name: "m", positions: [(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)], normals: [(0.0, 0.0, 1.0)])])"#;
        assert!(matches!(importer.import_str(short_normals), Err(ImportError::InvalidModel(_))));

        let bad_index = r#"(meshes: [(name: "m", positions: [(0.0, 0.0, 0.0)], indices: [0, 0, 4])])"#;
        assert!(matches!(importer.import_str(bad_index), Err(ImportError::InvalidModel(_))));

        let bad_material = r#"(meshes: [(name: "m", positions: [(0.0, 0.0, 0.0)], material: Some("missing"))])"#;
        assert!(matches!(importer.import_str(bad_material), Err(ImportError::InvalidModel(_))));

        let bad_node = r#"(nodes: [(name: "n", children: [(name: "c", mesh: Some(3))])])"#;
        assert!(matches!(importer.import_str(bad_node), Err(ImportError::InvalidModel(_))));

        assert!(matches!(importer.import_str("(meshes: 5)"), Err(ImportError::Parse(_))));
    }

    #[test]
    fn test_skins_bind_joints_by_relative_path() {
        let source = r#"(
            name: "walker",
            meshes: [(
                name: "legs",
                positions: [(0.0, 0.0, 0.0), (0.0, 1.0, 0.0)],
                joint_indices: [(0, 0, 0, 0), (1, 0, 0, 0)],
                joint_weights: [(1.0, 0.0, 0.0, 0.0), (1.0, 0.0, 0.0, 0.0)],
                indices: [0, 1, 1],
            )],
            nodes: [
                (name: "hips", children: [(name: "knee", translation: Some((0.0, -1.0, 0.0)))]),
                (name: "body", skin: Some((mesh: 0, joints: ["hips", "hips/knee"]))),
            ],
        )"#;
        let model = RonModelImporter::new().import_str(source).unwrap();
        let root = model.instantiate(&DefaultSceneTypeFactory);

        let hips = root.first_child().unwrap();
        let knee = hips.first_child().unwrap();
        let body = root.children().nth(1).and_then(|node| node.leaf()).unwrap();

        let skinned = body.as_skinned_mesh_instance().unwrap();
        assert_eq!(skinned.joints.len(), 2);
        assert!(skinned.joints[1].node.points_to(&knee));
        assert_eq!(skinned.prototype_mesh().name, "legs");
        drop(skinned);

        let reference = knee.leaf().unwrap();
        let instance = reference.as_skinned_mesh_reference().and_then(|r| r.instance().upgrade());
        assert_eq!(instance, Some(body));
    }

    #[test]
    fn test_importer_rejects_other_extensions() {
        let result = RonModelImporter::new().import(Path::new("model.gltf"));
        assert!(matches!(result, Err(ImportError::UnsupportedFormat(_))));
    }
}
