//! Scene file loading
//!
//! A scene file is either a JSON document or a single `.ron` model. The JSON
//! form lists `models` to import, a `graph` of nodes that place them,
//! `animations` targeting nodes and materials, and `helpers`.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde_json::Value;
use thiserror::Error;

use crate::animation::{parse_vec4, InterpolationMode, Keyframe, Sampler};
use crate::assets::{ImportError, ImportedModel, ModelImporter};
use crate::foundation::json::{parse_array, read_dquat, read_dvec3};
use crate::foundation::math::{rotation_from_direction, rotation_from_euler, DVec3, Vec4};
use crate::scene::{
    AnimationAttribute, SceneGraphAnimation, SceneGraphAnimationChannel, SceneGraphLeaf, SceneGraphNode,
};

use super::scene::Scene;

/// Errors that abort loading a scene file
#[derive(Error, Debug)]
pub enum SceneLoadError {
    /// The scene file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The scene file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is valid JSON but not a scene description
    #[error("Unrecognized structure of the scene description file {0}")]
    UnrecognizedStructure(String),

    /// A model loaded as the whole scene failed to import
    #[error("Failed to import model {path}: {source}")]
    ModelImport {
        /// Model file
        path: String,
        /// Importer error
        #[source]
        source: ImportError,
    },
}

/// Progress counters, readable from other threads while a load runs
#[derive(Debug, Default)]
pub struct SceneLoadingStats {
    objects_total: AtomicU32,
    objects_loaded: AtomicU32,
}

impl SceneLoadingStats {
    /// Number of objects the current load will import
    pub fn objects_total(&self) -> u32 {
        self.objects_total.load(Ordering::Acquire)
    }

    /// Number of objects imported so far
    pub fn objects_loaded(&self) -> u32 {
        self.objects_loaded.load(Ordering::Acquire)
    }

    fn reset(&self) {
        self.objects_total.store(0, Ordering::Release);
        self.objects_loaded.store(0, Ordering::Release);
    }

    fn add_total(&self, count: u32) {
        self.objects_total.fetch_add(count, Ordering::AcqRel);
    }

    fn object_loaded(&self) {
        self.objects_loaded.fetch_add(1, Ordering::AcqRel);
    }
}

/// Same rule as `Sampler::load`: a scalar fills `x`, missing values are zero
fn read_up_to_vec4(value: Option<&Value>) -> Vec4 {
    value.and_then(parse_vec4).unwrap_or_else(Vec4::zeros)
}

fn import_model(importer: &dyn ModelImporter, stats: &SceneLoadingStats, path: &Path) -> Option<ImportedModel> {
    let result = importer.import(path);
    stats.object_loaded();
    match result {
        Ok(model) => Some(model),
        Err(err) => {
            log::error!("Failed to load model {}: {err}", path.display());
            None
        }
    }
}

impl Scene {
    /// Replace the scene graph with the contents of a scene file.
    ///
    /// Malformed entries inside the document are skipped with a warning;
    /// only an unreadable or unrecognizable file is an error.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SceneLoadError> {
        let path = path.as_ref();
        log::info!("Loading scene from {}", path.display());

        self.loading_stats.reset();
        self.reset();

        if path.extension().and_then(|ext| ext.to_str()) == Some("ron") {
            self.loading_stats.add_total(1);
            let model = self.importer.import(path);
            self.loading_stats.object_loaded();
            let model = model.map_err(|source| SceneLoadError::ModelImport {
                path: path.display().to_string(),
                source,
            })?;
            let root = model.instantiate(self.type_factory.as_ref());
            self.graph.set_root_node(&root);
            self.models.push(Some(self.graph.root()));
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&contents)?;
        if !document.is_object() {
            return Err(SceneLoadError::UnrecognizedStructure(path.display().to_string()));
        }
        let scene_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.load_document(&document, &scene_dir);
        Ok(())
    }

    fn load_document(&mut self, document: &Value, scene_dir: &Path) {
        let root = SceneGraphNode::named("SceneRoot");
        self.graph.set_root_node(&root);

        if let Some(models) = document.get("models") {
            self.load_models(models, scene_dir);
        }
        if let Some(graph) = document.get("graph") {
            self.load_scene_graph(graph, &self.graph.root());
        }
        if let Some(animations) = document.get("animations") {
            self.load_animations(animations);
        }
        if let Some(helpers) = document.get("helpers") {
            load_helpers(helpers);
        }
    }

    /// Import every listed model; each slot is filled independently and all
    /// imports finish before any node is created.
    fn load_models(&mut self, models: &Value, scene_dir: &Path) {
        let Some(list) = models.as_array() else {
            return;
        };

        let paths: Vec<Option<PathBuf>> = list
            .iter()
            .map(|entry| match entry.as_str() {
                Some(name) => Some(scene_dir.join(name)),
                None => {
                    log::warn!("Model entries must be file names, skipping {entry}");
                    None
                }
            })
            .collect();
        self.loading_stats
            .add_total(u32::try_from(paths.iter().flatten().count()).unwrap_or(u32::MAX));

        let importer = Arc::clone(&self.importer);
        let stats = Arc::clone(&self.loading_stats);
        let import = |path: &Option<PathBuf>| {
            path.as_deref()
                .and_then(|path| import_model(importer.as_ref(), &stats, path))
        };
        let imported: Vec<Option<ImportedModel>> = if self.config.parallel_model_loading {
            paths.par_iter().map(import).collect()
        } else {
            paths.iter().map(import).collect()
        };

        let factory = Rc::clone(&self.type_factory);
        self.models = imported
            .into_iter()
            .map(|model| model.map(|model| model.instantiate(factory.as_ref())))
            .collect();
        log::info!(
            "Loaded {} of {} models",
            self.loading_stats.objects_loaded(),
            self.loading_stats.objects_total()
        );
    }

    /// The first reference to a model moves its root into the graph; later
    /// references attach copies of it.
    fn load_scene_graph(&self, nodes: &Value, parent: &SceneGraphNode) {
        let Some(nodes) = nodes.as_array() else {
            log::warn!("The scene graph definition must be an array of nodes");
            return;
        };

        for src in nodes {
            if !src.is_object() {
                log::warn!("Non-object node in the scene graph definition");
                continue;
            }
            let node_name = src.get("name").and_then(Value::as_str).unwrap_or_default();

            let mut custom_parent = parent.clone();
            match src.get("parent") {
                Some(Value::String(path)) => match self.graph.find_node(path, None) {
                    Some(found) => custom_parent = found,
                    None => {
                        log::warn!("Custom parent '{path}' specified for node '{node_name}' not found, skipping the node");
                        continue;
                    }
                },
                Some(Value::Null) | None => {}
                Some(_) => log::warn!("Custom parent specification for node '{node_name}' is not a string, ignoring"),
            }

            let source_node = match src.get("model") {
                None | Some(Value::Null) => SceneGraphNode::new(),
                Some(model) => {
                    let Some(index) = model.as_i64() else {
                        log::warn!("Model references in the scene graph must be indices into the model array");
                        continue;
                    };
                    let slot = usize::try_from(index).ok().and_then(|index| self.models.get(index));
                    let Some(slot) = slot else {
                        log::warn!("Referenced model {index} is not defined in the model array");
                        continue;
                    };
                    // Models that failed to import leave an empty slot.
                    let Some(root) = slot.clone() else {
                        continue;
                    };
                    root
                }
            };

            let Some(dst) = self.graph.attach(Some(&custom_parent), &source_node) else {
                continue;
            };
            dst.set_name(node_name);

            if let Some(translation) = read_dvec3(src, "translation") {
                dst.set_translation(&translation);
            }
            if let Some(rotation) = read_dquat(src, "rotation") {
                dst.set_rotation(&rotation);
            } else if let Some(euler) = read_dvec3(src, "euler") {
                dst.set_rotation(&rotation_from_euler(&euler));
            }
            if let Some(scaling) = read_dvec3(src, "scaling") {
                dst.set_scaling(&scaling);
            }

            if let Some(children) = src.get("children") {
                self.load_scene_graph(children, &dst);
            }

            match src.get("type") {
                Some(Value::String(type_name)) => match self.type_factory.create_leaf(type_name) {
                    Some(leaf) => {
                        dst.set_leaf(Some(leaf.clone()));
                        leaf.load(src);
                    }
                    None => log::warn!("Unknown leaf type '{type_name}' for node '{}', skipping", dst.name()),
                },
                Some(Value::Null) | None => {}
                Some(_) => log::warn!("Leaf type specification for node '{}' is not a string, skipping", dst.name()),
            }
        }

        parent.reverse_children();
    }

    fn load_animations(&self, animations: &Value) {
        let Some(animations) = animations.as_array() else {
            return;
        };

        let mut container: Option<SceneGraphNode> = None;
        for src in animations {
            let name = src.get("name").and_then(Value::as_str).unwrap_or_default();
            let mut animation = SceneGraphAnimation::new();

            let channels = src.get("channels").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
            for (channel_index, channel) in channels.iter().enumerate() {
                self.load_animation_channel(channel, name, channel_index, &mut animation);
            }

            if animation.channels().is_empty() {
                log::warn!("Animation '{name}' processed with no valid channels, ignoring");
                continue;
            }

            let container = container.get_or_insert_with(|| {
                let node = SceneGraphNode::named("Animations");
                let root = self.graph.root();
                self.graph.attach(Some(&root), &node).unwrap_or(node)
            });
            let node = SceneGraphNode::named(name);
            node.set_leaf(Some(SceneGraphLeaf::animation(animation)));
            self.graph.attach(Some(container), &node);
        }
    }

    fn load_animation_channel(
        &self,
        src: &Value,
        animation_name: &str,
        channel_index: usize,
        animation: &mut SceneGraphAnimation,
    ) {
        let mut sampler = Sampler::new(InterpolationMode::Step);
        match src.get("mode").and_then(Value::as_str) {
            Some(mode) => match InterpolationMode::from_name(mode) {
                Some(mode) => sampler.set_mode(mode),
                None => log::warn!(
                    "Unknown interpolation mode '{mode}' specified for animation '{animation_name}' channel \
                     {channel_index}. Valid interpolation modes are: step, linear, slerp, hermite, catmull-rom"
                ),
            },
            None => log::warn!(
                "Interpolation mode is not specified for animation '{animation_name}' channel {channel_index}, using step"
            ),
        }

        let attribute_name = match src.get("attribute").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name,
            _ => {
                log::warn!("Attribute is not specified for animation '{animation_name}' channel {channel_index}, ignoring");
                return;
            }
        };
        let attribute = AnimationAttribute::from_name(attribute_name).unwrap_or(AnimationAttribute::LeafProperty);

        let data = src.get("data").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
        for (keyframe_index, point) in data.iter().enumerate() {
            let Some(time) = point.get("time").and_then(Value::as_f64) else {
                log::warn!(
                    "Invalid keyframe {keyframe_index} in animation '{animation_name}' channel {channel_index}: \
                     time is not specified or is not numeric"
                );
                continue;
            };
            sampler.add_keyframe(Keyframe {
                time: time as f32,
                value: read_up_to_vec4(point.get("value")),
                in_tangent: read_up_to_vec4(point.get("inTangent")),
                out_tangent: read_up_to_vec4(point.get("outTangent")),
            });
        }
        sampler.sort_keyframes();
        let sampler = Rc::new(sampler);

        let targets: Vec<&Value> = match (src.get("target"), src.get("targets")) {
            (Some(target), _) if !target.is_null() => vec![target],
            (_, Some(Value::Array(targets))) => targets.iter().collect(),
            _ => Vec::new(),
        };

        for target in targets {
            let Some(target) = target.as_str() else {
                if !target.is_null() {
                    log::warn!(
                        "Target node specification for animation '{animation_name}' channel {channel_index} is not a string, ignoring"
                    );
                }
                continue;
            };

            if let Some(material_name) = target.strip_prefix("material:") {
                let Some(material) = self.find_material(material_name) else {
                    log::warn!(
                        "Target material '{material_name}' specified for animation '{animation_name}' channel \
                         {channel_index} not found, ignoring"
                    );
                    continue;
                };
                let mut channel = SceneGraphAnimationChannel::for_material(Rc::clone(&sampler), &material);
                channel.set_leaf_property_name(attribute_name);
                animation.add_channel(channel);
            } else {
                let Some(node) = self.graph.find_node(target, None) else {
                    log::warn!(
                        "Target node '{target}' specified for animation '{animation_name}' channel {channel_index} \
                         not found, ignoring"
                    );
                    continue;
                };
                let mut channel = SceneGraphAnimationChannel::new(Rc::clone(&sampler), &node, attribute);
                if attribute == AnimationAttribute::LeafProperty {
                    channel.set_leaf_property_name(attribute_name);
                }
                animation.add_channel(channel);
            }
        }
    }
}

/// Log the quaternion that orients a node along each listed direction
fn load_helpers(helpers: &Value) {
    let Some(helpers) = helpers.as_array() else {
        return;
    };
    for helper in helpers {
        let Some([x, y, z]) = parse_array::<3>(helper) else {
            continue;
        };
        let direction = DVec3::new(x, y, z);
        let rotation = rotation_from_direction(&direction);
        log::info!(
            "Converted direction [{x}, {y}, {z}] to quaternion [{}, {}, {}, {}]",
            rotation.i,
            rotation.j,
            rotation.k,
            rotation.w
        );
    }
}
