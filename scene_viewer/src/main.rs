//! Headless Scene Viewer
//!
//! Loads a scene file, or builds a small demo scene when none is given, and
//! runs a fixed number of frames against the headless device:
//! - animations are sampled at the frame time
//! - the graph and the GPU scene tables are refreshed
//! - the final graph is printed to the log
//!
//! Usage: `scene_viewer [SCENE_FILE] [--config CONFIG_FILE]`

use std::rc::Rc;

use clap::Parser;

use scene_engine::animation::{InterpolationMode, Keyframe, Sampler};
use scene_engine::core::{Config, ConfigError, EngineConfig};
use scene_engine::foundation::logging;
use scene_engine::foundation::math::{DVec3, Vec3, Vec4};
use scene_engine::render::{HeadlessDescriptorTable, HeadlessDevice, RenderError, Scene, SceneLoadError};
use scene_engine::scene::{
    print_scene_graph, AnimationAttribute, Light, Material, MeshInfo, SceneGraphAnimation, SceneGraphAnimationChannel,
    SceneGraphLeaf, SceneGraphNode,
};

#[derive(Debug, thiserror::Error)]
enum ViewerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scene loading failed: {0}")]
    Load(#[from] SceneLoadError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),
}

/// Headless scene runner
#[derive(Debug, Parser)]
#[command(name = "scene_viewer", about = "Loads, animates and refreshes a scene without a window")]
struct Args {
    /// Scene document (.json) or model description (.ron); a demo scene is built when omitted
    #[arg(value_name = "SCENE_FILE")]
    scene_file: Option<String>,

    /// Engine configuration file (.toml or .ron)
    #[arg(long = "config", value_name = "CONFIG_FILE")]
    config_file: Option<String>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ViewerError> {
    let args = Args::parse();

    let config = match &args.config_file {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::new("Scene Viewer"),
    };
    config.validate().map_err(ConfigError::Invalid)?;
    logging::init_with_level(&config.log_level);
    log::info!("Starting {}", config.application_name);

    let mut scene = Scene::new(
        Box::new(HeadlessDevice::new()),
        Some(Box::new(HeadlessDescriptorTable::new())),
        config.scene.clone(),
    );

    match &args.scene_file {
        Some(path) => scene.load(path)?,
        None => build_demo_scene(&scene),
    }
    scene.finished_loading(0)?;

    for frame in 1..=config.frame_count {
        let time = frame as f32 * config.frame_time;
        for animation in scene.graph().animations() {
            animation.apply_animation(time);
        }

        let mut commands = scene.device_mut().create_command_list();
        scene.refresh(commands.as_mut(), frame)?;
        scene.device_mut().execute_command_list(commands)?;

        log::debug!(
            "Frame {frame}: structure changed {}, transforms changed {}",
            scene.structure_changed(),
            scene.transforms_changed()
        );
    }

    log::info!(
        "{} instances, {} geometries, {} materials",
        scene.instance_data().iter().filter(|instance| instance.num_geometries > 0).count(),
        scene.graph().geometry_count(),
        scene.graph().materials().len()
    );
    print_scene_graph(&scene.graph().root());
    Ok(())
}

/// A lit cube spinning about Y, with a pulsing emissive material
fn build_demo_scene(scene: &Scene) {
    let graph = scene.graph();
    let root = graph.root();
    root.set_name("Demo");

    let mut glow = Material::new("glow");
    glow.base_or_diffuse_color = Vec3::new(0.8, 0.3, 0.1);
    glow.emissive_color = Vec3::new(1.0, 0.5, 0.2);
    let glow = glow.into_ref();

    let Some(cube) = graph.attach_leaf_node(
        Some(&root),
        &SceneGraphLeaf::mesh_instance(MeshInfo::cube("cube", 1.0, Some(Rc::clone(&glow))).into_ref()),
    ) else {
        return;
    };
    cube.set_name("Cube");

    let light = SceneGraphNode::named("Sun");
    light.set_leaf(Some(SceneGraphLeaf::light(Light::directional())));
    if let Some(light) = graph.attach(Some(&root), &light) {
        light.set_translation(&DVec3::new(0.0, 10.0, 0.0));
    }

    let mut spin = Sampler::new(InterpolationMode::Slerp);
    spin.add_keyframe(Keyframe::new(0.0, Vec4::new(0.0, 0.0, 0.0, 1.0)));
    spin.add_keyframe(Keyframe::new(0.05, Vec4::new(0.0, 1.0, 0.0, 0.0)));

    let mut pulse = Sampler::new(InterpolationMode::Linear);
    pulse.add_keyframe(Keyframe::new(0.0, Vec4::repeat(0.0)));
    pulse.add_keyframe(Keyframe::new(0.05, Vec4::repeat(4.0)));

    let mut emissive = SceneGraphAnimationChannel::for_material(Rc::new(pulse), &glow);
    emissive.set_leaf_property_name("emissiveIntensity");

    let mut animation = SceneGraphAnimation::new();
    animation.add_channel(SceneGraphAnimationChannel::new(Rc::new(spin), &cube, AnimationAttribute::Rotation));
    animation.add_channel(emissive);

    let animations = SceneGraphNode::named("Animations");
    animations.set_leaf(Some(SceneGraphLeaf::animation(animation)));
    graph.attach(Some(&root), &animations);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("scene_viewer").chain(list.iter().copied()))
    }

    #[test]
    fn test_args() {
        let parsed = args(&["scene.json", "--config", "viewer.toml"]).unwrap();
        assert_eq!(parsed.scene_file.as_deref(), Some("scene.json"));
        assert_eq!(parsed.config_file.as_deref(), Some("viewer.toml"));

        assert!(args(&[]).unwrap().scene_file.is_none());
        assert!(args(&[]).unwrap().config_file.is_none());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_command_definition() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_demo_scene_animates() {
        let mut scene = Scene::new(Box::new(HeadlessDevice::new()), None, EngineConfig::default().scene);
        build_demo_scene(&scene);
        scene.finished_loading(0).unwrap();

        assert_eq!(scene.graph().mesh_instances().len(), 1);
        assert_eq!(scene.graph().lights().len(), 1);
        let animations = scene.graph().animations();
        assert_eq!(animations.len(), 1);

        assert!(animations[0].apply_animation(0.05));
        let glow = scene.find_material("glow").unwrap();
        assert!((glow.borrow().emissive_intensity - 4.0).abs() < 1e-6);
        assert!(glow.borrow().dirty);
    }

    #[test]
    fn test_bundled_demo_scene_loads() {
        let mut scene = Scene::new(
            Box::new(HeadlessDevice::new()),
            Some(Box::new(HeadlessDescriptorTable::new())),
            EngineConfig::default().scene,
        );
        scene.load(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/demo.json")).unwrap();
        scene.finished_loading(0).unwrap();

        let graph = scene.graph();
        assert_eq!(graph.mesh_instances().len(), 4);
        assert_eq!(graph.meshes().len(), 2);
        assert_eq!(graph.lights().len(), 2);
        assert_eq!(graph.cameras().len(), 1);
        assert!(graph.find_node("/Right/latch", None).is_some());

        let animations = graph.animations();
        assert_eq!(animations.len(), 1);
        assert_eq!(animations[0].as_animation().map(|a| a.channels().len()), Some(3));
    }

    #[test]
    fn test_bundled_config_parses() {
        let config = EngineConfig::load_from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/viewer.toml")).unwrap();
        assert_eq!(config.frame_count, 4);
        assert!(config.scene.parallel_model_loading);
        assert!(config.validate().is_ok());
    }
}
