//! Dirty and content bitsets carried by scene graph nodes

use bitflags::bitflags;

bitflags! {
    /// Per-node change tracking consumed by [`SceneGraph::refresh`](super::SceneGraph::refresh)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DirtyFlags: u32 {
        /// The node's own TRS changed
        const LOCAL_TRANSFORM = 0x01;
        /// The node's transform changed last frame; previous transforms need a refresh
        const PREV_TRANSFORM = 0x02;
        /// The node's leaf was replaced
        const LEAF = 0x04;
        /// Nodes were attached or detached somewhere below
        const SUBGRAPH_STRUCTURE = 0x08;
        /// A transform changed somewhere below
        const SUBGRAPH_TRANSFORMS = 0x10;
        /// Previous transforms need a refresh somewhere below
        const SUBGRAPH_PREV_TRANSFORMS = 0x20;
        /// Leaf content classification changed somewhere below
        const SUBGRAPH_CONTENT_UPDATE = 0x40;
        /// All subgraph bits
        const SUBGRAPH_MASK = Self::SUBGRAPH_STRUCTURE.bits()
            | Self::SUBGRAPH_TRANSFORMS.bits()
            | Self::SUBGRAPH_PREV_TRANSFORMS.bits()
            | Self::SUBGRAPH_CONTENT_UPDATE.bits();
    }
}

bitflags! {
    /// Classification of what a leaf, or a whole subgraph, contains
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SceneContentFlags: u32 {
        /// Meshes with opaque materials
        const OPAQUE_MESHES = 0x01;
        /// Meshes with alpha-tested materials
        const ALPHA_TESTED_MESHES = 0x02;
        /// Meshes with blended or transmissive materials
        const BLENDED_MESHES = 0x04;
        /// Lights
        const LIGHTS = 0x08;
        /// Cameras
        const CAMERAS = 0x10;
        /// Animations
        const ANIMATIONS = 0x20;
    }
}
