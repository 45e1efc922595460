//! Asset import

pub mod importer;

pub use importer::{
    GeometryDescription, ImportError, ImportedModel, MaterialDescription, MeshDescription, ModelImporter,
    NodeDescription, RonModelImporter, SkinDescription,
};
