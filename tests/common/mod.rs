#![allow(dead_code)]

use lumen::aliases::{Vec2, Vec3};
use lumen::background::Background;
use lumen::baker::{self, BuildContext, ImportedMesh, ImportedModel};
use lumen::config::RenderConfig;
use lumen::model::ModelResource;
use lumen::scene::RenderScene;
use lumen::traversal::TraversalDevice;
use std::sync::Arc;
use tempfile::TempDir;

/// Bake `imported` into a temp asset root, read it back through the
/// resource layer, and bind it to the reference traversal backend.
pub fn bake_and_load(
    imported: &ImportedModel,
    config: &RenderConfig,
    background: Arc<dyn Background>,
) -> (RenderScene, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut ctx = BuildContext::new(dir.path());
    let built = baker::build_model(imported).unwrap();
    baker::bake_model(&mut ctx, &built, &imported.name).unwrap();

    let mut model = ModelResource::read(dir.path(), &imported.name).unwrap();
    model.initialize(dir.path()).unwrap();
    let device = TraversalDevice::new();
    let scene = RenderScene::new(Arc::new(model), &device, config, background).unwrap();
    (scene, dir)
}

pub fn quad_mesh(name: &str, material: &str, corners: [Vec3; 4]) -> ImportedMesh {
    ImportedMesh {
        name: name.to_string(),
        material_name: material.to_string(),
        indices_per_face: 4,
        indices: vec![0, 1, 2, 3],
        positions: corners.to_vec(),
        uvs: vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ],
        ..ImportedMesh::default()
    }
}
