//! Demo driver: bakes a built-in box scene, reads it back through the
//! resource layer, and renders it with the reference traversal backend.

use lumen::aliases::{Vec2, Vec3};
use lumen::background::UniformBackground;
use lumen::baker::{self, BuildContext, ImportedCamera, ImportedMesh, ImportedModel};
use lumen::config::RenderConfig;
use lumen::kernel;
use lumen::material::{material_flags, Material, ScalarAttribute};
use lumen::model::ModelResource;
use lumen::scene::RenderScene;
use lumen::traversal::TraversalDevice;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

const IMAGE_WIDTH: u32 = 256;
const IMAGE_HEIGHT: u32 = 256;
const SAMPLES_PER_PIXEL: u32 = 64;
const OUTPUT_PATH: &str = "render.png";

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();
    if let Err(e) = run() {
        eprintln!("render failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> lumen::Result<()> {
    let start = Instant::now();

    let asset_root = std::env::temp_dir().join("lumen-demo-assets");
    let mut ctx = BuildContext::new(&asset_root);
    let imported = box_scene();
    let built = baker::build_model(&imported)?;
    baker::bake_model(&mut ctx, &built, &imported.name)?;
    info!(elapsed = ?start.elapsed(), "scene baked");

    let mut model = ModelResource::read(&asset_root, &imported.name)?;
    model.initialize(&asset_root)?;
    let model = Arc::new(model);

    let config = RenderConfig {
        image_width: IMAGE_WIDTH,
        image_height: IMAGE_HEIGHT,
        samples_per_pixel: SAMPLES_PER_PIXEL,
        ..RenderConfig::default()
    };
    let device = TraversalDevice::new();
    let scene = RenderScene::new(
        Arc::clone(&model),
        &device,
        &config,
        Arc::new(UniformBackground::black()),
    )?;

    let cancel = AtomicBool::new(false);
    let (framebuffer, summary) = kernel::render(&scene, &config, &cancel)?;
    info!(
        elapsed = ?start.elapsed(),
        incomplete_tiles = summary.incomplete_tiles,
        "render finished"
    );

    framebuffer.save_png(Path::new(OUTPUT_PATH), 1.0 / SAMPLES_PER_PIXEL as f32)?;
    info!(path = OUTPUT_PATH, "image written");
    Ok(())
}

/// A box interior lit by a ceiling quad, with a rough-metal block and a
/// glass panel to exercise every shader family.
fn box_scene() -> ImportedModel {
    let mut white = Material::default();
    white.base_color = Vec3::new(0.73, 0.73, 0.73);

    let mut red = Material::default();
    red.base_color = Vec3::new(0.65, 0.05, 0.05);

    let mut green = Material::default();
    green.base_color = Vec3::new(0.12, 0.45, 0.15);

    let mut metal = Material::default();
    metal.base_color = Vec3::new(0.9, 0.75, 0.4);
    metal.set_scalar(ScalarAttribute::Metallic, 0.9);
    metal.set_scalar(ScalarAttribute::Roughness, 0.25);

    let mut glass = Material::default();
    glass.base_color = Vec3::new(1.0, 1.0, 1.0);
    glass.shader = lumen::bsdf::ShaderTag::TransparentGgx;
    glass.set_scalar(ScalarAttribute::Roughness, 0.0);
    glass.set_scalar(ScalarAttribute::Transmission, 1.0);
    glass.flags |= material_flags::PRESERVE_RAY_DIFFERENTIALS;

    let mut light = Material::default();
    light.emissive = Vec3::new(14.0, 14.0, 14.0);
    light.flags |= material_flags::EMISSIVE;

    let mut meshes = vec![
        quad("floor", "white", [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, -1.0, -1.0),
        ]),
        quad("ceiling", "white", [
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(-1.0, 1.0, 1.0),
        ]),
        quad("back", "white", [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
        ]),
        quad("left", "red", [
            Vec3::new(-1.0, -1.0, -1.0),
            Vec3::new(-1.0, 1.0, -1.0),
            Vec3::new(-1.0, 1.0, 1.0),
            Vec3::new(-1.0, -1.0, 1.0),
        ]),
        quad("right", "green", [
            Vec3::new(1.0, -1.0, -1.0),
            Vec3::new(1.0, -1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, -1.0),
        ]),
        quad("lamp", "light", [
            Vec3::new(-0.3, 0.98, -0.3),
            Vec3::new(0.3, 0.98, -0.3),
            Vec3::new(0.3, 0.98, 0.3),
            Vec3::new(-0.3, 0.98, 0.3),
        ]),
        quad("pane", "glass", [
            Vec3::new(0.1, -1.0, 0.2),
            Vec3::new(0.7, -1.0, 0.0),
            Vec3::new(0.7, 0.0, 0.0),
            Vec3::new(0.1, 0.0, 0.2),
        ]),
    ];
    meshes.push(block("block", "metal", Vec3::new(-0.5, -0.65, -0.3), 0.35));

    ImportedModel {
        name: "demo-box".to_string(),
        camera: ImportedCamera {
            position: Vec3::new(0.0, 0.0, 3.6),
            look_at: Vec3::new(0.0, 0.0, 0.0),
            up: Vec3::y(),
            vertical_fov_degrees: 40.0,
            lens_radius: 0.0,
            focus_distance: 1.0,
        },
        meshes,
        curves: Vec::new(),
        materials: vec![
            ("white".to_string(), white),
            ("red".to_string(), red),
            ("green".to_string(), green),
            ("metal".to_string(), metal),
            ("glass".to_string(), glass),
            ("light".to_string(), light),
        ],
        textures: Vec::new(),
    }
}

fn quad(name: &str, material: &str, corners: [Vec3; 4]) -> ImportedMesh {
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

/// Axis-aligned cube as six quads sharing one mesh.
fn block(name: &str, material: &str, center: Vec3, half: f32) -> ImportedMesh {
    let corner = |sx: f32, sy: f32, sz: f32| center + half * Vec3::new(sx, sy, sz);
    let positions = vec![
        corner(-1.0, -1.0, -1.0), // 0
        corner(1.0, -1.0, -1.0),  // 1
        corner(1.0, 1.0, -1.0),   // 2
        corner(-1.0, 1.0, -1.0),  // 3
        corner(-1.0, -1.0, 1.0),  // 4
        corner(1.0, -1.0, 1.0),   // 5
        corner(1.0, 1.0, 1.0),    // 6
        corner(-1.0, 1.0, 1.0),   // 7
    ];
    let indices = vec![
        4, 5, 6, 7, // front (+z)
        1, 0, 3, 2, // back (-z)
        0, 4, 7, 3, // left (-x)
        5, 1, 2, 6, // right (+x)
        7, 6, 2, 3, // top (+y)
        0, 1, 5, 4, // bottom (-y)
    ];
    ImportedMesh {
        name: name.to_string(),
        material_name: material.to_string(),
        indices_per_face: 4,
        indices,
        positions,
        ..ImportedMesh::default()
    }
}
