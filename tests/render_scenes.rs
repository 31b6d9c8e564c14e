//! End-to-end render scenarios through the full pipeline: bake, attach,
//! bind, trace, accumulate.

mod common;

use common::{bake_and_load, quad_mesh};
use lumen::aliases::Vec3;
use lumen::background::UniformBackground;
use lumen::baker::{ImportedCamera, ImportedCurve, ImportedModel};
use lumen::bsdf::ShaderTag;
use lumen::config::RenderConfig;
use lumen::kernel;
use lumen::material::{material_flags, Material, ScalarAttribute};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn small_config(spp: u32) -> RenderConfig {
    RenderConfig {
        image_width: 32,
        image_height: 32,
        samples_per_pixel: spp,
        tile_size: 16,
        ..RenderConfig::default()
    }
}

fn empty_model(name: &str) -> ImportedModel {
    ImportedModel {
        name: name.to_string(),
        camera: ImportedCamera::default(),
        meshes: Vec::new(),
        curves: Vec::new(),
        materials: Vec::new(),
        textures: Vec::new(),
    }
}

#[test]
fn empty_scene_reproduces_the_environment_exactly() {
    let config = small_config(4);
    let (scene, _dir) = bake_and_load(
        &empty_model("empty"),
        &config,
        Arc::new(UniformBackground::new(&Vec3::new(1.0, 1.0, 1.0))),
    );
    let cancel = AtomicBool::new(false);
    let (fb, summary) = kernel::render(&scene, &config, &cancel).unwrap();
    assert_eq!(summary.incomplete_tiles, 0);
    for px in fb.pixels() {
        for c in 0..3 {
            assert!((px[c] - config.samples_per_pixel as f32).abs() < 1e-3);
        }
    }
}

#[test]
fn smooth_glass_pane_passes_the_furnace_test() {
    // A lossless dielectric in a uniform unit environment: reflection and
    // refraction weights sum to one, so every pixel averages to 1.
    let mut glass = Material::default();
    glass.shader = ShaderTag::TransparentGgx;
    glass.base_color = Vec3::new(1.0, 1.0, 1.0);
    glass.set_scalar(ScalarAttribute::Roughness, 0.0);
    glass.set_scalar(ScalarAttribute::Transmission, 1.0);

    let mut model = empty_model("glass-furnace");
    model.meshes.push(quad_mesh(
        "pane",
        "glass",
        [
            Vec3::new(-2.0, -2.0, 0.0),
            Vec3::new(2.0, -2.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(-2.0, 2.0, 0.0),
        ],
    ));
    model.materials.push(("glass".to_string(), glass));
    model.camera = ImportedCamera {
        position: Vec3::new(0.0, 0.0, 2.0),
        look_at: Vec3::zeros(),
        ..ImportedCamera::default()
    };

    let config = small_config(32);
    let (scene, _dir) = bake_and_load(
        &model,
        &config,
        Arc::new(UniformBackground::new(&Vec3::new(1.0, 1.0, 1.0))),
    );
    let cancel = AtomicBool::new(false);
    let (fb, _) = kernel::render(&scene, &config, &cancel).unwrap();
    let mean = fb.mean_luminance(1.0 / config.samples_per_pixel as f32);
    println!("[glass furnace] mean {}", mean);
    assert!((mean - 1.0).abs() < 0.01, "mean {}", mean);
}

fn overhead_light_model() -> ImportedModel {
    // White diffuse floor fully covered by a large emissive ceiling one
    // unit above; the lamp itself is black so nothing interreflects.
    let mut white = Material::default();
    white.base_color = Vec3::new(0.73, 0.73, 0.73);
    white.set_scalar(ScalarAttribute::Roughness, 0.0);
    // No dielectric specular so the mean tracks the diffuse albedo alone.
    white.set_scalar(ScalarAttribute::Specular, 0.0);

    let mut lamp = Material::default();
    lamp.base_color = Vec3::zeros();
    lamp.emissive = Vec3::new(1.0, 1.0, 1.0);
    lamp.flags |= material_flags::EMISSIVE;

    let mut model = empty_model("overhead");
    model.meshes.push(quad_mesh(
        "floor",
        "white",
        [
            Vec3::new(-5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, -5.0),
        ],
    ));
    model.meshes.push(quad_mesh(
        "lamp",
        "lamp",
        [
            Vec3::new(-10.0, 1.0, -10.0),
            Vec3::new(10.0, 1.0, -10.0),
            Vec3::new(10.0, 1.0, 10.0),
            Vec3::new(-10.0, 1.0, 10.0),
        ],
    ));
    model.materials.push(("white".to_string(), white));
    model.materials.push(("lamp".to_string(), lamp));
    model.camera = ImportedCamera {
        position: Vec3::new(0.0, 0.5, 0.0),
        look_at: Vec3::new(0.0, 0.0, 0.0),
        up: Vec3::z(),
        vertical_fov_degrees: 60.0,
        lens_radius: 0.0,
        focus_distance: 1.0,
    };
    model
}

#[test]
fn lambertian_floor_under_a_covering_light_matches_albedo() {
    // With the hemisphere above the floor (almost) fully covered by a
    // unit emitter, the floor radiance approaches albedo * Le. The Burley
    // diffuse retro term sheds a couple of percent against the ideal
    // Lambertian value.
    let config = small_config(64);
    let (scene, _dir) = bake_and_load(
        &overhead_light_model(),
        &config,
        Arc::new(UniformBackground::black()),
    );
    let cancel = AtomicBool::new(false);
    let (fb, _) = kernel::render(&scene, &config, &cancel).unwrap();
    let mean = fb.mean_luminance(1.0 / config.samples_per_pixel as f32);
    println!("[overhead light] mean {}", mean);
    let ideal = 0.73;
    assert!(mean > 0.88 * ideal && mean < 1.02 * ideal, "mean {}", mean);
}

#[test]
fn fixed_seed_is_deterministic_across_worker_counts() {
    let mut config = small_config(8);
    config.worker_count = 1;
    let (scene, _dir) = bake_and_load(
        &overhead_light_model(),
        &config,
        Arc::new(UniformBackground::black()),
    );
    let cancel = AtomicBool::new(false);
    let (fb_single, _) = kernel::render(&scene, &config, &cancel).unwrap();

    config.worker_count = 4;
    let (fb_multi, _) = kernel::render(&scene, &config, &cancel).unwrap();

    assert_eq!(fb_single.pixels().len(), fb_multi.pixels().len());
    for (a, b) in fb_single.pixels().iter().zip(fb_multi.pixels()) {
        assert_eq!(a, b);
    }
}

#[test]
fn russian_roulette_is_unbiased_within_noise() {
    let base = small_config(96);
    let cancel = AtomicBool::new(false);

    let mut with_roulette = base.clone();
    with_roulette.roulette_start = 0;
    let (scene_a, _dir_a) = bake_and_load(
        &overhead_light_model(),
        &with_roulette,
        Arc::new(UniformBackground::black()),
    );
    let (fb_a, _) = kernel::render(&scene_a, &with_roulette, &cancel).unwrap();

    let mut without_roulette = base.clone();
    without_roulette.roulette_start = u32::MAX;
    let (scene_b, _dir_b) = bake_and_load(
        &overhead_light_model(),
        &without_roulette,
        Arc::new(UniformBackground::black()),
    );
    let (fb_b, _) = kernel::render(&scene_b, &without_roulette, &cancel).unwrap();

    let mean_a = fb_a.mean_luminance(1.0 / with_roulette.samples_per_pixel as f32);
    let mean_b = fb_b.mean_luminance(1.0 / without_roulette.samples_per_pixel as f32);
    println!("[roulette] with {} without {}", mean_a, mean_b);
    assert!(
        (mean_a - mean_b).abs() < 0.03 * mean_b.max(1e-3),
        "{} vs {}",
        mean_a,
        mean_b
    );
}

#[test]
fn alpha_tested_quad_shows_the_background_where_alpha_is_low() {
    // Texture: left half fully transparent, right half opaque.
    let dir = tempfile::tempdir().unwrap();
    let size = 8u32;
    let mut img = image::RgbaImage::new(size, size);
    for (x, _y, px) in img.enumerate_pixels_mut() {
        let alpha = if x < size / 2 { 0 } else { 255 };
        *px = image::Rgba([40, 40, 40, alpha]);
    }
    img.save(dir.path().join("leaf.png")).unwrap();

    let mut leaf = Material::default();
    leaf.base_color = Vec3::new(0.05, 0.05, 0.05);
    leaf.albedo_texture = 0;
    leaf.flags |= material_flags::ALPHA_TESTED;

    let mut model = empty_model("leaf");
    model.textures.push("leaf".to_string());
    model.materials.push(("leaf".to_string(), leaf));
    model.meshes.push(quad_mesh(
        "quad",
        "leaf",
        [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ],
    ));
    model.camera = ImportedCamera {
        position: Vec3::new(0.0, 0.0, 2.4),
        look_at: Vec3::zeros(),
        ..ImportedCamera::default()
    };

    let config = small_config(16);
    // Bake into the same dir that holds the texture.
    let mut ctx = lumen::baker::BuildContext::new(dir.path());
    let built = lumen::baker::build_model(&model).unwrap();
    lumen::baker::bake_model(&mut ctx, &built, &model.name).unwrap();
    let mut resource = lumen::model::ModelResource::read(dir.path(), &model.name).unwrap();
    resource.initialize(dir.path()).unwrap();
    let device = lumen::traversal::TraversalDevice::new();
    let scene = lumen::scene::RenderScene::new(
        Arc::new(resource),
        &device,
        &config,
        Arc::new(UniformBackground::new(&Vec3::new(1.0, 1.0, 1.0))),
    )
    .unwrap();

    let cancel = AtomicBool::new(false);
    let (fb, _) = kernel::render(&scene, &config, &cancel).unwrap();
    let spp = config.samples_per_pixel as f32;
    // u < 0.5 maps to world x < 0, the left of the image.
    let transparent = fb.pixel(config.image_width / 4, config.image_height / 2);
    let opaque = fb.pixel(3 * config.image_width / 4, config.image_height / 2);
    println!("[alpha] transparent {:?} opaque {:?}", transparent, opaque);
    assert!((transparent[0] / spp - 1.0).abs() < 0.02, "{:?}", transparent);
    assert!(opaque[0] / spp < 0.5, "{:?}", opaque);
}

#[test]
fn curves_render_as_occluders() {
    let mut dark = Material::default();
    dark.base_color = Vec3::new(0.02, 0.02, 0.02);

    let mut model = empty_model("hair");
    model.materials.push(("dark".to_string(), dark));
    model.curves.push(ImportedCurve {
        name: "dark".to_string(),
        control_points: vec![
            lumen::aliases::Vec4::new(-1.5, 0.0, 0.0, 0.25),
            lumen::aliases::Vec4::new(0.0, 0.0, 0.0, 0.25),
            lumen::aliases::Vec4::new(1.5, 0.0, 0.0, 0.25),
        ],
    });
    model.camera = ImportedCamera {
        position: Vec3::new(0.0, 0.0, 3.0),
        look_at: Vec3::zeros(),
        ..ImportedCamera::default()
    };

    let config = small_config(8);
    let (scene, _dir) = bake_and_load(
        &model,
        &config,
        Arc::new(UniformBackground::new(&Vec3::new(1.0, 1.0, 1.0))),
    );
    let cancel = AtomicBool::new(false);
    let (fb, _) = kernel::render(&scene, &config, &cancel).unwrap();
    let spp = config.samples_per_pixel as f32;
    let center = fb.pixel(config.image_width / 2, config.image_height / 2);
    let corner = fb.pixel(1, 1);
    println!("[curves] center {:?} corner {:?}", center, corner);
    assert!(center[0] / spp < 0.8, "curve did not occlude: {:?}", center);
    assert!((corner[0] / spp - 1.0).abs() < 0.05, "{:?}", corner);
}

#[test]
fn cancellation_marks_tiles_incomplete() {
    let config = small_config(4);
    let (scene, _dir) = bake_and_load(
        &overhead_light_model(),
        &config,
        Arc::new(UniformBackground::black()),
    );
    let cancel = AtomicBool::new(true); // cancelled before the first pixel
    let (_fb, summary) = kernel::render(&scene, &config, &cancel).unwrap();
    let tile_count =
        lumen::framebuffer::make_tiles(config.image_width, config.image_height, config.tile_size)
            .len() as u32;
    assert_eq!(summary.incomplete_tiles, tile_count);
}
