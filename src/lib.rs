//! lumen: a physically-based offline rendering core.
//!
//! The crate turns an immutable [`scene::SceneView`] into one or more
//! raster images through an accumulating, filtered, multi-layer
//! [`film::ImageFilm`]. A [`render::RenderDriver`] runs antialiasing
//! passes over a fixed worker pool, deciding between passes where extra
//! samples are needed from per-pixel noise estimates; a family of
//! [`integrator::SurfaceIntegrator`]s supplies the light transport.
//! Partial films can be saved, combined and resumed bit-exactly.

pub mod background;
pub mod camera;
pub mod color;
pub mod error;
pub mod film;
pub mod filter;
pub mod integrator;
pub mod layer;
pub mod light;
pub mod material;
pub mod output;
pub mod primitive;
pub mod render;
pub mod sampling;
pub mod scene;
pub mod space;
pub mod surface;
pub mod volume;

pub use crate::color::{ Rgb, Rgba };
pub use crate::error::Error;
pub use crate::film::{ AaNoiseParams, FilmParams, ImageFilm };
pub use crate::filter::FilterKind;
pub use crate::integrator::{
    DirectLightIntegrator, PathIntegrator, PhotonIntegrator, SurfaceIntegrator,
};
pub use crate::layer::{ LayerKind, Layers };
pub use crate::render::{ RenderControl, RenderDriver, RenderMonitor, RenderSummary };
pub use crate::scene::{ MaterialRef, SceneView };

/// Render a scene into the given film with library defaults: hardware
/// thread count, silent progress. Returns the pass/sample summary.
pub fn render(
    scene: &SceneView,
    integrator: &mut dyn SurfaceIntegrator,
    film: &mut ImageFilm,
) -> Result<RenderSummary, Error> {
    let control = RenderControl::new();
    let monitor = RenderMonitor::silent();
    RenderDriver::new().render(scene, integrator, film, &control, &monitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::ConstantBackground;
    use crate::camera::PinholeCamera;
    use crate::film::{ FilmLoadSave, FilmLoadSaveMode, TileOrder };
    use crate::layer::MaskParams;
    use crate::light::{ Light, PointLight };
    use crate::material::{ Material, Matte };
    use crate::primitive::{ Accelerator, PrimitiveList, Quad };
    use crate::scene::SceneSettings;

    fn film_with(
        width: i32, height: i32, layers: Layers, aa: AaNoiseParams, filter: FilterKind,
    ) -> ImageFilm {
        ImageFilm::new(FilmParams {
            width,
            height,
            filter,
            filter_width: 1.0,
            tile_size: 4,
            tile_order: TileOrder::Linear,
            thread_count: 1,
            layers,
            aa,
            ..FilmParams::default()
        }).unwrap()
    }

    fn single_thread_render(
        scene: &SceneView,
        integrator: &mut dyn SurfaceIntegrator,
        film: &mut ImageFilm,
    ) -> RenderSummary {
        let _ = env_logger::builder().is_test(true).try_init();
        let control = RenderControl::new();
        let monitor = RenderMonitor::silent();
        RenderDriver::new()
            .with_threads(1)
            .render(scene, integrator, film, &control, &monitor)
            .unwrap()
    }

    #[test]
    fn black_render_produces_transparent_black_and_unit_weights() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::BLACK);
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 5.0, 0.0], Rgb::BLACK)),
        ];
        let mut scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background)
            .with_lights(&lights);
        scene.settings.transparent_background = true;

        let mut film = film_with(4, 4, Layers::new(), AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        for y in 0..4usize {
            for x in 0..4usize {
                assert_eq!(combined.get(x, y), Rgba::new(0.0, 0.0, 0.0, 0.0));
                assert_eq!(film.weight_at(x, y), 1.0);
            }
        }
    }

    #[test]
    fn constant_background_fills_combined_and_env() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 2, 2);
        let background = ConstantBackground::new(Rgb::new(0.5, 0.25, 0.125));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut layers = Layers::new();
        layers.define(LayerKind::Env);
        let mut film = film_with(2, 2, layers, AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        let env = film.normalized_pixels(LayerKind::Env).unwrap();
        for y in 0..2usize {
            for x in 0..2usize {
                assert_eq!(combined.get(x, y), Rgba::new(0.5, 0.25, 0.125, 1.0));
                assert_eq!(env.get(x, y), Rgba::new(0.5, 0.25, 0.125, 1.0));
            }
        }
    }

    #[test]
    fn material_index_mask_selects_the_object() {
        // a wall with material index 7 covering the left image half
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 2);
        let background = ConstantBackground::new(Rgb::BLACK);
        let materials: Vec<Box<dyn Material>> = vec![
            Box::new(Matte::new(Rgb::gray(0.5)).with_index(7)),
        ];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-50.0, -50.0, 1.0], [50.0, 0.0, 0.0], [0.0, 100.0, 0.0], MaterialRef(0))),
        ]);

        let mut layers = Layers::new();
        layers.define(LayerKind::MatIndexMask);
        layers.set_mask_params(MaskParams { mat_index: 7, only: true, ..MaskParams::default() });

        let scene = SceneView::new(&camera, &accel, &materials, layers.clone())
            .with_background(&background)
            .with_settings(SceneSettings {
                material_index_highest: 7,
                ..SceneSettings::default()
            });

        let mut film = film_with(4, 2, layers, AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let mask = film.normalized_pixels(LayerKind::MatIndexMask).unwrap();
        for y in 0..2usize {
            for x in 0..2usize {
                let hit = mask.get(x, y);
                assert_eq!(hit.rgb(), Rgb::new(1.0, 1.0, 1.0), "column {} should be masked", x);
            }
            for x in 2..4usize {
                assert_eq!(mask.get(x, y), Rgba::new(0.0, 0.0, 0.0, 0.0));
            }
        }
    }

    #[test]
    fn one_pass_many_samples_matches_many_passes_one_sample() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::new(0.3, 0.6, 0.9));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut film_single = film_with(4, 4, Layers::new(), AaNoiseParams {
            samples: 4,
            passes: 1,
            ..AaNoiseParams::default()
        }, FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film_single);

        let mut film_multi = film_with(4, 4, Layers::new(), AaNoiseParams {
            samples: 1,
            passes: 4,
            inc_samples: 1,
            threshold: 0.0,
            ..AaNoiseParams::default()
        }, FilterKind::Box);
        single_thread_render(&scene, &mut integrator, &mut film_multi);

        let single = film_single.normalized_pixels(LayerKind::Combined).unwrap();
        let multi = film_multi.normalized_pixels(LayerKind::Combined).unwrap();
        for y in 0..4usize {
            for x in 0..4usize {
                // sample positions differ between the two schedules, so the
                // accumulation order does too; equal up to associativity
                let (a, b) = (single.get(x, y), multi.get(x, y));
                assert!((a.r - b.r).abs() < 1e-6);
                assert!((a.g - b.g).abs() < 1e-6);
                assert!((a.b - b.b).abs() < 1e-6);
                assert!((a.a - b.a).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn single_threaded_renders_are_bit_identical() {
        let camera = PinholeCamera::new(60.0, [0.0, 1.0, -3.0], 8, 8);
        let background = ConstantBackground::new(Rgb::gray(0.2));
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.8)))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-10.0, 0.0, -10.0], [20.0, 0.0, 0.0], [0.0, 0.0, 20.0], MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 4.0, 0.0], Rgb::gray(8.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background)
            .with_lights(&lights);

        let aa = AaNoiseParams { samples: 2, passes: 2, inc_samples: 1, ..AaNoiseParams::default() };
        let mut integrator = PathIntegrator::default();

        let mut film_a = film_with(8, 8, Layers::new(), aa.clone(), FilterKind::Gauss);
        single_thread_render(&scene, &mut integrator, &mut film_a);
        let mut film_b = film_with(8, 8, Layers::new(), aa, FilterKind::Gauss);
        single_thread_render(&scene, &mut integrator, &mut film_b);

        let a = film_a.normalized_pixels(LayerKind::Combined).unwrap();
        let b = film_b.normalized_pixels(LayerKind::Combined).unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn resume_from_saved_film_matches_uninterrupted_render() {
        let dir = tempfile::tempdir().unwrap();
        let camera = PinholeCamera::new(60.0, [0.0, 1.0, -3.0], 6, 6);
        let background = ConstantBackground::new(Rgb::gray(0.1));
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.7)))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-10.0, 0.0, -10.0], [20.0, 0.0, 0.0], [0.0, 0.0, 20.0], MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([1.0, 4.0, 1.0], Rgb::gray(6.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background)
            .with_lights(&lights);
        let mut integrator = PathIntegrator::default();

        // render A: all four passes in one go
        let mut film_a = film_with(6, 6, Layers::new(), AaNoiseParams {
            samples: 1, passes: 4, inc_samples: 1, ..AaNoiseParams::default()
        }, FilterKind::Box);
        single_thread_render(&scene, &mut integrator, &mut film_a);

        // render B, stage 1: two passes, persisting the film
        let mut film_b1 = ImageFilm::new(FilmParams {
            width: 6, height: 6,
            filter: FilterKind::Box,
            filter_width: 1.0,
            tile_size: 4,
            tile_order: TileOrder::Linear,
            thread_count: 1,
            layers: Layers::new(),
            aa: AaNoiseParams { samples: 1, passes: 2, inc_samples: 1, ..AaNoiseParams::default() },
            film_load_save: FilmLoadSave {
                mode: FilmLoadSaveMode::Save,
                path: dir.path().join("stage"),
                ..FilmLoadSave::default()
            },
            ..FilmParams::default()
        }).unwrap();
        single_thread_render(&scene, &mut integrator, &mut film_b1);

        // render B, stage 2: load the two-pass film, continue to four
        let mut film_b2 = ImageFilm::new(FilmParams {
            width: 6, height: 6,
            filter: FilterKind::Box,
            filter_width: 1.0,
            tile_size: 4,
            tile_order: TileOrder::Linear,
            thread_count: 1,
            layers: Layers::new(),
            aa: AaNoiseParams { samples: 1, passes: 3, inc_samples: 1, ..AaNoiseParams::default() },
            film_load_save: FilmLoadSave {
                mode: FilmLoadSaveMode::LoadAndSave,
                path: dir.path().join("stage"),
                ..FilmLoadSave::default()
            },
            ..FilmParams::default()
        }).unwrap();
        let summary = single_thread_render(&scene, &mut integrator, &mut film_b2);
        assert!(summary.resumed);

        let a = film_a.normalized_pixels(LayerKind::Combined).unwrap();
        let b = film_b2.normalized_pixels(LayerKind::Combined).unwrap();
        for y in 0..6usize {
            for x in 0..6usize {
                assert_eq!(a.get(x, y), b.get(x, y), "pixel ({}, {})", x, y);
                assert_eq!(film_a.weight_at(x, y), film_b2.weight_at(x, y));
            }
        }
        assert_eq!(film_a.sampling_offset(), film_b2.sampling_offset());
    }

    #[test]
    fn adaptive_render_of_uniform_image_stops_after_first_pass() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 8, 8);
        let background = ConstantBackground::new(Rgb::gray(0.4));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut film = film_with(8, 8, Layers::new(), AaNoiseParams {
            samples: 1,
            passes: 4,
            inc_samples: 1,
            threshold: 1e-3,
            ..AaNoiseParams::default()
        }, FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        let summary = single_thread_render(&scene, &mut integrator, &mut film);

        // a uniform image has no noisy neighbourhoods: passes 2..4 shoot nothing
        assert_eq!(summary.passes_rendered, 1);
        assert!(!summary.canceled);
    }

    #[test]
    fn depth_layer_of_missed_rays_is_transparent() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::gray(0.5));
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::WHITE))];
        // patch covering only the centre pixels of the image
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-1.0, -1.0, 2.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0], MaterialRef(0))),
        ]);
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut layers = Layers::new();
        layers.define(LayerKind::ZDepthNorm);
        layers.define(LayerKind::ZDepthAbs);
        let mut film = film_with(4, 4, layers, AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let depth = film.normalized_pixels(LayerKind::ZDepthAbs).unwrap();
        // corner pixels miss everything
        assert_eq!(depth.get(0, 0), Rgba::new(0.0, 0.0, 0.0, 0.0));
        // centre pixels hit the patch at around z = 2
        assert!(depth.get(2, 2).r > 1.9 && depth.get(2, 2).a > 0.0);
    }

    #[test]
    fn cancellation_returns_a_well_formed_partial_film() {
        use std::sync::Arc;
        use crate::render::ProgressBar;

        // progress target that requests cancellation after the first
        // completed tile, the way an interactive front-end would
        struct CancellingBar {
            control: Arc<RenderControl>,
            updates: usize,
        }
        impl ProgressBar for CancellingBar {
            fn init(&mut self, _steps_total: usize) {}
            fn update(&mut self, _steps: usize) {
                self.updates += 1;
                if self.updates == 1 {
                    self.control.cancel();
                }
            }
            fn set_tag(&mut self, _tag: &str) {}
            fn tag(&self) -> String { String::new() }
            fn done(&mut self) {}
            fn percent(&self) -> f32 { 0.0 }
        }

        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 8, 8);
        let background = ConstantBackground::new(Rgb::gray(0.5));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut film = film_with(8, 8, Layers::new(), AaNoiseParams {
            samples: 1, passes: 8, inc_samples: 1, ..AaNoiseParams::default()
        }, FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();

        let control = Arc::new(RenderControl::new());
        let monitor = RenderMonitor::new(Box::new(CancellingBar {
            control: Arc::clone(&control),
            updates: 0,
        }));
        let summary = RenderDriver::new()
            .with_threads(1)
            .render(&scene, &mut integrator, &mut film, &control, &monitor)
            .unwrap();

        assert!(summary.canceled);
        assert!(summary.passes_rendered < 8);
        // whatever was deposited is still consistent: weighted pixels
        // normalize to the background, the rest read as unconverged
        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        let mut rendered = 0;
        for y in 0..8usize {
            for x in 0..8usize {
                if film.weight_at(x, y) > 0.0 {
                    rendered += 1;
                    assert_eq!(combined.get(x, y), Rgba::new(0.5, 0.5, 0.5, 1.0));
                } else {
                    assert_eq!(combined.get(x, y), Rgba::TRANSPARENT);
                }
            }
        }
        assert!(rendered >= 1);
    }

    #[test]
    fn flush_delivers_exported_layers_to_outputs() {
        use std::sync::Arc;
        use parking_lot::Mutex;
        use crate::error::Error;
        use crate::film::Buffer2D;
        use crate::output::{ ImageOutput, MemoryOutput };

        // delegate into a shared collector so the test can look inside
        // after the film takes ownership of the output
        struct SharedOutput(Arc<Mutex<MemoryOutput>>);
        impl ImageOutput for SharedOutput {
            fn flush_layer(
                &mut self, kind: LayerKind, tag: &str,
                pixels: &Buffer2D<Rgba>, premultiply: bool,
            ) -> Result<(), Error> {
                self.0.lock().flush_layer(kind, tag, pixels, premultiply)
            }
        }

        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 2, 2);
        let background = ConstantBackground::new(Rgb::new(0.25, 0.5, 0.75));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let mut layers = Layers::new();
        layers.define_exported(LayerKind::Env, "environment");
        let mut film = film_with(2, 2, layers, AaNoiseParams::default(), FilterKind::Box);
        let collector = Arc::new(Mutex::new(MemoryOutput::new()));
        film.add_output(Box::new(SharedOutput(Arc::clone(&collector))));

        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let collected = collector.lock();
        let combined = collected.layer(LayerKind::Combined).expect("combined is always exported");
        assert_eq!(combined.get(0, 0), Rgba::new(0.25, 0.5, 0.75, 1.0));
        let env = collected.layer(LayerKind::Env).expect("env layer was exported");
        assert_eq!(env.get(1, 1), Rgba::new(0.25, 0.5, 0.75, 1.0));
    }

    #[test]
    fn volume_attenuates_and_inscatters() {
        use crate::volume::UniformFog;

        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 2, 2);
        let background = ConstantBackground::new(Rgb::WHITE);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::WHITE))];
        // wall everywhere at z = 2, so every primary ray has a bounded path
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-50.0, -50.0, 2.0], [100.0, 0.0, 0.0], [0.0, 100.0, 0.0], MaterialRef(0))),
        ]);
        let fog = UniformFog::new(1.0, Rgb::new(1.0, 0.0, 0.0));
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background)
            .with_volume(&fog);

        let mut layers = Layers::new();
        layers.define(LayerKind::VolumeTransmittance);
        layers.define(LayerKind::VolumeIntegration);
        let mut film = film_with(2, 2, layers, AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = DirectLightIntegrator::default();
        single_thread_render(&scene, &mut integrator, &mut film);

        let transmittance = film.normalized_pixels(LayerKind::VolumeTransmittance).unwrap();
        let inscatter = film.normalized_pixels(LayerKind::VolumeIntegration).unwrap();
        // a couple of units of fog: visibly below one, above zero
        let t = transmittance.get(0, 0).r;
        assert!(t > 0.0 && t < 1.0);
        // the fog color bleeds into the in-scattering layer
        assert!(inscatter.get(0, 0).r > 0.0);
        assert_eq!(inscatter.get(0, 0).g, 0.0);
    }

    #[test]
    fn photon_integrator_renders_a_lit_floor() {
        use crate::integrator::PhotonIntegratorParams;

        let camera = PinholeCamera::new(60.0, [0.0, 2.0, -4.0], 4, 4);
        let background = ConstantBackground::new(Rgb::BLACK);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.7)))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-10.0, 0.0, -10.0], [20.0, 0.0, 0.0], [0.0, 0.0, 20.0], MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 5.0, 0.0], Rgb::gray(40.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background)
            .with_lights(&lights);

        let mut film = film_with(4, 4, Layers::new(), AaNoiseParams::default(), FilterKind::Box);
        let mut integrator = PhotonIntegrator::new(PhotonIntegratorParams {
            diffuse_photons: 400,
            caustic_photons: 50,
            final_gather_samples: 4,
            ..PhotonIntegratorParams::default()
        });
        single_thread_render(&scene, &mut integrator, &mut film);

        let combined = film.normalized_pixels(LayerKind::Combined).unwrap();
        // the floor fills the lower image half and receives light
        let mut lit = 0;
        for y in 0..4usize {
            for x in 0..4usize {
                let c = combined.get(x, y);
                assert!(c.r.is_finite() && c.r >= 0.0);
                if c.r > 0.0 {
                    lit += 1;
                }
            }
        }
        assert!(lit > 0);
    }

    #[test]
    fn accelerator_contract_is_exercised_through_the_scene() {
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::WHITE))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-1.0, -1.0, 3.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0], MaterialRef(0))),
        ]);
        let mut ray = crate::space::Ray::new(
            cgmath::Point3::new(0.0, 0.0, 0.0), cgmath::Vector3::new(0.0, 0.0, 1.0));
        ray.tmax = 10.0;
        assert!(accel.intersect(&ray).is_some());
        assert!(accel.is_shadowed(&ray, 1e-5));
        let (blocked, filter) = accel.is_shadowed_transparent(&materials, &ray, 4, 1e-5);
        assert!(blocked);
        assert_eq!(filter, Rgb::BLACK);
    }
}
