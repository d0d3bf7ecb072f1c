//! The render driver: runs the AA passes over a fixed worker pool, makes
//! the adaptive-resampling decisions between passes, and owns the
//! resume/autosave lifecycle of the film.

use std::thread;

use log::{ info, warn };

use crate::error::Error;
use crate::film::{ DepthRange, ImageFilm };
use crate::integrator::SurfaceIntegrator;
use crate::layer::LayerKind;
use crate::scene::SceneView;

use super::control::RenderControl;
use super::monitor::RenderMonitor;
use super::worker::{ self, PassContext };

/// Outcome of a completed (or canceled) render
#[derive(Debug, Clone)]
pub struct RenderSummary {
    /// Passes that actually shot samples (skipped passes excluded)
    pub passes_rendered: u32,
    /// Per-pixel base samples accumulated over all passes
    pub samples_accumulated: u32,
    /// Samples dropped for non-finite values
    pub dropped_samples: u64,
    pub resumed: bool,
    pub canceled: bool,
    pub render_seconds: f64,
}

/// Pass scheduler over a fixed thread pool. One driver renders one job at
/// a time; the thread count is fixed at construction.
pub struct RenderDriver {
    thread_count: usize,
    differential_rays: bool,
}

impl RenderDriver {
    pub fn new() -> RenderDriver {
        RenderDriver {
            thread_count: num_cpus::get(),
            differential_rays: false,
        }
    }

    /// Zero selects the hardware parallelism
    pub fn with_threads(mut self, threads: usize) -> RenderDriver {
        self.thread_count = if threads == 0 { num_cpus::get() } else { threads };
        self
    }

    pub fn with_differential_rays(mut self, enabled: bool) -> RenderDriver {
        self.differential_rays = enabled;
        self
    }

    /// Run the whole render job: film init (and resume), integrator
    /// precomputation, the AA pass loop, and the final flush.
    pub fn render(
        &self,
        scene: &SceneView,
        integrator: &mut dyn SurfaceIntegrator,
        film: &mut ImageFilm,
        control: &RenderControl,
        monitor: &RenderMonitor,
    ) -> Result<RenderSummary, Error> {
        let aa = film.aa().clone();
        control.start();
        control.set_total_passes(aa.passes);
        control.set_differential_rays(self.differential_rays);
        monitor.set_total_passes(aa.passes);
        monitor.timer_start("render");

        info!("{}: rendering {} passes, {} samples (+{} per additional pass), {} threads",
            integrator.name(), aa.passes, aa.samples, aa.inc_samples, self.thread_count);
        info!("{}: AA threshold={} clamp={} ind.clamp={} sample.mul={} light.mul={} ind.mul={} col.noise={}",
            integrator.name(), aa.threshold, aa.clamp_samples, aa.clamp_indirect,
            aa.sample_multiplier_factor, aa.light_sample_multiplier_factor,
            aa.indirect_sample_multiplier_factor, aa.detect_color_noise);

        film.init(aa.passes);
        if film.load_requested() {
            match film.load_all_in_folder() {
                Ok(count) if count > 0 => {
                    info!("{}: combined {} film file(s), resuming", integrator.name(), count);
                    control.set_resumed();
                }
                Ok(_) => {}
                Err(e) => warn!("{}: film load failed: {}", integrator.name(), e),
            }
        }

        integrator.prepare(scene, control, monitor)?;

        if film.layers().is_defined_any(&[LayerKind::ZDepthNorm, LayerKind::Mist]) {
            film.set_depth_range(precalc_depths(scene));
        }

        let total_pixels = film.total_pixels();
        let resampled_floor_pixels = (aa.resampled_floor * total_pixels as f32 / 100.0).floor();
        let inv_max_samples = 1.0 / max_possible_samples(&aa) as f32;

        monitor.init_progress(total_pixels);
        monitor.set_tag(&format!("Rendering pass 1 of {}...", aa.passes.max(1)));

        // Pass 1. A resumed film already holds its samples; render it with
        // zero new samples so the sampling offset bookkeeping still runs,
        // and continue counting from the loaded offset so the
        // low-discrepancy indices never repeat.
        let mut passes_rendered = 1;
        let mut samples_accumulated;
        if control.resumed() {
            samples_accumulated = film.sampling_offset();
            self.render_pass(scene, integrator, film, control, monitor,
                0, samples_accumulated, false, 0, inv_max_samples);
        } else {
            samples_accumulated = aa.samples;
            self.render_pass(scene, integrator, film, control, monitor,
                aa.samples, 0, false, 0, inv_max_samples);
        }

        let mut threshold = aa.threshold;
        let mut threshold_changed = true;
        let mut resampled = 0usize;
        let mut sample_multiplier = 1.0f32;

        for pass in 1..aa.passes {
            if control.canceled() {
                break;
            }
            sample_multiplier *= aa.sample_multiplier_factor;

            let skip = resampled == 0 && !threshold_changed;
            if skip {
                info!("{}: no pixels to resample and unchanged threshold, skipping pass {}",
                    integrator.name(), pass + 1);
                film.next_pass(control, monitor, true, integrator.name(), true);
            } else {
                film.set_aa_threshold(threshold);
                resampled = film.next_pass(control, monitor, true, integrator.name(), false);
                threshold_changed = false;
            }

            let samples_this_pass =
                (aa.inc_samples as f32 * sample_multiplier).ceil().max(0.0) as u32;
            if !skip && resampled > 0 {
                self.render_pass(scene, integrator, film, control, monitor,
                    samples_this_pass, samples_accumulated, true, pass, inv_max_samples);
                passes_rendered += 1;
            }
            samples_accumulated += samples_this_pass;

            // few dirty pixels left: tighten the threshold for the next pass
            if resampled > 0 && (resampled as f32) < resampled_floor_pixels {
                let variation = (resampled_floor_pixels / resampled as f32).min(8.0);
                threshold *= 1.0 - 0.1 * variation;
                if threshold > 0.0 {
                    threshold_changed = true;
                }
                info!("{}: resampled {} below floor {}, new threshold {:.6}",
                    integrator.name(), resampled, resampled_floor_pixels, threshold);
            }
        }

        monitor.timer_stop("render");
        let canceled = control.canceled();
        if !canceled {
            control.set_finished();
        }
        // flush delivers exported layers to outputs and, at completion,
        // persists the film; a canceled render still saves a valid film
        film.flush(control);
        if canceled && film.save_requested() {
            if let Err(e) = film.save_film() {
                warn!("{}: film save after cancel failed: {}", integrator.name(), e);
            }
        }
        monitor.done();

        Ok(RenderSummary {
            passes_rendered,
            samples_accumulated,
            dropped_samples: film.dropped_samples(),
            resumed: control.resumed(),
            canceled,
            render_seconds: monitor.timer_seconds("render"),
        })
    }

    /// Spawn the worker pool for one pass and consume completed-area
    /// notifications until every worker is done.
    #[allow(clippy::too_many_arguments)]
    fn render_pass(
        &self,
        scene: &SceneView,
        integrator: &dyn SurfaceIntegrator,
        film: &mut ImageFilm,
        control: &RenderControl,
        monitor: &RenderMonitor,
        samples: u32,
        offset: u32,
        adaptive: bool,
        pass: u32,
        inv_max_samples: f32,
    ) {
        control.set_current_pass(pass + 1);
        monitor.set_current_pass(pass + 1);
        film.set_sampling_offset(offset + samples);

        let ctx = PassContext {
            scene,
            integrator,
            film,
            control,
            samples,
            offset: offset + film.base_sampling_offset(),
            adaptive,
            pass,
            inv_max_samples,
            depth_range: film.depth_range(),
        };
        let film = &*film;

        thread::scope(|scope| {
            let (finished_tx, finished_rx) = crossbeam_channel::unbounded();
            for _ in 0..self.thread_count {
                let finished = finished_tx.clone();
                let ctx = &ctx;
                scope.spawn(move || worker::render_worker(ctx, &finished));
            }
            drop(finished_tx);

            // the channel closes once the last worker hangs up
            for area in finished_rx {
                film.finish_area(&area, control, monitor);
            }
        });
    }
}

impl Default for RenderDriver {
    fn default() -> RenderDriver {
        RenderDriver::new()
    }
}

/// Highest per-pixel sample count any pixel can reach over every pass
fn max_possible_samples(aa: &crate::film::AaNoiseParams) -> u32 {
    let mut total = aa.samples.max(1);
    let mut multiplier = 1.0f32;
    for _ in 1..aa.passes {
        multiplier *= aa.sample_multiplier_factor;
        total += (aa.inc_samples as f32 * multiplier).ceil() as u32;
    }
    total
}

/// Probe the scene once per pixel (no shading) for the depth window used
/// to normalize z-depth layers. Skipped when the camera has a far clip.
fn precalc_depths(scene: &SceneView) -> DepthRange {
    let camera = scene.camera;
    let (mut min_depth, mut max_depth);
    if camera.far_clip() > -1.0 {
        min_depth = camera.near_clip();
        max_depth = camera.far_clip();
    } else {
        min_depth = f64::INFINITY;
        max_depth = 0.0;
        for y in 0..camera.res_y() {
            for x in 0..camera.res_x() {
                let shot = camera.shoot_ray(x as f64 + 0.5, y as f64 + 0.5, (0.5, 0.5));
                if !shot.valid {
                    continue;
                }
                if let Some(hit) = scene.accelerator.intersect(&shot.ray) {
                    min_depth = min_depth.min(hit.t);
                    max_depth = max_depth.max(hit.t);
                }
            }
        }
        if !min_depth.is_finite() {
            return DepthRange::default();
        }
    }
    let inv_range = if max_depth > min_depth { 1.0 / (max_depth - min_depth) } else { 0.0 };
    DepthRange { min: min_depth, inv_range }
}
