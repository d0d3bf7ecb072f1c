//! The tile worker: pulls areas off the film's dispenser and renders them
//! pixel by pixel, sample by sample, into the film.

use crossbeam_channel::Sender;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::color::{ ColorLayers, Rgba };
use crate::film::{ DepthRange, ImageFilm, RenderArea };
use crate::integrator::SurfaceIntegrator;
use crate::layer::LayerKind;
use crate::sampling::{ self, Halton, PixelSamplingData };
use crate::scene::SceneView;
use crate::space::{ Ray, RayDifferentials, RayDivision };

use super::control::RenderControl;

/// Everything one AA pass shares between its workers, immutable while the
/// pass runs.
pub(crate) struct PassContext<'p> {
    pub scene: &'p SceneView<'p>,
    pub integrator: &'p dyn SurfaceIntegrator,
    pub film: &'p ImageFilm,
    pub control: &'p RenderControl,
    /// Base sample count for this pass
    pub samples: u32,
    /// Sampling offset (accumulated samples plus the film's base offset)
    pub offset: u32,
    pub adaptive: bool,
    /// Zero-based AA pass number
    pub pass: u32,
    /// 1 / highest sample count any pixel can reach over the whole render
    pub inv_max_samples: f32,
    pub depth_range: DepthRange,
}

/// Worker loop: draw tiles until the dispenser runs dry or the render is
/// canceled, notifying the driver after each finished area.
pub(crate) fn render_worker(ctx: &PassContext, finished: &Sender<RenderArea>) {
    while let Some(area) = ctx.film.next_area() {
        if ctx.control.canceled() {
            break;
        }
        render_tile(ctx, &area);
        let _ = finished.send(area);
    }
}

fn render_tile(ctx: &PassContext, area: &RenderArea) {
    let camera = ctx.scene.camera;
    let res_x = camera.res_x() as i32;
    let sample_lens = camera.sample_lens();
    let aa = ctx.film.aa();
    let multipass = aa.passes > 1;
    let mask_params = *ctx.film.layers().mask_params();

    // per-tile deterministic generator: same tile, same offset, same stream
    let mut rng = SmallRng::seed_from_u64(
        ((ctx.offset as u64) << 32) ^ ((area.x as u64 & 0xffff) << 16) ^ (area.y as u64 & 0xffff),
    );
    let mut lens_u = Halton::new(3);
    let mut lens_v = Halton::new(5);
    let mut color_layers = ColorLayers::new(ctx.film.layers());

    for y in area.y..area.y + area.h {
        if ctx.control.canceled() {
            return;
        }
        for x in area.x..area.x + area.w {
            if ctx.adaptive && !ctx.film.should_sample(x, y) {
                continue;
            }

            // per-material sampling factor scales the sample count
            let mut n_samples = ctx.samples;
            if ctx.adaptive {
                if let Some(mut factor) = ctx.film.sampling_factor_at(x, y) {
                    if aa.background_resampling {
                        factor = factor.max(1.0);
                    }
                    if factor > 0.0 && factor < 1.0 {
                        // always shoot at the object/background boundary
                        factor = 1.0;
                    }
                    if factor == 0.0 {
                        continue;
                    }
                    if factor != 1.0 {
                        n_samples = ((ctx.samples as f32 * factor).round() as u32).max(1);
                    }
                }
            }
            if n_samples == 0 {
                continue;
            }
            let inv_n = 1.0 / n_samples as f64;

            let mut pixel = PixelSamplingData {
                number: (res_x * y + x) as usize,
                offset: sampling::fnv_32a((y as u32).wrapping_mul(sampling::fnv_32a(x as u32))),
                sample: 0,
                time: 0.0,
            };
            // pixel-level low-discrepancy offset into the frame time
            let time_offset = sampling::lds::low_discrepancy_sampling(
                5, ctx.offset.wrapping_add(pixel.offset));
            lens_u.set_start(ctx.offset.wrapping_add(pixel.offset));
            lens_v.set_start(ctx.offset.wrapping_add(pixel.offset));

            for sample in 0..n_samples {
                color_layers.set_default_colors();
                pixel.sample = ctx.offset.wrapping_add(sample);
                pixel.time = sampling::add_mod1(sample as f64 * inv_n, time_offset);

                // The (1/n, Larcher-Pillichshammer) pair covers well when
                // the total sample count is known up front; multi-pass AA
                // keeps adding samples, so it uses the scrambled
                // (van der Corput, Sobol) pair instead.
                let (dx, dy) = if multipass {
                    (
                        sampling::ri_vdc(pixel.sample, pixel.offset),
                        sampling::ri_s(pixel.sample, pixel.offset),
                    )
                } else if n_samples > 1 {
                    (
                        (0.5 + sample as f64) * inv_n,
                        sampling::ri_lp(sample.wrapping_add(pixel.offset), 0),
                    )
                } else {
                    (0.5, 0.5)
                };

                let lens_uv = if sample_lens {
                    (lens_u.next(), lens_v.next())
                } else {
                    (0.5, 0.5)
                };

                let mut camera_ray = camera.shoot_ray(x as f64 + dx, y as f64 + dy, lens_uv);
                if !camera_ray.valid {
                    // keep the filter weight consistent with a zero sample
                    ctx.film.add_sample(x, y, dx, dy, sample, ctx.pass, &color_layers);
                    continue;
                }
                if ctx.control.differential_rays() {
                    let dx_ray = camera.shoot_ray(x as f64 + 1.0 + dx, y as f64 + dy, lens_uv);
                    let dy_ray = camera.shoot_ray(x as f64 + dx, y as f64 + 1.0 + dy, lens_uv);
                    camera_ray.ray.differentials = Some(RayDifferentials {
                        x_from: dx_ray.ray.from,
                        x_dir: dx_ray.ray.dir,
                        y_from: dy_ray.ray.from,
                        y_dir: dy_ray.ray.dir,
                    });
                }
                camera_ray.ray.time = pixel.time;

                let division = RayDivision::default();
                let (color, alpha) = ctx.integrator.integrate(
                    ctx.scene, &mut camera_ray.ray, &mut rng, Some(&mut color_layers),
                    0, true, 0.0, &division, &pixel,
                );
                color_layers.set(LayerKind::Combined, Rgba::from_rgb(color, alpha));
                color_layers.set(LayerKind::AaSamples,
                    Rgba::gray(n_samples as f32 * ctx.inv_max_samples));

                crate::integrator::combine_aggregate_layers(&mut color_layers);
                apply_layer_post_rules(
                    &mut color_layers, &camera_ray.ray, &mask_params, ctx.depth_range);
                ctx.film.add_sample(x, y, dx, dy, sample, ctx.pass, &color_layers);
            }
        }
    }
}

/// Per-sample, per-kind fixups before the scratch hits the film: mask
/// clamping/inversion/composition and depth encoding.
fn apply_layer_post_rules(
    layers: &mut ColorLayers,
    ray: &Ray,
    mask_params: &crate::layer::MaskParams,
    depth_range: DepthRange,
) {
    let combined = layers.get(LayerKind::Combined).unwrap_or(Rgba::TRANSPARENT);
    let hit_depth = ray.tmax;
    for (kind, color) in layers.iter_mut() {
        match kind {
            LayerKind::ObjIndexMask | LayerKind::MatIndexMask => {
                if color.a > 1.0 {
                    color.a = 1.0;
                }
                color.clamp_rgb01();
                if mask_params.invert {
                    *color = Rgba::new(1.0, 1.0, 1.0, 1.0) - *color;
                }
                if !mask_params.only {
                    let mut base = combined;
                    base.a = 1.0;
                    *color = *color * base;
                }
            }
            LayerKind::ZDepthAbs => {
                *color = if hit_depth < 0.0 || !hit_depth.is_finite() {
                    Rgba::TRANSPARENT
                } else {
                    Rgba::gray(hit_depth as f32)
                };
            }
            LayerKind::ZDepthNorm => {
                *color = if hit_depth < 0.0 || !hit_depth.is_finite() {
                    Rgba::TRANSPARENT
                } else {
                    let normalized = 1.0 - (hit_depth - depth_range.min) * depth_range.inv_range;
                    Rgba::gray(normalized.clamp(0.0, 1.0) as f32)
                };
            }
            LayerKind::Mist => {
                *color = if hit_depth < 0.0 || !hit_depth.is_finite() {
                    Rgba::TRANSPARENT
                } else {
                    let normalized = (hit_depth - depth_range.min) * depth_range.inv_range;
                    Rgba::gray(normalized.clamp(0.0, 1.0) as f32)
                };
            }
            _ => {
                if color.a > 1.0 {
                    color.a = 1.0;
                }
            }
        }
    }
}
