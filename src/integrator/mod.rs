//! Surface integrators: the per-primary-ray algorithms. The variants share
//! the contract in [`SurfaceIntegrator`] plus the per-hit helpers below
//! (background and volume handling, debug/index layer generation, ambient
//! occlusion), so each variant only supplies its light-transport strategy.

use rand::rngs::SmallRng;

use crate::color::{ ColorLayers, Rgb, Rgba };
use crate::error::Error;
use crate::layer::{ LayerFlags, LayerKind };
use crate::light::Light;
use crate::material::BsdfFlags;
use crate::render::control::RenderControl;
use crate::render::monitor::RenderMonitor;
use crate::sampling::{ self, Halton, PixelSamplingData };
use crate::scene::SceneView;
use crate::space::*;
use crate::surface::SurfaceHit;

mod direct;
mod path;
mod photon;

pub use self::direct::DirectLightIntegrator;
pub use self::path::PathIntegrator;
pub use self::photon::{ PhotonIntegrator, PhotonIntegratorParams };

/// Per-ray integration contract. Stateless across rays apart from the
/// caller-provided RNG; any precomputation happens once in `prepare`.
pub trait SurfaceIntegrator: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time precomputation before the first pass (photon maps, light
    /// power distributions). Runs single-threaded on the driver.
    fn prepare(
        &mut self,
        _scene: &SceneView,
        _control: &RenderControl,
        _monitor: &RenderMonitor,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Integrate one ray. Returns the radiance estimate and coverage alpha;
    /// on return the ray's `tmax` holds the primary hit distance (negative
    /// or infinite for a miss, which the depth layers rely on).
    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        scene: &SceneView,
        ray: &mut Ray,
        rng: &mut SmallRng,
        layers: Option<&mut ColorLayers>,
        depth: u32,
        chromatic: bool,
        wavelength: f32,
        division: &RayDivision,
        pixel: &PixelSamplingData,
    ) -> (Rgb, f32);
}

/// Radiance and alpha for a ray that escaped the scene. Writes the Env
/// layer; honors the transparent-background rules.
pub(crate) fn background_contribution(
    scene: &SceneView,
    ray: &Ray,
    layers: Option<&mut ColorLayers>,
    depth: u32,
) -> (Rgb, f32) {
    let transparent = scene.settings.transparent_background
        && (depth == 0 || scene.settings.transparent_refracted_background);
    if transparent {
        return (Rgb::BLACK, 0.0);
    }
    match scene.background {
        Some(background) => {
            let color = background.eval(&ray.dir, false);
            if let Some(layers) = layers {
                layers.set(LayerKind::Env, Rgba::from_rgb(color, 1.0));
            }
            (color, 1.0)
        }
        None => (Rgb::BLACK, 1.0),
    }
}

/// Attenuate by the volume's transmittance and add in-scattering; updates
/// the volume layers and the alpha for transparent backgrounds.
pub(crate) fn apply_volumetric_effects(
    scene: &SceneView,
    ray: &Ray,
    rng: &mut SmallRng,
    color: Rgb,
    alpha: f32,
    layers: Option<&mut ColorLayers>,
) -> (Rgb, f32) {
    let Some(volume) = scene.volume else { return (color, alpha) };
    let transmittance = volume.transmittance(rng, ray);
    let inscatter = volume.integrate(rng, ray);
    if let Some(layers) = layers {
        layers.set(LayerKind::VolumeTransmittance, Rgba::from_rgb(transmittance, 1.0));
        layers.set(LayerKind::VolumeIntegration, Rgba::from_rgb(inscatter, 1.0));
    }
    let alpha = if scene.settings.transparent_background {
        alpha.max(1.0 - transmittance.r)
    } else {
        alpha
    };
    (color * transmittance + inscatter, alpha)
}

/// Shadow query from a surface point toward a light sample. Returns
/// `(shadowed, filter)`; the filter is white unless transparent shadows
/// walked through tinted occluders.
pub(crate) fn shadow_test(scene: &SceneView, p: &Point, wi: Vector, distance: f64) -> (bool, Rgb) {
    let bias = scene.shadow_bias_at(p);
    let mut ray = Ray::new(*p, wi);
    ray.tmax = distance;
    if scene.settings.transparent_shadows {
        scene.accelerator.is_shadowed_transparent(
            scene.materials, &ray, scene.settings.shadow_depth, bias)
    } else {
        (scene.accelerator.is_shadowed(&ray, bias), Rgb::WHITE)
    }
}

fn normal_color(n: Vector) -> Rgba {
    Rgba::new(
        ((n.x + 1.0) * 0.5) as f32,
        ((n.y + 1.0) * 0.5) as f32,
        ((n.z + 1.0) * 0.5) as f32,
        1.0,
    )
}

/// Write the per-hit debug, basic-color and index layer values. Called at
/// most once per primary ray, for the first hit.
pub(crate) fn generate_common_layers(
    scene: &SceneView,
    hit: &SurfaceHit,
    ray: &Ray,
    layers: &mut ColorLayers,
) {
    let material = scene.material(hit.material);

    if layers.flags().contains(LayerFlags::DEBUG) {
        layers.set(LayerKind::Uv, Rgba::new(hit.uv.x as f32, hit.uv.y as f32, 0.0, 1.0));
        layers.set(LayerKind::NormalSmooth, normal_color(hit.ns));
        layers.set(LayerKind::NormalGeom, normal_color(hit.ng));
        layers.set(LayerKind::DebugDpdu, normal_color(hit.dpdu.normalize()));
        layers.set(LayerKind::DebugDpdv, normal_color(hit.dpdv.normalize()));
        layers.set(LayerKind::DebugSamplingFactor, Rgba::gray(material.sampling_factor()));
        if let Some(diff) = &ray.differentials {
            // footprint estimate: world-space offset of the auxiliary hits
            let dp_dx = (diff.x_from + diff.x_dir * hit.t) - hit.p;
            let dp_dy = (diff.y_from + diff.y_dir * hit.t) - hit.p;
            layers.set(LayerKind::DebugDpdx, normal_color(dp_dx));
            layers.set(LayerKind::DebugDpdy, normal_color(dp_dy));
            let inv_u = 1.0 / hit.dpdu.magnitude2().max(1e-12);
            let inv_v = 1.0 / hit.dpdv.magnitude2().max(1e-12);
            layers.set(LayerKind::DebugDudxDvdx, Rgba::new(
                ((dp_dx.dot(hit.dpdu) * inv_u + 1.0) * 0.5) as f32,
                ((dp_dx.dot(hit.dpdv) * inv_v + 1.0) * 0.5) as f32,
                0.0, 1.0,
            ));
            layers.set(LayerKind::DebugDudyDvdy, Rgba::new(
                ((dp_dy.dot(hit.dpdu) * inv_u + 1.0) * 0.5) as f32,
                ((dp_dy.dot(hit.dpdv) * inv_v + 1.0) * 0.5) as f32,
                0.0, 1.0,
            ));
        }
    }

    if layers.flags().contains(LayerFlags::DIFFUSE) || layers.flags().contains(LayerFlags::BASIC) {
        layers.set(LayerKind::DiffuseColor, Rgba::from_rgb(material.diffuse_color(hit), 1.0));
        layers.set(LayerKind::GlossyColor, Rgba::from_rgb(material.glossy_color(hit), 1.0));
        layers.set(LayerKind::TransColor, Rgba::from_rgb(material.trans_color(hit), 1.0));
    }

    if layers.flags().contains(LayerFlags::INDEX) {
        let mask = *scene.layers.mask_params();
        let obj = hit.object_index;
        let mat = material.index();
        layers.set(LayerKind::ObjIndexAbs, Rgba::gray(obj as f32));
        layers.set(LayerKind::ObjIndexNorm,
            Rgba::gray(obj as f32 / scene.settings.object_index_highest.max(1) as f32));
        layers.set(LayerKind::ObjIndexAuto, index_auto_color(obj));
        layers.set(LayerKind::MatIndexAbs, Rgba::gray(mat as f32));
        layers.set(LayerKind::MatIndexNorm,
            Rgba::gray(mat as f32 / scene.settings.material_index_highest.max(1) as f32));
        layers.set(LayerKind::MatIndexAuto, index_auto_color(mat));
        if obj == mask.obj_index {
            layers.set(LayerKind::ObjIndexMask, Rgba::new(1.0, 1.0, 1.0, 1.0));
        }
        if mat == mask.mat_index {
            layers.set(LayerKind::MatIndexMask, Rgba::new(1.0, 1.0, 1.0, 1.0));
        }
    }
}

/// Sum the per-lobe sub-channels into their aggregate layers. Runs once
/// per sample after integration.
pub(crate) fn combine_aggregate_layers(layers: &mut ColorLayers) {
    for (all, parts) in [
        (LayerKind::ReflectAll,
         [Some(LayerKind::ReflectPerfect), Some(LayerKind::Glossy), Some(LayerKind::GlossyIndirect)]),
        (LayerKind::RefractAll,
         [Some(LayerKind::RefractPerfect), Some(LayerKind::Trans), Some(LayerKind::TransIndirect)]),
        (LayerKind::IndirectAll,
         [Some(LayerKind::Indirect), Some(LayerKind::DiffuseIndirect), None]),
    ] {
        if !layers.is_defined(all) {
            continue;
        }
        let mut sum = Rgba::TRANSPARENT;
        for part in parts.into_iter().flatten() {
            if let Some(color) = layers.get(part) {
                sum += color;
            }
        }
        layers.set(all, sum);
    }
}

/// Deterministic distinct color for an index, for the auto index layers
fn index_auto_color(index: u32) -> Rgba {
    let hash = sampling::fnv_32a(index);
    Rgba::new(
        (hash & 0xff) as f32 / 255.0,
        ((hash >> 8) & 0xff) as f32 / 255.0,
        ((hash >> 16) & 0xff) as f32 / 255.0,
        1.0,
    )
}

/// Monte-Carlo ambient occlusion over a cosine-weighted hemisphere about
/// the shading normal, clamped to the configured distance.
pub(crate) fn sample_ambient_occlusion(
    scene: &SceneView,
    hit: &SurfaceHit,
    wo: &Vector,
    division: &RayDivision,
    pixel: &PixelSamplingData,
    clay: bool,
) -> Rgb {
    let ao = &scene.settings.ao;
    let mut n_samples = ao.samples.max(1) as usize;
    if division.division > 1 {
        n_samples = (n_samples / division.division).max(1);
    }
    let offset = (n_samples as u32).wrapping_mul(pixel.sample).wrapping_add(pixel.offset);
    let mut hal_u = Halton::with_start(2, offset.wrapping_sub(1));
    let mut hal_v = Halton::with_start(3, offset.wrapping_sub(1));

    let material = scene.material(hit.material);
    let n = face_forward(hit.ns, *wo);
    let (ru, rv) = coordinate_system(&n);

    let mut color = Rgb::BLACK;
    for _ in 0..n_samples {
        let mut s1 = hal_u.next();
        let mut s2 = hal_v.next();
        if division.division > 1 {
            s1 = sampling::add_mod1(s1, division.decorrelation_1);
            s2 = sampling::add_mod1(s2, division.decorrelation_2);
        }
        let wi = sampling::cos_hemisphere(n, ru, rv, s1, s2);
        let cos = wi.dot(n).abs() as f32;
        // cosine-weighted pdf cancels the cosine up to 1/pi
        let surface = if clay {
            Rgb::gray(std::f32::consts::FRAC_1_PI)
        } else {
            material.eval(hit, wo, &wi, BsdfFlags::ALL)
        };
        let (shadowed, filter) = shadow_test(scene, &hit.p, wi, ao.distance);
        if !shadowed {
            color += ao.color * filter * surface * (cos * std::f32::consts::PI);
        }
    }
    color * (1.0 / n_samples as f32)
}

/// Fill the AO layers if present
pub(crate) fn generate_occlusion_layers(
    scene: &SceneView,
    hit: &SurfaceHit,
    wo: &Vector,
    division: &RayDivision,
    pixel: &PixelSamplingData,
    layers: &mut ColorLayers,
) {
    if layers.is_defined(LayerKind::Ao) {
        let ao = sample_ambient_occlusion(scene, hit, wo, division, pixel, false);
        layers.accumulate(LayerKind::Ao, Rgba::from_rgb(ao, 1.0));
    }
    if layers.is_defined(LayerKind::AoClay) {
        let ao = sample_ambient_occlusion(scene, hit, wo, division, pixel, true);
        layers.accumulate(LayerKind::AoClay, Rgba::from_rgb(ao, 1.0));
    }
}

/// Next-event estimation over every scene light with multiple importance
/// sampling for area lights (power heuristic over light vs BSDF sampling).
/// Writes the diffuse/glossy direct split layers at the primary hit.
#[allow(clippy::too_many_arguments)]
pub(crate) fn estimate_direct_lighting(
    scene: &SceneView,
    hit: &SurfaceHit,
    wo: &Vector,
    rng: &mut SmallRng,
    division: &RayDivision,
    pixel: &PixelSamplingData,
    mut layers: Option<&mut ColorLayers>,
) -> Rgb {
    use rand::Rng;

    let material = scene.material(hit.material);
    let n = face_forward(hit.ns, *wo);
    let mut total = Rgb::BLACK;

    for (light_number, light) in scene.lights.iter().enumerate() {
        let mut contribution = Rgb::BLACK;
        let offset = pixel.offset.wrapping_add(light_number as u32);
        let mut s1 = sampling::ri_vdc(pixel.sample, offset);
        let mut s2 = sampling::ri_lp(pixel.sample, offset);
        if division.division > 1 {
            s1 = sampling::add_mod1(s1, division.decorrelation_1);
            s2 = sampling::add_mod1(s2, division.decorrelation_2);
        }

        // light sampling
        if let Some(sample) = light.sample(&hit.p, s1, s2) {
            if sample.pdf > 0.0 {
                let cos = sample.wi.dot(n);
                if cos > 0.0 {
                    let (shadowed, filter) = shadow_test(scene, &hit.p, sample.wi, sample.distance);
                    if !shadowed {
                        let f = material.eval(hit, wo, &sample.wi, BsdfFlags::ALL);
                        if !f.is_black() {
                            let weight = if light.is_delta() {
                                1.0
                            } else {
                                let bsdf_pdf = material.pdf(hit, wo, &sample.wi);
                                sampling::power_heuristic(sample.pdf, bsdf_pdf)
                            };
                            contribution += f * filter * sample.radiance
                                * ((cos * weight / sample.pdf) as f32);
                        }
                    }
                }
            }
        }

        // BSDF sampling toward area lights
        if !light.is_delta() {
            let sample = material.sample(hit, wo, rng.gen::<f64>(), rng.gen::<f64>());
            if sample.pdf > 0.0 && !sample.color.is_black() {
                let mut probe = Ray::new(hit.p, sample.wi);
                probe.tmin = scene.shadow_bias_at(&hit.p);
                if let Some((t, radiance, light_pdf)) = light.intersect(&probe) {
                    let (shadowed, filter) = shadow_test(scene, &hit.p, sample.wi, t);
                    if !shadowed {
                        let cos = sample.wi.dot(n).abs();
                        let weight = sampling::power_heuristic(sample.pdf, light_pdf);
                        contribution += sample.color * filter * radiance
                            * ((cos * weight / sample.pdf) as f32);
                    }
                }
            }
        }

        total += contribution;
    }

    if let Some(layers) = layers.as_deref_mut() {
        if layers.flags().contains(LayerFlags::DIFFUSE) {
            // split the direct estimate by which lobes can produce it
            let bsdf = material.init_bsdf(hit);
            if bsdf.contains(BsdfFlags::DIFFUSE) {
                layers.accumulate(LayerKind::Diffuse, Rgba::from_rgb(total, 1.0));
            }
            if bsdf.contains(BsdfFlags::GLOSSY) {
                layers.accumulate(LayerKind::Glossy, Rgba::from_rgb(total, 1.0));
            }
        }
    }

    total
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::Layers;

    #[test]
    fn aggregate_layers_sum_their_parts() {
        let mut registry = Layers::new();
        registry.define(LayerKind::ReflectAll);
        registry.define(LayerKind::ReflectPerfect);
        registry.define(LayerKind::Glossy);
        let mut layers = ColorLayers::new(&registry);
        layers.set(LayerKind::ReflectPerfect, Rgba::new(0.25, 0.0, 0.0, 1.0));
        layers.set(LayerKind::Glossy, Rgba::new(0.5, 0.0, 0.0, 1.0));
        combine_aggregate_layers(&mut layers);
        assert_eq!(layers.get(LayerKind::ReflectAll).unwrap().r, 0.75);
    }

    #[test]
    fn auto_index_colors_differ() {
        assert_ne!(index_auto_color(1), index_auto_color(2));
        assert_eq!(index_auto_color(7), index_auto_color(7));
    }
}
