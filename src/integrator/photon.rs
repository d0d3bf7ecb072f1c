use log::{ info, warn };
use partition::partition;
use rand::{ Rng, SeedableRng };
use rand::rngs::SmallRng;
use typed_arena::Arena;

use crate::color::{ ColorLayers, Rgb, Rgba };
use crate::error::Error;
use crate::layer::LayerKind;
use crate::material::BsdfFlags;
use crate::render::control::RenderControl;
use crate::render::monitor::RenderMonitor;
use crate::sampling::{ self, PixelSamplingData };
use crate::scene::SceneView;
use crate::space::*;

use super::*;

/// A light particle deposited on a surface during the precomputation walk
#[derive(Debug, Copy, Clone)]
pub struct Photon {
    pub pos: Point,
    /// Direction of travel when it landed
    pub dir: Vector,
    pub power: Rgb,
}

const KD_LEAF_SIZE: usize = 8;

/// Epanechnikov-style density kernel over the gather disc
#[inline]
fn kernel(r_photon2: f64, inv_gather2: f64) -> f32 {
    let s = 1.0 - r_photon2 * inv_gather2;
    (3.0 * std::f64::consts::FRAC_1_PI * inv_gather2 * s * s) as f32
}

enum KdNodeType<'a> {
    /// First photon and count into the reordered photon storage
    Leaf(usize, usize),
    Interior(usize, f64, &'a KdBuildNode<'a>, &'a KdBuildNode<'a>),
}

struct KdBuildNode<'a> {
    content: KdNodeType<'a>,
}

#[derive(Debug, Copy, Clone)]
struct FlatKdNode {
    /// 0..2 split axis; 3 marks a leaf
    axis: u8,
    split: f64,
    second_child: u32,
    first: u32,
    count: u32,
}

/// Static k-d tree over photon deposit positions. Built once after the
/// precomputation walk, queried read-only from every worker thread.
pub struct PhotonMap {
    photons: Vec<Photon>,
    nodes: Vec<FlatKdNode>,
}

impl PhotonMap {
    pub fn empty() -> PhotonMap {
        PhotonMap { photons: Vec::new(), nodes: Vec::new() }
    }

    pub fn build(mut photons: Vec<Photon>) -> PhotonMap {
        if photons.is_empty() {
            return PhotonMap::empty();
        }
        let arena = Arena::new();
        let mut total_nodes = 0;
        let root = Self::build_node(&arena, &mut photons, 0, &mut total_nodes);
        let mut nodes = Vec::with_capacity(total_nodes);
        Self::flatten(root, &mut nodes);
        PhotonMap { photons, nodes }
    }

    pub fn len(&self) -> usize {
        self.photons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    fn build_node<'a>(
        arena: &'a Arena<KdBuildNode<'a>>,
        photons: &mut [Photon],
        first: usize,
        total_nodes: &mut usize,
    ) -> &'a KdBuildNode<'a> {
        *total_nodes += 1;
        if photons.len() <= KD_LEAF_SIZE {
            return arena.alloc(KdBuildNode { content: KdNodeType::Leaf(first, photons.len()) });
        }

        let bounds = photons.iter()
            .fold(Bounds::none(), |bounds, photon| bounds.point_union(&photon.pos));
        let axis = bounds.maximum_extent();
        let split = bounds.center()[axis];

        // spatial-median split, reordering the photon storage in place
        let (lo, hi) = partition(photons, |photon| photon.pos[axis] < split);
        if lo.is_empty() || hi.is_empty() {
            // degenerate cloud (all photons coincident on this axis)
            let count = lo.len() + hi.len();
            return arena.alloc(KdBuildNode { content: KdNodeType::Leaf(first, count) });
        }
        let lo_len = lo.len();
        let left = Self::build_node(arena, lo, first, total_nodes);
        let right = Self::build_node(arena, hi, first + lo_len, total_nodes);
        arena.alloc(KdBuildNode { content: KdNodeType::Interior(axis, split, left, right) })
    }

    fn flatten<'a>(node: &'a KdBuildNode<'a>, nodes: &mut Vec<FlatKdNode>) -> usize {
        let my_offset = nodes.len();
        nodes.push(FlatKdNode { axis: 3, split: 0.0, second_child: 0, first: 0, count: 0 });
        match node.content {
            KdNodeType::Leaf(first, count) => {
                nodes[my_offset].first = first as u32;
                nodes[my_offset].count = count as u32;
            }
            KdNodeType::Interior(axis, split, left, right) => {
                nodes[my_offset].axis = axis as u8;
                nodes[my_offset].split = split;
                Self::flatten(left, nodes);
                let second = Self::flatten(right, nodes);
                nodes[my_offset].second_child = second as u32;
            }
        }
        my_offset
    }

    /// Visit every photon within `radius` of `p`
    pub fn gather<F: FnMut(&Photon, f64)>(&self, p: &Point, radius: f64, mut visit: F) {
        if self.nodes.is_empty() {
            return;
        }
        let radius2 = radius * radius;
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = self.nodes[index];
            if node.axis == 3 {
                for photon in &self.photons[node.first as usize..(node.first + node.count) as usize] {
                    let d2 = (photon.pos - p).magnitude2();
                    if d2 <= radius2 {
                        visit(photon, d2);
                    }
                }
                continue;
            }
            let delta = p[node.axis as usize] - node.split;
            let (near, far) = if delta < 0.0 {
                (index + 1, node.second_child as usize)
            } else {
                (node.second_child as usize, index + 1)
            };
            stack.push(near);
            if delta * delta <= radius2 {
                stack.push(far);
            }
        }
    }

    /// Kernel-weighted irradiance arriving at a surface with normal `n`
    pub fn irradiance_estimate(&self, p: &Point, n: &Vector, radius: f64) -> Rgb {
        let mut irradiance = Rgb::BLACK;
        let inv_gather2 = 1.0 / (radius * radius);
        self.gather(p, radius, |photon, d2| {
            if photon.dir.dot(*n) < 0.0 {
                irradiance += photon.power * kernel(d2, inv_gather2);
            }
        });
        irradiance
    }
}

#[derive(Debug, Clone)]
pub struct PhotonIntegratorParams {
    pub diffuse_photons: u32,
    pub caustic_photons: u32,
    pub diffuse_radius: f64,
    pub caustic_radius: f64,
    /// Final-gather rays per primary hit; 0 uses the raw map estimate
    pub final_gather_samples: u32,
    pub max_depth: u32,
    /// Bounce limit of the photon walks
    pub photon_bounces: u32,
}

impl Default for PhotonIntegratorParams {
    fn default() -> PhotonIntegratorParams {
        PhotonIntegratorParams {
            diffuse_photons: 100_000,
            caustic_photons: 100_000,
            diffuse_radius: 0.5,
            caustic_radius: 0.25,
            final_gather_samples: 16,
            max_depth: 5,
            photon_bounces: 5,
        }
    }
}

/// Photon-mapping integrator: a one-time photon-shooting phase builds a
/// caustic map and a diffuse map, then rendering combines next-event
/// estimation with map lookups and a final gather for indirect light.
pub struct PhotonIntegrator {
    params: PhotonIntegratorParams,
    diffuse_map: PhotonMap,
    caustic_map: PhotonMap,
}

impl PhotonIntegrator {
    pub fn new(params: PhotonIntegratorParams) -> PhotonIntegrator {
        PhotonIntegrator {
            params,
            diffuse_map: PhotonMap::empty(),
            caustic_map: PhotonMap::empty(),
        }
    }

    pub fn diffuse_map(&self) -> &PhotonMap {
        &self.diffuse_map
    }

    pub fn caustic_map(&self) -> &PhotonMap {
        &self.caustic_map
    }

    /// Walk one photon through the scene, depositing according to `caustic`
    fn trace_photon(
        &self,
        scene: &SceneView,
        index: u32,
        caustic: bool,
        out: &mut Vec<Photon>,
    ) {
        let lights = scene.lights;
        let light = &lights[index as usize % lights.len()];
        if caustic && !light.shoots_caustic_photons() {
            return;
        }
        if !caustic && !light.shoots_diffuse_photons() {
            return;
        }

        // stratify emission over the photon index, scramble per map
        let scramble = if caustic { 0x9e3779b9u32 } else { 0x85ebca6bu32 };
        let s1 = sampling::ri_vdc(index, scramble);
        let s2 = sampling::ri_s(index, scramble);
        let s3 = sampling::ri_lp(index, scramble);
        let s4 = sampling::lds::low_discrepancy_sampling(3, index);
        let emitted = light.emit_photon(s1, s2, s3, s4);

        let total = if caustic { self.params.caustic_photons } else { self.params.diffuse_photons };
        let per_light = (total as usize / lights.len()).max(1) as f32;
        let mut power = emitted.flux * (1.0 / per_light);
        let mut ray = emitted.ray;
        let mut rng = SmallRng::seed_from_u64((index as u64) << 1 | caustic as u64);
        let mut specular_path = true;

        for bounce in 0..self.params.photon_bounces {
            let Some(mut hit) = scene.accelerator.intersect(&ray) else { break };
            hit.face_forward(ray.dir);
            let wo = -ray.dir;
            let material = scene.material(hit.material);
            let bsdf = material.init_bsdf(&hit);

            if bsdf.contains(BsdfFlags::DIFFUSE) {
                if caustic {
                    // a caustic path is light -> specular+ -> diffuse; any
                    // diffuse hit ends it, depositing only if it qualifies
                    if bounce > 0 && specular_path {
                        out.push(Photon { pos: hit.p, dir: ray.dir, power });
                    }
                    break;
                }
                out.push(Photon { pos: hit.p, dir: ray.dir, power });
            }

            let sample = material.sample(&hit, &wo, rng.gen::<f64>(), rng.gen::<f64>());
            if sample.pdf <= 0.0 || sample.color.is_black() {
                break;
            }
            if !sample.flags.contains(BsdfFlags::SPECULAR) {
                if caustic {
                    // once the path goes diffuse it can no longer make caustics
                    specular_path = false;
                }
                // survival roulette on the scatter albedo
                let survive = sample.color.max_component().min(1.0);
                if rng.gen::<f32>() > survive {
                    break;
                }
                power = power * (1.0 / survive);
            }
            let n = face_forward(hit.ns, wo);
            let cos = sample.wi.dot(n).abs();
            power = power * (sample.color * ((cos / sample.pdf) as f32));

            let mut next = Ray::new(hit.p, sample.wi);
            next.tmin = scene.shadow_bias_at(&hit.p);
            ray = next;
        }
    }

    /// One-bounce final gather: cosine rays that tap the diffuse map
    fn final_gather(
        &self,
        scene: &SceneView,
        hit: &crate::surface::SurfaceHit,
        wo: &Vector,
        pixel: &PixelSamplingData,
    ) -> Rgb {
        let n_samples = self.params.final_gather_samples.max(1) as usize;
        let offset = (n_samples as u32).wrapping_mul(pixel.sample).wrapping_add(pixel.offset);
        let mut hal_u = Halton::with_start(2, offset.wrapping_sub(1));
        let mut hal_v = Halton::with_start(3, offset.wrapping_sub(1));

        let material = scene.material(hit.material);
        let n = face_forward(hit.ns, *wo);
        let (ru, rv) = coordinate_system(&n);
        let bias = scene.shadow_bias_at(&hit.p);

        let mut color = Rgb::BLACK;
        for _ in 0..n_samples {
            let wi = sampling::cos_hemisphere(n, ru, rv, hal_u.next(), hal_v.next());
            let mut gather_ray = Ray::new(hit.p, wi);
            gather_ray.tmin = bias;
            let Some(mut gather_hit) = scene.accelerator.intersect(&gather_ray) else { continue };
            gather_hit.face_forward(gather_ray.dir);
            let gather_wo = -gather_ray.dir;
            let gather_material = scene.material(gather_hit.material);

            let irradiance = self.diffuse_map.irradiance_estimate(
                &gather_hit.p, &face_forward(gather_hit.ns, gather_wo), self.params.diffuse_radius);
            if irradiance.is_black() {
                continue;
            }
            // outgoing radiance at the tap, reflected back through our BSDF;
            // the cosine cancels against the cosine-weighted gather pdf
            let tap = irradiance * gather_material.eval(&gather_hit, &gather_wo, &-wi, BsdfFlags::ALL);
            color += tap * material.eval(hit, wo, &wi, BsdfFlags::ALL) * std::f32::consts::PI;
        }
        color * (1.0 / n_samples as f32)
    }
}

impl SurfaceIntegrator for PhotonIntegrator {
    fn name(&self) -> &'static str {
        "photonmap"
    }

    /// Photon shooting runs once, before any render pass
    fn prepare(
        &mut self,
        scene: &SceneView,
        control: &RenderControl,
        monitor: &RenderMonitor,
    ) -> Result<(), Error> {
        if scene.lights.is_empty() {
            warn!("{}: no lights in scene, photon maps stay empty", self.name());
            return Ok(());
        }
        monitor.set_tag("Building photon maps...");
        monitor.timer_start("prepass");

        let mut diffuse = Vec::with_capacity(self.params.diffuse_photons as usize);
        for i in 0..self.params.diffuse_photons {
            if control.canceled() {
                break;
            }
            self.trace_photon(scene, i, false, &mut diffuse);
        }
        let mut caustic = Vec::with_capacity(1024);
        for i in 0..self.params.caustic_photons {
            if control.canceled() {
                break;
            }
            self.trace_photon(scene, i, true, &mut caustic);
        }

        info!("{}: stored {} diffuse and {} caustic photons",
            self.name(), diffuse.len(), caustic.len());
        self.diffuse_map = PhotonMap::build(diffuse);
        self.caustic_map = PhotonMap::build(caustic);

        monitor.timer_stop("prepass");
        Ok(())
    }

    fn integrate(
        &self,
        scene: &SceneView,
        ray: &mut Ray,
        rng: &mut SmallRng,
        mut layers: Option<&mut ColorLayers>,
        depth: u32,
        chromatic: bool,
        wavelength: f32,
        division: &RayDivision,
        pixel: &PixelSamplingData,
    ) -> (Rgb, f32) {
        let Some(mut hit) = scene.accelerator.intersect(ray) else {
            ray.tmax = -1.0;
            let (color, alpha) = background_contribution(scene, ray, layers.as_deref_mut(), depth);
            return apply_volumetric_effects(scene, ray, rng, color, alpha, layers);
        };
        ray.tmax = hit.t;
        hit.face_forward(ray.dir);

        let wo = -ray.dir;
        let material = scene.material(hit.material);
        let bsdf = material.init_bsdf(&hit);

        let mut color = material.emission(&hit, &wo);
        color += estimate_direct_lighting(
            scene, &hit, &wo, rng, division, pixel, layers.as_deref_mut());

        if bsdf.contains(BsdfFlags::DIFFUSE) {
            // caustics come straight from the map
            let n = face_forward(hit.ns, wo);
            let mut caustic = Rgb::BLACK;
            let inv_gather2 = 1.0 / (self.params.caustic_radius * self.params.caustic_radius);
            self.caustic_map.gather(&hit.p, self.params.caustic_radius, |photon, d2| {
                if photon.dir.dot(n) < 0.0 {
                    let f = material.eval(&hit, &wo, &-photon.dir, BsdfFlags::ALL);
                    caustic += photon.power * f * kernel(d2, inv_gather2);
                }
            });
            color += caustic;

            // indirect diffuse through the final gather (or the raw map)
            let indirect = if self.params.final_gather_samples > 0 {
                self.final_gather(scene, &hit, &wo, pixel)
            } else {
                self.diffuse_map.irradiance_estimate(&hit.p, &n, self.params.diffuse_radius)
                    * material.eval(&hit, &wo, &n, BsdfFlags::ALL)
            };
            if let Some(layers) = layers.as_deref_mut() {
                layers.accumulate(LayerKind::DiffuseIndirect, Rgba::from_rgb(indirect, 0.0));
                layers.accumulate(LayerKind::Indirect, Rgba::from_rgb(indirect, 0.0));
            }
            color += indirect;
        }

        if depth == 0 {
            if let Some(layers) = layers.as_deref_mut() {
                generate_common_layers(scene, &hit, ray, layers);
                generate_occlusion_layers(scene, &hit, &wo, division, pixel, layers);
            }
        }

        let effective_max = self.params.max_depth + material.additional_depth();
        if depth < effective_max && bsdf.contains(BsdfFlags::SPECULAR) {
            let specular = material.specular(&hit, &wo);
            for (lobe, layer) in [
                (specular.reflect, LayerKind::ReflectPerfect),
                (specular.refract, LayerKind::RefractPerfect),
            ] {
                let Some(lobe) = lobe else { continue };
                let mut secondary = Ray::new(hit.p, lobe.dir);
                secondary.tmin = scene.shadow_bias_at(&hit.p);
                secondary.time = ray.time;
                let (sub, _) = self.integrate(
                    scene, &mut secondary, rng, None, depth + 1,
                    chromatic, wavelength, division, pixel);
                let contribution = lobe.color * sub;
                if let Some(layers) = layers.as_deref_mut() {
                    layers.accumulate(layer, Rgba::from_rgb(contribution, 1.0));
                }
                color += contribution;
            }
        }

        let alpha = material.alpha(&hit, &wo);
        apply_volumetric_effects(scene, ray, rng, color, alpha, layers)
    }
}
