use rand::Rng;
use rand::rngs::SmallRng;

use crate::color::{ ColorLayers, Rgb, Rgba };
use crate::layer::LayerKind;
use crate::material::BsdfFlags;
use crate::sampling::PixelSamplingData;
use crate::scene::SceneView;
use crate::space::*;

use super::*;

/// Unidirectional path tracer. Next-event estimation with multiple
/// importance sampling at every scattering vertex, BSDF-sampled
/// continuation, Russian roulette after a minimum depth, and proportional
/// clamping of indirect contributions against fireflies.
pub struct PathIntegrator {
    max_depth: u32,
    russian_roulette_min_depth: u32,
    clamp_indirect: f32,
}

impl PathIntegrator {
    pub fn new(max_depth: u32) -> PathIntegrator {
        PathIntegrator {
            max_depth,
            russian_roulette_min_depth: 5,
            clamp_indirect: 0.0,
        }
    }

    pub fn with_russian_roulette_min_depth(mut self, depth: u32) -> PathIntegrator {
        self.russian_roulette_min_depth = depth;
        self
    }

    pub fn with_clamp_indirect(mut self, clamp: f32) -> PathIntegrator {
        self.clamp_indirect = clamp;
        self
    }

    /// Clamp one indirect contribution before it lands in the estimate
    fn clamped(&self, color: Rgb) -> Rgb {
        let mut color = color;
        color.clamp_proportional(self.clamp_indirect);
        color
    }
}

impl Default for PathIntegrator {
    fn default() -> PathIntegrator {
        PathIntegrator::new(8)
    }
}

/// Which indirect sub-channel the first sampled lobe feeds
fn indirect_layer_for(flags: BsdfFlags) -> Option<LayerKind> {
    if flags.contains(BsdfFlags::TRANSMIT) {
        Some(LayerKind::TransIndirect)
    } else if flags.contains(BsdfFlags::GLOSSY) {
        Some(LayerKind::GlossyIndirect)
    } else if flags.contains(BsdfFlags::DIFFUSE) {
        Some(LayerKind::DiffuseIndirect)
    } else {
        None
    }
}

impl SurfaceIntegrator for PathIntegrator {
    fn name(&self) -> &'static str {
        "pathtracer"
    }

    fn integrate(
        &self,
        scene: &SceneView,
        ray: &mut Ray,
        rng: &mut SmallRng,
        mut layers: Option<&mut ColorLayers>,
        depth: u32,
        _chromatic: bool,
        _wavelength: f32,
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

        let mut wo = -ray.dir;
        let material = scene.material(hit.material);
        let alpha = material.alpha(&hit, &wo);

        if depth == 0 {
            if let Some(layers) = layers.as_deref_mut() {
                generate_common_layers(scene, &hit, ray, layers);
                generate_occlusion_layers(scene, &hit, &wo, division, pixel, layers);
            }
        }

        // camera-visible emission
        let mut color = scene.material(hit.material).emission(&hit, &wo);
        if let Some(layers) = layers.as_deref_mut() {
            layers.accumulate(LayerKind::Emit, Rgba::from_rgb(color, 1.0));
        }
        color += estimate_direct_lighting(
            scene, &hit, &wo, rng, division, pixel, layers.as_deref_mut());

        let mut throughput = Rgb::WHITE;
        let mut indirect_layer: Option<LayerKind> = None;
        let mut bounce = depth;
        let max_depth = self.max_depth + scene.material(hit.material).additional_depth();

        loop {
            if bounce + 1 >= max_depth {
                break;
            }
            let material = scene.material(hit.material);
            let sample = material.sample(&hit, &wo, rng.gen::<f64>(), rng.gen::<f64>());
            if sample.pdf <= 0.0 || sample.color.is_black() {
                break;
            }
            if bounce == depth {
                indirect_layer = indirect_layer_for(sample.flags);
            }

            let n = face_forward(hit.ns, wo);
            let cos = sample.wi.dot(n).abs();
            throughput = throughput * (sample.color * ((cos / sample.pdf) as f32));

            // Russian roulette survival by remaining throughput
            if bounce + 1 > self.russian_roulette_min_depth {
                let survive = throughput.max_component().min(1.0);
                if survive <= 0.0 || rng.gen::<f32>() > survive {
                    break;
                }
                throughput *= 1.0 / survive;
            }

            let mut next = Ray::new(hit.p, sample.wi);
            next.tmin = scene.shadow_bias_at(&hit.p);
            next.time = ray.time;

            let Some(mut next_hit) = scene.accelerator.intersect(&next) else {
                // escaped: pick up the environment once
                if let Some(background) = scene.background {
                    let contribution =
                        self.clamped(throughput * background.eval(&next.dir, false));
                    color += contribution;
                    if let (Some(layers), Some(kind)) = (layers.as_deref_mut(), indirect_layer) {
                        layers.accumulate(kind, Rgba::from_rgb(contribution, 0.0));
                        layers.accumulate(LayerKind::Indirect, Rgba::from_rgb(contribution, 0.0));
                    }
                }
                break;
            };
            next_hit.face_forward(next.dir);
            hit = next_hit;
            wo = -next.dir;
            bounce += 1;

            let material = scene.material(hit.material);
            // NEE covers non-specular paths to emitters; count emission
            // only when it was reached through a delta lobe
            if sample.flags.contains(BsdfFlags::SPECULAR) {
                let contribution = self.clamped(throughput * material.emission(&hit, &wo));
                color += contribution;
            }
            let direct = estimate_direct_lighting(
                scene, &hit, &wo, rng, division, pixel, None);
            let contribution = self.clamped(throughput * direct);
            color += contribution;
            if let (Some(layers), Some(kind)) = (layers.as_deref_mut(), indirect_layer) {
                layers.accumulate(kind, Rgba::from_rgb(contribution, 0.0));
                layers.accumulate(LayerKind::Indirect, Rgba::from_rgb(contribution, 0.0));
            }
        }

        apply_volumetric_effects(scene, ray, rng, color, alpha, layers)
    }
}

#[cfg(test)]
mod test {
    use rand::SeedableRng;
    use crate::background::ConstantBackground;
    use crate::layer::Layers;
    use crate::light::{ AreaLight, Light, PointLight };
    use crate::material::{ Material, Matte };
    use crate::primitive::{ PrimitiveList, Quad };
    use crate::scene::MaterialRef;
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(99)
    }

    fn integrate_once(scene: &SceneView, ray: &mut Ray) -> (Rgb, f32) {
        let integrator = PathIntegrator::default();
        integrator.integrate(
            scene, ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default())
    }

    #[test]
    fn empty_scene_returns_background() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::new(0.1, 0.2, 0.3));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        let (color, alpha) = integrate_once(&scene, &mut ray);
        assert_eq!(color, Rgb::new(0.1, 0.2, 0.3));
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn indirect_bounce_brightens_shadowed_wall() {
        // a floor lit by a point light and a wall that only sees the floor
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let materials: Vec<Box<dyn Material>> = vec![
            Box::new(Matte::new(Rgb::gray(0.9))),
        ];
        let accel = PrimitiveList::new(vec![
            // floor at y = -1
            Box::new(Quad::new([-10.0, -1.0, -10.0], [20.0, 0.0, 0.0], [0.0, 0.0, 20.0], MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 3.0, 5.0], Rgb::gray(20.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_lights(&lights);

        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(0.0, -0.3, 1.0).normalize());
        let (color, alpha) = integrate_once(&scene, &mut ray);
        assert!(color.r > 0.0);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn area_light_via_light_sampling_and_bsdf_sampling() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.7)))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-10.0, -1.0, -10.0], [20.0, 0.0, 0.0], [0.0, 0.0, 20.0], MaterialRef(0))),
        ]);
        // emitter hanging above the floor, facing down
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(AreaLight::new(
                [-1.0, 4.0, 4.0], [2.0, 0.0, 0.0], [0.0, 0.0, 2.0], Rgb::gray(10.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_lights(&lights);

        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(0.0, -0.2, 1.0).normalize());
        let (color, _alpha) = integrate_once(&scene, &mut ray);
        assert!(color.r > 0.0 && color.r.is_finite());
    }

    #[test]
    fn clamp_indirect_bounds_fireflies() {
        let integrator = PathIntegrator::default().with_clamp_indirect(1.0);
        let clamped = integrator.clamped(Rgb::new(100.0, 50.0, 10.0));
        assert_eq!(clamped.max_component(), 1.0);
        let passthrough = PathIntegrator::default();
        assert_eq!(passthrough.clamped(Rgb::new(100.0, 50.0, 10.0)).r, 100.0);
    }
}
