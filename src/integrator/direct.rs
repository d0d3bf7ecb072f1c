use rand::rngs::SmallRng;

use crate::color::{ ColorLayers, Rgb, Rgba };
use crate::layer::LayerKind;
use crate::material::BsdfFlags;
use crate::sampling::PixelSamplingData;
use crate::scene::SceneView;
use crate::space::*;

use super::*;

/// Direct lighting only: next-event estimation at the first hit plus
/// deterministic recursion through perfect specular lobes.
pub struct DirectLightIntegrator {
    max_depth: u32,
}

impl DirectLightIntegrator {
    pub fn new(max_depth: u32) -> DirectLightIntegrator {
        DirectLightIntegrator { max_depth }
    }
}

impl Default for DirectLightIntegrator {
    fn default() -> DirectLightIntegrator {
        DirectLightIntegrator::new(5)
    }
}

impl SurfaceIntegrator for DirectLightIntegrator {
    fn name(&self) -> &'static str {
        "directlight"
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
        if let Some(layers) = layers.as_deref_mut() {
            layers.accumulate(LayerKind::Emit, Rgba::from_rgb(color, 1.0));
        }
        color += estimate_direct_lighting(
            scene, &hit, &wo, rng, division, pixel, layers.as_deref_mut());

        if depth == 0 {
            if let Some(layers) = layers.as_deref_mut() {
                generate_common_layers(scene, &hit, ray, layers);
                generate_occlusion_layers(scene, &hit, &wo, division, pixel, layers);
            }
        }

        // follow perfect mirror/refraction chains
        let effective_max = self.max_depth + material.additional_depth();
        if depth < effective_max && bsdf.contains(BsdfFlags::SPECULAR) {
            let specular = material.specular(&hit, &wo);
            if let Some(lobe) = specular.reflect {
                let mut reflected = Ray::new(hit.p, lobe.dir);
                reflected.tmin = scene.shadow_bias_at(&hit.p);
                reflected.time = ray.time;
                let (sub, _) = self.integrate(
                    scene, &mut reflected, rng, None, depth + 1,
                    chromatic, wavelength, division, pixel);
                let contribution = lobe.color * sub;
                if let Some(layers) = layers.as_deref_mut() {
                    layers.accumulate(LayerKind::ReflectPerfect, Rgba::from_rgb(contribution, 1.0));
                }
                color += contribution;
            }
            if let Some(lobe) = specular.refract {
                let mut refracted = Ray::new(hit.p, lobe.dir);
                refracted.tmin = scene.shadow_bias_at(&hit.p);
                refracted.time = ray.time;
                let (sub, _) = self.integrate(
                    scene, &mut refracted, rng, None, depth + 1,
                    chromatic, wavelength, division, pixel);
                let contribution = lobe.color * sub;
                if let Some(layers) = layers.as_deref_mut() {
                    layers.accumulate(LayerKind::RefractPerfect, Rgba::from_rgb(contribution, 1.0));
                }
                color += contribution;
            }
        }

        let alpha = material.alpha(&hit, &wo);
        apply_volumetric_effects(scene, ray, rng, color, alpha, layers)
    }
}

#[cfg(test)]
mod test {
    use rand::SeedableRng;
    use crate::background::ConstantBackground;
    use crate::layer::Layers;
    use crate::light::{ Light, PointLight };
    use crate::material::{ Material, Matte, Mirror };
    use crate::primitive::{ PrimitiveList, Quad, Sphere };
    use crate::scene::MaterialRef;
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn miss_evaluates_background_with_full_alpha() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::new(0.5, 0.25, 0.125));
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let integrator = DirectLightIntegrator::default();
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        let (color, alpha) = integrator.integrate(
            &scene, &mut ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default());
        assert_eq!(color, Rgb::new(0.5, 0.25, 0.125));
        assert_eq!(alpha, 1.0);
        assert!(ray.tmax < 0.0);
    }

    #[test]
    fn transparent_background_yields_zero_alpha() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let background = ConstantBackground::new(Rgb::WHITE);
        let materials: Vec<Box<dyn Material>> = vec![];
        let accel = PrimitiveList::empty();
        let mut scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);
        scene.settings.transparent_background = true;

        let integrator = DirectLightIntegrator::default();
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        let (color, alpha) = integrator.integrate(
            &scene, &mut ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default());
        assert_eq!(color, Rgb::BLACK);
        assert_eq!(alpha, 0.0);
    }

    #[test]
    fn lit_surface_receives_light() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.8)))];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-5.0, -5.0, 5.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 0.0, 3.0], Rgb::gray(4.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_lights(&lights);

        let integrator = DirectLightIntegrator::default();
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        let (color, alpha) = integrator.integrate(
            &scene, &mut ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default());
        assert!(color.r > 0.0);
        assert_eq!(alpha, 1.0);
        assert!((ray.tmax - 5.0).abs() < 1e-9);
    }

    #[test]
    fn shadowed_point_stays_black() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::gray(0.8)))];
        // wall behind a blocker; light is between camera and blocker
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-5.0, -5.0, 6.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], MaterialRef(0))),
            Box::new(Sphere::new([0.0, 0.0, 4.0], 1.0, MaterialRef(0))),
        ]);
        let lights: Vec<Box<dyn Light>> = vec![
            Box::new(PointLight::new([0.0, 0.0, 1.0], Rgb::gray(4.0))),
        ];
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_lights(&lights);

        let integrator = DirectLightIntegrator::default();
        // aim past the sphere at the wall, offset so the sphere shadows it
        let dir = Vector::new(0.05, 0.0, 1.0).normalize();
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), dir);
        let (_color, _alpha) = integrator.integrate(
            &scene, &mut ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default());
        // the sphere is hit first, so the wall never shades here
        assert!(ray.tmax < 6.0);
    }

    #[test]
    fn mirror_chain_terminates_at_max_depth() {
        let camera = crate::camera::PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 4, 4);
        let materials: Vec<Box<dyn Material>> = vec![Box::new(Mirror::new(Rgb::WHITE))];
        // two parallel mirrors facing each other
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-5.0, -5.0, 2.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0], MaterialRef(0))),
            Box::new(Quad::new([-5.0, -5.0, -2.0], [0.0, 10.0, 0.0], [10.0, 0.0, 0.0], MaterialRef(0))),
        ]);
        let background = ConstantBackground::new(Rgb::new(1.0, 0.0, 0.0));
        let scene = SceneView::new(&camera, &accel, &materials, Layers::new())
            .with_background(&background);

        let integrator = DirectLightIntegrator::new(3);
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        // must return without blowing the stack, bounced between the mirrors
        let (color, _alpha) = integrator.integrate(
            &scene, &mut ray, &mut rng(), None, 0, true, 0.0,
            &RayDivision::default(), &PixelSamplingData::default());
        assert!(color.r.is_finite());
    }
}
