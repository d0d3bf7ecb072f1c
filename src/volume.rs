use rand::rngs::SmallRng;

use crate::color::Rgb;
use crate::space::Ray;

/// Volumetric collaborator. After the surface contribution of a ray is
/// known, the integrator attenuates it by `transmittance` and adds
/// `integrate` as in-scattered radiance.
pub trait VolumeIntegrator: Send + Sync {
    /// Fraction of radiance surviving the ray's traversal of the medium
    fn transmittance(&self, rng: &mut SmallRng, ray: &Ray) -> Rgb;

    /// In-scattered radiance accumulated along the ray
    fn integrate(&self, rng: &mut SmallRng, ray: &Ray) -> Rgb;
}

/// Homogeneous absorbing/in-scattering medium filling the whole scene
pub struct UniformFog {
    sigma: f32,
    color: Rgb,
}

impl UniformFog {
    pub fn new(sigma: f32, color: Rgb) -> UniformFog {
        UniformFog { sigma, color }
    }
}

impl VolumeIntegrator for UniformFog {
    fn transmittance(&self, _rng: &mut SmallRng, ray: &Ray) -> Rgb {
        let distance = if ray.tmax.is_finite() { ray.tmax - ray.tmin } else { 0.0 };
        if distance <= 0.0 {
            return Rgb::WHITE;
        }
        Rgb::gray((-self.sigma * distance as f32).exp())
    }

    fn integrate(&self, rng: &mut SmallRng, ray: &Ray) -> Rgb {
        let t = self.transmittance(rng, ray);
        self.color * (1.0 - t.r)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use crate::space::{ Point, Vector };

    #[test]
    fn transmittance_decays_with_distance() {
        let fog = UniformFog::new(0.5, Rgb::gray(0.8));
        let mut rng = SmallRng::seed_from_u64(0);
        let mut short = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        short.tmax = 1.0;
        let mut long = short.clone();
        long.tmax = 4.0;
        let ts = fog.transmittance(&mut rng, &short).r;
        let tl = fog.transmittance(&mut rng, &long).r;
        assert!(ts > tl && tl > 0.0);
        // unbounded rays pass through untouched
        let open = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        assert_eq!(fog.transmittance(&mut rng, &open), Rgb::WHITE);
    }
}
