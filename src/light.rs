use crate::color::Rgb;
use crate::sampling;
use crate::space::*;

/// One direct-lighting sample toward a light
#[derive(Debug, Copy, Clone)]
pub struct LightSample {
    /// Direction from the shaded point toward the light, normalized
    pub wi: Vector,
    /// Distance to the sampled light point
    pub distance: f64,
    /// Radiance arriving along `wi`
    pub radiance: Rgb,
    /// Solid-angle pdf of this sample; 1 for delta lights
    pub pdf: f64,
}

/// A photon leaving a light during the photon-map precomputation
#[derive(Debug, Clone)]
pub struct PhotonEmit {
    pub ray: Ray,
    /// Total flux carried; divide by the number of emitted photons
    pub flux: Rgb,
}

/// Illumination contract. Delta lights are point-sampled only; area lights
/// additionally support `intersect` and a nonzero pdf so the path
/// integrator can weight both sampling strategies against each other.
pub trait Light: Send + Sync {
    fn sample(&self, p: &Point, s1: f64, s2: f64) -> Option<LightSample>;

    /// For area lights: does `ray` hit the emitter, and with what radiance
    /// and solid-angle pdf from the ray origin
    fn intersect(&self, _ray: &Ray) -> Option<(f64, Rgb, f64)> {
        None
    }

    fn is_delta(&self) -> bool {
        true
    }

    /// Total emitted power, used to distribute photons over lights
    fn power(&self) -> Rgb;

    /// Start one photon walk from this light
    fn emit_photon(&self, s1: f64, s2: f64, s3: f64, s4: f64) -> PhotonEmit;

    fn shoots_caustic_photons(&self) -> bool {
        true
    }

    fn shoots_diffuse_photons(&self) -> bool {
        true
    }
}

/// Point light emitting uniformly in all directions
pub struct PointLight {
    position: Point,
    intensity: Rgb,
}

impl PointLight {
    pub fn new(position: [f64; 3], intensity: Rgb) -> PointLight {
        PointLight { position: position.into(), intensity }
    }
}

impl Light for PointLight {
    fn sample(&self, p: &Point, _s1: f64, _s2: f64) -> Option<LightSample> {
        let to_light = self.position - p;
        let distance2 = to_light.magnitude2();
        if distance2 <= 0.0 {
            return None;
        }
        let distance = distance2.sqrt();
        Some(LightSample {
            wi: to_light / distance,
            distance,
            radiance: self.intensity * (1.0 / distance2 as f32),
            pdf: 1.0,
        })
    }

    fn power(&self) -> Rgb {
        self.intensity * (4.0 * std::f32::consts::PI)
    }

    fn emit_photon(&self, s1: f64, s2: f64, _s3: f64, _s4: f64) -> PhotonEmit {
        let dir = sampling::sample_sphere(s1, s2);
        PhotonEmit {
            ray: Ray::new(self.position, dir),
            flux: self.power(),
        }
    }
}

/// One-sided rectangular area light
pub struct AreaLight {
    corner: Point,
    edge_u: Vector,
    edge_v: Vector,
    normal: Vector,
    radiance: Rgb,
    area: f64,
}

impl AreaLight {
    pub fn new(corner: [f64; 3], edge_u: [f64; 3], edge_v: [f64; 3], radiance: Rgb) -> AreaLight {
        let edge_u = Vector::from(edge_u);
        let edge_v = Vector::from(edge_v);
        let cross = edge_u.cross(edge_v);
        let area = cross.magnitude();
        AreaLight {
            corner: corner.into(),
            edge_u,
            edge_v,
            normal: cross / area,
            radiance,
            area,
        }
    }
}

impl Light for AreaLight {
    fn sample(&self, p: &Point, s1: f64, s2: f64) -> Option<LightSample> {
        let on_light = self.corner + self.edge_u * s1 + self.edge_v * s2;
        let to_light = on_light - p;
        let distance2 = to_light.magnitude2();
        if distance2 <= 0.0 {
            return None;
        }
        let distance = distance2.sqrt();
        let wi = to_light / distance;
        let cos_light = -wi.dot(self.normal);
        if cos_light <= 0.0 {
            // behind the emitter
            return None;
        }
        Some(LightSample {
            wi,
            distance,
            radiance: self.radiance,
            pdf: distance2 / (self.area * cos_light),
        })
    }

    fn intersect(&self, ray: &Ray) -> Option<(f64, Rgb, f64)> {
        let denom = ray.dir.dot(self.normal);
        if denom >= 0.0 {
            // from behind or parallel
            return None;
        }
        let t = (self.corner - ray.from).dot(self.normal) / denom;
        if t <= ray.tmin || t >= ray.tmax {
            return None;
        }
        let local = ray.at(t) - self.corner;
        let u = local.dot(self.edge_u) / self.edge_u.magnitude2();
        let v = local.dot(self.edge_v) / self.edge_v.magnitude2();
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return None;
        }
        let cos_light = -ray.dir.dot(self.normal);
        let pdf = t * t / (self.area * cos_light);
        Some((t, self.radiance, pdf))
    }

    fn is_delta(&self) -> bool {
        false
    }

    fn power(&self) -> Rgb {
        self.radiance * (self.area as f32 * std::f32::consts::PI)
    }

    fn emit_photon(&self, s1: f64, s2: f64, s3: f64, s4: f64) -> PhotonEmit {
        let from = self.corner + self.edge_u * s1 + self.edge_v * s2;
        let (ru, rv) = coordinate_system(&self.normal);
        let dir = sampling::cos_hemisphere(self.normal, ru, rv, s3, s4);
        PhotonEmit {
            ray: Ray::new(from, dir),
            flux: self.power(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn point_light_follows_inverse_square() {
        let light = PointLight::new([0.0, 2.0, 0.0], Rgb::new(4.0, 4.0, 4.0));
        let near = light.sample(&Point::new(0.0, 1.0, 0.0), 0.0, 0.0).unwrap();
        let far = light.sample(&Point::new(0.0, 0.0, 0.0), 0.0, 0.0).unwrap();
        assert_eq!(near.radiance.r, 4.0);
        assert_eq!(far.radiance.r, 1.0);
        assert_eq!(near.pdf, 1.0);
        assert!((near.wi - Vector::unit_y()).magnitude() < 1e-12);
    }

    #[test]
    fn area_light_rejects_backside() {
        // light facing -y, shaded point above it
        let light = AreaLight::new(
            [0.0, 1.0, 0.0], [0.0, 0.0, -1.0], [1.0, 0.0, 0.0],
            Rgb::new(2.0, 2.0, 2.0),
        );
        assert!(light.sample(&Point::new(0.5, 2.0, -0.5), 0.5, 0.5).is_none());
        assert!(light.sample(&Point::new(0.5, 0.0, -0.5), 0.5, 0.5).is_some());
    }

    #[test]
    fn area_light_intersect_agrees_with_sample_pdf() {
        let light = AreaLight::new(
            [-0.5, 2.0, -0.5], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0],
            Rgb::new(3.0, 3.0, 3.0),
        );
        // normal points down toward the origin
        let p = Point::new(0.0, 0.0, 0.0);
        let sample = light.sample(&p, 0.5, 0.5).unwrap();
        let ray = Ray::new(p, sample.wi);
        let (t, radiance, pdf) = light.intersect(&ray).expect("sampled ray must hit");
        assert!((t - sample.distance).abs() < 1e-9);
        assert_eq!(radiance, sample.radiance);
        assert!((pdf - sample.pdf).abs() < 1e-6);
    }
}
