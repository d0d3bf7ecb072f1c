use bitflags::bitflags;
use crate::color::Rgb;
use crate::sampling;
use crate::space::*;
use crate::surface::SurfaceHit;

bitflags! {
    /// BSDF lobe classification. The integrators use these to decide which
    /// sampling strategies apply and which layers receive a contribution.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct BsdfFlags: u32 {
        const NONE     = 0;
        const SPECULAR = 1 << 0;
        const GLOSSY   = 1 << 1;
        const DIFFUSE  = 1 << 2;
        const REFLECT  = 1 << 3;
        const TRANSMIT = 1 << 4;
        const EMIT     = 1 << 5;
        const ALL      = Self::SPECULAR.bits() | Self::GLOSSY.bits() | Self::DIFFUSE.bits()
                       | Self::REFLECT.bits() | Self::TRANSMIT.bits() | Self::EMIT.bits();
    }
}

/// Result of importance-sampling a material
#[derive(Debug, Copy, Clone)]
pub struct MaterialSample {
    pub color: Rgb,
    pub wi: Vector,
    pub pdf: f64,
    pub flags: BsdfFlags,
}

impl MaterialSample {
    pub fn invalid() -> MaterialSample {
        MaterialSample {
            color: Rgb::BLACK,
            wi: Vector::new(0.0, 0.0, 1.0),
            pdf: 0.0,
            flags: BsdfFlags::NONE,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct SpecularLobe {
    pub dir: Vector,
    pub color: Rgb,
}

/// Perfect-mirror directions a material wants followed deterministically
#[derive(Debug, Copy, Clone, Default)]
pub struct SpecularComponents {
    pub reflect: Option<SpecularLobe>,
    pub refract: Option<SpecularLobe>,
}

/// Shading contract consumed by the integrators. Implementations are
/// immutable during a pass and shared across worker threads.
pub trait Material: Send + Sync {
    /// Classify the lobes present at this hit
    fn init_bsdf(&self, hit: &SurfaceHit) -> BsdfFlags;

    /// Importance-sample an incoming direction for outgoing `wo`
    fn sample(&self, hit: &SurfaceHit, wo: &Vector, s1: f64, s2: f64) -> MaterialSample;

    /// Evaluate the BSDF for a known direction pair
    fn eval(&self, hit: &SurfaceHit, wo: &Vector, wi: &Vector, flags: BsdfFlags) -> Rgb;

    /// Probability density `sample` would have produced `wi`
    fn pdf(&self, hit: &SurfaceHit, wo: &Vector, wi: &Vector) -> f64;

    fn emission(&self, _hit: &SurfaceHit, _wo: &Vector) -> Rgb {
        Rgb::BLACK
    }

    /// Per-channel transparency filter; black means fully opaque
    fn transparency(&self, _hit: &SurfaceHit, _wo: &Vector) -> Rgb {
        Rgb::BLACK
    }

    fn alpha(&self, _hit: &SurfaceHit, _wo: &Vector) -> f32 {
        1.0
    }

    fn specular(&self, _hit: &SurfaceHit, _wo: &Vector) -> SpecularComponents {
        SpecularComponents::default()
    }

    /// User-assigned material index for the index/mask layers
    fn index(&self) -> u32 {
        0
    }

    /// Extra recursion depth this material needs (e.g. layered glass)
    fn additional_depth(&self) -> u32 {
        0
    }

    /// Per-material multiplier for the adaptive sampling-factor layer
    fn sampling_factor(&self) -> f32 {
        1.0
    }

    fn diffuse_color(&self, _hit: &SurfaceHit) -> Rgb {
        Rgb::BLACK
    }

    fn glossy_color(&self, _hit: &SurfaceHit) -> Rgb {
        Rgb::BLACK
    }

    fn trans_color(&self, _hit: &SurfaceHit) -> Rgb {
        Rgb::BLACK
    }
}

/// Lambertian reflector, optionally with a transparency filter so it can
/// double as a thin translucent sheet for transparent shadows.
pub struct Matte {
    albedo: Rgb,
    transparency: Rgb,
    index: u32,
    sampling_factor: f32,
}

impl Matte {
    pub fn new(albedo: Rgb) -> Matte {
        Matte { albedo, transparency: Rgb::BLACK, index: 0, sampling_factor: 1.0 }
    }

    pub fn with_index(mut self, index: u32) -> Matte {
        self.index = index;
        self
    }

    pub fn with_transparency(mut self, filter: Rgb) -> Matte {
        self.transparency = filter;
        self
    }

    pub fn with_sampling_factor(mut self, factor: f32) -> Matte {
        self.sampling_factor = factor;
        self
    }
}

impl Material for Matte {
    fn init_bsdf(&self, _hit: &SurfaceHit) -> BsdfFlags {
        let mut flags = BsdfFlags::DIFFUSE | BsdfFlags::REFLECT;
        if !self.transparency.is_black() {
            flags |= BsdfFlags::TRANSMIT;
        }
        flags
    }

    fn sample(&self, hit: &SurfaceHit, wo: &Vector, s1: f64, s2: f64) -> MaterialSample {
        let n = face_forward(hit.ns, *wo);
        let (ru, rv) = coordinate_system(&n);
        let wi = sampling::cos_hemisphere(n, ru, rv, s1, s2);
        let cos = wi.dot(n).max(0.0);
        MaterialSample {
            color: self.albedo * std::f32::consts::FRAC_1_PI,
            wi,
            pdf: cos * std::f64::consts::FRAC_1_PI,
            flags: BsdfFlags::DIFFUSE | BsdfFlags::REFLECT,
        }
    }

    fn eval(&self, hit: &SurfaceHit, wo: &Vector, wi: &Vector, _flags: BsdfFlags) -> Rgb {
        let n = face_forward(hit.ns, *wo);
        if wi.dot(n) <= 0.0 {
            return Rgb::BLACK;
        }
        self.albedo * std::f32::consts::FRAC_1_PI
    }

    fn pdf(&self, hit: &SurfaceHit, wo: &Vector, wi: &Vector) -> f64 {
        let n = face_forward(hit.ns, *wo);
        wi.dot(n).max(0.0) * std::f64::consts::FRAC_1_PI
    }

    fn transparency(&self, _hit: &SurfaceHit, _wo: &Vector) -> Rgb {
        self.transparency
    }

    fn alpha(&self, _hit: &SurfaceHit, _wo: &Vector) -> f32 {
        if self.transparency.is_black() { 1.0 } else { 1.0 - self.transparency.luminance() }
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn sampling_factor(&self) -> f32 {
        self.sampling_factor
    }

    fn diffuse_color(&self, _hit: &SurfaceHit) -> Rgb {
        self.albedo
    }
}

/// Pure emitter; pairs with an area light covering the same geometry
pub struct Emissive {
    radiance: Rgb,
    index: u32,
}

impl Emissive {
    pub fn new(radiance: Rgb) -> Emissive {
        Emissive { radiance, index: 0 }
    }

    pub fn with_index(mut self, index: u32) -> Emissive {
        self.index = index;
        self
    }
}

impl Material for Emissive {
    fn init_bsdf(&self, _hit: &SurfaceHit) -> BsdfFlags {
        BsdfFlags::EMIT
    }

    fn sample(&self, _hit: &SurfaceHit, _wo: &Vector, _s1: f64, _s2: f64) -> MaterialSample {
        MaterialSample::invalid()
    }

    fn eval(&self, _hit: &SurfaceHit, _wo: &Vector, _wi: &Vector, _flags: BsdfFlags) -> Rgb {
        Rgb::BLACK
    }

    fn pdf(&self, _hit: &SurfaceHit, _wo: &Vector, _wi: &Vector) -> f64 {
        0.0
    }

    fn emission(&self, hit: &SurfaceHit, wo: &Vector) -> Rgb {
        // one-sided: emit only toward the front face
        if hit.ng.dot(*wo) > 0.0 { self.radiance } else { Rgb::BLACK }
    }

    fn index(&self) -> u32 {
        self.index
    }
}

/// Perfect mirror
pub struct Mirror {
    tint: Rgb,
    index: u32,
}

impl Mirror {
    pub fn new(tint: Rgb) -> Mirror {
        Mirror { tint, index: 0 }
    }

    pub fn with_index(mut self, index: u32) -> Mirror {
        self.index = index;
        self
    }
}

impl Material for Mirror {
    fn init_bsdf(&self, _hit: &SurfaceHit) -> BsdfFlags {
        BsdfFlags::SPECULAR | BsdfFlags::REFLECT
    }

    fn sample(&self, hit: &SurfaceHit, wo: &Vector, _s1: f64, _s2: f64) -> MaterialSample {
        let n = face_forward(hit.ns, *wo);
        let wi = reflect(wo, &n);
        let cos = wi.dot(n).abs().max(1e-6);
        MaterialSample {
            // the 1/cos cancels the projection term the caller applies
            color: self.tint * (1.0 / cos as f32),
            wi,
            pdf: 1.0,
            flags: BsdfFlags::SPECULAR | BsdfFlags::REFLECT,
        }
    }

    fn eval(&self, _hit: &SurfaceHit, _wo: &Vector, _wi: &Vector, _flags: BsdfFlags) -> Rgb {
        // a delta lobe never evaluates for sampled direction pairs
        Rgb::BLACK
    }

    fn pdf(&self, _hit: &SurfaceHit, _wo: &Vector, _wi: &Vector) -> f64 {
        0.0
    }

    fn specular(&self, hit: &SurfaceHit, wo: &Vector) -> SpecularComponents {
        let n = face_forward(hit.ns, *wo);
        SpecularComponents {
            reflect: Some(SpecularLobe { dir: reflect(wo, &n), color: self.tint }),
            refract: None,
        }
    }

    fn index(&self) -> u32 {
        self.index
    }

    fn glossy_color(&self, _hit: &SurfaceHit) -> Rgb {
        self.tint
    }
}

/// Mirror reflection of wo about n
#[inline]
pub fn reflect(wo: &Vector, n: &Vector) -> Vector {
    n * (2.0 * wo.dot(*n)) - wo
}
