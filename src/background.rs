use crate::color::Rgb;
use crate::space::Vector;

/// Environment contract: evaluated whenever a ray escapes the scene, and
/// sampled as a light when it carries energy.
pub trait Background: Send + Sync {
    /// Radiance arriving from direction `dir`
    fn eval(&self, dir: &Vector, use_ibl_blur: bool) -> Rgb;

    /// True if the background participates in image-based lighting
    fn has_ibl(&self) -> bool {
        false
    }

    /// True if photon tracing should shoot caustic photons from here
    fn shoots_caustic(&self) -> bool {
        false
    }
}

/// Uniform background color
#[derive(Debug, Clone)]
pub struct ConstantBackground {
    color: Rgb,
    ibl: bool,
}

impl ConstantBackground {
    pub fn new(color: Rgb) -> ConstantBackground {
        ConstantBackground { color, ibl: false }
    }

    pub fn with_ibl(color: Rgb) -> ConstantBackground {
        ConstantBackground { color, ibl: true }
    }
}

impl Background for ConstantBackground {
    fn eval(&self, _dir: &Vector, _use_ibl_blur: bool) -> Rgb {
        self.color
    }

    fn has_ibl(&self) -> bool {
        self.ibl
    }
}

/// Vertical gradient between a horizon and a zenith color
#[derive(Debug, Clone)]
pub struct GradientBackground {
    horizon: Rgb,
    zenith: Rgb,
}

impl GradientBackground {
    pub fn new(horizon: Rgb, zenith: Rgb) -> GradientBackground {
        GradientBackground { horizon, zenith }
    }
}

impl Background for GradientBackground {
    fn eval(&self, dir: &Vector, _use_ibl_blur: bool) -> Rgb {
        let t = (dir.y.clamp(-1.0, 1.0).abs()) as f32;
        self.horizon * (1.0 - t) + self.zenith * t
    }
}
