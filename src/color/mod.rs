use std::ops::{ Add, AddAssign, Sub, Mul, MulAssign, Div };

pub mod layers;
pub use self::layers::ColorLayers;

/// Linear-light RGB radiance value. All arithmetic in the core happens in
/// this domain; encoding to display spaces is an output concern.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

/// Linear-light RGB radiance value with an alpha/coverage channel.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Rgb = Rgb { r: 1.0, g: 1.0, b: 1.0 };

    #[inline]
    pub fn new(r: f32, g: f32, b: f32) -> Rgb {
        Rgb { r, g, b }
    }

    #[inline]
    pub fn gray(v: f32) -> Rgb {
        Rgb { r: v, g: v, b: v }
    }

    /// Rec. 709 luminance
    #[inline]
    pub fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }

    /// Rec. 709 luminance of the absolute components. Negative fireflies
    /// still count as energy for the noise estimator.
    #[inline]
    pub fn abs_luminance(&self) -> f32 {
        0.2126 * self.r.abs() + 0.7152 * self.g.abs() + 0.0722 * self.b.abs()
    }

    #[inline]
    pub fn max_component(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    #[inline]
    pub fn is_black(&self) -> bool {
        self.r == 0.0 && self.g == 0.0 && self.b == 0.0
    }

    #[inline]
    pub fn has_nan(&self) -> bool {
        !(self.r.is_finite() && self.g.is_finite() && self.b.is_finite())
    }

    #[inline]
    pub fn clamp_zero(&mut self) {
        self.r = self.r.max(0.0);
        self.g = self.g.max(0.0);
        self.b = self.b.max(0.0);
    }

    /// Clamp the maximum component to `max`, scaling the other components by
    /// the same ratio so the hue is preserved. A `max` of zero disables
    /// clamping.
    pub fn clamp_proportional(&mut self, max: f32) {
        if max <= 0.0 { return }
        let mc = self.max_component();
        if mc > max {
            let ratio = max / mc;
            self.r *= ratio;
            self.g *= ratio;
            self.b *= ratio;
        }
    }
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };

    #[inline]
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Rgba {
        Rgba { r, g, b, a }
    }

    #[inline]
    pub fn from_rgb(c: Rgb, a: f32) -> Rgba {
        Rgba { r: c.r, g: c.g, b: c.b, a }
    }

    #[inline]
    pub fn gray(v: f32) -> Rgba {
        Rgba { r: v, g: v, b: v, a: 1.0 }
    }

    #[inline]
    pub fn rgb(&self) -> Rgb {
        Rgb { r: self.r, g: self.g, b: self.b }
    }

    #[inline]
    pub fn luminance(&self) -> f32 {
        self.rgb().luminance()
    }

    #[inline]
    pub fn abs_luminance(&self) -> f32 {
        self.rgb().abs_luminance()
    }

    #[inline]
    pub fn has_nan(&self) -> bool {
        self.rgb().has_nan() || !self.a.is_finite()
    }

    /// Divide out the accumulated filter weight. A pixel with no weight has
    /// not converged yet and reads as transparent black.
    #[inline]
    pub fn normalized(&self, weight: f32) -> Rgba {
        if weight > 0.0 { *self * (1.0 / weight) } else { Rgba::TRANSPARENT }
    }

    #[inline]
    pub fn clamp_rgb01(&mut self) {
        self.r = self.r.clamp(0.0, 1.0);
        self.g = self.g.clamp(0.0, 1.0);
        self.b = self.b.clamp(0.0, 1.0);
    }

    /// Round the color channels up to whole values. Index layers use this to
    /// undo the fractional mix the reconstruction filter introduces.
    #[inline]
    pub fn ceil(&mut self) {
        self.r = self.r.ceil();
        self.g = self.g.ceil();
        self.b = self.b.ceil();
    }

    pub fn clamp_proportional(&mut self, max: f32) {
        let mut c = self.rgb();
        c.clamp_proportional(max);
        self.r = c.r;
        self.g = c.g;
        self.b = c.b;
    }

    /// Perceptual difference used by the adaptive sampler. With
    /// `detect_color_noise` the per-channel deviation is considered as well,
    /// which catches chroma noise that leaves the luminance unchanged.
    pub fn color_difference(&self, other: Rgba, detect_color_noise: bool) -> f32 {
        let mut diff = (self.abs_luminance() - other.abs_luminance()).abs();
        if detect_color_noise {
            diff = diff
                .max((other.r - self.r).abs())
                .max((other.g - self.g).abs())
                .max((other.b - self.b).abs());
        }
        diff
    }
}

impl Add for Rgb {
    type Output = Rgb;
    #[inline]
    fn add(self, o: Rgb) -> Rgb { Rgb::new(self.r + o.r, self.g + o.g, self.b + o.b) }
}

impl AddAssign for Rgb {
    #[inline]
    fn add_assign(&mut self, o: Rgb) { self.r += o.r; self.g += o.g; self.b += o.b; }
}

impl Sub for Rgb {
    type Output = Rgb;
    #[inline]
    fn sub(self, o: Rgb) -> Rgb { Rgb::new(self.r - o.r, self.g - o.g, self.b - o.b) }
}

impl Mul for Rgb {
    type Output = Rgb;
    #[inline]
    fn mul(self, o: Rgb) -> Rgb { Rgb::new(self.r * o.r, self.g * o.g, self.b * o.b) }
}

impl Mul<f32> for Rgb {
    type Output = Rgb;
    #[inline]
    fn mul(self, s: f32) -> Rgb { Rgb::new(self.r * s, self.g * s, self.b * s) }
}

impl MulAssign<f32> for Rgb {
    #[inline]
    fn mul_assign(&mut self, s: f32) { self.r *= s; self.g *= s; self.b *= s; }
}

impl Div<f32> for Rgb {
    type Output = Rgb;
    #[inline]
    fn div(self, s: f32) -> Rgb { self * (1.0 / s) }
}

impl Add for Rgba {
    type Output = Rgba;
    #[inline]
    fn add(self, o: Rgba) -> Rgba { Rgba::new(self.r + o.r, self.g + o.g, self.b + o.b, self.a + o.a) }
}

impl AddAssign for Rgba {
    #[inline]
    fn add_assign(&mut self, o: Rgba) { self.r += o.r; self.g += o.g; self.b += o.b; self.a += o.a; }
}

impl Sub for Rgba {
    type Output = Rgba;
    #[inline]
    fn sub(self, o: Rgba) -> Rgba { Rgba::new(self.r - o.r, self.g - o.g, self.b - o.b, self.a - o.a) }
}

impl Mul<f32> for Rgba {
    type Output = Rgba;
    #[inline]
    fn mul(self, s: f32) -> Rgba { Rgba::new(self.r * s, self.g * s, self.b * s, self.a * s) }
}

impl Mul for Rgba {
    type Output = Rgba;
    #[inline]
    fn mul(self, o: Rgba) -> Rgba { Rgba::new(self.r * o.r, self.g * o.g, self.b * o.b, self.a * o.a) }
}

impl From<Rgb> for Rgba {
    #[inline]
    fn from(c: Rgb) -> Rgba { Rgba::from_rgb(c, 1.0) }
}
