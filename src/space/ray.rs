use super::{ Point, Vector };

/// Two auxiliary rays offset by one pixel in screen x and y, used to estimate
/// the footprint of a camera ray for texture filtering.
#[derive(Debug, Copy, Clone)]
pub struct RayDifferentials {
    pub x_from: Point,
    pub x_dir: Vector,
    pub y_from: Point,
    pub y_dir: Vector,
}

/// A ray with a parametric range and a frame time in [0, 1].
///
/// `tmin >= 0` and `tmax` is either infinite or greater than `tmin`.
#[derive(Debug, Clone)]
pub struct Ray {
    pub from: Point,
    pub dir: Vector,
    pub tmin: f64,
    pub tmax: f64,
    pub time: f64,
    pub differentials: Option<RayDifferentials>,
}

impl Ray {
    pub fn new(from: Point, dir: Vector) -> Ray {
        Ray { from, dir, tmin: 0.0, tmax: f64::INFINITY, time: 0.0, differentials: None }
    }

    /// Point along the ray at parameter t
    #[inline]
    pub fn at(&self, t: f64) -> Point {
        self.from + self.dir * t
    }
}

impl Default for Ray {
    fn default() -> Ray {
        Ray::new(Point::new(0.0, 0.0, 0.0), Vector::new(0.0, 0.0, 1.0))
    }
}

/// Tracks how often the current path has been split into branches, so that
/// branched estimators can decorrelate their low-discrepancy samples.
/// The scheduler seeds every primary ray with the unit division.
#[derive(Debug, Copy, Clone)]
pub struct RayDivision {
    pub division: usize,
    pub offset: usize,
    pub decorrelation_1: f64,
    pub decorrelation_2: f64,
}

impl Default for RayDivision {
    fn default() -> RayDivision {
        RayDivision { division: 1, offset: 0, decorrelation_1: 0.0, decorrelation_2: 0.0 }
    }
}
