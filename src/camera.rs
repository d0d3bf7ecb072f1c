use std::f64;
use crate::space::*;

/// A primary ray plus a validity flag. Cameras with bounded image regions
/// (circular fisheyes and the like) return `valid: false` outside them; the
/// worker still records a zero-weight-consistent sample for those.
#[derive(Debug, Clone)]
pub struct CameraRay {
    pub ray: Ray,
    pub valid: bool,
}

/// Projection contract the tile workers consume. Immutable during a pass.
pub trait Camera: Send + Sync {
    /// Shoot the primary ray through image-plane position (px, py) in pixel
    /// units, with a lens sample in [0, 1)^2 for cameras with an aperture.
    fn shoot_ray(&self, px: f64, py: f64, lens_uv: (f64, f64)) -> CameraRay;

    /// True if the camera wants per-sample lens positions
    fn sample_lens(&self) -> bool {
        false
    }

    fn res_x(&self) -> u32;
    fn res_y(&self) -> u32;

    fn near_clip(&self) -> f64 {
        0.0
    }

    /// Negative when the camera has no far clip; the driver then probes the
    /// scene for the depth window instead
    fn far_clip(&self) -> f64 {
        -1.0
    }

    /// Project a world ray back to screen space; needed only by
    /// bidirectional techniques
    fn project(&self, _ray: &Ray, _lens_uv: (f64, f64)) -> Option<(Point2f, f64)> {
        None
    }
}

/// Perspective camera with an optional thin-lens aperture for depth of
/// field. A zero aperture radius makes it a pinhole.
#[derive(Debug)]
pub struct PinholeCamera {
    origin: Point,
    view: Vector,
    up: Vector,
    aux: Vector,
    res_x: u32,
    res_y: u32,
    image_plane_height: f64,
    aspect: f64,
    aperture_radius: f64,
    focal_distance: f64,
    near_clip: f64,
    far_clip: f64,
}

impl PinholeCamera {
    pub fn new(fov_degrees: f64, origin: [f64; 3], res_x: u32, res_y: u32) -> PinholeCamera {
        debug_assert!(fov_degrees > 0.0);
        PinholeCamera {
            origin: origin.into(),
            view: Vector::unit_z(),
            up: Vector::unit_y(),
            aux: Vector::unit_x(),
            res_x,
            res_y,
            image_plane_height: f64::tan(fov_degrees * f64::consts::PI / 360.0) * 2.0,
            aspect: res_x as f64 / res_y as f64,
            aperture_radius: 0.0,
            focal_distance: 1.0,
            near_clip: 0.0,
            far_clip: -1.0,
        }
    }

    /// Aim the camera at a point, keeping it as upright as possible
    pub fn look_at(&mut self, point: [f64; 3], up: [f64; 3]) -> &mut Self {
        let view = Point::from(point) - self.origin;
        let aux = view.cross(up.into());
        self.up = aux.cross(view).normalize();
        self.aux = aux.normalize();
        self.focal_distance = view.magnitude();
        self.view = view.normalize();
        self
    }

    pub fn set_aperture(&mut self, radius: f64, focal_distance: f64) -> &mut Self {
        self.aperture_radius = radius;
        self.focal_distance = focal_distance;
        self
    }

    pub fn set_clip(&mut self, near: f64, far: f64) -> &mut Self {
        self.near_clip = near;
        self.far_clip = far;
        self
    }
}

impl Camera for PinholeCamera {
    fn shoot_ray(&self, px: f64, py: f64, lens_uv: (f64, f64)) -> CameraRay {
        // pixel coordinates to [-0.5, 0.5] image plane offsets, y down
        let sx = (px / self.res_x as f64 - 0.5) * self.image_plane_height * self.aspect;
        let sy = (0.5 - py / self.res_y as f64) * self.image_plane_height;
        let mut dir = self.view + self.aux * sx + self.up * sy;

        let mut from = self.origin;
        if self.aperture_radius > 0.0 {
            // concentric-ish disk point from the square lens sample
            let r = self.aperture_radius * lens_uv.0.sqrt();
            let theta = 2.0 * f64::consts::PI * lens_uv.1;
            let focus = self.origin + dir * self.focal_distance;
            from += self.aux * (r * theta.cos()) + self.up * (r * theta.sin());
            dir = focus - from;
        }

        let mut ray = Ray::new(from, dir.normalize());
        ray.tmin = self.near_clip;
        CameraRay { ray, valid: true }
    }

    fn sample_lens(&self) -> bool {
        self.aperture_radius > 0.0
    }

    fn res_x(&self) -> u32 {
        self.res_x
    }

    fn res_y(&self) -> u32 {
        self.res_y
    }

    fn near_clip(&self) -> f64 {
        self.near_clip
    }

    fn far_clip(&self) -> f64 {
        self.far_clip
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn center_ray_matches_view() {
        let mut camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 4);
        camera.look_at([0.0, 0.0, 10.0], [0.0, 1.0, 0.0]);
        let shot = camera.shoot_ray(2.0, 2.0, (0.5, 0.5));
        assert!(shot.valid);
        assert!((shot.ray.dir - Vector::unit_z()).magnitude() < 1e-9);
    }

    #[test]
    fn corner_rays_diverge_symmetrically() {
        let camera = PinholeCamera::new(90.0, [0.0, 0.0, 0.0], 4, 4);
        let left = camera.shoot_ray(0.0, 2.0, (0.5, 0.5));
        let right = camera.shoot_ray(4.0, 2.0, (0.5, 0.5));
        assert!((left.ray.dir.x + right.ray.dir.x).abs() < 1e-12);
        // 90 degree fov: edge rays at 45 degrees
        assert!((left.ray.dir.x.abs() - left.ray.dir.z).abs() < 1e-9);
    }

    #[test]
    fn pinhole_ignores_lens_sample() {
        let camera = PinholeCamera::new(60.0, [0.0, 0.0, 0.0], 8, 8);
        assert!(!camera.sample_lens());
        let a = camera.shoot_ray(1.5, 2.5, (0.1, 0.9));
        let b = camera.shoot_ray(1.5, 2.5, (0.7, 0.2));
        assert_eq!(a.ray.dir, b.ray.dir);
    }
}
