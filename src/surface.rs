use crate::scene::MaterialRef;
use crate::space::*;

/// Everything the integrator needs to know about the nearest surface along
/// a ray. Produced by the accelerator, consumed by materials and layer
/// generation.
///
/// The geometric and shading normals are stored as the primitive computed
/// them; the integrator face-forwards `ng` against the incoming direction
/// and keeps `ns` in the same hemisphere.
#[derive(Debug, Copy, Clone)]
pub struct SurfaceHit {
    /// Point of intersection in world space
    pub p: Point,
    /// Geometric normal
    pub ng: Vector,
    /// Shading normal (interpolated/bumped); same hemisphere as `ng`
    pub ns: Vector,
    /// Surface parametric coordinates
    pub uv: Point2f,
    /// Tangent frame: change of p along u and v
    pub dpdu: Vector,
    pub dpdv: Vector,
    /// Ray parameter at the hit
    pub t: f64,
    pub material: MaterialRef,
    /// Index of the owning object, for the index/mask layers
    pub object_index: u32,
    /// Which primitive of the aggregate produced this hit
    pub primitive_index: usize,
}

impl SurfaceHit {
    /// Flip both normals so the geometric one faces the origin of `ray_dir`
    pub fn face_forward(&mut self, ray_dir: Vector) {
        if self.ng.dot(ray_dir) > 0.0 {
            self.ng = -self.ng;
        }
        if self.ns.dot(self.ng) < 0.0 {
            self.ns = -self.ns;
        }
    }
}
