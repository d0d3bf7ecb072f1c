use std::f64::consts::PI;

use crate::color::Rgb;
use crate::material::Material;
use crate::scene::MaterialRef;
use crate::space::*;
use crate::surface::SurfaceHit;

/// A 3D shape placed in the scene. All primitives can intersect with a ray
/// restricted to its `(tmin, tmax)` range.
pub trait Primitive: Send + Sync {
    fn bounds(&self) -> Bounds;

    /// Nearest hit inside the ray's parametric range, if any
    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit>;

    /// Cheap predicate used for shadow rays
    fn intersects(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }
}

/// Nearest-hit and shadow queries over the whole primitive set. Queries
/// must be reentrant; builds may be parallel or lazy as long as queries
/// after construction are consistent.
pub trait Accelerator: Send + Sync {
    /// Closest surface hit along the ray
    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit>;

    /// Is the segment `(tmin .. tmax)` blocked by anything opaque
    fn is_shadowed(&self, ray: &Ray, bias: f64) -> bool;

    /// Shadow test that walks through transparent occluders, accumulating
    /// the product of their filters. Returns `(true, black)` when a fully
    /// opaque blocker (or more than `max_depth` transparent ones) is found.
    fn is_shadowed_transparent(
        &self, materials: &[Box<dyn Material>], ray: &Ray, max_depth: u32, bias: f64,
    ) -> (bool, Rgb);

    fn bounds(&self) -> Bounds;
}

pub struct Sphere {
    center: Point,
    radius: f64,
    material: MaterialRef,
    object_index: u32,
}

impl Sphere {
    pub fn new(center: [f64; 3], radius: f64, material: MaterialRef) -> Sphere {
        debug_assert!(radius > 0.0);
        Sphere { center: center.into(), radius, material, object_index: 0 }
    }

    pub fn with_object_index(mut self, index: u32) -> Sphere {
        self.object_index = index;
        self
    }
}

impl Primitive for Sphere {
    fn bounds(&self) -> Bounds {
        let r = Vector::new(self.radius, self.radius, self.radius);
        Bounds::new(self.center - r, self.center + r)
    }

    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        let oc = ray.from - self.center;
        let a = ray.dir.magnitude2();
        let half_b = oc.dot(ray.dir);
        let c = oc.magnitude2() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }
        let sqrt_d = discriminant.sqrt();
        let mut t = (-half_b - sqrt_d) / a;
        if t <= ray.tmin {
            t = (-half_b + sqrt_d) / a;
        }
        if t <= ray.tmin || t >= ray.tmax {
            return None;
        }

        let p = ray.at(t);
        let n = (p - self.center) / self.radius;
        // spherical parameterization
        let phi = n.z.atan2(n.x);
        let theta = n.y.clamp(-1.0, 1.0).acos();
        let uv = Point2f::new((phi + PI) / (2.0 * PI), theta / PI);
        let dpdu = Vector::new(-n.z, 0.0, n.x).normalize() * (2.0 * PI * self.radius);
        let dpdv = n.cross(dpdu).normalize() * (PI * self.radius);

        Some(SurfaceHit {
            p,
            ng: n,
            ns: n,
            uv,
            dpdu,
            dpdv,
            t,
            material: self.material,
            object_index: self.object_index,
            primitive_index: 0,
        })
    }
}

/// Bounded parallelogram defined by a corner and two edges
pub struct Quad {
    corner: Point,
    edge_u: Vector,
    edge_v: Vector,
    normal: Vector,
    material: MaterialRef,
    object_index: u32,
}

impl Quad {
    pub fn new(corner: [f64; 3], edge_u: [f64; 3], edge_v: [f64; 3], material: MaterialRef) -> Quad {
        let edge_u = Vector::from(edge_u);
        let edge_v = Vector::from(edge_v);
        Quad {
            corner: corner.into(),
            edge_u,
            edge_v,
            normal: edge_u.cross(edge_v).normalize(),
            material,
            object_index: 0,
        }
    }

    pub fn with_object_index(mut self, index: u32) -> Quad {
        self.object_index = index;
        self
    }
}

impl Primitive for Quad {
    fn bounds(&self) -> Bounds {
        Bounds::new(self.corner, self.corner + self.edge_u + self.edge_v)
            .point_union(&(self.corner + self.edge_u))
            .point_union(&(self.corner + self.edge_v))
    }

    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        let denom = ray.dir.dot(self.normal);
        if denom.abs() < 1e-12 {
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

        Some(SurfaceHit {
            p: ray.at(t),
            ng: self.normal,
            ns: self.normal,
            uv: Point2f::new(u, v),
            dpdu: self.edge_u,
            dpdv: self.edge_v,
            t,
            material: self.material,
            object_index: self.object_index,
            primitive_index: 0,
        })
    }
}

/// Linear-scan aggregate over boxed primitives. This is the reference
/// accelerator: correct and reentrant, with no build cost. Large scenes
/// plug a hierarchical structure into the same trait instead.
pub struct PrimitiveList {
    primitives: Vec<Box<dyn Primitive>>,
    bounds: Bounds,
}

impl PrimitiveList {
    pub fn new(primitives: Vec<Box<dyn Primitive>>) -> PrimitiveList {
        let bounds = primitives.iter()
            .fold(Bounds::none(), |bounds, primitive| bounds.union(&primitive.bounds()));
        PrimitiveList { primitives, bounds }
    }

    pub fn empty() -> PrimitiveList {
        PrimitiveList::new(Vec::new())
    }
}

impl Accelerator for PrimitiveList {
    fn intersect(&self, ray: &Ray) -> Option<SurfaceHit> {
        let mut ray = ray.clone();
        let mut nearest: Option<SurfaceHit> = None;
        for (index, primitive) in self.primitives.iter().enumerate() {
            if let Some(mut hit) = primitive.intersect(&ray) {
                ray.tmax = hit.t;
                hit.primitive_index = index;
                nearest = Some(hit);
            }
        }
        nearest
    }

    fn is_shadowed(&self, ray: &Ray, bias: f64) -> bool {
        let mut shadow_ray = ray.clone();
        shadow_ray.tmin = ray.tmin.max(bias);
        shadow_ray.tmax = ray.tmax - bias;
        if shadow_ray.tmax <= shadow_ray.tmin {
            return false;
        }
        self.primitives.iter().any(|primitive| primitive.intersects(&shadow_ray))
    }

    fn is_shadowed_transparent(
        &self, materials: &[Box<dyn Material>], ray: &Ray, max_depth: u32, bias: f64,
    ) -> (bool, Rgb) {
        let mut shadow_ray = ray.clone();
        shadow_ray.tmin = ray.tmin.max(bias);
        shadow_ray.tmax = ray.tmax - bias;
        let mut filter = Rgb::WHITE;
        let mut depth = 0;
        while let Some(hit) = self.intersect(&shadow_ray) {
            if depth >= max_depth {
                return (true, Rgb::BLACK);
            }
            let wo = -shadow_ray.dir;
            let material = &materials[hit.material.0];
            let transparency = material.transparency(&hit, &wo);
            if transparency.is_black() {
                return (true, Rgb::BLACK);
            }
            filter = filter * transparency;
            depth += 1;
            shadow_ray.tmin = hit.t + bias;
            if shadow_ray.tmax <= shadow_ray.tmin {
                break;
            }
        }
        (false, filter)
    }

    fn bounds(&self) -> Bounds {
        self.bounds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::material::Matte;

    fn sphere_at_origin() -> PrimitiveList {
        PrimitiveList::new(vec![
            Box::new(Sphere::new([0.0, 0.0, 0.0], 1.0, MaterialRef(0))),
        ])
    }

    #[test]
    fn sphere_hit_from_outside() {
        let accel = sphere_at_origin();
        let ray = Ray::new(Point::new(0.0, 0.0, -5.0), Vector::unit_z());
        let hit = accel.intersect(&ray).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-9);
        assert!((hit.ng - -Vector::unit_z()).magnitude() < 1e-9);
    }

    #[test]
    fn sphere_miss() {
        let accel = sphere_at_origin();
        let ray = Ray::new(Point::new(0.0, 3.0, -5.0), Vector::unit_z());
        assert!(accel.intersect(&ray).is_none());
    }

    #[test]
    fn nearest_of_two() {
        let accel = PrimitiveList::new(vec![
            Box::new(Sphere::new([0.0, 0.0, 3.0], 1.0, MaterialRef(0))),
            Box::new(Sphere::new([0.0, 0.0, 8.0], 1.0, MaterialRef(1))),
        ]);
        let ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        let hit = accel.intersect(&ray).unwrap();
        assert_eq!(hit.material, MaterialRef(0));
        assert_eq!(hit.primitive_index, 0);
    }

    #[test]
    fn quad_uv_parameterization() {
        let quad = Quad::new([0.0, 0.0, 5.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0], MaterialRef(0));
        let ray = Ray::new(Point::new(0.5, 1.0, 0.0), Vector::unit_z());
        let hit = quad.intersect(&ray).unwrap();
        assert!((hit.uv.x - 0.25).abs() < 1e-9);
        assert!((hit.uv.y - 0.5).abs() < 1e-9);
        // outside the bounded region
        let ray = Ray::new(Point::new(3.0, 1.0, 0.0), Vector::unit_z());
        assert!(quad.intersect(&ray).is_none());
    }

    #[test]
    fn shadow_ray_respects_bias_and_range() {
        let accel = sphere_at_origin();
        let mut ray = Ray::new(Point::new(0.0, 0.0, -5.0), Vector::unit_z());
        ray.tmax = 10.0;
        assert!(accel.is_shadowed(&ray, 1e-4));
        // segment ends before the sphere
        ray.tmax = 2.0;
        assert!(!accel.is_shadowed(&ray, 1e-4));
    }

    #[test]
    fn transparent_shadow_accumulates_filters() {
        let materials: Vec<Box<dyn Material>> = vec![
            Box::new(Matte::new(Rgb::WHITE).with_transparency(Rgb::new(0.5, 0.25, 1.0))),
        ];
        let accel = PrimitiveList::new(vec![
            Box::new(Quad::new([-1.0, -1.0, 2.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0], MaterialRef(0))),
            Box::new(Quad::new([-1.0, -1.0, 4.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0], MaterialRef(0))),
        ]);
        let mut ray = Ray::new(Point::new(0.0, 0.0, 0.0), Vector::unit_z());
        ray.tmax = 10.0;
        let (shadowed, filter) = accel.is_shadowed_transparent(&materials, &ray, 8, 1e-4);
        assert!(!shadowed);
        assert_eq!(filter, Rgb::new(0.25, 0.0625, 1.0));

        // opaque blocker wins
        let opaque: Vec<Box<dyn Material>> = vec![Box::new(Matte::new(Rgb::WHITE))];
        let (shadowed, filter) = accel.is_shadowed_transparent(&opaque, &ray, 8, 1e-4);
        assert!(shadowed);
        assert_eq!(filter, Rgb::BLACK);
    }
}
