use cgmath::prelude::*;
use cgmath::{ Vector3, Point3, BaseNum, BaseFloat, Bounded };

/// Axis-aligned bounding box
#[derive(Debug, Copy, Clone)]
pub struct Bounds3<S: BaseNum> {
    pub min: Point3<S>,
    pub max: Point3<S>
}

impl<S: BaseNum> Bounds3<S> {
    /// Create a new bounding box spanning the two given points
    #[inline]
    pub fn new(p0: Point3<S>, p1: Point3<S>) -> Bounds3<S> {
        Bounds3 {
            min: Point3::new(min(p0.x, p1.x), min(p0.y, p1.y), min(p0.z, p1.z)),
            max: Point3::new(max(p0.x, p1.x), max(p0.y, p1.y), max(p0.z, p1.z)),
        }
    }

    /// Expand using another bounding box
    #[inline]
    pub fn union(&self, with: &Self) -> Self {
        Bounds3 {
            min: Point3::new(min(self.min.x, with.min.x), min(self.min.y, with.min.y), min(self.min.z, with.min.z)),
            max: Point3::new(max(self.max.x, with.max.x), max(self.max.y, with.max.y), max(self.max.z, with.max.z)),
        }
    }

    /// Expand using another point
    #[inline]
    pub fn point_union(&self, with: &Point3<S>) -> Self {
        Bounds3 {
            min: Point3::new(min(self.min.x, with.x), min(self.min.y, with.y), min(self.min.z, with.z)),
            max: Point3::new(max(self.max.x, with.x), max(self.max.y, with.y), max(self.max.z, with.z)),
        }
    }

    /// Get the vector from the min point to the max point
    #[inline]
    pub fn diagonal(&self) -> Vector3<S> {
        self.max - self.min
    }

    /// Returns index of the longest of the three axes
    #[inline]
    pub fn maximum_extent(&self) -> usize {
        let d = self.diagonal();
        if d.x > d.y && d.x > d.z { 0 }
        else if d.y > d.z { 1 }
        else { 2 }
    }
}

impl<S: BaseNum + Bounded> Bounds3<S> {
    #[inline]
    pub fn none() -> Bounds3<S> {
        Bounds3 {
            min: Point3::max_value(),
            max: Point3::min_value()
        }
    }
}

impl<S: BaseFloat> Bounds3<S> {
    /// Midpoint of the box
    #[inline]
    pub fn center(&self) -> Point3<S> {
        let half = S::one() / (S::one() + S::one());
        self.min + self.diagonal() * half
    }

    /// Length of the min-to-max diagonal
    #[inline]
    pub fn diagonal_length(&self) -> S {
        self.diagonal().magnitude()
    }
}

#[inline]
fn min<S: BaseNum>(a: S, b: S) -> S {
    if a < b { a } else { b }
}

#[inline]
fn max<S: BaseNum>(a: S, b: S) -> S {
    if a < b { b } else { a }
}
