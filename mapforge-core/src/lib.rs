pub mod brush;
pub mod definition;
pub mod entity;
pub mod links;
pub mod map;
pub mod pick;
pub mod properties;
pub mod registry;

pub mod geometry {
    use glam::{DQuat, DVec3};
    use serde::{Deserialize, Serialize};
    use std::f64::consts::FRAC_PI_2;

    /// 几何判定使用的容差。
    pub const EPSILON: f64 = 1e-6;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Axis {
        X,
        Y,
        Z,
    }

    impl Axis {
        #[inline]
        pub fn unit(self) -> DVec3 {
            match self {
                Axis::X => DVec3::X,
                Axis::Y => DVec3::Y,
                Axis::Z => DVec3::Z,
            }
        }

        #[inline]
        fn index(self) -> usize {
            match self {
                Axis::X => 0,
                Axis::Y => 1,
                Axis::Z => 2,
            }
        }
    }

    /// 绝对值最大的分量所在的轴，分量相等时依次偏向 X、Y。
    pub fn dominant_axis(v: DVec3) -> Axis {
        let abs = v.abs();
        if abs.x >= abs.y && abs.x >= abs.z {
            Axis::X
        } else if abs.y >= abs.z {
            Axis::Y
        } else {
            Axis::Z
        }
    }

    /// 与 `rotated90` 对应的四分之一圈旋转；顺时针即绕正轴旋转 -90°。
    pub fn quarter_turn(axis: Axis, clockwise: bool) -> DQuat {
        let angle = if clockwise { -FRAC_PI_2 } else { FRAC_PI_2 };
        DQuat::from_axis_angle(axis.unit(), angle)
    }

    /// 绕 `center` 精确旋转 90°，只做分量交换，不引入三角函数误差。
    pub fn rotated90(point: DVec3, axis: Axis, center: DVec3, clockwise: bool) -> DVec3 {
        let p = point - center;
        let rotated = match (axis, clockwise) {
            (Axis::X, true) => DVec3::new(p.x, p.z, -p.y),
            (Axis::X, false) => DVec3::new(p.x, -p.z, p.y),
            (Axis::Y, true) => DVec3::new(-p.z, p.y, p.x),
            (Axis::Y, false) => DVec3::new(p.z, p.y, -p.x),
            (Axis::Z, true) => DVec3::new(p.y, -p.x, p.z),
            (Axis::Z, false) => DVec3::new(-p.y, p.x, p.z),
        };
        rotated + center
    }

    /// 以经过 `center` 且垂直于 `axis` 的平面镜像。
    pub fn flipped(point: DVec3, axis: Axis, center: DVec3) -> DVec3 {
        let mut result = point;
        let i = axis.index();
        result[i] = 2.0 * center[i] - point[i];
        result
    }

    #[inline]
    pub fn is_integer_point(point: DVec3) -> bool {
        point.round() == point
    }

    /// 射线，方向在构造时归一化。零长度方向保持为零，所有求交都返回 `None`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Ray3 {
        pub origin: DVec3,
        pub direction: DVec3,
    }

    impl Ray3 {
        #[inline]
        pub fn new(origin: DVec3, direction: DVec3) -> Self {
            Self {
                origin,
                direction: direction.normalize_or_zero(),
            }
        }

        #[inline]
        pub fn is_degenerate(&self) -> bool {
            self.direction == DVec3::ZERO
        }

        #[inline]
        pub fn point_at(&self, distance: f64) -> DVec3 {
            self.origin + self.direction * distance
        }
    }

    /// 平面 `normal · p = distance`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Plane3 {
        pub normal: DVec3,
        pub distance: f64,
    }

    impl Plane3 {
        /// 三点定面，法线为 `(p2 - p0) × (p1 - p0)`。三点共线时返回 `None`。
        pub fn from_points(p0: DVec3, p1: DVec3, p2: DVec3) -> Option<Self> {
            let normal = (p2 - p0).cross(p1 - p0);
            if normal.length_squared() <= EPSILON * EPSILON {
                return None;
            }
            let normal = normal.normalize();
            Some(Self {
                normal,
                distance: normal.dot(p0),
            })
        }

        #[inline]
        pub fn point_distance(&self, point: DVec3) -> f64 {
            self.normal.dot(point) - self.distance
        }

        /// 仅当射线从正面射入时返回严格为正的距离。
        pub fn intersect_ray(&self, ray: &Ray3) -> Option<f64> {
            let denom = self.normal.dot(ray.direction);
            if denom > -EPSILON {
                return None;
            }
            let distance = -self.point_distance(ray.origin) / denom;
            if distance > 0.0 { Some(distance) } else { None }
        }
    }

    /// 三维轴对齐包围盒，任何修改后都保持 `min <= max`。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct BBox3 {
        min: DVec3,
        max: DVec3,
    }

    impl BBox3 {
        #[inline]
        pub fn new(a: DVec3, b: DVec3) -> Self {
            Self {
                min: a.min(b),
                max: a.max(b),
            }
        }

        /// 以原点为中心、半边长为 `half_extent` 的立方体。
        #[inline]
        pub fn cube(half_extent: f64) -> Self {
            Self::new(DVec3::splat(-half_extent), DVec3::splat(half_extent))
        }

        pub fn from_points(points: impl IntoIterator<Item = DVec3>) -> Option<Self> {
            let mut iter = points.into_iter();
            let first = iter.next()?;
            let mut bounds = Self::new(first, first);
            for point in iter {
                bounds.include_point(point);
            }
            Some(bounds)
        }

        #[inline]
        pub fn min(&self) -> DVec3 {
            self.min
        }

        #[inline]
        pub fn max(&self) -> DVec3 {
            self.max
        }

        #[inline]
        pub fn center(&self) -> DVec3 {
            (self.min + self.max) * 0.5
        }

        #[inline]
        pub fn size(&self) -> DVec3 {
            self.max - self.min
        }

        pub fn include_point(&mut self, point: DVec3) {
            self.min = self.min.min(point);
            self.max = self.max.max(point);
        }

        pub fn merge(&mut self, other: &BBox3) {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }

        #[inline]
        pub fn merged(mut self, other: &BBox3) -> Self {
            self.merge(other);
            self
        }

        pub fn translate(&mut self, delta: DVec3) {
            self.min += delta;
            self.max += delta;
        }

        #[inline]
        pub fn translated(mut self, delta: DVec3) -> Self {
            self.translate(delta);
            self
        }

        pub fn rotate90(&mut self, axis: Axis, center: DVec3, clockwise: bool) {
            let a = rotated90(self.min, axis, center, clockwise);
            let b = rotated90(self.max, axis, center, clockwise);
            *self = Self::new(a, b);
        }

        pub fn flip(&mut self, axis: Axis, center: DVec3) {
            let a = flipped(self.min, axis, center);
            let b = flipped(self.max, axis, center);
            *self = Self::new(a, b);
        }

        pub fn contains_point(&self, point: DVec3) -> bool {
            point.cmpge(self.min).all() && point.cmple(self.max).all()
        }

        /// 射线与包围盒求交。只检测朝向射线起点的侧面，起点位于盒内时不算命中。
        pub fn intersect_ray(&self, ray: &Ray3) -> Option<f64> {
            if ray.is_degenerate() {
                return None;
            }
            let mut best: Option<f64> = None;
            for i in 0..3 {
                let dir = ray.direction[i];
                let plane_coord = if ray.origin[i] < self.min[i] && dir > 0.0 {
                    self.min[i]
                } else if ray.origin[i] > self.max[i] && dir < 0.0 {
                    self.max[i]
                } else {
                    continue;
                };
                let distance = (plane_coord - ray.origin[i]) / dir;
                let hit = ray.point_at(distance);
                let (j, k) = ((i + 1) % 3, (i + 2) % 3);
                let inside = hit[j] >= self.min[j] - EPSILON
                    && hit[j] <= self.max[j] + EPSILON
                    && hit[k] >= self.min[k] - EPSILON
                    && hit[k] <= self.max[k] + EPSILON;
                if inside && best.is_none_or(|current| distance < current) {
                    best = Some(distance);
                }
            }
            best
        }
    }

}

pub mod errors {
    use thiserror::Error;

    use crate::entity::EntityId;

    /// 模型层的前置条件错误。缺失数据用 `Option` 表示，不走这里。
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum ModelError {
        #[error("face points are collinear")]
        CollinearPoints,
        #[error("a brush needs at least one face")]
        EmptyBrush,
        #[error("property key `{0}` cannot be removed or renamed")]
        ImmutableKey(String),
        #[error("property `{0}` cannot be changed once set")]
        ImmutableValue(String),
        #[error("property `{0}` does not exist")]
        MissingProperty(String),
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("brush {brush} not found in entity {entity:?}")]
        BrushNotFound { entity: Option<EntityId>, brush: u64 },
    }
}

pub mod cache {
    use std::cell::Cell;

    /// 惰性缓存：值与有效标记绑定，读取时按需重算。
    #[derive(Debug)]
    pub struct Cached<T: Copy> {
        value: Cell<Option<T>>,
    }

    impl<T: Copy> Default for Cached<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T: Copy> Cached<T> {
        #[inline]
        pub fn new() -> Self {
            Self {
                value: Cell::new(None),
            }
        }

        #[inline]
        pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> T {
            if let Some(value) = self.value.get() {
                return value;
            }
            let value = compute();
            self.value.set(Some(value));
            value
        }

        #[inline]
        pub fn invalidate(&self) {
            self.value.set(None);
        }

        #[inline]
        pub fn is_valid(&self) -> bool {
            self.value.get().is_some()
        }
    }

    impl<T: Copy> Clone for Cached<T> {
        fn clone(&self) -> Self {
            Self {
                value: Cell::new(self.value.get()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn recomputes_only_after_invalidation() {
            let cache = Cached::new();
            let mut calls = 0;
            let first = cache.get_or_compute(|| {
                calls += 1;
                7
            });
            let second = cache.get_or_compute(|| {
                calls += 1;
                9
            });
            assert_eq!((first, second), (7, 7));
            assert_eq!(calls, 1);
            cache.invalidate();
            assert!(!cache.is_valid());
            assert_eq!(cache.get_or_compute(|| 9), 9);
        }
    }
}
