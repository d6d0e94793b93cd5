use glam::DVec3;

use crate::brush::BrushId;
use crate::entity::EntityId;
use crate::geometry::Ray3;

/// 命中的对象：实体包围盒，或某个笔刷的某个面。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitObject {
    Entity(EntityId),
    Face {
        entity: Option<EntityId>,
        brush: BrushId,
        face: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub object: HitObject,
    pub point: DVec3,
    pub distance: f64,
}

impl Hit {
    #[inline]
    pub fn new(object: HitObject, point: DVec3, distance: f64) -> Self {
        Self {
            object,
            point,
            distance,
        }
    }
}

/// 收集多个对象的命中记录，本身不排序。
#[derive(Debug, Clone, Default)]
pub struct PickResult {
    hits: Vec<Hit>,
}

impl PickResult {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn add(&mut self, hit: Hit) {
        self.hits.push(hit);
    }

    #[inline]
    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn sort_by_distance(&mut self) {
        self.hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    /// 距离最近的命中，与当前顺序无关。
    pub fn first(&self) -> Option<&Hit> {
        self.hits
            .iter()
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

pub trait Pickable {
    fn pick(&self, ray: &Ray3, result: &mut PickResult);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_keeps_insertion_order_until_sorted() {
        let mut result = PickResult::new();
        result.add(Hit::new(HitObject::Entity(EntityId::new(2)), DVec3::ZERO, 12.0));
        result.add(Hit::new(HitObject::Entity(EntityId::new(1)), DVec3::ZERO, 4.0));
        assert_eq!(result.hits()[0].distance, 12.0);
        assert_eq!(result.first().map(|hit| hit.distance), Some(4.0));

        result.sort_by_distance();
        assert_eq!(result.hits()[0].object, HitObject::Entity(EntityId::new(1)));
        assert_eq!(result.len(), 2);
    }
}
