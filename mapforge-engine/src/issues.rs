use mapforge_core::brush::BrushId;
use mapforge_core::entity::EntityId;
use mapforge_core::map::Map;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    FloatPlanePoints,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    pub entity: EntityId,
    pub brush: BrushId,
}

impl Issue {
    pub fn description(&self) -> &'static str {
        match self.kind {
            IssueKind::FloatPlanePoints => "Brush has non-integer plane points",
        }
    }
}

/// 找出参考点不全为整数的笔刷。只读查询，修复由调用方决定。
pub fn find_float_point_brushes(map: &Map) -> Vec<Issue> {
    let mut issues = Vec::new();
    for entity in map.entities() {
        let Some(entity_id) = entity.id() else {
            continue;
        };
        for brush in entity.brushes() {
            if brush.has_non_integer_points() {
                issues.push(Issue {
                    kind: IssueKind::FloatPlanePoints,
                    entity: entity_id,
                    brush: brush.id(),
                });
            }
        }
    }
    if !issues.is_empty() {
        debug!(count = issues.len(), "发现非整数参考点的笔刷");
    }
    issues
}

#[cfg(test)]
mod tests {
    use glam::DVec3;
    use mapforge_core::brush::{Brush, BrushFace};
    use mapforge_core::entity::Entity;
    use mapforge_core::geometry::BBox3;

    use super::*;

    #[test]
    fn reports_only_brushes_with_fractional_points() {
        let world = BBox3::cube(4096.0);
        let mut map = Map::new(world);
        let clean = Brush::cuboid(world, BBox3::new(DVec3::ZERO, DVec3::splat(16.0))).unwrap();
        let mut dirty = Brush::cuboid(world, BBox3::new(DVec3::ZERO, DVec3::splat(16.0))).unwrap();
        dirty
            .set_faces(vec![
                BrushFace::new(DVec3::new(0.0, 0.0, 0.25), DVec3::Y, DVec3::X).unwrap(),
                BrushFace::new(DVec3::new(0.0, 0.0, 8.0), DVec3::new(1.0, 0.0, 8.0), DVec3::new(0.0, 1.0, 8.0))
                    .unwrap(),
            ])
            .unwrap();
        let dirty_id = dirty.id();

        let mut entity = Entity::new(world);
        entity.add_brushes([clean, dirty]);
        let id = map.add_entity(entity);

        let issues = find_float_point_brushes(&map);
        assert_eq!(
            issues,
            vec![Issue {
                kind: IssueKind::FloatPlanePoints,
                entity: id,
                brush: dirty_id,
            }]
        );
        assert_eq!(issues[0].description(), "Brush has non-integer plane points");
    }
}
