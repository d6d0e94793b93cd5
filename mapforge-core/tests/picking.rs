use glam::DVec3;

use mapforge_core::brush::Brush;
use mapforge_core::entity::Entity;
use mapforge_core::geometry::{BBox3, Ray3};
use mapforge_core::map::Map;
use mapforge_core::pick::{HitObject, PickResult, Pickable};
use mapforge_core::properties::{CLASSNAME_KEY, ORIGIN_KEY};

fn world() -> BBox3 {
    BBox3::cube(8192.0)
}

fn cube() -> Brush {
    Brush::cuboid(world(), BBox3::new(DVec3::ZERO, DVec3::splat(16.0))).expect("创建立方体失败")
}

#[test]
fn ray_through_cube_hits_front_face_once() {
    let brush = cube();
    let ray = Ray3::new(DVec3::new(8.0, -8.0, 8.0), DVec3::Y);

    let mut result = PickResult::new();
    brush.pick(&ray, &mut result);
    assert_eq!(result.len(), 1);

    let hit = result.first().expect("应当命中");
    assert!((hit.distance - 8.0).abs() < 1e-9);
    assert!((hit.point - DVec3::new(8.0, 0.0, 8.0)).length() < 1e-9);
    match hit.object {
        HitObject::Face { brush: id, face, entity } => {
            assert_eq!(id, brush.id());
            assert_eq!(face, 2);
            assert!(entity.is_none());
            assert_eq!(brush.faces()[face].normal(), DVec3::NEG_Y);
        }
        other => panic!("期望面命中，得到 {other:?}"),
    }
}

#[test]
fn ray_pointing_away_misses() {
    let brush = cube();
    let mut result = PickResult::new();
    brush.pick(&Ray3::new(DVec3::new(8.0, -8.0, 8.0), DVec3::NEG_Y), &mut result);
    assert!(result.is_empty());

    // 零方向射线不产生命中
    brush.pick(&Ray3::new(DVec3::new(8.0, -8.0, 8.0), DVec3::ZERO), &mut result);
    assert!(result.is_empty());
}

#[test]
fn ray_starting_inside_reports_no_hit() {
    let brush = cube();
    let mut result = PickResult::new();
    brush.pick(&Ray3::new(DVec3::splat(8.0), DVec3::X), &mut result);
    assert!(result.is_empty());
}

#[test]
fn collector_orders_entities_and_faces_by_distance() {
    let mut map = Map::new(world());
    let mut near = Entity::new(world());
    near.set_property(CLASSNAME_KEY, Some("info_null")).expect("设置类名");
    near.set_property(ORIGIN_KEY, Some("8 -40 8")).expect("设置原点");
    let near = map.add_entity(near);

    let door = map.add_entity(
        Entity::with_properties(world(), [(CLASSNAME_KEY, "func_door")]).expect("创建实体"),
    );
    let brush_id = map.add_brush(door, cube()).expect("添加笔刷");

    let ray = Ray3::new(DVec3::new(8.0, -64.0, 8.0), DVec3::Y);
    let mut result = PickResult::new();
    for entity in map.entities() {
        if !entity.has_brushes() {
            entity.pick(&ray, &mut result);
        }
        for brush in entity.brushes() {
            brush.pick(&ray, &mut result);
        }
    }
    result.sort_by_distance();

    let objects: Vec<_> = result.hits().iter().map(|hit| hit.object).collect();
    assert_eq!(
        objects,
        vec![
            HitObject::Entity(near),
            HitObject::Face {
                entity: Some(door),
                brush: brush_id,
                face: 2
            },
        ]
    );
    assert!((result.hits()[0].distance - 16.0).abs() < 1e-9);
    assert!((result.hits()[1].distance - 64.0).abs() < 1e-9);
}

#[test]
fn translated_bounds_merge_is_idempotent() {
    let mut brush = cube();
    brush.translate(DVec3::new(4.0, 4.0, 4.0));
    let bounds = brush.bounds();
    assert_eq!(bounds.merged(&bounds), bounds);
    let union = brush
        .faces()
        .iter()
        .flat_map(|face| face.vertices().iter().copied())
        .fold(None::<BBox3>, |acc, point| match acc {
            Some(mut bounds) => {
                bounds.include_point(point);
                Some(bounds)
            }
            None => Some(BBox3::new(point, point)),
        })
        .expect("面多边形非空");
    assert_eq!(union, bounds);
}
