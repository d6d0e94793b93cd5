use mapforge_core::entity::{Entity, EntityId};
use mapforge_core::geometry::BBox3;
use mapforge_core::map::Map;
use mapforge_core::properties::{CLASSNAME_KEY, KILLTARGET_KEY, TARGET_KEY, TARGETNAME_KEY};

fn world() -> BBox3 {
    BBox3::cube(8192.0)
}

fn spawn(map: &mut Map, properties: &[(&str, &str)]) -> EntityId {
    let entity = Entity::with_properties(world(), properties.iter().copied()).expect("创建实体失败");
    map.add_entity(entity)
}

fn assert_symmetric(map: &Map) {
    for entity in map.entities() {
        let id = entity.id().expect("地图内实体应有编号");
        for target in entity.link_targets() {
            let other = map.entity(*target).expect("目标存在");
            assert!(other.link_sources().contains(&id), "{id:?} -> {target:?} 缺少反向关系");
        }
        for source in entity.link_sources() {
            let other = map.entity(*source).expect("来源存在");
            assert!(other.link_targets().contains(&id));
        }
        for target in entity.kill_targets() {
            let other = map.entity(*target).expect("目标存在");
            assert!(other.kill_sources().contains(&id));
        }
        for source in entity.kill_sources() {
            let other = map.entity(*source).expect("来源存在");
            assert!(other.kill_targets().contains(&id));
        }
    }
}

fn snapshot(map: &Map) -> Vec<(Vec<EntityId>, Vec<EntityId>, Vec<EntityId>, Vec<EntityId>)> {
    map.entities()
        .map(|entity| {
            let mut lists = (
                entity.link_targets().to_vec(),
                entity.link_sources().to_vec(),
                entity.kill_targets().to_vec(),
                entity.kill_sources().to_vec(),
            );
            lists.0.sort();
            lists.1.sort();
            lists.2.sort();
            lists.3.sort();
            lists
        })
        .collect()
}

fn build_scene() -> (Map, [EntityId; 4]) {
    let mut map = Map::new(world());
    let door = spawn(&mut map, &[(CLASSNAME_KEY, "func_door"), (TARGETNAME_KEY, "door")]);
    let lamp = spawn(&mut map, &[(CLASSNAME_KEY, "light"), (TARGETNAME_KEY, "lamp")]);
    let button = spawn(
        &mut map,
        &[(CLASSNAME_KEY, "func_button"), (TARGET_KEY, "door"), ("target2", "lamp")],
    );
    let trigger = spawn(
        &mut map,
        &[(CLASSNAME_KEY, "trigger_once"), (KILLTARGET_KEY, "lamp"), (TARGET_KEY, "door")],
    );
    (map, [door, lamp, button, trigger])
}

#[test]
fn links_are_symmetric_after_construction() {
    let (map, [door, lamp, button, trigger]) = build_scene();
    assert_symmetric(&map);

    let button_targets = map.entity(button).unwrap().link_targets();
    assert!(button_targets.contains(&door) && button_targets.contains(&lamp));
    assert_eq!(map.entity(trigger).unwrap().kill_targets(), &[lamp]);

    let mut door_sources = map.entity(door).unwrap().link_sources().to_vec();
    door_sources.sort();
    assert_eq!(door_sources, vec![button, trigger]);
}

#[test]
fn reattaching_is_idempotent() {
    let (mut map, [door, lamp, button, _]) = build_scene();
    let before = snapshot(&map);

    map.set_attached(button, true).expect("重复挂接");
    assert_eq!(snapshot(&map), before);

    map.set_attached(lamp, false).expect("脱离");
    map.set_attached(lamp, false).expect("重复脱离");
    assert_symmetric(&map);
    let detached = map.entity(lamp).unwrap();
    assert!(detached.link_sources().is_empty() && detached.kill_sources().is_empty());
    assert!(!map.entity(button).unwrap().link_targets().contains(&lamp));

    map.set_attached(lamp, true).expect("重新挂接");
    map.set_attached(lamp, true).expect("重复挂接");
    assert_eq!(snapshot(&map), before);
    assert_symmetric(&map);
    assert!(map.entity(door).unwrap().is_attached());
}

#[test]
fn clearing_a_target_severs_its_links() {
    let (mut map, [door, _, button, trigger]) = build_scene();

    map.set_property(button, TARGET_KEY, None).expect("清除 target");
    assert_symmetric(&map);
    assert!(!map.entity(button).unwrap().link_targets().contains(&door));
    assert_eq!(map.entity(door).unwrap().link_sources(), &[trigger]);

    map.set_property(trigger, TARGET_KEY, Some("")).expect("清空 target");
    assert!(map.entity(door).unwrap().link_sources().is_empty());
    assert_symmetric(&map);
}

#[test]
fn renaming_a_targetname_moves_inbound_links() {
    let (mut map, [door, lamp, button, trigger]) = build_scene();

    map.set_property(lamp, TARGETNAME_KEY, Some("door")).expect("改名");
    assert_symmetric(&map);
    let mut lamp_sources = map.entity(lamp).unwrap().link_sources().to_vec();
    lamp_sources.sort();
    assert_eq!(lamp_sources, vec![button, trigger]);
    assert!(map.entity(lamp).unwrap().kill_sources().is_empty());
    assert!(map.entity(trigger).unwrap().kill_targets().is_empty());
    assert_eq!(map.entities_with_targetname("door").len(), 2);

    map.rename_property(door, TARGETNAME_KEY, "name").expect("重命名属性");
    assert!(map.entity(door).unwrap().link_sources().is_empty());
    assert_symmetric(&map);
}

#[test]
fn removing_an_entity_leaves_no_dangling_links() {
    let (mut map, [door, lamp, button, trigger]) = build_scene();
    let removed = map.remove_entity(lamp).expect("移除");
    assert!(removed.link_sources().is_empty() && removed.kill_sources().is_empty());
    assert_symmetric(&map);
    assert_eq!(map.entity(button).unwrap().link_targets(), &[door]);
    assert!(map.entity(trigger).unwrap().kill_targets().is_empty());
}
