use std::collections::BTreeMap;

use glam::{DQuat, DVec3};
use tracing::{debug, trace};

use crate::brush::{Brush, BrushId};
use crate::definition::DefinitionRef;
use crate::entity::{Entity, EntityId, PropertyUpdate, Transform, check_mutation};
use crate::errors::ModelError;
use crate::geometry::{Axis, BBox3};
use crate::links::{self, LinkKind};
use crate::properties::{
    KILLTARGET_KEY, Property, TARGET_KEY, TARGETNAME_KEY, is_numbered_property,
    property_key_is_mutable,
};
use crate::registry::{EntityRegistry, TargetIndex};

/// 实体集合的唯一所有者，同时是名称查询的权威来源。
/// 所有关系维护都经过这里，任何公开操作结束时邻接表都是对称的。
#[derive(Debug)]
pub struct Map {
    world_bounds: BBox3,
    entities: BTreeMap<EntityId, Entity>,
    index: TargetIndex,
    next_id: u64,
}

impl Map {
    pub fn new(world_bounds: BBox3) -> Self {
        Self {
            world_bounds,
            entities: BTreeMap::new(),
            index: TargetIndex::new(),
            next_id: 1,
        }
    }

    #[inline]
    pub fn world_bounds(&self) -> BBox3 {
        self.world_bounds
    }

    #[inline]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn worldspawn(&self) -> Option<&Entity> {
        self.entities.values().find(|entity| entity.is_worldspawn())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities_with_targetname(&self, name: &str) -> Vec<EntityId> {
        self.index.entities_with_targetname(name)
    }

    /// 加入实体并挂接，返回分配的编号。
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityId {
        let id = EntityId::new(self.next_id);
        self.next_id += 1;
        entity.set_id(Some(id));
        entity.set_attached(false);
        self.entities.insert(id, entity);
        self.attach(id);
        debug!(entity = id.get(), "实体已加入地图");
        id
    }

    /// 摘除实体：断开全部关系、清理索引并交还所有权。
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        if !self.entities.contains_key(&id) {
            return None;
        }
        self.detach(id);
        let mut entity = self.entities.remove(&id)?;
        entity.set_id(None);
        debug!(entity = id.get(), "实体已移出地图");
        Some(entity)
    }

    /// 挂接或脱离注册表。重复调用相同状态不做任何修改。
    pub fn set_attached(&mut self, id: EntityId, attached: bool) -> Result<(), ModelError> {
        let entity = self.get(id)?;
        if entity.is_attached() == attached {
            return Ok(());
        }
        if attached {
            self.attach(id);
        } else {
            self.detach(id);
        }
        Ok(())
    }

    fn attach(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        entity.set_attached(true);
        self.index.index_entity(id, entity);
        self.rebuild_links(id);
    }

    fn detach(&mut self, id: EntityId) {
        links::sever_all(&mut self.entities, id);
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        if entity.is_attached() {
            self.index.unindex_entity(id, entity);
        }
        entity.set_attached(false);
    }

    /// 依据当前属性从索引重建四个邻接表。
    fn rebuild_links(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get(&id) else {
            return;
        };
        let targets: Vec<String> =
            entity.link_targetnames().into_iter().map(str::to_string).collect();
        let kill_targets: Vec<String> =
            entity.kill_targetnames().into_iter().map(str::to_string).collect();
        let targetname = entity.property(TARGETNAME_KEY).map(str::to_string);

        for name in &targets {
            self.link_outbound(LinkKind::Target, id, name);
        }
        for name in &kill_targets {
            self.link_outbound(LinkKind::KillTarget, id, name);
        }
        if let Some(name) = targetname {
            self.link_inbound(id, &name);
        }
    }

    fn link_outbound(&mut self, kind: LinkKind, source: EntityId, name: &str) {
        if name.is_empty() {
            return;
        }
        for target in self.index.entities_with_targetname(name) {
            links::link(&mut self.entities, kind, source, target);
        }
    }

    fn link_inbound(&mut self, target: EntityId, name: &str) {
        if name.is_empty() {
            return;
        }
        for source in self.index.entities_with_target(name) {
            links::link(&mut self.entities, LinkKind::Target, source, target);
        }
        for source in self.index.entities_with_kill_target(name) {
            links::link(&mut self.entities, LinkKind::KillTarget, source, target);
        }
    }

    fn get(&self, id: EntityId) -> Result<&Entity, ModelError> {
        self.entities.get(&id).ok_or(ModelError::EntityNotFound(id.get()))
    }

    fn get_mut(&mut self, id: EntityId) -> Result<&mut Entity, ModelError> {
        self.entities
            .get_mut(&id)
            .ok_or(ModelError::EntityNotFound(id.get()))
    }

    /// 写入或删除（`None`）属性，并维护 target / killtarget / targetname 关系。
    pub fn set_property(
        &mut self,
        id: EntityId,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), ModelError> {
        let entity = self.get(id)?;
        let old = entity.property(key).map(str::to_string);
        if old.as_deref() == value {
            return Ok(());
        }
        check_mutation(key, old.as_deref(), value)?;
        let attached = entity.is_attached();
        trace!(entity = id.get(), key, ?value, ?old, "设置属性");

        for (base, kind) in [(TARGET_KEY, LinkKind::Target), (KILLTARGET_KEY, LinkKind::KillTarget)] {
            if !is_numbered_property(base, key) {
                continue;
            }
            if let Some(old) = old.as_deref() {
                // 同族的其他编号属性仍引用旧名称时保留关系
                if !self.still_referenced(id, base, key, old) {
                    links::sever_named(&mut self.entities, kind, id, old);
                }
            }
            if attached {
                if let Some(new) = value {
                    self.link_outbound(kind, id, new);
                }
                match kind {
                    LinkKind::Target => self.index.update_entity_target(id, value, old.as_deref()),
                    LinkKind::KillTarget => {
                        self.index.update_entity_kill_target(id, value, old.as_deref())
                    }
                }
            }
        }

        if key == TARGETNAME_KEY {
            links::sever_inbound(&mut self.entities, id);
            if attached {
                self.index.update_entity_targetname(id, value, old.as_deref());
                if let Some(new) = value {
                    self.link_inbound(id, new);
                }
            }
        }

        self.get_mut(id)?.store_property(key, value);
        Ok(())
    }

    fn still_referenced(&self, id: EntityId, base: &str, key: &str, name: &str) -> bool {
        self.entities.get(&id).is_some_and(|entity| {
            entity.properties().iter().any(|property| {
                property.key != key
                    && is_numbered_property(base, &property.key)
                    && property.value == name
            })
        })
    }

    pub fn remove_property(&mut self, id: EntityId, key: &str) -> Result<(), ModelError> {
        if !property_key_is_mutable(key) {
            return Err(ModelError::ImmutableKey(key.to_string()));
        }
        if self.get(id)?.property(key).is_none() {
            return Ok(());
        }
        self.set_property(id, key, None)
    }

    pub fn rename_property(&mut self, id: EntityId, old_key: &str, new_key: &str) -> Result<(), ModelError> {
        let value = self.get(id)?.checked_rename(old_key, new_key)?;
        self.remove_property(id, old_key)?;
        self.set_property(id, new_key, Some(&value))
    }

    /// 批量写入：先脱离注册表，写入后重新挂接，关系整体重建。
    pub fn set_properties(
        &mut self,
        id: EntityId,
        properties: &[Property],
        replace: bool,
    ) -> Result<(), ModelError> {
        let entity = self.get(id)?;
        entity.check_properties(properties)?;
        let was_attached = entity.is_attached();
        self.detach(id);
        let result = self.get_mut(id)?.set_properties(properties, replace);
        if was_attached {
            self.attach(id);
        }
        result
    }

    pub fn set_entity_definition(
        &mut self,
        id: EntityId,
        definition: Option<DefinitionRef>,
    ) -> Result<(), ModelError> {
        self.get_mut(id)?.set_definition(definition);
        Ok(())
    }

    pub fn add_brush(&mut self, id: EntityId, brush: Brush) -> Result<BrushId, ModelError> {
        let brush_id = brush.id();
        self.get_mut(id)?.add_brush(brush);
        Ok(brush_id)
    }

    pub fn remove_brush(&mut self, id: EntityId, brush: BrushId) -> Result<Brush, ModelError> {
        self.get_mut(id)?
            .remove_brush(brush)
            .ok_or(ModelError::BrushNotFound {
                entity: Some(id),
                brush: brush.get(),
            })
    }

    /// 平移实体原点及其全部笔刷。
    pub fn translate_entity(&mut self, id: EntityId, delta: DVec3) -> Result<(), ModelError> {
        let entity = self.get_mut(id)?;
        let brush_ids: Vec<BrushId> = entity.brushes().iter().map(Brush::id).collect();
        for brush_id in brush_ids {
            if let Some(brush) = entity.brush_mut(brush_id) {
                brush.translate(delta);
            }
        }
        self.transform_entity(id, Transform::Translate(delta))
    }

    pub fn rotate90_entity(
        &mut self,
        id: EntityId,
        axis: Axis,
        center: DVec3,
        clockwise: bool,
    ) -> Result<(), ModelError> {
        let transform = Transform::Rotate90 {
            axis,
            center,
            clockwise,
        };
        let updates = self.transform_updates(id, &transform)?;
        let entity = self.get_mut(id)?;
        let brush_ids: Vec<BrushId> = entity.brushes().iter().map(Brush::id).collect();
        for brush_id in brush_ids {
            if let Some(brush) = entity.brush_mut(brush_id) {
                brush.rotate90(axis, center, clockwise)?;
            }
        }
        self.apply_updates(id, updates)
    }

    /// 任意旋转只作用于原点与朝向属性，笔刷不参与。
    pub fn rotate_entity(&mut self, id: EntityId, rotation: DQuat, center: DVec3) -> Result<(), ModelError> {
        self.transform_entity(id, Transform::Rotate { rotation, center })
    }

    pub fn flip_entity(&mut self, id: EntityId, axis: Axis, center: DVec3) -> Result<(), ModelError> {
        let transform = Transform::Flip { axis, center };
        let updates = self.transform_updates(id, &transform)?;
        let entity = self.get_mut(id)?;
        let brush_ids: Vec<BrushId> = entity.brushes().iter().map(Brush::id).collect();
        for brush_id in brush_ids {
            if let Some(brush) = entity.brush_mut(brush_id) {
                brush.flip(axis, center)?;
            }
        }
        self.apply_updates(id, updates)
    }

    fn transform_entity(&mut self, id: EntityId, transform: Transform) -> Result<(), ModelError> {
        let updates = self.transform_updates(id, &transform)?;
        self.apply_updates(id, updates)
    }

    /// 在修改笔刷之前计算原点更新，朝向更新在写入原点后再计算。
    fn transform_updates(&self, id: EntityId, transform: &Transform) -> Result<TransformUpdates, ModelError> {
        let entity = self.get(id)?;
        Ok(TransformUpdates {
            origin: entity.origin_update(transform),
            transform: *transform,
        })
    }

    fn apply_updates(&mut self, id: EntityId, updates: TransformUpdates) -> Result<(), ModelError> {
        if let Some(PropertyUpdate { key, value }) = updates.origin {
            self.set_property(id, &key, Some(&value))?;
        }
        let orientation = self.get(id)?.orientation_update(&updates.transform);
        if let Some(PropertyUpdate { key, value }) = orientation {
            self.set_property(id, &key, Some(&value))?;
        }
        self.get(id)?.invalidate_geometry();
        Ok(())
    }
}

#[derive(Debug)]
struct TransformUpdates {
    origin: Option<PropertyUpdate>,
    transform: Transform,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::{CLASSNAME_KEY, MOD_KEY, ORIGIN_KEY};

    fn world() -> BBox3 {
        BBox3::cube(8192.0)
    }

    fn named(map: &mut Map, classname: &str, properties: &[(&str, &str)]) -> EntityId {
        let mut entity = Entity::with_properties(world(), [(CLASSNAME_KEY, classname)]).unwrap();
        for &(key, value) in properties {
            entity.set_property(key, Some(value)).unwrap();
        }
        map.add_entity(entity)
    }

    #[test]
    fn target_links_follow_property_changes() {
        let mut map = Map::new(world());
        let door = named(&mut map, "func_door", &[(TARGETNAME_KEY, "door")]);
        let button = named(&mut map, "func_button", &[(TARGET_KEY, "door")]);

        assert_eq!(map.entity(button).unwrap().link_targets(), &[door]);
        assert_eq!(map.entity(door).unwrap().link_sources(), &[button]);

        map.set_property(button, TARGET_KEY, Some("gate")).unwrap();
        assert!(map.entity(button).unwrap().link_targets().is_empty());
        assert!(map.entity(door).unwrap().link_sources().is_empty());

        map.set_property(door, TARGETNAME_KEY, Some("gate")).unwrap();
        assert_eq!(map.entity(button).unwrap().link_targets(), &[door]);
        assert_eq!(map.entity(door).unwrap().link_sources(), &[button]);
    }

    #[test]
    fn numbered_targets_share_a_name() {
        let mut map = Map::new(world());
        let door = named(&mut map, "func_door", &[(TARGETNAME_KEY, "door")]);
        let relay = named(&mut map, "trigger_relay", &[(TARGET_KEY, "door"), ("target2", "door")]);
        assert_eq!(map.entity(relay).unwrap().link_targets(), &[door]);

        map.remove_property(relay, TARGET_KEY).unwrap();
        assert_eq!(map.entity(relay).unwrap().link_targets(), &[door]);
        map.remove_property(relay, "target2").unwrap();
        assert!(map.entity(relay).unwrap().link_targets().is_empty());
        assert!(map.entity(door).unwrap().link_sources().is_empty());
    }

    #[test]
    fn kill_targets_use_separate_lists() {
        let mut map = Map::new(world());
        let victim = named(&mut map, "func_door", &[(TARGETNAME_KEY, "victim")]);
        let killer = named(&mut map, "trigger_once", &[(KILLTARGET_KEY, "victim")]);
        assert_eq!(map.entity(killer).unwrap().kill_targets(), &[victim]);
        assert_eq!(map.entity(victim).unwrap().kill_sources(), &[killer]);
        assert!(map.entity(victim).unwrap().link_sources().is_empty());

        map.remove_property(victim, TARGETNAME_KEY).unwrap();
        assert!(map.entity(killer).unwrap().kill_targets().is_empty());
        assert!(map.entity(victim).unwrap().kill_sources().is_empty());
    }

    #[test]
    fn remove_entity_severs_everything() {
        let mut map = Map::new(world());
        let door = named(&mut map, "func_door", &[(TARGETNAME_KEY, "door")]);
        let button = named(&mut map, "func_button", &[(TARGET_KEY, "door")]);

        let removed = map.remove_entity(door).expect("door removed");
        assert!(removed.id().is_none());
        assert!(!removed.is_attached());
        assert!(removed.link_sources().is_empty());
        assert!(map.entity(button).unwrap().link_targets().is_empty());
        assert!(map.entities_with_targetname("door").is_empty());

        let door = map.add_entity(removed);
        assert_eq!(map.entity(button).unwrap().link_targets(), &[door]);
    }

    #[test]
    fn missing_entities_are_reported() {
        let mut map = Map::new(world());
        let ghost = EntityId::new(42);
        assert_eq!(
            map.set_property(ghost, TARGET_KEY, Some("x")),
            Err(ModelError::EntityNotFound(42))
        );
        assert!(map.remove_entity(ghost).is_none());
        assert!(map.set_attached(ghost, true).is_err());
    }

    #[test]
    fn immutable_key_is_rejected_through_the_map() {
        let mut map = Map::new(world());
        let id = named(&mut map, "info_null", &[]);
        assert_eq!(
            map.remove_property(id, CLASSNAME_KEY),
            Err(ModelError::ImmutableKey(CLASSNAME_KEY.to_string()))
        );
        assert_eq!(map.entity(id).unwrap().classname(), Some("info_null"));
    }

    #[test]
    fn set_properties_rebuilds_links() {
        let mut map = Map::new(world());
        let door = named(&mut map, "func_door", &[(TARGETNAME_KEY, "door")]);
        let button = named(&mut map, "func_button", &[]);
        map.set_properties(
            button,
            &[Property::new(CLASSNAME_KEY, "func_button"), Property::new(TARGET_KEY, "door")],
            true,
        )
        .unwrap();
        assert!(map.entity(button).unwrap().is_attached());
        assert_eq!(map.entity(door).unwrap().link_sources(), &[button]);
    }

    #[test]
    fn rejected_set_properties_keeps_entity_and_links() {
        let mut map = Map::new(world());
        let door = named(&mut map, "func_door", &[(TARGETNAME_KEY, "door")]);
        let button = named(&mut map, "func_button", &[(TARGET_KEY, "door"), (MOD_KEY, "id1")]);
        let before = map.entity(button).unwrap().properties().to_vec();

        let result = map.set_properties(
            button,
            &[Property::new(TARGET_KEY, "elsewhere"), Property::new(MOD_KEY, "hipnotic")],
            false,
        );
        assert_eq!(result, Err(ModelError::ImmutableValue(MOD_KEY.to_string())));

        let entity = map.entity(button).unwrap();
        assert_eq!(entity.properties(), before.as_slice());
        assert!(entity.is_attached());
        assert_eq!(entity.link_targets(), &[door]);
        assert_eq!(map.entity(door).unwrap().link_sources(), &[button]);
    }

    #[test]
    fn translate_moves_brushes_and_origin() {
        let mut map = Map::new(world());
        let id = named(&mut map, "func_door", &[(ORIGIN_KEY, "0 0 0")]);
        let brush = Brush::cuboid(world(), BBox3::new(DVec3::ZERO, DVec3::splat(16.0))).unwrap();
        map.add_brush(id, brush).unwrap();

        map.translate_entity(id, DVec3::new(16.0, 0.0, 0.0)).unwrap();
        let entity = map.entity(id).unwrap();
        assert_eq!(entity.property(ORIGIN_KEY), Some("16 0 0"));
        assert!((entity.bounds().min() - DVec3::new(16.0, 0.0, 0.0)).length() < 1e-6);
        assert_eq!(entity.brushes()[0].entity(), Some(id));
    }

    #[test]
    fn rotate90_turns_brush_entity_angle() {
        let mut map = Map::new(world());
        let id = named(&mut map, "func_door", &[("angle", "0")]);
        let brush = Brush::cuboid(world(), BBox3::new(DVec3::ZERO, DVec3::new(32.0, 16.0, 16.0))).unwrap();
        map.add_brush(id, brush).unwrap();

        map.rotate90_entity(id, Axis::Z, DVec3::ZERO, false).unwrap();
        let entity = map.entity(id).unwrap();
        assert_eq!(entity.property("angle"), Some("90"));
        assert!((entity.bounds().max() - DVec3::new(0.0, 32.0, 16.0)).length() < 1e-6);

        map.flip_entity(id, Axis::Z, DVec3::ZERO).unwrap();
        assert_eq!(map.entity(id).unwrap().property("angle"), Some("90"));
    }
}
