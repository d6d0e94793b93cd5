pub mod issues;

pub mod errors {
    use mapforge_core::errors::ModelError;
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error(transparent)]
        Model(#[from] ModelError),
    }
}

pub mod scene {
    use glam::{DQuat, DVec3};
    use mapforge_core::brush::{Brush, BrushId};
    use mapforge_core::definition::DefinitionCatalog;
    use mapforge_core::entity::{Entity, EntityId};
    use mapforge_core::geometry::{Axis, BBox3, Ray3};
    use mapforge_core::map::Map;
    use mapforge_core::pick::{PickResult, Pickable};
    use mapforge_core::properties::{
        CLASSNAME_KEY, ORIGIN_KEY, TARGET_KEY, TARGETNAME_KEY, WORLDSPAWN_CLASSNAME,
    };
    use tracing::{debug, info};

    use crate::errors::EngineError;
    use crate::issues::{self, Issue};

    /// 引擎层维护地图与定义目录。
    #[derive(Debug)]
    pub struct Scene {
        map: Map,
        definitions: DefinitionCatalog,
        modified: bool,
    }

    #[derive(Debug, Clone, Copy)]
    pub struct DemoEntities {
        pub worldspawn: EntityId,
        pub light: EntityId,
        pub trigger: EntityId,
        pub door: EntityId,
    }

    impl Scene {
        /// 使用内置定义目录创建空场景。
        pub fn new(world_bounds: BBox3) -> Self {
            Self::with_catalog(world_bounds, DefinitionCatalog::with_builtin_definitions())
        }

        pub fn with_catalog(world_bounds: BBox3, definitions: DefinitionCatalog) -> Self {
            Self {
                map: Map::new(world_bounds),
                definitions,
                modified: false,
            }
        }

        /// 丢弃当前地图，得到同一世界范围下的空文档。定义目录保留。
        pub fn reset(&mut self) {
            self.map = Map::new(self.map.world_bounds());
            self.modified = false;
        }

        #[inline]
        pub fn map(&self) -> &Map {
            &self.map
        }

        #[inline]
        pub fn definitions(&self) -> &DefinitionCatalog {
            &self.definitions
        }

        #[inline]
        pub fn definitions_mut(&mut self) -> &mut DefinitionCatalog {
            &mut self.definitions
        }

        #[inline]
        pub fn entity(&self, id: EntityId) -> Option<&Entity> {
            self.map.entity(id)
        }

        #[inline]
        pub fn is_modified(&self) -> bool {
            self.modified
        }

        fn ensure_entity(&self, id: EntityId) -> Result<&Entity, EngineError> {
            self.map
                .entity(id)
                .ok_or(EngineError::EntityNotFound(id.get()))
        }

        /// 加入实体并按类名解析定义。
        pub fn add_entity(&mut self, entity: Entity) -> Result<EntityId, EngineError> {
            let id = self.map.add_entity(entity);
            self.resolve_definition(id)?;
            self.modified = true;
            Ok(id)
        }

        pub fn remove_entity(&mut self, id: EntityId) -> Result<Entity, EngineError> {
            let entity = self
                .map
                .remove_entity(id)
                .ok_or(EngineError::EntityNotFound(id.get()))?;
            self.modified = true;
            Ok(entity)
        }

        /// 写入属性；类名变化后重新解析定义。
        pub fn set_property(
            &mut self,
            id: EntityId,
            key: &str,
            value: Option<&str>,
        ) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.set_property(id, key, value)?;
            if key == CLASSNAME_KEY {
                self.resolve_definition(id)?;
            }
            self.modified = true;
            Ok(())
        }

        pub fn remove_property(&mut self, id: EntityId, key: &str) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.remove_property(id, key)?;
            self.modified = true;
            Ok(())
        }

        pub fn rename_property(
            &mut self,
            id: EntityId,
            old_key: &str,
            new_key: &str,
        ) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.rename_property(id, old_key, new_key)?;
            self.modified = true;
            Ok(())
        }

        pub fn add_brush(&mut self, id: EntityId, brush: Brush) -> Result<BrushId, EngineError> {
            self.ensure_entity(id)?;
            let brush = self.map.add_brush(id, brush)?;
            self.modified = true;
            Ok(brush)
        }

        pub fn remove_brush(&mut self, id: EntityId, brush: BrushId) -> Result<Brush, EngineError> {
            self.ensure_entity(id)?;
            let brush = self.map.remove_brush(id, brush)?;
            self.modified = true;
            Ok(brush)
        }

        fn resolve_definition(&mut self, id: EntityId) -> Result<(), EngineError> {
            let entity = self.ensure_entity(id)?;
            let definition = entity
                .classname()
                .and_then(|classname| self.definitions.definition(classname));
            if definition.is_none() {
                debug!(entity = id.get(), classname = ?entity.classname(), "未找到实体定义");
            }
            self.map.set_entity_definition(id, definition)?;
            Ok(())
        }

        /// 移除未被使用的定义，返回被移除的类名。
        pub fn collect_unused_definitions(&mut self) -> Vec<String> {
            let removed = self.definitions.collect_unused();
            if !removed.is_empty() {
                info!(count = removed.len(), "已回收未使用的实体定义");
            }
            removed
        }

        /// 场景拾取：所有笔刷，以及无笔刷实体的包围盒，按距离由近到远。
        pub fn pick(&self, ray: &Ray3) -> PickResult {
            let mut result = PickResult::new();
            for entity in self.map.entities() {
                if !entity.has_brushes() && !entity.is_worldspawn() {
                    entity.pick(ray, &mut result);
                }
                for brush in entity.brushes() {
                    brush.pick(ray, &mut result);
                }
            }
            result.sort_by_distance();
            result
        }

        pub fn translate_entity(&mut self, id: EntityId, delta: DVec3) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            if delta == DVec3::ZERO {
                return Ok(());
            }
            self.map.translate_entity(id, delta)?;
            self.modified = true;
            Ok(())
        }

        /// 绕 `center` 旋转 90°，笔刷与朝向属性一同更新。
        pub fn rotate90_entity(
            &mut self,
            id: EntityId,
            axis: Axis,
            center: DVec3,
            clockwise: bool,
        ) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.rotate90_entity(id, axis, center, clockwise)?;
            self.modified = true;
            debug!(entity = id.get(), ?axis, clockwise, "已旋转实体");
            Ok(())
        }

        pub fn rotate_entity(
            &mut self,
            id: EntityId,
            rotation: DQuat,
            center: DVec3,
        ) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.rotate_entity(id, rotation, center)?;
            self.modified = true;
            Ok(())
        }

        pub fn flip_entity(&mut self, id: EntityId, axis: Axis, center: DVec3) -> Result<(), EngineError> {
            self.ensure_entity(id)?;
            self.map.flip_entity(id, axis, center)?;
            self.modified = true;
            debug!(entity = id.get(), ?axis, "已镜像实体");
            Ok(())
        }

        pub fn issues(&self) -> Vec<Issue> {
            issues::find_float_point_brushes(&self.map)
        }

        /// 为 CLI / 快速验证填充一个小场景：地形、灯光、触发器与门。
        pub fn populate_demo(&mut self) -> Result<DemoEntities, EngineError> {
            let world_bounds = self.map.world_bounds();

            let mut world = Entity::with_properties(
                world_bounds,
                [(CLASSNAME_KEY, WORLDSPAWN_CLASSNAME), ("message", "MapForge demo")],
            )?;
            world.add_brush(Brush::cuboid(
                world_bounds,
                BBox3::new(DVec3::new(-256.0, -256.0, -16.0), DVec3::new(256.0, 256.0, 0.0)),
            )?);
            let worldspawn = self.add_entity(world)?;

            let light = self.add_entity(Entity::with_properties(
                world_bounds,
                [(CLASSNAME_KEY, "light"), (ORIGIN_KEY, "0 0 128"), ("light", "300")],
            )?)?;

            let mut trigger = Entity::with_properties(
                world_bounds,
                [(CLASSNAME_KEY, "trigger_once"), (TARGET_KEY, "door1")],
            )?;
            trigger.add_brush(Brush::cuboid(
                world_bounds,
                BBox3::new(DVec3::new(-64.0, -64.0, 0.0), DVec3::new(-32.0, 64.0, 64.0)),
            )?);
            let trigger = self.add_entity(trigger)?;

            let mut door = Entity::with_properties(
                world_bounds,
                [(CLASSNAME_KEY, "func_door"), (TARGETNAME_KEY, "door1"), ("angle", "90")],
            )?;
            door.add_brush(Brush::cuboid(
                world_bounds,
                BBox3::new(DVec3::new(32.0, -32.0, 0.0), DVec3::new(40.0, 32.0, 96.0)),
            )?);
            let door = self.add_entity(door)?;

            let ids = DemoEntities {
                worldspawn,
                light,
                trigger,
                door,
            };

            debug!(
                worldspawn = ids.worldspawn.get(),
                light = ids.light.get(),
                trigger = ids.trigger.get(),
                door = ids.door.get(),
                "已创建演示实体"
            );

            Ok(ids)
        }
    }

}
