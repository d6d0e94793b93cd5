pub mod rotation;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

use crate::brush::{Brush, BrushId};
use crate::cache::Cached;
use crate::definition::{DefinitionKind, DefinitionRef};
use crate::errors::ModelError;
use crate::geometry::{Axis, BBox3, EPSILON, Ray3, flipped, quarter_turn, rotated90};
use crate::links::EntityLinks;
use crate::pick::{Hit, HitObject, PickResult, Pickable};
use crate::properties::{
    CLASSNAME_KEY, KILLTARGET_KEY, ORIGIN_KEY, Property, PropertyStore, SPAWNFLAGS_KEY,
    TARGET_KEY, WORLDSPAWN_CLASSNAME, property_is_mutable, property_key_is_mutable,
};

pub use rotation::RotationInfo;

/// 无定义且无笔刷时使用的默认包围盒半边长。
const DEFAULT_HALF_EXTENT: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 实体的几何变换。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Translate(DVec3),
    Rotate90 {
        axis: Axis,
        center: DVec3,
        clockwise: bool,
    },
    Rotate {
        rotation: DQuat,
        center: DVec3,
    },
    Flip {
        axis: Axis,
        center: DVec3,
    },
}

#[derive(Debug, Clone, Copy)]
struct EntityGeometry {
    bounds: BBox3,
    center: DVec3,
}

/// 一次属性写入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyUpdate {
    pub key: String,
    pub value: String,
}

#[derive(Debug)]
pub struct Entity {
    id: Option<EntityId>,
    world_bounds: BBox3,
    properties: PropertyStore,
    brushes: Vec<Brush>,
    definition: Option<DefinitionRef>,
    worldspawn: bool,
    attached: bool,
    pub(crate) links: EntityLinks,
    geometry: Cached<EntityGeometry>,
}

impl Entity {
    pub fn new(world_bounds: BBox3) -> Self {
        let mut properties = PropertyStore::new();
        properties.set(SPAWNFLAGS_KEY, "0");
        Self {
            id: None,
            world_bounds,
            properties,
            brushes: Vec::new(),
            definition: None,
            worldspawn: false,
            attached: false,
            links: EntityLinks::default(),
            geometry: Cached::new(),
        }
    }

    /// 复制模板的属性（不复制笔刷、定义与连接）。
    pub fn from_template(world_bounds: BBox3, template: &Entity) -> Result<Self, ModelError> {
        let mut entity = Self::new(world_bounds);
        entity.set_properties(template.properties(), true)?;
        Ok(entity)
    }

    /// 便捷构造：依次写入给定属性。
    pub fn with_properties<'a>(
        world_bounds: BBox3,
        properties: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ModelError> {
        let mut entity = Self::new(world_bounds);
        for (key, value) in properties {
            entity.set_property(key, Some(value))?;
        }
        Ok(entity)
    }

    #[inline]
    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Option<EntityId>) {
        self.id = id;
        for brush in &mut self.brushes {
            brush.set_entity(id);
        }
    }

    /// 是否已挂接到某个地图（注册表）。
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    #[inline]
    pub(crate) fn set_attached(&mut self, attached: bool) {
        self.attached = attached;
    }

    #[inline]
    pub fn world_bounds(&self) -> BBox3 {
        self.world_bounds
    }

    #[inline]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }

    #[inline]
    pub fn properties(&self) -> &[Property] {
        self.properties.properties()
    }

    #[inline]
    pub fn classname(&self) -> Option<&str> {
        self.property(CLASSNAME_KEY)
    }

    #[inline]
    pub fn is_worldspawn(&self) -> bool {
        self.worldspawn
    }

    /// `origin` 属性，缺失或格式错误时为零向量。
    pub fn origin(&self) -> DVec3 {
        self.property(ORIGIN_KEY)
            .and_then(rotation::parse_vec3)
            .unwrap_or(DVec3::ZERO)
    }

    /// 所有编号 `target` 属性的值。
    pub fn link_targetnames(&self) -> Vec<&str> {
        self.properties.numbered_values(TARGET_KEY).collect()
    }

    pub fn kill_targetnames(&self) -> Vec<&str> {
        self.properties.numbered_values(KILLTARGET_KEY).collect()
    }

    #[inline]
    pub fn link_targets(&self) -> &[EntityId] {
        &self.links.link_targets
    }

    #[inline]
    pub fn link_sources(&self) -> &[EntityId] {
        &self.links.link_sources
    }

    #[inline]
    pub fn kill_targets(&self) -> &[EntityId] {
        &self.links.kill_targets
    }

    #[inline]
    pub fn kill_sources(&self) -> &[EntityId] {
        &self.links.kill_sources
    }

    /// 写入或删除（`None`）属性。仅用于尚未挂接的实体；
    /// 挂接后的属性修改必须经由 `Map::set_property` 以维护连接关系。
    pub fn set_property(&mut self, key: &str, value: Option<&str>) -> Result<(), ModelError> {
        debug_assert!(!self.attached, "attached entities are edited through the map");
        let old = self.property(key);
        if old == value {
            return Ok(());
        }
        check_mutation(key, old, value)?;
        self.store_property(key, value);
        Ok(())
    }

    pub fn remove_property(&mut self, key: &str) -> Result<(), ModelError> {
        if !property_key_is_mutable(key) {
            return Err(ModelError::ImmutableKey(key.to_string()));
        }
        if !self.properties.contains(key) {
            return Ok(());
        }
        self.set_property(key, None)
    }

    pub fn rename_property(&mut self, old_key: &str, new_key: &str) -> Result<(), ModelError> {
        let value = self.checked_rename(old_key, new_key)?;
        self.remove_property(old_key)?;
        self.set_property(new_key, Some(&value))
    }

    /// 批量写入属性；`replace` 时先清空，仅保留 `spawnflags = 0`。
    pub fn set_properties(&mut self, properties: &[Property], replace: bool) -> Result<(), ModelError> {
        self.check_properties(properties)?;
        if replace {
            self.properties.clear();
            self.properties.set(SPAWNFLAGS_KEY, "0");
            self.worldspawn = false;
            self.set_definition(None);
        }
        for property in properties {
            self.set_property(&property.key, Some(&property.value))?;
        }
        Ok(())
    }

    /// 批量写入前逐条检查，任一条目被拒绝时不写入任何值。
    /// 替换模式同样不能改写已设置的不可变值。
    pub(crate) fn check_properties(&self, properties: &[Property]) -> Result<(), ModelError> {
        let mut pending = self.properties.clone();
        for property in properties {
            check_mutation(&property.key, pending.get(&property.key), Some(property.value.as_str()))?;
            pending.set(&property.key, property.value.as_str());
        }
        Ok(())
    }

    /// 改名前的检查，返回旧键的值。
    pub(crate) fn checked_rename(&self, old_key: &str, new_key: &str) -> Result<String, ModelError> {
        for key in [old_key, new_key] {
            if !property_key_is_mutable(key) {
                return Err(ModelError::ImmutableKey(key.to_string()));
            }
        }
        self.property(old_key)
            .map(str::to_string)
            .ok_or_else(|| ModelError::MissingProperty(old_key.to_string()))
    }

    /// 写入属性存储：处理类名变化并使几何缓存失效。不做任何连接维护。
    pub(crate) fn store_property(&mut self, key: &str, value: Option<&str>) {
        if key == CLASSNAME_KEY && value != self.classname() {
            self.worldspawn = value == Some(WORLDSPAWN_CLASSNAME);
            self.set_definition(None);
        }
        match value {
            Some(value) => {
                self.properties.set(key, value);
            }
            None => {
                self.properties.remove(key);
            }
        }
        self.invalidate_geometry();
    }

    #[inline]
    pub fn definition(&self) -> Option<&DefinitionRef> {
        self.definition.as_ref()
    }

    /// 替换定义句柄；旧句柄析构时使用计数随之减一。
    pub fn set_definition(&mut self, definition: Option<DefinitionRef>) {
        if let (Some(current), Some(new)) = (&self.definition, &definition) {
            if current.ptr_eq(new) {
                return;
            }
        }
        self.definition = definition;
        self.invalidate_geometry();
    }

    #[inline]
    pub fn brushes(&self) -> &[Brush] {
        &self.brushes
    }

    pub fn brush_mut(&mut self, id: BrushId) -> Option<&mut Brush> {
        let brush = self.brushes.iter_mut().find(|brush| brush.id() == id)?;
        self.geometry.invalidate();
        Some(brush)
    }

    pub fn add_brush(&mut self, mut brush: Brush) {
        brush.set_entity(self.id);
        self.brushes.push(brush);
        self.invalidate_geometry();
    }

    pub fn add_brushes(&mut self, brushes: impl IntoIterator<Item = Brush>) {
        for mut brush in brushes {
            brush.set_entity(self.id);
            self.brushes.push(brush);
        }
        self.invalidate_geometry();
    }

    pub fn remove_brush(&mut self, id: BrushId) -> Option<Brush> {
        let index = self.brushes.iter().position(|brush| brush.id() == id)?;
        let mut brush = self.brushes.remove(index);
        brush.set_entity(None);
        self.invalidate_geometry();
        Some(brush)
    }

    /// 带笔刷的实体由笔刷面参与拾取，不再按包围盒命中。
    #[inline]
    pub fn has_brushes(&self) -> bool {
        !self.brushes.is_empty()
    }

    /// 属性、笔刷或定义变化后统一调用的失效入口。
    #[inline]
    pub fn invalidate_geometry(&self) {
        self.geometry.invalidate();
    }

    pub fn bounds(&self) -> BBox3 {
        self.geometry().bounds
    }

    pub fn center(&self) -> DVec3 {
        self.geometry().center
    }

    fn geometry(&self) -> EntityGeometry {
        self.geometry.get_or_compute(|| {
            let origin = self.origin();
            let bounds = match self.definition.as_ref().map(|definition| definition.kind()) {
                Some(DefinitionKind::Point { bounds }) => bounds.translated(origin),
                _ => self
                    .brushes
                    .iter()
                    .map(Brush::bounds)
                    .reduce(|a, b| a.merged(&b))
                    .unwrap_or_else(|| BBox3::cube(DEFAULT_HALF_EXTENT).translated(origin)),
            };
            EntityGeometry {
                bounds,
                center: bounds.center(),
            }
        })
    }

    fn is_brush_entity(&self) -> bool {
        !self.brushes.is_empty()
            || self
                .definition
                .as_ref()
                .is_some_and(|definition| definition.is_brush_entity())
    }

    /// 判定朝向保存在哪个属性中、按何种约定编码。
    pub fn rotation_info(&self) -> RotationInfo {
        let has = |key: &str| self.properties.contains(key);
        let point_centered = || {
            let offset = self.origin() - self.center();
            offset.x.abs() <= EPSILON && offset.y.abs() <= EPSILON
        };
        rotation::rotation_info(self.classname(), self.is_brush_entity(), has, point_centered)
    }

    /// 当前朝向对应的四元数，供模型或指示器渲染使用。
    pub fn rotation(&self) -> DQuat {
        let info = self.rotation_info();
        rotation::orientation(&info, info.key().and_then(|key| self.property(key)))
    }

    /// 计算把 `rotation` 作用到朝向后需要写入的属性。
    pub fn rotation_update(&self, rotation: DQuat) -> Option<PropertyUpdate> {
        let info = self.rotation_info();
        let key = info.key()?;
        let value = rotation::rotate_value(&info, self.property(key), rotation)?;
        Some(PropertyUpdate {
            key: key.to_string(),
            value,
        })
    }

    /// 沿 `axis` 镜像时朝向属性的新值。
    pub fn flip_update(&self, axis: Axis) -> Option<PropertyUpdate> {
        let info = self.rotation_info();
        let key = info.key()?;
        let value = rotation::flip_value(&info, self.property(key), axis)?;
        Some(PropertyUpdate {
            key: key.to_string(),
            value,
        })
    }

    /// 变换后的 `origin` 值。带笔刷的实体只在平移时更新原点；
    /// 其余情况保持原点与中心的偏移不变，移动中心。
    pub fn origin_update(&self, transform: &Transform) -> Option<PropertyUpdate> {
        let origin = match *transform {
            Transform::Translate(delta) => {
                if delta == DVec3::ZERO {
                    return None;
                }
                self.origin() + delta
            }
            _ if !self.brushes.is_empty() => return None,
            _ => {
                let center = self.center();
                let offset = self.origin() - center;
                let new_center = match *transform {
                    Transform::Rotate90 {
                        axis,
                        center: pivot,
                        clockwise,
                    } => rotated90(center, axis, pivot, clockwise),
                    Transform::Rotate {
                        rotation,
                        center: pivot,
                    } => rotation * (center - pivot) + pivot,
                    Transform::Flip { axis, center: pivot } => flipped(center, axis, pivot),
                    Transform::Translate(_) => center,
                };
                new_center + offset
            }
        };
        Some(PropertyUpdate {
            key: ORIGIN_KEY.to_string(),
            value: rotation::format_vec3(origin),
        })
    }

    /// 变换带来的朝向属性更新，需在原点更新之后计算。
    pub fn orientation_update(&self, transform: &Transform) -> Option<PropertyUpdate> {
        match *transform {
            Transform::Translate(_) => None,
            Transform::Rotate90 {
                axis, clockwise, ..
            } => self.rotation_update(quarter_turn(axis, clockwise)),
            Transform::Rotate { rotation, .. } => self.rotation_update(rotation),
            Transform::Flip { axis, .. } => self.flip_update(axis),
        }
    }

    pub fn apply_rotation(&mut self, rotation: DQuat) -> Result<(), ModelError> {
        if let Some(update) = self.rotation_update(rotation) {
            self.set_property(&update.key, Some(&update.value))?;
        }
        Ok(())
    }

    pub fn transform(&mut self, transform: Transform) -> Result<(), ModelError> {
        if let Some(update) = self.origin_update(&transform) {
            self.set_property(&update.key, Some(&update.value))?;
        }
        if let Some(update) = self.orientation_update(&transform) {
            self.set_property(&update.key, Some(&update.value))?;
        }
        self.invalidate_geometry();
        Ok(())
    }

    pub fn translate(&mut self, delta: DVec3) -> Result<(), ModelError> {
        self.transform(Transform::Translate(delta))
    }

    pub fn rotate90(&mut self, axis: Axis, center: DVec3, clockwise: bool) -> Result<(), ModelError> {
        self.transform(Transform::Rotate90 {
            axis,
            center,
            clockwise,
        })
    }

    pub fn rotate(&mut self, rotation: DQuat, center: DVec3) -> Result<(), ModelError> {
        self.transform(Transform::Rotate { rotation, center })
    }

    pub fn flip(&mut self, axis: Axis, center: DVec3) -> Result<(), ModelError> {
        self.transform(Transform::Flip { axis, center })
    }
}

impl Pickable for Entity {
    /// 点实体与带笔刷实体都以包围盒求交；未加入地图的实体没有编号，不产生命中。
    fn pick(&self, ray: &Ray3, result: &mut PickResult) {
        let Some(id) = self.id else {
            return;
        };
        if let Some(distance) = self.bounds().intersect_ray(ray) {
            result.add(Hit::new(HitObject::Entity(id), ray.point_at(distance), distance));
        }
    }
}

/// 可变性检查：删除不可删的键，或修改已设置的不可变值，均返回错误。
pub(crate) fn check_mutation(
    key: &str,
    old: Option<&str>,
    new: Option<&str>,
) -> Result<(), ModelError> {
    match (old, new) {
        (Some(_), None) if !property_key_is_mutable(key) => {
            Err(ModelError::ImmutableKey(key.to_string()))
        }
        (Some(old), Some(new)) if old != new && !property_is_mutable(key) => {
            Err(ModelError::ImmutableValue(key.to_string()))
        }
        _ => Ok(()),
    }
}
