use std::cell::Cell;
use std::collections::BTreeMap;
use std::ops::Deref;
use std::rc::Rc;

use glam::DVec3;

use crate::geometry::BBox3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefinitionKind {
    Brush,
    /// 点实体的包围盒以实体原点为参照。
    Point { bounds: BBox3 },
}

#[derive(Debug)]
pub struct EntityDefinition {
    name: String,
    kind: DefinitionKind,
    description: Option<String>,
    usage_count: Cell<usize>,
}

impl EntityDefinition {
    pub fn new(name: impl Into<String>, kind: DefinitionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
            usage_count: Cell::new(0),
        }
    }

    pub fn point(name: impl Into<String>, bounds: BBox3) -> Self {
        Self::new(name, DefinitionKind::Point { bounds })
    }

    pub fn brush(name: impl Into<String>) -> Self {
        Self::new(name, DefinitionKind::Brush)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    pub fn is_brush_entity(&self) -> bool {
        matches!(self.kind, DefinitionKind::Brush)
    }

    #[inline]
    pub fn point_bounds(&self) -> Option<BBox3> {
        match self.kind {
            DefinitionKind::Point { bounds } => Some(bounds),
            DefinitionKind::Brush => None,
        }
    }

    #[inline]
    pub fn usage_count(&self) -> usize {
        self.usage_count.get()
    }
}

/// 定义的共享句柄。创建与克隆时使用计数加一，析构时减一，
/// 因此每次重新赋值都保持计数对称。
#[derive(Debug)]
pub struct DefinitionRef(Rc<EntityDefinition>);

impl DefinitionRef {
    fn new(definition: Rc<EntityDefinition>) -> Self {
        definition.usage_count.set(definition.usage_count.get() + 1);
        Self(definition)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &DefinitionRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Clone for DefinitionRef {
    fn clone(&self) -> Self {
        Self::new(Rc::clone(&self.0))
    }
}

impl Drop for DefinitionRef {
    fn drop(&mut self) {
        let count = self.0.usage_count.get();
        self.0.usage_count.set(count.saturating_sub(1));
    }
}

impl Deref for DefinitionRef {
    type Target = EntityDefinition;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// 按类名索引的实体定义目录。
#[derive(Debug, Default)]
pub struct DefinitionCatalog {
    definitions: BTreeMap<String, Rc<EntityDefinition>>,
}

impl DefinitionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quake 风格的常用定义，便于演示与测试。
    pub fn with_builtin_definitions() -> Self {
        let mut catalog = Self::new();
        let point = |min: [f64; 3], max: [f64; 3]| BBox3::new(DVec3::from(min), DVec3::from(max));
        catalog.insert(
            EntityDefinition::point("light", point([-8.0; 3], [8.0; 3]))
                .with_description("Non-displayed light"),
        );
        catalog.insert(EntityDefinition::point(
            "light_flame_large_yellow",
            point([-10.0, -10.0, -12.0], [12.0, 12.0, 18.0]),
        ));
        catalog.insert(
            EntityDefinition::point(
                "info_player_start",
                point([-16.0, -16.0, -24.0], [16.0, 16.0, 32.0]),
            )
            .with_description("Player 1 start"),
        );
        catalog.insert(EntityDefinition::point(
            "item_shells",
            point([0.0, 0.0, 0.0], [32.0, 32.0, 56.0]),
        ));
        catalog.insert(EntityDefinition::point(
            "path_corner",
            point([-8.0; 3], [8.0; 3]),
        ));
        catalog.insert(EntityDefinition::brush("worldspawn"));
        catalog.insert(EntityDefinition::brush("func_door"));
        catalog.insert(EntityDefinition::brush("func_button"));
        catalog.insert(EntityDefinition::brush("trigger_once"));
        catalog.insert(EntityDefinition::brush("trigger_relay"));
        catalog
    }

    /// 插入或替换定义；被替换的旧定义仍由现有句柄持有。
    pub fn insert(&mut self, definition: EntityDefinition) {
        self.definitions
            .insert(definition.name.clone(), Rc::new(definition));
    }

    pub fn definition(&self, classname: &str) -> Option<DefinitionRef> {
        self.definitions
            .get(classname)
            .map(|definition| DefinitionRef::new(Rc::clone(definition)))
    }

    pub fn contains(&self, classname: &str) -> bool {
        self.definitions.contains_key(classname)
    }

    pub fn usage_count(&self, classname: &str) -> Option<usize> {
        self.definitions
            .get(classname)
            .map(|definition| definition.usage_count())
    }

    /// 移除未被任何实体使用的定义，返回被移除的类名。
    pub fn collect_unused(&mut self) -> Vec<String> {
        let unused: Vec<String> = self
            .definitions
            .iter()
            .filter(|(_, definition)| definition.usage_count() == 0)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &unused {
            self.definitions.remove(name);
        }
        unused
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
