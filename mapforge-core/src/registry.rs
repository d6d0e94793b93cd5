use std::collections::BTreeMap;

use tracing::trace;

use crate::entity::{Entity, EntityId};
use crate::properties::TARGETNAME_KEY;

/// 地图一侧的名称查询与变更通知。
pub trait EntityRegistry {
    fn entities_with_targetname(&self, name: &str) -> Vec<EntityId>;
    fn entities_with_target(&self, name: &str) -> Vec<EntityId>;
    fn entities_with_kill_target(&self, name: &str) -> Vec<EntityId>;

    fn update_entity_target(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>);
    fn update_entity_kill_target(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>);
    fn update_entity_targetname(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>);
}

/// 名称到实体的多重索引。同一实体可以通过多个编号属性引用同一名称，
/// 因此条目按出现次数保存，查询结果去重。
#[derive(Debug, Clone, Default)]
struct NameIndex {
    entries: BTreeMap<String, Vec<EntityId>>,
}

impl NameIndex {
    fn insert(&mut self, name: &str, entity: EntityId) {
        if name.is_empty() {
            return;
        }
        self.entries.entry(name.to_string()).or_default().push(entity);
    }

    fn remove(&mut self, name: &str, entity: EntityId) {
        let Some(ids) = self.entries.get_mut(name) else {
            return;
        };
        if let Some(position) = ids.iter().position(|id| *id == entity) {
            ids.swap_remove(position);
        }
        if ids.is_empty() {
            self.entries.remove(name);
        }
    }

    fn update(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>) {
        if let Some(old) = old {
            self.remove(old, entity);
        }
        if let Some(new) = new {
            self.insert(new, entity);
        }
    }

    fn lookup(&self, name: &str) -> Vec<EntityId> {
        let mut ids = self.entries.get(name).cloned().unwrap_or_default();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// `targetname`、编号 `target` 与编号 `killtarget` 的索引。
#[derive(Debug, Clone, Default)]
pub struct TargetIndex {
    targetnames: NameIndex,
    targets: NameIndex,
    kill_targets: NameIndex,
}

impl TargetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记实体当前的全部名称属性。
    pub fn index_entity(&mut self, id: EntityId, entity: &Entity) {
        for name in entity.link_targetnames() {
            self.update_entity_target(id, Some(name), None);
        }
        for name in entity.kill_targetnames() {
            self.update_entity_kill_target(id, Some(name), None);
        }
        self.update_entity_targetname(id, entity.property(TARGETNAME_KEY), None);
    }

    pub fn unindex_entity(&mut self, id: EntityId, entity: &Entity) {
        for name in entity.link_targetnames() {
            self.update_entity_target(id, None, Some(name));
        }
        for name in entity.kill_targetnames() {
            self.update_entity_kill_target(id, None, Some(name));
        }
        self.update_entity_targetname(id, None, entity.property(TARGETNAME_KEY));
    }
}

impl EntityRegistry for TargetIndex {
    fn entities_with_targetname(&self, name: &str) -> Vec<EntityId> {
        self.targetnames.lookup(name)
    }

    fn entities_with_target(&self, name: &str) -> Vec<EntityId> {
        self.targets.lookup(name)
    }

    fn entities_with_kill_target(&self, name: &str) -> Vec<EntityId> {
        self.kill_targets.lookup(name)
    }

    fn update_entity_target(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>) {
        trace!(entity = entity.get(), ?new, ?old, "更新 target 索引");
        self.targets.update(entity, new, old);
    }

    fn update_entity_kill_target(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>) {
        trace!(entity = entity.get(), ?new, ?old, "更新 killtarget 索引");
        self.kill_targets.update(entity, new, old);
    }

    fn update_entity_targetname(&mut self, entity: EntityId, new: Option<&str>, old: Option<&str>) {
        trace!(entity = entity.get(), ?new, ?old, "更新 targetname 索引");
        self.targetnames.update(entity, new, old);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_references_are_counted() {
        let mut index = TargetIndex::new();
        let a = EntityId::new(1);
        index.update_entity_target(a, Some("door"), None);
        index.update_entity_target(a, Some("door"), None);
        assert_eq!(index.entities_with_target("door"), vec![a]);

        index.update_entity_target(a, None, Some("door"));
        assert_eq!(index.entities_with_target("door"), vec![a]);
        index.update_entity_target(a, None, Some("door"));
        assert!(index.entities_with_target("door").is_empty());
    }

    #[test]
    fn rename_moves_entry_and_ignores_empty_names() {
        let mut index = TargetIndex::new();
        let a = EntityId::new(1);
        index.update_entity_targetname(a, Some("old"), None);
        index.update_entity_targetname(a, Some("new"), Some("old"));
        assert!(index.entities_with_targetname("old").is_empty());
        assert_eq!(index.entities_with_targetname("new"), vec![a]);

        index.update_entity_kill_target(a, Some(""), None);
        assert!(index.entities_with_kill_target("").is_empty());
    }
}
