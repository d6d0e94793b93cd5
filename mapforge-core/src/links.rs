//! target / killtarget 关系维护。
//!
//! 邻接表只在本模块中修改，`link` 与 `unlink` 总是同时更新两端，
//! 所以任何公开操作结束后 `X ∈ E.link_targets ⇔ E ∈ X.link_sources` 成立。

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::entity::{Entity, EntityId};
use crate::properties::TARGETNAME_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Target,
    KillTarget,
}

/// 实体的四个邻接表。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLinks {
    pub(crate) link_targets: Vec<EntityId>,
    pub(crate) link_sources: Vec<EntityId>,
    pub(crate) kill_targets: Vec<EntityId>,
    pub(crate) kill_sources: Vec<EntityId>,
}

impl EntityLinks {
    #[inline]
    pub fn outbound(&self, kind: LinkKind) -> &[EntityId] {
        match kind {
            LinkKind::Target => &self.link_targets,
            LinkKind::KillTarget => &self.kill_targets,
        }
    }

    #[inline]
    pub fn inbound(&self, kind: LinkKind) -> &[EntityId] {
        match kind {
            LinkKind::Target => &self.link_sources,
            LinkKind::KillTarget => &self.kill_sources,
        }
    }

    fn outbound_mut(&mut self, kind: LinkKind) -> &mut Vec<EntityId> {
        match kind {
            LinkKind::Target => &mut self.link_targets,
            LinkKind::KillTarget => &mut self.kill_targets,
        }
    }

    fn inbound_mut(&mut self, kind: LinkKind) -> &mut Vec<EntityId> {
        match kind {
            LinkKind::Target => &mut self.link_sources,
            LinkKind::KillTarget => &mut self.kill_sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.link_targets.is_empty()
            && self.link_sources.is_empty()
            && self.kill_targets.is_empty()
            && self.kill_sources.is_empty()
    }
}

fn push_unique(list: &mut Vec<EntityId>, id: EntityId) -> bool {
    if list.contains(&id) {
        false
    } else {
        list.push(id);
        true
    }
}

fn remove_id(list: &mut Vec<EntityId>, id: EntityId) -> bool {
    let before = list.len();
    list.retain(|other| *other != id);
    list.len() != before
}

/// 建立 `source -> target` 关系。任一端不存在时不做修改并返回 `false`；
/// 已存在的关系不会重复添加。
pub fn link(
    entities: &mut BTreeMap<EntityId, Entity>,
    kind: LinkKind,
    source: EntityId,
    target: EntityId,
) -> bool {
    if !entities.contains_key(&source) || !entities.contains_key(&target) {
        return false;
    }
    let mut added = false;
    if let Some(entity) = entities.get_mut(&source) {
        added |= push_unique(entity.links.outbound_mut(kind), target);
    }
    if let Some(entity) = entities.get_mut(&target) {
        added |= push_unique(entity.links.inbound_mut(kind), source);
    }
    if added {
        trace!(?kind, source = source.get(), target = target.get(), "建立连接");
    }
    added
}

/// 断开 `source -> target` 关系，两端分别处理，缺失的一端直接跳过。
pub fn unlink(
    entities: &mut BTreeMap<EntityId, Entity>,
    kind: LinkKind,
    source: EntityId,
    target: EntityId,
) -> bool {
    let mut removed = false;
    if let Some(entity) = entities.get_mut(&source) {
        removed |= remove_id(entity.links.outbound_mut(kind), target);
    }
    if let Some(entity) = entities.get_mut(&target) {
        removed |= remove_id(entity.links.inbound_mut(kind), source);
    }
    if removed {
        trace!(?kind, source = source.get(), target = target.get(), "断开连接");
    }
    removed
}

/// 断开 `source` 指向 `targetname == name` 的实体的出边。
/// 对端已不存在或已失去 `targetname` 的陈旧关系一并丢弃。
pub fn sever_named(
    entities: &mut BTreeMap<EntityId, Entity>,
    kind: LinkKind,
    source: EntityId,
    name: &str,
) {
    let Some(entity) = entities.get(&source) else {
        return;
    };
    let doomed: Vec<EntityId> = entity
        .links
        .outbound(kind)
        .iter()
        .copied()
        .filter(|target| {
            match entities.get(target).and_then(|other| other.property(TARGETNAME_KEY)) {
                Some(targetname) => targetname == name,
                None => {
                    debug!(source = source.get(), target = target.get(), "丢弃陈旧连接");
                    true
                }
            }
        })
        .collect();
    for target in doomed {
        unlink(entities, kind, source, target);
    }
}

/// 断开 `source` 的全部某类出边。
pub fn sever_outbound(entities: &mut BTreeMap<EntityId, Entity>, kind: LinkKind, source: EntityId) {
    let Some(entity) = entities.get(&source) else {
        return;
    };
    let targets = entity.links.outbound(kind).to_vec();
    for target in targets {
        unlink(entities, kind, source, target);
    }
}

/// 断开指向 `target` 的全部入边（两类）。
pub fn sever_inbound(entities: &mut BTreeMap<EntityId, Entity>, target: EntityId) {
    for kind in [LinkKind::Target, LinkKind::KillTarget] {
        let Some(entity) = entities.get(&target) else {
            return;
        };
        let sources = entity.links.inbound(kind).to_vec();
        for source in sources {
            unlink(entities, kind, source, target);
        }
    }
}

/// 断开与 `id` 相关的所有关系。
pub fn sever_all(entities: &mut BTreeMap<EntityId, Entity>, id: EntityId) {
    sever_outbound(entities, LinkKind::Target, id);
    sever_outbound(entities, LinkKind::KillTarget, id);
    sever_inbound(entities, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox3;

    fn entities(count: u64) -> BTreeMap<EntityId, Entity> {
        (1..=count)
            .map(|raw| {
                let id = EntityId::new(raw);
                let mut entity = Entity::new(BBox3::cube(8192.0));
                entity.set_id(Some(id));
                (id, entity)
            })
            .collect()
    }

    fn id(raw: u64) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn link_updates_both_sides_once() {
        let mut map = entities(2);
        assert!(link(&mut map, LinkKind::Target, id(1), id(2)));
        assert!(!link(&mut map, LinkKind::Target, id(1), id(2)));
        assert_eq!(map[&id(1)].link_targets(), &[id(2)]);
        assert_eq!(map[&id(2)].link_sources(), &[id(1)]);
        assert!(map[&id(1)].kill_targets().is_empty());

        assert!(!link(&mut map, LinkKind::Target, id(1), id(9)));
        assert_eq!(map[&id(1)].link_targets(), &[id(2)]);
    }

    #[test]
    fn self_link_is_symmetric() {
        let mut map = entities(1);
        link(&mut map, LinkKind::KillTarget, id(1), id(1));
        assert_eq!(map[&id(1)].kill_targets(), &[id(1)]);
        assert_eq!(map[&id(1)].kill_sources(), &[id(1)]);
        sever_all(&mut map, id(1));
        assert!(map[&id(1)].links.is_empty());
    }

    #[test]
    fn sever_named_drops_stale_links() {
        let mut map = entities(3);
        map.get_mut(&id(2))
            .unwrap()
            .store_property(TARGETNAME_KEY, Some("door"));
        link(&mut map, LinkKind::Target, id(1), id(2));
        // 3 没有 targetname，属于陈旧关系
        link(&mut map, LinkKind::Target, id(1), id(3));

        sever_named(&mut map, LinkKind::Target, id(1), "other");
        assert_eq!(map[&id(1)].link_targets(), &[id(2)]);
        assert!(map[&id(3)].link_sources().is_empty());

        sever_named(&mut map, LinkKind::Target, id(1), "door");
        assert!(map[&id(1)].links.is_empty());
        assert!(map[&id(2)].links.is_empty());
    }

    #[test]
    fn sever_all_clears_every_direction() {
        let mut map = entities(3);
        link(&mut map, LinkKind::Target, id(1), id(2));
        link(&mut map, LinkKind::KillTarget, id(3), id(2));
        link(&mut map, LinkKind::Target, id(2), id(3));

        sever_all(&mut map, id(2));
        for entity in map.values() {
            assert!(entity.links.is_empty());
        }
    }
}
