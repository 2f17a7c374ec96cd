use engine::{EntityId, PrimitiveShape, SceneWorld, Transform, TriggerVolume, Vec3, Visual};
use tracing::{debug, warn};

use super::layout::MAX_PILLARS_PER_CELL;

pub(crate) const WEEPING_MODEL: &str = "models/weep.glb";
pub(crate) const MOVING_MODEL: &str = "models/move.glb";
const TREE_MODEL: &str = "models/tree.glb";
/// Unused slots wait here, under the ground plane.
pub(crate) const POOL_PARK_POSITION: Vec3 = Vec3::new(0.0, -50.0, 0.0);
const PILLAR_TRIGGER_HALF_EXTENTS: Vec3 = Vec3::new(1.0, 2.0, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum PoolKind {
    Wall,
    Floor,
    Pillar,
    Tree,
}

impl PoolKind {
    pub(crate) const ALL: [PoolKind; 4] = [
        PoolKind::Wall,
        PoolKind::Floor,
        PoolKind::Pillar,
        PoolKind::Tree,
    ];

    const fn index(self) -> usize {
        match self {
            PoolKind::Wall => 0,
            PoolKind::Floor => 1,
            PoolKind::Pillar => 2,
            PoolKind::Tree => 3,
        }
    }

    pub(crate) const fn name(self) -> &'static str {
        match self {
            PoolKind::Wall => "wall",
            PoolKind::Floor => "floor",
            PoolKind::Pillar => "pillar",
            PoolKind::Tree => "tree",
        }
    }

    fn static_visual(self) -> Visual {
        match self {
            PoolKind::Wall => Visual::Primitive(PrimitiveShape::Box),
            PoolKind::Floor => Visual::Primitive(PrimitiveShape::Plane),
            PoolKind::Pillar => Visual::model(WEEPING_MODEL),
            PoolKind::Tree => Visual::model(TREE_MODEL),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SlotId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolSlot {
    pub(crate) used: bool,
    pub(crate) entity: EntityId,
}

#[derive(Debug, Clone)]
pub(crate) struct EntityPool {
    kind: PoolKind,
    slots: Vec<PoolSlot>,
    exhaustion_count: u64,
}

impl EntityPool {
    /// Spawns `size` entities with their static visuals, all unused and parked.
    pub(crate) fn preallocate(world: &mut SceneWorld, kind: PoolKind, size: usize) -> Self {
        let entities = (0..size)
            .map(|_| {
                let id = world.spawn(kind.name(), Transform::at(POOL_PARK_POSITION));
                if let Some(entity) = world.find_entity_mut(id) {
                    entity.visual = Some(kind.static_visual());
                    if kind == PoolKind::Pillar {
                        entity.trigger = Some(TriggerVolume::new(PILLAR_TRIGGER_HALF_EXTENTS));
                    }
                }
                id
            })
            .collect::<Vec<_>>();
        debug!(pool = kind.name(), size, "pool_preallocated");
        Self::from_entities(kind, entities)
    }

    pub(crate) fn from_entities(kind: PoolKind, entities: Vec<EntityId>) -> Self {
        Self {
            kind,
            slots: entities
                .into_iter()
                .map(|entity| PoolSlot {
                    used: false,
                    entity,
                })
                .collect(),
            exhaustion_count: 0,
        }
    }

    /// First-fit checkout. Exhaustion is logged and reported as `None`.
    pub(crate) fn checkout(&mut self) -> Option<SlotId> {
        match self.slots.iter().position(|slot| !slot.used) {
            Some(index) => {
                self.slots[index].used = true;
                Some(SlotId(index))
            }
            None => {
                self.exhaustion_count = self.exhaustion_count.saturating_add(1);
                warn!(
                    pool = self.kind.name(),
                    size = self.slots.len(),
                    "pool_exhausted"
                );
                None
            }
        }
    }

    /// Marks the slot unused. Transform and visual state are left stale.
    pub(crate) fn release(&mut self, slot: SlotId) -> bool {
        match self.slots.get_mut(slot.0) {
            Some(entry) if entry.used => {
                entry.used = false;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn entity(&self, slot: SlotId) -> Option<EntityId> {
        self.slots.get(slot.0).map(|entry| entry.entity)
    }

    pub(crate) fn slots(&self) -> &[PoolSlot] {
        &self.slots
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn used_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.used).count()
    }

    pub(crate) fn exhaustion_count(&self) -> u64 {
        self.exhaustion_count
    }
}

/// Per-cell bookkeeping of checked-out slots, one list per pool kind. The
/// cell never owns the entities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CellSlots {
    lists: [Vec<SlotId>; 4],
}

impl CellSlots {
    #[cfg(test)]
    pub(crate) fn list(&self, kind: PoolKind) -> &[SlotId] {
        &self.lists[kind.index()]
    }

    pub(crate) fn push(&mut self, kind: PoolKind, slot: SlotId) {
        self.lists[kind.index()].push(slot);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    #[cfg(test)]
    pub(crate) fn total(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolSizes {
    pub(crate) walls: usize,
    pub(crate) floors: usize,
    pub(crate) pillars: usize,
    pub(crate) trees: usize,
}

impl PoolSizes {
    /// Sized for the worst case a window of `show_range` can hold. Walls and
    /// floors keep headroom for the parcels touched across one parcel change;
    /// pillars and trees assume every visible cell uses its densest layout.
    pub(crate) fn for_show_range(show_range: u32) -> Self {
        let span = show_range as usize * 2;
        let parcels_rendered = (span + 2) * (span + 1);
        let window_cells = (span + 1) * (span + 1);
        Self {
            walls: 4 * parcels_rendered,
            floors: 8 * parcels_rendered,
            pillars: MAX_PILLARS_PER_CELL * window_cells,
            trees: window_cells,
        }
    }

    fn size_of(&self, kind: PoolKind) -> usize {
        match kind {
            PoolKind::Wall => self.walls,
            PoolKind::Floor => self.floors,
            PoolKind::Pillar => self.pillars,
            PoolKind::Tree => self.trees,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StagePools {
    pools: [EntityPool; 4],
}

impl StagePools {
    pub(crate) fn preallocate(world: &mut SceneWorld, sizes: &PoolSizes) -> Self {
        Self {
            pools: PoolKind::ALL.map(|kind| EntityPool::preallocate(world, kind, sizes.size_of(kind))),
        }
    }

    pub(crate) fn get(&self, kind: PoolKind) -> &EntityPool {
        &self.pools[kind.index()]
    }

    pub(crate) fn get_mut(&mut self, kind: PoolKind) -> &mut EntityPool {
        &mut self.pools[kind.index()]
    }

    /// Returns every slot in `slots` to its pool and empties the lists.
    pub(crate) fn release_cell(&mut self, slots: &mut CellSlots) -> usize {
        let mut released = 0;
        for kind in PoolKind::ALL {
            for slot in std::mem::take(&mut slots.lists[kind.index()]) {
                if self.get_mut(kind).release(slot) {
                    released += 1;
                }
            }
        }
        released
    }

    pub(crate) fn all_entities(&self) -> Vec<EntityId> {
        self.pools
            .iter()
            .flat_map(|pool| pool.slots().iter().map(|slot| slot.entity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_pool(size: usize) -> EntityPool {
        EntityPool::from_entities(PoolKind::Wall, (0..size as u64).map(EntityId).collect())
    }

    #[test]
    fn fifth_request_on_pool_of_four_is_skipped() {
        let mut pool = wall_pool(4);
        let results: Vec<Option<SlotId>> = (0..5).map(|_| pool.checkout()).collect();

        assert_eq!(results.iter().filter(|slot| slot.is_some()).count(), 4);
        assert_eq!(results[4], None);
        assert_eq!(pool.exhaustion_count(), 1);
        assert_eq!(pool.used_count(), 4);
    }

    #[test]
    fn released_slot_is_reused_first_fit() {
        let mut pool = wall_pool(3);
        let first = pool.checkout().expect("first");
        let second = pool.checkout().expect("second");
        assert_eq!((first, second), (SlotId(0), SlotId(1)));

        assert!(pool.release(first));
        assert!(!pool.release(first));
        assert_eq!(pool.checkout(), Some(SlotId(0)));
        assert_eq!(pool.checkout(), Some(SlotId(2)));
    }

    #[test]
    fn preallocated_entities_carry_static_visuals() {
        let mut world = SceneWorld::default();
        let sizes = PoolSizes {
            walls: 2,
            floors: 3,
            pillars: 1,
            trees: 1,
        };
        let pools = StagePools::preallocate(&mut world, &sizes);

        assert_eq!(world.entity_count(), 7);
        assert_eq!(pools.get(PoolKind::Floor).len(), 3);
        let pillar = pools.get(PoolKind::Pillar).slots()[0].entity;
        let pillar_entity = world.find_entity(pillar).expect("pillar");
        assert_eq!(pillar_entity.visual, Some(Visual::model(WEEPING_MODEL)));
        assert!(pillar_entity.trigger.is_some());
        assert_eq!(pillar_entity.transform.position, POOL_PARK_POSITION);
    }

    #[test]
    fn release_cell_returns_every_slot() {
        let mut world = SceneWorld::default();
        let mut pools = StagePools::preallocate(&mut world, &PoolSizes::for_show_range(1));
        let mut slots = CellSlots::default();
        for kind in [PoolKind::Wall, PoolKind::Floor, PoolKind::Floor] {
            let slot = pools.get_mut(kind).checkout().expect("slot");
            slots.push(kind, slot);
        }
        assert_eq!(slots.total(), 3);

        assert_eq!(pools.release_cell(&mut slots), 3);
        assert!(slots.is_empty());
        assert_eq!(pools.get(PoolKind::Floor).used_count(), 0);
    }

    #[test]
    fn default_sizes_follow_show_range() {
        let sizes = PoolSizes::for_show_range(1);
        assert_eq!(sizes.walls, 48);
        assert_eq!(sizes.floors, 96);
        assert_eq!(sizes.pillars, 36);
        assert_eq!(sizes.trees, 9);

        let wider = PoolSizes::for_show_range(2);
        assert_eq!(wider.pillars, 100);
        assert_eq!(wider.trees, 25);
    }
}
