use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use starhaven_core::{Inventory, ItemStack, PeerId};

/// Number of slots in a single chest inventory (4 rows × 5 columns).
pub const CHEST_SLOT_COUNT: usize = 20;

/// Contents of one chest plus the peers currently viewing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChestData {
    pub inventory: Inventory,
    opened_by: BTreeSet<PeerId>,
}

impl Default for ChestData {
    fn default() -> Self {
        Self::new()
    }
}

impl ChestData {
    pub fn new() -> Self {
        Self {
            inventory: Inventory::new(CHEST_SLOT_COUNT),
            opened_by: BTreeSet::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        !self.opened_by.is_empty()
    }

    pub fn opened_by(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.opened_by.iter().copied()
    }
}

/// Wire/persisted shape of a chest's slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChestPod {
    pub chest_id: u16,
    pub slots: Vec<Option<ItemStack>>,
}

/// Chest contents keyed by id. Ids are allocated by the host the first time
/// a chest object is opened and stored on the object.
#[derive(Debug, Clone, Default)]
pub struct ChestDataPool {
    chests: BTreeMap<u16, ChestData>,
    next_id: u16,
}

impl ChestDataPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chests.is_empty()
    }

    /// Allocate an empty chest. Returns `None` once every id is taken.
    pub fn allocate(&mut self) -> Option<u16> {
        for _ in 0..=u16::MAX {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if let std::collections::btree_map::Entry::Vacant(entry) = self.chests.entry(id) {
                entry.insert(ChestData::new());
                return Some(id);
            }
        }
        None
    }

    pub fn get(&self, id: u16) -> Option<&ChestData> {
        self.chests.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut ChestData> {
        self.chests.get_mut(&id)
    }

    /// Mark a chest as viewed by `peer`, creating an empty entry for an id
    /// this peer has not seen yet.
    pub fn open(&mut self, id: u16, peer: PeerId) -> &ChestData {
        let chest = self.chests.entry(id).or_default();
        chest.opened_by.insert(peer);
        chest
    }

    /// Returns true if the peer had the chest open.
    pub fn close(&mut self, id: u16, peer: PeerId) -> bool {
        self.chests
            .get_mut(&id)
            .map(|chest| chest.opened_by.remove(&peer))
            .unwrap_or(false)
    }

    /// Close every chest a disconnecting peer held open.
    pub fn close_all_for(&mut self, peer: PeerId) -> Vec<u16> {
        self.chests
            .iter_mut()
            .filter_map(|(id, chest)| chest.opened_by.remove(&peer).then_some(*id))
            .collect()
    }

    /// Remove a destroyed chest, returning its items for dropping.
    pub fn remove(&mut self, id: u16) -> Vec<ItemStack> {
        self.chests
            .remove(&id)
            .map(|chest| chest.inventory.slots().iter().flatten().copied().collect())
            .unwrap_or_default()
    }

    pub fn to_pod(&self, id: u16) -> Option<ChestPod> {
        self.chests.get(&id).map(|chest| ChestPod {
            chest_id: id,
            slots: chest.inventory.slots().to_vec(),
        })
    }

    /// Overwrite a chest's slots from a modification packet. Slots beyond the
    /// chest size are ignored.
    pub fn apply_pod(&mut self, pod: &ChestPod) {
        let chest = self.chests.entry(pod.chest_id).or_default();
        for (slot, stack) in pod.slots.iter().enumerate().take(CHEST_SLOT_COUNT) {
            let _ = chest.inventory.set_slot(slot, *stack);
        }
        if pod.chest_id >= self.next_id {
            self.next_id = pod.chest_id.wrapping_add(1);
        }
    }
}
