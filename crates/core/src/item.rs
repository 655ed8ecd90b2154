//! Items, stacks and inventories.

use serde::{Deserialize, Serialize};

/// Item identifier referencing the static item table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemType(pub u16);

struct ItemData {
    name: &'static str,
    max_stack: u32,
}

const ITEM_DATA: &[ItemData] = &[
    ItemData { name: "wood", max_stack: 99 },
    ItemData { name: "stone", max_stack: 99 },
    ItemData { name: "sand", max_stack: 99 },
    ItemData { name: "seeds", max_stack: 99 },
    ItemData { name: "berries", max_stack: 50 },
    ItemData { name: "iron bar", max_stack: 50 },
    ItemData { name: "chest", max_stack: 10 },
    ItemData { name: "landmark", max_stack: 10 },
    ItemData { name: "rocket parts", max_stack: 1 },
    ItemData { name: "soil", max_stack: 99 },
    ItemData { name: "wooden floor", max_stack: 99 },
];

impl ItemType {
    /// Wood log.
    pub const WOOD: Self = Self(0);
    /// Stone chunk.
    pub const STONE: Self = Self(1);
    /// Sand pile.
    pub const SAND: Self = Self(2);
    /// Plant seeds.
    pub const SEEDS: Self = Self(3);
    /// Berries harvested from bushes.
    pub const BERRIES: Self = Self(4);
    /// Smelted iron.
    pub const IRON_BAR: Self = Self(5);
    /// Placeable chest.
    pub const CHEST: Self = Self(6);
    /// Placeable landmark.
    pub const LANDMARK: Self = Self(7);
    /// Rocket kit.
    pub const ROCKET_PARTS: Self = Self(8);
    /// Placeable soil (land).
    pub const SOIL: Self = Self(9);
    /// Placeable wooden floor (land).
    pub const WOODEN_FLOOR: Self = Self(10);

    /// Whether the id exists in the item table.
    pub fn is_known(self) -> bool {
        (self.0 as usize) < ITEM_DATA.len()
    }

    /// Display name, or `"unknown"` for ids outside the table.
    pub fn name(self) -> &'static str {
        ITEM_DATA
            .get(self.0 as usize)
            .map(|data| data.name)
            .unwrap_or("unknown")
    }

    /// Maximum number of items in one stack.
    pub fn max_stack_size(self) -> u32 {
        ITEM_DATA
            .get(self.0 as usize)
            .map(|data| data.max_stack)
            .unwrap_or(1)
    }
}

/// A counted stack of one item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item kind.
    pub item: ItemType,
    /// Stack size (always at least 1 while stored in a slot).
    pub count: u32,
}

impl ItemStack {
    /// Create a stack.
    pub const fn new(item: ItemType, count: u32) -> Self {
        Self { item, count }
    }
}

/// Errors raised by inventory operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// Slot index beyond the inventory size.
    #[error("slot {slot} out of range (inventory has {len} slots)")]
    SlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Number of slots.
        len: usize,
    },
}

/// Fixed-size slot inventory used by players and chests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
}

impl Inventory {
    /// Create an empty inventory with `size` slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when there are no slots at all.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Borrow all slots.
    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    /// Read a slot.
    pub fn slot(&self, slot: usize) -> Option<ItemStack> {
        self.slots.get(slot).copied().flatten()
    }

    /// Overwrite a slot.
    pub fn set_slot(&mut self, slot: usize, stack: Option<ItemStack>) -> Result<(), InventoryError> {
        let len = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(InventoryError::SlotOutOfRange { slot, len })?;
        *entry = stack.filter(|s| s.count > 0);
        Ok(())
    }

    /// Add items, topping up existing stacks before filling empty slots.
    ///
    /// Returns the number of items that did not fit.
    pub fn add_item(&mut self, item: ItemType, mut count: u32) -> u32 {
        let max = item.max_stack_size();
        for stack in self.slots.iter_mut().flatten() {
            if count == 0 {
                return 0;
            }
            if stack.item == item && stack.count < max {
                let moved = (max - stack.count).min(count);
                stack.count += moved;
                count -= moved;
            }
        }
        for slot in self.slots.iter_mut() {
            if count == 0 {
                break;
            }
            if slot.is_none() {
                let moved = max.min(count);
                *slot = Some(ItemStack::new(item, moved));
                count -= moved;
            }
        }
        count
    }

    /// Total number of `item` across all slots.
    pub fn count_of(&self, item: ItemType) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|s| s.item == item)
            .map(|s| s.count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_item_tops_up_then_fills() {
        let mut inv = Inventory::new(3);
        inv.set_slot(1, Some(ItemStack::new(ItemType::WOOD, 98))).unwrap();
        let leftover = inv.add_item(ItemType::WOOD, 5);
        assert_eq!(leftover, 0);
        assert_eq!(inv.slot(1).unwrap().count, 99);
        assert_eq!(inv.slot(0).unwrap().count, 4);
        assert_eq!(inv.count_of(ItemType::WOOD), 103);
    }

    #[test]
    fn add_item_reports_overflow() {
        let mut inv = Inventory::new(1);
        let leftover = inv.add_item(ItemType::ROCKET_PARTS, 3);
        assert_eq!(leftover, 2);
    }

    #[test]
    fn set_slot_out_of_range() {
        let mut inv = Inventory::new(2);
        let err = inv.set_slot(5, None).unwrap_err();
        assert_eq!(err, InventoryError::SlotOutOfRange { slot: 5, len: 2 });
    }

    #[test]
    fn unknown_item_defaults() {
        assert_eq!(ItemType(999).name(), "unknown");
        assert_eq!(ItemType(999).max_stack_size(), 1);
        assert!(!ItemType(999).is_known());
    }
}
