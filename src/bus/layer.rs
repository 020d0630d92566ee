//! Layered mappings: named, priority-ordered overlays over the page table.
//!
//! A page's live entry is always "the highest-priority active layer that
//! covers it, or the saved base mapping if none does". We keep, per page,
//! the list of active layers currently covering it ([`CoverEntry`]) so
//! deactivating one layer can fall through to whatever is left without
//! rescanning every layer in the machine.

use super::page_table::{PageTableEntry, Perms, RegionTag};

#[derive(Debug, Clone, Copy)]
pub struct LayerRange {
    pub virtual_base: u32,
    pub size: u32,
    pub target_id: usize,
    pub phys_base: u32,
    pub perms: Perms,
    pub tag: RegionTag,
}

pub struct LayerRecord {
    pub name: String,
    pub priority: i32,
    pub active: bool,
    pub device_id: u32,
    pub ranges: Vec<LayerRange>,
}

/// One active layer's claim on a page, ordered by `(priority, seq)` so the
/// most recently activated layer wins ties at equal priority ("later
/// wins").
#[derive(Debug, Clone, Copy)]
pub struct CoverEntry {
    pub layer_id: usize,
    pub priority: i32,
    pub seq: u64,
    pub entry: PageTableEntry,
}

pub fn pick_top(covering: &[CoverEntry]) -> Option<PageTableEntry> {
    covering.iter().max_by_key(|c| (c.priority, c.seq)).map(|c| c.entry)
}
