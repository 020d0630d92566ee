//! Swap groups: named sets of variants sharing one virtual range, with
//! exactly one variant selected at a time.

use super::page_table::{Perms, RegionTag};

#[derive(Debug, Clone)]
pub struct Variant {
    pub name: String,
    pub target_id: usize,
    pub phys_base: u32,
    pub perms: Perms,
    pub tag: RegionTag,
    pub size: u32,
}

pub struct SwapGroupRecord {
    pub name: String,
    pub controller_device_id: u32,
    pub virtual_base: u32,
    pub size: u32,
    pub variants: Vec<Variant>,
    pub active_variant: Option<usize>,
    /// When set, the group's target is only effective while this layer is
    /// active; selecting a variant rewrites the layer's own range records
    /// rather than the live page table directly (the Language Card's bank
    /// switches work this way: banks must coexist with a base ROM mapping
    /// that stays visible whenever the layer itself is inactive).
    pub scoped_layer: Option<usize>,
}

impl SwapGroupRecord {
    pub fn variant_index(&self, name: &str) -> Option<usize> {
        self.variants.iter().position(|v| v.name == name)
    }
}
