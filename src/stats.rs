use crate::config::Geometry;
use serde::{Deserialize, Serialize};

/// The `Stats` struct is the collection of aggregate counters shown next to the memory grids.
/// Sizes are in MB, everything else is a count. The simulator adjusts it as part of every
/// operation that touches a pool, so it always agrees with the blocks it summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_memory: u64,
    pub used_memory: u64,
    pub free_memory: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub used_pages: u64,
    pub swapped_pages: u64,
    pub kernel_memory: u64,
    pub system_memory: u64,
    pub disk_size: u64,
    pub used_disk_space: u64,
    pub tlb_hits: u64,
    pub tlb_misses: u64,
    pub page_faults: u64,
}

impl Stats {
    /// Counters for a freshly partitioned system.
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            total_memory: geometry.physical_memory,
            used_memory: 0,
            free_memory: geometry.physical_memory,
            page_size: geometry.page_size,
            total_pages: geometry.physical_memory / geometry.page_size,
            used_pages: 0,
            swapped_pages: 0,
            kernel_memory: geometry.kernel_memory,
            system_memory: geometry.system_memory,
            disk_size: geometry.disk_blocks as u64 * geometry.disk_block_size,
            used_disk_space: 0,
            tlb_hits: 0,
            tlb_misses: 0,
            page_faults: 0,
        }
    }

    pub fn tlb_hit_ratio(&self) -> f64 {
        match self.tlb_hits + self.tlb_misses {
            0 => 0.0,
            lookups => self.tlb_hits as f64 / lookups as f64,
        }
    }

    /// Account for `pages` frames being handed out.
    pub(crate) fn occupy_frames(&mut self, pages: u64) {
        self.used_memory += pages * self.page_size;
        self.free_memory = self.free_memory.saturating_sub(pages * self.page_size);
    }

    /// Account for `pages` frames being given back.
    pub(crate) fn release_frames(&mut self, pages: u64) {
        self.used_memory = self.used_memory.saturating_sub(pages * self.page_size);
        self.free_memory += pages * self.page_size;
    }

    pub(crate) fn occupy_swap(&mut self, blocks: u64, block_size: u64) {
        self.swapped_pages += blocks;
        self.used_disk_space += blocks * block_size;
    }

    pub(crate) fn release_swap(&mut self, blocks: u64, block_size: u64) {
        self.swapped_pages = self.swapped_pages.saturating_sub(blocks);
        self.used_disk_space = self.used_disk_space.saturating_sub(blocks * block_size);
    }
}

impl std::fmt::Display for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "
Stats Tracked
---------------------------------
total_memory (MB):       {:08}
used_memory (MB):        {:08}
free_memory (MB):        {:08}
kernel_memory (MB):      {:08}
system_memory (MB):      {:08}
page_size (MB):          {:08}
total_pages:             {:08}
used_pages:              {:08}
swapped_pages:           {:08}
disk_size (MB):          {:08}
used_disk_space (MB):    {:08}
tlb_hits:                {:08}
tlb_misses:              {:08}
page_faults:             {:08}


tlb hit ratio:           {:.06}
               ",
            self.total_memory,
            self.used_memory,
            self.free_memory,
            self.kernel_memory,
            self.system_memory,
            self.page_size,
            self.total_pages,
            self.used_pages,
            self.swapped_pages,
            self.disk_size,
            self.used_disk_space,
            self.tlb_hits,
            self.tlb_misses,
            self.page_faults,
            self.tlb_hit_ratio(),
        )
    }
}
