use crate::block::{BlockKind, MemoryBlock, ProcessId};
use crate::MB;
use log::debug;

/// The `DiskSwapPool` struct simulates swap space on a backing store. Every block is the same
/// size, and the block size is unrelated to the memory page size: a page swapped out occupies a
/// whole block regardless.
#[derive(Debug, Clone, PartialEq)]
pub struct DiskSwapPool {
    block_size: u64,
    entries: Vec<MemoryBlock>,
}

impl DiskSwapPool {
    pub fn build(block_count: usize, block_size: u64) -> Self {
        let entries = (0..block_count)
            .map(|index| {
                MemoryBlock::new(
                    format!("disk-{}", index),
                    BlockKind::Free,
                    block_size,
                    index as u64 * block_size,
                )
            })
            .collect();
        Self {
            block_size,
            entries,
        }
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.entries
    }

    pub fn find_free_block(&self) -> Option<usize> {
        self.entries.iter().position(MemoryBlock::is_free)
    }

    pub fn count_free(&self) -> usize {
        self.entries.iter().filter(|block| block.is_free()).count()
    }

    /// Store `page_number` of `process_id` in the first free block. Returns the block index, or
    /// `None` when swap space is exhausted.
    pub fn reserve_block(&mut self, page_number: u64, process_id: ProcessId) -> Option<usize> {
        let index = self.find_free_block()?;
        let block = &mut self.entries[index];
        block.occupy(BlockKind::Disk, process_id, page_number);
        block.is_swapped = Some(true);
        debug!("page {} written to swap block {}", page_number, index);
        Some(index)
    }

    pub fn release_block(&mut self, index: usize) {
        self.entries[index].release();
    }

    /// Index of the block currently holding `page_number`.
    pub fn find_block_by_page(&self, page_number: u64) -> Option<usize> {
        self.entries
            .iter()
            .position(|block| block.kind == BlockKind::Disk && block.page_number == Some(page_number))
    }

    pub fn release_by_process(&mut self, process_id: ProcessId) -> usize {
        let mut released = 0;
        for block in self.entries.iter_mut() {
            if block.is_owned_by(process_id) {
                block.release();
                released += 1;
            }
        }
        released
    }

    /// Byte address of a block on the simulated device.
    pub fn disk_address(&self, index: usize) -> u64 {
        index as u64 * self.block_size * MB
    }
}
