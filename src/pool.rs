use crate::block::{BlockKind, MemoryBlock, ProcessId};
use log::debug;
use std::ops::{Index, IndexMut};

/// Fixed layout of a pool: how many blocks of which size sit in the kernel and system regions
/// ahead of the free region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub block_size: u64,
    pub total_blocks: usize,
    pub kernel_blocks: usize,
    pub system_blocks: usize,
}

impl Partition {
    pub fn reserved_blocks(&self) -> usize {
        self.kernel_blocks + self.system_blocks
    }
}

/// The `MemoryPool` struct models both physical memory (frames) and a logical address space
/// (page slots). The first blocks are permanently reserved for the kernel and the system, the
/// remainder is handed out to processes and recycled when they are deallocated.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPool {
    partition: Partition,
    entries: Vec<MemoryBlock>,
}

impl MemoryPool {
    /// Build a pool with the given partition. `prefix` is prepended to every block id so that
    /// blocks from different pools never share an id (`""` for physical, `"logical-"` for the
    /// logical pool).
    pub fn build(partition: Partition, prefix: &str) -> Self {
        let mut entries = Vec::with_capacity(partition.total_blocks);
        (0..partition.total_blocks).for_each(|index| {
            let (kind, label) = if index < partition.kernel_blocks {
                (BlockKind::Kernel, "kernel-")
            } else if index < partition.reserved_blocks() {
                (BlockKind::System, "system-")
            } else {
                (BlockKind::Free, "")
            };
            let id = match (prefix.is_empty(), label.is_empty()) {
                (true, true) => format!("free-{}", index),
                _ => format!("{}{}{}", prefix, label, index),
            };
            entries.push(MemoryBlock::new(
                id,
                kind,
                partition.block_size,
                index as u64 * partition.block_size,
            ));
        });

        Self { partition, entries }
    }

    pub fn blocks(&self) -> &[MemoryBlock] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First-fit search for `n` consecutive free blocks, starting after the reserved regions.
    /// Returns the index of the first block of the run.
    pub fn find_contiguous_free(&self, n: usize) -> Option<usize> {
        self.find_contiguous_where(n, |_| true)
    }

    /// Like [`MemoryPool::find_contiguous_free`], but a free block only counts when `usable`
    /// accepts its index.
    pub fn find_contiguous_where<F>(&self, n: usize, usable: F) -> Option<usize>
    where
        F: Fn(usize) -> bool,
    {
        if n == 0 {
            return None;
        }
        let mut start = None;
        let mut run = 0;
        for index in self.partition.reserved_blocks()..self.entries.len() {
            if self.entries[index].is_free() && usable(index) {
                let first = *start.get_or_insert(index);
                run += 1;
                if run == n {
                    return Some(first);
                }
            } else {
                start = None;
                run = 0;
            }
        }
        None
    }

    /// Mark `n` blocks starting at `start` as allocated to `process_id`, stamping each with the
    /// matching entry of `page_numbers`.
    pub fn reserve(&mut self, start: usize, n: usize, process_id: ProcessId, page_numbers: &[u64]) {
        debug_assert_eq!(n, page_numbers.len());
        for (block, page) in self.entries[start..start + n].iter_mut().zip(page_numbers) {
            block.occupy(BlockKind::Allocated, process_id, *page);
        }
        debug!(
            "reserved blocks {}..{} for process {}",
            start,
            start + n,
            process_id
        );
    }

    /// Index of the first free block, if any.
    pub fn find_free(&self) -> Option<usize> {
        self.entries.iter().position(MemoryBlock::is_free)
    }

    pub fn count_free(&self) -> usize {
        self.entries.iter().filter(|block| block.is_free()).count()
    }

    pub fn release_block(&mut self, index: usize) {
        self.entries[index].release();
    }

    /// Return every block owned by `process_id` to the free region. The number of blocks
    /// released is returned to the caller.
    pub fn release_by_process(&mut self, process_id: ProcessId) -> usize {
        let released = self
            .entries
            .iter_mut()
            .filter(|block| block.is_owned_by(process_id))
            .map(MemoryBlock::release)
            .count();
        if released > 0 {
            debug!("released {} blocks of process {}", released, process_id);
        }
        released
    }
}

impl Index<usize> for MemoryPool {
    type Output = MemoryBlock;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IndexMut<usize> for MemoryPool {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.entries[index]
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    const PARTITION: Partition = Partition {
        block_size: 4,
        total_blocks: 16,
        kernel_blocks: 2,
        system_blocks: 2,
    };

    #[cfg(test)]
    mod memory_pool_tests {

        use super::*;

        #[test]
        fn build() {
            let pool = MemoryPool::build(PARTITION, "");
            assert_eq!(pool.len(), 16);
            assert_eq!(pool[0].kind, BlockKind::Kernel);
            assert_eq!(pool[0].id, "kernel-0");
            assert_eq!(pool[3].kind, BlockKind::System);
            assert_eq!(pool[3].id, "system-3");
            assert_eq!(pool[4].id, "free-4");
            assert_eq!(pool[4].address, 16);
            assert_eq!(pool.count_free(), 12);
        }

        #[test]
        fn build_logical_ids() {
            let pool = MemoryPool::build(PARTITION, "logical-");
            assert_eq!(pool[1].id, "logical-kernel-1");
            assert_eq!(pool[2].id, "logical-system-2");
            assert_eq!(pool[5].id, "logical-5");
        }

        #[test]
        fn find_contiguous_free() {
            let mut pool = MemoryPool::build(PARTITION, "");
            assert_eq!(pool.find_contiguous_free(3), Some(4));

            // leave a two block hole at 4..6 and a wider one after 7
            pool.reserve(6, 1, 1, &[6]);
            assert_eq!(pool.find_contiguous_free(2), Some(4));
            assert_eq!(pool.find_contiguous_free(3), Some(7));
            assert_eq!(pool.find_contiguous_free(9), Some(7));
            assert_eq!(pool.find_contiguous_free(10), None);
            assert_eq!(pool.find_contiguous_free(0), None);
            assert_eq!(pool.find_contiguous_where(2, |index| index != 5), Some(7));
            assert_eq!(pool.find_contiguous_where(1, |_| false), None);
        }

        #[test]
        fn reserve() {
            let mut pool = MemoryPool::build(PARTITION, "");
            pool.reserve(4, 3, 9, &[4, 5, 6]);
            (4..7).for_each(|index| {
                assert_eq!(pool[index].kind, BlockKind::Allocated);
                assert_eq!(pool[index].process_id, Some(9));
                assert_eq!(pool[index].page_number, Some(index as u64));
            });
            assert_eq!(pool.find_free(), Some(7));
        }

        #[test]
        fn release_by_process() {
            let pristine = MemoryPool::build(PARTITION, "");
            let mut pool = pristine.clone();
            pool.reserve(4, 2, 1, &[4, 5]);
            pool.reserve(6, 2, 2, &[6, 7]);

            assert_eq!(pool.release_by_process(1), 2);
            assert_eq!(pool.release_by_process(1), 0);
            assert_eq!(pool.find_free(), Some(4));
            assert_eq!(pool.release_by_process(2), 2);
            assert_eq!(pool, pristine);
        }

        #[test]
        fn find_free_exhausted() {
            let mut pool = MemoryPool::build(PARTITION, "");
            let pages: Vec<u64> = (4..16).collect();
            pool.reserve(4, 12, 1, &pages);
            assert_eq!(pool.find_free(), None);
            pool.release_block(10);
            assert_eq!(pool.find_free(), Some(10));
        }
    }
}
