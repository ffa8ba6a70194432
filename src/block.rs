use serde::{Deserialize, Serialize};

pub type ProcessId = u32;

/// Occupancy state of a block. Only `Free` blocks may be handed out by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Free,
    Used,
    Allocated,
    Page,
    Segment,
    Kernel,
    System,
    Disk,
}

/// The `MemoryBlock` struct is the unit every pool is partitioned into: a physical frame, a
/// logical page slot, or a swap block on disk. Blocks are created once when a pool is built and
/// recycled back to `Free` afterwards, never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Size in MB.
    pub size: u64,
    /// Base address in MB.
    pub address: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_swapped: Option<bool>,
}

impl MemoryBlock {
    pub fn new(id: String, kind: BlockKind, size: u64, address: u64) -> Self {
        Self {
            id,
            kind,
            size,
            address,
            process_id: None,
            page_number: None,
            segment_id: None,
            is_swapped: None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.kind == BlockKind::Free
    }

    pub fn is_owned_by(&self, process_id: ProcessId) -> bool {
        self.process_id == Some(process_id)
    }

    /// Hand the block to `process_id` under the given kind.
    pub fn occupy(&mut self, kind: BlockKind, process_id: ProcessId, page_number: u64) {
        self.kind = kind;
        self.process_id = Some(process_id);
        self.page_number = Some(page_number);
    }

    /// Return the block to the free state, dropping every piece of ownership metadata.
    pub fn release(&mut self) {
        self.kind = BlockKind::Free;
        self.process_id = None;
        self.page_number = None;
        self.segment_id = None;
        self.is_swapped = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod memory_block_tests {
        use super::*;

        #[test]
        fn occupy_and_release() {
            let mut block = MemoryBlock::new(String::from("free-48"), BlockKind::Free, 4, 192);
            let pristine = block.clone();

            block.occupy(BlockKind::Allocated, 3, 60);
            assert!(!block.is_free());
            assert!(block.is_owned_by(3));
            assert_eq!(block.page_number, Some(60));

            block.release();
            assert_eq!(block, pristine);
        }

        #[test]
        fn json_shape() {
            let mut block = MemoryBlock::new(String::from("disk-2"), BlockKind::Free, 20, 40);
            assert_eq!(
                serde_json::to_string(&block).unwrap(),
                r#"{"id":"disk-2","type":"free","size":20,"address":40}"#
            );

            block.occupy(BlockKind::Disk, 1, 49);
            block.is_swapped = Some(true);
            assert_eq!(
                serde_json::to_string(&block).unwrap(),
                r#"{"id":"disk-2","type":"disk","size":20,"address":40,"processId":1,"pageNumber":49,"isSwapped":true}"#
            );
        }

        #[test]
        fn from_json() {
            let block: MemoryBlock =
                serde_json::from_str(r#"{"id":"k","type":"kernel","size":4,"address":0}"#).unwrap();
            assert_eq!(block.kind, BlockKind::Kernel);
            assert_eq!(block.process_id, None);
        }
    }
}
