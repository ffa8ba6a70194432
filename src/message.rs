use crate::block::{MemoryBlock, ProcessId};
use crate::error::Result;
use crate::operation::Operation;
use crate::stats::Stats;
use crate::table::PageTableEntry;
use crate::tlb::TlbEntry;
use serde::{Deserialize, Serialize};

/// Read-only copy of everything a front end renders after an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub blocks: Vec<MemoryBlock>,
    pub logical_blocks: Vec<MemoryBlock>,
    pub disk_blocks: Vec<MemoryBlock>,
    pub page_table: Vec<PageTableEntry>,
    pub tlb: Vec<TlbEntry>,
    pub stats: Stats,
    pub current_process_id: ProcessId,
}

/// Messages exchanged with an external memory backend, shaped `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BackendMessage {
    MemoryUpdate(Vec<MemoryBlock>),
    StatsUpdate(Stats),
    Error(String),
    Operation(Operation),
    PageTable(Vec<PageTableEntry>),
    TlbUpdate(Vec<TlbEntry>),
}

impl BackendMessage {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockKind;
    use crate::config::Geometry;

    #[cfg(test)]
    mod backend_message_tests {
        use super::*;

        #[test]
        fn outbound_operation() {
            let message = BackendMessage::Operation(Operation::SwapOut { page_number: 49 });
            assert_eq!(
                message.to_json().unwrap(),
                r#"{"type":"operation","data":{"type":"swapOut","pageNumber":49}}"#
            );
        }

        #[test]
        fn inbound_memory_update() {
            let message = BackendMessage::from_json(
                r#"{"type":"memoryUpdate","data":[{"id":"free-48","type":"allocated","size":4,"address":192,"processId":2,"pageNumber":48}]}"#,
            )
            .unwrap();
            match message {
                BackendMessage::MemoryUpdate(blocks) => {
                    assert_eq!(blocks.len(), 1);
                    assert_eq!(blocks[0].kind, BlockKind::Allocated);
                    assert_eq!(blocks[0].process_id, Some(2));
                }
                other => panic!("unexpected message {:?}", other),
            }
        }

        #[test]
        fn inbound_stats_and_error() {
            let stats = Stats::new(&Geometry::default());
            let text = BackendMessage::StatsUpdate(stats).to_json().unwrap();
            assert!(text.starts_with(r#"{"type":"statsUpdate","data":{"totalMemory":1024"#));
            assert_eq!(
                BackendMessage::from_json(&text).unwrap(),
                BackendMessage::StatsUpdate(stats)
            );

            assert_eq!(
                BackendMessage::from_json(r#"{"type":"error","data":"backend down"}"#).unwrap(),
                BackendMessage::Error(String::from("backend down"))
            );
        }

        #[test]
        fn malformed() {
            assert!(BackendMessage::from_json(r#"{"type":"memoryUpdate","data":3}"#).is_err());
            assert!(BackendMessage::from_json("not json").is_err());
        }
    }
}
