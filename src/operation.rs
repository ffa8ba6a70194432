use crate::block::ProcessId;
use serde::{Deserialize, Serialize};

/// A request against the simulator, one variant per operation kind carrying only what that kind
/// needs. On the wire it is a flat object tagged by `type`, e.g.
/// `{"type":"allocate","processId":1,"size":16}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    /// Allocate `size` MB. Without a process id the current process is charged.
    Allocate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        process_id: Option<ProcessId>,
        size: u64,
    },
    Deallocate {
        process_id: ProcessId,
    },
    PageFault {
        page_number: u64,
    },
    SwapIn {
        page_number: u64,
    },
    SwapOut {
        page_number: u64,
    },
    TranslateAddress {
        virtual_address: i64,
    },
    AccessMemory {
        virtual_address: i64,
        #[serde(default)]
        write: bool,
    },
    SwitchProcess {
        process_id: ProcessId,
    },
    /// Replace the RWX bits of a page-table entry.
    SetProtection {
        page_number: u64,
        protection: u8,
    },
    Reset,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Allocate { .. } => "allocate",
            Operation::Deallocate { .. } => "deallocate",
            Operation::PageFault { .. } => "pageFault",
            Operation::SwapIn { .. } => "swapIn",
            Operation::SwapOut { .. } => "swapOut",
            Operation::TranslateAddress { .. } => "translateAddress",
            Operation::AccessMemory { .. } => "accessMemory",
            Operation::SwitchProcess { .. } => "switchProcess",
            Operation::SetProtection { .. } => "setProtection",
            Operation::Reset => "reset",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Allocate {
                process_id: Some(pid),
                size,
            } => write!(f, "allocate {} MB for process {}", size, pid),
            Operation::Allocate {
                process_id: None,
                size,
            } => write!(f, "allocate {} MB", size),
            Operation::Deallocate { process_id } => write!(f, "deallocate process {}", process_id),
            Operation::PageFault { page_number } => write!(f, "page fault on page {}", page_number),
            Operation::SwapIn { page_number } => write!(f, "swap in page {}", page_number),
            Operation::SwapOut { page_number } => write!(f, "swap out page {}", page_number),
            Operation::TranslateAddress { virtual_address } => {
                write!(f, "translate 0x{:X}", virtual_address)
            }
            Operation::AccessMemory {
                virtual_address,
                write,
            } => write!(
                f,
                "{} 0x{:X}",
                if *write { "write" } else { "read" },
                virtual_address
            ),
            Operation::SwitchProcess { process_id } => write!(f, "switch to process {}", process_id),
            Operation::SetProtection {
                page_number,
                protection,
            } => write!(f, "protect page {} with {:03b}", page_number, protection),
            Operation::Reset => f.write_str("reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(test)]
    mod operation_tests {
        use super::*;

        #[test]
        fn to_json() {
            let op = Operation::Allocate {
                process_id: Some(1),
                size: 16,
            };
            assert_eq!(
                serde_json::to_string(&op).unwrap(),
                r#"{"type":"allocate","processId":1,"size":16}"#
            );
            assert_eq!(
                serde_json::to_string(&Operation::Reset).unwrap(),
                r#"{"type":"reset"}"#
            );
        }

        #[test]
        fn from_json() {
            let op: Operation =
                serde_json::from_str(r#"{"type":"translateAddress","virtualAddress":258634}"#)
                    .unwrap();
            assert_eq!(
                op,
                Operation::TranslateAddress {
                    virtual_address: 0x3F24A
                }
            );

            let op: Operation = serde_json::from_str(r#"{"type":"allocate","size":8}"#).unwrap();
            assert_eq!(
                op,
                Operation::Allocate {
                    process_id: None,
                    size: 8
                }
            );

            let op: Operation =
                serde_json::from_str(r#"{"type":"accessMemory","virtualAddress":1}"#).unwrap();
            assert_eq!(
                op,
                Operation::AccessMemory {
                    virtual_address: 1,
                    write: false
                }
            );
        }

        #[test]
        fn rejects_missing_fields() {
            assert!(serde_json::from_str::<Operation>(r#"{"type":"swapIn"}"#).is_err());
            assert!(serde_json::from_str::<Operation>(r#"{"type":"fragmentationFix"}"#).is_err());
        }

        #[test]
        fn name() {
            assert_eq!(Operation::SwapOut { page_number: 3 }.name(), "swapOut");
            assert_eq!(Operation::Reset.to_string(), "reset");
        }
    }
}
