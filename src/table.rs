use crate::block::ProcessId;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Three-bit read/write/execute permission mask carried by every page-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Protection(u8);

impl Protection {
    pub const EXECUTE: Protection = Protection(0b001);
    pub const WRITE: Protection = Protection(0b010);
    pub const READ: Protection = Protection(0b100);
    pub const RWX: Protection = Protection(0b111);

    pub fn from_bits(bits: u8) -> Option<Self> {
        (bits <= Self::RWX.0).then_some(Self(bits))
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Protection) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A single row of the page table. `valid` entries map to a frame through `ppn`; entries whose
/// page sits in swap space are `on_disk` and remember where through `disk_address`. An entry is
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTableEntry {
    pub vpn: u64,
    pub ppn: Option<u64>,
    pub valid: bool,
    pub dirty: bool,
    pub referenced: bool,
    pub protection: Protection,
    pub on_disk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_address: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<ProcessId>,
}

impl PageTableEntry {
    /// An entry for a page loaded into frame `ppn`.
    pub fn resident(vpn: u64, ppn: u64, process_id: ProcessId) -> Self {
        Self {
            vpn,
            ppn: Some(ppn),
            valid: true,
            dirty: false,
            referenced: true,
            protection: Protection::RWX,
            on_disk: false,
            disk_address: None,
            process_id: Some(process_id),
        }
    }

    /// An entry for a page that went straight to swap space.
    pub fn swapped(vpn: u64, disk_address: u64, process_id: ProcessId) -> Self {
        Self {
            ppn: None,
            valid: false,
            on_disk: true,
            disk_address: Some(disk_address),
            ..Self::resident(vpn, 0, process_id)
        }
    }

    /// An entry recorded on first touch of a page nothing has been allocated for yet.
    pub fn untouched(vpn: u64, process_id: ProcessId) -> Self {
        Self {
            ppn: None,
            valid: false,
            ..Self::resident(vpn, 0, process_id)
        }
    }
}

/// The `PageTable` struct is a thin wrapper around a `HashMap` keyed by virtual page number.
/// Virtual page numbers are unique across processes, so one table serves them all and each entry
/// remembers its owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageTable(HashMap<u64, PageTableEntry>);

impl PageTable {
    pub fn build() -> Self {
        Self(HashMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn lookup(&self, vpn: u64) -> Option<&PageTableEntry> {
        self.0.get(&vpn)
    }

    pub fn lookup_mut(&mut self, vpn: u64) -> Option<&mut PageTableEntry> {
        self.0.get_mut(&vpn)
    }

    /// Insert `entry`, replacing any previous entry for the same page.
    ///
    /// # Errors
    ///
    /// `Error::NotResident` when the entry claims to be valid without a frame to point to. The
    /// caller is expected to treat that as a page fault instead.
    pub fn insert(&mut self, entry: PageTableEntry) -> Result<()> {
        if entry.valid && (entry.ppn.is_none() || entry.on_disk) {
            return Err(Error::NotResident(format!(
                "Page {} has no physical page assigned",
                entry.vpn
            )));
        }
        self.0.insert(entry.vpn, entry);
        Ok(())
    }

    /// Flip a resident page to its swapped state. The frame it occupied is handed back.
    pub fn mark_swapped_out(&mut self, vpn: u64, disk_address: u64) -> Result<u64> {
        match self.0.get_mut(&vpn) {
            Some(entry) if entry.valid && !entry.on_disk => {
                entry.valid = false;
                entry.on_disk = true;
                entry.disk_address = Some(disk_address);
                entry.ppn.take().ok_or_else(|| {
                    Error::NotResident(format!("Page {} has no physical page assigned", vpn))
                })
            }
            Some(_) => Err(Error::NotResident(format!(
                "Page {} is not resident in memory",
                vpn
            ))),
            None => Err(Error::NotResident(format!(
                "Page {} not found in page table",
                vpn
            ))),
        }
    }

    /// Flip a swapped page back to resident in frame `ppn`.
    pub fn mark_swapped_in(&mut self, vpn: u64, ppn: u64) -> Result<()> {
        match self.0.get_mut(&vpn) {
            Some(entry) if entry.on_disk && !entry.valid => {
                entry.valid = true;
                entry.on_disk = false;
                entry.ppn = Some(ppn);
                entry.disk_address = None;
                entry.dirty = false;
                entry.referenced = true;
                Ok(())
            }
            Some(_) => Err(Error::NotOnDisk(format!("Page {} is not on disk", vpn))),
            None => Err(Error::NotOnDisk(format!(
                "Page {} not found in page table",
                vpn
            ))),
        }
    }

    pub fn mark_referenced(&mut self, vpn: u64) -> bool {
        match self.0.get_mut(&vpn) {
            Some(entry) => {
                entry.referenced = true;
                true
            }
            None => false,
        }
    }

    /// Drop every entry owned by `process_id`, returning the removed page numbers in order.
    pub fn remove_all_for_process(&mut self, process_id: ProcessId) -> Vec<u64> {
        let mut removed: Vec<u64> = self
            .0
            .values()
            .filter(|entry| entry.process_id == Some(process_id))
            .map(|entry| entry.vpn)
            .collect();
        removed.sort_unstable();
        removed.iter().for_each(|vpn| {
            self.0.remove(vpn);
        });
        removed
    }

    /// Page numbers of every resident page, lowest first.
    pub fn resident_pages(&self) -> Vec<u64> {
        let mut pages: Vec<u64> = self
            .0
            .values()
            .filter(|entry| entry.valid)
            .map(|entry| entry.vpn)
            .collect();
        pages.sort_unstable();
        pages
    }

    /// Every entry, ordered by virtual page number.
    pub fn entries(&self) -> Vec<PageTableEntry> {
        let mut entries: Vec<PageTableEntry> = self.0.values().cloned().collect();
        entries.sort_unstable_by_key(|entry| entry.vpn);
        entries
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[cfg(test)]
    mod protection_tests {

        use super::*;

        #[test]
        fn from_bits() {
            assert_eq!(Protection::from_bits(7), Some(Protection::RWX));
            assert_eq!(Protection::from_bits(8), None);
            let read_only = Protection::from_bits(4).unwrap();
            assert!(read_only.contains(Protection::READ));
            assert!(!read_only.contains(Protection::WRITE));
        }
    }

    #[cfg(test)]
    mod page_table_tests {
        use super::*;

        fn make_standard_table() -> PageTable {
            let mut table = PageTable::build();

            (0..10).for_each(|x| {
                table
                    .insert(PageTableEntry::resident(x, x + 100, 1))
                    .unwrap()
            });
            table
        }

        #[test]
        fn build() {
            // arrange
            let table = PageTable::build();

            // assert
            assert!(table.is_empty())
        }

        #[test]
        fn lookup() {
            // arrange
            let table = make_standard_table();
            let range_max = 10;

            (0..range_max).for_each(|x| {
                let entry = table.lookup(x).unwrap();
                // assert
                assert_eq!(entry.ppn, Some(x + 100));
                assert!(entry.valid);
            });

            assert_eq!(table.lookup(range_max + 1), None);
        }

        #[test]
        fn insert_rejects_valid_without_frame() {
            let mut table = PageTable::build();
            let mut entry = PageTableEntry::untouched(3, 1);
            entry.valid = true;

            assert!(matches!(table.insert(entry), Err(Error::NotResident(_))));
            assert!(table.insert(PageTableEntry::untouched(3, 1)).is_ok());
            assert!(!table.lookup(3).unwrap().valid);
        }

        #[test]
        fn swap_out_then_in() {
            // arrange
            let mut table = make_standard_table();

            // act
            let freed = table.mark_swapped_out(4, 0x1400000).unwrap();

            // assert
            assert_eq!(freed, 104);
            let entry = table.lookup(4).unwrap();
            assert!(!entry.valid && entry.on_disk);
            assert_eq!(entry.disk_address, Some(0x1400000));
            assert!(matches!(
                table.mark_swapped_out(4, 0),
                Err(Error::NotResident(_))
            ));

            // act
            table.lookup_mut(4).unwrap().dirty = true;
            table.mark_swapped_in(4, 77).unwrap();

            // assert
            let entry = table.lookup(4).unwrap();
            assert!(entry.valid && !entry.on_disk && !entry.dirty && entry.referenced);
            assert_eq!(entry.ppn, Some(77));
            assert!(matches!(
                table.mark_swapped_in(4, 78),
                Err(Error::NotOnDisk(_))
            ));
        }

        #[test]
        fn state_errors_on_absent_pages() {
            let mut table = PageTable::build();
            assert!(matches!(
                table.mark_swapped_out(1, 0),
                Err(Error::NotResident(_))
            ));
            assert!(matches!(
                table.mark_swapped_in(1, 0),
                Err(Error::NotOnDisk(_))
            ));
            assert!(!table.mark_referenced(1));
        }

        #[test]
        fn remove_all_for_process() {
            let mut table = make_standard_table();
            table.insert(PageTableEntry::swapped(20, 0, 2)).unwrap();
            table.insert(PageTableEntry::resident(21, 5, 2)).unwrap();

            assert_eq!(table.remove_all_for_process(2), vec![20, 21]);
            assert_eq!(table.len(), 10);
            assert!(table.remove_all_for_process(2).is_empty());
        }

        #[test]
        fn resident_pages() {
            let mut table = make_standard_table();
            table.mark_swapped_out(0, 0).unwrap();
            table.insert(PageTableEntry::untouched(50, 1)).unwrap();
            assert_eq!(table.resident_pages(), (1..10).collect::<Vec<u64>>());
        }

        #[test]
        fn json_shape() {
            let entry = PageTableEntry::swapped(60, 0x1400000, 1);
            assert_eq!(
                serde_json::to_string(&entry).unwrap(),
                r#"{"vpn":60,"ppn":null,"valid":false,"dirty":false,"referenced":true,"protection":7,"onDisk":true,"diskAddress":20971520,"processId":1}"#
            );
        }
    }
}
