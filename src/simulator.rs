use crate::address::VirtualAddress;
use crate::block::{BlockKind, ProcessId};
use crate::config::Geometry;
use crate::disk::DiskSwapPool;
use crate::error::{Error, Result};
use crate::message::{BackendMessage, Snapshot};
use crate::operation::Operation;
use crate::policy::{EvictionPolicy, FirstFound};
use crate::pool::MemoryPool;
use crate::stats::Stats;
use crate::table::{PageTable, PageTableEntry, Protection};
use crate::tlb::TranslationCache;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::VecDeque;

/// Delay before a page fault raised by a translation is serviced.
pub const PAGE_FAULT_DELAY_MS: u64 = 500;
/// Delay before a swap-in that had to evict a page is retried.
pub const SWAP_RETRY_DELAY_MS: u64 = 100;

const DEFAULT_PROCESS: ProcessId = 1;

/// Severity of a successful operation's notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
}

/// Result of an address translation. `ppn` and `physical_address` are only known when the page
/// was resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Translation {
    pub address: VirtualAddress,
    pub ppn: Option<u64>,
    pub physical_address: Option<u64>,
    pub tlb_hit: bool,
    pub page_fault: bool,
}

/// What a successful operation reports back to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub level: Level,
    pub message: String,
    pub translation: Option<Translation>,
    follow_up: Option<(u64, Operation)>,
}

impl Report {
    fn new(level: Level, message: String) -> Self {
        Self {
            level,
            message,
            translation: None,
            follow_up: None,
        }
    }

    fn with_translation(mut self, translation: Translation) -> Self {
        self.translation = Some(translation);
        self
    }

    fn then(mut self, delay_ms: u64, operation: Operation) -> Self {
        self.follow_up = Some((delay_ms, operation));
        self
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.level, self.message)
    }
}

/// An operation executed off the deferred queue together with its result.
#[derive(Debug)]
pub struct Outcome {
    pub operation: Operation,
    pub result: Result<Report>,
}

#[derive(Debug, Clone)]
struct Deferred {
    due: u64,
    operation: Operation,
}

/// The `SimulatorState` struct owns every pool, the page table, the TLB and the counters derived
/// from them. Each handler below takes it by exclusive reference and either applies an operation
/// completely or returns an error without touching anything.
#[derive(Debug, Clone)]
pub struct SimulatorState {
    geometry: Geometry,
    physical: MemoryPool,
    logical: Option<MemoryPool>,
    disk: DiskSwapPool,
    pages: PageTable,
    tlb: TranslationCache,
    stats: Stats,
    current_process: ProcessId,
}

impl SimulatorState {
    fn build(geometry: Geometry) -> Self {
        Self {
            physical: MemoryPool::build(geometry.physical_partition(), ""),
            logical: geometry
                .logical_space
                .then(|| MemoryPool::build(geometry.logical_partition(), "logical-")),
            disk: DiskSwapPool::build(geometry.disk_blocks, geometry.disk_block_size),
            pages: PageTable::build(),
            tlb: TranslationCache::build(geometry.tlb_size),
            stats: Stats::new(&geometry),
            current_process: DEFAULT_PROCESS,
            geometry,
        }
    }

    fn owns_anything(&self, process_id: ProcessId) -> bool {
        let owned = |blocks: &[crate::block::MemoryBlock]| {
            blocks.iter().any(|block| block.is_owned_by(process_id))
        };
        owned(self.physical.blocks())
            || self.logical.as_ref().map_or(false, |pool| owned(pool.blocks()))
            || owned(self.disk.blocks())
            || self
                .pages
                .entries()
                .iter()
                .any(|entry| entry.process_id == Some(process_id))
    }

    fn allocate(&mut self, process_id: Option<ProcessId>, size: u64) -> Result<Report> {
        let process_id = process_id.unwrap_or(self.current_process);
        if process_id == 0 {
            return Err(Error::InvalidInput(String::from(
                "Process id must be a positive integer",
            )));
        }
        if size == 0 {
            return Err(Error::InvalidInput(String::from(
                "Allocation size must be a positive number of MB",
            )));
        }
        let pages_needed = size.div_ceil(self.geometry.page_size) as usize;

        let logical = match self.logical.as_mut() {
            Some(logical) => logical,
            None => return self.allocate_contiguous(process_id, size, pages_needed),
        };
        let start = logical.find_contiguous_free(pages_needed).ok_or_else(|| {
            Error::CapacityExceeded(String::from(
                "Failed to allocate memory: Not enough space in logical memory",
            ))
        })?;
        if self.physical.count_free() + self.disk.count_free() < pages_needed {
            return Err(Error::CapacityExceeded(format!(
                "Failed to allocate memory: {} pages exceed free physical memory and swap space",
                pages_needed
            )));
        }

        let vpns: Vec<u64> = (start..start + pages_needed).map(|vpn| vpn as u64).collect();
        logical.reserve(start, pages_needed, process_id, &vpns);

        let (mut resident, mut swapped) = (0u64, 0u64);
        for &vpn in &vpns {
            let entry = match self.physical.find_free() {
                Some(frame) => {
                    self.physical.reserve(frame, 1, process_id, &[vpn]);
                    resident += 1;
                    PageTableEntry::resident(vpn, frame as u64, process_id)
                }
                None => {
                    let block = self.disk.reserve_block(vpn, process_id).ok_or_else(|| {
                        Error::CapacityExceeded(String::from("No free disk space available for swap"))
                    })?;
                    swapped += 1;
                    PageTableEntry::swapped(vpn, self.disk.disk_address(block), process_id)
                }
            };
            self.pages.insert(entry)?;
        }

        self.stats.occupy_frames(resident);
        self.stats.occupy_swap(swapped, self.disk.block_size());
        self.stats.used_pages += pages_needed as u64;

        if swapped > 0 {
            Ok(Report::new(
                Level::Warning,
                format!(
                    "Allocated {} MB of memory ({} pages), {} pages went to swap space",
                    size, pages_needed, swapped
                ),
            ))
        } else {
            Ok(Report::new(
                Level::Success,
                format!("Allocated {} MB of memory ({} pages)", size, pages_needed),
            ))
        }
    }

    /// Without a logical address space a process gets a contiguous run of frames and its virtual
    /// page numbers are the frame numbers. A free frame whose page number still has a page-table
    /// entry (a page swapped out to disk) stays unavailable until that page is gone.
    fn allocate_contiguous(
        &mut self,
        process_id: ProcessId,
        size: u64,
        pages_needed: usize,
    ) -> Result<Report> {
        let pages = &self.pages;
        let start = self
            .physical
            .find_contiguous_where(pages_needed, |frame| pages.lookup(frame as u64).is_none())
            .ok_or_else(|| {
                Error::CapacityExceeded(String::from(
                    "Failed to allocate memory: Not enough contiguous free space",
                ))
            })?;
        let vpns: Vec<u64> = (start..start + pages_needed).map(|vpn| vpn as u64).collect();
        self.physical.reserve(start, pages_needed, process_id, &vpns);
        for &vpn in &vpns {
            self.pages
                .insert(PageTableEntry::resident(vpn, vpn, process_id))?;
        }

        self.stats.occupy_frames(pages_needed as u64);
        self.stats.used_pages += pages_needed as u64;
        Ok(Report::new(
            Level::Success,
            format!("Allocated {} MB of memory ({} pages)", size, pages_needed),
        ))
    }

    fn deallocate(&mut self, process_id: ProcessId) -> Result<Report> {
        if !self.owns_anything(process_id) {
            return Err(Error::NotFound(format!(
                "No memory found for process {}",
                process_id
            )));
        }

        let frames = self.physical.release_by_process(process_id) as u64;
        let slots = self
            .logical
            .as_mut()
            .map_or(0, |pool| pool.release_by_process(process_id)) as u64;
        let swapped = self.disk.release_by_process(process_id) as u64;
        let removed = self.pages.remove_all_for_process(process_id);
        self.tlb.invalidate_process(process_id);
        removed.iter().for_each(|vpn| {
            self.tlb.invalidate_page(*vpn);
        });

        let pages = match self.logical {
            Some(_) => slots,
            None => frames + swapped,
        };
        self.stats.release_frames(frames);
        self.stats.release_swap(swapped, self.disk.block_size());
        self.stats.used_pages = self.stats.used_pages.saturating_sub(pages);

        Ok(Report::new(
            Level::Success,
            format!("Deallocated memory for process {}", process_id),
        ))
    }

    fn translate(&mut self, virtual_address: i64) -> Result<Report> {
        let address = VirtualAddress::decode(virtual_address, self.geometry.page_bytes())?;
        let vpn = address.number_page;
        let process_id = self.current_process;
        let resolved = |ppn: u64, tlb_hit: bool| Translation {
            address,
            ppn: Some(ppn),
            physical_address: Some(address.physical(ppn)),
            tlb_hit,
            page_fault: false,
        };
        let faulted = Translation {
            address,
            ppn: None,
            physical_address: None,
            tlb_hit: false,
            page_fault: true,
        };

        if let Some(ppn) = self.tlb.lookup(process_id, vpn) {
            self.stats.tlb_hits += 1;
            return Ok(Report::new(
                Level::Success,
                String::from("TLB hit! Address translated using TLB."),
            )
            .with_translation(resolved(ppn, true)));
        }

        self.stats.tlb_misses += 1;
        let (valid, on_disk, ppn) = match self.pages.lookup(vpn) {
            None => {
                self.pages.insert(PageTableEntry::untouched(vpn, process_id))?;
                self.stats.page_faults += 1;
                return Ok(Report::new(
                    Level::Warning,
                    format!("Page fault! Page {} has no page-table entry yet", vpn),
                )
                .with_translation(faulted));
            }
            Some(entry) => (entry.valid, entry.on_disk, entry.ppn),
        };

        match (valid, ppn) {
            (true, Some(ppn)) => {
                self.tlb.insert(process_id, vpn, ppn);
                self.pages.mark_referenced(vpn);
                Ok(Report::new(
                    Level::Info,
                    String::from("TLB miss! Address translated using page table."),
                )
                .with_translation(resolved(ppn, false)))
            }
            _ if on_disk => {
                self.stats.page_faults += 1;
                Ok(Report::new(
                    Level::Warning,
                    format!("Page fault! Page {} is on disk, swap-in scheduled", vpn),
                )
                .with_translation(faulted)
                .then(PAGE_FAULT_DELAY_MS, Operation::PageFault { page_number: vpn }))
            }
            _ => {
                self.stats.page_faults += 1;
                Ok(Report::new(
                    Level::Warning,
                    format!("Page fault! Page {} is not loaded", vpn),
                )
                .with_translation(faulted))
            }
        }
    }

    /// Protection is checked against the resident entry before translating, so a faulting
    /// access leaves the TLB and the counters alone.
    fn access(&mut self, virtual_address: i64, write: bool) -> Result<Report> {
        let address = VirtualAddress::decode(virtual_address, self.geometry.page_bytes())?;
        let vpn = address.number_page;
        let needed = if write {
            Protection::WRITE
        } else {
            Protection::READ
        };
        if let Some(entry) = self.pages.lookup(vpn) {
            if entry.valid && !entry.protection.contains(needed) {
                return Err(Error::ProtectionFault(format!(
                    "Protection fault! Page {} does not permit {}",
                    vpn,
                    if write { "writes" } else { "reads" }
                )));
            }
        }

        let report = self.translate(virtual_address)?;
        if report.translation.map_or(true, |translation| translation.page_fault) {
            return Ok(report);
        }
        if let Some(entry) = self.pages.lookup_mut(vpn) {
            entry.referenced = true;
            entry.dirty |= write;
        }

        Ok(report)
    }

    fn swap_in(&mut self, vpn: u64, policy: &mut dyn EvictionPolicy) -> Result<Report> {
        let block = self
            .disk
            .find_block_by_page(vpn)
            .ok_or_else(|| Error::NotFound(format!("Page {} not found on disk", vpn)))?;
        let entry = self
            .pages
            .lookup(vpn)
            .ok_or_else(|| Error::NotFound(format!("Page {} not found in page table", vpn)))?;
        if !entry.on_disk {
            return Err(Error::NotOnDisk(format!("Page {} is not on disk", vpn)));
        }
        let owner = entry.process_id.unwrap_or(self.current_process);

        let frame = match self.physical.find_free() {
            Some(frame) => frame,
            None => {
                let victim = policy
                    .select_victim(&self.pages.resident_pages())
                    .ok_or_else(|| {
                        Error::CapacityExceeded(String::from(
                            "Physical memory is full and no page can be evicted",
                        ))
                    })?;
                self.swap_out(victim)?;
                return Ok(Report::new(
                    Level::Info,
                    format!(
                        "Physical memory full, swapped out page {} to make room for page {}",
                        victim, vpn
                    ),
                )
                .then(SWAP_RETRY_DELAY_MS, Operation::SwapIn { page_number: vpn }));
            }
        };

        self.pages.mark_swapped_in(vpn, frame as u64)?;
        self.physical[frame].occupy(BlockKind::Allocated, owner, vpn);
        self.disk.release_block(block);
        self.stats.release_swap(1, self.disk.block_size());
        self.stats.occupy_frames(1);

        Ok(Report::new(
            Level::Success,
            format!("Swapped in page {}", vpn),
        ))
    }

    fn swap_out(&mut self, vpn: u64) -> Result<Report> {
        let entry = self
            .pages
            .lookup(vpn)
            .ok_or_else(|| Error::NotFound(format!("Page {} not found in page table", vpn)))?;
        if entry.on_disk {
            return Err(Error::NotResident(format!(
                "Page {} is already on disk",
                vpn
            )));
        }
        if !entry.valid {
            return Err(Error::NotResident(format!(
                "Page {} is not resident in memory",
                vpn
            )));
        }
        let owner = entry.process_id.unwrap_or(self.current_process);

        let block = self.disk.reserve_block(vpn, owner).ok_or_else(|| {
            Error::CapacityExceeded(String::from("No free disk space available for swap"))
        })?;
        let frame = self
            .pages
            .mark_swapped_out(vpn, self.disk.disk_address(block))?;
        self.physical.release_block(frame as usize);
        self.tlb.invalidate_page(vpn);
        self.stats.occupy_swap(1, self.disk.block_size());
        self.stats.release_frames(1);

        Ok(Report::new(Level::Info, format!("Swapped out page {}", vpn)))
    }

    fn switch_process(&mut self, process_id: ProcessId) -> Result<Report> {
        if process_id == 0 {
            return Err(Error::InvalidInput(String::from(
                "Process id must be a positive integer",
            )));
        }
        self.current_process = process_id;
        Ok(Report::new(
            Level::Info,
            format!("Current process is now {}", process_id),
        ))
    }

    fn set_protection(&mut self, vpn: u64, bits: u8) -> Result<Report> {
        let protection = Protection::from_bits(bits).ok_or_else(|| {
            Error::InvalidInput(format!("Protection bits {} are outside 0-7", bits))
        })?;
        let entry = self
            .pages
            .lookup_mut(vpn)
            .ok_or_else(|| Error::NotFound(format!("Page {} not found in page table", vpn)))?;
        entry.protection = protection;
        Ok(Report::new(
            Level::Success,
            format!("Page {} protection set to {:03b}", vpn, bits),
        ))
    }

    fn reset(&mut self) -> Result<Report> {
        let current_process = self.current_process;
        *self = SimulatorState::build(self.geometry.clone());
        self.current_process = current_process;
        Ok(Report::new(Level::Info, String::from("Memory state reset")))
    }
}

/// The `MemorySimulator` struct drives a `SimulatorState` with operations one at a time. Work an
/// operation defers (servicing a page fault, retrying a swap-in) is queued on a virtual
/// millisecond clock and only runs when the caller advances that clock, so two operations never
/// interleave.
pub struct MemorySimulator {
    state: SimulatorState,
    policy: Box<dyn EvictionPolicy>,
    deferred: VecDeque<Deferred>,
    clock: u64,
}

impl MemorySimulator {
    /// Create a new `MemorySimulator` partitioned according to `geometry`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidInput` if the geometry is inconsistent (see [`Geometry::validate`]).
    pub fn build(geometry: Geometry, policy: Box<dyn EvictionPolicy>) -> Result<Self> {
        geometry.validate()?;
        Ok(Self {
            state: SimulatorState::build(geometry),
            policy,
            deferred: VecDeque::new(),
            clock: 0,
        })
    }

    /// A simulator with the reference sizing and first-found eviction.
    pub fn with_defaults() -> Self {
        Self {
            state: SimulatorState::build(Geometry::default()),
            policy: Box::new(FirstFound),
            deferred: VecDeque::new(),
            clock: 0,
        }
    }

    /// Apply one operation. Failures leave the state untouched and are returned for display.
    pub fn perform(&mut self, operation: Operation) -> Result<Report> {
        let state = &mut self.state;
        let result = match &operation {
            Operation::Allocate { process_id, size } => state.allocate(*process_id, *size),
            Operation::Deallocate { process_id } => state.deallocate(*process_id),
            Operation::PageFault { page_number } | Operation::SwapIn { page_number } => {
                state.swap_in(*page_number, self.policy.as_mut())
            }
            Operation::SwapOut { page_number } => state.swap_out(*page_number),
            Operation::TranslateAddress { virtual_address } => state.translate(*virtual_address),
            Operation::AccessMemory {
                virtual_address,
                write,
            } => state.access(*virtual_address, *write),
            Operation::SwitchProcess { process_id } => state.switch_process(*process_id),
            Operation::SetProtection {
                page_number,
                protection,
            } => state.set_protection(*page_number, *protection),
            Operation::Reset => state.reset(),
        };

        match &result {
            Ok(report) => {
                info!("{}: {}", operation.name(), report.message);
                if let Some((delay, follow_up)) = &report.follow_up {
                    self.schedule(*delay, follow_up.clone());
                }
            }
            Err(err) => warn!("{}: {}", operation.name(), err),
        }
        result
    }

    fn schedule(&mut self, delay_ms: u64, operation: Operation) {
        let due = self.clock + delay_ms;
        debug!("deferred {} until t={}ms", operation.name(), due);
        let position = self
            .deferred
            .iter()
            .position(|task| task.due > due)
            .unwrap_or(self.deferred.len());
        self.deferred.insert(position, Deferred { due, operation });
    }

    /// Move the virtual clock forward by `ms`, running every deferred operation that comes due.
    pub fn advance(&mut self, ms: u64) -> Vec<Outcome> {
        let target = self.clock + ms;
        let mut outcomes = Vec::new();
        while self
            .deferred
            .front()
            .map_or(false, |task| task.due <= target)
        {
            if let Some(task) = self.deferred.pop_front() {
                self.clock = task.due;
                let result = self.perform(task.operation.clone());
                outcomes.push(Outcome {
                    operation: task.operation,
                    result,
                });
            }
        }
        self.clock = target;
        outcomes
    }

    /// Run deferred operations until none are left.
    pub fn drain(&mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::new();
        while let Some(due) = self.deferred.front().map(|task| task.due) {
            outcomes.extend(self.advance(due.saturating_sub(self.clock)));
        }
        outcomes
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn stats(&self) -> &Stats {
        &self.state.stats
    }

    pub fn geometry(&self) -> &Geometry {
        &self.state.geometry
    }

    pub fn current_process(&self) -> ProcessId {
        self.state.current_process
    }

    pub fn physical(&self) -> &MemoryPool {
        &self.state.physical
    }

    pub fn logical(&self) -> Option<&MemoryPool> {
        self.state.logical.as_ref()
    }

    pub fn disk(&self) -> &DiskSwapPool {
        &self.state.disk
    }

    pub fn page_table(&self) -> &PageTable {
        &self.state.pages
    }

    pub fn tlb(&self) -> &TranslationCache {
        &self.state.tlb
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = &self.state;
        Snapshot {
            blocks: state.physical.blocks().to_vec(),
            logical_blocks: state
                .logical
                .as_ref()
                .map_or_else(Vec::new, |pool| pool.blocks().to_vec()),
            disk_blocks: state.disk.blocks().to_vec(),
            page_table: state.pages.entries(),
            tlb: state.tlb.entries(),
            stats: state.stats,
            current_process_id: state.current_process,
        }
    }

    /// The updates a backend would push after an operation.
    pub fn messages(&self) -> Vec<BackendMessage> {
        let snapshot = self.snapshot();
        vec![
            BackendMessage::MemoryUpdate(snapshot.blocks),
            BackendMessage::StatsUpdate(snapshot.stats),
            BackendMessage::PageTable(snapshot.page_table),
            BackendMessage::TlbUpdate(snapshot.tlb),
        ]
    }
}

impl Default for MemorySimulator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
