//! In-process workspace.
//!
//! Regions are tracked with their labels and define what is mapped. Page buffers are only
//! allocated on first write; a mapped page that was never written reads as zeros.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use super::{LoadedModule, MappedRegion, Workspace};
use crate::error::{Error, Result};
use crate::image::Bitness;
use crate::utils::PAGE_SIZE;

pub struct MemoryWorkspace {
    bitness: Bitness,
    pages: BTreeMap<u64, Box<[u8]>>,
    regions: BTreeMap<u64, MappedRegion>,
    modules: BTreeMap<u64, LoadedModule>,
    /// Upper bound on mapped bytes, if any.
    capacity: Option<u64>,
    mapped: u64,
}

impl MemoryWorkspace {
    pub fn new(bitness: Bitness) -> Self {
        Self {
            bitness,
            pages: BTreeMap::new(),
            regions: BTreeMap::new(),
            modules: BTreeMap::new(),
            capacity: None,
            mapped: 0,
        }
    }

    /// Limits the total number of bytes that may be mapped at once.
    pub fn with_capacity(mut self, bytes: u64) -> Self {
        self.capacity = Some(bytes);
        self
    }

    /// Mapped regions in address order.
    pub fn regions(&self) -> impl Iterator<Item = &MappedRegion> {
        self.regions.values()
    }

    pub fn modules(&self) -> impl Iterator<Item = &LoadedModule> {
        self.modules.values()
    }

    pub fn module_by_name(&self, name: &str) -> Option<&LoadedModule> {
        self.modules
            .values()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn module_containing(&self, va: u64) -> Option<&LoadedModule> {
        self.modules
            .range(..=va)
            .next_back()
            .map(|(_, m)| m)
            .filter(|m| m.contains(va))
    }

    /// Number of page buffers backing written memory.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    fn region_at(&self, address: u64) -> Option<&MappedRegion> {
        self.regions
            .range(..=address)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.contains(address))
    }

    fn overlapping_region(&self, start: u64, end: u64) -> Option<&MappedRegion> {
        self.regions
            .range(..end)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.end() > start)
    }

    fn page_of(address: u64) -> (u64, usize) {
        let page = address & !(PAGE_SIZE - 1);
        (page, (address - page) as usize)
    }

    /// Visits `[address, address + length)` page by page. Fails before visiting anything if a
    /// byte of the range is unmapped.
    fn for_each_chunk<F>(&self, address: u64, length: u64, mut f: F) -> Result<()>
    where
        F: FnMut(u64, usize, usize),
    {
        let end = address
            .checked_add(length)
            .ok_or(Error::MemoryAccess { address, length })?;
        if self.mapped_len(address, length) < length {
            return Err(Error::MemoryAccess { address, length });
        }
        let mut cursor = address;
        while cursor < end {
            let (page, offset) = Self::page_of(cursor);
            let n = ((PAGE_SIZE as usize) - offset).min((end - cursor) as usize);
            f(page, offset, n);
            cursor += n as u64;
        }
        Ok(())
    }
}

impl Workspace for MemoryWorkspace {
    fn pointer_size(&self) -> usize {
        self.bitness.pointer_size()
    }

    fn map_memory(&mut self, start: u64, length: u64, label: &str) -> Result<()> {
        let fail = |reason: &str| Error::MemoryMap {
            address: start,
            length,
            reason: reason.to_string(),
        };

        if length == 0 {
            return Err(fail("empty mapping"));
        }
        if start % PAGE_SIZE != 0 || length % PAGE_SIZE != 0 {
            return Err(fail("not page aligned"));
        }
        let end = start
            .checked_add(length)
            .ok_or_else(|| fail("address overflow"))?;
        if self.bitness == Bitness::Bits32 && end > 1 << 32 {
            return Err(fail("beyond the 32-bit address space"));
        }
        if let Some(existing) = self.overlapping_region(start, end) {
            return Err(fail(&format!("overlaps {}", existing.label)));
        }
        if let Some(cap) = self.capacity {
            if self.mapped + length > cap {
                return Err(fail("workspace memory exhausted"));
            }
        }

        self.mapped += length;
        self.regions.insert(
            start,
            MappedRegion {
                start,
                length,
                label: label.to_string(),
            },
        );
        debug!("mapped {label} at 0x{start:x}-0x{end:x}");
        Ok(())
    }

    fn unmap_memory(&mut self, start: u64) -> Result<()> {
        let region = self.regions.remove(&start).ok_or(Error::MemoryMap {
            address: start,
            length: 0,
            reason: "no region starts here".to_string(),
        })?;
        let resident: Vec<u64> = self
            .pages
            .range(region.start..region.end())
            .map(|(&page, _)| page)
            .collect();
        for page in resident {
            self.pages.remove(&page);
        }
        self.mapped -= region.length;
        debug!("unmapped {} at 0x{:x}", region.label, region.start);
        Ok(())
    }

    fn read_memory(&self, address: u64, length: u64) -> Result<Vec<u8>> {
        trace!("read 0x{length:x} bytes at 0x{address:x}");
        if self.mapped_len(address, length) < length {
            return Err(Error::MemoryAccess { address, length });
        }
        let mut out = Vec::with_capacity(length as usize);
        self.for_each_chunk(address, length, |page, offset, n| {
            match self.pages.get(&page) {
                Some(buf) => out.extend_from_slice(&buf[offset..offset + n]),
                None => out.resize(out.len() + n, 0),
            }
        })?;
        Ok(out)
    }

    fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<()> {
        trace!("write 0x{:x} bytes at 0x{address:x}", data.len());
        let mut chunks = Vec::new();
        self.for_each_chunk(address, data.len() as u64, |page, offset, n| {
            chunks.push((page, offset, n));
        })?;

        let mut consumed = 0;
        for (page, offset, n) in chunks {
            let buf = self
                .pages
                .entry(page)
                .or_insert_with(|| vec![0u8; PAGE_SIZE as usize].into_boxed_slice());
            buf[offset..offset + n].copy_from_slice(&data[consumed..consumed + n]);
            consumed += n;
        }
        Ok(())
    }

    fn mapped_len(&self, address: u64, max: u64) -> u64 {
        let mut len = 0;
        while len < max {
            let Some(region) = address
                .checked_add(len)
                .and_then(|cursor| self.region_at(cursor))
            else {
                break;
            };
            len = region.end() - address;
        }
        len.min(max)
    }

    fn register_module(&mut self, module: LoadedModule) -> Result<()> {
        // An empty module still claims its base address.
        let end = module.end().max(module.base_address + 1);
        let clash = self.modules.values().any(|m| {
            module.base_address < m.end().max(m.base_address + 1) && m.base_address < end
        });
        if clash {
            return Err(Error::ModuleOverlap {
                name: module.name,
                base: module.base_address,
            });
        }
        debug!(
            "registered module {} at 0x{:x}-0x{:x}",
            module.name,
            module.base_address,
            module.end()
        );
        self.modules.insert(module.base_address, module);
        Ok(())
    }
}
