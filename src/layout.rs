//! Section mapping.
//!
//! Computes the page-aligned virtual range of each section and copies the section's raw file
//! bytes into it. Section permissions are not applied: every mapping is plain read/write memory.

use tracing::{debug, trace};

use crate::error::Result;
use crate::image::SectionDescriptor;
use crate::utils::page_span;
use crate::workspace::{LoadedModule, MappedRegion, Workspace};

/// Where a section lands in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionLayout {
    /// VA of the first byte of the section.
    pub start: u64,
    /// Page-aligned mapping length, at least one page.
    pub length: u64,
    /// Number of raw file bytes copied to `start`. The rest of the mapping stays zero.
    pub copy_len: u64,
}

impl SectionLayout {
    pub fn new(module: &LoadedModule, section: &SectionDescriptor) -> Self {
        // A zero virtual size means "as large as the raw data".
        let span = match section.virtual_size {
            0 => section.file_size,
            n => n,
        };
        let length = page_span(u64::from(span));
        Self {
            start: module.va(u64::from(section.virtual_address)),
            length,
            copy_len: u64::from(section.file_size).min(length),
        }
    }
}

/// Maps one section of `file` into `ws` and records the region on `module`.
pub fn map_section<W: Workspace + ?Sized>(
    ws: &mut W,
    module: &mut LoadedModule,
    section: &SectionDescriptor,
    file: &[u8],
) -> Result<SectionLayout> {
    debug!(
        "section {}: rva 0x{:x} vsize 0x{:x} file 0x{:x}+0x{:x}",
        section.name,
        section.virtual_address,
        section.virtual_size,
        section.file_offset,
        section.file_size
    );
    trace!("section {} characteristics 0x{:08x}", section.name, section.characteristics);

    let layout = SectionLayout::new(module, section);
    let raw = section.raw_data(file)?;
    let label = format!("{}/{}", module.name, section.name);

    ws.map_memory(layout.start, layout.length, &label)?;
    module.regions.push(MappedRegion {
        start: layout.start,
        length: layout.length,
        label,
    });

    ws.write_memory(layout.start, &raw[..layout.copy_len as usize])?;
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::image::Bitness;
    use crate::utils::PAGE_SIZE;
    use crate::workspace::memory::MemoryWorkspace;

    fn text(virtual_size: u32, file_offset: u32, file_size: u32) -> SectionDescriptor {
        SectionDescriptor {
            name: ".text".into(),
            virtual_address: 0x1000,
            virtual_size,
            file_offset,
            file_size,
            characteristics: 0x6000_0020,
        }
    }

    fn module() -> LoadedModule {
        LoadedModule::new("app.exe", 0x400000, 0x401000)
    }

    #[test]
    fn layout_rounds_to_pages() {
        let m = module();
        assert_eq!(
            SectionLayout::new(&m, &text(0x10, 0, 0x10)),
            SectionLayout {
                start: 0x401000,
                length: PAGE_SIZE,
                copy_len: 0x10
            }
        );
        assert_eq!(SectionLayout::new(&m, &text(0x1001, 0, 0x200)).length, 0x2000);
        assert_eq!(SectionLayout::new(&m, &text(0, 0, 0)).length, PAGE_SIZE);
    }

    #[test]
    fn zero_virtual_size_uses_file_size() {
        let layout = SectionLayout::new(&module(), &text(0, 0, 0x1200));
        assert_eq!(layout.length, 0x2000);
        assert_eq!(layout.copy_len, 0x1200);
    }

    #[test]
    fn raw_data_is_clipped_to_mapping() {
        let layout = SectionLayout::new(&module(), &text(0x10, 0, 0x1800));
        assert_eq!(layout.length, PAGE_SIZE);
        assert_eq!(layout.copy_len, PAGE_SIZE);
    }

    #[test]
    fn maps_bytes_then_zeroes() {
        let mut ws = MemoryWorkspace::new(Bitness::Bits32);
        let mut m = module();
        let file: Vec<u8> = (1..=0x20).collect();

        let layout = map_section(&mut ws, &mut m, &text(0x10, 0x10, 0x10), &file).unwrap();

        assert_eq!(layout.start, 0x401000);
        let mem = ws.read_memory(0x401000, PAGE_SIZE).unwrap();
        assert_eq!(&mem[..0x10], &file[0x10..0x20]);
        assert!(mem[0x10..].iter().all(|&b| b == 0));

        assert_eq!(m.regions.len(), 1);
        assert_eq!(m.regions[0].label, "app.exe/.text");
        assert_eq!(ws.regions().next().map(|r| r.label.as_str()), Some("app.exe/.text"));
    }

    #[test]
    fn truncated_file_fails_before_mapping() {
        let mut ws = MemoryWorkspace::new(Bitness::Bits32);
        let mut m = module();
        let err = map_section(&mut ws, &mut m, &text(0x10, 0x10, 0x100), &[0u8; 0x20]).unwrap_err();
        assert!(matches!(err, Error::MemoryAccess { .. }));
        assert_eq!(ws.regions().count(), 0);
        assert!(m.regions.is_empty());
    }

    #[test]
    fn overlapping_sections_fail() {
        let mut ws = MemoryWorkspace::new(Bitness::Bits32);
        let mut m = module();
        map_section(&mut ws, &mut m, &text(0x1800, 0, 0), &[]).unwrap();
        let mut second = text(0x10, 0, 0);
        second.virtual_address = 0x2000;
        assert!(matches!(
            map_section(&mut ws, &mut m, &second, &[]),
            Err(Error::MemoryMap { .. })
        ));
        assert_eq!(m.regions.len(), 1);
    }
}
