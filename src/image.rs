//! Parsed image metadata.
//!
//! The loader consumes an [`ImageHeader`]: image base, entry point, data directories
//! and the section table. [`ImageHeader::parse`] builds one from a PE file using the
//! `object` crate; tests and embedders can also construct it directly.

use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile, PeFile32, PeFile64};
use object::{FileKind, LittleEndian as LE};

use crate::error::{Error, Result};

/// Index of the import directory in the data directory table.
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
/// Index of the base relocation directory in the data directory table.
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
/// Maximum number of data directories in an optional header.
pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

/// Pointer width of the image's optional header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitness {
    Bits32,
    Bits64,
}

impl Bitness {
    pub fn pointer_size(self) -> usize {
        match self {
            Bitness::Bits32 => 4,
            Bitness::Bits64 => 8,
        }
    }
}

/// An (RVA, size) pair locating an auxiliary structure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    pub fn new(virtual_address: u32, size: u32) -> Self {
        Self {
            virtual_address,
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.virtual_address == 0 || self.size == 0
    }
}

/// One entry of the section table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    /// Section name with trailing NUL padding removed.
    pub name: String,
    /// RVA where the section is mapped.
    pub virtual_address: u32,
    pub virtual_size: u32,
    /// Offset of the raw bytes in the file.
    pub file_offset: u32,
    pub file_size: u32,
    /// `IMAGE_SCN_*` flags. Recorded for diagnostics, not enforced.
    pub characteristics: u32,
}

impl SectionDescriptor {
    /// Returns the section's raw bytes from the file buffer.
    pub fn raw_data<'d>(&self, file: &'d [u8]) -> Result<&'d [u8]> {
        if self.file_size == 0 {
            return Ok(&[]);
        }
        let start = self.file_offset as usize;
        start
            .checked_add(self.file_size as usize)
            .and_then(|end| file.get(start..end))
            .ok_or(Error::MemoryAccess {
                address: u64::from(self.file_offset),
                length: u64::from(self.file_size),
            })
    }
}

/// Header fields the loader needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHeader {
    pub bitness: Bitness,
    pub image_base: u64,
    pub entry_rva: u32,
    pub data_directories: Vec<DataDirectory>,
    pub sections: Vec<SectionDescriptor>,
}

impl ImageHeader {
    /// Parses the PE headers in `data`.
    ///
    /// PE32+ files parse successfully and report [`Bitness::Bits64`]; rejecting them is
    /// the loader's job. Anything that is not a PE is [`Error::UnsupportedFormat`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        match FileKind::parse(data)? {
            FileKind::Pe32 => Ok(Self::from_pe(&PeFile32::parse(data)?, Bitness::Bits32)),
            FileKind::Pe64 => Ok(Self::from_pe(&PeFile64::parse(data)?, Bitness::Bits64)),
            other => Err(Error::UnsupportedFormat(format!("{other:?}"))),
        }
    }

    fn from_pe<Pe: ImageNtHeaders>(pe: &PeFile<'_, Pe>, bitness: Bitness) -> Self {
        let optional = pe.nt_headers().optional_header();

        let data_directories = pe
            .data_directories()
            .iter()
            .take(IMAGE_NUMBEROF_DIRECTORY_ENTRIES)
            .map(|d| DataDirectory::new(d.virtual_address.get(LE), d.size.get(LE)))
            .collect();

        let sections = pe
            .section_table()
            .iter()
            .map(|s| {
                let raw = s.raw_name();
                let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                SectionDescriptor {
                    name: String::from_utf8_lossy(&raw[..len]).into_owned(),
                    virtual_address: s.virtual_address.get(LE),
                    virtual_size: s.virtual_size.get(LE),
                    file_offset: s.pointer_to_raw_data.get(LE),
                    file_size: s.size_of_raw_data.get(LE),
                    characteristics: s.characteristics.get(LE),
                }
            })
            .collect();

        Self {
            bitness,
            image_base: optional.image_base(),
            entry_rva: optional.address_of_entry_point(),
            data_directories,
            sections,
        }
    }

    pub fn data_directory(&self, index: usize) -> Option<DataDirectory> {
        self.data_directories.get(index).copied()
    }

    /// The import directory, or `None` when the image has none.
    pub fn import_directory(&self) -> Option<DataDirectory> {
        self.data_directory(IMAGE_DIRECTORY_ENTRY_IMPORT)
            .filter(|d| !d.is_empty())
    }
}
