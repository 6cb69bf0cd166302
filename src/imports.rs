//! Import directory walking.
//!
//! The import directory is an array of 20-byte `IMAGE_IMPORT_DESCRIPTOR` records read from the
//! already mapped image. The array ends at the first record whose original-thunk RVA is zero and
//! must end inside the directory's declared size.

use object::{pe, pod, LittleEndian as LE};
use tracing::{debug, trace};

use crate::error::{malformed_error, Error, Result};
use crate::image::DataDirectory;
use crate::strings::decode_ascii;
use crate::symbol::Import;
use crate::thunk::resolve_thunk_table;
use crate::workspace::{LoadedModule, Workspace};

pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;

/// One `IMAGE_IMPORT_DESCRIPTOR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportDescriptor {
    /// RVA of the import lookup table. Zero marks the end of the directory.
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    /// RVA of the exporting module's NUL-terminated name.
    pub name: u32,
    /// RVA of the import address table, the slots patched at load time.
    pub first_thunk: u32,
}

impl ImportDescriptor {
    /// Decodes a record from the first 20 bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let (raw, _) = pod::from_bytes::<pe::ImageImportDescriptor>(buf).ok()?;
        Some(Self {
            original_first_thunk: raw.original_first_thunk.get(LE),
            time_date_stamp: raw.time_date_stamp.get(LE),
            forwarder_chain: raw.forwarder_chain.get(LE),
            name: raw.name.get(LE),
            first_thunk: raw.first_thunk.get(LE),
        })
    }

    pub fn is_terminator(&self) -> bool {
        self.original_first_thunk == 0
    }
}

/// The imports taken from one exporting module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedModule {
    pub name: String,
    pub imports: Vec<Import>,
}

/// Reads a NUL-terminated ASCII name at `address`, scanning at most `max_len` bytes.
///
/// The window shrinks to the mapped bytes available, so a short name near the end of a region
/// still decodes.
pub(crate) fn read_name<W: Workspace + ?Sized>(
    ws: &W,
    address: u64,
    max_len: usize,
) -> Result<String> {
    let available = ws.mapped_len(address, max_len as u64);
    if available == 0 {
        return Err(Error::MemoryAccess {
            address,
            length: max_len as u64,
        });
    }
    decode_ascii(&ws.read_memory(address, available)?)
}

/// Walks the import directory of `module` and resolves every descriptor's thunk table.
pub fn walk_import_directory<W: Workspace + ?Sized>(
    ws: &W,
    module: &LoadedModule,
    directory: DataDirectory,
    max_name_len: usize,
) -> Result<Vec<ImportedModule>> {
    let start = module.va(u64::from(directory.virtual_address));
    debug!("import directory at 0x{start:x} size 0x{:x}", directory.size);

    let size = u64::from(directory.size);
    let mut modules = Vec::new();

    // One descriptor per read, `size` comes straight from the image.
    let offsets = (0..size).step_by(IMPORT_DESCRIPTOR_SIZE);
    for (index, offset) in offsets.enumerate() {
        let address = start + offset;
        let chunk = (size - offset).min(IMPORT_DESCRIPTOR_SIZE as u64);
        let record = ws.read_memory(address, chunk)?;
        let descriptor = ImportDescriptor::parse(&record).ok_or_else(|| {
            malformed_error!(
                "import descriptor {} at 0x{:x} extends past the directory size 0x{:x}",
                index,
                address,
                directory.size
            )
        })?;
        trace!("import descriptor {index}: {descriptor:x?}");

        if descriptor.is_terminator() {
            return Ok(modules);
        }

        let name = read_name(ws, module.va(u64::from(descriptor.name)), max_name_len)?;
        debug!("import module {name}: thunks at rva 0x{:x}", descriptor.first_thunk);

        let imports =
            resolve_thunk_table(ws, module, &name, descriptor.first_thunk, max_name_len)?;
        modules.push(ImportedModule { name, imports });
    }

    Err(malformed_error!(
        "import directory at 0x{:x} is not terminated within 0x{:x} bytes",
        start,
        directory.size
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::Bitness;
    use crate::symbol::ImportedSymbol;
    use crate::workspace::memory::MemoryWorkspace;

    const BASE: u64 = 0x400000;

    fn descriptor_bytes(original_first_thunk: u32, name: u32, first_thunk: u32) -> Vec<u8> {
        [original_first_thunk, 0, 0, name, first_thunk]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect()
    }

    /// One mapped page at RVA 0x1000 holding two modules with one ordinal import each.
    fn setup() -> (MemoryWorkspace, LoadedModule) {
        let mut ws = MemoryWorkspace::new(Bitness::Bits32);
        ws.map_memory(BASE + 0x1000, 0x1000, "app.exe/.idata").unwrap();

        let mut dir = descriptor_bytes(0x1100, 0x1200, 0x1100);
        dir.extend(descriptor_bytes(0x1110, 0x1210, 0x1110));
        dir.extend(descriptor_bytes(0, 0, 0));
        ws.write_memory(BASE + 0x1000, &dir).unwrap();

        ws.write_memory(BASE + 0x1100, &0x8000_0001u32.to_le_bytes()).unwrap();
        ws.write_memory(BASE + 0x1110, &0x8000_0002u32.to_le_bytes()).unwrap();
        ws.write_memory(BASE + 0x1200, b"KERNEL32.dll\0").unwrap();
        ws.write_memory(BASE + 0x1210, b"USER32.dll\0").unwrap();

        (ws, LoadedModule::new("app.exe", BASE, BASE + 0x1000))
    }

    fn walk(
        ws: &MemoryWorkspace,
        module: &LoadedModule,
        rva: u32,
        size: u32,
        max_name_len: usize,
    ) -> Result<Vec<ImportedModule>> {
        walk_import_directory(ws, module, DataDirectory::new(rva, size), max_name_len)
    }

    #[test]
    fn parse_descriptor_fields() {
        let mut raw = descriptor_bytes(0x2010, 0x2100, 0x2200);
        raw[4..8].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let d = ImportDescriptor::parse(&raw).unwrap();
        assert_eq!(d.original_first_thunk, 0x2010);
        assert_eq!(d.time_date_stamp, 0xFFFF_FFFF);
        assert_eq!(d.forwarder_chain, 0);
        assert_eq!(d.name, 0x2100);
        assert_eq!(d.first_thunk, 0x2200);
        assert!(!d.is_terminator());
        assert!(ImportDescriptor::parse(&raw[..19]).is_none());
    }

    #[test]
    fn walks_until_terminator() {
        let (ws, module) = setup();
        let modules = walk(&ws, &module, 0x1000, 60, 0x100).unwrap();

        let names: Vec<_> = modules.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["KERNEL32.dll", "USER32.dll"]);
        assert_eq!(modules[1].imports[0].symbol, ImportedSymbol::Ordinal(2));
        assert_eq!(modules[1].imports[0].module, "USER32.dll");
        assert_eq!(modules[1].imports[0].slot, BASE + 0x1110);
    }

    #[test]
    fn oversized_directory_stops_at_terminator() {
        let (ws, module) = setup();
        let modules = walk(&ws, &module, 0x1000, 0x100, 0x100).unwrap();
        assert_eq!(modules.len(), 2);
    }

    #[test]
    fn leading_terminator_yields_nothing() {
        let (ws, module) = setup();
        let modules = walk(&ws, &module, 0x1800, 20, 0x100).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn missing_terminator_is_malformed() {
        let (ws, module) = setup();
        let err = walk(&ws, &module, 0x1000, 40, 0x100).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { .. }));

        let err = walk(&ws, &module, 0x1000, 50, 0x100).unwrap_err();
        assert!(matches!(err, Error::MalformedTable { .. }));
    }

    #[test]
    fn unmapped_directory_is_access_error() {
        let (ws, module) = setup();
        let err = walk(&ws, &module, 0x1ff0, 0x28, 0x100).unwrap_err();
        assert!(matches!(err, Error::MemoryAccess { .. }));
    }

    #[test]
    fn huge_directory_size_is_walked_lazily() {
        let (mut ws, module) = setup();
        let modules = walk(&ws, &module, 0x1000, 0xFFFF_FFF0, 0x100).unwrap();
        assert_eq!(modules.len(), 2);

        // Live descriptors up to the end of the page, the last one cut by the mapping.
        let live = descriptor_bytes(0x1110, 0x1210, 0x1110);
        let tail: Vec<u8> = live.iter().copied().cycle().take(0x800).collect();
        ws.write_memory(BASE + 0x1800, &tail).unwrap();
        let err = walk(&ws, &module, 0x1800, 0xFFFF_FFF0, 0x100).unwrap_err();
        assert!(matches!(
            err,
            Error::MemoryAccess { address, length: 20 } if address == BASE + 0x1ff8
        ));
    }

    #[test]
    fn long_module_name_is_truncation() {
        let (mut ws, module) = setup();
        ws.write_memory(BASE + 0x1200, &[b'A'; 0x20]).unwrap();
        let err = walk(&ws, &module, 0x1000, 60, 0x10).unwrap_err();
        assert!(matches!(err, Error::DecodeTruncated { limit: 0x10 }));
    }

    #[test]
    fn read_name_clips_to_mapping() {
        let (mut ws, _) = setup();
        ws.write_memory(BASE + 0x1ffa, b"a.dll\0").unwrap();
        assert_eq!(read_name(&ws, BASE + 0x1ffa, 0x100).unwrap(), "a.dll");

        ws.write_memory(BASE + 0x1ffa, b"a.dlls").unwrap();
        assert!(matches!(
            read_name(&ws, BASE + 0x1ffa, 0x100),
            Err(Error::DecodeTruncated { limit: 6 })
        ));
        assert!(matches!(
            read_name(&ws, BASE + 0x5000, 0x100),
            Err(Error::MemoryAccess { .. })
        ));
    }
}
