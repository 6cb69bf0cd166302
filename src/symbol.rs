//! Import identities.
//!
//! A thunk-table word is decoded into a [`ThunkEntry`]; once the name structure it points at
//! has been read, the entry becomes an [`ImportedSymbol`] recorded in an [`Import`].

use std::fmt;

/// Bit 31 of a 32-bit thunk marks an import by ordinal.
pub const IMAGE_ORDINAL_FLAG32: u32 = 0x8000_0000;

/// One raw slot of a 32-bit thunk table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThunkEntry {
    Ordinal(u32),
    /// RVA of an `IMAGE_IMPORT_BY_NAME` structure.
    NameImport(u32),
}

impl ThunkEntry {
    /// Classifies a raw thunk value. Zero terminates the table and yields `None`.
    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => None,
            v if v & IMAGE_ORDINAL_FLAG32 != 0 => {
                Some(ThunkEntry::Ordinal(v & !IMAGE_ORDINAL_FLAG32))
            }
            v => Some(ThunkEntry::NameImport(v)),
        }
    }
}

/// What an import refers to within its module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportedSymbol {
    Ordinal(u32),
    /// `hint` is the exporter's likely ordinal for `name`, informational only.
    Name { name: String, hint: u16 },
}

impl fmt::Display for ImportedSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportedSymbol::Ordinal(ordinal) => write!(f, "#{ordinal}"),
            ImportedSymbol::Name { name, .. } => f.write_str(name),
        }
    }
}

/// A resolved import of a loaded module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Name of the module that exports the symbol, e.g. `KERNEL32.dll`.
    pub module: String,
    pub symbol: ImportedSymbol,
    /// VA of the thunk slot this import occupies.
    pub slot: u64,
    /// VA of the call-stub written for this import, when hooks are installed.
    pub stub: Option<u64>,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.module, self.symbol)
    }
}
