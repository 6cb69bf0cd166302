//! Builders for in-memory test images.
#![allow(dead_code)]

pub const IMAGE_BASE: u64 = 0x400000;
pub const TEXT_RVA: u32 = 0x1000;

/// The first 16 bytes of `.text`.
pub const CODE: [u8; 16] = [
    0x55, 0x8B, 0xEC, 0x6A, 0x00, 0xFF, 0x15, 0x90, 0x10, 0x40, 0x00, 0x5D, 0xC3, 0xCC, 0xCC, 0xCC,
];

/// Offsets inside `.text` of the import structures written by [`text_section`].
pub const IMPORT_DIRECTORY: u32 = 0x40;
pub const IMPORT_DIRECTORY_SIZE: u32 = 40;
pub const IAT: u32 = 0x90;

pub fn put16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub fn put32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub fn put64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Raw bytes of a 0x200-byte `.text` section mapped at [`TEXT_RVA`]:
///
/// ```text
/// 0x000  CODE
/// 0x040  import descriptor KERNEL32.dll, then a zero descriptor
/// 0x080  import lookup table  [0x10A0, 0]
/// 0x090  import address table [0x10A0, 0]
/// 0x0A0  hint 0, "ExitProcess"
/// 0x0C0  "KERNEL32.dll"
/// ```
pub fn text_section() -> Vec<u8> {
    let mut s = vec![0u8; 0x200];
    s[..16].copy_from_slice(&CODE);

    let d = IMPORT_DIRECTORY as usize;
    put32(&mut s, d, TEXT_RVA + 0x80);
    put32(&mut s, d + 12, TEXT_RVA + 0xC0);
    put32(&mut s, d + 16, TEXT_RVA + IAT);

    put32(&mut s, 0x80, TEXT_RVA + 0xA0);
    put32(&mut s, IAT as usize, TEXT_RVA + 0xA0);

    put16(&mut s, 0xA0, 0);
    s[0xA2..0xA2 + 12].copy_from_slice(b"ExitProcess\0");
    s[0xC0..0xC0 + 13].copy_from_slice(b"KERNEL32.dll\0");
    s
}
