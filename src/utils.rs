//! Utility functions.

use std::fmt::Write;

/// Size of a workspace page.
pub const PAGE_SIZE: u64 = 0x1000;

/// Aligns an address or size up to the next multiple of `align`.
/// `align` must be a power of two.
pub fn align_up(addr: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (addr + align - 1) & !(align - 1)
}

/// Rounds `len` up to a whole number of pages, never less than one page.
pub fn page_span(len: u64) -> u64 {
    align_up(len, PAGE_SIZE).max(PAGE_SIZE)
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

/// Renders `buf` as a classic 16-bytes-per-line hex dump, addressed from `base`.
///
/// ```text
/// 00401000:  55 8b ec 83 ec 10 ...  U.......
/// ```
pub fn hexdump(buf: &[u8], base: u64) -> String {
    let mut out = String::new();
    for (i, line) in buf.chunks(0x10).enumerate() {
        let _ = write!(out, "{:08x}:  ", base + (i as u64) * 0x10);
        for b in line {
            let _ = write!(out, "{b:02x} ");
        }
        for _ in line.len()..0x10 {
            out.push_str("   ");
        }
        out.push(' ');
        out.extend(line.iter().map(|&b| printable(b)));
        out.push('\n');
    }
    out
}
