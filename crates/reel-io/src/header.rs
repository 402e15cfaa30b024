//! Fixed-offset header fields shared by the DPX and Cineon codecs.
//!
//! Both formats store a 2048-byte header of packed C structs in either byte
//! order. Unset fields are filled with all-ones bytes (or a format-specific
//! sentinel), so every accessor has a matching validity check.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use reel_core::Tags;
use tracing::warn;

/// Endian-aware view over header bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields<'a> {
    buf: &'a [u8],
    big_endian: bool,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(buf: &'a [u8], big_endian: bool) -> Self {
        Self { buf, big_endian }
    }

    pub(crate) fn u8(&self, off: usize) -> u8 {
        self.buf[off]
    }

    pub(crate) fn u16(&self, off: usize) -> u16 {
        let b = &self.buf[off..off + 2];
        if self.big_endian {
            BigEndian::read_u16(b)
        } else {
            LittleEndian::read_u16(b)
        }
    }

    pub(crate) fn u32(&self, off: usize) -> u32 {
        let b = &self.buf[off..off + 4];
        if self.big_endian {
            BigEndian::read_u32(b)
        } else {
            LittleEndian::read_u32(b)
        }
    }

    pub(crate) fn i32(&self, off: usize) -> i32 {
        self.u32(off) as i32
    }

    pub(crate) fn f32(&self, off: usize) -> f32 {
        f32::from_bits(self.u32(off))
    }

    /// Fixed-width string up to the first NUL, `None` when unset.
    pub(crate) fn text(&self, off: usize, len: usize) -> Option<String> {
        let raw = &self.buf[off..off + len];
        if !valid_text(raw) {
            return None;
        }
        let end = raw.iter().position(|&c| c == 0).unwrap_or(len);
        Some(String::from_utf8_lossy(&raw[..end]).trim_end().to_string())
    }
}

// === Writers ===

pub(crate) fn write_u16_at(buf: &mut [u8], offset: usize, value: u16, big_endian: bool) {
    let b = &mut buf[offset..offset + 2];
    if big_endian {
        BigEndian::write_u16(b, value);
    } else {
        LittleEndian::write_u16(b, value);
    }
}

pub(crate) fn write_u32_at(buf: &mut [u8], offset: usize, value: u32, big_endian: bool) {
    let b = &mut buf[offset..offset + 4];
    if big_endian {
        BigEndian::write_u32(b, value);
    } else {
        LittleEndian::write_u32(b, value);
    }
}

pub(crate) fn write_f32_at(buf: &mut [u8], offset: usize, value: f32, big_endian: bool) {
    write_u32_at(buf, offset, value.to_bits(), big_endian);
}

/// Copies `value` into a NUL-padded field, truncating to leave one NUL.
pub(crate) fn write_text_at(buf: &mut [u8], offset: usize, len: usize, value: &str) {
    let field = &mut buf[offset..offset + len];
    field.fill(0);
    let n = value.len().min(len.saturating_sub(1));
    field[..n].copy_from_slice(&value.as_bytes()[..n]);
}

// === Validity ===

pub(crate) fn valid_u8(v: u8) -> bool {
    v != 0xff
}

pub(crate) fn valid_u16(v: u16) -> bool {
    v != 0xffff
}

pub(crate) fn valid_u32(v: u32) -> bool {
    v != 0xffff_ffff && v < 1_000_000
}

/// Rejects the Cineon "unset" sentinel.
pub(crate) fn valid_i32(v: i32) -> bool {
    v as u32 != 0x8000_0000 && v.unsigned_abs() < 1_000_000
}

/// Rejects NaN, infinities (both formats' sentinels) and absurd magnitudes.
pub(crate) fn valid_f32(v: f32) -> bool {
    v.abs() < 1_000_000.0
}

/// Printable ASCII up to the first NUL, and not empty.
pub(crate) fn valid_text(raw: &[u8]) -> bool {
    match raw.first() {
        None | Some(0) | Some(0xff) => false,
        _ => raw
            .iter()
            .take_while(|&&c| c != 0)
            .all(|&c| (32..=126).contains(&c)),
    }
}

// === Tag tables ===

/// Storage of one tagged header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    /// NUL-padded string of the given width.
    Text(usize, usize),
    U8(usize),
    U32(usize),
    U32Pair(usize),
    I32Pair(usize),
    U16Quad(usize),
    F32(usize),
    F32Pair(usize),
}

impl Field {
    /// Renders the field as a tag value, `None` when any part is unset.
    pub(crate) fn read(&self, f: &Fields<'_>) -> Option<String> {
        match *self {
            Self::Text(off, len) => f.text(off, len),
            Self::U8(off) => valid_u8(f.u8(off)).then(|| f.u8(off).to_string()),
            Self::U32(off) => valid_u32(f.u32(off)).then(|| f.u32(off).to_string()),
            Self::U32Pair(off) => {
                let (a, b) = (f.u32(off), f.u32(off + 4));
                (valid_u32(a) && valid_u32(b)).then(|| format!("{a} {b}"))
            }
            Self::I32Pair(off) => {
                let (a, b) = (f.i32(off), f.i32(off + 4));
                (valid_i32(a) && valid_i32(b)).then(|| format!("{a} {b}"))
            }
            Self::U16Quad(off) => {
                let v: Vec<u16> = (0..4).map(|i| f.u16(off + i * 2)).collect();
                v.iter().all(|&x| valid_u16(x)).then(|| {
                    format!("{} {} {} {}", v[0], v[1], v[2], v[3])
                })
            }
            Self::F32(off) => valid_f32(f.f32(off)).then(|| f.f32(off).to_string()),
            Self::F32Pair(off) => {
                let (a, b) = (f.f32(off), f.f32(off + 4));
                (valid_f32(a) && valid_f32(b)).then(|| format!("{a} {b}"))
            }
        }
    }

    /// Stores a tag value, returning `false` if it does not parse.
    pub(crate) fn write(&self, buf: &mut [u8], value: &str, big_endian: bool) -> bool {
        let mut parts = value.split_whitespace();
        match *self {
            Self::Text(off, len) => {
                write_text_at(buf, off, len, value);
                true
            }
            Self::U8(off) => match value.trim().parse::<u8>() {
                Ok(v) => {
                    buf[off] = v;
                    true
                }
                Err(_) => false,
            },
            Self::U32(off) => match value.trim().parse::<u32>() {
                Ok(v) => {
                    write_u32_at(buf, off, v, big_endian);
                    true
                }
                Err(_) => false,
            },
            Self::U32Pair(off) => match parse_n::<u32, 2>(&mut parts) {
                Some([a, b]) => {
                    write_u32_at(buf, off, a, big_endian);
                    write_u32_at(buf, off + 4, b, big_endian);
                    true
                }
                None => false,
            },
            Self::I32Pair(off) => match parse_n::<i32, 2>(&mut parts) {
                Some([a, b]) => {
                    write_u32_at(buf, off, a as u32, big_endian);
                    write_u32_at(buf, off + 4, b as u32, big_endian);
                    true
                }
                None => false,
            },
            Self::U16Quad(off) => match parse_n::<u16, 4>(&mut parts) {
                Some(v) => {
                    for (i, x) in v.into_iter().enumerate() {
                        write_u16_at(buf, off + i * 2, x, big_endian);
                    }
                    true
                }
                None => false,
            },
            Self::F32(off) => match value.trim().parse::<f32>() {
                Ok(v) => {
                    write_f32_at(buf, off, v, big_endian);
                    true
                }
                Err(_) => false,
            },
            Self::F32Pair(off) => match parse_n::<f32, 2>(&mut parts) {
                Some([a, b]) => {
                    write_f32_at(buf, off, a, big_endian);
                    write_f32_at(buf, off + 4, b, big_endian);
                    true
                }
                None => false,
            },
        }
    }
}

fn parse_n<'a, T: std::str::FromStr + Copy + Default, const N: usize>(
    parts: &mut impl Iterator<Item = &'a str>,
) -> Option<[T; N]> {
    let mut out = [T::default(); N];
    for slot in out.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    parts.next().is_none().then_some(out)
}

/// Collects every set field of `table` into `tags`.
pub(crate) fn read_tags(f: &Fields<'_>, table: &[(&str, Field)], tags: &mut Tags) {
    for (name, field) in table {
        if let Some(value) = field.read(f) {
            tags.set(*name, value);
        }
    }
}

/// Writes every tag of `table` present in `tags`.
pub(crate) fn write_tags(buf: &mut [u8], table: &[(&str, Field)], tags: &Tags, big_endian: bool) {
    for (name, field) in table {
        if let Some(value) = tags.get(name) {
            if !field.write(buf, value, big_endian) {
                warn!(tag = *name, value, "ignoring malformed tag");
            }
        }
    }
}

/// Fixed-width digit field without terminator, as used by keycodes.
pub(crate) fn digits(f: &Fields<'_>, off: usize, len: usize) -> Option<i32> {
    let raw = &f.buf[off..off + len];
    if !valid_text(raw) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.trim_matches(char::from(0)).trim().parse().ok()
}

/// Writes `value` zero-padded into a fixed-width digit field.
pub(crate) fn write_digits_at(buf: &mut [u8], off: usize, len: usize, value: i32) -> bool {
    let s = format!("{value:0len$}");
    if s.len() != len {
        return false;
    }
    buf[off..off + len].copy_from_slice(s.as_bytes());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_both_orders() {
        let mut buf = vec![0u8; 16];
        write_u32_at(&mut buf, 0, 0x0102_0304, true);
        write_u16_at(&mut buf, 4, 0x0506, false);
        write_f32_at(&mut buf, 8, 23.976, true);
        assert_eq!(&buf[..4], &[1, 2, 3, 4]);
        assert_eq!(&buf[4..6], &[6, 5]);

        let be = Fields::new(&buf, true);
        let le = Fields::new(&buf, false);
        assert_eq!(be.u32(0), 0x0102_0304);
        assert_eq!(le.u16(4), 0x0506);
        assert_eq!(be.f32(8), 23.976);
    }

    #[test]
    fn test_text() {
        let mut buf = vec![0xffu8; 12];
        assert_eq!(Fields::new(&buf, true).text(0, 12), None);
        write_text_at(&mut buf, 0, 8, "reel-writer");
        assert_eq!(&buf[..8], b"reel-wr\0");
        assert_eq!(Fields::new(&buf, true).text(0, 8).as_deref(), Some("reel-wr"));
        buf[0] = 0x07;
        assert_eq!(Fields::new(&buf, true).text(0, 8), None);
    }

    #[test]
    fn test_validity() {
        assert!(!valid_u8(0xff));
        assert!(!valid_u16(0xffff));
        assert!(!valid_u32(0xffff_ffff));
        assert!(valid_u32(86400));
        assert!(!valid_i32(i32::MIN));
        assert!(!valid_f32(f32::from_bits(0xffff_ffff)));
        assert!(!valid_f32(f32::from_bits(0x7f80_0000)));
        assert!(valid_f32(24.0));
    }

    #[test]
    fn test_tag_table() {
        const TABLE: &[(&str, Field)] = &[
            ("Name", Field::Text(0, 16)),
            ("Pair", Field::U32Pair(16)),
            ("Rate", Field::F32(24)),
            ("Unset", Field::U32(28)),
        ];
        let mut buf = vec![0xffu8; 32];
        let mut tags = Tags::new();
        tags.set("Name", "shot_010");
        tags.set("Pair", "640 480");
        tags.set("Rate", "not a number");
        write_tags(&mut buf, TABLE, &tags, false);

        let mut back = Tags::new();
        read_tags(&Fields::new(&buf, false), TABLE, &mut back);
        assert_eq!(back.get("Name"), Some("shot_010"));
        assert_eq!(back.get("Pair"), Some("640 480"));
        assert!(!back.contains("Rate"));
        assert!(!back.contains("Unset"));
    }

    #[test]
    fn test_digits() {
        let mut buf = vec![0xffu8; 8];
        assert!(write_digits_at(&mut buf, 0, 6, 1234));
        assert_eq!(&buf[..6], b"001234");
        assert!(!write_digits_at(&mut buf, 6, 2, 123));
        assert_eq!(digits(&Fields::new(&buf, true), 0, 6), Some(1234));
        assert_eq!(digits(&Fields::new(&buf, true), 6, 2), None);
    }
}
