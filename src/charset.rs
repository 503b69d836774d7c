//! Character set support: canonical names, built-in codecs, and the
//! charset preference order used during flavor negotiation.
//!
//! No external encoding crate is used. The supported set is the handful of
//! charsets that actually occur in clipboard traffic: the Unicode family,
//! US-ASCII, ISO-8859-1 and windows-1252.

use std::cmp::Ordering;

use crate::error::{TransferError, TransferResult};

/// The charset assumed when a text format declares none.
///
/// In-memory text is UTF-8, so UTF-8 is the platform default here.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Returns the platform default charset name.
pub fn default_charset() -> &'static str {
    DEFAULT_CHARSET
}

// =============================================================================
// Codec identification
// =============================================================================

/// Identifies one of the built-in codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Codec {
    Utf8,
    Utf16,
    Utf16Le,
    Utf16Be,
    UsAscii,
    Iso8859_1,
    Windows1252,
}

impl Codec {
    pub(crate) fn canonical_name(self) -> &'static str {
        match self {
            Codec::Utf8 => "UTF-8",
            Codec::Utf16 => "UTF-16",
            Codec::Utf16Le => "UTF-16LE",
            Codec::Utf16Be => "UTF-16BE",
            Codec::UsAscii => "US-ASCII",
            Codec::Iso8859_1 => "ISO-8859-1",
            Codec::Windows1252 => "windows-1252",
        }
    }
}

/// Resolves a charset name (or alias) to a built-in codec.
pub(crate) fn codec_for(name: &str) -> Option<Codec> {
    let lower = name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "utf-8" | "utf8" | "unicode-1-1-utf-8" => Some(Codec::Utf8),
        "utf-16" | "utf16" | "unicode" | "iso-10646-ucs-2" => Some(Codec::Utf16),
        "utf-16le" | "utf16le" | "unicodelittle" | "x-utf-16le" => Some(Codec::Utf16Le),
        "utf-16be" | "utf16be" | "unicodebig" | "x-utf-16be" => Some(Codec::Utf16Be),
        "us-ascii" | "ascii" | "ansi_x3.4-1968" | "iso646-us" | "646" => Some(Codec::UsAscii),
        "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" | "8859_1" => {
            Some(Codec::Iso8859_1)
        }
        "windows-1252" | "cp1252" | "x-cp1252" => Some(Codec::Windows1252),
        _ => None,
    }
}

/// Returns true if the charset name (or one of its aliases) is supported.
pub fn is_supported(name: &str) -> bool {
    codec_for(name).is_some()
}

/// Like [`codec_for`], but unsupported names become an error.
pub(crate) fn resolve(name: &str) -> TransferResult<Codec> {
    codec_for(name).ok_or_else(|| TransferError::UnsupportedEncoding(name.into()))
}

/// Resolves aliases to the canonical charset name.
///
/// Unknown names are returned unchanged so that two occurrences of the same
/// unsupported charset still compare equal during ranking.
pub fn canonical_name(name: &str) -> String {
    match codec_for(name) {
        Some(codec) => codec.canonical_name().to_string(),
        None => name.trim().to_string(),
    }
}

// =============================================================================
// Encoding and decoding
// =============================================================================

// windows-1252 maps bytes 0x80..0xA0 onto these characters. Unmapped slots
// (0x81, 0x8D, 0x8F, 0x90, 0x9D) decode to '?'.
const CP1252_HIGH: [char; 32] = [
    '\u{20AC}', '?', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '?', '\u{017D}', '?',
    '?', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '?', '\u{017E}', '\u{0178}',
];

fn cp1252_encode_char(c: char) -> u8 {
    let code = c as u32;
    if code < 0x80 || (0xA0..=0xFF).contains(&code) {
        return code as u8;
    }
    match CP1252_HIGH.iter().position(|&m| m == c && m != '?') {
        Some(idx) => 0x80 + idx as u8,
        None => b'?',
    }
}

pub(crate) fn cp1252_decode_byte(b: u8) -> char {
    match b {
        0x80..=0x9F => CP1252_HIGH[(b - 0x80) as usize],
        // Remaining ranges coincide with ISO-8859-1
        _ => b as char,
    }
}

/// Appends the encoded form of one character.
///
/// Characters not representable in a narrow charset are substituted with '?'.
pub(crate) fn encode_char(c: char, codec: Codec, out: &mut Vec<u8>) {
    match codec {
        Codec::Utf8 => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        Codec::Utf16 | Codec::Utf16Be => {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                out.extend_from_slice(&unit.to_be_bytes());
            }
        }
        Codec::Utf16Le => {
            let mut buf = [0u16; 2];
            for unit in c.encode_utf16(&mut buf) {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        Codec::UsAscii => out.push(if (c as u32) < 0x80 { c as u8 } else { b'?' }),
        Codec::Iso8859_1 => out.push(if (c as u32) < 0x100 { c as u8 } else { b'?' }),
        Codec::Windows1252 => out.push(cp1252_encode_char(c)),
    }
}

/// Encodes a string with the named charset.
///
/// UTF-16 (without byte-order suffix) writes a big-endian BOM first, the way
/// standard encoders for that name do.
pub fn encode(text: &str, charset: &str) -> TransferResult<Vec<u8>> {
    let codec =
        codec_for(charset).ok_or_else(|| TransferError::UnsupportedEncoding(charset.into()))?;
    let mut out = Vec::with_capacity(text.len() * 2);
    if codec == Codec::Utf16 {
        out.extend_from_slice(&[0xFE, 0xFF]);
    }
    for c in text.chars() {
        encode_char(c, codec, &mut out);
    }
    Ok(out)
}

fn decode_utf16_units(units: impl Iterator<Item = u16>) -> TransferResult<String> {
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .map_err(|_| TransferError::InvalidUtf16)
}

/// Decodes bytes with the named charset.
///
/// Narrow charsets never fail: bytes outside US-ASCII decode to U+FFFD.
/// UTF-16 honors a leading BOM and defaults to big-endian without one.
pub fn decode(bytes: &[u8], charset: &str) -> TransferResult<String> {
    let codec =
        codec_for(charset).ok_or_else(|| TransferError::UnsupportedEncoding(charset.into()))?;
    match codec {
        Codec::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| TransferError::InvalidUtf8),
        Codec::Utf16 => {
            if bytes.len() % 2 != 0 {
                return Err(TransferError::InvalidUtf16);
            }
            let (le, data) = match bytes {
                [0xFE, 0xFF, rest @ ..] => (false, rest),
                [0xFF, 0xFE, rest @ ..] => (true, rest),
                _ => (false, bytes),
            };
            let units = data.chunks_exact(2).map(|p| {
                if le {
                    u16::from_le_bytes([p[0], p[1]])
                } else {
                    u16::from_be_bytes([p[0], p[1]])
                }
            });
            decode_utf16_units(units)
        }
        Codec::Utf16Le | Codec::Utf16Be => {
            if bytes.len() % 2 != 0 {
                return Err(TransferError::InvalidUtf16);
            }
            let units = bytes.chunks_exact(2).map(|p| {
                if codec == Codec::Utf16Le {
                    u16::from_le_bytes([p[0], p[1]])
                } else {
                    u16::from_be_bytes([p[0], p[1]])
                }
            });
            decode_utf16_units(units)
        }
        Codec::UsAscii => Ok(bytes
            .iter()
            .map(|&b| if b < 0x80 { b as char } else { '\u{FFFD}' })
            .collect()),
        Codec::Iso8859_1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        Codec::Windows1252 => Ok(bytes.iter().map(|&b| cp1252_decode_byte(b)).collect()),
    }
}

// =============================================================================
// Charset preference order
// =============================================================================

/// Whether a comparator orients its result so ascending sorts place the best
/// candidate first or last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending sort yields best-first order.
    BestFirst,
    /// Ascending sort yields worst-first order.
    WorstFirst,
}

/// Total preference order over charset names.
///
/// All unsupported charsets rank equal and below everything supported.
/// Among supported charsets: US-ASCII < other eight-bit charsets (ties broken
/// by reverse lexicographic name order) < the platform default < UTF-16LE <
/// UTF-16BE < UTF-8 < UTF-16.
#[derive(Debug, Clone, Copy)]
pub struct CharsetOrder {
    direction: Direction,
}

impl CharsetOrder {
    /// Creates an order with the given sort orientation.
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }

    /// Compares two charset names, oriented per [`Direction`].
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self.direction {
            Direction::BestFirst => Self::compare_quality(b, a),
            Direction::WorstFirst => Self::compare_quality(a, b),
        }
    }

    fn rank(name: &str) -> i32 {
        match codec_for(name) {
            None => i32::MIN,
            Some(Codec::UsAscii) => 0,
            Some(Codec::Utf16Le) => 4,
            Some(Codec::Utf16Be) => 5,
            Some(Codec::Utf8) => 6,
            Some(Codec::Utf16) => 7,
            Some(codec) => {
                if codec.canonical_name() == default_charset() {
                    2
                } else {
                    1
                }
            }
        }
    }

    /// Compares two charsets by quality alone. Greater means better.
    pub fn compare_quality(a: &str, b: &str) -> Ordering {
        let ca = canonical_name(a);
        let cb = canonical_name(b);
        let (ra, rb) = (Self::rank(&ca), Self::rank(&cb));
        match ra.cmp(&rb) {
            Ordering::Equal if ra == 1 => cb.cmp(&ca),
            other => other,
        }
    }
}

/// The supported Unicode family plus US-ASCII and the default charset,
/// sorted most-preferred first.
pub fn standard_encodings() -> Vec<String> {
    let mut set: Vec<String> = [
        "US-ASCII",
        "ISO-8859-1",
        "UTF-8",
        "UTF-16BE",
        "UTF-16LE",
        "UTF-16",
        default_charset(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    set.sort();
    set.dedup();
    let order = CharsetOrder::new(Direction::BestFirst);
    set.sort_by(|a, b| order.compare(a, b));
    set
}
