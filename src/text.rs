//! Text transcoding between flavor-side decoded text and native-format
//! bytes: charset conversion, line-terminator rewriting and trailing NUL
//! terminators.

use std::io::Read;

use tracing::trace;

use crate::charset::{self, Codec};
use crate::error::{TransferError, TransferResult};
use crate::flavor::{DataFlavor, TransferData, Transferable};
use crate::registry::{FormatId, TextFormatTable};

/// Rewrites `\n` line breaks to the native terminator.
///
/// An occurrence of the full native terminator already present in the text
/// is passed through untouched rather than having its `\n` doubled.
pub fn expand_eol(text: &str, eol: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let eol_chars: Vec<char> = eol.chars().collect();
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut i = 0;
    while i < chars.len() {
        if !eol_chars.is_empty() && chars[i..].starts_with(&eol_chars[..]) {
            out.push_str(eol);
            i += eol_chars.len();
        } else if chars[i] == '\n' {
            out.push_str(eol);
            i += 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Rewrites occurrences of the native terminator back to `\n`.
pub fn restore_eol(text: &str, eol: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let eol_chars: Vec<char> = eol.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if !eol_chars.is_empty() && chars[i..].starts_with(&eol_chars[..]) {
            out.push('\n');
            i += eol_chars.len();
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

// Index of the first aligned run of `n` zero bytes, stepping by n.
// Returns the full length when no run is found.
fn terminated_length(bytes: &[u8], n: usize) -> usize {
    if n == 0 {
        return bytes.len();
    }
    let mut i = 0;
    while i + n <= bytes.len() {
        if bytes[i..i + n].iter().all(|&b| b == 0) {
            return i;
        }
        i += n;
    }
    bytes.len()
}

fn side_channel_charset(source: &dyn Transferable) -> Option<String> {
    let flavor = DataFlavor::text_encoding_flavor();
    if !source.is_flavor_supported(&flavor) {
        return None;
    }
    match source.data_for(&flavor) {
        Ok(Some(TransferData::Bytes(bytes))) => String::from_utf8(bytes).ok(),
        Ok(Some(TransferData::Text(name))) => Some(name),
        _ => None,
    }
}

/// Transcodes text to and from native text formats using the per-format
/// metadata in a [`TextFormatTable`].
pub struct TextCodec<'a> {
    table: &'a TextFormatTable,
}

impl<'a> TextCodec<'a> {
    /// Creates a codec over the given metadata table.
    pub fn new(table: &'a TextFormatTable) -> Self {
        Self { table }
    }

    /// Resolves the charset to use for a format.
    ///
    /// For locale-dependent formats a source that supports the
    /// text-encoding side channel overrides the table entry. Otherwise the
    /// table entry applies, falling back to the platform default.
    pub fn charset_for_format(
        &self,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> String {
        if self.table.is_locale_dependent(format) {
            if let Some(cs) = source.and_then(side_channel_charset) {
                trace!(format, charset = %cs, "using source-reported charset");
                return cs;
            }
        }
        self.table
            .charset_for(format)
            .unwrap_or_else(|| charset::default_charset().to_string())
    }

    /// Encodes decoded text into the format's byte layout: line breaks
    /// rewritten, charset applied, NUL terminators appended.
    pub fn encode_for_format(
        &self,
        text: &str,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        let charset = self.charset_for_format(format, source);
        let rewritten = match self.table.eol_for(format) {
            Some(eol) => expand_eol(text, &eol),
            None => text.to_string(),
        };
        let mut bytes = charset::encode(&rewritten, &charset)?;
        if let Some(n) = self.table.terminators_for(format) {
            bytes.resize(bytes.len() + n, 0);
        }
        Ok(bytes)
    }

    /// Decodes a format's bytes back to text: data truncated at the NUL
    /// terminator run, charset decoded, line breaks restored to `\n`.
    pub fn decode_for_format(
        &self,
        bytes: &[u8],
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<String> {
        let charset = self.charset_for_format(format, source);
        let n = self.table.terminators_for(format).unwrap_or(0);
        let text = charset::decode(&bytes[..terminated_length(bytes, n)], &charset)?;
        Ok(match self.table.eol_for(format) {
            Some(eol) => restore_eol(&text, &eol),
            None => text,
        })
    }

    /// Wraps an encoded-text stream in a re-encoder targeting the format's
    /// charset and line-terminator layout.
    pub fn reencoding_reader<R: Read>(
        &self,
        source: R,
        source_charset: &str,
        format: FormatId,
        locale_source: Option<&dyn Transferable>,
    ) -> TransferResult<ReencodingReader<R>> {
        ReencodingReader::new(
            source,
            source_charset,
            &self.charset_for_format(format, locale_source),
            self.table.eol_for(format),
            self.table.terminators_for(format).unwrap_or(0),
        )
    }
}

// =============================================================================
// Streaming re-encoder
// =============================================================================

// Decodes one character at a time from an underlying byte stream.
struct CharDecoder<R: Read> {
    source: R,
    codec: Codec,
    // UTF-16 byte order once the BOM (or its absence) has been seen
    utf16_le: Option<bool>,
    // Data unit consumed while probing for a BOM
    pending_unit: Option<u16>,
}

impl<R: Read> CharDecoder<R> {
    fn new(source: R, codec: Codec) -> Self {
        Self {
            source,
            codec,
            utf16_le: None,
            pending_unit: None,
        }
    }

    // Fills buf completely, or returns false on clean EOF before the first
    // byte. EOF mid-sequence is an error.
    fn fill(&mut self, buf: &mut [u8]) -> TransferResult<bool> {
        let mut read = 0;
        while read < buf.len() {
            match self.source.read(&mut buf[read..])? {
                0 if read == 0 => return Ok(false),
                0 => {
                    return Err(TransferError::TranslationFailed(
                        "truncated character sequence".into(),
                    ))
                }
                n => read += n,
            }
        }
        Ok(true)
    }

    fn next_unit16(&mut self, le: bool) -> TransferResult<Option<u16>> {
        if let Some(unit) = self.pending_unit.take() {
            return Ok(Some(unit));
        }
        let mut pair = [0u8; 2];
        if !self.fill(&mut pair)? {
            return Ok(None);
        }
        Ok(Some(if le {
            u16::from_le_bytes(pair)
        } else {
            u16::from_be_bytes(pair)
        }))
    }

    fn next_utf16_char(&mut self, le: bool) -> TransferResult<Option<char>> {
        let Some(unit) = self.next_unit16(le)? else {
            return Ok(None);
        };
        if (0xD800..0xDC00).contains(&unit) {
            let low = self
                .next_unit16(le)?
                .ok_or(TransferError::InvalidUtf16)?;
            return char::decode_utf16([unit, low].into_iter())
                .next()
                .transpose()
                .map_err(|_| TransferError::InvalidUtf16);
        }
        char::from_u32(unit as u32)
            .map(Some)
            .ok_or(TransferError::InvalidUtf16)
    }

    fn next_char(&mut self) -> TransferResult<Option<char>> {
        match self.codec {
            Codec::Utf8 => {
                let mut head = [0u8; 1];
                if !self.fill(&mut head)? {
                    return Ok(None);
                }
                let len = match head[0] {
                    0x00..=0x7F => 1,
                    0xC0..=0xDF => 2,
                    0xE0..=0xEF => 3,
                    0xF0..=0xF7 => 4,
                    _ => return Err(TransferError::InvalidUtf8),
                };
                let mut seq = [0u8; 4];
                seq[0] = head[0];
                if len > 1 && !self.fill(&mut seq[1..len])? {
                    return Err(TransferError::InvalidUtf8);
                }
                std::str::from_utf8(&seq[..len])
                    .map_err(|_| TransferError::InvalidUtf8)
                    .map(|s| s.chars().next())
            }
            Codec::Utf16Le => self.next_utf16_char(true),
            Codec::Utf16Be => self.next_utf16_char(false),
            Codec::Utf16 => {
                if self.utf16_le.is_none() {
                    // Big-endian unless a little-endian BOM leads
                    match self.next_unit16(false)? {
                        None => return Ok(None),
                        Some(0xFEFF) => self.utf16_le = Some(false),
                        Some(0xFFFE) => self.utf16_le = Some(true),
                        Some(unit) => {
                            self.utf16_le = Some(false);
                            self.pending_unit = Some(unit);
                        }
                    }
                }
                let le = self.utf16_le == Some(true);
                self.next_utf16_char(le)
            }
            Codec::UsAscii | Codec::Iso8859_1 | Codec::Windows1252 => {
                let mut byte = [0u8; 1];
                if !self.fill(&mut byte)? {
                    return Ok(None);
                }
                Ok(Some(match self.codec {
                    Codec::UsAscii if byte[0] >= 0x80 => '\u{FFFD}',
                    Codec::Windows1252 => charset::cp1252_decode_byte(byte[0]),
                    _ => byte[0] as char,
                }))
            }
        }
    }
}

/// Re-encodes a stream of charset-encoded text into a native text format's
/// byte layout, character by character.
///
/// Line breaks are rewritten to the format's terminator (occurrences of the
/// full terminator pass through), a zero character in the source marks end
/// of data when the format declares NUL terminators, and the declared number
/// of NUL bytes is appended after the data.
pub struct ReencodingReader<R: Read> {
    decoder: CharDecoder<R>,
    pushback: Vec<char>,
    target: Codec,
    eol: Option<Vec<char>>,
    terminators: usize,
    pending: Vec<u8>,
    pending_pos: usize,
    wrote_bom: bool,
    eos: bool,
}

impl<R: Read> ReencodingReader<R> {
    /// Creates a re-encoder from the source charset into the target layout.
    pub fn new(
        source: R,
        source_charset: &str,
        target_charset: &str,
        eol: Option<String>,
        terminators: usize,
    ) -> TransferResult<Self> {
        let source_codec = charset::resolve(source_charset)?;
        let target = charset::resolve(target_charset)?;
        Ok(Self {
            decoder: CharDecoder::new(source, source_codec),
            pushback: Vec::new(),
            target,
            eol: eol.map(|e| e.chars().collect()),
            terminators,
            pending: Vec::new(),
            pending_pos: 0,
            wrote_bom: false,
            eos: false,
        })
    }

    fn next_source_char(&mut self) -> TransferResult<Option<char>> {
        if let Some(c) = self.pushback.pop() {
            return Ok(Some(c));
        }
        self.decoder.next_char()
    }

    fn emit(&mut self, c: char) {
        if self.target == Codec::Utf16 && !self.wrote_bom {
            self.pending.extend_from_slice(&[0xFE, 0xFF]);
        }
        self.wrote_bom = true;
        charset::encode_char(c, self.target, &mut self.pending);
    }

    // Produces the next chunk of encoded output, or finishes the stream.
    fn pump(&mut self) -> TransferResult<()> {
        let c = match self.next_source_char()? {
            Some(c) if self.terminators > 0 && c == '\0' => None,
            other => other,
        };
        let Some(c) = c else {
            self.eos = true;
            self.pending.extend(std::iter::repeat(0).take(self.terminators));
            return Ok(());
        };

        let Some(eol) = self.eol.clone() else {
            self.emit(c);
            return Ok(());
        };

        // A full native terminator in the source passes through verbatim
        if c == eol[0] && eol.len() > 1 {
            let mut ahead = Vec::with_capacity(eol.len() - 1);
            let mut matched = true;
            for &expect in &eol[1..] {
                match self.next_source_char()? {
                    Some(got) if got == expect => ahead.push(got),
                    Some(got) => {
                        ahead.push(got);
                        matched = false;
                        break;
                    }
                    None => {
                        matched = false;
                        break;
                    }
                }
            }
            if matched {
                for &e in &eol {
                    self.emit(e);
                }
            } else {
                while let Some(back) = ahead.pop() {
                    self.pushback.push(back);
                }
                self.emit(c);
            }
        } else if c == '\n' || (eol.len() == 1 && c == eol[0]) {
            for &e in &eol {
                self.emit(e);
            }
        } else {
            self.emit(c);
        }
        Ok(())
    }
}

impl<R: Read> Read for ReencodingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pending_pos >= self.pending.len() {
            if self.eos {
                return Ok(0);
            }
            self.pending.clear();
            self.pending_pos = 0;
            self.pump().map_err(std::io::Error::from)?;
        }
        let available = &self.pending[self.pending_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_pos += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn table_with(
        format: FormatId,
        charset: &str,
        eol: Option<&str>,
        terminators: usize,
    ) -> TextFormatTable {
        let table = TextFormatTable::new();
        table.register_text_format(format, Some(charset), eol, terminators);
        table
    }

    #[test]
    fn test_expand_eol_skips_existing_terminators() {
        assert_eq!(expand_eol("a\nb", "\r\n"), "a\r\nb");
        assert_eq!(expand_eol("a\r\nb\n", "\r\n"), "a\r\nb\r\n");
        assert_eq!(expand_eol("no breaks", "\r\n"), "no breaks");
    }

    #[test]
    fn test_restore_eol() {
        assert_eq!(restore_eol("a\r\nb\r\n", "\r\n"), "a\nb\n");
        assert_eq!(restore_eol("a\rb", "\r\n"), "a\rb");
    }

    #[test]
    fn test_bare_cr_survives_round_trip() {
        let table = table_with(1, "us-ascii", Some("\r\n"), 1);
        let codec = TextCodec::new(&table);
        let bytes = codec.encode_for_format("a\rb\n", 1, None).expect("encode");
        assert_eq!(bytes, vec![b'a', 0x0D, b'b', 0x0D, 0x0A, 0x00]);
        assert_eq!(
            codec.decode_for_format(&bytes, 1, None).expect("decode"),
            "a\rb\n"
        );
    }

    #[test]
    fn test_encode_ascii_crlf_nul() {
        let table = table_with(1, "us-ascii", Some("\r\n"), 1);
        let codec = TextCodec::new(&table);
        let bytes = codec.encode_for_format("hi\n", 1, None).expect("encode");
        assert_eq!(bytes, vec![0x68, 0x69, 0x0D, 0x0A, 0x00]);
    }

    #[test]
    fn test_decode_reverses_encode() {
        let table = table_with(1, "us-ascii", Some("\r\n"), 1);
        let codec = TextCodec::new(&table);
        let text = codec
            .decode_for_format(&[0x68, 0x69, 0x0D, 0x0A, 0x00], 1, None)
            .expect("decode");
        assert_eq!(text, "hi\n");
    }

    #[test]
    fn test_terminator_scan_is_aligned() {
        let table = table_with(1, "utf-16le", None, 2);
        let codec = TextCodec::new(&table);
        // "ab" in UTF-16LE; 'a' is 0x61 0x00, the embedded zero byte is not
        // an aligned two-byte run
        let bytes = vec![0x61, 0x00, 0x62, 0x00, 0x00, 0x00, 0x7A, 0x00];
        assert_eq!(codec.decode_for_format(&bytes, 1, None).expect("decode"), "ab");
    }

    #[test]
    fn test_no_terminator_run_decodes_fully() {
        let table = table_with(1, "us-ascii", None, 1);
        let codec = TextCodec::new(&table);
        assert_eq!(
            codec.decode_for_format(b"abc", 1, None).expect("decode"),
            "abc"
        );
    }

    #[test]
    fn test_locale_dependent_side_channel() {
        struct Latin1Source;
        impl Transferable for Latin1Source {
            fn flavors(&self) -> Vec<DataFlavor> {
                vec![DataFlavor::text_encoding_flavor()]
            }
            fn data_for(&self, flavor: &DataFlavor) -> TransferResult<Option<TransferData>> {
                if !self.is_flavor_supported(flavor) {
                    return Err(TransferError::UnsupportedFlavor(flavor.to_string()));
                }
                Ok(Some(TransferData::Bytes(b"ISO-8859-1".to_vec())))
            }
        }

        let table = table_with(1, "us-ascii", None, 0);
        table.mark_locale_dependent(1);
        let codec = TextCodec::new(&table);

        assert_eq!(codec.charset_for_format(1, None), "US-ASCII");
        let source = Latin1Source;
        assert_eq!(
            codec.charset_for_format(1, Some(&source)),
            "ISO-8859-1"
        );
        let bytes = codec
            .encode_for_format("caf\u{00E9}", 1, Some(&source))
            .expect("encode");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
    }

    #[test]
    fn test_reencoding_reader_utf8_to_utf16le() {
        let source = Cursor::new("hi\n".as_bytes().to_vec());
        let mut reader =
            ReencodingReader::new(source, "UTF-8", "UTF-16LE", Some("\r\n".into()), 2)
                .expect("reader");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(
            out,
            vec![0x68, 0x00, 0x69, 0x00, 0x0D, 0x00, 0x0A, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_reencoding_reader_stops_at_source_nul() {
        let source = Cursor::new(b"ab\0cd".to_vec());
        let mut reader = ReencodingReader::new(source, "US-ASCII", "US-ASCII", None, 1)
            .expect("reader");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, vec![b'a', b'b', 0x00]);
    }

    #[test]
    fn test_reencoding_reader_passes_existing_eol() {
        let source = Cursor::new(b"a\r\nb\n".to_vec());
        let mut reader = ReencodingReader::new(
            source,
            "US-ASCII",
            "US-ASCII",
            Some("\r\n".into()),
            0,
        )
        .expect("reader");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, b"a\r\nb\r\n");
    }

    #[test]
    fn test_reencoding_reader_surrogate_pair() {
        let source = Cursor::new("\u{1F600}".as_bytes().to_vec());
        let mut reader =
            ReencodingReader::new(source, "UTF-8", "UTF-16BE", None, 0).expect("reader");
        let mut out = Vec::new();
        reader.read_to_end(&mut out).expect("read");
        assert_eq!(out, vec![0xD8, 0x3D, 0xDE, 0x00]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn expand_then_restore_is_identity(text in "[a-z \r\n]{0,64}") {
                // A literal "\r\n" passes through expansion verbatim and is
                // indistinguishable from a rewritten "\n" on the way back
                prop_assume!(!text.contains("\r\n"));
                let expanded = expand_eol(&text, "\r\n");
                prop_assert_eq!(restore_eol(&expanded, "\r\n"), text);
            }

            #[test]
            fn encode_then_decode_round_trips(
                text in "[a-z \r\n]{0,64}",
                terminators in 0usize..3,
            ) {
                prop_assume!(!text.contains("\r\n"));
                let table = table_with(1, "us-ascii", Some("\r\n"), terminators);
                let codec = TextCodec::new(&table);
                let bytes = codec.encode_for_format(&text, 1, None).unwrap();
                prop_assert_eq!(codec.decode_for_format(&bytes, 1, None).unwrap(), text);
            }

            #[test]
            fn terminator_count_is_honored(
                text in "[a-z]{1,32}",
                terminators in 1usize..4,
            ) {
                let table = table_with(1, "us-ascii", None, terminators);
                let codec = TextCodec::new(&table);
                let bytes = codec.encode_for_format(&text, 1, None).unwrap();
                prop_assert_eq!(bytes.len(), text.len() + terminators);
                prop_assert!(bytes[text.len()..].iter().all(|&b| b == 0));
            }
        }
    }
}
