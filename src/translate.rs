//! Translation between flavor-shaped payloads and native-format bytes.
//!
//! The outbound path serializes a [`Transferable`]'s payload into the byte
//! layout a native format expects; the inbound path rebuilds a payload in
//! the shape a requested flavor promises.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{TransferError, TransferResult};
use crate::flavor::{DataFlavor, Representation, TransferData, Transferable};
use crate::registry::{FormatId, TextFormatTable};
use crate::text::TextCodec;

#[cfg(feature = "image")]
use crate::image::ImageCodecRegistry;

/// Default cap on translated payload size.
pub const DEFAULT_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Gate deciding which file paths may cross the transfer boundary.
pub trait FileAccessPolicy: Send + Sync {
    /// Whether the path may be handed to the other side.
    fn is_readable(&self, path: &Path) -> bool;
}

/// Policy that admits every path.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAllFiles;

impl FileAccessPolicy for AllowAllFiles {
    fn is_readable(&self, _path: &Path) -> bool {
        true
    }
}

/// Decodes a platform file-list format's bytes into paths.
///
/// Platform layers plug in their own wire format here; without one the
/// translator falls back to treating the bytes as one path per line of
/// format text.
pub trait FileListDecoder: Send + Sync {
    /// Parses the native byte layout into file paths.
    fn decode_file_list(&self, bytes: &[u8]) -> TransferResult<Vec<PathBuf>>;
}

fn path_to_file_uri(path: &Path) -> String {
    let mut uri = String::from("file://");
    for part in path.to_string_lossy().split('/').filter(|p| !p.is_empty()) {
        uri.push('/');
        // Percent-escape URI-hostile and non-ASCII bytes
        for byte in part.bytes() {
            match byte {
                b' ' | b'%' | b'#' | b'?' => uri.push_str(&format!("%{byte:02X}")),
                0x80.. => uri.push_str(&format!("%{byte:02X}")),
                _ => uri.push(byte as char),
            }
        }
    }
    uri
}

fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    // Strip an authority component if present
    let path = match rest.find('/') {
        Some(0) => rest,
        Some(idx) => &rest[idx..],
        None => return None,
    };
    let mut raw = Vec::with_capacity(path.len());
    let mut bytes = path.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hex = [bytes.next()?, bytes.next()?];
            raw.push(u8::from_str_radix(std::str::from_utf8(&hex).ok()?, 16).ok()?);
        } else {
            raw.push(b);
        }
    }
    Some(PathBuf::from(String::from_utf8(raw).ok()?))
}

/// Translates payloads to and from native-format byte layouts.
///
/// Which native formats are file lists, URI lists or images is declared up
/// front; everything registered in the text table translates as text.
pub struct Translator<'a> {
    text_table: &'a TextFormatTable,
    policy: Box<dyn FileAccessPolicy>,
    file_decoder: Option<Box<dyn FileListDecoder>>,
    file_formats: HashSet<FormatId>,
    uri_list_formats: HashSet<FormatId>,
    image_formats: HashMap<FormatId, String>,
    max_size: usize,
    #[cfg(feature = "image")]
    image_codecs: ImageCodecRegistry,
}

impl<'a> Translator<'a> {
    /// Creates a translator over the given text metadata.
    pub fn new(text_table: &'a TextFormatTable) -> Self {
        Self {
            text_table,
            policy: Box::new(AllowAllFiles),
            file_decoder: None,
            file_formats: HashSet::new(),
            uri_list_formats: HashSet::new(),
            image_formats: HashMap::new(),
            max_size: DEFAULT_MAX_SIZE,
            #[cfg(feature = "image")]
            image_codecs: ImageCodecRegistry::with_standard_codecs(),
        }
    }

    /// Replaces the file access policy.
    pub fn with_file_policy(mut self, policy: impl FileAccessPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Installs a platform file-list wire format.
    pub fn with_file_list_decoder(mut self, decoder: impl FileListDecoder + 'static) -> Self {
        self.file_decoder = Some(Box::new(decoder));
        self
    }

    /// Replaces the payload size cap.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    fn check_size(&self, len: usize) -> TransferResult<()> {
        if len > self.max_size {
            return Err(TransferError::DataSizeExceeded {
                actual: len,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Declares a native format to carry a platform file list.
    pub fn register_file_format(&mut self, format: FormatId) {
        self.file_formats.insert(format);
    }

    /// Declares a native format to carry a `text/uri-list` payload.
    pub fn register_uri_list_format(&mut self, format: FormatId) {
        self.uri_list_formats.insert(format);
    }

    /// Declares a native format to carry an encoded image of the given MIME
    /// type ("image/png" and friends).
    pub fn register_image_format(&mut self, format: FormatId, mime: &str) {
        self.image_formats.insert(format, mime.to_string());
    }

    fn codec(&self) -> TextCodec<'a> {
        TextCodec::new(self.text_table)
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Serializes a source's data for one flavor into a native format's
    /// byte layout.
    ///
    /// Returns `Ok(None)` when the source reports no data for the flavor.
    /// A source refusing the flavor surfaces as a translation failure.
    pub fn transferable_to_bytes(
        &self,
        contents: &dyn Transferable,
        flavor: &DataFlavor,
        format: FormatId,
    ) -> TransferResult<Option<Vec<u8>>> {
        let data = match contents.data_for(flavor) {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(%flavor, format, "source has no data for flavor");
                return Ok(None);
            }
            Err(TransferError::UnsupportedFlavor(f)) => {
                return Err(TransferError::TranslationFailed(format!(
                    "source refused flavor {f}"
                )))
            }
            Err(other) => return Err(other),
        };
        let bytes = self.payload_to_bytes(data, flavor, format, Some(contents))?;
        self.check_size(bytes.len())?;
        Ok(Some(bytes))
    }

    fn payload_to_bytes(
        &self,
        data: TransferData,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        match data {
            TransferData::Text(text) => {
                self.encode_text_payload(&text, flavor, format, source)
            }
            TransferData::Chars(chars) => {
                let text: String = chars.into_iter().collect();
                self.encode_text_payload(&text, flavor, format, source)
            }
            TransferData::Reader(mut reader) => {
                let mut text = String::new();
                reader.read_to_string(&mut text)?;
                self.encode_text_payload(&text, flavor, format, source)
            }
            TransferData::FileList(paths) => {
                if self.file_formats.contains(&format) {
                    self.encode_file_list(&paths, format, source)
                } else if self.uri_list_formats.contains(&format) {
                    self.encode_uri_list(&paths, format, source)
                } else {
                    Err(TransferError::TranslationFailed(format!(
                        "format {format} does not accept a file list"
                    )))
                }
            }
            TransferData::Bytes(bytes) => {
                self.encode_byte_payload(bytes, flavor, format, source)
            }
            TransferData::Stream(mut stream) => {
                let mut bytes = Vec::new();
                stream.read_to_end(&mut bytes)?;
                self.encode_byte_payload(bytes, flavor, format, source)
            }
            #[cfg(feature = "image")]
            TransferData::Image(image) => match self.image_formats.get(&format) {
                Some(mime) => self.image_codecs.encode(&image, mime),
                None => Err(TransferError::TranslationFailed(format!(
                    "format {format} does not accept an image"
                ))),
            },
            TransferData::Serialized(bytes) | TransferData::Remote(bytes) => Ok(bytes),
        }
    }

    fn encode_text_payload(
        &self,
        text: &str,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        if !flavor.is_charset_text_type() {
            return Err(TransferError::TranslationFailed(format!(
                "flavor {flavor} does not deliver decoded text"
            )));
        }
        if !self.text_table.is_text_format(format) {
            return Err(TransferError::TranslationFailed(format!(
                "format {format} is not a text format"
            )));
        }
        self.codec().encode_for_format(text, format, source)
    }

    fn encode_byte_payload(
        &self,
        bytes: Vec<u8>,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        if flavor.is_charset_text_type() && self.text_table.is_text_format(format) {
            // Bytes in the flavor's charset, re-laid-out for the format
            let flavor_charset = flavor
                .text_charset()
                .unwrap_or_else(|| crate::charset::default_charset().to_string());
            let text = crate::charset::decode(&bytes, &flavor_charset)?;
            return self.codec().encode_for_format(&text, format, source);
        }
        // Opaque bytes (RTF, custom formats) pass through unchanged
        Ok(bytes)
    }

    fn encode_file_list(
        &self,
        paths: &[PathBuf],
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        let mut admitted = Vec::new();
        for path in paths {
            let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
            if self.policy.is_readable(&canonical) {
                admitted.push(canonical);
            } else {
                warn!(path = %canonical.display(), "path rejected by file policy");
            }
        }
        let joined = admitted
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        if self.text_table.is_text_format(format) {
            self.codec().encode_for_format(&joined, format, source)
        } else {
            Ok(joined.into_bytes())
        }
    }

    fn encode_uri_list(
        &self,
        paths: &[PathBuf],
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<Vec<u8>> {
        let uris = paths
            .iter()
            .map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.clone()))
            .filter(|p| self.policy.is_readable(p))
            .map(|p| path_to_file_uri(&p))
            .collect::<Vec<_>>()
            .join("\r\n");
        if self.text_table.is_text_format(format) {
            self.codec().encode_for_format(&uris, format, source)
        } else {
            Ok(uris.into_bytes())
        }
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Rebuilds a flavor-shaped payload from a native format's bytes.
    pub fn bytes_to_payload(
        &self,
        bytes: Vec<u8>,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<TransferData> {
        self.check_size(bytes.len())?;
        if self.file_formats.contains(&format) {
            return self.decode_file_list(bytes, flavor, format, source);
        }
        if self.uri_list_formats.contains(&format)
            && *flavor == DataFlavor::file_list_flavor()
        {
            return self.decode_uri_list(bytes, format, source);
        }
        #[cfg(feature = "image")]
        if let Some(mime) = self.image_formats.get(&format) {
            if flavor.representation() == Representation::Image {
                return Ok(TransferData::Image(self.image_codecs.decode(&bytes, mime)?));
            }
        }

        if flavor.is_charset_text_type() && self.text_table.is_text_format(format) {
            return self.decode_text(bytes, flavor, format, source);
        }

        match flavor.representation() {
            Representation::ByteArray | Representation::ByteBuffer => {
                Ok(TransferData::Bytes(bytes))
            }
            Representation::ByteStream => {
                Ok(TransferData::Stream(Box::new(Cursor::new(bytes))))
            }
            Representation::SerializedObject => Ok(TransferData::Serialized(bytes)),
            Representation::RemoteObject => Ok(TransferData::Remote(bytes)),
            _ => Err(TransferError::TranslationFailed(format!(
                "no translation from format {format} to flavor {flavor}"
            ))),
        }
    }

    fn decode_text(
        &self,
        bytes: Vec<u8>,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<TransferData> {
        let text = self.codec().decode_for_format(&bytes, format, source)?;
        Ok(match flavor.representation() {
            Representation::TextString => TransferData::Text(text),
            Representation::TextCharBuffer | Representation::TextCharArray => {
                TransferData::Chars(text.chars().collect())
            }
            Representation::TextReader => {
                TransferData::Reader(Box::new(Cursor::new(text.into_bytes())))
            }
            Representation::ByteArray | Representation::ByteBuffer => {
                // Re-encode into the charset the flavor declares
                let charset = flavor
                    .text_charset()
                    .unwrap_or_else(|| crate::charset::default_charset().to_string());
                TransferData::Bytes(crate::charset::encode(&text, &charset)?)
            }
            Representation::ByteStream => {
                let charset = flavor
                    .text_charset()
                    .unwrap_or_else(|| crate::charset::default_charset().to_string());
                TransferData::Stream(Box::new(Cursor::new(crate::charset::encode(
                    &text, &charset,
                )?)))
            }
            _ => {
                return Err(TransferError::TranslationFailed(format!(
                    "flavor {flavor} cannot carry decoded text"
                )))
            }
        })
    }

    fn decode_file_list(
        &self,
        bytes: Vec<u8>,
        flavor: &DataFlavor,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<TransferData> {
        if *flavor != DataFlavor::file_list_flavor() {
            return Err(TransferError::TranslationFailed(format!(
                "file-list format {format} only translates to the file-list flavor"
            )));
        }
        let paths = match &self.file_decoder {
            Some(decoder) => decoder.decode_file_list(&bytes)?,
            None => {
                let text = if self.text_table.is_text_format(format) {
                    self.codec().decode_for_format(&bytes, format, source)?
                } else {
                    String::from_utf8(bytes).map_err(|_| TransferError::InvalidUtf8)?
                };
                text.lines()
                    .filter(|l| !l.is_empty())
                    .map(PathBuf::from)
                    .collect()
            }
        };
        Ok(TransferData::FileList(paths))
    }

    fn decode_uri_list(
        &self,
        bytes: Vec<u8>,
        format: FormatId,
        source: Option<&dyn Transferable>,
    ) -> TransferResult<TransferData> {
        let text = if self.text_table.is_text_format(format) {
            self.codec().decode_for_format(&bytes, format, source)?
        } else {
            String::from_utf8(bytes).map_err(|_| TransferError::InvalidUtf8)?
        };
        // Non-file URIs are dropped rather than failing the transfer
        let paths = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(file_uri_to_path)
            .collect();
        Ok(TransferData::FileList(paths))
    }
}
