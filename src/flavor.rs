//! Data flavors: MIME-typed descriptions of the shapes an application can
//! provide or accept clipboard data in, plus the [`Transferable`] source
//! abstraction.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use crate::charset;
use crate::error::{TransferError, TransferResult};

/// MIME type of the canonical file-list flavor.
pub const MIME_FILE_LIST: &str = "application/x-java-file-list";
/// MIME type of the canonical serialized-object flavor.
pub const MIME_SERIALIZED_OBJECT: &str = "application/x-java-serialized-object";
/// MIME type of the local-reference flavor.
pub const MIME_LOCAL_OBJECT: &str = "application/x-java-jvm-local-objectref";
/// MIME type of the remote-object flavor.
pub const MIME_REMOTE_OBJECT: &str = "application/x-java-remote-object";
/// MIME type of the canonical image flavor.
pub const MIME_IMAGE: &str = "image/x-java-image";
/// MIME type of the side-channel flavor carrying the source's text encoding.
pub const MIME_TEXT_ENCODING: &str = "application/x-java-text-encoding";

// =============================================================================
// Representation kinds
// =============================================================================

/// The in-memory shape a flavor delivers data in.
///
/// Decoded text kinds carry characters; encoded kinds carry bytes that still
/// need charset interpretation when the flavor is textual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Representation {
    /// A stream of decoded characters
    TextReader,
    /// An owned string
    TextString,
    /// A character buffer
    TextCharBuffer,
    /// A character array
    TextCharArray,
    /// A stream of encoded bytes
    ByteStream,
    /// A byte buffer
    ByteBuffer,
    /// A byte array
    ByteArray,
    /// A list of file paths
    FileList,
    /// A raster image
    Image,
    /// A reference to a remote object
    RemoteObject,
    /// A serialized object graph
    SerializedObject,
}

impl Representation {
    /// True for kinds that deliver already-decoded characters.
    pub fn is_decoded_text(self) -> bool {
        matches!(
            self,
            Self::TextReader | Self::TextString | Self::TextCharBuffer | Self::TextCharArray
        )
    }

    /// True for kinds that deliver raw bytes.
    pub fn is_byte_oriented(self) -> bool {
        matches!(self, Self::ByteStream | Self::ByteBuffer | Self::ByteArray)
    }
}

// =============================================================================
// DataFlavor
// =============================================================================

/// A MIME type plus the representation kind data is delivered in.
///
/// Parameters (charset and friends) are kept normalized: keys lowercased and
/// sorted, so equal flavors hash equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataFlavor {
    primary: String,
    subtype: String,
    params: BTreeMap<String, String>,
    representation: Representation,
}

impl DataFlavor {
    /// Parses a MIME string (optionally with `;key=value` parameters).
    pub fn new(mime: &str, representation: Representation) -> TransferResult<Self> {
        let mut parts = mime.split(';');
        let base = parts
            .next()
            .ok_or_else(|| TransferError::InvalidMimeType(mime.into()))?
            .trim();
        let (primary, subtype) = base
            .split_once('/')
            .ok_or_else(|| TransferError::InvalidMimeType(mime.into()))?;
        if primary.is_empty() || subtype.is_empty() {
            return Err(TransferError::InvalidMimeType(mime.into()));
        }
        let mut params = BTreeMap::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| TransferError::InvalidMimeType(mime.into()))?;
            let value = value.trim().trim_matches('"');
            params.insert(key.trim().to_ascii_lowercase(), value.to_string());
        }
        Ok(Self {
            primary: primary.trim().to_ascii_lowercase(),
            subtype: subtype.trim().to_ascii_lowercase(),
            params,
            representation,
        })
    }

    /// The primary MIME type ("text" in "text/plain").
    pub fn primary_type(&self) -> &str {
        &self.primary
    }

    /// The MIME subtype ("plain" in "text/plain").
    pub fn sub_type(&self) -> &str {
        &self.subtype
    }

    /// The base MIME type without parameters.
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.primary, self.subtype)
    }

    /// The full MIME type including parameters, in normalized order.
    pub fn full_mime(&self) -> String {
        let mut out = self.mime_type();
        for (key, value) in &self.params {
            out.push_str(&format!(";{key}={value}"));
        }
        out
    }

    /// Looks up a MIME parameter by (case-insensitive) name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Returns a copy with the given parameter set.
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        self.params
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// The representation kind.
    pub fn representation(&self) -> Representation {
        self.representation
    }

    // -------------------------------------------------------------------------
    // Well-known flavors
    // -------------------------------------------------------------------------

    fn well_known(mime: &str, representation: Representation) -> Self {
        // Only called with literal MIME strings that parse
        Self::new(mime, representation).unwrap_or_else(|_| unreachable!())
    }

    /// Plain text delivered as an owned string.
    pub fn text_plain() -> Self {
        Self::well_known("text/plain", Representation::TextString)
    }

    /// The canonical string flavor. Textual despite its legacy MIME type.
    pub fn string_flavor() -> Self {
        Self::well_known(MIME_SERIALIZED_OBJECT, Representation::TextString)
    }

    /// The legacy plain-text flavor: an encoded stream of UTF-16 text.
    pub fn plain_text_flavor() -> Self {
        Self::well_known("text/plain;charset=unicode", Representation::ByteStream)
    }

    /// A list of files.
    pub fn file_list_flavor() -> Self {
        Self::well_known(MIME_FILE_LIST, Representation::FileList)
    }

    /// A raster image.
    pub fn image_flavor() -> Self {
        Self::well_known(MIME_IMAGE, Representation::Image)
    }

    /// Side-channel flavor a source may support to report the charset its
    /// locale-dependent text formats are encoded in.
    pub fn text_encoding_flavor() -> Self {
        Self::well_known(MIME_TEXT_ENCODING, Representation::ByteArray)
    }

    // -------------------------------------------------------------------------
    // Text-type predicates
    // -------------------------------------------------------------------------

    /// Whether this flavor's subtype interprets the charset parameter.
    ///
    /// Known subtypes are table-driven; unknown subtypes are judged by
    /// whether an explicit charset parameter is present.
    pub fn subtype_supports_charset(&self) -> bool {
        match self.subtype.as_str() {
            "sgml" | "xml" | "html" | "enriched" | "richtext" | "uri-list" | "directory"
            | "css" | "calendar" | "plain" => true,
            "rtf" | "tab-separated-values" | "t140" | "rfc822-headers" | "parityfec" => false,
            _ => self.parameter("charset").is_some(),
        }
    }

    /// Whether this is a text flavor whose bytes are charset-encoded.
    pub fn is_charset_text_type(&self) -> bool {
        if *self == Self::string_flavor() {
            return true;
        }
        if self.primary != "text" || !self.subtype_supports_charset() {
            return false;
        }
        if self.representation.is_decoded_text() {
            return true;
        }
        if self.representation.is_byte_oriented() {
            return match self.parameter("charset") {
                Some(cs) => charset::is_supported(cs),
                None => true,
            };
        }
        false
    }

    /// Whether this is a text flavor carrying an opaque encoding (RTF and
    /// friends), where the charset parameter is not interpreted.
    pub fn is_noncharset_text_type(&self) -> bool {
        self.primary == "text"
            && !self.subtype_supports_charset()
            && self.representation.is_byte_oriented()
    }

    /// Whether this flavor is treated as text at all.
    pub fn is_text_flavor(&self) -> bool {
        self.is_charset_text_type() || self.is_noncharset_text_type()
    }

    /// The effective charset for a charset text type, explicit or default.
    pub fn text_charset(&self) -> Option<String> {
        if !self.is_charset_text_type() {
            return None;
        }
        Some(match self.parameter("charset") {
            Some(cs) => charset::canonical_name(cs),
            None => charset::default_charset().to_string(),
        })
    }
}

impl std::fmt::Display for DataFlavor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{:?}]", self.full_mime(), self.representation)
    }
}

// =============================================================================
// Transfer payloads
// =============================================================================

/// Data handed across the flavor boundary, in the shape the flavor's
/// representation kind promises.
///
/// Reader payloads carry decoded text re-serialized as UTF-8 bytes since
/// there is no native character-stream type.
pub enum TransferData {
    /// Decoded text
    Text(String),
    /// Decoded text as individual characters
    Chars(Vec<char>),
    /// Decoded text as a UTF-8 byte stream
    Reader(Box<dyn Read + Send>),
    /// Encoded bytes
    Bytes(Vec<u8>),
    /// Encoded bytes as a stream
    Stream(Box<dyn Read + Send>),
    /// File paths
    FileList(Vec<PathBuf>),
    /// A decoded raster image
    #[cfg(feature = "image")]
    Image(image::DynamicImage),
    /// An opaque serialized object graph
    Serialized(Vec<u8>),
    /// An opaque remote-object reference
    Remote(Vec<u8>),
}

impl std::fmt::Debug for TransferData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(&s.len()).finish(),
            Self::Chars(c) => f.debug_tuple("Chars").field(&c.len()).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::FileList(p) => f.debug_tuple("FileList").field(&p.len()).finish(),
            #[cfg(feature = "image")]
            Self::Image(_) => f.write_str("Image(..)"),
            Self::Serialized(b) => f.debug_tuple("Serialized").field(&b.len()).finish(),
            Self::Remote(b) => f.debug_tuple("Remote").field(&b.len()).finish(),
        }
    }
}

/// A source of clipboard data offering one or more flavors.
pub trait Transferable {
    /// The flavors this source can deliver, most preferred first.
    fn flavors(&self) -> Vec<DataFlavor>;

    /// Whether a specific flavor is available.
    fn is_flavor_supported(&self, flavor: &DataFlavor) -> bool {
        self.flavors().iter().any(|f| f == flavor)
    }

    /// Produces the data for a flavor.
    ///
    /// `Ok(None)` means the source currently has nothing for this flavor;
    /// translation short-circuits without error in that case. Requests for
    /// unsupported flavors return [`TransferError::UnsupportedFlavor`].
    fn data_for(&self, flavor: &DataFlavor) -> TransferResult<Option<TransferData>>;
}

/// A fixed in-memory string source, useful for tests and simple callers.
#[derive(Debug, Clone)]
pub struct StringSelection {
    text: String,
}

impl StringSelection {
    /// Wraps a string for transfer under the plain-text and string flavors.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Transferable for StringSelection {
    fn flavors(&self) -> Vec<DataFlavor> {
        vec![DataFlavor::string_flavor(), DataFlavor::text_plain()]
    }

    fn data_for(&self, flavor: &DataFlavor) -> TransferResult<Option<TransferData>> {
        if !self.is_flavor_supported(flavor) {
            return Err(TransferError::UnsupportedFlavor(flavor.to_string()));
        }
        Ok(Some(TransferData::Text(self.text.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_parsing() {
        let f = DataFlavor::new("Text/Plain; charset=\"US-ASCII\"", Representation::ByteArray)
            .expect("parse");
        assert_eq!(f.primary_type(), "text");
        assert_eq!(f.sub_type(), "plain");
        assert_eq!(f.parameter("CharSet"), Some("US-ASCII"));
        assert_eq!(f.mime_type(), "text/plain");
        assert_eq!(f.full_mime(), "text/plain;charset=US-ASCII");
    }

    #[test]
    fn test_invalid_mime_rejected() {
        assert!(DataFlavor::new("not-a-mime", Representation::ByteArray).is_err());
        assert!(DataFlavor::new("/plain", Representation::ByteArray).is_err());
        assert!(DataFlavor::new("text/", Representation::ByteArray).is_err());
    }

    #[test]
    fn test_string_flavor_is_text() {
        assert!(DataFlavor::string_flavor().is_charset_text_type());
        assert!(DataFlavor::string_flavor().is_text_flavor());
    }

    #[test]
    fn test_rtf_is_noncharset_text() {
        let rtf = DataFlavor::new("text/rtf", Representation::ByteArray).expect("parse");
        assert!(!rtf.is_charset_text_type());
        assert!(rtf.is_noncharset_text_type());
        assert!(rtf.is_text_flavor());
        assert_eq!(rtf.text_charset(), None);
    }

    #[test]
    fn test_encoded_text_with_unsupported_charset_not_text() {
        let f = DataFlavor::new("text/plain;charset=x-ebcdic", Representation::ByteArray)
            .expect("parse");
        assert!(!f.is_charset_text_type());
        // The decoded form carries chars, so the charset does not matter
        let g = DataFlavor::new("text/plain;charset=x-ebcdic", Representation::TextString)
            .expect("parse");
        assert!(g.is_charset_text_type());
    }

    #[test]
    fn test_unknown_subtype_judged_by_charset_param() {
        let with = DataFlavor::new("text/x-custom;charset=UTF-8", Representation::ByteArray)
            .expect("parse");
        assert!(with.subtype_supports_charset());
        let without =
            DataFlavor::new("text/x-custom", Representation::ByteArray).expect("parse");
        assert!(!without.subtype_supports_charset());
    }

    #[test]
    fn test_text_charset_defaults() {
        assert_eq!(
            DataFlavor::text_plain().text_charset().as_deref(),
            Some(crate::charset::default_charset())
        );
        let f = DataFlavor::new("text/html;charset=unicode", Representation::ByteArray)
            .expect("parse");
        assert_eq!(f.text_charset().as_deref(), Some("UTF-16"));
    }

    #[test]
    fn test_flavor_equality_normalizes_keys() {
        let a = DataFlavor::new("text/plain;CHARSET=UTF-8", Representation::TextString)
            .expect("parse");
        let b = DataFlavor::new("text/plain;charset=UTF-8", Representation::TextString)
            .expect("parse");
        assert_eq!(a, b);
    }

    #[test]
    fn test_string_selection() {
        let sel = StringSelection::new("hello");
        assert!(sel.is_flavor_supported(&DataFlavor::text_plain()));
        match sel.data_for(&DataFlavor::text_plain()) {
            Ok(Some(TransferData::Text(s))) => assert_eq!(s, "hello"),
            other => panic!("unexpected payload: {other:?}"),
        }
        let rtf = DataFlavor::new("text/rtf", Representation::ByteArray).expect("parse");
        assert!(matches!(
            sel.data_for(&rtf),
            Err(TransferError::UnsupportedFlavor(_))
        ));
    }
}
