//! Registries backing flavor negotiation: native-format interning, per-format
//! text metadata, and the flavor-to-native mapping table.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::charset;
use crate::error::{TransferError, TransferResult};
use crate::flavor::{DataFlavor, Representation};

/// Opaque identifier for a native clipboard format.
pub type FormatId = u64;

/// First id handed out for interned native names. Ids below this are free for
/// platform layers that want to pre-register fixed numeric formats.
pub const FIRST_DYNAMIC_FORMAT: FormatId = 0x1_0000;

// =============================================================================
// Native format interning
// =============================================================================

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, FormatId>,
    by_id: HashMap<FormatId, String>,
    next: FormatId,
}

/// Interns native format names to stable numeric ids.
///
/// Interning is idempotent: the same name always yields the same id for the
/// lifetime of the registry. Shared references suffice for all operations.
pub struct FormatRegistry {
    inner: Mutex<RegistryInner>,
}

impl FormatRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next: FIRST_DYNAMIC_FORMAT,
                ..RegistryInner::default()
            }),
        }
    }

    /// Returns the id for a native name, assigning a fresh one if needed.
    pub fn intern(&self, native: &str) -> FormatId {
        let mut inner = self.inner.lock();
        if let Some(&id) = inner.by_name.get(native) {
            return id;
        }
        let id = inner.next;
        inner.next += 1;
        inner.by_name.insert(native.to_string(), id);
        inner.by_id.insert(id, native.to_string());
        debug!(native, id, "interned native format");
        id
    }

    /// Pre-registers a fixed numeric id for a native name.
    ///
    /// Fails if either side is already registered differently.
    pub fn register_fixed(&self, native: &str, id: FormatId) -> TransferResult<()> {
        let mut inner = self.inner.lock();
        match (inner.by_name.get(native), inner.by_id.get(&id)) {
            (None, None) => {
                inner.by_name.insert(native.to_string(), id);
                inner.by_id.insert(id, native.to_string());
                Ok(())
            }
            (Some(&existing), _) if existing == id => Ok(()),
            _ => Err(TransferError::TranslationFailed(format!(
                "conflicting registration for native format {native}"
            ))),
        }
    }

    /// Looks up the native name for an id.
    pub fn native_for(&self, id: FormatId) -> Option<String> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    /// Number of registered formats.
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// True if no formats are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Text-format metadata
// =============================================================================

#[derive(Default)]
struct TextTableInner {
    text: HashSet<FormatId>,
    charsets: HashMap<FormatId, String>,
    eols: HashMap<FormatId, String>,
    terminators: HashMap<FormatId, usize>,
    locale_dependent: HashSet<FormatId>,
}

/// Per-native-format text properties: charset, line terminator and the
/// number of trailing NUL terminator bytes.
#[derive(Default)]
pub struct TextFormatTable {
    inner: Mutex<TextTableInner>,
}

impl TextFormatTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records text properties for a format.
    ///
    /// An empty or missing charset falls back to the platform default. The
    /// line terminator is stored only when it differs from plain `\n`, and
    /// the terminator count only when positive, so lookups report exactly
    /// the rewrites a transcoder must apply.
    pub fn register_text_format(
        &self,
        format: FormatId,
        charset: Option<&str>,
        eol: Option<&str>,
        terminators: usize,
    ) {
        let mut inner = self.inner.lock();
        inner.text.insert(format);
        let charset = match charset {
            Some(cs) if !cs.is_empty() => charset::canonical_name(cs),
            _ => charset::default_charset().to_string(),
        };
        inner.charsets.insert(format, charset);
        if let Some(eol) = eol {
            if !eol.is_empty() && eol != "\n" {
                inner.eols.insert(format, eol.to_string());
            }
        }
        if terminators > 0 {
            inner.terminators.insert(format, terminators);
        }
    }

    /// Marks a format as locale dependent: its charset follows the data
    /// source's reported text encoding rather than the table entry.
    pub fn mark_locale_dependent(&self, format: FormatId) {
        self.inner.lock().locale_dependent.insert(format);
    }

    /// Whether the format holds charset-encoded text.
    pub fn is_text_format(&self, format: FormatId) -> bool {
        self.inner.lock().text.contains(&format)
    }

    /// The charset declared for the format, if it is a text format.
    pub fn charset_for(&self, format: FormatId) -> Option<String> {
        self.inner.lock().charsets.get(&format).cloned()
    }

    /// The non-default line terminator declared for the format.
    pub fn eol_for(&self, format: FormatId) -> Option<String> {
        self.inner.lock().eols.get(&format).cloned()
    }

    /// The number of trailing NUL bytes the format requires, if any.
    pub fn terminators_for(&self, format: FormatId) -> Option<usize> {
        self.inner.lock().terminators.get(&format).copied()
    }

    /// Whether the format's charset is locale dependent.
    pub fn is_locale_dependent(&self, format: FormatId) -> bool {
        self.inner.lock().locale_dependent.contains(&format)
    }
}

// =============================================================================
// Flavor table
// =============================================================================

/// Bidirectional (and possibly asymmetric) flavor-to-native mapping table.
///
/// Both directions return candidates in decreasing preference order. The
/// directions need not mirror each other; the negotiation engine guards
/// against one-way entries.
pub trait FlavorTable {
    /// Natives a flavor can be transferred through, best first.
    fn natives_for_flavor(&self, flavor: &DataFlavor) -> Vec<String>;

    /// Flavors a native can be decoded into, best first.
    fn flavors_for_native(&self, native: &str) -> Vec<DataFlavor>;
}

/// One parsed mapping-table line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingLine {
    /// The flavor MIME type, possibly with parameters.
    pub mime: String,
    /// The native format name.
    pub native: String,
    /// Line terminator for text natives, unescaped.
    pub eol: Option<String>,
    /// Number of trailing NUL bytes for text natives.
    pub terminators: usize,
}

fn unescape_eol(raw: &str) -> String {
    let raw = raw.trim_matches('"');
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Parses one mapping-table line of the form
/// `mime=native[,eoln="\r\n"][,terminators=N]`.
///
/// Returns `Ok(None)` for blank lines and `#` comments.
pub fn parse_mapping_line(line: &str) -> TransferResult<Option<MappingLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let mut fields = line.split(',');
    let head = fields.next().unwrap_or(line);
    // MIME parameters carry '=' too, so the mapping separator is the last one
    let (mime, native) = head
        .rsplit_once('=')
        .map(|(m, n)| (m.trim(), n.trim()))
        .filter(|(m, n)| !m.is_empty() && !n.is_empty())
        .ok_or_else(|| TransferError::TranslationFailed(format!("malformed mapping line: {line}")))?;

    let mut eol = None;
    let mut terminators = 0usize;
    for field in fields {
        let field = field.trim();
        let (key, value) = field.split_once('=').ok_or_else(|| {
            TransferError::TranslationFailed(format!("malformed option '{field}' in: {line}"))
        })?;
        match key.trim() {
            "eoln" => eol = Some(unescape_eol(value.trim())),
            "terminators" => {
                terminators = value.trim().parse().map_err(|_| {
                    TransferError::TranslationFailed(format!(
                        "bad terminator count '{value}' in: {line}"
                    ))
                })?;
            }
            other => {
                return Err(TransferError::TranslationFailed(format!(
                    "unknown option '{other}' in: {line}"
                )))
            }
        }
    }
    Ok(Some(MappingLine {
        mime: mime.to_string(),
        native: native.to_string(),
        eol,
        terminators,
    }))
}

/// In-memory [`FlavorTable`] keyed by base MIME type on the flavor side.
#[derive(Default)]
pub struct SystemFlavorTable {
    natives_for: HashMap<String, Vec<String>>,
    flavors_for: HashMap<String, Vec<DataFlavor>>,
}

impl SystemFlavorTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a two-way mapping, appending at the low-preference end of each
    /// direction. Duplicates are ignored.
    pub fn add_mapping(&mut self, flavor: DataFlavor, native: &str) {
        self.add_flavor_to_native(&flavor, native);
        self.add_native_to_flavor(native, flavor);
    }

    /// Adds only the flavor-to-native direction.
    pub fn add_flavor_to_native(&mut self, flavor: &DataFlavor, native: &str) {
        let natives = self.natives_for.entry(flavor.mime_type()).or_default();
        if !natives.iter().any(|n| n == native) {
            natives.push(native.to_string());
        }
    }

    /// Adds only the native-to-flavor direction.
    pub fn add_native_to_flavor(&mut self, native: &str, flavor: DataFlavor) {
        let flavors = self.flavors_for.entry(native.to_string()).or_default();
        if !flavors.contains(&flavor) {
            flavors.push(flavor);
        }
    }

    /// Loads one mapping-table line, interning the native and registering
    /// text properties for text flavors.
    ///
    /// Returns true if the line contained a mapping.
    pub fn load_line(
        &mut self,
        line: &str,
        registry: &FormatRegistry,
        text_table: &TextFormatTable,
    ) -> TransferResult<bool> {
        let Some(parsed) = parse_mapping_line(line)? else {
            return Ok(false);
        };
        let flavor = DataFlavor::new(&parsed.mime, default_representation(&parsed.mime))?;
        let id = registry.intern(&parsed.native);
        if flavor.primary_type() == "text" {
            text_table.register_text_format(
                id,
                flavor.parameter("charset"),
                parsed.eol.as_deref(),
                parsed.terminators,
            );
        }
        debug!(mime = %parsed.mime, native = %parsed.native, "loaded flavor mapping");
        self.add_mapping(flavor, &parsed.native);
        Ok(true)
    }

    /// Loads a whole mapping table, one mapping per line.
    pub fn load(
        &mut self,
        table: &str,
        registry: &FormatRegistry,
        text_table: &TextFormatTable,
    ) -> TransferResult<usize> {
        let mut loaded = 0;
        for line in table.lines() {
            if self.load_line(line, registry, text_table)? {
                loaded += 1;
            }
        }
        Ok(loaded)
    }
}

// Representation to assume for flavors created from mapping lines.
fn default_representation(mime: &str) -> Representation {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    match base {
        crate::flavor::MIME_FILE_LIST => Representation::FileList,
        crate::flavor::MIME_IMAGE => Representation::Image,
        crate::flavor::MIME_REMOTE_OBJECT => Representation::RemoteObject,
        crate::flavor::MIME_SERIALIZED_OBJECT => Representation::TextString,
        _ if base.starts_with("text/") => Representation::TextString,
        _ if base.starts_with("image/") => Representation::ByteArray,
        _ => Representation::ByteStream,
    }
}

impl FlavorTable for SystemFlavorTable {
    fn natives_for_flavor(&self, flavor: &DataFlavor) -> Vec<String> {
        self.natives_for
            .get(&flavor.mime_type())
            .cloned()
            .unwrap_or_default()
    }

    fn flavors_for_native(&self, native: &str) -> Vec<DataFlavor> {
        self.flavors_for.get(native).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let registry = FormatRegistry::new();
        let a = registry.intern("CF_TEXT");
        let b = registry.intern("CF_TEXT");
        assert_eq!(a, b);
        assert!(a >= FIRST_DYNAMIC_FORMAT);
        assert_eq!(registry.native_for(a).as_deref(), Some("CF_TEXT"));
        assert_ne!(registry.intern("CF_UNICODETEXT"), a);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_fixed_conflicts() {
        let registry = FormatRegistry::new();
        registry.register_fixed("CF_TEXT", 1).expect("register");
        registry.register_fixed("CF_TEXT", 1).expect("same again");
        assert!(registry.register_fixed("CF_TEXT", 2).is_err());
        assert!(registry.register_fixed("CF_BITMAP", 1).is_err());
    }

    #[test]
    fn test_text_table_stores_only_meaningful_rewrites() {
        let table = TextFormatTable::new();
        table.register_text_format(7, Some("us-ascii"), Some("\n"), 0);
        assert!(table.is_text_format(7));
        assert_eq!(table.charset_for(7).as_deref(), Some("US-ASCII"));
        assert_eq!(table.eol_for(7), None);
        assert_eq!(table.terminators_for(7), None);

        table.register_text_format(8, None, Some("\r\n"), 2);
        assert_eq!(
            table.charset_for(8).as_deref(),
            Some(charset::default_charset())
        );
        assert_eq!(table.eol_for(8).as_deref(), Some("\r\n"));
        assert_eq!(table.terminators_for(8), Some(2));
    }

    #[test]
    fn test_parse_mapping_line() {
        let parsed = parse_mapping_line(
            "text/plain;charset=us-ascii=CF_TEXT,eoln=\"\\r\\n\",terminators=1",
        )
        .expect("parse")
        .expect("mapping");
        assert_eq!(parsed.mime, "text/plain;charset=us-ascii");
        assert_eq!(parsed.native, "CF_TEXT");
        assert_eq!(parsed.eol.as_deref(), Some("\r\n"));
        assert_eq!(parsed.terminators, 1);
    }

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        assert_eq!(parse_mapping_line("# comment").expect("ok"), None);
        assert_eq!(parse_mapping_line("   ").expect("ok"), None);
        assert!(parse_mapping_line("no-equals-here").is_err());
        assert!(parse_mapping_line("text/plain=CF_TEXT,bogus=1").is_err());
    }

    #[test]
    fn test_load_registers_text_properties() {
        let registry = FormatRegistry::new();
        let text_table = TextFormatTable::new();
        let mut table = SystemFlavorTable::new();
        let loaded = table
            .load(
                "# system table\n\
                 text/plain;charset=us-ascii=CF_TEXT,eoln=\"\\r\\n\",terminators=1\n\
                 application/x-java-file-list=FILE_GROUP_DESCRIPTOR\n",
                &registry,
                &text_table,
            )
            .expect("load");
        assert_eq!(loaded, 2);

        let id = registry.intern("CF_TEXT");
        assert!(text_table.is_text_format(id));
        assert_eq!(text_table.charset_for(id).as_deref(), Some("US-ASCII"));
        assert_eq!(text_table.eol_for(id).as_deref(), Some("\r\n"));
        assert_eq!(text_table.terminators_for(id), Some(1));

        let files = registry.intern("FILE_GROUP_DESCRIPTOR");
        assert!(!text_table.is_text_format(files));

        let flavors = table.flavors_for_native("CF_TEXT");
        assert_eq!(flavors.len(), 1);
        assert_eq!(flavors[0].mime_type(), "text/plain");
    }

    #[test]
    fn test_one_way_mappings_stay_one_way() {
        let mut table = SystemFlavorTable::new();
        let flavor = DataFlavor::text_plain();
        table.add_flavor_to_native(&flavor, "CF_TEXT");
        assert_eq!(table.natives_for_flavor(&flavor), vec!["CF_TEXT"]);
        assert!(table.flavors_for_native("CF_TEXT").is_empty());
    }
}
