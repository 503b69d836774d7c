//! Flavor-to-format negotiation.
//!
//! Given a flavor table, the engine answers two questions: which native
//! formats should be offered for a set of flavors, and which flavors can be
//! requested for a set of native formats. Both directions honor caller
//! preference order and guard against one-way table entries.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::flavor::{DataFlavor, Representation, Transferable};
use crate::ranking::FlavorOrder;
use crate::charset::Direction;
use crate::registry::{FlavorTable, FormatId, FormatRegistry, TextFormatTable};

/// Whether a flavor can cross the process boundary at all.
///
/// Text, file lists, images, serialized graphs, byte streams and remote
/// references qualify; anything else is silently excluded from negotiation.
pub fn is_transferable_flavor(flavor: &DataFlavor) -> bool {
    flavor.is_text_flavor()
        || *flavor == DataFlavor::file_list_flavor()
        || *flavor == DataFlavor::image_flavor()
        || matches!(
            flavor.representation(),
            Representation::SerializedObject
                | Representation::ByteStream
                | Representation::RemoteObject
        )
}

fn is_plain_text_equivalent(flavor: &DataFlavor) -> bool {
    flavor.mime_type() == "text/plain" || *flavor == DataFlavor::string_flavor()
}

/// Negotiation engine over a format registry and text metadata table.
pub struct MappingEngine<'a> {
    registry: &'a FormatRegistry,
}

impl<'a> MappingEngine<'a> {
    /// Creates an engine over a registry.
    pub fn new(registry: &'a FormatRegistry) -> Self {
        Self { registry }
    }

    /// Maps flavors (most preferred first) to the native formats to offer,
    /// most preferred first, each paired with the flavor it will serve.
    ///
    /// When several flavors map onto the same native, the most preferred
    /// flavor wins the slot, except that a plain-text flavor always wins it
    /// so text natives are rendered from genuine plain text.
    pub fn formats_for_flavors(
        &self,
        flavors: &[DataFlavor],
        table: &dyn FlavorTable,
    ) -> Vec<(FormatId, DataFlavor)> {
        let mut format_map: HashMap<FormatId, DataFlavor> = HashMap::new();
        let mut index_map: HashMap<FormatId, i64> = HashMap::new();
        let mut text_plain_map: HashMap<FormatId, DataFlavor> = HashMap::new();
        let mut text_plain_index_map: HashMap<FormatId, i64> = HashMap::new();

        // Walk flavors in reverse so earlier (more preferred) flavors
        // overwrite the format slots claimed by later ones.
        let mut current_index: i64 = 0;
        for flavor in flavors.iter().rev() {
            if !is_transferable_flavor(flavor) {
                trace!(%flavor, "excluded from negotiation");
                continue;
            }

            let natives = table.natives_for_flavor(flavor);
            current_index += natives.len() as i64;
            for native in &natives {
                let format = self.registry.intern(native);
                let index = current_index;
                current_index -= 1;

                format_map.insert(format, flavor.clone());
                index_map.insert(format, index);

                if is_plain_text_equivalent(flavor) {
                    text_plain_map.insert(format, flavor.clone());
                    text_plain_index_map.insert(format, index);
                }
            }
            current_index += natives.len() as i64;
        }

        // Plain text overrides whatever richer flavor claimed the slot
        format_map.extend(text_plain_map);
        index_map.extend(text_plain_index_map);

        let mut out: Vec<(FormatId, DataFlavor)> = format_map.into_iter().collect();
        out.sort_by(|(fa, _), (fb, _)| {
            index_map[fb].cmp(&index_map[fa]).then(fa.cmp(fb))
        });
        out
    }

    /// Native formats to offer for a source's flavors, most preferred first.
    pub fn formats_for_transferable(
        &self,
        contents: &dyn Transferable,
        table: &dyn FlavorTable,
    ) -> Vec<(FormatId, DataFlavor)> {
        self.formats_for_flavors(&contents.flavors(), table)
    }

    /// Just the format ids, most preferred first.
    pub fn format_ids_for_flavors(
        &self,
        flavors: &[DataFlavor],
        table: &dyn FlavorTable,
    ) -> Vec<FormatId> {
        self.formats_for_flavors(flavors, table)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// Maps available native formats (most preferred first) to the flavors
    /// they can satisfy, each flavor paired with the format to fetch it from.
    ///
    /// Each flavor is served by the table's most preferred native for
    /// writing that flavor, restricted to mappings confirmed in the
    /// format-to-flavor direction, so a one-way entry never picks a native
    /// the flavor does not actually decode from.
    pub fn flavors_for_formats(
        &self,
        formats: &[FormatId],
        table: &dyn FlavorTable,
    ) -> HashMap<DataFlavor, FormatId> {
        let mut flavor_map: HashMap<DataFlavor, FormatId> = HashMap::new();
        let mut mapping_set: HashSet<(FormatId, DataFlavor)> = HashSet::new();
        let mut flavor_set: HashSet<DataFlavor> = HashSet::new();

        for &format in formats {
            let Some(native) = self.registry.native_for(format) else {
                continue;
            };
            for flavor in table.flavors_for_native(&native) {
                if !is_transferable_flavor(&flavor) {
                    continue;
                }
                flavor_map.insert(flavor.clone(), format);
                mapping_set.insert((format, flavor.clone()));
                flavor_set.insert(flavor);
            }
        }

        // Re-resolve each flavor through the table's write-preference order,
        // accepting only mappings the first pass confirmed.
        for flavor in &flavor_set {
            for native in table.natives_for_flavor(flavor) {
                let format = self.registry.intern(&native);
                if mapping_set.contains(&(format, flavor.clone())) {
                    flavor_map.insert(flavor.clone(), format);
                    break;
                }
            }
        }

        flavor_map
    }

    /// The set of flavors reachable from the given formats.
    pub fn flavors_for_formats_as_set(
        &self,
        formats: &[FormatId],
        table: &dyn FlavorTable,
    ) -> HashSet<DataFlavor> {
        self.flavors_for_formats(formats, table)
            .into_keys()
            .collect()
    }

    /// Flavors reachable from the given formats, best first.
    pub fn flavors_for_formats_sorted(
        &self,
        formats: &[FormatId],
        table: &dyn FlavorTable,
    ) -> Vec<DataFlavor> {
        let mut flavors: Vec<DataFlavor> = self
            .flavors_for_formats_as_set(formats, table)
            .into_iter()
            .collect();
        let order = FlavorOrder::new(Direction::BestFirst);
        flavors.sort_by(|a, b| order.compare(a, b));
        flavors
    }
}

/// Convenience bundle of the registries negotiation needs.
pub struct Negotiator {
    registry: FormatRegistry,
    text_table: TextFormatTable,
}

impl Negotiator {
    /// Creates an empty negotiator.
    pub fn new() -> Self {
        Self {
            registry: FormatRegistry::new(),
            text_table: TextFormatTable::new(),
        }
    }

    /// The format registry.
    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// The text metadata table.
    pub fn text_table(&self) -> &TextFormatTable {
        &self.text_table
    }

    /// An engine borrowing this negotiator's registry.
    pub fn engine(&self) -> MappingEngine<'_> {
        MappingEngine::new(&self.registry)
    }
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new()
    }
}
