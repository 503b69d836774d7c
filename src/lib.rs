//! # flavormap
//!
//! Clipboard data-flavor negotiation and transcoding for Rust.
//!
//! This crate maps application-level data flavors (MIME type plus in-memory
//! representation) onto native clipboard formats and translates the bytes in
//! both directions:
//!
//! - **[`MappingEngine`]** - Preference-ordered flavor ↔ format negotiation
//! - **[`TextCodec`]** - Charset, line-terminator and NUL-terminator rewriting
//! - **[`Translator`]** - Payload serialization per representation kind
//! - **[`Clipboard`]** - Session state, ownership and change listeners
//!
//! ## Quick Start
//!
//! ```rust
//! use flavormap::{DataFlavor, Negotiator, SystemFlavorTable};
//!
//! let negotiator = Negotiator::new();
//! let mut table = SystemFlavorTable::new();
//! table
//!     .load_line(
//!         "text/plain;charset=us-ascii=CF_TEXT,eoln=\"\\r\\n\",terminators=1",
//!         negotiator.registry(),
//!         negotiator.text_table(),
//!     )
//!     .expect("mapping line");
//!
//! // Which native formats should be offered for plain text?
//! let engine = negotiator.engine();
//! let formats = engine.formats_for_flavors(&[DataFlavor::text_plain()], &table);
//! assert_eq!(formats.len(), 1);
//! ```
//!
//! ## Feature Flags
//!
//! - `image` - Enable image flavor transcoding (PNG, JPEG, BMP, GIF)
//!
//! ## Architecture
//!
//! Flavor tables declare which natives a flavor can travel through; the
//! negotiation engine resolves preference order in both directions. The
//! translator then moves actual bytes, consulting the text metadata table
//! for the charset, line-terminator and NUL-terminator conventions of each
//! native text format. Platform layers plug in through the [`ClipboardIo`]
//! and [`FlavorTable`] traits.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

mod error;

pub mod charset;
pub mod flavor;
pub mod mapping;
pub mod ranking;
pub mod registry;
pub mod session;
pub mod text;
pub mod translate;

#[cfg(feature = "image")]
pub mod image;

pub use charset::{standard_encodings, CharsetOrder, Direction, DEFAULT_CHARSET};
pub use error::{TransferError, TransferResult};
pub use flavor::{DataFlavor, Representation, StringSelection, TransferData, Transferable};
pub use mapping::{is_transferable_flavor, MappingEngine, Negotiator};
pub use ranking::FlavorOrder;
pub use registry::{
    parse_mapping_line, FlavorTable, FormatId, FormatRegistry, MappingLine, SystemFlavorTable,
    TextFormatTable, FIRST_DYNAMIC_FORMAT,
};
pub use session::{
    Clipboard, ClipboardIo, ClipboardOwner, ContextId, ConversionHandoff, FlavorListener,
    ListenerId,
};
pub use text::{expand_eol, restore_eol, ReencodingReader, TextCodec};
pub use translate::{
    AllowAllFiles, FileAccessPolicy, FileListDecoder, Translator, DEFAULT_MAX_SIZE,
};

#[cfg(feature = "image")]
pub use image::ImageCodecRegistry;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        DataFlavor, FlavorTable, FormatId, MappingEngine, Negotiator, Representation,
        SystemFlavorTable, TransferData, TransferError, TransferResult, Transferable, Translator,
    };
}
