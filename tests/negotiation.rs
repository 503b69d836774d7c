//! End-to-end negotiation and translation scenarios across the public API.

use std::sync::Arc;

use flavormap::{
    DataFlavor, Negotiator, Representation, StringSelection, SystemFlavorTable, TransferData,
    TransferError, TransferResult, Transferable, Translator,
};

const SYSTEM_TABLE: &str = r#"
# Minimal system flavor table
text/plain;charset=us-ascii=CF_TEXT,eoln="\r\n",terminators=1
text/plain;charset=utf-16le=CF_UNICODETEXT,eoln="\r\n",terminators=2
text/html;charset=utf-8=CF_HTML
application/x-java-file-list=CF_HDROP
"#;

fn build() -> (Negotiator, SystemFlavorTable) {
    let negotiator = Negotiator::new();
    let mut table = SystemFlavorTable::new();
    table
        .load(SYSTEM_TABLE, negotiator.registry(), negotiator.text_table())
        .expect("system table loads");
    (negotiator, table)
}

#[test]
fn ascii_crlf_nul_layout_end_to_end() {
    let (negotiator, table) = build();
    let engine = negotiator.engine();
    let source = StringSelection::new("hi\n");

    let formats = engine.formats_for_transferable(&source, &table);
    assert!(!formats.is_empty());

    let cf_text = negotiator.registry().intern("CF_TEXT");
    let (_, flavor) = formats
        .iter()
        .find(|(id, _)| *id == cf_text)
        .expect("CF_TEXT offered");

    let translator = Translator::new(negotiator.text_table());
    let bytes = translator
        .transferable_to_bytes(&source, flavor, cf_text)
        .expect("translate")
        .expect("data");
    assert_eq!(bytes, vec![0x68, 0x69, 0x0D, 0x0A, 0x00]);

    // And back again
    let restored = translator
        .bytes_to_payload(bytes, &DataFlavor::text_plain(), cf_text, None)
        .expect("decode");
    match restored {
        TransferData::Text(s) => assert_eq!(s, "hi\n"),
        other => panic!("unexpected payload: {other:?}"),
    }
}

#[test]
fn plain_text_wins_shared_unicode_native() {
    let (negotiator, mut table) = build();
    // A rich-text flavor also claims the unicode text native
    let html = DataFlavor::new("text/html;charset=utf-8", Representation::TextString)
        .expect("parse");
    table.add_mapping(html.clone(), "CF_UNICODETEXT");

    let engine = negotiator.engine();
    let cf_unicode = negotiator.registry().intern("CF_UNICODETEXT");

    // Caller prefers html, but the shared text native must render plain text
    let formats = engine.formats_for_flavors(&[html, DataFlavor::text_plain()], &table);
    let (_, owner) = formats
        .iter()
        .find(|(id, _)| *id == cf_unicode)
        .expect("CF_UNICODETEXT offered");
    assert_eq!(owner.mime_type(), "text/plain");
}

#[test]
fn refused_flavor_surfaces_as_translation_failure() {
    let (negotiator, _table) = build();
    let cf_text = negotiator.registry().intern("CF_TEXT");
    let translator = Translator::new(negotiator.text_table());

    struct RefusingSource;
    impl Transferable for RefusingSource {
        fn flavors(&self) -> Vec<DataFlavor> {
            vec![DataFlavor::text_plain()]
        }
        fn data_for(&self, flavor: &DataFlavor) -> TransferResult<Option<TransferData>> {
            Err(TransferError::UnsupportedFlavor(flavor.to_string()))
        }
    }

    let result =
        translator.transferable_to_bytes(&RefusingSource, &DataFlavor::text_plain(), cf_text);
    assert!(matches!(result, Err(TransferError::TranslationFailed(_))));
}

#[test]
fn negotiation_is_deterministic() {
    let flavors = vec![
        DataFlavor::new("text/html;charset=utf-8", Representation::TextString).expect("parse"),
        DataFlavor::text_plain(),
        DataFlavor::file_list_flavor(),
    ];

    let mut runs = Vec::new();
    for _ in 0..3 {
        let (negotiator, table) = build();
        let engine = negotiator.engine();
        let natives: Vec<String> = engine
            .formats_for_flavors(&flavors, &table)
            .into_iter()
            .map(|(id, _)| negotiator.registry().native_for(id).expect("native"))
            .collect();
        runs.push(natives);
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn flavors_for_formats_sorted_best_first() {
    let (negotiator, table) = build();
    let engine = negotiator.engine();
    let formats = vec![
        negotiator.registry().intern("CF_TEXT"),
        negotiator.registry().intern("CF_HTML"),
        negotiator.registry().intern("CF_HDROP"),
    ];

    let sorted = engine.flavors_for_formats_sorted(&formats, &table);
    assert_eq!(sorted.len(), 3);
    // Application primary outranks text in mixed comparisons; among the two
    // text flavors html beats plain
    assert_eq!(sorted[0].mime_type(), "application/x-java-file-list");
    assert_eq!(sorted[1].mime_type(), "text/html");
    assert_eq!(sorted[2].mime_type(), "text/plain");
}

#[test]
fn unicode_text_round_trip_via_clipboard_session() {
    use flavormap::{Clipboard, ClipboardIo, FormatId};
    use parking_lot::Mutex;

    struct MemoryClipboard {
        slots: Mutex<Vec<(FormatId, Vec<u8>)>>,
    }

    impl ClipboardIo for MemoryClipboard {
        fn open(&self) -> TransferResult<()> {
            Ok(())
        }
        fn close(&self) {}
        fn available_formats(&self) -> TransferResult<Vec<FormatId>> {
            Ok(self.slots.lock().iter().map(|(id, _)| *id).collect())
        }
        fn read_bytes(&self, format: FormatId) -> TransferResult<Vec<u8>> {
            self.slots
                .lock()
                .iter()
                .find(|(id, _)| *id == format)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| TransferError::TranslationFailed("format not present".into()))
        }
        fn write_contents(&self, _contents: &dyn Transferable) -> TransferResult<()> {
            Ok(())
        }
    }

    let (negotiator, table) = build();
    let engine = negotiator.engine();
    let translator = Translator::new(negotiator.text_table());
    let cf_unicode = negotiator.registry().intern("CF_UNICODETEXT");

    // Render the source into the platform slot the negotiation picked
    let source = StringSelection::new("line one\nline two\n");
    let bytes = translator
        .transferable_to_bytes(&source, &DataFlavor::text_plain(), cf_unicode)
        .expect("translate")
        .expect("data");

    let clipboard = Clipboard::new(
        "system",
        MemoryClipboard {
            slots: Mutex::new(vec![(cf_unicode, bytes)]),
        },
    );
    clipboard
        .set_contents(Arc::new(source), None, 1)
        .expect("set contents");

    // A consumer sees the flavor, reads the native and gets its text back
    let available = clipboard
        .available_flavors(&engine, &table)
        .expect("flavors");
    assert!(available.iter().any(|f| f.mime_type() == "text/plain"));

    let raw = clipboard.read_format_bytes(cf_unicode).expect("read");
    let payload = translator
        .bytes_to_payload(raw, &DataFlavor::text_plain(), cf_unicode, None)
        .expect("decode");
    match payload {
        TransferData::Text(s) => assert_eq!(s, "line one\nline two\n"),
        other => panic!("unexpected payload: {other:?}"),
    }
}
