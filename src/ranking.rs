//! Total preference order over data flavors.
//!
//! Text flavors compare by subtype quality, then decoded representation,
//! then charset, then encoded representation. Non-text flavors prefer
//! application types and treat unknown `application/x-*` MIME types as more
//! descriptive than the built-in legacy ones. Flavors that remain tied
//! compare by their full MIME string so the order is total.

use std::cmp::Ordering;

use crate::charset::{CharsetOrder, Direction};
use crate::flavor::{
    DataFlavor, Representation, MIME_FILE_LIST, MIME_LOCAL_OBJECT, MIME_REMOTE_OBJECT,
    MIME_SERIALIZED_OBJECT,
};

const UNKNOWN_LOSES: i32 = i32::MIN;
const UNKNOWN_WINS: i32 = i32::MAX;

// Worst-to-best quality of text MIME types. The serialized-object entry is
// the string flavor, which ranks just above bare plain text.
fn text_type_rank(mime: &str) -> i32 {
    match mime {
        "text/plain" => 0,
        MIME_SERIALIZED_OBJECT => 1,
        "text/calendar" => 2,
        "text/css" => 3,
        "text/directory" => 4,
        "text/parityfec" => 5,
        "text/rfc822-headers" => 6,
        "text/t140" => 7,
        "text/tab-separated-values" => 8,
        "text/uri-list" => 9,
        "text/richtext" => 10,
        "text/enriched" => 11,
        "text/rtf" => 12,
        "text/html" => 13,
        "text/xml" => 14,
        "text/sgml" => 15,
        _ => UNKNOWN_LOSES,
    }
}

fn decoded_text_rank(r: Representation) -> i32 {
    match r {
        Representation::TextCharArray => 0,
        Representation::TextCharBuffer => 1,
        Representation::TextString => 2,
        Representation::TextReader => 3,
        _ => UNKNOWN_LOSES,
    }
}

fn encoded_text_rank(r: Representation) -> i32 {
    match r {
        Representation::ByteArray => 0,
        Representation::ByteBuffer => 1,
        Representation::ByteStream => 2,
        _ => UNKNOWN_LOSES,
    }
}

fn primary_type_rank(primary: &str) -> i32 {
    if primary == "application" {
        0
    } else {
        UNKNOWN_LOSES
    }
}

// Caller-defined MIME types outrank the legacy exact types because a custom
// flavor is likely the most descriptive one the source offers.
fn exact_type_rank(mime: &str) -> i32 {
    match mime {
        MIME_FILE_LIST => 0,
        MIME_SERIALIZED_OBJECT => 1,
        MIME_LOCAL_OBJECT => 2,
        MIME_REMOTE_OBJECT => 3,
        _ => UNKNOWN_WINS,
    }
}

fn non_text_representation_rank(r: Representation) -> i32 {
    match r {
        Representation::ByteStream => 0,
        Representation::SerializedObject => 1,
        Representation::RemoteObject => 2,
        _ => UNKNOWN_LOSES,
    }
}

/// Total preference order over [`DataFlavor`]s.
#[derive(Debug, Clone, Copy)]
pub struct FlavorOrder {
    direction: Direction,
}

impl FlavorOrder {
    /// Creates an order with the given sort orientation.
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }

    /// Compares two flavors, oriented per [`Direction`].
    pub fn compare(&self, a: &DataFlavor, b: &DataFlavor) -> Ordering {
        match self.direction {
            Direction::BestFirst => Self::compare_quality(b, a),
            Direction::WorstFirst => Self::compare_quality(a, b),
        }
    }

    // Greater means higher quality.
    fn compare_quality(a: &DataFlavor, b: &DataFlavor) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }

        let mime_a = a.mime_type();
        let mime_b = b.mime_type();

        let comp = if a.is_text_flavor() && b.is_text_flavor() {
            Self::compare_text_quality(a, b, &mime_a, &mime_b)
        } else {
            Self::compare_non_text_quality(a, b, &mime_a, &mime_b)
        };
        if comp != Ordering::Equal {
            return comp;
        }

        // Not equal but not otherwise distinguishable
        match a.full_mime().cmp(&b.full_mime()) {
            Ordering::Equal => (a.representation() as u8).cmp(&(b.representation() as u8)),
            other => other,
        }
    }

    fn compare_text_quality(
        a: &DataFlavor,
        b: &DataFlavor,
        mime_a: &str,
        mime_b: &str,
    ) -> Ordering {
        let comp = text_type_rank(mime_a).cmp(&text_type_rank(mime_b));
        if comp != Ordering::Equal {
            return comp;
        }

        // Both flavors share a MIME type here, so testing one suffices. The
        // string flavor cannot reach this point unequal: either both are it
        // (equal) or the MIME comparison above already decided.
        if a.subtype_supports_charset() {
            let comp =
                decoded_text_rank(a.representation()).cmp(&decoded_text_rank(b.representation()));
            if comp != Ordering::Equal {
                return comp;
            }

            let ca = a.text_charset().unwrap_or_default();
            let cb = b.text_charset().unwrap_or_default();
            let comp = CharsetOrder::compare_quality(&ca, &cb);
            if comp != Ordering::Equal {
                return comp;
            }
        }

        encoded_text_rank(a.representation()).cmp(&encoded_text_rank(b.representation()))
    }

    fn compare_non_text_quality(
        a: &DataFlavor,
        b: &DataFlavor,
        mime_a: &str,
        mime_b: &str,
    ) -> Ordering {
        let comp = primary_type_rank(a.primary_type()).cmp(&primary_type_rank(b.primary_type()));
        if comp != Ordering::Equal {
            return comp;
        }

        let comp = exact_type_rank(mime_a).cmp(&exact_type_rank(mime_b));
        if comp != Ordering::Equal {
            return comp;
        }

        non_text_representation_rank(a.representation())
            .cmp(&non_text_representation_rank(b.representation()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::Representation as Rep;

    fn flavor(mime: &str, rep: Rep) -> DataFlavor {
        DataFlavor::new(mime, rep).expect("parse")
    }

    fn best_first() -> FlavorOrder {
        FlavorOrder::new(Direction::BestFirst)
    }

    fn assert_better(a: &DataFlavor, b: &DataFlavor) {
        // BestFirst: the better flavor sorts earlier
        assert_eq!(best_first().compare(a, b), Ordering::Less, "{a} vs {b}");
        assert_eq!(best_first().compare(b, a), Ordering::Greater, "{b} vs {a}");
    }

    #[test]
    fn test_html_beats_plain() {
        let html = flavor("text/html", Rep::TextString);
        let plain = flavor("text/plain", Rep::TextString);
        assert_better(&html, &plain);
    }

    #[test]
    fn test_string_flavor_beats_plain_text() {
        assert_better(&DataFlavor::string_flavor(), &DataFlavor::text_plain());
    }

    #[test]
    fn test_decoded_representation_order() {
        let reader = flavor("text/plain", Rep::TextReader);
        let string = flavor("text/plain", Rep::TextString);
        let buffer = flavor("text/plain", Rep::TextCharBuffer);
        let chars = flavor("text/plain", Rep::TextCharArray);
        assert_better(&reader, &string);
        assert_better(&string, &buffer);
        assert_better(&buffer, &chars);
    }

    #[test]
    fn test_charset_decides_between_equal_representations() {
        let utf8 = flavor("text/plain;charset=UTF-8", Rep::ByteArray);
        let ascii = flavor("text/plain;charset=US-ASCII", Rep::ByteArray);
        assert_better(&utf8, &ascii);
    }

    #[test]
    fn test_encoded_representation_order() {
        let stream = flavor("text/plain;charset=UTF-8", Rep::ByteStream);
        let buffer = flavor("text/plain;charset=UTF-8", Rep::ByteBuffer);
        let array = flavor("text/plain;charset=UTF-8", Rep::ByteArray);
        assert_better(&stream, &buffer);
        assert_better(&buffer, &array);
    }

    #[test]
    fn test_rtf_skips_charset_comparison() {
        // Non-charset subtypes fall straight through to encoded reps
        let stream = flavor("text/rtf", Rep::ByteStream);
        let array = flavor("text/rtf", Rep::ByteArray);
        assert_better(&stream, &array);
    }

    #[test]
    fn test_unknown_application_type_wins() {
        let custom = flavor("application/x-my-editor-state", Rep::SerializedObject);
        assert_better(&custom, &DataFlavor::file_list_flavor());
        assert_better(&custom, &flavor(MIME_REMOTE_OBJECT, Rep::RemoteObject));
    }

    #[test]
    fn test_application_primary_beats_other_non_text() {
        let app = flavor(MIME_FILE_LIST, Rep::FileList);
        let img = DataFlavor::image_flavor();
        assert_better(&app, &img);
    }

    #[test]
    fn test_legacy_exact_type_order() {
        let file_list = DataFlavor::file_list_flavor();
        let serialized = flavor(MIME_SERIALIZED_OBJECT, Rep::SerializedObject);
        let local = flavor(MIME_LOCAL_OBJECT, Rep::SerializedObject);
        let remote = flavor(MIME_REMOTE_OBJECT, Rep::RemoteObject);
        assert_better(&remote, &local);
        assert_better(&local, &serialized);
        assert_better(&serialized, &file_list);
    }

    #[test]
    fn test_order_is_total() {
        // Distinct flavors never compare equal
        let a = flavor("image/x-foo", Rep::ByteArray);
        let b = flavor("image/x-bar", Rep::ByteArray);
        assert_ne!(best_first().compare(&a, &b), Ordering::Equal);
        let c = flavor("image/x-foo", Rep::ByteStream);
        assert_ne!(best_first().compare(&a, &c), Ordering::Equal);
    }

    #[test]
    fn test_sort_is_deterministic() {
        let mut v1 = vec![
            flavor("text/html", Rep::TextString),
            flavor("text/plain", Rep::TextReader),
            flavor("text/plain;charset=UTF-8", Rep::ByteArray),
            DataFlavor::string_flavor(),
        ];
        let mut v2: Vec<_> = v1.iter().rev().cloned().collect();
        let order = best_first();
        v1.sort_by(|a, b| order.compare(a, b));
        v2.sort_by(|a, b| order.compare(a, b));
        assert_eq!(v1, v2);
        assert_eq!(v1[0], flavor("text/html", Rep::TextString));
    }
}
