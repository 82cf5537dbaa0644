//! Pulling `<Record>` entries out of a parsed export.
//!
//! This is where the loosely-typed tree turns into [`RawRecord`]s; nothing
//! downstream touches [`Element`] again.

use crate::document::{Document, Element};
use crate::models::RawRecord;

/// Root element, then the repeating record element.
pub const RECORD_PATH: [&str; 2] = ["HealthData", "Record"];

const ATTR_TYPE: &str = "@_type";
const ATTR_VALUE: &str = "@_value";
const ATTR_UNIT: &str = "@_unit";
const ATTR_START: &str = "@_startDate";
const ATTR_END: &str = "@_endDate";

/// Extracts every record at [`RECORD_PATH`], in document order.
pub fn extract_records(doc: &Document) -> Vec<RawRecord> {
    extract_records_at(doc, &RECORD_PATH)
}

/// Extracts the elements at `path` (root name first, repeating element
/// last). Any missing segment yields an empty list.
pub fn extract_records_at(doc: &Document, path: &[&str]) -> Vec<RawRecord> {
    let Some((last, parents)) = path.split_last() else {
        return Vec::new();
    };
    let Some((root_name, inner)) = parents.split_first() else {
        return Vec::new();
    };
    let root = doc.root();
    if root.name() != *root_name {
        tracing::debug!(root = root.name(), expected = *root_name, "unexpected root element");
        return Vec::new();
    }

    let mut container = root;
    for segment in inner {
        match container.child(segment) {
            Some(next) => container = next,
            None => return Vec::new(),
        }
    }

    container.children_named(last).map(to_raw_record).collect()
}

fn to_raw_record(el: &Element) -> RawRecord {
    let get = |key: &str| el.field_str(key).map(str::to_string);
    RawRecord {
        record_type: get(ATTR_TYPE),
        value: get(ATTR_VALUE),
        unit: get(ATTR_UNIT),
        start_date: get(ATTR_START),
        end_date: get(ATTR_END),
    }
}
