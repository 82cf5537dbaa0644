//! Attribute-preserving XML tree.
//!
//! [`parse_document`] builds the whole tree in one pass over `quick-xml`
//! events with an explicit element stack, so cost is linear in input size.
//! Attributes and children are kept apart; [`Element::field`] addresses
//! both through one key space where attribute keys carry the
//! [`ATTRIBUTE_PREFIX`] (`@_type` is the `type` attribute, `Record` is the
//! sequence of `<Record>` children).

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::PipelineError;

/// Prefix marking an attribute key in [`Element::field`].
pub const ATTRIBUTE_PREFIX: &str = "@_";

/// One element node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

/// Result of an [`Element::field`] lookup.
#[derive(Debug, PartialEq, Eq)]
pub enum Field<'a> {
    Attribute(&'a str),
    /// All children with the requested name, in document order.
    Elements(Vec<&'a Element>),
}

impl Element {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    pub fn children_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Element> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Concatenated, trimmed character data directly inside this element.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Looks up `@_name` as an attribute or `name` as a child sequence.
    /// Returns `None` when nothing matches.
    pub fn field(&self, key: &str) -> Option<Field<'_>> {
        if let Some(attr) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            return self.attribute(attr).map(Field::Attribute);
        }
        let matches: Vec<&Element> = self.children.iter().filter(|c| c.name == key).collect();
        if matches.is_empty() {
            None
        } else {
            Some(Field::Elements(matches))
        }
    }

    /// Attribute value for a prefixed key, or `None` if the key is not an
    /// attribute key or the attribute is absent.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        match self.field(key) {
            Some(Field::Attribute(v)) => Some(v),
            _ => None,
        }
    }
}

/// A parsed document with exactly one root element.
#[derive(Debug, Clone)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn root(&self) -> &Element {
        &self.root
    }
}

fn malformed(reader: &Reader<&[u8]>, msg: impl std::fmt::Display) -> PipelineError {
    PipelineError::MalformedDocument(format!("{} (at byte {})", msg, reader.buffer_position()))
}

fn element_from_start(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Element, PipelineError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| malformed(reader, err))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| malformed(reader, err))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Parses `text` into a [`Document`]. Any well-formedness problem yields
/// [`PipelineError::MalformedDocument`].
pub fn parse_document(text: &str) -> Result<Document, PipelineError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    // Attaches a finished element to its parent, or makes it the root.
    fn finish(
        reader: &Reader<&[u8]>,
        stack: &mut [Element],
        root: &mut Option<Element>,
        el: Element,
    ) -> Result<(), PipelineError> {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(el);
            Ok(())
        } else if root.is_some() {
            Err(malformed(reader, format!("second root element <{}>", el.name)))
        } else {
            *root = Some(el);
            Ok(())
        }
    }

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.is_empty() && root.is_some() {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(malformed(&reader, format!("second root element <{}>", name)));
                }
                let el = element_from_start(&reader, &e)?;
                stack.push(el);
            }
            Ok(Event::Empty(e)) => {
                let el = element_from_start(&reader, &e)?;
                finish(&reader, &mut stack, &mut root, el)?;
            }
            Ok(Event::End(e)) => {
                let Some(el) = stack.pop() else {
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    return Err(malformed(&reader, format!("unexpected </{}>", name)));
                };
                finish(&reader, &mut stack, &mut root, el)?;
            }
            Ok(Event::Text(t)) => {
                let s = t.unescape().map_err(|err| malformed(&reader, err))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&s);
                } else if !s.trim().is_empty() {
                    return Err(malformed(&reader, "text outside the root element"));
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(malformed(&reader, err)),
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(&reader, format!("unclosed element <{}>", open.name)));
    }
    match root {
        Some(root) => Ok(Document { root }),
        None => Err(malformed(&reader, "no root element")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData [
<!ELEMENT HealthData (ExportDate,Me,(Record|Workout)*)>
]>
<HealthData locale="en_US">
 <ExportDate value="2024-03-01 10:00:00 +0100"/>
 <Record type="HKQuantityTypeIdentifierStepCount" value="12" unit="count">
  <MetadataEntry key="HKWasUserEntered" value="1"/>
 </Record>
 <Workout workoutActivityType="HKWorkoutActivityTypeWalking"/>
 <Record type="HKQuantityTypeIdentifierHeartRate" value="61" unit="count/min"/>
</HealthData>
"#;

    #[test]
    fn parses_attributes_and_children() {
        let doc = parse_document(SAMPLE).unwrap();
        let root = doc.root();
        assert_eq!(root.name(), "HealthData");
        assert_eq!(root.attribute("locale"), Some("en_US"));
        assert_eq!(root.children().len(), 4);

        let records: Vec<_> = root.children_named("Record").collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].attribute("value"), Some("12"));
        assert_eq!(records[0].child("MetadataEntry").unwrap().attribute("key"), Some("HKWasUserEntered"));
        assert_eq!(records[1].attribute("unit"), Some("count/min"));
    }

    #[test]
    fn field_separates_attributes_from_children() {
        let doc = parse_document(r#"<A type="attr"><type>child</type><type>again</type></A>"#).unwrap();
        let root = doc.root();
        assert_eq!(root.field("@_type"), Some(Field::Attribute("attr")));
        match root.field("type") {
            Some(Field::Elements(els)) => {
                assert_eq!(els.len(), 2);
                assert_eq!(els[0].text(), "child");
                assert_eq!(els[1].text(), "again");
            }
            other => panic!("expected elements, got {:?}", other),
        }
        assert_eq!(root.field("@_missing"), None);
        assert_eq!(root.field("missing"), None);
        assert_eq!(root.field_str("type"), None);
    }

    #[test]
    fn lookups_outlive_the_key() {
        let doc = parse_document(SAMPLE).unwrap();
        let root = doc.root();
        let found = {
            let key = String::from("Record");
            root.field(&key)
        };
        match found {
            Some(Field::Elements(els)) => assert_eq!(els.len(), 2),
            other => panic!("expected elements, got {:?}", other),
        }
        let child = {
            let key = String::from("Workout");
            root.child(&key)
        };
        assert_eq!(child.and_then(|w| w.attribute("workoutActivityType")), Some("HKWorkoutActivityTypeWalking"));
    }

    #[test]
    fn decodes_character_references_in_attributes() {
        let doc = parse_document(
            r#"<!DOCTYPE HealthData [
<!ATTLIST Record sourceName CDATA #REQUIRED>
]>
<HealthData><Record sourceName="Jane&#8217;s Apple&#160;Watch"/></HealthData>"#,
        )
        .unwrap();
        let record = doc.root().child("Record").unwrap();
        assert_eq!(record.attribute("sourceName"), Some("Jane\u{2019}s Apple\u{a0}Watch"));
    }

    #[test]
    fn unescapes_attribute_values() {
        let doc = parse_document(r#"<A name="Tom &amp; Jerry&apos;s"/>"#).unwrap();
        assert_eq!(doc.root().attribute("name"), Some("Tom & Jerry's"));
    }

    #[test]
    fn rejects_unclosed_element() {
        let err = parse_document("<HealthData><Record type=\"x\">").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument(_)));
    }

    #[test]
    fn rejects_mismatched_end_tag() {
        let err = parse_document("<HealthData></Record>").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument(_)));
    }

    #[test]
    fn rejects_second_root() {
        let err = parse_document("<A/><B/>").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument(_)));
    }

    #[test]
    fn rejects_empty_and_plain_text() {
        assert!(matches!(
            parse_document("").unwrap_err(),
            PipelineError::MalformedDocument(_)
        ));
        assert!(matches!(
            parse_document("this is not xml").unwrap_err(),
            PipelineError::MalformedDocument(_)
        ));
    }

    #[test]
    fn rejects_duplicate_attributes() {
        let err = parse_document(r#"<A x="1" x="2"/>"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument(_)));
    }
}
