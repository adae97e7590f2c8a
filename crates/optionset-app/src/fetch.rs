// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Typed tree for FetchXML view queries.
//!
//! A document is a `<fetch>` root holding exactly one `<entity>`. Edits go
//! through [`QueryDocument::add_condition`] and
//! [`QueryDocument::add_projected_attribute`]; [`QueryDocument::serialize`]
//! writes compact XML that parses back to an equal document.

use std::fmt;
use std::str::FromStr;

const MAX_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed view query at byte {offset}: {message}")]
pub struct QueryParseError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value.to_owned(),
            None => self.attributes.push((name.to_owned(), value.to_owned())),
        }
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn child_elements_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.child_elements()
            .filter(move |element| element.name == name)
    }

    /// Every element below this one with the given tag, depth first.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        collect_descendants(self, name, &mut found);
        found
    }

    /// Concatenated text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(text) => Some(text.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    fn is_and_filter(&self) -> bool {
        self.name == "filter" && self.attribute("type").unwrap_or("and") == "and"
    }
}

fn collect_descendants<'a>(element: &'a Element, name: &str, found: &mut Vec<&'a Element>) {
    for child in element.child_elements() {
        if child.name == name {
            found.push(child);
        }
        collect_descendants(child, name, found);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDocument {
    fetch: Element,
    entity: Element,
    entity_position: usize,
}

impl QueryDocument {
    pub fn parse(source: &str) -> Result<Self, QueryParseError> {
        let root = Parser::new(source).parse_document()?;
        if root.name != "fetch" {
            return Err(QueryParseError {
                offset: 0,
                message: format!("root element must be <fetch>, found <{}>", root.name),
            });
        }

        let entity_positions = root
            .children
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match node {
                Node::Element(element) if element.name == "entity" => Some(index),
                _ => None,
            })
            .collect::<Vec<_>>();
        let [entity_position] = entity_positions[..] else {
            return Err(QueryParseError {
                offset: 0,
                message: format!(
                    "<fetch> must contain exactly one <entity>, found {}",
                    entity_positions.len()
                ),
            });
        };

        let mut fetch = root;
        let entity = match fetch.children.remove(entity_position) {
            Node::Element(entity) => entity,
            Node::Text(_) => {
                return Err(QueryParseError {
                    offset: 0,
                    message: "<entity> position points at text".to_owned(),
                });
            }
        };
        if entity.attribute("name").is_none_or(str::is_empty) {
            return Err(QueryParseError {
                offset: 0,
                message: "<entity> is missing its name attribute".to_owned(),
            });
        }

        Ok(Self {
            fetch,
            entity,
            entity_position,
        })
    }

    pub fn fetch(&self) -> &Element {
        &self.fetch
    }

    pub fn entity(&self) -> &Element {
        &self.entity
    }

    pub fn entity_name(&self) -> &str {
        self.entity.attribute("name").unwrap_or_default()
    }

    /// Appends `<condition attribute=.. operator=.. value=..>` to the first
    /// top-level `and` filter of the entity, creating that filter when the
    /// entity has none. Existing conditions are left untouched and nothing is
    /// deduplicated.
    ///
    /// Unlike picking the first `<filter>` of any type, an `or` filter is
    /// skipped: appending there would widen the view instead of scoping it.
    pub fn add_condition(&mut self, attribute: &str, operator: &str, value: &str) {
        let condition = Element::new("condition")
            .with_attribute("attribute", attribute)
            .with_attribute("operator", operator)
            .with_attribute("value", value);

        let existing = self.entity.children.iter().position(
            |node| matches!(node, Node::Element(element) if element.is_and_filter()),
        );
        let index = match existing {
            Some(index) => index,
            None => {
                self.entity
                    .push_child(Element::new("filter").with_attribute("type", "and"));
                self.entity.children.len() - 1
            }
        };

        if let Some(Node::Element(filter)) = self.entity.children.get_mut(index) {
            filter.push_child(condition);
        }
    }

    /// Adds `<attribute name=..>` to the entity unless it is already
    /// projected, either by name or through `<all-attributes/>`.
    pub fn add_projected_attribute(&mut self, name: &str) {
        let already_projected = self.entity.child_elements().any(|element| {
            element.name == "all-attributes"
                || (element.name == "attribute" && element.attribute("name") == Some(name))
        });
        if !already_projected {
            self.entity
                .push_child(Element::new("attribute").with_attribute("name", name));
        }
    }

    pub fn projected_attributes(&self) -> Vec<&str> {
        self.entity
            .child_elements_named("attribute")
            .filter_map(|element| element.attribute("name"))
            .collect()
    }

    /// All conditions on the entity, including nested filters and linked
    /// entities, in document order.
    pub fn conditions(&self) -> Vec<&Element> {
        self.entity.descendants_named("condition")
    }

    pub fn has_condition(&self, attribute: &str, operator: &str, value: &str) -> bool {
        self.conditions().into_iter().any(|condition| {
            condition.attribute("attribute") == Some(attribute)
                && condition.attribute("operator") == Some(operator)
                && condition.attribute("value") == Some(value)
        })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        out.push('<');
        out.push_str(&self.fetch.name);
        write_attributes(&mut out, &self.fetch);
        out.push('>');

        let position = self.entity_position.min(self.fetch.children.len());
        for (index, node) in self.fetch.children.iter().enumerate() {
            if index == position {
                write_element(&mut out, &self.entity);
            }
            write_node(&mut out, node);
        }
        if position == self.fetch.children.len() {
            write_element(&mut out, &self.entity);
        }

        out.push_str("</");
        out.push_str(&self.fetch.name);
        out.push('>');
        out
    }
}

impl FromStr for QueryDocument {
    type Err = QueryParseError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::parse(source)
    }
}

impl fmt::Display for QueryDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn write_node(out: &mut String, node: &Node) {
    match node {
        Node::Element(element) => write_element(out, element),
        Node::Text(text) => escape_into(out, text, false),
    }
}

fn write_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.name);
    write_attributes(out, element);
    if element.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for child in &element.children {
        write_node(out, child);
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn write_attributes(out: &mut String, element: &Element) {
    for (name, value) in &element.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(out, value, true);
        out.push('"');
    }
}

fn escape_into(out: &mut String, value: &str, in_attribute: bool) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        let pos = if src.starts_with('\u{feff}') { 3 } else { 0 };
        Self { src, pos }
    }

    fn parse_document(mut self) -> Result<Element, QueryParseError> {
        self.skip_misc()?;
        if self.peek() != Some(b'<') {
            return Err(self.error("expected a root element"));
        }
        let root = self.parse_element(0)?;
        self.skip_misc()?;
        if self.pos < self.src.len() {
            return Err(self.error("unexpected content after the root element"));
        }
        Ok(root)
    }

    fn parse_element(&mut self, depth: usize) -> Result<Element, QueryParseError> {
        if depth > MAX_DEPTH {
            return Err(self.error("elements are nested too deeply"));
        }

        self.expect("<")?;
        let mut element = Element::new(self.parse_name()?);

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'/') => {
                    self.expect("/>")?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let name = self.parse_name()?;
                    if element.attribute(&name).is_some() {
                        return Err(self.error(&format!("duplicate attribute {name:?}")));
                    }
                    self.skip_whitespace();
                    self.expect("=")?;
                    self.skip_whitespace();
                    let value = self.parse_quoted()?;
                    element.attributes.push((name, value));
                }
                None => return Err(self.error("unterminated start tag")),
            }
        }

        loop {
            if self.starts_with("</") {
                self.pos += 2;
                let closing = self.parse_name()?;
                if closing != element.name {
                    return Err(self.error(&format!(
                        "closing tag </{closing}> does not match <{}>",
                        element.name
                    )));
                }
                self.skip_whitespace();
                self.expect(">")?;
                return Ok(element);
            }

            if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<![CDATA[") {
                self.pos += "<![CDATA[".len();
                let start = self.pos;
                let end = self.find("]]>")?;
                let text = &self.src[start..end];
                self.pos = end + 3;
                if !text.trim().is_empty() {
                    element.children.push(Node::Text(text.trim().to_owned()));
                }
            } else if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.peek() == Some(b'<') {
                let child = self.parse_element(depth + 1)?;
                element.children.push(Node::Element(child));
            } else if self.peek().is_none() {
                return Err(self.error(&format!("unterminated element <{}>", element.name)));
            } else {
                let start = self.pos;
                while self.peek().is_some_and(|byte| byte != b'<') {
                    self.pos += 1;
                }
                let text = unescape(&self.src[start..self.pos], start)?;
                if !text.trim().is_empty() {
                    element.children.push(Node::Text(text.trim().to_owned()));
                }
            }
        }
    }

    fn parse_name(&mut self) -> Result<String, QueryParseError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            let valid = byte.is_ascii_alphanumeric()
                || matches!(byte, b'_' | b'-' | b':' | b'.')
                || byte >= 0x80;
            if !valid {
                break;
            }
            self.pos += 1;
        }

        let name = &self.src[start..self.pos];
        match name.as_bytes().first() {
            None => Err(self.error("expected a name")),
            Some(first) if first.is_ascii_digit() || matches!(first, b'-' | b'.') => {
                Err(self.error(&format!("invalid name {name:?}")))
            }
            Some(_) => Ok(name.to_owned()),
        }
    }

    fn parse_quoted(&mut self) -> Result<String, QueryParseError> {
        let quote = match self.peek() {
            Some(quote @ (b'"' | b'\'')) => quote,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        self.pos += 1;

        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte == quote {
                let raw = &self.src[start..self.pos];
                self.pos += 1;
                if raw.contains('<') {
                    return Err(QueryParseError {
                        offset: start,
                        message: "attribute values must not contain '<'".to_owned(),
                    });
                }
                return unescape(raw, start);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated attribute value"))
    }

    fn skip_misc(&mut self) -> Result<(), QueryParseError> {
        loop {
            self.skip_whitespace();
            if self.starts_with("<?") {
                self.skip_past("?>")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->")?;
            } else if self.starts_with("<!") {
                return Err(self.error("document type declarations are not supported"));
            } else {
                return Ok(());
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|byte| byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_past(&mut self, terminator: &str) -> Result<(), QueryParseError> {
        let end = self.find(terminator)?;
        self.pos = end + terminator.len();
        Ok(())
    }

    fn find(&self, needle: &str) -> Result<usize, QueryParseError> {
        self.src[self.pos..]
            .find(needle)
            .map(|offset| self.pos + offset)
            .ok_or_else(|| self.error(&format!("missing {needle:?}")))
    }

    fn expect(&mut self, token: &str) -> Result<(), QueryParseError> {
        if !self.starts_with(token) {
            return Err(self.error(&format!("expected {token:?}")));
        }
        self.pos += token.len();
        Ok(())
    }

    fn starts_with(&self, token: &str) -> bool {
        self.src[self.pos..].starts_with(token)
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn error(&self, message: &str) -> QueryParseError {
        QueryParseError {
            offset: self.pos,
            message: message.to_owned(),
        }
    }
}

fn unescape(raw: &str, offset: usize) -> Result<String, QueryParseError> {
    if !raw.contains('&') {
        return Ok(raw.to_owned());
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let semi = after.find(';').ok_or_else(|| QueryParseError {
            offset: offset + (raw.len() - rest.len()) + amp,
            message: "unterminated entity reference".to_owned(),
        })?;
        let entity = &after[..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => {
                let code = if let Some(hex) = entity.strip_prefix("#x") {
                    u32::from_str_radix(hex, 16).ok()
                } else if let Some(decimal) = entity.strip_prefix('#') {
                    decimal.parse::<u32>().ok()
                } else {
                    None
                };
                code.and_then(char::from_u32).filter(|ch| is_xml_char(*ch))
            }
        };
        let Some(decoded) = decoded else {
            return Err(QueryParseError {
                offset: offset + (raw.len() - rest.len()) + amp,
                message: format!("unknown entity reference &{entity};"),
            });
        };
        out.push(decoded);
        rest = &after[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Characters allowed by the XML `Char` production.
fn is_xml_char(ch: char) -> bool {
    matches!(
        ch,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

#[cfg(test)]
mod tests {
    use super::QueryDocument;

    const ACCOUNT_VIEW: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<fetch version="1.0" output-format="xml-platform" mapping="logical" distinct="false">
  <!-- base view -->
  <entity name="account">
    <attribute name="name" />
    <attribute name="accountid" />
    <order attribute="name" descending="false" />
    <filter type="and">
      <condition attribute="statecode" operator="eq" value="0" />
    </filter>
  </entity>
</fetch>"#;

    const NO_FILTER_VIEW: &str = r#"<fetch><entity name="city"><attribute name="cityid"/><attribute name="name"/></entity></fetch>"#;

    const OR_FILTER_VIEW: &str = r#"<fetch><entity name="city"><filter type="or"><condition attribute="a" operator="eq" value="1"/><condition attribute="b" operator="eq" value="2"/></filter></entity></fetch>"#;

    fn condition_snapshot(doc: &QueryDocument) -> Vec<(String, String, String)> {
        doc.conditions()
            .into_iter()
            .map(|condition| {
                (
                    condition.attribute("attribute").unwrap_or_default().to_owned(),
                    condition.attribute("operator").unwrap_or_default().to_owned(),
                    condition.attribute("value").unwrap_or_default().to_owned(),
                )
            })
            .collect()
    }

    #[test]
    fn parse_reads_entity_filters_and_attributes() {
        let doc = QueryDocument::parse(ACCOUNT_VIEW).expect("view parses");
        assert_eq!(doc.entity_name(), "account");
        assert_eq!(doc.projected_attributes(), vec!["name", "accountid"]);
        assert_eq!(doc.conditions().len(), 1);
        assert_eq!(doc.fetch().attribute("mapping"), Some("logical"));
    }

    #[test]
    fn add_condition_adds_exactly_one_condition_and_keeps_the_rest() {
        for base in [ACCOUNT_VIEW, NO_FILTER_VIEW, OR_FILTER_VIEW] {
            let original = QueryDocument::parse(base).expect("base parses");
            let before = condition_snapshot(&original);

            let mut doc = original.clone();
            doc.add_condition("parentid", "eq", "{A}");
            let reparsed = QueryDocument::parse(&doc.serialize()).expect("mutated doc parses");
            let after = condition_snapshot(&reparsed);

            assert_eq!(after.len(), before.len() + 1, "base: {base}");
            assert_eq!(&after[..before.len()], &before[..], "base: {base}");
            assert!(reparsed.has_condition("parentid", "eq", "{A}"));
        }
    }

    #[test]
    fn add_condition_reuses_existing_and_filter() {
        let mut doc = QueryDocument::parse(ACCOUNT_VIEW).expect("view parses");
        doc.add_condition("parentid", "eq", "1");
        assert_eq!(doc.entity().child_elements_named("filter").count(), 1);
    }

    #[test]
    fn add_condition_creates_filter_when_missing() {
        let mut doc = QueryDocument::parse(NO_FILTER_VIEW).expect("view parses");
        doc.add_condition("countryid", "eq", "c-1");
        assert_eq!(
            doc.serialize(),
            r#"<fetch><entity name="city"><attribute name="cityid"/><attribute name="name"/><filter type="and"><condition attribute="countryid" operator="eq" value="c-1"/></filter></entity></fetch>"#
        );
    }

    #[test]
    fn add_condition_does_not_widen_or_filters() {
        let mut doc = QueryDocument::parse(OR_FILTER_VIEW).expect("view parses");
        doc.add_condition("countryid", "eq", "c-1");
        let filters = doc.entity().child_elements_named("filter").collect::<Vec<_>>();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].child_elements().count(), 2);
        assert_eq!(filters[1].attribute("type"), Some("and"));
    }

    #[test]
    fn add_condition_never_deduplicates() {
        let mut doc = QueryDocument::parse(NO_FILTER_VIEW).expect("view parses");
        doc.add_condition("countryid", "eq", "c-1");
        doc.add_condition("countryid", "eq", "c-1");
        assert_eq!(doc.conditions().len(), 2);
    }

    #[test]
    fn add_projected_attribute_is_idempotent() {
        let mut once = QueryDocument::parse(ACCOUNT_VIEW).expect("view parses");
        once.add_projected_attribute("name_1033");
        let mut twice = once.clone();
        twice.add_projected_attribute("name_1033");

        assert_eq!(once.projected_attributes(), twice.projected_attributes());
        assert_eq!(
            once.projected_attributes(),
            vec!["name", "accountid", "name_1033"]
        );

        let mut existing = QueryDocument::parse(ACCOUNT_VIEW).expect("view parses");
        existing.add_projected_attribute("name");
        assert_eq!(existing.projected_attributes(), vec!["name", "accountid"]);
    }

    #[test]
    fn add_projected_attribute_skips_all_attributes_entities() {
        let mut doc = QueryDocument::parse(r#"<fetch><entity name="a"><all-attributes/></entity></fetch>"#)
            .expect("view parses");
        doc.add_projected_attribute("name_1031");
        assert!(doc.projected_attributes().is_empty());
    }

    #[test]
    fn serialize_round_trips_through_parse() {
        let doc = QueryDocument::parse(ACCOUNT_VIEW).expect("view parses");
        let reparsed = QueryDocument::parse(&doc.serialize()).expect("serialized doc parses");
        assert_eq!(doc, reparsed);
        assert!(!doc.serialize().contains("<?xml"));
    }

    #[test]
    fn entities_and_text_values_round_trip() {
        let source = r#"<fetch top='5'><entity name="a"><filter><condition attribute="name" operator="in"><value>Tom &amp; Jerry</value><value>&#x3C;b&#62;</value></condition><condition attribute="t" operator="like" value="&quot;x&quot;%"/></filter></entity></fetch>"#;
        let doc = QueryDocument::parse(source).expect("view parses");
        let values = doc.entity().descendants_named("value");
        assert_eq!(values[0].text(), "Tom & Jerry");
        assert_eq!(values[1].text(), "<b>");
        assert!(doc.has_condition("t", "like", "\"x\"%"));
        assert_eq!(doc.fetch().attribute("top"), Some("5"));

        let reparsed = QueryDocument::parse(&doc.serialize()).expect("serialized doc parses");
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn entity_position_is_preserved() {
        let source = r#"<fetch><order attribute="x"/><entity name="a"/><extra/></fetch>"#;
        let doc = QueryDocument::parse(source).expect("view parses");
        assert_eq!(doc.serialize(), source);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let cases = [
            "",
            "not xml",
            "<fetch><entity name=\"a\"></fetch>",
            "<fetch><entity name=\"a\"/>",
            "<fetch><entity name=a/></fetch>",
            "<fetch><entity name=\"a\" name=\"b\"/></fetch>",
            "<fetch><entity name=\"a&bogus;\"/></fetch>",
            "<fetch></fetch>",
            "<fetch><entity name=\"a\"/><entity name=\"b\"/></fetch>",
            "<fetch><entity/></fetch>",
            "<query><entity name=\"a\"/></query>",
            "<fetch><entity name=\"a\"/></fetch><fetch/>",
        ];
        for case in cases {
            assert!(QueryDocument::parse(case).is_err(), "expected error for {case:?}");
        }
    }

    #[test]
    fn parse_error_reports_offset() {
        let error = QueryDocument::parse("<fetch><entity name=\"a\"></fetch>")
            .expect_err("mismatched tags should fail");
        assert!(error.offset > 0);
        assert!(error.to_string().contains("does not match"));
    }

    #[test]
    fn character_references_outside_xml_chars_are_rejected() {
        for reference in ["&#0;", "&#x1;", "&#xFFFE;", "&#xD800;", "&#x110000;"] {
            let source = format!(r#"<fetch><entity name="a{reference}"/></fetch>"#);
            let error = QueryDocument::parse(&source).expect_err("illegal code point should fail");
            assert!(error.to_string().contains(reference), "{error}");
        }

        let doc = QueryDocument::parse(r#"<fetch><entity name="a&#9;&#x10000;"/></fetch>"#)
            .expect("legal references parse");
        assert_eq!(doc.entity_name(), "a\t\u{10000}");
    }
}
