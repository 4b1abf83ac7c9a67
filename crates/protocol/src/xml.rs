//! Positional XML reader and a small escaping writer.
//!
//! The reader builds an element tree and records the line/column of the
//! `<` that opened each start tag. It understands what the Nexus API
//! sends: an optional declaration, comments, processing instructions, a
//! DOCTYPE (skipped), attributes, CDATA, the predefined entities, and
//! numeric character references. Namespaces are not interpreted; names
//! keep their prefixes.

use crate::error::ParseError;

/// Deepest element nesting the reader accepts, counting the root as 1.
pub const MAX_DEPTH: usize = 256;

/// A 1-based line/column pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// A node in the element tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with its children and start-tag position.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
    position: Position,
}

impl Element {
    fn new(name: String, position: Position) -> Self {
        Self {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
            position,
        }
    }

    /// Returns the tag name, including any namespace prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns where the start tag of this element began.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Returns an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the direct child nodes.
    pub fn nodes(&self) -> &[Node] {
        &self.children
    }

    /// Returns the direct child elements.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Returns every descendant element named `name`, in document order.
    ///
    /// The element itself is not included, only elements below it.
    pub fn descendants_named<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        collect_named(self, name, &mut found);
        found
    }

    /// Returns the first descendant element named `name`, in document order.
    pub fn first_descendant_named(&self, name: &str) -> Option<&Element> {
        let mut pending: Vec<&Element> = self.children().collect();
        pending.reverse();
        while let Some(element) = pending.pop() {
            if element.name == name {
                return Some(element);
            }
            let start = pending.len();
            pending.extend(element.children());
            pending[start..].reverse();
        }
        None
    }

    /// Returns the concatenated text of this element and all descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        append_text(self, &mut out);
        out
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(Node::Text(text.to_string()));
        }
    }
}

fn collect_named<'a>(element: &'a Element, name: &str, found: &mut Vec<&'a Element>) {
    let mut pending: Vec<&Element> = element.children().collect();
    pending.reverse();
    while let Some(element) = pending.pop() {
        if element.name == name {
            found.push(element);
        }
        let start = pending.len();
        pending.extend(element.children());
        pending[start..].reverse();
    }
}

fn append_text(element: &Element, out: &mut String) {
    let mut pending: Vec<&Node> = element.children.iter().rev().collect();
    while let Some(node) = pending.pop() {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => pending.extend(e.children.iter().rev()),
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Parses a complete document and returns its root element.
///
/// `source` is only used to label errors.
pub fn read_document(source: &str, bytes: &[u8]) -> Result<Element, ParseError> {
    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => {
            let valid = &bytes[..e.valid_up_to()];
            let position = end_position(std::str::from_utf8(valid).unwrap_or_default());
            return Err(ParseError::new(
                "document is not valid UTF-8",
                position,
                source,
            ));
        }
    };

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = Reader::new(text, source);
    reader.document()
}

fn end_position(text: &str) -> Position {
    let mut position = Position { line: 1, column: 1 };
    for c in normalize_newlines(text).chars() {
        if c == '\n' {
            position.line += 1;
            position.column = 1;
        } else {
            position.column += 1;
        }
    }
    position
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

struct Reader<'a> {
    input: &'a str,
    offset: usize,
    line: u32,
    column: u32,
    source: &'a str,
}

impl<'a> Reader<'a> {
    fn new(input: &'a str, source: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            line: 1,
            column: 1,
            source,
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn error_at(&self, position: Position, message: impl Into<String>) -> ParseError {
        ParseError::new(message, position, self.source)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.position(), message)
    }

    fn rest(&self) -> &'a str {
        &self.input[self.offset..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn starts_with(&self, s: &str) -> bool {
        self.rest().starts_with(s)
    }

    /// Consumes one character. `\r\n` and a lone `\r` are consumed as a
    /// single `\n`.
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        let c = if c == '\r' {
            if self.rest().starts_with('\n') {
                self.offset += 1;
            }
            '\n'
        } else {
            c
        };
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consumes `s`, which must be a prefix of the remaining input.
    fn advance(&mut self, s: &str) {
        let end = self.offset + s.len();
        while self.offset < end {
            self.bump();
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), ParseError> {
        if self.starts_with(s) {
            self.advance(s);
            Ok(())
        } else {
            Err(self.error(format!("expected '{s}'")))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Consumes input up to and including `terminator`.
    fn skip_past(&mut self, terminator: &str, what: &str) -> Result<&'a str, ParseError> {
        let start = self.position();
        let begin = self.offset;
        match self.rest().find(terminator) {
            Some(index) => {
                let body = &self.input[begin..begin + index];
                self.advance(body);
                self.advance(terminator);
                Ok(body)
            }
            None => Err(self.error_at(start, format!("unterminated {what}"))),
        }
    }

    fn document(&mut self) -> Result<Element, ParseError> {
        let mut root: Option<Element> = None;

        loop {
            self.skip_whitespace();
            if self.peek().is_none() {
                break;
            }

            if self.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if self.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if self.starts_with("<!DOCTYPE") {
                if root.is_some() {
                    return Err(self.error("DOCTYPE after the root element"));
                }
                self.doctype()?;
            } else if self.starts_with("<") {
                if root.is_some() {
                    return Err(self.error("content after the root element"));
                }
                root = Some(self.element_tree()?);
            } else {
                return Err(self.error("text is not allowed outside the root element"));
            }
        }

        root.ok_or_else(|| self.error("document has no root element"))
    }

    fn doctype(&mut self) -> Result<(), ParseError> {
        let start = self.position();
        self.advance("<!DOCTYPE");
        let mut depth = 0usize;
        loop {
            match self.bump() {
                Some('[') => depth += 1,
                Some(']') => depth = depth.saturating_sub(1),
                Some('>') if depth == 0 => return Ok(()),
                Some(_) => {}
                None => return Err(self.error_at(start, "unterminated DOCTYPE")),
            }
        }
    }

    /// Reads one element and everything inside it.
    ///
    /// Open elements live on an explicit stack. Nesting deeper than
    /// [`MAX_DEPTH`] is rejected at the offending start tag, which keeps
    /// every later walk over the tree shallow.
    fn element_tree(&mut self) -> Result<Element, ParseError> {
        let (root, empty) = self.start_tag()?;
        if empty {
            return Ok(root);
        }

        let mut stack = vec![root];
        loop {
            if self.peek().is_none() {
                let open = stack.last().map(|e| e.name.clone()).unwrap_or_default();
                return Err(self.error(format!("element '{open}' is not closed")));
            }

            if self.starts_with("</") {
                let closed = self.end_tag(&mut stack)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(Node::Element(closed)),
                    None => return Ok(closed),
                }
            } else if self.starts_with("<!--") {
                self.skip_past("-->", "comment")?;
            } else if self.starts_with("<![CDATA[") {
                self.advance("<![CDATA[");
                let data = self.skip_past("]]>", "CDATA section")?;
                if let Some(top) = stack.last_mut() {
                    top.push_text(&normalize_newlines(data));
                }
            } else if self.starts_with("<?") {
                self.skip_past("?>", "processing instruction")?;
            } else if self.starts_with("<!") {
                return Err(self.error("unexpected markup declaration"));
            } else if self.starts_with("<") {
                if stack.len() >= MAX_DEPTH {
                    return Err(self.error(format!(
                        "elements are nested deeper than {MAX_DEPTH} levels"
                    )));
                }
                let (child, empty) = self.start_tag()?;
                if empty {
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Node::Element(child));
                    }
                } else {
                    stack.push(child);
                }
            } else {
                let text = self.text()?;
                if let Some(top) = stack.last_mut() {
                    top.push_text(&text);
                }
            }
        }
    }

    /// Reads `<name attr="v" ...>` or `<name .../>`.
    fn start_tag(&mut self) -> Result<(Element, bool), ParseError> {
        let position = self.position();
        self.expect("<")?;
        let name = self.name()?;
        let mut element = Element::new(name, position);

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some('>') => {
                    self.bump();
                    return Ok((element, false));
                }
                Some('/') => {
                    self.expect("/>")?;
                    return Ok((element, true));
                }
                Some(_) => {
                    let attr_position = self.position();
                    let attr_name = self.name()?;
                    self.skip_whitespace();
                    self.expect("=")?;
                    self.skip_whitespace();
                    let value = self.attribute_value()?;
                    if element.attribute(&attr_name).is_some() {
                        return Err(self.error_at(
                            attr_position,
                            format!("duplicate attribute '{attr_name}'"),
                        ));
                    }
                    element.attributes.push((attr_name, value));
                }
                None => {
                    return Err(self.error_at(
                        position,
                        format!("unterminated start tag '{}'", element.name),
                    ));
                }
            }
        }
    }

    fn end_tag(&mut self, stack: &mut Vec<Element>) -> Result<Element, ParseError> {
        let position = self.position();
        self.expect("</")?;
        let name = self.name()?;
        self.skip_whitespace();
        self.expect(">")?;

        match stack.pop() {
            Some(open) if open.name == name => Ok(open),
            Some(open) => Err(self.error_at(
                position,
                format!(
                    "end tag '</{name}>' does not match start tag '<{}>'",
                    open.name
                ),
            )),
            None => Err(self.error_at(position, format!("unexpected end tag '</{name}>'"))),
        }
    }

    fn name(&mut self) -> Result<String, ParseError> {
        let start = self.offset;
        match self.peek() {
            Some(c) if is_name_start(c) => {
                self.bump();
            }
            _ => return Err(self.error("expected a name")),
        }
        while matches!(self.peek(), Some(c) if is_name_char(c)) {
            self.bump();
        }
        Ok(self.input[start..self.offset].to_string())
    }

    fn attribute_value(&mut self) -> Result<String, ParseError> {
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Err(self.error("expected a quoted attribute value")),
        };
        let start = self.position();
        self.bump();

        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(value);
                }
                Some('&') => value.push(self.reference()?),
                Some('<') => return Err(self.error("'<' is not allowed in attribute values")),
                Some(_) => value.extend(self.bump()),
                None => return Err(self.error_at(start, "unterminated attribute value")),
            }
        }
    }

    fn text(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            match c {
                '<' => break,
                '&' => text.push(self.reference()?),
                _ => text.extend(self.bump()),
            }
        }
        Ok(text)
    }

    /// Decodes `&name;`, `&#NNN;` or `&#xHH;`.
    fn reference(&mut self) -> Result<char, ParseError> {
        let position = self.position();
        self.expect("&")?;
        let body = match self.rest().find(';') {
            Some(end) if end <= 32 => self.rest()[..end].to_string(),
            _ => return Err(self.error_at(position, "unterminated entity reference")),
        };
        self.advance(&body);
        self.advance(";");

        let decoded = match body.as_str() {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            numeric if numeric.starts_with("#x") || numeric.starts_with("#X") => {
                u32::from_str_radix(&numeric[2..], 16)
                    .ok()
                    .and_then(char::from_u32)
            }
            numeric if numeric.starts_with('#') => {
                numeric[1..].parse::<u32>().ok().and_then(char::from_u32)
            }
            _ => None,
        };

        decoded.ok_or_else(|| self.error_at(position, format!("unknown entity '&{body};'")))
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == ':'
}

fn is_name_char(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit() || c == '-' || c == '.' || c.is_alphanumeric()
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Streaming XML writer.
///
/// Text and attribute values are escaped here and only here; callers pass
/// strings verbatim.
pub struct XmlWriter {
    out: String,
    open: Vec<String>,
    tag_pending: bool,
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlWriter {
    /// Creates a writer and emits the XML declaration.
    pub fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"),
            open: Vec::new(),
            tag_pending: false,
        }
    }

    fn close_pending(&mut self) {
        if self.tag_pending {
            self.out.push('>');
            self.tag_pending = false;
        }
    }

    /// Opens an element.
    pub fn start_element(&mut self, name: &str) -> &mut Self {
        self.close_pending();
        self.out.push('<');
        self.out.push_str(name);
        self.open.push(name.to_string());
        self.tag_pending = true;
        self
    }

    /// Adds an attribute to the element most recently opened.
    ///
    /// Ignored once the element has content.
    pub fn attribute(&mut self, name: &str, value: &str) -> &mut Self {
        if self.tag_pending {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            escape_into(&mut self.out, value, true);
            self.out.push('"');
        }
        self
    }

    /// Writes character data inside the current element.
    pub fn characters(&mut self, text: &str) -> &mut Self {
        self.close_pending();
        escape_into(&mut self.out, text, false);
        self
    }

    /// Closes the most recently opened element.
    pub fn end_element(&mut self) -> &mut Self {
        if let Some(name) = self.open.pop() {
            if self.tag_pending {
                self.out.push_str("/>");
                self.tag_pending = false;
            } else {
                self.out.push_str("</");
                self.out.push_str(&name);
                self.out.push('>');
            }
        }
        self
    }

    /// Writes `<name>text</name>`.
    pub fn text_element(&mut self, name: &str, text: &str) -> &mut Self {
        self.start_element(name).characters(text).end_element()
    }

    /// Closes any elements still open and returns the document bytes.
    pub fn finish(mut self) -> Vec<u8> {
        while !self.open.is_empty() {
            self.end_element();
        }
        self.out.into_bytes()
    }
}

fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
