//! Document XML to markdown rendering.
//!
//! The upstream platform stores rich text as a small XML vocabulary rooted
//! at `<document>`. [`render`] parses it into a [`DocumentNode`] tree and
//! renders that tree to markdown with a single exhaustive match.
//!
//! Rendering is fail-open: input that does not start with a document tag,
//! or that cannot be parsed at all, comes back unchanged. Structural
//! damage the reader can tolerate (unclosed or mismatched end tags) is
//! repaired best-effort instead of rejected.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Parsed document tree over the fixed node vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentNode {
    Text(String),
    Document(Vec<DocumentNode>),
    Paragraph(Vec<DocumentNode>),
    Bold(Vec<DocumentNode>),
    Italic(Vec<DocumentNode>),
    Underline(Vec<DocumentNode>),
    Code(Vec<DocumentNode>),
    Pre(Vec<DocumentNode>),
    Snippet {
        language: Option<String>,
        children: Vec<DocumentNode>,
    },
    Math(Vec<DocumentNode>),
    Link {
        href: String,
        children: Vec<DocumentNode>,
    },
    Heading {
        level: usize,
        children: Vec<DocumentNode>,
    },
    List {
        style: ListStyle,
        children: Vec<DocumentNode>,
    },
    ListItem(Vec<DocumentNode>),
    Image {
        src: String,
    },
    Figure(Vec<DocumentNode>),
    /// Any element outside the vocabulary; renders as its children.
    Other(Vec<DocumentNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Bullet,
    Ordered,
}

impl ListStyle {
    fn from_attr(style: Option<&str>) -> Self {
        match style {
            None | Some("bullet") => ListStyle::Bullet,
            Some(_) => ListStyle::Ordered,
        }
    }

    fn marker(self) -> &'static str {
        match self {
            ListStyle::Bullet => "- ",
            ListStyle::Ordered => "1. ",
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("malformed document xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("no <document> element found")]
    NoDocument,
}

/// Render upstream document XML to markdown.
///
/// Never fails: anything that is not a parseable document is returned
/// verbatim.
pub fn render(content: &str) -> String {
    if !looks_like_document(content) {
        return content.to_string();
    }

    match parse_document(content) {
        Ok(document) => render_node(&document).trim().to_string(),
        Err(e) => {
            tracing::warn!("Failed to convert document to markdown: {}", e);
            content.to_string()
        }
    }
}

fn looks_like_document(content: &str) -> bool {
    content.trim_start().starts_with("<document")
}

/// Parse document XML into a tree rooted at the first `<document>` element.
pub fn parse_document(xml: &str) -> Result<DocumentNode, RenderError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;

    let mut stack: Vec<OpenElement> = vec![OpenElement::root()];
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(OpenElement::from_start(&e)),
            Event::Empty(e) => {
                let node = OpenElement::from_start(&e).close();
                push_child(&mut stack, node);
            }
            Event::End(_) => {
                // Mismatched end tags close whatever is innermost.
                if stack.len() > 1 {
                    if let Some(open) = stack.pop() {
                        push_child(&mut stack, open.close());
                    }
                }
            }
            Event::Text(t) => {
                let text = decode_text(&String::from_utf8_lossy(&t));
                push_child(&mut stack, DocumentNode::Text(text));
            }
            Event::CData(c) => {
                let text = String::from_utf8_lossy(&c).into_owned();
                push_child(&mut stack, DocumentNode::Text(text));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    // Close anything left open at end of input.
    while stack.len() > 1 {
        if let Some(open) = stack.pop() {
            push_child(&mut stack, open.close());
        }
    }

    let root = stack.pop().map(|r| r.children).unwrap_or_default();
    root.into_iter()
        .find(|n| matches!(n, DocumentNode::Document(_)))
        .ok_or(RenderError::NoDocument)
}

/// Unescape XML entities one at a time, so an entity quick-xml does not
/// know (`&nbsp;`) stays verbatim without blocking its neighbours.
fn decode_text(raw: &str) -> String {
    if let Ok(text) = quick_xml::escape::unescape(raw) {
        return text.into_owned();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[..=end];
        match quick_xml::escape::unescape(entity) {
            Ok(decoded) => out.push_str(&decoded),
            Err(_) => out.push_str(entity),
        }
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

fn push_child(stack: &mut [OpenElement], node: DocumentNode) {
    if let Some(top) = stack.last_mut() {
        top.children.push(node);
    }
}

struct OpenElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<DocumentNode>,
}

impl OpenElement {
    fn root() -> Self {
        Self {
            name: String::new(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    fn from_start(e: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let attrs = e
            .attributes()
            .flatten()
            .map(|a| {
                let key = String::from_utf8_lossy(a.key.local_name().as_ref()).into_owned();
                let value = a
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
                (key, value)
            })
            .collect();
        Self {
            name,
            attrs,
            children: Vec::new(),
        }
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn close(self) -> DocumentNode {
        match self.name.as_str() {
            "document" => DocumentNode::Document(self.children),
            "paragraph" => DocumentNode::Paragraph(self.children),
            "bold" => DocumentNode::Bold(self.children),
            "italic" => DocumentNode::Italic(self.children),
            "underline" => DocumentNode::Underline(self.children),
            "code" => DocumentNode::Code(self.children),
            "pre" => DocumentNode::Pre(self.children),
            "snippet" => DocumentNode::Snippet {
                language: self
                    .attr("language")
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
                children: self.children,
            },
            "math" => DocumentNode::Math(self.children),
            "link" => DocumentNode::Link {
                href: self.attr("href").unwrap_or_default().trim().to_string(),
                children: self.children,
            },
            "heading" => DocumentNode::Heading {
                level: self
                    .attr("level")
                    .and_then(|l| l.trim().parse::<usize>().ok())
                    .unwrap_or(1)
                    .clamp(1, 6),
                children: self.children,
            },
            "list" => DocumentNode::List {
                style: ListStyle::from_attr(self.attr("style")),
                children: self.children,
            },
            "list-item" => DocumentNode::ListItem(self.children),
            "image" => DocumentNode::Image {
                src: self.attr("src").unwrap_or_default().to_string(),
            },
            "figure" => DocumentNode::Figure(self.children),
            _ => DocumentNode::Other(self.children),
        }
    }
}

/// Render one node (and its subtree) to markdown.
pub fn render_node(node: &DocumentNode) -> String {
    match node {
        DocumentNode::Text(text) => text.clone(),
        DocumentNode::Document(children) => children
            .iter()
            .filter(|c| !is_blank_text(c))
            .map(render_node)
            .collect(),
        DocumentNode::Paragraph(children) => format!("{}\n\n", render_children(children)),
        DocumentNode::Bold(children) => format!("**{}**", render_children(children)),
        DocumentNode::Italic(children) => format!("*{}*", render_children(children)),
        DocumentNode::Underline(children) => format!("__{}__", render_children(children)),
        DocumentNode::Code(children) => format!("`{}`", text_content(children)),
        DocumentNode::Pre(children) => fenced_block("", &text_content(children)),
        DocumentNode::Snippet { language, children } => {
            fenced_block(language.as_deref().unwrap_or(""), &text_content(children))
        }
        DocumentNode::Math(children) => format!("\\( {} \\)", text_content(children).trim()),
        DocumentNode::Link { href, children } => {
            let text = render_children(children);
            let text = match text.trim() {
                "" => href.as_str(),
                t => t,
            };
            format!("[{}]({})", text, href)
        }
        DocumentNode::Heading { level, children } => format!(
            "{} {}\n\n",
            "#".repeat(*level),
            render_children(children).trim()
        ),
        DocumentNode::List { style, children } => {
            let items: Vec<String> = children
                .iter()
                .filter_map(|c| match c {
                    DocumentNode::ListItem(item) => Some(list_item(*style, item)),
                    _ => None,
                })
                .collect();
            if items.is_empty() {
                String::new()
            } else {
                format!("{}\n\n", items.join("\n"))
            }
        }
        // A list item outside a list still reads as a bullet.
        DocumentNode::ListItem(children) => format!("{}\n", list_item(ListStyle::Bullet, children)),
        DocumentNode::Image { src } => format!("![Image]({})", src),
        DocumentNode::Figure(children) => find_image(children)
            .map(render_node)
            .unwrap_or_default(),
        DocumentNode::Other(children) => render_children(children),
    }
}

fn render_children(children: &[DocumentNode]) -> String {
    children.iter().map(render_node).collect()
}

fn is_blank_text(node: &DocumentNode) -> bool {
    matches!(node, DocumentNode::Text(t) if t.trim().is_empty())
}

/// Concatenated text of a subtree, ignoring markup.
fn text_content(children: &[DocumentNode]) -> String {
    let mut out = String::new();
    for child in children {
        collect_text(child, &mut out);
    }
    out
}

fn collect_text(node: &DocumentNode, out: &mut String) {
    match node {
        DocumentNode::Text(text) => out.push_str(text),
        DocumentNode::Image { .. } => {}
        DocumentNode::Document(c)
        | DocumentNode::Paragraph(c)
        | DocumentNode::Bold(c)
        | DocumentNode::Italic(c)
        | DocumentNode::Underline(c)
        | DocumentNode::Code(c)
        | DocumentNode::Pre(c)
        | DocumentNode::Math(c)
        | DocumentNode::ListItem(c)
        | DocumentNode::Figure(c)
        | DocumentNode::Other(c)
        | DocumentNode::Snippet { children: c, .. }
        | DocumentNode::Link { children: c, .. }
        | DocumentNode::Heading { children: c, .. }
        | DocumentNode::List { children: c, .. } => {
            for child in c {
                collect_text(child, out);
            }
        }
    }
}

fn fenced_block(language: &str, body: &str) -> String {
    format!("```{}\n{}\n```\n\n", language, body.trim_matches('\n'))
}

/// Render a list item, indenting continuation lines under the marker so
/// nested lists and multi-paragraph items stay attached to their item.
fn list_item(style: ListStyle, children: &[DocumentNode]) -> String {
    let marker = style.marker();
    let indent = " ".repeat(marker.len());
    let body = render_children(children);
    let mut lines = body.trim().lines();
    let mut out = format!("{}{}", marker, lines.next().unwrap_or_default());
    for line in lines {
        out.push('\n');
        if !line.trim().is_empty() {
            out.push_str(&indent);
            out.push_str(line);
        }
    }
    out
}

fn find_image(children: &[DocumentNode]) -> Option<&DocumentNode> {
    for child in children {
        match child {
            DocumentNode::Image { .. } => return Some(child),
            DocumentNode::Text(_) => {}
            DocumentNode::Document(c)
            | DocumentNode::Paragraph(c)
            | DocumentNode::Bold(c)
            | DocumentNode::Italic(c)
            | DocumentNode::Underline(c)
            | DocumentNode::Code(c)
            | DocumentNode::Pre(c)
            | DocumentNode::Math(c)
            | DocumentNode::ListItem(c)
            | DocumentNode::Figure(c)
            | DocumentNode::Other(c)
            | DocumentNode::Snippet { children: c, .. }
            | DocumentNode::Link { children: c, .. }
            | DocumentNode::Heading { children: c, .. }
            | DocumentNode::List { children: c, .. } => {
                if let Some(found) = find_image(c) {
                    return Some(found);
                }
            }
        }
    }
    None
}
