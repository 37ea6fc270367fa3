//! Owned element tree the distiller rewrites.
//!
//! `scraper` gives us a lenient html5ever parse but an arena tree that is
//! awkward to restructure, so the parse is copied into plain nodes first.

use scraper::{ElementRef, Html};

use super::REMOVED_TAGS;

/// Elements serialized without an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Element depth kept when copying a parse. Anything deeper is reduced to
/// its text, so every recursive walk over [`Node`] stays shallow.
pub(crate) const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn text_content(&self) -> String {
        let mut text = String::new();
        collect_text(&self.children, &mut text);
        text
    }
}

pub(crate) fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => collect_text(&el.children, out),
        }
    }
}

/// Append a node, merging adjacent text runs.
pub(crate) fn push_node(nodes: &mut Vec<Node>, node: Node) {
    match node {
        Node::Text(text) => push_text(nodes, &text),
        element => nodes.push(element),
    }
}

pub(crate) fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = nodes.last_mut() {
        last.push_str(text);
    } else {
        nodes.push(Node::Text(text.to_string()));
    }
}

/// Parse in fragment mode so html5ever does not synthesize `<html>`,
/// `<head>` and `<body>` wrappers around the content.
pub(crate) fn parse_fragment(raw_html: &str) -> Vec<Node> {
    let fragment = Html::parse_fragment(raw_html);
    convert_children(fragment.root_element(), 0)
}

fn convert_children(parent: ElementRef<'_>, depth: usize) -> Vec<Node> {
    let mut nodes = Vec::new();
    for child in parent.children() {
        match child.value() {
            scraper::Node::Text(text) => push_text(&mut nodes, &text.text),
            scraper::Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    nodes.push(Node::Element(convert_element(element, depth)));
                }
            }
            // Comments, doctypes and processing instructions carry no content.
            _ => {}
        }
    }
    nodes
}

fn convert_element(element: ElementRef<'_>, depth: usize) -> Element {
    let value = element.value();
    let name = value.name().to_ascii_lowercase();
    let children = if depth + 1 < MAX_DEPTH {
        convert_children(element, depth + 1)
    } else if REMOVED_TAGS.contains(&name.as_str()) {
        Vec::new()
    } else {
        let mut children = Vec::new();
        push_text(&mut children, &flat_text(element));
        children
    };

    Element {
        name,
        attrs: value
            .attrs()
            .map(|(key, val)| (key.to_string(), val.to_string()))
            .collect(),
        children,
    }
}

/// Text below `element`, skipping removed subtrees. Walks with an explicit
/// stack since the subtree can be arbitrarily deep.
fn flat_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    let mut stack: Vec<_> = element.children().collect();
    stack.reverse();

    while let Some(node) = stack.pop() {
        match node.value() {
            scraper::Node::Text(t) => text.push_str(&t.text),
            scraper::Node::Element(el) => {
                if REMOVED_TAGS.contains(&el.name().to_ascii_lowercase().as_str()) {
                    continue;
                }
                let start = stack.len();
                stack.extend(node.children());
                stack[start..].reverse();
            }
            _ => {}
        }
    }
    text
}

pub(crate) fn serialize(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => escape_text(text, out),
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.name.as_str()) {
                    continue;
                }
                serialize(&el.children, out);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

fn escape_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fragment_keeps_only_body_content() {
        let nodes = parse_fragment("<div id=\"a\">Hi <b>there</b></div>");
        assert_eq!(nodes.len(), 1);
        let Node::Element(div) = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(div.name, "div");
        assert_eq!(div.attr("id"), Some("a"));
        assert_eq!(div.text_content(), "Hi there");
    }

    #[test]
    fn serialize_escapes_text_and_attributes() {
        let nodes = vec![Node::Element(Element {
            name: "a".to_string(),
            attrs: vec![("href".to_string(), "/q?a=1&b=\"2\"".to_string())],
            children: vec![Node::Text("1 < 2 & 3".to_string())],
        })];
        let mut out = String::new();
        serialize(&nodes, &mut out);
        assert_eq!(
            out,
            "<a href=\"/q?a=1&amp;b=&quot;2&quot;\">1 &lt; 2 &amp; 3</a>"
        );
    }

    #[test]
    fn deep_subtrees_are_reduced_to_text() {
        let raw = format!(
            "{}x<script>gone()</script><b>y</b>{}",
            "<section>".repeat(MAX_DEPTH + 10),
            "</section>".repeat(MAX_DEPTH + 10)
        );
        let nodes = parse_fragment(&raw);

        let mut depth = 0;
        let mut current = &nodes;
        while let [Node::Element(el)] = current.as_slice() {
            depth += 1;
            current = &el.children;
        }
        assert_eq!(depth, MAX_DEPTH);
        assert_eq!(current, &vec![Node::Text("xy".to_string())]);
    }

    #[test]
    fn deep_removed_subtrees_are_dropped() {
        let raw = format!(
            "{}{}z{}{}",
            "<section>".repeat(MAX_DEPTH - 1),
            "<label>".repeat(50_000),
            "</label>".repeat(50_000),
            "</section>".repeat(MAX_DEPTH - 1)
        );
        let nodes = parse_fragment(&raw);
        let mut text = String::new();
        collect_text(&nodes, &mut text);
        assert_eq!(text, "");
    }

    #[test]
    fn push_node_merges_adjacent_text() {
        let mut nodes = Vec::new();
        push_node(&mut nodes, Node::Text(" a ".to_string()));
        push_node(&mut nodes, Node::Text(" b ".to_string()));
        assert_eq!(nodes, vec![Node::Text(" a  b ".to_string())]);
    }
}
