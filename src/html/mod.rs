//! HTML distillation.
//!
//! Reduces raw web pages to the few tags a model can usefully reason about:
//! block structure (`div`, headings, lists, tables), link targets when they
//! matter, and plain text. Everything else (scripts, styling, media, forms,
//! navigation chrome, attributes) is dropped and whitespace is collapsed.
//!
//! The process is total: malformed markup is repaired by the html5ever parser
//! behind `scraper`, and distilling already-distilled output is a no-op.

mod dom;

use once_cell::sync::Lazy;
use regex::Regex;

use dom::{push_node, push_text, Element, Node};

/// Elements removed together with everything inside them.
///
/// `g-section-with-header` is intentionally absent: it holds the "Top
/// stories" block on search result pages.
pub const REMOVED_TAGS: &[&str] = &[
    "aside",
    "base",
    "br",
    "button",
    "cite",
    "cnx",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "g-dropdown-button",
    "g-dropdown-menu-button",
    "g-fab",
    "g-img",
    "g-inner-card",
    "g-left-button",
    "g-link",
    "g-loading-icon",
    "g-more-linkg-menu-item",
    "g-popup",
    "g-radio-button-group",
    "g-right-button",
    "g-scrolling-carousel",
    "g-snackbar",
    "g-white-loading-icon",
    "google-read-aloud-player",
    "head",
    "hr",
    "iframe",
    "img",
    "input",
    "label",
    "link",
    "meta",
    "nav",
    "next-route-announcer",
    "noembed",
    "noframes",
    "noscript",
    "option",
    "plaintext",
    "promo-throttler",
    "script",
    "select",
    "style",
    "svg",
    "title",
    "xmp",
];

/// The only attributes that survive distillation.
const KEPT_ATTRIBUTES: &[&str] = &["href"];

/// Inline wrappers replaced by their text.
const FLATTENED_TAGS: &[&str] = &["span", "p"];

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Options for [`Document::distill`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DistillOptions {
    /// Replace `<a>` elements with their text as well.
    pub remove_links: bool,
}

/// A parsed page that can be distilled and filtered before serialization.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    /// Parse uncontrolled HTML. Never fails.
    pub fn parse(raw_html: &str) -> Self {
        Self {
            nodes: dom::parse_fragment(raw_html),
        }
    }

    /// Apply every distillation pass to the tree.
    pub fn distill(&mut self, options: DistillOptions) {
        let nodes = std::mem::take(&mut self.nodes);
        self.nodes = clean_nodes(nodes, options);
    }

    /// Remove every `<a>` (with its content) whose `href` satisfies `predicate`.
    /// Anchors without an `href` are kept.
    pub fn remove_links_where<F>(&mut self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        let nodes = std::mem::take(&mut self.nodes);
        self.nodes = filter_links(nodes, &predicate);
    }

    /// Serialize and collapse every whitespace run to a single space.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        dom::serialize(&self.nodes, &mut html);
        WHITESPACE.replace_all(&html, " ").into_owned()
    }
}

/// Reduce HTML to the minimal tags necessary to understand the content.
/// With `remove_links`, `<a>` tags are replaced by their inner text too.
pub fn distill(raw_html: &str, remove_links: bool) -> String {
    let mut document = Document::parse(raw_html);
    document.distill(DistillOptions { remove_links });
    document.to_html()
}

fn is_flattened(name: &str, options: DistillOptions) -> bool {
    FLATTENED_TAGS.contains(&name) || (options.remove_links && name == "a")
}

/// Children are cleaned before their parent is judged, so text-based
/// decisions (flattening, empty divs) only see content that survives.
fn clean_nodes(nodes: Vec<Node>, options: DistillOptions) -> Vec<Node> {
    let mut cleaned = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(text) => push_text(&mut cleaned, &text),
            Node::Element(element) => {
                if let Some(node) = clean_element(element, options) {
                    push_node(&mut cleaned, node);
                }
            }
        }
    }
    cleaned
}

fn clean_element(element: Element, options: DistillOptions) -> Option<Node> {
    if REMOVED_TAGS.contains(&element.name.as_str()) {
        return None;
    }

    let Element {
        name,
        attrs,
        children,
    } = element;
    let children = clean_nodes(children, options);

    if is_flattened(&name, options) {
        let mut text = String::from(" ");
        dom::collect_text(&children, &mut text);
        text.push(' ');
        return Some(Node::Text(text));
    }

    let attrs = attrs
        .into_iter()
        .filter(|(key, _)| KEPT_ATTRIBUTES.contains(&key.as_str()))
        .collect();
    let mut element = Element {
        name,
        attrs,
        children,
    };

    if element.name == "div" {
        if element.text_content().trim().is_empty() {
            return None;
        }
        while let Some(inner) = sole_div_child(&mut element) {
            element = inner;
        }
    }

    Some(Node::Element(element))
}

/// Take the child of a `<div>` whose only non-blank child is another `<div>`.
fn sole_div_child(element: &mut Element) -> Option<Element> {
    if element.name != "div" {
        return None;
    }

    let mut sole = None;
    for (index, child) in element.children.iter().enumerate() {
        match child {
            Node::Text(text) if text.trim().is_empty() => {}
            Node::Element(child) if child.name == "div" && sole.is_none() => sole = Some(index),
            _ => return None,
        }
    }

    let index = sole?;
    match element.children.swap_remove(index) {
        Node::Element(inner) => Some(inner),
        Node::Text(_) => None,
    }
}

fn filter_links<F>(nodes: Vec<Node>, predicate: &F) -> Vec<Node>
where
    F: Fn(&str) -> bool,
{
    let mut kept = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Element(mut element) => {
                if element.name == "a" && element.attr("href").is_some_and(predicate) {
                    continue;
                }
                element.children = filter_links(element.children, predicate);
                push_node(&mut kept, Node::Element(element));
            }
            text => push_node(&mut kept, text),
        }
    }
    kept
}
