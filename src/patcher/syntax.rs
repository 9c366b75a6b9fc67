//! Typed syntax tree for inline markup found in script source.
//!
//! Only the markup layer is modeled. Script code between markup roots is not
//! represented; it is scanned and skipped by the parser. Every node carries
//! the byte span it occupies in the source so edits can be spliced back
//! without regenerating unrelated text.

use std::ops::ControlFlow;

use crate::descriptor::ClassList;

/// Attribute that carries the element's classes.
pub const CLASS_ATTRIBUTE: &str = "className";

/// Half-open byte range `[start, end)` into the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First byte.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

impl Span {
    /// Create a span.
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Source text covered by the span.
    #[must_use]
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Parsed markup roots of one source file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    /// Top-level markup nodes in document order.
    pub nodes: Vec<Node>,
}

/// A markup node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// `<tag ...>...</tag>` or `<tag ... />`.
    Element(Element),
    /// `<>...</>`.
    Fragment(Fragment),
    /// Literal text between tags.
    Text(Text),
    /// `{ ... }` container, possibly holding nested markup.
    Expression(Expression),
}

/// Element name as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementName {
    /// Plain identifier such as `div` or `Button`.
    Identifier(String),
    /// Member access such as `Foo.Bar`.
    Member(String),
    /// Namespaced name such as `svg:rect`.
    Namespaced(String),
}

impl ElementName {
    /// Name text as it appears in the source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Identifier(name) | Self::Member(name) | Self::Namespaced(name) => name,
        }
    }
}

/// Element node.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Element name.
    pub name: ElementName,
    /// Span of the name in the opening tag.
    pub name_span: Span,
    /// Attributes in source order.
    pub attributes: Vec<AttributeItem>,
    /// Byte offset just after the last attribute (or the name).
    pub attributes_end: usize,
    /// Child nodes.
    pub children: Vec<Node>,
    /// Whether written as `<tag />`.
    pub self_closing: bool,
    /// Span of the whole element including the closing tag.
    pub span: Span,
}

impl Element {
    /// Tag name when the element has a plain identifier name.
    #[must_use]
    pub fn tag_name(&self) -> Option<&str> {
        match &self.name {
            ElementName::Identifier(name) => Some(name),
            ElementName::Member(_) | ElementName::Namespaced(_) => None,
        }
    }

    /// The class attribute, if present.
    #[must_use]
    pub fn class_attribute(&self) -> Option<&Attribute> {
        self.attributes.iter().find_map(|item| match item {
            AttributeItem::Attribute(attr) if attr.name == CLASS_ATTRIBUTE => Some(attr),
            _ => None,
        })
    }

    /// Normalized class set.
    ///
    /// Only literal values count; a dynamic expression yields the empty set.
    #[must_use]
    pub fn class_list(&self) -> ClassList {
        self.class_attribute()
            .and_then(Attribute::literal_value)
            .map(ClassList::parse)
            .unwrap_or_default()
    }
}

/// Fragment node.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// Child nodes.
    pub children: Vec<Node>,
    /// Span of the whole fragment.
    pub span: Span,
}

/// Text node.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    /// Span of the text.
    pub span: Span,
}

/// Expression container `{ ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    /// Span including the braces.
    pub span: Span,
    /// Markup nested anywhere inside the expression.
    pub nodes: Vec<Node>,
    /// Set when the container holds nothing but one string literal.
    pub string: Option<StringLiteral>,
}

/// String literal (attribute value or sole content of a container).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    /// Span including the quotes.
    pub span: Span,
    /// Quote character used.
    pub quote: char,
    /// Decoded value.
    pub value: String,
}

/// Item in an element's attribute list.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeItem {
    /// `name`, `name="v"`, `name={expr}`.
    Attribute(Attribute),
    /// `{...props}`.
    Spread(Expression),
}

impl AttributeItem {
    /// Span of the item.
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Attribute(attr) => attr.span,
            Self::Spread(expr) => expr.span,
        }
    }
}

/// Named attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Span of the whole attribute.
    pub span: Span,
    /// Value, `None` for a bare attribute.
    pub value: Option<AttributeValue>,
}

impl Attribute {
    /// Literal string value, looking through `{"..."}` containers.
    #[must_use]
    pub fn literal_value(&self) -> Option<&str> {
        match self.value.as_ref()? {
            AttributeValue::String(lit) => Some(&lit.value),
            AttributeValue::Expression(expr) => expr.string.as_ref().map(|lit| lit.value.as_str()),
            AttributeValue::Element(_) => None,
        }
    }
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Quoted markup string.
    String(StringLiteral),
    /// Expression container.
    Expression(Expression),
    /// Markup used directly as a value.
    Element(Box<Node>),
}

/// Visit every element in pre-order: the element, then markup inside its
/// attribute values, then its children.
///
/// Returning `ControlFlow::Break` stops the walk.
pub fn walk_elements<'a, B>(
    nodes: &'a [Node],
    visit: &mut impl FnMut(&'a Element) -> ControlFlow<B>,
) -> ControlFlow<B> {
    for node in nodes {
        walk_node(node, visit)?;
    }
    ControlFlow::Continue(())
}

fn walk_node<'a, B>(
    node: &'a Node,
    visit: &mut impl FnMut(&'a Element) -> ControlFlow<B>,
) -> ControlFlow<B> {
    match node {
        Node::Element(element) => {
            visit(element)?;
            for item in &element.attributes {
                match item {
                    AttributeItem::Attribute(attr) => match &attr.value {
                        Some(AttributeValue::Expression(expr)) => walk_elements(&expr.nodes, visit)?,
                        Some(AttributeValue::Element(inner)) => walk_node(inner, visit)?,
                        Some(AttributeValue::String(_)) | None => {}
                    },
                    AttributeItem::Spread(expr) => walk_elements(&expr.nodes, visit)?,
                }
            }
            walk_elements(&element.children, visit)
        }
        Node::Fragment(fragment) => walk_elements(&fragment.children, visit),
        Node::Expression(expr) => walk_elements(&expr.nodes, visit),
        Node::Text(_) => ControlFlow::Continue(()),
    }
}

impl Document {
    /// Visit elements in document order.
    pub fn walk_elements<'a, B>(
        &'a self,
        visit: &mut impl FnMut(&'a Element) -> ControlFlow<B>,
    ) -> ControlFlow<B> {
        walk_elements(&self.nodes, visit)
    }

    /// First element in document order satisfying `predicate`.
    #[must_use]
    pub fn find_element(&self, mut predicate: impl FnMut(&Element) -> bool) -> Option<&Element> {
        match self.walk_elements(&mut |element| {
            if predicate(element) {
                ControlFlow::Break(element)
            } else {
                ControlFlow::Continue(())
            }
        }) {
            ControlFlow::Break(element) => Some(element),
            ControlFlow::Continue(()) => None,
        }
    }

    /// Count elements (all variants of names included).
    #[must_use]
    pub fn element_count(&self) -> usize {
        let mut count = 0;
        let _ = self.walk_elements::<()>(&mut |_| {
            count += 1;
            ControlFlow::Continue(())
        });
        count
    }
}
