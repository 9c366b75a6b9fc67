//! Laid-out render tree used for hit testing.
//!
//! Rectangles are in document coordinates; the viewport scroll offset maps
//! them to the viewport coordinates used on the selection channel.

use serde::{Deserialize, Serialize};

use super::ElementSource;
use crate::descriptor::{ElementDescriptor, Rect};

/// A node of the rendered document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderNode {
    /// A laid-out element.
    Element(RenderElement),
    /// A text node. Never a hit-test target.
    Text(String),
}

/// A laid-out element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderElement {
    /// Tag name as reported by the renderer.
    pub tag: String,
    /// Raw class attribute.
    #[serde(default)]
    pub class_name: String,
    /// Box in document coordinates.
    pub rect: Rect,
    /// Children in paint order; later siblings paint on top.
    #[serde(default)]
    pub children: Vec<RenderNode>,
}

impl RenderElement {
    /// Create a childless element.
    #[must_use]
    pub fn new(tag: &str, class_name: &str, rect: Rect) -> Self {
        Self {
            tag: tag.to_string(),
            class_name: class_name.to_string(),
            rect,
            children: Vec::new(),
        }
    }

    /// Append a child element.
    #[must_use]
    pub fn child(mut self, child: RenderElement) -> Self {
        self.children.push(RenderNode::Element(child));
        self
    }

    /// Append a text node.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.children.push(RenderNode::Text(text.to_string()));
        self
    }

    fn text_content(&self, out: &mut String) {
        for child in &self.children {
            match child {
                RenderNode::Text(text) => out.push_str(text),
                RenderNode::Element(element) => element.text_content(out),
            }
        }
    }

    /// Innermost element containing the document point.
    fn hit(&self, x: f64, y: f64) -> Option<&RenderElement> {
        if !self.rect.contains(x, y) {
            return None;
        }
        let inner = self.children.iter().rev().find_map(|child| match child {
            RenderNode::Element(element) => element.hit(x, y),
            RenderNode::Text(_) => None,
        });
        Some(inner.unwrap_or(self))
    }
}

/// The preview's rendered document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderTree {
    /// Root elements in paint order.
    pub roots: Vec<RenderElement>,
    /// Horizontal scroll offset of the viewport.
    #[serde(default)]
    pub scroll_x: f64,
    /// Vertical scroll offset of the viewport.
    #[serde(default)]
    pub scroll_y: f64,
}

impl RenderTree {
    /// Tree with the given roots and no scroll.
    #[must_use]
    pub fn new(roots: Vec<RenderElement>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Set the viewport scroll offset.
    #[must_use]
    pub fn scrolled(mut self, scroll_x: f64, scroll_y: f64) -> Self {
        self.scroll_x = scroll_x;
        self.scroll_y = scroll_y;
        self
    }
}

impl ElementSource for RenderTree {
    fn element_at(&self, x: f64, y: f64) -> Option<ElementDescriptor> {
        let (doc_x, doc_y) = (x + self.scroll_x, y + self.scroll_y);
        let element = self.roots.iter().rev().find_map(|root| root.hit(doc_x, doc_y))?;
        let mut text = String::new();
        element.text_content(&mut text);
        Some(
            ElementDescriptor::new(&element.tag, &element.class_name)
                .with_rect(element.rect.offset(self.scroll_x, self.scroll_y))
                .with_text(&text),
        )
    }
}
