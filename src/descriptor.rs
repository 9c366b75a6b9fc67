//! Element descriptors and edit requests.
//!
//! An [`ElementDescriptor`] is the normalized structural fingerprint of a
//! rendered element: lowercased tag name plus class set, with geometry and
//! text carried along for display. The same normalization is used by the
//! selection bridge (rendered side) and the patcher (source side), so a
//! descriptor captured in the preview can be matched against syntax nodes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding rectangle relative to the preview viewport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Distance from the viewport top edge.
    pub top: f64,
    /// Distance from the viewport left edge.
    pub left: f64,
    /// Width in CSS pixels.
    pub width: f64,
    /// Height in CSS pixels.
    pub height: f64,
}

impl Rect {
    /// Create a rectangle.
    #[must_use]
    pub fn new(top: f64, left: f64, width: f64, height: f64) -> Self {
        Self {
            top,
            left,
            width,
            height,
        }
    }

    /// Whether the point lies inside the rectangle (edges inclusive).
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }

    /// The same rectangle shifted by `(-dx, -dy)`.
    #[must_use]
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            top: self.top - dy,
            left: self.left - dx,
            ..*self
        }
    }
}

/// Normalized set of class tokens.
///
/// Tokens come from whitespace splitting with empty tokens dropped.
/// Insertion order is kept for display; equality ignores order and duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassList(Vec<String>);

impl ClassList {
    /// Parse a raw `class`/`className` value.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut tokens: Vec<String> = Vec::new();
        for token in raw.split_whitespace() {
            if !tokens.iter().any(|t| t == token) {
                tokens.push(token.to_string());
            }
        }
        Self(tokens)
    }

    /// Whether the list has no tokens.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether `token` is in the set.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Iterate tokens in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    fn sorted(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.iter().collect();
        tokens.sort_unstable();
        tokens
    }
}

impl PartialEq for ClassList {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.sorted() == other.sorted()
    }
}

impl Eq for ClassList {}

impl fmt::Display for ClassList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl From<&str> for ClassList {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

/// Normalize a tag name the way the rendered document reports it.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.to_ascii_lowercase()
}

/// Normalized structural fingerprint of a rendered element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Lowercase tag name.
    pub tag_name: String,
    /// Normalized class set.
    pub class_list: ClassList,
    /// Trimmed text content, `None` when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_text: Option<String>,
    /// Bounding box relative to the preview viewport.
    #[serde(default)]
    pub rect: Rect,
}

impl ElementDescriptor {
    /// Build a descriptor from raw tag and class strings, normalizing both.
    #[must_use]
    pub fn new(tag_name: &str, class_name: &str) -> Self {
        Self {
            tag_name: normalize_tag(tag_name),
            class_list: ClassList::parse(class_name),
            inner_text: None,
            rect: Rect::default(),
        }
    }

    /// Attach text content (trimmed; empty text becomes `None`).
    #[must_use]
    pub fn with_text(mut self, text: &str) -> Self {
        let trimmed = text.trim();
        self.inner_text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Attach geometry.
    #[must_use]
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = rect;
        self
    }

    /// Whether a syntax node with this tag and class set is the same element.
    ///
    /// Only the `(tag, class set)` pair participates; text and geometry do not.
    #[must_use]
    pub fn matches(&self, tag_name: &str, class_list: &ClassList) -> bool {
        self.tag_name.eq_ignore_ascii_case(tag_name) && &self.class_list == class_list
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.class_list.is_empty() {
            write!(f, "<{}>", self.tag_name)
        } else {
            write!(f, "<{} class=\"{}\">", self.tag_name, self.class_list)
        }
    }
}

/// Textual mutation to apply to a matched element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    /// Replacement class string. `None` leaves the class attribute alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_list: Option<String>,
}

impl Mutation {
    /// Mutation replacing the class attribute with `classes`.
    #[must_use]
    pub fn set_classes(classes: impl Into<String>) -> Self {
        Self {
            class_list: Some(classes.into()),
        }
    }
}

/// A baseline descriptor plus the mutation to apply to the element it names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    /// Descriptor captured before the edit.
    pub target: ElementDescriptor,
    /// Mutation to apply.
    pub mutation: Mutation,
}

impl EditRequest {
    /// Create an edit request.
    #[must_use]
    pub fn new(target: ElementDescriptor, mutation: Mutation) -> Self {
        Self { target, mutation }
    }

    /// The descriptor that names the same element after the mutation applied.
    ///
    /// Subsequent edits must use this as their baseline; the pre-edit class
    /// set no longer exists in the source.
    #[must_use]
    pub fn rebased(&self) -> ElementDescriptor {
        let mut next = self.target.clone();
        if let Some(classes) = &self.mutation.class_list {
            next.class_list = ClassList::parse(classes);
        }
        next
    }
}
