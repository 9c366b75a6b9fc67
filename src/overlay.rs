//! Highlight overlay state for editing mode.
//!
//! The overlay sits above the preview and captures every pointer event. It
//! turns pointer positions into selection queries, draws a highlight box with
//! the tag name for the element under the pointer, and freezes the hovered
//! element as the selection on click.

use crate::bridge::{BridgeRequest, BridgeResponse, SelectionTracker};
use crate::descriptor::{ElementDescriptor, Rect};

/// Highlight box drawn over the preview.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    /// Box relative to the preview viewport.
    pub rect: Rect,
    /// Label shown above the box.
    pub label: String,
}

/// Overlay state machine.
#[derive(Debug, Default)]
pub struct HighlightOverlay {
    tracker: SelectionTracker,
    hovered: Option<ElementDescriptor>,
    highlight: Option<Highlight>,
    selected: Option<ElementDescriptor>,
}

impl HighlightOverlay {
    /// Overlay with nothing hovered or selected.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer moved to client coordinates; `origin` is the preview's top-left
    /// corner in the same space. Returns the query to post to the preview.
    pub fn pointer_move(&mut self, client_x: f64, client_y: f64, origin: (f64, f64)) -> BridgeRequest {
        self.tracker
            .next_query(client_x - origin.0, client_y - origin.1)
    }

    /// Apply a reply from the preview. Stale replies are ignored.
    ///
    /// Returns whether the highlight changed.
    pub fn receive(&mut self, response: BridgeResponse) -> bool {
        let Some(response) = self.tracker.accept(response) else {
            return false;
        };
        let before = self.highlight.clone();
        match response.descriptor() {
            Some(descriptor) => {
                self.highlight = Some(Highlight {
                    rect: descriptor.rect,
                    label: descriptor.tag_name.clone(),
                });
                self.hovered = Some(descriptor);
            }
            None => self.clear_hover(),
        }
        before != self.highlight
    }

    /// Pointer left the preview.
    pub fn pointer_leave(&mut self) {
        self.clear_hover();
    }

    /// Click: freeze the hovered element as the selection.
    ///
    /// Returns the selection, or `None` when nothing is hovered (the previous
    /// selection is kept).
    pub fn click(&mut self) -> Option<ElementDescriptor> {
        let hovered = self.hovered.clone()?;
        log::debug!("[overlay] selected {hovered}");
        self.selected = Some(hovered.clone());
        Some(hovered)
    }

    /// Current highlight.
    #[must_use]
    pub fn highlight(&self) -> Option<&Highlight> {
        self.highlight.as_ref()
    }

    /// Element under the pointer.
    #[must_use]
    pub fn hovered(&self) -> Option<&ElementDescriptor> {
        self.hovered.as_ref()
    }

    /// Last frozen selection.
    #[must_use]
    pub fn selected(&self) -> Option<&ElementDescriptor> {
        self.selected.as_ref()
    }

    /// Replace the frozen selection, e.g. after an edit rebased it.
    pub fn set_selected(&mut self, descriptor: Option<ElementDescriptor>) {
        self.selected = descriptor;
    }

    /// The overlay swallows pointer events; the live app never sees them.
    #[must_use]
    pub fn intercepts_pointer(&self) -> bool {
        true
    }

    fn clear_hover(&mut self) {
        self.hovered = None;
        self.highlight = None;
    }
}
