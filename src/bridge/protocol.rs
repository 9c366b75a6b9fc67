//! Message types for the selection channel between host and preview.
//!
//! # Message Flow
//!
//! ```text
//! Host (overlay)                     Preview (bridge)
//!    |                                   |
//!    |-- get-element {x, y, seq} ------->|
//!    |                                   |-- hit test
//!    |<-- element-selected {seq, ...} ---|
//!    |<-- no-element {seq} --------------|  (point hits nothing)
//! ```
//!
//! Both directions are closed tagged unions. Anything that does not decode
//! into one of the known shapes is dropped at the boundary.

use serde::{Deserialize, Serialize};

use crate::descriptor::{ElementDescriptor, Rect};

/// Host -> preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeRequest {
    /// Hit test at a point in preview viewport coordinates.
    #[serde(rename = "get-element")]
    GetElement {
        /// Horizontal offset from the viewport's left edge.
        x: f64,
        /// Vertical offset from the viewport's top edge.
        y: f64,
        /// Query sequence number, echoed in the reply.
        #[serde(default)]
        seq: u64,
    },
}

impl BridgeRequest {
    /// Sequence number of the query.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::GetElement { seq, .. } => *seq,
        }
    }
}

/// Preview -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeResponse {
    /// An element lies under the queried point.
    #[serde(rename = "element-selected", rename_all = "camelCase")]
    ElementSelected {
        /// Sequence number of the answered query.
        #[serde(default)]
        seq: u64,
        /// Lowercase tag name.
        tag_name: String,
        /// Raw class string, tokens separated by single spaces.
        #[serde(default)]
        class_name: String,
        /// Bounding box relative to the viewport.
        rect: Rect,
        /// Trimmed text content.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_content: Option<String>,
    },
    /// Nothing lies under the queried point.
    #[serde(rename = "no-element")]
    NoElement {
        /// Sequence number of the answered query.
        #[serde(default)]
        seq: u64,
    },
}

impl BridgeResponse {
    /// Build a reply for `seq` from an optional hit.
    #[must_use]
    pub fn from_hit(seq: u64, hit: Option<ElementDescriptor>) -> Self {
        match hit {
            Some(descriptor) => Self::ElementSelected {
                seq,
                tag_name: descriptor.tag_name,
                class_name: descriptor.class_list.to_string(),
                rect: descriptor.rect,
                text_content: descriptor.inner_text,
            },
            None => Self::NoElement { seq },
        }
    }

    /// Sequence number of the answered query.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            Self::ElementSelected { seq, .. } | Self::NoElement { seq } => *seq,
        }
    }

    /// The selected element, normalized.
    #[must_use]
    pub fn descriptor(&self) -> Option<ElementDescriptor> {
        match self {
            Self::ElementSelected {
                tag_name,
                class_name,
                rect,
                text_content,
                ..
            } => {
                let mut descriptor = ElementDescriptor::new(tag_name, class_name).with_rect(*rect);
                if let Some(text) = text_content {
                    descriptor = descriptor.with_text(text);
                }
                Some(descriptor)
            }
            Self::NoElement { .. } => None,
        }
    }
}

/// Decode a host message, `None` for unknown shapes.
#[must_use]
pub fn parse_request(raw: &str) -> Option<BridgeRequest> {
    let request = serde_json::from_str::<BridgeRequest>(raw)
        .map_err(|e| log::trace!("[bridge] ignoring message: {e}"))
        .ok()?;
    let BridgeRequest::GetElement { x, y, .. } = request;
    (x.is_finite() && y.is_finite()).then_some(request)
}

/// Decode a preview message, `None` for unknown shapes.
#[must_use]
pub fn parse_response(raw: &str) -> Option<BridgeResponse> {
    serde_json::from_str(raw)
        .map_err(|e| log::trace!("[bridge] ignoring message: {e}"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = BridgeRequest::GetElement {
            x: 12.5,
            y: 40.0,
            seq: 3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "get-element", "x": 12.5, "y": 40.0, "seq": 3})
        );
    }

    #[test]
    fn test_seq_defaults_to_zero() {
        let request = parse_request(r#"{"type":"get-element","x":1,"y":2}"#).unwrap();
        assert_eq!(request.seq(), 0);
    }

    #[test]
    fn test_unknown_shapes_are_ignored() {
        assert!(parse_request(r#"{"type":"eval","code":"alert(1)"}"#).is_none());
        assert!(parse_request(r#"{"type":"get-element","x":"1","y":2}"#).is_none());
        assert!(parse_request(r#"{"x":1,"y":2}"#).is_none());
        assert!(parse_request("not json").is_none());
        assert!(parse_response(r#"{"type":"element-selected","seq":1}"#).is_none());
        assert!(parse_response(r#"{"type":"webpackOk"}"#).is_none());
    }

    #[test]
    fn test_element_selected_uses_camel_case_fields() {
        let raw = r#"{
            "type": "element-selected",
            "seq": 7,
            "tagName": "BUTTON",
            "className": "b  a",
            "rect": {"top": 1, "left": 2, "width": 3, "height": 4},
            "textContent": "  Hi "
        }"#;
        let response = parse_response(raw).unwrap();
        assert_eq!(response.seq(), 7);
        let descriptor = response.descriptor().unwrap();
        assert_eq!(descriptor.tag_name, "button");
        assert!(descriptor.matches("button", &"a b".into()));
        assert_eq!(descriptor.inner_text.as_deref(), Some("Hi"));
        assert_eq!(descriptor.rect, Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_no_element_round_trip() {
        let response = BridgeResponse::from_hit(9, None);
        let json = serde_json::to_string(&response).unwrap();
        assert_eq!(json, r#"{"type":"no-element","seq":9}"#);
        assert_eq!(parse_response(&json), Some(response));
    }
}
