//! Selection bridge between the host and the live preview.
//!
//! The preview side answers hit-test queries against its rendered document
//! ([`SelectionBridge`]); the host side stamps queries with sequence numbers
//! and drops replies that are no longer current ([`SelectionTracker`]).
//! Lookups are fire-and-forget: a pointer move never waits for its reply.

pub mod document;
pub mod protocol;

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::descriptor::ElementDescriptor;
pub use document::{RenderElement, RenderNode, RenderTree};
pub use protocol::{parse_request, parse_response, BridgeRequest, BridgeResponse};

/// Hit testing against a rendered document.
///
/// Coordinates are relative to the preview viewport's top-left corner.
pub trait ElementSource: Send + Sync {
    /// Innermost element under the point, `None` when nothing is there.
    fn element_at(&self, x: f64, y: f64) -> Option<ElementDescriptor>;
}

impl<T: ElementSource + ?Sized> ElementSource for Arc<T> {
    fn element_at(&self, x: f64, y: f64) -> Option<ElementDescriptor> {
        (**self).element_at(x, y)
    }
}

/// Preview-side responder.
#[derive(Debug)]
pub struct SelectionBridge<S> {
    source: S,
}

impl<S: ElementSource> SelectionBridge<S> {
    /// Bridge answering from `source`.
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// Answer one query. A point over nothing yields `NoElement`.
    pub fn handle(&self, request: &BridgeRequest) -> BridgeResponse {
        match *request {
            BridgeRequest::GetElement { x, y, seq } => {
                BridgeResponse::from_hit(seq, self.source.element_at(x, y))
            }
        }
    }

    /// Answer only the newest query of a batch.
    pub fn handle_latest<I>(&self, batch: I) -> Option<BridgeResponse>
    where
        I: IntoIterator<Item = BridgeRequest>,
    {
        let latest = batch.into_iter().max_by_key(BridgeRequest::seq)?;
        Some(self.handle(&latest))
    }

    /// Answer a raw wire message. Unknown shapes get no reply.
    pub fn handle_message(&self, raw: &str) -> Option<String> {
        let request = parse_request(raw)?;
        serde_json::to_string(&self.handle(&request))
            .map_err(|e| log::warn!("[bridge] failed to encode reply: {e}"))
            .ok()
    }
}

/// Host-side sequence bookkeeping for selection queries.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    last_sent: u64,
}

impl SelectionTracker {
    /// Fresh tracker; the first query gets sequence 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp a query for the point.
    pub fn next_query(&mut self, x: f64, y: f64) -> BridgeRequest {
        self.last_sent += 1;
        BridgeRequest::GetElement {
            x,
            y,
            seq: self.last_sent,
        }
    }

    /// Sequence number of the newest query sent.
    #[must_use]
    pub fn last_sent(&self) -> u64 {
        self.last_sent
    }

    /// Keep a reply only if it answers the newest query.
    #[must_use]
    pub fn accept(&self, response: BridgeResponse) -> Option<BridgeResponse> {
        if response.seq() == self.last_sent {
            Some(response)
        } else {
            log::trace!(
                "[bridge] dropping stale reply seq={} (latest {})",
                response.seq(),
                self.last_sent
            );
            None
        }
    }
}

/// Run a bridge as a task.
///
/// Each wake-up drains everything queued and answers only the newest query,
/// so a burst of pointer moves produces one reply. The task ends when either
/// channel closes.
pub fn spawn_bridge<S>(
    source: S,
    mut requests: mpsc::UnboundedReceiver<BridgeRequest>,
    responses: mpsc::UnboundedSender<BridgeResponse>,
) -> JoinHandle<()>
where
    S: ElementSource + 'static,
{
    let bridge = SelectionBridge::new(source);
    tokio::spawn(async move {
        while let Some(first) = requests.recv().await {
            let mut batch = vec![first];
            while let Ok(next) = requests.try_recv() {
                batch.push(next);
            }
            let Some(response) = bridge.handle_latest(batch) else {
                continue;
            };
            if responses.send(response).is_err() {
                break;
            }
        }
        log::debug!("[bridge] selection channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Rect;

    fn tree() -> RenderTree {
        RenderTree::new(vec![RenderElement::new("main", "layout", Rect::new(0.0, 0.0, 400.0, 400.0))
            .child(RenderElement::new("button", "a b", Rect::new(10.0, 10.0, 50.0, 20.0)).text("Hi"))])
    }

    #[test]
    fn test_handle_hit_and_miss() {
        let bridge = SelectionBridge::new(tree());
        let hit = bridge.handle(&BridgeRequest::GetElement {
            x: 20.0,
            y: 15.0,
            seq: 1,
        });
        match hit {
            BridgeResponse::ElementSelected {
                seq,
                ref tag_name,
                ref class_name,
                ref text_content,
                ..
            } => {
                assert_eq!(seq, 1);
                assert_eq!(tag_name, "button");
                assert_eq!(class_name, "a b");
                assert_eq!(text_content.as_deref(), Some("Hi"));
            }
            BridgeResponse::NoElement { .. } => panic!("expected a hit"),
        }

        let miss = bridge.handle(&BridgeRequest::GetElement {
            x: 500.0,
            y: 15.0,
            seq: 2,
        });
        assert_eq!(miss, BridgeResponse::NoElement { seq: 2 });
    }

    #[test]
    fn test_handle_latest_answers_newest_only() {
        let bridge = SelectionBridge::new(tree());
        let mut tracker = SelectionTracker::new();
        let batch = vec![
            tracker.next_query(20.0, 15.0),
            tracker.next_query(300.0, 300.0),
            tracker.next_query(500.0, 500.0),
        ];
        let response = bridge.handle_latest(batch).unwrap();
        assert_eq!(response, BridgeResponse::NoElement { seq: 3 });
        assert!(bridge.handle_latest(Vec::new()).is_none());
    }

    #[test]
    fn test_handle_message_ignores_unknown() {
        let bridge = SelectionBridge::new(tree());
        assert!(bridge.handle_message(r#"{"type":"reload"}"#).is_none());
        let reply = bridge
            .handle_message(r#"{"type":"get-element","x":350,"y":350,"seq":4}"#)
            .unwrap();
        let parsed = parse_response(&reply).unwrap();
        assert_eq!(parsed.descriptor().unwrap().tag_name, "main");
        assert_eq!(parsed.seq(), 4);
    }

    #[test]
    fn test_tracker_drops_stale_replies() {
        let mut tracker = SelectionTracker::new();
        let first = tracker.next_query(1.0, 1.0);
        let second = tracker.next_query(2.0, 2.0);
        assert_eq!((first.seq(), second.seq()), (1, 2));
        assert!(tracker.accept(BridgeResponse::NoElement { seq: 1 }).is_none());
        assert!(tracker.accept(BridgeResponse::NoElement { seq: 2 }).is_some());
    }

    #[tokio::test]
    async fn test_spawned_bridge_coalesces_bursts() {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (resp_tx, mut resp_rx) = mpsc::unbounded_channel();
        let mut tracker = SelectionTracker::new();
        for _ in 0..5 {
            req_tx.send(tracker.next_query(20.0, 15.0)).unwrap();
        }
        let handle = spawn_bridge(Arc::new(tree()), req_rx, resp_tx);

        let response = resp_rx.recv().await.unwrap();
        assert_eq!(response.seq(), 5);
        assert!(tracker.accept(response).is_some());

        drop(req_tx);
        handle.await.unwrap();
        assert!(resp_rx.recv().await.is_none());
    }
}
