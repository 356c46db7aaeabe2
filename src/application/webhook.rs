//! Webhook notification handling.
//!
//! Push notifications arrive as Atom XML enumerating changed video ids. A
//! malformed payload is counted and acknowledged rather than rejected, so
//! the hub never enters a retry storm over a body we will never parse.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;
use tracing::{info, warn};

use crate::application::sync::{SyncEngine, SyncError};

#[derive(Debug, Error)]
#[error("malformed notification payload: {0}")]
pub struct ParseError(String);

/// Counters exposed on the status surface.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct WebhookStats {
    pub received: u64,
    pub processed: u64,
    pub parse_failures: u64,
}

/// Outcome of one notification, acknowledged either way.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct NotificationOutcome {
    pub video_ids: Vec<String>,
    pub videos_added: i64,
    pub videos_updated: i64,
    pub parse_failed: bool,
}

/// Extract the video ids announced in an Atom notification, deduplicated
/// in document order.
pub fn parse_video_ids(payload: &str) -> Result<Vec<String>, ParseError> {
    let mut reader = Reader::from_str(payload);
    reader.config_mut().trim_text(true);

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut in_video_id = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                in_video_id = element.local_name().as_ref() == b"videoId";
            }
            Ok(Event::End(_)) => {
                in_video_id = false;
            }
            Ok(Event::Text(text)) if in_video_id => {
                let id = text
                    .unescape()
                    .map_err(|err| ParseError(err.to_string()))?
                    .into_owned();
                if !id.is_empty() && seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(ParseError(err.to_string())),
        }
    }

    Ok(ids)
}

pub struct WebhookService {
    engine: Arc<SyncEngine>,
    received: AtomicU64,
    processed: AtomicU64,
    parse_failures: AtomicU64,
}

impl WebhookService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            received: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> WebhookStats {
        WebhookStats {
            received: self.received.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
        }
    }

    /// Handle one notification body. Parse failures are swallowed into the
    /// outcome; upstream/persistence failures during enrichment propagate.
    pub async fn handle_notification(
        &self,
        payload: &str,
    ) -> Result<NotificationOutcome, SyncError> {
        self.received.fetch_add(1, Ordering::Relaxed);
        counter!("vodsync_webhook_received_total").increment(1);

        let video_ids = match parse_video_ids(payload) {
            Ok(ids) => ids,
            Err(err) => {
                self.parse_failures.fetch_add(1, Ordering::Relaxed);
                counter!("vodsync_webhook_parse_failure_total").increment(1);
                warn!(
                    target = "vodsync::webhook",
                    error = %err,
                    payload_len = payload.len(),
                    "Unparseable notification acknowledged"
                );
                return Ok(NotificationOutcome {
                    parse_failed: true,
                    ..Default::default()
                });
            }
        };

        if video_ids.is_empty() {
            return Ok(NotificationOutcome::default());
        }

        let report = self.engine.enrich(&video_ids).await?;
        // Processed counts unique ids, not deliveries.
        self.processed
            .fetch_add(video_ids.len() as u64, Ordering::Relaxed);
        counter!("vodsync_webhook_processed_total").increment(video_ids.len() as u64);
        info!(
            target = "vodsync::webhook",
            videos = video_ids.len(),
            added = report.videos_added,
            updated = report.videos_updated,
            "Notification processed"
        );

        Ok(NotificationOutcome {
            video_ids,
            videos_added: report.videos_added,
            videos_updated: report.videos_updated,
            parse_failed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTIFICATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns:yt="http://www.youtube.com/xml/schemas/2015"
      xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>yt:video:dQw4w9WgXcQ</id>
    <yt:videoId>dQw4w9WgXcQ</yt:videoId>
    <yt:channelId>UC123</yt:channelId>
    <title>An updated video</title>
  </entry>
  <entry>
    <yt:videoId>abc123def45</yt:videoId>
  </entry>
  <entry>
    <yt:videoId>dQw4w9WgXcQ</yt:videoId>
  </entry>
</feed>"#;

    #[test]
    fn extracts_and_deduplicates_video_ids() {
        let ids = parse_video_ids(NOTIFICATION).unwrap();
        assert_eq!(ids, vec!["dQw4w9WgXcQ", "abc123def45"]);
    }

    #[test]
    fn empty_feed_yields_no_ids() {
        let ids = parse_video_ids(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#,
        )
        .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn mismatched_tags_are_a_parse_error() {
        assert!(parse_video_ids("<feed><entry></feed>").is_err());
    }
}
