use std::num::NonZeroU32;
use std::time::Duration;

use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::bus::MessageBus;
use super::types::{ExtractRequest, RelayMessage};
use crate::extract::ExtractionError;

/// Overall budget for one extraction round trip.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Asks the extraction worker for the text of `url` and waits for its reply.
///
/// The listener subscribes before the request is published so a fast reply
/// cannot be missed. Only `extracted` / `extraction-error` messages carrying
/// this request's id resolve the call; everything else on the bus is skipped.
/// The subscription is dropped on every exit path, including the timeout.
pub async fn request_extraction(
    bus: &MessageBus,
    url: &str,
    page_count: NonZeroU32,
    timeout: Duration,
) -> Result<String, ExtractionError> {
    let id = Uuid::new_v4();
    let mut listener = bus.subscribe();

    let delivered = bus.publish(RelayMessage::Extract(ExtractRequest {
        id: Some(id),
        url: url.to_string(),
        page_count: Some(page_count.get()),
    }));
    debug!(request_id = %id, delivered, "Extraction request published");

    match tokio::time::timeout(timeout, wait_for_reply(&mut listener, id)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(request_id = %id, url = %url, timeout_secs = timeout.as_secs(), "Extraction timed out");
            Err(ExtractionError::Timeout(timeout))
        }
    }
}

async fn wait_for_reply(
    listener: &mut Receiver<RelayMessage>,
    id: Uuid,
) -> Result<String, ExtractionError> {
    loop {
        match listener.recv().await {
            Ok(RelayMessage::Extracted(reply)) if reply.id == Some(id) => {
                info!(request_id = %id, chars = reply.text.len(), "Extraction reply received");
                return Ok(reply.text);
            }
            Ok(RelayMessage::ExtractionError(reply)) if reply.id == Some(id) => {
                return Err(ExtractionError::Worker(reply.error));
            }
            Ok(other) => {
                debug!(request_id = %id, kind = other.kind(), other_id = ?other.id(), "Ignoring unrelated message");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(request_id = %id, skipped, "Extraction listener lagged behind the bus");
            }
            Err(RecvError::Closed) => return Err(ExtractionError::BusClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers the first extract request on the bus after sending some noise.
    fn spawn_responder(bus: &MessageBus, reply: fn(Option<Uuid>) -> RelayMessage) {
        let mut rx = bus.subscribe();
        let bus = bus.clone();
        tokio::spawn(async move {
            while let Ok(msg) = rx.recv().await {
                if let RelayMessage::Extract(req) = msg {
                    bus.publish(RelayMessage::Other);
                    bus.publish(RelayMessage::extracted(Some(Uuid::new_v4()), "someone else"));
                    bus.publish(RelayMessage::extracted(None, "uncorrelated"));
                    bus.publish(reply(req.id));
                    break;
                }
            }
        });
    }

    fn one_page() -> NonZeroU32 {
        NonZeroU32::new(1).unwrap()
    }

    #[tokio::test]
    async fn resolves_with_matching_reply_only() {
        let bus = MessageBus::new();
        spawn_responder(&bus, |id| RelayMessage::extracted(id, "mine\n"));

        let text = request_extraction(&bus, "a.pdf", one_page(), EXTRACTION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text, "mine\n");
    }

    #[tokio::test]
    async fn worker_error_becomes_extraction_error() {
        let bus = MessageBus::new();
        spawn_responder(&bus, |id| RelayMessage::extraction_error(id, "not a pdf"));

        let err = request_extraction(&bus, "a.pdf", one_page(), EXTRACTION_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Worker(ref m) if m == "not a pdf"));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_nobody_answers() {
        let bus = MessageBus::new();
        let started = tokio::time::Instant::now();

        let err = request_extraction(&bus, "a.pdf", one_page(), EXTRACTION_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractionError::Timeout(d) if d == EXTRACTION_TIMEOUT));
        assert!(started.elapsed() >= EXTRACTION_TIMEOUT);
        assert_eq!(bus.publish(RelayMessage::Other), 0, "listener must be released");
    }

    #[tokio::test]
    async fn sends_page_count_with_request() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe();
        let responder = bus.clone();
        tokio::spawn(async move {
            if let Ok(RelayMessage::Extract(req)) = rx.recv().await {
                let text = format!("pages={}", req.page_limit());
                responder.publish(RelayMessage::extracted(req.id, text));
            }
        });

        let text = request_extraction(&bus, "a.pdf", NonZeroU32::new(4).unwrap(), EXTRACTION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(text, "pages=4");
    }
}
