use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tracing::{debug, info, warn};

use super::document::DocumentLoader;
use super::error::ExtractionError;
use crate::relay::transport::{LineTransport, StdioTransport};
use crate::relay::types::{ExtractRequest, RelayMessage};
use crate::relay::MessageBus;

/// Opens `locator` and concatenates the text of its first `page_limit` pages.
///
/// Pages are visited in ascending order starting at 1 and each page's text is
/// followed by `\n`. A limit beyond the document's page count is clamped.
/// Pages past the limit are never decoded.
pub async fn extract_text(
    loader: &dyn DocumentLoader,
    locator: &str,
    page_limit: usize,
) -> Result<String, ExtractionError> {
    let document = loader.open(locator).await?;
    let total = document.page_count();
    let pages = page_limit.min(total);
    debug!(target: "extraction_worker", total, page_limit, pages, "Extracting pages");

    tokio::task::spawn_blocking(move || {
        let mut text = String::new();
        for page in 1..=pages {
            text.push_str(&document.page_text(page)?);
            text.push('\n');
        }
        Ok(text)
    })
    .await
    .map_err(|e| ExtractionError::Parse(format!("PDF parser aborted: {}", e)))?
}

/// Serves extraction requests. Exactly one reply is produced per request.
pub struct ExtractionWorker {
    loader: Arc<dyn DocumentLoader>,
}

impl ExtractionWorker {
    pub fn new(loader: Arc<dyn DocumentLoader>) -> Self {
        Self { loader }
    }

    pub async fn handle(&self, request: &ExtractRequest) -> RelayMessage {
        info!(target: "extraction_worker", url = %request.url, request_id = ?request.id, "Extraction requested");

        match extract_text(self.loader.as_ref(), &request.url, request.page_limit()).await {
            Ok(text) => RelayMessage::extracted(request.id, text),
            Err(e) => {
                warn!(target: "extraction_worker", url = %request.url, error = %e, "Extraction failed");
                RelayMessage::extraction_error(request.id, e.to_string())
            }
        }
    }

    /// Processes `extract` messages from the bus one at a time until the bus
    /// closes. Other message types are ignored.
    pub async fn run(&self, mut inbox: Receiver<RelayMessage>, bus: MessageBus) {
        loop {
            match inbox.recv().await {
                Ok(RelayMessage::Extract(request)) => {
                    let reply = self.handle(&request).await;
                    bus.publish(reply);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(target: "extraction_worker", skipped, "Worker lagged behind the bus; requests were dropped");
                }
                Err(RecvError::Closed) => {
                    debug!(target: "extraction_worker", "Bus closed; worker stopping");
                    break;
                }
            }
        }
    }

    /// Runs the worker standalone, reading requests as JSON lines on stdin and
    /// answering on stdout.
    pub async fn serve_stdio(&self) -> Result<()> {
        info!(target: "extraction_worker", "Extraction worker listening on stdio");
        self.serve(&mut StdioTransport::stdio()).await
    }

    /// Answers every `extract` line on `transport` until its input closes.
    pub async fn serve<R, W>(&self, transport: &mut LineTransport<R, W>) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            match transport.read_message().await {
                Ok(Some(RelayMessage::Extract(request))) => {
                    let reply = self.handle(&request).await;
                    transport.write_message(&reply).await?;
                }
                Ok(Some(other)) => {
                    debug!(target: "extraction_worker", kind = other.kind(), "Ignoring message");
                }
                Ok(None) => {
                    info!(target: "extraction_worker", "Input closed");
                    break;
                }
                Err(e) => {
                    warn!(target: "extraction_worker", "Skipping unreadable message: {:#}", e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::extract::document::{ExtractedPages, PdfDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Loader serving a fixed set of pages, optionally failing on one page.
    pub(crate) struct FakeLoader {
        pub pages: Vec<String>,
        pub fail_on_page: Option<usize>,
        pub opens: AtomicUsize,
    }

    impl FakeLoader {
        pub(crate) fn with_pages(pages: &[&str]) -> Self {
            Self {
                pages: pages.iter().map(|p| p.to_string()).collect(),
                fail_on_page: None,
                opens: AtomicUsize::new(0),
            }
        }
    }

    struct FlakyDocument {
        inner: ExtractedPages,
        fail_on_page: Option<usize>,
    }

    impl PdfDocument for FlakyDocument {
        fn page_count(&self) -> usize {
            self.inner.page_count()
        }

        fn page_text(&self, page: usize) -> Result<String, ExtractionError> {
            if self.fail_on_page == Some(page) {
                return Err(ExtractionError::Parse(format!("bad content stream on page {}", page)));
            }
            self.inner.page_text(page)
        }
    }

    #[async_trait]
    impl DocumentLoader for FakeLoader {
        async fn open(&self, locator: &str) -> Result<Box<dyn PdfDocument>, ExtractionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if locator.ends_with(".html") {
                return Err(ExtractionError::NotPdf("text/html".to_string()));
            }
            Ok(Box::new(FlakyDocument {
                inner: ExtractedPages::new(self.pages.clone()),
                fail_on_page: self.fail_on_page,
            }))
        }
    }

    #[tokio::test]
    async fn extracts_min_of_limit_and_total_pages_in_order() {
        let loader = FakeLoader::with_pages(&["one", "two", "three"]);

        assert_eq!(extract_text(&loader, "a.pdf", 1).await.unwrap(), "one\n");
        assert_eq!(
            extract_text(&loader, "a.pdf", 2).await.unwrap(),
            "one\ntwo\n"
        );
        assert_eq!(
            extract_text(&loader, "a.pdf", 3).await.unwrap(),
            "one\ntwo\nthree\n"
        );
    }

    #[tokio::test]
    async fn limit_beyond_page_count_is_clamped() {
        let loader = FakeLoader::with_pages(&["only page"]);
        assert_eq!(
            extract_text(&loader, "a.pdf", 10).await.unwrap(),
            "only page\n"
        );
    }

    #[tokio::test]
    async fn page_failure_fails_the_whole_extraction() {
        let mut loader = FakeLoader::with_pages(&["one", "two"]);
        loader.fail_on_page = Some(2);

        assert!(extract_text(&loader, "a.pdf", 1).await.is_ok());
        assert!(matches!(
            extract_text(&loader, "a.pdf", 2).await,
            Err(ExtractionError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn handle_replies_with_exactly_one_outcome_echoing_the_id() {
        let worker = ExtractionWorker::new(Arc::new(FakeLoader::with_pages(&["p1", "p2"])));
        let id = Some(Uuid::new_v4());

        let ok = worker
            .handle(&ExtractRequest {
                id,
                url: "a.pdf".to_string(),
                page_count: Some(2),
            })
            .await;
        assert_eq!(ok, RelayMessage::extracted(id, "p1\np2\n"));

        let err = worker
            .handle(&ExtractRequest {
                id,
                url: "index.html".to_string(),
                page_count: None,
            })
            .await;
        match err {
            RelayMessage::ExtractionError(reply) => {
                assert_eq!(reply.id, id);
                assert!(reply.error.contains("not a PDF"));
            }
            other => panic!("expected extraction-error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn serve_answers_json_lines_in_order() {
        let worker = ExtractionWorker::new(Arc::new(FakeLoader::with_pages(&["p1", "p2", "p3"])));
        let (mut client, input) = tokio::io::duplex(4096);
        let (output, mut peer) = tokio::io::duplex(4096);
        let mut transport = LineTransport::new(input, output);

        let id = Uuid::new_v4();
        let lines = format!(
            "{}\n{}\n{}\n",
            r#"{"type":"extracted","text":"ignored"}"#,
            serde_json::json!({"type": "extract", "id": id, "url": "a.pdf", "pageCount": 2}),
            r#"{"type":"extract","url":"index.html"}"#,
        );
        tokio::io::AsyncWriteExt::write_all(&mut client, lines.as_bytes())
            .await
            .unwrap();
        drop(client);

        worker.serve(&mut transport).await.unwrap();
        drop(transport);

        let mut out = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut peer, &mut out)
            .await
            .unwrap();
        let replies: Vec<RelayMessage> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], RelayMessage::extracted(Some(id), "p1\np2\n"));
        assert!(matches!(
            &replies[1],
            RelayMessage::ExtractionError(reply) if reply.id.is_none() && reply.error.contains("not a PDF")
        ));
    }

    #[tokio::test]
    async fn run_answers_requests_from_the_bus() {
        let bus = MessageBus::new();
        let worker = Arc::new(ExtractionWorker::new(Arc::new(FakeLoader::with_pages(&[
            "abstract", "intro",
        ]))));
        let inbox = bus.subscribe();
        let mut replies = bus.subscribe();
        tokio::spawn({
            let bus = bus.clone();
            let worker = Arc::clone(&worker);
            async move { worker.run(inbox, bus).await }
        });

        let id = Some(Uuid::new_v4());
        bus.publish(RelayMessage::Other);
        bus.publish(RelayMessage::Extract(ExtractRequest {
            id,
            url: "a.pdf".to_string(),
            page_count: None,
        }));

        loop {
            match replies.recv().await.unwrap() {
                RelayMessage::Extracted(reply) => {
                    assert_eq!(reply.id, id);
                    assert_eq!(reply.text, "abstract\n");
                    break;
                }
                RelayMessage::ExtractionError(reply) => panic!("unexpected error {}", reply.error),
                _ => continue,
            }
        }
    }
}
