//! Streamed HTTP downloads with fixed-interval retry

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio_retry::strategy::FixedInterval;
use tracing::{Instrument, debug, info_span, warn};
use url::Url;

use crate::config::InstallerConfig;
use crate::error::{FileOperation, InstallError, Result, describe};
use crate::progress::{ProgressSink, ProgressSpan};

/// Seam between the pipeline and the network
///
/// Implementations write the resource at `url` to `dest` and report progress
/// within `span`. They own their retry policy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the number of bytes written
    async fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        span: ProgressSpan,
        progress: &ProgressSink,
    ) -> Result<u64>;
}

/// HTTP fetcher backed by `reqwest`
pub struct HttpFetcher {
    client: Client,
    max_attempts: usize,
    retry_delay: Duration,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}


impl HttpFetcher {
    pub fn new(config: &InstallerConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(&config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| InstallError::Http {
            url: String::new(),
            source: e,
        })?;

        Ok(Self {
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
        })
    }

    async fn fetch_once(
        &self,
        url: &Url,
        dest: &Path,
        span: ProgressSpan,
        progress: &ProgressSink,
    ) -> Result<u64> {
        let http_error = |e: reqwest::Error| InstallError::Http {
            url: url.to_string(),
            source: e,
        };

        let response = self.client.get(url.clone()).send().await.map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        debug!("Content length for {}: {:?}", url, total);

        let mut file = fs::File::create(dest)
            .await
            .map_err(|e| InstallError::fs(dest, FileOperation::Write, e))?;

        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        let mut last_reported = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(http_error)?;
            file.write_all(&chunk)
                .await
                .map_err(|e| InstallError::fs(dest, FileOperation::Write, e))?;
            received += chunk.len() as u64;

            if let Some(total) = total {
                let percent = span.scale(received, total);
                if last_reported != Some(percent) {
                    progress.report(percent);
                    last_reported = Some(percent);
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| InstallError::fs(dest, FileOperation::Write, e))?;

        debug!("Download completed: {} bytes", received);
        Ok(received)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        dest: &Path,
        span: ProgressSpan,
        progress: &ProgressSink,
    ) -> Result<u64> {
        async move {
            let mut delays = FixedInterval::new(self.retry_delay).take(self.max_attempts - 1);
            let mut attempt = 1;

            loop {
                match self.fetch_once(url, dest, span, progress).await {
                    Ok(bytes) => return Ok(bytes),
                    Err(e) if e.is_recoverable() => {
                        let Some(delay) = delays.next() else {
                            return Err(InstallError::RetriesExhausted {
                                url: url.to_string(),
                                attempts: attempt,
                                last_error: describe(&e),
                            });
                        };
                        warn!(
                            "Attempt {}/{} failed: {}. Retrying in {:?}",
                            attempt,
                            self.max_attempts,
                            describe(&e),
                            delay
                        );
                        progress.retry(url.as_str(), attempt, self.max_attempts, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        .instrument(info_span!("fetch", url = %url))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_attempts: usize) -> HttpFetcher {
        let config = InstallerConfig::builder(".")
            .max_attempts(max_attempts)
            .retry_delay(Duration::from_millis(10))
            .build();
        HttpFetcher::new(&config).unwrap()
    }

    fn capture() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink = ProgressSink::new(Some(Arc::new(move |event| {
            captured.lock().unwrap().push(event);
        })));
        (sink, events)
    }

    fn retry_count(events: &[ProgressEvent]) -> usize {
        events
            .iter()
            .filter(|event| matches!(event, ProgressEvent::RetryAttempt { .. }))
            .count()
    }

    #[tokio::test]
    async fn two_failures_then_success_waits_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/police.rpf"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/police.rpf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("police.rpf");
        let url = Url::parse(&format!("{}/police.rpf", server.uri())).unwrap();
        let (sink, events) = capture();

        let bytes = fetcher(3)
            .fetch(&url, &dest, ProgressSpan::new(0, 40), &sink)
            .await
            .unwrap();

        assert_eq!(bytes, 1024);
        assert_eq!(std::fs::read(&dest).unwrap().len(), 1024);

        let events = events.lock().unwrap();
        assert_eq!(retry_count(&events), 2);
        assert!(events.iter().any(|event| *event == ProgressEvent::Progress { percent: 40 }));
        for event in events.iter() {
            if let ProgressEvent::RetryAttempt { delay, max_attempts, .. } = event {
                assert_eq!(*delay, Duration::from_millis(10));
                assert_eq!(*max_attempts, 3);
            }
        }
    }

    #[tokio::test]
    async fn persistent_failure_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.zip"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let url = Url::parse(&format!("{}/missing.zip", server.uri())).unwrap();
        let (sink, events) = capture();

        let err = fetcher(2)
            .fetch(&url, &dir.path().join("missing.zip"), ProgressSpan::new(0, 50), &sink)
            .await
            .unwrap_err();

        match err {
            InstallError::RetriesExhausted { attempts, ref last_error, .. } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("404"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(err.kind(), crate::ErrorKind::TransientNetworkFailure);
        assert_eq!(retry_count(&events.lock().unwrap()), 1);
    }

    #[tokio::test]
    async fn local_write_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/car.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("car.zip");
        let url = Url::parse(&format!("{}/car.zip", server.uri())).unwrap();
        let (sink, events) = capture();

        let err = fetcher(3)
            .fetch(&url, &dest, ProgressSpan::new(0, 50), &sink)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::FileSystem);
        assert_eq!(retry_count(&events.lock().unwrap()), 0);
    }
}
