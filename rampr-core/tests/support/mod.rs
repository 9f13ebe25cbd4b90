use bytes::Bytes;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rampr_core::{LogFn, Request, RequestFuture, Requester, Response, Timings};

/// Request backend that answers every request with a fixed status after a
/// fixed simulated latency.
pub struct StubRequester {
    pub status: u16,
    pub latency: Duration,
    pub body: &'static [u8],
}

impl Default for StubRequester {
    fn default() -> Self {
        Self {
            status: 200,
            latency: Duration::from_millis(20),
            body: b"{\"name\":\"Bert\"}",
        }
    }
}

impl Requester for StubRequester {
    fn request(&self, _req: Request) -> RequestFuture<'_> {
        let status = self.status;
        let latency = self.latency;
        let body = Bytes::from_static(self.body);
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            Ok(Response {
                status,
                body,
                timings: Timings { duration: latency },
            })
        })
    }
}

/// Logging sink that keeps every line for assertions.
#[derive(Clone, Default)]
pub struct RecordingLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingLog {
    pub fn sink(&self) -> LogFn {
        let lines = self.lines.clone();
        Arc::new(move |msg: &str| {
            if let Ok(mut guard) = lines.lock() {
                guard.push(msg.to_string());
            }
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|l| l.contains(needle))
    }
}
