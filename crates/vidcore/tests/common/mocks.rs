#![allow(dead_code)]

//! Recording mocks for the delivery collaborators

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;
use vidcore::delivery::{
    AdminAlert, AlertSink, ChoicePrompt, DeliveryChoice, DirectLink, GatewayError, LinkProvider,
    MessagingGateway, OutgoingFile, PartInfo, Requester,
};
use vidcore::extraction::ExtractionError;
use vidcore::storage::{HistoryFilter, HistoryRecord, HistoryStore, StoreError};
use vidcore::DownloadRequest;

/// Everything the gateway was asked to do, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    File {
        file_name: String,
        caption: Option<String>,
        part: Option<PartInfo>,
        size: u64,
        /// Contents of small split parts, read before the part file is removed
        data: Option<Vec<u8>>,
    },
    Link(String),
    Prompt { parts: usize, size: u64, limit: u64 },
    Notice(String),
}

/// How the mock answers delivery prompts
#[derive(Debug, Clone, Copy)]
pub enum ChoiceScript {
    Answer(DeliveryChoice),
    /// Never answers; only cancellation gets the resolver out
    Hang,
    Abandon,
}

/// Which send cancels the request from inside the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelPoint {
    Part(usize),
    InlineFile,
    Link,
}

/// Parts up to this size are captured in [`Sent::File`]
const CAPTURE_LIMIT: u64 = 64 * 1024;

pub struct RecordingGateway {
    events: Mutex<Vec<Sent>>,
    choice: ChoiceScript,
    fail_part: Option<(usize, GatewayError)>,
    transient_failures: AtomicUsize,
    attempts: AtomicUsize,
    cancel_on: Option<(CancelPoint, CancellationToken)>,
    hang_sends: bool,
    pub prompted: Notify,
    /// Signalled when a hanging send starts
    pub sending: Notify,
}

impl RecordingGateway {
    pub fn answering(choice: DeliveryChoice) -> Self {
        Self::with_script(ChoiceScript::Answer(choice))
    }

    pub fn with_script(choice: ChoiceScript) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            choice,
            fail_part: None,
            transient_failures: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
            cancel_on: None,
            hang_sends: false,
            prompted: Notify::new(),
            sending: Notify::new(),
        }
    }

    /// Sending part `index` fails with `error`
    pub fn failing_part(mut self, index: usize, error: GatewayError) -> Self {
        self.fail_part = Some((index, error));
        self
    }

    /// The first `n` file sends fail with a transport error
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Cancels `token` right after part `index` was sent
    pub fn cancelling_after_part(mut self, index: usize, token: CancellationToken) -> Self {
        self.cancel_on = Some((CancelPoint::Part(index), token));
        self
    }

    /// Cancels `token` while a whole (unsplit) file is being sent
    pub fn cancelling_during_inline_send(mut self, token: CancellationToken) -> Self {
        self.cancel_on = Some((CancelPoint::InlineFile, token));
        self
    }

    /// Cancels `token` while the direct link is being sent
    pub fn cancelling_during_link_send(mut self, token: CancellationToken) -> Self {
        self.cancel_on = Some((CancelPoint::Link, token));
        self
    }

    /// File sends never complete
    pub fn hanging_sends(mut self) -> Self {
        self.hang_sends = true;
        self
    }

    fn cancel_at(&self, point: CancelPoint) {
        if let Some((at, token)) = &self.cancel_on {
            if *at == point {
                token.cancel();
            }
        }
    }

    pub fn events(&self) -> Vec<Sent> {
        self.events.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<Sent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, Sent::File { .. }))
            .collect()
    }

    pub fn notices(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Sent::Notice(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn prompt_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Sent::Prompt { .. }))
            .count()
    }

    /// File send attempts, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn push(&self, event: Sent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_file(&self, _to: &Requester, file: &OutgoingFile) -> Result<(), GatewayError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Transport("connection reset".into()));
        }

        if let (Some((index, error)), Some(part)) = (&self.fail_part, file.part) {
            if part.index == *index {
                return Err(error.clone());
            }
        }

        if self.hang_sends {
            self.sending.notify_one();
            return std::future::pending().await;
        }

        let size = std::fs::metadata(&file.path).unwrap().len();
        let data = (file.part.is_some() && size <= CAPTURE_LIMIT).then(|| std::fs::read(&file.path).unwrap());
        self.push(Sent::File {
            file_name: file.file_name.clone(),
            caption: file.caption.clone(),
            part: file.part,
            size,
            data,
        });

        match file.part {
            Some(part) => self.cancel_at(CancelPoint::Part(part.index)),
            None => self.cancel_at(CancelPoint::InlineFile),
        }
        Ok(())
    }

    async fn send_link(&self, _to: &Requester, link: &DirectLink) -> Result<(), GatewayError> {
        self.push(Sent::Link(link.url.to_string()));
        self.cancel_at(CancelPoint::Link);
        Ok(())
    }

    async fn prompt_choice(&self, _to: &Requester, prompt: &ChoicePrompt) -> Result<DeliveryChoice, GatewayError> {
        self.push(Sent::Prompt {
            parts: prompt.parts,
            size: prompt.size_bytes,
            limit: prompt.limit_bytes,
        });
        self.prompted.notify_one();
        match self.choice {
            ChoiceScript::Answer(choice) => Ok(choice),
            ChoiceScript::Hang => std::future::pending().await,
            ChoiceScript::Abandon => Err(GatewayError::PromptAbandoned),
        }
    }

    async fn notify(&self, _to: &Requester, text: &str) -> Result<(), GatewayError> {
        self.push(Sent::Notice(text.to_string()));
        Ok(())
    }
}

/// In-memory history store
#[derive(Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<HistoryRecord>>,
    failing: bool,
}

impl MemoryHistory {
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, record: &HistoryRecord) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn query(&self, user_id: i64, filter: HistoryFilter) -> Result<Vec<HistoryRecord>, StoreError> {
        let records = self.records.lock().unwrap();
        let limit = filter.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.requester.user_id == user_id)
            .filter(|r| filter.platform.is_none_or(|p| r.platform == p))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_all(&self, user_id: i64) -> Result<u64, StoreError> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.requester.user_id != user_id);
        Ok((before - records.len()) as u64)
    }
}

/// Link provider returning a fixed answer
pub struct StaticLinks {
    url: Option<Url>,
}

impl StaticLinks {
    pub fn ok(url: &str) -> Self {
        Self {
            url: Some(Url::parse(url).unwrap()),
        }
    }

    pub fn failing() -> Self {
        Self { url: None }
    }
}

#[async_trait]
impl LinkProvider for StaticLinks {
    async fn direct_link(&self, _request: &DownloadRequest) -> Result<DirectLink, ExtractionError> {
        match &self.url {
            Some(url) => Ok(DirectLink::from_url(url.clone())),
            None => Err(ExtractionError::NoOutput),
        }
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<AdminAlert>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<AdminAlert> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, alert: &AdminAlert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}
