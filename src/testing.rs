//! In-memory speaker used by unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use speaker_client::{
    ClientError, DeviceInfo, EventSource, EventStream, PropertyClient, SpeakerConnector,
    SpeakerHandles, VendorEvent, VendorPlayerData,
};
use tokio::sync::mpsc;

enum Outcome {
    Fail,
    Stream(mpsc::UnboundedReceiver<VendorEvent>),
}

/// Values returned by the property getters; `None` makes that getter fail.
#[derive(Debug, Clone, Default)]
pub struct MockProperties {
    pub volume: Option<i32>,
    pub mute: Option<bool>,
    pub source: Option<String>,
    pub power: Option<String>,
    pub now_playing: Option<VendorPlayerData>,
}

#[derive(Default)]
pub struct MockSpeaker {
    outcomes: Mutex<VecDeque<Outcome>>,
    pub properties: Mutex<MockProperties>,
    connects: Mutex<Vec<tokio::time::Instant>>,
    queries: AtomicUsize,
    closes: AtomicUsize,
    sources_set: Mutex<Vec<String>>,
}

impl MockSpeaker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_properties(properties: MockProperties) -> Arc<Self> {
        let speaker = Self::default();
        *speaker.properties.lock() = properties;
        Arc::new(speaker)
    }

    /// Queue a failing connection attempt.
    pub fn push_failure(&self) {
        self.outcomes.lock().push_back(Outcome::Fail);
    }

    /// Queue a successful connection; events sent on the returned sender are streamed,
    /// dropping it ends the stream.
    pub fn push_stream(&self) -> mpsc::UnboundedSender<VendorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outcomes.lock().push_back(Outcome::Stream(rx));
        tx
    }

    pub fn connect_count(&self) -> usize {
        self.connects.lock().len()
    }

    pub fn connect_times(&self) -> Vec<tokio::time::Instant> {
        self.connects.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sources_set(&self) -> Vec<String> {
        self.sources_set.lock().clone()
    }

    fn query<T>(&self, value: impl FnOnce(&MockProperties) -> Option<T>) -> Result<T, ClientError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        value(&self.properties.lock()).ok_or(ClientError::Closed)
    }
}

struct MockStream {
    rx: Option<mpsc::UnboundedReceiver<VendorEvent>>,
    speaker: Arc<MockSpeaker>,
}

#[async_trait::async_trait]
impl EventStream for MockStream {
    async fn next_event(&mut self) -> Option<Result<VendorEvent, ClientError>> {
        self.rx.as_mut()?.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        if self.rx.take().is_some() {
            self.speaker.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Wrapper so the `EventSource` impl can hand an `Arc` of the speaker to its streams.
pub struct MockEvents(pub Arc<MockSpeaker>);

#[async_trait::async_trait]
impl EventSource for MockEvents {
    async fn connect(&self) -> Result<Box<dyn EventStream>, ClientError> {
        self.0.connects.lock().push(tokio::time::Instant::now());
        let outcome = self.0.outcomes.lock().pop_front();
        match outcome {
            Some(Outcome::Stream(rx)) => Ok(Box::new(MockStream {
                rx: Some(rx),
                speaker: self.0.clone(),
            })),
            Some(Outcome::Fail) | None => Err(ClientError::Closed),
        }
    }
}

#[async_trait::async_trait]
impl PropertyClient for MockSpeaker {
    async fn volume(&self) -> Result<i32, ClientError> {
        self.query(|p| p.volume)
    }

    async fn mute(&self) -> Result<bool, ClientError> {
        self.query(|p| p.mute)
    }

    async fn source(&self) -> Result<String, ClientError> {
        self.query(|p| p.source.clone())
    }

    async fn power(&self) -> Result<String, ClientError> {
        self.query(|p| p.power.clone())
    }

    async fn now_playing(&self) -> Result<VendorPlayerData, ClientError> {
        self.query(|p| p.now_playing.clone())
    }

    async fn set_source(&self, source: &str) -> Result<(), ClientError> {
        self.sources_set.lock().push(source.to_string());
        Ok(())
    }
}

impl MockSpeaker {
    pub fn handles(self: &Arc<Self>) -> SpeakerHandles {
        SpeakerHandles {
            events: Arc::new(MockEvents(self.clone())),
            properties: self.clone(),
        }
    }
}

/// Hands out a fresh [`MockSpeaker`] per address, created on first use.
#[derive(Default)]
pub struct MockConnector {
    speakers: Mutex<Vec<(String, Arc<MockSpeaker>)>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn speaker(&self, address: &str) -> Arc<MockSpeaker> {
        let mut speakers = self.speakers.lock();
        if let Some((_, s)) = speakers.iter().find(|(a, _)| a == address) {
            return s.clone();
        }
        let s = MockSpeaker::new();
        speakers.push((address.to_string(), s.clone()));
        s
    }
}

impl SpeakerConnector for MockConnector {
    fn connect(&self, device: &DeviceInfo) -> SpeakerHandles {
        self.speaker(&device.address).handles()
    }
}
