//! Streaming reads with consumer-driven backpressure.
//!
//! A read runs as a spawned task that loads one chunk at a time and hands
//! each slice to the consumer over a bounded channel. A chunk is loaded
//! only after a channel slot is free and the pause flag is clear, so with
//! the default single-slot channel nothing is fetched ahead of the
//! consumer and a pause holds back the very next chunk.
//!
//! ```text
//! Init -> Streaming <-> Paused
//!            |
//!            +-> Done | NotFound | Error
//! ```

use std::sync::Arc;

use binstore_protocol::{ChunkInfo, ContentRange, FileInfo, FileReadInfo, ReadResult};
use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::chunks::ChunkStore;
use crate::config::ReaderConfig;
use crate::files::FileMetadataStore;
use crate::range::RangeInfo;
use crate::StoreError;

/// Lifecycle of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Init,
    Streaming,
    Paused,
    Done,
    NotFound,
    Error,
}

impl ReaderState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReaderState::Done | ReaderState::NotFound | ReaderState::Error
        )
    }
}

impl From<ReadResult> for ReaderState {
    fn from(result: ReadResult) -> Self {
        match result {
            ReadResult::Ok => ReaderState::Done,
            ReadResult::NotFound => ReaderState::NotFound,
            ReadResult::Error => ReaderState::Error,
        }
    }
}

/// What a consumer receives, in order: at most one `File`, any number of
/// `Data`, at most one `Error`, then exactly one `End`.
#[derive(Debug)]
pub enum ReadEvent {
    File(FileReadInfo),
    Data(Vec<u8>),
    Error(StoreError),
    End(ReadResult),
}

/// Starts reads against a pair of metadata and chunk stores.
#[derive(Clone)]
pub struct StreamReader {
    files: FileMetadataStore,
    chunks: ChunkStore,
    config: ReaderConfig,
}

impl StreamReader {
    pub fn new(files: FileMetadataStore, chunks: ChunkStore, config: ReaderConfig) -> Self {
        Self {
            files,
            chunks,
            config,
        }
    }

    /// Streams the whole file. Must be called inside a tokio runtime.
    pub fn read(&self, id: Uuid) -> FileReader {
        self.open(id, None)
    }

    /// Streams the bytes `range.from..=range.to` of the file.
    pub fn read_range(&self, id: Uuid, range: ContentRange) -> FileReader {
        self.open(id, Some(range))
    }

    fn open(&self, id: Uuid, range: Option<ContentRange>) -> FileReader {
        let (events_tx, events_rx) = mpsc::channel(self.config.channel_capacity());
        let (paused_tx, paused_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(ReaderState::Init);
        let cancel = CancellationToken::new();

        let task = ReadTask {
            id,
            range,
            files: self.files.clone(),
            chunks: self.chunks.clone(),
            config: self.config.clone(),
            events: events_tx,
            paused: paused_rx,
            state: state_tx,
            cancel: cancel.clone(),
        };
        tokio::spawn(task.run());

        FileReader {
            id,
            events: events_rx,
            control: ReadControl {
                paused: Arc::new(paused_tx),
                state: state_rx,
                cancel,
            },
        }
    }
}

/// Pause, resume and cancel handle for a running read.
///
/// Clones share the same read. The read is abandoned once the
/// [`FileReader`] and every `ReadControl` are dropped.
#[derive(Clone)]
pub struct ReadControl {
    paused: Arc<watch::Sender<bool>>,
    state: watch::Receiver<ReaderState>,
    cancel: CancellationToken,
}

impl ReadControl {
    /// Stops chunk loading before the next chunk. No-op once terminal.
    pub fn pause(&self) {
        if !self.state().is_terminal() {
            self.paused.send_replace(true);
        }
    }

    /// Continues with the next chunk in sequence. No-op once terminal.
    pub fn resume(&self) {
        if !self.state().is_terminal() {
            self.paused.send_replace(false);
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn state(&self) -> ReaderState {
        *self.state.borrow()
    }

    /// Aborts the read. The consumer sees `Error(Cancelled)` then
    /// `End(Error)`.
    pub fn cancel(&self) {
        if !self.state().is_terminal() {
            self.cancel.cancel();
        }
    }

    /// Waits until the read reaches a terminal state.
    pub async fn finished(&self) -> ReaderState {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| *s)
            .unwrap_or(ReaderState::Error)
    }
}

/// Consumer side of a read.
pub struct FileReader {
    id: Uuid,
    events: mpsc::Receiver<ReadEvent>,
    control: ReadControl,
}

impl FileReader {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next event, or `None` after `End` has been received.
    pub async fn next_event(&mut self) -> Option<ReadEvent> {
        self.events.recv().await
    }

    pub fn pause(&self) {
        self.control.pause();
    }

    pub fn resume(&self) {
        self.control.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    pub fn state(&self) -> ReaderState {
        self.control.state()
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// A handle that can pause or cancel this read from elsewhere.
    pub fn control(&self) -> ReadControl {
        self.control.clone()
    }

    /// Drains the read into memory. A paused read stays parked until
    /// resumed through a [`ReadControl`] or the idle timeout fires.
    pub async fn read_to_end(mut self) -> ReadOutcome {
        let mut outcome = ReadOutcome {
            id: self.id,
            info: None,
            data: Vec::new(),
            result: ReadResult::Error,
            error: None,
        };
        while let Some(event) = self.next_event().await {
            match event {
                ReadEvent::File(info) => outcome.info = Some(info),
                ReadEvent::Data(bytes) => outcome.data.extend_from_slice(&bytes),
                ReadEvent::Error(e) => outcome.error = Some(e),
                ReadEvent::End(result) => {
                    outcome.result = result;
                    break;
                }
            }
        }
        outcome
    }
}

/// Everything a read delivered.
#[derive(Debug)]
pub struct ReadOutcome {
    pub id: Uuid,
    pub info: Option<FileReadInfo>,
    pub data: Vec<u8>,
    pub result: ReadResult,
    pub error: Option<StoreError>,
}

impl ReadOutcome {
    /// The file record and bytes of a successful read.
    pub fn into_bytes(self) -> Result<(FileReadInfo, Vec<u8>), StoreError> {
        match self.result {
            ReadResult::Ok => match self.info {
                Some(info) => Ok((info, self.data)),
                None => Err(StoreError::NotFound(self.id)),
            },
            ReadResult::NotFound => Err(StoreError::NotFound(self.id)),
            ReadResult::Error => Err(self.error.unwrap_or(StoreError::Cancelled)),
        }
    }
}

/// Why a read stopped early.
enum Halt {
    /// Reported to the consumer as `Error` then `End(Error)`.
    Failed(StoreError),
    /// Consumer is gone; nothing left to report to.
    Detached,
}

impl From<StoreError> for Halt {
    fn from(e: StoreError) -> Self {
        Halt::Failed(e)
    }
}

struct ReadTask {
    id: Uuid,
    range: Option<ContentRange>,
    files: FileMetadataStore,
    chunks: ChunkStore,
    config: ReaderConfig,
    events: mpsc::Sender<ReadEvent>,
    paused: watch::Receiver<bool>,
    state: watch::Sender<ReaderState>,
    cancel: CancellationToken,
}

impl ReadTask {
    async fn run(mut self) {
        match self.drive().await {
            Ok(result) => {
                info!(file_id = %self.id, ?result, range = ?self.range, "read finished");
                self.finish(result).await;
            }
            Err(Halt::Failed(e)) => {
                warn!(file_id = %self.id, error = %e, "read failed");
                if self.events.send(ReadEvent::Error(e)).await.is_ok() {
                    self.finish(ReadResult::Error).await;
                } else {
                    self.state.send_replace(ReaderState::Error);
                }
            }
            Err(Halt::Detached) => {
                debug!(file_id = %self.id, "consumer dropped, abandoning read");
                self.state.send_replace(ReaderState::Error);
            }
        }
    }

    /// Publishes the terminal state before `End` so a consumer holding
    /// `End` never observes a live reader.
    async fn finish(&self, result: ReadResult) {
        self.state.send_replace(ReaderState::from(result));
        let _ = self.events.send(ReadEvent::End(result)).await;
    }

    async fn drive(&mut self) -> Result<ReadResult, Halt> {
        self.state.send_replace(ReaderState::Streaming);

        let Some(file) = self.guard(self.files.load(self.id)).await? else {
            debug!(file_id = %self.id, "file not found");
            return Ok(ReadResult::NotFound);
        };

        match self.range {
            None => {
                self.emit(ReadEvent::File(FileReadInfo {
                    file: file.clone(),
                    range: None,
                }))
                .await?;
                self.read_full(&file).await
            }
            Some(range) => {
                let info = RangeInfo::compute(&range, &file)?;
                debug!(
                    file_id = %self.id,
                    from = info.from,
                    to = info.to,
                    start_chunk = info.start_chunk,
                    end_chunk = info.end_chunk,
                    "range resolved"
                );
                self.emit(ReadEvent::File(FileReadInfo {
                    file: file.clone(),
                    range: Some(info.resolved()),
                }))
                .await?;
                self.read_range(&file, &info).await
            }
        }
    }

    /// Chunks `0..chunk_count` in order. A missing chunk ends the read
    /// early but successfully.
    async fn read_full(&mut self, file: &FileInfo) -> Result<ReadResult, Halt> {
        let count = file.chunk_count();
        for n in 0..count {
            let num = u32::try_from(n).map_err(|_| {
                StoreError::InvalidRange(format!("chunk index {n} out of bounds"))
            })?;
            let slot = self.reserve().await?;
            self.wait_while_paused().await?;

            match self.load_chunk(file.id, num).await? {
                Some(chunk) => {
                    slot.send(ReadEvent::Data(chunk.data));
                }
                None => {
                    debug!(
                        file_id = %file.id,
                        chunk = num,
                        chunk_count = count,
                        "chunk absent, ending read"
                    );
                    return Ok(ReadResult::Ok);
                }
            }
        }
        Ok(ReadResult::Ok)
    }

    /// Only the chunks the range touches, trimmed at both ends. A missing
    /// chunk inside the range fails the read.
    async fn read_range(&mut self, file: &FileInfo, info: &RangeInfo) -> Result<ReadResult, Halt> {
        for num in info.chunks() {
            let slot = self.reserve().await?;
            self.wait_while_paused().await?;

            let Some(chunk) = self.load_chunk(file.id, num).await? else {
                return Err(StoreError::MissingChunk {
                    file_id: file.id,
                    num,
                }
                .into());
            };
            let bytes = info.extract_required_bytes(num, chunk.data)?;
            slot.send(ReadEvent::Data(bytes));
        }
        Ok(ReadResult::Ok)
    }

    async fn load_chunk(&self, file_id: Uuid, num: u32) -> Result<Option<ChunkInfo>, Halt> {
        let result = self.guard(self.chunks.load(file_id, num)).await;
        if let Err(Halt::Failed(e)) = &result {
            if !matches!(e, StoreError::Cancelled) {
                error!(%file_id, chunk = num, error = %e, "chunk load failed");
            }
        }
        result
    }

    /// Races a store call against cancellation.
    async fn guard<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Failed(StoreError::Cancelled)),
            result = fut => result.map_err(Halt::from),
        }
    }

    async fn emit(&self, event: ReadEvent) -> Result<(), Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Failed(StoreError::Cancelled)),
            sent = self.events.send(event) => sent.map_err(|_| Halt::Detached),
        }
    }

    /// Waits until the consumer has taken the previous event.
    async fn reserve(&self) -> Result<OwnedPermit<ReadEvent>, Halt> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Halt::Failed(StoreError::Cancelled)),
            slot = self.events.clone().reserve_owned() => slot.map_err(|_| Halt::Detached),
        }
    }

    /// Parks while the consumer has paused the read.
    async fn wait_while_paused(&mut self) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(StoreError::Cancelled.into());
        }
        if !*self.paused.borrow() {
            return Ok(());
        }

        self.state.send_replace(ReaderState::Paused);
        debug!(file_id = %self.id, "reader paused");

        let idle_timeout = self.config.idle_timeout();
        let cancel = self.cancel.clone();
        let paused = &mut self.paused;
        let resumed = async {
            let wait = paused.wait_for(|p| !*p);
            match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, wait).await {
                    Ok(r) => r.map(|_| ()).map_err(|_| Halt::Detached),
                    Err(_) => Err(Halt::Failed(StoreError::IdleTimeout(limit))),
                },
                None => wait.await.map(|_| ()).map_err(|_| Halt::Detached),
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Halt::Failed(StoreError::Cancelled)),
            r = resumed => r,
        };

        if outcome.is_ok() {
            self.state.send_replace(ReaderState::Streaming);
            debug!(file_id = %self.id, "reader resumed");
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use binstore_backend::{Backend, MemoryBackend, Value};

    use super::*;
    use crate::metrics::{NoopMetrics, StoreMetrics};
    use crate::statements::Statements;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        files: FileMetadataStore,
        chunks: ChunkStore,
        reader: StreamReader,
    }

    fn fixture(config: ReaderConfig) -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let shared: Arc<dyn Backend> = backend.clone();
        let metrics: Arc<dyn StoreMetrics> = Arc::new(NoopMetrics);
        let statements = Statements::new("binarystore");
        let files = FileMetadataStore::new(shared.clone(), statements.clone(), metrics.clone());
        let chunks = ChunkStore::new(shared, statements, metrics);
        let reader = StreamReader::new(files.clone(), chunks.clone(), config);
        Fixture {
            backend,
            files,
            chunks,
            reader,
        }
    }

    fn content(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i % 253) as u8).collect()
    }

    /// Stores `data` as chunks of `chunk_size`, skipping `skip`.
    async fn seed(fx: &Fixture, data: &[u8], chunk_size: u32, skip: &[u32]) -> FileInfo {
        let file = FileInfo::new(Uuid::new_v4(), data.len() as u64, chunk_size);
        for (num, part) in data.chunks(chunk_size as usize).enumerate() {
            let num = num as u32;
            if skip.contains(&num) {
                continue;
            }
            fx.chunks
                .store(ChunkInfo {
                    file_id: file.id,
                    num,
                    data: part.to_vec(),
                })
                .await
                .unwrap();
        }
        fx.files.store(&file).await.unwrap();
        file
    }

    async fn collect(reader: &mut FileReader) -> Vec<ReadEvent> {
        let mut events = Vec::new();
        while let Some(event) = reader.next_event().await {
            events.push(event);
        }
        events
    }

    fn data_of(events: &[ReadEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|e| match e {
                ReadEvent::Data(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }

    fn no_timeout() -> ReaderConfig {
        ReaderConfig {
            idle_timeout_secs: None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn full_read_streams_chunks_in_order() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        let events = collect(&mut reader).await;

        assert_eq!(events.len(), 5);
        let ReadEvent::File(info) = &events[0] else {
            panic!("expected file event, got {:?}", events[0]);
        };
        assert_eq!(info.file, file);
        assert_eq!(info.range, None);
        assert_eq!(
            data_of(&events),
            vec![data[..100].to_vec(), data[100..200].to_vec(), data[200..].to_vec()]
        );
        assert!(matches!(events[4], ReadEvent::End(ReadResult::Ok)));
        assert_eq!(reader.state(), ReaderState::Done);
    }

    #[tokio::test]
    async fn missing_file_ends_not_found_without_file_event() {
        let fx = fixture(ReaderConfig::default());
        let mut reader = fx.reader.read(Uuid::new_v4());
        let events = collect(&mut reader).await;

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ReadEvent::End(ReadResult::NotFound)));
        assert_eq!(reader.state(), ReaderState::NotFound);
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test]
    async fn full_read_stops_quietly_at_missing_chunk() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[2]).await;

        let mut reader = fx.reader.read(file.id);
        let events = collect(&mut reader).await;

        assert_eq!(data_of(&events), vec![data[..100].to_vec(), data[100..200].to_vec()]);
        assert!(!events.iter().any(|e| matches!(e, ReadEvent::Error(_))));
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Ok))));
    }

    #[tokio::test]
    async fn full_read_missing_middle_chunk_skips_the_rest() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[1]).await;

        let outcome = fx.reader.read(file.id).read_to_end().await;
        assert_eq!(outcome.result, ReadResult::Ok);
        assert_eq!(outcome.data, &data[..100]);
        assert_eq!(fx.backend.select_count("chunks"), 2);
    }

    #[tokio::test]
    async fn range_read_trims_first_and_last_chunk() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;

        let mut reader = fx.reader.read_range(file.id, ContentRange::new(50, Some(149)));
        let events = collect(&mut reader).await;

        let ReadEvent::File(info) = &events[0] else {
            panic!("expected file event");
        };
        assert_eq!(info.range, Some(ContentRange::new(50, Some(149))));
        assert_eq!(data_of(&events), vec![data[50..100].to_vec(), data[100..150].to_vec()]);
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Ok))));
    }

    #[tokio::test]
    async fn range_read_reports_clamped_end() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;

        let outcome = fx
            .reader
            .read_range(file.id, ContentRange::new(200, Some(9_999)))
            .read_to_end()
            .await;
        let (info, bytes) = outcome.into_bytes().unwrap();
        assert_eq!(info.range, Some(ContentRange::new(200, Some(249))));
        assert_eq!(bytes, &data[200..]);
        assert_eq!(fx.backend.select_count("chunks"), 1);
    }

    #[tokio::test]
    async fn range_read_fails_on_missing_chunk() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[1]).await;

        let mut reader = fx.reader.read_range(file.id, ContentRange::new(0, None));
        let events = collect(&mut reader).await;

        assert_eq!(data_of(&events), vec![data[..100].to_vec()]);
        assert!(matches!(
            events[events.len() - 2],
            ReadEvent::Error(StoreError::MissingChunk { num: 1, .. })
        ));
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Error))));
        assert_eq!(reader.state(), ReaderState::Error);
    }

    #[tokio::test]
    async fn invalid_range_fails_before_file_event() {
        let fx = fixture(ReaderConfig::default());
        let file = seed(&fx, &content(250), 100, &[]).await;

        let mut reader = fx.reader.read_range(file.id, ContentRange::new(300, None));
        let events = collect(&mut reader).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ReadEvent::Error(StoreError::InvalidRange(_))));
        assert!(matches!(events[1], ReadEvent::End(ReadResult::Error)));
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test]
    async fn zero_chunk_size_range_is_invalid() {
        let fx = fixture(ReaderConfig::default());
        let file = FileInfo::new(Uuid::new_v4(), 10, 0);
        fx.files.store(&file).await.unwrap();

        let outcome = fx
            .reader
            .read_range(file.id, ContentRange::new(0, None))
            .read_to_end()
            .await;
        assert!(outcome.info.is_none());
        assert!(matches!(outcome.error, Some(StoreError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn file_load_failure_is_reported() {
        let fx = fixture(ReaderConfig::default());
        fx.backend.inject_failure("files", None);

        let outcome = fx.reader.read(Uuid::new_v4()).read_to_end().await;
        assert_eq!(outcome.result, ReadResult::Error);
        assert!(outcome.info.is_none());
        assert!(matches!(outcome.error, Some(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn chunk_load_failure_is_reported_in_full_mode() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;
        fx.backend
            .inject_failure("chunks", Some(vec![Value::Uuid(file.id), Value::Int(1)]));

        let outcome = fx.reader.read(file.id).read_to_end().await;
        assert_eq!(outcome.result, ReadResult::Error);
        assert_eq!(outcome.data, &data[..100]);
        assert!(matches!(outcome.error, Some(StoreError::Backend(_))));
    }

    #[tokio::test]
    async fn chunk_load_failure_is_reported_in_range_mode() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;
        fx.backend
            .inject_failure("chunks", Some(vec![Value::Uuid(file.id), Value::Int(1)]));

        let mut reader = fx.reader.read_range(file.id, ContentRange::new(50, Some(249)));
        let events = collect(&mut reader).await;

        assert_eq!(data_of(&events), vec![data[50..100].to_vec()]);
        assert!(matches!(
            events[events.len() - 2],
            ReadEvent::Error(StoreError::Backend(_))
        ));
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Error))));
        assert_eq!(reader.state(), ReaderState::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_defers_chunk_loads_until_resume() {
        let fx = fixture(ReaderConfig::default());
        let data = content(250);
        let file = seed(&fx, &data, 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        reader.pause();

        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));
        let stalled = tokio::time::timeout(Duration::from_secs(1), reader.next_event()).await;
        assert!(stalled.is_err());
        assert_eq!(reader.state(), ReaderState::Paused);
        assert_eq!(fx.backend.select_count("chunks"), 0);

        reader.resume();
        let events = collect(&mut reader).await;
        assert_eq!(data_of(&events).concat(), data);
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Ok))));
    }

    #[tokio::test]
    async fn toggling_pause_never_skips_or_repeats() {
        let fx = fixture(no_timeout());
        let data = content(1000);
        let file = seed(&fx, &data, 64, &[]).await;

        let mut reader = fx.reader.read_range(file.id, ContentRange::new(37, Some(901)));
        let mut out = Vec::new();
        let mut flip = false;
        while let Some(event) = reader.next_event().await {
            flip = !flip;
            if flip {
                reader.pause();
                tokio::task::yield_now().await;
                reader.resume();
            }
            match event {
                ReadEvent::Data(bytes) => out.extend(bytes),
                ReadEvent::End(result) => assert_eq!(result, ReadResult::Ok),
                _ => {}
            }
        }
        assert_eq!(out, &data[37..=901]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_gets_no_read_ahead() {
        let fx = fixture(ReaderConfig::default());
        let file = seed(&fx, &content(1000), 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        tokio::time::sleep(Duration::from_secs(1)).await;
        // the unread file event holds the only slot
        assert_eq!(fx.backend.select_count("chunks"), 0);

        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.backend.select_count("chunks"), 1);

        let events = collect(&mut reader).await;
        assert_eq!(data_of(&events).len(), 10);
        assert_eq!(fx.backend.select_count("chunks"), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_after_data_holds_back_next_chunk() {
        let fx = fixture(ReaderConfig::default());
        let data = content(500);
        let file = seed(&fx, &data, 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));
        let Some(ReadEvent::Data(first)) = reader.next_event().await else {
            panic!("expected first chunk");
        };
        assert_eq!(first, &data[..100]);
        reader.pause();

        let stalled = tokio::time::timeout(Duration::from_secs(1), reader.next_event()).await;
        assert!(stalled.is_err());
        assert_eq!(reader.state(), ReaderState::Paused);
        assert_eq!(fx.backend.select_count("chunks"), 1);

        reader.resume();
        let events = collect(&mut reader).await;
        assert_eq!(data_of(&events).concat(), &data[100..]);
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Ok))));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_fails_a_parked_read() {
        let fx = fixture(ReaderConfig {
            idle_timeout_secs: Some(30),
            ..Default::default()
        });
        let file = seed(&fx, &content(250), 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        reader.pause();
        let events = collect(&mut reader).await;

        assert!(matches!(events[0], ReadEvent::File(_)));
        assert!(matches!(
            events[1],
            ReadEvent::Error(StoreError::IdleTimeout(d)) if d == Duration::from_secs(30)
        ));
        assert!(matches!(events[2], ReadEvent::End(ReadResult::Error)));
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_a_paused_read() {
        let fx = fixture(no_timeout());
        let file = seed(&fx, &content(250), 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        reader.pause();
        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));

        reader.cancel();
        let events = collect(&mut reader).await;
        assert!(matches!(events[0], ReadEvent::Error(StoreError::Cancelled)));
        assert!(matches!(events[1], ReadEvent::End(ReadResult::Error)));
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn control_outlives_the_reader() {
        let fx = fixture(no_timeout());
        let file = seed(&fx, &content(250), 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        let control = reader.control();
        reader.pause();
        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(reader);

        assert_eq!(control.state(), ReaderState::Paused);
        control.cancel();
        assert_eq!(control.finished().await, ReaderState::Error);
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_detaches_the_producer() {
        let fx = fixture(no_timeout());
        let file = seed(&fx, &content(250), 100, &[]).await;

        let mut reader = fx.reader.read(file.id);
        reader.pause();
        assert!(matches!(reader.next_event().await, Some(ReadEvent::File(_))));
        drop(reader);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.backend.select_count("chunks"), 0);
    }

    #[tokio::test]
    async fn control_is_inert_after_terminal_state() {
        let fx = fixture(ReaderConfig::default());
        let file = seed(&fx, &content(10), 4, &[]).await;

        let mut reader = fx.reader.read(file.id);
        let control = reader.control();
        let events = collect(&mut reader).await;
        assert!(matches!(events.last(), Some(ReadEvent::End(ReadResult::Ok))));

        control.pause();
        assert!(!control.is_paused());
        control.cancel();
        assert_eq!(control.state(), ReaderState::Done);
        assert_eq!(control.finished().await, ReaderState::Done);
    }

    #[tokio::test]
    async fn not_found_outcome_converts_to_error() {
        let fx = fixture(ReaderConfig::default());
        let id = Uuid::new_v4();
        let outcome = fx.reader.read(id).read_to_end().await;
        assert!(matches!(outcome.into_bytes(), Err(StoreError::NotFound(missing)) if missing == id));
    }
}
