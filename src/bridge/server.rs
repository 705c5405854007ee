use anyhow::Result;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration, Instant};

use super::assembly::{self, AssembledMessage, AssemblyTable, Disposition, StorageIndex};
use super::deletion::{self, DeletionCoordinator};
use super::fetch::{self, FetchConditions, FetchGate, FetchSignal};
use crate::metrics;
use crate::modem::command::init_sequence;
use crate::modem::framer::{DEFAULT_CAPACITY, DEFAULT_JUNK_LIMIT};
use crate::modem::{AtCommand, AtFramer, CommandSink, Record};
use crate::pdu;
use crate::publish::{LinkState, PublishError, Publisher, SmsPayload, DEFAULT_TOPIC};

/// Runtime knobs of the bridge, already converted to durations.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub topic: String,
    pub init_step_delay: Duration,
    pub probe_attempts: usize,
    pub poll_interval: Duration,
    pub publish_timeout: Duration,
    pub buffer_capacity: usize,
    pub junk_limit: usize,
    pub assembly_slots: usize,
    pub max_fragments: usize,
    pub fragment_timeout: Duration,
    pub processed_capacity: usize,
    pub delete_queue_capacity: usize,
    pub delete_interval: Duration,
    pub fetch_debounce: Duration,
    pub fetch_cooldown: Duration,
    pub fetch_interval: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            topic: DEFAULT_TOPIC.to_string(),
            init_step_delay: Duration::from_secs(1),
            probe_attempts: 3,
            poll_interval: Duration::from_millis(100),
            publish_timeout: Duration::from_secs(5),
            buffer_capacity: DEFAULT_CAPACITY,
            junk_limit: DEFAULT_JUNK_LIMIT,
            assembly_slots: assembly::DEFAULT_SLOTS,
            max_fragments: assembly::DEFAULT_MAX_FRAGMENTS,
            fragment_timeout: assembly::DEFAULT_FRAGMENT_TIMEOUT,
            processed_capacity: deletion::DEFAULT_PROCESSED_CAPACITY,
            delete_queue_capacity: deletion::DEFAULT_QUEUE_CAPACITY,
            delete_interval: deletion::DEFAULT_DELETE_INTERVAL,
            fetch_debounce: fetch::DEFAULT_DEBOUNCE,
            fetch_cooldown: fetch::DEFAULT_COOLDOWN,
            fetch_interval: fetch::DEFAULT_FETCH_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Sending the init sequence; `step` is the next command to send
    Init { step: usize, next_at: Instant },
    Ready,
}

/// Cloneable control surface for tasks outside the bridge loop.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    signal: FetchSignal,
    link: LinkState,
}

impl BridgeHandle {
    pub fn notify_transport_connected(&self) {
        info!("Publish transport connected");
        self.link.set_connected(true);
        self.signal.raise();
    }

    pub fn notify_transport_lost(&self) {
        warn!("Publish transport lost");
        self.link.set_connected(false);
    }

    pub fn request_fetch(&self) { self.signal.raise(); }

    pub fn is_connected(&self) -> bool { self.link.is_connected() }
}

/// Owns every piece of bridge state; driven by a single task.
pub struct BridgeServer<S, P> {
    settings: BridgeSettings,
    sink: S,
    publisher: P,
    framer: AtFramer,
    table: AssemblyTable,
    deletions: DeletionCoordinator,
    gate: FetchGate,
    signal: FetchSignal,
    link: LinkState,
    init: Vec<AtCommand>,
    state: DriverState,
}

impl<S: CommandSink, P: Publisher> BridgeServer<S, P> {
    pub fn new(settings: BridgeSettings, sink: S, publisher: P, link: LinkState) -> Self {
        let now = Instant::now();
        BridgeServer {
            framer: AtFramer::new(settings.buffer_capacity, settings.junk_limit),
            table: AssemblyTable::new(settings.assembly_slots, settings.max_fragments, settings.fragment_timeout),
            deletions: DeletionCoordinator::new(
                settings.processed_capacity,
                settings.delete_queue_capacity,
                settings.delete_interval,
            ),
            gate: FetchGate::new(settings.fetch_debounce, settings.fetch_cooldown, settings.fetch_interval, now),
            signal: FetchSignal::new(),
            init: init_sequence(settings.probe_attempts),
            state: DriverState::Init { step: 0, next_at: now },
            settings,
            sink,
            publisher,
            link,
        }
    }

    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle { signal: self.signal.clone(), link: self.link.clone() }
    }

    pub fn state(&self) -> DriverState { self.state }

    pub fn sink(&self) -> &S { &self.sink }

    pub fn publisher(&self) -> &P { &self.publisher }

    pub fn table(&self) -> &AssemblyTable { &self.table }

    pub fn deletions(&self) -> &DeletionCoordinator { &self.deletions }

    /// Main loop: consume modem input until the channel closes or Ctrl-C.
    pub async fn run(&mut self, mut input: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        info!("SMS bridge started, publishing to '{}'", self.settings.topic);
        let poll = self.settings.poll_interval;
        loop {
            tokio::select! {
                received = timeout(poll, input.recv()) => match received {
                    Ok(Some(chunk)) => self.ingest(&chunk, Instant::now()).await,
                    Ok(None) => {
                        error!("Modem input channel closed, stopping bridge");
                        break;
                    }
                    Err(_) => {}
                },
                _ = tokio::signal::ctrl_c() => { info!("Received shutdown signal"); break; }
            }
            self.tick(Instant::now()).await;
        }
        let m = metrics::snapshot();
        info!(
            "Bridge stopped: decoded={} failed={} published={} publish_failures={} partial={} evicted={} deleted={} fetches={} overflows={}",
            m.records_decoded, m.decode_failures, m.messages_published, m.publish_failures,
            m.partial_publishes, m.fragments_evicted, m.deletions_issued, m.fetches_issued, m.buffer_overflows
        );
        Ok(())
    }

    /// Feed raw modem bytes and handle every record they complete.
    pub async fn ingest(&mut self, chunk: &[u8], now: Instant) {
        if let Err(e) = self.framer.push(chunk) {
            warn!("{}", e);
            return;
        }
        while let Some(record) = self.framer.next_record() {
            self.handle_record(record, now).await;
        }
    }

    /// Periodic work: init progress, or sweep / delete / fetch once ready.
    pub async fn tick(&mut self, now: Instant) {
        match self.state {
            DriverState::Init { step, next_at } => self.advance_init(step, next_at, now),
            DriverState::Ready => self.ready_tick(now).await,
        }
    }

    fn advance_init(&mut self, step: usize, next_at: Instant, now: Instant) {
        if now < next_at {
            return;
        }
        match self.init.get(step).copied() {
            Some(command) => {
                self.send(command);
                self.state = DriverState::Init { step: step + 1, next_at: now + self.settings.init_step_delay };
            }
            None => {
                info!("Modem initialized, entering ready state");
                self.state = DriverState::Ready;
                if self.link.is_connected() {
                    self.signal.raise();
                }
            }
        }
    }

    async fn ready_tick(&mut self, now: Instant) {
        for partial in self.table.sweep(now) {
            metrics::inc_partial_publishes();
            self.publish_assembled(partial).await;
        }

        if let Some(index) = self.deletions.drain_one(now) {
            if self.send(AtCommand::Delete(index.0)) {
                metrics::inc_deletions_issued();
            } else {
                self.deletions.enqueue_delete(index);
            }
        }

        self.gate.observe(&self.signal, now);
        let conditions = FetchConditions {
            deletions_settled: self.deletions.settled(now),
            transport_connected: self.link.is_connected(),
        };
        if self.gate.try_fetch(conditions, now) {
            debug!("Fetching stored messages");
            if self.send(AtCommand::ListAll) {
                metrics::inc_fetches_issued();
            }
        }
    }

    async fn handle_record(&mut self, record: Record, now: Instant) {
        match record {
            Record::ListEntry { index, status, pdu, .. } => {
                let index = StorageIndex(index);
                if self.deletions.should_skip(index) {
                    debug!("Skipping already processed index {}", index);
                    return;
                }
                let message = match pdu::decode(&pdu) {
                    Ok(m) => m,
                    Err(e) => {
                        metrics::inc_decode_failures();
                        warn!("Dropping undecodable record at index {} ({}): {}", index, status, e);
                        return;
                    }
                };
                metrics::inc_records_decoded();
                let disposition = self.table.handle(message, index, now);
                self.dispatch(disposition).await;
            }
            Record::NewMessage { storage, index } => {
                info!("New SMS stored in {} at index {}", storage, index);
                self.deletions.forget(StorageIndex(index));
                self.signal.raise();
            }
            Record::Status { tag, value } => {
                if tag == "CPIN" && value != "READY" {
                    warn!("SIM not ready: {}", value);
                } else {
                    debug!("{}: {}", tag, value);
                }
            }
            Record::Error { code: Some(code) } => warn!("Modem reported error {}", code),
            Record::Error { code: None } => warn!("Modem reported ERROR"),
            Record::Malformed { line } => warn!("Unparseable modem line: {}", line),
            Record::Ok => trace!("OK"),
        }
    }

    async fn dispatch(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ready(message) => self.publish_assembled(message).await,
            Disposition::Duplicate(index) => {
                self.deletions.enqueue_delete(index);
            }
            Disposition::Pending | Disposition::Rejected => {}
        }
    }

    async fn publish_assembled(&mut self, message: AssembledMessage) {
        match self.publish(&message).await {
            Ok(()) => {
                metrics::inc_messages_published();
                info!(
                    "Published SMS from {} ({} bytes, {}/{} parts)",
                    message.sender, message.text.len(), message.parts_received, message.parts_expected
                );
                for index in &message.storage_indices {
                    self.deletions.enqueue_delete(*index);
                }
            }
            Err(e) => {
                metrics::inc_publish_failures();
                warn!("Publish of SMS from {} failed, keeping it on the SIM: {}", message.sender, e);
            }
        }
    }

    async fn publish(&mut self, message: &AssembledMessage) -> Result<(), PublishError> {
        if !self.link.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let payload = SmsPayload::new(&message.sender, &message.text).to_json()?;
        let limit = self.settings.publish_timeout;
        match timeout(limit, self.publisher.publish(&self.settings.topic, &payload)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout(limit.as_millis() as u64)),
        }
    }

    fn send(&mut self, command: AtCommand) -> bool {
        match self.sink.send(&command) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send {}: {}", command, e);
                false
            }
        }
    }
}
