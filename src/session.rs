//! Session state and the synchronization state machine.
//!
//! One [`SyncOrchestrator`] owns everything for a run: the single active
//! reassembly buffer, the decoded collections, and the expected totals.
//! It is event-driven: transitions happen only when a notification comes
//! in, and the engine loop applies whatever action a transition returns.
//! Completion is detected by counting decoded records against the totals
//! announced by the device; there is no explicit end marker.

use log::{debug, info};
use serde::Serialize;

use crate::commands::Command;
use crate::errors::{Result, SyncError};
use crate::protocol::{classify, ChunkAssembler, Classified, StreamKind};
use crate::records::{EventRecord, TripRecord, VehicleSnapshot};

/// Which protocol flow this session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Count-and-fetch: everything recorded for the current day.
    DayFetch,
    /// Cursor-range: events between the persisted start id and the
    /// device's end id, resumable across sessions.
    Incremental,
}

/// Expected totals, learned from the device's announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Day { legs: u32, events: u32 },
    Range { start_id: u32, end_id: u32 },
}

/// Orchestrator states. Terminal states are `Done` and `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    AwaitingCounts,
    RequestingData,
    AwaitingCompletion,
    Done,
    Aborted,
}

/// Everything decoded during one synchronization run.
#[derive(Debug)]
pub struct SyncSession {
    pub mode: SyncMode,
    pub vehicle: Option<VehicleSnapshot>,
    pub trips: Vec<TripRecord>,
    pub events: Vec<EventRecord>,
    expected: Option<Expected>,
}

impl SyncSession {
    fn new(mode: SyncMode) -> Self {
        Self {
            mode,
            vehicle: None,
            trips: Vec::new(),
            events: Vec::new(),
            expected: None,
        }
    }

    /// True once every announced category has reached its expected count.
    /// Counts only grow, so once true this stays true.
    pub fn is_complete(&self) -> bool {
        match self.expected {
            None => false,
            Some(Expected::Day { legs, events }) => {
                self.vehicle.is_some()
                    && self.trips.len() >= (legs as usize + 1)
                    && self.events.len() >= events as usize
            }
            Some(Expected::Range { start_id, end_id }) => {
                self.events.len() >= end_id.saturating_sub(start_id) as usize
            }
        }
    }

    /// Cursor-advance command for incremental sessions. Must only be sent
    /// after the export sink has confirmed the handoff.
    pub fn cursor_advance(&self) -> Option<Command> {
        match self.expected {
            Some(Expected::Range { end_id, .. }) if self.mode == SyncMode::Incremental => {
                Some(Command::SetSyncStart(end_id))
            }
            _ => None,
        }
    }

    /// Merge trips and events into one presentation timeline, ascending
    /// by timestamp.
    pub fn into_report(self) -> SyncReport {
        let mut timeline: Vec<ReportEntry> = self
            .trips
            .into_iter()
            .map(ReportEntry::Trip)
            .chain(self.events.into_iter().map(ReportEntry::Event))
            .collect();
        timeline.sort_by_key(ReportEntry::timestamp);
        SyncReport {
            vehicle: self.vehicle,
            timeline,
        }
    }
}

/// A completed session, merged for presentation and handed to the sink.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub vehicle: Option<VehicleSnapshot>,
    pub timeline: Vec<ReportEntry>,
}

#[derive(Debug, Serialize)]
pub enum ReportEntry {
    Trip(TripRecord),
    Event(EventRecord),
}

impl ReportEntry {
    fn timestamp(entry: &ReportEntry) -> u32 {
        match entry {
            ReportEntry::Trip(t) => t.start_time,
            ReportEntry::Event(e) => e.timestamp(),
        }
    }
}

/// Action the run loop must take after a notification was applied.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    /// Hand this ordered command list to the sequencer.
    Send(Vec<Command>),
    /// Keep waiting for the next notification.
    Continue,
    /// Every expected record has been decoded; hand off the session.
    Complete,
}

/// The top-level protocol state machine.
pub struct SyncOrchestrator {
    state: SyncState,
    session: SyncSession,
    assembler: ChunkAssembler,
}

impl SyncOrchestrator {
    pub fn new(mode: SyncMode) -> Self {
        Self {
            state: SyncState::AwaitingCounts,
            session: SyncSession::new(mode),
            assembler: ChunkAssembler::new(),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn session(&self) -> &SyncSession {
        &self.session
    }

    pub fn into_session(self) -> SyncSession {
        self.session
    }

    /// The query that kicks the session off.
    pub fn initial_command(&self) -> Command {
        match self.session.mode {
            SyncMode::DayFetch => Command::LegEventCounts,
            SyncMode::Incremental => Command::SyncRange,
        }
    }

    /// Called by the run loop once the sequencer finished the computed
    /// command list without a transport failure.
    pub fn commands_sent(&mut self) {
        if self.state == SyncState::RequestingData {
            self.state = SyncState::AwaitingCompletion;
        }
    }

    /// Mark the session dead after an unrecoverable error.
    pub fn abort(&mut self) {
        self.state = SyncState::Aborted;
    }

    /// Apply one inbound notification. Data-path errors are fatal: the
    /// session transitions to `Aborted` and the error propagates.
    pub fn on_notification(&mut self, payload: &[u8]) -> Result<Step> {
        match self.apply(payload) {
            Ok(step) => Ok(step),
            Err(e) => {
                self.state = SyncState::Aborted;
                Err(e)
            }
        }
    }

    fn apply(&mut self, payload: &[u8]) -> Result<Step> {
        if matches!(self.state, SyncState::Done | SyncState::Aborted) {
            debug!("ignoring notification in terminal state {:?}", self.state);
            return Ok(Step::Continue);
        }

        match classify(payload, self.assembler.is_active())? {
            Classified::Skip => Ok(Step::Continue),
            Classified::Counts { legs, events } => self.on_counts(legs, events),
            Classified::Range { start_id, end_id } => self.on_range(start_id, end_id),
            Classified::Start {
                kind,
                declared_len,
                initial,
            } => {
                let done = self.assembler.start(kind, declared_len, &initial)?;
                self.maybe_ingest(done)
            }
            Classified::Continuation(bytes) => {
                let done = self.assembler.append(&bytes)?;
                self.maybe_ingest(done)
            }
        }
    }

    fn on_counts(&mut self, legs: u32, events: u32) -> Result<Step> {
        if self.state != SyncState::AwaitingCounts || self.session.mode != SyncMode::DayFetch {
            return Err(SyncError::Protocol(format!(
                "unexpected counts announcement in state {:?}",
                self.state
            )));
        }
        info!("device reports {legs} legs, {events} events for the day");
        self.session.expected = Some(Expected::Day { legs, events });

        let mut commands = vec![Command::VehicleInfo, Command::DaySummary];
        commands.extend((0..legs).map(Command::LegDetail));
        commands.extend((0..events).map(Command::EventDetail));
        self.state = SyncState::RequestingData;
        Ok(Step::Send(commands))
    }

    fn on_range(&mut self, start_id: u32, end_id: u32) -> Result<Step> {
        if self.state != SyncState::AwaitingCounts || self.session.mode != SyncMode::Incremental {
            return Err(SyncError::Protocol(format!(
                "unexpected sync range announcement in state {:?}",
                self.state
            )));
        }
        self.session.expected = Some(Expected::Range { start_id, end_id });

        if end_id <= start_id {
            info!("sync range {start_id},{end_id} is empty, nothing to fetch");
            self.state = SyncState::Done;
            return Ok(Step::Complete);
        }

        info!("device reports events {start_id}..{end_id} pending sync");
        let commands: Vec<Command> = (start_id..end_id).map(Command::SyncDetail).collect();
        self.state = SyncState::RequestingData;
        Ok(Step::Send(commands))
    }

    fn maybe_ingest(&mut self, done: Option<(StreamKind, Vec<u8>)>) -> Result<Step> {
        let Some((kind, buf)) = done else {
            return Ok(Step::Continue);
        };
        self.ingest(kind, &buf)?;
        if self.session.is_complete() {
            self.state = SyncState::Done;
            Ok(Step::Complete)
        } else {
            Ok(Step::Continue)
        }
    }

    /// Decode a completed buffer and append the record to the session.
    fn ingest(&mut self, kind: StreamKind, buf: &[u8]) -> Result<()> {
        match kind {
            StreamKind::Vehicle => {
                let vehicle = VehicleSnapshot::decode(buf)?;
                info!("Vehicle Info\n{vehicle}");
                self.session.vehicle = Some(vehicle);
            }
            StreamKind::Trip => {
                let trip = TripRecord::decode(buf)?;
                info!("{trip}");
                self.session.trips.push(trip);
            }
            StreamKind::Event => {
                let event = EventRecord::decode_legacy(buf)?;
                info!("{event}");
                self.session.events.push(event);
            }
            StreamKind::SyncEvent => {
                let event = EventRecord::decode_sync(buf)?;
                info!("{event}");
                self.session.events.push(event);
            }
        }
        debug!(
            "session now holds vehicle={} trips={} events={}",
            self.session.vehicle.is_some(),
            self.session.trips.len(),
            self.session.events.len()
        );
        Ok(())
    }
}
