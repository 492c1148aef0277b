//! Trip tracker synchronization over BLE GATT.
//!
//! The tracker firmware exposes a text-prefixed command protocol on a
//! single GATT characteristic. Responses longer than one notification
//! arrive as a binary payload split across notifications that must be
//! reassembled in order; completion is detected by counting decoded
//! records against device-announced totals, not by an end marker.
//!
//! Two protocol flows are supported behind one session interface:
//!
//! 1. Day fetch: ask for leg/event counts, then fetch the vehicle
//!    snapshot, day summary, every leg, and every event of the day.
//! 2. Incremental sync: ask for the persisted cursor range, fetch the
//!    pending events, and advance the cursor only after the export sink
//!    confirms the handoff.

pub mod commands;
pub mod engine;
pub mod errors;
pub mod export;
pub mod gatt;
pub mod logging;
pub mod protocol;
pub mod records;
pub mod session;

pub use commands::{Command, CommandPort, CommandSequencer};
pub use engine::{run_session, EngineConfig};
pub use errors::{Result, SyncError};
pub use export::{ExportSink, JsonLinesExporter};
pub use gatt::{GattConfig, GattTransport};
pub use protocol::{classify, ChunkAssembler, Classified, StreamKind};
pub use records::{
    EventHeader, EventKind, EventRecord, GpsFix, LegClose, TripRecord, VehicleSnapshot,
};
pub use session::{ReportEntry, Step, SyncMode, SyncOrchestrator, SyncReport, SyncSession};
