//! Outbound command protocol and paced sequencing.
//!
//! Commands are short ASCII strings written to the device's command
//! characteristic. The device needs processing time after each write
//! before its responses start arriving, so the sequencer sleeps a fixed
//! settle delay between commands. Responses are never awaited here:
//! correlation is implicit (the device answers in command order) and is
//! the orchestrator's concern.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::debug;

use crate::errors::{Result, SyncError};

/// Settle delay between commands, from the device's documented timing.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// The closed set of commands the device understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `LE?` — announce leg/event counts for the current day.
    LegEventCounts,
    /// `VH?` — vehicle snapshot.
    VehicleInfo,
    /// `DD?` — day-level trip summary.
    DaySummary,
    /// `LD?<n>;` — trip summary for leg `n`.
    LegDetail(u32),
    /// `ED?<n>;` — legacy-layout event `n`.
    EventDetail(u32),
    /// `SC?` — announce the sync cursor range.
    SyncRange,
    /// `SD?<n>;` — sync-layout event `n`.
    SyncDetail(u32),
    /// `SS=<id>;` — advance the persisted sync cursor.
    SetSyncStart(u32),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LegEventCounts => write!(f, "#0 LE?"),
            Command::VehicleInfo => write!(f, "#0 VH?"),
            Command::DaySummary => write!(f, "#0 DD?"),
            Command::LegDetail(n) => write!(f, "#0 LD?{n};"),
            Command::EventDetail(n) => write!(f, "#0 ED?{n};"),
            Command::SyncRange => write!(f, "#0 SC?"),
            Command::SyncDetail(n) => write!(f, "#0 SD?{n};"),
            Command::SetSyncStart(id) => write!(f, "#0 SS={id};"),
        }
    }
}

/// Write seam to the transport's command characteristic.
pub trait CommandPort: Send {
    fn write_command(&mut self, command: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Issues an ordered command list with a fixed settle delay after each
/// write. Stops on the first transport failure, reporting which command
/// failed. No retries.
#[derive(Debug, Clone)]
pub struct CommandSequencer {
    settle: Duration,
}

impl Default for CommandSequencer {
    fn default() -> Self {
        Self {
            settle: SETTLE_DELAY,
        }
    }
}

impl CommandSequencer {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    /// Send one command and wait out its settle delay.
    pub async fn send<P: CommandPort>(&self, port: &mut P, command: Command) -> Result<()> {
        self.run(port, &[command]).await
    }

    /// Send every command in order, pacing each with the settle delay.
    pub async fn run<P: CommandPort>(&self, port: &mut P, commands: &[Command]) -> Result<()> {
        for (index, command) in commands.iter().enumerate() {
            let wire = command.to_string();
            debug!("sending command {index}: {wire}");
            port.write_command(&wire)
                .await
                .map_err(|e| SyncError::Command {
                    index,
                    command: wire,
                    source: Box::new(e),
                })?;
            tokio::time::sleep(self.settle).await;
        }
        Ok(())
    }
}
