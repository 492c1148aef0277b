//! Notification classification and framed-response reassembly.
//!
//! The device answers over a notification channel that carries at most a
//! few dozen bytes per message. A framed response starts with a text
//! header `<Key>=<HexLength>\n` followed immediately by the first chunk of
//! binary payload; the rest of the payload arrives as raw continuation
//! notifications with no header. Count/range announcements are text only.
//!
//! The classifier is pure: it inspects one payload and returns a decision
//! for the orchestrator to apply. All reassembly state lives in
//! [`ChunkAssembler`], a two-state machine (Idle ⇄ Accumulating).

use log::warn;

use crate::errors::{Result, SyncError};

/// Which logical record category a framed response carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `VH` — vehicle snapshot.
    Vehicle,
    /// `TP` — day or leg trip summary.
    Trip,
    /// `ED` — legacy-layout event.
    Event,
    /// `SyncData` — sync-layout event.
    SyncEvent,
}

/// Decision for one inbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// `LegEventCounts=<legs>,<events>` announcement.
    Counts { legs: u32, events: u32 },
    /// `SyncRange=<start>,<end>` announcement.
    Range { start_id: u32, end_id: u32 },
    /// Start of a framed response: stream, declared total byte length,
    /// and the first chunk (the bytes after the header newline).
    Start {
        kind: StreamKind,
        declared_len: usize,
        initial: Vec<u8>,
    },
    /// Raw bytes for the response currently being assembled.
    Continuation(Vec<u8>),
    /// Header with an unknown key. Firmware emits informational messages
    /// outside the data protocol; these are logged and ignored.
    Skip,
}

/// Classify one notification payload.
///
/// While a buffer is active every payload is a continuation chunk; binary
/// data must never be re-parsed as text mid-stream. With no buffer
/// active, the leading text decides: a known framed key starts a stream,
/// a known announcement key yields counts, an unknown key is skipped, and
/// a payload with no parseable header at all is a protocol violation
/// (a continuation arrived with nothing to append it to).
pub fn classify(payload: &[u8], buffer_active: bool) -> Result<Classified> {
    if buffer_active {
        return Ok(Classified::Continuation(payload.to_vec()));
    }

    let newline = payload.iter().position(|&b| b == b'\n');
    let line_end = newline.unwrap_or(payload.len());
    let line = String::from_utf8_lossy(&payload[..line_end]);

    let Some((key, value)) = line.split_once('=') else {
        return Err(SyncError::Protocol(format!(
            "continuation chunk with no active stream ({} bytes)",
            payload.len()
        )));
    };

    match key {
        "LegEventCounts" => {
            let (legs, events) = parse_pair(value)?;
            Ok(Classified::Counts { legs, events })
        }
        "SyncRange" => {
            let (start_id, end_id) = parse_pair(value)?;
            Ok(Classified::Range { start_id, end_id })
        }
        "VH" | "TP" | "ED" | "SyncData" => {
            let kind = match key {
                "VH" => StreamKind::Vehicle,
                "TP" => StreamKind::Trip,
                "ED" => StreamKind::Event,
                _ => StreamKind::SyncEvent,
            };
            let declared_len = usize::from_str_radix(value.trim(), 16).map_err(|_| {
                SyncError::Decode(format!("bad hex length {value:?} in {key} header"))
            })?;
            let initial = match newline {
                Some(pos) => payload[pos + 1..].to_vec(),
                None => {
                    return Err(SyncError::Decode(format!(
                        "{key} header missing newline before payload"
                    )))
                }
            };
            Ok(Classified::Start {
                kind,
                declared_len,
                initial,
            })
        }
        other => {
            warn!("ignoring notification with unknown stream key {other:?}");
            Ok(Classified::Skip)
        }
    }
}

/// Parse a decimal `a,b` announcement value.
fn parse_pair(value: &str) -> Result<(u32, u32)> {
    let (a, b) = value
        .split_once(',')
        .ok_or_else(|| SyncError::Decode(format!("bad announcement value {value:?}")))?;
    let a = a
        .trim()
        .parse::<u32>()
        .map_err(|_| SyncError::Decode(format!("bad announcement number {a:?}")))?;
    let b = b
        .trim()
        .parse::<u32>()
        .map_err(|_| SyncError::Decode(format!("bad announcement number {b:?}")))?;
    Ok((a, b))
}

/// Accumulates chunks for the one in-flight framed response.
///
/// Exactly one stream may be active at a time. Trailing bytes beyond the
/// declared length are truncated silently; the device's framing is
/// authoritative.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    active: Option<Reassembly>,
}

#[derive(Debug)]
struct Reassembly {
    kind: StreamKind,
    declared_len: usize,
    buf: Vec<u8>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Begin accumulating a new framed response. Fails if a stream is
    /// already active. Returns the completed buffer immediately when the
    /// first chunk already covers the declared length.
    pub fn start(
        &mut self,
        kind: StreamKind,
        declared_len: usize,
        initial: &[u8],
    ) -> Result<Option<(StreamKind, Vec<u8>)>> {
        if let Some(active) = &self.active {
            return Err(SyncError::Protocol(format!(
                "new {kind:?} stream started while a {:?} stream is active ({}/{} bytes)",
                active.kind,
                active.buf.len(),
                active.declared_len
            )));
        }
        let mut buf = Vec::with_capacity(declared_len);
        buf.extend_from_slice(initial);
        self.active = Some(Reassembly {
            kind,
            declared_len,
            buf,
        });
        Ok(self.complete_if_done())
    }

    /// Append a continuation chunk. Fails if no stream is active.
    pub fn append(&mut self, chunk: &[u8]) -> Result<Option<(StreamKind, Vec<u8>)>> {
        let Some(active) = self.active.as_mut() else {
            return Err(SyncError::Protocol(format!(
                "continuation chunk of {} bytes with no active stream",
                chunk.len()
            )));
        };
        active.buf.extend_from_slice(chunk);
        Ok(self.complete_if_done())
    }

    fn complete_if_done(&mut self) -> Option<(StreamKind, Vec<u8>)> {
        let done = self
            .active
            .as_ref()
            .is_some_and(|a| a.buf.len() >= a.declared_len);
        if !done {
            return None;
        }
        let mut finished = self.active.take()?;
        finished.buf.truncate(finished.declared_len);
        Some((finished.kind, finished.buf))
    }
}
