//! Typed records and their binary decoders.
//!
//! Every framed response body is a fixed-layout, little-endian byte buffer
//! produced by the device firmware. Decoding is strictly sequential: fixed
//! text slots carry no length prefix (trailing bytes may be garbage),
//! variable text is length-prefixed, and optional groups are gated by a
//! single-byte flag that must be branched on independently. A buffer that
//! is too short for the layout is a fatal decode error for that record;
//! no partially populated record is ever returned.

use std::fmt;

use serde::Serialize;

use crate::errors::{Result, SyncError};

/// Fixed width of vehicle-name slots on the wire.
pub const NAME_LEN: usize = 10;

// ============================================================================
// Sequential little-endian reader
// ============================================================================

/// Cursor over a record buffer. All reads advance; a short read fails the
/// whole record.
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            SyncError::Decode(format!("length overflow at offset {}", self.pos))
        })?;
        if end > self.buf.len() {
            return Err(SyncError::Decode(format!(
                "buffer too short: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f64(&mut self) -> Result<f64> {
        let b = self.take(8)?;
        Ok(f64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Fixed-size text slot. The firmware does not null-terminate; bytes
    /// after the written name are garbage, so stop at the first NUL and
    /// trim trailing whitespace.
    fn name(&mut self) -> Result<String> {
        let raw = self.take(NAME_LEN)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).trim_end().to_string())
    }

    /// Length-prefixed text: a u32 count followed by that many bytes.
    /// Zero count means the field is absent.
    fn prefixed_text(&mut self) -> Result<Option<String>> {
        let len = self.u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let raw = self.take(len)?;
        Ok(Some(String::from_utf8_lossy(raw).to_string()))
    }

    fn flag(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }
}

// ============================================================================
// Vehicle snapshot
// ============================================================================

/// One-per-session snapshot of the vehicle's configuration and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleSnapshot {
    pub name: String,
    pub odometer: f64,
    pub engine_hours: f64,
    pub odometer_base: f64,
    pub engine_hours_base: f64,
    pub fuel_capacity: f64,
    pub fuel_reserve: f64,
    pub fuel_fill_up_mileage: f64,
    pub oil_change_interval: f64,
    pub oil_change_mileage: f64,
    pub tow_vehicle: Option<String>,
    pub generator_hours: Option<f64>,
}

impl VehicleSnapshot {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let name = r.name()?;
        let odometer = r.f64()?;
        let engine_hours = r.f64()?;
        let odometer_base = r.f64()?;
        let engine_hours_base = r.f64()?;
        let fuel_capacity = r.f64()?;
        let fuel_reserve = r.f64()?;
        let fuel_fill_up_mileage = r.f64()?;
        let oil_change_interval = r.f64()?;
        let oil_change_mileage = r.f64()?;
        let tow_vehicle = if r.flag()? { Some(r.name()?) } else { None };
        let generator_hours = if r.flag()? { Some(r.f64()?) } else { None };
        Ok(Self {
            name,
            odometer,
            engine_hours,
            odometer_base,
            engine_hours_base,
            fuel_capacity,
            fuel_reserve,
            fuel_fill_up_mileage,
            oil_change_interval,
            oil_change_mileage,
            tow_vehicle,
            generator_hours,
        })
    }
}

impl fmt::Display for VehicleSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tName: {}", self.name)?;
        writeln!(f, "\tOdometer: {:.1}", self.odometer)?;
        writeln!(f, "\tEngine Hours: {:.1}", self.engine_hours)?;
        writeln!(f, "\tFuel Capacity: {:.1}", self.fuel_capacity)?;
        writeln!(f, "\tFuel Reserve: {:.1}", self.fuel_reserve)?;
        writeln!(f, "\tOil Change Interval: {:.1}", self.oil_change_interval)?;
        if let Some(tow) = &self.tow_vehicle {
            writeln!(f, "\tTow Vehicle: {tow}")?;
        }
        if let Some(hours) = self.generator_hours {
            writeln!(f, "\tGenerator Hours: {hours:.1}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Trip (day / leg) summary
// ============================================================================

/// A GPS position. Only reported when the device had a valid fix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
}

/// A day (id 0) or leg (id >= 1) summary from the `TP` stream.
///
/// Lat/lon slots are always present on the wire; the validity flags say
/// whether the fix is meaningful, so invalid fixes decode to `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripRecord {
    pub tag: char,
    pub id: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub start_tz_offset: i32,
    pub end_tz_offset: i32,
    pub start_odometer: f64,
    pub end_odometer: f64,
    pub start_engine_hours: f64,
    pub end_engine_hours: f64,
    pub start_generator_hours: f64,
    pub end_generator_hours: f64,
    pub start_fuel: f64,
    pub end_fuel: f64,
    pub fuel_used: f64,
    pub start_gps: Option<GpsFix>,
    pub end_gps: Option<GpsFix>,
    pub travel_duration_secs: u32,
    pub is_towing: bool,
    pub towing_distance: f64,
}

impl TripRecord {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let tag = r.u8()? as char;
        let start_valid = r.flag()?;
        let end_valid = r.flag()?;
        let id = r.u32()?;
        let start_time = r.u32()?;
        let end_time = r.u32()?;
        let start_tz_offset = r.i32()?;
        let end_tz_offset = r.i32()?;
        let start_odometer = r.f64()?;
        let end_odometer = r.f64()?;
        let start_engine_hours = r.f64()?;
        let end_engine_hours = r.f64()?;
        let start_generator_hours = r.f64()?;
        let end_generator_hours = r.f64()?;
        let start_fuel = r.f64()?;
        let end_fuel = r.f64()?;
        let fuel_used = r.f64()?;
        let start_lat = r.f64()?;
        let start_lon = r.f64()?;
        let end_lat = r.f64()?;
        let end_lon = r.f64()?;
        let travel_duration_secs = r.u32()?;
        let is_towing = r.flag()?;
        let towing_distance = r.f64()?;
        Ok(Self {
            tag,
            id,
            start_time,
            end_time,
            start_tz_offset,
            end_tz_offset,
            start_odometer,
            end_odometer,
            start_engine_hours,
            end_engine_hours,
            start_generator_hours,
            end_generator_hours,
            start_fuel,
            end_fuel,
            fuel_used,
            start_gps: start_valid.then_some(GpsFix {
                latitude: start_lat,
                longitude: start_lon,
            }),
            end_gps: end_valid.then_some(GpsFix {
                latitude: end_lat,
                longitude: end_lon,
            }),
            travel_duration_secs,
            is_towing,
            towing_distance,
        })
    }

    /// True for the single day-level summary; legs carry ids >= 1.
    pub fn is_day_summary(&self) -> bool {
        self.id == 0
    }

    pub fn distance(&self) -> f64 {
        self.end_odometer - self.start_odometer
    }

    pub fn duration_hours(&self) -> f64 {
        f64::from(self.travel_duration_secs) / 3600.0
    }
}

impl fmt::Display for TripRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_day_summary() {
            writeln!(f, "Day Info")?;
        } else {
            writeln!(f, "Trip Leg {} Info", self.id)?;
        }
        writeln!(f, "\tStart Time: {} GMT{}", self.start_time, self.start_tz_offset)?;
        writeln!(f, "\tEnd Time: {} GMT{}", self.end_time, self.end_tz_offset)?;
        writeln!(f, "\tStart Odometer: {:.1}", self.start_odometer)?;
        writeln!(f, "\tEnd Odometer: {:.1}", self.end_odometer)?;
        writeln!(f, "\tDistance: {:.1}", self.distance())?;
        writeln!(f, "\tFuel Used: {:.1}", self.fuel_used)?;
        if let Some(fix) = self.start_gps {
            writeln!(f, "\tStart GPS ({:.7}, {:.7})", fix.latitude, fix.longitude)?;
        }
        if let Some(fix) = self.end_gps {
            writeln!(f, "\tEnd GPS ({:.7}, {:.7})", fix.latitude, fix.longitude)?;
        }
        writeln!(
            f,
            "\tTravel Duration: {} secs ({:.3} hrs)",
            self.travel_duration_secs,
            self.duration_hours()
        )?;
        if self.is_towing {
            writeln!(f, "\tTowing Distance: {:.1}", self.towing_distance)?;
        }
        Ok(())
    }
}

// ============================================================================
// Events
// ============================================================================

/// Event discriminant as carried on the wire by the sync stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    StartDay = 1,
    EndDay = 2,
    StartLeg = 3,
    EndLeg = 4,
    FuelPurchase = 5,
    PropanePurchase = 6,
    OilChange = 7,
}

impl EventKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EventKind::StartDay),
            2 => Some(EventKind::EndDay),
            3 => Some(EventKind::StartLeg),
            4 => Some(EventKind::EndLeg),
            5 => Some(EventKind::FuelPurchase),
            6 => Some(EventKind::PropanePurchase),
            7 => Some(EventKind::OilChange),
            _ => None,
        }
    }
}

/// Fields shared by every event kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventHeader {
    pub interface_version: u32,
    pub id: u32,
    pub time_local: u32,
    pub tz_offset: i32,
    pub time_gmt: u32,
    pub vehicle_name: String,
    pub odometer: f64,
    pub engine_hours: f64,
    pub fuel_level: f64,
    pub description: Option<String>,
    pub tow_vehicle: Option<String>,
    pub gps: Option<GpsFix>,
    pub generator_hours: Option<f64>,
}

/// Trailing fields shared by end-of-leg and end-of-day events.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegClose {
    pub engine_hours_used: f64,
    pub fuel_used: f64,
    pub towing_distance: f64,
    pub distance: f64,
    pub duration_secs: u32,
}

/// A timestamped event. One variant per kind; each carries only the
/// fields valid for that kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EventRecord {
    StartDay {
        header: EventHeader,
    },
    EndDay {
        header: EventHeader,
        close: LegClose,
        travel_duration_secs: u32,
    },
    StartLeg {
        header: EventHeader,
    },
    EndLeg {
        header: EventHeader,
        close: LegClose,
        avg_mph: f64,
    },
    FuelPurchase {
        header: EventHeader,
        quantity: f64,
        cost: f64,
        distance: f64,
    },
    PropanePurchase {
        header: EventHeader,
        quantity: f64,
        cost: f64,
    },
    OilChange {
        header: EventHeader,
        distance: f64,
    },
}

/// Byte offset of the discriminant within a sync-stream event buffer
/// (it follows the interface version and id).
const SYNC_TAG_OFFSET: usize = 8;

impl EventRecord {
    /// Decode an event from the sync (`SyncData`) layout. The discriminant
    /// sits at a fixed offset inside the common header.
    pub fn decode_sync(data: &[u8]) -> Result<Self> {
        if data.len() <= SYNC_TAG_OFFSET {
            return Err(SyncError::Decode(format!(
                "event buffer too short for discriminant: {} bytes",
                data.len()
            )));
        }
        let tag = data[SYNC_TAG_OFFSET];
        let kind = EventKind::from_tag(tag)
            .ok_or_else(|| SyncError::Decode(format!("unknown event type tag {tag}")))?;

        let mut r = ByteReader::new(data);
        let interface_version = r.u32()?;
        let id = r.u32()?;
        let _tag = r.u8()?;
        let time_local = r.u32()?;
        let tz_offset = r.i32()?;
        let time_gmt = r.u32()?;
        let vehicle_name = r.name()?;
        let odometer = r.f64()?;
        let engine_hours = r.f64()?;
        let fuel_level = r.f64()?;
        let description = r.prefixed_text()?;
        let tow_vehicle = if r.flag()? { Some(r.name()?) } else { None };
        let gps = if r.flag()? {
            Some(GpsFix {
                latitude: r.f64()?,
                longitude: r.f64()?,
            })
        } else {
            None
        };
        let generator_hours = if r.flag()? { Some(r.f64()?) } else { None };

        let header = EventHeader {
            interface_version,
            id,
            time_local,
            tz_offset,
            time_gmt,
            vehicle_name,
            odometer,
            engine_hours,
            fuel_level,
            description,
            tow_vehicle,
            gps,
            generator_hours,
        };

        match kind {
            EventKind::StartDay => Ok(EventRecord::StartDay { header }),
            EventKind::StartLeg => Ok(EventRecord::StartLeg { header }),
            EventKind::EndLeg => {
                let close = Self::decode_close(&mut r)?;
                let avg_mph = r.f64()?;
                Ok(EventRecord::EndLeg {
                    header,
                    close,
                    avg_mph,
                })
            }
            EventKind::EndDay => {
                let close = Self::decode_close(&mut r)?;
                let travel_duration_secs = r.u32()?;
                Ok(EventRecord::EndDay {
                    header,
                    close,
                    travel_duration_secs,
                })
            }
            EventKind::FuelPurchase => Ok(EventRecord::FuelPurchase {
                header,
                quantity: r.f64()?,
                cost: r.f64()?,
                distance: r.f64()?,
            }),
            EventKind::PropanePurchase => Ok(EventRecord::PropanePurchase {
                header,
                quantity: r.f64()?,
                cost: r.f64()?,
            }),
            EventKind::OilChange => Ok(EventRecord::OilChange {
                header,
                distance: r.f64()?,
            }),
        }
    }

    /// Decode an event from the legacy (`ED`) layout: discriminant first,
    /// purchase/maintenance kinds only, lat/lon slots always present, no
    /// description/tow/generator fields. Normalizes into the same variant
    /// set with the missing header fields defaulted.
    pub fn decode_legacy(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        let tag = r.u8()?;
        // Legacy tags: 1 = fuel, 2 = propane, 3 = oil change.
        let kind = match tag {
            1 => EventKind::FuelPurchase,
            2 => EventKind::PropanePurchase,
            3 => EventKind::OilChange,
            _ => {
                return Err(SyncError::Decode(format!(
                    "unknown legacy event type tag {tag}"
                )))
            }
        };
        let gps_valid = r.flag()?;
        let vehicle_name = r.name()?;
        let id = r.u32()?;
        let time = r.u32()?;
        let tz_offset = r.i32()?;
        let odometer = r.f64()?;
        let engine_hours = r.f64()?;
        let fuel_level = r.f64()?;
        let latitude = r.f64()?;
        let longitude = r.f64()?;

        let header = EventHeader {
            interface_version: 0,
            id,
            time_local: time,
            tz_offset,
            time_gmt: time,
            vehicle_name,
            odometer,
            engine_hours,
            fuel_level,
            description: None,
            tow_vehicle: None,
            gps: gps_valid.then_some(GpsFix {
                latitude,
                longitude,
            }),
            generator_hours: None,
        };

        match kind {
            EventKind::FuelPurchase => Ok(EventRecord::FuelPurchase {
                header,
                quantity: r.f64()?,
                cost: r.f64()?,
                distance: r.f64()?,
            }),
            EventKind::PropanePurchase => Ok(EventRecord::PropanePurchase {
                header,
                quantity: r.f64()?,
                cost: r.f64()?,
            }),
            EventKind::OilChange => Ok(EventRecord::OilChange {
                header,
                distance: r.f64()?,
            }),
            _ => unreachable!("legacy tags map to purchase/maintenance kinds"),
        }
    }

    fn decode_close(r: &mut ByteReader<'_>) -> Result<LegClose> {
        Ok(LegClose {
            engine_hours_used: r.f64()?,
            fuel_used: r.f64()?,
            towing_distance: r.f64()?,
            distance: r.f64()?,
            duration_secs: r.u32()?,
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventRecord::StartDay { .. } => EventKind::StartDay,
            EventRecord::EndDay { .. } => EventKind::EndDay,
            EventRecord::StartLeg { .. } => EventKind::StartLeg,
            EventRecord::EndLeg { .. } => EventKind::EndLeg,
            EventRecord::FuelPurchase { .. } => EventKind::FuelPurchase,
            EventRecord::PropanePurchase { .. } => EventKind::PropanePurchase,
            EventRecord::OilChange { .. } => EventKind::OilChange,
        }
    }

    pub fn header(&self) -> &EventHeader {
        match self {
            EventRecord::StartDay { header }
            | EventRecord::EndDay { header, .. }
            | EventRecord::StartLeg { header }
            | EventRecord::EndLeg { header, .. }
            | EventRecord::FuelPurchase { header, .. }
            | EventRecord::PropanePurchase { header, .. }
            | EventRecord::OilChange { header, .. } => header,
        }
    }

    /// GMT seconds used for the merged report ordering.
    pub fn timestamp(&self) -> u32 {
        self.header().time_gmt
    }

    /// Miles per gallon for fuel purchases, when the quantity is nonzero.
    pub fn mpg(&self) -> Option<f64> {
        match self {
            EventRecord::FuelPurchase {
                quantity, distance, ..
            } if *quantity != 0.0 => Some(distance / quantity),
            _ => None,
        }
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header();
        match self {
            EventRecord::StartDay { .. } => writeln!(f, "Start Day {}", h.id)?,
            EventRecord::EndDay { .. } => writeln!(f, "End Day {}", h.id)?,
            EventRecord::StartLeg { .. } => writeln!(f, "Start Leg {}", h.id)?,
            EventRecord::EndLeg { .. } => writeln!(f, "End Leg {}", h.id)?,
            EventRecord::FuelPurchase { .. } => writeln!(f, "Fuel Purchase {}", h.id)?,
            EventRecord::PropanePurchase { .. } => writeln!(f, "Propane Purchase {}", h.id)?,
            EventRecord::OilChange { .. } => writeln!(f, "Oil Change {}", h.id)?,
        }
        writeln!(f, "\tTime: {} GMT{} ({})", h.time_local, h.tz_offset, h.time_gmt)?;
        writeln!(f, "\tVehicle: {}", h.vehicle_name)?;
        writeln!(f, "\tOdometer: {:.1}", h.odometer)?;
        writeln!(f, "\tEngine Hours: {:.1}", h.engine_hours)?;
        writeln!(f, "\tFuel Level: {:.1}", h.fuel_level)?;
        if let Some(desc) = &h.description {
            writeln!(f, "\tDescription: {desc}")?;
        }
        if let Some(tow) = &h.tow_vehicle {
            writeln!(f, "\tTow Vehicle: {tow}")?;
        }
        if let Some(fix) = h.gps {
            writeln!(f, "\tGPS ({:.7}, {:.7})", fix.latitude, fix.longitude)?;
        }
        if let Some(hours) = h.generator_hours {
            writeln!(f, "\tGenerator Hours: {hours:.1}")?;
        }
        match self {
            EventRecord::EndLeg { close, avg_mph, .. } => {
                writeln!(f, "\tDistance: {:.1}", close.distance)?;
                writeln!(f, "\tFuel Used: {:.1}", close.fuel_used)?;
                writeln!(f, "\tDuration: {} secs", close.duration_secs)?;
                writeln!(f, "\tAvg MPH: {avg_mph:.1}")?;
            }
            EventRecord::EndDay {
                close,
                travel_duration_secs,
                ..
            } => {
                writeln!(f, "\tDistance: {:.1}", close.distance)?;
                writeln!(f, "\tFuel Used: {:.1}", close.fuel_used)?;
                writeln!(f, "\tDuration: {} secs", close.duration_secs)?;
                writeln!(f, "\tTravel Duration: {travel_duration_secs} secs")?;
            }
            EventRecord::FuelPurchase {
                quantity,
                cost,
                distance,
                ..
            } => {
                writeln!(f, "\tQuantity: {quantity:.3}")?;
                writeln!(f, "\tCost: ${cost:.2}")?;
                writeln!(f, "\tDistance: {distance:.1}")?;
                if let Some(mpg) = self.mpg() {
                    writeln!(f, "\tMPG: {mpg:.1}")?;
                }
            }
            EventRecord::PropanePurchase { quantity, cost, .. } => {
                writeln!(f, "\tQuantity: {quantity:.3}")?;
                writeln!(f, "\tCost: ${cost:.2}")?;
            }
            EventRecord::OilChange { distance, .. } => {
                writeln!(f, "\tDistance: {distance:.1}")?;
            }
            _ => {}
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod test_encode {
    //! Byte-layout encoders used by tests to build wire-exact buffers.

    use super::*;

    pub fn put_f64(buf: &mut Vec<u8>, v: f64) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(buf: &mut Vec<u8>, v: u32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_name(buf: &mut Vec<u8>, name: &str) {
        let mut slot = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        assert!(bytes.len() <= NAME_LEN);
        slot[..bytes.len()].copy_from_slice(bytes);
        buf.extend_from_slice(&slot);
    }

    pub fn encode_vehicle(v: &VehicleSnapshot) -> Vec<u8> {
        let mut buf = Vec::new();
        put_name(&mut buf, &v.name);
        for x in [
            v.odometer,
            v.engine_hours,
            v.odometer_base,
            v.engine_hours_base,
            v.fuel_capacity,
            v.fuel_reserve,
            v.fuel_fill_up_mileage,
            v.oil_change_interval,
            v.oil_change_mileage,
        ] {
            put_f64(&mut buf, x);
        }
        match &v.tow_vehicle {
            Some(tow) => {
                buf.push(1);
                put_name(&mut buf, tow);
            }
            None => buf.push(0),
        }
        match v.generator_hours {
            Some(hours) => {
                buf.push(1);
                put_f64(&mut buf, hours);
            }
            None => buf.push(0),
        }
        buf
    }

    pub fn encode_trip(t: &TripRecord) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(t.tag as u8);
        buf.push(t.start_gps.is_some() as u8);
        buf.push(t.end_gps.is_some() as u8);
        put_u32(&mut buf, t.id);
        put_u32(&mut buf, t.start_time);
        put_u32(&mut buf, t.end_time);
        put_i32(&mut buf, t.start_tz_offset);
        put_i32(&mut buf, t.end_tz_offset);
        for x in [
            t.start_odometer,
            t.end_odometer,
            t.start_engine_hours,
            t.end_engine_hours,
            t.start_generator_hours,
            t.end_generator_hours,
            t.start_fuel,
            t.end_fuel,
            t.fuel_used,
        ] {
            put_f64(&mut buf, x);
        }
        let start = t.start_gps.unwrap_or(GpsFix {
            latitude: 0.0,
            longitude: 0.0,
        });
        let end = t.end_gps.unwrap_or(GpsFix {
            latitude: 0.0,
            longitude: 0.0,
        });
        put_f64(&mut buf, start.latitude);
        put_f64(&mut buf, start.longitude);
        put_f64(&mut buf, end.latitude);
        put_f64(&mut buf, end.longitude);
        put_u32(&mut buf, t.travel_duration_secs);
        buf.push(t.is_towing as u8);
        put_f64(&mut buf, t.towing_distance);
        buf
    }

    pub fn encode_event_header(buf: &mut Vec<u8>, h: &EventHeader, tag: u8) {
        put_u32(buf, h.interface_version);
        put_u32(buf, h.id);
        buf.push(tag);
        put_u32(buf, h.time_local);
        put_i32(buf, h.tz_offset);
        put_u32(buf, h.time_gmt);
        put_name(buf, &h.vehicle_name);
        put_f64(buf, h.odometer);
        put_f64(buf, h.engine_hours);
        put_f64(buf, h.fuel_level);
        match &h.description {
            Some(desc) => {
                put_u32(buf, desc.len() as u32);
                buf.extend_from_slice(desc.as_bytes());
            }
            None => put_u32(buf, 0),
        }
        match &h.tow_vehicle {
            Some(tow) => {
                buf.push(1);
                put_name(buf, tow);
            }
            None => buf.push(0),
        }
        match h.gps {
            Some(fix) => {
                buf.push(1);
                put_f64(buf, fix.latitude);
                put_f64(buf, fix.longitude);
            }
            None => buf.push(0),
        }
        match h.generator_hours {
            Some(hours) => {
                buf.push(1);
                put_f64(buf, hours);
            }
            None => buf.push(0),
        }
    }

    pub fn encode_event_sync(e: &EventRecord) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_event_header(&mut buf, e.header(), e.kind() as u8);
        match e {
            EventRecord::StartDay { .. } | EventRecord::StartLeg { .. } => {}
            EventRecord::EndLeg { close, avg_mph, .. } => {
                put_close(&mut buf, close);
                put_f64(&mut buf, *avg_mph);
            }
            EventRecord::EndDay {
                close,
                travel_duration_secs,
                ..
            } => {
                put_close(&mut buf, close);
                put_u32(&mut buf, *travel_duration_secs);
            }
            EventRecord::FuelPurchase {
                quantity,
                cost,
                distance,
                ..
            } => {
                put_f64(&mut buf, *quantity);
                put_f64(&mut buf, *cost);
                put_f64(&mut buf, *distance);
            }
            EventRecord::PropanePurchase { quantity, cost, .. } => {
                put_f64(&mut buf, *quantity);
                put_f64(&mut buf, *cost);
            }
            EventRecord::OilChange { distance, .. } => {
                put_f64(&mut buf, *distance);
            }
        }
        buf
    }

    fn put_close(buf: &mut Vec<u8>, close: &LegClose) {
        put_f64(buf, close.engine_hours_used);
        put_f64(buf, close.fuel_used);
        put_f64(buf, close.towing_distance);
        put_f64(buf, close.distance);
        put_u32(buf, close.duration_secs);
    }

    pub fn sample_header(id: u32) -> EventHeader {
        EventHeader {
            interface_version: 2,
            id,
            time_local: 1_700_000_000,
            tz_offset: -7,
            time_gmt: 1_700_025_200,
            vehicle_name: "FR3".to_string(),
            odometer: 12_345.6,
            engine_hours: 432.1,
            fuel_level: 0.75,
            description: Some("Pilot #442".to_string()),
            tow_vehicle: Some("CR-V".to_string()),
            gps: Some(GpsFix {
                latitude: 45.5231,
                longitude: -122.6765,
            }),
            generator_hours: Some(88.25),
        }
    }

    pub fn sample_trip(id: u32) -> TripRecord {
        TripRecord {
            tag: if id == 0 { 'D' } else { 'L' },
            id,
            start_time: 1_700_000_000,
            end_time: 1_700_010_000,
            start_tz_offset: -7,
            end_tz_offset: -7,
            start_odometer: 1000.0,
            end_odometer: 1123.4,
            start_engine_hours: 100.0,
            end_engine_hours: 103.5,
            start_generator_hours: 10.0,
            end_generator_hours: 10.0,
            start_fuel: 0.9,
            end_fuel: 0.6,
            fuel_used: 12.5,
            start_gps: Some(GpsFix {
                latitude: 45.0,
                longitude: -122.0,
            }),
            end_gps: None,
            travel_duration_secs: 7200,
            is_towing: true,
            towing_distance: 123.4,
        }
    }
}
