use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;
use tracing::debug;

pub const RX_BUFFER_SIZE: usize = 2048;
pub const OPCODE_SIZE: usize = 2;

pub const OPCODE_V1_TELEMETRY: u16 = 0x0101;
pub const OPCODE_V2_TELEMETRY: u16 = 0x0201;
pub const OPCODE_COMPASS_CALIBRATION: u16 = 0x0202;

pub const V1_TELEMETRY_LEN: usize = 16;
pub const V2_TELEMETRY_LEN: usize = 24;
pub const COMPASS_CALIBRATION_LEN: usize = 8;

pub const MAX_RECORD_LEN: usize = V2_TELEMETRY_LEN;

const_assert!(V1_TELEMETRY_LEN <= MAX_RECORD_LEN);
const_assert!(COMPASS_CALIBRATION_LEN <= MAX_RECORD_LEN);
const_assert!(MAX_RECORD_LEN < RX_BUFFER_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Opcode {
    V1Telemetry,
    V2Telemetry,
    CompassCalibration,
}

impl Opcode {
    pub fn from_code(code: u16) -> Option<Self> {
        DISPATCH_TABLE
            .iter()
            .find(|entry| entry.code == code)
            .map(|entry| entry.opcode)
    }

    pub fn code(self) -> u16 {
        self.entry().code
    }

    /// Fixed on-wire length of the record, opcode included.
    pub fn required_len(self) -> usize {
        self.entry().len
    }

    fn entry(self) -> &'static DispatchEntry {
        // Every variant has exactly one row in the table.
        match self {
            Opcode::V1Telemetry => &DISPATCH_TABLE[0],
            Opcode::V2Telemetry => &DISPATCH_TABLE[1],
            Opcode::CompassCalibration => &DISPATCH_TABLE[2],
        }
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Opcode::V1Telemetry => write!(f, "V1Telemetry(0x{:04X})", self.code()),
            Opcode::V2Telemetry => write!(f, "V2Telemetry(0x{:04X})", self.code()),
            Opcode::CompassCalibration => write!(f, "CompassCalibration(0x{:04X})", self.code()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Telemetry {
    pub battery_level: u8,
    pub camera_tilt: i8,
    pub pitch: i16,
    pub roll: i16,
    pub yaw: u16,
    pub depth: u16,
    pub water_temp: i16,
    pub health_counter: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2Telemetry {
    pub battery_level: u8,
    pub gps_status: u8,
    pub pitch: i16,
    pub roll: i16,
    pub yaw: u16,
    pub depth: i32,
    pub water_temp: i16,
    pub drone_temp: i16,
    pub auto_heading: u16,
    pub auto_depth: u16,
    pub lights: u8,
    pub camera_tilt: i8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompassCalibration {
    pub progress_xy: u8,
    pub progress_z: u8,
    pub progress_thruster: u8,
    pub calibration_state: u8,
    pub quality: u16,
}

impl CompassCalibration {
    /// Overall progress is bounded by the slowest axis.
    pub fn overall_progress(&self) -> u8 {
        self.progress_xy.min(self.progress_z).min(self.progress_thruster)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    V1Telemetry(V1Telemetry),
    V2Telemetry(V2Telemetry),
    CompassCalibration(CompassCalibration),
}

impl Record {
    pub fn opcode(&self) -> Opcode {
        match self {
            Record::V1Telemetry(_) => Opcode::V1Telemetry,
            Record::V2Telemetry(_) => Opcode::V2Telemetry,
            Record::CompassCalibration(_) => Opcode::CompassCalibration,
        }
    }

    pub fn encoded_len(&self) -> usize {
        self.opcode().required_len()
    }

    /// Writes the record in wire format and returns the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, DecodeError> {
        let len = self.encoded_len();
        let available = out.len();
        let window = out.get_mut(..len).ok_or(DecodeError::ShortFrame {
            opcode: self.opcode(),
            required: len,
            available,
        })?;

        let mut writer = FieldWriter::new(window);
        writer.put_u16(self.opcode().code());
        match self {
            Record::V1Telemetry(msg) => {
                writer.put_u8(msg.battery_level);
                writer.put_i8(msg.camera_tilt);
                writer.put_i16(msg.pitch);
                writer.put_i16(msg.roll);
                writer.put_u16(msg.yaw);
                writer.put_u16(msg.depth);
                writer.put_i16(msg.water_temp);
                writer.put_u16(msg.health_counter);
            }
            Record::V2Telemetry(msg) => {
                writer.put_u8(msg.battery_level);
                writer.put_u8(msg.gps_status);
                writer.put_i16(msg.pitch);
                writer.put_i16(msg.roll);
                writer.put_u16(msg.yaw);
                writer.put_i32(msg.depth);
                writer.put_i16(msg.water_temp);
                writer.put_i16(msg.drone_temp);
                writer.put_u16(msg.auto_heading);
                writer.put_u16(msg.auto_depth);
                writer.put_u8(msg.lights);
                writer.put_i8(msg.camera_tilt);
            }
            Record::CompassCalibration(msg) => {
                writer.put_u8(msg.progress_xy);
                writer.put_u8(msg.progress_z);
                writer.put_u8(msg.progress_thruster);
                writer.put_u8(msg.calibration_state);
                writer.put_u16(msg.quality);
            }
        }

        debug_assert_eq!(writer.pos, len, "encoder for {} wrote wrong length", self.opcode());
        Ok(len)
    }

    pub fn to_bytes(&self) -> heapless::Vec<u8, MAX_RECORD_LEN> {
        let mut bytes = heapless::Vec::new();
        // Capacity is MAX_RECORD_LEN, which bounds every record.
        let _ = bytes.resize_default(self.encoded_len());
        let _ = self.encode(&mut bytes);
        bytes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{opcode} too short to decode: {available} < {required}")]
    ShortFrame {
        opcode: Opcode,
        required: usize,
        available: usize,
    },
    #[error("field read past end of frame at byte {at}")]
    Truncated { at: usize },
}

type DecodeFn = fn(&[u8]) -> Result<Record, DecodeError>;

struct DispatchEntry {
    code: u16,
    opcode: Opcode,
    len: usize,
    decode: DecodeFn,
}

static DISPATCH_TABLE: [DispatchEntry; 3] = [
    DispatchEntry {
        code: OPCODE_V1_TELEMETRY,
        opcode: Opcode::V1Telemetry,
        len: V1_TELEMETRY_LEN,
        decode: decode_v1_telemetry,
    },
    DispatchEntry {
        code: OPCODE_V2_TELEMETRY,
        opcode: Opcode::V2Telemetry,
        len: V2_TELEMETRY_LEN,
        decode: decode_v2_telemetry,
    },
    DispatchEntry {
        code: OPCODE_COMPASS_CALIBRATION,
        opcode: Opcode::CompassCalibration,
        len: COMPASS_CALIBRATION_LEN,
        decode: decode_compass_calibration,
    },
];

/// Attempts to decode one record at `offset`.
///
/// - `Ok(Some((record, consumed)))`: a full record; `consumed` is its fixed length.
/// - `Ok(None)`: no recognized opcode here; the caller resyncs by one byte.
/// - `Err(DecodeError::ShortFrame)`: recognized opcode but not enough bytes
///   remain; nothing is consumed.
pub fn decode(buf: &[u8], offset: usize) -> Result<Option<(Record, usize)>, DecodeError> {
    let window = match buf.get(offset..) {
        Some(window) => window,
        None => return Ok(None),
    };

    let code = match window.get(..OPCODE_SIZE) {
        Some(&[hi, lo]) => u16::from_be_bytes([hi, lo]),
        _ => return Ok(None),
    };

    let entry = match DISPATCH_TABLE.iter().find(|entry| entry.code == code) {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let frame = window.get(..entry.len).ok_or(DecodeError::ShortFrame {
        opcode: entry.opcode,
        required: entry.len,
        available: window.len(),
    })?;

    let record = (entry.decode)(frame)?;
    Ok(Some((record, entry.len)))
}

fn decode_v1_telemetry(frame: &[u8]) -> Result<Record, DecodeError> {
    let mut reader = FieldReader::after_opcode(frame);
    Ok(Record::V1Telemetry(V1Telemetry {
        battery_level: reader.u8()?,
        camera_tilt: reader.i8()?,
        pitch: reader.i16()?,
        roll: reader.i16()?,
        yaw: reader.u16()?,
        depth: reader.u16()?,
        water_temp: reader.i16()?,
        health_counter: reader.u16()?,
    }))
}

fn decode_v2_telemetry(frame: &[u8]) -> Result<Record, DecodeError> {
    let mut reader = FieldReader::after_opcode(frame);
    Ok(Record::V2Telemetry(V2Telemetry {
        battery_level: reader.u8()?,
        gps_status: reader.u8()?,
        pitch: reader.i16()?,
        roll: reader.i16()?,
        yaw: reader.u16()?,
        depth: reader.i32()?,
        water_temp: reader.i16()?,
        drone_temp: reader.i16()?,
        auto_heading: reader.u16()?,
        auto_depth: reader.u16()?,
        lights: reader.u8()?,
        camera_tilt: reader.i8()?,
    }))
}

fn decode_compass_calibration(frame: &[u8]) -> Result<Record, DecodeError> {
    let mut reader = FieldReader::after_opcode(frame);
    Ok(Record::CompassCalibration(CompassCalibration {
        progress_xy: reader.u8()?,
        progress_z: reader.u8()?,
        progress_thruster: reader.u8()?,
        calibration_state: reader.u8()?,
        quality: reader.u16()?,
    }))
}

/// Big-endian cursor over a frame. Every read is bounds checked.
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn after_opcode(buf: &'a [u8]) -> Self {
        Self { buf, pos: OPCODE_SIZE }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos.checked_add(N).ok_or(DecodeError::Truncated { at: self.pos })?;
        let bytes: [u8; N] = self
            .buf
            .get(self.pos..end)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(DecodeError::Truncated { at: self.pos })?;
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        self.take::<1>().map(|[b]| b)
    }

    fn i8(&mut self) -> Result<i8, DecodeError> {
        self.take::<1>().map(i8::from_be_bytes)
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        self.take::<2>().map(i16::from_be_bytes)
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        self.take::<4>().map(i32::from_be_bytes)
    }
}

// Only used by Record::encode on a window already sized to the record.
struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if let Some(slot) = self.buf.get_mut(self.pos..end) {
            slot.copy_from_slice(bytes);
        }
        self.pos = end;
    }

    fn put_u8(&mut self, value: u8) {
        self.put(&[value]);
    }

    fn put_i8(&mut self, value: i8) {
        self.put(&value.to_be_bytes());
    }

    fn put_u16(&mut self, value: u16) {
        self.put(&value.to_be_bytes());
    }

    fn put_i16(&mut self, value: i16) {
        self.put(&value.to_be_bytes());
    }

    fn put_i32(&mut self, value: i32) {
        self.put(&value.to_be_bytes());
    }
}

/// Walks a receive window record by record.
///
/// A decoded record advances the offset by its length; an unrecognized byte
/// advances by one. A short frame stops the scan without consuming anything,
/// leaving `[offset()..]` as the tail that a later read may complete. The
/// tail is at most one byte when the scan ends without a short frame.
#[derive(Debug)]
pub struct FrameScanner<'a> {
    buf: &'a [u8],
    offset: usize,
    skipped: usize,
    incomplete: Option<DecodeError>,
}

impl<'a> FrameScanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            skipped: 0,
            incomplete: None,
        }
    }

    /// Offset of the first byte not yet consumed.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes discarded while resynchronizing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Set when the scan stopped on a recognized but truncated frame.
    pub fn incomplete(&self) -> Option<DecodeError> {
        self.incomplete
    }

    /// Unconsumed bytes at the end of the window.
    pub fn tail(&self) -> &'a [u8] {
        self.buf.get(self.offset..).unwrap_or(&[])
    }
}

impl Iterator for FrameScanner<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.incomplete.is_some() {
            return None;
        }

        // A lone trailing byte cannot hold an opcode; it stays in the tail.
        while self.buf.len() - self.offset >= OPCODE_SIZE {
            match decode(self.buf, self.offset) {
                Ok(Some((record, consumed))) => {
                    debug!("received {} ({} bytes) at offset {}", record.opcode(), consumed, self.offset);
                    self.offset += consumed;
                    return Some(record);
                }
                Ok(None) => {
                    self.offset += 1;
                    self.skipped += 1;
                }
                Err(e) => {
                    debug!("scan halted at offset {}: {}", self.offset, e);
                    self.incomplete = Some(e);
                    return None;
                }
            }
        }

        None
    }
}
