//! Encoded polyline codec at six decimal digits of precision.
//!
//! Valhalla returns route geometry as an encoded polyline: a sequence of
//! zig-zag encoded, delta-compressed integers written as 5-bit groups offset
//! into the printable ASCII range. Valhalla uses a precision of `1e6` rather
//! than the `1e5` of the classic Google format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed-point scale used by the routing engine's shapes.
pub const PRECISION: f64 = 1_000_000.0;

const CHAR_OFFSET: u8 = 63;
const CONTINUATION_BIT: u8 = 0x20;
const GROUP_MASK: u8 = 0x1F;
/// Shift of the last group that still fits in 64 bits; it may carry 4 bits.
const LAST_SHIFT: u32 = 60;
const LAST_GROUP_MASK: u8 = 0x0F;

/// A geographic coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// GeoJSON position order: `[lon, lat]`.
    pub fn to_position(self) -> Vec<f64> {
        vec![self.lon, self.lat]
    }
}

/// Errors raised while decoding a polyline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolylineError {
    /// The string ended in the middle of a value.
    #[error("polyline truncated at byte {offset}")]
    Truncated { offset: usize },

    /// A byte outside the `'?'..='~'` range was encountered.
    #[error("invalid polyline character {found:?} at byte {offset}")]
    InvalidCharacter { offset: usize, found: char },

    /// A value, or the running coordinate it is added to, does not fit in 64 bits.
    #[error("polyline value starting at byte {offset} overflows 64 bits")]
    Overflow { offset: usize },
}

/// Decode an encoded polyline into coordinates.
///
/// Decoding proceeds strictly left to right, two deltas (latitude then
/// longitude) per emitted coordinate. An empty string decodes to an empty
/// list.
pub fn decode(encoded: &str) -> Result<Vec<Coordinate>, PolylineError> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();
    let mut index = 0;
    let mut lat: i64 = 0;
    let mut lon: i64 = 0;

    while index < bytes.len() {
        let offset = index;
        lat = lat
            .checked_add(next_delta(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow { offset })?;
        let offset = index;
        lon = lon
            .checked_add(next_delta(bytes, &mut index)?)
            .ok_or(PolylineError::Overflow { offset })?;
        coordinates.push(Coordinate::new(lat as f64 / PRECISION, lon as f64 / PRECISION));
    }

    Ok(coordinates)
}

/// Read one zig-zag encoded value starting at `*index`.
fn next_delta(bytes: &[u8], index: &mut usize) -> Result<i64, PolylineError> {
    let start = *index;
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    loop {
        let Some(&raw) = bytes.get(*index) else {
            return Err(PolylineError::Truncated { offset: *index });
        };
        if !(CHAR_OFFSET..=b'~').contains(&raw) {
            return Err(PolylineError::InvalidCharacter {
                offset: *index,
                found: raw as char,
            });
        }
        let group = raw - CHAR_OFFSET;
        let bits = group & GROUP_MASK;
        if shift > LAST_SHIFT || (shift == LAST_SHIFT && bits > LAST_GROUP_MASK) {
            return Err(PolylineError::Overflow { offset: start });
        }
        *index += 1;

        result |= u64::from(bits) << shift;
        shift += 5;

        if group & CONTINUATION_BIT == 0 {
            break;
        }
    }

    let magnitude = (result >> 1) as i64;
    Ok(if result & 1 == 1 { !magnitude } else { magnitude })
}

/// Encode coordinates at the same precision [`decode`] expects.
pub fn encode(coordinates: &[Coordinate]) -> String {
    let mut out = String::new();
    let mut prev_lat: i64 = 0;
    let mut prev_lon: i64 = 0;

    for coordinate in coordinates {
        let lat = (coordinate.lat * PRECISION).round() as i64;
        let lon = (coordinate.lon * PRECISION).round() as i64;
        push_value(&mut out, lat - prev_lat);
        push_value(&mut out, lon - prev_lon);
        prev_lat = lat;
        prev_lon = lon;
    }

    out
}

fn push_value(out: &mut String, value: i64) {
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    while zigzag >= u64::from(CONTINUATION_BIT) {
        let group = (CONTINUATION_BIT as u64 | (zigzag & GROUP_MASK as u64)) as u8;
        out.push((group + CHAR_OFFSET) as char);
        zigzag >>= 5;
    }
    out.push((zigzag as u8 + CHAR_OFFSET) as char);
}
