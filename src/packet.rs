use std::fmt;

use crate::bcd::decode_bcd_byte;
use crate::error::{Gt06Error, Result};
use crate::frame::Frame;

/// Protocol id bytes assigned by the vendor.
pub mod protocol_id {
    pub const LOGIN: u8 = 0x01;
    pub const POSITION: u8 = 0x12;
    pub const HEARTBEAT: u8 = 0x13;
    pub const ALARM: u8 = 0x16;
    /// Alarm id used by some firmware revisions.
    pub const ALARM_ALT: u8 = 0x26;
    /// Outbound only; constructed by the server, never decoded.
    pub const SERVER_COMMAND: u8 = 0x80;
}

/// Scale factor of the packed coordinate fields: minutes × 30000,
/// i.e. degrees × 1,800,000.
const COORDINATE_SCALE: f64 = 1_800_000.0;

/// Fixed-width terminal identifier from the login packet.
///
/// Kept as opaque bytes: the value is an IMEI-style rendering that only
/// ever needs echoing and logging, never arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TerminalId([u8; 8]);

impl TerminalId {
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for TerminalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// UTC timestamp from a position packet, one BCD digit pair per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Full year; the wire carries an offset from 2000.
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    fn decode(raw: &[u8]) -> Result<Self> {
        Ok(Self {
            year: 2000 + u16::from(decode_bcd_byte(raw[0])?),
            month: decode_bcd_byte(raw[1])?,
            day: decode_bcd_byte(raw[2])?,
            hour: decode_bcd_byte(raw[3])?,
            minute: decode_bcd_byte(raw[4])?,
            second: decode_bcd_byte(raw[5])?,
        })
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Terminal registration: the first packet every connection must send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPacket {
    pub terminal_id: TerminalId,
    pub sequence: u16,
}

impl LoginPacket {
    /// Payload layout: `terminalId[8] ‖ sequence[2]`. Some firmware
    /// variants append extra bytes; anything past the minimum is ignored.
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 10 {
            return Err(Gt06Error::TruncatedPacket {
                protocol: protocol_id::LOGIN,
                needed: 10,
                got: payload.len(),
            });
        }
        let mut terminal_id = [0u8; 8];
        terminal_id.copy_from_slice(&payload[..8]);
        Ok(Self {
            terminal_id: TerminalId(terminal_id),
            sequence: u16::from_be_bytes([payload[8], payload[9]]),
        })
    }
}

/// A GPS fix reported by the terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionPacket {
    pub timestamp: Timestamp,
    pub satellites: u8,
    /// Decimal degrees, negative = south.
    pub latitude: f64,
    /// Decimal degrees, negative = west.
    pub longitude: f64,
    pub speed_kph: u8,
    pub heading_degrees: u16,
    pub status: Option<u8>,
    pub sequence: Option<u16>,
}

impl PositionPacket {
    /// Payload layout: `timestamp[6] ‖ satellites[1] ‖ lat[4] ‖ lon[4] ‖
    /// speed[1] ‖ heading[2]` plus an optional `status[1] ‖ sequence[2]`
    /// tail depending on the firmware revision. A short tail means the
    /// optional fields are absent, not an error.
    fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 18 {
            return Err(Gt06Error::MalformedPosition("payload shorter than 18 bytes"));
        }

        let timestamp = Timestamp::decode(&payload[..6])?;
        let satellites = payload[6];
        let latitude = decode_coordinate([payload[7], payload[8], payload[9], payload[10]]);
        let longitude = decode_coordinate([payload[11], payload[12], payload[13], payload[14]]);

        // Out-of-range values mean misaligned fields, not a valid fix.
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Gt06Error::MalformedPosition("latitude out of range"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Gt06Error::MalformedPosition("longitude out of range"));
        }

        Ok(Self {
            timestamp,
            satellites,
            latitude,
            longitude,
            speed_kph: payload[15],
            heading_degrees: u16::from_be_bytes([payload[16], payload[17]]),
            status: payload.get(18).copied(),
            sequence: if payload.len() >= 21 {
                Some(u16::from_be_bytes([payload[19], payload[20]]))
            } else {
                None
            },
        })
    }
}

/// Heartbeat or alarm payload, kept opaque apart from the trailing
/// sequence number needed for the acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusPacket {
    pub protocol_id: u8,
    pub payload: Vec<u8>,
    pub sequence: Option<u16>,
}

impl StatusPacket {
    fn decode(frame: &Frame) -> Self {
        Self {
            protocol_id: frame.protocol_id,
            sequence: trailing_sequence(&frame.payload),
            payload: frame.payload.clone(),
        }
    }
}

/// The last two payload bytes, read as a big-endian sequence number.
pub(crate) fn trailing_sequence(payload: &[u8]) -> Option<u16> {
    match payload {
        [.., hi, lo] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

/// A frame payload interpreted according to its protocol id.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Login(LoginPacket),
    Position(PositionPacket),
    Heartbeat(StatusPacket),
    Alarm(StatusPacket),
}

impl Packet {
    pub fn decode(frame: &Frame) -> Result<Packet> {
        match frame.protocol_id {
            protocol_id::LOGIN => LoginPacket::decode(&frame.payload).map(Packet::Login),
            protocol_id::POSITION => PositionPacket::decode(&frame.payload).map(Packet::Position),
            protocol_id::HEARTBEAT => Ok(Packet::Heartbeat(StatusPacket::decode(frame))),
            protocol_id::ALARM | protocol_id::ALARM_ALT => {
                Ok(Packet::Alarm(StatusPacket::decode(frame)))
            }
            other => Err(Gt06Error::UnsupportedProtocolId(other)),
        }
    }
}

/// Decode a 4-byte coordinate field.
///
/// Big-endian unsigned; the top bit is a hemisphere flag (south/west when
/// set), the low 31 bits are the magnitude in degrees × 1,800,000.
fn decode_coordinate(raw: [u8; 4]) -> f64 {
    let value = u32::from_be_bytes(raw);
    let degrees = f64::from(value & 0x7FFF_FFFF) / COORDINATE_SCALE;
    if value & 0x8000_0000 != 0 {
        -degrees
    } else {
        degrees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bcd::encode_bcd_byte;

    /// Payload of the manual's login example frame.
    const LOGIN_PAYLOAD: [u8; 10] = [0x03, 0x53, 0x41, 0x35, 0x32, 0x15, 0x03, 0x62, 0x00, 0x02];

    fn position_payload() -> Vec<u8> {
        let mut payload = Vec::new();
        // 2015-07-21 12:30:45 UTC
        for value in [15u8, 7, 21, 12, 30, 45] {
            payload.push(encode_bcd_byte(value).unwrap());
        }
        payload.push(0x09); // satellites
        payload.extend_from_slice(&0x0546_C938u32.to_be_bytes()); // latitude, north
        payload.extend_from_slice(&(0x042D_9668u32 | 0x8000_0000).to_be_bytes()); // longitude, west
        payload.push(0x3C); // 60 km/h
        payload.extend_from_slice(&180u16.to_be_bytes());
        payload
    }

    #[test]
    fn test_decode_login() {
        let frame = Frame::new(protocol_id::LOGIN, LOGIN_PAYLOAD.to_vec());
        let Packet::Login(login) = Packet::decode(&frame).unwrap() else {
            panic!("expected login packet");
        };
        assert_eq!(
            login.terminal_id.as_bytes(),
            &[0x03, 0x53, 0x41, 0x35, 0x32, 0x15, 0x03, 0x62]
        );
        assert_eq!(login.sequence, 0x0002);
        assert_eq!(login.terminal_id.to_string(), "0353413532150362");
    }

    #[test]
    fn test_decode_login_ignores_trailing_bytes() {
        let mut payload = LOGIN_PAYLOAD.to_vec();
        payload.extend_from_slice(&[0xAA, 0xBB]);
        let frame = Frame::new(protocol_id::LOGIN, payload);
        let Packet::Login(login) = Packet::decode(&frame).unwrap() else {
            panic!("expected login packet");
        };
        assert_eq!(login.sequence, 0x0002);
    }

    #[test]
    fn test_decode_login_too_short() {
        let frame = Frame::new(protocol_id::LOGIN, vec![0x01; 9]);
        assert!(matches!(
            Packet::decode(&frame),
            Err(Gt06Error::TruncatedPacket { needed: 10, got: 9, .. })
        ));
    }

    #[test]
    fn test_decode_position_full_tail() {
        let mut payload = position_payload();
        payload.push(0x01); // status
        payload.extend_from_slice(&5u16.to_be_bytes());
        let frame = Frame::new(protocol_id::POSITION, payload);
        let Packet::Position(pos) = Packet::decode(&frame).unwrap() else {
            panic!("expected position packet");
        };

        assert_eq!(pos.timestamp.to_string(), "2015-07-21 12:30:45");
        assert_eq!(pos.satellites, 9);
        let expected_lat = f64::from(0x0546_C938u32) / 1_800_000.0;
        let expected_lon = -f64::from(0x042D_9668u32) / 1_800_000.0;
        assert!((pos.latitude - expected_lat).abs() < 1e-9);
        assert!((pos.longitude - expected_lon).abs() < 1e-9);
        assert!(pos.latitude > 0.0);
        assert!(pos.longitude < 0.0);
        assert_eq!(pos.speed_kph, 60);
        assert_eq!(pos.heading_degrees, 180);
        assert_eq!(pos.status, Some(0x01));
        assert_eq!(pos.sequence, Some(5));
    }

    #[test]
    fn test_decode_position_minimal_tail() {
        let frame = Frame::new(protocol_id::POSITION, position_payload());
        let Packet::Position(pos) = Packet::decode(&frame).unwrap() else {
            panic!("expected position packet");
        };
        assert_eq!(pos.status, None);
        assert_eq!(pos.sequence, None);
    }

    #[test]
    fn test_decode_position_too_short() {
        let frame = Frame::new(protocol_id::POSITION, position_payload()[..17].to_vec());
        assert!(matches!(
            Packet::decode(&frame),
            Err(Gt06Error::MalformedPosition(_))
        ));
    }

    #[test]
    fn test_decode_position_latitude_out_of_range() {
        let mut payload = position_payload();
        // 0x7FFFFFFF / 1.8e6 ≈ 1193°, far outside ±90.
        payload[7..11].copy_from_slice(&0x7FFF_FFFFu32.to_be_bytes());
        let frame = Frame::new(protocol_id::POSITION, payload);
        assert!(matches!(
            Packet::decode(&frame),
            Err(Gt06Error::MalformedPosition("latitude out of range"))
        ));
    }

    #[test]
    fn test_decode_position_invalid_bcd_timestamp() {
        let mut payload = position_payload();
        payload[1] = 0x0A;
        let frame = Frame::new(protocol_id::POSITION, payload);
        assert!(matches!(
            Packet::decode(&frame),
            Err(Gt06Error::InvalidBcd(0x0A))
        ));
    }

    #[test]
    fn test_hemisphere_flag_negates() {
        let magnitude = 0x0546_C938u32;
        let north = decode_coordinate(magnitude.to_be_bytes());
        let south = decode_coordinate((magnitude | 0x8000_0000).to_be_bytes());
        assert!(north > 0.0);
        assert!((north + south).abs() < 1e-12);
    }

    #[test]
    fn test_decode_heartbeat_trailing_sequence() {
        // terminal info, voltage, GSM signal, alarm/language, sequence.
        let frame = Frame::new(
            protocol_id::HEARTBEAT,
            vec![0x40, 0x04, 0x03, 0x00, 0x01, 0x00, 0x08],
        );
        let Packet::Heartbeat(status) = Packet::decode(&frame).unwrap() else {
            panic!("expected heartbeat packet");
        };
        assert_eq!(status.protocol_id, protocol_id::HEARTBEAT);
        assert_eq!(status.sequence, Some(0x0008));
    }

    #[test]
    fn test_decode_alarm_variants() {
        for id in [protocol_id::ALARM, protocol_id::ALARM_ALT] {
            let frame = Frame::new(id, vec![0x00, 0x10]);
            let Packet::Alarm(status) = Packet::decode(&frame).unwrap() else {
                panic!("expected alarm packet");
            };
            assert_eq!(status.protocol_id, id);
            assert_eq!(status.sequence, Some(0x0010));
        }
    }

    #[test]
    fn test_decode_status_without_sequence() {
        let frame = Frame::new(protocol_id::HEARTBEAT, vec![0x40]);
        let Packet::Heartbeat(status) = Packet::decode(&frame).unwrap() else {
            panic!("expected heartbeat packet");
        };
        assert_eq!(status.sequence, None);
    }

    #[test]
    fn test_decode_unknown_protocol_id() {
        let frame = Frame::new(0x42, vec![0x00, 0x01]);
        assert!(matches!(
            Packet::decode(&frame),
            Err(Gt06Error::UnsupportedProtocolId(0x42))
        ));
    }
}
