//! Protocol constants and the 20-byte frame codec for Govee BLE lights

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Frame head byte (byte 0)
pub mod head {
    /// Outbound state change
    pub const COMMAND: u8 = 0x33;
    /// Outbound query, or inbound response/pushed state
    pub const REQUEST: u8 = 0xAA;

    /// Get human-readable name for head byte
    pub fn name(head: u8) -> &'static str {
        match head {
            COMMAND => "COMMAND",
            REQUEST => "REQUEST",
            _ => "UNKNOWN",
        }
    }
}

/// Command codes (byte 1)
pub mod cmd {
    pub const POWER: u8 = 0x01;
    pub const BRIGHTNESS: u8 = 0x04;
    pub const COLOR: u8 = 0x05;
    pub const MUSIC_MODE: u8 = 0x06;
    pub const EFFECT: u8 = 0x07;
    pub const SCENE: u8 = 0x08;
    /// Per-zone color query on segmented devices
    pub const SEGMENT: u8 = 0xA5;

    /// Get human-readable name for command byte
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            POWER => "POWER",
            BRIGHTNESS => "BRIGHTNESS",
            COLOR => "COLOR",
            MUSIC_MODE => "MUSIC_MODE",
            EFFECT => "EFFECT",
            SCENE => "SCENE",
            SEGMENT => "SEGMENT",
            _ => "UNKNOWN",
        }
    }
}

/// Color payload type bytes (first payload byte of a COLOR frame)
pub mod color_type {
    /// Segmented devices: type + mask + R,G,B + 5 reserved + 0xFF,0xFF
    pub const SEGMENTS: u8 = 0x15;
    /// Non-segmented devices: type + R,G,B
    pub const SINGLE: u8 = 0x02;
    /// Older single-zone devices, sent alongside SINGLE
    pub const LEGACY: u8 = 0x0D;

    /// Segment mask selecting the first segment
    pub const FIRST_SEGMENT: u8 = 0x01;
    /// Fixed trailer closing a SEGMENTS payload
    pub const SEGMENTS_TRAILER: [u8; 2] = [0xFF, 0xFF];
}

/// GATT identifiers of the vendor service
pub mod gatt {
    use uuid::Uuid;

    /// Write characteristic for outbound frames
    pub const WRITE_CHARACTERISTIC: Uuid = Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b11);
    /// Notify characteristic for inbound frames
    pub const NOTIFY_CHARACTERISTIC: Uuid =
        Uuid::from_u128(0x00010203_0405_0607_0809_0a0b0c0d2b10);

    /// Manufacturer-data company id carrying the advertised power hint
    pub const STATUS_COMPANY_ID: u16 = 0x8803;
    /// Offset of the power byte inside that manufacturer data
    pub const STATUS_POWER_OFFSET: usize = 4;
}

/// Link timing constants
pub mod timing {
    /// Connection attempts per ensure-connected call
    pub const MAX_CONNECTION_ATTEMPTS: u32 = 3;
    /// Base delay between attempts (multiplied by the attempt number)
    pub const RETRY_DELAY_MS: u64 = 1000;
    /// Timeout for the first connection of a session (pairing handshake)
    pub const INITIAL_CONNECTION_TIMEOUT_SECS: u64 = 15;
    /// Timeout for reconnections
    pub const RECONNECTION_TIMEOUT_SECS: u64 = 8;
    /// Upper bound of the exponential backoff window
    pub const BACKOFF_CAP_SECS: u64 = 30;
    /// Delay between frames of one flush
    pub const FRAME_DELAY_MS: u64 = 50;
    /// Copies sent of each command frame
    pub const COMMAND_REPEAT: u8 = 3;
}

/// Total frame length on the wire
pub const FRAME_LEN: usize = 20;

/// Maximum payload length before padding
pub const MAX_PAYLOAD_LEN: usize = FRAME_LEN - 3;

/// Frame codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload too long: {len} bytes (max {MAX_PAYLOAD_LEN})")]
    PayloadTooLong { len: usize },

    #[error("Invalid frame length: {len} bytes (expected {FRAME_LEN})")]
    InvalidLength { len: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// XOR-fold of all bytes
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Check the trailing checksum byte of a raw frame
///
/// Recomputes the XOR-fold over everything but the last byte. Empty input
/// never verifies.
pub fn verify_checksum(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&checksum, body)) => xor_checksum(body) == checksum,
        None => false,
    }
}

/// One 20-byte protocol frame
///
/// ```text
/// [0]      head (COMMAND / REQUEST)
/// [1]      command code
/// [2..19]  payload, zero padded
/// [19]     XOR of bytes 0..19
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Build a frame from head, command and payload
    pub fn encode(head: u8, cmd: u8, payload: &[u8]) -> Result<Self, FrameError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = head;
        bytes[1] = cmd;
        bytes[2..2 + payload.len()].copy_from_slice(payload);
        bytes[FRAME_LEN - 1] = xor_checksum(&bytes[..FRAME_LEN - 1]);
        Ok(Self { bytes })
    }

    /// Parse and verify a received frame
    pub fn decode(data: &[u8]) -> Result<Self, FrameError> {
        let bytes: [u8; FRAME_LEN] = data
            .try_into()
            .map_err(|_| FrameError::InvalidLength { len: data.len() })?;
        let expected = xor_checksum(&bytes[..FRAME_LEN - 1]);
        let actual = bytes[FRAME_LEN - 1];
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }
        Ok(Self { bytes })
    }

    pub fn head(&self) -> u8 {
        self.bytes[0]
    }

    pub fn cmd(&self) -> u8 {
        self.bytes[1]
    }

    /// Padded payload (always 17 bytes)
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..FRAME_LEN - 1]
    }

    pub fn checksum(&self) -> u8 {
        self.bytes[FRAME_LEN - 1]
    }

    pub fn is_request(&self) -> bool {
        self.head() == head::REQUEST
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({} {} {:02X?})",
            head::name(self.head()),
            cmd::name(self.cmd()),
            self.payload()
        )
    }
}

/// Extract the advertised power hint from manufacturer data
///
/// Returns `None` when the company id is absent or the data is too short.
pub fn power_from_manufacturer_data(company_id: u16, data: &[u8]) -> Option<bool> {
    if company_id != gatt::STATUS_COMPANY_ID {
        return None;
    }
    data.get(gatt::STATUS_POWER_OFFSET).map(|&b| b == 0x01)
}

/// Characteristic UUID as lowercase hyphenated string
pub fn uuid_string(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = Frame::encode(head::COMMAND, cmd::POWER, &[0x01]).unwrap();
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), FRAME_LEN);
        assert_eq!(bytes[0], 0x33);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[2], 0x01);
        assert!(bytes[3..19].iter().all(|&b| b == 0));
        assert_eq!(bytes[19], 0x33 ^ 0x01 ^ 0x01);
    }

    #[test]
    fn test_known_power_on_frame() {
        // Captured "turn on" frame
        let frame = Frame::encode(head::COMMAND, cmd::POWER, &[0x01]).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[
                0x33, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x33
            ]
        );
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = Frame::encode(head::REQUEST, cmd::COLOR, &[1, 2, 3]).unwrap();
        let b = Frame::encode(head::REQUEST, cmd::COLOR, &[1, 2, 3]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_roundtrip_recovers_fields() {
        let payloads: [&[u8]; 4] = [&[], &[0x05], &[9; 10], &[0xAB; MAX_PAYLOAD_LEN]];
        for payload in payloads {
            let frame = Frame::encode(head::REQUEST, cmd::SEGMENT, payload).unwrap();
            assert!(verify_checksum(frame.as_bytes()));
            let decoded = Frame::decode(frame.as_bytes()).unwrap();
            assert_eq!(decoded.head(), head::REQUEST);
            assert_eq!(decoded.cmd(), cmd::SEGMENT);
            assert_eq!(&decoded.payload()[..payload.len()], payload);
            assert!(decoded.payload()[payload.len()..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_payload_too_long() {
        let err = Frame::encode(head::COMMAND, cmd::COLOR, &[0; 18]).unwrap_err();
        assert_eq!(err, FrameError::PayloadTooLong { len: 18 });
    }

    #[test]
    fn test_single_byte_corruption_detected() {
        let frame = Frame::encode(head::COMMAND, cmd::BRIGHTNESS, &[0x40]).unwrap();
        for i in 0..FRAME_LEN {
            let mut corrupted = *frame.as_bytes();
            corrupted[i] ^= 0x5A;
            assert!(!verify_checksum(&corrupted), "byte {i} corruption missed");
            assert!(matches!(
                Frame::decode(&corrupted),
                Err(FrameError::ChecksumMismatch { .. })
            ));
        }
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        assert_eq!(
            Frame::decode(&[0xAA, 0x01]),
            Err(FrameError::InvalidLength { len: 2 })
        );
        assert!(!verify_checksum(&[]));
    }

    #[test]
    fn test_power_hint() {
        assert_eq!(
            power_from_manufacturer_data(0x8803, &[0, 0, 0, 0, 1]),
            Some(true)
        );
        assert_eq!(
            power_from_manufacturer_data(0x8803, &[0, 0, 0, 0, 0]),
            Some(false)
        );
        assert_eq!(power_from_manufacturer_data(0x8803, &[0, 0]), None);
        assert_eq!(power_from_manufacturer_data(0x004C, &[0, 0, 0, 0, 1]), None);
    }

    #[test]
    fn test_characteristic_uuids() {
        assert_eq!(
            uuid_string(&gatt::WRITE_CHARACTERISTIC),
            "00010203-0405-0607-0809-0a0b0c0d2b11"
        );
        assert_eq!(
            uuid_string(&gatt::NOTIFY_CHARACTERISTIC),
            "00010203-0405-0607-0809-0a0b0c0d2b10"
        );
    }
}
