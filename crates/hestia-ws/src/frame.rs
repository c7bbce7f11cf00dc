//! Frame decoding and encoding.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::WsError;

/// Declared payload lengths above this are treated as a protocol
/// violation rather than allocated.
const MAX_FRAME_PAYLOAD: u64 = 256 * 1024 * 1024;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// `0x0` — continuation of a fragmented message.
    Continuation,
    /// `0x1` — text message.
    Text,
    /// `0x2` — binary message.
    Binary,
    /// `0x8` — close.
    Close,
    /// `0x9` — ping.
    Ping,
    /// `0xA` — pong.
    Pong,
}

impl Opcode {
    /// Maps a wire opcode; unknown values yield `None`.
    #[must_use]
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// The wire value.
    #[must_use]
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Whether this opcode starts a data message.
    #[must_use]
    pub fn is_data(self) -> bool {
        matches!(self, Self::Text | Self::Binary)
    }
}

/// One decoded frame, already unmasked.
#[derive(Debug)]
pub struct Frame {
    /// Final fragment of its message.
    pub fin: bool,
    /// RSV1 bit; signals a compressed message when per-message-deflate
    /// was negotiated.
    pub rsv1: bool,
    /// The raw opcode nibble.
    pub raw_opcode: u8,
    /// The recognised opcode, when the nibble is assigned.
    pub opcode: Option<Opcode>,
    /// The unmasked payload.
    pub payload: Vec<u8>,
}

/// Reads one client frame.
///
/// Client-to-server frames must be masked; an unmasked frame is a
/// protocol violation and the connection is closed.
///
/// # Errors
///
/// [`WsError::Io`] on stream failure or EOF, [`WsError::Protocol`] on an
/// unmasked or oversized frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, WsError>
where
    R: AsyncRead + Unpin,
{
    let first = reader.read_u8().await?;
    let fin = first & 0x80 != 0;
    let rsv1 = first & 0x40 != 0;
    let raw_opcode = first & 0x0F;

    let second = reader.read_u8().await?;
    let masked = second & 0x80 != 0;
    let short_len = u64::from(second & 0x7F);

    let length = match short_len {
        126 => u64::from(reader.read_u16().await?),
        127 => reader.read_u64().await?,
        len => len,
    };
    if length > MAX_FRAME_PAYLOAD {
        return Err(WsError::Protocol(format!(
            "declared payload of {length} bytes is too large"
        )));
    }

    if !masked {
        return Err(WsError::Protocol(
            "client frame is not masked".to_string(),
        ));
    }
    let mut key = [0u8; 4];
    reader.read_exact(&mut key).await?;

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;
    for (index, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[index % 4];
    }

    Ok(Frame {
        fin,
        rsv1,
        raw_opcode,
        opcode: Opcode::from_wire(raw_opcode),
        payload,
    })
}

/// Encodes one server frame with FIN set.
///
/// Server-to-client frames are unmasked. `rsv1` marks a compressed
/// payload when per-message-deflate is in use.
#[must_use]
pub fn encode_frame(opcode: Opcode, rsv1: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 10);
    let mut first = 0x80 | opcode.to_wire();
    if rsv1 {
        first |= 0x40;
    }
    out.push(first);

    let len = payload.len();
    if len < 126 {
        out.push(len as u8);
    } else if len <= u16::MAX as usize {
        out.push(126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masked_frame(first: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
        let mut out = vec![first];
        let len = payload.len();
        if len < 126 {
            out.push(0x80 | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(0x80 | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(0x80 | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }
        out.extend_from_slice(&key);
        out.extend(
            payload
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ key[i % 4]),
        );
        out
    }

    #[tokio::test]
    async fn test_decode_short_text_frame() {
        let wire = masked_frame(0x81, b"hello", [1, 2, 3, 4]);
        let frame = read_frame(&mut wire.as_slice()).await.unwrap();
        assert!(frame.fin);
        assert!(!frame.rsv1);
        assert_eq!(frame.opcode, Some(Opcode::Text));
        assert_eq!(frame.payload, b"hello");
    }

    #[tokio::test]
    async fn test_decode_sixteen_bit_length() {
        let payload = vec![7u8; 600];
        let wire = masked_frame(0x82, &payload, [9, 8, 7, 6]);
        let frame = read_frame(&mut wire.as_slice()).await.unwrap();
        assert_eq!(frame.opcode, Some(Opcode::Binary));
        assert_eq!(frame.payload, payload);
    }

    #[tokio::test]
    async fn test_decode_sixtyfour_bit_length() {
        let payload = vec![1u8; 70_000];
        let wire = masked_frame(0x82, &payload, [0, 0, 0, 0]);
        let frame = read_frame(&mut wire.as_slice()).await.unwrap();
        assert_eq!(frame.payload.len(), 70_000);
    }

    #[tokio::test]
    async fn test_unmasked_frame_rejected() {
        // Same frame but without the mask bit or key.
        let mut wire = vec![0x81, 5];
        wire.extend_from_slice(b"hello");
        let err = read_frame(&mut wire.as_slice()).await.unwrap_err();
        assert!(matches!(err, WsError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_unknown_opcode_is_surfaced_not_fatal() {
        let wire = masked_frame(0x83, b"?", [1, 1, 1, 1]);
        let frame = read_frame(&mut wire.as_slice()).await.unwrap();
        assert_eq!(frame.opcode, None);
        assert_eq!(frame.raw_opcode, 0x3);
    }

    #[test]
    fn test_encode_decode_header_lengths() {
        let short = encode_frame(Opcode::Text, false, &[0u8; 5]);
        assert_eq!(short[1], 5);

        let medium = encode_frame(Opcode::Binary, false, &[0u8; 600]);
        assert_eq!(medium[1], 126);
        assert_eq!(u16::from_be_bytes([medium[2], medium[3]]), 600);

        let large = encode_frame(Opcode::Binary, false, &[0u8; 70_000]);
        assert_eq!(large[1], 127);
    }

    #[test]
    fn test_encode_sets_fin_and_rsv1() {
        let frame = encode_frame(Opcode::Text, true, b"x");
        assert_eq!(frame[0], 0x80 | 0x40 | 0x1);
        let plain = encode_frame(Opcode::Pong, false, b"");
        assert_eq!(plain[0], 0x80 | 0xA);
    }
}
