//! Frame codec: a 4-byte little-endian length prefix followed by that many
//! bytes of UTF-16LE encoded JSON text.

use crate::{Action, Credentials, PlayMessage, Request, Response, RoomRequest};
use serde::Serialize;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload either side puts on or accepts from the network.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("payload of {0} bytes exceeds the {} byte limit", MAX_FRAME_LEN)]
    TooLarge(usize),
}

/// Failure to read the next frame off a stream
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The stream cannot be resynchronized after this
    #[error("invalid payload length {0}")]
    InvalidLength(i32),

    /// The payload was read and discarded; the stream is still aligned
    #[error("discarded oversized frame of {0} bytes")]
    Oversized(usize),
}

impl ReadError {
    /// Whether the next frame can still be read from the same stream
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReadError::Oversized(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is shorter than its length prefix")]
    MissingHeader,

    #[error("invalid payload length {0}")]
    InvalidLength(i32),

    #[error("truncated frame: expected {expected} payload bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload is not valid UTF-16 text")]
    InvalidText,

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("envelope has no action")]
    MissingAction,

    #[error("unknown action `{0}`")]
    UnknownAction(String),

    #[error("invalid `{action}` payload: {source}")]
    Payload {
        action: Action,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializes `value` to JSON and wraps it in a length-prefixed UTF-16 frame.
///
/// Fails when the payload would be rejected by [`read_frame`] on the other end.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let json = serde_json::to_string(value)?;
    let payload: Vec<u8> = json.encode_utf16().flat_map(u16::to_le_bytes).collect();
    if payload.len() > MAX_FRAME_LEN {
        return Err(EncodeError::TooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as i32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Validates a length prefix and returns the payload length it announces.
pub fn payload_len(header: [u8; HEADER_LEN]) -> Result<usize, DecodeError> {
    let len = i32::from_le_bytes(header);
    if len < 0 || len as usize > MAX_FRAME_LEN {
        return Err(DecodeError::InvalidLength(len));
    }
    Ok(len as usize)
}

/// Extracts the JSON text from a complete frame. Bytes past the announced
/// payload length are ignored.
pub fn decode_text(frame: &[u8]) -> Result<String, DecodeError> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::MissingHeader);
    }

    let (header, rest) = frame.split_at(HEADER_LEN);
    let mut prefix = [0u8; HEADER_LEN];
    prefix.copy_from_slice(header);
    let len = payload_len(prefix)?;

    if rest.len() < len {
        return Err(DecodeError::Truncated {
            expected: len,
            actual: rest.len(),
        });
    }

    let payload = &rest[..len];
    if payload.len() % 2 != 0 {
        return Err(DecodeError::InvalidText);
    }

    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16(&units).map_err(|_| DecodeError::InvalidText)
}

pub fn decode_request(frame: &[u8]) -> Result<Request, DecodeError> {
    parse_request(&decode_text(frame)?)
}

pub fn decode_response(frame: &[u8]) -> Result<Response, DecodeError> {
    Ok(serde_json::from_str(&decode_text(frame)?)?)
}

/// Peeks the `action` discriminator, then parses the object into exactly the
/// payload type that action declares.
pub fn parse_request(json: &str) -> Result<Request, DecodeError> {
    let value: Value = serde_json::from_str(json)?;
    let action = match &value {
        Value::Object(fields) => match fields.get("action").and_then(Value::as_str) {
            Some(action) if !action.is_empty() => action.to_string(),
            _ => return Err(DecodeError::MissingAction),
        },
        _ => return Err(DecodeError::NotAnObject),
    };

    let action = Action::parse(&action).ok_or(DecodeError::UnknownAction(action))?;
    let payload_err = |source| DecodeError::Payload { action, source };

    let request = match action {
        Action::Login => Request::Login(
            serde_json::from_value::<Credentials>(value).map_err(payload_err)?,
        ),
        Action::Create => Request::Create(
            serde_json::from_value::<Credentials>(value).map_err(payload_err)?,
        ),
        Action::JoinOrCreateRoom => Request::JoinOrCreateRoom(
            serde_json::from_value::<RoomRequest>(value).map_err(payload_err)?,
        ),
        Action::LeaveRoom => Request::LeaveRoom,
        Action::PlayAction => Request::PlayAction(
            serde_json::from_value::<PlayMessage>(value).map_err(payload_err)?,
        ),
    };

    Ok(request)
}

/// Reads one complete frame (prefix included) from `reader`.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary. A
/// payload longer than [`MAX_FRAME_LEN`] is skipped without buffering it and
/// reported as [`ReadError::Oversized`].
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ReadError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = match payload_len(header) {
        Ok(len) => len,
        Err(_) => return Err(skip_payload(reader, i32::from_le_bytes(header)).await),
    };

    let mut frame = vec![0u8; HEADER_LEN + len];
    frame[..HEADER_LEN].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(frame))
}

async fn skip_payload<R>(reader: &mut R, len: i32) -> ReadError
where
    R: AsyncRead + Unpin,
{
    if len < 0 {
        return ReadError::InvalidLength(len);
    }

    let len = len as u64;
    match tokio::io::copy(&mut reader.take(len), &mut tokio::io::sink()).await {
        Ok(skipped) if skipped == len => ReadError::Oversized(len as usize),
        Ok(_) => io::Error::from(io::ErrorKind::UnexpectedEof).into(),
        Err(e) => e.into(),
    }
}

pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;

    fn frame_from_text(text: &str) -> Vec<u8> {
        let payload: Vec<u8> = text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        let mut frame = (payload.len() as i32).to_le_bytes().to_vec();
        frame.extend_from_slice(&payload);
        frame
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode(&Response::success("ok")).unwrap();
        let json = r#"{"status":"success","message":"ok"}"#;

        assert_eq!(&frame[..4], &((json.len() * 2) as i32).to_le_bytes());
        assert_eq!(frame.len(), 4 + json.len() * 2);
        // ASCII in UTF-16LE: low byte first, high byte zero
        assert_eq!(frame[4], b'{');
        assert_eq!(frame[5], 0);
    }

    #[test]
    fn test_decode_response() {
        let frame = encode(&Response::error("Room full.")).unwrap();
        let response = decode_response(&frame).unwrap();

        assert_eq!(response.status, Status::Error);
        assert_eq!(response.message, "Room full.");
    }

    #[test]
    fn test_decode_non_ascii_text() {
        let frame = frame_from_text(r#"{"action":"playAction","content":"gg 🎲 ø"}"#);
        let request = decode_request(&frame).unwrap();

        assert_eq!(
            request,
            Request::PlayAction(PlayMessage {
                content: "gg 🎲 ø".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let request =
            parse_request(r#"{"action":"joinOrCreateRoom","roomName":"r1","extra":42}"#).unwrap();
        assert_eq!(
            request,
            Request::JoinOrCreateRoom(RoomRequest {
                room_name: "r1".to_string()
            })
        );
    }

    #[test]
    fn test_missing_credentials_default_to_empty() {
        let request = parse_request(r#"{"action":"create"}"#).unwrap();
        assert_eq!(request, Request::Create(Credentials::default()));
    }

    #[test]
    fn test_leave_ignores_room_name() {
        assert_eq!(
            parse_request(r#"{"action":"leaveRoom","roomName":"whatever"}"#).unwrap(),
            Request::LeaveRoom
        );
        assert_eq!(
            parse_request(r#"{"action":"leaveRoom","roomName":""}"#).unwrap(),
            Request::LeaveRoom
        );
    }

    #[test]
    fn test_missing_or_empty_action() {
        assert!(matches!(
            parse_request(r#"{"roomName":"r1"}"#),
            Err(DecodeError::MissingAction)
        ));
        assert!(matches!(
            parse_request(r#"{"action":""}"#),
            Err(DecodeError::MissingAction)
        ));
        assert!(matches!(
            parse_request(r#"{"action":7}"#),
            Err(DecodeError::MissingAction)
        ));
    }

    #[test]
    fn test_unknown_action() {
        match parse_request(r#"{"action":"surrender"}"#) {
            Err(DecodeError::UnknownAction(action)) => assert_eq!(action, "surrender"),
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_variant_shape_mismatch() {
        match parse_request(r#"{"action":"playAction","roomName":"r1"}"#) {
            Err(DecodeError::Payload { action, .. }) => assert_eq!(action, Action::PlayAction),
            other => panic!("Unexpected result: {:?}", other),
        }

        assert!(matches!(
            parse_request(r#"{"action":"joinOrCreateRoom","roomName":5}"#),
            Err(DecodeError::Payload { .. })
        ));
    }

    #[test]
    fn test_non_json_and_non_object() {
        assert!(matches!(parse_request("hello"), Err(DecodeError::Json(_))));
        assert!(matches!(
            parse_request(r#"["login"]"#),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn test_malformed_frames() {
        let frame = frame_from_text(r#"{"action":"login"}"#);

        assert!(matches!(decode_text(&[]), Err(DecodeError::MissingHeader)));
        assert!(matches!(
            decode_text(&frame[..3]),
            Err(DecodeError::MissingHeader)
        ));
        assert!(matches!(
            decode_text(&frame[..frame.len() - 2]),
            Err(DecodeError::Truncated { .. })
        ));

        let mut negative = (-1i32).to_le_bytes().to_vec();
        negative.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decode_text(&negative),
            Err(DecodeError::InvalidLength(-1))
        ));

        let mut odd = 3i32.to_le_bytes().to_vec();
        odd.extend_from_slice(&[b'{', 0, b'}']);
        assert!(matches!(decode_text(&odd), Err(DecodeError::InvalidText)));

        // Lone high surrogate
        let mut surrogate = 2i32.to_le_bytes().to_vec();
        surrogate.extend_from_slice(&0xD800u16.to_le_bytes());
        assert!(matches!(
            decode_text(&surrogate),
            Err(DecodeError::InvalidText)
        ));
    }

    #[test]
    fn test_payload_len_bounds() {
        assert_eq!(payload_len(0i32.to_le_bytes()).unwrap(), 0);
        assert_eq!(
            payload_len((MAX_FRAME_LEN as i32).to_le_bytes()).unwrap(),
            MAX_FRAME_LEN
        );
        assert!(payload_len((MAX_FRAME_LEN as i32 + 1).to_le_bytes()).is_err());
    }

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let first = encode(&Response::success("one")).unwrap();
        let second = encode(&Response::info("two")).unwrap();

        // Split the first frame across reads to exercise partial delivery
        let mut reader = tokio_test::io::Builder::new()
            .read(&first[..6])
            .read(&first[6..])
            .read(&second)
            .build();

        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_response(&frame).unwrap().message, "one");

        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_response(&frame).unwrap().status, Status::Info);

        assert!(read_frame(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_skips_oversized_payload() {
        let len = MAX_FRAME_LEN + 2;
        let header = (len as i32).to_le_bytes();
        let junk = vec![0xAB; len];
        let next = encode(&Response::success("after")).unwrap();

        let mut reader = tokio_test::io::Builder::new()
            .read(&header)
            .read(&junk)
            .read(&next)
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, ReadError::Oversized(n) if n == len));
        assert!(err.is_recoverable());

        let frame = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(decode_response(&frame).unwrap().message, "after");
    }

    #[tokio::test]
    async fn test_read_frame_truncated_oversized_payload() {
        let header = ((MAX_FRAME_LEN + 2) as i32).to_le_bytes();
        let mut reader = tokio_test::io::Builder::new()
            .read(&header)
            .read(&[0; 10])
            .build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(!err.is_recoverable());
        assert!(matches!(err, ReadError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[tokio::test]
    async fn test_read_frame_negative_length_is_fatal() {
        let header = (-8i32).to_le_bytes();
        let mut reader = tokio_test::io::Builder::new().read(&header).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, ReadError::InvalidLength(-8)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_encode_size_limit() {
        let overhead = encode(&Response::success("")).unwrap().len() - HEADER_LEN;
        let fits = "x".repeat((MAX_FRAME_LEN - overhead) / 2);

        let frame = encode(&Response::success(fits.as_str())).unwrap();
        assert_eq!(frame.len(), HEADER_LEN + MAX_FRAME_LEN);
        assert_eq!(decode_response(&frame).unwrap().message, fits);

        let too_big = format!("{}x", fits);
        assert!(matches!(
            encode(&Response::success(too_big.as_str())),
            Err(EncodeError::TooLarge(n)) if n == MAX_FRAME_LEN + 2
        ));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let frame = encode(&Request::LeaveRoom).unwrap();
        let mut writer = tokio_test::io::Builder::new().write(&frame).build();

        write_frame(&mut writer, &frame).await.unwrap();
    }
}
