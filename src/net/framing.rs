//! WebSocket frame handling
//!
//! Turns raw tungstenite messages into protocol text or close notices and
//! builds the outbound frames the client sends.

use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use crate::game::constants::net::{CLOSE_NORMAL, MAX_FRAME_SIZE};

/// Close code reported when the peer closed without a status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Errors that can occur while unwrapping an inbound frame
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("Frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),
    #[error("Binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Inbound frame after unwrapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Protocol payload (JSON text)
    Text(String),
    /// Peer closed the socket
    Close { code: u16, reason: String },
    /// WebSocket-level ping/pong; answered by tungstenite
    Control,
}

/// Unwrap a tungstenite message
pub fn read_frame(message: Message) -> Result<InboundFrame, FramingError> {
    match message {
        Message::Text(text) => {
            check_size(text.len())?;
            Ok(InboundFrame::Text(text.as_str().to_owned()))
        }
        Message::Binary(data) => {
            // Some proxies re-frame text as binary
            check_size(data.len())?;
            let text = std::str::from_utf8(&data).map_err(|_| FramingError::NotUtf8)?;
            Ok(InboundFrame::Text(text.to_owned()))
        }
        Message::Close(frame) => Ok(match frame {
            Some(frame) => InboundFrame::Close {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_owned(),
            },
            None => InboundFrame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            },
        }),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(InboundFrame::Control),
    }
}

/// Outbound protocol text frame
pub fn text_frame(text: String) -> Message {
    Message::Text(text.into())
}

/// Outbound close frame
pub fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

/// Whether a close should trigger reconnection. Only a normal (1000) close
/// counts as clean; going-away, no-status and abnormal codes all retry.
pub fn is_abnormal_close(code: u16) -> bool {
    code != CLOSE_NORMAL
}

fn check_size(len: usize) -> Result<(), FramingError> {
    if len > MAX_FRAME_SIZE {
        Err(FramingError::FrameTooLarge(len, MAX_FRAME_SIZE))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_text_frame() {
        let frame = read_frame(text_frame(r#"{"type":"pong"}"#.to_string())).unwrap();
        assert_eq!(frame, InboundFrame::Text(r#"{"type":"pong"}"#.to_string()));
    }

    #[test]
    fn test_read_binary_utf8() {
        let frame = read_frame(Message::Binary(b"{}".to_vec().into())).unwrap();
        assert_eq!(frame, InboundFrame::Text("{}".to_string()));

        let bad = read_frame(Message::Binary(vec![0xff, 0xfe].into()));
        assert!(matches!(bad, Err(FramingError::NotUtf8)));
    }

    #[test]
    fn test_oversized_frame() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(
            read_frame(text_frame(big)),
            Err(FramingError::FrameTooLarge(_, MAX_FRAME_SIZE))
        ));
    }

    #[test]
    fn test_close_codes() {
        let frame = read_frame(close_frame(4001, "kicked")).unwrap();
        assert_eq!(
            frame,
            InboundFrame::Close {
                code: 4001,
                reason: "kicked".to_string()
            }
        );
        assert_eq!(
            read_frame(Message::Close(None)).unwrap(),
            InboundFrame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new()
            }
        );
        assert!(read_frame(Message::Ping(Vec::new().into())).unwrap() == InboundFrame::Control);
    }

    #[test]
    fn test_abnormal_close() {
        assert!(!is_abnormal_close(1000));
        assert!(is_abnormal_close(1001));
        assert!(is_abnormal_close(1006));
        assert!(is_abnormal_close(CLOSE_NO_STATUS));
    }
}
