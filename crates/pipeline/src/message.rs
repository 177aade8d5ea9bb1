//! Outbound message type

use bytes::Bytes;
use strand_framing::Message;
use strand_sources::ConnectionInfo;

/// A framed message ready for downstream normalisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedMessage {
    /// Message payload without its terminating newline
    pub payload: Bytes,

    /// Offsets of unquoted `=` / `,` separators, if usable
    pub separators: Option<Vec<u32>>,

    /// Separator table ran out of room for this message
    pub separators_truncated: bool,

    /// Offset of the category marker, if present
    pub category_offset: Option<usize>,

    /// Where the data came from
    pub source: ConnectionInfo,

    /// Scheduler-assigned channel id
    pub channel_id: u64,
}

impl FramedMessage {
    /// Assemble a scanner message (copies only when it spans several chunks)
    pub fn from_message(message: Message<Bytes>, source: ConnectionInfo, channel_id: u64) -> Self {
        let payload = message.to_bytes();
        let separators_truncated = message.separators_truncated();
        let (_, separators, category_offset) = message.into_parts();
        Self {
            payload,
            separators,
            separators_truncated,
            category_offset,
            source,
            channel_id,
        }
    }

    /// Payload as text, replacing invalid UTF-8
    pub fn payload_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}
