//! Message model shared by the dispatcher and the surrounding pipeline runtime.
//!
//! A `Message` is a payload plus its own headers. A `MessageBundle` is what an
//! input channel actually delivers: the message together with channel-level
//! headers. A `RoutedResult` is the unit the dispatcher hands back: a bundle
//! and the name of the channel it must be written to.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Header map attached to messages and bundles.
///
/// Uses `BTreeMap` for deterministic iteration order in logs and tests.
pub type Headers = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A raw payload and its message-level headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    data: Bytes,
    headers: Headers,
}

impl Message {
    /// Creates a message with no headers.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            headers: Headers::new(),
        }
    }

    /// Creates a message with the given headers.
    #[must_use]
    pub fn with_headers(data: impl Into<Bytes>, headers: Headers) -> Self {
        Self {
            data: data.into(),
            headers,
        }
    }

    /// Payload bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload as a cheaply clonable buffer.
    #[must_use]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Sets a single header, replacing any previous value.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }
}

// ---------------------------------------------------------------------------
// MessageBundle
// ---------------------------------------------------------------------------

/// A message as delivered by (or handed to) a pipeline channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageBundle {
    /// The message itself.
    pub message: Message,
    /// Channel-level metadata (delivery tags, queue properties, ...).
    pub channel_headers: Headers,
}

impl MessageBundle {
    /// Wraps a message with empty channel headers.
    #[must_use]
    pub fn new(message: Message) -> Self {
        Self {
            message,
            channel_headers: Headers::new(),
        }
    }

    /// Wraps a message with the given channel headers.
    #[must_use]
    pub fn with_channel_headers(message: Message, channel_headers: Headers) -> Self {
        Self {
            message,
            channel_headers,
        }
    }

    /// Shorthand for a bundle around a header-less payload.
    #[must_use]
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self::new(Message::new(data))
    }
}

impl From<Message> for MessageBundle {
    fn from(message: Message) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// InputChannel
// ---------------------------------------------------------------------------

/// Descriptor of the channel a bundle was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputChannel {
    name: String,
}

impl InputChannel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

// ---------------------------------------------------------------------------
// RoutedResult
// ---------------------------------------------------------------------------

/// A bundle addressed to an output channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedResult {
    /// Name of the channel the bundle must be written to.
    pub output_channel: String,
    /// The outgoing bundle.
    pub bundle: MessageBundle,
}

impl RoutedResult {
    #[must_use]
    pub fn new(output_channel: impl Into<String>, bundle: MessageBundle) -> Self {
        Self {
            output_channel: output_channel.into(),
            bundle,
        }
    }

    /// Outgoing payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.bundle.message.bytes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_keeps_bytes_and_headers() {
        let mut msg = Message::new(&b"{\"x\":1}"[..]);
        msg.set_header("trace", "abc");
        assert_eq!(msg.bytes(), b"{\"x\":1}");
        assert_eq!(msg.headers().get("trace").map(String::as_str), Some("abc"));
    }

    #[test]
    fn empty_message_is_distinct_from_missing_message() {
        let empty = Message::new("");
        assert!(empty.bytes().is_empty());
        assert_eq!(empty, Message::default());
    }

    #[test]
    fn bundle_from_message_has_no_channel_headers() {
        let bundle: MessageBundle = Message::new("1").into();
        assert!(bundle.channel_headers.is_empty());
        assert_eq!(bundle.message.bytes(), b"1");
    }

    #[test]
    fn bundle_with_channel_headers() {
        let mut headers = Headers::new();
        headers.insert("queue".to_string(), "orders".to_string());
        let bundle = MessageBundle::with_channel_headers(Message::new("1"), headers);
        assert_eq!(bundle.channel_headers.len(), 1);
    }

    #[test]
    fn routed_result_exposes_payload() {
        let routed = RoutedResult::new("out", MessageBundle::from_bytes("42"));
        assert_eq!(routed.output_channel, "out");
        assert_eq!(routed.payload(), b"42");
    }

    #[test]
    fn input_channel_name() {
        assert_eq!(InputChannel::new("orders").name(), "orders");
    }
}
