//! The user message envelope.
//!
//! A [`UserMessage`] binds a payload buffer to a recipient filter, a message
//! type name and the index the registry assigned to that name. Callers
//! populate the buffer and then [`send`](UserMessage::send) it, which
//! consumes the envelope.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dynamic::DynamicMessage;
use crate::error::{BufferKind, Error, Result, SendFailure};
use crate::legacy::{BitBuffer, MAX_LEGACY_PAYLOAD};
use crate::recipients::RecipientFilter;
use crate::registry::{MessageFormat, MessageRegistry};
use crate::transport::{Delivery, Transport};

/// Default limit for an encoded protobuf user message.
pub const DEFAULT_MAX_PAYLOAD: usize = 4096;

/// Payload of an envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageBuffer {
    Protobuf(DynamicMessage),
    Legacy(BitBuffer),
}

impl MessageBuffer {
    pub fn kind(&self) -> BufferKind {
        match self {
            MessageBuffer::Protobuf(_) => BufferKind::Protobuf,
            MessageBuffer::Legacy(_) => BufferKind::Legacy,
        }
    }

    /// Bytes handed to the transport.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            MessageBuffer::Protobuf(msg) => msg.encode(),
            MessageBuffer::Legacy(bits) => bits.as_bytes().to_vec(),
        }
    }

    /// Largest payload this kind of buffer may carry.
    fn max_payload(&self, protobuf_max: usize) -> usize {
        match self {
            MessageBuffer::Protobuf(_) => protobuf_max,
            MessageBuffer::Legacy(_) => MAX_LEGACY_PAYLOAD,
        }
    }
}

/// What a successful send delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_name: String,
    pub message_index: i32,
    pub recipients: usize,
    pub payload_len: usize,
}

fn mismatch(message: &str, expected: BufferKind) -> Error {
    let found = match expected {
        BufferKind::Protobuf => BufferKind::Legacy,
        BufferKind::Legacy => BufferKind::Protobuf,
    };
    Error::BufferKindMismatch {
        message: message.to_string(),
        expected,
        found,
    }
}

/// A user message on its way to a set of recipients.
///
/// Sending consumes the envelope, so it cannot be sent twice:
///
/// ```compile_fail
/// use std::sync::Arc;
/// use usermsg::{ChannelTransport, MessageRegistry, RecipientSet, UserMessage};
///
/// let registry = MessageRegistry::bundled().unwrap();
/// let (transport, _rx) = ChannelTransport::pair();
/// let msg = UserMessage::create(
///     Arc::new(RecipientSet::single(1)),
///     "SayText2",
///     &registry,
///     Arc::new(transport),
/// )
/// .unwrap();
/// msg.send().unwrap();
/// msg.send().unwrap();
/// ```
pub struct UserMessage {
    recipients: Arc<dyn RecipientFilter>,
    message_name: String,
    message_index: i32,
    buffer: MessageBuffer,
    transport: Arc<dyn Transport>,
    max_payload: usize,
}

impl fmt::Debug for UserMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserMessage")
            .field("message_name", &self.message_name)
            .field("message_index", &self.message_index)
            .field("recipients", &self.recipients)
            .field("buffer", &self.buffer.kind())
            .finish()
    }
}

impl UserMessage {
    /// Resolve `message_name` and allocate the matching empty buffer.
    pub fn create(
        recipients: Arc<dyn RecipientFilter>,
        message_name: &str,
        registry: &MessageRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let registered = registry.resolve(message_name)?;
        let buffer = match &registered.format {
            MessageFormat::Protobuf(schema) => MessageBuffer::Protobuf(DynamicMessage::new(schema)),
            MessageFormat::Legacy => MessageBuffer::Legacy(BitBuffer::new()),
        };
        debug!(
            "[UMSG] Created '{}' index={} buffer={}",
            message_name,
            registered.index,
            buffer.kind()
        );
        Ok(Self {
            recipients,
            message_name: registered.name.clone(),
            message_index: registered.index,
            buffer,
            transport,
            max_payload: DEFAULT_MAX_PAYLOAD,
        })
    }

    /// Override the protobuf payload limit.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn recipients(&self) -> &dyn RecipientFilter {
        self.recipients.as_ref()
    }

    pub fn message_name(&self) -> &str {
        &self.message_name
    }

    pub fn message_index(&self) -> i32 {
        self.message_index
    }

    pub fn is_protobuf(&self) -> bool {
        matches!(self.buffer, MessageBuffer::Protobuf(_))
    }

    pub fn buffer(&self) -> &MessageBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut MessageBuffer {
        &mut self.buffer
    }

    /// The protobuf payload; fails on legacy envelopes.
    pub fn protobuf(&self) -> Result<&DynamicMessage> {
        match &self.buffer {
            MessageBuffer::Protobuf(msg) => Ok(msg),
            MessageBuffer::Legacy(_) => Err(mismatch(&self.message_name, BufferKind::Protobuf)),
        }
    }

    /// Mutable protobuf payload for the field accessors.
    pub fn protobuf_mut(&mut self) -> Result<&mut DynamicMessage> {
        match &mut self.buffer {
            MessageBuffer::Protobuf(msg) => Ok(msg),
            MessageBuffer::Legacy(_) => Err(mismatch(&self.message_name, BufferKind::Protobuf)),
        }
    }

    /// Mutable legacy bit buffer; fails on protobuf envelopes.
    pub fn legacy_mut(&mut self) -> Result<&mut BitBuffer> {
        match &mut self.buffer {
            MessageBuffer::Legacy(bits) => Ok(bits),
            MessageBuffer::Protobuf(_) => Err(mismatch(&self.message_name, BufferKind::Legacy)),
        }
    }

    /// Fill the protobuf payload from a nested JSON object.
    pub fn populate(&mut self, data: &serde_json::Value) -> Result<()> {
        self.protobuf_mut()?.populate_from_json(data)?;
        Ok(())
    }

    fn send_failed(&self, reason: SendFailure) -> Error {
        Error::SendFailed {
            message: self.message_name.clone(),
            reason,
        }
    }

    /// Encode the payload and hand it to the transport for every recipient.
    #[tracing::instrument(name = "send", skip(self), fields(
        message = %self.message_name,
        index = self.message_index,
        payload_len = tracing::field::Empty
    ))]
    pub fn send(self) -> Result<SendReceipt> {
        let recipients = self.recipients.recipients().count();
        if recipients == 0 {
            warn!("[UMSG] '{}' has no recipients", self.message_name);
            return Err(self.send_failed(SendFailure::NoRecipients));
        }

        let payload = self.buffer.encode();
        tracing::Span::current().record("payload_len", payload.len());

        let max = self.buffer.max_payload(self.max_payload);
        if payload.len() > max {
            return Err(self.send_failed(SendFailure::PayloadTooLarge {
                size: payload.len(),
                max,
            }));
        }

        let payload_len = payload.len();
        let delivery = Delivery {
            message_name: self.message_name.clone(),
            message_index: self.message_index,
            is_protobuf: self.is_protobuf(),
            payload,
        };
        self.transport
            .deliver(self.recipients.as_ref(), &delivery)
            .map_err(|e| self.send_failed(e.into()))?;

        debug!("[UMSG] Sent '{}' to {} recipients", self.message_name, recipients);
        Ok(SendReceipt {
            message_name: self.message_name,
            message_index: self.message_index,
            recipients,
            payload_len,
        })
    }
}
