//! Delivery of encoded user messages to recipients.
//!
//! [`Transport`] is the seam between the envelope and the network. Two
//! implementations ship with the crate: [`ChannelTransport`] fans out into an
//! in-process `flume` queue, [`ZenohTransport`] puts one sample per recipient
//! on `<prefix>/<recipient>/<message_name>`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use zenoh::key_expr::KeyExpr;
use zenoh::sample::Sample;
use zenoh::{Session, Wait};

use crate::attachment::{Attachment, GidArray, gid_from};
use crate::dynamic::DynamicMessage;
use crate::error::{BufferKind, Error, Result, TransportError};
use crate::legacy::BitReader;
use crate::recipients::{RecipientFilter, RecipientIndex};
use crate::registry::MessageRegistry;

/// One encoded user message, ready to go out.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub message_name: String,
    pub message_index: i32,
    pub is_protobuf: bool,
    pub payload: Vec<u8>,
}

/// Sends an encoded message to every recipient of a filter.
pub trait Transport: fmt::Debug + Send + Sync {
    fn deliver(
        &self,
        recipients: &dyn RecipientFilter,
        delivery: &Delivery,
    ) -> std::result::Result<(), TransportError>;
}

/// A user message as seen by one recipient.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveredMessage {
    pub recipient: RecipientIndex,
    pub message_name: String,
    pub message_index: i32,
    pub is_protobuf: bool,
    pub reliable: bool,
    pub init_message: bool,
    pub payload: Vec<u8>,
}

impl DeliveredMessage {
    /// Decode a protobuf payload with the schema registered under its index.
    pub fn decode(&self, registry: &MessageRegistry) -> Result<DynamicMessage> {
        let registered = registry.resolve_index(self.message_index)?;
        let schema = registered.schema().ok_or_else(|| Error::BufferKindMismatch {
            message: registered.name.clone(),
            expected: BufferKind::Protobuf,
            found: BufferKind::Legacy,
        })?;
        if !self.is_protobuf {
            return Err(Error::BufferKindMismatch {
                message: self.message_name.clone(),
                expected: BufferKind::Protobuf,
                found: BufferKind::Legacy,
            });
        }
        Ok(DynamicMessage::decode(&self.payload, schema)?)
    }

    /// Bit reader over a legacy payload.
    pub fn legacy_reader(&self) -> Result<BitReader<'_>> {
        if self.is_protobuf {
            return Err(Error::BufferKindMismatch {
                message: self.message_name.clone(),
                expected: BufferKind::Legacy,
                found: BufferKind::Protobuf,
            });
        }
        Ok(BitReader::new(&self.payload))
    }
}

/// In-process transport: every recipient gets a copy on a `flume` channel.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    tx: flume::Sender<DeliveredMessage>,
}

impl ChannelTransport {
    /// Unbounded transport and the receiving end of its queue.
    pub fn pair() -> (Self, flume::Receiver<DeliveredMessage>) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, rx)
    }

    /// Transport whose queue holds at most `capacity` undelivered messages.
    pub fn bounded(capacity: usize) -> (Self, flume::Receiver<DeliveredMessage>) {
        let (tx, rx) = flume::bounded(capacity);
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn deliver(
        &self,
        recipients: &dyn RecipientFilter,
        delivery: &Delivery,
    ) -> std::result::Result<(), TransportError> {
        let reliable = recipients.is_reliable();
        let init_message = recipients.is_init_message();
        for recipient in recipients.recipients() {
            self.tx
                .send(DeliveredMessage {
                    recipient,
                    message_name: delivery.message_name.clone(),
                    message_index: delivery.message_index,
                    is_protobuf: delivery.is_protobuf,
                    reliable,
                    init_message,
                    payload: delivery.payload.clone(),
                })
                .map_err(|_| TransportError::Disconnected)?;
            trace!("[CHN] Queued '{}' for {}", delivery.message_name, recipient);
        }
        Ok(())
    }
}

/// Key expression a recipient's copy of `message_name` is put on.
pub fn recipient_key(prefix: &str, recipient: RecipientIndex, message_name: &str) -> String {
    format!("{}/{}/{}", prefix, recipient, message_name)
}

/// Zenoh transport: one put per recipient, publishers cached per key.
pub struct ZenohTransport {
    session: Arc<Session>,
    key_prefix: String,
    gid: GidArray,
    sn: AtomicI64,
    publishers: Mutex<HashMap<(String, bool), zenoh::pubsub::Publisher<'static>>>,
}

impl fmt::Debug for ZenohTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZenohTransport")
            .field("key_prefix", &self.key_prefix)
            .field("gid", &format_args!("{:02x?}", &self.gid[..4]))
            .field("publishers", &self.publishers.lock().len())
            .finish()
    }
}

impl ZenohTransport {
    pub fn new(session: Arc<Session>, key_prefix: impl Into<String>) -> Self {
        let gid = gid_from(&session.zid().to_string());
        Self {
            session,
            key_prefix: key_prefix.into(),
            gid,
            sn: AtomicI64::new(0),
            publishers: Mutex::new(HashMap::new()),
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn gid(&self) -> GidArray {
        self.gid
    }

    fn new_attachment(&self, delivery: &Delivery, recipients: &dyn RecipientFilter) -> Attachment {
        let sn = self.sn.fetch_add(1, Ordering::Relaxed);
        trace!("[ZTX] Creating attachment: sn={}, gid={:02x?}", sn, &self.gid[..4]);
        Attachment {
            sequence_number: sn,
            message_index: delivery.message_index,
            is_protobuf: delivery.is_protobuf,
            reliable: recipients.is_reliable(),
            init_message: recipients.is_init_message(),
            source_gid: self.gid,
        }
    }

    fn declare_publisher(
        &self,
        key: &str,
        reliable: bool,
    ) -> std::result::Result<zenoh::pubsub::Publisher<'static>, TransportError> {
        let key_expr = KeyExpr::try_from(key.to_string())
            .map_err(|_| TransportError::KeyExpr(key.to_string()))?;
        let mut pub_builder = self.session.declare_publisher(key_expr);

        // Reliable filters block on congestion, the rest may be dropped
        if reliable {
            pub_builder = pub_builder.congestion_control(zenoh::qos::CongestionControl::Block);
            debug!("[ZTX] {}: Reliable (Block)", key);
        } else {
            pub_builder = pub_builder.congestion_control(zenoh::qos::CongestionControl::Drop);
            debug!("[ZTX] {}: Unreliable (Drop)", key);
        }

        let publisher = pub_builder
            .wait()
            .map_err(|e| TransportError::Zenoh(e.to_string()))?;
        info!("[ZTX] Publisher ready: key={}", key);
        Ok(publisher)
    }
}

impl Transport for ZenohTransport {
    #[tracing::instrument(name = "deliver", skip(self, recipients, delivery), fields(
        message = %delivery.message_name,
        recipients = recipients.recipient_count(),
        payload_len = delivery.payload.len()
    ))]
    fn deliver(
        &self,
        recipients: &dyn RecipientFilter,
        delivery: &Delivery,
    ) -> std::result::Result<(), TransportError> {
        let reliable = recipients.is_reliable();
        let mut publishers = self.publishers.lock();

        for recipient in recipients.recipients() {
            let key = recipient_key(&self.key_prefix, recipient, &delivery.message_name);
            let publisher = match publishers.entry((key.clone(), reliable)) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(self.declare_publisher(&key, reliable)?),
            };

            let att = self.new_attachment(delivery, recipients);
            let sn = att.sequence_number;
            publisher
                .put(delivery.payload.clone())
                .attachment(att)
                .wait()
                .map_err(|e| TransportError::Zenoh(e.to_string()))?;
            trace!("[ZTX] Put sn={} to {}", sn, key);
        }
        Ok(())
    }
}

fn delivered_from_sample(sample: &Sample) -> std::result::Result<DeliveredMessage, String> {
    let key = sample.key_expr().as_str();
    let mut segments = key.rsplitn(3, '/');
    let message_name = segments.next().unwrap_or_default().to_string();
    let recipient = segments
        .next()
        .and_then(|s| s.parse::<RecipientIndex>().ok())
        .ok_or_else(|| format!("no recipient index in key '{}'", key))?;

    let attachment = sample
        .attachment()
        .ok_or_else(|| format!("sample on '{}' has no attachment", key))?;
    let att = Attachment::try_from(attachment).map_err(|e| e.to_string())?;

    Ok(DeliveredMessage {
        recipient,
        message_name,
        message_index: att.message_index,
        is_protobuf: att.is_protobuf,
        reliable: att.reliable,
        init_message: att.init_message,
        payload: sample.payload().to_bytes().into_owned(),
    })
}

/// Zenoh subscriber for user messages addressed to one recipient or to all.
pub struct MessageListener {
    key_expr: String,
    _inner: zenoh::pubsub::Subscriber<()>,
    queue: flume::Receiver<DeliveredMessage>,
}

impl fmt::Debug for MessageListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageListener")
            .field("key_expr", &self.key_expr)
            .field("pending", &self.queue.len())
            .finish()
    }
}

impl MessageListener {
    pub fn new(
        session: &Session,
        key_prefix: &str,
        recipient: Option<RecipientIndex>,
    ) -> std::result::Result<Self, TransportError> {
        let key_expr = match recipient {
            Some(index) => format!("{}/{}/*", key_prefix, index),
            None => format!("{}/*/*", key_prefix),
        };
        let ke = KeyExpr::try_from(key_expr.clone())
            .map_err(|_| TransportError::KeyExpr(key_expr.clone()))?;

        let (tx, rx) = flume::unbounded();
        let inner = session
            .declare_subscriber(ke)
            .callback(move |sample| match delivered_from_sample(&sample) {
                Ok(msg) => {
                    let _ = tx.send(msg);
                }
                Err(e) => warn!("[ZRX] Dropping sample: {}", e),
            })
            .wait()
            .map_err(|e| TransportError::Zenoh(e.to_string()))?;

        info!("[ZRX] Listener ready: key={}", key_expr);
        Ok(Self {
            key_expr,
            _inner: inner,
            queue: rx,
        })
    }

    pub fn key_expr(&self) -> &str {
        &self.key_expr
    }

    /// Block until the next message arrives.
    pub fn recv(&self) -> std::result::Result<DeliveredMessage, TransportError> {
        self.queue.recv().map_err(|_| TransportError::Disconnected)
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<DeliveredMessage> {
        self.queue.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<DeliveredMessage> {
        self.queue.try_recv().ok()
    }
}
