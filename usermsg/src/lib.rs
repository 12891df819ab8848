pub mod attachment;
pub mod config;
pub mod dispatcher;
pub mod dynamic;
pub mod envelope;
pub mod error;
pub mod legacy;
pub mod recipients;
pub mod registry;
pub mod transport;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use dynamic::{DynamicMessage, FieldError, FieldKind, FieldValue, MessageSchema};
pub use envelope::{MessageBuffer, SendReceipt, UserMessage};
pub use error::{Error, Result};
pub use legacy::{BitBuffer, BitReader};
pub use recipients::{RecipientFilter, RecipientIndex, RecipientSet};
pub use registry::{DialogType, MessageRegistry};
pub use transport::{ChannelTransport, DeliveredMessage, MessageListener, Transport, ZenohTransport};

pub trait Builder {
    type Output;
    fn build(self) -> Result<Self::Output>;
}
