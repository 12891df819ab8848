use sha2::Digest;
use zenoh::bytes::ZBytes;
use zenoh_ext::{ZDeserializer, ZSerializer};

const GID_STORAGE_SIZE: usize = 16;

pub type GidArray = [u8; GID_STORAGE_SIZE];

/// Metadata carried next to every user message payload put on zenoh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub sequence_number: i64,
    pub message_index: i32,
    pub is_protobuf: bool,
    pub reliable: bool,
    /// Part of the connection-time init sequence
    pub init_message: bool,
    pub source_gid: GidArray,
}

/// Derive a stable sender id from any printable identity (e.g. a zenoh id).
pub fn gid_from(identity: &str) -> GidArray {
    let mut gid = GidArray::default();
    let hash = sha2::Sha256::digest(identity.as_bytes());
    let len = gid.len();
    gid.copy_from_slice(&hash[..len]);
    gid
}

impl TryFrom<&ZBytes> for Attachment {
    type Error = zenoh::Error;
    fn try_from(value: &ZBytes) -> Result<Self, Self::Error> {
        let mut des = ZDeserializer::new(value);
        let sequence_number = des.deserialize::<i64>()?;
        let message_index = des.deserialize::<i32>()?;
        let is_protobuf = des.deserialize::<bool>()?;
        let reliable = des.deserialize::<bool>()?;
        let init_message = des.deserialize::<bool>()?;
        let source_gid = des.deserialize::<GidArray>()?;
        Ok(Attachment {
            sequence_number,
            message_index,
            is_protobuf,
            reliable,
            init_message,
            source_gid,
        })
    }
}

impl From<Attachment> for ZBytes {
    fn from(value: Attachment) -> Self {
        let mut ser = ZSerializer::new();
        ser.serialize(value.sequence_number);
        ser.serialize(value.message_index);
        ser.serialize(value.is_protobuf);
        ser.serialize(value.reliable);
        ser.serialize(value.init_message);
        ser.serialize(&value.source_gid);
        ser.finish()
    }
}
