//! Message encodings.
//!
//! Messages are `prost` types that also derive `serde` traits, so either wire
//! encoding can be selected at runtime.

use bytes::Bytes;
use connectrpc_core::{Code, ConnectError};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// A message type usable with every [`Encoding`].
pub trait Message: prost::Message + Serialize + DeserializeOwned + Default + 'static {}

impl<T> Message for T where T: prost::Message + Serialize + DeserializeOwned + Default + 'static {}

/// Wire encoding for messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Proto,
    Json,
}

impl Encoding {
    /// The name used in content types, e.g. `application/connect+proto`.
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Proto => "proto",
            Encoding::Json => "json",
        }
    }

    pub fn encode<M: Message>(&self, message: &M) -> Result<Bytes, ConnectError> {
        match self {
            Encoding::Proto => Ok(message.encode_to_vec().into()),
            Encoding::Json => serde_json::to_vec(message)
                .map(Bytes::from)
                .map_err(|e| ConnectError::from_cause(Code::Internal, e)),
        }
    }

    /// Encode so that equal messages always produce equal bytes.
    ///
    /// JSON object keys are emitted in sorted order. Protobuf fields are
    /// written in tag order; map fields are only stable when generated as
    /// `BTreeMap`.
    pub fn encode_deterministic<M: Message>(&self, message: &M) -> Result<Bytes, ConnectError> {
        match self {
            Encoding::Proto => self.encode(message),
            Encoding::Json => serde_json::to_value(message)
                .and_then(|value| serde_json::to_vec(&value))
                .map(Bytes::from)
                .map_err(|e| ConnectError::from_cause(Code::Internal, e)),
        }
    }

    pub fn decode<M: Message>(&self, data: &[u8]) -> Result<M, ConnectError> {
        match self {
            Encoding::Proto => M::decode(data).map_err(|e| ConnectError::from_cause(Code::Unknown, e)),
            Encoding::Json => {
                serde_json::from_slice(data).map_err(|e| ConnectError::from_cause(Code::Unknown, e))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, PartialEq, ::prost::Message, Serialize, Deserialize)]
    pub(crate) struct Ping {
        #[prost(string, tag = "1")]
        pub text: String,
        #[prost(int32, tag = "2")]
        #[serde(default)]
        pub count: i32,
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::Proto.name(), "proto");
        assert_eq!(Encoding::Json.name(), "json");
        assert_eq!(Encoding::default(), Encoding::Proto);
    }

    #[test]
    fn test_json_encoding() {
        let ping = Ping { text: "hi".into(), count: 2 };
        let data = Encoding::Json.encode(&ping).unwrap();
        assert_eq!(&data[..], br#"{"text":"hi","count":2}"#);
        assert_eq!(Encoding::Json.decode::<Ping>(&data).unwrap(), ping);
    }

    #[test]
    fn test_json_deterministic_sorts_keys() {
        let ping = Ping { text: "hi".into(), count: 2 };
        let data = Encoding::Json.encode_deterministic(&ping).unwrap();
        assert_eq!(&data[..], br#"{"count":2,"text":"hi"}"#);
    }

    #[test]
    fn test_proto_encoding() {
        let ping = Ping { text: "hi".into(), count: 0 };
        let data = Encoding::Proto.encode(&ping).unwrap();
        assert_eq!(&data[..], &[0x0a, 0x02, b'h', b'i']);
        assert_eq!(Encoding::Proto.decode::<Ping>(&data).unwrap(), ping);
    }

    #[test]
    fn test_decode_failure_is_unknown() {
        let err = Encoding::Json.decode::<Ping>(b"{nope").unwrap_err();
        assert_eq!(err.code(), Code::Unknown);

        let err = Encoding::Proto.decode::<Ping>(&[0x0a, 0x09]).unwrap_err();
        assert_eq!(err.code(), Code::Unknown);
    }
}
