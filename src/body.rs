use bytes::Bytes;
use serde::Serialize;

use crate::{Result, WallarmError};

/// Payload of a single API call.
///
/// A request carries at most one of a JSON body, a raw body or a query
/// string.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum RequestBody {
    /// No body and no query.
    #[default]
    Empty,
    /// Pre-encoded query string, used as the URL query component.
    ///
    /// The string must already be percent-encoded: space, `"`, `#`, `<` and
    /// `>` are still escaped when the URL is built, so only fully encoded
    /// queries go out verbatim.
    Query(String),
    /// Pre-serialized bytes sent unmodified.
    Raw(Vec<u8>),
    /// JSON document, encoded once with the caller's field order.
    Json(Bytes),
}

impl RequestBody {
    /// Serializes `value` into a JSON body.
    ///
    /// Field names and omitted fields follow the value's serde attributes.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(|encoded| Self::Json(Bytes::from(encoded)))
            .map_err(WallarmError::Serialization)
    }

    /// Builds a query-string payload.
    pub fn query(query: impl Into<String>) -> Self {
        Self::Query(query.into())
    }

    /// Builds a raw byte payload.
    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Raw(bytes.into())
    }

    /// Bytes to send as the request body, if any.
    pub(crate) fn encode(&self) -> Option<Bytes> {
        match self {
            Self::Empty | Self::Query(_) => None,
            Self::Raw(bytes) => Some(Bytes::copy_from_slice(bytes)),
            Self::Json(encoded) => Some(encoded.clone()),
        }
    }

    pub(crate) fn query_string(&self) -> Option<&str> {
        match self {
            Self::Query(query) => Some(query.as_str()),
            _ => None,
        }
    }
}

impl From<()> for RequestBody {
    fn from(_: ()) -> Self {
        Self::Empty
    }
}

impl From<String> for RequestBody {
    fn from(query: String) -> Self {
        Self::Query(query)
    }
}

impl From<&str> for RequestBody {
    fn from(query: &str) -> Self {
        Self::Query(query.to_owned())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Raw(bytes)
    }
}

impl From<&[u8]> for RequestBody {
    fn from(bytes: &[u8]) -> Self {
        Self::Raw(bytes.to_vec())
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(Bytes::from(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde::Serialize;
    use serde_json::json;

    use crate::RequestBody;

    #[derive(Serialize)]
    struct UserCreate {
        email: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
        #[serde(rename = "clientid", skip_serializing_if = "is_zero")]
        client_id: u64,
    }

    fn is_zero(value: &u64) -> bool {
        *value == 0
    }

    #[test]
    fn json_follows_serde_attributes() {
        let body = RequestBody::json(&UserCreate {
            email: "kit@example.com".to_owned(),
            phone: None,
            client_id: 0,
        })
        .expect("serializable");

        let encoded = body.encode().expect("has body");
        assert_eq!(&encoded[..], br#"{"email":"kit@example.com"}"#);
    }

    #[test]
    fn json_keeps_declaration_order() {
        #[derive(Serialize)]
        struct Hint {
            #[serde(rename = "type")]
            kind: &'static str,
            action: u32,
            clientid: u64,
        }

        let body = RequestBody::json(&Hint {
            kind: "wallarm_mode",
            action: 1,
            clientid: 7,
        })
        .expect("serializable");

        let encoded = body.encode().expect("has body");
        assert_eq!(
            &encoded[..],
            br#"{"type":"wallarm_mode","action":1,"clientid":7}"#
        );
    }

    #[test]
    fn json_value_is_encoded_as_is() {
        let body: RequestBody = json!({"mode": "block"}).into();
        assert_eq!(&body.encode().expect("has body")[..], br#"{"mode":"block"}"#);
    }

    #[test]
    fn query_is_never_sent_as_body() {
        let body: RequestBody = "filter[clientid]=1&limit=50".into();
        assert_eq!(body.query_string(), Some("filter[clientid]=1&limit=50"));
        assert_eq!(body.encode(), None);
    }

    #[test]
    fn raw_bytes_pass_through() {
        let body = RequestBody::raw(b"\x00not json".to_vec());
        assert_eq!(body.query_string(), None);
        assert_eq!(&body.encode().expect("raw")[..], b"\x00not json");
    }

    #[test]
    fn unit_is_empty() {
        let body: RequestBody = ().into();
        assert_eq!(body, RequestBody::Empty);
        assert_eq!(body.encode(), None);
    }

    #[test]
    fn unserializable_value_fails() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not valid JSON object keys");
        assert!(matches!(
            RequestBody::json(&map),
            Err(crate::WallarmError::Serialization(_))
        ));
    }
}
