//! # Records
//!
//! The payload half of an event: either a structured map encoded with
//! the default (or an injected) MessagePack serializer, or a caller
//! pre-encoded byte slice passed straight through.

use std::sync::Arc;

use rmpv::Value;

use crate::error::{Error, Result};

/// An ordered MessagePack map. `rmpv::Value::Map` itself stores
/// `Vec<(Value, Value)>`; this alias pins the key side to `String`,
/// which is the only key type the Forward protocol's record maps use.
pub type MsgpackMap = Vec<(String, Value)>;

/// A pluggable `record -> bytes` encoder, the "injected serializer"
/// seam: callers may swap in their own MessagePack writer (a
/// schema-aware one, say) without touching the buffering or sending
/// layers.
pub type Serializer = Arc<dyn Fn(&MsgpackMap) -> Result<Vec<u8>> + Send + Sync>;

/// The default serializer: builds an `rmpv::Value::Map` from the
/// ordered pairs and writes it with `rmpv::encode::write_value`.
pub fn default_serializer() -> Serializer {
    Arc::new(|map: &MsgpackMap| -> Result<Vec<u8>> {
        let value = Value::Map(
            map.iter()
                .map(|(k, v)| (Value::String(k.clone().into()), v.clone()))
                .collect(),
        );
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &value).map_err(|e| Error::Encode(e.to_string()))?;
        Ok(buf)
    })
}
