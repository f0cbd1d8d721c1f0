//! # Timestamps
//!
//! The Forward protocol's two timestamp encodings: a plain `uint32`
//! seconds-since-epoch, and Fluentd's `EventTime` extension type (ext
//! type 0, an 8-byte big-endian seconds+nanoseconds payload).

use byteorder::{BigEndian, WriteBytesExt};
use rmpv::Value;

/// The MessagePack extension type id Fluentd assigns to `EventTime`.
pub const EVENT_TIME_EXT_TYPE: i8 = 0;

/// A Forward protocol timestamp: either whole seconds or a full
/// second+nanosecond `EventTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Plain `uint32` seconds since the epoch.
    Seconds(u32),
    /// Fluentd `EventTime`: seconds and nanoseconds since the epoch.
    EventTime {
        /// Seconds since the epoch.
        seconds: u32,
        /// Nanoseconds within the second.
        nanos: u32,
    },
}

impl Timestamp {
    /// The current wall-clock time as a plain seconds timestamp.
    pub fn now_seconds() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Timestamp::Seconds(secs as u32)
    }

    /// The current wall-clock time as a full `EventTime`.
    pub fn now_event_time() -> Self {
        let dur = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::EventTime {
            seconds: dur.as_secs() as u32,
            nanos: dur.subsec_nanos(),
        }
    }

    /// Convert this timestamp into the `rmpv::Value` the Forward
    /// protocol expects: a `uint32` for `Seconds`, or a fixext-8
    /// (type 0) for `EventTime`.
    pub fn to_value(self) -> Value {
        match self {
            Timestamp::Seconds(secs) => Value::from(secs),
            Timestamp::EventTime { seconds, nanos } => {
                let mut payload = Vec::with_capacity(8);
                payload
                    .write_u32::<BigEndian>(seconds)
                    .expect("write to Vec never fails");
                payload
                    .write_u32::<BigEndian>(nanos)
                    .expect("write to Vec never fails");
                Value::Ext(EVENT_TIME_EXT_TYPE, payload)
            }
        }
    }
}
