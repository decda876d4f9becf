use chrono::{DateTime, Local, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;

/// A UTC instant as exchanged with the Sidechat backend.
///
/// The backend writes `datetime.now().isoformat()`, which carries no offset
/// (`2024-05-01T12:00:00.123456`). Those values are wall-clock time in the
/// local zone, the same zone [`Display`](fmt::Display) renders in. Offsets
/// are honoured when present, and serialisation always emits RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub DateTime<Utc>);

impl Timestamp {
    /// The earliest representable watermark; everything is newer than it.
    pub const EPOCH: Self = Self(DateTime::<Utc>::UNIX_EPOCH);

    /// Parses an RFC 3339 or naive ISO-8601 timestamp, reading naive values
    /// as local time.
    ///
    /// # Errors
    /// Returns the parse error when neither form matches.
    pub fn parse(value: &str) -> Result<Self, chrono::ParseError> {
        Self::parse_in(value, &Local)
    }

    /// Like [`parse`](Self::parse), reading naive values in `zone`.
    ///
    /// An ambiguous wall-clock time resolves to its earlier instant. A time
    /// skipped by a DST jump is shifted by the offset in force just after it.
    ///
    /// # Errors
    /// Returns the parse error when neither form matches.
    pub fn parse_in<Tz: TimeZone>(value: &str, zone: &Tz) -> Result<Self, chrono::ParseError> {
        match DateTime::parse_from_rfc3339(value) {
            Ok(parsed) => Ok(Self(parsed.with_timezone(&Utc))),
            Err(rfc_err) => NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Self(local_to_utc(&naive, zone)))
                .map_err(|_| rfc_err),
        }
    }

    /// Renders the instant as RFC 3339 with microsecond precision.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}

fn local_to_utc<Tz: TimeZone>(naive: &NaiveDateTime, zone: &Tz) -> DateTime<Utc> {
    match zone.from_local_datetime(naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        None => {
            let offset = zone.offset_from_utc_datetime(naive).fix();
            (*naive - offset).and_utc()
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(|err| de::Error::custom(format!("invalid timestamp {raw:?}: {err}")))
    }
}
