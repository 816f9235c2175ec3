use crate::error::{Error, Result};

use std::fmt::{Display, Formatter, Result as FmtResult, Write};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// How datetimes are written to and read from text.
///
/// Shared by appenders (parsing incoming strings and integers), encoders
/// (formatting) and decoders (parsing), so that format counterparts agree.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum TimeFormat {
    /// Integer nanoseconds since the Unix epoch.
    #[default]
    Nanos,
    /// Integer microseconds since the Unix epoch.
    Micros,
    /// Integer milliseconds since the Unix epoch.
    Millis,
    /// Integer seconds since the Unix epoch.
    Seconds,
    /// RFC 3339 in the supplied time zone.
    Rfc3339,
    /// A `strftime` pattern interpreted in the supplied time zone.
    Pattern(String),
}

impl TimeFormat {
    /// True for the integer epoch formats.
    #[must_use]
    pub const fn is_epoch(&self) -> bool {
        matches!(self, Self::Nanos | Self::Micros | Self::Millis | Self::Seconds)
    }

    /// Interprets an integer as an epoch offset in this unit.
    ///
    /// Textual formats read integers as nanoseconds.
    #[must_use]
    pub fn from_epoch(&self, value: i64) -> Option<DateTime<Utc>> {
        match self {
            Self::Micros => DateTime::from_timestamp_micros(value),
            Self::Millis => DateTime::from_timestamp_millis(value),
            Self::Seconds => DateTime::from_timestamp(value, 0),
            Self::Nanos | Self::Rfc3339 | Self::Pattern(_) => {
                Some(DateTime::from_timestamp_nanos(value))
            }
        }
    }

    /// Epoch offset of `ts` in this unit, or `None` for textual formats or overflow.
    #[must_use]
    pub fn to_epoch(&self, ts: &DateTime<Utc>) -> Option<i64> {
        match self {
            Self::Nanos => ts.timestamp_nanos_opt(),
            Self::Micros => Some(ts.timestamp_micros()),
            Self::Millis => Some(ts.timestamp_millis()),
            Self::Seconds => Some(ts.timestamp()),
            Self::Rfc3339 | Self::Pattern(_) => None,
        }
    }

    /// Formats `ts` in `tz`.
    #[must_use]
    pub fn format(&self, ts: &DateTime<Utc>, tz: &Tz) -> String {
        match self {
            Self::Rfc3339 => ts.with_timezone(tz).to_rfc3339(),
            Self::Pattern(pattern) => {
                let mut out = String::new();
                match write!(out, "{}", ts.with_timezone(tz).format(pattern)) {
                    Ok(()) => out,
                    Err(_) => ts.with_timezone(tz).to_rfc3339(),
                }
            }
            epoch => epoch
                .to_epoch(ts)
                .map_or_else(|| ts.to_rfc3339(), |value| value.to_string()),
        }
    }

    /// Parses text produced by [`TimeFormat::format`] with the same zone.
    pub fn parse(&self, text: &str, tz: &Tz) -> Result<DateTime<Utc>> {
        let text = text.trim();
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| Error::Malformed(format!("datetime `{text}`: {e}"))),
            Self::Pattern(pattern) => {
                let naive = NaiveDateTime::parse_from_str(text, pattern)
                    .map_err(|e| Error::Malformed(format!("datetime `{text}`: {e}")))?;
                tz.from_local_datetime(&naive)
                    .earliest()
                    .map(|ts| ts.with_timezone(&Utc))
                    .ok_or_else(|| {
                        Error::Malformed(format!("datetime `{text}` does not exist in {tz}"))
                    })
            }
            epoch => {
                let value = text
                    .parse::<i64>()
                    .map_err(|e| Error::Malformed(format!("epoch `{text}`: {e}")))?;
                epoch
                    .from_epoch(value)
                    .ok_or_else(|| Error::Malformed(format!("epoch `{text}` out of range")))
            }
        }
    }
}

impl Display for TimeFormat {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Nanos => write!(f, "ns"),
            Self::Micros => write!(f, "us"),
            Self::Millis => write!(f, "ms"),
            Self::Seconds => write!(f, "s"),
            Self::Rfc3339 => write!(f, "rfc3339"),
            Self::Pattern(pattern) => write!(f, "{pattern}"),
        }
    }
}

impl FromStr for TimeFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "" | "ns" | "nano" => Self::Nanos,
            "us" | "micro" => Self::Micros,
            "ms" | "milli" => Self::Millis,
            "s" | "sec" => Self::Seconds,
            "rfc3339" => Self::Rfc3339,
            _ => Self::Pattern(s.to_string()),
        })
    }
}
