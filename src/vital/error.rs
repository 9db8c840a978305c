//! Error taxonomy for container parsing and resampling.
//!
//! Failures fall into three tiers with different blast radii:
//!
//! - structural ([`BadMagic`](VitalError::BadMagic),
//!   [`TruncatedHeader`](VitalError::TruncatedHeader)) - nothing before the
//!   first packet could be trusted; abort the whole parse
//! - per-packet (carried as [`StreamError`]) - recoverable by skipping the
//!   rest of the offending packet
//! - validation ([`NoData`](VitalError::NoData),
//!   [`SpanTooLong`](VitalError::SpanTooLong),
//!   [`EmptyColumn`](VitalError::EmptyColumn)) - the container parsed but
//!   its contents fail a sanity bound; no partial output is emitted

use thiserror::Error;

use crate::stream::StreamError;

#[derive(Debug, Error)]
pub enum VitalError {
    #[error("not a vital container (bad magic)")]
    BadMagic,

    #[error("container header is truncated")]
    TruncatedHeader,

    /// A record referenced a track id with no prior definition packet.
    /// Only surfaced under strict mode; the default is to drop the record.
    #[error("record references unknown track id {0}")]
    UnknownTrack(u16),

    #[error("container holds no timed records")]
    NoData,

    #[error("data span of {hours:.1} h exceeds the 48 h limit")]
    SpanTooLong { hours: f64 },

    /// A required column received no samples across the whole grid.
    #[error("required column '{0}' received no samples")]
    EmptyColumn(String),

    #[error("interval must be > 0 (got {0})")]
    BadInterval(f64),

    #[error(transparent)]
    Stream(#[from] StreamError),
}
