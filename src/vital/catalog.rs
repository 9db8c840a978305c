//! Pass 1: build the device/track registry and discover the time span.
//!
//! The catalog pass streams every packet once, decoding only metadata and
//! record prefixes. No sample data is materialized; wave payloads are
//! skipped by their declared length. The result is an immutable [`Catalog`]
//! that the data pass and the re-encoder consume.
//!
//! # Error Handling
//!
//! A field that fails to decode abandons the rest of its packet (the
//! declared length is skipped) and the pass continues. A truncated packet
//! preamble or an oversized declared length ends the pass; whatever was
//! registered up to that point is kept. Only header-level failures and
//! post-pass validation reject the container outright.

use std::collections::BTreeMap;
use std::io::{Read, Seek};

use log::{debug, warn};

use crate::stream::{ByteReader, FieldRead};

use super::{
    next_packet, packet_type, Device, Header, RecordKind, Track, VitalError, MAX_SPAN_SECS,
};

/// Immutable result of the catalog pass.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub header: Header,
    pub devices: BTreeMap<u32, Device>,
    pub tracks: BTreeMap<u16, Track>,
    /// Track ids in definition order.
    pub track_order: Vec<u16>,
    /// Track ids in order of their first observed record; the column order
    /// for all-tracks exports.
    pub record_order: Vec<u16>,
    /// Earliest record timestamp across all tracks.
    pub time_start: f64,
    /// Latest record end-time across all tracks.
    pub time_end: f64,
}

impl Catalog {
    pub fn duration(&self) -> f64 {
        self.time_end - self.time_start
    }

    pub fn tz_bias_min(&self) -> Option<i16> {
        self.header.tz_bias_min()
    }

    /// Rewind the stream and skip the header, leaving it at the first
    /// packet preamble for a second pass. The header length recorded at
    /// parse time is authoritative; resuming anywhere else silently
    /// corrupts packet boundaries.
    pub fn reposition<R: Read + Seek>(
        &self,
        reader: ByteReader<R>,
    ) -> Result<ByteReader<R>, VitalError> {
        let mut reader = reader.rewind()?;
        reader.skip(self.header.byte_len())?;
        Ok(reader)
    }
}

/// Streaming builder for [`Catalog`].
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    strict: bool,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail on records that reference an unregistered track instead of
    /// silently dropping them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Run the catalog pass from the start of the stream.
    pub fn build<R: Read + Seek>(
        &self,
        reader: &mut ByteReader<R>,
    ) -> Result<Catalog, VitalError> {
        let header = Header::read(reader)?;
        let mut catalog = Catalog {
            header,
            devices: BTreeMap::new(),
            tracks: BTreeMap::new(),
            track_order: Vec::new(),
            record_order: Vec::new(),
            time_start: f64::MAX,
            time_end: 0.0,
        };

        while !reader.eof() {
            let Some((ptype, len)) = next_packet(reader)? else {
                break;
            };
            let mut body = reader.packet(len);

            let decoded = match ptype {
                packet_type::DEVICE => Self::on_device(&mut catalog, &mut body),
                packet_type::TRACK => Self::on_track(&mut catalog, &mut body),
                packet_type::RECORD => self.on_record(&mut catalog, &mut body)?,
                other => {
                    debug!("skipping unknown packet type {}", other);
                    Ok(())
                }
            };
            if let Err(e) = decoded {
                debug!("abandoning {} byte packet: {}", len, e);
            }

            if body.skip_rest().is_err() {
                break;
            }
        }

        validate(&catalog)?;
        Ok(catalog)
    }

    fn on_device<F: FieldRead>(
        catalog: &mut Catalog,
        body: &mut F,
    ) -> Result<(), crate::stream::StreamError> {
        let device = Device::decode(body)?;
        catalog.devices.insert(device.id, device);
        Ok(())
    }

    fn on_track<F: FieldRead>(
        catalog: &mut Catalog,
        body: &mut F,
    ) -> Result<(), crate::stream::StreamError> {
        let mut track = Track::decode(body)?;
        // Resolve against the devices known *now*; later device packets do
        // not rename tracks already on the books.
        if let Some(dev) = catalog.devices.get(&track.device_id) {
            track.device_name = dev.name.clone();
        }
        if !catalog.tracks.contains_key(&track.id) {
            catalog.track_order.push(track.id);
        }
        catalog.tracks.insert(track.id, track);
        Ok(())
    }

    /// Record packets update time bounds and listing statistics. The outer
    /// `Result` carries strict-mode unknown-track failures; the inner one
    /// is the usual per-packet decode outcome.
    fn on_record<R: Read + Seek>(
        &self,
        catalog: &mut Catalog,
        body: &mut crate::stream::PacketBody<'_, R>,
    ) -> Result<Result<(), crate::stream::StreamError>, VitalError> {
        let _info_len = match body.fetch_u16() {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };
        let timestamp = match body.fetch_f64() {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };
        if timestamp == 0.0 {
            // Zero is a recorder sentinel, not a real time.
            return Ok(Ok(()));
        }
        let track_id = match body.fetch_u16() {
            Ok(v) => v,
            Err(e) => return Ok(Err(e)),
        };

        let Some(track) = catalog.tracks.get_mut(&track_id) else {
            if self.strict {
                return Err(VitalError::UnknownTrack(track_id));
            }
            debug!("dropping record for unknown track {}", track_id);
            return Ok(Ok(()));
        };

        let mut end = timestamp;
        match track.kind {
            RecordKind::Wave => {
                let sample_count = match body.fetch_u32() {
                    Ok(v) => v,
                    Err(e) => return Ok(Err(e)),
                };
                if track.rate_hz > 0.0 {
                    end += sample_count as f64 / track.rate_hz;
                }
            }
            RecordKind::Numeric => {
                if let Ok(v) = body.fetch_f32() {
                    track.stats.push_numeric(v);
                }
            }
            RecordKind::Text => {
                if track.stats.first.is_none() {
                    let text = body
                        .skip(4)
                        .and_then(|_| body.fetch_str())
                        .map(|s| strip_unprintable(&s));
                    if let Ok(text) = text {
                        track.stats.first = Some(text);
                    }
                }
            }
        }

        track.time_start = track.time_start.min(timestamp);
        track.time_end = track.time_end.max(end);
        catalog.time_start = catalog.time_start.min(timestamp);
        catalog.time_end = catalog.time_end.max(end);

        if !catalog.record_order.contains(&track_id) {
            catalog.record_order.push(track_id);
        }
        Ok(Ok(()))
    }
}

fn validate(catalog: &Catalog) -> Result<(), VitalError> {
    if catalog.time_end <= catalog.time_start {
        return Err(VitalError::NoData);
    }
    let span = catalog.duration();
    if span > MAX_SPAN_SECS {
        warn!("rejecting container spanning {:.1} h", span / 3600.0);
        return Err(VitalError::SpanTooLong {
            hours: span / 3600.0,
        });
    }
    Ok(())
}

/// Drop characters outside printable ASCII, keeping tab/CR/LF.
pub fn strip_unprintable(s: &str) -> String {
    s.chars()
        .filter(|&c| (' '..='~').contains(&c) || c == '\t' || c == '\n' || c == '\r')
        .collect()
}
