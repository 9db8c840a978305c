//! Selective re-encoding: derive a new, structurally valid container from
//! an existing one without decoding every field.
//!
//! Two operations are built on the buffered-packet primitives:
//!
//! - [`copy_stream`] - forward a subset of tracks and/or a clipped time
//!   window, packet by packet
//! - [`deidentify`] - rewrite record timestamps (relative shift or absolute
//!   relocation), zero the timezone bias, and drop the event-log track
//!
//! Both copy the header byte-for-byte and never touch the bytes of a
//! forwarded packet.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, Write};

use log::debug;

use crate::stream::{ByteReader, ByteWriter, FieldRead};

use super::grid::TrackSelector;
use super::{
    next_packet, packet_type, record_offset, Device, Header, RawPacket, Track, VitalError,
    MAX_SPAN_SECS,
};

/// Epoch of 2100-01-01 00:00:00 UTC, the default relocation target for
/// deidentified containers.
pub const DEID_DEFAULT_EPOCH: f64 = 4_102_444_800.0;

/// What [`copy_stream`] keeps.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// `None` forwards every track.
    pub selection: Option<Vec<TrackSelector>>,
    /// Clip records after `window_start + max_len` seconds.
    pub max_len: Option<f64>,
}

/// Outcome of a copy pass.
#[derive(Debug, Clone)]
pub struct CopySummary {
    pub packets_in: u64,
    pub packets_out: u64,
    /// First record timestamp, when a clip pre-pass ran.
    pub window_start: Option<f64>,
}

/// Copy a container, forwarding only matching tracks and in-window records.
///
/// Device packets are always forwarded: downstream readers need them no
/// matter which tracks survive. Track packets are forwarded when they match
/// the selection (or no selection is active); their ids form the active set
/// that record packets are tested against with a fixed-offset peek.
pub fn copy_stream<R: Read + Seek, W: Write>(
    reader: ByteReader<R>,
    writer: &mut ByteWriter<W>,
    options: &CopyOptions,
) -> Result<CopySummary, VitalError> {
    let mut reader = reader;
    let header = Header::read(&mut reader)?;

    // Clip requested: lightweight pre-pass for the window start, then
    // rewind for the real copy.
    let window = match options.max_len {
        Some(max_len) => {
            let (start, end) = scan_record_window(&mut reader)?;
            if end <= start {
                return Err(VitalError::NoData);
            }
            if end - start > MAX_SPAN_SECS {
                return Err(VitalError::SpanTooLong {
                    hours: (end - start) / 3600.0,
                });
            }
            reader = reader.rewind()?;
            reader.skip(header.byte_len())?;
            Some((start, start + max_len))
        }
        None => None,
    };

    header.write(writer)?;

    let mut devices: HashMap<u32, String> = HashMap::new();
    let mut active: HashSet<u16> = HashSet::new();
    let mut summary = CopySummary {
        packets_in: 0,
        packets_out: 0,
        window_start: window.map(|(start, _)| start),
    };

    while let Some(packet) = RawPacket::read_from(&mut reader)? {
        summary.packets_in += 1;
        match packet.tag {
            packet_type::DEVICE => {
                if let Ok(device) = Device::decode(&mut packet.view()) {
                    devices.insert(device.id, device.name);
                }
            }
            packet_type::TRACK => {
                if let Ok(track) = Track::decode(&mut packet.view()) {
                    let device_name = devices
                        .get(&track.device_id)
                        .map(String::as_str)
                        .unwrap_or("");
                    let keep = match &options.selection {
                        Some(selectors) => selectors
                            .iter()
                            .any(|sel| sel.matches(&track.name, device_name)),
                        None => true,
                    };
                    if !keep {
                        debug!("dropping track '{}'", track.name);
                        continue;
                    }
                    active.insert(track.id);
                } else if options.selection.is_some() {
                    // An undecodable definition cannot be matched; drop it
                    // rather than forward a track that can never be named.
                    continue;
                }
            }
            packet_type::RECORD => {
                let timestamp = packet.peek_f64(record_offset::TIMESTAMP);
                let track_id = packet.peek_u16(record_offset::TRACK_ID);
                if let (Some((_, window_end)), Some(ts)) = (window, timestamp) {
                    if ts > window_end {
                        continue;
                    }
                }
                if options.selection.is_some() {
                    match track_id {
                        Some(tid) if active.contains(&tid) => {}
                        _ => continue,
                    }
                }
            }
            _ => {}
        }
        packet.write_to(writer)?;
        summary.packets_out += 1;
    }

    Ok(summary)
}

/// How [`deidentify`] moves timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeidMode {
    /// `timestamp += seconds`; the timezone bias is left alone.
    Shift(f64),
    /// `timestamp = timestamp - stream_start + target_epoch`; the timezone
    /// bias is zeroed because absolute wall-clock context is identifying.
    Relocate { target_epoch: f64 },
}

/// Outcome of a deidentify pass.
#[derive(Debug, Clone)]
pub struct DeidSummary {
    /// Earliest nonzero record timestamp in the source.
    pub stream_start: Option<f64>,
    pub records_rewritten: u64,
    pub events_dropped: u64,
}

/// Rewrite record timestamps and strip identifying content.
///
/// Besides the timestamp move, records of the event-log track (the track
/// named `EVENT` on device id 0) are dropped wholesale; free-text event
/// annotations routinely carry names and case details.
pub fn deidentify<R: Read + Seek, W: Write>(
    reader: ByteReader<R>,
    writer: &mut ByteWriter<W>,
    mode: DeidMode,
) -> Result<DeidSummary, VitalError> {
    let mut reader = reader;
    let header = Header::read(&mut reader)?;

    // Pre-pass: stream start for relocation, event-track id for dropping.
    let mut event_track: Option<u16> = None;
    let mut stream_start = f64::MAX;
    while !reader.eof() {
        let Some((ptype, len)) = next_packet(&mut reader)? else {
            break;
        };
        let mut body = reader.packet(len);
        match ptype {
            packet_type::TRACK => {
                if let Ok(track) = Track::decode(&mut body) {
                    if track.device_id == 0 && track.name == "EVENT" {
                        event_track = Some(track.id);
                    }
                }
            }
            packet_type::RECORD => {
                let ts = body.fetch_u16().and_then(|_| body.fetch_f64());
                if let Ok(ts) = ts {
                    if ts != 0.0 && ts < stream_start {
                        stream_start = ts;
                    }
                }
            }
            _ => {}
        }
        if body.skip_rest().is_err() {
            break;
        }
    }

    let shift = match mode {
        DeidMode::Shift(seconds) => seconds,
        DeidMode::Relocate { target_epoch } => {
            if stream_start == f64::MAX {
                return Err(VitalError::NoData);
            }
            target_epoch - stream_start
        }
    };

    let mut reader = reader.rewind()?;
    reader.skip(header.byte_len())?;

    // Header goes out byte-for-byte, except the bias under relocation.
    let mut header_out = header.clone();
    if matches!(mode, DeidMode::Relocate { .. }) && header_out.ext.len() >= 2 {
        header_out.ext[0] = 0;
        header_out.ext[1] = 0;
    }
    header_out.write(writer)?;

    let mut summary = DeidSummary {
        stream_start: (stream_start != f64::MAX).then_some(stream_start),
        records_rewritten: 0,
        events_dropped: 0,
    };

    while let Some(packet) = RawPacket::read_from(&mut reader)? {
        if packet.tag == packet_type::RECORD {
            let track_id = packet.peek_u16(record_offset::TRACK_ID);
            if event_track.is_some() && track_id == event_track {
                summary.events_dropped += 1;
                continue;
            }
            let Some(timestamp) = packet.peek_f64(record_offset::TIMESTAMP) else {
                debug!("record too short to carry a timestamp; dropping");
                continue;
            };
            let Some(rewritten) = packet.with_f64_at(record_offset::TIMESTAMP, timestamp + shift)
            else {
                continue;
            };
            rewritten.write_to(writer)?;
            summary.records_rewritten += 1;
            continue;
        }
        packet.write_to(writer)?;
    }

    Ok(summary)
}

/// Minimal scan of record timestamps: the sizing pre-pass for a clip.
///
/// Only `{info_len, timestamp}` of record packets is decoded; zero
/// timestamps are ignored as sentinels.
fn scan_record_window<R: Read + Seek>(
    reader: &mut ByteReader<R>,
) -> Result<(f64, f64), VitalError> {
    let mut start = f64::MAX;
    let mut end = 0.0f64;
    while !reader.eof() {
        let Some((ptype, len)) = next_packet(reader)? else {
            break;
        };
        let mut body = reader.packet(len);
        if ptype == packet_type::RECORD {
            let ts = body.fetch_u16().and_then(|_| body.fetch_f64());
            if let Ok(ts) = ts {
                if ts != 0.0 {
                    start = start.min(ts);
                    end = end.max(ts);
                }
            }
        }
        if body.skip_rest().is_err() {
            break;
        }
    }
    Ok((start, end))
}
