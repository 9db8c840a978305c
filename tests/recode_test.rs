//! Integration tests for the selective re-encoder.

mod helpers;

use std::io::Cursor;

use helpers::{reader, ContainerBuilder, TrackDef};
use vft::stream::ByteWriter;
use vft::vital::recode::{copy_stream, deidentify, CopyOptions, DeidMode};
use vft::vital::{CatalogBuilder, RawPacket, TrackSelector, VitalError};

/// Collect every packet of a container along with its parsed header.
fn packets_of(bytes: Vec<u8>) -> (vft::vital::Header, Vec<RawPacket>) {
    let mut r = reader(bytes);
    let header = vft::vital::Header::read(&mut r).unwrap();
    let mut packets = Vec::new();
    while let Some(p) = RawPacket::read_from(&mut r).unwrap() {
        packets.push(p);
    }
    (header, packets)
}

fn recode_output<F>(bytes: Vec<u8>, f: F) -> Vec<u8>
where
    F: FnOnce(vft::stream::ByteReader<Cursor<Vec<u8>>>, &mut ByteWriter<Vec<u8>>),
{
    let r = reader(bytes);
    let mut w = ByteWriter::new(Vec::new());
    f(r, &mut w);
    w.finish().unwrap()
}

fn two_track_container() -> Vec<u8> {
    let mut c = ContainerBuilder::with_tz_bias(540);
    c.device(1, "", "BIS")
        .track(&TrackDef::numeric(1, "BIS").on_device(1))
        .track(&TrackDef::numeric(2, "SQI").on_device(1))
        .numeric_record(1, 100.0, 40.0)
        .numeric_record(2, 100.0, 95.0)
        .numeric_record(1, 101.0, 42.0)
        .numeric_record(2, 101.0, 96.0);
    c.finish()
}

// ============================================================================
// copy_stream
// ============================================================================

#[test]
fn copy_without_filter_preserves_every_packet() {
    let bytes = two_track_container();
    let (header_in, packets_in) = packets_of(bytes.clone());

    let out = recode_output(bytes, |r, w| {
        copy_stream(r, w, &CopyOptions::default()).unwrap();
    });
    let (header_out, packets_out) = packets_of(out);

    assert_eq!(header_in.to_bytes(), header_out.to_bytes());
    assert_eq!(packets_in, packets_out);
}

#[test]
fn copy_with_selection_drops_other_tracks_and_their_records() {
    let out = recode_output(two_track_container(), |r, w| {
        let options = CopyOptions {
            selection: Some(TrackSelector::parse_list("BIS/BIS")),
            max_len: None,
        };
        copy_stream(r, w, &options).unwrap();
    });

    // The derived container must parse and hold only the BIS track.
    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    assert_eq!(catalog.tracks.len(), 1);
    assert_eq!(catalog.tracks[&1].name, "BIS");
    assert_eq!(catalog.tracks[&1].stats.count, 2);
    // Device packets are always forwarded.
    assert_eq!(catalog.devices.len(), 1);
}

#[test]
fn copy_selection_supports_wildcards() {
    let out = recode_output(two_track_container(), |r, w| {
        let options = CopyOptions {
            selection: Some(TrackSelector::parse_list("BIS/*")),
            max_len: None,
        };
        copy_stream(r, w, &options).unwrap();
    });

    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    assert_eq!(catalog.tracks.len(), 2);
}

#[test]
fn copy_with_max_length_clips_late_records() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::numeric(1, "HR"))
        .numeric_record(1, 100.0, 1.0)
        .numeric_record(1, 130.0, 2.0)
        .numeric_record(1, 161.0, 3.0);
    let out = recode_output(c.finish(), |r, w| {
        let options = CopyOptions {
            selection: None,
            max_len: Some(60.0),
        };
        let summary = copy_stream(r, w, &options).unwrap();
        assert_eq!(summary.window_start, Some(100.0));
    });

    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    // The record at t=161 falls outside [100, 160] and is gone.
    assert_eq!(catalog.tracks[&1].stats.count, 2);
    assert_eq!(catalog.time_end, 130.0);
}

#[test]
fn copy_clip_of_empty_container_reports_no_data() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::numeric(1, "HR"));
    let r = reader(c.finish());
    let mut w = ByteWriter::new(Vec::new());
    let options = CopyOptions {
        selection: None,
        max_len: Some(60.0),
    };

    assert!(matches!(
        copy_stream(r, &mut w, &options),
        Err(VitalError::NoData)
    ));
}

// ============================================================================
// deidentify
// ============================================================================

#[test]
fn relocation_moves_timestamps_to_the_target_epoch() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::numeric(1, "HR"))
        .numeric_record(1, 100.0, 60.0)
        .numeric_record(1, 150.0, 61.0);
    let out = recode_output(c.finish(), |r, w| {
        let summary = deidentify(
            r,
            w,
            DeidMode::Relocate {
                target_epoch: 5000.0,
            },
        )
        .unwrap();
        assert_eq!(summary.stream_start, Some(100.0));
        assert_eq!(summary.records_rewritten, 2);
    });

    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    assert_eq!(catalog.time_start, 5000.0);
    assert_eq!(catalog.time_end, 5050.0);
}

#[test]
fn relocation_rewrites_only_the_timestamp_bytes() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::numeric(1, "HR"))
        .numeric_record(1, 100.0, 60.0)
        .numeric_record(1, 150.0, 61.0);
    let bytes = c.finish();
    let (_, packets_in) = packets_of(bytes.clone());

    let out = recode_output(bytes, |r, w| {
        deidentify(
            r,
            w,
            DeidMode::Relocate {
                target_epoch: 5000.0,
            },
        )
        .unwrap();
    });
    let (_, packets_out) = packets_of(out);

    assert_eq!(packets_in.len(), packets_out.len());
    // The record at t=150 relocates to 5050; every other byte of the
    // packet is bit-identical to the input.
    let before = &packets_in[2];
    let after = &packets_out[2];
    assert_eq!(before.tag, after.tag);
    assert_eq!(before.body.len(), after.body.len());
    assert_eq!(&before.body[..2], &after.body[..2]);
    assert_eq!(after.peek_f64(2), Some(5050.0));
    assert_eq!(&before.body[10..], &after.body[10..]);
}

#[test]
fn relocation_zeroes_the_timezone_bias() {
    let mut c = ContainerBuilder::with_tz_bias(540);
    c.track(&TrackDef::numeric(1, "HR"))
        .numeric_record(1, 100.0, 60.0)
        .numeric_record(1, 110.0, 61.0);
    let out = recode_output(c.finish(), |r, w| {
        deidentify(r, w, DeidMode::Relocate { target_epoch: 5000.0 }).unwrap();
    });

    let (header, _) = packets_of(out);
    assert_eq!(header.tz_bias_min(), Some(0));
}

#[test]
fn shift_keeps_the_timezone_bias() {
    let mut c = ContainerBuilder::with_tz_bias(540);
    c.track(&TrackDef::numeric(1, "HR"))
        .numeric_record(1, 100.0, 60.0)
        .numeric_record(1, 110.0, 61.0);
    let out = recode_output(c.finish(), |r, w| {
        deidentify(r, w, DeidMode::Shift(-50.0)).unwrap();
    });

    let (header, _) = packets_of(out.clone());
    assert_eq!(header.tz_bias_min(), Some(540));

    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    assert_eq!(catalog.time_start, 50.0);
    assert_eq!(catalog.time_end, 60.0);
}

#[test]
fn event_track_records_are_dropped() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::text(9, "EVENT"))
        .track(&TrackDef::numeric(1, "HR"))
        .text_record(9, 100.0, "patient name mentioned")
        .numeric_record(1, 100.0, 60.0)
        .numeric_record(1, 110.0, 61.0);
    let out = recode_output(c.finish(), |r, w| {
        let summary = deidentify(r, w, DeidMode::Shift(10.0)).unwrap();
        assert_eq!(summary.events_dropped, 1);
    });

    let mut r = reader(out);
    let catalog = CatalogBuilder::new().build(&mut r).unwrap();
    // The EVENT track definition survives but none of its records do.
    assert!(catalog.tracks.contains_key(&9));
    assert!(!catalog.tracks[&9].has_data());
}

#[test]
fn relocation_of_empty_container_reports_no_data() {
    let mut c = ContainerBuilder::new();
    c.track(&TrackDef::numeric(1, "HR"));
    let r = reader(c.finish());
    let mut w = ByteWriter::new(Vec::new());

    assert!(matches!(
        deidentify(r, &mut w, DeidMode::Relocate { target_epoch: 5000.0 }),
        Err(VitalError::NoData)
    ));
}
