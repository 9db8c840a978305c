//! `vft tracks` - list the tracks of a container.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use vft::export::csv;
use vft::stream::ByteReader;
use vft::vital::{Catalog, CatalogBuilder};

#[derive(Serialize)]
struct TrackRow<'a> {
    name: &'a str,
    id: u16,
    device: &'a str,
    device_id: u32,
    kind: &'a str,
    rate_hz: f64,
    unit: &'a str,
    time_start: f64,
    time_end: f64,
    count: u64,
    min: Option<f64>,
    max: Option<f64>,
    mean: Option<f64>,
    first: Option<&'a str>,
}

#[derive(Serialize)]
struct Report<'a> {
    tz_bias_min: i16,
    time_start: f64,
    time_end: f64,
    tracks: Vec<TrackRow<'a>>,
}

pub fn run(file: &Path, json: bool, strict: bool) -> Result<()> {
    let mut reader = ByteReader::open(file)
        .with_context(|| format!("failed to open container: {}", file.display()))?;
    let catalog = CatalogBuilder::new()
        .strict(strict)
        .build(&mut reader)
        .with_context(|| format!("failed to parse container: {}", file.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let report = build_report(&catalog);
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        csv::write_tracks(&mut out, &catalog)?;
    }
    Ok(())
}

fn build_report(catalog: &Catalog) -> Report<'_> {
    let tracks = catalog
        .tracks
        .values()
        .map(|track| TrackRow {
            name: &track.name,
            id: track.id,
            device: &track.device_name,
            device_id: track.device_id,
            kind: track.kind.label(),
            rate_hz: track.rate_hz,
            unit: &track.unit,
            time_start: if track.has_data() { track.time_start } else { 0.0 },
            time_end: track.time_end,
            count: track.stats.count,
            min: (track.stats.count > 0).then_some(track.stats.min),
            max: (track.stats.count > 0).then_some(track.stats.max),
            mean: track.stats.mean(),
            first: track.stats.first.as_deref(),
        })
        .collect();

    Report {
        tz_bias_min: catalog.tz_bias_min().unwrap_or(0),
        time_start: catalog.time_start,
        time_end: catalog.time_end,
        tracks,
    }
}
