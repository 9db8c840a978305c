//! CSV rendering for grids and track listings.
//!
//! One grid row becomes one CSV line: a time column followed by one column
//! per selected track, blank where the cell holds no value. String cells
//! are escaped by doubling embedded quotes and quoting any field that
//! contains a comma, quote, or newline.

use std::borrow::Cow;
use std::io::Write;

use chrono::DateTime;

use crate::vital::grid::Grid;
use crate::vital::Catalog;

/// How the leading time column is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// Seconds since the start of the grid.
    #[default]
    Relative,
    /// Raw epoch seconds.
    Unix,
    /// Local wall-clock time via the container's timezone bias.
    Absolute,
}

/// Rendering options for [`write_grid`].
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    pub time_format: TimeFormat,
    /// Emit a `Time,COL,...` header line first.
    pub header: bool,
    /// Prefix every row (and the header) with this file name.
    pub filename: Option<String>,
    /// Prefix column names with their device name (`DEV/TRK`).
    pub device_names: bool,
}

/// Escape one CSV field: embedded quotes are doubled, and the field is
/// wrapped in quotes when it contains a comma, quote, or line break.
pub fn escape_csv(field: &str) -> Cow<'_, str> {
    if !field.contains(['"', ',', '\n', '\r']) {
        return Cow::Borrowed(field);
    }
    let mut escaped = String::with_capacity(field.len() + 2);
    escaped.push('"');
    for c in field.chars() {
        if c == '"' {
            escaped.push('"');
        }
        escaped.push(c);
    }
    escaped.push('"');
    Cow::Owned(escaped)
}

/// Render a finished grid as CSV.
pub fn write_grid<W: Write>(
    out: &mut W,
    grid: &Grid,
    catalog: &Catalog,
    options: &CsvOptions,
) -> std::io::Result<()> {
    let tz_bias = catalog.tz_bias_min().unwrap_or(0);

    if options.header {
        if options.filename.is_some() {
            write!(out, "Filename,")?;
        }
        write!(out, "Time")?;
        for column in grid.columns() {
            let name = if options.device_names && !column.device.is_empty() {
                format!("{}/{}", column.device, column.name)
            } else {
                column.name.clone()
            };
            write!(out, ",{}", escape_csv(&name))?;
        }
        writeln!(out)?;
    }

    for row in grid.render() {
        if let Some(filename) = &options.filename {
            write!(out, "{},", escape_csv(filename))?;
        }
        match options.time_format {
            TimeFormat::Relative => write!(out, "{:.6}", row.time - grid.origin())?,
            TimeFormat::Unix => write!(out, "{:.6}", row.time)?,
            TimeFormat::Absolute => write!(out, "{}", format_absolute(row.time, tz_bias))?,
        }
        for cell in &row.cells {
            match cell {
                Some(value) => write!(out, ",{}", escape_csv(value))?,
                None => write!(out, ",")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

/// `YYYY-MM-DD HH:MM:SS.mmm` in the recorder's local time.
///
/// The bias is the signed minute offset stored in the header extension;
/// the millisecond part comes from the unshifted timestamp's fraction.
fn format_absolute(epoch: f64, tz_bias_min: i16) -> String {
    let local = epoch - tz_bias_min as f64 * 60.0;
    let millis = ((epoch - epoch.floor()) * 1000.0) as u32;
    match DateTime::from_timestamp(local.floor() as i64, 0) {
        Some(dt) => format!("{}.{:03}", dt.format("%Y-%m-%d %H:%M:%S"), millis),
        None => format!("{:.6}", epoch),
    }
}

/// Render the catalog's track listing as CSV, one row per track.
pub fn write_tracks<W: Write>(out: &mut W, catalog: &Catalog) -> std::io::Result<()> {
    writeln!(out, "#dgmt,{}", catalog.tz_bias_min().unwrap_or(0))?;
    writeln!(out, "#dtstart,{:.6}", catalog.time_start)?;
    writeln!(out, "#dtend,{:.6}", catalog.time_end)?;
    writeln!(
        out,
        "tname,tid,dname,did,rectype,dtstart,dtend,srate,minval,maxval,cnt,avgval,firstval"
    )?;

    for track in catalog.tracks.values() {
        let (start, end) = if track.has_data() {
            (track.time_start, track.time_end)
        } else {
            (0.0, 0.0)
        };
        let stats = &track.stats;
        writeln!(
            out,
            "{},{},{},{},{},{:.6},{:.6},{},{},{},{},{},{}",
            escape_csv(&track.name),
            track.id,
            escape_csv(&track.device_name),
            track.device_id,
            track.kind.label(),
            start,
            end,
            track.rate_hz,
            if stats.count > 0 {
                format!("{:.6}", stats.min)
            } else {
                String::new()
            },
            if stats.count > 0 {
                format!("{:.6}", stats.max)
            } else {
                String::new()
            },
            stats.count,
            stats
                .mean()
                .map(|m| format!("{:.6}", m))
                .unwrap_or_default(),
            escape_csv(stats.first.as_deref().unwrap_or("")),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_pass_through_unquoted() {
        assert_eq!(escape_csv("HR"), "HR");
        assert_eq!(escape_csv("60.5"), "60.5");
        assert_eq!(escape_csv(""), "");
    }

    #[test]
    fn commas_force_quoting() {
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
    }

    #[test]
    fn quotes_are_doubled_and_wrapped() {
        assert_eq!(escape_csv("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn newlines_force_quoting() {
        assert_eq!(escape_csv("a\nb"), "\"a\nb\"");
        assert_eq!(escape_csv("a\rb"), "\"a\rb\"");
    }

    #[test]
    fn absolute_format_applies_bias() {
        // Epoch 3600 with a bias of -60 minutes lands at 02:00 local.
        let s = format_absolute(3600.0, -60);
        assert_eq!(s, "1970-01-01 02:00:00.000");
    }

    #[test]
    fn absolute_format_keeps_millis_from_fraction() {
        let s = format_absolute(10.25, 0);
        assert_eq!(s, "1970-01-01 00:00:10.250");
    }
}
