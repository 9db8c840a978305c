//! Pass 2: re-project sparse per-track records onto a dense time grid.
//!
//! Every selected track becomes a column; every `interval` seconds of the
//! discovered time span becomes a row. Each sample maps to a row by its
//! timestamp, and the [`CellPolicy`] decides what happens when several
//! samples land in the same cell:
//!
//! - `FirstWins` - the first sample *in stream order* fills the cell;
//!   later arrivals are ignored
//! - `Nearest` - the sample whose fractional row position is closest to
//!   the row index wins; ties keep the earlier write
//! - `Mean` - all samples fold into a running sum, divided once at the end
//!
//! The pass streams the container a second time and never materializes
//! per-track sample vectors; a wave record's samples map straight into grid
//! cells as they are decoded.

use std::collections::HashMap;
use std::io::{Read, Seek};
use std::str::FromStr;

use log::debug;

use crate::stream::{ByteReader, FieldRead, StreamError};

use super::catalog::{strip_unprintable, Catalog};
use super::{next_packet, packet_type, RecordKind, VitalError, MAX_SPAN_SECS};

/// How multiple samples landing in one grid cell reduce to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellPolicy {
    #[default]
    FirstWins,
    Nearest,
    Mean,
}

impl CellPolicy {
    pub fn name(self) -> &'static str {
        match self {
            CellPolicy::FirstWins => "first-wins",
            CellPolicy::Nearest => "nearest",
            CellPolicy::Mean => "mean",
        }
    }
}

impl FromStr for CellPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first-wins" | "first" => Ok(CellPolicy::FirstWins),
            "nearest" | "closest" => Ok(CellPolicy::Nearest),
            "mean" => Ok(CellPolicy::Mean),
            other => Err(format!(
                "unknown cell policy '{}' (expected first-wins, nearest, or mean)",
                other
            )),
        }
    }
}

/// One `DEVICE/TRACK` pattern from a selection list. Either side may be
/// `*`; a missing device side matches any device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSelector {
    pub device: Option<String>,
    pub track: String,
}

impl TrackSelector {
    /// Parse a single `TRACK` or `DEVICE/TRACK` pattern.
    pub fn parse(s: &str) -> Self {
        match s.split_once('/') {
            Some((device, track)) => Self {
                device: Some(device.to_string()),
                track: track.to_string(),
            },
            None => Self {
                device: None,
                track: s.to_string(),
            },
        }
    }

    /// Parse a comma-separated selection list.
    pub fn parse_list(s: &str) -> Vec<Self> {
        s.split(',')
            .filter(|part| !part.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn matches(&self, track_name: &str, device_name: &str) -> bool {
        if self.track != "*" && self.track != track_name {
            return false;
        }
        match self.device.as_deref() {
            None | Some("*") | Some("") => true,
            Some(device) => device == device_name,
        }
    }
}

/// Knobs for [`Grid::plan`] and rendering.
#[derive(Debug, Clone)]
pub struct GridOptions {
    /// Row width in seconds; must be positive.
    pub interval: f64,
    pub policy: CellPolicy,
    /// `None` selects every track that produced records, in the order
    /// their first record appeared.
    pub selection: Option<Vec<TrackSelector>>,
    /// Fail unless every selected column receives at least one sample;
    /// also narrows the time span to the intersection of column spans.
    pub require_all: bool,
    /// Blank cells repeat the last rendered value of their column.
    pub forward_fill: bool,
    /// Rows with no sample in any column are omitted from render.
    pub skip_blank_rows: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            interval: 1.0,
            policy: CellPolicy::FirstWins,
            selection: None,
            require_all: false,
            forward_fill: false,
            skip_blank_rows: false,
        }
    }
}

/// One output column of the grid.
#[derive(Debug, Clone)]
pub struct Column {
    /// Resolved track, or `None` when a selector matched nothing.
    pub track_id: Option<u16>,
    pub name: String,
    pub device: String,
}

/// A rendered cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn render(&self) -> String {
        match self {
            CellValue::Number(v) => format!("{:.6}", v),
            CellValue::Text(s) => s.clone(),
        }
    }
}

/// One row of rendered output: absolute row time plus one optional value
/// per column.
#[derive(Debug, Clone)]
pub struct RenderedRow {
    pub time: f64,
    pub cells: Vec<Option<String>>,
}

/// The dense rows × columns table.
pub struct Grid {
    origin: f64,
    end: f64,
    interval: f64,
    rows: usize,
    columns: Vec<Column>,
    col_of: HashMap<u16, usize>,
    cells: Vec<Option<CellValue>>,
    /// Mean policy: running sums and counts per cell.
    sums: Vec<f64>,
    counts: Vec<u64>,
    /// Nearest policy: fractional distance of the current occupant.
    dists: Vec<f64>,
    row_filled: Vec<bool>,
    col_filled: Vec<bool>,
    policy: CellPolicy,
    require_all: bool,
    forward_fill: bool,
    skip_blank_rows: bool,
    finished: bool,
}

impl Grid {
    /// Size the grid from the catalog and the column selection.
    ///
    /// # Errors
    ///
    /// - [`VitalError::BadInterval`] for a non-positive interval
    /// - [`VitalError::NoData`] when no selected track has records, or the
    ///   (possibly intersected) span is empty
    /// - [`VitalError::SpanTooLong`] when the selected span exceeds 48 h
    pub fn plan(catalog: &Catalog, options: &GridOptions) -> Result<Self, VitalError> {
        if !(options.interval > 0.0) {
            return Err(VitalError::BadInterval(options.interval));
        }

        let columns = resolve_columns(catalog, options.selection.as_deref());

        let mut starts = Vec::new();
        let mut ends = Vec::new();
        for column in &columns {
            let Some(track) = column.track_id.and_then(|tid| catalog.tracks.get(&tid)) else {
                continue;
            };
            if track.has_data() {
                starts.push(track.time_start);
                ends.push(track.time_end);
            }
        }
        if starts.is_empty() {
            return Err(VitalError::NoData);
        }

        let (origin, end) = if options.require_all {
            (
                starts.iter().cloned().fold(f64::MIN, f64::max),
                ends.iter().cloned().fold(f64::MAX, f64::min),
            )
        } else {
            (
                starts.iter().cloned().fold(f64::MAX, f64::min),
                ends.iter().cloned().fold(f64::MIN, f64::max),
            )
        };
        if end <= origin {
            return Err(VitalError::NoData);
        }
        let span = end - origin;
        if span > MAX_SPAN_SECS {
            return Err(VitalError::SpanTooLong {
                hours: span / 3600.0,
            });
        }

        let rows = (span / options.interval).ceil() as usize;
        let ncells = rows * columns.len();
        let col_of = columns
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.track_id.map(|tid| (tid, i)))
            .collect();

        let (sums, counts) = if options.policy == CellPolicy::Mean {
            (vec![0.0; ncells], vec![0u64; ncells])
        } else {
            (Vec::new(), Vec::new())
        };
        let dists = if options.policy == CellPolicy::Nearest {
            vec![f64::MAX; ncells]
        } else {
            Vec::new()
        };

        Ok(Grid {
            origin,
            end,
            interval: options.interval,
            rows,
            col_filled: vec![false; columns.len()],
            row_filled: vec![false; rows],
            cells: vec![None; ncells],
            sums,
            counts,
            dists,
            col_of,
            columns,
            policy: options.policy,
            require_all: options.require_all,
            forward_fill: options.forward_fill,
            skip_blank_rows: options.skip_blank_rows,
            finished: false,
        })
    }

    pub fn origin(&self) -> f64 {
        self.origin
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_of(&self, track_id: u16) -> Option<usize> {
        self.col_of.get(&track_id).copied()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.cells[row * self.columns.len() + col].as_ref()
    }

    /// Map a fractional row position to a cell index if this sample should
    /// be decoded and stored. Nearest-policy distances are updated here:
    /// a strictly smaller distance evicts the occupant, an equal one keeps
    /// the first writer.
    fn claim_numeric(&mut self, frow: f64, col: usize) -> Option<usize> {
        let (irow, dist) = self.map_row(frow)?;
        let idx = irow * self.columns.len() + col;
        match self.policy {
            CellPolicy::FirstWins => self.cells[idx].is_none().then_some(idx),
            CellPolicy::Mean => Some(idx),
            CellPolicy::Nearest => {
                if dist < self.dists[idx] {
                    self.dists[idx] = dist;
                    Some(idx)
                } else {
                    None
                }
            }
        }
    }

    /// Text cells are never averaged; under `Mean` they keep first-wins
    /// semantics.
    fn claim_text(&mut self, frow: f64, col: usize) -> Option<usize> {
        let (irow, dist) = self.map_row(frow)?;
        let idx = irow * self.columns.len() + col;
        match self.policy {
            CellPolicy::Nearest => {
                if dist < self.dists[idx] {
                    self.dists[idx] = dist;
                    Some(idx)
                } else {
                    None
                }
            }
            _ => self.cells[idx].is_none().then_some(idx),
        }
    }

    fn map_row(&self, frow: f64) -> Option<(usize, f64)> {
        if !frow.is_finite() {
            return None;
        }
        let irow = if self.policy == CellPolicy::Nearest {
            (frow + 0.5).floor()
        } else {
            frow.floor()
        };
        if irow < 0.0 || irow >= self.rows as f64 {
            return None;
        }
        Some((irow as usize, (frow - irow).abs()))
    }

    fn store_number(&mut self, idx: usize, value: f64) {
        if self.policy == CellPolicy::Mean {
            self.sums[idx] += value;
            self.counts[idx] += 1;
        } else {
            self.cells[idx] = Some(CellValue::Number(value));
        }
        self.mark(idx);
    }

    fn store_text(&mut self, idx: usize, value: String) {
        self.cells[idx] = Some(CellValue::Text(value));
        self.mark(idx);
    }

    fn mark(&mut self, idx: usize) {
        let ncols = self.columns.len();
        self.row_filled[idx / ncols] = true;
        self.col_filled[idx % ncols] = true;
    }

    /// Finalize after the data pass: divide mean cells and enforce the
    /// required-columns contract.
    ///
    /// # Errors
    ///
    /// [`VitalError::EmptyColumn`] when `require_all` is set and a column
    /// received no samples; the grid should not be rendered in that case.
    pub fn finish(&mut self) -> Result<(), VitalError> {
        if self.policy == CellPolicy::Mean && !self.finished {
            for idx in 0..self.cells.len() {
                if self.counts[idx] > 0 {
                    self.cells[idx] =
                        Some(CellValue::Number(self.sums[idx] / self.counts[idx] as f64));
                }
            }
        }
        self.finished = true;

        if self.require_all {
            for (i, column) in self.columns.iter().enumerate() {
                if !self.col_filled[i] {
                    return Err(VitalError::EmptyColumn(column.name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Render the populated grid to per-row string values, applying
    /// forward fill and blank-row skipping.
    pub fn render(&self) -> Vec<RenderedRow> {
        let ncols = self.columns.len();
        let mut out = Vec::new();
        let mut last: Vec<Option<String>> = vec![None; ncols];

        for row in 0..self.rows {
            if self.skip_blank_rows && !self.row_filled[row] {
                continue;
            }
            let mut cells = Vec::with_capacity(ncols);
            for col in 0..ncols {
                let value = self.cells[row * ncols + col].as_ref().map(CellValue::render);
                let value = if self.forward_fill {
                    if value.is_some() {
                        last[col] = value.clone();
                    }
                    value.or_else(|| last[col].clone())
                } else {
                    value
                };
                cells.push(value);
            }
            out.push(RenderedRow {
                time: self.origin + row as f64 * self.interval,
                cells,
            });
        }
        out
    }
}

fn resolve_columns(catalog: &Catalog, selection: Option<&[TrackSelector]>) -> Vec<Column> {
    match selection {
        Some(selectors) => selectors
            .iter()
            .map(|sel| {
                let matched = catalog
                    .track_order
                    .iter()
                    .filter_map(|tid| catalog.tracks.get(tid))
                    .find(|t| sel.matches(&t.name, &t.device_name));
                match matched {
                    Some(track) => Column {
                        track_id: Some(track.id),
                        name: track.name.clone(),
                        device: track.device_name.clone(),
                    },
                    None => Column {
                        track_id: None,
                        name: sel.track.clone(),
                        device: sel.device.clone().unwrap_or_default(),
                    },
                }
            })
            .collect(),
        None => catalog
            .record_order
            .iter()
            .filter_map(|tid| catalog.tracks.get(tid))
            .map(|track| Column {
                track_id: Some(track.id),
                name: track.name.clone(),
                device: track.device_name.clone(),
            })
            .collect(),
    }
}

/// Streaming data pass populating a planned [`Grid`].
///
/// The reader must be positioned at the first packet preamble, i.e. the
/// caller has run [`Catalog::reposition`] after the catalog pass.
pub struct DataPass;

impl DataPass {
    /// Consume record packets until the stream ends or turns corrupt.
    ///
    /// Corruption truncates the pass: the grid keeps everything stored so
    /// far and `Ok` is returned, because a partial table beats losing the
    /// file once the catalog itself was valid.
    pub fn run<R: Read + Seek>(
        reader: &mut ByteReader<R>,
        catalog: &Catalog,
        grid: &mut Grid,
    ) -> Result<(), VitalError> {
        while !reader.eof() {
            let Some((ptype, len)) = next_packet(reader)? else {
                break;
            };
            let mut body = reader.packet(len);

            if ptype == packet_type::RECORD {
                if let Err(e) = Self::on_record(catalog, grid, &mut body) {
                    debug!("abandoning {} byte record packet: {}", len, e);
                }
            }

            if body.skip_rest().is_err() {
                break;
            }
        }
        Ok(())
    }

    fn on_record<F: FieldRead>(
        catalog: &Catalog,
        grid: &mut Grid,
        body: &mut F,
    ) -> Result<(), StreamError> {
        let _info_len = body.fetch_u16()?;
        let timestamp = body.fetch_f64()?;
        if timestamp < grid.origin {
            return Ok(());
        }
        let track_id = body.fetch_u16()?;
        let Some(col) = grid.column_of(track_id) else {
            return Ok(());
        };
        let Some(track) = catalog.tracks.get(&track_id) else {
            return Ok(());
        };

        match track.kind {
            RecordKind::Wave => {
                let sample_count = body.fetch_u32()?;
                let width = track.encoding.width();
                for i in 0..sample_count {
                    let sample_time = timestamp + i as f64 / track.rate_hz;
                    let frow = (sample_time - grid.origin) / grid.interval;
                    match grid.claim_numeric(frow, col) {
                        Some(idx) => {
                            let raw = track.encoding.read_sample(body)?;
                            grid.store_number(idx, raw * track.gain + track.offset);
                        }
                        None => body.skip(width)?,
                    }
                }
            }
            RecordKind::Numeric => {
                let frow = (timestamp - grid.origin) / grid.interval;
                if let Some(idx) = grid.claim_numeric(frow, col) {
                    let v = body.fetch_f32()?;
                    grid.store_number(idx, v as f64);
                }
            }
            RecordKind::Text => {
                let frow = (timestamp - grid.origin) / grid.interval;
                if let Some(idx) = grid.claim_text(frow, col) {
                    body.skip(4)?;
                    let text = strip_unprintable(&body.fetch_str()?);
                    grid.store_text(idx, text);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Selector tests
    // ========================================================================

    #[test]
    fn selector_parses_device_and_track() {
        let sel = TrackSelector::parse("BIS/SEF");
        assert_eq!(sel.device.as_deref(), Some("BIS"));
        assert_eq!(sel.track, "SEF");
    }

    #[test]
    fn selector_without_device_matches_any() {
        let sel = TrackSelector::parse("HR");
        assert!(sel.matches("HR", "Solar8000"));
        assert!(sel.matches("HR", ""));
        assert!(!sel.matches("SpO2", "Solar8000"));
    }

    #[test]
    fn selector_wildcards() {
        assert!(TrackSelector::parse("*/HR").matches("HR", "anything"));
        assert!(TrackSelector::parse("BIS/*").matches("SEF", "BIS"));
        assert!(!TrackSelector::parse("BIS/*").matches("SEF", "Solar8000"));
    }

    #[test]
    fn selector_list_splits_on_commas() {
        let list = TrackSelector::parse_list("BIS/BIS,BIS/SEF,HR");
        assert_eq!(list.len(), 3);
        assert_eq!(list[2].device, None);
    }

    #[test]
    fn policy_from_str() {
        assert_eq!("first-wins".parse::<CellPolicy>(), Ok(CellPolicy::FirstWins));
        assert_eq!("nearest".parse::<CellPolicy>(), Ok(CellPolicy::Nearest));
        assert_eq!("mean".parse::<CellPolicy>(), Ok(CellPolicy::Mean));
        assert!("median".parse::<CellPolicy>().is_err());
    }

    // ========================================================================
    // Row mapping and cell policy tests
    // ========================================================================

    fn bare_grid(policy: CellPolicy, rows: usize, ncols: usize) -> Grid {
        let ncells = rows * ncols;
        Grid {
            origin: 0.0,
            end: rows as f64,
            interval: 1.0,
            rows,
            columns: (0..ncols)
                .map(|i| Column {
                    track_id: Some(i as u16),
                    name: format!("T{}", i),
                    device: String::new(),
                })
                .collect(),
            col_of: (0..ncols).map(|i| (i as u16, i)).collect(),
            cells: vec![None; ncells],
            sums: vec![0.0; ncells],
            counts: vec![0; ncells],
            dists: vec![f64::MAX; ncells],
            row_filled: vec![false; rows],
            col_filled: vec![false; ncols],
            policy,
            require_all: false,
            forward_fill: false,
            skip_blank_rows: false,
            finished: false,
        }
    }

    #[test]
    fn first_wins_keeps_stream_order_not_time_order() {
        let mut grid = bare_grid(CellPolicy::FirstWins, 1, 1);
        // t=0.9 arrives first in stream order, t=0.2 second; both row 0.
        let idx = grid.claim_numeric(0.9, 0).unwrap();
        grid.store_number(idx, 60.0);
        assert_eq!(grid.claim_numeric(0.2, 0), None);
        assert_eq!(grid.cell(0, 0), Some(&CellValue::Number(60.0)));
    }

    #[test]
    fn nearest_rounds_to_closest_row() {
        let mut grid = bare_grid(CellPolicy::Nearest, 2, 1);
        let idx = grid.claim_numeric(0.4, 0).unwrap();
        grid.store_number(idx, 1.0);
        let idx = grid.claim_numeric(0.6, 0).unwrap();
        grid.store_number(idx, 2.0);
        assert_eq!(grid.cell(0, 0), Some(&CellValue::Number(1.0)));
        assert_eq!(grid.cell(1, 0), Some(&CellValue::Number(2.0)));
    }

    #[test]
    fn nearest_strictly_smaller_distance_evicts() {
        let mut grid = bare_grid(CellPolicy::Nearest, 2, 1);
        let idx = grid.claim_numeric(0.4, 0).unwrap();
        grid.store_number(idx, 1.0);
        // 0.1 is closer to row 0 than 0.4 was.
        let idx = grid.claim_numeric(0.1, 0).unwrap();
        grid.store_number(idx, 9.0);
        assert_eq!(grid.cell(0, 0), Some(&CellValue::Number(9.0)));
    }

    #[test]
    fn nearest_equal_distance_keeps_first_writer() {
        let mut grid = bare_grid(CellPolicy::Nearest, 2, 1);
        // Two samples exactly 0.5 rows from row 1: the distance is not
        // strictly smaller, so the second claim must be refused.
        let idx = grid.claim_numeric(0.5, 0).unwrap();
        grid.store_number(idx, 1.0);
        assert_eq!(grid.claim_numeric(0.5, 0), None);
        assert_eq!(grid.cell(1, 0), Some(&CellValue::Number(1.0)));
    }

    #[test]
    fn mean_folds_all_samples() {
        let mut grid = bare_grid(CellPolicy::Mean, 1, 1);
        for v in [10.0, 20.0, 30.0] {
            let idx = grid.claim_numeric(0.3, 0).unwrap();
            grid.store_number(idx, v);
        }
        grid.finish().unwrap();
        assert_eq!(grid.cell(0, 0), Some(&CellValue::Number(20.0)));
    }

    #[test]
    fn text_cells_are_never_averaged() {
        let mut grid = bare_grid(CellPolicy::Mean, 1, 1);
        let idx = grid.claim_text(0.1, 0).unwrap();
        grid.store_text(idx, "first".into());
        assert_eq!(grid.claim_text(0.2, 0), None);
        grid.finish().unwrap();
        assert_eq!(grid.cell(0, 0), Some(&CellValue::Text("first".into())));
    }

    #[test]
    fn out_of_range_rows_are_dropped() {
        let mut grid = bare_grid(CellPolicy::FirstWins, 2, 1);
        assert_eq!(grid.claim_numeric(-0.5, 0), None);
        assert_eq!(grid.claim_numeric(2.0, 0), None);
        assert_eq!(grid.claim_numeric(f64::INFINITY, 0), None);
        assert_eq!(grid.claim_numeric(f64::NAN, 0), None);
    }

    // ========================================================================
    // Render tests
    // ========================================================================

    #[test]
    fn forward_fill_repeats_last_value() {
        let mut grid = bare_grid(CellPolicy::FirstWins, 3, 1);
        grid.forward_fill = true;
        let idx = grid.claim_numeric(0.0, 0).unwrap();
        grid.store_number(idx, 5.0);
        grid.finish().unwrap();

        let rows = grid.render();
        assert_eq!(rows[0].cells[0].as_deref(), Some("5.000000"));
        assert_eq!(rows[1].cells[0].as_deref(), Some("5.000000"));
        assert_eq!(rows[2].cells[0].as_deref(), Some("5.000000"));
    }

    #[test]
    fn skip_blank_rows_omits_empty_rows() {
        let mut grid = bare_grid(CellPolicy::FirstWins, 3, 1);
        grid.skip_blank_rows = true;
        let idx = grid.claim_numeric(1.2, 0).unwrap();
        grid.store_number(idx, 7.0);
        grid.finish().unwrap();

        let rows = grid.render();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].time, 1.0);
    }

    #[test]
    fn require_all_fails_on_empty_column() {
        let mut grid = bare_grid(CellPolicy::FirstWins, 1, 2);
        grid.require_all = true;
        let idx = grid.claim_numeric(0.0, 0).unwrap();
        grid.store_number(idx, 1.0);

        match grid.finish() {
            Err(VitalError::EmptyColumn(name)) => assert_eq!(name, "T1"),
            other => panic!("expected EmptyColumn, got {:?}", other),
        }
    }
}
