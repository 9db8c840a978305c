//! `vft export` - resample one container onto a time grid and write CSV.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::{GridArgs, RenderArgs};
use vft::config::Config;
use vft::export::csv::{self, CsvOptions, TimeFormat};
use vft::stream::ByteReader;
use vft::vital::{CatalogBuilder, DataPass, Grid, GridOptions, TrackSelector};

use super::parse_interval;

/// Translate CLI flags into engine options, falling back to config values.
pub fn grid_options(args: &GridArgs, config: &Config) -> Result<GridOptions> {
    let interval = match &args.interval {
        Some(raw) => parse_interval(raw)?,
        None => config.default_interval,
    };
    Ok(GridOptions {
        interval,
        policy: args.policy.unwrap_or_else(|| config.policy()),
        selection: args.tracks.as_deref().map(TrackSelector::parse_list),
        require_all: args.require_all,
        forward_fill: args.fill_last,
        skip_blank_rows: args.skip_blank,
    })
}

pub fn csv_options(args: &RenderArgs, filename: Option<String>) -> CsvOptions {
    CsvOptions {
        time_format: if args.absolute_time {
            TimeFormat::Absolute
        } else if args.unix_time {
            TimeFormat::Unix
        } else {
            TimeFormat::Relative
        },
        header: args.header,
        filename,
        device_names: args.device_names,
    }
}

/// Run the two-pass export of one container into `out`.
pub fn export_to<W: Write>(
    file: &Path,
    options: &GridOptions,
    csv_options: &CsvOptions,
    out: &mut W,
) -> Result<()> {
    let mut reader = ByteReader::open(file)
        .with_context(|| format!("failed to open container: {}", file.display()))?;
    let catalog = CatalogBuilder::new()
        .build(&mut reader)
        .with_context(|| format!("failed to parse container: {}", file.display()))?;

    let mut grid = Grid::plan(&catalog, options)?;
    let mut reader = catalog.reposition(reader)?;
    DataPass::run(&mut reader, &catalog, &mut grid)?;
    grid.finish()?;

    csv::write_grid(out, &grid, &catalog, csv_options)?;
    Ok(())
}

pub fn run(
    file: &Path,
    grid_args: &GridArgs,
    render_args: &RenderArgs,
    output: Option<&Path>,
) -> Result<()> {
    let config = Config::load();
    let options = grid_options(grid_args, &config)?;
    let filename = render_args
        .filename_column
        .then(|| file_label(file))
        .flatten();
    let csv_options = csv_options(render_args, filename);

    match output {
        Some(path) => {
            // Write to a temp sibling and rename so a failed export never
            // leaves a half-written file behind.
            let temp = path.with_extension("csv.tmp");
            let result = (|| -> Result<()> {
                let file_out = fs::File::create(&temp)
                    .with_context(|| format!("failed to create {}", temp.display()))?;
                let mut writer = BufWriter::new(file_out);
                export_to(file, &options, &csv_options, &mut writer)?;
                writer.flush()?;
                Ok(())
            })();
            if let Err(e) = result {
                let _ = fs::remove_file(&temp);
                return Err(e);
            }
            fs::rename(&temp, path)
                .with_context(|| format!("failed to move output into place: {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            export_to(file, &options, &csv_options, &mut out)?;
        }
    }
    Ok(())
}

/// File name component of the path, as printed in the filename column.
pub fn file_label(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}
