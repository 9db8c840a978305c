//! `vft batch` - export every container in a directory to CSV.
//!
//! Each file runs through its own independent pipeline; files are fanned
//! out across threads since pipelines share no state.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::warn;
use rayon::prelude::*;

use crate::cli::{GridArgs, RenderArgs};
use vft::config::Config;

use super::export::{csv_options, export_to, file_label, grid_options};

pub fn run(
    dir: &Path,
    out_dir: Option<&Path>,
    grid_args: &GridArgs,
    render_args: &RenderArgs,
) -> Result<()> {
    let config = Config::load();
    let options = grid_options(grid_args, &config)?;
    let out_dir = out_dir
        .map(Path::to_path_buf)
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| dir.to_path_buf());
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create output dir: {}", out_dir.display()))?;

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("vital"))
        .collect();
    files.sort();

    if files.is_empty() {
        bail!("no .vital files in {}", dir.display());
    }

    let exported: usize = files
        .par_iter()
        .map(|file| {
            let filename = render_args
                .filename_column
                .then(|| file_label(file))
                .flatten();
            let csv_opts = csv_options(render_args, filename);
            let target = out_dir
                .join(file.file_stem().unwrap_or_default())
                .with_extension("csv");

            let result = (|| -> Result<()> {
                let temp = target.with_extension("csv.tmp");
                let out = fs::File::create(&temp)?;
                let mut writer = std::io::BufWriter::new(out);
                if let Err(e) = export_to(file, &options, &csv_opts, &mut writer) {
                    drop(writer);
                    let _ = fs::remove_file(&temp);
                    return Err(e);
                }
                writer.flush()?;
                fs::rename(&temp, &target)?;
                Ok(())
            })();

            match result {
                Ok(()) => 1,
                Err(e) => {
                    warn!("skipping {}: {:#}", file.display(), e);
                    0
                }
            }
        })
        .sum();

    eprintln!("exported {} of {} files to {}", exported, files.len(), out_dir.display());
    Ok(())
}
