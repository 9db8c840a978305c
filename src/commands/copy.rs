//! `vft copy` - subset or clip a container into a new file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use vft::stream::{ByteReader, ByteWriter};
use vft::vital::recode::{copy_stream, CopyOptions};
use vft::vital::TrackSelector;

pub fn run(
    input: &Path,
    output: &Path,
    tracks: Option<&str>,
    max_length: Option<f64>,
) -> Result<()> {
    // Nothing to filter: a byte-level copy preserves the file exactly.
    if tracks.is_none() && max_length.is_none() {
        fs::copy(input, output)
            .with_context(|| format!("failed to copy {} to {}", input.display(), output.display()))?;
        return Ok(());
    }

    let options = CopyOptions {
        selection: tracks.map(TrackSelector::parse_list),
        max_len: max_length,
    };

    let reader = ByteReader::open(input)
        .with_context(|| format!("failed to open container: {}", input.display()))?;

    let temp = output.with_extension("vital.tmp");
    let result = (|| -> Result<_> {
        let mut writer = ByteWriter::create(&temp)
            .with_context(|| format!("failed to create {}", temp.display()))?;
        let summary = copy_stream(reader, &mut writer, &options)?;
        writer.finish()?;
        Ok(summary)
    })();

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
    };
    fs::rename(&temp, output)
        .with_context(|| format!("failed to move output into place: {}", output.display()))?;

    eprintln!(
        "kept {} of {} packets",
        summary.packets_out, summary.packets_in
    );
    Ok(())
}
