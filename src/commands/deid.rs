//! `vft deid` - move a container's timestamps and strip identifying data.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use vft::stream::{ByteReader, ByteWriter};
use vft::vital::recode::{deidentify, DeidMode, DEID_DEFAULT_EPOCH};

pub fn run(
    input: &Path,
    output: &Path,
    shift: Option<f64>,
    target_epoch: Option<f64>,
) -> Result<()> {
    let mode = match shift {
        Some(seconds) => DeidMode::Shift(seconds),
        None => DeidMode::Relocate {
            target_epoch: target_epoch.unwrap_or(DEID_DEFAULT_EPOCH),
        },
    };

    let reader = ByteReader::open(input)
        .with_context(|| format!("failed to open container: {}", input.display()))?;

    let temp = output.with_extension("vital.tmp");
    let result = (|| -> Result<_> {
        let mut writer = ByteWriter::create(&temp)
            .with_context(|| format!("failed to create {}", temp.display()))?;
        let summary = deidentify(reader, &mut writer, mode)?;
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
        "rewrote {} records, dropped {} event records",
        summary.records_rewritten, summary.events_dropped
    );
    Ok(())
}
