//! Export files for extracted flight data.
//!
//! Frame data is tab-separated text, one frame per line, each value followed by a tab.
//! The trailing tab is written as an empty last field.
//! Header metadata lives in a separate file as `label: value unit` lines. Output goes
//! under `output/` in a per-date directory and never overwrites an earlier run.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::iter;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use log::info;

use crate::controller::ControllerProfile;
use crate::errors::{DriverError, Result};
use crate::frame::SensorFrame;

const OUTPUT_DIR: &str = "output";
const EXTRACT_STEM: &str = "sensor_data";
const DUAL_DEPLOY_STEM: &str = "data";
pub const HEADER_FILE: &str = "header.txt";
pub const DATA_FILE: &str = "data.txt";

// ============================================================================
// Row format
// ============================================================================

fn row_writer<W: Write>(out: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(out)
}

// Empty rows are skipped; a lone empty field would be written as `""`.
fn write_record<W: Write>(writer: &mut csv::Writer<W>, row: &[f64]) -> Result<()> {
    if row.is_empty() {
        return Ok(());
    }
    let fields = row.iter().map(f64::to_string).chain(iter::once(String::new()));
    writer.write_record(fields)?;
    Ok(())
}

pub fn write_rows<W: Write>(out: &mut W, rows: &[Vec<f64>]) -> Result<()> {
    let mut writer = row_writer(out);
    for row in rows {
        write_record(&mut writer, row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write frames as `[time, values...]` rows.
pub fn write_frames<W: Write>(out: &mut W, frames: &[SensorFrame]) -> Result<()> {
    let mut writer = row_writer(out);
    for frame in frames {
        write_record(&mut writer, &frame.to_row())?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse exported rows. Blank lines are skipped and the trailing tab is tolerated.
pub fn read_rows<R: Read>(input: R) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let row = record
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|e| DriverError::Decode(format!("line {line}: {field:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// `label: value unit` per entry.
pub fn write_header<W: Write>(out: &mut W, entries: &[(&str, String, &str)]) -> Result<()> {
    for (label, value, unit) in entries {
        writeln!(out, "{label}: {value} {unit}")?;
    }
    Ok(())
}

// ============================================================================
// Output locations
// ============================================================================

/// `MM-DD-YYYY`
pub fn date_stamp(date: NaiveDate) -> String {
    date.format("%m-%d-%Y").to_string()
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// `<root>/output/extract/<controller>/<date>`
pub fn extract_dir(root: &Path, profile: &ControllerProfile, date: NaiveDate) -> PathBuf {
    root.join(OUTPUT_DIR)
        .join("extract")
        .join(profile.name)
        .join(date_stamp(date))
}

/// `<root>/output/dual-deploy/<date>`
pub fn dual_deploy_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(OUTPUT_DIR).join("dual-deploy").join(date_stamp(date))
}

/// First `<dir>/<stem>N<suffix>` that does not exist yet, N counting from 0.
pub fn next_free_path(dir: &Path, stem: &str, suffix: &str) -> PathBuf {
    (0u32..)
        .map(|n| dir.join(format!("{stem}{n}{suffix}")))
        .find(|path| !path.exists())
        .unwrap_or_else(|| dir.join(format!("{stem}{suffix}")))
}

fn create_file(path: &Path) -> Result<BufWriter<File>> {
    Ok(BufWriter::new(File::create(path)?))
}

/// Save flash extract frames to a fresh `sensor_dataN.txt`.
pub fn save_extract(
    root: &Path,
    profile: &ControllerProfile,
    date: NaiveDate,
    frames: &[SensorFrame],
) -> Result<PathBuf> {
    let dir = extract_dir(root, profile, date);
    fs::create_dir_all(&dir)?;
    let path = next_free_path(&dir, EXTRACT_STEM, ".txt");

    let mut out = create_file(&path)?;
    write_frames(&mut out, frames)?;
    out.flush()?;
    info!("Wrote {} frames to {}", frames.len(), path.display());
    Ok(path)
}

/// Save a dual-deploy flight to a fresh `dataN/` directory holding the header and frames.
pub fn save_dual_deploy(
    root: &Path,
    date: NaiveDate,
    header: &[(&str, String, &str)],
    frames: &[SensorFrame],
) -> Result<PathBuf> {
    let parent = dual_deploy_dir(root, date);
    fs::create_dir_all(&parent)?;
    let dir = next_free_path(&parent, DUAL_DEPLOY_STEM, "");
    fs::create_dir(&dir)?;

    let mut out = create_file(&dir.join(HEADER_FILE))?;
    write_header(&mut out, header)?;
    out.flush()?;

    let mut out = create_file(&dir.join(DATA_FILE))?;
    write_frames(&mut out, frames)?;
    out.flush()?;

    info!("Wrote flight data to {}", dir.display());
    Ok(dir)
}

/// Load rows from an exported data file.
pub fn load_rows(path: &Path) -> Result<Vec<Vec<f64>>> {
    read_rows(File::open(path)?)
}

/// Save rows to `path`, replacing any existing file.
pub fn save_rows(path: &Path, rows: &[Vec<f64>]) -> Result<()> {
    let mut out = create_file(path)?;
    write_rows(&mut out, rows)?;
    out.flush()?;
    Ok(())
}
