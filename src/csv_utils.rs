use chrono::{DateTime, Local};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use crate::{measurement::MeasurementRecord, transcript::FILE_DATE_FORMAT};

/// `data{MM-dd-yy}.csv` inside `dir`.
pub fn data_path(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("data{}.csv", now.format(FILE_DATE_FORMAT)))
}

/// Append `record` as one transposed block to today's data file.
pub fn append_measurement(dir: &Path, record: &MeasurementRecord) -> csv::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = data_path(dir, Local::now());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for row in record.rows() {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(path)
}
