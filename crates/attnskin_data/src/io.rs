//! Reading label files and images.
//!
//! Label files are headerless CSV: the first column is an image path, the
//! last column the integer class. Columns in between (segmentation masks,
//! metadata) are ignored. Relative paths resolve against a root directory.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::error::{DataError, Result};

/// One row of a label file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRecord {
    /// Image location.
    pub path: PathBuf,
    /// Class index.
    pub label: usize,
}

/// Read a label file.
///
/// A first row whose label column is not an integer is treated as a header
/// and skipped; any later such row is an error.
pub fn read_label_csv(path: impl AsRef<Path>, root: Option<&Path>) -> Result<Vec<LabelRecord>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let (Some(image), Some(label)) = (row.get(0), row.get(row.len().saturating_sub(1))) else {
            continue;
        };
        if row.len() < 2 {
            return Err(DataError::FormatError(format!(
                "{}:{}: expected at least 2 columns",
                path.display(),
                line + 1
            )));
        }
        let label = match label.parse::<usize>() {
            Ok(label) => label,
            Err(_) if line == 0 => continue,
            Err(_) => {
                return Err(DataError::FormatError(format!(
                    "{}:{}: label '{}' is not a class index",
                    path.display(),
                    line + 1,
                    label
                )))
            }
        };
        let image = PathBuf::from(image);
        let image = match root {
            Some(root) if image.is_relative() => root.join(image),
            _ => image,
        };
        records.push(LabelRecord { path: image, label });
    }

    tracing::debug!(file = %path.display(), rows = records.len(), "read label file");
    Ok(records)
}

/// Decode an image file as 8-bit RGB.
pub fn read_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path = path.as_ref();
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| DataError::Image {
            path: path.display().to_string(),
            source,
        })
}
