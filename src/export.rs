//! Saving server-rendered report files.
//!
//! Every write goes to a temporary file in the target directory first and is renamed into
//! place only once complete, so a failed export never leaves a partial file behind.

use crate::error::{ReportError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Excel,
    Pdf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Excel => "xlsx",
            Self::Pdf => "pdf",
        }
    }

    /// Last path segment of the generation endpoint.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Excel => "generate-excel",
            Self::Pdf => "generate-pdf",
        }
    }

    pub fn mime_type(self) -> String {
        mime_guess::from_ext(self.extension())
            .first_or_octet_stream()
            .to_string()
    }
}

/// `{report}_{from}_to_{to}.{ext}`, e.g. `location-wise-dispatch_2024-03-01_to_2024-03-31.xlsx`.
pub fn export_filename(report: &str, format: ExportFormat, date_from: &str, date_to: &str) -> String {
    let stem: String = report
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect();
    let stem = if stem.is_empty() { "report".to_string() } else { stem };

    format!(
        "{}_{}_to_{}.{}",
        stem,
        date_from.trim(),
        date_to.trim(),
        format.extension()
    )
}

pub(crate) fn check_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(ReportError::validation("filename", "must not be empty"));
    }
    if filename.contains(['/', '\\']) || filename == "." || filename == ".." {
        return Err(ReportError::validation(
            "filename",
            format!("'{}' must be a plain file name", filename),
        ));
    }
    Ok(())
}

/// Writes `bytes` to `dir/filename`, replacing any existing file of that name.
pub fn trigger_download(bytes: &[u8], filename: &str, dir: &Path) -> Result<PathBuf> {
    check_filename(filename)?;
    std::fs::create_dir_all(dir)?;

    let target = dir.join(filename);
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(&target).map_err(|e| ReportError::IoError(e.error))?;

    info!("Saved {} bytes to {}", bytes.len(), target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_format_metadata() {
        assert_eq!(ExportFormat::Excel.extension(), "xlsx");
        assert_eq!(ExportFormat::Pdf.endpoint(), "generate-pdf");
        assert_eq!(ExportFormat::Pdf.mime_type(), "application/pdf");
        assert!(ExportFormat::Excel.mime_type().contains("spreadsheetml"));
    }

    #[test]
    fn test_export_filename() {
        assert_eq!(
            export_filename("location-wise-dispatch", ExportFormat::Excel, "2024-03-01", "2024-03-31"),
            "location-wise-dispatch_2024-03-01_to_2024-03-31.xlsx"
        );
        assert_eq!(
            export_filename("sales statement/h12", ExportFormat::Pdf, "2024-01-01", "2024-01-31"),
            "sales-statement_h12_2024-01-01_to_2024-01-31.pdf"
        );
    }

    #[test]
    fn test_trigger_download_writes_file() {
        let dir = tempdir().unwrap();
        let path = trigger_download(b"PK\x03\x04", "report.xlsx", dir.path()).unwrap();

        assert_eq!(path, dir.path().join("report.xlsx"));
        assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04");

        // replacing keeps a single file
        trigger_download(b"second", "report.xlsx", dir.path()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rejects_path_like_filenames() {
        let dir = tempdir().unwrap();
        for bad in ["", "  ", "../escape.pdf", "nested/file.pdf", ".."] {
            let err = trigger_download(b"x", bad, dir.path()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
