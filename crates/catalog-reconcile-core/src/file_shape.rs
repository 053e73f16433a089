//! Upload shape check performed before any parsing.
//!
//! A file is accepted when either its extension or its declared content type
//! is on the allow-list. Only a file failing both is rejected, with a single
//! user-facing message.

use serde::Serialize;

use crate::error::{EngineError, EngineResult};

pub const MIME_CSV: &str = "text/csv";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Spreadsheet formats accepted for bulk updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    /// Legacy binary workbook.
    Xls,
    /// Office Open XML workbook.
    Xlsx,
}

impl FileKind {
    pub fn from_extension(file_name: &str) -> Option<Self> {
        let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xls" => Some(Self::Xls),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    /// Matches on the media type only; parameters such as `charset` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let media = content_type
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();
        match media.as_str() {
            MIME_CSV => Some(Self::Csv),
            MIME_XLS => Some(Self::Xls),
            MIME_XLSX => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Csv => MIME_CSV,
            Self::Xls => MIME_XLS,
            Self::Xlsx => MIME_XLSX,
        }
    }
}

/// Validate an upload by name and declared content type.
///
/// The extension decides the kind when it is recognised; otherwise the
/// content type does.
pub fn validate_upload(file_name: &str, content_type: &str) -> EngineResult<FileKind> {
    FileKind::from_extension(file_name)
        .or_else(|| FileKind::from_content_type(content_type))
        .ok_or_else(|| {
            EngineError::validation(format!(
                "Unsupported file type for '{}'. Upload a CSV or Excel file (.csv, .xls, .xlsx).",
                file_name
            ))
        })
}
