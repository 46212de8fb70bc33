// ABOUTME: Download formats for crawl results.
// ABOUTME: Serializes product records to BOM-prefixed CSV or pretty-printed JSON.

//! Result export.
//!
//! Both formats use the record's wire field names
//! `name, price, product_url, coupang_search_url`. CSV output carries a UTF-8
//! byte order mark so spreadsheet tools detect the encoding of Korean names.

use std::fmt;
use std::str::FromStr;

use crate::error::CrawlError;
use crate::result::ProductRecord;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = CrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(CrawlError::invalid_input(
                "ExportFormat",
                Some(anyhow::anyhow!("unsupported format: {}", other)),
            )),
        }
    }
}

/// Serializes records as CSV with a header row.
///
/// An empty record set produces empty output: no BOM and no header.
pub fn to_csv(records: &[ProductRecord]) -> Result<Vec<u8>, CrawlError> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());
    for record in records {
        writer.serialize(record).map_err(|e| {
            CrawlError::export("WriteCsv", Some(anyhow::anyhow!("{}", e)))
        })?;
    }
    writer
        .into_inner()
        .map_err(|e| CrawlError::export("WriteCsv", Some(anyhow::anyhow!("{}", e))))
}

/// Serializes records as a 2-space indented JSON array.
pub fn to_json(records: &[ProductRecord]) -> Result<Vec<u8>, CrawlError> {
    serde_json::to_vec_pretty(records)
        .map_err(|e| CrawlError::export("WriteJson", Some(anyhow::anyhow!("{}", e))))
}

/// Serializes records in the given format.
pub fn export(records: &[ProductRecord], format: ExportFormat) -> Result<Vec<u8>, CrawlError> {
    match format {
        ExportFormat::Csv => to_csv(records),
        ExportFormat::Json => to_json(records),
    }
}

/// Download file name for a job: `danawa_results_<first 8 chars of id>.<ext>`.
pub fn default_filename(job_id: &str, format: ExportFormat) -> String {
    let short: String = job_id.chars().take(8).collect();
    format!("danawa_results_{}.{}", short, format.extension())
}
