/// Read-only export projections of the event log
use crate::{
    error::VerifyLogResult,
    event_log::{DeliveryPayload, VerificationLogRecord},
};
use serde::Serialize;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Serialize)]
struct ExportedRecord<'a> {
    id: i64,
    timestamp: i64,
    synced: bool,
    data: &'a DeliveryPayload,
}

/// Render records using the given format
pub fn export(records: &[VerificationLogRecord], format: ExportFormat) -> VerifyLogResult<String> {
    match format {
        ExportFormat::Json => to_json(records),
        ExportFormat::Csv => Ok(to_csv(records)),
    }
}

/// Pretty-printed JSON array with payloads reconstituted
pub fn to_json(records: &[VerificationLogRecord]) -> VerifyLogResult<String> {
    let payloads: Vec<DeliveryPayload> = records.iter().map(|r| r.delivery_payload()).collect();
    let exported: Vec<ExportedRecord<'_>> = records
        .iter()
        .zip(payloads.iter())
        .map(|(rec, data)| ExportedRecord {
            id: rec.id,
            timestamp: rec.timestamp,
            synced: rec.synced,
            data,
        })
        .collect();

    Ok(serde_json::to_string_pretty(&exported)?)
}

/// CSV table with the raw payload text in the last column
pub fn to_csv(records: &[VerificationLogRecord]) -> String {
    let mut out = String::from("id,timestamp,synced,payload\n");
    for rec in records {
        out.push_str(&format!(
            "{},{},{},{}\n",
            rec.id,
            rec.timestamp,
            rec.synced,
            csv_field(&rec.payload)
        ));
    }
    out
}

/// Quote a field when it contains a delimiter, quote or line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
