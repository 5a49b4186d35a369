// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting for `mockmeshctl`'s mapping and backup listings.

use mm_core::{BackupRecord, Stub};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Supported output formats for CLI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Compact JSON (single line).
    Json,
    /// Pretty-printed JSON.
    JsonPretty,
    /// Key-value aligned table.
    Table,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Json => "json",
            Self::JsonPretty => "json-pretty",
            Self::Table => "table",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "json-pretty" | "json_pretty" => Ok(Self::JsonPretty),
            "table" => Ok(Self::Table),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_default()
    } else {
        serde_json::to_string(value).unwrap_or_default()
    }
}

/// Renders a list of mappings in the given format.
pub fn format_mappings(format: OutputFormat, stubs: &[Stub]) -> String {
    match format {
        OutputFormat::Json => to_json(&stubs, false),
        OutputFormat::JsonPretty => to_json(&stubs, true),
        OutputFormat::Table => {
            let mut lines = vec![format!("{:<36} {:<8} {:<40} {}", "id", "method", "path", "status")];
            for stub in stubs {
                lines.push(format!(
                    "{:<36} {:<8} {:<40} {}",
                    stub.id, stub.match_spec.method, stub.match_spec.url_path, stub.response_spec.status
                ));
            }
            lines.join("\n")
        }
    }
}

/// Renders one mapping in the given format.
pub fn format_mapping(format: OutputFormat, stub: &Stub) -> String {
    match format {
        OutputFormat::Json => to_json(stub, false),
        OutputFormat::JsonPretty => to_json(stub, true),
        OutputFormat::Table => format!(
            "id      {}\nmethod  {}\npath    {}\nstatus  {}",
            stub.id, stub.match_spec.method, stub.match_spec.url_path, stub.response_spec.status
        ),
    }
}

/// Renders a list of backup records in the given format.
pub fn format_backups(format: OutputFormat, records: &[BackupRecord]) -> String {
    match format {
        OutputFormat::Json => to_json(&records, false),
        OutputFormat::JsonPretty => to_json(&records, true),
        OutputFormat::Table => {
            let mut lines = vec![format!("{:<30} {:<10} {}", "timestamp", "bytes", "path")];
            for record in records {
                lines.push(format!("{:<30} {:<10} {}", record.timestamp.to_rfc3339(), record.bytes, record.relative_path));
            }
            lines.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_display_roundtrips() {
        for fmt in &[OutputFormat::Json, OutputFormat::JsonPretty, OutputFormat::Table] {
            let s = fmt.to_string();
            let parsed: OutputFormat = s.parse().unwrap();
            assert_eq!(parsed, *fmt);
        }
    }

    #[test]
    fn output_format_from_str_rejects_unknown() {
        assert!("nope".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn format_mappings_table_lists_every_stub() {
        let stub = Stub {
            id: "abc".to_string(),
            name: "n".to_string(),
            match_spec: mm_core::MatchSpec {
                method: "GET".to_string(),
                url_path: "/a".to_string(),
                query_parameters: None,
                headers: None,
                body_patterns: None,
            },
            response_spec: mm_core::ResponseSpec { status: 200, headers: None, json_body: None, body: None },
            metadata: mm_core::Provenance {
                generated_by: "test".to_string(),
                generated_at: chrono::Utc::now(),
                request_hash: "abc".to_string(),
                original_path: "/a".to_string(),
            },
        };
        let table = format_mappings(OutputFormat::Table, std::slice::from_ref(&stub));
        assert!(table.contains("abc"));
        assert!(table.contains("GET"));
    }
}
