use chrono::{DateTime, Utc};
use serde_json::Value;

use super::types::{EntityType, ExportFile};
use crate::error::{Error, Result};

/// Flattens fetched documents into a CSV file.
///
/// Columns are the union of top-level keys in first-seen order; nested values are
/// written as compact JSON and missing keys as empty cells.
pub fn build_csv_export(
    entity_type: EntityType,
    documents: &[Value],
    now: DateTime<Utc>,
) -> Result<ExportFile> {
    let mut columns: Vec<String> = Vec::new();
    for document in documents {
        if let Some(map) = document.as_object() {
            for key in map.keys() {
                if !columns.iter().any(|column| column == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    if !columns.is_empty() {
        writer
            .write_record(&columns)
            .map_err(|err| Error::Internal(format!("failed writing export header: {err}")))?;
    }

    for document in documents {
        let row: Vec<String> = columns
            .iter()
            .map(|column| document.get(column).map(cell).unwrap_or_default())
            .collect();
        writer
            .write_record(&row)
            .map_err(|err| Error::Internal(format!("failed writing export row: {err}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| Error::Internal(format!("failed flushing export: {err}")))?;
    let content = String::from_utf8(bytes)
        .map_err(|err| Error::Internal(format!("export is not valid utf-8: {err}")))?;

    Ok(ExportFile {
        filename: format!("{}s-export-{}.csv", entity_type, now.format("%Y-%m-%d")),
        content_type: "text/csv".to_owned(),
        rows: documents.len(),
        content,
    })
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn writes_union_of_columns_and_quotes_commas() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let documents = vec![
            json!({"id": "d1", "amount": 150, "donor": "Ayse, K."}),
            json!({"id": "d2", "currency": "TRY"}),
        ];

        let export = build_csv_export(EntityType::Donation, &documents, now).expect("export");
        assert_eq!(export.filename, "donations-export-2024-03-09.csv");
        assert_eq!(export.rows, 2);

        let lines: Vec<&str> = export.content.lines().collect();
        assert_eq!(lines.len(), 3);
        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header.len(), 4);
        assert!(header.contains(&"currency"));
        assert!(lines.iter().any(|line| line.contains("\"Ayse, K.\"")));
    }

    #[test]
    fn empty_export_has_no_content() {
        let export = build_csv_export(EntityType::AidApplication, &[], Utc::now()).expect("export");
        assert!(export.content.is_empty());
        assert!(export.filename.starts_with("aid-applications-export-"));
    }
}
