//! Offline CSV scoring.
//!
//! Each input row is one employee's attributes. Rows are scored with bounded
//! concurrency and written back in input order with `probability`,
//! `risk_level` and `error` columns appended. A failed row does not stop the
//! batch. The dashboard slots and the credit ledger are never touched.

use std::io::{Read, Write};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;

use crate::clients::AnalyticsService;
use crate::engine::with_timeout;
use crate::error::{Result, WhosNextError};
use crate::models::{AttributeValue, EmployeeRecord, PredictionRequest, PredictionResult};

/// Columns recognised as the employee identifier, in priority order.
const ID_COLUMNS: &[&str] = &["EmployeeNumber", "employee_id"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub rows: usize,
    pub scored: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub model_id: String,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

struct BatchRow {
    fields: csv::StringRecord,
    request: PredictionRequest,
}

fn id_column(headers: &csv::StringRecord) -> Option<usize> {
    ID_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
}

fn build_row(
    headers: &csv::StringRecord,
    id_index: Option<usize>,
    line: usize,
    fields: csv::StringRecord,
    model_id: &str,
) -> BatchRow {
    let employee_id = id_index
        .and_then(|i| fields.get(i))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| line.to_string());

    let mut features = EmployeeRecord::new();
    for (i, (name, raw)) in headers.iter().zip(fields.iter()).enumerate() {
        if Some(i) == id_index || raw.trim().is_empty() {
            continue;
        }
        features.insert(name.trim().to_string(), AttributeValue::parse(raw));
    }

    BatchRow {
        fields,
        request: PredictionRequest {
            employee_id,
            model_id: model_id.to_string(),
            features,
        },
    }
}

async fn score_row(
    service: &dyn AnalyticsService,
    request: &PredictionRequest,
    timeout: Duration,
) -> Result<PredictionResult> {
    let result = with_timeout("predict", timeout, service.predict(request)).await?;
    result.validate()?;
    Ok(result)
}

/// Score every row of `input` and write the annotated rows to `output`.
///
/// Malformed CSV is fatal; a row the service rejects is recorded in its
/// `error` column.
pub async fn score_csv<R, W>(
    service: &dyn AnalyticsService,
    input: R,
    output: W,
    options: &BatchOptions,
) -> Result<BatchSummary>
where
    R: Read,
    W: Write,
{
    let mut reader = csv::ReaderBuilder::new().flexible(false).from_reader(input);
    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(WhosNextError::invalid("input CSV has no header row"));
    }
    let id_index = id_column(&headers);
    if id_index.is_none() {
        tracing::info!("no employee id column, using row numbers as ids");
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        rows.push(build_row(&headers, id_index, i + 1, record?, &options.model_id));
    }

    let concurrency = options.concurrency.max(1);
    tracing::info!(
        "scoring {} rows with {} (concurrency {})",
        rows.len(),
        options.model_id,
        concurrency
    );

    let mut outcomes = stream::iter(rows.iter())
        .map(|row| score_row(service, &row.request, options.request_timeout))
        .buffered(concurrency);

    let mut writer = csv::Writer::from_writer(output);
    let mut out_headers = headers.clone();
    out_headers.push_field("probability");
    out_headers.push_field("risk_level");
    out_headers.push_field("error");
    writer.write_record(&out_headers)?;

    let mut summary = BatchSummary::default();
    let mut row_iter = rows.iter();
    while let Some(outcome) = outcomes.next().await {
        let Some(row) = row_iter.next() else { break };
        let mut record = row.fields.clone();
        summary.rows += 1;
        match outcome {
            Ok(result) => {
                summary.scored += 1;
                record.push_field(&format!("{:.4}", result.probability));
                record.push_field(&result.risk_level.to_string());
                record.push_field("");
            }
            Err(err) => {
                summary.failed += 1;
                tracing::warn!("row {} failed: {}", row.request.employee_id, err);
                record.push_field("");
                record.push_field("");
                record.push_field(&err.to_string());
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    tracing::info!(
        "batch complete: {} rows, {} scored, {} failed",
        summary.rows,
        summary.scored,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(names.to_vec())
    }

    #[test]
    fn id_column_prefers_employee_number() {
        assert_eq!(id_column(&headers(&["Age", "employee_id", "EmployeeNumber"])), Some(2));
        assert_eq!(id_column(&headers(&["Age", "employee_id"])), Some(1));
        assert_eq!(id_column(&headers(&["Age"])), None);
    }

    #[test]
    fn build_row_skips_id_and_blank_cells() {
        let h = headers(&["EmployeeNumber", "Age", "OverTime", "Department"]);
        let row = build_row(
            &h,
            Some(0),
            1,
            csv::StringRecord::from(vec!["1042", "35", "Yes", ""]),
            "RandomForest",
        );
        assert_eq!(row.request.employee_id, "1042");
        assert_eq!(row.request.model_id, "RandomForest");
        assert_eq!(row.request.features.len(), 2);
        assert_eq!(row.request.features["Age"], AttributeValue::Number(35.0));
        assert_eq!(row.request.features["OverTime"], AttributeValue::from("Yes"));
    }

    #[test]
    fn missing_id_falls_back_to_line_number() {
        let h = headers(&["Age"]);
        let row = build_row(&h, None, 7, csv::StringRecord::from(vec!["29"]), "m");
        assert_eq!(row.request.employee_id, "7");
    }
}
