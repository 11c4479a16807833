// 💾 Load & Export
// RawItems in (JSON array or JSON Lines), BatchResult out (JSON or flat CSV)

use crate::batch::{BatchResult, RawItem};
use crate::patterns::fields::{self, DERIVED_LOCATION_FIELDS};
use crate::patterns::PatternLibrary;
use crate::record::Record;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

// ============================================================================
// INPUT
// ============================================================================

/// Load RawItems from a file: a JSON array, or one JSON value per line.
pub fn load_items<P: AsRef<Path>>(path: P) -> Result<Vec<RawItem>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {:?}", path))?;

    parse_items(&content).with_context(|| format!("Invalid input file: {:?}", path))
}

/// Parse RawItems from a JSON array or JSON Lines.
///
/// Elements are converted leniently (see `RawItem::from_value`), so a
/// null or numeric element becomes an item that fails at run time rather
/// than a load error.
pub fn parse_items(content: &str) -> Result<Vec<RawItem>> {
    if content.trim_start().starts_with('[') {
        let values: Vec<Value> =
            serde_json::from_str(content).context("Failed to parse JSON array")?;
        return Ok(values.into_iter().map(RawItem::from_value).collect());
    }

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Value>(line)
                .map(RawItem::from_value)
                .with_context(|| format!("Failed to parse line {}", i + 1))
        })
        .collect()
}

// ============================================================================
// OUTPUT
// ============================================================================

pub fn write_json<P: AsRef<Path>>(result: &BatchResult, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    write_json_to(result, BufWriter::new(file))
}

pub fn write_json_to<W: Write>(result: &BatchResult, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, result).context("Failed to serialize batch result")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn write_csv<P: AsRef<Path>>(
    result: &BatchResult,
    library: &PatternLibrary,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    write_csv_to(result, library, file)
}

/// One row per record. Failures are not written; they are reported by the
/// caller from `BatchResult.failures`.
pub fn write_csv_to<W: Write>(
    result: &BatchResult,
    library: &PatternLibrary,
    writer: W,
) -> Result<()> {
    let columns = field_columns(library);
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header = vec!["index".to_string(), "source_id".to_string()];
    header.extend(columns.iter().cloned());
    header.extend(
        [
            "count_of_tenants",
            "auction_sites_count",
            "completeness",
            "needs_review",
            "missing_fields",
            "fingerprint",
        ]
        .map(String::from),
    );
    wtr.write_record(&header).context("Failed to write CSV header")?;

    for record in &result.records {
        wtr.write_record(row(record, &columns))
            .with_context(|| format!("Failed to write CSV row for item {}", record.index))?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// Declared fields in library order, then the derived location fields
fn field_columns(library: &PatternLibrary) -> Vec<String> {
    let mut columns: Vec<String> = library.field_names().map(String::from).collect();
    if library.get(fields::CITY_STATE_ZIP).is_some() {
        columns.extend(DERIVED_LOCATION_FIELDS.map(String::from));
    }
    columns
}

fn row(record: &Record, columns: &[String]) -> Vec<String> {
    let mut cells = vec![
        record.index.to_string(),
        record.source_id.clone().unwrap_or_default(),
    ];

    cells.extend(columns.iter().map(|name| {
        record
            .get(name)
            .map(|r| r.value.to_cell())
            .unwrap_or_default()
    }));

    cells.push(record.count_of_tenants.to_string());
    cells.push(record.auction_sites_count.to_string());
    cells.push(format!("{:.2}", record.completeness));
    cells.push(record.needs_review.to_string());
    cells.push(record.missing_fields().join("; "));
    cells.push(record.fingerprint.clone());
    cells
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchOptions, BatchRunner};
    use chrono::NaiveDate;

    fn run(items: &[RawItem]) -> BatchResult {
        let options = BatchOptions::default()
            .with_reference_date(NaiveDate::from_ymd_opt(2025, 3, 27).unwrap());
        BatchRunner::with_options(PatternLibrary::standard(), options).run_batch(items)
    }

    #[test]
    fn test_parse_json_array() {
        let items = parse_items(r#"[{"source_id": "a", "text": "one"}, "two", null]"#).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], RawItem::text("one").with_source("a"));
        assert_eq!(items[1], RawItem::text("two"));
        assert_eq!(items[2].payload, Value::Null);
    }

    #[test]
    fn test_parse_json_lines() {
        let content = "{\"payload\": \"first\"}\n\n   \n{\"payload\": 5, \"source_id\": \"b\"}\n";
        let items = parse_items(content).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_text(), Ok("first"));
        assert_eq!(items[1].source_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_parse_error_names_line() {
        let err = parse_items("{\"text\": \"ok\"}\n{broken").unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn test_load_items_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.jsonl");
        fs::write(&path, "\"Tenants: Ann Lee.\"\nnull\n").unwrap();

        let items = load_items(&path).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_load_items_missing_file() {
        let err = load_items("/definitely/not/here.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read input file"));
    }

    #[test]
    fn test_json_output_shape() {
        let result = run(&[RawItem::text("Tenants: Ann Lee."), RawItem::from_value(Value::Null)]);

        let mut buf = Vec::new();
        write_json_to(&result, &mut buf).unwrap();
        let json: Value = serde_json::from_slice(&buf).unwrap();

        assert_eq!(json["records"][0]["fields"]["all_tenants"]["value"][0], "Ann Lee");
        assert_eq!(json["records"][0]["fields"]["notice_date"]["value"], "");
        assert_eq!(json["records"][0]["fields"]["notice_date"]["provenance"], "none");
        assert_eq!(json["records"][0]["count_of_tenants"], 1);
        assert_eq!(json["failures"][0]["index"], 1);
    }

    #[test]
    fn test_json_round_trips_through_file() {
        let result = run(&[RawItem::text("Sale at 5 Oak Ave, Reno, NV 89501")]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");

        write_json(&result, &path).unwrap();
        let loaded: BatchResult = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, result);
    }

    #[test]
    fn test_csv_output() {
        let result = run(&[
            RawItem::text("Tenants: Ann Lee, Bo Chan. Bid at lockerfox.com").with_source("p1"),
            RawItem::from_value(Value::Null),
        ]);

        let mut buf = Vec::new();
        write_csv_to(&result, PatternLibrary::standard(), &mut buf).unwrap();

        let mut rdr = csv::Reader::from_reader(buf.as_slice());
        let headers = rdr.headers().unwrap().clone();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();

        assert_eq!(rows.len(), 1);
        let cell = |name: &str| {
            let pos = headers.iter().position(|h| h == name).unwrap();
            rows[0][pos].to_string()
        };

        assert_eq!(&headers[0], "index");
        assert_eq!(cell("source_id"), "p1");
        assert_eq!(cell("all_tenants"), "Ann Lee; Bo Chan");
        assert_eq!(cell("auction_sites"), "lockerfox.com");
        assert_eq!(cell("count_of_tenants"), "2");
        assert_eq!(cell("city"), "");
        assert!(cell("missing_fields").contains("street_address"));
    }
}
