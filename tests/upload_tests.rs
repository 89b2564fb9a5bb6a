mod common;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use std::sync::Arc;

use bqframe::error::{ErrorKind, TransportError};
use bqframe::frame::Frame;
use bqframe::model::JobConfiguration;
use bqframe::schema::TableReference;
use bqframe::upload::{IfExists, Uploader};
use common::{connector, rows, schema, table, Call, MockTransport, QueryScript, PROJECT};

const FIELDS: &[(&str, &str)] = &[("id", "INTEGER"), ("name", "STRING")];

fn frame(n: i64) -> Frame {
    Frame::from_columns([
        ("id", Arc::new(Int64Array::from_iter_values(0..n)) as ArrayRef),
        (
            "name",
            Arc::new(StringArray::from_iter_values((0..n).map(|i| format!("row {i}")))) as ArrayRef,
        ),
    ])
    .unwrap()
}

fn partition_count(n: &str) -> QueryScript {
    QueryScript::paged(schema(&[("num_rows", "INTEGER")]), 1, vec![(None, rows(&[&[n]]), None)])
}

fn reference(table_id: &str) -> TableReference {
    TableReference::new(PROJECT, "d", table_id)
}

#[tokio::test]
async fn test_replace_partition_goes_through_temporary_table() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    let partition = reference("events$20240102");
    let report = uploader
        .upload(&frame(3), &partition, IfExists::Replace, Some(2))
        .await
        .unwrap();

    assert_eq!(report.rows_sent, 3);
    assert!(report.is_clean());

    let calls = mock.calls();

    let temp = calls
        .iter()
        .find_map(|c| match c {
            Call::InsertTable(t) => Some(t.clone()),
            _ => None,
        })
        .expect("temporary table created");
    assert!(temp.table_id.starts_with("events_20240102_"));
    assert_eq!(temp.dataset_id, "d");

    let inserts = mock.insert_all_calls();
    assert_eq!(inserts.len(), 2);
    assert!(inserts.iter().all(|(t, _)| *t == temp));
    assert!(inserts.iter().all(|(t, _)| !t.has_partition_decorator()));

    let truncates: Vec<_> = mock
        .posted_jobs()
        .into_iter()
        .filter_map(|job| match job.configuration {
            JobConfiguration::Query(q)
                if q.write_disposition.as_deref() == Some("WRITE_TRUNCATE") =>
            {
                Some(q)
            }
            _ => None,
        })
        .collect();
    assert_eq!(truncates.len(), 1);
    let overwrite = &truncates[0];
    assert_eq!(overwrite.destination_table.as_ref(), Some(&partition));
    assert_eq!(overwrite.create_disposition.as_deref(), Some("CREATE_IF_NEEDED"));
    assert_eq!(overwrite.allow_large_results, Some(true));
    assert_eq!(overwrite.use_legacy_sql, Some(false));
    assert_eq!(
        overwrite.query.as_deref(),
        Some(format!("select * from d.{}", temp.table_id).as_str())
    );

    let position = |pred: &dyn Fn(&Call) -> bool| calls.iter().position(|c| pred(c)).unwrap();
    let created_at = position(&|c| matches!(c, Call::InsertTable(_)));
    let first_insert_at = position(&|c| matches!(c, Call::InsertAll { .. }));
    let deleted_at = position(&|c| matches!(c, Call::DeleteTable(t) if *t == temp));
    assert!(created_at < first_insert_at);
    assert!(first_insert_at < deleted_at);
    assert_eq!(deleted_at, calls.len() - 1);

    assert!(!mock.has_table("d", &temp.table_id));
    assert!(mock.has_table("d", "events"));
}

#[tokio::test]
async fn test_partition_overwrite_waits_without_reading_rows() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    uploader
        .upload(&frame(2), &reference("events$20240102"), IfExists::Replace, None)
        .await
        .unwrap();

    // job_1 is the partition count, job_2 the overwrite.
    let overwrite_polls = mock.count(|c| {
        matches!(c, Call::GetQueryResults { job_id, max_results: Some(0), .. } if job_id == "job_2")
    });
    let overwrite_pages = mock.count(|c| {
        matches!(
            c,
            Call::GetQueryResults { job_id, max_results, .. }
                if job_id == "job_2" && *max_results != Some(0)
        )
    });
    assert_eq!(overwrite_polls, 1);
    assert_eq!(overwrite_pages, 0);
}

#[tokio::test]
async fn test_failed_overwrite_still_drops_temporary_table() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("5"));
    mock.fail_query(
        "select * from",
        TransportError::response(400, "Query error: quota exceeded", vec![]),
    );

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(2), &reference("events$20240102"), IfExists::Replace, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));

    let calls = mock.calls();
    let temp = calls
        .iter()
        .find_map(|c| match c {
            Call::InsertTable(t) => Some(t.clone()),
            _ => None,
        })
        .expect("temporary table created");

    assert_eq!(calls.last(), Some(&Call::DeleteTable(temp.clone())));
    assert!(!mock.has_table("d", &temp.table_id));
    assert_eq!(mock.insert_all_calls().len(), 1);
}

#[tokio::test]
async fn test_replace_partition_checks_schema_before_staging() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", &[("id", "INTEGER")], true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(2), &reference("events$20240102"), IfExists::Replace, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    assert_eq!(mock.count(|c| matches!(c, Call::InsertTable(_))), 0);
    assert!(mock.insert_all_calls().is_empty());
    assert_eq!(mock.posted_jobs().len(), 1);
}

#[tokio::test]
async fn test_partition_count_uses_legacy_sql() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("7"));

    let uploader = Uploader::new(connector(&mock));
    let count = uploader
        .partition_row_count(&reference("events$20240102"))
        .await
        .unwrap();
    assert_eq!(count, 7);

    let count_job = mock.posted_jobs().remove(0);
    let query = count_job.configuration.as_query().unwrap();
    assert_eq!(
        query.query.as_deref(),
        Some("SELECT COUNT(*) AS num_rows FROM [d.events$20240102]")
    );
    assert_eq!(query.use_legacy_sql, Some(true));
    assert_eq!(query.priority.as_deref(), Some("INTERACTIVE"));
}

#[tokio::test]
async fn test_empty_partition_gets_direct_insert() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("0"));

    let uploader = Uploader::new(connector(&mock));
    let partition = reference("events$20240102");
    uploader
        .upload(&frame(2), &partition, IfExists::Fail, None)
        .await
        .unwrap();

    let inserts = mock.insert_all_calls();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].0, partition);
    assert_eq!(inserts[0].1.len(), 2);
    assert_eq!(mock.count(|c| matches!(c, Call::InsertTable(_))), 0);
}

#[tokio::test]
async fn test_existing_partition_with_fail() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(2), &reference("events$20240102"), IfExists::Fail, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TableCreation);
    assert!(mock.insert_all_calls().is_empty());
}

#[tokio::test]
async fn test_append_partition_checks_schema() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", &[("id", "INTEGER")], true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(2), &reference("events$20240102"), IfExists::Append, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    assert!(err.to_string().contains("name"));
    assert!(mock.insert_all_calls().is_empty());
}

#[tokio::test]
async fn test_append_partition_inserts_into_partition() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, true));
    mock.script_query("COUNT(*)", partition_count("5"));

    let uploader = Uploader::new(connector(&mock));
    let partition = reference("events$20240102");
    uploader
        .upload(&frame(4), &partition, IfExists::Append, None)
        .await
        .unwrap();

    let inserts = mock.insert_all_calls();
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].0, partition);
}

#[tokio::test]
async fn test_partition_of_missing_table() {
    let mock = MockTransport::new();

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(1), &reference("events$20240102"), IfExists::Replace, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(mock.posted_jobs().is_empty());
}

#[tokio::test]
async fn test_partition_of_unpartitioned_table() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, false));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(1), &reference("events$20240102"), IfExists::Replace, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    assert!(mock.posted_jobs().is_empty());
}

#[tokio::test]
async fn test_new_table_is_created_with_dataset() {
    let mock = MockTransport::new();

    let uploader = Uploader::new(connector(&mock));
    uploader
        .upload(&frame(3), &reference("fresh"), IfExists::Fail, None)
        .await
        .unwrap();

    assert!(mock.has_table("d", "fresh"));
    assert_eq!(mock.count(|c| matches!(c, Call::InsertDataset(d) if d == "d")), 1);
    assert_eq!(mock.insert_all_calls().len(), 1);
}

#[tokio::test]
async fn test_existing_table_with_fail() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", FIELDS, false));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(1), &reference("events"), IfExists::Fail, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TableCreation);
    assert!(mock.insert_all_calls().is_empty());
}

#[tokio::test]
async fn test_replace_table_recreates_it() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", &[("id", "INTEGER")], false));

    let uploader = Uploader::new(connector(&mock));
    uploader
        .upload(&frame(2), &reference("events"), IfExists::Replace, None)
        .await
        .unwrap();

    let calls = mock.calls();
    let deleted_at = calls
        .iter()
        .position(|c| matches!(c, Call::DeleteTable(_)))
        .unwrap();
    let created_at = calls
        .iter()
        .position(|c| matches!(c, Call::InsertTable(_)))
        .unwrap();
    assert!(deleted_at < created_at);
    assert_eq!(mock.insert_all_calls().len(), 1);
}

#[tokio::test]
async fn test_append_table_checks_schema() {
    let mock = MockTransport::new();
    mock.add_table(table("d", "events", &[("id", "INTEGER")], false));

    let uploader = Uploader::new(connector(&mock));
    let err = uploader
        .upload(&frame(2), &reference("events"), IfExists::Append, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidSchema);
    assert!(err.to_string().contains("name STRING"));
    assert!(mock.insert_all_calls().is_empty());
    assert!(mock.posted_jobs().is_empty());
}
