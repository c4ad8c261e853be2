use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_postgres::Client;

use crate::test_utils::database::TEST_DATABASE_SCHEMA;
use crate::types::TableName;

/// Returns a [`TableName`] in the test schema.
pub fn test_table_name(name: &str) -> TableName {
    TableName::new(Some(TEST_DATABASE_SCHEMA.to_owned()), name.to_owned())
}

/// Column type of `archived_on` in a test table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivedOnColumn {
    Timestamp,
    TimestampTz,
    Missing,
}

/// Creates an archive table with the `id`, `archived_on` and `data` columns.
///
/// # Panics
///
/// Panics if the table cannot be created.
pub async fn create_archive_table(
    client: &Client,
    table: &TableName,
    archived_on: ArchivedOnColumn,
) {
    let archived_on_column = match archived_on {
        ArchivedOnColumn::Timestamp => ", archived_on timestamp",
        ArchivedOnColumn::TimestampTz => ", archived_on timestamptz",
        ArchivedOnColumn::Missing => "",
    };

    client
        .execute(
            &format!(
                "create table {} (id bigint primary key{archived_on_column}, data jsonb)",
                table.as_quoted_identifier()
            ),
            &[],
        )
        .await
        .expect("Failed to create archive table");
}

/// Inserts `(id, archived_on, data)` rows into a table created with a `timestamptz`
/// `archived_on` column.
///
/// # Panics
///
/// Panics if a row cannot be inserted.
pub async fn insert_archive_rows(
    client: &Client,
    table: &TableName,
    rows: &[(i64, Option<DateTime<Utc>>, Value)],
) {
    let statement = format!(
        "insert into {} (id, archived_on, data) values ($1, $2, $3)",
        table.as_quoted_identifier()
    );

    for (id, archived_on, data) in rows {
        client
            .execute(&statement, &[id, archived_on, data])
            .await
            .expect("Failed to insert archive row");
    }
}
