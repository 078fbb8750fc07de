//! SQLite implementation of [`QueryBackend`].
//!
//! The connection is opened read-only; statements that SQLite reports as
//! writing are refused before stepping.

use std::fmt::Write;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::debug;

use super::{QueryBackend, QueryOutput, Row};
use crate::error::DatabaseError;

/// Default database location relative to the working directory.
pub const DEFAULT_DB_PATH: &str = "data/northwind.sqlite";

/// Read-only SQLite database.
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    /// Opens an existing database file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::NotFound`] if the file does not exist and
    /// [`DatabaseError::Sqlite`] if it cannot be opened.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if !path.is_file() {
            return Err(DatabaseError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        debug!(path = %path.display(), "opened database read-only");
        Ok(Self { conn })
    }

    /// Returns up to `limit` rows from `table`.
    #[must_use]
    pub fn sample(&self, table: &str, limit: usize) -> QueryOutput {
        self.execute(&format!("SELECT * FROM {} LIMIT {limit}", quote_ident(table)))
    }

    /// Names of every table and view, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] if `sqlite_master` cannot be read.
    pub fn table_names(&self) -> Result<Vec<String>, DatabaseError> {
        Ok(self.objects()?.into_iter().map(|(name, _)| name).collect())
    }

    fn run(&self, sql: &str) -> Result<QueryOutput, rusqlite::Error> {
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Ok(QueryOutput::failure(
                "attempt to write a readonly database",
            ));
        }

        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut record = Row::new();
            for (idx, name) in columns.iter().enumerate() {
                record.insert(name.clone(), to_json(row.get_ref(idx)?));
            }
            rows.push(record);
        }

        Ok(QueryOutput {
            columns,
            rows,
            error: None,
        })
    }

    fn objects(&self) -> Result<Vec<(String, String)>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )?;
        let objects = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(objects)
    }

    fn columns(&self, table: &str) -> Result<Vec<(String, String, bool)>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let columns = stmt
            .query_map([], |row| {
                let pk: i64 = row.get(5)?;
                Ok((row.get(1)?, row.get(2)?, pk > 0))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

impl QueryBackend for SqliteDatabase {
    fn execute(&self, sql: &str) -> QueryOutput {
        match self.run(sql) {
            Ok(output) => output,
            Err(e) => QueryOutput::failure(e.to_string()),
        }
    }

    fn schema_description(&self) -> Result<String, DatabaseError> {
        let mut out = String::from("# Database Schema\n");
        for (name, kind) in self.objects()? {
            let label = if kind == "view" { "View" } else { "Table" };
            let _ = write!(out, "\n## {label}: {name}\nColumns:\n");
            for (column, ty, pk) in self.columns(&name)? {
                let marker = if pk { " (PRIMARY KEY)" } else { "" };
                let _ = writeln!(out, "  - {column}: {ty}{marker}");
            }
        }
        Ok(out)
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.conn.path())
            .finish()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}
