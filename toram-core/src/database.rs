use crate::error::{Result, ToramError};
use crate::models::RawRow;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use rusqlite::types::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a read waits for a pooled connection before giving up.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Read access to the legacy item tables.
///
/// `Database` is the production implementation; anything that can enumerate
/// tables, describe their columns and return their rows can stand in for it.
pub trait ItemStore {
    /// User tables in alphabetical order, `sqlite_%` internals excluded.
    fn table_names(&self) -> Result<Vec<String>>;

    /// Column names of `table` in declaration order.
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    /// Every row of `table` ordered by `order_by` ascending.
    fn fetch_rows(&self, table: &str, order_by: &str) -> Result<Vec<RawRow>>;

    fn row_count(&self, table: &str) -> Result<usize>;
}

pub struct Database {
    pool: Pool<SqliteConnectionManager>,
    path: PathBuf,
}

impl Database {
    /// Open the database file read-only. Nothing is ever written at runtime.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToramError::NotFound(format!(
                "Database file not found: {}",
                path.display()
            )));
        }
        if !path.is_file() {
            return Err(ToramError::NotFound(format!(
                "Database path is not a file: {}",
                path.display()
            )));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| {
                conn.pragma_update(None, "query_only", "ON")?;
                Ok(())
            });
        let pool = Pool::builder()
            .max_size(4)
            .connection_timeout(CONNECTION_TIMEOUT)
            .build(manager)
            .map_err(ToramError::Pool)?;

        tracing::debug!("Opened {} read-only", path.display());

        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(ToramError::Pool)
    }
}

impl ItemStore for Database {
    fn table_names(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(names)
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;

        let columns = stmt
            .query_map([], |row| row.get::<_, String>("name"))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(columns)
    }

    fn fetch_rows(&self, table: &str, order_by: &str) -> Result<Vec<RawRow>> {
        let conn = self.connection()?;
        let sql = format!(
            "SELECT * FROM {} ORDER BY {}",
            quote_identifier(table),
            order_expression(order_by)
        );
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map([], |row| {
                let mut raw = RawRow::new();
                for (idx, name) in names.iter().enumerate() {
                    raw.insert(name.clone(), row.get::<_, Value>(idx)?);
                }
                Ok(raw)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn row_count(&self, table: &str) -> Result<usize> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

/// Stand-in for a database that could not be opened. Every read fails with
/// `Unavailable` carrying the open error, so the assembler reports it like any
/// other enumeration failure.
#[derive(Debug, Clone)]
pub struct Unreachable {
    reason: String,
}

impl Unreachable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }

    fn error(&self) -> ToramError {
        ToramError::Unavailable(self.reason.clone())
    }
}

impl ItemStore for Unreachable {
    fn table_names(&self) -> Result<Vec<String>> {
        Err(self.error())
    }

    fn table_columns(&self, _table: &str) -> Result<Vec<String>> {
        Err(self.error())
    }

    fn fetch_rows(&self, _table: &str, _order_by: &str) -> Result<Vec<RawRow>> {
        Err(self.error())
    }

    fn row_count(&self, _table: &str) -> Result<usize> {
        Err(self.error())
    }
}

/// Open `path` as an item store.
///
/// In permissive mode an open failure is logged and replaced by an
/// [`Unreachable`] store, so listings come back empty with a diagnostic.
/// Otherwise the open error is returned.
pub fn open_store(path: &Path, permissive: bool) -> Result<Box<dyn ItemStore>> {
    match Database::open(path) {
        Ok(db) => Ok(Box::new(db)),
        Err(e) if permissive => {
            tracing::warn!("Cannot open {}: {}", path.display(), e);
            Ok(Box::new(Unreachable::new(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn order_expression(column: &str) -> String {
    if column.eq_ignore_ascii_case("rowid") {
        "rowid".to_string()
    } else {
        quote_identifier(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use tempfile::TempDir;

    fn fixture(sql: &str) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(sql).unwrap();
        (dir, path)
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Database::open(&dir.path().join("nope.db"));
        assert!(matches!(result, Err(ToramError::NotFound(_))));
    }

    #[test]
    fn test_open_directory_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let started = std::time::Instant::now();
        let result = Database::open(dir.path());
        assert!(matches!(result, Err(ToramError::NotFound(_))));
        assert!(started.elapsed() < CONNECTION_TIMEOUT);
    }

    #[test]
    fn test_open_store_permissive_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir.path().join("nope.db"), true).unwrap();
        let err = store.table_names().unwrap_err();
        assert!(matches!(err, ToramError::Unavailable(_)));
        assert!(err.to_string().contains("nope.db"));
        assert!(store.table_columns("xtal").is_err());
    }

    #[test]
    fn test_open_store_strict_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            open_store(&dir.path().join("nope.db"), false),
            Err(ToramError::NotFound(_))
        ));
        assert!(open_store(dir.path(), false).is_err());
    }

    #[test]
    fn test_open_store_reads_real_database() {
        let (_dir, path) = fixture("CREATE TABLE a (id INTEGER);");
        let store = open_store(&path, true).unwrap();
        assert_eq!(store.table_names().unwrap(), vec!["a"]);
    }

    #[test]
    fn test_table_names_sorted_without_internals() {
        let (_dir, path) = fixture(
            "CREATE TABLE zeta (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT);
             CREATE TABLE alpha (id INTEGER);
             INSERT INTO zeta (title) VALUES ('x');",
        );
        let db = Database::open(&path).unwrap();
        // AUTOINCREMENT creates sqlite_sequence
        assert_eq!(db.table_names().unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_table_columns_in_declaration_order() {
        let (_dir, path) = fixture("CREATE TABLE xtal (id INTEGER, title TEXT, div TEXT, column_11 TEXT);");
        let db = Database::open(&path).unwrap();
        assert_eq!(
            db.table_columns("xtal").unwrap(),
            vec!["id", "title", "div", "column_11"]
        );
    }

    #[test]
    fn test_fetch_rows_ordered_with_mixed_types() {
        let (_dir, path) = fixture(
            "CREATE TABLE xtal (id INTEGER, title TEXT, column_11 NUMERIC);
             INSERT INTO xtal VALUES (1, 'Zolban', 12);
             INSERT INTO xtal VALUES (2, 'Amalgam', NULL);",
        );
        let db = Database::open(&path).unwrap();
        let rows = db.fetch_rows("xtal", "title").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("title").as_deref(), Some("Amalgam"));
        assert!(rows[0].get("column_11").is_none());
        assert_eq!(rows[1].get("column_11"), Some(&Value::Integer(12)));
    }

    #[test]
    fn test_fetch_rows_by_rowid() {
        let (_dir, path) = fixture(
            "CREATE TABLE misc (label TEXT);
             INSERT INTO misc VALUES ('b');
             INSERT INTO misc VALUES ('a');",
        );
        let db = Database::open(&path).unwrap();
        let rows = db.fetch_rows("misc", "rowid").unwrap();
        assert_eq!(rows[0].text("label").as_deref(), Some("b"));
        assert_eq!(db.row_count("misc").unwrap(), 2);
    }

    #[test]
    fn test_missing_table_is_an_error() {
        let (_dir, path) = fixture("CREATE TABLE a (id INTEGER);");
        let db = Database::open(&path).unwrap();
        assert!(db.fetch_rows("b", "id").is_err());
    }

    #[test]
    fn test_connection_is_read_only() {
        let (_dir, path) = fixture("CREATE TABLE a (id INTEGER);");
        let db = Database::open(&path).unwrap();
        let conn = db.connection().unwrap();
        assert!(conn.execute("INSERT INTO a VALUES (1)", []).is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("xtal"), "\"xtal\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }
}
