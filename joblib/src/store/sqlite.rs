use super::{Execution, ExecutionStore, Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

/// An execution store backed by a single SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Column values as read back from sqlite, before decoding.
struct RawExecution {
    id: String,
    command: String,
    args: String,
    status: String,
    exit_code: i32,
    output_path: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RawExecution {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            command: row.get(1)?,
            args: row.get(2)?,
            status: row.get(3)?,
            exit_code: row.get(4)?,
            output_path: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn decode(self) -> Result<Execution> {
        Ok(Execution {
            id: self.id,
            command: self.command,
            args: serde_json::from_str(&self.args)?,
            status: self.status.parse()?,
            exit_code: self.exit_code,
            output_path: PathBuf::from(self.output_path),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl ExecutionStore for SqliteStore {
    fn migrate(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
              id TEXT PRIMARY KEY,
              command TEXT NOT NULL,
              args TEXT NOT NULL,
              status TEXT NOT NULL,
              exit_code INTEGER NOT NULL,
              output_path TEXT NOT NULL,
              created_at TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn get_execution(&self, id: &str) -> Result<Execution> {
        let raw = self
            .conn()
            .query_row(
                "SELECT id, command, args, status, exit_code, output_path, created_at, updated_at
                 FROM executions WHERE id = ?",
                params![id],
                RawExecution::from_row,
            )
            .optional()?;
        raw.ok_or_else(|| StoreError::NotFound(id.to_string()))?
            .decode()
    }

    fn create_execution(&self, execution: &Execution) -> Result<()> {
        let args = serde_json::to_string(&execution.args)?;
        let output_path = execution.output_path.to_string_lossy().into_owned();
        let inserted = self.conn().execute(
            "INSERT INTO executions
               (id, command, args, status, exit_code, output_path, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                execution.id,
                execution.command,
                args,
                execution.status.as_str(),
                execution.exit_code,
                output_path,
                execution.created_at,
                execution.updated_at,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => {
                Err(StoreError::Conflict(execution.id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn update_execution(&self, execution: &Execution) -> Result<()> {
        let args = serde_json::to_string(&execution.args)?;
        let output_path = execution.output_path.to_string_lossy().into_owned();
        let n = self.conn().execute(
            "UPDATE executions
             SET command = ?, args = ?, status = ?, exit_code = ?, output_path = ?, updated_at = ?
             WHERE id = ?",
            params![
                execution.command,
                args,
                execution.status.as_str(),
                execution.exit_code,
                output_path,
                Utc::now(),
                execution.id,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound(execution.id.clone()));
        }
        Ok(())
    }
}
