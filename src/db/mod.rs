//! Database module - SQLite storage for exercises, templates and workout sessions

mod models;

pub use models::*;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::de::DeserializeOwned;
use thiserror::Error;

const SETTINGS_ID: &str = "user_settings";

const SESSION_COLUMNS: &str = "id, template_id, date, start_time, end_time, exercises";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Workout session not found: ID {0}")]
    SessionNotFound(SessionId),
}

/// Record store the session core depends on
pub trait SessionStore {
    fn load_template(&self, id: TemplateId) -> Result<Option<WorkoutTemplate>, StoreError>;

    /// Insert a new session and return its id. A preset `session.id` is kept,
    /// otherwise the store assigns one.
    fn create_session(&self, session: &WorkoutSession) -> Result<SessionId, StoreError>;

    fn update_session(&self, id: SessionId, changes: &SessionChanges) -> Result<(), StoreError>;

    fn list_sessions(&self) -> Result<Vec<WorkoutSession>, StoreError>;

    /// Replace the whole session collection (remote resync)
    fn replace_sessions(&self, sessions: &[WorkoutSession]) -> Result<(), StoreError>;

    /// Delete a template together with every session derived from it
    fn delete_template(&self, id: TemplateId) -> Result<(), StoreError>;

    fn load_settings(&self) -> Result<Settings, StoreError>;

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}

/// Database wrapper
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Fresh database that lives as long as the value
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exercises (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS templates (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                date TEXT NOT NULL,
                exercises TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                template_id INTEGER NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT,
                exercises TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_template ON sessions(template_id);
            CREATE TABLE IF NOT EXISTS settings (
                id TEXT PRIMARY KEY,
                rest_time_secs INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Add new exercise
    pub fn add_exercise(&self, exercise: &Exercise) -> Result<ExerciseId, StoreError> {
        if exercise.name.trim().is_empty() {
            return Err(StoreError::InvalidRecord("exercise name is empty".to_string()));
        }
        self.conn.execute(
            "INSERT INTO exercises (name, category) VALUES (?1, ?2)",
            params![exercise.name.trim(), exercise.category.trim()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get all exercises
    pub fn get_exercises(&self) -> Result<Vec<Exercise>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, category FROM exercises ORDER BY id")?;
        let exercises = stmt
            .query_map([], |row| {
                Ok(Exercise {
                    id: Some(row.get(0)?),
                    name: row.get(1)?,
                    category: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(exercises)
    }

    pub fn get_exercises_by_category(&self, category: &str) -> Result<Vec<Exercise>, StoreError> {
        Ok(self
            .get_exercises()?
            .into_iter()
            .filter(|ex| ex.category.eq_ignore_ascii_case(category))
            .collect())
    }

    /// Delete an exercise. Sessions that reference it are left untouched.
    pub fn delete_exercise(&self, id: ExerciseId) -> Result<bool, StoreError> {
        let deleted = self
            .conn
            .execute("DELETE FROM exercises WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Add new workout template
    pub fn add_template(&self, template: &WorkoutTemplate) -> Result<TemplateId, StoreError> {
        if template.exercises.is_empty() {
            return Err(StoreError::InvalidRecord("template has no exercises".to_string()));
        }
        if let Some(ex) = template.exercises.iter().find(|ex| ex.planned_sets == 0) {
            return Err(StoreError::InvalidRecord(format!(
                "exercise {} needs at least one planned set",
                ex.exercise_id
            )));
        }
        self.conn.execute(
            "INSERT INTO templates (name, date, exercises) VALUES (?1, ?2, ?3)",
            params![
                template.name,
                template.date,
                serde_json::to_string(&template.exercises)?,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Get all workout templates
    pub fn get_templates(&self) -> Result<Vec<WorkoutTemplate>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, date, exercises FROM templates ORDER BY id")?;
        let templates = stmt
            .query_map([], template_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(templates)
    }

    pub fn get_session(&self, id: SessionId) -> Result<Option<WorkoutSession>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let session = self
            .conn
            .query_row(&sql, params![id], session_from_row)
            .optional()?;
        Ok(session)
    }

    fn insert_session(
        conn: &Connection,
        id: Option<SessionId>,
        session: &WorkoutSession,
    ) -> Result<SessionId, StoreError> {
        conn.execute(
            "INSERT INTO sessions (id, template_id, date, start_time, end_time, exercises)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                session.template_id,
                session.date,
                session.start_time,
                session.end_time,
                serde_json::to_string(&session.exercises)?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }
}

impl SessionStore for Database {
    fn load_template(&self, id: TemplateId) -> Result<Option<WorkoutTemplate>, StoreError> {
        let template = self
            .conn
            .query_row(
                "SELECT id, name, date, exercises FROM templates WHERE id = ?1",
                params![id],
                template_from_row,
            )
            .optional()?;
        Ok(template)
    }

    fn create_session(&self, session: &WorkoutSession) -> Result<SessionId, StoreError> {
        Self::insert_session(&self.conn, session.id, session)
    }

    fn update_session(&self, id: SessionId, changes: &SessionChanges) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let exists: bool = tx
            .query_row("SELECT 1 FROM sessions WHERE id = ?1", params![id], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::SessionNotFound(id));
        }
        if let Some(exercises) = &changes.exercises {
            tx.execute(
                "UPDATE sessions SET exercises = ?1 WHERE id = ?2",
                params![serde_json::to_string(exercises)?, id],
            )?;
        }
        if let Some(end_time) = changes.end_time {
            tx.execute(
                "UPDATE sessions SET end_time = ?1 WHERE id = ?2",
                params![end_time, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn list_sessions(&self) -> Result<Vec<WorkoutSession>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time, id");
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map([], session_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    fn replace_sessions(&self, sessions: &[WorkoutSession]) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM sessions", [])?;
        for session in sessions {
            Self::insert_session(&tx, session.id, session)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_template(&self, id: TemplateId) -> Result<(), StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM sessions WHERE template_id = ?1", params![id])?;
        tx.execute("DELETE FROM templates WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn load_settings(&self) -> Result<Settings, StoreError> {
        let settings = self
            .conn
            .query_row(
                "SELECT rest_time_secs FROM settings WHERE id = ?1",
                params![SETTINGS_ID],
                |row| {
                    Ok(Settings {
                        rest_time_secs: row.get(0)?,
                    })
                },
            )
            .optional()?;
        Ok(settings.unwrap_or_default())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        if settings.rest_time_secs == 0 {
            return Err(StoreError::InvalidRecord("rest time must be at least 1 second".to_string()));
        }
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (id, rest_time_secs) VALUES (?1, ?2)",
            params![SETTINGS_ID, settings.rest_time_secs],
        )?;
        Ok(())
    }
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn template_from_row(row: &Row) -> rusqlite::Result<WorkoutTemplate> {
    Ok(WorkoutTemplate {
        id: Some(row.get(0)?),
        name: row.get(1)?,
        date: row.get(2)?,
        exercises: json_column(row, 3)?,
    })
}

fn session_from_row(row: &Row) -> rusqlite::Result<WorkoutSession> {
    Ok(WorkoutSession {
        id: Some(row.get(0)?),
        template_id: row.get(1)?,
        date: row.get(2)?,
        start_time: row.get(3)?,
        end_time: row.get(4)?,
        exercises: json_column(row, 5)?,
    })
}
