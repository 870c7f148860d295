//! SQLite-backed persistence sink for the call log.
//!
//! Owns a `sqlx` connection pool, fully async and `Send`-safe with no
//! `spawn_blocking`, the way the teacher's `call-engine::database`
//! `DatabaseManager` is built. Subscribes to the domain event bus and
//! translates each event into an insert or update against the `call_log`
//! table; query methods (`list`/`get`/`delete`/`stats_over_days`) run
//! against the same pool and are the authoritative source for historical
//! call queries.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::bus::EventBus;
use crate::error::{EventsError, EventsResult};
use crate::types::{CallRecord, CallStatus, DomainEvent};

/// Aggregate counts over a trailing window, used by monitoring/UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallStats {
    pub total: i64,
    pub completed: i64,
    pub missed: i64,
    pub failed: i64,
    pub rejected: i64,
    pub total_duration_seconds: i64,
}

pub struct PersistenceSink {
    pool: SqlitePool,
    task: JoinHandle<()>,
}

impl PersistenceSink {
    /// Connect (creating the file if absent), run migrations, and spawn the
    /// subscriber task that keeps the call log in sync with the bus.
    pub async fn connect(database_url: &str, bus: &EventBus) -> EventsResult<Self> {
        info!(database_url, "connecting call-log database");
        let pool = SqlitePool::connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let sink_pool = pool.clone();
        let mut subscriber = bus.subscribe();
        let task = tokio::spawn(async move {
            while let Some(event) = subscriber.recv().await {
                if let Err(err) = handle_event(&sink_pool, &event).await {
                    error!(?err, "failed to persist domain event");
                }
            }
            debug!("persistence sink subscriber task ending: bus closed");
        });

        Ok(Self { pool, task })
    }

    pub fn query_handle(&self) -> PersistenceQuery {
        PersistenceQuery {
            pool: self.pool.clone(),
        }
    }

    /// Stop accepting further events; already-applied writes are retained.
    pub async fn shutdown(self) {
        self.task.abort();
        let _ = self.task.await;
        self.pool.close().await;
    }
}

async fn handle_event(pool: &SqlitePool, event: &DomainEvent) -> EventsResult<()> {
    match event {
        DomainEvent::CallStarted {
            record_id,
            direction,
            caller_id,
            dialed_number,
            destination,
            speed_dial_code,
            ..
        } => {
            sqlx::query(
                "INSERT INTO call_log \
                 (id, timestamp, direction, status, caller_id, dialed_number, destination, speed_dial_code, duration_seconds, error_message) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, NULL)",
            )
            .bind(record_id)
            .bind(Utc::now().to_rfc3339())
            .bind(direction.as_str())
            .bind(CallStatus::InProgress.as_str())
            .bind(caller_id)
            .bind(dialed_number)
            .bind(destination)
            .bind(speed_dial_code)
            .execute(pool)
            .await?;
            Ok(())
        }
        DomainEvent::CallEnded {
            record_id,
            status,
            duration_seconds,
            error_message,
        } => {
            sqlx::query(
                "UPDATE call_log SET status = ?1, duration_seconds = ?2, error_message = ?3 \
                 WHERE id = ?4 AND status = 'InProgress'",
            )
            .bind(status.as_str())
            .bind(duration_seconds)
            .bind(error_message)
            .bind(record_id)
            .execute(pool)
            .await?;
            Ok(())
        }
        // Other event kinds (PhoneStateChanged, DigitDialed, CallLogUpdated,
        // ConfigChanged) carry nothing the call-log schema persists.
        _ => Ok(()),
    }
}

/// Read-side query API against the call-log table. Cloneable; cheap, since
/// it only holds a pool handle.
#[derive(Clone)]
pub struct PersistenceQuery {
    pool: SqlitePool,
}

impl PersistenceQuery {
    pub async fn list(&self, limit: i64, offset: i64) -> EventsResult<Vec<CallRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, direction, status, caller_id, dialed_number, destination, \
             speed_dial_code, duration_seconds, error_message \
             FROM call_log ORDER BY id DESC LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_record).collect()
    }

    pub async fn get(&self, id: i64) -> EventsResult<Option<CallRecord>> {
        let row = sqlx::query(
            "SELECT id, timestamp, direction, status, caller_id, dialed_number, destination, \
             speed_dial_code, duration_seconds, error_message \
             FROM call_log WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn delete(&self, id: i64) -> EventsResult<bool> {
        let result = sqlx::query("DELETE FROM call_log WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn stats_over_days(&self, days: i64) -> EventsResult<CallStats> {
        let row = sqlx::query(
            "SELECT \
                COUNT(*) AS total, \
                SUM(CASE WHEN status = 'Completed' THEN 1 ELSE 0 END) AS completed, \
                SUM(CASE WHEN status = 'Missed' THEN 1 ELSE 0 END) AS missed, \
                SUM(CASE WHEN status = 'Failed' THEN 1 ELSE 0 END) AS failed, \
                SUM(CASE WHEN status = 'Rejected' THEN 1 ELSE 0 END) AS rejected, \
                COALESCE(SUM(duration_seconds), 0) AS total_duration_seconds \
             FROM call_log \
             WHERE timestamp >= datetime('now', ?1)",
        )
        .bind(format!("-{days} days"))
        .fetch_one(&self.pool)
        .await?;

        Ok(CallStats {
            total: row.try_get::<i64, _>("total")?,
            completed: row.try_get::<Option<i64>, _>("completed")?.unwrap_or(0),
            missed: row.try_get::<Option<i64>, _>("missed")?.unwrap_or(0),
            failed: row.try_get::<Option<i64>, _>("failed")?.unwrap_or(0),
            rejected: row.try_get::<Option<i64>, _>("rejected")?.unwrap_or(0),
            total_duration_seconds: row.try_get::<i64, _>("total_duration_seconds")?,
        })
    }
}


fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> EventsResult<CallRecord> {
    let timestamp_text: String = row.try_get("timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| EventsError::Database(sqlx::Error::Decode(Box::new(e))))?;

    let direction_text: String = row.try_get("direction")?;
    let direction = crate::types::Direction::from_str(&direction_text)
        .ok_or_else(|| EventsError::Database(sqlx::Error::ColumnDecode {
            index: "direction".into(),
            source: "unrecognised direction value".into(),
        }))?;

    let status_text: String = row.try_get("status")?;
    let status = CallStatus::from_str(&status_text).ok_or_else(|| {
        EventsError::Database(sqlx::Error::ColumnDecode {
            index: "status".into(),
            source: "unrecognised status value".into(),
        })
    })?;

    Ok(CallRecord {
        id: row.try_get("id")?,
        timestamp,
        direction,
        status,
        caller_id: row.try_get("caller_id")?,
        dialed_number: row.try_get("dialed_number")?,
        destination: row.try_get("destination")?,
        speed_dial_code: row.try_get("speed_dial_code")?,
        duration_seconds: row.try_get("duration_seconds")?,
        error_message: row.try_get("error_message")?,
    })
}
