// SQLite row sink
//
// A dedicated OS thread owns the rusqlite::Connection. Async callers send
// DbCommand messages over a bounded std channel and await a oneshot reply, so
// the tokio executor never runs SQLite itself.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use weatherpair_config::SqliteConfig;
use weatherpair_core::{DeviceSlot, RowSink, SinkError, SlotRow};

use crate::WriterError;

const COMMAND_QUEUE_DEPTH: usize = 64;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS esp1 (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        temperature REAL,
        humidity    REAL,
        pressure    REAL,
        date        TEXT NOT NULL,
        hour        TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS esp2 (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        temperature REAL,
        humidity    REAL,
        pressure    REAL,
        date        TEXT NOT NULL,
        hour        TEXT NOT NULL
    );";

enum DbCommand {
    Insert {
        row: SlotRow,
        reply: oneshot::Sender<Result<(), WriterError>>,
    },
    Ping {
        reply: oneshot::Sender<Result<(), WriterError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), WriterError>>,
    },
}

/// Row sink backed by one SQLite table per device slot.
///
/// Cloning only clones the channel handle. The writer thread exits once every
/// clone has been dropped, or on [`SqliteSink::close`] which affects all clones.
#[derive(Clone)]
pub struct SqliteSink {
    tx: SyncSender<DbCommand>,
}

impl SqliteSink {
    /// Open (or create) the database described by `config` and start the
    /// writer thread.
    pub fn open(config: &SqliteConfig) -> Result<Self, WriterError> {
        Self::open_path(&config.path, config.busy_timeout())
    }

    pub fn open_path(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, WriterError> {
        let path = path.as_ref();
        let open_err = |source| WriterError::Open {
            path: path.display().to_string(),
            source,
        };

        let conn = Connection::open(path).map_err(open_err)?;
        conn.busy_timeout(busy_timeout).map_err(open_err)?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(open_err)?;
        conn.execute_batch(SCHEMA).map_err(WriterError::Schema)?;

        let (tx, rx) = sync_channel(COMMAND_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("weatherpair-sqlite".to_string())
            .spawn(move || run_writer(conn, rx))
            .map_err(WriterError::Spawn)?;

        info!(
            path = %path.display(),
            journal_mode = %journal_mode,
            busy_timeout_ms = busy_timeout.as_millis() as u64,
            "Opened SQLite database"
        );
        Ok(Self { tx })
    }

    /// Insert one row into its slot's table.
    pub async fn insert(&self, row: SlotRow) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DbCommand::Insert { row, reply })
            .map_err(|_| WriterError::Shutdown)?;
        rx.await.map_err(|_| WriterError::Shutdown)?
    }

    /// Round-trip a trivial query through the writer thread.
    pub async fn check(&self) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DbCommand::Ping { reply })
            .map_err(|_| WriterError::Shutdown)?;
        rx.await.map_err(|_| WriterError::Shutdown)?
    }

    /// Close the connection and stop the writer thread.
    ///
    /// Commands queued before this one are still executed. Returns once the
    /// connection is closed; later writes fail with [`WriterError::Shutdown`].
    pub async fn close(&self) -> Result<(), WriterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(DbCommand::Close { reply })
            .map_err(|_| WriterError::Shutdown)?;
        rx.await.map_err(|_| WriterError::Shutdown)?
    }
}

#[async_trait]
impl RowSink for SqliteSink {
    async fn write_row(&self, row: &SlotRow) -> Result<(), SinkError> {
        self.insert(row.clone()).await.map_err(SinkError::from)
    }

    async fn ping(&self) -> Result<(), SinkError> {
        self.check().await.map_err(SinkError::from)
    }

    async fn close(&self) -> Result<(), SinkError> {
        SqliteSink::close(self).await.map_err(SinkError::from)
    }
}

fn insert_sql(slot: DeviceSlot) -> &'static str {
    match slot {
        DeviceSlot::First => {
            "INSERT INTO esp1 (temperature, humidity, pressure, date, hour) VALUES (?1, ?2, ?3, ?4, ?5)"
        }
        DeviceSlot::Second => {
            "INSERT INTO esp2 (temperature, humidity, pressure, date, hour) VALUES (?1, ?2, ?3, ?4, ?5)"
        }
    }
}

fn run_writer(conn: Connection, rx: Receiver<DbCommand>) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            DbCommand::Insert { row, reply } => {
                let m = row.measurements;
                let result = conn
                    .prepare_cached(insert_sql(row.slot))
                    .and_then(|mut stmt| {
                        stmt.execute(params![
                            m.temperature,
                            m.humidity,
                            m.pressure,
                            row.stamp.date,
                            row.stamp.hour
                        ])
                    })
                    .map(|_| ())
                    .map_err(|source| WriterError::Insert {
                        slot: row.slot,
                        source,
                    });
                let _ = reply.send(result);
            }

            DbCommand::Ping { reply } => {
                let result = conn
                    .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map(|_| ())
                    .map_err(WriterError::Ping);
                let _ = reply.send(result);
            }

            DbCommand::Close { reply } => {
                let result = conn.close().map_err(|(_, e)| WriterError::Close(e));
                debug!("SQLite writer thread closed its connection");
                let _ = reply.send(result);
                return;
            }
        }
    }
    debug!("SQLite writer thread exiting");
}
