use crate::error::Error;
use crate::options::MemoryOptions;
use crate::statement::{ARRIVAL_TIME, Statement};

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tabular_spi::{
    AppendOptions, Column, ColumnType, Columns, Context, ExecResult, Inflight, Postflight,
    StatementType, TableType, TimeFormat, Tz, Value, check_arity,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

struct StoredRow {
    arrival: DateTime<Utc>,
    values: Vec<Value>,
}

struct Table {
    name: String,
    table_type: TableType,
    columns: Columns,
    rows: Vec<StoredRow>,
}

struct Flight {
    statement_type: StatementType,
    sql_text: String,
    started: Instant,
}

/// What a statement produced.
#[derive(Debug)]
pub enum Outcome {
    Affected(ExecResult),
    Fetched { columns: Columns, rows: Vec<Vec<Value>> },
}

/// Per-flush counts of an appender.
#[derive(Debug, Default)]
pub struct Flushed {
    pub success: u64,
    pub fail: u64,
    pub reason: Option<String>,
}

/// Everything a server owns; shared by its clients, connections, cursors and appenders.
pub struct State {
    pub options: MemoryOptions,
    tables: RwLock<HashMap<String, Table>>,
    flights: Mutex<HashMap<Uuid, Flight>>,
    postflights: Mutex<BTreeMap<String, Postflight>>,
    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    started: Instant,
}

impl State {
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            options,
            tables: RwLock::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
            postflights: Mutex::new(BTreeMap::new()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
            started: Instant::now(),
        }
    }

    /// Returns false if already running.
    pub fn start(&self) -> bool {
        let mut shutdown = self.shutdown.lock();
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }
        if shutdown.is_cancelled() {
            *shutdown = CancellationToken::new();
        }
        true
    }

    /// Returns false if not running.
    pub fn stop(&self) -> bool {
        let shutdown = self.shutdown.lock();
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        shutdown.cancel();
        true
    }

    pub fn ensure_running(&self) -> Result<(), Error> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotRunning)
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// One simulated network exchange. Unwinds on context cancellation or server shutdown.
    pub async fn round_trip(&self, ctx: &Context) -> tabular_spi::Result<()> {
        self.ensure_running()?;
        let shutdown = self.shutdown.lock().clone();
        let latency = self.options.latency;
        ctx.run(async move {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => Err(tabular_spi::Error::UserCancel),
                () = tokio::time::sleep(latency) => Ok(()),
            }
        })
        .await
        .inspect_err(|e| debug!("round trip abandoned: {e}"))
    }

    /// Registers an in-flight operation until the returned lease is released.
    pub fn begin(self: &Arc<Self>, statement_type: StatementType, sql_text: &str) -> Lease {
        let id = Uuid::new_v4();
        self.flights.lock().insert(
            id,
            Flight {
                statement_type,
                sql_text: sql_text.to_string(),
                started: Instant::now(),
            },
        );
        Lease {
            state: Arc::clone(self),
            id,
            released: false,
        }
    }

    fn finish(&self, id: Uuid) {
        let Some(flight) = self.flights.lock().remove(&id) else {
            return;
        };
        let elapsed = flight.started.elapsed();
        let mut postflights = self.postflights.lock();
        let entry = postflights
            .entry(flight.sql_text.clone())
            .or_insert_with(|| Postflight {
                sql_text: flight.sql_text,
                count: 0,
                total_time: Duration::ZERO,
            });
        entry.count += 1;
        entry.total_time += elapsed;
    }

    pub fn open_leases(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn inflights(&self) -> Vec<Inflight> {
        let mut inflights: Vec<_> = self
            .flights
            .lock()
            .iter()
            .map(|(id, flight)| Inflight {
                id: id.to_string(),
                statement_type: flight.statement_type,
                sql_text: flight.sql_text.clone(),
                elapsed: flight.started.elapsed(),
            })
            .collect();
        inflights.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        inflights
    }

    pub fn postflights(&self) -> Vec<Postflight> {
        self.postflights.lock().values().cloned().collect()
    }

    /// Shape of `table`.
    pub fn describe(&self, table: &str) -> Result<(TableType, Columns), Error> {
        let tables = self.tables.read();
        let table = tables
            .get(table)
            .ok_or_else(|| Error::TableNotFound(table.to_string()))?;
        Ok((table.table_type, table.columns.clone()))
    }

    pub fn execute(&self, statement: &Statement, params: &[Value]) -> Result<Outcome, Error> {
        match statement {
            Statement::CreateTable {
                table,
                table_type,
                columns,
            } => {
                let mut tables = self.tables.write();
                if tables.contains_key(table) {
                    return Err(Error::TableExists(table.clone()));
                }
                tables.insert(
                    table.clone(),
                    Table {
                        name: table.clone(),
                        table_type: *table_type,
                        columns: columns.clone(),
                        rows: Vec::new(),
                    },
                );
                debug!(table, %table_type, "created table");
                Ok(Outcome::Affected(ExecResult::new(0, "Created successfully.")))
            }
            Statement::DropTable { table } => {
                self.tables
                    .write()
                    .remove(table)
                    .ok_or_else(|| Error::TableNotFound(table.clone()))?;
                debug!(table, "dropped table");
                Ok(Outcome::Affected(ExecResult::new(0, "Dropped successfully.")))
            }
            Statement::Insert {
                table,
                placeholders,
            } => {
                if *placeholders != params.len() {
                    return Err(Error::Params {
                        placeholders: *placeholders,
                        params: params.len(),
                    });
                }
                let mut tables = self.tables.write();
                let table = tables
                    .get_mut(table)
                    .ok_or_else(|| Error::TableNotFound(table.clone()))?;
                let values = coerce_row(
                    &table.columns,
                    params.to_vec(),
                    &TimeFormat::default(),
                    &Tz::UTC,
                )?;
                table.rows.push(StoredRow {
                    arrival: Utc::now(),
                    values,
                });
                Ok(Outcome::Affected(ExecResult::new(1, "a row inserted.")))
            }
            Statement::Delete { table } => {
                let mut tables = self.tables.write();
                let table = tables
                    .get_mut(table)
                    .ok_or_else(|| Error::TableNotFound(table.clone()))?;
                let deleted = table.rows.len() as u64;
                table.rows.clear();
                Ok(Outcome::Affected(ExecResult::new(
                    deleted,
                    format!("{deleted} rows deleted."),
                )))
            }
            Statement::Select {
                table,
                arrival_time,
                limit,
            } => {
                let tables = self.tables.read();
                let table = tables
                    .get(table)
                    .ok_or_else(|| Error::TableNotFound(table.clone()))?;
                let mut columns: Vec<Column> = Vec::with_capacity(table.columns.len() + 1);
                if *arrival_time {
                    columns.push(Column::new(ARRIVAL_TIME, ColumnType::Datetime));
                }
                columns.extend(table.columns.iter().cloned());
                let rows = table
                    .rows
                    .iter()
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|row| {
                        let mut values = Vec::with_capacity(columns.len());
                        if *arrival_time {
                            values.push(Value::Datetime(row.arrival));
                        }
                        values.extend(row.values.iter().cloned());
                        values
                    })
                    .collect();
                Ok(Outcome::Fetched {
                    columns: columns.into(),
                    rows,
                })
            }
            Statement::Count { table } => {
                let tables = self.tables.read();
                let table = tables
                    .get(table)
                    .ok_or_else(|| Error::TableNotFound(table.clone()))?;
                let count = i64::try_from(table.rows.len()).unwrap_or(i64::MAX);
                Ok(Outcome::Fetched {
                    columns: vec![Column::new("COUNT(*)", ColumnType::Int64)].into(),
                    rows: vec![vec![Value::Int64(count)]],
                })
            }
        }
    }

    /// Stores appended rows. Each row is stored whole or rejected whole.
    pub fn append_rows(
        &self,
        table: &str,
        rows: Vec<(DateTime<Utc>, Vec<Value>)>,
        options: &AppendOptions,
    ) -> Flushed {
        let mut flushed = Flushed::default();
        let mut tables = self.tables.write();
        let Some(table) = tables.get_mut(table) else {
            flushed.fail = rows.len() as u64;
            flushed.reason = Some(Error::TableNotFound(table.to_string()).to_string());
            return flushed;
        };
        for (arrival, values) in rows {
            match coerce_row(
                &table.columns,
                values,
                &options.time_format,
                &options.time_location,
            ) {
                Ok(values) => {
                    table.rows.push(StoredRow { arrival, values });
                    flushed.success += 1;
                }
                Err(e) => {
                    flushed.fail += 1;
                    flushed.reason.get_or_insert_with(|| e.to_string());
                }
            }
        }
        flushed
    }

    /// Plan of `statement`. `full` lists the columns and row count.
    pub fn explain(&self, statement: &Statement, full: bool) -> Result<String, Error> {
        let tables = self.tables.read();
        let (columns, rows) = match statement {
            Statement::CreateTable { columns, .. } => (columns.clone(), None),
            other => {
                let table = tables
                    .get(other.table())
                    .ok_or_else(|| Error::TableNotFound(other.table().to_string()))?;
                (table.columns.clone(), Some(table.rows.len()))
            }
        };

        let mut plan = match statement {
            Statement::CreateTable {
                table, table_type, ..
            } => format!("CREATE {table_type} TABLE {table}"),
            Statement::DropTable { table } => format!("DROP TABLE {table}"),
            Statement::Insert { table, .. } => format!("INSERT INTO {table}"),
            Statement::Delete { table } => format!("TRUNCATE {table}"),
            Statement::Select {
                table,
                arrival_time,
                limit,
            } => {
                let mut line = format!("FULL SCAN {table}");
                if *arrival_time {
                    line.push_str(" WITH ARRIVAL TIME");
                }
                if let Some(limit) = limit {
                    let _ = write!(line, " LIMIT {limit}");
                }
                line
            }
            Statement::Count { table } => format!("COUNT {table}"),
        };

        if full {
            if let Some(rows) = rows {
                let _ = write!(plan, "\n  ROWS {rows}");
            }
            for column in &columns {
                let _ = write!(plan, "\n  COLUMN {} {}", column.name, column.column_type);
            }
        }
        Ok(plan)
    }

    #[cfg(test)]
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tables.read().values().map(|t| t.name.clone()).collect();
        names.sort();
        names
    }
}

fn coerce_row(
    columns: &Columns,
    values: Vec<Value>,
    time_format: &TimeFormat,
    tz: &Tz,
) -> Result<Vec<Value>, Error> {
    check_arity(columns, &values)?;
    values
        .into_iter()
        .zip(columns.iter())
        .map(|(value, column)| {
            value
                .coerce_to(column, time_format, tz)
                .map_err(Error::from)
        })
        .collect()
}

/// Registration of an in-flight operation. Released by [`Lease::release`] or on drop.
pub struct Lease {
    state: Arc<State>,
    id: Uuid,
    released: bool,
}

impl Lease {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Ends the operation and records its post-flight time. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.state.finish(self.id);
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Arc<State> {
        let state = Arc::new(State::new(MemoryOptions::default()));
        state.start();
        state
    }

    fn run(state: &State, sql: &str, params: &[Value]) -> Result<Outcome, Error> {
        state.execute(&Statement::parse(sql)?, params)
    }

    #[test]
    fn test_lifecycle() {
        let state = State::new(MemoryOptions::default());
        assert!(matches!(state.ensure_running(), Err(Error::NotRunning)));
        assert!(state.start());
        assert!(!state.start());
        assert!(state.ensure_running().is_ok());
        assert!(state.stop());
        assert!(!state.stop());
    }

    #[test]
    fn test_insert_coerces_and_checks_arity() {
        let state = state();
        run(&state, "CREATE TABLE t (id int16, name string)", &[]).unwrap();

        run(&state, "INSERT INTO t VALUES (?, ?)", &[Value::Int64(7), "a".into()]).unwrap();
        let err = run(&state, "INSERT INTO t VALUES (?)", &[Value::Int64(8)]).unwrap_err();
        assert!(matches!(
            tabular_spi::Error::from(err),
            tabular_spi::Error::Usage(tabular_spi::UsageError::ArityMismatch { .. })
        ));
        let err = run(
            &state,
            "INSERT INTO t VALUES (?, ?)",
            &[Value::Int64(70_000), "b".into()],
        )
        .unwrap_err();
        assert!(tabular_spi::Error::from(err).is_usage());

        let Outcome::Fetched { rows, .. } = run(&state, "SELECT * FROM t", &[]).unwrap() else {
            panic!("expected rows");
        };
        assert_eq!(rows, vec![vec![Value::Int16(7), Value::from("a")]]);
    }

    #[test]
    fn test_append_rows_is_per_row() {
        let state = state();
        run(&state, "CREATE TABLE t (id int32)", &[]).unwrap();
        let now = Utc::now();
        let flushed = state.append_rows(
            "t",
            vec![
                (now, vec![Value::Int32(1)]),
                (now, vec![Value::from("x")]),
                (now, vec![Value::Int32(3)]),
            ],
            &AppendOptions::default(),
        );
        assert_eq!((flushed.success, flushed.fail), (2, 1));
        assert!(flushed.reason.unwrap().contains("id"));

        let flushed = state.append_rows("gone", vec![(now, vec![])], &AppendOptions::default());
        assert_eq!((flushed.success, flushed.fail), (0, 1));
    }

    #[test]
    fn test_leases_feed_flights() {
        let state = state();
        let mut lease = state.begin(StatementType::Query, "SELECT * FROM t");
        assert_eq!(state.open_leases(), 1);
        assert_eq!(state.inflights()[0].id, lease.id().to_string());

        lease.release();
        lease.release();
        drop(lease);
        assert_eq!(state.open_leases(), 0);

        let postflights = state.postflights();
        assert_eq!(postflights.len(), 1);
        assert_eq!(postflights[0].count, 1);
    }

    #[test]
    fn test_explain() {
        let state = state();
        run(&state, "CREATE TABLE t (id int32)", &[]).unwrap();
        let plan = state
            .explain(&Statement::parse("SELECT * FROM t LIMIT 3").unwrap(), true)
            .unwrap();
        assert_eq!(plan, "FULL SCAN t LIMIT 3\n  ROWS 0\n  COLUMN id int32");

        let err = state
            .explain(&Statement::parse("SELECT * FROM missing").unwrap(), false)
            .unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));
        assert_eq!(state.table_names(), vec!["t"]);
    }
}
