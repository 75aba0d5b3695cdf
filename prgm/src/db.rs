// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Optional persistence (§4.6.1/§6.3), grounded on
//! `examples/original_source/db.h`/`db.c`'s schema and `sqlite3_open_v2`
//! usage. `rusqlite` (bundled) is the direct idiomatic counterpart of the
//! original's raw `sqlite3.h` calls; no crate in the retrieval pack
//! exercises relational persistence, so this is a deliberate exception to
//! "ground everything in the pack" (recorded in DESIGN.md).

use std::path::Path;

use remain::sorted;
use rusqlite::{params, Connection};
use thiserror::Error;

/// State bitmask shared by `jobs`, `prgms`, and `stims` (§6.3).
pub const STATE_NONE: i64 = 1 << 0;
pub const STATE_IDLE: i64 = 1 << 1;
pub const STATE_PENDING: i64 = 1 << 2;
pub const STATE_RUNNING: i64 = 1 << 3;
pub const STATE_KILLING: i64 = 1 << 4;
pub const STATE_KILLED: i64 = 1 << 5;
pub const STATE_DONE: i64 = 1 << 6;

#[sorted]
#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    session TEXT,
    is_admin INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS boards (
    id INTEGER PRIMARY KEY,
    dna TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    ip_addr TEXT,
    cur_dut_board_id INTEGER,
    is_master INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS dut_boards (
    id INTEGER PRIMARY KEY,
    dna TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    profile_path TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS mounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    ip_addr TEXT,
    path TEXT,
    point TEXT,
    message TEXT
);
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY,
    board_id INTEGER NOT NULL REFERENCES boards(id),
    dut_board_id INTEGER REFERENCES dut_boards(id),
    user_id INTEGER REFERENCES users(id),
    state INTEGER NOT NULL DEFAULT 2
);
CREATE TABLE IF NOT EXISTS prgms (
    id INTEGER PRIMARY KEY,
    job_id INTEGER REFERENCES jobs(id),
    path TEXT NOT NULL,
    date_start TEXT NOT NULL,
    date_end TEXT,
    last_stim_id INTEGER,
    did_fail INTEGER NOT NULL DEFAULT 0,
    failing_vec INTEGER NOT NULL DEFAULT -1,
    state INTEGER NOT NULL DEFAULT 2
);
CREATE TABLE IF NOT EXISTS prgm_logs (
    id INTEGER PRIMARY KEY,
    prgm_id INTEGER NOT NULL REFERENCES prgms(id),
    date_created TEXT NOT NULL,
    line TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS stims (
    id INTEGER PRIMARY KEY,
    prgm_id INTEGER NOT NULL REFERENCES prgms(id),
    path TEXT NOT NULL,
    did_fail INTEGER NOT NULL DEFAULT 0,
    failing_vec INTEGER NOT NULL DEFAULT -1,
    state INTEGER NOT NULL DEFAULT 2
);
CREATE TABLE IF NOT EXISTS fail_pins (
    id INTEGER PRIMARY KEY,
    stim_id INTEGER NOT NULL REFERENCES stims(id),
    dut_io_id INTEGER NOT NULL,
    did_fail INTEGER NOT NULL DEFAULT 1
);
";

/// A handle to the persistence database. Absent entirely, every `Program`
/// verb that would touch it is a no-op (§4.6.1).
pub struct Db {
    conn: Connection,
}

fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl Db {
    /// Opens (creating if necessary) the database at `path` and ensures
    /// the §6.3 schema exists. Mirrors `db_open`'s
    /// `sqlite3_open_v2(..., SQLITE_OPEN_CREATE | SQLITE_OPEN_READWRITE, ...)`.
    pub fn open(path: impl AsRef<Path>) -> Result<Db> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Db { conn })
    }

    /// Registers a new program row, returning its id.
    pub fn insert_prgm(&self, job_id: Option<i64>, path: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO prgms (job_id, path, date_start, did_fail, failing_vec, state)
             VALUES (?1, ?2, ?3, 0, -1, ?4)",
            params![job_id, path, now_iso8601(), STATE_IDLE],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Opens a transaction covering every write issued by one `run`/`runc`
    /// call (§4.6.1: "failures to write log rows or update status are
    /// fatal"). The caller commits once all stims in the call are recorded.
    pub fn begin(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Exposes the raw connection for assertions in `prgm`'s own tests.
    #[cfg(test)]
    pub(crate) fn conn_for_test(&self) -> &Connection {
        &self.conn
    }
}

/// Inserts a pending stim-execution row, returning its id. Takes a
/// `&Connection` so it can run against either `Db`'s own connection or an
/// open `Transaction` (which derefs to one).
pub fn insert_stim(conn: &Connection, prgm_id: i64, path: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO stims (prgm_id, path, did_fail, failing_vec, state) VALUES (?1, ?2, 0, -1, ?3)",
        params![prgm_id, path, STATE_PENDING],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finalizes a stim-execution row with its outcome.
pub fn update_stim_result(conn: &Connection, stim_id: i64, did_fail: bool, failing_vec: i64) -> Result<()> {
    conn.execute(
        "UPDATE stims SET did_fail = ?1, failing_vec = ?2, state = ?3 WHERE id = ?4",
        params![did_fail as i64, failing_vec, STATE_DONE, stim_id],
    )?;
    Ok(())
}

/// Records one failing DUT pin for a stim execution.
pub fn insert_fail_pin(conn: &Connection, stim_id: i64, dut_io_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO fail_pins (stim_id, dut_io_id, did_fail) VALUES (?1, ?2, 1)",
        params![stim_id, dut_io_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Updates the program row's aggregate fail/cycle/last-stim columns.
pub fn update_prgm_result(conn: &Connection, prgm_id: i64, last_stim_id: i64, did_fail: bool, failing_vec: i64) -> Result<()> {
    conn.execute(
        "UPDATE prgms SET last_stim_id = ?1, did_fail = ?2, failing_vec = ?3, state = ?4 WHERE id = ?5",
        params![last_stim_id, did_fail as i64, failing_vec, STATE_DONE, prgm_id],
    )?;
    Ok(())
}

/// Appends one log line to the program's log table.
pub fn insert_prgm_log(conn: &Connection, prgm_id: i64, line: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO prgm_logs (prgm_id, date_created, line) VALUES (?1, ?2, ?3)",
        params![prgm_id, now_iso8601(), line],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_schema_and_accepts_a_prgm_row() {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open(dir.path().join("ate.sqlite3")).unwrap();
        let prgm_id = db.insert_prgm(None, "/tmp/my.prgm").unwrap();
        assert!(prgm_id > 0);
    }

    #[test]
    fn run_call_writes_stim_and_prgm_rows_in_one_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Db::open(dir.path().join("ate.sqlite3")).unwrap();
        let prgm_id = db.insert_prgm(None, "/tmp/my.prgm").unwrap();

        {
            let tx = db.begin().unwrap();
            let stim_id = insert_stim(&tx, prgm_id, "/tmp/a.raw").unwrap();
            update_stim_result(&tx, stim_id, true, 42).unwrap();
            insert_fail_pin(&tx, stim_id, 7).unwrap();
            update_prgm_result(&tx, prgm_id, stim_id, true, 42).unwrap();
            insert_prgm_log(&tx, prgm_id, "ran 1 stim, 1 failed").unwrap();
            tx.commit().unwrap();
        }

        let did_fail: i64 = db
            .conn
            .query_row("SELECT did_fail FROM prgms WHERE id = ?1", params![prgm_id], |r| r.get(0))
            .unwrap();
        assert_eq!(did_fail, 1);
    }
}
