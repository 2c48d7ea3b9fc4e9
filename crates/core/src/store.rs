//! SQLite-backed record store for calls, proposals, reviewers, and
//! assignments.
//!
//! A single rusqlite connection wrapped in a `Mutex`; cloning the handle is
//! cheap (inner `Arc`). WAL mode and foreign keys are enabled, and the
//! schema is applied idempotently on open. Uniqueness of the
//! (proposal, reviewer) assignment pair is enforced by the database, so two
//! concurrent confirms of the same pair leave exactly one row and surface
//! one typed conflict.

use crate::error::{Result, StoreError};
use crate::models::{
    Assignment, Call, DashboardStats, NewCall, NewProposal, NewResearcher, NewReview, NewReviewer,
    Proposal, ProposalStatus, Researcher, ReviewCriteria, ReviewScore, Reviewer,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS admins (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS reviewers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    expertise TEXT NOT NULL DEFAULT '',
    cv_text TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS researchers (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    expertise TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS calls (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    identifier TEXT NOT NULL,
    background TEXT NOT NULL DEFAULT '',
    objectives TEXT NOT NULL DEFAULT '',
    priority_areas TEXT NOT NULL DEFAULT '',
    funding_details TEXT NOT NULL DEFAULT '',
    timeline TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS proposals (
    id INTEGER PRIMARY KEY,
    title TEXT NOT NULL,
    abstract_text TEXT NOT NULL DEFAULT '',
    keywords TEXT NOT NULL DEFAULT '',
    proposal_text TEXT NOT NULL DEFAULT '',
    call_id INTEGER NOT NULL REFERENCES calls(id),
    status TEXT NOT NULL DEFAULT 'Under Review',
    submitted_by INTEGER REFERENCES researchers(id)
);
CREATE TABLE IF NOT EXISTS assignments (
    id INTEGER PRIMARY KEY,
    proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
    reviewer_id INTEGER NOT NULL REFERENCES reviewers(id),
    similarity_score REAL NOT NULL,
    explanation TEXT NOT NULL DEFAULT '',
    anonymized INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    UNIQUE (proposal_id, reviewer_id)
);
CREATE TABLE IF NOT EXISTS review_criteria (
    id INTEGER PRIMARY KEY,
    call_id INTEGER NOT NULL REFERENCES calls(id),
    area TEXT,
    criteria TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS review_scores (
    id INTEGER PRIMARY KEY,
    proposal_id INTEGER NOT NULL REFERENCES proposals(id) ON DELETE CASCADE,
    reviewer_id INTEGER NOT NULL REFERENCES reviewers(id),
    originality REAL NOT NULL,
    methodology REAL NOT NULL,
    impact REAL NOT NULL,
    feasibility REAL NOT NULL,
    overall REAL NOT NULL,
    comments TEXT NOT NULL DEFAULT '',
    UNIQUE (proposal_id, reviewer_id)
);
";

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Thread-safe database handle over a single rusqlite connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and applies the
    /// schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    // ----- admins -----

    /// Seeds an admin account when none exists yet. Returns whether a row
    /// was created.
    pub fn ensure_admin(&self, username: &str, password: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let existing: i64 = conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))?;
            if existing > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO admins (username, password_hash) VALUES (?1, ?2)",
                params![username, hash_password(password)],
            )?;
            Ok(true)
        })
    }

    pub fn verify_admin(&self, username: &str, password: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let matches: i64 = conn.query_row(
                "SELECT COUNT(*) FROM admins WHERE username = ?1 AND password_hash = ?2",
                params![username, hash_password(password)],
                |row| row.get(0),
            )?;
            Ok(matches > 0)
        })
    }

    // ----- calls -----

    pub fn create_call(&self, call: &NewCall) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO calls (title, identifier, background, objectives, priority_areas, funding_details, timeline)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    call.title,
                    call.identifier,
                    call.background,
                    call.objectives,
                    call.priority_areas,
                    call.funding_details,
                    call.timeline,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_call(&self, id: i64) -> Result<Call> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, identifier, background, objectives, priority_areas, funding_details, timeline
                 FROM calls WHERE id = ?1",
                [id],
                call_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound { entity: "call", id })
        })
    }

    pub fn list_calls(&self) -> Result<Vec<Call>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, title, identifier, background, objectives, priority_areas, funding_details, timeline
                 FROM calls ORDER BY id",
            )?;
            let rows = statement.query_map([], call_from_row)?;
            collect_rows(rows)
        })
    }

    // ----- reviewers & researchers -----

    pub fn register_reviewer(&self, reviewer: &NewReviewer) -> Result<i64> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO reviewers (name, email, password_hash, expertise, cv_text)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    reviewer.name,
                    reviewer.email,
                    hash_password(&reviewer.password),
                    reviewer.expertise,
                    reviewer.cv_text,
                ],
            );
            match inserted {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(error) if is_unique_violation(&error) => {
                    Err(StoreError::DuplicateEmail(reviewer.email.clone()))
                }
                Err(error) => Err(error.into()),
            }
        })
    }

    pub fn register_researcher(&self, researcher: &NewResearcher) -> Result<i64> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO researchers (name, email, password_hash, expertise)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    researcher.name,
                    researcher.email,
                    hash_password(&researcher.password),
                    researcher.expertise,
                ],
            );
            match inserted {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(error) if is_unique_violation(&error) => {
                    Err(StoreError::DuplicateEmail(researcher.email.clone()))
                }
                Err(error) => Err(error.into()),
            }
        })
    }

    pub fn authenticate_reviewer(&self, email: &str, password: &str) -> Result<Option<Reviewer>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, email, expertise, cv_text FROM reviewers
                     WHERE email = ?1 AND password_hash = ?2",
                    params![email, hash_password(password)],
                    reviewer_from_row,
                )
                .optional()?)
        })
    }

    pub fn authenticate_researcher(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<Researcher>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, email, expertise FROM researchers
                     WHERE email = ?1 AND password_hash = ?2",
                    params![email, hash_password(password)],
                    researcher_from_row,
                )
                .optional()?)
        })
    }

    pub fn get_reviewer(&self, id: i64) -> Result<Reviewer> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, email, expertise, cv_text FROM reviewers WHERE id = ?1",
                [id],
                reviewer_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "reviewer",
                id,
            })
        })
    }

    pub fn list_reviewers(&self) -> Result<Vec<Reviewer>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, name, email, expertise, cv_text FROM reviewers ORDER BY id",
            )?;
            let rows = statement.query_map([], reviewer_from_row)?;
            collect_rows(rows)
        })
    }

    // ----- proposals -----

    pub fn submit_proposal(&self, proposal: &NewProposal) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO proposals (title, abstract_text, keywords, proposal_text, call_id, status, submitted_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    proposal.title,
                    proposal.abstract_text,
                    proposal.keywords,
                    proposal.proposal_text,
                    proposal.call_id,
                    ProposalStatus::UnderReview.as_str(),
                    proposal.submitted_by,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_proposal(&self, id: i64) -> Result<Proposal> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, title, abstract_text, keywords, proposal_text, call_id, status, submitted_by
                 FROM proposals WHERE id = ?1",
                [id],
                proposal_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "proposal",
                id,
            })
        })
    }

    pub fn proposals_for_call(&self, call_id: i64) -> Result<Vec<Proposal>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, title, abstract_text, keywords, proposal_text, call_id, status, submitted_by
                 FROM proposals WHERE call_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([call_id], proposal_from_row)?;
            collect_rows(rows)
        })
    }

    pub fn proposals_by_researcher(&self, researcher_id: i64) -> Result<Vec<Proposal>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, title, abstract_text, keywords, proposal_text, call_id, status, submitted_by
                 FROM proposals WHERE submitted_by = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([researcher_id], proposal_from_row)?;
            collect_rows(rows)
        })
    }

    pub fn set_proposal_status(&self, id: i64, status: ProposalStatus) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE proposals SET status = ?1 WHERE id = ?2",
                params![status.as_str(), id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound {
                    entity: "proposal",
                    id,
                });
            }
            Ok(())
        })
    }

    /// Deletes a proposal; its assignments and review scores are owned by
    /// the proposal and cascade with it.
    pub fn delete_proposal(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM proposals WHERE id = ?1", [id])?;
            if deleted == 0 {
                return Err(StoreError::NotFound {
                    entity: "proposal",
                    id,
                });
            }
            Ok(())
        })
    }

    // ----- review criteria -----

    /// Saves reviewing criteria for a call. `area` scopes the entry to one
    /// priority area; `None` applies to the call as a whole.
    pub fn add_criteria(&self, call_id: i64, area: Option<&str>, criteria: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO review_criteria (call_id, area, criteria) VALUES (?1, ?2, ?3)",
                params![call_id, area, criteria],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn criteria_for_call(&self, call_id: i64) -> Result<Vec<ReviewCriteria>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, call_id, area, criteria FROM review_criteria
                 WHERE call_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([call_id], criteria_from_row)?;
            collect_rows(rows)
        })
    }

    // ----- assignments -----

    pub fn assigned_reviewer_ids(&self, proposal_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            let mut statement =
                conn.prepare("SELECT reviewer_id FROM assignments WHERE proposal_id = ?1")?;
            let rows = statement.query_map([proposal_id], |row| row.get::<_, i64>(0))?;
            let mut ids = HashSet::new();
            for row in rows {
                ids.insert(row?);
            }
            Ok(ids)
        })
    }

    /// The confirm step: persists one suggested pairing. A duplicate
    /// (proposal, reviewer) pair is rejected by the unique constraint and
    /// reported as [`StoreError::AlreadyAssigned`].
    pub fn insert_assignment(
        &self,
        proposal_id: i64,
        reviewer_id: i64,
        similarity_score: f32,
        explanation: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO assignments (proposal_id, reviewer_id, similarity_score, explanation, anonymized, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![
                    proposal_id,
                    reviewer_id,
                    similarity_score,
                    explanation,
                    Utc::now().to_rfc3339(),
                ],
            );
            match inserted {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(error) if is_unique_violation(&error) => Err(StoreError::AlreadyAssigned {
                    proposal_id,
                    reviewer_id,
                }),
                Err(error) => Err(error.into()),
            }
        })
    }

    pub fn assignments_for_proposal(&self, proposal_id: i64) -> Result<Vec<Assignment>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, proposal_id, reviewer_id, similarity_score, explanation, anonymized, created_at
                 FROM assignments WHERE proposal_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([proposal_id], assignment_from_row)?;
            collect_rows(rows)
        })
    }

    pub fn assignments_for_reviewer(&self, reviewer_id: i64) -> Result<Vec<Assignment>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, proposal_id, reviewer_id, similarity_score, explanation, anonymized, created_at
                 FROM assignments WHERE reviewer_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([reviewer_id], assignment_from_row)?;
            collect_rows(rows)
        })
    }

    // ----- review scores -----

    /// Records review scores; overall is the mean of the four criteria.
    /// One review per (proposal, reviewer) pair.
    pub fn submit_review(&self, review: &NewReview) -> Result<i64> {
        let overall = (review.originality + review.methodology + review.impact + review.feasibility)
            / 4.0;

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO review_scores (proposal_id, reviewer_id, originality, methodology, impact, feasibility, overall, comments)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    review.proposal_id,
                    review.reviewer_id,
                    review.originality,
                    review.methodology,
                    review.impact,
                    review.feasibility,
                    overall,
                    review.comments,
                ],
            );
            match inserted {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(error) if is_unique_violation(&error) => Err(StoreError::AlreadyReviewed {
                    proposal_id: review.proposal_id,
                    reviewer_id: review.reviewer_id,
                }),
                Err(error) => Err(error.into()),
            }
        })
    }

    pub fn reviews_for_proposal(&self, proposal_id: i64) -> Result<Vec<ReviewScore>> {
        self.with_conn(|conn| {
            let mut statement = conn.prepare(
                "SELECT id, proposal_id, reviewer_id, originality, methodology, impact, feasibility, overall, comments
                 FROM review_scores WHERE proposal_id = ?1 ORDER BY id",
            )?;
            let rows = statement.query_map([proposal_id], review_from_row)?;
            collect_rows(rows)
        })
    }

    // ----- dashboard -----

    pub fn stats(&self) -> Result<DashboardStats> {
        self.with_conn(|conn| {
            let count = |table: &str| -> Result<usize> {
                let value: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                Ok(value as usize)
            };
            Ok(DashboardStats {
                calls: count("calls")?,
                proposals: count("proposals")?,
                reviewers: count("reviewers")?,
                assignments: count("assignments")?,
            })
        })
    }
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(code, _)
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut collected = Vec::new();
    for row in rows {
        collected.push(row?);
    }
    Ok(collected)
}

fn call_from_row(row: &Row<'_>) -> rusqlite::Result<Call> {
    Ok(Call {
        id: row.get(0)?,
        title: row.get(1)?,
        identifier: row.get(2)?,
        background: row.get(3)?,
        objectives: row.get(4)?,
        priority_areas: row.get(5)?,
        funding_details: row.get(6)?,
        timeline: row.get(7)?,
    })
}

fn reviewer_from_row(row: &Row<'_>) -> rusqlite::Result<Reviewer> {
    Ok(Reviewer {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        expertise: row.get(3)?,
        cv_text: row.get(4)?,
    })
}

fn researcher_from_row(row: &Row<'_>) -> rusqlite::Result<Researcher> {
    Ok(Researcher {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        expertise: row.get(3)?,
    })
}

fn criteria_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewCriteria> {
    Ok(ReviewCriteria {
        id: row.get(0)?,
        call_id: row.get(1)?,
        area: row.get(2)?,
        criteria: row.get(3)?,
    })
}

fn proposal_from_row(row: &Row<'_>) -> rusqlite::Result<Proposal> {
    let status_raw: String = row.get(6)?;
    let status = ProposalStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown proposal status: {status_raw}").into(),
        )
    })?;

    Ok(Proposal {
        id: row.get(0)?,
        title: row.get(1)?,
        abstract_text: row.get(2)?,
        keywords: row.get(3)?,
        proposal_text: row.get(4)?,
        call_id: row.get(5)?,
        status,
        submitted_by: row.get(7)?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    let created_raw: String = row.get(6)?;
    let created_at = DateTime::parse_from_rfc3339(&created_raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                format!("bad assignment timestamp: {error}").into(),
            )
        })?;

    Ok(Assignment {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        reviewer_id: row.get(2)?,
        similarity_score: row.get(3)?,
        explanation: row.get(4)?,
        anonymized: row.get(5)?,
        created_at,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewScore> {
    Ok(ReviewScore {
        id: row.get(0)?,
        proposal_id: row.get(1)?,
        reviewer_id: row.get(2)?,
        originality: row.get(3)?,
        methodology: row.get(4)?,
        impact: row.get(5)?,
        feasibility: row.get(6)?,
        overall: row.get(7)?,
        comments: row.get(8)?,
    })
}
