//! Core MemoryStore implementation

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use eyre::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{SEARCH_LIMIT, TOKEN_CAP, TOKEN_MIN_LEN, now_ms};

/// Seeded block-page markers. This set is a floor, not a ceiling: the
/// watchdog adds new keywords as it observes novel block pages, and the
/// store re-seeds these whenever the table is found empty.
pub const DEFAULT_BOT_KEYWORDS: &[&str] = &[
    "captcha",
    "recaptcha",
    "verify you are human",
    "are you a robot",
    "unusual traffic",
    "access denied",
    "security check",
    "just a moment",
    "attention required",
    "cloudflare",
];

/// Outcome recorded with a memory; only success is indexed for recall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStatus {
    Success,
    Failure,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            _ => Self::Failure,
        }
    }
}

impl std::fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One long-term recall entry. `id` is the owning task's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub goal: String,
    /// Lowercased; stored comma-joined, split on read
    pub keywords: Vec<String>,
    pub summary: String,
    /// Opaque key/value bag extracted by the executor
    #[serde(default)]
    pub artifacts: serde_json::Value,
    pub status: MemoryStatus,
    /// Unix milliseconds
    pub timestamp: i64,
}

/// A self-learned intervention marker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotKeyword {
    pub keyword: String,
    /// Unix milliseconds
    pub created_at: i64,
}

/// SQLite-backed store for task recall and bot keywords.
///
/// The version counter bumps on every keyword write so callers holding an
/// in-memory copy of the list can detect staleness with a cheap compare.
pub struct MemoryStore {
    conn: Mutex<Connection>,
    version: AtomicU64,
}

impl MemoryStore {
    /// Open or create the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let conn = Connection::open(path).context(format!("Failed to open {}", path.display()))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id             TEXT PRIMARY KEY,
                goal           TEXT NOT NULL,
                keywords       TEXT NOT NULL,
                summary        TEXT NOT NULL,
                artifacts_json TEXT NOT NULL,
                status         TEXT NOT NULL,
                timestamp      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_keywords ON memories(keywords);
            CREATE TABLE IF NOT EXISTS bot_keywords (
                keyword    TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );",
        )
        .context("Failed to create tables")?;

        let store = Self {
            conn: Mutex::new(conn),
            version: AtomicU64::new(1),
        };
        store.ensure_seeded()?;
        debug!(path = %path.display(), "Opened memory store");
        Ok(store)
    }

    /// In-memory store for tests and mock mode
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id             TEXT PRIMARY KEY,
                goal           TEXT NOT NULL,
                keywords       TEXT NOT NULL,
                summary        TEXT NOT NULL,
                artifacts_json TEXT NOT NULL,
                status         TEXT NOT NULL,
                timestamp      INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_memories_keywords ON memories(keywords);
            CREATE TABLE IF NOT EXISTS bot_keywords (
                keyword    TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL
            );",
        )?;
        let store = Self {
            conn: Mutex::new(conn),
            version: AtomicU64::new(1),
        };
        store.ensure_seeded()?;
        Ok(store)
    }

    /// Monotonic counter bumped on every keyword write. Callers caching the
    /// keyword list compare this against the version they loaded at.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    // === Task recall ===

    /// Upsert a record by id. Keywords are normalized to lowercase and
    /// stored comma-joined.
    pub fn save(&self, record: &MemoryRecord) -> Result<()> {
        let keywords = record
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        let artifacts = serde_json::to_string(&record.artifacts)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO memories (id, goal, keywords, summary, artifacts_json, status, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                goal = excluded.goal,
                keywords = excluded.keywords,
                summary = excluded.summary,
                artifacts_json = excluded.artifacts_json,
                status = excluded.status,
                timestamp = excluded.timestamp",
            params![
                record.id,
                record.goal,
                keywords,
                record.summary,
                artifacts,
                record.status.as_str(),
                record.timestamp
            ],
        )
        .context("Failed to save memory record")?;

        debug!(id = %record.id, status = %record.status, "Saved memory record");
        Ok(())
    }

    /// Fetch a single record by id
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, goal, keywords, summary, artifacts_json, status, timestamp
                 FROM memories WHERE id = ?1",
                params![id],
                row_to_record,
            )
            .optional()?;
        Ok(row)
    }

    /// Disjunctive LIKE-match over the keywords column, success-only,
    /// newest first, capped at [`SEARCH_LIMIT`].
    pub fn search(&self, keywords: &[String]) -> Result<Vec<MemoryRecord>> {
        let terms: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let clause = terms.iter().map(|_| "keywords LIKE ?").collect::<Vec<_>>().join(" OR ");
        let sql = format!(
            "SELECT id, goal, keywords, summary, artifacts_json, status, timestamp
             FROM memories
             WHERE status = 'success' AND ({})
             ORDER BY timestamp DESC
             LIMIT {}",
            clause, SEARCH_LIMIT
        );

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql)?;
        let patterns: Vec<String> = terms.iter().map(|t| format!("%{}%", t)).collect();
        let rows = stmt.query_map(rusqlite::params_from_iter(patterns.iter()), row_to_record)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        debug!(terms = terms.len(), hits = records.len(), "Memory search");
        Ok(records)
    }

    // === Bot keywords ===

    /// Return the current keyword list, re-seeding defaults if the table is
    /// empty. Never returns an empty list.
    pub fn get_bot_keywords(&self) -> Result<Vec<String>> {
        {
            let conn = self.lock();
            let keywords = load_keywords(&conn)?;
            if !keywords.is_empty() {
                return Ok(keywords);
            }
        }

        warn!("Bot keyword table empty, re-seeding defaults");
        self.ensure_seeded()?;
        let conn = self.lock();
        load_keywords(&conn)
    }

    /// Add one keyword (trimmed, lowercased). Empty strings are skipped.
    /// Returns true if a new row was inserted.
    pub fn add_bot_keyword(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim().to_lowercase();
        if keyword.is_empty() {
            return Ok(false);
        }

        let inserted = {
            let conn = self.lock();
            conn.execute(
                "INSERT OR IGNORE INTO bot_keywords (keyword, created_at) VALUES (?1, ?2)",
                params![keyword, now_ms()],
            )?
        };
        if inserted > 0 {
            self.bump_version();
            info!(%keyword, "Learned bot keyword");
        }
        Ok(inserted > 0)
    }

    /// Tokenize free text and learn every usable token. Returns the number
    /// of newly inserted keywords.
    pub fn add_bot_keywords_from_text(&self, text: &str) -> Result<usize> {
        let mut added = 0;
        for token in tokenize(text) {
            if self.add_bot_keyword(&token)? {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove a keyword. Returns true if a row was deleted.
    pub fn delete_bot_keyword(&self, keyword: &str) -> Result<bool> {
        let keyword = keyword.trim().to_lowercase();
        let deleted = {
            let conn = self.lock();
            conn.execute("DELETE FROM bot_keywords WHERE keyword = ?1", params![keyword])?
        };
        if deleted > 0 {
            self.bump_version();
        }
        Ok(deleted > 0)
    }

    /// Full keyword rows for admin display
    pub fn get_all_bot_keywords(&self) -> Result<Vec<BotKeyword>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT keyword, created_at FROM bot_keywords ORDER BY created_at, keyword")?;
        let rows = stmt.query_map([], |row| {
            Ok(BotKeyword {
                keyword: row.get(0)?,
                created_at: row.get(1)?,
            })
        })?;

        let mut keywords = Vec::new();
        for row in rows {
            keywords.push(row?);
        }
        Ok(keywords)
    }

    fn ensure_seeded(&self) -> Result<()> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM bot_keywords", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let now = now_ms();
        for keyword in DEFAULT_BOT_KEYWORDS {
            conn.execute(
                "INSERT OR IGNORE INTO bot_keywords (keyword, created_at) VALUES (?1, ?2)",
                params![keyword, now],
            )?;
        }
        drop(conn);
        self.bump_version();
        info!(count = DEFAULT_BOT_KEYWORDS.len(), "Seeded default bot keywords");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-write; the
        // connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let keywords: String = row.get(2)?;
    let artifacts: String = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        goal: row.get(1)?,
        keywords: keywords
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        summary: row.get(3)?,
        artifacts: serde_json::from_str(&artifacts).unwrap_or(serde_json::Value::Null),
        status: MemoryStatus::from_str(&status),
        timestamp: row.get(6)?,
    })
}

fn load_keywords(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT keyword FROM bot_keywords ORDER BY keyword")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut keywords = Vec::new();
    for row in rows {
        keywords.push(row?);
    }
    Ok(keywords)
}

/// Split text into learnable tokens: runs of alphanumeric characters (which
/// includes CJK ideographs), lowercased, at least [`TOKEN_MIN_LEN`] chars,
/// deduplicated in order, capped at [`TOKEN_CAP`].
pub fn tokenize(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut tokens = Vec::new();

    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if tokens.len() >= TOKEN_CAP {
            break;
        }
        let token = raw.to_lowercase();
        if token.chars().count() < TOKEN_MIN_LEN {
            continue;
        }
        if seen.insert(token.clone()) {
            tokens.push(token);
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, keywords: &[&str], status: MemoryStatus, timestamp: i64) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            goal: format!("goal for {}", id),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            summary: format!("summary for {}", id),
            artifacts: serde_json::json!({}),
            status,
            timestamp,
        }
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let store = MemoryStore::open_in_memory().unwrap();
        let rec = MemoryRecord {
            id: "task-1".to_string(),
            goal: "find the price".to_string(),
            keywords: vec!["Price".to_string(), " Laptop ".to_string()],
            summary: "the price is 999".to_string(),
            artifacts: serde_json::json!({"price": "999"}),
            status: MemoryStatus::Success,
            timestamp: 1000,
        };
        store.save(&rec).unwrap();

        let loaded = store.get("task-1").unwrap().unwrap();
        assert_eq!(loaded.goal, "find the price");
        // normalized on storage, split on read
        assert_eq!(loaded.keywords, vec!["price", "laptop"]);
        assert_eq!(loaded.artifacts["price"], "999");
        assert_eq!(loaded.status, MemoryStatus::Success);
    }

    #[test]
    fn test_save_is_upsert() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&record("t", &["alpha"], MemoryStatus::Success, 1)).unwrap();
        let mut updated = record("t", &["beta"], MemoryStatus::Success, 2);
        updated.summary = "second".to_string();
        store.save(&updated).unwrap();

        let loaded = store.get("t").unwrap().unwrap();
        assert_eq!(loaded.summary, "second");
        assert_eq!(loaded.keywords, vec!["beta"]);
    }

    #[test]
    fn test_search_excludes_failures() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&record("ok", &["flight"], MemoryStatus::Success, 10)).unwrap();
        store.save(&record("bad", &["flight"], MemoryStatus::Failure, 20)).unwrap();

        let hits = store.search(&["flight".to_string()]).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "ok");
    }

    #[test]
    fn test_search_orders_newest_first_and_caps() {
        let store = MemoryStore::open_in_memory().unwrap();
        for i in 0..8 {
            store
                .save(&record(&format!("t{}", i), &["hotel"], MemoryStatus::Success, i))
                .unwrap();
        }

        let hits = store.search(&["hotel".to_string()]).unwrap();
        assert_eq!(hits.len(), SEARCH_LIMIT);
        assert_eq!(hits[0].id, "t7");
        assert_eq!(hits[4].id, "t3");
    }

    #[test]
    fn test_search_is_disjunctive() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&record("a", &["trains"], MemoryStatus::Success, 1)).unwrap();
        store.save(&record("b", &["planes"], MemoryStatus::Success, 2)).unwrap();

        let hits = store
            .search(&["trains".to_string(), "planes".to_string()])
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_empty_terms_returns_nothing() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.save(&record("a", &["x"], MemoryStatus::Success, 1)).unwrap();
        assert!(store.search(&[]).unwrap().is_empty());
        assert!(store.search(&["  ".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn test_bot_keywords_seeded_on_open() {
        let store = MemoryStore::open_in_memory().unwrap();
        let keywords = store.get_bot_keywords().unwrap();
        assert!(!keywords.is_empty());
        assert!(keywords.iter().any(|k| k == "captcha"));
    }

    #[test]
    fn test_bot_keywords_never_empty() {
        let store = MemoryStore::open_in_memory().unwrap();
        for kw in store.get_all_bot_keywords().unwrap() {
            store.delete_bot_keyword(&kw.keyword).unwrap();
        }
        // deleted everything; the next read re-seeds
        let keywords = store.get_bot_keywords().unwrap();
        assert!(!keywords.is_empty());
    }

    #[test]
    fn test_add_bot_keyword_normalizes() {
        let store = MemoryStore::open_in_memory().unwrap();
        assert!(store.add_bot_keyword("  Pardon Our Interruption  ").unwrap());
        let keywords = store.get_bot_keywords().unwrap();
        assert!(keywords.iter().any(|k| k == "pardon our interruption"));

        // duplicate insert is ignored
        assert!(!store.add_bot_keyword("pardon our interruption").unwrap());
        // empty strings are skipped
        assert!(!store.add_bot_keyword("   ").unwrap());
    }

    #[test]
    fn test_version_bumps_on_keyword_writes() {
        let store = MemoryStore::open_in_memory().unwrap();
        let v0 = store.version();

        store.add_bot_keyword("robot check").unwrap();
        let v1 = store.version();
        assert!(v1 > v0);

        // no-op writes leave the version alone
        store.add_bot_keyword("robot check").unwrap();
        assert_eq!(store.version(), v1);

        store.delete_bot_keyword("robot check").unwrap();
        assert!(store.version() > v1);
    }

    #[test]
    fn test_tokenize_rules() {
        let tokens = tokenize("Please VERIFY you're not a robot-123 now ok");
        assert!(tokens.contains(&"verify".to_string()));
        assert!(tokens.contains(&"robot".to_string()));
        // short tokens dropped
        assert!(!tokens.contains(&"not".to_string()));
        assert!(!tokens.contains(&"ok".to_string()));
    }

    #[test]
    fn test_tokenize_dedupes_and_caps() {
        let text = "alpha alpha beta gamma delta epsilon zeta theta iota kappa lambda omicron sigma upsilon";
        let tokens = tokenize(text);
        assert_eq!(tokens.iter().filter(|t| *t == "alpha").count(), 1);
        assert!(tokens.len() <= TOKEN_CAP);
    }

    #[test]
    fn test_tokenize_keeps_cjk() {
        let tokens = tokenize("请完成安全验证后继续");
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].chars().count() >= TOKEN_MIN_LEN);
    }

    #[test]
    fn test_learned_keyword_visible_to_scan_path() {
        let store = MemoryStore::open_in_memory().unwrap();
        store.add_bot_keywords_from_text("Pardon our interruption").unwrap();
        let keywords = store.get_bot_keywords().unwrap();
        let title = "PARDON our interruption - example.com";
        let hit = keywords
            .iter()
            .find(|k| title.to_lowercase().contains(k.as_str()));
        assert!(hit.is_some());
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.sqlite");
        {
            let store = MemoryStore::open(&path).unwrap();
            store.save(&record("t", &["disk"], MemoryStatus::Success, 5)).unwrap();
            store.add_bot_keyword("press and hold").unwrap();
        }
        // reopen, data survives
        let store = MemoryStore::open(&path).unwrap();
        assert!(store.get("t").unwrap().is_some());
        assert!(store.get_bot_keywords().unwrap().iter().any(|k| k == "press and hold"));
    }
}
