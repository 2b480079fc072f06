//! Full-text index over stored messages.
//!
//! An FTS5 table holds one document per logged message, keyed by
//! `"<server>:<target>:<id>"`. Message content is indexed with English
//! stemming; server and target are stored verbatim and filtered by exact
//! equality. Queries are fuzzy: each term also matches indexed vocabulary
//! within edit distance two.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::StoreError;

/// Maximum edit distance for content term matching.
const FUZZINESS: usize = 2;

const SCHEMA: &str = "
CREATE VIRTUAL TABLE IF NOT EXISTS message_index USING fts5(
    doc_id UNINDEXED,
    server UNINDEXED,
    target UNINDEXED,
    content,
    tokenize = 'porter unicode61'
);
CREATE VIRTUAL TABLE IF NOT EXISTS message_terms USING fts5vocab('message_index', 'row');
";

pub(crate) struct SearchIndex {
    conn: Mutex<Connection>,
}

impl SearchIndex {
    /// Open or build the index inside `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = dir.join("messages.sqlite");
        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA)?;
        crate::store::restrict_file(&path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Index one document. `doc_id` is `"<bucket>:<id>"`; ids are unique per
    /// bucket, so duplicates are never produced.
    pub fn add(
        &self,
        doc_id: &str,
        server: &str,
        target: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO message_index (doc_id, server, target, content) VALUES (?1, ?2, ?3, ?4)",
            params![doc_id, server, target, content],
        )?;
        Ok(())
    }

    /// Run a conjunctive query: exact server, exact target, fuzzy content.
    /// Returns matching document ids in relevance order.
    pub fn search(
        &self,
        server: &str,
        target: &str,
        query: &str,
    ) -> Result<Vec<String>, StoreError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();

        // Expand each query term against the indexed vocabulary: any term
        // within the edit distance budget also matches.
        let mut expanded: BTreeSet<String> = terms.iter().cloned().collect();
        let mut stmt = conn.prepare("SELECT term FROM message_terms")?;
        let vocab = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for entry in vocab {
            let entry = entry?;
            if terms.iter().any(|t| within_distance(t, &entry, FUZZINESS)) {
                expanded.insert(entry);
            }
        }

        let match_expr = expanded
            .iter()
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut stmt = conn.prepare(
            "SELECT doc_id FROM message_index
             WHERE message_index MATCH ?1 AND server = ?2 AND target = ?3
             ORDER BY rank",
        )?;
        let rows = stmt.query_map(params![match_expr, server, target], |row| {
            row.get::<_, String>(0)
        })?;

        let mut doc_ids = Vec::new();
        for row in rows {
            doc_ids.push(row?);
        }
        Ok(doc_ids)
    }
}

/// Levenshtein distance bounded check with an early exit per row.
fn within_distance(a: &str, b: &str, max: usize) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return false;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        cur[0] = i;
        let mut row_min = cur[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(cur[j]);
        }
        if row_min > max {
            return false;
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()] <= max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_distance_bounds() {
        assert!(within_distance("hi", "hi", 2));
        assert!(within_distance("hi", "hii", 2));
        assert!(within_distance("hello", "hallo", 2));
        assert!(within_distance("hello", "hxlxo", 2));
        assert!(!within_distance("hello", "goodbye", 2));
        assert!(!within_distance("hi", "hiiii", 2));
        assert!(within_distance("", "ab", 2));
        assert!(!within_distance("", "abc", 2));
    }
}
