use std::{path::Path, time::Duration};

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, types::ValueRef, Connection, ToSql};
use serde_json::{Number, Value};
use tracing::info;

use crate::{
    error::ServiceResult,
    models::{ReviewText, Row, SentimentSummary, TableCounts, TopicRecord},
};

type PooledConn = PooledConnection<SqliteConnectionManager>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS brands (
    brand_id INTEGER PRIMARY KEY,
    brand_name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS phones (
    phone_id INTEGER PRIMARY KEY,
    brand_id INTEGER NOT NULL REFERENCES brands(brand_id),
    phone_name TEXT NOT NULL,
    release_year INTEGER,
    price REAL
);
CREATE TABLE IF NOT EXISTS reviews (
    review_id INTEGER PRIMARY KEY,
    phone_id INTEGER NOT NULL REFERENCES phones(phone_id),
    review_text TEXT NOT NULL,
    review_date TEXT
);
CREATE TABLE IF NOT EXISTS sentiments (
    sentiment_id INTEGER PRIMARY KEY,
    review_id INTEGER NOT NULL UNIQUE REFERENCES reviews(review_id),
    sentiment_label TEXT NOT NULL,
    sentiment_score REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS topics (
    topic_id INTEGER PRIMARY KEY,
    phone_id INTEGER NOT NULL REFERENCES phones(phone_id),
    topic_label TEXT NOT NULL,
    representative_terms TEXT NOT NULL,
    UNIQUE (phone_id, topic_label)
);
CREATE TABLE IF NOT EXISTS review_topics (
    review_topic_id INTEGER PRIMARY KEY,
    review_id INTEGER NOT NULL REFERENCES reviews(review_id),
    topic_id INTEGER NOT NULL REFERENCES topics(topic_id),
    relevance_score REAL NOT NULL,
    UNIQUE (review_id, topic_id)
);
CREATE INDEX IF NOT EXISTS idx_phones_brand ON phones(brand_id);
CREATE INDEX IF NOT EXISTS idx_reviews_phone ON reviews(phone_id);
CREATE INDEX IF NOT EXISTS idx_topics_phone ON topics(phone_id);
";

const TABLES: [&str; 6] = [
    "brands",
    "phones",
    "reviews",
    "sentiments",
    "topics",
    "review_topics",
];

/// Applied to every connection the pool opens.
#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub rows_affected: usize,
    pub last_insert_id: i64,
}

/// Pooled access to the review database. Each call checks a connection out
/// and hands it back when the guard drops, including on error paths.
#[derive(Clone)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
}

impl Store {
    pub fn open(path: &Path, pool_size: u32) -> ServiceResult<Self> {
        let store = Self::build(SqliteConnectionManager::file(path), pool_size)?;
        store.conn()?.execute_batch("PRAGMA journal_mode = WAL;")?;
        store.ensure_schema()?;
        info!(path = %path.display(), pool_size, "Review store opened");
        Ok(store)
    }

    /// Private in-memory database shared by every connection in this pool.
    pub fn open_in_memory() -> ServiceResult<Self> {
        let name = uuid::Uuid::new_v4().to_string();
        let manager =
            SqliteConnectionManager::file(format!("file:{name}?mode=memory&cache=shared"));
        let store = Self::build(manager, 2)?;
        store.ensure_schema()?;
        Ok(store)
    }

    fn build(manager: SqliteConnectionManager, pool_size: u32) -> ServiceResult<Self> {
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;
        Ok(Self { pool })
    }

    pub fn ensure_schema(&self) -> ServiceResult<()> {
        self.conn()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> ServiceResult<PooledConn> {
        Ok(self.pool.get()?)
    }

    /// Run a parameterized select and return each row as a column -> value map.
    pub fn query(&self, sql: &str, params: &[&dyn ToSql]) -> ServiceResult<Vec<Row>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut rows = stmt.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut mapped = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                mapped.insert(column.clone(), json_value(row.get_ref(idx)?));
            }
            out.push(mapped);
        }
        Ok(out)
    }

    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> ServiceResult<Execution> {
        let conn = self.conn()?;
        let rows_affected = conn.execute(sql, params)?;
        Ok(Execution {
            rows_affected,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    pub fn list_brands(&self) -> ServiceResult<Vec<Row>> {
        self.query("SELECT * FROM brands", params![])
    }

    pub fn list_phones(&self, brand_id: i64) -> ServiceResult<Vec<Row>> {
        self.query("SELECT * FROM phones WHERE brand_id = ?1", params![brand_id])
    }

    pub fn list_reviews(&self, phone_id: i64) -> ServiceResult<Vec<Row>> {
        self.query("SELECT * FROM reviews WHERE phone_id = ?1", params![phone_id])
    }

    pub fn list_topics(&self, phone_id: i64) -> ServiceResult<Vec<Row>> {
        self.query("SELECT * FROM topics WHERE phone_id = ?1", params![phone_id])
    }

    pub fn sentiment_summary(&self, phone_id: i64) -> ServiceResult<SentimentSummary> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.sentiment_label, COUNT(*) FROM sentiments s
             INNER JOIN reviews r ON s.review_id = r.review_id
             WHERE r.phone_id = ?1
             GROUP BY s.sentiment_label",
        )?;
        let rows = stmt.query_map(params![phone_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut summary = SentimentSummary::new();
        for row in rows {
            let (label, count) = row?;
            summary.insert(label, count);
        }
        Ok(summary)
    }

    /// Phone row joined with its brand name, review count, sentiment summary
    /// and topic labels. `None` when the phone does not exist.
    pub fn phone_overview(&self, phone_id: i64) -> ServiceResult<Option<Row>> {
        let mut rows = self.query(
            "SELECT p.*, b.brand_name,
                    (SELECT COUNT(*) FROM reviews r WHERE r.phone_id = p.phone_id) AS review_count
             FROM phones p
             LEFT JOIN brands b ON b.brand_id = p.brand_id
             WHERE p.phone_id = ?1",
            params![phone_id],
        )?;
        let Some(mut overview) = rows.pop() else {
            return Ok(None);
        };

        let sentiments = self.sentiment_summary(phone_id)?;
        overview.insert(
            "sentiments".to_string(),
            Value::Object(
                sentiments
                    .into_iter()
                    .map(|(label, count)| (label, Value::from(count)))
                    .collect(),
            ),
        );

        let labels: Vec<String> = self
            .topic_records(phone_id)?
            .into_iter()
            .map(|topic| topic.topic_label)
            .collect();
        overview.insert("topics".to_string(), Value::String(labels.join(", ")));

        Ok(Some(overview))
    }

    pub fn table_counts(&self) -> ServiceResult<TableCounts> {
        let conn = self.conn()?;
        let mut counts = [0i64; TABLES.len()];
        for (slot, table) in counts.iter_mut().zip(TABLES) {
            *slot = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })?;
        }
        let [brands, phones, reviews, sentiments, topics, review_topics] = counts;
        Ok(TableCounts {
            brands,
            phones,
            reviews,
            sentiments,
            topics,
            review_topics,
        })
    }

    pub fn all_reviews(&self) -> ServiceResult<Vec<ReviewText>> {
        self.review_texts(
            "SELECT review_id, phone_id, review_text FROM reviews ORDER BY review_id",
            params![],
        )
    }

    pub fn reviews_for_phone(&self, phone_id: i64) -> ServiceResult<Vec<ReviewText>> {
        self.review_texts(
            "SELECT review_id, phone_id, review_text FROM reviews
             WHERE phone_id = ?1 ORDER BY review_id",
            params![phone_id],
        )
    }

    fn review_texts(&self, sql: &str, params: &[&dyn ToSql]) -> ServiceResult<Vec<ReviewText>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(ReviewText {
                review_id: row.get(0)?,
                phone_id: row.get(1)?,
                review_text: row.get(2)?,
            })
        })?;

        let mut reviews = Vec::new();
        for row in rows {
            reviews.push(row?);
        }
        Ok(reviews)
    }

    pub fn phone_ids(&self) -> ServiceResult<Vec<i64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT phone_id FROM phones ORDER BY phone_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn upsert_sentiment(&self, review_id: i64, label: &str, score: f64) -> ServiceResult<()> {
        self.execute(
            "INSERT INTO sentiments (review_id, sentiment_label, sentiment_score)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(review_id) DO UPDATE SET
                 sentiment_label = excluded.sentiment_label,
                 sentiment_score = excluded.sentiment_score",
            params![review_id, label, score],
        )?;
        Ok(())
    }

    /// Insert the topic or refresh its terms, returning the row id either way.
    ///
    /// `RETURNING` yields the id of the conflicting row too, so callers never
    /// need a follow-up lookup by `(phone_id, topic_label)`.
    pub fn upsert_topic(
        &self,
        phone_id: i64,
        topic_label: &str,
        representative_terms: &str,
    ) -> ServiceResult<i64> {
        let conn = self.conn()?;
        let topic_id = conn.query_row(
            "INSERT INTO topics (phone_id, topic_label, representative_terms)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(phone_id, topic_label) DO UPDATE SET
                 representative_terms = excluded.representative_terms
             RETURNING topic_id",
            params![phone_id, topic_label, representative_terms],
            |row| row.get(0),
        )?;
        Ok(topic_id)
    }

    pub fn upsert_review_topic(
        &self,
        review_id: i64,
        topic_id: i64,
        relevance_score: f64,
    ) -> ServiceResult<()> {
        self.execute(
            "INSERT INTO review_topics (review_id, topic_id, relevance_score)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(review_id, topic_id) DO UPDATE SET
                 relevance_score = excluded.relevance_score",
            params![review_id, topic_id, relevance_score],
        )?;
        Ok(())
    }

    pub fn topic_records(&self, phone_id: i64) -> ServiceResult<Vec<TopicRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT topic_id, phone_id, topic_label, representative_terms FROM topics
             WHERE phone_id = ?1 ORDER BY topic_id",
        )?;
        let rows = stmt.query_map(params![phone_id], |row| {
            Ok(TopicRecord {
                topic_id: row.get(0)?,
                phone_id: row.get(1)?,
                topic_label: row.get(2)?,
                representative_terms: row.get(3)?,
            })
        })?;

        let mut topics = Vec::new();
        for row in rows {
            topics.push(row?);
        }
        Ok(topics)
    }

    #[cfg(test)]
    pub(crate) fn review_topic_links(
        &self,
    ) -> ServiceResult<Vec<crate::models::ReviewTopicLink>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT review_id, topic_id, relevance_score FROM review_topics
             ORDER BY review_id, topic_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(crate::models::ReviewTopicLink {
                review_id: row.get(0)?,
                topic_id: row.get(1)?,
                relevance_score: row.get(2)?,
            })
        })?;

        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    #[cfg(test)]
    pub(crate) fn stored_sentiments(&self) -> ServiceResult<Vec<crate::models::StoredSentiment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT review_id, sentiment_label, sentiment_score FROM sentiments
             ORDER BY review_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(crate::models::StoredSentiment {
                review_id: row.get(0)?,
                label: row.get(1)?,
                score: row.get(2)?,
            })
        })?;

        let mut sentiments = Vec::new();
        for row in rows {
            sentiments.push(row?);
        }
        Ok(sentiments)
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::from(v),
        ValueRef::Real(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}
