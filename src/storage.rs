//! SQLite storage layer for AdIntel.
//!
//! Three tables: `offers`, `ad_counts` and `notes`. Timestamps are stored
//! as Unix milliseconds so that rapid successive samples keep their order.
//! Tags are stored as a JSON array in a TEXT column.

use anyhow::{Context, anyhow};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::model::{AdCount, NewOffer, Note, Offer, OfferUpdate};

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:adintel.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS offers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                link TEXT NOT NULL DEFAULT '',
                tags TEXT,
                last_ad_count INTEGER NOT NULL DEFAULT 0,
                last_ad_count_ts INTEGER,
                is_archived INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ad_counts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                offer_id INTEGER NOT NULL,
                count INTEGER NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                offer_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                ts INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-offer history is always read newest first
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ad_counts_offer_ts
            ON ad_counts(offer_id, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_notes_offer_ts
            ON notes(offer_id, ts)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a new offer. It starts active, with no ad counts.
    pub async fn insert_offer(
        &self,
        offer: &NewOffer,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Offer> {
        let tags = encode_tags(offer.tags.as_deref())?;

        let result = sqlx::query(
            r#"
            INSERT INTO offers (name, link, tags, last_ad_count, is_archived, created_at)
            VALUES (?, ?, ?, 0, 0, ?)
            "#,
        )
        .bind(&offer.name)
        .bind(&offer.link)
        .bind(tags)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.get_offer(result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow!("offer vanished after insert"))
    }

    /// All offers, newest first.
    pub async fn list_offers(&self) -> anyhow::Result<Vec<Offer>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM offers
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(offer_from_row).collect()
    }

    pub async fn get_offer(&self, id: i64) -> anyhow::Result<Option<Offer>> {
        let row = sqlx::query("SELECT * FROM offers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(offer_from_row).transpose()
    }

    /// Apply a partial update. Returns `None` if the offer does not exist.
    pub async fn update_offer(
        &self,
        id: i64,
        update: &OfferUpdate,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Offer>> {
        let Some(current) = self.get_offer(id).await? else {
            return Ok(None);
        };

        let name = update.name.as_ref().unwrap_or(&current.name);
        let link = update.link.as_ref().unwrap_or(&current.link);
        let tags = match &update.tags {
            Some(tags) => tags.as_deref(),
            None => current.tags.as_deref(),
        };

        sqlx::query(
            r#"
            UPDATE offers
            SET name = ?, link = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(name)
        .bind(link)
        .bind(encode_tags(tags)?)
        .bind(now.timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.get_offer(id).await
    }

    /// Flip the archived flag in a single statement.
    ///
    /// Returns the updated offer, or `None` if it does not exist.
    pub async fn toggle_archived(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<Offer>> {
        let row = sqlx::query(
            r#"
            UPDATE offers
            SET is_archived = NOT is_archived, updated_at = ?
            WHERE id = ?
            RETURNING *
            "#,
        )
        .bind(now.timestamp_millis())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(offer_from_row).transpose()
    }

    /// Delete an offer together with its ad counts and notes.
    ///
    /// Returns `false` if the offer did not exist.
    pub async fn delete_offer(&self, id: i64) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ad_counts WHERE offer_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM notes WHERE offer_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM offers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record an ad count and make it the offer's latest count.
    ///
    /// The caller is responsible for checking that the offer exists.
    pub async fn insert_ad_count(
        &self,
        offer_id: i64,
        count: i64,
        at: DateTime<Utc>,
    ) -> anyhow::Result<AdCount> {
        let ts = at.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO ad_counts (offer_id, count, ts)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(offer_id)
        .bind(count)
        .bind(ts)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE offers
            SET last_ad_count = ?, last_ad_count_ts = ?
            WHERE id = ?
            "#,
        )
        .bind(count)
        .bind(ts)
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AdCount {
            id: result.last_insert_rowid(),
            offer_id,
            count,
            timestamp: from_millis(ts)?,
        })
    }

    /// Ad counts for an offer, newest first, optionally limited.
    pub async fn list_ad_counts(
        &self,
        offer_id: i64,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<AdCount>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map_or(-1, i64::from);

        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, count, ts
            FROM ad_counts
            WHERE offer_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(offer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<AdCount> {
                Ok(AdCount {
                    id: row.try_get("id")?,
                    offer_id: row.try_get("offer_id")?,
                    count: row.try_get("count")?,
                    timestamp: from_millis(row.try_get("ts")?)?,
                })
            })
            .collect()
    }

    /// Delete one ad count and refresh the offer's latest count from what remains.
    ///
    /// Returns `false` if no such ad count belongs to the offer.
    pub async fn delete_ad_count(&self, offer_id: i64, ad_count_id: i64) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM ad_counts WHERE id = ? AND offer_id = ?")
            .bind(ad_count_id)
            .bind(offer_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let newest = sqlx::query(
            r#"
            SELECT count, ts
            FROM ad_counts
            WHERE offer_id = ?
            ORDER BY ts DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (last_count, last_ts): (i64, Option<i64>) = match newest {
            Some(row) => (row.try_get("count")?, Some(row.try_get("ts")?)),
            None => (0, None),
        };

        sqlx::query(
            r#"
            UPDATE offers
            SET last_ad_count = ?, last_ad_count_ts = ?
            WHERE id = ?
            "#,
        )
        .bind(last_count)
        .bind(last_ts)
        .bind(offer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(true)
    }

    pub async fn insert_note(
        &self,
        offer_id: i64,
        text: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Note> {
        let ts = at.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT INTO notes (offer_id, text, ts)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(offer_id)
        .bind(text)
        .bind(ts)
        .execute(&self.pool)
        .await?;

        Ok(Note {
            id: result.last_insert_rowid(),
            offer_id,
            text: text.to_string(),
            timestamp: from_millis(ts)?,
        })
    }

    /// Notes for an offer, newest first.
    pub async fn list_notes(&self, offer_id: i64) -> anyhow::Result<Vec<Note>> {
        let rows = sqlx::query(
            r#"
            SELECT id, offer_id, text, ts
            FROM notes
            WHERE offer_id = ?
            ORDER BY ts DESC, id DESC
            "#,
        )
        .bind(offer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> anyhow::Result<Note> {
                Ok(Note {
                    id: row.try_get("id")?,
                    offer_id: row.try_get("offer_id")?,
                    text: row.try_get("text")?,
                    timestamp: from_millis(row.try_get("ts")?)?,
                })
            })
            .collect()
    }

    /// Returns `false` if no such note belongs to the offer.
    pub async fn delete_note(&self, offer_id: i64, note_id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM notes WHERE id = ? AND offer_id = ?")
            .bind(note_id)
            .bind(offer_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn offer_from_row(row: &SqliteRow) -> anyhow::Result<Offer> {
    let tags: Option<String> = row.try_get("tags")?;
    let last_ad_count_ts: Option<i64> = row.try_get("last_ad_count_ts")?;
    let updated_at: Option<i64> = row.try_get("updated_at")?;

    Ok(Offer {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        link: row.try_get("link")?,
        tags: tags
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("malformed tags column")?,
        last_ad_count: row.try_get("last_ad_count")?,
        last_ad_count_timestamp: last_ad_count_ts.map(from_millis).transpose()?,
        is_archived: row.try_get("is_archived")?,
        created_at: from_millis(row.try_get("created_at")?)?,
        updated_at: updated_at.map(from_millis).transpose()?,
    })
}

fn encode_tags(tags: Option<&[String]>) -> anyhow::Result<Option<String>> {
    Ok(tags.map(serde_json::to_string).transpose()?)
}

fn from_millis(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}
