use crate::domain::feed::{
    CacheReader, FeedItem, FeedKey, FeedMetadata, FeedState, FeedStore, ItemId, PostPayload,
    StateOrigin,
};
use crate::error::AppResult;
use crate::infrastructure::db::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::sync::Arc;

pub struct SqliteFeedStore {
    pool: Arc<DbPool>,
}

impl SqliteFeedStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }

    /// Cached items of a feed in display order
    pub async fn find_by_key(&self, key: &FeedKey) -> AppResult<Vec<FeedItem>> {
        let mut conn = self.pool.acquire().await?;
        Self::items_of(&mut conn, key).await
    }

    async fn items_of(conn: &mut SqliteConnection, key: &FeedKey) -> AppResult<Vec<FeedItem>> {
        let rows = sqlx::query(
            r#"
            SELECT site_id, post_id, position, title, excerpt, url, author,
                   published_at, like_count, is_liked
            FROM feed_items
            WHERE feed_key = $1
            ORDER BY position ASC
            "#,
        )
        .bind(key.to_string())
        .fetch_all(&mut *conn)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn metadata_of(conn: &mut SqliteConnection, key: &FeedKey) -> AppResult<FeedMetadata> {
        let row = sqlx::query(
            r#"
            SELECT last_refreshed_at, is_stale
            FROM feed_meta
            WHERE feed_key = $1
            "#,
        )
        .bind(key.to_string())
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(FeedMetadata {
                last_refreshed_at: row.try_get("last_refreshed_at")?,
                is_stale: row.try_get("is_stale")?,
            }),
            None => Ok(FeedMetadata::default()),
        }
    }

    /// Items and refresh time from one snapshot, so a concurrent
    /// `replace_items` is seen either entirely or not at all.
    async fn load(&self, key: &FeedKey) -> AppResult<FeedState> {
        let mut tx = self.pool.begin().await?;
        let items = Self::items_of(&mut tx, key).await?;
        let metadata = Self::metadata_of(&mut tx, key).await?;
        tx.commit().await?;

        Ok(FeedState::new(
            key.clone(),
            items,
            metadata.last_refreshed_at,
            StateOrigin::Cache,
        ))
    }
}

fn item_from_row(row: &SqliteRow) -> AppResult<FeedItem> {
    Ok(FeedItem {
        id: ItemId {
            site_id: row.try_get("site_id")?,
            post_id: row.try_get("post_id")?,
        },
        position: row.try_get("position")?,
        payload: PostPayload {
            title: row.try_get("title")?,
            excerpt: row.try_get("excerpt")?,
            url: row.try_get("url")?,
            author: row.try_get("author")?,
            published_at: row.try_get("published_at")?,
            like_count: row.try_get("like_count")?,
            is_liked: row.try_get("is_liked")?,
        },
    })
}

#[async_trait]
impl CacheReader for SqliteFeedStore {
    async fn read(&self, key: &FeedKey) -> FeedState {
        match self.load(key).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(feed = %key, error = %e, "Failed to read feed cache");
                FeedState::empty(key.clone())
            }
        }
    }
}

#[async_trait]
impl FeedStore for SqliteFeedStore {
    async fn replace_items(
        &self,
        key: &FeedKey,
        items: &[FeedItem],
        refreshed_at: DateTime<Utc>,
    ) -> AppResult<()> {
        let feed_key = key.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM feed_items WHERE feed_key = $1")
            .bind(&feed_key)
            .execute(&mut *tx)
            .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO feed_items (
                    feed_key, site_id, post_id, position, title, excerpt, url, author,
                    published_at, like_count, is_liked
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (feed_key, site_id, post_id) DO NOTHING
                "#,
            )
            .bind(&feed_key)
            .bind(item.id.site_id)
            .bind(item.id.post_id)
            .bind(item.position)
            .bind(&item.payload.title)
            .bind(&item.payload.excerpt)
            .bind(&item.payload.url)
            .bind(&item.payload.author)
            .bind(item.payload.published_at)
            .bind(item.payload.like_count)
            .bind(item.payload.is_liked)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO feed_meta (feed_key, last_refreshed_at, is_stale)
            VALUES ($1, $2, 0)
            ON CONFLICT (feed_key) DO UPDATE
            SET last_refreshed_at = excluded.last_refreshed_at, is_stale = 0
            "#,
        )
        .bind(&feed_key)
        .bind(refreshed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn metadata(&self, key: &FeedKey) -> AppResult<FeedMetadata> {
        let mut conn = self.pool.acquire().await?;
        Self::metadata_of(&mut conn, key).await
    }

    async fn touch(&self, key: &FeedKey, refreshed_at: DateTime<Utc>) -> AppResult<()> {
        let pool = self.pool.as_ref();
        sqlx::query(
            r#"
            INSERT INTO feed_meta (feed_key, last_refreshed_at, is_stale)
            VALUES ($1, $2, 0)
            ON CONFLICT (feed_key) DO UPDATE
            SET last_refreshed_at = excluded.last_refreshed_at, is_stale = 0
            "#,
        )
        .bind(key.to_string())
        .bind(refreshed_at)
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn mark_stale(&self, key: &FeedKey) -> AppResult<()> {
        let pool = self.pool.as_ref();
        sqlx::query(
            r#"
            INSERT INTO feed_meta (feed_key, last_refreshed_at, is_stale)
            VALUES ($1, NULL, 1)
            ON CONFLICT (feed_key) DO UPDATE SET is_stale = 1
            "#,
        )
        .bind(key.to_string())
        .execute(pool)
        .await?;

        Ok(())
    }

    async fn find_item(&self, id: ItemId) -> AppResult<Option<FeedItem>> {
        let pool = self.pool.as_ref();
        let row = sqlx::query(
            r#"
            SELECT site_id, post_id, position, title, excerpt, url, author,
                   published_at, like_count, is_liked
            FROM feed_items
            WHERE site_id = $1 AND post_id = $2
            LIMIT 1
            "#,
        )
        .bind(id.site_id)
        .bind(id.post_id)
        .fetch_optional(pool)
        .await?;

        row.as_ref().map(item_from_row).transpose()
    }

    async fn set_like(&self, id: ItemId, is_liked: bool, like_count: i64) -> AppResult<()> {
        let pool = self.pool.as_ref();
        sqlx::query(
            r#"
            UPDATE feed_items
            SET is_liked = $1, like_count = $2
            WHERE site_id = $3 AND post_id = $4
            "#,
        )
        .bind(is_liked)
        .bind(like_count.max(0))
        .bind(id.site_id)
        .bind(id.post_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}
