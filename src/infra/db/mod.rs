//! Postgres-backed repository implementations.

mod audit;
mod cache_history;
mod playlists;
mod subscriptions;
mod sync;
mod util;
mod videos;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{RepoError, VideoQueryFilter};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    fn apply_video_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q VideoQueryFilter) {
        if let Some(tier) = filter.tier {
            qb.push(" AND v.tier = ");
            qb.push_bind(tier);
        }

        if let Some(playlist_id) = filter.playlist_id.as_ref() {
            qb.push(" AND ");
            qb.push_bind(playlist_id);
            qb.push(" = ANY(v.playlists)");
        }

        if let Some(search) = filter.search.as_ref() {
            qb.push(" AND (v.title ILIKE ");
            qb.push_bind(format!("%{}%", search));
            qb.push(" OR v.description ILIKE ");
            qb.push_bind(format!("%{}%", search));
            qb.push(")");
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}
