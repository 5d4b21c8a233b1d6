//! PostgreSQL access for users, posts, tags, images and dashboard figures.

mod bootstrap;
mod dashboard;
mod images;
mod posts;
mod tags;
mod users;

pub use posts::PostFilter;

use sqlx::PgPool;

#[derive(Clone)]
pub struct DatabaseService {
    pool: PgPool,
}

impl DatabaseService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get database connection pool reference
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Liveness probe for the extended health check
    pub async fn ping(&self) -> bool {
        shared::database::health_check(&self.pool).await
    }
}
