#[cfg(feature = "postgres")]
use sqlx::PgPool;

/// Durable backend handles. Empty when running purely in memory.
pub struct BackendState {
    #[cfg(feature = "postgres")]
    pub db: Option<PgPool>,
}

impl BackendState {
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "postgres")]
            db: None,
        }
    }
}
