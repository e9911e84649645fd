use thiserror::Error;

/// Per-event failures. Nothing here is fatal to the process; every failure
/// is scoped to the event that produced it.
///
/// Validation errors are reported back to the originating connection as a
/// typed `error` event. Storage failures are logged and make the triggering
/// event a no-op from the caller's perspective. Delivery failures to third
/// parties never surface anywhere; they are swallowed per recipient at the
/// send site.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The event payload lacked a user id.
    #[error("user_id is required")]
    MissingUserId,

    /// A location update lacked user_id, latitude or longitude.
    #[error("user_id, latitude and longitude are required")]
    MissingFields,

    /// Durable storage rejected the operation.
    #[error("storage failure: {0}")]
    Storage(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PresenceError {
    fn from(e: sqlx::Error) -> Self {
        PresenceError::Storage(e.to_string())
    }
}
