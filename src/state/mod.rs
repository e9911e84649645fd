pub mod accounts;
pub mod backends;
pub mod locations;
pub mod rooms;
pub mod sessions;

pub use accounts::{AccountRecord, AccountState};
pub use backends::BackendState;
pub use locations::{LocationState, StoredLocation};
pub use rooms::RoomState;
pub use sessions::SessionState;

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;

/// Main application state wrapping all subsystems.
/// Each subsystem has its own Mutex to reduce contention; registry
/// read-modify-write sequences hold their lock for the whole sequence.
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<Mutex<SessionState>>,
    pub rooms: Arc<Mutex<RoomState>>,
    pub locations: Arc<Mutex<LocationState>>,
    pub accounts: Arc<Mutex<AccountState>>,
    pub backends: Arc<Mutex<BackendState>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(SessionState::new())),
            rooms: Arc::new(Mutex::new(RoomState::new())),
            locations: Arc::new(Mutex::new(LocationState::new())),
            accounts: Arc::new(Mutex::new(AccountState::new())),
            backends: Arc::new(Mutex::new(BackendState::new())),
        }
    }
}
