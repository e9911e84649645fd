use std::collections::HashMap;

use serde_json::Value;

use crate::UserId;

/// Profile summary owned by the external account component. The presence
/// core only ever reads these.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub username: String,
    pub headline: Option<String>,
    pub avatar_data: Value,
    pub is_active: bool,
}

/// Account collaborator directory. When a Postgres pool is attached the
/// `users` table is the source of truth and this map is bypassed; without
/// one, this map IS the directory.
pub struct AccountState {
    accounts: HashMap<UserId, AccountRecord>,
}

impl AccountState {
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
        }
    }

    pub fn upsert(&mut self, user_id: UserId, record: AccountRecord) {
        self.accounts.insert(user_id, record);
    }

    pub fn get(&self, user_id: UserId) -> Option<&AccountRecord> {
        self.accounts.get(&user_id)
    }

    /// Unknown users are treated as inactive.
    pub fn is_active(&self, user_id: UserId) -> bool {
        self.accounts
            .get(&user_id)
            .map(|record| record.is_active)
            .unwrap_or(false)
    }
}
