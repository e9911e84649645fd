//! The presence protocol handler: reacts to connect/disconnect/join/leave/
//! update events, orchestrates the session registry, the location store and
//! the proximity matcher, and emits outbound messages.

use std::collections::HashSet;

use hyper_tungstenite::tungstenite::Message;
use log::{debug, error, info};

use crate::error::PresenceError;
use crate::geo;
use crate::protocol::{NearbyUser, PresenceMessage};
use crate::{ConnId, SharedState, UserId, WebSocketSender};

/// Shared room every tracking connection joins.
pub const TRACKING_ROOM: &str = "location:tracking";

/// Private per-user topic for targeted neighbor pushes.
pub fn user_room(user_id: UserId) -> String {
    format!("user:{}", user_id)
}

/// A new channel was accepted. No presence state changes until `join`.
pub async fn handle_connect(conn_id: &ConnId, state: &SharedState, sender: &WebSocketSender) {
    state
        .sessions
        .lock()
        .await
        .insert_sender(conn_id.clone(), sender.clone());
    send_to(
        sender,
        &PresenceMessage::Status {
            message: "Connected to presence server".to_string(),
        },
    );
}

/// The transport closed. Connections that never joined leave no trace.
pub async fn handle_disconnect(conn_id: &ConnId, state: &SharedState) {
    let freed = {
        let mut sessions = state.sessions.lock().await;
        sessions.remove_sender(conn_id);
        sessions.unregister_by_conn(conn_id)
    };

    state.rooms.lock().await.leave_all(conn_id);

    if let Some(user_id) = freed {
        delete_location(state, user_id).await;
        info!("user {} disconnected from location tracking", user_id);
    }
}

pub async fn handle_message(
    msg: PresenceMessage,
    conn_id: &ConnId,
    state: &SharedState,
    sender: &WebSocketSender,
) -> Result<(), PresenceError> {
    match msg {
        PresenceMessage::Join { user_id } => handle_join(user_id, conn_id, state, sender).await,
        PresenceMessage::Leave { user_id } => handle_leave(user_id, conn_id, state, sender).await,
        PresenceMessage::Update {
            user_id,
            latitude,
            longitude,
            ..
        } => handle_update(user_id, latitude, longitude, state, sender).await,
        PresenceMessage::Status { .. }
        | PresenceMessage::Error { .. }
        | PresenceMessage::NearbyUsers { .. } => {
            // Server-to-client shapes arriving inbound are client errors.
            send_to(
                sender,
                &PresenceMessage::Error {
                    message: "unsupported event type".to_string(),
                },
            );
            Ok(())
        }
    }
}

async fn handle_join(
    user_id: Option<UserId>,
    conn_id: &ConnId,
    state: &SharedState,
    sender: &WebSocketSender,
) -> Result<(), PresenceError> {
    let user_id = user_id.ok_or(PresenceError::MissingUserId)?;

    let superseded = {
        let mut sessions = state.sessions.lock().await;
        sessions.register(user_id, conn_id.clone())
    };

    {
        let mut rooms = state.rooms.lock().await;
        // The new connection becomes sole owner; the old one loses its
        // memberships but may still disconnect later without effect.
        if let Some(old_conn) = superseded {
            rooms.leave_all(&old_conn);
        }
        rooms.join(TRACKING_ROOM, conn_id);
        rooms.join(&user_room(user_id), conn_id);
    }

    info!("user {} joined location tracking on {}", user_id, conn_id);
    send_to(
        sender,
        &PresenceMessage::Status {
            message: "Location tracking enabled".to_string(),
        },
    );
    Ok(())
}

async fn handle_leave(
    user_id: Option<UserId>,
    conn_id: &ConnId,
    state: &SharedState,
    sender: &WebSocketSender,
) -> Result<(), PresenceError> {
    let user_id = user_id.ok_or(PresenceError::MissingUserId)?;

    let owning_conn = { state.sessions.lock().await.unregister(user_id) };

    {
        let mut rooms = state.rooms.lock().await;
        rooms.leave(TRACKING_ROOM, conn_id);
        rooms.leave(&user_room(user_id), conn_id);
        if let Some(old_conn) = owning_conn.as_ref().filter(|old| *old != conn_id) {
            rooms.leave(TRACKING_ROOM, old_conn);
            rooms.leave(&user_room(user_id), old_conn);
        }
    }

    delete_location(state, user_id).await;

    info!("user {} left location tracking", user_id);
    send_to(
        sender,
        &PresenceMessage::Status {
            message: "Location tracking disabled".to_string(),
        },
    );
    Ok(())
}

async fn handle_update(
    user_id: Option<UserId>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    state: &SharedState,
    sender: &WebSocketSender,
) -> Result<(), PresenceError> {
    let (Some(user_id), Some(latitude), Some(longitude)) = (user_id, latitude, longitude) else {
        return Err(PresenceError::MissingFields);
    };

    // Updates from users with no live session never create a row: the row
    // exists only for registered, active users that have streamed a fix.
    if !state.sessions.lock().await.is_registered(user_id) {
        send_to(sender, &PresenceMessage::NearbyUsers { users: Vec::new() });
        return Ok(());
    }

    // The durable account flag, not the live session, decides whether a
    // location may be stored at all. A user that toggled activity off
    // without an explicit leave lands here too.
    let active = match account_is_active(state, user_id).await {
        Ok(active) => active,
        Err(e) => {
            error!("failed to read activity for {}: {}", user_id, e);
            return Ok(());
        }
    };
    if !active {
        delete_location(state, user_id).await;
        send_to(sender, &PresenceMessage::NearbyUsers { users: Vec::new() });
        return Ok(());
    }

    if let Err(e) = store_location(state, user_id, latitude, longitude).await {
        // No partial writes: the event becomes a no-op for the caller.
        error!("failed to store location for {}: {}", user_id, e);
        return Ok(());
    }

    // One candidate load per update; every viewer's list below derives
    // from it.
    let candidates = load_candidates(state).await;
    let radius = state.config.proximity_radius_meters;

    let caller_view = neighbor_view(&candidates, user_id, latitude, longitude, radius);
    send_to(
        sender,
        &PresenceMessage::NearbyUsers {
            users: caller_view.clone(),
        },
    );

    // Each neighbor sees the pairing from their own side: the distance
    // test is symmetric, the exclusion subject is not.
    for neighbor in &caller_view {
        let view = neighbor_view(
            &candidates,
            neighbor.user_id,
            neighbor.latitude,
            neighbor.longitude,
            radius,
        );
        publish_to_room(
            state,
            &user_room(neighbor.user_id),
            &PresenceMessage::NearbyUsers { users: view },
        )
        .await;
    }

    Ok(())
}

/// One viewer's neighbor list: everyone else in the candidate set within
/// the notification radius of the viewer's coordinates.
fn neighbor_view(
    candidates: &[NearbyUser],
    viewer: UserId,
    latitude: f64,
    longitude: f64,
    radius: f64,
) -> Vec<NearbyUser> {
    candidates
        .iter()
        .filter(|c| c.user_id != viewer)
        .filter(|c| geo::within_radius(radius, latitude, longitude, c.latitude, c.longitude))
        .cloned()
        .collect()
}

/// Fresh location rows joined with active accounts, restricted to users
/// with a live session. Viewer exclusion is applied later, per view.
async fn load_candidates(state: &SharedState) -> Vec<NearbyUser> {
    let live: HashSet<UserId> = {
        state
            .sessions
            .lock()
            .await
            .snapshot_active()
            .into_iter()
            .collect()
    };

    #[cfg(feature = "postgres")]
    {
        let pool = { state.backends.lock().await.db.clone() };
        if let Some(pool) = pool {
            match crate::db::fresh_candidates(&pool, state.config.staleness_secs).await {
                Ok(rows) => {
                    return rows
                        .into_iter()
                        .filter(|c| live.contains(&c.user_id))
                        .collect()
                }
                Err(e) => {
                    error!("failed to query nearby candidates: {}", e);
                    return Vec::new();
                }
            }
        }
    }

    let rows = {
        state
            .locations
            .lock()
            .await
            .fresh_rows(state.config.staleness())
    };
    let accounts = state.accounts.lock().await;
    rows.into_iter()
        .filter(|(user_id, _)| live.contains(user_id))
        .filter_map(|(user_id, row)| {
            let account = accounts.get(user_id)?;
            if !account.is_active {
                return None;
            }
            Some(NearbyUser {
                user_id,
                username: account.username.clone(),
                headline: account.headline.clone(),
                avatar_data: account.avatar_data.clone(),
                is_active: account.is_active,
                latitude: row.latitude,
                longitude: row.longitude,
            })
        })
        .collect()
}

/// Prefer the database when enabled; fall back to the in-memory directory.
async fn account_is_active(state: &SharedState, user_id: UserId) -> Result<bool, PresenceError> {
    #[cfg(feature = "postgres")]
    {
        let pool = { state.backends.lock().await.db.clone() };
        if let Some(pool) = pool {
            return crate::db::is_active(&pool, user_id).await;
        }
    }

    Ok(state.accounts.lock().await.is_active(user_id))
}

/// Write the row durably first (when enabled), then to the live store. A
/// database failure aborts before memory is touched.
async fn store_location(
    state: &SharedState,
    user_id: UserId,
    latitude: f64,
    longitude: f64,
) -> Result<(), PresenceError> {
    #[cfg(feature = "postgres")]
    {
        let pool = { state.backends.lock().await.db.clone() };
        if let Some(pool) = pool {
            crate::db::upsert_location(&pool, user_id, latitude, longitude).await?;
        }
    }

    state
        .locations
        .lock()
        .await
        .upsert(user_id, latitude, longitude);
    Ok(())
}

/// Remove the stored row everywhere. The in-memory row is gone either way;
/// a failed durable delete is logged and left to the staleness window.
async fn delete_location(state: &SharedState, user_id: UserId) {
    state.locations.lock().await.delete(user_id);

    #[cfg(feature = "postgres")]
    {
        let pool = { state.backends.lock().await.db.clone() };
        if let Some(pool) = pool {
            if let Err(e) = crate::db::delete_location(&pool, user_id).await {
                error!("failed to delete stored location for {}: {}", user_id, e);
            }
        }
    }
}

/// Serialize and push to one connection. A closed channel is an expected
/// consequence of ephemeral connections; log and move on.
fn send_to(sender: &WebSocketSender, msg: &PresenceMessage) {
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };
    if sender.send(Message::Text(json)).is_err() {
        debug!("dropping message for closed connection");
    }
}

/// Push a message to every member of a room. One failed recipient never
/// aborts the loop over the rest.
async fn publish_to_room(state: &SharedState, room: &str, msg: &PresenceMessage) {
    let Ok(json) = serde_json::to_string(msg) else {
        return;
    };

    let members = { state.rooms.lock().await.members(room) };
    let sessions = state.sessions.lock().await;
    for conn_id in members {
        if let Some(sender) = sessions.sender(&conn_id) {
            if sender.send(Message::Text(json.clone())).is_err() {
                debug!("dropping room message for closed connection {}", conn_id);
            }
        }
    }
}
