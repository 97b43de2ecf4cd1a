use axum::extract::{Query, State};
use chrono::Utc;
use tracing::info;

use reel_db::Database;
use reel_db::models::MessageRow;
use reel_types::api::{ChatQuery, ChatResponse, Empty, MessageActionRequest};
use reel_types::models::{Message, UserId};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ServiceError;
use crate::extractors::AuthUser;
use crate::graph::RelationGraph;
use crate::response::Reply;

const ACTION_SEND: i32 = 1;

pub async fn message_action(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(req): Query<MessageActionRequest>,
) -> Result<Reply<Empty>, ServiceError> {
    if req.action_type != ACTION_SEND {
        return Err(ServiceError::validation(format!("unknown action_type {}", req.action_type)));
    }
    let db = state.db.clone();
    blocking(move || send_message(&db, viewer, req.to_user_id, &req.content)).await?;
    Ok(Reply::ok(Empty::default()))
}

pub async fn chat(
    State(state): State<AppState>,
    AuthUser(viewer): AuthUser,
    Query(query): Query<ChatQuery>,
) -> Result<Reply<ChatResponse>, ServiceError> {
    let db = state.db.clone();
    let message_list =
        blocking(move || chat_history(&db, viewer, query.to_user_id, query.pre_msg_time)).await?;
    Ok(Reply::ok(ChatResponse { message_list }))
}

pub fn send_message(
    db: &Database,
    from: UserId,
    to: UserId,
    content: &str,
) -> Result<Message, ServiceError> {
    if from == to {
        return Err(ServiceError::validation("cannot message yourself"));
    }
    if content.trim().is_empty() {
        return Err(ServiceError::validation("message content is empty"));
    }
    RelationGraph::new(db).require_user(to)?;

    let created_at = Utc::now().timestamp_millis();
    let id = db.insert_message(from, to, content, created_at).map_err(|e| {
        ServiceError::internal(format!("store message from user {} to user {}", from, to), e)
    })?;
    info!(message_id = id, from, to, "message sent");

    Ok(Message {
        id,
        to_user_id: to,
        from_user_id: from,
        content: content.to_string(),
        create_time: created_at,
    })
}

/// Messages between `viewer` and `other` in both directions, strictly newer
/// than `after` (from the beginning when absent), oldest first.
pub fn chat_history(
    db: &Database,
    viewer: UserId,
    other: UserId,
    after: Option<i64>,
) -> Result<Vec<Message>, ServiceError> {
    RelationGraph::new(db).require_user(other)?;
    let rows = db.chat_history(viewer, other, after.unwrap_or(0)).map_err(|e| {
        ServiceError::internal(
            format!("load chat between user {} and user {}", viewer, other),
            e,
        )
    })?;
    Ok(rows.into_iter().map(to_message).collect())
}

fn to_message(row: MessageRow) -> Message {
    Message {
        id: row.id,
        to_user_id: row.to_user_id,
        from_user_id: row.from_user_id,
        content: row.content,
        create_time: row.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::seed;

    #[test]
    fn send_validates_before_writing() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["a", "b"]);

        assert!(matches!(send_message(&db, u[0], u[0], "hi"), Err(ServiceError::Validation(_))));
        assert!(matches!(send_message(&db, u[0], u[1], "  "), Err(ServiceError::Validation(_))));
        assert!(matches!(send_message(&db, u[0], 77, "hi"), Err(ServiceError::UserNotFound(77))));
        assert!(chat_history(&db, u[0], u[1], None).unwrap().is_empty());
    }

    #[test]
    fn chat_returns_both_directions_after_the_cursor() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["a", "b", "c"]);
        db.insert_message(u[0], u[1], "one", 10).unwrap();
        db.insert_message(u[1], u[0], "two", 20).unwrap();
        db.insert_message(u[0], u[2], "elsewhere", 25).unwrap();
        db.insert_message(u[0], u[1], "three", 30).unwrap();

        let all: Vec<String> = chat_history(&db, u[1], u[0], None)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(all, vec!["one", "two", "three"]);

        let newer = chat_history(&db, u[0], u[1], Some(20)).unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].content, "three");
        assert_eq!(newer[0].from_user_id, u[0]);
        assert_eq!(newer[0].create_time, 30);
    }
}
