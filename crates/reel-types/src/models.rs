use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type VideoId = i64;

/// A user as seen by a particular viewer.
///
/// `is_follow` is always relative to whoever made the request; the counts are
/// only filled in by the profile endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follower_count: Option<i64>,
    pub is_follow: bool,
}

/// Direction of the latest message attached to a friend, from the subject's
/// point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum MessageDirection {
    Received,
    Sent,
}

impl From<MessageDirection> for i64 {
    fn from(direction: MessageDirection) -> Self {
        match direction {
            MessageDirection::Received => 0,
            MessageDirection::Sent => 1,
        }
    }
}

impl TryFrom<i64> for MessageDirection {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Received),
            1 => Ok(Self::Sent),
            other => Err(format!("unknown message direction {}", other)),
        }
    }
}

/// A mutual follower, with the newest message exchanged with the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendUser {
    #[serde(flatten)]
    pub user: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, rename = "msgType", skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<MessageDirection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
    pub id: VideoId,
    pub author: User,
    pub play_url: String,
    pub cover_url: Option<String>,
    pub title: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub to_user_id: UserId,
    pub from_user_id: UserId,
    pub content: String,
    /// Unix milliseconds.
    pub create_time: i64,
}
