use std::collections::HashSet;

use chrono::Utc;
use tracing::info;

use reel_db::Database;
use reel_db::models::UserRow;
use reel_types::models::{User, UserId};

use crate::error::ServiceError;

/// Read side of the follow graph, plus the follow/unfollow mutations.
///
/// Every "does the viewer follow these users" question goes through
/// [`RelationGraph::followed_by_viewer`], which issues one batched query for
/// the whole candidate set.
pub struct RelationGraph<'a> {
    db: &'a Database,
}

impl<'a> RelationGraph<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn require_user(&self, user_id: UserId) -> Result<UserRow, ServiceError> {
        self.db
            .get_user_by_id(user_id)
            .map_err(|e| ServiceError::internal(format!("look up user {}", user_id), e))?
            .ok_or(ServiceError::UserNotFound(user_id))
    }

    /// Users `user_id` follows, in the order they were followed.
    pub fn following(&self, user_id: UserId) -> Result<Vec<UserRow>, ServiceError> {
        self.require_user(user_id)?;
        self.db
            .list_following(user_id)
            .map_err(|e| ServiceError::internal(format!("list follows of user {}", user_id), e))
    }

    /// Users following `user_id`, in the order they followed.
    pub fn followers(&self, user_id: UserId) -> Result<Vec<UserRow>, ServiceError> {
        self.require_user(user_id)?;
        self.db
            .list_followers(user_id)
            .map_err(|e| ServiceError::internal(format!("list followers of user {}", user_id), e))
    }

    /// The subset of `candidates` that `viewer` follows. Ids that do not exist
    /// are simply absent from the result.
    pub fn followed_by_viewer(
        &self,
        viewer: UserId,
        candidates: &[UserId],
    ) -> Result<Vec<UserId>, ServiceError> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }
        self.db.following_among(viewer, candidates).map_err(|e| {
            ServiceError::internal(
                format!("check {} candidates against follows of user {}", candidates.len(), viewer),
                e,
            )
        })
    }

    /// Turns rows into API users with `is_follow` set for `viewer`.
    /// An anonymous viewer follows nobody.
    pub fn annotate(
        &self,
        viewer: Option<UserId>,
        rows: Vec<UserRow>,
    ) -> Result<Vec<User>, ServiceError> {
        let followed: HashSet<UserId> = match viewer {
            Some(viewer) => {
                let ids: Vec<UserId> = rows.iter().map(|row| row.id).collect();
                self.followed_by_viewer(viewer, &ids)?.into_iter().collect()
            }
            None => HashSet::new(),
        };

        Ok(rows
            .into_iter()
            .map(|row| {
                let is_follow = followed.contains(&row.id);
                to_user(row, is_follow)
            })
            .collect())
    }

    pub fn following_of(&self, viewer: UserId, user_id: UserId) -> Result<Vec<User>, ServiceError> {
        let rows = self.following(user_id)?;
        self.annotate(Some(viewer), rows)
    }

    pub fn followers_of(&self, viewer: UserId, user_id: UserId) -> Result<Vec<User>, ServiceError> {
        let rows = self.followers(user_id)?;
        self.annotate(Some(viewer), rows)
    }

    /// A user with follow counts and `is_follow` for `viewer`.
    pub fn profile(&self, viewer: Option<UserId>, user_id: UserId) -> Result<User, ServiceError> {
        let row = self.require_user(user_id)?;
        let (following, followers) = self
            .db
            .follow_counts(user_id)
            .map_err(|e| ServiceError::internal(format!("count follows of user {}", user_id), e))?;

        let is_follow = match viewer {
            Some(viewer) => !self.followed_by_viewer(viewer, &[user_id])?.is_empty(),
            None => false,
        };

        let mut user = to_user(row, is_follow);
        user.follow_count = Some(following);
        user.follower_count = Some(followers);
        Ok(user)
    }

    /// Follows `target`. Following someone twice is a no-op; following
    /// yourself is rejected. Returns whether a new edge was created.
    pub fn follow(&self, viewer: UserId, target: UserId) -> Result<bool, ServiceError> {
        if viewer == target {
            return Err(ServiceError::validation("cannot follow yourself"));
        }
        self.require_user(target)?;

        let created = self
            .db
            .insert_follow(viewer, target, Utc::now().timestamp_millis())
            .map_err(|e| {
                ServiceError::internal(format!("user {} follow user {}", viewer, target), e)
            })?;
        if created {
            info!(follower = viewer, followee = target, "follow edge created");
        }
        Ok(created)
    }

    /// Unfollows `target`. Removing an edge that does not exist is a no-op.
    /// Returns whether an edge was removed.
    pub fn unfollow(&self, viewer: UserId, target: UserId) -> Result<bool, ServiceError> {
        if viewer == target {
            return Err(ServiceError::validation("cannot unfollow yourself"));
        }
        self.require_user(target)?;

        let removed = self
            .db
            .delete_follow(viewer, target)
            .map_err(|e| {
                ServiceError::internal(format!("user {} unfollow user {}", viewer, target), e)
            })?;
        if removed {
            info!(follower = viewer, followee = target, "follow edge removed");
        }
        Ok(removed)
    }
}

pub fn to_user(row: UserRow, is_follow: bool) -> User {
    User {
        id: row.id,
        name: row.username,
        follow_count: None,
        follower_count: None,
        is_follow,
    }
}
