use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use reel_db::Database;
use reel_db::models::{MessageRow, UserRow};
use reel_types::models::{FriendUser, MessageDirection, UserId};

use crate::error::ServiceError;
use crate::graph::{RelationGraph, to_user};

/// Mutual-follow aggregation: a friend of `subject` is a follower of
/// `subject` that `subject` follows back.
pub struct FriendAggregator<'a> {
    db: &'a Database,
    graph: RelationGraph<'a>,
}

impl<'a> FriendAggregator<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            graph: RelationGraph::new(db),
        }
    }

    /// Friends of `subject`, in the order the batched membership query
    /// confirmed them. The latest message is attached only when the viewer is
    /// the subject; a failed lookup leaves the friend without one.
    pub fn friends(
        &self,
        viewer: UserId,
        subject: UserId,
    ) -> Result<Vec<FriendUser>, ServiceError> {
        let followers = self.graph.followers(subject)?;
        let candidates: Vec<UserId> = followers.iter().map(|row| row.id).collect();
        let mutual = self.graph.followed_by_viewer(subject, &candidates)?;

        let mut by_id: HashMap<UserId, UserRow> =
            followers.into_iter().map(|row| (row.id, row)).collect();
        let friends: Vec<UserRow> = mutual.iter().filter_map(|id| by_id.remove(id)).collect();
        let friend_ids: Vec<UserId> = friends.iter().map(|row| row.id).collect();

        let (followed, mut messages) = if viewer == subject {
            let followed: HashSet<UserId> = friend_ids.iter().copied().collect();
            (followed, self.latest_messages(subject, &friend_ids))
        } else {
            let followed: HashSet<UserId> = self
                .graph
                .followed_by_viewer(viewer, &friend_ids)?
                .into_iter()
                .collect();
            (followed, HashMap::new())
        };

        debug!(subject, friends = friends.len(), "friend list resolved");

        Ok(friends
            .into_iter()
            .map(|row| {
                let is_follow = followed.contains(&row.id);
                let latest = messages.remove(&row.id);
                FriendUser {
                    msg_type: latest.as_ref().map(|m| direction(subject, m)),
                    message: latest.map(|m| m.content),
                    user: to_user(row, is_follow),
                }
            })
            .collect())
    }

    /// Latest message per friend: one batched query, falling back to one
    /// lookup per friend if the batched query fails.
    fn latest_messages(&self, subject: UserId, friends: &[UserId]) -> HashMap<UserId, MessageRow> {
        match self.db.latest_messages_with(subject, friends) {
            Ok(rows) => rows.into_iter().map(|m| (counterpart(subject, &m), m)).collect(),
            Err(e) => {
                warn!(
                    subject,
                    error = %e,
                    "batched latest-message query failed, falling back to per-friend lookups"
                );
                self.latest_messages_sequential(subject, friends)
            }
        }
    }

    /// O(friends) queries. Failures are logged and skipped.
    pub(crate) fn latest_messages_sequential(
        &self,
        subject: UserId,
        friends: &[UserId],
    ) -> HashMap<UserId, MessageRow> {
        let mut latest = HashMap::with_capacity(friends.len());
        for &friend in friends {
            match self.db.latest_message(subject, friend) {
                Ok(Some(message)) => {
                    latest.insert(friend, message);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(subject, friend, error = %e, "latest message lookup failed");
                }
            }
        }
        latest
    }
}

fn counterpart(subject: UserId, message: &MessageRow) -> UserId {
    if message.from_user_id == subject {
        message.to_user_id
    } else {
        message.from_user_id
    }
}

fn direction(subject: UserId, message: &MessageRow) -> MessageDirection {
    if message.from_user_id == subject {
        MessageDirection::Sent
    } else {
        MessageDirection::Received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::seed;

    fn friend_ids(friends: &[FriendUser]) -> Vec<UserId> {
        friends.iter().map(|f| f.user.id).collect()
    }

    #[test]
    fn only_bidirectional_edges_make_friends() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["me", "mutual", "fan", "idol", "mutual2"]);
        let (me, mutual, fan, idol, mutual2) = (u[0], u[1], u[2], u[3], u[4]);
        let graph = RelationGraph::new(&db);

        graph.follow(mutual, me).unwrap();
        graph.follow(fan, me).unwrap();
        graph.follow(me, idol).unwrap();
        graph.follow(mutual2, me).unwrap();
        graph.follow(me, mutual2).unwrap();
        graph.follow(me, mutual).unwrap();

        let friends = FriendAggregator::new(&db).friends(me, me).unwrap();
        // confirmation order = order `me` created the follow-back edges
        assert_eq!(friend_ids(&friends), vec![mutual2, mutual]);
        assert!(friends.iter().all(|f| f.user.is_follow));

        // symmetric: `mutual` sees `me` as a friend too
        let theirs = FriendAggregator::new(&db).friends(mutual, mutual).unwrap();
        assert_eq!(friend_ids(&theirs), vec![me]);

        // one-way edges never qualify
        assert!(FriendAggregator::new(&db).friends(fan, fan).unwrap().is_empty());
        assert!(FriendAggregator::new(&db).friends(idol, idol).unwrap().is_empty());
    }

    #[test]
    fn latest_message_and_direction_are_attached() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["me", "a", "b", "c"]);
        let graph = RelationGraph::new(&db);
        for &other in &u[1..] {
            graph.follow(u[0], other).unwrap();
            graph.follow(other, u[0]).unwrap();
        }
        db.insert_message(u[0], u[1], "first", 1).unwrap();
        db.insert_message(u[1], u[0], "reply", 2).unwrap();
        db.insert_message(u[0], u[2], "sent to b", 3).unwrap();

        let friends = FriendAggregator::new(&db).friends(u[0], u[0]).unwrap();
        let by_id: HashMap<UserId, &FriendUser> = friends.iter().map(|f| (f.user.id, f)).collect();

        assert_eq!(by_id[&u[1]].message.as_deref(), Some("reply"));
        assert_eq!(by_id[&u[1]].msg_type, Some(MessageDirection::Received));
        assert_eq!(by_id[&u[2]].message.as_deref(), Some("sent to b"));
        assert_eq!(by_id[&u[2]].msg_type, Some(MessageDirection::Sent));
        assert_eq!(by_id[&u[3]].message, None);
        assert_eq!(by_id[&u[3]].msg_type, None);
    }

    #[test]
    fn sequential_fallback_matches_batched_lookup() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["me", "a", "b"]);
        db.insert_message(u[1], u[0], "old", 1).unwrap();
        db.insert_message(u[0], u[1], "new", 2).unwrap();

        let aggregator = FriendAggregator::new(&db);
        let sequential = aggregator.latest_messages_sequential(u[0], &[u[1], u[2]]);
        let batched = aggregator.latest_messages(u[0], &[u[1], u[2]]);

        assert_eq!(sequential.len(), 1);
        assert_eq!(sequential[&u[1]].content, "new");
        assert_eq!(sequential, batched);
    }

    #[test]
    fn other_viewers_get_their_own_follow_flags_and_no_messages() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["subject", "f1", "f2", "viewer"]);
        let graph = RelationGraph::new(&db);
        for &f in &[u[1], u[2]] {
            graph.follow(u[0], f).unwrap();
            graph.follow(f, u[0]).unwrap();
        }
        graph.follow(u[3], u[2]).unwrap();
        db.insert_message(u[0], u[1], "private", 1).unwrap();

        let friends = FriendAggregator::new(&db).friends(u[3], u[0]).unwrap();
        let flags: Vec<(UserId, bool)> =
            friends.iter().map(|f| (f.user.id, f.user.is_follow)).collect();
        assert_eq!(flags, vec![(u[1], false), (u[2], true)]);
        assert!(friends.iter().all(|f| f.message.is_none()));
    }

    #[test]
    fn refetching_is_stable() {
        let db = Database::open_in_memory().unwrap();
        let u = seed(&db, &["me", "a", "b"]);
        let graph = RelationGraph::new(&db);
        for &f in &u[1..] {
            graph.follow(f, u[0]).unwrap();
            graph.follow(u[0], f).unwrap();
        }

        let aggregator = FriendAggregator::new(&db);
        let first = aggregator.friends(u[0], u[0]).unwrap();
        assert_eq!(first, aggregator.friends(u[0], u[0]).unwrap());
    }
}
