use crate::model::{Id, user::UserMarker};
use serde::Serialize;

/// Directed edge: `follower` sees posts by `author` in their follow feed.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
pub struct Follow {
    pub follower: Id<UserMarker>,
    pub author: Id<UserMarker>,
}

impl Follow {
    #[must_use]
    pub fn is_self_follow(self) -> bool {
        self.follower == self.author
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
pub struct FollowCounts {
    /// Users following this user.
    pub followers: u64,
    /// Users this user follows.
    pub following: u64,
}
