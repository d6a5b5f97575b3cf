use crate::client::FetchedProfile;
use crate::task::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub username: String,
    /// Raw picture URL. The picture itself is downloaded separately.
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub profile: Profile,
    /// Accounts known to follow this user, in discovery order, no repeats.
    pub follower_ids: Vec<u64>,
    /// Accounts this user is known to follow. Only counted; the edges live
    /// in the followed users' `follower_ids`.
    pub following_count: usize,
    pub private: bool,
    pub public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal: Option<bool>,
}

impl User {
    pub fn from_profile(profile: &FetchedProfile) -> Self {
        Self {
            id: profile.id,
            profile: Profile {
                name: profile.name.clone(),
                username: profile.username.clone(),
                image: profile.image.clone(),
            },
            follower_ids: Vec::new(),
            following_count: 0,
            private: profile.private,
            public: !profile.is_private,
            personal: None,
        }
    }
}

/// What a merge changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeDelta {
    /// Neighbour ids that gained an edge with the target.
    pub followers: Vec<u64>,
    /// Users inserted into the graph by this merge.
    pub users: Vec<User>,
    /// Inserted users that must never be expanded.
    pub terminal: Vec<u64>,
}

impl MergeDelta {
    pub fn is_empty(&self) -> bool {
        self.followers.is_empty() && self.users.is_empty()
    }

    pub fn extend(&mut self, other: MergeDelta) {
        self.followers.extend(other.followers);
        self.users.extend(other.users);
        self.terminal.extend(other.terminal);
    }
}

/// The crawled graph. Users are only ever added; edges are only ever added.
///
/// Users are shared between clones and copied on write, so a snapshot only
/// costs a map of pointers and the users a later merge touches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserGraph {
    users: BTreeMap<u64, Arc<User>>,
}

impl UserGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: User) -> Self {
        let mut graph = Self::new();
        graph.insert(root);
        graph
    }

    /// Insert a user unless one with the same id already exists.
    pub fn insert(&mut self, user: User) -> bool {
        if self.users.contains_key(&user.id) {
            return false;
        }
        self.users.insert(user.id, Arc::new(user));
        true
    }

    pub fn get(&self, id: u64) -> Option<&User> {
        self.users.get(&id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.users.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.users.keys().copied()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values().map(Arc::as_ref)
    }

    pub fn edge_count(&self) -> usize {
        self.users.values().map(|u| u.follower_ids.len()).sum()
    }

    /// How many neighbours have been collected for `target` in `direction`.
    pub fn collected(&self, target: u64, direction: Direction) -> usize {
        self.users
            .get(&target)
            .map(|user| match direction {
                Direction::Follower => user.follower_ids.len(),
                Direction::Following => user.following_count,
            })
            .unwrap_or(0)
    }

    /// Profiles of `page` that would add a new edge with `target`, first
    /// occurrence only, in page order.
    pub fn fresh_neighbors(
        &self,
        page: &[FetchedProfile],
        target: u64,
        direction: Direction,
    ) -> Vec<FetchedProfile> {
        let Some(target_user) = self.users.get(&target) else {
            return Vec::new();
        };

        let mut seen: HashSet<u64> = HashSet::new();
        let existing: HashSet<u64> = match direction {
            Direction::Follower => target_user.follower_ids.iter().copied().collect(),
            Direction::Following => HashSet::new(),
        };

        page.iter()
            .filter(|profile| profile.id != target && seen.insert(profile.id))
            .filter(|profile| match direction {
                Direction::Follower => !existing.contains(&profile.id),
                Direction::Following => self
                    .users
                    .get(&profile.id)
                    .is_none_or(|followed| !followed.follower_ids.contains(&target)),
            })
            .cloned()
            .collect()
    }

    /// Merge a page of `target`'s followers.
    pub fn merge_followers(&mut self, followers: &[FetchedProfile], target: u64) -> MergeDelta {
        let mut delta = MergeDelta::default();
        let Some(target_user) = self.users.get(&target) else {
            return delta;
        };

        let mut known: HashSet<u64> = target_user.follower_ids.iter().copied().collect();

        for profile in followers {
            if profile.id == target || !known.insert(profile.id) {
                continue;
            }

            delta.followers.push(profile.id);
            self.insert_new(profile, &mut delta, None);
        }

        if let Some(target_user) = self.users.get_mut(&target).map(Arc::make_mut) {
            target_user.follower_ids.extend(&delta.followers);
        }

        delta
    }

    /// Merge a page of accounts `target` follows. Each edge is stored as
    /// `target` appearing among the followed account's followers, so no
    /// edge is stored for a followed account already holding `follower_cap`
    /// followers.
    pub fn merge_following(
        &mut self,
        following: &[FetchedProfile],
        target: u64,
        follower_cap: Option<usize>,
    ) -> MergeDelta {
        let mut delta = MergeDelta::default();
        if !self.users.contains_key(&target) {
            return delta;
        }

        for profile in following {
            if profile.id == target {
                continue;
            }

            match self.users.get_mut(&profile.id) {
                Some(followed) => {
                    if followed.follower_ids.contains(&target)
                        || follower_cap.is_some_and(|cap| followed.follower_ids.len() >= cap)
                    {
                        continue;
                    }
                    Arc::make_mut(followed).follower_ids.push(target);
                }
                None => self.insert_new(profile, &mut delta, Some(target)),
            }

            delta.followers.push(profile.id);
        }

        if let Some(target_user) = self.users.get_mut(&target).map(Arc::make_mut) {
            target_user.following_count += delta.followers.len();
        }

        delta
    }

    /// Insert profiles as terminal users without any edge. Profiles already
    /// in the graph are left alone.
    pub fn insert_leaves(&mut self, profiles: &[FetchedProfile]) -> MergeDelta {
        let mut delta = MergeDelta::default();
        for profile in profiles {
            if self.users.contains_key(&profile.id) {
                continue;
            }
            let user = User::from_profile(profile);
            delta.terminal.push(user.id);
            delta.users.push(user.clone());
            self.users.insert(user.id, Arc::new(user));
        }
        delta
    }

    fn insert_new(&mut self, profile: &FetchedProfile, delta: &mut MergeDelta, follower: Option<u64>) {
        if self.users.contains_key(&profile.id) {
            return;
        }

        let mut user = User::from_profile(profile);
        if let Some(follower) = follower {
            user.follower_ids.push(follower);
        }
        if user.private {
            delta.terminal.push(user.id);
        }
        delta.users.push(user.clone());
        self.users.insert(user.id, Arc::new(user));
    }
}
