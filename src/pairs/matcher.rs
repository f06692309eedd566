//! Partitioning of the candidate pool into the day's groups.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::fanout::docs::{self, Participant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub user_id: i64,
    pub username: String,
    pub profile_url: String,
}

impl From<Candidate> for Participant {
    fn from(Candidate { user_id, username, profile_url }: Candidate) -> Self {
        Participant { user_id, username, profile_url }
    }
}

/// A pair, a special trio, or (only for a pool of one) a lone candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    members: Vec<Candidate>,
}

impl Group {
    fn new(mut members: Vec<Candidate>) -> Self {
        members.sort_by_key(|c| c.user_id);
        Group { members }
    }

    pub fn members(&self) -> &[Candidate] {
        &self.members
    }

    pub fn into_members(self) -> Vec<Candidate> {
        self.members
    }

    pub fn is_special(&self) -> bool {
        self.members.len() == 3
    }

    pub fn is_complete(&self) -> bool {
        self.members.len() >= 2
    }

    pub fn room_id(&self) -> String {
        let ids: Vec<i64> = self.members.iter().map(|c| c.user_id).collect();
        docs::room_id(&ids)
    }
}

/// Shuffles the pool and partitions it.
pub fn make_groups(mut candidates: Vec<Candidate>) -> Vec<Group> {
    candidates.shuffle(&mut rand::rng());
    partition(candidates)
}

/// Consecutive pairs in the given order; an odd leftover joins the last pair.
pub fn partition(candidates: Vec<Candidate>) -> Vec<Group> {
    let mut groups: Vec<Vec<Candidate>> = Vec::with_capacity(candidates.len() / 2 + 1);
    let mut rest = candidates.into_iter();

    while let Some(first) = rest.next() {
        match rest.next() {
            Some(second) => groups.push(vec![first, second]),
            None => match groups.last_mut() {
                Some(last) => last.push(first),
                None => groups.push(vec![first]),
            },
        }
    }

    groups.into_iter().map(Group::new).collect()
}
