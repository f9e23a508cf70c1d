
use serde::{Deserialize, Serialize};

use std::fmt;

/// One of the three toggleable reactions.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Like,
    #[serde(rename = "spark")]
    Repost,
    Bookmark,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [
        ReactionKind::Like,
        ReactionKind::Repost,
        ReactionKind::Bookmark,
    ];

    /// Name used in request paths.
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Repost => "spark",
            ReactionKind::Bookmark => "bookmark",
        }
    }

    /// Name of the counter this reaction drives on an [`Engagement`].
    pub fn counter_name(self) -> &'static str {
        match self {
            ReactionKind::Like => "likes",
            ReactionKind::Repost => "reposts",
            ReactionKind::Bookmark => "bookmarks",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean plus counter for a single reaction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReactionState {
    pub on: bool,
    pub count: u64,
}

impl ReactionState {
    pub fn new(on: bool, count: u64) -> Self {
        ReactionState { on, count }
    }

    /// The state after flipping `on`.
    ///
    /// Turning off never takes the counter below zero, even when the counter
    /// already disagrees with the boolean.
    pub fn toggled(self) -> Self {
        if self.on {
            ReactionState {
                on: false,
                count: self.count.saturating_sub(1),
            }
        } else {
            ReactionState {
                on: true,
                count: self.count.saturating_add(1),
            }
        }
    }
}

/// Authoritative reaction state returned by the server.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionReceipt {
    pub state: bool,
    pub count: u64,
}

impl From<ReactionReceipt> for ReactionState {
    fn from(receipt: ReactionReceipt) -> Self {
        ReactionState::new(receipt.state, receipt.count)
    }
}

/// Reaction flags and counters shared by items and comments.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Engagement {
    pub liked: bool,
    pub reposted: bool,
    pub bookmarked: bool,
    pub likes: u64,
    pub reposts: u64,
    pub bookmarks: u64,
    pub replies: u64,
    pub quotes: u64,
    pub views: u64,
}

impl Engagement {
    pub fn get(&self, kind: ReactionKind) -> ReactionState {
        match kind {
            ReactionKind::Like => ReactionState::new(self.liked, self.likes),
            ReactionKind::Repost => ReactionState::new(self.reposted, self.reposts),
            ReactionKind::Bookmark => ReactionState::new(self.bookmarked, self.bookmarks),
        }
    }

    pub fn set(&mut self, kind: ReactionKind, state: ReactionState) {
        let (on, count) = match kind {
            ReactionKind::Like => (&mut self.liked, &mut self.likes),
            ReactionKind::Repost => (&mut self.reposted, &mut self.reposts),
            ReactionKind::Bookmark => (&mut self.bookmarked, &mut self.bookmarks),
        };
        *on = state.on;
        *count = state.count;
    }
}

/// Anything carrying an [`Engagement`].
pub trait Reactable {
    fn engagement(&self) -> &Engagement;
    fn engagement_mut(&mut self) -> &mut Engagement;
}

/// Provisional state for toggling `kind` on `target`. Never fails.
pub fn toggle<R: Reactable + ?Sized>(target: &R, kind: ReactionKind) -> ReactionState {
    target.engagement().get(kind).toggled()
}

/// Apply the provisional toggle in place and return the new state.
pub fn apply_toggle<R: Reactable + ?Sized>(target: &mut R, kind: ReactionKind) -> ReactionState {
    let next = toggle(target, kind);
    target.engagement_mut().set(kind, next);
    next
}
