use futures::Future;
use serde::{Deserialize, Serialize};

use crate::cache::{Cursor, ViewName};
use crate::comment::{Comment, CommentId};
use crate::error::Error;
use crate::item::{Item, ItemId};
use crate::reaction::{ReactionKind, ReactionReceipt};

use std::fmt;

pub type RemoteFuture<T> = Box<dyn Future<Item = T, Error = Error>>;

/// Something a reaction can be set on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Item(ItemId),
    Comment(CommentId),
}

/// Where a new reply goes: top level under an item, or under a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    Item(ItemId),
    Comment(CommentId),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Item>,
    #[serde(default)]
    pub next_cursor: Option<Cursor>,
}

/// The server, as far as the core is concerned.
pub trait Remote {
    /// Turn `kind` on or off. `None` means the server acknowledged without
    /// reporting the resulting state.
    fn set_reaction(
        &self,
        target: &Target,
        kind: ReactionKind,
        on: bool,
    ) -> RemoteFuture<Option<ReactionReceipt>>;

    fn fetch_page(&self, view: &ViewName, cursor: Option<&Cursor>) -> RemoteFuture<Page>;

    /// All replies under an item, flat, each naming its parent.
    fn fetch_replies(&self, item: &ItemId) -> RemoteFuture<Vec<Comment>>;

    fn post_reply(&self, target: &ReplyTarget, content: &str) -> RemoteFuture<Comment>;
}

impl Target {
    /// Unescaped path segments under the api base.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            Target::Item(id) => vec!["items", id.as_str()],
            Target::Comment(id) => vec!["comments", id.as_str()],
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Target::Item(id) => write!(f, "item {}", id),
            Target::Comment(id) => write!(f, "comment {}", id),
        }
    }
}

impl ReplyTarget {
    pub fn segments(&self) -> Vec<&str> {
        match self {
            ReplyTarget::Item(id) => vec!["items", id.as_str(), "replies"],
            ReplyTarget::Comment(id) => vec!["comments", id.as_str(), "replies"],
        }
    }
}
