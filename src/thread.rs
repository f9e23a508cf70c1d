use tracing::debug;

use crate::comment::{self, Comment, CommentId};
use crate::coordinator::ReactionStore;
use crate::item::ItemId;
use crate::reaction::{ReactionKind, ReactionState};
use crate::remote::Target;

use std::collections::HashMap;
use std::rc::Rc;

/// Reply forests, one per content item.
#[derive(Debug, Default)]
pub struct Threads {
    forests: HashMap<ItemId, Vec<Rc<Comment>>>,
}

impl Threads {
    pub fn new() -> Self {
        Threads::default()
    }

    /// Replace the thread under `item` with a tree built from `flat`.
    pub fn load(&mut self, item: ItemId, flat: Vec<Comment>) -> &[Rc<Comment>] {
        let forest = comment::build_tree(flat);
        let slot = self.forests.entry(item).or_insert_with(Vec::new);
        *slot = forest;
        slot
    }

    pub fn get(&self, item: &ItemId) -> Option<&[Rc<Comment>]> {
        self.forests.get(item).map(Vec::as_slice)
    }

    /// Add a top-level reply under `item`.
    pub fn push_root(&mut self, item: &ItemId, reply: Comment) {
        self.forests
            .entry(item.clone())
            .or_insert_with(Vec::new)
            .push(Rc::new(reply));
    }

    /// Add `reply` under the comment `parent` in `item`'s thread. Returns
    /// false, leaving the thread as it was, when `parent` is not loaded.
    pub fn insert_reply(&mut self, item: &ItemId, parent: &CommentId, reply: Comment) -> bool {
        let forest = match self.forests.get_mut(item) {
            Some(forest) => forest,
            None => {
                debug!(item = %item, comment = %parent, "reply to a thread that is not loaded");
                return false;
            }
        };
        let mut reply = Some(reply);
        let updated = comment::update_node(forest, parent, &mut |node| {
            if let Some(reply) = reply.take() {
                node.children.push(Rc::new(reply));
            }
        });
        match updated {
            Some(updated) => {
                *forest = updated;
                true
            }
            None => {
                debug!(item = %item, comment = %parent, "reply target not in thread");
                false
            }
        }
    }

    pub fn find(&self, id: &CommentId) -> Option<&Rc<Comment>> {
        self.forests
            .values()
            .filter_map(|forest| comment::find(forest, id))
            .next()
    }
}

impl ReactionStore for Threads {
    type Id = CommentId;
    type Slot = ItemId;

    fn resolve(&self, id: &CommentId, kind: ReactionKind) -> Option<(CommentId, ReactionState)> {
        self.find(id)
            .map(|node| (node.id.clone(), node.engagement.get(kind)))
    }

    fn apply(
        &mut self,
        canonical: &CommentId,
        kind: ReactionKind,
        state: ReactionState,
    ) -> Vec<(ItemId, ReactionState)> {
        let mut prior = Vec::new();
        for (item, forest) in self.forests.iter_mut() {
            let mut before = None;
            let updated = comment::update_node(forest, canonical, &mut |node| {
                before = Some(node.engagement.get(kind));
                node.engagement.set(kind, state);
            });
            if let (Some(updated), Some(before)) = (updated, before) {
                *forest = updated;
                prior.push((item.clone(), before));
            }
        }
        prior
    }

    fn restore(&mut self, canonical: &CommentId, kind: ReactionKind, prior: Vec<(ItemId, ReactionState)>) {
        for (item, state) in prior {
            let forest = match self.forests.get_mut(&item) {
                Some(forest) => forest,
                None => continue,
            };
            if let Some(updated) =
                comment::update_node(forest, canonical, &mut |node| node.engagement.set(kind, state))
            {
                *forest = updated;
            }
        }
    }

    fn target(id: &CommentId) -> Target {
        Target::Comment(id.clone())
    }
}
