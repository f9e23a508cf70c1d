use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::clock::Clock;
use crate::coordinator::ReactionStore;
use crate::item::{Item, ItemId};
use crate::reaction::{ReactionKind, ReactionState};
use crate::remote::Target;
use crate::user::{UserId, UserParam};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewName(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(String);

impl ViewName {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ViewName(name.into())
    }

    pub fn recommended() -> Self {
        ViewName::new("recommended")
    }

    pub fn following() -> Self {
        ViewName::new("following")
    }

    pub fn bookmarks() -> Self {
        ViewName::new("bookmarks")
    }

    pub fn profile(user: &UserParam) -> Self {
        ViewName(format!("profile/{}", user.as_str()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Unescaped path segments: `profile/me` is two.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Cursor {
    pub fn new<S: Into<String>>(cursor: S) -> Self {
        Cursor(cursor.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Vec<Item>,
    pub cursor: Option<Cursor>,
    pub stale_after: Instant,
}

pub struct ViewCache {
    entries: BTreeMap<ViewName, CacheEntry>,
    ttl: Duration,
    clock: Rc<dyn Clock>,
}

impl fmt::Debug for ViewCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ViewCache")
            .field("views", &self.entries.keys().collect::<Vec<_>>())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ViewCache {
    pub fn new(ttl: Duration, clock: Rc<dyn Clock>) -> Self {
        ViewCache {
            entries: BTreeMap::new(),
            ttl,
            clock,
        }
    }

    /// The entry for `view`, or `None` if it was never loaded or has gone stale.
    pub fn get(&self, view: &ViewName) -> Option<&CacheEntry> {
        let now = self.clock.now();
        match self.entries.get(view) {
            Some(entry) if now < entry.stale_after => Some(entry),
            Some(_) => {
                debug!(view = %view, "view is stale");
                None
            }
            None => None,
        }
    }

    /// The entry for `view` regardless of freshness.
    pub fn entry(&self, view: &ViewName) -> Option<&CacheEntry> {
        self.entries.get(view)
    }

    pub fn view_names(&self) -> impl Iterator<Item = &ViewName> {
        self.entries.keys()
    }

    /// Replace the whole entry and restart its freshness window.
    pub fn replace(&mut self, view: ViewName, items: Vec<Item>, cursor: Option<Cursor>) {
        let stale_after = self.clock.now() + self.ttl;
        trace!(view = %view, items = items.len(), "replacing view");
        self.entries.insert(
            view,
            CacheEntry {
                items,
                cursor,
                stale_after,
            },
        );
    }

    /// Add a following page and restart the freshness window. Items already
    /// in the view are skipped. Returns how many items were added.
    pub fn append(&mut self, view: ViewName, items: Vec<Item>, cursor: Option<Cursor>) -> usize {
        let stale_after = self.clock.now() + self.ttl;
        match self.entries.get_mut(&view) {
            Some(entry) => {
                let mut seen: HashSet<ItemId> = entry.items.iter().map(|item| item.id.clone()).collect();
                let before = entry.items.len();
                for item in items {
                    if seen.insert(item.id.clone()) {
                        entry.items.push(item);
                    }
                }
                entry.cursor = cursor;
                entry.stale_after = stale_after;
                entry.items.len() - before
            }
            None => {
                let added = items.len();
                self.replace(view, items, cursor);
                added
            }
        }
    }

    /// Put `item` at the top of `view`. Does nothing if the view is not loaded.
    pub fn prepend(&mut self, view: &ViewName, item: Item) -> bool {
        match self.entries.get_mut(view) {
            Some(entry) => {
                entry.items.insert(0, item);
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&mut self, view: &ViewName) -> Option<CacheEntry> {
        self.entries.remove(view)
    }

    /// Apply `mutator` to every copy of `canonical` in every view: the item
    /// itself, projections of it, and mirrors of it nested in other items.
    /// Returns the number of copies touched.
    pub fn patch<F>(&mut self, canonical: &ItemId, mut mutator: F) -> usize
    where
        F: FnMut(&mut Item),
    {
        let mut patched = 0;
        for entry in self.entries.values_mut() {
            for item in entry.items.iter_mut() {
                patched += patch_item(item, canonical, &mut mutator);
            }
        }
        debug!(item = %canonical, copies = patched, "patched cached views");
        patched
    }

    /// Remove `user`'s projections of `canonical` from every view.
    pub fn retract(&mut self, canonical: &ItemId, user: &UserId) -> usize {
        let views: Vec<ViewName> = self.entries.keys().cloned().collect();
        views
            .iter()
            .map(|view| self.retract_in(view, canonical, user))
            .sum()
    }

    /// Remove `user`'s projections of `canonical` from one view.
    pub fn retract_in(&mut self, view: &ViewName, canonical: &ItemId, user: &UserId) -> usize {
        match self.entries.get_mut(view) {
            Some(entry) => {
                let before = entry.items.len();
                entry.items = crate::projection::retract(&entry.items, canonical, user);
                before - entry.items.len()
            }
            None => 0,
        }
    }

    /// Any cached copy of `id`, looking into mirrors too. An exact id match
    /// wins over a projection of the same item.
    pub fn find(&self, id: &ItemId) -> Option<&Item> {
        let mut projected = None;
        for entry in self.entries.values() {
            for item in &entry.items {
                if item.id == *id {
                    return Some(item);
                }
                if let Some(mirror) = find_mirror(item, id) {
                    return Some(mirror);
                }
                if projected.is_none() && item.canonical_id() == id {
                    projected = Some(item);
                }
            }
        }
        projected
    }

    /// The item whose own id is `canonical`, at the top of a view or as a
    /// mirror. Projections are never returned.
    pub fn find_canonical(&self, canonical: &ItemId) -> Option<&Item> {
        self.entries
            .values()
            .flat_map(|entry| entry.items.iter())
            .filter_map(|item| {
                if item.id == *canonical {
                    Some(item)
                } else {
                    find_mirror(item, canonical)
                }
            })
            .find(|item| !item.is_projection())
    }
}

fn patch_item<F>(item: &mut Item, canonical: &ItemId, mutator: &mut F) -> usize
where
    F: FnMut(&mut Item),
{
    let mut patched = 0;
    if item.canonical_id() == canonical {
        mutator(item);
        patched += 1;
    }
    if let Some(mirror) = item.mirror.as_mut() {
        patched += patch_item(mirror, canonical, mutator);
    }
    patched
}

fn find_mirror<'a>(item: &'a Item, id: &ItemId) -> Option<&'a Item> {
    let mirror = item.mirror.as_ref()?;
    if mirror.id == *id {
        Some(mirror)
    } else {
        find_mirror(mirror, id)
    }
}

/// One copy of an item: the top-level item `item` in `view`, or the mirror
/// `depth` levels below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySlot {
    pub view: ViewName,
    pub item: ItemId,
    pub depth: usize,
}

fn nth_mirror(item: &mut Item, depth: usize) -> Option<&mut Item> {
    let mut current = item;
    for _ in 0..depth {
        current = current.mirror.as_mut().map(|mirror| &mut **mirror)?;
    }
    Some(current)
}

impl ReactionStore for ViewCache {
    type Id = ItemId;
    type Slot = CopySlot;

    fn resolve(&self, id: &ItemId, kind: ReactionKind) -> Option<(ItemId, ReactionState)> {
        self.find(id)
            .map(|item| (item.canonical_id().clone(), item.engagement.get(kind)))
    }

    fn apply(&mut self, canonical: &ItemId, kind: ReactionKind, state: ReactionState) -> Vec<(CopySlot, ReactionState)> {
        let mut prior = Vec::new();
        for (view, entry) in self.entries.iter_mut() {
            for item in entry.items.iter_mut() {
                let top = item.id.clone();
                let mut depth = 0;
                let mut copy = Some(item);
                while let Some(current) = copy {
                    if current.canonical_id() == canonical {
                        let slot = CopySlot {
                            view: view.clone(),
                            item: top.clone(),
                            depth,
                        };
                        prior.push((slot, current.engagement.get(kind)));
                        current.engagement.set(kind, state);
                    }
                    depth += 1;
                    copy = current.mirror.as_mut().map(|mirror| &mut **mirror);
                }
            }
        }
        debug!(item = %canonical, copies = prior.len(), "applied reaction state");
        prior
    }

    fn restore(&mut self, canonical: &ItemId, kind: ReactionKind, prior: Vec<(CopySlot, ReactionState)>) {
        for (slot, state) in prior {
            let copy = self
                .entries
                .get_mut(&slot.view)
                .and_then(|entry| entry.items.iter_mut().find(|item| item.id == slot.item))
                .and_then(|item| nth_mirror(item, slot.depth))
                .filter(|copy| copy.canonical_id() == canonical);
            match copy {
                Some(copy) => copy.engagement.set(kind, state),
                None => trace!(view = %slot.view, item = %slot.item, "copy gone before restore"),
            }
        }
    }

    fn target(id: &ItemId) -> Target {
        Target::Item(id.clone())
    }
}
