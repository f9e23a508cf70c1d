use futures::future;
use futures::Future;
use tracing::{debug, info};

use crate::cache::{Cursor, ViewCache, ViewName};
use crate::clock::Clock;
use crate::comment::{Comment, CommentId};
use crate::coordinator::{Coordinator, Phase, Toggle};
use crate::error::{ActionFailed, Error};
use crate::item::{Item, ItemId};
use crate::projection;
use crate::reaction::ReactionKind;
use crate::remote::{Remote, ReplyTarget, Target};
use crate::thread::Threads;
use crate::user::UserRef;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub type SessionFuture<T, E = Error> = Box<dyn Future<Item = T, Error = E>>;

pub struct Session {
    me: UserRef,
    remote: Rc<dyn Remote>,
    clock: Rc<dyn Clock>,
    coordinator: Coordinator,
    cache: Rc<RefCell<ViewCache>>,
    threads: Rc<RefCell<Threads>>,
    active_view: Rc<RefCell<Option<ViewName>>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("me", &self.me.id)
            .field("active_view", &self.active_view.borrow())
            .field("coordinator", &self.coordinator)
            .finish()
    }
}

impl Session {
    pub fn new(
        me: UserRef,
        remote: Rc<dyn Remote>,
        clock: Rc<dyn Clock>,
        cache: Rc<RefCell<ViewCache>>,
        threads: Rc<RefCell<Threads>>,
    ) -> Self {
        Session {
            me,
            coordinator: Coordinator::new(Rc::clone(&remote)),
            remote,
            clock,
            cache,
            threads,
            active_view: Rc::new(RefCell::new(None)),
        }
    }

    pub fn me(&self) -> &UserRef {
        &self.me
    }

    pub fn cache(&self) -> &Rc<RefCell<ViewCache>> {
        &self.cache
    }

    pub fn threads(&self) -> &Rc<RefCell<Threads>> {
        &self.threads
    }

    /// The view new reposts are shown in.
    pub fn active_view(&self) -> Option<ViewName> {
        self.active_view.borrow().clone()
    }

    pub fn set_active_view(&self, view: ViewName) {
        *self.active_view.borrow_mut() = Some(view);
    }

    pub fn phase(&self, target: &Target, kind: ReactionKind) -> Phase {
        self.coordinator.phase(target, kind)
    }

    /// Toggle `kind` on an item, or on the item a repost entry stands for.
    ///
    /// When a repost settles on, the user's projection is placed at the top
    /// of the active view; when it settles off, the user's projections are
    /// removed from every view.
    pub fn toggle_reaction(&self, item: &ItemId, kind: ReactionKind) -> SessionFuture<Toggle<ItemId>, ActionFailed> {
        let toggle = self.coordinator.toggle(&self.cache, item, kind);
        if kind != ReactionKind::Repost {
            return toggle;
        }

        let cache = Rc::clone(&self.cache);
        let active_view = Rc::clone(&self.active_view);
        let clock = Rc::clone(&self.clock);
        let me = self.me.clone();
        Box::new(toggle.map(move |outcome| {
            if let Toggle::Settled { ref target, ref settlement, .. } = outcome {
                let mut cache = cache.borrow_mut();
                if settlement.state().on {
                    let active_view = active_view.borrow();
                    if let Some(ref view) = *active_view {
                        cache.retract_in(view, target, &me.id);
                        let entry = cache
                            .find(target)
                            .map(|canonical| projection::project(canonical, &me, clock.unix_millis()));
                        match entry {
                            Some(entry) => {
                                cache.prepend(view, entry);
                            }
                            None => debug!(item = %target, "reposted item left the cache"),
                        }
                    }
                } else {
                    let removed = cache.retract(target, &me.id);
                    debug!(item = %target, removed, "retracted repost entries");
                }
            }
            outcome
        }))
    }

    pub fn toggle_comment_reaction(
        &self,
        comment: &CommentId,
        kind: ReactionKind,
    ) -> SessionFuture<Toggle<CommentId>, ActionFailed> {
        self.coordinator.toggle(&self.threads, comment, kind)
    }

    /// Fetch the first page of `view`, replace the cached entry and make it
    /// the active view. Resolves to the number of items loaded.
    pub fn refresh_view(&self, view: &ViewName) -> SessionFuture<usize> {
        let active_view = Rc::clone(&self.active_view);
        let name = view.clone();
        Box::new(self.fetch_first_page(view).map(move |loaded| {
            *active_view.borrow_mut() = Some(name);
            loaded
        }))
    }

    fn fetch_first_page(&self, view: &ViewName) -> SessionFuture<usize> {
        let cache = Rc::clone(&self.cache);
        let view = view.clone();
        Box::new(self.remote.fetch_page(&view, None).map(move |page| {
            let loaded = page.items.len();
            info!(view = %view, items = loaded, "view refreshed");
            cache.borrow_mut().replace(view, page.items, page.next_cursor);
            loaded
        }))
    }

    /// Fetch the page after the cached one. Resolves to the number of new
    /// items; zero without a request when the view has no further pages. A
    /// view that was never loaded is refreshed instead.
    pub fn load_more(&self, view: &ViewName) -> SessionFuture<usize> {
        let cursor: Option<Option<Cursor>> = self
            .cache
            .borrow()
            .entry(view)
            .map(|entry| entry.cursor.clone());
        let cursor = match cursor {
            None => return self.refresh_view(view),
            Some(None) => {
                debug!(view = %view, "no further pages");
                return Box::new(future::ok(0));
            }
            Some(Some(cursor)) => cursor,
        };

        let cache = Rc::clone(&self.cache);
        let view = view.clone();
        Box::new(self.remote.fetch_page(&view, Some(&cursor)).map(move |page| {
            cache.borrow_mut().append(view, page.items, page.next_cursor)
        }))
    }

    /// Items in `view`, fetched again when the cached copy is missing or stale.
    /// Reading does not change the active view.
    pub fn view(&self, view: &ViewName) -> SessionFuture<Vec<Item>> {
        if let Some(entry) = self.cache.borrow().get(view) {
            return Box::new(future::ok(entry.items.clone()));
        }

        let cache = Rc::clone(&self.cache);
        let name = view.clone();
        Box::new(self.fetch_first_page(view).map(move |_| {
            cache
                .borrow()
                .entry(&name)
                .map(|entry| entry.items.clone())
                .unwrap_or_default()
        }))
    }

    /// Fetch the replies under `item` and build its thread.
    pub fn open_thread(&self, item: &ItemId) -> SessionFuture<Vec<Rc<Comment>>> {
        let threads = Rc::clone(&self.threads);
        let item = item.clone();
        Box::new(self.remote.fetch_replies(&item).map(move |flat| {
            threads.borrow_mut().load(item, flat).to_vec()
        }))
    }

    pub fn thread(&self, item: &ItemId) -> Option<Vec<Rc<Comment>>> {
        self.threads.borrow().get(item).map(<[Rc<Comment>]>::to_vec)
    }

    /// Reply to `item` at the top level.
    pub fn submit_reply(&self, item: &ItemId, content: &str) -> SessionFuture<Comment> {
        let threads = Rc::clone(&self.threads);
        let cache = Rc::clone(&self.cache);
        let item = item.clone();
        let target = ReplyTarget::Item(item.clone());
        Box::new(self.remote.post_reply(&target, content).map(move |reply| {
            threads.borrow_mut().push_root(&item, reply.clone());
            cache
                .borrow_mut()
                .patch(&item, |copy| copy.engagement.replies += 1);
            reply
        }))
    }

    /// Reply to the comment `parent` in `item`'s thread.
    ///
    /// If `parent` is not in the loaded thread the reply is still returned,
    /// but the local tree is left as it was.
    pub fn submit_nested_reply(
        &self,
        item: &ItemId,
        parent: &CommentId,
        content: &str,
    ) -> SessionFuture<Comment> {
        let threads = Rc::clone(&self.threads);
        let cache = Rc::clone(&self.cache);
        let item = item.clone();
        let parent = parent.clone();
        let target = ReplyTarget::Comment(parent.clone());
        Box::new(self.remote.post_reply(&target, content).map(move |reply| {
            let inserted = threads
                .borrow_mut()
                .insert_reply(&item, &parent, reply.clone());
            if inserted {
                cache
                    .borrow_mut()
                    .patch(&item, |copy| copy.engagement.replies += 1);
            }
            reply
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::comment;
    use crate::reaction::{ReactionReceipt, ReactionState};
    use crate::remote::mock::MockRemote;
    use crate::remote::Page;
    use crate::user::UserParam;

    use std::collections::BTreeSet;
    use std::time::Duration;

    struct Fixture {
        remote: Rc<MockRemote>,
        clock: Rc<ManualClock>,
        session: Session,
    }

    fn fixture() -> Fixture {
        let remote = Rc::new(MockRemote::default());
        let clock = Rc::new(ManualClock::new(1_700_000_000_000));
        let cache = Rc::new(RefCell::new(ViewCache::new(Duration::from_secs(300), clock.clone())));
        let threads = Rc::new(RefCell::new(Threads::new()));
        let session = Session::new(
            UserRef::new("u-me", "me"),
            remote.clone(),
            clock.clone(),
            cache,
            threads,
        );
        Fixture {
            remote,
            clock,
            session,
        }
    }

    fn make_item(id: &str, reposts: u64) -> Item {
        let mut item = Item::new(ItemId::new(id), UserRef::new("u-1", "ada"), format!("Item {}", id), 1_000);
        item.engagement.reposts = reposts;
        item
    }

    fn quote_of(id: &str, quoted: Item) -> Item {
        let mut item = make_item(id, 0);
        item.mirror = Some(Box::new(quoted));
        item
    }

    fn page(items: Vec<Item>, next: Option<&str>) -> Page {
        Page {
            items,
            next_cursor: next.map(Cursor::new),
        }
    }

    fn ids(session: &Session, view: &ViewName) -> Vec<String> {
        session
            .cache()
            .borrow()
            .entry(view)
            .map(|entry| entry.items.iter().map(|item| item.id.to_string()).collect())
            .unwrap_or_default()
    }

    /// Three views, all holding some copy of item 42.
    fn load_views(f: &Fixture) {
        let profile = ViewName::profile(&UserParam::Me);
        f.remote.serve_page(
            ViewName::following(),
            None,
            page(vec![make_item("42", 3), make_item("7", 0)], None),
        );
        f.remote.serve_page(
            profile.clone(),
            None,
            page(vec![quote_of("8", make_item("42", 3))], None),
        );
        f.remote.serve_page(
            ViewName::recommended(),
            None,
            page(vec![make_item("1", 0), make_item("42", 3)], Some("p2")),
        );
        f.session.refresh_view(&ViewName::following()).wait().unwrap();
        f.session.refresh_view(&profile).wait().unwrap();
        // recommended last: it is the active view
        f.session.refresh_view(&ViewName::recommended()).wait().unwrap();
    }

    fn reposts_everywhere(session: &Session, id: &str) -> Vec<ReactionState> {
        let cache = session.cache().borrow();
        let views: Vec<ViewName> = cache.view_names().cloned().collect();
        let mut states = Vec::new();
        for view in &views {
            for item in &cache.entry(view).unwrap().items {
                if item.canonical_id().as_str() == id {
                    states.push(item.engagement.get(ReactionKind::Repost));
                }
                if let Some(ref mirror) = item.mirror {
                    if mirror.canonical_id().as_str() == id {
                        states.push(mirror.engagement.get(ReactionKind::Repost));
                    }
                }
            }
        }
        states
    }

    #[test]
    fn repost_projects_into_the_active_view_and_syncs_mirrors() {
        let f = fixture();
        load_views(&f);
        assert_eq!(f.session.active_view(), Some(ViewName::recommended()));
        f.remote.answer(Some(ReactionReceipt { state: true, count: 4 }));

        f.session
            .toggle_reaction(&ItemId::new("42"), ReactionKind::Repost)
            .wait()
            .unwrap();

        let recommended = ids(&f.session, &ViewName::recommended());
        assert_eq!(recommended, vec!["42:spark:u-me:1700000000000", "1", "42"]);
        assert_eq!(ids(&f.session, &ViewName::following()), vec!["42", "7"]);

        let states = reposts_everywhere(&f.session, "42");
        // canonical in two views, the mirror in the profile, the projection
        assert_eq!(states.len(), 4);
        for state in states {
            assert_eq!(state, ReactionState::new(true, 4));
        }

        let cache = f.session.cache().borrow();
        let entry = &cache.entry(&ViewName::recommended()).unwrap().items[0];
        assert_eq!(entry.projected_from.as_ref().unwrap().by, *f.session.me());
    }

    #[test]
    fn unrepost_retracts_everywhere_and_takes_the_server_count() {
        let f = fixture();
        load_views(&f);
        f.remote.answer(Some(ReactionReceipt { state: true, count: 4 }));
        f.session
            .toggle_reaction(&ItemId::new("42"), ReactionKind::Repost)
            .wait()
            .unwrap();

        // someone else unreposted meanwhile: the server says 2, not our 3
        f.clock.advance(Duration::from_millis(5));
        f.remote.answer(Some(ReactionReceipt { state: false, count: 2 }));
        f.session
            .toggle_reaction(
                &ItemId::new("42:spark:u-me:1700000000000"),
                ReactionKind::Repost,
            )
            .wait()
            .unwrap();

        assert_eq!(ids(&f.session, &ViewName::recommended()), vec!["1", "42"]);
        for state in reposts_everywhere(&f.session, "42") {
            assert_eq!(state, ReactionState::new(false, 2));
        }
        // both toggles went out against the canonical item
        let calls = f.remote.reaction_calls.borrow();
        assert_eq!(calls[1], (Target::Item(ItemId::new("42")), ReactionKind::Repost, false));
    }

    #[test]
    fn repost_then_unrepost_restores_the_view() {
        let f = fixture();
        load_views(&f);
        let before: BTreeSet<String> = ids(&f.session, &ViewName::recommended()).into_iter().collect();

        f.remote.answer(None);
        f.session.toggle_reaction(&ItemId::new("42"), ReactionKind::Repost).wait().unwrap();
        f.remote.answer(None);
        f.session.toggle_reaction(&ItemId::new("42"), ReactionKind::Repost).wait().unwrap();

        let after: BTreeSet<String> = ids(&f.session, &ViewName::recommended()).into_iter().collect();
        assert_eq!(before, after);
        for state in reposts_everywhere(&f.session, "42") {
            assert_eq!(state, ReactionState::new(false, 3));
        }
    }

    #[test]
    fn failed_repost_leaves_every_view_untouched() {
        let f = fixture();
        load_views(&f);
        let before: Vec<Vec<Item>> = [ViewName::following(), ViewName::recommended()]
            .iter()
            .map(|view| f.session.cache().borrow().entry(view).unwrap().items.clone())
            .collect();
        f.remote.reject();

        let failed = f
            .session
            .toggle_reaction(&ItemId::new("42"), ReactionKind::Repost)
            .wait()
            .unwrap_err();

        assert_eq!(failed.target, Target::Item(ItemId::new("42")));
        let after: Vec<Vec<Item>> = [ViewName::following(), ViewName::recommended()]
            .iter()
            .map(|view| f.session.cache().borrow().entry(view).unwrap().items.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn like_is_visible_in_every_view_without_refetch() {
        let f = fixture();
        load_views(&f);
        let fetches = f.remote.page_calls.borrow().len();
        f.remote.answer(Some(ReactionReceipt { state: true, count: 1 }));

        f.session.toggle_reaction(&ItemId::new("42"), ReactionKind::Like).wait().unwrap();

        let items = f.session.view(&ViewName::following()).wait().unwrap();
        assert!(items[0].engagement.liked);
        let profile = f.session.view(&ViewName::profile(&UserParam::Me)).wait().unwrap();
        assert!(profile[0].mirror.as_ref().unwrap().engagement.liked);
        assert_eq!(f.remote.page_calls.borrow().len(), fetches);
        // no projection for likes
        assert_eq!(ids(&f.session, &ViewName::recommended()), vec!["1", "42"]);
    }

    #[test]
    fn stale_views_are_fetched_again() {
        let f = fixture();
        load_views(&f);
        let fetches = f.remote.page_calls.borrow().len();

        f.session.view(&ViewName::following()).wait().unwrap();
        assert_eq!(f.remote.page_calls.borrow().len(), fetches);

        f.clock.advance(Duration::from_secs(301));
        f.session.view(&ViewName::following()).wait().unwrap();
        assert_eq!(f.remote.page_calls.borrow().len(), fetches + 1);
        // reading another view leaves repost placement where it was
        assert_eq!(f.session.active_view(), Some(ViewName::recommended()));
    }

    #[test]
    fn loading_a_page_restarts_the_freshness_window() {
        let f = fixture();
        load_views(&f);
        f.remote.serve_page(
            ViewName::recommended(),
            Some(Cursor::new("p2")),
            page(vec![make_item("9", 0)], None),
        );

        f.clock.advance(Duration::from_secs(299));
        f.session.load_more(&ViewName::recommended()).wait().unwrap();
        f.clock.advance(Duration::from_secs(2));
        let fetches = f.remote.page_calls.borrow().len();

        let items = f.session.view(&ViewName::recommended()).wait().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(f.remote.page_calls.borrow().len(), fetches);
    }

    #[test]
    fn load_more_follows_the_cursor_until_the_end() {
        let f = fixture();
        load_views(&f);
        f.remote.serve_page(
            ViewName::recommended(),
            Some(Cursor::new("p2")),
            page(vec![make_item("42", 3), make_item("9", 0)], None),
        );

        let added = f.session.load_more(&ViewName::recommended()).wait().unwrap();
        assert_eq!(added, 1);
        assert_eq!(ids(&f.session, &ViewName::recommended()), vec!["1", "42", "9"]);

        let calls = f.remote.page_calls.borrow().len();
        let added = f.session.load_more(&ViewName::recommended()).wait().unwrap();
        assert_eq!(added, 0);
        assert_eq!(f.remote.page_calls.borrow().len(), calls);
    }

    #[test]
    fn load_more_on_an_unloaded_view_refreshes_it() {
        let f = fixture();
        f.remote.serve_page(ViewName::bookmarks(), None, page(vec![make_item("5", 0)], None));

        let added = f.session.load_more(&ViewName::bookmarks()).wait().unwrap();

        assert_eq!(added, 1);
        assert_eq!(f.session.active_view(), Some(ViewName::bookmarks()));
    }

    #[test]
    fn failed_refresh_keeps_the_old_entry() {
        let f = fixture();
        load_views(&f);
        let err = f.session.refresh_view(&ViewName::new("missing")).wait();
        assert!(err.is_err());
        assert_eq!(f.session.active_view(), Some(ViewName::recommended()));
        assert_eq!(ids(&f.session, &ViewName::following()), vec!["42", "7"]);
    }

    #[test]
    fn replies_extend_the_thread_and_bump_counts() {
        let f = fixture();
        load_views(&f);
        f.remote.serve_replies(
            ItemId::new("42"),
            vec![
                Comment::new(CommentId::new("c1"), None, UserRef::new("u-1", "ada"), "first".into()),
                Comment::new(
                    CommentId::new("c2"),
                    Some(CommentId::new("c1")),
                    UserRef::new("u-2", "bob"),
                    "second".into(),
                ),
            ],
        );
        let item = ItemId::new("42");

        let thread = f.session.open_thread(&item).wait().unwrap();
        assert_eq!(comment::len(&thread), 2);

        let top = f.session.submit_reply(&item, "top level").wait().unwrap();
        let nested = f
            .session
            .submit_nested_reply(&item, &CommentId::new("c2"), "deep")
            .wait()
            .unwrap();
        let orphan = f
            .session
            .submit_nested_reply(&item, &CommentId::new("gone"), "lost parent")
            .wait()
            .unwrap();

        let thread = f.session.thread(&item).unwrap();
        assert_eq!(comment::len(&thread), 4);
        assert_eq!(thread[1].id, top.id);
        let parent = comment::find(&thread, &CommentId::new("c2")).unwrap();
        assert_eq!(parent.children[0].id, nested.id);
        assert!(comment::find(&thread, &orphan.id).is_none());

        let cache = f.session.cache().borrow();
        assert_eq!(cache.find(&item).unwrap().engagement.replies, 2);
        let quote = &cache.entry(&ViewName::profile(&UserParam::Me)).unwrap().items[0];
        assert_eq!(quote.mirror.as_ref().unwrap().engagement.replies, 2);
    }

    #[test]
    fn comment_reactions_go_through_the_coordinator() {
        let f = fixture();
        f.remote.serve_replies(
            ItemId::new("42"),
            vec![Comment::new(CommentId::new("c1"), None, UserRef::new("u-1", "ada"), "hi".into())],
        );
        f.session.open_thread(&ItemId::new("42")).wait().unwrap();

        let held = f.remote.hold();
        let toggle = f.session.toggle_comment_reaction(&CommentId::new("c1"), ReactionKind::Like);
        let target = Target::Comment(CommentId::new("c1"));
        match f.session.phase(&target, ReactionKind::Like) {
            Phase::Pending(_) => {}
            other => panic!("unexpected {:?}", other),
        }
        let duplicate = f
            .session
            .toggle_comment_reaction(&CommentId::new("c1"), ReactionKind::Like)
            .wait()
            .unwrap();
        assert_eq!(duplicate, Toggle::Duplicate);

        held.send(Err(Error::Status(500))).unwrap();
        assert!(toggle.wait().is_err());

        let thread = f.session.thread(&ItemId::new("42")).unwrap();
        assert_eq!(thread[0].engagement.get(ReactionKind::Like), ReactionState::default());
        assert_eq!(f.remote.reaction_count(), 1);
    }
}
