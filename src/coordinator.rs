use futures::future;
use futures::Future;
use tracing::{debug, warn};

use crate::error::{ActionFailed, Error};
use crate::reaction::{ReactionKind, ReactionReceipt, ReactionState};
use crate::remote::{Remote, Target};

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Where reaction state lives. Implemented by the view cache for items and by
/// the thread store for comments.
pub trait ReactionStore {
    type Id: Clone + fmt::Display;
    /// Location of one copy of a target.
    type Slot;

    /// Canonical id and current state of `kind` for `id`, or `None` when
    /// nothing is known about `id`.
    fn resolve(&self, id: &Self::Id, kind: ReactionKind) -> Option<(Self::Id, ReactionState)>;

    /// Write `state` to every copy of `canonical`. Returns what each copy
    /// held before.
    fn apply(
        &mut self,
        canonical: &Self::Id,
        kind: ReactionKind,
        state: ReactionState,
    ) -> Vec<(Self::Slot, ReactionState)>;

    /// Put back states returned by `apply`. Copies no longer present are
    /// skipped.
    fn restore(&mut self, canonical: &Self::Id, kind: ReactionKind, prior: Vec<(Self::Slot, ReactionState)>);

    fn target(id: &Self::Id) -> Target;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionKey {
    pub target: Target,
    pub kind: ReactionKind,
}

/// A toggle waiting on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    snapshot: ReactionState,
    provisional: ReactionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The server reported the resulting state.
    Authoritative(ReactionState),
    /// The server acknowledged without a state; the guess stands.
    Provisional(ReactionState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Pending(Pending),
    Settled(Settlement),
    RolledBack(ReactionState),
}

/// Result of asking for a toggle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Toggle<Id> {
    Settled {
        target: Id,
        kind: ReactionKind,
        settlement: Settlement,
    },
    /// The same key is already pending. Nothing was sent.
    Duplicate,
    /// Nothing is known about the id. Nothing was sent.
    Missing,
}

impl Pending {
    pub fn begin(snapshot: ReactionState) -> Self {
        Pending {
            snapshot,
            provisional: snapshot.toggled(),
        }
    }

    pub fn snapshot(&self) -> ReactionState {
        self.snapshot
    }

    pub fn provisional(&self) -> ReactionState {
        self.provisional
    }

    pub fn settle(self, receipt: Option<ReactionReceipt>) -> Settlement {
        match receipt {
            Some(receipt) => Settlement::Authoritative(receipt.into()),
            None => Settlement::Provisional(self.provisional),
        }
    }

    pub fn roll_back(self) -> ReactionState {
        self.snapshot
    }
}

impl Settlement {
    pub fn state(&self) -> ReactionState {
        match *self {
            Settlement::Authoritative(state) | Settlement::Provisional(state) => state,
        }
    }
}

impl Phase {
    pub fn is_pending(&self) -> bool {
        match self {
            Phase::Pending(_) => true,
            _ => false,
        }
    }
}

impl<Id> Toggle<Id> {
    /// Final state when the toggle settled.
    pub fn state(&self) -> Option<ReactionState> {
        match self {
            Toggle::Settled { settlement, .. } => Some(settlement.state()),
            _ => None,
        }
    }
}

type Phases = Rc<RefCell<HashMap<ActionKey, Phase>>>;

/// Owns the undo information of one pending toggle. Dropping it before the
/// toggle settles rolls the store back and releases the key.
struct InFlight<S: ReactionStore> {
    key: ActionKey,
    canonical: S::Id,
    pending: Pending,
    prior: Option<Vec<(S::Slot, ReactionState)>>,
    phases: Phases,
    store: Rc<RefCell<S>>,
}

impl<S: ReactionStore> InFlight<S> {
    fn settle(mut self, result: Result<Option<ReactionReceipt>, Error>) -> Result<Toggle<S::Id>, ActionFailed> {
        let prior = self.prior.take().unwrap_or_default();
        let kind = self.key.kind;
        let (phase, outcome) = match result {
            Ok(receipt) => {
                let settlement = self.pending.settle(receipt);
                self.store
                    .borrow_mut()
                    .apply(&self.canonical, kind, settlement.state());
                let outcome = Ok(Toggle::Settled {
                    target: self.canonical.clone(),
                    kind,
                    settlement,
                });
                (Phase::Settled(settlement), outcome)
            }
            Err(cause) => {
                warn!(action = %self.key.target, kind = %kind, error = %cause, "toggle failed, rolling back");
                self.store.borrow_mut().restore(&self.canonical, kind, prior);
                let outcome = Err(ActionFailed {
                    kind,
                    target: self.key.target.clone(),
                    cause,
                });
                (Phase::RolledBack(self.pending.roll_back()), outcome)
            }
        };
        self.phases.borrow_mut().insert(self.key.clone(), phase);
        outcome
    }
}

impl<S: ReactionStore> Drop for InFlight<S> {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            debug!(action = %self.key.target, kind = %self.key.kind, "toggle dropped before settling");
            if let Ok(mut store) = self.store.try_borrow_mut() {
                store.restore(&self.canonical, self.key.kind, prior);
            }
            self.phases
                .borrow_mut()
                .insert(self.key.clone(), Phase::RolledBack(self.pending.roll_back()));
        }
    }
}

pub struct Coordinator {
    remote: Rc<dyn Remote>,
    phases: Phases,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl Coordinator {
    pub fn new(remote: Rc<dyn Remote>) -> Self {
        Coordinator {
            remote,
            phases: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    /// Phase of the latest toggle on the key, `Idle` if there never was one.
    pub fn phase(&self, target: &Target, kind: ReactionKind) -> Phase {
        let key = ActionKey {
            target: target.clone(),
            kind,
        };
        self.phases.borrow().get(&key).cloned().unwrap_or(Phase::Idle)
    }

    pub fn in_flight(&self) -> usize {
        self.phases.borrow().values().filter(|phase| phase.is_pending()).count()
    }

    /// Toggle `kind` on `id`.
    ///
    /// The provisional state is written to `store` before this returns. The
    /// future settles once the server answers; dropping it first undoes the
    /// provisional state.
    pub fn toggle<S>(
        &self,
        store: &Rc<RefCell<S>>,
        id: &S::Id,
        kind: ReactionKind,
    ) -> Box<dyn Future<Item = Toggle<S::Id>, Error = ActionFailed>>
    where
        S: ReactionStore + 'static,
        S::Id: 'static,
        S::Slot: 'static,
    {
        let resolved = store.borrow().resolve(id, kind);
        let (canonical, snapshot) = match resolved {
            Some(resolved) => resolved,
            None => {
                debug!(id = %id, kind = %kind, "toggle on unknown id");
                return Box::new(future::ok(Toggle::Missing));
            }
        };

        let key = ActionKey {
            target: S::target(&canonical),
            kind,
        };
        if self.phase(&key.target, kind).is_pending() {
            debug!(action = %key.target, kind = %kind, "toggle already in flight");
            return Box::new(future::ok(Toggle::Duplicate));
        }

        let pending = Pending::begin(snapshot);
        self.phases
            .borrow_mut()
            .insert(key.clone(), Phase::Pending(pending));
        let prior = store
            .borrow_mut()
            .apply(&canonical, kind, pending.provisional());

        let request = self
            .remote
            .set_reaction(&key.target, kind, pending.provisional().on);
        let in_flight = InFlight {
            key,
            canonical,
            pending,
            prior: Some(prior),
            phases: Rc::clone(&self.phases),
            store: Rc::clone(store),
        };

        Box::new(request.then(move |result| in_flight.settle(result)))
    }
}
