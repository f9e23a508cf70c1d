//! Synthetic "X reposted Y" feed entries.

use crate::item::{Item, ItemId, Projection};
use crate::user::{UserId, UserRef};

/// Id of the entry standing for `actor`'s repost of `canonical` made at `at`.
pub fn synthetic_id(canonical: &ItemId, actor: &UserId, at: i64) -> ItemId {
    ItemId::new(format!("{}:spark:{}:{}", canonical, actor, at))
}

/// A shallow copy of `canonical` presented as `actor`'s repost.
///
/// Reaction fields are copied as they are, so the caller should project after
/// the canonical item holds its settled state.
pub fn project(canonical: &Item, actor: &UserRef, at: i64) -> Item {
    let of = canonical.canonical_id().clone();
    Item {
        id: synthetic_id(&of, &actor.id, at),
        create_at: at,
        projected_from: Some(Projection {
            by: actor.clone(),
            of,
        }),
        ..canonical.clone()
    }
}

/// `items` without `actor`'s projections of `canonical`.
pub fn retract(items: &[Item], canonical: &ItemId, actor: &UserId) -> Vec<Item> {
    items
        .iter()
        .filter(|item| !item.is_projection_by(canonical, actor))
        .cloned()
        .collect()
}
