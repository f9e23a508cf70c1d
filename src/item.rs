use serde::{Deserialize, Serialize};

use crate::reaction::{Engagement, Reactable};
use crate::user::{UserId, UserRef};

use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(String);

/// Marks an item as "`by` reposted `of`". Lookup only: the canonical item
/// lives wherever it was fetched, never inside the projection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub by: UserRef,
    pub of: ItemId,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Item {
    pub id: ItemId,
    pub author: UserRef,
    pub content: String,
    pub create_at: i64,
    #[serde(flatten)]
    pub engagement: Engagement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected_from: Option<Projection>,
    /// Quoted copy of another item, kept in step with that item's reactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror: Option<Box<Item>>,
}

impl ItemId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Item {
    pub fn new(id: ItemId, author: UserRef, content: String, create_at: i64) -> Self {
        Item {
            id,
            author,
            content,
            create_at,
            engagement: Engagement::default(),
            projected_from: None,
            mirror: None,
        }
    }

    /// Id of the item this entry stands for: the reposted item for a
    /// projection, the item itself otherwise.
    pub fn canonical_id(&self) -> &ItemId {
        match self.projected_from {
            Some(ref projection) => &projection.of,
            None => &self.id,
        }
    }

    pub fn is_projection(&self) -> bool {
        self.projected_from.is_some()
    }

    /// True when this entry is `user`'s repost of `canonical`.
    pub fn is_projection_by(&self, canonical: &ItemId, user: &UserId) -> bool {
        match self.projected_from {
            Some(ref projection) => projection.of == *canonical && projection.by.id == *user,
            None => false,
        }
    }
}

impl Reactable for Item {
    fn engagement(&self) -> &Engagement {
        &self.engagement
    }

    fn engagement_mut(&mut self) -> &mut Engagement {
        &mut self.engagement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reaction::{ReactionKind, ReactionState};

    #[test]
    fn canonical_id_follows_the_projection() {
        let mut item = Item::new(
            ItemId::new("42:spark:u-2:1000"),
            UserRef::new("u-1", "ada"),
            "hello".to_string(),
            1000,
        );
        assert_eq!(item.canonical_id().as_str(), "42:spark:u-2:1000");

        item.projected_from = Some(Projection {
            by: UserRef::new("u-2", "bob"),
            of: ItemId::new("42"),
        });
        assert_eq!(item.canonical_id(), &ItemId::new("42"));
        assert!(item.is_projection_by(&ItemId::new("42"), &UserId::new("u-2")));
        assert!(!item.is_projection_by(&ItemId::new("42"), &UserId::new("u-1")));
        assert!(!item.is_projection_by(&ItemId::new("43"), &UserId::new("u-2")));
    }

    #[test]
    fn decodes_flat_engagement_and_nested_mirror() {
        let json = r#"{
            "id": "7",
            "author": {"id": "u-1", "username": "ada"},
            "content": "quoting",
            "create_at": 1000,
            "likes": 3,
            "liked": true,
            "quotes": 1,
            "mirror": {
                "id": "42",
                "author": {"id": "u-2", "username": "bob"},
                "content": "first post",
                "create_at": 900,
                "reposts": 3
            }
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.engagement.get(ReactionKind::Like), ReactionState::new(true, 3));
        assert_eq!(item.engagement.quotes, 1);
        assert!(item.projected_from.is_none());

        let mirror = item.mirror.expect("mirror");
        assert_eq!(mirror.id, ItemId::new("42"));
        assert_eq!(mirror.engagement.get(ReactionKind::Repost), ReactionState::new(false, 3));
    }
}
