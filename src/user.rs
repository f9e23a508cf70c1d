use serde::{Deserialize, Serialize};

use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(String);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum UserParam {
    Me,
    Id(UserId),
}

/// The author of an item or comment, or the user who reposted it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl UserId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        UserId(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl UserParam {
    pub fn as_str(&self) -> &str {
        match self {
            UserParam::Me => "me",
            UserParam::Id(UserId(ref id)) => id.as_str(),
        }
    }
}

impl UserRef {
    pub fn new<S: Into<String>>(id: S, username: S) -> Self {
        UserRef {
            id: UserId::new(id),
            username: username.into(),
            display_name: None,
        }
    }

    /// Name to show in a feed: the display name when set, the handle otherwise.
    pub fn label(&self) -> &str {
        self.display_name
            .as_ref()
            .map(String::as_str)
            .unwrap_or_else(|| self.username.as_str())
    }
}
