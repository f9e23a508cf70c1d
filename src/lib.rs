pub mod cache;
pub mod client;
pub mod clock;
pub mod comment;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod item;
pub mod projection;
pub mod reaction;
pub mod remote;
pub mod session;
pub mod thread;
pub mod user;

pub use crate::cache::{Cursor, ViewCache, ViewName};
pub use crate::client::HttpRemote;
pub use crate::comment::{Comment, CommentId};
pub use crate::config::Config;
pub use crate::coordinator::{Coordinator, Phase, Settlement, Toggle};
pub use crate::error::{ActionFailed, Error};
pub use crate::item::{Item, ItemId};
pub use crate::reaction::{ReactionKind, ReactionState};
pub use crate::remote::Remote;
pub use crate::session::Session;
