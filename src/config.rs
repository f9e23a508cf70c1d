use dotenv::dotenv;
use url::Url;

use crate::cache::ViewName;
use crate::error::Error;
use crate::user::UserRef;

use std::env;
use std::time::Duration;

const DEFAULT_VIEW_TTL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: Url,
    pub token: String,
    pub me: UserRef,
    pub view_ttl: Duration,
    pub default_view: ViewName,
}

impl Config {
    /// Read configuration from the environment, after loading `.env` if one
    /// exists.
    pub fn from_env() -> Result<Self, Error> {
        dotenv().ok();
        Config::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(Error::MissingEnv(name));

        let base_url: Url = required("FEED_URL")?
            .parse()
            .map_err(|_| Error::InvalidEnv("FEED_URL"))?;
        if base_url.scheme() != "https" {
            return Err(Error::InvalidUrl);
        }
        let token = required("FEED_TOKEN")?;
        let user_id = required("FEED_USER_ID")?;
        let username = lookup("FEED_USERNAME").unwrap_or_else(|| user_id.clone());

        let view_ttl = match lookup("FEED_VIEW_TTL_SECS") {
            Some(secs) => secs
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| Error::InvalidEnv("FEED_VIEW_TTL_SECS"))?,
            None => Duration::from_secs(DEFAULT_VIEW_TTL_SECS),
        };
        let default_view = lookup("FEED_VIEW")
            .map(ViewName::new)
            .unwrap_or_else(ViewName::recommended);

        Ok(Config {
            base_url,
            token,
            me: UserRef::new(user_id, username),
            view_ttl,
            default_view,
        })
    }
}
