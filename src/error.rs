use hyper;
use serde::{Deserialize, Serialize};
use serde_json;
use url;

use crate::reaction::ReactionKind;
use crate::remote::Target;

use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Hyper(hyper::Error),
    Http(hyper::http::Error),
    Json(serde_json::Error),
    Url(url::ParseError),
    InvalidUrl,
    Response(ErrorBody),
    Status(u16),
    EmptyBody,
    Canceled,
    MissingEnv(&'static str),
    InvalidEnv(&'static str),
}

/// Error payload the server sends with a non-success status.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status_code: u16,
}

/// A reaction toggle the server refused. Local state has already been
/// restored to what it was before the toggle when this is returned.
#[derive(Debug)]
pub struct ActionFailed {
    pub kind: ReactionKind,
    pub target: Target,
    pub cause: Error,
}

impl From<url::ParseError> for Error {
    fn from(error: url::ParseError) -> Self {
        Error::Url(error)
    }
}

impl From<hyper::http::Error> for Error {
    fn from(error: hyper::http::Error) -> Self {
        Error::Http(error)
    }
}

impl From<hyper::Error> for Error {
    fn from(error: hyper::Error) -> Self {
        Error::Hyper(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Hyper(err) => write!(f, "transport error: {}", err),
            Error::Http(err) => write!(f, "invalid request: {}", err),
            Error::Json(err) => write!(f, "malformed response: {}", err),
            Error::Url(err) => write!(f, "invalid url: {}", err),
            Error::InvalidUrl => f.write_str("server url must use https"),
            Error::Response(body) => write!(f, "server refused ({}): {}", body.status_code, body.message),
            Error::Status(status) => write!(f, "server returned status {}", status),
            Error::EmptyBody => f.write_str("server returned an empty body"),
            Error::Canceled => f.write_str("request was dropped before it completed"),
            Error::MissingEnv(name) => write!(f, "{} must be set", name),
            Error::InvalidEnv(name) => write!(f, "{} is invalid", name),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Hyper(err) => Some(err),
            Error::Http(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Url(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for ActionFailed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "could not {} {}: {}", self.kind, self.target, self.cause)
    }
}

impl StdError for ActionFailed {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}
