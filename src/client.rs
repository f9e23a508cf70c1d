use futures::{future, Future, Stream};
use hyper;
use hyper::header::{AUTHORIZATION, CONTENT_TYPE};
use hyper::{Body, Client as HyperClient, Method, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json;
use tracing::{debug, trace};
use url::Url;

use crate::cache::{Cursor, ViewName};
use crate::comment::Comment;
use crate::config::Config;
use crate::error::{Error, ErrorBody};
use crate::item::ItemId;
use crate::reaction::{ReactionKind, ReactionReceipt};
use crate::remote::{Page, Remote, RemoteFuture, ReplyTarget, Target};

use std::fmt;
use std::iter;

const DNS_WORKER_THREADS: usize = 4;
const API_BASE: &str = "/api/v1/";

#[derive(Serialize)]
struct SetReaction {
    on: bool,
}

#[derive(Serialize)]
struct CreateReply<'a> {
    content: &'a str,
}

struct SessionToken(String);

struct HttpClient {
    base_url: Url,
    token: SessionToken,
    hyper: HyperClient<HttpsConnector<hyper::client::HttpConnector>, hyper::Body>,
}

/// [`Remote`] over the JSON HTTP API.
pub struct HttpRemote {
    http: HttpClient,
}

impl fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "HttpRemote({})", self.http.base_url)
    }
}

impl HttpClient {
    /// `segments` below the api base, each percent-encoded, with an optional
    /// page cursor.
    fn endpoint<'a, I>(&self, segments: I, cursor: Option<&Cursor>) -> Result<Url, Error>
    where
        I: IntoIterator<Item = &'a str>,
    {
        endpoint(&self.base_url, segments, cursor)
    }

    fn request(
        &self,
        method: Method,
        url: Result<Url, Error>,
        body: Option<String>,
    ) -> impl Future<Item = (StatusCode, hyper::Chunk), Error = Error> {
        let token = format!("Bearer {}", self.token.0);
        let client = self.hyper.clone();

        future::result(url)
            .and_then(move |url| {
                debug!(method = %method, url = url.as_str(), "request");
                let mut request = Request::builder();
                request
                    .method(method)
                    .uri(url.as_str())
                    .header(AUTHORIZATION, token.as_str())
                    .header(CONTENT_TYPE, "application/json");
                let body = body.map(Body::from).unwrap_or_else(Body::empty);
                request.body(body).map_err(Error::from)
            })
            .and_then(move |request| client.request(request).map_err(Error::from))
            .and_then(|res| {
                let status = res.status();
                trace!(status = %status, "response");
                res.into_body()
                    .concat2()
                    .map_err(Error::from)
                    .map(move |body| (status, body))
            })
    }

    fn json<T>(&self, method: Method, url: Result<Url, Error>, body: Option<String>) -> impl Future<Item = Option<T>, Error = Error>
    where
        T: DeserializeOwned,
    {
        self.request(method, url, body)
            .and_then(|(status, body)| decode(status, &body))
    }
}

fn endpoint<'a, I>(base: &Url, segments: I, cursor: Option<&Cursor>) -> Result<Url, Error>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::InvalidUrl)?
        .pop_if_empty()
        .extend(segments);
    if let Some(cursor) = cursor {
        url.query_pairs_mut().append_pair("cursor", cursor.as_str());
    }
    Ok(url)
}

/// Decode a response body. An empty success body is `None`.
fn decode<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Option<T>, Error> {
    if !status.is_success() {
        return Err(match serde_json::from_slice::<ErrorBody>(body) {
            Ok(body) => Error::Response(body),
            Err(_) => Error::Status(status.as_u16()),
        });
    }
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(Error::from)
}

/// A reaction response only counts as a receipt when it has the expected
/// shape; anything else is a bare acknowledgement.
fn receipt(value: Option<serde_json::Value>) -> Option<ReactionReceipt> {
    value.and_then(|value| serde_json::from_value(value).ok())
}

impl HttpRemote {
    pub fn new(url: Url, token: String) -> Result<Self, Error> {
        if url.scheme() != "https" {
            return Err(Error::InvalidUrl);
        }

        // Append the api base
        let url = url.join(API_BASE)?;

        let https = HttpsConnector::new(DNS_WORKER_THREADS);
        let client: HyperClient<_, hyper::Body> = HyperClient::builder().build(https);

        Ok(HttpRemote {
            http: HttpClient {
                base_url: url,
                token: SessionToken(token),
                hyper: client,
            },
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        HttpRemote::new(config.base_url.clone(), config.token.clone())
    }
}

impl Remote for HttpRemote {
    fn set_reaction(
        &self,
        target: &Target,
        kind: ReactionKind,
        on: bool,
    ) -> RemoteFuture<Option<ReactionReceipt>> {
        let mut segments = target.segments();
        segments.extend(&["reactions", kind.as_str()]);
        let url = self.http.endpoint(segments, None);
        let (method, body) = if on {
            (Method::POST, serde_json::to_string(&SetReaction { on }).ok())
        } else {
            (Method::DELETE, None)
        };
        Box::new(
            self.http
                .json::<serde_json::Value>(method, url, body)
                .map(receipt),
        )
    }

    fn fetch_page(&self, view: &ViewName, cursor: Option<&Cursor>) -> RemoteFuture<Page> {
        let url = self
            .http
            .endpoint(iter::once("views").chain(view.segments()), cursor);
        Box::new(
            self.http
                .json::<Page>(Method::GET, url, None)
                .and_then(|page| page.ok_or(Error::EmptyBody)),
        )
    }

    fn fetch_replies(&self, item: &ItemId) -> RemoteFuture<Vec<Comment>> {
        let url = self
            .http
            .endpoint(ReplyTarget::Item(item.clone()).segments(), None);
        Box::new(
            self.http
                .json::<Vec<Comment>>(Method::GET, url, None)
                .map(Option::unwrap_or_default),
        )
    }

    fn post_reply(&self, target: &ReplyTarget, content: &str) -> RemoteFuture<Comment> {
        let body = match serde_json::to_string(&CreateReply { content }) {
            Ok(body) => body,
            Err(err) => return Box::new(future::err(Error::from(err))),
        };
        let url = self.http.endpoint(target.segments(), None);
        Box::new(
            self.http
                .json::<Comment>(Method::POST, url, Some(body))
                .and_then(|comment| comment.ok_or(Error::EmptyBody)),
        )
    }
}
