//! JSON-aware resource wrapper
//!
//! A [`Resource`] is a URL with a session attached. It builds child
//! URLs from path segments, encodes query parameters, serializes
//! request bodies to JSON and deserializes success bodies back. All
//! transport behavior lives below it in `sofa_client`.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use sofa_client::{Body, Credentials, Headers, Method, Response, Session};
use thiserror::Error as ThisError;
use url::Url;

/// A `Result` alias where the `Err` case is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the resource layer: transport failures plus JSON and
/// query-string encoding problems.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] sofa_client::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("query encoding error: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    #[error("invalid resource url: {0}")]
    Url(#[from] url::ParseError),

    #[error("url cannot carry path segments: {0}")]
    NotABase(String),

    #[error("response had no body to decode")]
    EmptyBody,
}

/// A convenience handle on one URL of the database.
#[derive(Debug, Clone)]
pub struct Resource {
    session: Arc<Session>,
    url: Url,
    credentials: Option<Credentials>,
}

impl Resource {
    /// Creates a resource rooted at `base`.
    pub fn new(session: Arc<Session>, base: &str) -> Result<Self> {
        Ok(Resource {
            session,
            url: Url::parse(base)?,
            credentials: None,
        })
    }

    /// Attaches basic-auth credentials used by every request from this
    /// resource (and resources derived from it).
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// The resource's URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// A resource one path segment deeper. The segment is
    /// percent-encoded as a single segment; embedded slashes do not
    /// split it.
    pub fn child(&self, segment: &str) -> Result<Self> {
        let mut url = self.url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::NotABase(self.url.to_string()))?
            .pop_if_empty()
            .push(segment);
        Ok(Resource {
            session: Arc::clone(&self.session),
            url,
            credentials: self.credentials.clone(),
        })
    }

    /// GET and decode the JSON body.
    pub fn get<T, Q>(&self, path: Option<&str>, query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.target(path, query)?;
        let response = self.session.request(
            Method::Get,
            &url,
            Body::None,
            Headers::new(),
            self.credentials.as_ref(),
        )?;
        decode_json(&response)
    }

    /// HEAD, returning the raw response (headers only).
    pub fn head(&self, path: Option<&str>) -> Result<Response> {
        let url = self.target(path, None::<&()>)?;
        Ok(self.session.request(
            Method::Head,
            &url,
            Body::None,
            Headers::new(),
            self.credentials.as_ref(),
        )?)
    }

    /// PUT a JSON body and decode the JSON reply.
    pub fn put<T, B>(&self, path: Option<&str>, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::Put, path, body)
    }

    /// POST a JSON body and decode the JSON reply.
    pub fn post<T, B>(&self, path: Option<&str>, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.send_json(Method::Post, path, body)
    }

    /// DELETE and decode the JSON reply.
    pub fn delete<T, Q>(&self, path: Option<&str>, query: Option<&Q>) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.target(path, query)?;
        let response = self.session.request(
            Method::Delete,
            &url,
            Body::None,
            Headers::new(),
            self.credentials.as_ref(),
        )?;
        decode_json(&response)
    }

    fn send_json<T, B>(&self, method: Method, path: Option<&str>, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.target(path, None::<&()>)?;
        let payload = serde_json::to_vec(body)?;
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        let response = self.session.request(
            method,
            &url,
            Body::from(payload),
            headers,
            self.credentials.as_ref(),
        )?;
        decode_json(&response)
    }

    /// Builds the request URL from an optional extra path segment and
    /// optional query parameters.
    fn target<Q>(&self, path: Option<&str>, query: Option<&Q>) -> Result<String>
    where
        Q: Serialize + ?Sized,
    {
        let mut url = self.url.clone();
        if let Some(path) = path {
            url.path_segments_mut()
                .map_err(|()| Error::NotABase(self.url.to_string()))?
                .pop_if_empty()
                .extend(path.split('/'));
        }
        if let Some(query) = query {
            let encoded = serde_urlencoded::to_string(query)?;
            if !encoded.is_empty() {
                url.set_query(Some(&encoded));
            }
        }
        Ok(url.to_string())
    }
}

fn decode_json<T: DeserializeOwned>(response: &Response) -> Result<T> {
    let text = response.text().ok_or(Error::EmptyBody)?;
    Ok(serde_json::from_str(&text)?)
}
