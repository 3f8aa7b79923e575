//! HTTP access to the portal and hosting server REST APIs.

use eyre::Result;
use log::{debug, trace};
use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use serde_json::Value as JsonValue;

use crate::{Error, Session};

const USER_AGENT: &str = concat!("agol-bluegreen/", env!("CARGO_PKG_VERSION"));

/// Request parameters, sent either as a query string or as a URL-encoded form.
pub type Params<'a> = [(&'a str, String)];

/// Something that can issue requests against the platform's REST endpoints
/// and hand back the decoded JSON body.
///
/// Implementations are expected to pass every decoded body through
/// [`check_response`] so that platform-level errors surface as
/// [`Error::Remote`].
pub trait Portal {
    fn get(&self, url: &str, query: &Params) -> Result<JsonValue>;

    fn post(&self, url: &str, form: &Params) -> Result<JsonValue>;
}

/// [`Portal`] implementation backed by a blocking `reqwest` client.
#[derive(Debug)]
pub struct HttpPortal {
    session: Session,
    client: Client,
}

impl HttpPortal {
    /// Every request carries the portal URL as its `Referer`, which is what
    /// tokens issued by [`Session::generate_token`] are bound to.
    pub fn new(session: Session) -> Result<Self> {
        let referer = HeaderValue::from_str(session.portal_url())
            .map_err(|_| Error::InvalidPortalUrl(session.portal_url().to_string()))?;
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, referer);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(Error::from)?;
        Ok(Self { session, client })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn params(&self, extra: &Params) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(extra.len() + 2);
        params.push(("f".to_string(), "json".to_string()));
        if let Some(token) = self.session.token() {
            params.push(("token".to_string(), token.to_string()));
        }
        params.extend(extra.iter().map(|(k, v)| (k.to_string(), v.clone())));
        params
    }

    fn decode(url: &str, response: Response) -> Result<JsonValue> {
        let status = response.status();
        let body = response.text().map_err(Error::from)?;
        trace!("Response from {} ({}): {}", url, status, body);
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        let json = serde_json::from_str::<JsonValue>(&body).map_err(Error::from)?;
        check_response(json)
    }
}

impl Portal for HttpPortal {
    fn get(&self, url: &str, query: &Params) -> Result<JsonValue> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .query(&self.params(query))
            .send()
            .map_err(Error::from)?;
        Self::decode(url, response)
    }

    fn post(&self, url: &str, form: &Params) -> Result<JsonValue> {
        debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .form(&self.params(form))
            .send()
            .map_err(Error::from)?;
        Self::decode(url, response)
    }
}

/// The platform reports most failures with an HTTP 200 response whose body is
/// an `{"error": {...}}` object. Converts such bodies into [`Error::Remote`]
/// and passes everything else through untouched.
pub fn check_response(json: JsonValue) -> Result<JsonValue> {
    let error = match json.get("error") {
        Some(error) if error.is_object() => error,
        _ => return Ok(json),
    };
    let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown error")
        .to_string();
    let details = error
        .get("details")
        .and_then(|d| d.as_array())
        .map(|details| {
            details
                .iter()
                .filter_map(|d| d.as_str().map(ToString::to_string))
                .collect()
        })
        .unwrap_or_default();
    Err(Error::Remote {
        code,
        message,
        details,
    }
    .into())
}
