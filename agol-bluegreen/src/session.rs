//! Authentication is delegated entirely to the platform: we either carry a
//! token we were given or ask the portal to issue one.

use eyre::Result;
use log::{debug, info, warn};

use crate::{Config, Error, Portal};

/// Token lifetime (in minutes) requested when generating a token.
const TOKEN_EXPIRATION_MINUTES: u32 = 60;

/// A portal location plus whatever credentials we have for it.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    portal_url: String,
    token: Option<String>,
}

// Keeps tokens out of debug logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("portal_url", &self.portal_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Session {
    pub fn anonymous<S: AsRef<str>>(portal_url: S) -> Self {
        Self {
            portal_url: normalize_url(portal_url.as_ref()),
            token: None,
        }
    }

    pub fn with_token<S1, S2>(portal_url: S1, token: S2) -> Self
    where
        S1: AsRef<str>,
        S2: AsRef<str>,
    {
        Self {
            portal_url: normalize_url(portal_url.as_ref()),
            token: Some(token.as_ref().to_string()),
        }
    }

    /// Resolve the credentials in the configuration into a session.
    ///
    /// A configured token is used as-is. Otherwise, if both a username and a
    /// password are configured, a token is generated through `portal`
    /// (typically an anonymous [`crate::HttpPortal`]). Failing that, the
    /// session is anonymous.
    pub fn from_config(portal: &dyn Portal, config: &Config) -> Result<Self> {
        if let Some(token) = &config.token {
            debug!("Using configured token for {}", config.portal_url);
            return Ok(Self::with_token(&config.portal_url, token));
        }
        match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                Self::generate_token(portal, &config.portal_url, username, password)
            }
            (Some(_), None) => {
                warn!("A username is configured without a password, continuing anonymously");
                Ok(Self::anonymous(&config.portal_url))
            }
            (None, Some(_)) => {
                warn!("A password is configured without a username, continuing anonymously");
                Ok(Self::anonymous(&config.portal_url))
            }
            (None, None) => {
                warn!("No credentials configured, continuing anonymously");
                Ok(Self::anonymous(&config.portal_url))
            }
        }
    }

    /// Ask the portal to issue a token for the given user.
    ///
    /// The `portal` is typically an anonymous [`crate::HttpPortal`].
    pub fn generate_token(
        portal: &dyn Portal,
        portal_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let session = Self::anonymous(portal_url);
        let url = format!("{}/generateToken", session.sharing_url());
        debug!("Requesting token for user {} from {}", username, url);
        let response = portal.post(
            &url,
            &[
                ("username", username.to_string()),
                ("password", password.to_string()),
                ("client", "referer".to_string()),
                ("referer", session.portal_url.clone()),
                ("expiration", TOKEN_EXPIRATION_MINUTES.to_string()),
            ],
        )?;
        let token = response
            .get("token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| Error::MissingField(url.clone(), "token".to_string()))?;
        info!("Signed in to {} as {}", session.portal_url, username);
        Ok(Self::with_token(&session.portal_url, token))
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Root of the portal's sharing (content) REST API.
    pub fn sharing_url(&self) -> String {
        format!("{}/sharing/rest", self.portal_url)
    }
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
