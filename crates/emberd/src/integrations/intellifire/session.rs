use std::sync::Arc;

use tracing::debug;

use super::client::HttpClient;
use super::client::HttpError;

/// An authenticated cloud session.
///
/// The session cookie itself lives in the HTTP client's cookie store and is
/// attached to every cloud request implicitly. What we keep here is the
/// account identifier the login response reports, because the local
/// challenge-response protocol needs it as the `user` field.
///
/// Written once at login and shared read-only by every device unit.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Transport(#[from] HttpError),

    #[error("login rejected with status {status}")]
    Rejected { status: u16 },

    #[error("login response did not include a user identifier")]
    MissingUser,
}

/// Authenticates against the vendor cloud and produces the shared session.
pub struct SessionManager<C: HttpClient> {
    client: Arc<C>,
    base_url: String,
}

impl<C: HttpClient> SessionManager<C> {
    pub fn new(client: Arc<C>, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Log in with account credentials.
    ///
    /// On success the cloud auth cookie is left in the client's cookie store
    /// and the extracted user identifier is returned as the session. There is
    /// no automatic re-login: an expired session surfaces as a failure on the
    /// next cloud call.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}/login", self.base_url);
        let form = vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ];

        let response = self.client.post_form(&url, &form).await?;
        if !response.is_success() {
            return Err(AuthError::Rejected {
                status: response.status,
            });
        }

        let user_id = response
            .cookies
            .iter()
            .find(|(name, _)| name == "user")
            .map(|(_, value)| value.clone())
            .ok_or(AuthError::MissingUser)?;

        debug!("Logged in to {} as user {}", self.base_url, user_id);
        Ok(Session { user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::intellifire::client::MockHttpClient;

    #[tokio::test]
    async fn test_login_extracts_user_cookie() {
        let client = Arc::new(MockHttpClient::new());
        client.respond_with_cookies(
            "https://iftapi.net/a/login",
            204,
            "",
            vec![
                ("auth_cookie".to_string(), "opaque".to_string()),
                ("user".to_string(), "user-42".to_string()),
            ],
        );

        let manager = SessionManager::new(client.clone(), "https://iftapi.net/a".to_string());
        let session = manager.login("user@example.com", "hunter2").await.unwrap();
        assert_eq!(session.user_id, "user-42");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].url, "https://iftapi.net/a/login");
        assert!(requests[0]
            .form
            .contains(&("username".to_string(), "user@example.com".to_string())));
        assert!(requests[0]
            .form
            .contains(&("password".to_string(), "hunter2".to_string())));
    }

    #[tokio::test]
    async fn test_login_rejected_status() {
        let client = Arc::new(MockHttpClient::new());
        client.respond("https://iftapi.net/a/login", 403, "bad credentials");

        let manager = SessionManager::new(client, "https://iftapi.net/a".to_string());
        let err = manager.login("user@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { status: 403 }));
    }

    #[tokio::test]
    async fn test_login_missing_user_cookie() {
        let client = Arc::new(MockHttpClient::new());
        client.respond("https://iftapi.net/a/login", 204, "");

        let manager = SessionManager::new(client, "https://iftapi.net/a".to_string());
        let err = manager.login("user@example.com", "hunter2").await.unwrap_err();
        assert!(matches!(err, AuthError::MissingUser));
    }

    #[tokio::test]
    async fn test_login_transport_failure() {
        let client = Arc::new(MockHttpClient::new());
        // No response configured for the login URL.

        let manager = SessionManager::new(client, "https://iftapi.net/a".to_string());
        let err = manager.login("user@example.com", "hunter2").await.unwrap_err();
        assert!(matches!(err, AuthError::Transport(_)));
    }
}
