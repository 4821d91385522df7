//! OAuth2 authorization-code + PKCE flow (§4.4), including the one-shot loopback HTTP
//! callback receiver. Grounded on `querymt-querymt`'s axum + oneshot-channel callback listener
//! (`crates/agent/src/ui/handlers/oauth.rs`), adapted to bind a random port (§6: "dynamic-port")
//! instead of a fixed one and to drive a single integration's flow rather than a provider table.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::model::{Integration, OAuthToken};

use super::OAUTH_FLOW_TIMEOUT;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, thiserror::Error)]
pub enum OAuthFlowError {
    #[error("failed to bind loopback callback listener: {0}")]
    Bind(std::io::Error),
    #[error("oauth callback timed out after {0:?}")]
    Timeout(Duration),
    #[error("oauth callback listener closed unexpectedly")]
    ListenerClosed,
    #[error("provider returned an error: {0}")]
    ProviderError(String),
    #[error("csrf state mismatch")]
    StateMismatch,
    #[error("token exchange failed: {0}")]
    Exchange(String),
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type CallbackResult = Result<(String, String), String>;

#[derive(Clone)]
struct CallbackHttpState {
    expected_state: String,
    result_tx: Arc<AsyncMutex<Option<oneshot::Sender<CallbackResult>>>>,
}

async fn callback_handler(
    State(state): State<CallbackHttpState>,
    Query(query): Query<CallbackQuery>,
) -> Html<&'static str> {
    let result: CallbackResult = if let Some(error) = query.error {
        Err(error)
    } else {
        match (query.code, query.state) {
            (Some(code), Some(returned_state)) if returned_state == state.expected_state => {
                Ok((code, returned_state))
            }
            (Some(_), Some(_)) => Err("state mismatch".to_string()),
            _ => Err("missing code or state".to_string()),
        }
    };
    if let Some(tx) = state.result_tx.lock().await.take() {
        let _ = tx.send(result);
    }
    Html("<html><body>You may close this tab and return to Agento.</body></html>")
}

/// A started, not-yet-completed OAuth flow for one integration.
pub struct PendingFlow {
    client: BasicClient,
    pkce_verifier: PkceCodeVerifier,
    expected_state: String,
    pub authorize_url: String,
    listener: tokio::net::TcpListener,
}

impl PendingFlow {
    pub async fn start(integration: &Integration, scopes: Vec<String>) -> Result<Self, OAuthFlowError> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(OAuthFlowError::Bind)?;
        let port = listener.local_addr().map_err(OAuthFlowError::Bind)?.port();
        let redirect_uri = format!("http://localhost:{port}/callback");

        let client = BasicClient::new(
            ClientId::new(integration.credentials.client_id.clone()),
            Some(ClientSecret::new(integration.credentials.client_secret.clone())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string()).expect("static auth url"),
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string()).expect("static token url")),
        )
        .set_redirect_uri(RedirectUrl::new(redirect_uri).map_err(|e| OAuthFlowError::Exchange(e.to_string()))?);

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let mut auth_request = client.authorize_url(CsrfToken::new_random).set_pkce_challenge(pkce_challenge);
        for scope in &scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }
        let (authorize_url, csrf_token) = auth_request.url();

        Ok(Self {
            client,
            pkce_verifier,
            expected_state: csrf_token.secret().clone(),
            authorize_url: authorize_url.to_string(),
            listener,
        })
    }

    /// Serves exactly one callback request (or times out after [`OAUTH_FLOW_TIMEOUT`]), then
    /// exchanges the returned code for a token (§4.4).
    pub async fn wait_for_token(self) -> Result<OAuthToken, OAuthFlowError> {
        let (result_tx, result_rx) = oneshot::channel();
        let http_state = CallbackHttpState {
            expected_state: self.expected_state.clone(),
            result_tx: Arc::new(AsyncMutex::new(Some(result_tx))),
        };
        let app = Router::new().route("/callback", get(callback_handler)).with_state(http_state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            let _ = axum::serve(self.listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        let wait_result = tokio::time::timeout(OAUTH_FLOW_TIMEOUT, result_rx).await;
        let _ = shutdown_tx.send(());
        let _ = server_task.await;

        let (code, returned_state) = match wait_result {
            Err(_) => return Err(OAuthFlowError::Timeout(OAUTH_FLOW_TIMEOUT)),
            Ok(Err(_)) => return Err(OAuthFlowError::ListenerClosed),
            Ok(Ok(Err(msg))) => return Err(OAuthFlowError::ProviderError(msg)),
            Ok(Ok(Ok(payload))) => payload,
        };
        if returned_state != self.expected_state {
            return Err(OAuthFlowError::StateMismatch);
        }

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(self.pkce_verifier)
            .request_async(async_http_client)
            .await
            .map_err(|e| OAuthFlowError::Exchange(e.to_string()))?;

        Ok(OAuthToken {
            access_token: token.access_token().secret().clone(),
            refresh_token: token.refresh_token().map(|t| t.secret().clone()).unwrap_or_default(),
            expires_at: token.expires_in().map(|d| chrono::Utc::now() + chrono::Duration::from_std(d).unwrap_or_default()),
        })
    }
}
