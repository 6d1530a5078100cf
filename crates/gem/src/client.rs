//! JSON-over-HTTP client for the gem bot API.
//!
//! Every call is a `POST {url}{operation}` with a JSON object body. Transport
//! failures are retried after a fixed delay without bound; the
//! `E_SESSION_EXPIRED` sentinel triggers a single-flight re-authentication
//! followed by a retry of the same call.

use std::{sync::Arc, time::Duration};

use {
    botbridge_common::ReplyMarkup,
    secrecy::{ExposeSecret, Secret},
    serde_json::{Map, Value},
    tokio::sync::Mutex,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    config::GemAccountConfig,
    error::{Error, Result},
    format,
    protocol::{DeliveryBatch, Operation, error_message, is_session_expired},
    session::{Session, SessionStore},
};

/// Keys whose values never reach the logs.
const REDACTED_KEYS: &[&str] = &["token", "session"];

pub struct GemClient {
    http: reqwest::Client,
    base_url: String,
    token: Secret<String>,
    endpoint: String,
    debug: bool,
    retry_delay: Duration,
    max_auth_attempts: u32,
    sessions: Arc<SessionStore>,
    /// Held for the whole `connectBot` exchange so concurrent callers share
    /// one authentication.
    auth_lock: Mutex<()>,
}

impl GemClient {
    pub fn new(config: &GemAccountConfig) -> Result<Self> {
        Self::with_session_store(config, Arc::new(SessionStore::new()))
    }

    /// Build a client around an existing store.
    pub fn with_session_store(
        config: &GemAccountConfig,
        sessions: Arc<SessionStore>,
    ) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::message("gem account requires a `url`"));
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let mut base_url = config.url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
            endpoint: config.endpoint.clone(),
            debug: config.debug,
            retry_delay: config.retry_delay(),
            max_auth_attempts: config.max_auth_attempts.max(1),
            sessions,
            auth_lock: Mutex::new(()),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn current_session(&self) -> Option<Session> {
        self.sessions.get()
    }

    /// Obtain a fresh session from `connectBot` and install it.
    ///
    /// Callers racing with an authentication already in progress wait for it
    /// and receive its session instead of issuing a second `connectBot`.
    pub async fn authenticate(&self) -> Result<Session> {
        let seen = self.sessions.generation();
        self.refresh(seen).await
    }

    /// Re-authenticate unless the store moved past generation `seen` while
    /// we waited for the lock.
    async fn refresh(&self, seen: u64) -> Result<Session> {
        let _guard = self.auth_lock.lock().await;

        if let Some(current) = self.sessions.get()
            && current.generation() != seen
            && current.is_live()
        {
            debug!(
                generation = current.generation(),
                "session already refreshed by another caller"
            );
            return Ok(current);
        }

        let session = self.connect().await?;
        let session = self.sessions.replace(session);
        info!(generation = session.generation(), "gem session established");
        Ok(session)
    }

    /// Live session, authenticating first when there is none.
    async fn ensure_session(&self) -> Result<Session> {
        match self.sessions.get() {
            Some(session) if session.is_live() => Ok(session),
            Some(session) => self.refresh(session.generation()).await,
            None => self.refresh(0).await,
        }
    }

    async fn connect(&self) -> Result<Session> {
        let mut params = Map::new();
        params.insert(
            "token".into(),
            Value::from(self.token.expose_secret().as_str()),
        );
        params.insert("remoteUrl".into(), Value::from(self.endpoint.as_str()));

        let mut reason = String::new();
        for attempt in 1..=self.max_auth_attempts {
            let body = self.send_with_retry(Operation::ConnectBot, &params).await;
            if let Some(session) = body.get("session").and_then(Session::from_wire) {
                return Ok(session);
            }

            reason = error_message(&body)
                .unwrap_or("response carried no session")
                .to_string();
            warn!(
                attempt,
                max_attempts = self.max_auth_attempts,
                reason = %reason,
                "connectBot refused a session"
            );
            if attempt < self.max_auth_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(Error::AuthRejected {
            attempts: self.max_auth_attempts,
            reason,
        })
    }

    /// Issue `operation` with the current session attached.
    ///
    /// Never returns the expiry sentinel: an expired session is replaced and
    /// the call re-issued, as often as the remote keeps expiring it. The only
    /// error is a terminal authentication failure.
    pub async fn request(&self, operation: Operation, params: Map<String, Value>) -> Result<Value> {
        loop {
            let session = self.ensure_session().await?;
            let mut call = params.clone();
            call.insert("session".into(), session.wire_value());

            let body = self.send_with_retry(operation, &call).await;
            if !is_session_expired(&body) {
                return Ok(body);
            }

            info!(
                operation = %operation,
                generation = session.generation(),
                "gem session expired, re-authenticating"
            );
            self.sessions.expire(session.generation());
            self.refresh(session.generation()).await?;
        }
    }

    /// POST until the remote answers with JSON, sleeping `retry_delay`
    /// between attempts.
    async fn send_with_retry(&self, operation: Operation, params: &Map<String, Value>) -> Value {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.post_once(operation, params).await {
                Ok(body) => return body,
                Err(e) => {
                    warn!(
                        operation = %operation,
                        attempt,
                        error = %e,
                        retry_in_ms = self.retry_delay.as_millis() as u64,
                        "gem request failed, retrying"
                    );
                    tokio::time::sleep(self.retry_delay).await;
                },
            }
        }
    }

    async fn post_once(&self, operation: Operation, params: &Map<String, Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, operation.as_str());
        if self.debug {
            debug!(operation = %operation, %url, params = %redacted(params), "gem request");
        }

        let resp = self.http.post(&url).json(params).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if self.debug {
            debug!(operation = %operation, status = status.as_u16(), body = %text, "gem response");
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| Error::InvalidResponse {
            operation: operation.to_string(),
            detail: format!("HTTP {status}: {e}"),
        })
    }

    /// Pending messages, stamped with `timestamp` (client clock, ms).
    pub async fn fetch_pending(&self, timestamp: i64) -> Result<DeliveryBatch> {
        let mut params = Map::new();
        params.insert("timestamp".into(), Value::from(timestamp));
        let body = self.request(Operation::GetMessages, params).await?;
        Ok(DeliveryBatch::from_response(&body, timestamp))
    }

    /// Acknowledge everything delivered up to `high_water`.
    pub async fn confirm(&self, high_water: i64) -> Result<()> {
        let mut params = Map::new();
        params.insert("timestamp".into(), Value::from(high_water));
        self.request(Operation::ConfirmDelivery, params).await?;
        Ok(())
    }

    /// `receiver` is the sender id as the remote delivered it.
    pub async fn send_message(
        &self,
        receiver: &Value,
        text: &str,
        markup: &ReplyMarkup,
    ) -> Result<()> {
        let params = format::message_params(receiver, text, markup);
        self.request(Operation::SendMessage, params).await?;
        Ok(())
    }

    pub async fn send_photo(&self, receiver: &Value, url: &str) -> Result<()> {
        let params = format::photo_params(receiver, url);
        self.request(Operation::SendMessage, params).await?;
        Ok(())
    }

    /// Re-authenticate every `interval` until `cancel` fires, independent of
    /// expiry detection.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {},
                }
                match client.authenticate().await {
                    Ok(session) => {
                        debug!(generation = session.generation(), "gem session refreshed");
                    },
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "gem session refresh rejected, stopping heartbeat");
                        break;
                    },
                    Err(e) => warn!(error = %e, "gem session refresh failed"),
                }
            }
            debug!("gem heartbeat stopped");
        })
    }
}

fn redacted(params: &Map<String, Value>) -> Value {
    let mut copy = params.clone();
    for key in REDACTED_KEYS {
        if let Some(v) = copy.get_mut(*key) {
            *v = Value::from("[REDACTED]");
        }
    }
    Value::Object(copy)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, serde_json::json};

    fn config(url: &str) -> GemAccountConfig {
        GemAccountConfig {
            url: url.to_string(),
            token: Secret::new("bot-token".into()),
            endpoint: "https://me.example/gem".into(),
            retry_delay_ms: 1,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn authenticate_sends_token_and_remote_url() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .match_body(Matcher::Json(json!({
                "token": "bot-token",
                "remoteUrl": "https://me.example/gem"
            })))
            .with_body(r#"{"session":"s-1"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        let session = client.authenticate().await.unwrap();
        assert_eq!(session.credential().expose_secret(), "s-1");
        assert!(session.is_live());
        assert_eq!(
            client.current_session().unwrap().generation(),
            session.generation()
        );
        connect.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_authentication_is_single_flight() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"shared"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = Arc::new(GemClient::new(&config(&server.url())).unwrap());
        let (a, b) = tokio::join!(client.authenticate(), client.authenticate());
        assert_eq!(a.unwrap().generation(), b.unwrap().generation());
        connect.assert_async().await;
    }

    #[tokio::test]
    async fn expired_session_reauthenticates_once_and_retries() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"fresh"}"#)
            .expect(1)
            .create_async()
            .await;
        let expired = server
            .mock("POST", "/getMessages")
            .match_body(Matcher::PartialJson(json!({"session": "stale"})))
            .with_body(r#"{"error":{"message":"E_SESSION_EXPIRED"}}"#)
            .expect(1)
            .create_async()
            .await;
        let fetched = server
            .mock("POST", "/getMessages")
            .match_body(Matcher::PartialJson(json!({"session": "fresh"})))
            .with_body(
                r#"{"timestamp":1700,"messages":[{"senderId":"7","messageType":"RichText","message":"{\"Text\":\"hi\"}"}]}"#,
            )
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(SessionStore::new());
        store.replace(Session::new(Secret::new("stale".into())));
        let client = GemClient::with_session_store(&config(&server.url()), store).unwrap();

        let batch = client.fetch_pending(1_000).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.high_water, 1700);
        assert_eq!(batch.items[0].sender, json!("7"));

        connect.assert_async().await;
        expired.assert_async().await;
        fetched.assert_async().await;
    }

    #[tokio::test]
    async fn request_authenticates_lazily() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":42}"#)
            .expect(1)
            .create_async()
            .await;
        let confirm = server
            .mock("POST", "/confirmDelivery")
            .match_body(Matcher::Json(json!({"session": 42, "timestamp": 99})))
            .with_body("")
            .expect(1)
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        client.confirm(99).await.unwrap();
        connect.assert_async().await;
        confirm.assert_async().await;
    }

    #[tokio::test]
    async fn refused_session_is_fatal_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .with_body(r#"{"error":{"message":"E_INVALID_TOKEN"}}"#)
            .expect(2)
            .create_async()
            .await;

        let cfg = GemAccountConfig {
            max_auth_attempts: 2,
            ..config(&server.url())
        };
        let client = GemClient::new(&cfg).unwrap();
        let err = client.authenticate().await.unwrap_err();
        assert!(err.is_fatal());
        match err {
            Error::AuthRejected { attempts, reason } => {
                assert_eq!(attempts, 2);
                assert_eq!(reason, "E_INVALID_TOKEN");
            },
            other => panic!("unexpected error: {other}"),
        }
        assert!(client.current_session().is_none());
        connect.assert_async().await;
    }

    #[tokio::test]
    async fn send_message_posts_rich_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"s"}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "session": "s",
                "receiverId": 12,
                "messageType": "RichText",
                "messageTitle": "done"
            })))
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        client
            .send_message(&json!(12), "*done*", &ReplyMarkup::none())
            .await
            .unwrap();
        send.assert_async().await;
    }

    #[tokio::test]
    async fn non_json_body_is_a_transport_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/getMessages")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        let err = client
            .post_once(Operation::GetMessages, &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn string_session_is_sent_back_as_a_string() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"123"}"#)
            .create_async()
            .await;
        let confirm = server
            .mock("POST", "/confirmDelivery")
            .match_body(Matcher::Json(json!({"session": "123", "timestamp": 1})))
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        client.confirm(1).await.unwrap();
        confirm.assert_async().await;
    }

    #[tokio::test]
    async fn transport_failure_is_retried_until_json_arrives() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"s"}"#)
            .create_async()
            .await;
        let broken = server
            .mock("POST", "/getMessages")
            .with_status(502)
            .with_body("<html>bad gateway</html>")
            .expect(1)
            .create_async()
            .await;
        let healthy = server
            .mock("POST", "/getMessages")
            .with_body(r#"{"timestamp":8,"messages":[{"senderId":"a","messageType":"RichText"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = GemClient::new(&config(&server.url())).unwrap();
        let batch = client.fetch_pending(3).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.high_water, 8);

        broken.assert_async().await;
        healthy.assert_async().await;
    }

    #[tokio::test]
    async fn concurrent_expiry_reconnects_once() {
        let mut server = mockito::Server::new_async().await;
        let connect = server
            .mock("POST", "/connectBot")
            .with_body(r#"{"session":"fresh"}"#)
            .expect(1)
            .create_async()
            .await;
        let expired = server
            .mock("POST", "/confirmDelivery")
            .match_body(Matcher::PartialJson(json!({"session": "stale"})))
            .with_body(r#"{"error":{"message":"E_SESSION_EXPIRED"}}"#)
            .expect_at_least(1)
            .create_async()
            .await;
        let confirmed = server
            .mock("POST", "/confirmDelivery")
            .match_body(Matcher::PartialJson(json!({"session": "fresh"})))
            .with_body("{}")
            .expect(3)
            .create_async()
            .await;

        let store = Arc::new(SessionStore::new());
        store.replace(Session::new(Secret::new("stale".into())));
        let client = GemClient::with_session_store(&config(&server.url()), store).unwrap();

        let (a, b, c) = tokio::join!(client.confirm(1), client.confirm(2), client.confirm(3));
        a.unwrap();
        b.unwrap();
        c.unwrap();

        connect.assert_async().await;
        expired.assert_async().await;
        confirmed.assert_async().await;
        let current = client.current_session().unwrap();
        assert!(current.is_live());
        assert_eq!(current.wire_value(), json!("fresh"));
    }

    #[test]
    fn empty_url_is_rejected() {
        assert!(GemClient::new(&GemAccountConfig::default()).is_err());
    }

    #[test]
    fn redacts_secrets_in_logged_params() {
        let mut params = Map::new();
        params.insert("token".into(), json!("bot-token"));
        params.insert("session".into(), json!("s"));
        params.insert("timestamp".into(), json!(5));
        let logged = redacted(&params).to_string();
        assert!(!logged.contains("bot-token"));
        assert!(logged.contains("\"timestamp\":5"));
    }
}
