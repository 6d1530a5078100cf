//! Push ingestion: the gem server may POST messages to the configured
//! `endpoint` instead of waiting for `getMessages`.
//!
//! Pushed records go through the same normalize → pipeline path but are never
//! confirmed, so there is no redelivery on failure. Every request is answered
//! with `ok` whatever its method, content type or body.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{Router, body::Bytes, extract::State, routing::any},
    serde_json::Value,
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{error::Result, protocol::RawMessage, state::AccountContext};

pub fn router(context: Arc<AccountContext>) -> Router {
    Router::new().route("/", any(ingest)).with_state(context)
}

async fn ingest(State(context): State<Arc<AccountContext>>, body: Bytes) -> &'static str {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            debug!(
                account_id = %context.account_id,
                len = body.len(),
                error = %e,
                "ignoring gem push without a JSON body"
            );
            return "ok";
        },
    };
    let Some(Value::Array(messages)) = body.get("messages") else {
        return "ok";
    };

    debug!(
        account_id = %context.account_id,
        count = messages.len(),
        "gem push received"
    );
    for record in messages {
        let raw = RawMessage::from_value(record.clone());
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            context.dispatch(raw).await;
        });
    }
    "ok"
}

/// Bind `addr` and serve the push endpoint until `cancel` fires.
pub async fn serve(
    addr: SocketAddr,
    context: Arc<AccountContext>,
    cancel: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::Error::external(format!("binding gem webhook on {addr}"), e))?;
    let bound = listener
        .local_addr()
        .map_err(|e| crate::Error::external("reading gem webhook address", e))?;
    info!(account_id = %context.account_id, addr = %bound, "gem webhook listening");

    let app = router(context);
    Ok(tokio::spawn(async move {
        let shutdown = cancel.cancelled_owned();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            warn!(error = %e, "gem webhook server exited");
        }
    }))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::time::Duration;

    use {
        super::*,
        crate::{client::GemClient, config::GemAccountConfig},
        botbridge_channels::{Flow, Pipeline, handler_fn},
        serde_json::json,
        tokio::sync::mpsc,
    };

    fn context(pipeline: Arc<Pipeline>) -> Arc<AccountContext> {
        let cfg = GemAccountConfig {
            url: "http://127.0.0.1:9/".into(),
            ..Default::default()
        };
        Arc::new(AccountContext {
            account_id: "push".into(),
            client: Arc::new(GemClient::new(&cfg).unwrap()),
            pipeline,
        })
    }

    #[tokio::test]
    async fn pushed_messages_reach_the_pipeline() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let capture = handler_fn("capture", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.text.clone());
                Ok(Flow::Continue)
            }
        });
        let addr = spawn_router(Arc::new(Pipeline::new().with_handler(capture))).await;

        let body = json!({"messages": [
            {"senderId": "1", "messageType": "RichText", "message": "{\"Text\":\"/help\"}"},
            {"senderId": "2", "messageType": "Sticker"},
        ]});
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "ok");

        let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "help");
    }

    #[tokio::test]
    async fn body_without_messages_is_accepted() {
        let addr = spawn_router(Arc::new(Pipeline::new())).await;

        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .json(&json!({"ping": true}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    async fn spawn_router(pipeline: Arc<Pipeline>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(context(pipeline));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn push_without_content_type_is_dispatched() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let capture = handler_fn("capture", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event.sender_id.clone());
                Ok(Flow::Continue)
            }
        });
        let addr = spawn_router(Arc::new(Pipeline::new().with_handler(capture))).await;

        let body = json!({"messages": [
            {"senderId": 77, "messageType": "RichText", "message": "{\"Text\":\"hi\"}"},
        ]});
        let resp = reqwest::Client::new()
            .post(format!("http://{addr}/"))
            .body(body.to_string())
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "ok");

        let sender = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sender, "77");
    }

    #[tokio::test]
    async fn any_method_and_garbage_body_answer_ok() {
        let addr = spawn_router(Arc::new(Pipeline::new())).await;
        let http = reqwest::Client::new();

        let resp = http.get(format!("http://{addr}/")).send().await.unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "ok");

        let resp = http
            .put(format!("http://{addr}/"))
            .body("not json at all")
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let handle = serve(
            "127.0.0.1:0".parse().unwrap(),
            context(Arc::new(Pipeline::new())),
            cancel.clone(),
        )
        .await
        .unwrap();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
