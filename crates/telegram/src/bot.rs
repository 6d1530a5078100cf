use std::sync::Arc;

use {
    botbridge_channels::{InboundEvent, Pipeline},
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, Update, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    config::TelegramAccountConfig,
    normalize::{callback_chat, message_chat, normalize_callback, normalize_message},
    outbound::TelegramReply,
    state::{AccountState, AccountStateMap},
};

/// Start polling for a single bot account.
///
/// Spawns a background task that dispatches updates into `pipeline` until
/// the returned `CancellationToken` is cancelled.
pub async fn start_polling(
    account_id: String,
    config: TelegramAccountConfig,
    accounts: AccountStateMap,
    pipeline: Arc<Pipeline>,
) -> anyhow::Result<CancellationToken> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(config.client_timeout())
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    // Verify credentials and get bot username.
    let me = bot.get_me().await?;
    let bot_username = me.username.clone();

    // Delete any existing webhook so long polling works.
    bot.delete_webhook().send().await?;

    info!(
        account_id,
        username = ?bot_username,
        "telegram bot connected (webhook cleared)"
    );

    let cancel = CancellationToken::new();
    let state = AccountState {
        bot: bot.clone(),
        bot_username,
        account_id: account_id.clone(),
        config: config.clone(),
        cancel: cancel.clone(),
    };
    {
        let mut map = accounts.write().unwrap_or_else(|e| e.into_inner());
        map.insert(account_id.clone(), state);
    }

    tokio::spawn(poll_loop(bot, account_id, config, pipeline, cancel.clone()));
    Ok(cancel)
}

async fn poll_loop(
    bot: Bot,
    account_id: String,
    config: TelegramAccountConfig,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
) {
    info!(account_id, "starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        if cancel.is_cancelled() {
            info!(account_id, "telegram polling stopped");
            break;
        }

        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(config.poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]);
        let result = tokio::select! {
            () = cancel.cancelled() => {
                info!(account_id, "telegram polling stopped");
                break;
            },
            result = request.send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(account_id, count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    if let Some(event) = event_for_update(&bot, &account_id, update).await {
                        let pipeline = Arc::clone(&pipeline);
                        tokio::spawn(async move {
                            pipeline.run(Some(event)).await;
                        });
                    }
                }
            },
            Err(e) => {
                // Another instance polls with the same token; both would lose updates.
                if matches!(&e, RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) {
                    warn!(
                        account_id,
                        "telegram bot disabled: another instance is already running with this token"
                    );
                    cancel.cancel();
                    break;
                }

                warn!(account_id, error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(config.retry_delay()) => {},
                }
            },
        }
    }
}

/// Normalize one update. Callback queries are answered first so the client
/// stops showing a spinner on the pressed button.
async fn event_for_update(bot: &Bot, account_id: &str, update: Update) -> Option<InboundEvent> {
    match update.kind {
        UpdateKind::Message(msg) => {
            debug!(
                account_id,
                chat_id = msg.chat.id.0,
                "received telegram message"
            );
            let reply = Arc::new(TelegramReply::new(bot.clone(), message_chat(&msg)));
            normalize_message(&msg, account_id, reply)
        },
        UpdateKind::CallbackQuery(query) => {
            debug!(
                account_id,
                callback_data = ?query.data,
                "received telegram callback query"
            );
            if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
                debug!(account_id, error = %e, "failed to answer callback query");
            }
            let reply = Arc::new(TelegramReply::new(bot.clone(), callback_chat(&query)));
            normalize_callback(&query, account_id, reply)
        },
        other => {
            debug!(account_id, "ignoring telegram update: {other:?}");
            None
        },
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        axum::{Json, Router, extract::State, http::Uri, routing::post},
        botbridge_channels::{Flow, handler_fn},
        serde_json::{Value, json},
        std::{sync::Mutex, time::Duration},
        tokio::sync::mpsc,
    };

    /// Mock Bot API: `getUpdates` serves `updates` once, then nothing.
    #[derive(Clone)]
    struct MockApi {
        updates: Arc<Mutex<Option<Value>>>,
        answered: Arc<Mutex<Vec<String>>>,
    }

    async fn api(State(state): State<MockApi>, uri: Uri, body: axum::body::Bytes) -> Json<Value> {
        let method = uri.path().rsplit('/').next().unwrap_or_default().to_string();
        let result = match method.as_str() {
            "GetUpdates" => {
                let next = state.updates.lock().unwrap().take();
                match next {
                    Some(updates) => updates,
                    None => {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        json!([])
                    },
                }
            },
            "AnswerCallbackQuery" => {
                let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                state
                    .answered
                    .lock()
                    .unwrap()
                    .push(body["callback_query_id"].as_str().unwrap_or_default().to_string());
                json!(true)
            },
            _ => json!(true),
        };
        Json(json!({ "ok": true, "result": result }))
    }

    #[tokio::test]
    async fn updates_reach_the_pipeline() {
        let mock = MockApi {
            updates: Arc::new(Mutex::new(Some(json!([
                {
                    "update_id": 10,
                    "message": {
                        "message_id": 1, "date": 1,
                        "chat": { "id": 42, "type": "private", "first_name": "Alice" },
                        "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                        "text": "hello"
                    }
                },
                {
                    "update_id": 11,
                    "callback_query": {
                        "id": "cb-1",
                        "from": { "id": 1001, "is_bot": false, "first_name": "Alice" },
                        "chat_instance": "ci",
                        "data": "confirm"
                    }
                }
            ])))),
            answered: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/{*path}", post(api))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let pipeline = Arc::new(Pipeline::new().with_handler(handler_fn("capture", move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send((event.kind, event.text.clone()));
                Ok(Flow::Continue)
            }
        })));

        let api_url = reqwest::Url::parse(&format!("http://{addr}/")).unwrap();
        let bot = Bot::new("test-token").set_api_url(api_url);
        let cancel = CancellationToken::new();
        let config = TelegramAccountConfig {
            poll_timeout_secs: 0,
            retry_delay_ms: 10,
            ..Default::default()
        };
        let task = tokio::spawn(poll_loop(bot, "main".into(), config, pipeline, cancel.clone()));

        let mut seen = Vec::new();
        for _ in 0..2 {
            let item = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(item);
        }
        seen.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(seen, vec![
            (botbridge_common::EventKind::Action, "confirm".to_string()),
            (botbridge_common::EventKind::Text, "hello".to_string()),
        ]);
        assert_eq!(*mock.answered.lock().unwrap(), vec!["cb-1".to_string()]);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
