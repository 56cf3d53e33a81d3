use async_trait::async_trait;
use hyper::header::CONTENT_TYPE;
use log::{debug, info};
use pickem_core::PickStatus;
use reqwest_middleware::{reqwest::Url, ClientWithMiddleware};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Body posted for every settled pick
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickNotification {
    pub pick_id: Uuid,
    pub matchup_id: Uuid,
    pub user_external_id: String,
    pub status: PickStatus,
    pub coins: i64,
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("problem sending notification: {0}")]
    Send(#[from] reqwest_middleware::reqwest::Error),
    #[error("problem sending notification: {0}")]
    SendRetry(#[from] reqwest_middleware::Error),
    #[error("problem encoding notification: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("webhook rejected notification with status {0}")]
    Rejected(u16),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn pick_settled(&self, notification: PickNotification) -> Result<(), NotifyError>;
}

pub struct WebhookNotifier {
    client: ClientWithMiddleware,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(client: ClientWithMiddleware, url: Url) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn pick_settled(&self, notification: PickNotification) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(&notification)?;
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        debug!("delivered notification for pick {}", notification.pick_id);
        Ok(())
    }
}

/// Used when no webhook is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn pick_settled(&self, notification: PickNotification) -> Result<(), NotifyError> {
        info!(
            "pick {} on matchup {} settled as {} ({} coins) for {}",
            notification.pick_id,
            notification.matchup_id,
            notification.status,
            notification.coins,
            notification.user_external_id
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use reqwest_middleware::ClientBuilder;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    type Received = Arc<Mutex<Vec<PickNotification>>>;

    async fn webhook(status: StatusCode) -> (Url, Received) {
        let received: Received = Arc::new(Mutex::new(vec![]));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    move |State(received): State<Received>,
                          Json(body): Json<PickNotification>| async move {
                        received.lock().unwrap().push(body);
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let url = Url::parse(&format!("http://{}/hook", addr)).unwrap();
        (url, received)
    }

    fn notification() -> PickNotification {
        PickNotification {
            pick_id: Uuid::now_v7(),
            matchup_id: Uuid::now_v7(),
            user_external_id: "auth|gil".into(),
            status: PickStatus::Loss,
            coins: -10,
        }
    }

    #[tokio::test]
    async fn test_webhook_receives_notification() {
        let (url, received) = webhook(StatusCode::OK).await;
        let notifier = WebhookNotifier::new(ClientBuilder::new(reqwest::Client::new()).build(), url);

        let sent = notification();
        notifier.pick_settled(sent.clone()).await.unwrap();

        assert_eq!(*received.lock().unwrap(), vec![sent]);
    }

    #[tokio::test]
    async fn test_webhook_rejection_is_an_error() {
        let (url, _) = webhook(StatusCode::BAD_REQUEST).await;
        let notifier = WebhookNotifier::new(ClientBuilder::new(reqwest::Client::new()).build(), url);

        let err = notifier.pick_settled(notification()).await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(400)));
    }
}
