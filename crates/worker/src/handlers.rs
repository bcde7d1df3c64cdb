//! 内置事件处理器

use std::time::Duration;

use async_trait::async_trait;
use geofence_domain::{EventHandler, HandlerFailure, TransitionEvent};
use serde::Serialize;
use tracing::{debug, info};

/// 将事件写入日志的处理器
pub struct LoggingHandler {
    handler_id: String,
}

impl LoggingHandler {
    pub fn new(handler_id: impl Into<String>) -> Self {
        Self {
            handler_id: handler_id.into(),
        }
    }
}

#[async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &TransitionEvent) -> Result<(), HandlerFailure> {
        info!(
            handler_id = %self.handler_id,
            region_id = %event.region_id,
            transition = %event.transition,
            timestamp_ms = event.timestamp_ms,
            "收到围栏事件"
        );
        Ok(())
    }
}

/// Webhook 请求体
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    handler_id: &'a str,
    region_id: &'a str,
    transition: &'a str,
    timestamp_ms: i64,
    dedup_key: &'a str,
}

/// 将事件以 JSON 形式 POST 到指定 URL 的处理器
///
/// 5xx、超时和连接错误视为可重试，其余非 2xx 响应视为永久失败。
pub struct WebhookHandler {
    handler_id: String,
    url: String,
    client: reqwest::Client,
}

impl WebhookHandler {
    pub fn new(
        handler_id: impl Into<String>,
        url: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            handler_id: handler_id.into(),
            url: url.into(),
            client: builder.build()?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify_status(status: reqwest::StatusCode) -> Result<(), HandlerFailure> {
        if status.is_success() {
            return Ok(());
        }
        let message = format!("webhook 返回状态码 {}", status.as_u16());
        // 408 与 429 属于暂时性拒绝
        if status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS
        {
            Err(HandlerFailure::retryable(message))
        } else {
            Err(HandlerFailure::permanent(message))
        }
    }
}

#[async_trait]
impl EventHandler for WebhookHandler {
    async fn handle(&self, event: &TransitionEvent) -> Result<(), HandlerFailure> {
        let payload = WebhookPayload {
            handler_id: &self.handler_id,
            region_id: &event.region_id,
            transition: event.transition.as_str(),
            timestamp_ms: event.timestamp_ms,
            dedup_key: &event.dedup_key,
        };

        debug!("发送webhook: handler={}, url={}", self.handler_id, self.url);

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_builder() {
                    HandlerFailure::permanent(format!("构建webhook请求失败: {e}"))
                } else {
                    HandlerFailure::retryable(format!("webhook请求失败: {e}"))
                }
            })?;

        Self::classify_status(response.status())
    }
}
