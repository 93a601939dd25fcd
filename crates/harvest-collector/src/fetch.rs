//! HTTP fetch 계층.
//!
//! 모든 종목이 하나의 `HttpFetcher`를 공유하며, 세마포어로 동시 요청 수를 제한합니다.
//! 타임아웃, 요청 간 딜레이, 재시도는 여기서만 처리합니다.

use crate::config::FetchConfig;
use async_trait::async_trait;
use harvest_core::{HarvestError, Method, Request, Response, Result};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// 요청을 발행해 응답을 돌려주는 계층.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 요청 1건을 발행합니다. 2xx가 아니면 `FetchFailure`.
    async fn issue(&self, request: Request) -> Result<Response>;
}

/// reqwest 기반 Fetcher.
pub struct HttpFetcher {
    client: Client,
    permits: Arc<Semaphore>,
    config: FetchConfig,
}

impl HttpFetcher {
    /// 설정으로 생성
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| HarvestError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        })
    }

    /// 현재 사용 가능한 동시 요청 슬롯 수
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    async fn send_once(
        &self,
        request: &Request,
    ) -> std::result::Result<(StatusCode, String), reqwest::Error> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => {
                let builder = self.client.post(&request.url);
                match &request.form {
                    Some(form) => builder.form(form),
                    None => builder,
                }
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn issue(&self, request: Request) -> Result<Response> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| HarvestError::FetchFailure {
                url: request.url.clone(),
                reason: format!("세마포어 닫힘: {}", e),
            })?;

        let mut attempt = 0;
        loop {
            let delay = self.config.request_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let reason = match self.send_once(&request).await {
                Ok((status, body)) if status.is_success() => {
                    debug!(
                        instrument = %request.owner,
                        stage = %request.stage,
                        url = %request.url,
                        status = status.as_u16(),
                        "응답 수신"
                    );
                    return Ok(Response::new(status.as_u16(), body, request));
                }
                Ok((status, _)) if !is_retryable_status(status) => {
                    return Err(HarvestError::FetchFailure {
                        url: request.url,
                        reason: format!("HTTP {}", status),
                    });
                }
                Ok((status, _)) => format!("HTTP {}", status),
                Err(e) => e.to_string(),
            };

            if attempt >= self.config.max_retries {
                return Err(HarvestError::FetchFailure {
                    url: request.url,
                    reason,
                });
            }

            attempt += 1;
            warn!(
                instrument = %request.owner,
                url = %request.url,
                attempt,
                reason = %reason,
                "요청 재시도"
            );
            tokio::time::sleep(self.config.retry_backoff(attempt)).await;
        }
    }
}

/// 재시도할 상태 코드 (5xx, 429)
fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::{InstrumentKey, RequestId, Stage};

    fn quick_config() -> FetchConfig {
        FetchConfig {
            max_concurrent: 2,
            request_delay_ms: 0,
            max_retries: 1,
            retry_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn get(url: String) -> Request {
        Request::get(RequestId(0), url.clone(), Stage::Detail, InstrumentKey::new(url))
    }

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_issue_post_sends_form() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ajax/list")
            .match_body(mockito::Matcher::UrlEncoded(
                "d".into(),
                "15.10.2026 00:00-15.10.2026 23:59".into(),
            ))
            .with_status(200)
            .with_body("<table></table>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let url = format!("{}/ajax/list", server.url());
        let request = Request::post(
            RequestId(4),
            url.clone(),
            Some(vec![(
                "d".to_string(),
                "15.10.2026 00:00-15.10.2026 23:59".to_string(),
            )]),
            Stage::BidAsk,
            InstrumentKey::new(url),
        );

        let response = fetcher.issue(request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<table></table>");
        assert_eq!(response.request.id, RequestId(4));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/etp/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let err = fetcher
            .issue(get(format!("{}/etp/missing", server.url())))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::FetchFailure { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/etp/flaky")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(quick_config()).unwrap();
        let err = fetcher
            .issue(get(format!("{}/etp/flaky", server.url())))
            .await
            .unwrap_err();

        assert!(matches!(err, HarvestError::FetchFailure { .. }));
        mock.assert_async().await;
        assert_eq!(fetcher.available_permits(), 2);
    }
}
