//! reqwest transport with whole-request retry

use super::{Method, Transport, TransportRequest, TransportResponse};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    hosts: Vec<Url>,
    next_host: AtomicUsize,
    username: Option<String>,
    password: Option<String>,
    max_retries: u32,
    retry_on_status: Vec<u16>,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl HttpTransport {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if config.hosts.is_empty() {
            return Err(Error::Config("no hosts configured".to_string()));
        }
        let hosts = config
            .hosts
            .iter()
            .map(|h| Url::parse(h))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            client,
            hosts,
            next_host: AtomicUsize::new(0),
            username: config.username.clone(),
            password: config.password.clone(),
            max_retries: config.max_retries,
            retry_on_status: config.retry_on_status.clone(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
        })
    }

    pub fn hosts(&self) -> &[Url] {
        &self.hosts
    }

    fn host(&self) -> &Url {
        let idx = self.next_host.fetch_add(1, Ordering::Relaxed) % self.hosts.len();
        &self.hosts[idx]
    }

    /// Delay before retry number `attempt` (0-based): initial * 2^attempt, capped
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.backoff_initial
            .saturating_mul(factor)
            .min(self.backoff_max)
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }

    async fn attempt(
        &self,
        request: &TransportRequest,
        url: Url,
        body: Option<&[u8]>,
    ) -> reqwest::Result<TransportResponse> {
        let mut builder = self.client.request(Self::method(request.method), url);
        if let Some(user) = &self.username {
            builder = builder.basic_auth(user, self.password.as_ref());
        }
        if let (Some(bytes), Some(body)) = (body, &request.body) {
            builder = builder
                .header(CONTENT_TYPE, body.content_type())
                .body(bytes.to_vec());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(TransportResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        let body = request.body.as_ref().map(|b| b.to_bytes()).transpose()?;
        let mut attempt = 0;

        loop {
            let url = self.host().join(&request.path_and_query())?;
            let started = Instant::now();
            match self.attempt(&request, url, body.as_deref()).await {
                Ok(response) => {
                    crate::metrics::record_request(request.operation, response.status, started.elapsed());
                    if self.retry_on_status.contains(&response.status) && attempt < self.max_retries {
                        let delay = self.backoff(attempt);
                        tracing::warn!(
                            "{} {} returned {}, retrying in {:?} ({}/{})",
                            request.method.as_str(),
                            request.path,
                            response.status,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        crate::metrics::record_retry(request.operation, response.status);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(response);
                }
                Err(err) => {
                    crate::metrics::record_request_error(request.operation, "transport");
                    let retryable = err.is_connect() || err.is_timeout();
                    if retryable && attempt < self.max_retries {
                        let delay = self.backoff(attempt);
                        tracing::warn!(
                            "{} {} failed: {}, retrying in {:?} ({}/{})",
                            request.method.as_str(),
                            request.path,
                            err,
                            delay,
                            attempt + 1,
                            self.max_retries
                        );
                        crate::metrics::record_retry(request.operation, 0);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = StoreConfig {
            backoff_initial_ms: 100,
            backoff_max_ms: 1_000,
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.backoff(0), Duration::from_millis(100));
        assert_eq!(transport.backoff(1), Duration::from_millis(200));
        assert_eq!(transport.backoff(3), Duration::from_millis(800));
        assert_eq!(transport.backoff(4), Duration::from_millis(1_000));
        assert_eq!(transport.backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_round_robin_hosts() {
        let config = StoreConfig {
            hosts: vec!["http://es1:9200".into(), "http://es2:9200".into()],
            ..Default::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.host().host_str(), Some("es1"));
        assert_eq!(transport.host().host_str(), Some("es2"));
        assert_eq!(transport.host().host_str(), Some("es1"));
    }

    #[test]
    fn test_no_hosts_is_config_error() {
        let config = StoreConfig {
            hosts: vec![],
            ..Default::default()
        };
        assert!(matches!(HttpTransport::new(&config), Err(Error::Config(_))));
    }
}
