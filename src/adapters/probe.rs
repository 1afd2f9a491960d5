use crate::domain::model::Probe;
use crate::utils::error::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};

/// Polls `addr` until the probe succeeds. Returns how long it waited, or
/// `None` once `deadline` has elapsed without a successful attempt.
pub async fn wait_ready(
    probe: &Probe,
    addr: SocketAddr,
    deadline: Duration,
    interval: Duration,
) -> Result<Option<Duration>> {
    let started = Instant::now();
    // 直連 docker port 回報的位址，不經 HTTP_PROXY
    let client = reqwest::Client::builder().no_proxy().build()?;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        // each attempt is bounded by the poll interval, at least 100ms
        let per_attempt = interval.max(Duration::from_millis(100));
        let ready = match probe {
            Probe::Tcp => matches!(
                timeout(per_attempt, TcpStream::connect(addr)).await,
                Ok(Ok(_))
            ),
            Probe::Http { path } => {
                let url = format!("http://{}{}", addr, path);
                match client.get(&url).timeout(per_attempt).send().await {
                    Ok(response) => response.status().is_success(),
                    Err(e) => {
                        tracing::trace!("probe {} failed: {}", url, e);
                        false
                    }
                }
            }
        };

        let waited = started.elapsed();
        if ready {
            tracing::debug!("{} ready after {:?} ({} attempts)", addr, waited, attempt);
            return Ok(Some(waited));
        }
        if waited >= deadline {
            return Ok(None);
        }
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_probe_succeeds_on_listening_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let waited = wait_ready(
            &Probe::Tcp,
            addr,
            Duration::from_secs(2),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert!(waited.is_some());
    }

    #[tokio::test]
    async fn test_tcp_probe_times_out_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let waited = wait_ready(
            &Probe::Tcp,
            addr,
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert!(waited.is_none());
    }

    #[tokio::test]
    async fn test_http_probe_requires_success_status() {
        let server = MockServer::start();
        let healthy = server.mock(|when, then| {
            when.method(GET).path("/");
            then.status(200).body("Ollama is running");
        });
        server.mock(|when, then| {
            when.method(GET).path("/broken");
            then.status(503);
        });

        let addr = *server.address();
        let ok = wait_ready(
            &Probe::Http {
                path: "/".to_string(),
            },
            addr,
            Duration::from_secs(2),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert!(ok.is_some());
        healthy.assert();

        let broken = wait_ready(
            &Probe::Http {
                path: "/broken".to_string(),
            },
            addr,
            Duration::from_millis(300),
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert!(broken.is_none());
    }
}
