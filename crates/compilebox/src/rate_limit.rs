//! Per-client request budget for `/compile`.
//!
//! Each client IP gets `free_requests` within a fixed window that starts at
//! its first request. Further requests are rejected with 429 and a
//! `Retry-After` header until the window ends.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tokio::sync::Mutex;
use tracing::warn;

use crate::handlers::ErrorBody;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Live windows, swept of expired entries at most once per window length.
#[derive(Debug)]
struct Clients {
    windows: HashMap<IpAddr, Window>,
    next_sweep: Instant,
}

pub struct RateLimiter {
    free_requests: u32,
    window: Duration,
    clients: Mutex<Clients>,
}

impl RateLimiter {
    pub fn new(free_requests: u32, window: Duration) -> Self {
        Self {
            free_requests,
            window,
            clients: Mutex::new(Clients {
                windows: HashMap::new(),
                next_sweep: sweep_after(Instant::now(), window),
            }),
        }
    }

    /// Count a request from `ip`. `Err` carries the time until the window resets.
    pub async fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        self.check_at(ip, Instant::now()).await
    }

    async fn check_at(&self, ip: IpAddr, now: Instant) -> Result<(), Duration> {
        let mut clients = self.clients.lock().await;

        if now >= clients.next_sweep {
            let window = self.window;
            clients
                .windows
                .retain(|_, w| now.duration_since(w.started) < window);
            clients.next_sweep = sweep_after(now, window);
        }

        let entry = clients.windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        let age = now.duration_since(entry.started);
        if age >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.free_requests {
            let remaining = self.window.saturating_sub(now.duration_since(entry.started));
            return Err(remaining);
        }
        entry.count += 1;
        Ok(())
    }

    #[cfg(test)]
    async fn tracked_clients(&self) -> usize {
        self.clients.lock().await.windows.len()
    }
}

/// Next sweep deadline; a window too long to add falls back to `now`.
fn sweep_after(now: Instant, window: Duration) -> Instant {
    now.checked_add(window).unwrap_or(now)
}

/// Middleware rejecting clients that used up their budget.
pub async fn limit(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            warn!(client = %addr.ip(), retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorBody::new("too many requests")),
            )
                .into_response();
            // Round up so clients never retry a second early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[tokio::test]
    async fn allows_free_requests_then_rejects() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Instant::now();

        for _ in 0..3 {
            limiter.check_at(A, t0).await.unwrap();
        }
        let retry = limiter
            .check_at(A, t0 + Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(retry, Duration::from_secs(50));
    }

    #[tokio::test]
    async fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check_at(A, t0).await.unwrap();
        limiter.check_at(B, t0).await.unwrap();
        assert!(limiter.check_at(A, t0).await.is_err());
    }

    #[tokio::test]
    async fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check_at(A, t0).await.unwrap();
        assert!(limiter.check_at(A, t0).await.is_err());
        limiter
            .check_at(A, t0 + Duration::from_secs(60))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejected_requests_do_not_extend_the_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        limiter.check_at(A, t0).await.unwrap();
        for s in [10, 20, 59] {
            assert!(limiter.check_at(A, t0 + Duration::from_secs(s)).await.is_err());
        }
        limiter
            .check_at(A, t0 + Duration::from_secs(61))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_clients_are_swept_once_per_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Instant::now();

        for n in 1..=50u8 {
            let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 1, n));
            limiter.check_at(ip, t0).await.unwrap();
        }
        limiter
            .check_at(B, t0 + Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(limiter.tracked_clients().await, 51);

        // First request after a full window drops everyone whose window ended.
        limiter
            .check_at(A, t0 + Duration::from_secs(61))
            .await
            .unwrap();
        assert_eq!(limiter.tracked_clients().await, 2);

        // B is still inside its window and keeps its count.
        assert!(
            limiter
                .check_at(B, t0 + Duration::from_secs(62))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn zero_budget_rejects_everything() {
        let limiter = RateLimiter::new(0, Duration::from_secs(5));
        assert!(limiter.check(A).await.is_err());
    }
}
