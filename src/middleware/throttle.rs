use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

// Expired windows are swept once the table grows past this many clients.
const SWEEP_THRESHOLD: usize = 4096;

/// Fixed-window request budget per client address. A limit of 0 disables it.
#[derive(Clone, Debug)]
pub struct Throttle {
    limit: u32,
    window: Duration,
    hits: Arc<Mutex<HashMap<Option<IpAddr>, Window>>>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

impl Throttle {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Counts a request from `client`; false once it is over budget for the current window.
    pub fn allow(&self, client: Option<IpAddr>) -> bool {
        if self.limit == 0 {
            return true;
        }

        let now = Instant::now();
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let window = hits.entry(client).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.count = 0;
        }
        window.count = window.count.saturating_add(1);
        window.count <= self.limit
    }
}

/// Rejects clients that spent their request budget with 429.
///
/// Requests without a peer address (no `ConnectInfo`) share one budget.
pub async fn throttle(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if !state.throttle.allow(client) {
        tracing::warn!(client = ?client, path = request.uri().path(), "request throttled");
        return Err(AppError::Throttled);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_per_client() {
        let throttle = Throttle::per_minute(2);
        let a = Some(IpAddr::from([10, 0, 0, 1]));
        let b = Some(IpAddr::from([10, 0, 0, 2]));

        assert!(throttle.allow(a));
        assert!(throttle.allow(a));
        assert!(!throttle.allow(a));
        assert!(throttle.allow(b));
        assert!(throttle.allow(None));
    }

    #[test]
    fn budget_refills_after_the_window() {
        let throttle = Throttle::new(1, Duration::from_millis(20));
        let client = Some(IpAddr::from([127, 0, 0, 1]));

        assert!(throttle.allow(client));
        assert!(!throttle.allow(client));
        std::thread::sleep(Duration::from_millis(30));
        assert!(throttle.allow(client));
    }

    #[test]
    fn zero_limit_never_blocks() {
        let throttle = Throttle::per_minute(0);
        for _ in 0..100 {
            assert!(throttle.allow(None));
        }
    }
}
