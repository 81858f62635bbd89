//! Per-origin admission limiting.
//!
//! # Responsibilities
//! - Count requests per peer IP in fixed windows
//! - Refuse requests over the ceiling with 429 before anything else runs
//! - Keep the origin map bounded (periodic sweep + oldest-window eviction)
//!
//! # Design Decisions
//! - Fixed windows: a window starts with an origin's first request and
//!   resets once it has fully elapsed
//! - A refused request does not extend or count against the window
//! - `DashMap` entry locks serialize updates for one origin without a
//!   global lock
//! - Window starts are also kept in an ordered index, so sweeping and
//!   eviction pop from the front instead of scanning every origin. The
//!   index is only touched when a window opens, never on a plain count.
//!   Lock order is shard then index; the index lock is never held while
//!   taking a shard lock.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::http::GatewayError;
use crate::observability::metrics;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Request count for one origin.
#[derive(Debug, Clone, Copy)]
struct AdmissionWindow {
    started: Instant,
    count: u32,
}

impl AdmissionWindow {
    fn fresh(now: Instant) -> Self {
        Self { started: now, count: 1 }
    }

    fn elapsed_at(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }
}

/// Decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32 },
    Rejected { retry_after: Duration },
}

/// Fixed-window limiter keyed by peer address.
#[derive(Debug)]
pub struct AdmissionLimiter {
    windows: DashMap<IpAddr, AdmissionWindow>,
    /// `(window start, origin)` for every open window, oldest first.
    starts: Mutex<BTreeSet<(Instant, IpAddr)>>,
    window: Duration,
    max_requests: u32,
    max_origins: usize,
}

impl AdmissionLimiter {
    pub fn new(window: Duration, max_requests: u32, max_origins: usize) -> Self {
        Self {
            windows: DashMap::new(),
            starts: Mutex::new(BTreeSet::new()),
            window,
            max_requests,
            max_origins: max_origins.max(1),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(
            Duration::from_secs(config.window_secs),
            config.max_requests,
            config.max_tracked_origins,
        )
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Number of origins currently tracked.
    pub fn tracked_origins(&self) -> usize {
        self.windows.len()
    }

    pub fn check(&self, origin: IpAddr) -> Admission {
        self.check_at(origin, Instant::now())
    }

    /// Decide admission for `origin` as of `now`.
    pub fn check_at(&self, origin: IpAddr, now: Instant) -> Admission {
        // Room must be made before taking the entry lock.
        if !self.windows.contains_key(&origin) && self.index().len() >= self.max_origins {
            self.make_room(now);
        }

        match self.windows.entry(origin) {
            Entry::Vacant(slot) => {
                slot.insert(AdmissionWindow::fresh(now));
                self.index().insert((now, origin));
                Admission::Admitted {
                    remaining: self.max_requests.saturating_sub(1),
                }
            }
            Entry::Occupied(mut slot) => {
                let window = slot.get_mut();
                if window.elapsed_at(now, self.window) {
                    let mut index = self.index();
                    index.remove(&(window.started, origin));
                    index.insert((now, origin));
                    *window = AdmissionWindow::fresh(now);
                } else if window.count < self.max_requests {
                    window.count += 1;
                } else {
                    let resets_at = window.started + self.window;
                    return Admission::Rejected {
                        retry_after: resets_at.saturating_duration_since(now),
                    };
                }
                Admission::Admitted {
                    remaining: self.max_requests.saturating_sub(window.count),
                }
            }
        }
    }

    /// Drop every window that has fully elapsed. Returns how many were removed.
    ///
    /// Cost is proportional to the number of elapsed windows, not to the
    /// number of tracked origins.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some((started, origin)) = self.pop_oldest_if(|started| {
            now.saturating_duration_since(started) >= self.window
        }) {
            if self.remove_window(origin, started) {
                removed += 1;
            }
        }
        removed
    }

    fn make_room(&self, now: Instant) {
        if self.sweep_expired(now) > 0 && self.index().len() < self.max_origins {
            return;
        }

        while let Some((started, origin)) = self.pop_oldest_if(|_| true) {
            if self.remove_window(origin, started) {
                tracing::debug!(origin = %origin, "Evicted oldest admission window");
                return;
            }
        }
    }

    /// Pop the oldest index entry when `pred` accepts its start.
    fn pop_oldest_if(&self, pred: impl Fn(Instant) -> bool) -> Option<(Instant, IpAddr)> {
        let mut index = self.index();
        let &(started, origin) = index.first()?;
        if !pred(started) {
            return None;
        }
        index.pop_first();
        Some((started, origin))
    }

    /// Remove `origin` only if its window still starts at `started`; a
    /// window reopened concurrently is left alone.
    fn remove_window(&self, origin: IpAddr, started: Instant) -> bool {
        self.windows
            .remove_if(&origin, |_, window| window.started == started)
            .is_some()
    }

    fn index(&self) -> MutexGuard<'_, BTreeSet<(Instant, IpAddr)>> {
        self.starts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Periodically sweep elapsed windows until shutdown.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.window);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = self.sweep_expired(Instant::now());
                        if removed > 0 {
                            tracing::debug!(removed, remaining = self.tracked_origins(), "Swept admission windows");
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        })
    }
}

/// Admission middleware. Runs before routing, for every path.
pub async fn admission_middleware(
    State(limiter): State<Arc<AdmissionLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match limiter.check(addr.ip()) {
        Admission::Admitted { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limiter.max_requests()));
            headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        Admission::Rejected { retry_after } => {
            tracing::warn!(client = %addr.ip(), path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            GatewayError::RateLimited { retry_after }.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const WINDOW: Duration = Duration::from_secs(900);

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn hundred_and_first_request_is_rejected() {
        let limiter = AdmissionLimiter::new(WINDOW, 100, 1000);
        let start = Instant::now();

        for i in 0..100 {
            let now = start + Duration::from_secs(i);
            assert!(matches!(limiter.check_at(ip(1), now), Admission::Admitted { .. }), "request {i}");
        }

        let now = start + Duration::from_secs(300);
        match limiter.check_at(ip(1), now) {
            Admission::Rejected { retry_after } => assert_eq!(retry_after, Duration::from_secs(600)),
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn admitted_again_after_window() {
        let limiter = AdmissionLimiter::new(WINDOW, 2, 1000);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        limiter.check_at(ip(1), start);
        assert!(matches!(limiter.check_at(ip(1), start), Admission::Rejected { .. }));

        assert_eq!(
            limiter.check_at(ip(1), start + WINDOW),
            Admission::Admitted { remaining: 1 }
        );
    }

    #[test]
    fn rejection_does_not_consume_budget() {
        let limiter = AdmissionLimiter::new(WINDOW, 1, 1000);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        for _ in 0..5 {
            assert!(matches!(limiter.check_at(ip(1), start), Admission::Rejected { .. }));
        }
        assert!(matches!(limiter.check_at(ip(1), start + WINDOW), Admission::Admitted { .. }));
    }

    #[test]
    fn origins_are_counted_independently() {
        let limiter = AdmissionLimiter::new(WINDOW, 1, 1000);
        let now = Instant::now();

        assert!(matches!(limiter.check_at(ip(1), now), Admission::Admitted { .. }));
        assert!(matches!(limiter.check_at(ip(2), now), Admission::Admitted { .. }));
        assert!(matches!(limiter.check_at(ip(1), now), Admission::Rejected { .. }));
    }

    #[test]
    fn remaining_counts_down() {
        let limiter = AdmissionLimiter::new(WINDOW, 3, 1000);
        let now = Instant::now();

        assert_eq!(limiter.check_at(ip(1), now), Admission::Admitted { remaining: 2 });
        assert_eq!(limiter.check_at(ip(1), now), Admission::Admitted { remaining: 1 });
        assert_eq!(limiter.check_at(ip(1), now), Admission::Admitted { remaining: 0 });
    }

    #[test]
    fn sweep_removes_only_elapsed_windows() {
        let limiter = AdmissionLimiter::new(WINDOW, 10, 1000);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        limiter.check_at(ip(2), start + Duration::from_secs(600));

        assert_eq!(limiter.sweep_expired(start + WINDOW), 1);
        assert_eq!(limiter.tracked_origins(), 1);
    }

    #[test]
    fn full_map_evicts_oldest_window() {
        let limiter = AdmissionLimiter::new(WINDOW, 1, 2);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        limiter.check_at(ip(2), start + Duration::from_secs(1));
        limiter.check_at(ip(3), start + Duration::from_secs(2));

        assert_eq!(limiter.tracked_origins(), 2);
        // ip(1) was evicted, so it starts a fresh window.
        assert!(matches!(
            limiter.check_at(ip(1), start + Duration::from_secs(3)),
            Admission::Admitted { .. }
        ));
        // ip(3) is still tracked and at its ceiling.
        assert!(matches!(
            limiter.check_at(ip(3), start + Duration::from_secs(3)),
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn window_reset_moves_origin_to_the_back() {
        let limiter = AdmissionLimiter::new(WINDOW, 5, 2);
        let start = Instant::now();

        limiter.check_at(ip(1), start);
        limiter.check_at(ip(2), start + Duration::from_secs(1));
        // ip(1) opens a new window, so ip(2) is now the oldest.
        limiter.check_at(ip(1), start + WINDOW);
        limiter.check_at(ip(3), start + WINDOW + Duration::from_secs(1));

        assert_eq!(limiter.tracked_origins(), 2);
        assert!(limiter.windows.contains_key(&ip(1)));
        assert!(!limiter.windows.contains_key(&ip(2)));
        assert_eq!(limiter.index().len(), 2);
    }

    #[test]
    fn many_new_origins_against_a_full_map_stay_cheap() {
        const ORIGINS: u32 = 100_000;
        let limiter = AdmissionLimiter::new(WINDOW, 1, ORIGINS as usize);
        let start = Instant::now();

        for n in 0..ORIGINS {
            limiter.check_at(IpAddr::V4(Ipv4Addr::from(n)), start);
        }

        let began = Instant::now();
        for n in ORIGINS..ORIGINS + 1_000 {
            let now = start + Duration::from_secs(1);
            assert!(matches!(
                limiter.check_at(IpAddr::V4(Ipv4Addr::from(n)), now),
                Admission::Admitted { .. }
            ));
        }

        assert_eq!(limiter.tracked_origins(), ORIGINS as usize);
        // A linear scan per request takes seconds here.
        assert!(began.elapsed() < Duration::from_secs(1), "took {:?}", began.elapsed());
    }
}
