//! In-process counters exposed in Prometheus text format on `/metrics`.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Outcome labels, one counter each.  `success` first, then error kinds as
/// reported by `GenerateError::kind`.
pub const OUTCOMES: &[&str] = &[
    "success",
    "validation",
    "rate_limited",
    "configuration",
    "upstream",
    "empty_upstream",
    "extraction",
    "schema",
    "internal",
];

/// Latency histogram upper bounds in milliseconds.
const LATENCY_BUCKETS_MS: &[u64] = &[50, 100, 250, 500, 1000, 2500, 5000, 10000];

pub struct Metrics {
    requests_total: AtomicU64,
    upstream_calls_total: AtomicU64,
    outcomes: Vec<AtomicU64>,
    hist_counts: Vec<AtomicU64>,
    hist_sum_ms: AtomicU64,
    hist_count: AtomicU64,
    process_start_epoch: i64,
    process_start_instant: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            upstream_calls_total: AtomicU64::new(0),
            outcomes: OUTCOMES.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_counts: LATENCY_BUCKETS_MS.iter().map(|_| AtomicU64::new(0)).collect(),
            hist_sum_ms: AtomicU64::new(0),
            hist_count: AtomicU64::new(0),
            process_start_epoch: chrono::Utc::now().timestamp(),
            process_start_instant: Instant::now(),
        }
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_call(&self) {
        self.upstream_calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upstream_calls(&self) -> u64 {
        self.upstream_calls_total.load(Ordering::Relaxed)
    }

    /// Count one finished request.  Unknown outcome labels are ignored.
    pub fn record_outcome(&self, outcome: &str, latency_ms: u64) {
        if let Some(idx) = OUTCOMES.iter().position(|o| *o == outcome) {
            self.outcomes[idx].fetch_add(1, Ordering::Relaxed);
        }
        self.hist_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.hist_count.fetch_add(1, Ordering::Relaxed);
        // find first bucket >= value
        if let Some(idx) = LATENCY_BUCKETS_MS.iter().position(|ub| latency_ms <= *ub) {
            self.hist_counts[idx].fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        OUTCOMES
            .iter()
            .position(|o| *o == outcome)
            .map(|idx| self.outcomes[idx].load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn render(&self, tracked_keys: usize) -> String {
        let mut buf = String::new();
        let requests = self.requests_total.load(Ordering::Relaxed);
        let upstream = self.upstream_calls_total.load(Ordering::Relaxed);
        let sum_ms = self.hist_sum_ms.load(Ordering::Relaxed);
        let count = self.hist_count.load(Ordering::Relaxed);

        writeln!(&mut buf, "# HELP buzz_requests_total Generate requests received").ok();
        writeln!(&mut buf, "# TYPE buzz_requests_total counter").ok();
        writeln!(&mut buf, "buzz_requests_total {}", requests).ok();

        writeln!(&mut buf, "# HELP buzz_responses_total Generate responses by outcome").ok();
        writeln!(&mut buf, "# TYPE buzz_responses_total counter").ok();
        for (name, counter) in OUTCOMES.iter().zip(&self.outcomes) {
            writeln!(
                &mut buf,
                "buzz_responses_total{{outcome=\"{}\"}} {}",
                name,
                counter.load(Ordering::Relaxed)
            )
            .ok();
        }

        writeln!(&mut buf, "# HELP buzz_upstream_calls_total Calls made to the generative provider").ok();
        writeln!(&mut buf, "# TYPE buzz_upstream_calls_total counter").ok();
        writeln!(&mut buf, "buzz_upstream_calls_total {}", upstream).ok();

        writeln!(&mut buf, "# HELP buzz_request_latency_ms Generate latency histogram milliseconds").ok();
        writeln!(&mut buf, "# TYPE buzz_request_latency_ms histogram").ok();
        let mut cumulative: u64 = 0;
        for (ub, counter) in LATENCY_BUCKETS_MS.iter().zip(&self.hist_counts) {
            cumulative += counter.load(Ordering::Relaxed);
            writeln!(
                &mut buf,
                "buzz_request_latency_ms_bucket{{le=\"{}\"}} {}",
                ub, cumulative
            )
            .ok();
        }
        writeln!(&mut buf, "buzz_request_latency_ms_bucket{{le=\"+Inf\"}} {}", count).ok();
        writeln!(&mut buf, "buzz_request_latency_ms_sum {}", sum_ms).ok();
        writeln!(&mut buf, "buzz_request_latency_ms_count {}", count).ok();

        writeln!(
            &mut buf,
            "# HELP buzz_rate_limit_keys Caller keys currently tracked by the rate limiter\n# TYPE buzz_rate_limit_keys gauge"
        )
        .ok();
        writeln!(&mut buf, "buzz_rate_limit_keys {}", tracked_keys).ok();

        writeln!(&mut buf, "# HELP buzz_build_info Build information\n# TYPE buzz_build_info gauge").ok();
        writeln!(
            &mut buf,
            "buzz_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )
        .ok();

        writeln!(
            &mut buf,
            "# HELP buzz_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE buzz_process_start_time_seconds gauge"
        )
        .ok();
        writeln!(&mut buf, "buzz_process_start_time_seconds {}", self.process_start_epoch).ok();
        writeln!(
            &mut buf,
            "# HELP buzz_process_uptime_seconds Process uptime seconds\n# TYPE buzz_process_uptime_seconds gauge"
        )
        .ok();
        writeln!(
            &mut buf,
            "buzz_process_uptime_seconds {}",
            self.process_start_instant.elapsed().as_secs_f64()
        )
        .ok();
        buf
    }
}
