use tracing::trace;

// Trace-level counters alongside the Prometheus recorder installed in main.
// Stage timing stays visible under RUST_LOG without scraping /metrics.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "rickhouse.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "rickhouse.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}
