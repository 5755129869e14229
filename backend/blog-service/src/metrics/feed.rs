use lazy_static::lazy_static;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

lazy_static! {
    /// Feed requests by scope (global, group, profile, following).
    pub static ref FEED_REQUEST_TOTAL: IntCounterVec = register_int_counter_vec!(
        "blog_feed_requests_total",
        "Feed requests segmented by scope",
        &["scope"]
    )
    .expect("failed to register blog_feed_requests_total");

    /// Time spent assembling a feed page from the store.
    pub static ref FEED_BUILD_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "blog_feed_build_duration_seconds",
        "Feed assembly duration segmented by scope",
        &["scope"]
    )
    .expect("failed to register blog_feed_build_duration_seconds");

    /// Page cache events (hit/miss/error/write/clear).
    pub static ref PAGE_CACHE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "blog_page_cache_events_total",
        "Page cache events segmented by outcome",
        &["event"]
    )
    .expect("failed to register blog_page_cache_events_total");

    /// Follow graph mutations (created/existing/self/removed/missing).
    pub static ref FOLLOW_MUTATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "blog_follow_mutations_total",
        "Follow graph mutations segmented by outcome",
        &["outcome"]
    )
    .expect("failed to register blog_follow_mutations_total");
}
