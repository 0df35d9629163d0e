// packages/engine/src/observability/metrics.rs
//! Interception counters

use metrics::{counter, describe_counter};

pub const MESSAGES_OBSERVED: &str = "hookwire_messages_observed_total";
pub const HEADERS_INJECTED: &str = "hookwire_headers_injected_total";
pub const INJECTION_SKIPPED: &str = "hookwire_injection_skipped_total";
pub const PARSE_FAILURES: &str = "hookwire_parse_failures_total";
pub const BUFFER_OVERFLOWS: &str = "hookwire_buffer_overflows_total";
pub const HOOK_INSTALL_FAILURES: &str = "hookwire_hook_install_failures_total";

/// Register counter descriptions with whatever recorder is installed
pub fn init_metrics() {
    describe_counter!(MESSAGES_OBSERVED, "Header blocks reported on the read path");
    describe_counter!(HEADERS_INJECTED, "Header blocks rewritten on the write path");
    describe_counter!(INJECTION_SKIPPED, "Write-side header blocks already carrying the marker");
    describe_counter!(PARSE_FAILURES, "Messages degraded to passthrough after a parse failure");
    describe_counter!(BUFFER_OVERFLOWS, "Header blocks abandoned after exceeding the size cap");
    describe_counter!(HOOK_INSTALL_FAILURES, "Failed attempts to install the socket hooks");
}

#[inline]
pub fn record_observed(interceptor: &'static str) {
    counter!(MESSAGES_OBSERVED, "interceptor" => interceptor).increment(1);
}

#[inline]
pub fn record_injected(interceptor: &'static str) {
    counter!(HEADERS_INJECTED, "interceptor" => interceptor).increment(1);
}

#[inline]
pub fn record_injection_skipped() {
    counter!(INJECTION_SKIPPED).increment(1);
}

#[inline]
pub fn record_parse_failure(interceptor: &'static str) {
    counter!(PARSE_FAILURES, "interceptor" => interceptor).increment(1);
}

#[inline]
pub fn record_overflow() {
    counter!(BUFFER_OVERFLOWS).increment(1);
}

#[inline]
pub fn record_install_failure() {
    counter!(HOOK_INSTALL_FAILURES).increment(1);
}
