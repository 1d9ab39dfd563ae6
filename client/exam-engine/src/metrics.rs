use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // Session lifecycle
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exam_sessions_total",
        "Total number of exam sessions",
        &["status"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "exam_sessions_active",
        "Number of currently active exam sessions"
    )
    .unwrap();

    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exam_submissions_total",
        "Terminal submissions by termination reason",
        &["reason"]
    )
    .unwrap();

    pub static ref SUBMIT_RETRIES_TOTAL: IntCounter = register_int_counter!(
        "exam_submit_retries_total",
        "Submission sink attempts beyond the first"
    )
    .unwrap();

    pub static ref SUBMIT_FORCED_ACKS_TOTAL: IntCounter = register_int_counter!(
        "exam_submit_forced_acks_total",
        "Submissions locally acknowledged after exhausting sink retries"
    )
    .unwrap();

    // Integrity monitoring
    pub static ref VIOLATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exam_violations_total",
        "Integrity violations detected",
        &["kind"]
    )
    .unwrap();

    // Auto-save
    pub static ref AUTOSAVE_TOTAL: IntCounterVec = register_int_counter_vec!(
        "exam_autosave_total",
        "Auto-save flushes by outcome",
        &["status"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}
