// Prometheus metrics for the judge service, exposed at GET /metrics.
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref VERDICTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("codecraft_verdicts_total", "Verdicts produced, by mode and status"),
        &["mode", "status"]
    )
    .expect("metric can be created");

    pub static ref ADMISSION_REJECTIONS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "codecraft_admission_rejections_total",
            "Requests refused at admission, by reason"
        ),
        &["reason"]
    )
    .expect("metric can be created");

    pub static ref QUEUE_DEPTH: IntGauge =
        IntGauge::new("codecraft_queue_depth", "Requests waiting for a worker")
            .expect("metric can be created");

    pub static ref RUNNING_JOBS: IntGauge =
        IntGauge::new("codecraft_running_jobs", "Requests currently being judged")
            .expect("metric can be created");

    /// Infrastructure failures. The one series worth alerting on.
    pub static ref INTERNAL_ERRORS: IntCounter = IntCounter::new(
        "codecraft_internal_errors_total",
        "Requests that ended in an internal error"
    )
    .expect("metric can be created");

    pub static ref JUDGE_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "codecraft_judge_duration_seconds",
            "Time from dispatch to verdict"
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["language"]
    )
    .expect("metric can be created");
}

/// Register every collector with the service registry. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(VERDICTS_TOTAL.clone()),
        Box::new(ADMISSION_REJECTIONS.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(RUNNING_JOBS.clone()),
        Box::new(INTERNAL_ERRORS.clone()),
        Box::new(JUDGE_DURATION.clone()),
    ];
    for collector in collectors {
        // AlreadyReg on repeated calls is expected.
        let _ = REGISTRY.register(collector);
    }
}

/// Text exposition of the registry.
pub fn render() -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
