//! Request counters exposed at `GET /metrics` in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    requests_total: AtomicU64,
    questions_total: AtomicU64,
    question_errors_total: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_questions(&self, count: u64) {
        self.questions_total.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_question_error(&self) {
        self.question_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        format!(
            "# HELP ragserve_requests_total Total /run requests received.\n\
             # TYPE ragserve_requests_total counter\n\
             ragserve_requests_total {}\n\
             # HELP ragserve_questions_total Total questions answered.\n\
             # TYPE ragserve_questions_total counter\n\
             ragserve_questions_total {}\n\
             # HELP ragserve_question_errors_total Questions that fell back to an error answer.\n\
             # TYPE ragserve_question_errors_total counter\n\
             ragserve_question_errors_total {}\n",
            self.requests_total.load(Ordering::Relaxed),
            self.questions_total.load(Ordering::Relaxed),
            self.question_errors_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() {
        let metrics = Metrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_questions(5);
        metrics.record_question_error();

        let out = metrics.render();
        assert!(out.contains("ragserve_requests_total 2\n"));
        assert!(out.contains("ragserve_questions_total 5\n"));
        assert!(out.contains("ragserve_question_errors_total 1\n"));
    }
}
