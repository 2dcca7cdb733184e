use tracing::trace;

// Lightweight metrics helpers kept trace-based so batch runs stay
// dependency-free on a metrics backend.

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    trace!(
        target = "lister.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn item_finished(label: &str, success: bool) {
    trace!(
        target = "lister.metrics",
        item = label,
        success = success,
        "item_finished"
    );
}
