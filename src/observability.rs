//! Structured events emitted by the copy pipeline.
//!
//! Every event goes to the `batchcopy` target through `tracing` and carries a
//! `component` and a snake_case `event` field. No subscriber is installed
//! here; applications pick their own.
//!
//! | component     | level | events |
//! |---------------|-------|--------|
//! | `sink`        | info  | `sink_created`, `sink_finalized`, `tmp_file_promoted` |
//! | `sink`        | warn  | `finalize_with_open_locals` |
//! | `sink`        | error | `sink_poisoned` |
//! | `sink`        | debug | `batch_prepared` |
//! | `registry`    | debug | `raw_batch_submitted` |
//! | `repartition` | debug | `repartition_deferred`, `repartition_pass` |
//! | `flush`       | debug | `batch_flushed`, `flush_skipped` |
//! | `parquet`     | debug | `row_group_written`, `parquet_closed` |
//!
//! Batch keys, indexes, row counts and watermarks are logged; row contents
//! never are.

pub(crate) const BATCHCOPY_TARGET: &str = "batchcopy";

macro_rules! log_event {
    ($level:ident, $($field:tt)*) => {
        ::tracing::$level!(target: $crate::observability::BATCHCOPY_TARGET, $($field)*)
    };
}

macro_rules! log_info {
    ($($field:tt)*) => { $crate::observability::log_event!(info, $($field)*) };
}

macro_rules! log_debug {
    ($($field:tt)*) => { $crate::observability::log_event!(debug, $($field)*) };
}

macro_rules! log_warn {
    ($($field:tt)*) => { $crate::observability::log_event!(warn, $($field)*) };
}

macro_rules! log_error {
    ($($field:tt)*) => { $crate::observability::log_event!(error, $($field)*) };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_event;
pub(crate) use log_info;
pub(crate) use log_warn;
