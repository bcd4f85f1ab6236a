//! Output layers
//!
//! Job context reaches the output as the `job` span opened by
//! [`JobContextGuard`](crate::JobContextGuard): the JSONL layer lists it
//! among the event's spans, so every line written during a job carries its
//! `job_id` and `console_id`.

use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::JOB_SPAN_TARGET;

/// Create a boxed JSONL layer writing to `writer`
///
/// Event fields are flattened into each line, next to the current span and
/// the full span list. With `job_fields` off the `job` span is hidden from
/// this layer only.
pub fn jsonl_layer<S, W>(config: &JsonlConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.thread_ids)
        .with_thread_names(config.thread_ids)
        .with_writer(writer);

    if config.job_fields {
        layer.boxed()
    } else {
        layer
            .with_filter(filter_fn(|meta| meta.target() != JOB_SPAN_TARGET))
            .boxed()
    }
}
