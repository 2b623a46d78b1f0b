/*!
 * Monitoring
 * Structured tracing setup and collection spans
 */

mod tracer;

pub use tracer::{generate_trace_id, init_tracing, try_init_tracing, GcSpan};
