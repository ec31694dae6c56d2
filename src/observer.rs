//! Saga observer trait

use crate::context::SagaContext;

/// Observer trait for external observability
pub trait SagaObserver: Send + Sync + 'static {
    fn on_saga_started(&self, context: &SagaContext);
    fn on_step_started(&self, context: &SagaContext, step: &str, order: u32);
    fn on_step_completed(&self, context: &SagaContext, step: &str, duration_millis: u64);
    fn on_step_retrying(&self, context: &SagaContext, step: &str, attempt: u32, error: &str);
    fn on_step_failed(&self, context: &SagaContext, step: &str, error: &str);
    fn on_compensation_started(&self, context: &SagaContext, pending: usize);
    fn on_compensation_completed(&self, context: &SagaContext, step: &str);
    fn on_compensation_failed(&self, context: &SagaContext, step: &str, error: &str);
    fn on_saga_completed(&self, context: &SagaContext);
    fn on_saga_failed(&self, context: &SagaContext, step: &str, reason: &str);
    fn on_persistence_failed(&self, context: &SagaContext, record: &str, error: &str);
}

/// No-op observer
pub struct NoOpObserver;

impl SagaObserver for NoOpObserver {
    fn on_saga_started(&self, _context: &SagaContext) {}
    fn on_step_started(&self, _context: &SagaContext, _step: &str, _order: u32) {}
    fn on_step_completed(&self, _context: &SagaContext, _step: &str, _duration_millis: u64) {}
    fn on_step_retrying(&self, _context: &SagaContext, _step: &str, _attempt: u32, _error: &str) {}
    fn on_step_failed(&self, _context: &SagaContext, _step: &str, _error: &str) {}
    fn on_compensation_started(&self, _context: &SagaContext, _pending: usize) {}
    fn on_compensation_completed(&self, _context: &SagaContext, _step: &str) {}
    fn on_compensation_failed(&self, _context: &SagaContext, _step: &str, _error: &str) {}
    fn on_saga_completed(&self, _context: &SagaContext) {}
    fn on_saga_failed(&self, _context: &SagaContext, _step: &str, _reason: &str) {}
    fn on_persistence_failed(&self, _context: &SagaContext, _record: &str, _error: &str) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl SagaObserver for TracingObserver {
    fn on_saga_started(&self, context: &SagaContext) {
        tracing::info!(saga_id = %context.instance_id, saga = %context.saga_name, "Saga started");
    }

    fn on_step_started(&self, context: &SagaContext, step: &str, order: u32) {
        tracing::debug!(saga_id = %context.instance_id, step = %step, order, "Step started");
    }

    fn on_step_completed(&self, context: &SagaContext, step: &str, duration_millis: u64) {
        tracing::info!(saga_id = %context.instance_id, step = %step, duration_ms = duration_millis, "Step completed");
    }

    fn on_step_retrying(&self, context: &SagaContext, step: &str, attempt: u32, error: &str) {
        tracing::warn!(saga_id = %context.instance_id, step = %step, attempt, error = %error, "Step failed, retrying");
    }

    fn on_step_failed(&self, context: &SagaContext, step: &str, error: &str) {
        tracing::error!(saga_id = %context.instance_id, step = %step, error = %error, "Step failed");
    }

    fn on_compensation_started(&self, context: &SagaContext, pending: usize) {
        tracing::info!(saga_id = %context.instance_id, pending, "Compensation started");
    }

    fn on_compensation_completed(&self, context: &SagaContext, step: &str) {
        tracing::info!(saga_id = %context.instance_id, step = %step, "Compensation completed");
    }

    fn on_compensation_failed(&self, context: &SagaContext, step: &str, error: &str) {
        tracing::error!(saga_id = %context.instance_id, step = %step, error = %error, "Compensation failed, continuing with remaining compensations");
    }

    fn on_saga_completed(&self, context: &SagaContext) {
        tracing::info!(saga_id = %context.instance_id, elapsed_ms = context.elapsed_millis(), "Saga completed");
    }

    fn on_saga_failed(&self, context: &SagaContext, step: &str, reason: &str) {
        tracing::error!(saga_id = %context.instance_id, step = %step, reason = %reason, "Saga failed");
    }

    fn on_persistence_failed(&self, context: &SagaContext, record: &str, error: &str) {
        tracing::warn!(saga_id = %context.instance_id, record = %record, error = %error, "Failed to persist saga record");
    }
}
