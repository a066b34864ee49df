//! Success/Error/Fault counters and timing around a unit of work.

use std::future::Future;

use crate::metrics::TimeMeasurement;
use crate::scope::Scope;

/// Folds the measurement when dropped, including during unwinding.
struct BenchGuard(Option<TimeMeasurement>);

impl Drop for BenchGuard {
    fn drop(&mut self) {
        if let Some(bench) = self.0.take() {
            if std::thread::panicking() {
                let _ = bench.try_done();
            } else {
                bench.done();
            }
        }
    }
}

/// Runs `f` recording `Success`, `Error`, `Fault` counts and `Time` on the
/// scope's accumulator.
///
/// `Fault` is raised before `f` runs and lowered only if `f` returns, so a
/// panic leaves `Fault = 1`.
///
/// # Panics
/// Panics if `scope` carries no accumulator.
pub async fn instrument_with_metrics<F, Fut, T, E>(scope: &Scope, f: F) -> Result<T, E>
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let metrics = scope.metrics();
    metrics.add_count("Success", 0.0);
    metrics.add_count("Error", 0.0);
    metrics.add_count("Fault", 1.0);

    let _bench = BenchGuard(Some(metrics.benchmark("Time")));

    let res = f(scope.clone()).await;

    metrics.add_count("Fault", -1.0);
    match res {
        Ok(_) => metrics.add_count("Success", 1.0),
        Err(_) => metrics.add_count("Error", 1.0),
    }
    res
}
