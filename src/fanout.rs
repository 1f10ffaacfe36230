use futures::future::join_all;
use std::future::Future;
use tracing::error;

use crate::types::ClusterTarget;

/// Run one single-cluster operation concurrently across targets.
///
/// Every invocation runs to completion independently; a failing cluster is
/// logged with its id and the operation name and excluded from the result
/// list, never cancelling or corrupting its siblings. Results carry their
/// cluster id explicitly so callers never rely on positional alignment.
pub async fn fan_out<T, F, Fut>(
    operation: &str,
    targets: &[ClusterTarget],
    run: F,
) -> Vec<(String, T)>
where
    F: Fn(ClusterTarget) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let invocations = targets.iter().map(|target| {
        let id = target.id.clone();
        let fut = run(target.clone());
        async move { (id, fut.await) }
    });

    let mut results = Vec::with_capacity(targets.len());
    for (cluster_id, outcome) in join_all(invocations).await {
        match outcome {
            Ok(value) => results.push((cluster_id, value)),
            Err(err) => {
                error!(cluster = %cluster_id, operation, error = %err, "cluster operation failed");
            }
        }
    }
    results
}
