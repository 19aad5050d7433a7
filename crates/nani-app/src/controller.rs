use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::server::serve;
use crate::state::AppState;

/// Application controller for task spawning and lifecycle
pub struct AppController {
    state: Arc<AppState>,
    cancel_token: CancellationToken,
}

impl AppController {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn spawn_tasks(&self) -> JoinSet<anyhow::Result<()>> {
        let mut tasks = JoinSet::new();

        // HTTP server
        tasks.spawn(serve(self.state.clone(), self.cancel_token.child_token()));

        tasks
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Run until `shutdown` resolves or a task stops on its own
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let mut tasks = self.spawn_tasks();
        let mut failure = None;

        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown requested");
            }
            Some(result) = tasks.join_next() => {
                match result {
                    Ok(Ok(())) => tracing::warn!("server task exited"),
                    Ok(Err(e)) => {
                        tracing::error!("server task failed: {e:#}");
                        failure = Some(e);
                    }
                    Err(e) => tracing::error!("server task panicked: {e}"),
                }
            }
        }

        self.shutdown();

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("task failed during shutdown: {e:#}"),
                Err(e) => tracing::error!("task panicked during shutdown: {e}"),
            }
        }

        tracing::info!("Stopped");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
