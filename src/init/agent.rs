use crate::init::args::AgentRun;
use crate::listener::Listener;
use crate::server::HttpServer;
use crate::store::SpanStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{debug, error, info, warn};

const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

type TaskSet = JoinSet<Result<(), BoxError>>;

pub struct Agent {
    config: Box<AgentRun>,
    listener: Listener,
    store: Arc<SpanStore>,
}

impl Agent {
    /// The listener must already be bound to `config.endpoint`.
    pub fn new(config: Box<AgentRun>, listener: Listener) -> Self {
        let store = Arc::new(SpanStore::new(config.max_spans));
        Self {
            config,
            listener,
            store,
        }
    }

    pub fn store(&self) -> Arc<SpanStore> {
        self.store.clone()
    }

    pub async fn run(self, agent_cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config;

        info!(
            endpoint = self.listener.local_addr()?.to_string(),
            max_spans = config.max_spans,
            traces_path = config.traces_path.as_str(),
            metrics_path = config.metrics_path.as_str(),
            "Starting span server."
        );

        let http_srv = HttpServer::builder(self.store.clone())
            .with_traces_path(config.traces_path.clone())
            .with_metrics_path(config.metrics_path.clone())
            .with_list_limit(config.list_limit)
            .build();

        let server_cancel = CancellationToken::new();
        let mut server_task_set = JoinSet::new();
        {
            let server_cancel = server_cancel.clone();
            let listener = self.listener;
            server_task_set.spawn(async move { http_srv.serve(listener, server_cancel).await });
        }

        let mut result = Ok(());
        select! {
            _ = agent_cancel.cancelled() => {
                debug!("Agent cancellation signaled.");
            },
            e = wait_for_any_task(&mut server_task_set) => {
                match e {
                    Ok(()) => warn!("Unexpected early exit of server."),
                    Err(e) => result = Err(e),
                }
            },
        }
        result?;

        server_cancel.cancel();
        if let Err(e) = wait_for_tasks_with_timeout(&mut server_task_set, SERVER_SHUTDOWN_TIMEOUT).await
        {
            return Err(format!("timed out waiting for server exit: {}", e).into());
        }

        info!(
            spans = self.store.count(),
            "Server stopped, discarding in-memory spans."
        );
        Ok(())
    }
}

pub(crate) async fn wait_for_any_task(tasks: &mut TaskSet) -> Result<(), BoxError> {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

/// Waits for every task to finish, returning the last task error seen or a timeout error.
pub(crate) async fn wait_for_tasks_with_timeout(
    tasks: &mut TaskSet,
    timeout: Duration,
) -> Result<(), BoxError> {
    let stop_at = Instant::now() + timeout;
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => return Err("timed out waiting for tasks to complete".into()),
            Ok(None) => break,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!("Failed to join with task: {:?}", e),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tokio_test::assert_ok;

    #[derive(Debug, Parser)]
    struct TestArgs {
        #[command(flatten)]
        agent: AgentRun,
    }

    fn config(args: &[&str]) -> Box<AgentRun> {
        let mut argv = vec!["spanscope"];
        argv.extend_from_slice(args);
        Box::new(TestArgs::try_parse_from(argv).unwrap().agent)
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        let config = config(&["--endpoint", "127.0.0.1:0", "--max-spans", "7"]);
        let listener = Listener::bind(config.endpoint).unwrap();
        let agent = Agent::new(config, listener);
        assert_eq!(7, agent.store().max_spans());

        let cancel = CancellationToken::new();
        let hnd = tokio::spawn(agent.run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!hnd.is_finished());

        cancel.cancel();
        assert_ok!(hnd.await.unwrap());
    }

    #[tokio::test]
    async fn wait_reports_task_errors() {
        let mut tasks: TaskSet = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err("boom".into()) });

        let err = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!("boom", err.to_string());
    }

    #[tokio::test]
    async fn wait_times_out() {
        let mut tasks: TaskSet = JoinSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(10)).await;
        assert!(res.is_err());
        assert!(tasks.len() == 1);
        tasks.abort_all();
    }
}
