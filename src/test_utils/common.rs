use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::Instant;

use crate::BackoffPolicy;
use crate::MemCoordinator;
use crate::ServiceTable;
use crate::SessionClient;
use crate::SessionConnector;
use crate::SessionMonitor;
use crate::WatchContext;

pub(crate) const MOCK_ADDRESS: &str = "127.0.0.1:2181";

const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(3);
const EVENTUALLY_POLL: Duration = Duration::from_millis(10);

/// Connected in-memory coordination service plus everything a listener needs
pub(crate) struct MockSession {
    pub(crate) zk: MemCoordinator,
    pub(crate) client: Arc<dyn SessionClient>,
    pub(crate) monitor: SessionMonitor,
    pub(crate) table: Arc<ServiceTable>,
}

impl MockSession {
    pub(crate) async fn connect() -> Self {
        let zk = MemCoordinator::new(vec![MOCK_ADDRESS.to_string()]);
        let (client, events) = zk
            .connect("test", &[MOCK_ADDRESS.to_string()], Duration::from_secs(1))
            .await
            .expect("in-memory connect should succeed");
        let monitor = SessionMonitor::register_handler("test", events);
        Self {
            zk,
            client,
            monitor,
            table: Arc::new(ServiceTable::new()),
        }
    }

    pub(crate) fn ctx(&self) -> WatchContext {
        WatchContext {
            client: self.client.clone(),
            session: self.monitor.subscribe(),
            table: self.table.clone(),
            retry: fast_retry(),
            close_grace: Duration::from_millis(500),
        }
    }
}

/// Small delays so resync paths complete quickly in tests
pub(crate) fn fast_retry() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 3,
        timeout_ms: 200,
        base_delay_ms: 10,
        max_delay_ms: 50,
    }
}

/// Polls `condition` until it holds, panicking with `what` after a few seconds
pub(crate) async fn eventually<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + EVENTUALLY_TIMEOUT;
    while !condition() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for: {}", what);
        }
        sleep(EVENTUALLY_POLL).await;
    }
}

/// JSON payload of an application instance node
pub(crate) fn instance_json(
    id: &str,
    port: u16,
) -> String {
    format!(
        r#"{{"name":"app","id":"{}","address":"10.0.0.1","port":{},"payload":{{"metadata":{{}}}}}}"#,
        id, port
    )
}

/// Node name of an interface provider
pub(crate) fn provider_node(
    host_port: &str,
    interface: &str,
    version: &str,
) -> String {
    urlencoding::encode(&format!(
        "dubbo://{}/{}?version={}&side=provider",
        host_port, interface, version
    ))
    .into_owned()
}
