use std::time::Duration;

use gateway_registry::BackoffPolicy;
use gateway_registry::MemCoordinator;
use gateway_registry::RegistryConfig;
use tokio::time::sleep;
use tokio::time::Instant;

pub const ADDRESS: &str = "127.0.0.1:2181";

pub fn coordinator() -> MemCoordinator {
    MemCoordinator::new(vec![ADDRESS.to_string()])
}

pub fn config() -> RegistryConfig {
    RegistryConfig {
        address: ADDRESS.to_string(),
        watch_retry: BackoffPolicy {
            max_retries: 3,
            timeout_ms: 200,
            base_delay_ms: 10,
            max_delay_ms: 50,
        },
        close_grace_ms: 500,
        ..Default::default()
    }
}

pub fn instance(
    id: &str,
    port: u16,
) -> String {
    format!(r#"{{"name":"app","id":"{}","address":"10.0.0.1","port":{}}}"#, id, port)
}

pub async fn eventually<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(3);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for: {}", what);
        sleep(Duration::from_millis(10)).await;
    }
}
