//! Shared helpers for integration tests. Every test boots a disposable
//! Redis container, so the suite requires a working container runtime.

use bb8_redis::{bb8::Pool, RedisConnectionManager};
use testcontainers::{
    core::{ContainerAsync, IntoContainerPort, WaitFor},
    runners::AsyncRunner,
    GenericImage, ImageExt,
};

use sideq::create_redis_pool;

/// Start a private Redis server and return a verified pool plus the
/// container guard; dropping the guard stops the server.
pub async fn setup_redis_test_environment(
) -> (Pool<RedisConnectionManager>, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("redis", "alpine3.22")
        .with_exposed_port(6379.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .with_network("bridge")
        .with_env_var("DEBUG", "1")
        .start()
        .await
        .expect("Failed to start Redis");

    let host = container.get_host().await.expect("Failed to get host");
    let host_port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get host port");
    let pool = create_redis_pool(&format!("redis://{host}:{host_port}")).await;
    assert!(pool.is_ok(), "Failed create connection redis pool");

    (pool.unwrap(), container)
}
