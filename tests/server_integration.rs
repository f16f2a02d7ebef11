//! Integration tests for the execlua server.
//!
//! Each test binds a real server on an ephemeral loopback port, runs it on a
//! `LocalSet` (the Lua state is !Send), and talks to it over TCP.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use execlua::constants::EXCEPTION_PREFIX;
use execlua::socket::framing::encode;
use execlua::{
    EvalClient, LuaRuntime, ScopeMode, ScopeProvisioner, Server, ServerConfig, StopSignal,
};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, LocalSet};

fn config(scope_mode: ScopeMode) -> ServerConfig {
    ServerConfig {
        port: 0,
        quiet: true,
        scope_mode,
        lua_path: PathBuf::from("/nonexistent/execlua"),
        ..ServerConfig::default()
    }
}

/// Bind and spawn a server on the current `LocalSet`.
async fn start(
    config: &ServerConfig,
) -> (SocketAddr, StopSignal, JoinHandle<anyhow::Result<()>>) {
    let runtime = LuaRuntime::new(config.lua_path.clone()).expect("Should create Lua runtime");
    let provisioner =
        ScopeProvisioner::from_config(&runtime, config.module.as_deref(), config.scope_mode)
            .expect("Should build scope provisioner");
    let server = Server::bind(config, runtime, provisioner)
        .await
        .expect("Should bind ephemeral port");

    let addr = server.local_addr();
    let stop = server.stop_handle();
    (addr, stop, tokio::task::spawn_local(server.run()))
}

async fn connect(addr: SocketAddr) -> EvalClient {
    EvalClient::connect("127.0.0.1", addr.port())
        .await
        .expect("Should connect to test server")
}

/// Write a module file into a fresh Lua path directory.
fn lua_dir(name: &str, source: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(format!("{name}.lua")), source).unwrap();
    dir
}

const COUNTER_MODULE: &str = r"
local M = {}
local created = 0

function M.get_scope()
    created = created + 1
    return { id = created }
end

return M
";

#[tokio::test]
async fn test_assignment_persists_within_connection() {
    LocalSet::new()
        .run_until(async {
            for mode in [ScopeMode::PerConnection, ScopeMode::Shared] {
                let (addr, _stop, _server) = start(&config(mode)).await;
                let mut client = connect(addr).await;

                assert_eq!(client.send("x = 1").await.unwrap(), "");
                assert_eq!(client.send("x + 1").await.unwrap(), "2");
                client.close().await.unwrap();
            }
        })
        .await;
}

#[tokio::test]
async fn test_per_connection_scopes_are_isolated() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::PerConnection)).await;
            let mut a = connect(addr).await;
            let mut b = connect(addr).await;

            a.send("x = 1").await.unwrap();
            assert_eq!(b.send("x").await.unwrap(), "");
            assert_eq!(a.send("x").await.unwrap(), "1");
        })
        .await;
}

#[tokio::test]
async fn test_shared_scope_visible_across_connections() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::Shared)).await;
            let mut a = connect(addr).await;
            a.send("x = 1").await.unwrap();
            a.close().await.unwrap();

            let mut b = connect(addr).await;
            assert_eq!(b.send("x").await.unwrap(), "1");
        })
        .await;
}

#[tokio::test]
async fn test_errors_are_responses_and_connection_survives() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::PerConnection)).await;
            let mut client = connect(addr).await;
            assert_eq!(client.peer_addr(), addr);

            let boom = client.send("error('boom')").await.unwrap();
            assert!(boom.starts_with(EXCEPTION_PREFIX), "{boom}");
            assert!(boom.contains("boom"));

            let div = client.send("1//0").await.unwrap();
            assert!(div.starts_with(EXCEPTION_PREFIX), "{div}");

            assert_eq!(client.send("1 + 1").await.unwrap(), "2");
        })
        .await;
}

#[tokio::test]
async fn test_quit_sentinel_is_code_when_shutdown_disabled() {
    LocalSet::new()
        .run_until(async {
            let (addr, stop, server) = start(&config(ScopeMode::PerConnection)).await;
            let mut client = connect(addr).await;

            let response = client.send(r"\q").await.unwrap();
            assert!(response.starts_with(EXCEPTION_PREFIX), "{response}");
            assert!(!stop.is_requested());

            // Connection and server both keep working
            assert_eq!(client.send("'still here'").await.unwrap(), "still here");
            let mut other = connect(addr).await;
            assert_eq!(other.send("3 * 3").await.unwrap(), "9");
            assert!(!server.is_finished());
        })
        .await;
}

#[tokio::test]
async fn test_quit_sentinel_stops_server_when_enabled() {
    LocalSet::new()
        .run_until(async {
            let config = ServerConfig {
                allow_remote_shutdown: true,
                ..config(ScopeMode::PerConnection)
            };
            let (addr, stop, server) = start(&config).await;
            let mut client = connect(addr).await;
            assert_eq!(client.send("1").await.unwrap(), "1");

            client.quit().await.unwrap();

            tokio::time::timeout(Duration::from_secs(2), server)
                .await
                .expect("Server should stop after the quit sentinel")
                .unwrap()
                .unwrap();
            assert!(stop.is_requested());
            assert!(TcpStream::connect(addr).await.is_err(), "Listener should be closed");
        })
        .await;
}

#[tokio::test]
async fn test_empty_payload_closes_without_response() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::PerConnection)).await;
            let mut stream = TcpStream::connect(addr).await.unwrap();

            stream.write_all(&encode("")).await.unwrap();

            let mut rest = Vec::new();
            stream.read_to_end(&mut rest).await.unwrap();
            assert!(rest.is_empty(), "Expected EOF, got {rest:?}");
        })
        .await;
}

#[tokio::test]
async fn test_sleeping_request_does_not_block_others() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::PerConnection)).await;
            let mut slow = connect(addr).await;
            let mut fast = connect(addr).await;

            let slow_task = tokio::task::spawn_local(async move {
                slow.send("time.sleep(0.3)\nreturn 'slow'").await
            });
            tokio::time::sleep(Duration::from_millis(50)).await;

            let started = Instant::now();
            assert_eq!(fast.send("1 + 1").await.unwrap(), "2");
            assert!(started.elapsed() < Duration::from_millis(200));
            assert!(!slow_task.is_finished());

            assert_eq!(slow_task.await.unwrap().unwrap(), "slow");
        })
        .await;
}

#[tokio::test]
async fn test_module_factory_called_per_connection() {
    LocalSet::new()
        .run_until(async {
            let dir = lua_dir("counter_scope", COUNTER_MODULE);
            let config = ServerConfig {
                module: Some("counter_scope".to_string()),
                lua_path: dir.path().to_path_buf(),
                ..config(ScopeMode::PerConnection)
            };
            let (addr, _stop, _server) = start(&config).await;

            let mut a = connect(addr).await;
            let mut b = connect(addr).await;
            assert_eq!(a.send("id").await.unwrap(), "1");
            assert_eq!(b.send("id").await.unwrap(), "2");
            assert_eq!(b.send("string.rep('z', id)").await.unwrap(), "zz");
        })
        .await;
}

#[tokio::test]
async fn test_module_factory_in_shared_mode_called_once() {
    LocalSet::new()
        .run_until(async {
            let dir = lua_dir("counter_scope", COUNTER_MODULE);
            let config = ServerConfig {
                module: Some("counter_scope".to_string()),
                lua_path: dir.path().to_path_buf(),
                ..config(ScopeMode::Shared)
            };
            let (addr, _stop, _server) = start(&config).await;

            let mut a = connect(addr).await;
            let mut b = connect(addr).await;
            assert_eq!(a.send("id").await.unwrap(), "1");
            assert_eq!(b.send("id").await.unwrap(), "1");
        })
        .await;
}

#[test]
fn test_module_without_get_scope_fails_startup() {
    let dir = lua_dir("no_factory", "return { helper = function() end }");
    let runtime = LuaRuntime::new(dir.path().to_path_buf()).unwrap();

    let err = ScopeProvisioner::from_config(&runtime, Some("no_factory"), ScopeMode::Shared)
        .unwrap_err();
    assert!(err.to_string().contains("does not define get_scope()"), "{err}");
}

#[tokio::test]
async fn test_shared_scope_seeded_through_library() {
    LocalSet::new()
        .run_until(async {
            use execlua::Evaluator;

            let config = config(ScopeMode::Shared);
            let runtime = LuaRuntime::new(config.lua_path.clone()).unwrap();
            let scope = runtime.new_scope().unwrap();
            scope.set("greeting", "hello").unwrap();

            let server = Server::bind(&config, runtime, ScopeProvisioner::Shared(scope))
                .await
                .unwrap();
            let addr = server.local_addr();
            let _server = tokio::task::spawn_local(server.run());

            let mut client = connect(addr).await;
            assert_eq!(client.send("greeting .. ', world'").await.unwrap(), "hello, world");
        })
        .await;
}

#[tokio::test]
async fn test_oversized_result_is_exception_and_connection_survives() {
    LocalSet::new()
        .run_until(async {
            let (addr, _stop, _server) = start(&config(ScopeMode::PerConnection)).await;
            let mut client = connect(addr).await;

            let response = client
                .send("string.rep('a', 17 * 1024 * 1024)")
                .await
                .expect("Oversized result should still get a response");
            assert!(response.starts_with(EXCEPTION_PREFIX));
            assert!(response.contains("result too large"), "{response}");

            assert_eq!(client.send("1 + 1").await.unwrap(), "2");
        })
        .await;
}
