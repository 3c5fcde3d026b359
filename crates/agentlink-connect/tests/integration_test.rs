//! Integration tests for agentlink-connect
//!
//! A scripted dialer stands in for the network so cache behavior (sharing,
//! eviction, cancellation, concurrency) can be checked deterministically. The
//! tonic dialer is exercised against a closed local port and in lazy mode.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentlink_connect::{
    Authorizer, BearerToken, CallCredentials, ConnectError, Connection, ConnectionCache,
    ConnectivityState, DebugMode, DialConfig, Dialer, EndpointFamily, HealthPolicy,
    InsecureAuthorizer, TonicDialer, Transport, TransportCredentials,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tonic::transport::ClientTlsConfig;
use tonic::Status;

#[derive(Debug)]
struct ScriptedConnection {
    id: usize,
    state: AtomicU8,
    closes: AtomicUsize,
}

impl ScriptedConnection {
    fn set_state(&self, state: ConnectivityState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

impl Transport for ScriptedConnection {
    fn state(&self) -> ConnectivityState {
        match self.state.load(Ordering::SeqCst) {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            _ => ConnectivityState::Shutdown,
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedDialer {
    dials: AtomicUsize,
    delay: Option<Duration>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedDialer {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Make dials to `endpoint` wait until the returned gate is notified
    fn gate(&self, endpoint: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    type Connection = ScriptedConnection;

    async fn dial(
        &self,
        endpoint: &str,
        _config: &DialConfig,
    ) -> Result<ScriptedConnection, ConnectError> {
        let id = self.dials.fetch_add(1, Ordering::SeqCst);

        let gate = self.gates.lock().get(endpoint).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(endpoint) {
            return Err(ConnectError::DialFailed {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        Ok(ScriptedConnection {
            id,
            state: AtomicU8::new(ConnectivityState::Ready as u8),
            closes: AtomicUsize::new(0),
        })
    }
}

struct TestAuthorizer;

impl Authorizer for TestAuthorizer {
    fn transport_credentials(&self) -> Result<TransportCredentials, ConnectError> {
        Ok(TransportCredentials::from_tls(ClientTlsConfig::new()))
    }

    fn call_credentials(&self) -> Result<Arc<dyn CallCredentials>, ConnectError> {
        Ok(Arc::new(BearerToken::new("integration-token")))
    }
}

fn debug_off() -> DebugMode {
    DebugMode::new(false).with_env_var("AGENTLINK_INTEGRATION_DEBUG_UNSET")
}

fn debug_on() -> DebugMode {
    DebugMode::new(true).with_env_var("AGENTLINK_INTEGRATION_DEBUG_UNSET")
}

fn agent_cache(dialer: ScriptedDialer) -> ConnectionCache<ScriptedDialer> {
    ConnectionCache::new(EndpointFamily::Agent, dialer, debug_off())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_callers_share_one_dial() {
    let cache = Arc::new(agent_cache(ScriptedDialer::with_delay(
        Duration::from_millis(50),
    )));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move {
            cache.get_connection("10.0.0.9", &TestAuthorizer).await
        }));
    }

    let mut connections = Vec::new();
    for handle in handles {
        connections.push(handle.await.unwrap().unwrap());
    }

    let first = &connections[0];
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, first)));
    assert_eq!(first.id, 0);
    assert_eq!(cache.dialer().dial_count(), 1);
}

#[tokio::test]
async fn test_explicit_default_port_hits_same_entry() {
    let cache = agent_cache(ScriptedDialer::default());

    let implicit = cache.get_connection("10.0.0.5", &TestAuthorizer).await.unwrap();
    let explicit = cache
        .get_connection("10.0.0.5:55000", &TestAuthorizer)
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&implicit, &explicit));
    assert!(cache.contains("10.0.0.5:55000"));
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_different_ports_are_different_entries() {
    let cache = agent_cache(ScriptedDialer::default());

    let a = cache.get_connection("10.0.0.5", &TestAuthorizer).await.unwrap();
    let b = cache
        .get_connection("10.0.0.5:9999", &TestAuthorizer)
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pending_dial_does_not_block_other_endpoints() {
    let dialer = ScriptedDialer::default();
    let gate = dialer.gate("slow:55000");
    let cache = Arc::new(agent_cache(dialer));

    let slow = {
        let cache = cache.clone();
        tokio::spawn(async move { cache.get_connection("slow", &TestAuthorizer).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = tokio::time::timeout(
        Duration::from_secs(2),
        cache.get_connection("fast", &TestAuthorizer),
    )
    .await
    .expect("lookup for an unrelated endpoint must not wait on another dial");
    assert!(fast.is_ok());
    assert!(!slow.is_finished());

    gate.notify_one();
    assert!(slow.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_cancelled_dial_leaves_nothing_cached() {
    let dialer = ScriptedDialer::default();
    let gate = dialer.gate("hung:55000");
    let cache = agent_cache(dialer);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = cache
        .get_connection_cancellable("hung", &TestAuthorizer, &cancel)
        .await;
    assert!(matches!(
        result,
        Err(ConnectError::Cancelled { ref endpoint }) if endpoint == "hung:55000"
    ));
    assert!(!cache.contains("hung"));

    gate.notify_one();
    let fresh = cache.get_connection("hung", &TestAuthorizer).await.unwrap();
    assert_eq!(fresh.id, 1);
}

#[tokio::test]
async fn test_dial_failure_is_returned_and_not_cached() {
    let dialer = ScriptedDialer::default();
    dialer.failing.lock().insert("down:55000".to_string());
    let cache = agent_cache(dialer);

    let err = cache
        .get_connection("down", &TestAuthorizer)
        .await
        .unwrap_err();
    assert!(err.is_dial_failure());
    assert!(!cache.contains("down"));

    cache.dialer().failing.lock().clear();
    let conn = cache.get_connection("down", &TestAuthorizer).await.unwrap();
    assert_eq!(conn.id, 1);
}

#[tokio::test]
async fn test_stale_connection_is_replaced() {
    let cache = agent_cache(ScriptedDialer::default());

    let first = cache.get_connection("node", &TestAuthorizer).await.unwrap();
    first.set_state(ConnectivityState::TransientFailure);

    let second = cache.get_connection("node", &TestAuthorizer).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.closes.load(Ordering::SeqCst), 1);

    // The evicted handle is not closed again by later lookups
    cache.get_connection("node", &TestAuthorizer).await.unwrap();
    assert_eq!(first.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_clear_then_get_dials_fresh() {
    let cache = agent_cache(ScriptedDialer::default());

    let before = cache.get_connection("node", &TestAuthorizer).await.unwrap();
    cache.clear();
    let after = cache.get_connection("node", &TestAuthorizer).await.unwrap();

    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(cache.dialer().dial_count(), 2);
    assert_eq!(before.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_auth_cache_reuses_stale_entry_by_default() {
    let cache = ConnectionCache::new(
        EndpointFamily::Authentication,
        ScriptedDialer::default(),
        debug_on(),
    );

    let first = cache.get_connection("login", &TestAuthorizer).await.unwrap();
    first.set_state(ConnectivityState::Shutdown);
    let second = cache.get_connection("login", &TestAuthorizer).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.contains("login:65000"));
}

#[tokio::test]
async fn test_auth_cache_with_staleness_check_evicts() {
    let cache = ConnectionCache::new(
        EndpointFamily::Authentication,
        ScriptedDialer::default(),
        debug_off(),
    )
    .with_health_policy(HealthPolicy::TransportState);

    let first = cache.get_connection("login", &TestAuthorizer).await.unwrap();
    first.set_state(ConnectivityState::Shutdown);
    let second = cache.get_connection("login", &TestAuthorizer).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_auth_cache_never_dials_insecure() {
    let cache = ConnectionCache::new(
        EndpointFamily::Authentication,
        ScriptedDialer::default(),
        debug_on(),
    );

    let result = cache.get_connection("login", &InsecureAuthorizer).await;
    assert!(matches!(result, Err(ConnectError::Authorization(_))));
    assert_eq!(cache.dialer().dial_count(), 0);
}

fn closed_local_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_tonic_dial_to_closed_port_returns_error() {
    let cache: ConnectionCache<TonicDialer> =
        ConnectionCache::new(EndpointFamily::Agent, TonicDialer::new(), debug_on());
    let address = format!("127.0.0.1:{}", closed_local_port());

    let err = cache
        .get_connection(&address, &InsecureAuthorizer)
        .await
        .unwrap_err();

    assert!(matches!(err, ConnectError::Dial { .. }));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_tonic_lazy_connection_observes_failures() {
    let cache: ConnectionCache<TonicDialer> =
        ConnectionCache::new(EndpointFamily::Agent, TonicDialer::lazy(), debug_on());
    let address = format!("127.0.0.1:{}", closed_local_port());

    let first: Arc<Connection> = cache
        .get_connection(&address, &InsecureAuthorizer)
        .await
        .unwrap();
    assert_eq!(first.state(), ConnectivityState::Idle);
    assert_eq!(first.endpoint(), address);
    assert!(!first.has_call_credentials());

    assert!(!first.observe(&Status::not_found("vm-1")));
    assert_eq!(first.state(), ConnectivityState::Idle);

    assert!(first.observe(&Status::unavailable("agent went away")));
    assert_eq!(first.state(), ConnectivityState::TransientFailure);

    let second = cache
        .get_connection(&address, &InsecureAuthorizer)
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.state(), ConnectivityState::Shutdown);
}
