/*
 * Copyright 2021 Google LLC
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::{sync::Arc, time::Duration};

use pretty_assertions::assert_eq;
use tokio::net::TcpStream;

use lds::{
    config::{DrainType, Listener, ManagerConfig},
    listener::{
        registry::{UpsertError, UpsertOutcome},
        ListenerState,
    },
    net::BindError,
    signal, test, ListenerManager, ShutdownKind,
};

fn listener(name: &str, port: u16, chains: &[&str]) -> Listener {
    let mut proto = test::listener_proto(name, port);
    proto.filter_chains = chains
        .iter()
        .map(|chain| test::chain_proto(chain, None))
        .collect();
    Listener::try_from(proto).unwrap()
}

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn upsert_is_idempotent() {
    let (manager, _routed) = test::manager();

    assert_eq!(
        UpsertOutcome::Added,
        manager.upsert(listener("a", 0, &["c"])).await.unwrap()
    );
    let first = manager.get("a").unwrap();

    assert_eq!(
        UpsertOutcome::Unchanged,
        manager.upsert(listener("a", 0, &["c"])).await.unwrap()
    );
    assert!(Arc::ptr_eq(&first, &manager.get("a").unwrap()));
    assert!(manager.drain_coordinator().draining().is_empty());
}

#[tokio::test]
async fn routes_accepted_connections() {
    let (manager, mut routed) = test::manager();
    manager.upsert(listener("a", 0, &["only"])).await.unwrap();
    let address = manager.local_addr("a").unwrap();

    let (_client, chain) = test::request(address, b"").await;
    assert_eq!("only", chain);

    let routed = routed.recv().await.unwrap();
    assert_eq!("a", routed.listener);
    assert_eq!(address, routed.info.destination);
    assert_eq!(lds::config::RAW_BUFFER, routed.info.transport_protocol);
}

#[tokio::test]
async fn modification_keeps_address_and_drains_old_instance() {
    let (manager, mut routed) = test::manager();
    manager.upsert(listener("a", 0, &["v1"])).await.unwrap();
    let address = manager.local_addr("a").unwrap();

    let (old_client, chain) = test::request(address, b"").await;
    assert_eq!("v1", chain);
    let mut old = routed.recv().await.unwrap();

    assert_eq!(
        UpsertOutcome::Modified,
        manager.upsert(listener("a", 0, &["v2"])).await.unwrap()
    );
    assert_eq!(Some(address), manager.local_addr("a"));
    assert_eq!(
        vec!["v2".to_owned()],
        manager
            .snapshot("a")
            .unwrap()
            .chains()
            .iter()
            .map(|chain| chain.name.clone())
            .collect::<Vec<_>>()
    );

    // the connection accepted by the old instance is left alone
    assert!(old.drain.is_draining());
    assert_eq!(1, manager.drain_coordinator().draining().len());

    let (_new_client, chain) = test::request(address, b"").await;
    assert_eq!("v2", chain);

    drop(old_client);
    tokio::time::timeout(WAIT, old.drain.wait_for(ListenerState::Closed))
        .await
        .unwrap();
    tokio::time::timeout(WAIT, manager.drain_coordinator().all_closed())
        .await
        .unwrap();
}

#[tokio::test]
async fn removal_stops_accepting_and_drains() {
    let (manager, mut routed) = test::manager();
    manager.upsert(listener("a", 0, &["c"])).await.unwrap();
    let address = manager.local_addr("a").unwrap();

    let (client, _) = test::request(address, b"").await;
    let mut accepted = routed.recv().await.unwrap();

    assert!(manager.remove("a").await);
    assert!(!manager.remove("a").await);
    assert!(manager.get("a").is_none());
    assert!(manager.snapshot("a").is_none());

    assert_eq!(ListenerState::Draining, accepted.drain.state());
    assert!(TcpStream::connect(address).await.is_err());

    let draining = manager.drain_coordinator().draining();
    assert_eq!(1, draining.len());
    assert_eq!("a", draining[0].name);
    assert_eq!(1, draining[0].connections_remaining);

    drop(client);
    tokio::time::timeout(WAIT, accepted.drain.wait_for(ListenerState::Closed))
        .await
        .unwrap();
}

#[tokio::test]
async fn drain_deadline_closes_connections() {
    let (handler, mut routed) = test::RecordingHandler::new();
    let manager = ListenerManager::new(
        ManagerConfig {
            drain_timeout: Duration::from_millis(100),
            ..test::manager_config()
        },
        handler,
    );
    manager.upsert(listener("a", 0, &["c"])).await.unwrap();

    let (mut client, _) = test::request(manager.local_addr("a").unwrap(), b"").await;
    let mut accepted = routed.recv().await.unwrap();

    manager.remove("a").await;
    tokio::time::timeout(WAIT, accepted.drain.closing())
        .await
        .unwrap();

    // the handler was dropped, closing the connection
    let mut rest = String::new();
    let read = tokio::time::timeout(
        WAIT,
        tokio::io::AsyncReadExt::read_to_string(&mut client, &mut rest),
    )
    .await
    .unwrap();
    assert!(read.map_or(true, |read| read == 0));
}

#[tokio::test]
async fn failed_health_accelerates_default_drain() {
    let (manager, mut routed) = test::manager();
    let mut modify_only = listener("m", 0, &["c"]);
    modify_only.drain_type = DrainType::ModifyOnly;
    manager.upsert(listener("d", 0, &["c"])).await.unwrap();
    manager.upsert(modify_only).await.unwrap();

    let (_default_client, _) = test::request(manager.local_addr("d").unwrap(), b"").await;
    let mut default_conn = routed.recv().await.unwrap();
    let (_modify_client, _) = test::request(manager.local_addr("m").unwrap(), b"").await;
    let modify_conn = routed.recv().await.unwrap();

    manager.remove("d").await;
    manager.remove("m").await;
    manager.fail_health();

    tokio::time::timeout(WAIT, default_conn.drain.wait_for(ListenerState::Closed))
        .await
        .unwrap();
    assert_eq!(ListenerState::Draining, modify_conn.drain.state());
}

#[tokio::test]
async fn bind_failure_leaves_other_listeners_running() {
    let (manager, _routed) = test::manager();

    let port = free_port();
    manager.upsert(listener("a", port, &["c"])).await.unwrap();

    let error = manager.upsert(listener("b", port, &["c"])).await.unwrap_err();
    assert!(
        matches!(error, UpsertError::Bind(BindError::AddressOwned { ref owner, .. }) if owner == "a"),
        "{error}"
    );

    // a socket that is not ours
    let foreign = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = foreign.local_addr().unwrap().port();
    let error = manager.upsert(listener("c", taken, &["c"])).await.unwrap_err();
    assert!(matches!(error, UpsertError::Bind(BindError::Bind { .. })), "{error}");

    assert_eq!(1, manager.len());
    let (_client, chain) = test::request(manager.local_addr("a").unwrap(), b"").await;
    assert_eq!("c", chain);
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn socket_changes_apply_on_a_fixed_port() {
    let (manager, mut routed) = test::manager();
    let port = free_port();
    manager.upsert(listener("a", port, &["v1"])).await.unwrap();
    let address = manager.local_addr("a").unwrap();

    let (_old_client, chain) = test::request(address, b"").await;
    assert_eq!("v1", chain);
    let old = routed.recv().await.unwrap();

    let mut modified = listener("a", port, &["v2"]);
    modified.socket.backlog = 10;
    assert_eq!(
        UpsertOutcome::Modified,
        manager.upsert(modified).await.unwrap()
    );
    assert_eq!(Some(address), manager.local_addr("a"));
    assert_eq!(10, manager.get("a").unwrap().config().socket.backlog);
    assert!(old.drain.is_draining());

    let (_new_client, chain) = test::request(address, b"").await;
    assert_eq!("v2", chain);
}

#[tokio::test]
async fn drain_deadline_closes_connections_being_inspected() {
    let (handler, _routed) = test::RecordingHandler::new();
    let manager = ListenerManager::new(
        ManagerConfig {
            drain_timeout: Duration::from_millis(100),
            ..test::manager_config()
        },
        handler,
    );
    let mut proto = test::listener_proto("a", 0);
    proto.filter_chains = vec![test::chain_proto("c", None)];
    proto.listener_filters = vec![test::tls_inspector()];
    proto.listener_filters_timeout = Some(prost_types::Duration::default());
    manager.upsert(Listener::try_from(proto).unwrap()).await.unwrap();
    let active = manager.get("a").unwrap();

    // connected, but never sends the bytes the inspector waits for
    let mut client = TcpStream::connect(active.local_addr()).await.unwrap();
    tokio::time::timeout(WAIT, async {
        while active.open_connections() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    manager.remove("a").await;

    let mut rest = Vec::new();
    let read = tokio::time::timeout(
        WAIT,
        tokio::io::AsyncReadExt::read_to_end(&mut client, &mut rest),
    )
    .await
    .unwrap();
    assert!(read.map_or(true, |read| read == 0));

    tokio::time::timeout(WAIT, manager.drain_coordinator().all_closed())
        .await
        .unwrap();
    assert_eq!(ListenerState::Closed, active.listener_state());
    assert_eq!(0, active.open_connections());
}

#[tokio::test]
async fn unknown_listener_filter_is_rejected() {
    let (manager, _routed) = test::manager();
    let mut proto = test::listener_proto("a", 0);
    proto.listener_filters.push(lds::generated::envoy::config::listener::v3::ListenerFilter {
        name: "envoy.filters.listener.unknown".into(),
        config_type: None,
    });
    let listener = Listener::try_from(proto).unwrap();

    assert!(manager.validate(&listener).is_err());
    assert!(matches!(
        manager.upsert(listener).await,
        Err(UpsertError::Validation(_))
    ));
    assert!(manager.is_empty());
}

#[tokio::test]
async fn readers_see_whole_snapshots() {
    let (manager, _routed) = test::manager();
    manager.upsert(listener("a", 0, &["old-1", "old-2"])).await.unwrap();

    let readers = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..500 {
                    let names = manager
                        .snapshot("a")
                        .unwrap()
                        .chains()
                        .iter()
                        .map(|chain| chain.name.clone())
                        .collect::<Vec<_>>();
                    assert!(
                        names == ["old-1", "old-2"] || names == ["new-1", "new-2"],
                        "{names:?}"
                    );
                    assert!(manager.local_addr("a").is_some());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect::<Vec<_>>();

    for round in 0..10 {
        let chains: &[&str] = if round % 2 == 0 {
            &["new-1", "new-2"]
        } else {
            &["old-1", "old-2"]
        };
        manager.upsert(listener("a", 0, chains)).await.unwrap();
        tokio::task::yield_now().await;
    }

    for reader in readers {
        reader.await.unwrap();
    }
}

#[tokio::test]
async fn shutdown_drains_everything() {
    let (manager, _routed) = test::manager();
    manager.upsert(listener("a", 0, &["c"])).await.unwrap();
    manager.upsert(listener("b", 0, &["c"])).await.unwrap();

    let (shutdown_tx, shutdown_rx) = signal::channel(ShutdownKind::Normal);
    let run = tokio::spawn({
        let manager = manager.clone();
        async move { manager.run_until_shutdown(shutdown_rx).await }
    });

    shutdown_tx.send(ShutdownKind::Normal).unwrap();
    tokio::time::timeout(WAIT, run).await.unwrap().unwrap().unwrap();
    assert!(manager.is_empty());
    assert!(manager.drain_coordinator().draining().is_empty());
}
