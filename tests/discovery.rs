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

use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio_stream::wrappers::UnboundedReceiverStream;

use lds::{
    generated::envoy::config::listener::v3 as proto,
    test,
    xds::{
        handle_discovery_responses, resource::to_any, DeltaDiscoveryResponse, DiscoveryResponse,
        Incremental, ListenerSink, Resource, ResourceAck, StateOfTheWorld, Subscription,
        VersionStore, LISTENER_TYPE,
    },
};

fn response(version: &str, nonce: &str, listeners: &[proto::Listener]) -> DiscoveryResponse {
    DiscoveryResponse {
        version_info: version.into(),
        nonce: nonce.into(),
        type_url: LISTENER_TYPE.into(),
        resources: listeners.iter().map(to_any).collect(),
        ..<_>::default()
    }
}

#[tokio::test]
async fn server_name_routing_follows_updates() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let mut session = StateOfTheWorld::new(sink, VersionStore::new(), &test::manager_config());

    let mut v1 = test::listener_proto("L1", 0);
    v1.listener_filters = vec![test::tls_inspector()];
    v1.filter_chains = vec![test::chain_proto("only", None)];

    let ack = session
        .on_response(response("1", "n1", &[v1.clone()]))
        .await
        .unwrap();
    assert!(!ack.is_nack());
    assert_eq!("1", ack.request.version_info);
    assert_eq!("n1", ack.request.response_nonce);
    let address = manager.local_addr("L1").unwrap();

    for server_name in ["a.com", "b.com"] {
        let (_client, chain) =
            test::request(address, &test::client_hello(Some(server_name), &[])).await;
        assert_eq!("only", chain);
    }

    let mut v2 = v1;
    v2.filter_chains = vec![test::chain_proto("P1", Some(test::sni_match(&["a.com"])))];
    v2.default_filter_chain = Some(test::chain_proto("P2", None));

    let ack = session.on_response(response("2", "n2", &[v2])).await.unwrap();
    assert!(!ack.is_nack());
    assert_eq!(Some(address), manager.local_addr("L1"));

    let (_a, chain) = test::request(address, &test::client_hello(Some("a.com"), &[])).await;
    assert_eq!("P1", chain);
    let (_b, chain) = test::request(address, &test::client_hello(Some("b.com"), &[])).await;
    assert_eq!("P2", chain);
}

#[tokio::test]
async fn redelivery_changes_nothing() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let mut session = StateOfTheWorld::new(sink, VersionStore::new(), &test::manager_config());
    let mut listener = test::listener_proto("L1", 0);
    listener.filter_chains = vec![test::chain_proto("c", None)];

    let first = session
        .on_response(response("1", "n1", &[listener.clone()]))
        .await
        .unwrap();
    let applied = manager.get("L1").unwrap();

    let second = session.on_response(response("1", "n2", &[listener])).await.unwrap();
    assert_eq!("n2", second.request.response_nonce);
    assert_eq!(first.request.version_info, second.request.version_info);
    assert_eq!(first.resources, second.resources);
    assert!(Arc::ptr_eq(&applied, &manager.get("L1").unwrap()));
    assert!(manager.drain_coordinator().draining().is_empty());
}

#[tokio::test]
async fn renamed_listener_takes_over_its_address() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let mut session = StateOfTheWorld::new(sink, VersionStore::new(), &test::manager_config());
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let mut old = test::listener_proto("old", port);
    old.filter_chains = vec![test::chain_proto("c", None)];
    let ack = session
        .on_response(response("1", "n1", &[old]))
        .await
        .unwrap();
    assert!(!ack.is_nack());

    let mut new = test::listener_proto("new", port);
    new.filter_chains = vec![test::chain_proto("renamed", None)];
    let ack = session
        .on_response(response("2", "n2", &[new]))
        .await
        .unwrap();

    assert!(!ack.is_nack(), "{:?}", ack.request.error_detail);
    assert_eq!(Some(&ResourceAck::Removed), ack.resources.get("old"));
    assert_eq!(1, manager.len());
    let address = manager.local_addr("new").unwrap();
    assert_eq!(port, address.port());

    let (_client, chain) = test::request(address, b"").await;
    assert_eq!("renamed", chain);
}

#[tokio::test]
async fn invalid_listener_is_rejected_alone() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let mut session = StateOfTheWorld::new(sink, VersionStore::new(), &test::manager_config());
    let mut good = test::listener_proto("good", 0);
    good.filter_chains = vec![test::chain_proto("c", None)];
    let mut bad = test::listener_proto("bad", 0);
    bad.address = None;

    let ack = session.on_response(response("1", "n1", &[good, bad])).await.unwrap();
    assert!(ack.is_nack());
    assert!(matches!(
        ack.resources.get("good"),
        Some(ResourceAck::Applied { .. })
    ));
    assert!(matches!(
        ack.resources.get("bad"),
        Some(ResourceAck::Rejected { .. })
    ));

    let detail = ack.request.error_detail.unwrap();
    assert_eq!(3, detail.code);
    assert!(detail.message.starts_with("bad: "), "{}", detail.message);
    assert_eq!(
        vec!["good"],
        manager
            .listeners()
            .iter()
            .map(|listener| listener.name())
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn removal_of_unsubscribed_listener_is_ignored() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let mut session = Incremental::new(
        sink,
        VersionStore::new(),
        &test::manager_config(),
        Subscription::Names(["L1".to_owned()].into()),
    );
    assert_eq!(
        vec!["L1".to_owned()],
        session.initial_request().resource_names_subscribe
    );

    let mut listener = test::listener_proto("L1", 0);
    listener.filter_chains = vec![test::chain_proto("c", None)];
    let ack = session
        .on_response(DeltaDiscoveryResponse {
            type_url: LISTENER_TYPE.into(),
            nonce: "n1".into(),
            resources: vec![Resource {
                name: "L1".into(),
                version: "1".into(),
                resource: Some(to_any(&listener)),
                ..<_>::default()
            }],
            ..<_>::default()
        })
        .await
        .unwrap();
    assert!(!ack.is_nack());

    let ack = session
        .on_response(DeltaDiscoveryResponse {
            type_url: LISTENER_TYPE.into(),
            nonce: "n2".into(),
            removed_resources: vec!["L2".into()],
            ..<_>::default()
        })
        .await
        .unwrap();

    assert_eq!(Some(&ResourceAck::Ignored), ack.resources.get("L2"));
    assert_eq!("n2", ack.request.response_nonce);
    assert!(ack.request.error_detail.is_none());
    assert_eq!(1, manager.len());
}

#[tokio::test]
async fn stream_driver_acknowledges_as_responses_arrive() {
    let (manager, _routed) = test::manager();
    let sink: Arc<dyn ListenerSink> = manager.clone();
    let session = StateOfTheWorld::new(sink, VersionStore::new(), &test::manager_config());

    let (responses, rx) = tokio::sync::mpsc::unbounded_channel();
    let requests = handle_discovery_responses(session, UnboundedReceiverStream::new(rx));
    futures::pin_mut!(requests);

    let initial = requests.next().await.unwrap().unwrap();
    assert_eq!("test-node", initial.node.unwrap().id);
    assert_eq!("", initial.version_info);

    let mut listener = test::listener_proto("L1", 0);
    listener.filter_chains = vec![test::chain_proto("c", None)];
    responses
        .send(Ok(response("1", "n1", &[listener])))
        .unwrap();
    let ack = requests.next().await.unwrap().unwrap();
    assert_eq!("1", ack.version_info);
    assert!(ack.error_detail.is_none());
    assert!(manager.local_addr("L1").is_some());

    responses.send(Ok(response("2", "n2", &[]))).unwrap();
    let ack = requests.next().await.unwrap().unwrap();
    assert_eq!("2", ack.version_info);
    assert!(manager.is_empty());

    drop(responses);
    assert!(requests.next().await.is_none());
}
