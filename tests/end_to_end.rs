//! End-to-end scenarios over real loopback TCP sockets (§8 S1/S2/S4-lite).
//! Cut-detector boundary (S5) and Fast-Paxos-with-conflicts (S6) are unit
//! tests closer to the code they exercise, in `rapid-detector` and
//! `rapid-consensus` respectively.

use rapid::{join, start, Endpoint, Metadata, RapidSettings, TcpMessagingClient, TcpMessagingServer};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

async fn spawn_node(
    port: u16,
    settings: &RapidSettings,
) -> (Endpoint, Arc<TcpMessagingClient>, TcpListener) {
    let endpoint = Endpoint::new("127.0.0.1".to_string(), port);
    let listener = TcpListener::bind(("127.0.0.1", port)).await.expect("bind loopback port");
    let client = Arc::new(TcpMessagingClient::new(settings.messaging_client_join_request_timeout()));
    (endpoint, client, listener)
}

fn fast_settings() -> RapidSettings {
    let mut s = RapidSettings::default();
    s.join_delay_millis = 20;
    s.batching_window_millis = 20;
    s
}

async fn wait_until<F, Fut>(mut predicate: F, attempts: u32, between: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..attempts {
        if predicate().await {
            return;
        }
        tokio::time::sleep(between).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn s1_single_seed_one_joiner_converge_on_the_same_configuration() {
    let settings = fast_settings();

    let (seed_ep, seed_client, seed_listener) = spawn_node(18100, &settings).await;
    let seed = start(seed_ep.clone(), Metadata::new(), settings.clone(), seed_client).unwrap();
    tokio::spawn(TcpMessagingServer::serve(seed_listener, Arc::new(seed.clone())));

    let (joiner_ep, joiner_client, joiner_listener) = spawn_node(18101, &settings).await;
    let joiner = join(joiner_ep.clone(), seed_ep.clone(), Metadata::new(), settings.clone(), joiner_client)
        .await
        .unwrap();
    tokio::spawn(TcpMessagingServer::serve(joiner_listener, Arc::new(joiner.clone())));

    wait_until(|| async { seed.get_member_list().await.len() == 2 }, 50, Duration::from_millis(20)).await;

    let mut seed_members = seed.get_member_list().await;
    let mut joiner_members = joiner.get_member_list().await;
    seed_members.sort_by_key(|e| e.port());
    joiner_members.sort_by_key(|e| e.port());
    assert_eq!(seed_members, joiner_members);
    assert_eq!(seed.get_configuration_id().await, joiner.get_configuration_id().await);

    seed.shutdown().await;
    joiner.shutdown().await;
}

#[tokio::test]
async fn s2_three_sequential_joiners_agree_after_each_join() {
    let settings = fast_settings();

    let (seed_ep, seed_client, seed_listener) = spawn_node(18110, &settings).await;
    let seed = start(seed_ep.clone(), Metadata::new(), settings.clone(), seed_client).unwrap();
    tokio::spawn(TcpMessagingServer::serve(seed_listener, Arc::new(seed.clone())));

    let mut members = vec![seed.clone()];
    for (i, port) in [18111u16, 18112, 18113].into_iter().enumerate() {
        let (ep, client, listener) = spawn_node(port, &settings).await;
        let node = join(ep, seed_ep.clone(), Metadata::new(), settings.clone(), client).await.unwrap();
        tokio::spawn(TcpMessagingServer::serve(listener, Arc::new(node.clone())));
        members.push(node);

        let expected_size = i + 2;
        for member in &members {
            wait_until(
                || async { member.get_member_list().await.len() == expected_size },
                50,
                Duration::from_millis(20),
            )
            .await;
        }
    }

    let configuration_ids: Vec<Option<u64>> = {
        let mut ids = Vec::new();
        for member in &members {
            ids.push(member.get_configuration_id().await);
        }
        ids
    };
    assert!(configuration_ids.windows(2).all(|w| w[0] == w[1]));

    for member in &members {
        member.shutdown().await;
    }
}

#[tokio::test]
async fn leave_triggers_a_down_view_change_for_the_survivor() {
    let settings = fast_settings();

    let (seed_ep, seed_client, seed_listener) = spawn_node(18120, &settings).await;
    let seed = start(seed_ep.clone(), Metadata::new(), settings.clone(), seed_client).unwrap();
    tokio::spawn(TcpMessagingServer::serve(seed_listener, Arc::new(seed.clone())));

    let (joiner_ep, joiner_client, joiner_listener) = spawn_node(18121, &settings).await;
    let joiner = join(joiner_ep.clone(), seed_ep.clone(), Metadata::new(), settings.clone(), joiner_client)
        .await
        .unwrap();
    tokio::spawn(TcpMessagingServer::serve(joiner_listener, Arc::new(joiner.clone())));

    wait_until(|| async { seed.get_member_list().await.len() == 2 }, 50, Duration::from_millis(20)).await;

    let mut events = joiner.subscribe();
    seed.shutdown().await;

    let view_change = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match events.recv().await.unwrap() {
                rapid::ClusterEvent::ViewChange(_, changes) => return changes,
                _ => continue,
            }
        }
    })
    .await
    .expect("a ViewChange must be observed within 2s of the seed leaving");

    assert!(view_change
        .iter()
        .any(|c| matches!(c, rapid::NodeStatusChange::Down(e) if e == &seed_ep)));

    wait_until(|| async { joiner.get_member_list().await.len() == 1 }, 50, Duration::from_millis(20)).await;
    joiner.shutdown().await;
}

/// Real failure detection takes `failureDetectorInterval * bootstrapHeartbeatLimit`
/// worst-case to stop trusting a silently-dead peer; slow enough that it is
/// skipped by default (§8 S4).
#[tokio::test]
#[ignore]
async fn s4_killing_a_peer_is_eventually_detected_and_reported_down() {
    let mut settings = fast_settings();
    settings.failure_detector_interval_millis = 50;
    settings.bootstrap_heartbeat_limit = 2;
    settings.failure_detector_threshold = 0.5;

    let (seed_ep, seed_client, seed_listener) = spawn_node(18130, &settings).await;
    let seed = start(seed_ep.clone(), Metadata::new(), settings.clone(), seed_client).unwrap();
    tokio::spawn(TcpMessagingServer::serve(seed_listener, Arc::new(seed.clone())));

    let (joiner_ep, joiner_client, joiner_listener) = spawn_node(18131, &settings).await;
    let joiner = join(joiner_ep.clone(), seed_ep.clone(), Metadata::new(), settings.clone(), joiner_client)
        .await
        .unwrap();
    let joiner_server = tokio::spawn(TcpMessagingServer::serve(joiner_listener, Arc::new(joiner.clone())));

    wait_until(|| async { seed.get_member_list().await.len() == 2 }, 50, Duration::from_millis(20)).await;

    // Simulate a hard kill: stop answering probes without a graceful Leave.
    joiner_server.abort();

    wait_until(|| async { seed.get_member_list().await.len() == 1 }, 100, Duration::from_millis(100)).await;

    seed.shutdown().await;
}
