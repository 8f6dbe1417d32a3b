//! Push-channel integration
//!
//! Wires the realtime channel, reconciler and store together over a scripted
//! socket: full-state syncs, deltas from other clients, the bulk-update
//! resync handshake, and local-wins precedence while a change is in flight.

mod common;

use common::{fake_socket, FakeConnector, FakeSocketHandle, RecordingTransport};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use xfboard::dispatcher::ChangeDispatcher;
use xfboard::realtime::{ChannelStatus, RealtimeChannel, SocketEvent};
use xfboard::reconciler::{Reconciler, ReconcilerEvent};
use xfboard::shared::{
    ClientMessage, DispatchConfig, RealtimeConfig, RemoteTask, ServerMessage, StoreConfig,
    TaskDelta, TaskStatus,
};
use xfboard::store::OptimisticStateStore;

fn realtime_config() -> RealtimeConfig {
    RealtimeConfig {
        reconnect_jitter: false,
        ..RealtimeConfig::default()
    }
}

struct Client {
    reconciler: Reconciler,
    store: Arc<OptimisticStateStore>,
    channel: RealtimeChannel,
    handle: FakeSocketHandle,
}

/// Assemble the full client stack around one scripted socket
async fn connected_client(transport: Arc<RecordingTransport>) -> Client {
    let (socket, handle) = fake_socket();
    let connector = Arc::new(FakeConnector::with_sockets(vec![socket]));
    let store = Arc::new(OptimisticStateStore::new(StoreConfig::default()));
    let dispatcher = Arc::new(ChangeDispatcher::new(transport, DispatchConfig::default()));
    let reconciler = Reconciler::new(Arc::clone(&store), dispatcher);

    let (channel, inbound) =
        RealtimeChannel::new(connector, "ws://test/ws", "main", realtime_config());
    reconciler.bind_channel(inbound);
    channel.connect();
    channel
        .watch_status()
        .wait_for(|s| *s == ChannelStatus::Connected)
        .await
        .unwrap();

    Client {
        reconciler,
        store,
        channel,
        handle,
    }
}

async fn wait_for_task(store: &OptimisticStateStore, task_id: Uuid) {
    for _ in 0..1000 {
        if store.task(task_id).await.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached the store");
}

#[tokio::test(start_paused = true)]
async fn pushes_from_other_clients_reach_the_store() {
    let client = connected_client(Arc::new(RecordingTransport::ok())).await;

    // initial authoritative snapshot
    let synced = RemoteTask::new(Uuid::new_v4(), TaskStatus::Todo, 0);
    client.handle.push(SocketEvent::Message(ServerMessage::StateSync {
        tasks: vec![synced.clone()],
    }));
    wait_for_task(&client.store, synced.id).await;

    // another client creates a task
    let created = RemoteTask::new(Uuid::new_v4(), TaskStatus::Doing, 1);
    client
        .handle
        .push(SocketEvent::Message(ServerMessage::TasksUpdated {
            changes: vec![TaskDelta::TaskCreated {
                task: created.clone(),
            }],
        }));
    wait_for_task(&client.store, created.id).await;

    let task = client.store.task(created.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Doing);
    assert!(!task.pending);
}

#[tokio::test(start_paused = true)]
async fn bulk_update_drives_a_request_sync_round_trip() {
    let client = connected_client(Arc::new(RecordingTransport::ok())).await;
    let mut events = client.reconciler.subscribe();

    // the server signals more changes than it enumerates
    client
        .handle
        .push(SocketEvent::Message(ServerMessage::TasksUpdated {
            changes: vec![TaskDelta::BulkUpdate],
        }));
    loop {
        if events.recv().await.unwrap() == ReconcilerEvent::ResyncRequired {
            break;
        }
    }

    // the application answers with an explicit sync request
    client.channel.request_sync();
    for _ in 0..1000 {
        if client.handle.sent().contains(&ClientMessage::RequestSync) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(client.handle.sent().contains(&ClientMessage::RequestSync));

    // and the server's snapshot lands in the store
    let task = RemoteTask::new(Uuid::new_v4(), TaskStatus::Review, 0);
    client.handle.push(SocketEvent::Message(ServerMessage::StateSync {
        tasks: vec![task.clone()],
    }));
    wait_for_task(&client.store, task.id).await;
}

#[tokio::test(start_paused = true)]
async fn pending_local_change_survives_a_competing_push() {
    // hold the mutation in flight long enough for the push to arrive
    let transport = Arc::new(RecordingTransport::ok().with_delay(Duration::from_secs(2)));
    let client = connected_client(Arc::clone(&transport)).await;
    let mut events = client.reconciler.subscribe();

    let task_id = Uuid::new_v4();
    client
        .store
        .sync_all(vec![RemoteTask::new(task_id, TaskStatus::Todo, 0)])
        .await;

    let change = client.reconciler.submit(task_id, TaskStatus::Doing).await;

    // another client moved the same task while ours is unconfirmed
    client
        .handle
        .push(SocketEvent::Message(ServerMessage::TasksUpdated {
            changes: vec![TaskDelta::TaskUpdated {
                task: RemoteTask::new(task_id, TaskStatus::Done, 7),
            }],
        }));
    loop {
        if let ReconcilerEvent::RemoteApplied { tasks } = events.recv().await.unwrap() {
            // the push was suppressed by the pending local change
            assert_eq!(tasks, 0);
            break;
        }
    }
    let task = client.store.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Doing);
    assert!(task.pending);

    // once the mutation resolves, the pending flag clears
    loop {
        if let ReconcilerEvent::Confirmed { change_id, .. } = events.recv().await.unwrap() {
            assert_eq!(change_id, change.change_id);
            break;
        }
    }
    let task = client.store.task(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Doing);
    assert!(!task.pending);
}

#[tokio::test(start_paused = true)]
async fn abnormal_close_resubscribes_before_resuming_pushes() {
    let (first, first_handle) = fake_socket();
    let (second, second_handle) = fake_socket();
    let connector = Arc::new(FakeConnector::with_sockets(vec![first, second]));
    let (channel, mut inbound) =
        RealtimeChannel::new(connector, "ws://test/ws", "main", realtime_config());

    channel.connect();
    let mut status = channel.watch_status();
    status
        .wait_for(|s| *s == ChannelStatus::Connected)
        .await
        .unwrap();
    assert_eq!(
        first_handle.sent()[0],
        ClientMessage::Subscribe {
            board_id: "main".to_string(),
        }
    );

    // e.g. close code 1006
    first_handle.push(SocketEvent::Closed { normal: false });
    status
        .wait_for(|s| *s == ChannelStatus::Reconnecting)
        .await
        .unwrap();
    status
        .wait_for(|s| *s == ChannelStatus::Connected)
        .await
        .unwrap();

    assert_eq!(
        second_handle.sent()[0],
        ClientMessage::Subscribe {
            board_id: "main".to_string(),
        }
    );

    // pushes on the replacement connection are delivered
    second_handle.push(SocketEvent::Message(ServerMessage::ClientCountUpdated {
        count: 2,
    }));
    assert_eq!(
        inbound.recv().await.unwrap(),
        ServerMessage::ClientCountUpdated { count: 2 }
    );
    assert_eq!(channel.client_count(), 2);
}
