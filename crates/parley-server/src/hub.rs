//! The message router.
//!
//! A single serial loop multiplexes three inputs: Join and Leave control
//! channels and the transport stream. Routing a frame means building the
//! durable record, persisting it, then fanning the serialized response out
//! to every connected recipient's outbound queue and appending it to the
//! cached conversation list.
//!
//! The registry is the only cross-task shared structure: the hub mutates it
//! on Join/Leave and the logout handler reads it. The mutex is never held
//! across an await; fan-out enqueues are non-blocking `try_send`s performed
//! under the lock so the recipient set matches membership at dispatch time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use parley_cache::Cache;
use parley_shared::constants::{GOODBYE_TEXT, WELCOME_TEXT, WIRE_TIME_FORMAT};
use parley_shared::{
    normalize_avatar, AvData, AvResponse, ChatResponse, IdGenerator, InboundMessage, Payload,
};
use parley_store::{MessageStatus, MessageStore, StoredMessage};

use crate::client::{Client, OutFrame};
use crate::transport::Transport;

/// Connected clients by user id. Shared between the hub loop and the HTTP
/// logout handler.
pub type Registry = Arc<Mutex<HashMap<String, Arc<Client>>>>;

/// Control surface handed to admission and the HTTP handlers.
#[derive(Clone)]
pub struct HubHandle {
    registry: Registry,
    join_tx: mpsc::Sender<Arc<Client>>,
    leave_tx: mpsc::Sender<Arc<Client>>,
}

impl HubHandle {
    /// Signal Join for a freshly admitted client.
    pub async fn register(&self, client: Arc<Client>) {
        if self.join_tx.send(client).await.is_err() {
            warn!("hub is gone, dropping join");
        }
    }

    pub fn lookup(&self, uuid: &str) -> Option<Arc<Client>> {
        self.registry.lock().expect("registry mutex poisoned").get(uuid).cloned()
    }

    /// Tear down a client by id: signal Leave, close the socket and the
    /// queues. Succeeds for ids that are not registered.
    pub async fn logout(&self, owner_id: &str) {
        let Some(client) = self.lookup(owner_id) else {
            debug!(owner = %owner_id, "logout for unregistered client");
            return;
        };

        if self.leave_tx.send(client.clone()).await.is_err() {
            warn!("hub is gone, dropping leave");
        }
        client.close_socket().await;
        client.close_outbound();
    }
}

pub struct Hub {
    registry: Registry,
    join_rx: mpsc::Receiver<Arc<Client>>,
    leave_rx: mpsc::Receiver<Arc<Client>>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn MessageStore>,
    cache: Arc<dyn Cache>,
    ids: IdGenerator,
    cache_ttl: Duration,
}

impl Hub {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn MessageStore>,
        cache: Arc<dyn Cache>,
        ids: IdGenerator,
        cache_ttl: Duration,
        channel_size: usize,
    ) -> (Self, HubHandle) {
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let (join_tx, join_rx) = mpsc::channel(channel_size);
        let (leave_tx, leave_rx) = mpsc::channel(channel_size);

        let handle = HubHandle {
            registry: registry.clone(),
            join_tx,
            leave_tx,
        };
        let hub = Self {
            registry,
            join_rx,
            leave_rx,
            transport,
            store,
            cache,
            ids,
            cache_ttl,
        };
        (hub, handle)
    }

    /// Serial router loop. Exits when the transport shuts down and drains.
    pub async fn run(mut self) {
        info!("hub router started");
        let transport = Arc::clone(&self.transport);
        loop {
            tokio::select! {
                Some(client) = self.join_rx.recv() => self.handle_join(client).await,
                Some(client) = self.leave_rx.recv() => self.handle_leave(client).await,
                frame = transport.recv() => match frame {
                    Some(frame) => self.route(&frame).await,
                    None => break,
                },
            }
        }
        info!("hub router stopped");
    }

    async fn handle_join(&self, client: Arc<Client>) {
        let stale = {
            let mut clients = self.registry.lock().expect("registry mutex poisoned");
            clients.insert(client.uuid.clone(), client.clone())
        };
        if let Some(stale) = stale {
            info!(client = %client.uuid, "replacing stale registration");
            stale.close_outbound();
        }

        debug!(client = %client.uuid, "client joined");
        client.send_control(WELCOME_TEXT).await;
    }

    async fn handle_leave(&self, client: Arc<Client>) {
        let removed = {
            let mut clients = self.registry.lock().expect("registry mutex poisoned");
            match clients.get(&client.uuid) {
                // Only remove the entry if it still refers to this client;
                // a replacing Join must not be evicted by a stale Leave.
                Some(current) if Arc::ptr_eq(current, &client) => {
                    clients.remove(&client.uuid);
                    true
                }
                _ => false,
            }
        };

        if removed {
            info!(client = %client.uuid, "client left");
        }
        client.send_control(GOODBYE_TEXT).await;
        client.close_outbound();
    }

    async fn route(&self, raw: &[u8]) {
        let inbound = match InboundMessage::decode(raw) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match &inbound.payload {
            Payload::Text { .. } | Payload::File { .. } => self.route_chat(&inbound).await,
            Payload::AudioOrVideo { av_data } => self.route_signalling(&inbound, av_data).await,
        }
    }

    /// Text and file messages: persist, fan out, update the cached
    /// conversation list.
    async fn route_chat(&self, inbound: &InboundMessage) {
        let record = self.build_record(inbound);
        if let Err(e) = self.store.write_message(&record) {
            error!(uuid = %record.uuid, error = %e, "message write failed, dropping delivery");
            return;
        }

        let response = chat_response(&record);
        let payload = match serde_json::to_vec(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!(uuid = %record.uuid, error = %e, "response encoding failed");
                return;
            }
        };

        match record.receive_id.as_bytes().first() {
            Some(b'U') => {
                self.deliver_private(&record, payload, true);
                let key = format!("message_list_{}_{}", record.send_id, record.receive_id);
                self.append_to_cache(&key, &response).await;
            }
            Some(b'G') => {
                let members = match self.store.load_group_members(&record.receive_id) {
                    Ok(members) => members,
                    Err(e) => {
                        error!(
                            group = %record.receive_id,
                            error = %e,
                            "group member lookup failed, dropping fan-out"
                        );
                        return;
                    }
                };
                self.deliver_group(&record, &members, payload);
                let key = format!("group_messagelist_{}", record.receive_id);
                self.append_to_cache(&key, &response).await;
            }
            _ => {
                warn!(
                    receive_id = %record.receive_id,
                    "unroutable receive id, message stored without delivery"
                );
            }
        }
    }

    /// Call signalling: persisted only for call events, delivered to the
    /// peer without a sender echo, never written through to the cache.
    async fn route_signalling(&self, inbound: &InboundMessage, av_data: &str) {
        let av = match AvData::parse(av_data) {
            Ok(av) => av,
            Err(e) => {
                warn!(error = %e, "dropping frame with invalid avData");
                return;
            }
        };

        let record = self.build_record(inbound);
        if av.is_call_event() {
            if let Err(e) = self.store.write_message(&record) {
                error!(uuid = %record.uuid, error = %e, "call event write failed, dropping delivery");
                return;
            }
        }

        match record.receive_id.as_bytes().first() {
            Some(b'U') => {
                let response = AvResponse {
                    base: chat_response(&record),
                    av_data: av_data.to_string(),
                };
                let payload = match serde_json::to_vec(&response) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(uuid = %record.uuid, error = %e, "response encoding failed");
                        return;
                    }
                };
                // No echo: a reflected start_call would ring the caller too.
                self.deliver_private(&record, payload, false);
            }
            Some(b'G') => {
                warn!(
                    group = %record.receive_id,
                    "call signalling to groups is not supported, dropping"
                );
            }
            _ => {
                warn!(receive_id = %record.receive_id, "unroutable receive id for call signalling");
            }
        }
    }

    /// Assign a fresh uuid and creation time and apply the per-kind field
    /// rules from the wire contract.
    fn build_record(&self, inbound: &InboundMessage) -> StoredMessage {
        let envelope = &inbound.envelope;
        let avatar = normalize_avatar(&envelope.send_avatar);
        if avatar.is_empty() && !envelope.send_avatar.is_empty() {
            warn!(avatar = %envelope.send_avatar, "avatar path without /static/ segment, storing empty");
        }

        let (content, url, file_size, file_type, file_name, av_data) = match &inbound.payload {
            Payload::Text { content } => (
                content.clone(),
                String::new(),
                "0B".to_string(),
                String::new(),
                String::new(),
                String::new(),
            ),
            Payload::File {
                url,
                file_size,
                file_type,
                file_name,
            } => (
                String::new(),
                url.clone(),
                file_size.clone(),
                file_type.clone(),
                file_name.clone(),
                String::new(),
            ),
            Payload::AudioOrVideo { av_data } => (
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                av_data.clone(),
            ),
        };

        StoredMessage {
            uuid: self.ids.message_id(),
            session_id: envelope.session_id.clone(),
            kind: inbound.kind(),
            content,
            url,
            send_id: envelope.send_id.clone(),
            send_name: envelope.send_name.clone(),
            send_avatar: avatar,
            receive_id: envelope.receive_id.clone(),
            file_size,
            file_type,
            file_name,
            status: MessageStatus::Unsent,
            created_at: self.ids.now(),
            av_data,
        }
    }

    /// Enqueue to the addressed user and, for chat messages, echo to the
    /// sender. A self-addressed message gets a single copy.
    fn deliver_private(&self, record: &StoredMessage, payload: Vec<u8>, echo_sender: bool) {
        let clients = self.registry.lock().expect("registry mutex poisoned");

        if let Some(receiver) = clients.get(&record.receive_id) {
            enqueue_or_drop(
                receiver,
                OutFrame {
                    payload: payload.clone(),
                    uuid: record.uuid.clone(),
                },
            );
        }

        if echo_sender && record.send_id != record.receive_id {
            if let Some(sender) = clients.get(&record.send_id) {
                enqueue_or_drop(
                    sender,
                    OutFrame {
                        payload,
                        uuid: record.uuid.clone(),
                    },
                );
            }
        }
    }

    /// Enqueue to every connected member except the sender, then exactly
    /// one echo to the sender.
    fn deliver_group(&self, record: &StoredMessage, members: &[String], payload: Vec<u8>) {
        let clients = self.registry.lock().expect("registry mutex poisoned");

        let mut seen = HashSet::new();
        for member in members {
            if member == &record.send_id || !seen.insert(member.as_str()) {
                continue;
            }
            if let Some(client) = clients.get(member) {
                enqueue_or_drop(
                    client,
                    OutFrame {
                        payload: payload.clone(),
                        uuid: record.uuid.clone(),
                    },
                );
            }
        }

        if let Some(sender) = clients.get(&record.send_id) {
            enqueue_or_drop(
                sender,
                OutFrame {
                    payload,
                    uuid: record.uuid.clone(),
                },
            );
        }
    }

    /// Write-through append: if the conversation list is cached, append the
    /// response and refresh the TTL. A cold list stays cold — the read path
    /// rebuilds it from the store. Cache trouble never blocks delivery.
    async fn append_to_cache(&self, key: &str, response: &ChatResponse) {
        let cached = match self.cache.get(key).await {
            Ok(Some(cached)) => cached,
            Ok(None) => return,
            Err(e) => {
                warn!(key, error = %e, "cache read failed");
                return;
            }
        };

        let mut list: Vec<ChatResponse> = match serde_json::from_str(&cached) {
            Ok(list) => list,
            Err(e) => {
                warn!(key, error = %e, "cached conversation list is corrupt, leaving it");
                return;
            }
        };
        list.push(response.clone());

        let encoded = match serde_json::to_string(&list) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key, error = %e, "conversation list encoding failed");
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, &encoded, self.cache_ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

fn chat_response(record: &StoredMessage) -> ChatResponse {
    ChatResponse {
        send_id: record.send_id.clone(),
        send_name: record.send_name.clone(),
        send_avatar: record.send_avatar.clone(),
        receive_id: record.receive_id.clone(),
        kind: record.kind,
        content: record.content.clone(),
        url: record.url.clone(),
        file_size: record.file_size.clone(),
        file_name: record.file_name.clone(),
        file_type: record.file_type.clone(),
        created_at: record.created_at.format(WIRE_TIME_FORMAT).to_string(),
    }
}

fn enqueue_or_drop(client: &Client, frame: OutFrame) {
    if !client.enqueue(frame) {
        debug!(client = %client.uuid, "outbound queue full or closed, dropping delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use serde_json::json;
    use tokio::sync::mpsc::Receiver;

    use parley_cache::MemoryCache;
    use parley_shared::MessageKind;

    use crate::client::test_support::{RecordingSink, RecordingStore};
    use crate::transport::inproc::InProcTransport;

    struct Fixture {
        hub: Hub,
        store: Arc<RecordingStore>,
        cache: Arc<MemoryCache>,
    }

    fn fixture(store: RecordingStore) -> Fixture {
        let store = Arc::new(store);
        let cache = Arc::new(MemoryCache::new());
        let transport = Arc::new(InProcTransport::new(16));
        let (hub, _handle) = Hub::new(
            transport,
            store.clone(),
            cache.clone(),
            IdGenerator::new(),
            Duration::from_secs(60),
            16,
        );
        Fixture { hub, store, cache }
    }

    async fn connect(hub: &Hub, uuid: &str) -> (Arc<RecordingSink>, Receiver<OutFrame>) {
        let sink = Arc::new(RecordingSink::default());
        let (client, rx) = Client::new(uuid, sink.clone(), 16);
        hub.handle_join(client).await;
        (sink, rx)
    }

    fn text_frame(send_id: &str, receive_id: &str, content: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "sessionId": "S10000000001",
            "sendId": send_id,
            "sendName": "alice",
            "sendAvatar": "https://x/static/a.png",
            "receiveId": receive_id,
            "type": 0,
            "content": content,
        }))
        .unwrap()
    }

    fn av_frame(send_id: &str, receive_id: &str, av_data: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "sessionId": "S10000000001",
            "sendId": send_id,
            "sendName": "alice",
            "sendAvatar": "https://x/static/a.png",
            "receiveId": receive_id,
            "type": 3,
            "avData": av_data,
        }))
        .unwrap()
    }

    fn drain(rx: &mut Receiver<OutFrame>) -> Vec<OutFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn decode_chat(frame: &OutFrame) -> ChatResponse {
        serde_json::from_slice(&frame.payload).unwrap()
    }

    #[tokio::test]
    async fn join_sends_welcome_directly() {
        let f = fixture(RecordingStore::default());
        let (sink, _rx) = connect(&f.hub, "U001").await;

        assert_eq!(sink.frames(), vec![WELCOME_TEXT.to_string()]);
    }

    #[tokio::test]
    async fn private_text_persists_then_delivers_both_ways() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        f.hub.route(&text_frame("U001", "U002", "hi")).await;

        let stored = f.store.messages();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].uuid.starts_with('M'));
        assert_eq!(stored[0].send_avatar, "/static/a.png");
        assert_eq!(stored[0].file_size, "0B");

        let to_receiver = drain(&mut rx2);
        let to_sender = drain(&mut rx1);
        assert_eq!(to_receiver.len(), 1);
        assert_eq!(to_sender.len(), 1);

        // Every delivered frame refers to the persisted record.
        assert_eq!(to_receiver[0].uuid, stored[0].uuid);
        assert_eq!(to_sender[0].uuid, stored[0].uuid);

        let response = decode_chat(&to_receiver[0]);
        assert_eq!(response.content, "hi");
        assert_eq!(response.send_avatar, "/static/a.png");
        assert_eq!(response.kind, MessageKind::Text);
    }

    #[tokio::test]
    async fn offline_receiver_still_persists() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;

        f.hub.route(&text_frame("U001", "U002", "hi")).await;

        assert_eq!(f.store.messages().len(), 1);
        // Sender echo still happens.
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    #[tokio::test]
    async fn store_failure_aborts_delivery() {
        let store = RecordingStore::default();
        store.fail_writes.store(true, Ordering::SeqCst);
        let f = fixture(store);
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        f.hub.route(&text_frame("U001", "U002", "hi")).await;

        assert!(f.store.messages().is_empty());
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn group_fanout_echoes_sender_once_and_skips_offline() {
        let f = fixture(RecordingStore::with_group(
            "G100",
            &["U001", "U002", "U003"],
        ));
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink3, mut rx3) = connect(&f.hub, "U003").await;

        f.hub.route(&text_frame("U001", "G100", "hey")).await;

        assert_eq!(f.store.messages().len(), 1);
        assert_eq!(drain(&mut rx1).len(), 1);
        assert_eq!(drain(&mut rx3).len(), 1);
    }

    #[tokio::test]
    async fn group_fanout_deduplicates_membership() {
        let f = fixture(RecordingStore::with_group(
            "G100",
            &["U002", "U002", "U001"],
        ));
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        f.hub.route(&text_frame("U001", "G100", "hey")).await;

        // At most one frame per uuid per connection.
        assert_eq!(drain(&mut rx2).len(), 1);
        assert_eq!(drain(&mut rx1).len(), 1);
    }

    #[tokio::test]
    async fn missing_group_drops_fanout_but_keeps_record() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;

        f.hub.route(&text_frame("U001", "G999", "hey")).await;

        assert_eq!(f.store.messages().len(), 1);
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn call_event_persists_without_sender_echo() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        let av = r#"{"messageId":"PROXY","type":"start_call"}"#;
        f.hub.route(&av_frame("U001", "U002", av)).await;

        let stored = f.store.messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, MessageKind::AudioOrVideo);
        assert_eq!(stored[0].av_data, av);

        let to_receiver = drain(&mut rx2);
        assert_eq!(to_receiver.len(), 1);
        let response: serde_json::Value = serde_json::from_slice(&to_receiver[0].payload).unwrap();
        assert_eq!(response["avData"], av);

        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn passthrough_signalling_skips_store() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        let av = r#"{"messageId":"U002","type":"candidate"}"#;
        f.hub.route(&av_frame("U001", "U002", av)).await;

        assert!(f.store.messages().is_empty());
        assert_eq!(drain(&mut rx2).len(), 1);
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn group_signalling_is_rejected() {
        let f = fixture(RecordingStore::with_group("G100", &["U001", "U002"]));
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;
        let (_sink2, mut rx2) = connect(&f.hub, "U002").await;

        let av = r#"{"messageId":"U002","type":"candidate"}"#;
        f.hub.route(&av_frame("U001", "G100", av)).await;

        assert!(f.store.messages().is_empty());
        assert!(drain(&mut rx1).is_empty());
        assert!(drain(&mut rx2).is_empty());
    }

    #[tokio::test]
    async fn undecodable_frame_is_dropped() {
        let f = fixture(RecordingStore::default());
        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;

        f.hub.route(b"not json").await;
        f.hub.route(br#"{"sendId":"U001","type":9}"#).await;

        assert!(f.store.messages().is_empty());
        assert!(drain(&mut rx1).is_empty());
    }

    #[tokio::test]
    async fn warm_cache_gets_the_new_response_appended() {
        let f = fixture(RecordingStore::default());
        let (_sink1, _rx1) = connect(&f.hub, "U001").await;

        let key = "message_list_U001_U002";
        f.cache.set_ex(key, "[]", Duration::from_secs(60)).await.unwrap();

        f.hub.route(&text_frame("U001", "U002", "first")).await;
        f.hub.route(&text_frame("U001", "U002", "second")).await;

        let cached = f.cache.get(key).await.unwrap().unwrap();
        let list: Vec<ChatResponse> = serde_json::from_str(&cached).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].content, "first");
        assert_eq!(list[1].content, "second");
    }

    #[tokio::test]
    async fn cold_cache_stays_cold() {
        let f = fixture(RecordingStore::default());
        let (_sink1, _rx1) = connect(&f.hub, "U001").await;

        f.hub.route(&text_frame("U001", "U002", "hi")).await;

        assert!(f
            .cache
            .get("message_list_U001_U002")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn signalling_never_touches_the_cache() {
        let f = fixture(RecordingStore::default());
        let (_sink1, _rx1) = connect(&f.hub, "U001").await;
        let (_sink2, _rx2) = connect(&f.hub, "U002").await;

        let key = "message_list_U001_U002";
        f.cache.set_ex(key, "[]", Duration::from_secs(60)).await.unwrap();

        let av = r#"{"messageId":"PROXY","type":"start_call"}"#;
        f.hub.route(&av_frame("U001", "U002", av)).await;

        assert_eq!(f.cache.get(key).await.unwrap().unwrap(), "[]");
    }

    #[tokio::test]
    async fn replacing_join_closes_the_stale_queue() {
        let f = fixture(RecordingStore::default());
        let (_sink_old, mut rx_old) = connect(&f.hub, "U001").await;
        let (_sink_new, mut rx_new) = connect(&f.hub, "U001").await;
        let (_sink2, _rx2) = connect(&f.hub, "U002").await;

        f.hub.route(&text_frame("U002", "U001", "hello")).await;

        assert!(drain(&mut rx_old).is_empty());
        assert_eq!(drain(&mut rx_new).len(), 1);
    }

    #[tokio::test]
    async fn leave_removes_and_says_goodbye() {
        let f = fixture(RecordingStore::default());
        let sink = Arc::new(RecordingSink::default());
        let (client, mut rx) = Client::new("U001", sink.clone(), 16);
        f.hub.handle_join(client.clone()).await;

        f.hub.handle_leave(client).await;

        assert_eq!(
            sink.frames(),
            vec![WELCOME_TEXT.to_string(), GOODBYE_TEXT.to_string()]
        );
        assert!(f.hub.registry.lock().unwrap().is_empty());

        // The outbound queue is closed; later fan-out drops silently.
        f.hub.route(&text_frame("U002", "U001", "late")).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn stale_leave_does_not_evict_replacement() {
        let f = fixture(RecordingStore::default());
        let sink_old = Arc::new(RecordingSink::default());
        let (old, _rx_old) = Client::new("U001", sink_old, 16);
        f.hub.handle_join(old.clone()).await;

        let (_sink_new, mut rx_new) = connect(&f.hub, "U001").await;

        // The first connection's Leave arrives after the replacement.
        f.hub.handle_leave(old).await;

        let (_sink2, _rx2) = connect(&f.hub, "U002").await;
        f.hub.route(&text_frame("U002", "U001", "hello")).await;
        assert_eq!(drain(&mut rx_new).len(), 1);
    }

    #[tokio::test]
    async fn full_outbound_queue_drops_only_that_recipient() {
        let f = fixture(RecordingStore::default());

        let sink = Arc::new(RecordingSink::default());
        let (receiver, mut rx_receiver) = Client::new("U002", sink, 1);
        f.hub.handle_join(receiver.clone()).await;
        assert!(receiver.enqueue(OutFrame {
            payload: b"{}".to_vec(),
            uuid: "M0".into(),
        }));

        let (_sink1, mut rx1) = connect(&f.hub, "U001").await;

        f.hub.route(&text_frame("U001", "U002", "hi")).await;

        // Receiver queue was full: only the pre-existing frame is there.
        assert_eq!(drain(&mut rx_receiver).len(), 1);
        // The sender echo is unaffected.
        assert_eq!(drain(&mut rx1).len(), 1);
        // The message is still persisted.
        assert_eq!(f.store.messages().len(), 1);
    }
}
