use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use murmur_db::Database;
use murmur_gateway::{ConnectionHandle, DeliveryStatus, Ledger, ProfileDirectory, Relay, RelayError};
use murmur_types::events::{GatewayEvent, SendMessage};
use murmur_types::models::{Message, UserRef};

struct Client {
    handle: ConnectionHandle,
    // keeps the weak handle upgradable, like the connection task does
    _tx: mpsc::UnboundedSender<GatewayEvent>,
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl Client {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: ConnectionHandle::new(Uuid::new_v4(), &tx),
            _tx: tx,
            rx,
        }
    }

    fn drain(&mut self) -> Vec<GatewayEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn db_relay() -> (Relay, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    (Relay::with_database(db.clone()), db)
}

fn msg(sender: &str, receiver: &str, content: &str) -> SendMessage {
    SendMessage {
        sender: sender.into(),
        receiver: receiver.into(),
        content: content.into(),
    }
}

struct UnavailableLedger {
    attempts: AtomicUsize,
}

impl Ledger for UnavailableLedger {
    fn append(&self, _msg: &Message) -> Result<Uuid> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(anyhow!("database is locked"))
    }

    fn find_conversation(&self, _a: &str, _b: &str, _since: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        Err(anyhow!("database is locked"))
    }

    fn delete_conversation(&self, _a: &str, _b: &str) -> Result<usize> {
        Err(anyhow!("database is locked"))
    }
}

struct BrokenProfiles;

impl ProfileDirectory for BrokenProfiles {
    fn display_name(&self, _user_id: &str) -> Result<Option<String>> {
        Err(anyhow!("directory unreachable"))
    }
}

#[tokio::test]
async fn both_online_receive_identical_payload() {
    let (relay, _db) = db_relay();
    let mut a = Client::new();
    let mut b = Client::new();
    relay.register("u1", a.handle.clone());
    relay.register("u2", b.handle.clone());

    let report = relay.send(msg("u1", "u2", "hi")).await.unwrap();
    assert_eq!(report.receiver, DeliveryStatus::Delivered);
    assert_eq!(report.sender_echo, DeliveryStatus::Delivered);

    let to_b = b.drain();
    let to_a = a.drain();
    assert_eq!(to_b.len(), 1);
    assert_eq!(to_a, to_b);

    let GatewayEvent::ReceiveMessage(payload) = &to_b[0];
    assert_eq!(payload.sender, UserRef::new("u1"));
    assert_eq!(payload.receiver, UserRef::new("u2"));
    assert_eq!(payload.content, "hi");
    assert_eq!(payload.id, report.message.id);
}

#[tokio::test]
async fn delivered_messages_are_in_the_ledger() {
    let (relay, db) = db_relay();
    let mut b = Client::new();
    relay.register("u2", b.handle.clone());

    relay.send(msg("u1", "u2", "first")).await.unwrap();
    relay.send(msg("u1", "u2", "second")).await.unwrap();

    let stored = db.find_conversation("u1", "u2", None).unwrap();
    for event in b.drain() {
        let GatewayEvent::ReceiveMessage(payload) = event;
        let record = stored.iter().find(|m| m.id == payload.id).expect("delivered but not persisted");
        assert_eq!(record.sender, payload.sender.id);
        assert_eq!(record.receiver, payload.receiver.id);
        assert_eq!(record.content, payload.content);
        assert_eq!(record.created_at.timestamp_micros(), payload.timestamp.timestamp_micros());
    }
}

#[tokio::test]
async fn offline_receiver_still_persists_and_echoes() {
    let (relay, db) = db_relay();
    let mut a = Client::new();
    relay.register("u1", a.handle.clone());

    let report = relay.send(msg("u1", "u2", "hi")).await.unwrap();
    assert_eq!(report.receiver, DeliveryStatus::Offline);
    assert_eq!(report.sender_echo, DeliveryStatus::Delivered);
    assert_eq!(a.drain().len(), 1);

    let history = db.find_conversation("u1", "u2", None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi");
}

#[tokio::test]
async fn nobody_online_is_not_an_error() {
    let (relay, db) = db_relay();

    let report = relay.send(msg("u1", "u2", "hi")).await.unwrap();
    assert_eq!(report.receiver, DeliveryStatus::Offline);
    assert_eq!(report.sender_echo, DeliveryStatus::Offline);
    assert_eq!(db.find_conversation("u2", "u1", None).unwrap().len(), 1);
}

#[tokio::test]
async fn only_latest_registration_receives() {
    let (relay, _db) = db_relay();
    let mut h1 = Client::new();
    let mut h2 = Client::new();
    relay.register("u1", h1.handle.clone());
    relay.register("u1", h2.handle.clone());

    relay.send(msg("u2", "u1", "hello")).await.unwrap();

    assert!(h1.drain().is_empty());
    assert_eq!(h2.drain().len(), 1);
}

#[tokio::test]
async fn closed_receiver_does_not_block_sender_echo() {
    let (relay, db) = db_relay();
    let mut a = Client::new();
    let b = Client::new();
    relay.register("u1", a.handle.clone());
    relay.register("u2", b.handle.clone());

    // B's transport died without the disconnect being processed yet.
    drop(b);

    let report = relay.send(msg("u1", "u2", "are you there")).await.unwrap();
    assert_eq!(report.receiver, DeliveryStatus::Closed);
    assert_eq!(report.sender_echo, DeliveryStatus::Delivered);
    assert_eq!(a.drain().len(), 1);
    assert_eq!(db.find_conversation("u1", "u2", None).unwrap().len(), 1);
}

#[tokio::test]
async fn persistence_failure_aborts_before_delivery() {
    let ledger = Arc::new(UnavailableLedger { attempts: AtomicUsize::new(0) });
    let relay = Relay::new(ledger.clone(), Arc::new(BrokenProfiles));
    let mut a = Client::new();
    let mut b = Client::new();
    relay.register("u1", a.handle.clone());
    relay.register("u2", b.handle.clone());

    let err = relay.send(msg("u1", "u2", "lost")).await.unwrap_err();
    assert!(matches!(err, RelayError::Persist(_)));
    assert_eq!(ledger.attempts.load(Ordering::SeqCst), 1);

    assert!(a.drain().is_empty());
    assert!(b.drain().is_empty());
    // the relay keeps serving after a failed send
    assert!(relay.presence().is_online("u1"));
}

#[tokio::test]
async fn profile_failure_degrades_to_raw_id() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let relay = Relay::new(db.clone(), Arc::new(BrokenProfiles));
    let mut b = Client::new();
    relay.register("u2", b.handle.clone());

    let report = relay.send(msg("u1", "u2", "hi")).await.unwrap();
    assert_eq!(report.message.sender_name.as_deref(), Some("u1"));

    let events = b.drain();
    let GatewayEvent::ReceiveMessage(payload) = &events[0];
    assert_eq!(payload.sender_name.as_deref(), Some("u1"));
}

#[tokio::test]
async fn disconnect_stops_delivery() {
    let (relay, _db) = db_relay();
    let mut b = Client::new();
    relay.register("u2", b.handle.clone());
    relay.disconnect(b.handle.conn_id());

    let report = relay.send(msg("u1", "u2", "hi")).await.unwrap();
    assert_eq!(report.receiver, DeliveryStatus::Offline);
    assert!(b.drain().is_empty());

    // a second disconnect of the same handle is a no-op
    relay.disconnect(b.handle.conn_id());
    assert!(relay.presence().is_empty());
}

#[tokio::test]
async fn conversation_is_symmetric_through_the_ledger() {
    let (relay, _db) = db_relay();
    relay.send(msg("u1", "u2", "one")).await.unwrap();
    relay.send(msg("u2", "u1", "two")).await.unwrap();
    relay.send(msg("u1", "u2", "three")).await.unwrap();

    let ab = relay.ledger().find_conversation("u1", "u2", None).unwrap();
    let ba = relay.ledger().find_conversation("u2", "u1", None).unwrap();
    assert_eq!(ab, ba);
    let contents: Vec<_> = ab.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["one", "two", "three"]);
}

#[tokio::test]
async fn delete_conversation_then_delete_again() {
    let (relay, _db) = db_relay();
    relay.send(msg("u1", "u2", "one")).await.unwrap();
    relay.send(msg("u2", "u1", "two")).await.unwrap();

    assert_eq!(relay.ledger().delete_conversation("u1", "u2").unwrap(), 2);
    assert!(relay.ledger().find_conversation("u1", "u2", None).unwrap().is_empty());
    assert_eq!(relay.ledger().delete_conversation("u2", "u1").unwrap(), 0);
}

#[tokio::test]
async fn concurrent_senders_all_persist() {
    let (relay, db) = db_relay();
    let mut b = Client::new();
    relay.register("u2", b.handle.clone());

    let mut tasks = Vec::new();
    for i in 0..20 {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            relay.send(msg(&format!("sender-{}", i % 4), "u2", "ping")).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(b.drain().len(), 20);
    let total: usize = (0..4)
        .map(|i| db.find_conversation(&format!("sender-{}", i), "u2", None).unwrap().len())
        .sum();
    assert_eq!(total, 20);
}
