use tokio::sync::mpsc;
use weft_core::{Bus, PublishPolicy, RequestEvent};

// Helper to create a subscriber inbox pair
fn make_inbox(cap: usize) -> (
    mpsc::Sender<RequestEvent<String>>,
    mpsc::Receiver<RequestEvent<String>>,
) {
    mpsc::channel(cap)
}

#[tokio::test]
async fn duplicate_subscribe_is_a_noop() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);
    let (tx, _rx) = make_inbox(4);

    bus.subscribe("topic.dup", tx.clone());
    bus.subscribe("topic.dup", tx.clone());

    assert_eq!(bus.subscriber_count("topic.dup"), 1);

    // A distinct inbox on the same topic still gets in
    let (other, _other_rx) = make_inbox(4);
    bus.subscribe("topic.dup", other);
    assert_eq!(bus.subscriber_count("topic.dup"), 2);
}

#[tokio::test]
async fn unsubscribe_removes_exactly_one_and_preserves_order() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);
    let (tx_a, mut rx_a) = make_inbox(4);
    let (tx_b, mut rx_b) = make_inbox(4);
    let (tx_c, mut rx_c) = make_inbox(4);

    bus.subscribe("topic.order", tx_a);
    bus.subscribe("topic.order", tx_b.clone());
    bus.subscribe("topic.order", tx_c);

    bus.unsubscribe("topic.order", &tx_b);
    assert_eq!(bus.subscriber_count("topic.order"), 2);

    bus.publish("topic.order", "x".to_string(), None).await;

    // Remaining subscribers still receive, removed one does not
    assert_eq!(rx_a.recv().await.expect("a receives").body, "x");
    assert_eq!(rx_c.recv().await.expect("c receives").body, "x");
    assert!(rx_b.try_recv().is_err(), "b was unsubscribed");
}

#[tokio::test]
async fn unsubscribe_unknown_is_a_noop() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);
    let (member, _member_rx) = make_inbox(4);
    let (stranger, _stranger_rx) = make_inbox(4);

    bus.subscribe("topic.known", member);

    // Non-member inbox, then unknown topic: neither should change anything
    bus.unsubscribe("topic.known", &stranger);
    bus.unsubscribe("topic.missing", &stranger);

    assert_eq!(bus.subscriber_count("topic.known"), 1);
}

#[tokio::test]
async fn empty_topic_is_deleted_after_last_unsubscribe() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);
    let (tx, _rx) = make_inbox(4);

    bus.subscribe("topic.transient", tx.clone());
    bus.unsubscribe("topic.transient", &tx);

    assert_eq!(bus.subscriber_count("topic.transient"), 0);

    // Re-subscribing after deletion works from a clean slate
    bus.subscribe("topic.transient", tx);
    assert_eq!(bus.subscriber_count("topic.transient"), 1);
}

#[tokio::test]
async fn publish_fans_out_to_every_subscriber() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);
    let mut inboxes = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = make_inbox(4);
        bus.subscribe("topic.fanout", tx);
        inboxes.push(rx);
    }

    bus.publish("topic.fanout", "payload".to_string(), None).await;

    for rx in &mut inboxes {
        let event = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert_eq!(event.body, "payload");
        assert!(event.is_fire_and_forget());
        // Exactly one event per inbox
        assert!(rx.try_recv().is_err());
    }

    let stats = bus.stats("topic.fanout").expect("stats recorded");
    assert_eq!(stats.published, 1);
    assert_eq!(stats.delivered, 3);
    assert_eq!(stats.dropped, 0);
}

#[tokio::test]
async fn json_payloads_flow_and_stats_serialize() {
    use serde_json::{json, Value};

    let bus: Bus<Value> = Bus::new(PublishPolicy::Block);
    let (tx, mut rx) = mpsc::channel::<RequestEvent<Value>>(4);
    bus.subscribe("topic.json", tx);

    let payload = json!({ "kind": "order", "id": 17 });
    bus.publish("topic.json", payload.clone(), None).await;

    let event = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
        .await
        .expect("timeout")
        .expect("channel closed");
    assert_eq!(event.body, payload);

    // Stats are plain serde data, fit for an external dashboard
    let stats = bus.stats("topic.json").expect("stats recorded");
    let encoded = serde_json::to_value(&stats).expect("stats serialize");
    assert_eq!(encoded["published"], 1);
    assert_eq!(encoded["delivered"], 1);
    assert_eq!(encoded["dropped"], 0);
    assert_eq!(encoded["subscribers"], 1);
}

#[tokio::test]
async fn publish_without_subscribers_is_silent() {
    let bus: Bus<String> = Bus::new(PublishPolicy::Block);

    // Must return promptly and not create the topic
    bus.publish("topic.nobody", "shout".to_string(), None).await;

    assert_eq!(bus.subscriber_count("topic.nobody"), 0);
    let stats = bus.stats("topic.nobody").expect("publish was counted");
    assert_eq!(stats.published, 1);
    assert_eq!(stats.delivered, 0);
}
