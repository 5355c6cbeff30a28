// ============================================================================
// Delivery Protocol Tests
// ============================================================================
//
// Covers the send -> store -> push-or-queue -> acknowledge lifecycle:
// 1. Messages to offline users are queued and flushed in submit order
// 2. Delivery confirmations reach the sender exactly once per transition
// 3. mark-read is idempotent and only emits receipts for real transitions
// 4. View-once messages record each viewer exactly once
//
// ============================================================================

mod test_utils;

use courier::error::AppError;
use courier::message::{Message, MessageKind, ReceiptStatus, ServerEvent};
use test_utils::{build_context, drain_buffered, next_frame, subscribe, wait_for_frame};

fn msg(sender: &str, recipient: &str, body: &str) -> Message {
    Message::new(sender, recipient, body, MessageKind::Text)
}

#[tokio::test]
async fn test_offline_messages_flush_in_submit_order() {
    let ctx = build_context();

    for body in ["Message 1", "Message 2", "Message 3"] {
        let stored = ctx.engine.submit(msg("alice", "bob", body)).await.unwrap();
        assert!(stored.lifecycle.sent);
        assert!(!stored.lifecycle.delivered);
    }

    let mut bob = subscribe(&ctx, "bob").await;
    assert!(matches!(
        next_frame(&mut bob).await,
        ServerEvent::OnlineUsersList { .. }
    ));

    for expected in ["Message 1", "Message 2", "Message 3"] {
        match next_frame(&mut bob).await {
            ServerEvent::Message(m) => {
                assert_eq!(m.body, expected);
                assert_eq!(m.sender_id, "alice");
            }
            other => panic!("expected queued message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_delivery_confirmation_after_recipient_reconnects() {
    let ctx = build_context();
    let mut alice = subscribe(&ctx, "alice").await;
    drain_buffered(&mut alice);

    let stored = ctx.engine.submit(msg("alice", "bob", "hi")).await.unwrap();
    assert!(!stored.lifecycle.delivered);

    let _bob = subscribe(&ctx, "bob").await;

    let frame = wait_for_frame(&mut alice, |f| {
        matches!(f, ServerEvent::MessageStatus { .. })
    })
    .await;
    match frame {
        ServerEvent::MessageStatus { message_id, status } => {
            assert_eq!(message_id, stored.id);
            assert_eq!(status, ReceiptStatus::Delivered);
        }
        _ => unreachable!(),
    }

    let persisted = ctx.store.get(&stored.id).await.unwrap().unwrap();
    assert!(persisted.lifecycle.delivered);
}

#[tokio::test]
async fn test_online_delivery_confirms_within_submit() {
    let ctx = build_context();
    let mut alice = subscribe(&ctx, "alice").await;
    let mut bob = subscribe(&ctx, "bob").await;
    drain_buffered(&mut alice);
    drain_buffered(&mut bob);

    let stored = ctx.engine.submit(msg("alice", "bob", "hi")).await.unwrap();
    // Confirmation was generated synchronously within submit
    assert!(stored.lifecycle.delivered);
    assert!(stored.lifecycle.delivered_at.is_some());

    match next_frame(&mut bob).await {
        ServerEvent::Message(m) => assert_eq!(m.id, stored.id),
        other => panic!("expected message frame, got {:?}", other),
    }
    match next_frame(&mut alice).await {
        ServerEvent::MessageStatus { message_id, status } => {
            assert_eq!(message_id, stored.id);
            assert_eq!(status, ReceiptStatus::Delivered);
        }
        other => panic!("expected delivery receipt, got {:?}", other),
    }
}

#[tokio::test]
async fn test_second_connection_replaces_first() {
    let ctx = build_context();
    let mut first = subscribe(&ctx, "x").await;
    drain_buffered(&mut first);

    let _second = subscribe(&ctx, "x").await;

    assert_eq!(ctx.presence.list_online().await, vec!["x".to_string()]);
    match next_frame(&mut first).await {
        ServerEvent::ConnectionClosed { reason } => assert_eq!(reason, "replaced"),
        other => panic!("expected close frame, got {:?}", other),
    }
    assert!(first.recv().await.is_none());
}

#[tokio::test]
async fn test_mark_read_is_idempotent() {
    let ctx = build_context();
    let mut alice = subscribe(&ctx, "alice").await;
    let _bob = subscribe(&ctx, "bob").await;
    drain_buffered(&mut alice);

    let m1 = ctx.engine.submit(msg("alice", "bob", "one")).await.unwrap();
    let m2 = ctx.engine.submit(msg("alice", "bob", "two")).await.unwrap();
    // Consume the two delivery receipts
    for _ in 0..2 {
        wait_for_frame(&mut alice, |f| matches!(f, ServerEvent::MessageStatus { .. })).await;
    }

    let updated = ctx.engine.mark_read("bob", "alice").await.unwrap();
    assert_eq!(updated, 2);

    let mut read_ids = Vec::new();
    for _ in 0..2 {
        match next_frame(&mut alice).await {
            ServerEvent::MessageStatus { message_id, status } => {
                assert_eq!(status, ReceiptStatus::Read);
                read_ids.push(message_id);
            }
            other => panic!("expected read receipt, got {:?}", other),
        }
    }
    assert_eq!(read_ids, vec![m1.id.clone(), m2.id.clone()]);

    // Second call transitions nothing and emits nothing
    let updated = ctx.engine.mark_read("bob", "alice").await.unwrap();
    assert_eq!(updated, 0);
    assert!(alice.try_recv().is_err());
}

#[tokio::test]
async fn test_view_once_viewed_exactly_once() {
    let ctx = build_context();
    let mut alice = subscribe(&ctx, "alice").await;
    drain_buffered(&mut alice);

    let stored = ctx
        .engine
        .submit(msg("alice", "bob", "look").with_view_once())
        .await
        .unwrap();

    let viewed_at = ctx.engine.mark_viewed(&stored.id, "bob").await.unwrap();
    match wait_for_frame(&mut alice, |f| matches!(f, ServerEvent::MessageViewed { .. })).await {
        ServerEvent::MessageViewed {
            message_id,
            viewed_by,
            viewed_at: at,
        } => {
            assert_eq!(message_id, stored.id);
            assert_eq!(viewed_by, "bob");
            assert_eq!(at, viewed_at);
        }
        _ => unreachable!(),
    }

    let err = ctx.engine.mark_viewed(&stored.id, "bob").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyViewed(_)));
    assert!(alice.try_recv().is_err());
}

#[tokio::test]
async fn test_offline_scenario_end_to_end() {
    // User A (online) sends to User B (offline); B connects and the queued
    // message arrives before anything else; A then gets the delivery receipt.
    let ctx = build_context();
    let mut alice = subscribe(&ctx, "alice").await;
    drain_buffered(&mut alice);

    let stored = ctx.engine.submit(msg("alice", "bob", "hi")).await.unwrap();
    assert!(!stored.lifecycle.delivered);

    let mut bob = subscribe(&ctx, "bob").await;
    match next_frame(&mut bob).await {
        ServerEvent::OnlineUsersList { mut users } => {
            users.sort();
            assert_eq!(users, vec!["alice".to_string(), "bob".to_string()]);
        }
        other => panic!("expected online users snapshot, got {:?}", other),
    }
    match next_frame(&mut bob).await {
        ServerEvent::Message(m) => {
            assert_eq!(m.id, stored.id);
            assert_eq!(m.body, "hi");
        }
        other => panic!("expected queued message, got {:?}", other),
    }

    let frame = wait_for_frame(&mut alice, |f| {
        matches!(f, ServerEvent::MessageStatus { .. })
    })
    .await;
    match frame {
        ServerEvent::MessageStatus { message_id, status } => {
            assert_eq!(message_id, stored.id);
            assert_eq!(status, ReceiptStatus::Delivered);
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_delete_requires_sender() {
    let ctx = build_context();
    let stored = ctx.engine.submit(msg("alice", "bob", "oops")).await.unwrap();

    let err = ctx.engine.delete(&stored.id, "bob").await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    ctx.engine.delete(&stored.id, "alice").await.unwrap();
    assert!(ctx.store.get(&stored.id).await.unwrap().is_none());
}
