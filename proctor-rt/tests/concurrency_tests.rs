//! Concurrent ingestion, ordering and room isolation

mod helpers;

use futures::future::join_all;
use helpers::{drain, event_types, Harness, Participants};
use chrono::Utc;
use proctor_common::events::{AccessDenialReason, ProctorEvent, SessionStatus};
use proctor_rt::connection::Connection;
use proctor_rt::ingest::DetectionInput;
use proctor_rt::session::{Delivery, RegistryTimeouts};
use proctor_rt::store::DurableStore;
use proctor_rt::Error;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn detection(session_id: Uuid, kind: &str, confidence: f64) -> DetectionInput {
    DetectionInput {
        session_id,
        kind: kind.to_string(),
        confidence,
        timestamp: None,
        details: None,
    }
}

/// (kind, confidence) pairs whose deductions sum to 48.5
const MIXED: [(&str, f64); 8] = [
    ("phone-detected", 0.85),     // high 12
    ("face-absent", 0.5),         // low 2
    ("focus-lost", 0.3),          // low 0.5
    ("book-detected", 0.7),       // medium 5
    ("multiple-faces", 0.9),      // high 10
    ("audio-violation", 0.65),    // medium 3
    ("device-detected", 0.99),    // critical 15
    ("drowsiness-detected", 0.2), // low 1
];

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_lose_no_updates() {
    let h = Harness::new();
    let p = Participants::new();
    let (session, _candidate_conn, _rx) = h.live_session(&p).await;

    // Several producers on the same session, each with its own connection
    let mut producers = Vec::new();
    for _ in 0..4 {
        let (conn, rx, _) = h
            .service
            .join(&Harness::token(&p.candidate), session.id)
            .await
            .unwrap();
        producers.push((conn, rx));
    }

    let mut tasks = Vec::new();
    for (conn, _) in &producers {
        for (kind, confidence) in MIXED {
            let service = Arc::clone(&h.service);
            let principal = p.candidate;
            let conn_id = conn.id;
            let input = detection(session.id, kind, confidence);
            tasks.push(tokio::spawn(async move {
                service.ingest(&principal, &conn_id, input).await
            }));
        }
    }

    // 32 detections worth 194 points in total, so the floor is reached
    let results: Vec<_> = join_all(tasks).await;
    let accepted: Vec<_> = results
        .into_iter()
        .map(|r| r.expect("task panicked").expect("ingest failed"))
        .collect();
    assert_eq!(accepted.len(), 32);

    let final_score = h.service.get_session(session.id, &p.interviewer).await.unwrap().integrity_score;
    assert_eq!(final_score, 0.0);
    assert_eq!(h.store.event_count(session.id).await, 32);

    // Reported deductions are effective amounts, so they add up to exactly 100
    let total_deducted: f64 = accepted.iter().map(|a| a.deduction).sum();
    assert_eq!(total_deducted, 100.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_final_score_depends_only_on_multiset() {
    let h = Harness::new();
    let p = Participants::new();
    let (session, conn, _rx) = h.live_session(&p).await;

    let tasks: Vec<_> = MIXED
        .iter()
        .map(|(kind, confidence)| {
            let service = Arc::clone(&h.service);
            let principal = p.candidate;
            let conn_id = conn.id;
            let input = detection(session.id, kind, *confidence);
            tokio::spawn(async move { service.ingest(&principal, &conn_id, input).await })
        })
        .collect();
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    let concurrent = h.service.get_session(session.id, &p.interviewer).await.unwrap();
    assert_eq!(concurrent.integrity_score, 51.5);

    // The same multiset in reverse order, sequentially, on a fresh session
    let h2 = Harness::new();
    let p2 = Participants::new();
    let (session2, conn2, _rx2) = h2.live_session(&p2).await;
    for (kind, confidence) in MIXED.iter().rev() {
        h2.service
            .ingest(&p2.candidate, &conn2.id, detection(session2.id, kind, *confidence))
            .await
            .unwrap();
    }
    let sequential = h2.service.get_session(session2.id, &p2.interviewer).await.unwrap();
    assert_eq!(sequential.integrity_score, concurrent.integrity_score);
}

#[tokio::test]
async fn test_floor_reached_exactly() {
    let h = Harness::new();
    let p = Participants::new();
    let (session, conn, _rx) = h.live_session(&p).await;

    let mut deductions = Vec::new();
    for _ in 0..5 {
        let accepted = h
            .service
            .ingest(&p.candidate, &conn.id, detection(session.id, "phone-detected", 0.97))
            .await
            .unwrap();
        deductions.push(accepted.deduction);
    }
    let accepted = h
        .service
        .ingest(&p.candidate, &conn.id, detection(session.id, "focus-lost", 0.1))
        .await
        .unwrap();

    assert_eq!(deductions, vec![20.0, 20.0, 20.0, 20.0, 20.0]);
    assert_eq!(accepted.deduction, 0.0);
    assert_eq!(accepted.resulting_score, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_room_isolation_across_many_sessions() {
    let h = Harness::new();

    let mut rooms = Vec::new();
    for _ in 0..10 {
        let p = Participants::new();
        let (session, conn, candidate_rx) = h.live_session(&p).await;
        let (_observer, observer_rx, _) = h
            .service
            .join(&Harness::token(&p.interviewer), session.id)
            .await
            .unwrap();
        rooms.push((p, session, conn, candidate_rx, observer_rx));
    }
    for (_, _, _, candidate_rx, observer_rx) in rooms.iter_mut() {
        drain(candidate_rx);
        drain(observer_rx);
    }

    let mut tasks = Vec::new();
    for (p, session, conn, _, _) in &rooms {
        for (kind, confidence) in MIXED {
            let service = Arc::clone(&h.service);
            let principal = p.candidate;
            let conn_id = conn.id;
            let input = detection(session.id, kind, confidence);
            tasks.push(tokio::spawn(async move {
                service.ingest(&principal, &conn_id, input).await
            }));
        }
    }
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    for (_, session, _, candidate_rx, observer_rx) in rooms.iter_mut() {
        for rx in [candidate_rx, observer_rx] {
            let alerts: Vec<_> = drain(rx)
                .into_iter()
                .filter(|e| matches!(e, ProctorEvent::DetectionAlert { .. }))
                .collect();
            assert_eq!(alerts.len(), MIXED.len());
            assert!(alerts.iter().all(|e| e.session_id() == session.id));
        }
    }
}

#[tokio::test]
async fn test_sessions_do_not_block_each_other() {
    let h = Harness::with_timeouts(RegistryTimeouts {
        lock: Duration::from_millis(100),
        store: Duration::from_secs(1),
    });
    let pa = Participants::new();
    let pb = Participants::new();
    let (a, conn_a, _rx_a) = h.live_session(&pa).await;
    let (b, conn_b, _rx_b) = h.live_session(&pb).await;

    let _held = h.service.registry().lock(a.id).await.unwrap();

    let accepted = h
        .service
        .ingest(&pb.candidate, &conn_b.id, detection(b.id, "focus-lost", 0.3))
        .await
        .unwrap();
    assert_eq!(accepted.resulting_score, 99.5);

    let err = h
        .service
        .ingest(&pa.candidate, &conn_a.id, detection(a.id, "focus-lost", 0.3))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout("session lock")));
    assert_eq!(h.store.event_count(a.id).await, 0);
}

#[tokio::test]
async fn test_slow_connection_does_not_block_ingest() {
    let h = Harness::new();
    let p = Participants::new();
    let (session, conn, _candidate_rx) = h.live_session(&p).await;

    // An observer whose outbox holds a single message and is never drained
    let (observer, _observer_rx) = Connection::open(p.interviewer, 1);
    h.service.join_connection(&observer, session.id).await.unwrap();

    for _ in 0..20 {
        h.service
            .ingest(&p.candidate, &conn.id, detection(session.id, "focus-lost", 0.3))
            .await
            .unwrap();
    }
    assert_eq!(
        h.service.get_session(session.id, &p.interviewer).await.unwrap().integrity_score,
        90.0
    );
}

#[tokio::test]
async fn test_broadcast_reaches_only_target_room() {
    let h = Harness::new();
    let pa = Participants::new();
    let pb = Participants::new();
    let (a, _conn_a, mut candidate_a) = h.live_session(&pa).await;
    let (_observer_a, mut observer_a, _) = h
        .service
        .join(&Harness::token(&pa.interviewer), a.id)
        .await
        .unwrap();
    let (_b, _conn_b, mut candidate_b) = h.live_session(&pb).await;
    for rx in [&mut candidate_a, &mut observer_a, &mut candidate_b] {
        drain(rx);
    }

    let event = ProctorEvent::LifecycleChanged {
        session_id: a.id,
        status: SessionStatus::InProgress,
        timestamp: Utc::now(),
    };
    let delivery = h.service.registry().broadcast(a.id, event).await.unwrap();

    assert_eq!(delivery, Delivery { delivered: 2, dropped: 0 });
    for rx in [&mut candidate_a, &mut observer_a] {
        let received = drain(rx);
        assert_eq!(event_types(&received), vec!["LifecycleChanged"]);
        assert_eq!(received[0].session_id(), a.id);
    }
    assert!(drain(&mut candidate_b).is_empty());
}

#[tokio::test]
async fn test_session_ended_during_slow_load_stays_completed() {
    let origin = Harness::new();
    let p = Participants::new();
    let session = origin.schedule(&p).await;
    origin.service.start_session(session.id, &p.interviewer).await.unwrap();

    // A fresh registry over the same store, with nothing loaded yet
    let h = Harness::with_store(
        origin.store.clone(),
        origin.store.clone(),
        RegistryTimeouts::default(),
    );
    assert!(!h.service.registry().is_loaded(session.id).await);

    // The candidate's load reads the in-progress row, then stalls
    h.store.delay_next_load(Duration::from_millis(300));
    let service = Arc::clone(&h.service);
    let token = Harness::token(&p.candidate);
    let candidate = tokio::spawn(async move { service.join(&token, session.id).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Meanwhile the interviewer joins, ends the session and leaves
    let (observer, _observer_rx, _) = h
        .service
        .join(&Harness::token(&p.interviewer), session.id)
        .await
        .unwrap();
    let ended = h.service.end_session(session.id, &p.interviewer).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Completed);
    h.service.leave(&observer.id).await.unwrap();
    assert!(!h.service.registry().is_loaded(session.id).await);

    let err = candidate.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        Error::AccessWindow(AccessDenialReason::AlreadyCompleted)
    ));

    let stored = h.store.load_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.integrity_score, 100.0);
    assert_eq!(h.store.event_count(session.id).await, 0);
    assert_eq!(
        h.service.get_session(session.id, &p.interviewer).await.unwrap().status,
        SessionStatus::Completed
    );
}
