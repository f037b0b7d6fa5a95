//! In-process service harness

use chrono::{Duration, Utc};
use proctor_common::api::issue_token;
use proctor_common::events::{EventBus, Principal, ProctorEvent, Role};
use proctor_common::time;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use proctor_rt::connection::Connection;
use proctor_rt::identity::TokenVerifier;
use proctor_rt::scoring::ScoringPolicy;
use proctor_rt::session::{DetectionSettings, NewSession, RegistryTimeouts, Session, SessionRegistry};
use proctor_rt::store::{DurableStore, MemoryStore};
use proctor_rt::ProctorService;

pub const SECRET: i64 = 987_654_321;

/// Candidate and interviewer of one session
#[derive(Debug, Clone, Copy)]
pub struct Participants {
    pub candidate: Principal,
    pub interviewer: Principal,
}

impl Participants {
    pub fn new() -> Self {
        Self {
            candidate: Principal::new(Uuid::new_v4(), Role::Candidate),
            interviewer: Principal::new(Uuid::new_v4(), Role::Interviewer),
        }
    }
}

pub struct Harness {
    pub service: Arc<ProctorService>,
    pub store: Arc<MemoryStore>,
    pub bus: EventBus,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeouts(RegistryTimeouts::default())
    }

    pub fn with_timeouts(timeouts: RegistryTimeouts) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_store(store.clone(), store, timeouts)
    }

    /// Harness over an arbitrary store; `memory` is only used for inspection
    pub fn with_store(
        durable: Arc<dyn DurableStore>,
        memory: Arc<MemoryStore>,
        timeouts: RegistryTimeouts,
    ) -> Self {
        let bus = EventBus::new(1000);
        let registry = Arc::new(SessionRegistry::new(durable, bus.clone(), timeouts));
        let service = Arc::new(ProctorService::new(
            registry,
            Arc::new(TokenVerifier::new(SECRET)),
            ScoringPolicy::default(),
            256,
        ));
        Self { service, store: memory, bus }
    }

    pub fn token(principal: &Principal) -> String {
        issue_token(principal, time::now_millis() + 3_600_000, SECRET)
    }

    /// Schedule a 60-minute session whose window opened a minute ago
    pub async fn schedule(&self, participants: &Participants) -> Session {
        self.schedule_with(participants, DetectionSettings::default()).await
    }

    pub async fn schedule_with(&self, participants: &Participants, settings: DetectionSettings) -> Session {
        self.service
            .schedule_session(
                &participants.interviewer,
                NewSession {
                    candidate_id: participants.candidate.user_id,
                    interviewer_id: participants.interviewer.user_id,
                    scheduled_at: Utc::now() - Duration::minutes(1),
                    duration_minutes: 60,
                    detection_settings: settings,
                },
            )
            .await
            .expect("schedule session")
    }

    /// Schedule and start a session; return it with a joined candidate
    /// connection and its outbox
    pub async fn live_session(
        &self,
        participants: &Participants,
    ) -> (Session, Connection, mpsc::Receiver<ProctorEvent>) {
        let session = self.schedule(participants).await;
        self.service
            .start_session(session.id, &participants.interviewer)
            .await
            .expect("start session");
        let (connection, rx, _) = self
            .service
            .join(&Self::token(&participants.candidate), session.id)
            .await
            .expect("candidate join");
        (session, connection, rx)
    }
}

/// Everything currently queued in an outbox
pub fn drain(rx: &mut mpsc::Receiver<ProctorEvent>) -> Vec<ProctorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn event_types(events: &[ProctorEvent]) -> Vec<&'static str> {
    events.iter().map(ProctorEvent::event_type).collect()
}
