//! Proctoring service facade
//!
//! The operations callers see: authenticate, join/leave, ingest, lifecycle
//! transitions, scheduling and reads. Built once by the composition root
//! and shared by the transport; there is no global instance.

use chrono::{DateTime, Utc};
use proctor_common::events::{Principal, ProctorEvent, Role};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, Result};
use crate::identity::IdentityVerifier;
use crate::ingest::{DetectionInput, DetectionPipeline};
use crate::scoring::ScoringPolicy;
use crate::session::{
    lifecycle, AcceptedEvent, AccessDecision, NewSession, RoomHandle, Session, SessionRegistry,
};

pub struct ProctorService {
    registry: Arc<SessionRegistry>,
    pipeline: DetectionPipeline,
    verifier: Arc<dyn IdentityVerifier>,
    outbox_capacity: usize,
}

impl ProctorService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        verifier: Arc<dyn IdentityVerifier>,
        policy: ScoringPolicy,
        outbox_capacity: usize,
    ) -> Self {
        Self {
            pipeline: DetectionPipeline::new(Arc::clone(&registry), policy),
            registry,
            verifier,
            outbox_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn authenticate(&self, token: &str) -> Result<Principal> {
        self.verifier.verify(token)
    }

    /// Authenticate and open a connection with its outbox
    pub fn connect(&self, token: &str) -> Result<(Connection, mpsc::Receiver<ProctorEvent>)> {
        let principal = self.authenticate(token)?;
        Ok(self.open_connection(principal))
    }

    /// Open a connection for an already authenticated principal
    pub fn open_connection(&self, principal: Principal) -> (Connection, mpsc::Receiver<ProctorEvent>) {
        Connection::open(principal, self.outbox_capacity)
    }

    /// Authenticate, open a connection and join it to a session's room
    pub async fn join(
        &self,
        token: &str,
        session_id: Uuid,
    ) -> Result<(Connection, mpsc::Receiver<ProctorEvent>, RoomHandle)> {
        let (connection, rx) = self.connect(token)?;
        let handle = self.join_connection(&connection, session_id).await?;
        Ok((connection, rx, handle))
    }

    pub async fn join_connection(&self, connection: &Connection, session_id: Uuid) -> Result<RoomHandle> {
        self.registry.join(connection, session_id, Utc::now()).await
    }

    /// Leave the joined room; also the disconnect path
    pub async fn leave(&self, connection_id: &ConnectionId) -> Result<Option<Uuid>> {
        self.registry.leave(connection_id).await
    }

    /// Leave on behalf of `principal`, who must own the connection
    pub async fn leave_as(&self, principal: &Principal, connection_id: &ConnectionId) -> Result<Option<Uuid>> {
        self.check_owner(principal, connection_id).await?;
        self.leave(connection_id).await
    }

    async fn check_owner(&self, principal: &Principal, connection_id: &ConnectionId) -> Result<()> {
        match self.registry.membership(connection_id).await {
            Some(membership) if membership.principal != *principal => Err(Error::Authorization(format!(
                "connection {} belongs to another principal",
                connection_id
            ))),
            _ => Ok(()),
        }
    }

    /// Ingest a detection submitted by `principal` over `connection_id`
    ///
    /// The connection must belong to the principal submitting on it.
    pub async fn ingest(
        &self,
        principal: &Principal,
        connection_id: &ConnectionId,
        input: DetectionInput,
    ) -> Result<AcceptedEvent> {
        self.check_owner(principal, connection_id).await?;
        self.pipeline.ingest(connection_id, input).await
    }

    /// Schedule a new session; interviewers may only schedule their own
    pub async fn schedule_session(&self, actor: &Principal, request: NewSession) -> Result<Session> {
        match actor.role {
            Role::Admin => {}
            Role::Interviewer if actor.user_id == request.interviewer_id => {}
            Role::Interviewer => {
                return Err(Error::Authorization(
                    "interviewers can only schedule their own sessions".to_string(),
                ))
            }
            Role::Candidate => {
                return Err(Error::Authorization(
                    "candidates cannot schedule sessions".to_string(),
                ))
            }
        }

        let session = Session::schedule(request)?;
        self.registry.create(&session).await?;
        Ok(session)
    }

    pub async fn start_session(&self, session_id: Uuid, actor: &Principal) -> Result<Session> {
        self.registry
            .transition(session_id, |s| lifecycle::start(s, actor, Utc::now()))
            .await
    }

    pub async fn end_session(&self, session_id: Uuid, actor: &Principal) -> Result<Session> {
        let session = self
            .registry
            .transition(session_id, |s| lifecycle::end(s, actor, Utc::now()))
            .await?;
        info!(%session_id, final_score = session.integrity_score, "Session completed");
        Ok(session)
    }

    pub async fn cancel_session(&self, session_id: Uuid, actor: &Principal) -> Result<Session> {
        self.registry
            .transition(session_id, |s| lifecycle::cancel(s, actor, Utc::now()))
            .await
    }

    /// Access-window decision for `actor` at `now`
    pub async fn access_decision(
        &self,
        session_id: Uuid,
        actor: &Principal,
        now: DateTime<Utc>,
    ) -> Result<AccessDecision> {
        self.registry
            .with_session_lock(session_id, |state| {
                lifecycle::access_decision(&state.session, actor, now)
            })
            .await?
    }

    pub async fn get_session(&self, session_id: Uuid, actor: &Principal) -> Result<Session> {
        self.registry.snapshot(session_id, actor, Utc::now()).await
    }

    /// Detection log, oldest first, under the same access rules as a read
    pub async fn list_detection_events(
        &self,
        session_id: Uuid,
        actor: &Principal,
    ) -> Result<Vec<AcceptedEvent>> {
        self.get_session(session_id, actor).await?;
        self.registry
            .persist(self.registry.store().list_detection_events(session_id))
            .await
    }
}
