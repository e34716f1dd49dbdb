//! The coordinator state machine.
//!
//! One task owns everything: the election adapter, the armed watches, the
//! membership snapshot and the output sender. Each loop iteration waits on
//! all event sources at once and handles exactly one of them, so handlers
//! never run concurrently and no locking is needed. The only state visible
//! outside the task is the role, read through a [`RoleHandle`].

use std::sync::Arc;
use std::time::Duration;
use swallow_core::{
    ClusterPaths, CoordinatorEvent, KvConfig, RearmPolicy, Result, Role, SwallowError,
};
use swallow_election::{CandidateRole, Election, ElectionStatus};
use swallow_session::{CoordinationSession, Liveness, SessionState, Watch, WatchEvent};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::leadership::{LeaderSighting, LeadershipWatcher};
use crate::membership::{MembershipSnapshot, MembershipWatcher};
use crate::role::{RoleCell, RoleHandle};

/// The watches the coordinator currently holds.
///
/// A fired watch is consumed; at most one watch per path is armed at a time.
#[derive(Debug, Default)]
pub struct ArmedWatches {
    membership: Option<Watch>,
    leadership: Option<Watch>,
}

impl ArmedWatches {
    pub fn arm_membership(&mut self, watch: Watch) {
        self.membership = Some(watch);
    }

    pub fn arm_leadership(&mut self, watch: Watch) {
        self.leadership = Some(watch);
    }

    pub fn membership_armed(&self) -> bool {
        self.membership.is_some()
    }

    pub fn leadership_armed(&self) -> bool {
        self.leadership.is_some()
    }

    pub fn disarm_all(&mut self) {
        self.membership = None;
        self.leadership = None;
    }
}

#[derive(Debug)]
enum LoopEvent {
    Liveness(SessionState),
    Election(Option<ElectionStatus>),
    MembershipChanged(WatchEvent),
    LeadershipChanged(WatchEvent),
    Keepalive,
}

/// Drives a single candidacy through its lifetime.
pub struct Coordinator<S, E> {
    session: Arc<S>,
    election: E,
    paths: ClusterPaths,
    keepalive_interval: Duration,
    rearm_policy: RearmPolicy,
    liveness: Liveness,
    membership: MembershipWatcher,
    leadership: LeadershipWatcher,
    snapshot: MembershipSnapshot,
    armed: ArmedWatches,
    keepalive: Option<Interval>,
    role: Arc<RoleCell>,
    /// This process's candidate name, as last reported by the election
    own_candidate: Option<String>,
    output: mpsc::Sender<CoordinatorEvent>,
}

impl<S, E> Coordinator<S, E>
where
    S: CoordinationSession,
    E: Election,
{
    pub fn new(
        session: Arc<S>,
        election: E,
        config: &KvConfig,
        output: mpsc::Sender<CoordinatorEvent>,
    ) -> Self {
        let paths = config.paths();
        let liveness = session.liveness();
        Self {
            membership: MembershipWatcher::new(paths.nodes()),
            leadership: LeadershipWatcher::new(paths.election()),
            session,
            election,
            paths,
            keepalive_interval: config.keepalive_interval,
            rearm_policy: config.rearm_policy,
            liveness,
            snapshot: MembershipSnapshot::new(),
            armed: ArmedWatches::default(),
            keepalive: None,
            role: Arc::new(RoleCell::new()),
            own_candidate: None,
            output,
        }
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    /// Read-only view of the role that stays valid after `run` consumes
    /// the coordinator.
    pub fn role_handle(&self) -> RoleHandle {
        RoleHandle::new(Arc::clone(&self.role))
    }

    /// Run until a fatal condition, then tear down.
    ///
    /// Returns `Ok(())` when the session was closed normally and the error
    /// that ended the coordinator otherwise. The output stream is closed
    /// when this returns.
    pub async fn run(mut self) -> Result<()> {
        info!(
            "coordinator started on session {} (election {})",
            self.session.id(),
            self.paths.election()
        );

        let reason = self.event_loop().await;
        self.teardown(&reason).await;

        match reason {
            SwallowError::SessionClosed { .. } => Ok(()),
            other => Err(other),
        }
    }

    async fn event_loop(&mut self) -> SwallowError {
        let current = self.liveness.current();
        if current.is_fatal() {
            return self.liveness_error(current);
        }

        loop {
            let event = self.next_event().await;
            if let Err(reason) = self.handle(event).await {
                return reason;
            }
        }
    }

    async fn next_event(&mut self) -> LoopEvent {
        tokio::select! {
            biased;
            state = self.liveness.changed() => LoopEvent::Liveness(state),
            status = self.election.status() => LoopEvent::Election(status),
            event = fired(&mut self.armed.membership) => LoopEvent::MembershipChanged(event),
            event = fired(&mut self.armed.leadership) => LoopEvent::LeadershipChanged(event),
            _ = tick(&mut self.keepalive) => LoopEvent::Keepalive,
        }
    }

    async fn handle(&mut self, event: LoopEvent) -> Result<()> {
        match event {
            LoopEvent::Liveness(state) => self.on_liveness(state),
            LoopEvent::Election(Some(status)) => self.on_election_status(status).await,
            LoopEvent::Election(None) => Err(SwallowError::election("election status stream closed")),
            LoopEvent::MembershipChanged(event) => self.on_membership_changed(event).await,
            LoopEvent::LeadershipChanged(event) => self.on_leadership_changed(event).await,
            LoopEvent::Keepalive => self.on_keepalive().await,
        }
    }

    fn on_liveness(&self, state: SessionState) -> Result<()> {
        debug!("receive session event: {:?}", state);
        if state.is_fatal() {
            Err(self.liveness_error(state))
        } else {
            Ok(())
        }
    }

    fn liveness_error(&self, state: SessionState) -> SwallowError {
        match state {
            SessionState::Closed => SwallowError::SessionClosed {
                session: self.session.id(),
            },
            other => SwallowError::connection(format!(
                "session {} ended: {:?}",
                self.session.id(),
                other
            )),
        }
    }

    async fn on_election_status(&mut self, status: ElectionStatus) -> Result<()> {
        debug!("election status: {}", status);
        if let Some(error) = &status.error {
            return Err(SwallowError::election(format!(
                "candidate {}: {}",
                status.candidate_id, error
            )));
        }
        self.own_candidate = Some(status.candidate_id.clone());

        match status.role {
            CandidateRole::Leader => self.become_leader().await,
            CandidateRole::Follower => self.follow().await,
            other => Err(SwallowError::unexpected_state(format!(
                "unrecognized election role {} for {}",
                other, status.candidate_id
            ))),
        }
    }

    async fn become_leader(&mut self) -> Result<()> {
        if self.role.get() == Role::Leader {
            return Err(SwallowError::unexpected_state(
                "leader status received while already leading",
            ));
        }

        let (watch, delta) = self
            .membership
            .scan(self.session.as_ref(), &mut self.snapshot)
            .await?;
        self.armed.arm_membership(watch);
        self.armed.leadership = None;

        self.role.set(Role::Leader);
        info!("became leader, {} registered nodes", self.snapshot.len());
        self.emit(CoordinatorEvent::Membership(delta)).await?;

        let start = Instant::now() + self.keepalive_interval;
        let mut keepalive = interval_at(start, self.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.keepalive = Some(keepalive);
        Ok(())
    }

    async fn follow(&mut self) -> Result<()> {
        if self.role.get() == Role::Leader {
            return Err(SwallowError::unexpected_state(
                "follower status received while leading",
            ));
        }

        let (watch, sighting) = self.leadership.observe(self.session.as_ref()).await?;
        self.armed.arm_leadership(watch);

        self.role.set(Role::Follower);
        self.report_leader(sighting).await
    }

    /// Emit the sighted leader unless it is this process's own candidate,
    /// in which case the election's pending leader status takes over.
    async fn report_leader(&mut self, sighting: LeaderSighting) -> Result<()> {
        if self.own_candidate.as_deref() == Some(sighting.candidate.as_str()) {
            debug!(
                "own candidate {} ranks lowest, awaiting leader status",
                sighting.candidate
            );
            return Ok(());
        }
        info!("following leader {}", sighting.event.leader_id);
        self.emit(CoordinatorEvent::Follower(sighting.event)).await
    }

    async fn on_membership_changed(&mut self, event: WatchEvent) -> Result<()> {
        debug!("membership watch fired: {:?} {}", event.kind, event.path);
        if self.role.get() != Role::Leader {
            return Ok(());
        }

        match self
            .membership
            .scan(self.session.as_ref(), &mut self.snapshot)
            .await
        {
            Ok((watch, delta)) => {
                self.armed.arm_membership(watch);
                self.emit(CoordinatorEvent::Membership(delta)).await
            }
            Err(e) => self.rearm_failed("membership", e),
        }
    }

    async fn on_leadership_changed(&mut self, event: WatchEvent) -> Result<()> {
        debug!("leadership watch fired: {:?} {}", event.kind, event.path);
        if self.role.get() != Role::Follower {
            return Ok(());
        }

        match self.leadership.observe(self.session.as_ref()).await {
            Ok((watch, sighting)) => {
                self.armed.arm_leadership(watch);
                self.report_leader(sighting).await
            }
            Err(e) => self.rearm_failed("leadership", e),
        }
    }

    fn rearm_failed(&self, watch: &str, error: SwallowError) -> Result<()> {
        match self.rearm_policy {
            RearmPolicy::Terminate => {
                warn!("{} watch could not be re-armed: {}", watch, error);
                Err(error)
            }
            RearmPolicy::Continue => {
                warn!(
                    "{} watch could not be re-armed, continuing without it: {}",
                    watch, error
                );
                Ok(())
            }
        }
    }

    async fn on_keepalive(&mut self) -> Result<()> {
        match self.session.children(self.paths.election()).await {
            Ok(candidates) => {
                debug!("keepalive ok, {} candidates", candidates.len());
                Ok(())
            }
            Err(e) => {
                warn!("keepalive failed: {}", e);
                Err(e)
            }
        }
    }

    /// Deliver one event, giving up if the session dies while the consumer
    /// is not reading.
    async fn emit(&mut self, event: CoordinatorEvent) -> Result<()> {
        let state = tokio::select! {
            biased;
            state = self.liveness.fatal() => state,
            sent = self.output.send(event) => {
                return sent.map_err(|_| {
                    SwallowError::unexpected_state("event stream receiver dropped")
                });
            }
        };
        Err(self.liveness_error(state))
    }

    async fn teardown(&mut self, reason: &SwallowError) {
        let previous = self.role.set(Role::Terminated);
        match reason {
            SwallowError::SessionClosed { .. } => {
                info!("coordinator stopping (was {}): {}", previous, reason)
            }
            _ => warn!("coordinator terminating (was {}): {}", previous, reason),
        }

        self.armed.disarm_all();
        self.keepalive = None;
        if let Err(e) = self.election.resign().await {
            warn!("resign candidacy: {}", e);
        }
    }
}

/// Resolves when the armed watch fires and clears the slot; pending forever
/// when nothing is armed.
async fn fired(slot: &mut Option<Watch>) -> WatchEvent {
    match slot.as_mut() {
        Some(watch) => {
            let event = watch.await;
            *slot = None;
            event
        }
        None => std::future::pending().await,
    }
}

async fn tick(keepalive: &mut Option<Interval>) {
    match keepalive.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
