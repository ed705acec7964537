//! The per-group orchestrator.
//!
//! [`GroupProtocol`] composes the member table, vote machine, leader
//! election, clock synchronizer, command synchronizer and epoch store into
//! one synchronous state machine. The runner feeds it events; it returns
//! broadcasts, unicasts and application notifications.
//!
//! Broadcasts are self-delivering: the leader consumes its own sequenced
//! commands through the same inbound path as everyone else, so the apply
//! logic has exactly one entry point.

use crate::{
    EpochStore, GroupConfig, LeaderElection, MemberTable, ObservationSet, RandomSelection,
    VoteMachine, VoteStatus,
};
use lockstep_clock::{ClockSynchronizer, ClockUpdate};
use lockstep_core::{Action, AppCore, Event, Notification, QuerySlot, RequestId, StateMachine};
use lockstep_messages::{
    AppObservation, AppRequest, CheckpointReport, ClockOffset, CommandMessage, GroupAnnounce,
    GroupMessage, GroupsRequest, Heartbeat, JoinFailed, JoinRequest, JoinVote, MemberJoined,
    MemberStatusUpdate, SetLeader, SyncCompletion, SyncData, SyncRequest,
};
use lockstep_sync::{CatchUpResponder, CommandDisposition, CommandSynchronizer};
use lockstep_types::{
    Command, CommandPayload, Epoch, GroupId, GroupInfo, GroupTime, LeaderTerm, MemberStatus,
    PeerId, SeqNum,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Group-agreement state machine for one group on one peer.
pub struct GroupProtocol<A: AppCore> {
    info: GroupInfo,
    local: PeerId,
    app_data: String,
    config: GroupConfig,
    app: A,

    members: MemberTable,
    votes: VoteMachine<PeerId>,
    election: LeaderElection,
    clock: ClockSynchronizer,
    sync: CommandSynchronizer,
    responder: CatchUpResponder,
    epochs: EpochStore,
    observations: ObservationSet,
    groups_query: QuerySlot<GroupInfo>,
    rng: StdRng,

    local_status: MemberStatus,
    next_seq: SeqNum,
    next_checkpoint_at: Option<Duration>,
    join_retry_at: Option<Duration>,
    sync_retry_at: Option<Duration>,
    was_caught_up: bool,
    bootstrap_clock: bool,
    now: Duration,
}

impl<A: AppCore> GroupProtocol<A> {
    /// Create a new group. The local peer is immediately Active and leads
    /// term 0; its clock becomes the group clock on the first tick.
    pub fn create(
        info: GroupInfo,
        local: PeerId,
        app_data: impl Into<String>,
        config: GroupConfig,
        app: A,
    ) -> Self {
        let app_data = app_data.into();
        let mut members = MemberTable::new();
        members.insert_joining(local, &app_data);
        members.set_status(local, MemberStatus::Active);

        let election = LeaderElection::creator(
            local,
            &config,
            Box::new(RandomSelection::seeded(config.seed)),
            Duration::ZERO,
        );
        info!(group = %info.id, %local, "group created");

        Self::with_parts(
            info,
            local,
            app_data,
            config,
            app,
            members,
            election,
            MemberStatus::Active,
            true,
        )
    }

    /// Join an existing group. A join request goes out on the first tick;
    /// the local peer then walks Joining → SyncingState → SyncingClock →
    /// Active as the leader promotes it.
    pub fn join(
        info: GroupInfo,
        local: PeerId,
        app_data: impl Into<String>,
        config: GroupConfig,
        app: A,
    ) -> Self {
        let election = LeaderElection::follower(
            local,
            &config,
            Box::new(RandomSelection::seeded(config.seed)),
            Duration::ZERO,
        );
        info!(group = %info.id, %local, "joining group");

        Self::with_parts(
            info,
            local,
            app_data.into(),
            config,
            app,
            MemberTable::new(),
            election,
            MemberStatus::New,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_parts(
        info: GroupInfo,
        local: PeerId,
        app_data: String,
        config: GroupConfig,
        app: A,
        members: MemberTable,
        election: LeaderElection,
        local_status: MemberStatus,
        bootstrap_clock: bool,
    ) -> Self {
        Self {
            local,
            app_data,
            app,
            members,
            votes: VoteMachine::new(config.vote_timeout, config.vote_cleanup_window),
            election,
            clock: ClockSynchronizer::new(config.clock.clone()),
            sync: CommandSynchronizer::new(config.sync.clone()),
            responder: CatchUpResponder::new(),
            epochs: EpochStore::new(config.retained_epochs),
            observations: ObservationSet::new(config.observation_window),
            groups_query: QuerySlot::new(),
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(2)),
            local_status,
            next_seq: SeqNum::FIRST,
            next_checkpoint_at: None,
            join_retry_at: None,
            sync_retry_at: None,
            was_caught_up: local_status == MemberStatus::Active,
            bootstrap_clock,
            now: Duration::ZERO,
            info,
            config,
        }
    }

    /// Descriptor of this group.
    pub fn info(&self) -> &GroupInfo {
        &self.info
    }

    /// The local peer id.
    pub fn local_peer(&self) -> PeerId {
        self.local
    }

    /// The local peer's membership status.
    pub fn local_status(&self) -> MemberStatus {
        self.local_status
    }

    /// The member table.
    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    /// Current leader, if known.
    pub fn leader(&self) -> Option<PeerId> {
        self.election.leader()
    }

    /// Whether the local peer is the sequencing authority.
    pub fn is_leader(&self) -> bool {
        self.election.is_leader()
    }

    /// Current leadership term.
    pub fn term(&self) -> u64 {
        self.election.term()
    }

    /// Current group time, once the local clock has initialized.
    pub fn group_time(&self) -> Option<GroupTime> {
        self.clock.group_time()
    }

    /// Highest contiguously applied sequence number.
    pub fn applied_seq(&self) -> Option<SeqNum> {
        self.sync.max_applied()
    }

    /// The application core.
    pub fn app(&self) -> &A {
        &self.app
    }

    fn group(&self) -> GroupId {
        self.info.id.clone()
    }

    fn retry_due(&self) -> bool {
        self.sync_retry_at.map_or(true, |at| self.now >= at)
    }

    // ---- message dispatch ----------------------------------------------

    fn on_message(&mut self, from: PeerId, message: GroupMessage, actions: &mut Vec<Action>) {
        trace!(%from, kind = message.type_name(), "message received");
        match message {
            GroupMessage::GroupsRequest(_) => {
                if self.election.is_leader() {
                    let announce = GroupAnnounce {
                        info: self.info.clone(),
                    };
                    actions.push(Action::unicast(
                        from,
                        self.group(),
                        GroupMessage::GroupAnnounce(announce),
                    ));
                }
            }
            GroupMessage::GroupAnnounce(a) => {
                self.groups_query.collect(a.info);
            }
            GroupMessage::JoinRequest(req) => self.on_join_request(from, req, actions),
            GroupMessage::JoinVote(vote) => self.on_join_vote(from, vote, actions),
            GroupMessage::MemberJoined(m) => self.on_member_joined(from, m),
            GroupMessage::MemberStatus(update) => self.on_member_status(from, update, actions),
            GroupMessage::JoinFailed(jf) => self.on_join_failed(from, jf, actions),
            GroupMessage::Request(req) => self.on_request(from, req, actions),
            GroupMessage::Observation(obs) => self.on_forwarded_observation(from, obs, actions),
            GroupMessage::Command(cmd) => self.on_command(from, cmd, actions),
            GroupMessage::Heartbeat(hb) => self.on_heartbeat(from, hb, actions),
            GroupMessage::SetLeader(sl) => self.on_set_leader(from, sl),
            GroupMessage::SyncRequest(sr) => self.on_sync_request(from, sr, actions),
            GroupMessage::SyncData(sd) => self.on_sync_data(from, sd, actions),
            GroupMessage::SyncCompletion(sc) => self.on_sync_completion(from, sc, actions),
            GroupMessage::CheckpointReport(cr) => self.on_checkpoint_report(from, cr),
            GroupMessage::ClockOffset(co) => self.on_clock_offset(from, co, actions),
        }
    }

    // ---- join approval --------------------------------------------------

    fn on_join_request(&mut self, from: PeerId, req: JoinRequest, actions: &mut Vec<Action>) {
        if req.peer != from {
            warn!(%from, claimed = %req.peer, "join request sender mismatch");
            return;
        }
        if self
            .members
            .status_of(req.peer)
            .is_some_and(|s| s != MemberStatus::Joining)
        {
            debug!(peer = %req.peer, "join request from known member ignored");
            return;
        }
        self.members.insert_joining(req.peer, &req.app_data);
        if req.peer == self.local {
            return;
        }

        if self.election.is_leader() {
            let total = self.members.active_count().max(1);
            self.votes.add_vote(req.peer, self.local, self.now, total);
            self.check_join_vote(req.peer, actions);
        } else if self.local_status.is_active() {
            if let Some(leader) = self.election.leader() {
                actions.push(Action::unicast(
                    leader,
                    self.group(),
                    GroupMessage::JoinVote(JoinVote {
                        candidate: req.peer,
                    }),
                ));
            }
        }
    }

    fn on_join_vote(&mut self, from: PeerId, vote: JoinVote, actions: &mut Vec<Action>) {
        if !self.election.is_leader() {
            debug!(%from, "join vote at non-leader ignored");
            return;
        }
        if !self
            .members
            .status_of(from)
            .is_some_and(MemberStatus::is_active)
        {
            debug!(%from, "join vote from non-active member ignored");
            return;
        }
        if self.members.status_of(vote.candidate) != Some(MemberStatus::Joining) {
            debug!(candidate = %vote.candidate, "join vote for unknown candidate ignored");
            return;
        }
        let total = self.members.active_count().max(1);
        self.votes.add_vote(vote.candidate, from, self.now, total);
        self.check_join_vote(vote.candidate, actions);
    }

    fn check_join_vote(&mut self, candidate: PeerId, actions: &mut Vec<Action>) {
        let result = self.votes.result(&candidate, self.now, false);
        if result.already_consumed {
            return;
        }
        match result.status {
            VoteStatus::Won => {
                info!(%candidate, yes = result.yes_votes, "join approved");
                self.admit_member(candidate, actions);
            }
            VoteStatus::Lost => {
                info!(%candidate, yes = result.yes_votes, "join vote expired");
                actions.push(Action::broadcast(
                    self.group(),
                    GroupMessage::JoinFailed(JoinFailed {
                        peer: candidate,
                        reason: "not enough approval votes before timeout".into(),
                    }),
                ));
                self.members.remove(candidate);
            }
            VoteStatus::Voting | VoteStatus::NotFound => {}
        }
    }

    /// Leader-side admission: replay join history to the newcomer, announce
    /// it to everyone, then put it on the sync track.
    fn admit_member(&mut self, candidate: PeerId, actions: &mut Vec<Action>) {
        let group = self.group();
        let replay: Vec<(PeerId, String, MemberStatus)> = self
            .members
            .replay_members(candidate)
            .iter()
            .map(|m| (m.peer, m.app_data.clone(), m.status))
            .collect();

        for (peer, app_data, _) in &replay {
            actions.push(Action::unicast(
                candidate,
                group.clone(),
                GroupMessage::MemberJoined(MemberJoined {
                    peer: *peer,
                    app_data: app_data.clone(),
                }),
            ));
        }

        let app_data = self
            .members
            .get(candidate)
            .map(|m| m.app_data.clone())
            .unwrap_or_default();
        actions.push(Action::broadcast(
            group.clone(),
            GroupMessage::MemberJoined(MemberJoined {
                peer: candidate,
                app_data,
            }),
        ));

        for (peer, _, status) in &replay {
            actions.push(Action::unicast(
                candidate,
                group.clone(),
                GroupMessage::MemberStatus(MemberStatusUpdate {
                    peer: *peer,
                    status: *status,
                }),
            ));
        }

        // A group with no sequenced history yet has no state to transfer.
        let initial = if self.next_seq > SeqNum::FIRST {
            MemberStatus::SyncingState
        } else {
            MemberStatus::SyncingClock
        };
        self.promote(candidate, initial, actions);
    }

    fn on_member_joined(&mut self, from: PeerId, m: MemberJoined) {
        let leader = self.election.leader();
        if leader.is_some() && leader != Some(from) {
            warn!(%from, "member-joined from non-leader dropped");
            return;
        }
        self.members.insert_joining(m.peer, &m.app_data);
        // The leader's announcement order is the canonical join order.
        self.members.move_to_back(m.peer);
        if m.peer == self.local && self.local_status == MemberStatus::Joining {
            debug!("join accepted, awaiting status assignment");
            self.join_retry_at = None;
        }
    }

    fn on_member_status(
        &mut self,
        from: PeerId,
        update: MemberStatusUpdate,
        actions: &mut Vec<Action>,
    ) {
        let leader = self.election.leader();
        if leader.is_some() && leader != Some(from) {
            warn!(%from, "member status from non-leader dropped");
            return;
        }

        if update.status == MemberStatus::Removed {
            if self.members.remove(update.peer).is_some() {
                self.votes.forget(&update.peer);
                self.clock.on_peer_departed(update.peer);
                actions.push(Action::Notify(Notification::MemberStatusChanged {
                    peer: update.peer,
                    status: MemberStatus::Removed,
                }));
            }
            return;
        }

        if !self.members.contains(update.peer) {
            // Status for a member we have not seen join yet; the record
            // fills in when the join history replay arrives.
            self.members.insert_joining(update.peer, "");
        }
        if self.members.set_status(update.peer, update.status).is_some() {
            actions.push(Action::Notify(Notification::MemberStatusChanged {
                peer: update.peer,
                status: update.status,
            }));
        }

        if update.peer == self.local && self.local_status != update.status {
            self.local_status = update.status;
            match update.status {
                MemberStatus::SyncingState => {
                    self.was_caught_up = false;
                    self.send_sync_request(from, actions);
                }
                MemberStatus::SyncingClock | MemberStatus::Active => {
                    self.sync_retry_at = None;
                }
                _ => {}
            }
        }
    }

    fn on_join_failed(&mut self, from: PeerId, jf: JoinFailed, actions: &mut Vec<Action>) {
        let leader = self.election.leader();
        if leader.is_some() && leader != Some(from) {
            warn!(%from, "join-failed from non-leader dropped");
            return;
        }
        self.members.remove(jf.peer);
        self.votes.forget(&jf.peer);
        if jf.peer == self.local {
            info!(reason = %jf.reason, "join rejected");
            self.local_status = MemberStatus::New;
            self.join_retry_at = Some(self.now + self.config.sync.completion_wait);
            actions.push(Action::Notify(Notification::JoinFailed {
                peer: jf.peer,
                reason: jf.reason,
            }));
        }
    }

    // ---- command ordering -----------------------------------------------

    fn on_request(&mut self, from: PeerId, req: AppRequest, actions: &mut Vec<Action>) {
        if !self.election.is_leader() {
            debug!(%from, "request at non-leader ignored");
            return;
        }
        if !self
            .members
            .status_of(from)
            .is_some_and(MemberStatus::is_active)
        {
            debug!(%from, "request from non-active member ignored");
            return;
        }
        self.sequence_app(req.payload, actions);
    }

    fn on_forwarded_observation(
        &mut self,
        from: PeerId,
        obs: AppObservation,
        actions: &mut Vec<Action>,
    ) {
        // The observer already sorted and conflict-filtered its batch; the
        // leader sequences observations exactly like requests.
        if !self.election.is_leader() {
            debug!(%from, "observation at non-leader ignored");
            return;
        }
        if !self
            .members
            .status_of(from)
            .is_some_and(MemberStatus::is_active)
        {
            debug!(%from, "observation from non-active member ignored");
            return;
        }
        self.sequence_app(obs.payload, actions);
    }

    fn on_command(&mut self, from: PeerId, msg: CommandMessage, actions: &mut Vec<Action>) {
        self.election.on_liveness(msg.term, from, self.now);

        let disposition = self.sync.evaluate(
            msg.command.seq,
            from,
            self.election.leader(),
            self.local_status.is_member(),
        );
        match disposition {
            CommandDisposition::ShouldApply => {
                self.sync.stash(msg.command);
                self.apply_pass(actions);
            }
            CommandDisposition::StashedInQueue { resync_needed } => {
                debug!(seq = %msg.command.seq, resync_needed, "command stashed");
                self.sync.stash(msg.command);
                if resync_needed && self.retry_due() {
                    if let Some(leader) = self.election.leader() {
                        if leader != self.local {
                            self.send_sync_request(leader, actions);
                        }
                    }
                }
            }
            CommandDisposition::AlreadyReceived => {
                trace!(seq = %msg.command.seq, "duplicate command dropped");
            }
            CommandDisposition::BadSource => {
                warn!(%from, seq = %msg.command.seq, "command from non-leader dropped");
            }
            CommandDisposition::LocalPeerNotReady => {
                debug!(seq = %msg.command.seq, "command before membership dropped");
            }
        }
    }

    fn on_heartbeat(&mut self, from: PeerId, hb: Heartbeat, actions: &mut Vec<Action>) {
        self.election.on_liveness(hb.term, from, self.now);
        if from == self.local || !self.local_status.is_member() {
            return;
        }
        // A heartbeat means no commands are in flight, so a gap it reveals
        // will not close on its own.
        if let Some(last) = hb.last_seq {
            if last >= self.sync.expected_seq() && self.retry_due() {
                self.send_sync_request(from, actions);
            }
        }
    }

    fn on_set_leader(&mut self, from: PeerId, sl: SetLeader) {
        let leader = self.election.leader();
        if leader.is_some() && leader != Some(from) {
            warn!(%from, "leader assignment from non-leader dropped");
            return;
        }
        self.election.schedule(LeaderTerm {
            leader: sl.new_leader,
            term: sl.term,
            effective_epoch: sl.effective_epoch,
        });
    }

    // ---- state transfer -------------------------------------------------

    fn on_sync_request(&mut self, from: PeerId, sr: SyncRequest, actions: &mut Vec<Action>) {
        if !self.election.is_leader() {
            debug!(%from, "sync request at non-leader ignored");
            return;
        }
        let snapshot = self
            .epochs
            .snapshot_covering(sr.expected_seq)
            .map(|e| (e.num, e.end_seq, e.sealed_at, e.end_state_hash, e.snapshot.clone()));

        match snapshot {
            Some((epoch, seq, group_time, state_hash, state)) => {
                debug!(%from, %epoch, %seq, "serving snapshot");
                actions.push(Action::unicast(
                    from,
                    self.group(),
                    GroupMessage::SyncData(SyncData {
                        epoch,
                        seq,
                        group_time,
                        state_hash,
                        state,
                    }),
                ));
                self.responder.begin(from, seq.next(), sr.first_stashed_seq);
            }
            None => self.responder.begin(from, sr.expected_seq, sr.first_stashed_seq),
        }
    }

    fn on_sync_data(&mut self, from: PeerId, sd: SyncData, actions: &mut Vec<Action>) {
        let leader = self.election.leader();
        if leader.is_some() && leader != Some(from) {
            warn!(%from, "sync data from non-leader dropped");
            return;
        }
        if sd.seq < self.sync.expected_seq() {
            debug!(seq = %sd.seq, "stale snapshot ignored");
            return;
        }
        info!(epoch = %sd.epoch, seq = %sd.seq, "restoring snapshot");
        self.app.restore(&sd.state);
        self.sync.reset_to_snapshot(sd.seq);
        self.epochs.adopt(Epoch {
            num: sd.epoch,
            // The covered range is unknown to the receiver; a degenerate
            // range keeps the snapshot servable without claiming history.
            start_seq: sd.seq,
            end_seq: sd.seq,
            sealed_at: sd.group_time,
            end_state_hash: sd.state_hash,
            snapshot: sd.state,
        });
        self.apply_pass(actions);
    }

    fn on_sync_completion(&mut self, from: PeerId, sc: SyncCompletion, actions: &mut Vec<Action>) {
        if !self.election.is_leader() {
            return;
        }
        if self.members.status_of(from) != Some(MemberStatus::SyncingState) {
            debug!(%from, "sync completion from member not syncing state");
            return;
        }
        // The reported position must cover everything issued so far.
        if sc.seq.next() < self.next_seq {
            debug!(%from, reported = %sc.seq, "sync completion behind current head");
            return;
        }
        debug!(%from, seq = %sc.seq, hash = ?sc.hash, "state sync confirmed");
        self.responder.drop_session(from);
        self.promote(from, MemberStatus::SyncingClock, actions);
    }

    fn on_checkpoint_report(&mut self, from: PeerId, cr: CheckpointReport) {
        if !self.election.is_leader() {
            return;
        }
        self.epochs.record_report(cr.seq, from, cr.hash);
    }

    // ---- clock ----------------------------------------------------------

    fn on_clock_offset(&mut self, from: PeerId, co: ClockOffset, actions: &mut Vec<Action>) {
        if co.peer != from {
            warn!(%from, claimed = %co.peer, "clock offset sender mismatch");
            return;
        }
        if from == self.local {
            return;
        }

        // Half the currently Active membership, rounded up.
        let needed = (self.members.active_count() + 1) / 2;
        let reference = if self.election.is_leader() {
            None
        } else {
            self.election.leader()
        };
        match self.clock.on_group_offset(from, co.offset_ms, needed.max(1), reference) {
            ClockUpdate::Initialized => info!("group clock initialized"),
            ClockUpdate::Waiting { reports, needed } => {
                debug!(reports, needed, "clock waiting for offset reports");
            }
            ClockUpdate::Slewed { .. } | ClockUpdate::Unchanged => {}
        }

        // The first announcement a member can make is after its own clock
        // initialized, so hearing one completes its clock sync.
        if self.election.is_leader()
            && self.members.status_of(from) == Some(MemberStatus::SyncingClock)
        {
            self.promote(from, MemberStatus::Active, actions);
        }
    }

    // ---- departures -----------------------------------------------------

    fn on_peer_departed(&mut self, peer: PeerId, actions: &mut Vec<Action>) {
        if !self.members.contains(peer) {
            return;
        }
        info!(%peer, "peer departed");
        let was_leader = self.election.leader() == Some(peer);
        self.members.remove(peer);
        self.votes.forget(&peer);
        self.clock.on_peer_departed(peer);
        self.responder.drop_session(peer);
        actions.push(Action::Notify(Notification::MemberStatusChanged {
            peer,
            status: MemberStatus::Removed,
        }));

        if !was_leader {
            return;
        }
        // Promote the pre-nominated successor early, or fall back to the
        // oldest Active member in join order when nothing was scheduled.
        // The fallback must come out identical on every peer, so the
        // transport-local missing flag plays no part in it.
        if let Some(assignment) = self.election.promote_scheduled_now(self.now) {
            self.on_leadership_change(assignment, actions);
        } else if let Some(fallback) = self.members.oldest_active() {
            let assignment = self.election.force_leader(fallback, self.now);
            self.on_leadership_change(assignment, actions);
        } else {
            warn!(%peer, "leader departed with no active fallback");
            return;
        }

        if self.election.is_leader() {
            actions.push(Action::broadcast(
                self.group(),
                GroupMessage::Heartbeat(Heartbeat {
                    term: self.election.term(),
                    last_seq: self.next_seq.prev(),
                }),
            ));
            self.election.mark_signal_sent(self.now);
            self.nominate_successor(actions);
        }
    }

    // ---- sequencing and epochs ------------------------------------------

    /// Leader-only: sequence an application payload.
    fn sequence_app(&mut self, payload: Vec<u8>, actions: &mut Vec<Action>) {
        let command = Command::app(self.epochs.open_epoch(), self.next_seq, payload);
        self.sequence(command, actions);
    }

    /// Leader-only: sequence the checkpoint that seals the open epoch.
    fn sequence_checkpoint(&mut self, group_time: GroupTime, actions: &mut Vec<Action>) {
        let command = Command::checkpoint(self.epochs.open_epoch(), self.next_seq, group_time);
        self.sequence(command, actions);
    }

    /// Assign the next sequence number and broadcast.
    ///
    /// The command reaches the local apply path through broadcast
    /// self-delivery, like every other member's copy.
    fn sequence(&mut self, command: Command, actions: &mut Vec<Action>) {
        debug!(seq = %command.seq, kind = command.payload.kind(), "command sequenced");
        self.next_seq = self.next_seq.next();
        self.election.mark_signal_sent(self.now);
        actions.push(Action::broadcast(
            self.group(),
            GroupMessage::Command(CommandMessage {
                term: self.election.term(),
                command,
            }),
        ));
    }

    /// Drain the stash under the per-tick cap and deliver what came out.
    fn apply_pass(&mut self, actions: &mut Vec<Action>) {
        let mut applied = Vec::new();
        let outcome = self.sync.apply_stashed(|c| applied.push(c.clone()));
        for command in applied {
            match command.payload {
                CommandPayload::App(payload) => self.app.apply_command(command.seq, &payload),
                CommandPayload::Checkpoint { group_time } => {
                    self.seal_epoch(command.seq, group_time, actions);
                }
            }
        }

        if !self.local_status.is_member() {
            return;
        }
        if outcome.caught_up && !self.was_caught_up {
            if self.local_status == MemberStatus::SyncingState {
                if let Some(max) = self.sync.max_applied() {
                    self.send_sync_completion(max, actions);
                }
            }
            actions.push(Action::Notify(Notification::CaughtUp {
                seq: self.sync.max_applied(),
            }));
        }
        self.was_caught_up = outcome.caught_up;
    }

    /// Apply a sequenced checkpoint: snapshot, seal, prune, and run any
    /// leadership handover that reaches its epoch boundary here.
    fn seal_epoch(&mut self, seq: SeqNum, group_time: GroupTime, actions: &mut Vec<Action>) {
        let (hash, snapshot) = self.app.checkpoint(seq, group_time);
        self.epochs.seal(seq, group_time, hash, snapshot);
        if let Some(oldest) = self.epochs.oldest_retained_seq() {
            self.sync.prune_applied_below(oldest);
        }

        if self.election.is_leader() {
            self.epochs.record_report(seq, self.local, hash);
        } else if let Some(leader) = self.election.leader() {
            if leader != self.local {
                actions.push(Action::unicast(
                    leader,
                    self.group(),
                    GroupMessage::CheckpointReport(CheckpointReport {
                        seq,
                        group_time,
                        hash,
                    }),
                ));
            }
        }

        if let Some(assignment) = self
            .election
            .take_effect_at_epoch(self.epochs.open_epoch(), self.now)
        {
            self.on_leadership_change(assignment, actions);
        }
        if self.election.is_leader() {
            self.nominate_successor(actions);
        }
    }

    fn on_leadership_change(&mut self, assignment: LeaderTerm, actions: &mut Vec<Action>) {
        actions.push(Action::Notify(Notification::LeaderChanged {
            leader: assignment.leader,
            term: assignment.term,
        }));
        if assignment.leader == self.local {
            // Sequence numbering resumes exactly where the group left off.
            self.next_seq = self.sync.expected_seq();
            self.next_checkpoint_at = None;
            info!(next = %self.next_seq, term = assignment.term, "assumed sequencing authority");
        }
    }

    fn nominate_successor(&mut self, actions: &mut Vec<Action>) {
        if self.election.scheduled().is_some() {
            return;
        }
        // A member the transport reports unreachable would make a poor
        // leader; leave it out of the slate until it returns.
        let actives = self.members.reachable_active_peers();
        if let Some(t) = self.election.nominate(&actives, self.epochs.open_epoch()) {
            info!(successor = %t.leader, term = t.term, epoch = %t.effective_epoch, "successor nominated");
            self.election.schedule(t);
            actions.push(Action::broadcast(
                self.group(),
                GroupMessage::SetLeader(SetLeader {
                    new_leader: t.leader,
                    term: t.term,
                    effective_epoch: t.effective_epoch,
                }),
            ));
        }
    }

    // ---- local submissions ----------------------------------------------

    fn on_submit_request(&mut self, payload: Vec<u8>, actions: &mut Vec<Action>) {
        if !self.local_status.is_active() {
            debug!(status = %self.local_status, "request before active membership suppressed");
            return;
        }
        if self.election.is_leader() {
            self.sequence_app(payload, actions);
        } else if let Some(leader) = self.election.leader() {
            actions.push(Action::unicast(
                leader,
                self.group(),
                GroupMessage::Request(AppRequest { payload }),
            ));
        }
    }

    fn on_submit_observation(&mut self, payload: Vec<u8>) {
        if !self.local_status.is_active() {
            debug!(status = %self.local_status, "observation before active membership suppressed");
            return;
        }
        let Some(observed_at) = self.clock.group_time() else {
            debug!("observation before clock init suppressed");
            return;
        };
        self.observations.add(
            AppObservation {
                observed_at,
                payload,
            },
            self.now,
        );
    }

    fn on_request_groups(&mut self, request_id: RequestId, actions: &mut Vec<Action>) {
        let deadline = self.now + self.config.groups_query_window;
        match self.groups_query.begin(request_id, deadline) {
            Ok(()) => actions.push(Action::broadcast_all(GroupMessage::GroupsRequest(
                GroupsRequest,
            ))),
            Err(e) => warn!(%request_id, %e, "groups query rejected"),
        }
    }

    // ---- helpers --------------------------------------------------------

    /// Leader-side status change: set locally, broadcast, notify.
    fn promote(&mut self, peer: PeerId, status: MemberStatus, actions: &mut Vec<Action>) {
        if self.members.set_status(peer, status).is_none() {
            return;
        }
        if peer == self.local {
            self.local_status = status;
        }
        actions.push(Action::Notify(Notification::MemberStatusChanged {
            peer,
            status,
        }));
        actions.push(Action::broadcast(
            self.group(),
            GroupMessage::MemberStatus(MemberStatusUpdate { peer, status }),
        ));
    }

    fn send_sync_request(&mut self, to: PeerId, actions: &mut Vec<Action>) {
        let req = SyncRequest {
            expected_seq: self.sync.expected_seq(),
            first_stashed_seq: self.sync.first_stashed_seq(),
        };
        debug!(%to, expected = %req.expected_seq, "requesting catch-up");
        actions.push(Action::unicast(
            to,
            self.group(),
            GroupMessage::SyncRequest(req),
        ));
        self.sync_retry_at = Some(self.now + self.config.sync.completion_wait);
    }

    fn send_sync_completion(&mut self, seq: SeqNum, actions: &mut Vec<Action>) {
        let Some(leader) = self.election.leader() else {
            return;
        };
        let group_time = self.clock.group_time().unwrap_or(GroupTime::ZERO);
        let (hash, _) = self.app.checkpoint(seq, group_time);
        debug!(%leader, %seq, "reporting sync completion");
        actions.push(Action::unicast(
            leader,
            self.group(),
            GroupMessage::SyncCompletion(SyncCompletion { seq, hash }),
        ));
        self.sync_retry_at = Some(self.now + self.config.sync.completion_wait);
    }

    fn checkpoint_delay(&mut self) -> Duration {
        let jitter_ms = self.config.checkpoint_jitter.as_millis() as u64;
        self.config.checkpoint_period + Duration::from_millis(self.rng.gen_range(0..=jitter_ms))
    }

    // ---- the tick -------------------------------------------------------

    fn tick(&mut self, actions: &mut Vec<Action>) {
        if self.bootstrap_clock {
            // The creator's clock is the group clock by definition.
            self.clock.initialize_at(GroupTime::ZERO);
            self.bootstrap_clock = false;
        }

        // Join request send and retry.
        let join_due = match self.local_status {
            MemberStatus::New => self.join_retry_at.map_or(true, |at| self.now >= at),
            MemberStatus::Joining => self.join_retry_at.is_some_and(|at| self.now >= at),
            _ => false,
        };
        if join_due {
            actions.push(Action::broadcast(
                self.group(),
                GroupMessage::JoinRequest(JoinRequest::new(self.local, self.app_data.clone())),
            ));
            self.local_status = MemberStatus::Joining;
            self.join_retry_at = Some(self.now + self.config.sync.completion_wait);
        }

        // Leader: expire pending join votes that will never fill.
        if self.election.is_leader() {
            let pending: Vec<PeerId> = self
                .members
                .statuses()
                .into_iter()
                .filter(|&(p, s)| s == MemberStatus::Joining && p != self.local)
                .map(|(p, _)| p)
                .collect();
            for candidate in pending {
                self.check_join_vote(candidate, actions);
            }
        }

        // Leader liveness.
        if self.election.heartbeat_due(self.now) {
            actions.push(Action::broadcast(
                self.group(),
                GroupMessage::Heartbeat(Heartbeat {
                    term: self.election.term(),
                    last_seq: self.next_seq.prev(),
                }),
            ));
            self.election.mark_signal_sent(self.now);
        }
        self.election.election_timer_expired(self.now);

        // Leader: periodic sequenced checkpoint.
        if self.election.is_leader() {
            if self.next_checkpoint_at.is_none() {
                let delay = self.checkpoint_delay();
                self.next_checkpoint_at = Some(self.now + delay);
            }
            if let (Some(at), Some(group_time)) = (self.next_checkpoint_at, self.clock.group_time())
            {
                if self.now >= at {
                    self.sequence_checkpoint(group_time, actions);
                    let delay = self.checkpoint_delay();
                    self.next_checkpoint_at = Some(self.now + delay);
                }
            }
        } else {
            self.next_checkpoint_at = None;
        }

        // Periodic clock offset announcement; the first one a member makes
        // doubles as its clock-sync completion signal.
        if self.clock.announce_due()
            && matches!(
                self.local_status,
                MemberStatus::SyncingClock | MemberStatus::Active
            )
        {
            if let Some(offset_ms) = self.clock.local_offset_ms() {
                actions.push(Action::broadcast(
                    self.group(),
                    GroupMessage::ClockOffset(ClockOffset {
                        peer: self.local,
                        offset_ms,
                    }),
                ));
                self.clock.mark_announced();
            }
        }

        // Observation batch whose window closed.
        if let Some(batch) = self.observations.flush_due(self.now, &self.app) {
            for obs in batch {
                if self.election.is_leader() {
                    self.sequence_app(obs.payload, actions);
                } else if let Some(leader) = self.election.leader() {
                    actions.push(Action::unicast(
                        leader,
                        self.group(),
                        GroupMessage::Observation(obs),
                    ));
                }
            }
        }

        self.apply_pass(actions);

        // Catch-up streaming to lagging peers.
        if self.election.is_leader() && !self.responder.is_idle() {
            let term = self.election.term();
            let budget = self.config.sync.max_sync_commands_per_tick;
            for (peer, command) in self.responder.next_batch(&self.sync, budget) {
                actions.push(Action::unicast(
                    peer,
                    self.group(),
                    GroupMessage::Command(CommandMessage { term, command }),
                ));
            }
        }

        // State-sync retry while awaiting promotion.
        if self.local_status == MemberStatus::SyncingState
            && self.sync_retry_at.is_some_and(|at| self.now >= at)
        {
            if self.was_caught_up {
                if let Some(max) = self.sync.max_applied() {
                    self.send_sync_completion(max, actions);
                }
            } else if let Some(leader) = self.election.leader() {
                if leader != self.local {
                    self.send_sync_request(leader, actions);
                }
            }
        }

        // Close a groups query whose collection window ended.
        if let Some((request_id, groups)) = self.groups_query.take_expired(self.now) {
            actions.push(Action::Notify(Notification::GroupsDiscovered {
                request_id,
                groups,
            }));
        }
    }
}

impl<A: AppCore> StateMachine for GroupProtocol<A> {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            Event::Tick => self.tick(&mut actions),
            Event::MessageReceived { from, envelope } => {
                if envelope.group.as_ref().is_some_and(|g| *g != self.info.id) {
                    trace!(%from, "message for another group ignored");
                } else {
                    self.on_message(from, envelope.message, &mut actions);
                }
            }
            Event::PeerJoinedNetwork { peer } => debug!(%peer, "peer on network"),
            Event::PeerLeftNetwork { peer } => self.on_peer_departed(peer, &mut actions),
            Event::PeerMissing { peer } => self.members.set_missing(peer, true),
            Event::PeerReturned { peer } => self.members.set_missing(peer, false),
            Event::SystemOffsetSample {
                peer,
                offset_ms,
                lag_ms,
            } => self.clock.on_system_offset(peer, offset_ms, lag_ms),
            Event::SubmitRequest { payload } => self.on_submit_request(payload, &mut actions),
            Event::SubmitObservation { payload } => self.on_submit_observation(payload),
            Event::RequestGroups { request_id } => {
                self.on_request_groups(request_id, &mut actions);
            }
        }
        actions
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
        self.clock.set_time(now);
    }

    fn now(&self) -> Duration {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::PairwiseValidation;
    use lockstep_messages::Envelope;
    use lockstep_types::Hash;
    use tracing_test::traced_test;

    // Minimal deterministic app: concatenates applied payloads.
    #[derive(Default)]
    struct LogApp {
        log: Vec<u8>,
    }

    impl AppCore for LogApp {
        fn apply_command(&mut self, _seq: SeqNum, payload: &[u8]) {
            self.log.extend_from_slice(payload);
        }

        fn checkpoint(&mut self, _seq: SeqNum, _t: GroupTime) -> (Hash, Vec<u8>) {
            (Hash::from_bytes(&self.log), self.log.clone())
        }

        fn restore(&mut self, state: &[u8]) {
            self.log = state.to_vec();
        }

        fn validate_pairwise(&self, _prev: &[u8], _test: &[u8]) -> PairwiseValidation {
            PairwiseValidation::Unaffected
        }
    }

    const A: PeerId = PeerId(1);
    const B: PeerId = PeerId(2);

    fn info() -> GroupInfo {
        GroupInfo::new(GroupId::new("g"), "test group", A)
    }

    fn creator() -> GroupProtocol<LogApp> {
        let mut p = GroupProtocol::create(info(), A, "alice", GroupConfig::default(), LogApp::default());
        p.set_time(Duration::from_millis(1));
        p.handle(Event::Tick);
        p
    }

    fn msg(from: PeerId, message: GroupMessage) -> Event {
        Event::MessageReceived {
            from,
            envelope: Envelope::to_group(GroupId::new("g"), message),
        }
    }

    fn sent(actions: &[Action]) -> Vec<&GroupMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Broadcast { envelope } | Action::Unicast { envelope, .. } => {
                    Some(&envelope.message)
                }
                Action::Notify(_) => None,
            })
            .collect()
    }

    /// Feed a protocol's own broadcasts back to it, simulating the
    /// self-delivering transport. Returns the follow-up actions.
    fn echo_broadcasts(p: &mut GroupProtocol<LogApp>, actions: &[Action]) -> Vec<Action> {
        let local = p.local_peer();
        let mut out = Vec::new();
        for action in actions {
            if let Action::Broadcast { envelope } = action {
                out.extend(p.handle(Event::MessageReceived {
                    from: local,
                    envelope: envelope.clone(),
                }));
            }
        }
        out
    }

    #[test]
    fn creator_bootstraps_as_active_leader() {
        let p = creator();
        assert!(p.is_leader());
        assert_eq!(p.local_status(), MemberStatus::Active);
        assert_eq!(p.leader(), Some(A));
        assert!(p.group_time().is_some());
    }

    #[test]
    fn joiner_broadcasts_join_request_on_first_tick() {
        let mut p = GroupProtocol::join(info(), B, "bob", GroupConfig::default(), LogApp::default());
        p.set_time(Duration::from_millis(1));
        let actions = p.handle(Event::Tick);

        assert_eq!(p.local_status(), MemberStatus::Joining);
        assert!(sent(&actions)
            .iter()
            .any(|m| matches!(m, GroupMessage::JoinRequest(r) if r.peer == B)));
    }

    #[traced_test]
    #[test]
    fn single_active_leader_admits_joiner_straight_to_clock_sync() {
        let mut p = creator();
        let actions = p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));

        // No sequenced history yet, so the newcomer skips state sync.
        let messages = sent(&actions);
        assert!(messages
            .iter()
            .any(|m| matches!(m, GroupMessage::MemberJoined(j) if j.peer == B)));
        assert!(messages.iter().any(|m| matches!(
            m,
            GroupMessage::MemberStatus(u) if u.peer == B && u.status == MemberStatus::SyncingClock
        )));
        assert_eq!(p.members().status_of(B), Some(MemberStatus::SyncingClock));
    }

    #[traced_test]
    #[test]
    fn clock_announcement_promotes_syncing_clock_member() {
        let mut p = creator();
        p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));
        p.handle(Event::SystemOffsetSample {
            peer: B,
            offset_ms: 0,
            lag_ms: 5,
        });

        let actions = p.handle(msg(
            B,
            GroupMessage::ClockOffset(ClockOffset {
                peer: B,
                offset_ms: -1,
            }),
        ));
        assert_eq!(p.members().status_of(B), Some(MemberStatus::Active));
        assert!(sent(&actions).iter().any(|m| matches!(
            m,
            GroupMessage::MemberStatus(u) if u.peer == B && u.status == MemberStatus::Active
        )));
    }

    #[test]
    fn leader_sequences_and_applies_its_own_requests() {
        let mut p = creator();
        let actions = p.handle(Event::SubmitRequest {
            payload: vec![7, 8],
        });

        let seqs: Vec<SeqNum> = sent(&actions)
            .iter()
            .filter_map(|m| match m {
                GroupMessage::Command(c) => Some(c.command.seq),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![SeqNum(0)]);

        // Nothing applied until the broadcast loops back.
        assert!(p.app().log.is_empty());
        echo_broadcasts(&mut p, &actions);
        assert_eq!(p.app().log, vec![7, 8]);
        assert_eq!(p.applied_seq(), Some(SeqNum(0)));
    }

    #[test]
    fn commands_from_non_leader_are_dropped() {
        let mut p = creator();
        let command = Command::app(lockstep_types::EpochNum(0), SeqNum(0), vec![1]);
        p.handle(msg(
            B,
            GroupMessage::Command(CommandMessage { term: 0, command }),
        ));
        assert_eq!(p.applied_seq(), None);
        assert!(p.app().log.is_empty());
    }

    #[traced_test]
    #[test]
    fn checkpoint_seals_epoch_and_nominates_successor() {
        let mut p = creator();
        // Admit B all the way to Active so a successor exists.
        p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));
        p.handle(Event::SystemOffsetSample {
            peer: B,
            offset_ms: 0,
            lag_ms: 5,
        });
        p.handle(msg(
            B,
            GroupMessage::ClockOffset(ClockOffset {
                peer: B,
                offset_ms: -1,
            }),
        ));

        // Walk time past the checkpoint period (plus max jitter).
        p.set_time(Duration::from_secs(13));
        let actions = p.handle(Event::Tick);
        let checkpoint_sent = sent(&actions).iter().any(|m| {
            matches!(
                m,
                GroupMessage::Command(c)
                    if matches!(c.command.payload, CommandPayload::Checkpoint { .. })
            )
        });
        assert!(checkpoint_sent);

        // Applying the checkpoint seals epoch 0 and schedules the handover.
        let follow_ups = echo_broadcasts(&mut p, &actions);
        let set_leader = sent(&follow_ups)
            .iter()
            .filter_map(|m| match m {
                GroupMessage::SetLeader(sl) => Some(*sl),
                _ => None,
            })
            .next()
            .expect("successor nomination");
        assert_eq!(set_leader.new_leader, B);
        assert_eq!(set_leader.term, 1);
        assert_eq!(set_leader.effective_epoch, lockstep_types::EpochNum(3));
    }

    #[traced_test]
    #[test]
    fn promoted_leader_resumes_sequence_numbering() {
        // B follows A and learns the membership from A's announcements.
        let mut p = GroupProtocol::join(info(), B, "bob", GroupConfig::default(), LogApp::default());
        p.set_time(Duration::from_millis(1));
        p.handle(Event::Tick);
        p.handle(msg(
            A,
            GroupMessage::Heartbeat(Heartbeat {
                term: 0,
                last_seq: None,
            }),
        ));
        for (peer, name) in [(B, "bob"), (A, "alice")] {
            p.handle(msg(
                A,
                GroupMessage::MemberJoined(MemberJoined {
                    peer,
                    app_data: name.into(),
                }),
            ));
            p.handle(msg(
                A,
                GroupMessage::MemberStatus(MemberStatusUpdate {
                    peer,
                    status: MemberStatus::Active,
                }),
            ));
        }

        // A sequences two app commands, hands leadership to B at the next
        // epoch boundary, then seals the epoch at sequence 2.
        for seq in [0u64, 1] {
            p.handle(msg(
                A,
                GroupMessage::Command(CommandMessage {
                    term: 0,
                    command: Command::app(lockstep_types::EpochNum(0), SeqNum(seq), vec![seq as u8]),
                }),
            ));
        }
        p.handle(msg(
            A,
            GroupMessage::SetLeader(SetLeader {
                new_leader: B,
                term: 1,
                effective_epoch: lockstep_types::EpochNum(1),
            }),
        ));
        p.handle(msg(
            A,
            GroupMessage::Command(CommandMessage {
                term: 0,
                command: Command::checkpoint(
                    lockstep_types::EpochNum(0),
                    SeqNum(2),
                    GroupTime(500),
                ),
            }),
        ));
        assert!(p.is_leader());
        assert_eq!(p.term(), 1);

        // The first command B issues continues the stream where A left it.
        let actions = p.handle(Event::SubmitRequest { payload: vec![9] });
        let issued: Vec<(u64, SeqNum)> = sent(&actions)
            .iter()
            .filter_map(|m| match m {
                GroupMessage::Command(c) => Some((c.term, c.command.seq)),
                _ => None,
            })
            .collect();
        assert_eq!(issued, vec![(1, SeqNum(3))]);
    }

    #[test]
    fn late_joiner_is_put_on_the_state_sync_track() {
        let mut p = creator();
        // Sequence some history first.
        let actions = p.handle(Event::SubmitRequest { payload: vec![1] });
        echo_broadcasts(&mut p, &actions);

        let actions = p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));
        assert!(sent(&actions).iter().any(|m| matches!(
            m,
            GroupMessage::MemberStatus(u) if u.peer == B && u.status == MemberStatus::SyncingState
        )));
    }

    #[traced_test]
    #[test]
    fn leader_serves_catch_up_commands_on_sync_request() {
        let mut p = creator();
        for byte in [1u8, 2, 3] {
            let actions = p.handle(Event::SubmitRequest {
                payload: vec![byte],
            });
            echo_broadcasts(&mut p, &actions);
        }
        p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));

        p.handle(msg(
            B,
            GroupMessage::SyncRequest(SyncRequest {
                expected_seq: SeqNum(0),
                first_stashed_seq: None,
            }),
        ));
        p.set_time(Duration::from_millis(100));
        let actions = p.handle(Event::Tick);

        let served: Vec<SeqNum> = actions
            .iter()
            .filter_map(|a| match a {
                Action::Unicast { to, envelope } if *to == B => match &envelope.message {
                    GroupMessage::Command(c) => Some(c.command.seq),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(served, vec![SeqNum(0), SeqNum(1), SeqNum(2)]);
    }

    #[traced_test]
    #[test]
    fn sync_completion_promotes_to_clock_sync() {
        let mut p = creator();
        let actions = p.handle(Event::SubmitRequest { payload: vec![1] });
        echo_broadcasts(&mut p, &actions);
        p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));
        assert_eq!(p.members().status_of(B), Some(MemberStatus::SyncingState));

        // A stale completion (history grew since) is ignored.
        let actions = p.handle(Event::SubmitRequest { payload: vec![2] });
        echo_broadcasts(&mut p, &actions);
        p.handle(msg(
            B,
            GroupMessage::SyncCompletion(SyncCompletion {
                seq: SeqNum(0),
                hash: Hash::ZERO,
            }),
        ));
        assert_eq!(p.members().status_of(B), Some(MemberStatus::SyncingState));

        p.handle(msg(
            B,
            GroupMessage::SyncCompletion(SyncCompletion {
                seq: SeqNum(1),
                hash: Hash::ZERO,
            }),
        ));
        assert_eq!(p.members().status_of(B), Some(MemberStatus::SyncingClock));
    }

    #[traced_test]
    #[test]
    fn leader_departure_falls_back_to_oldest_active() {
        // B follows A, knows itself Active, and has no scheduled successor.
        let mut p = GroupProtocol::join(info(), B, "bob", GroupConfig::default(), LogApp::default());
        p.set_time(Duration::from_millis(1));
        p.handle(Event::Tick);
        p.handle(msg(
            A,
            GroupMessage::Heartbeat(Heartbeat {
                term: 0,
                last_seq: None,
            }),
        ));
        p.handle(msg(
            A,
            GroupMessage::MemberJoined(MemberJoined {
                peer: B,
                app_data: "bob".into(),
            }),
        ));
        p.handle(msg(
            A,
            GroupMessage::MemberStatus(MemberStatusUpdate {
                peer: B,
                status: MemberStatus::Active,
            }),
        ));
        // A is in B's table too (replayed by the leader).
        p.handle(msg(
            A,
            GroupMessage::MemberJoined(MemberJoined {
                peer: A,
                app_data: "alice".into(),
            }),
        ));
        p.handle(msg(
            A,
            GroupMessage::MemberStatus(MemberStatusUpdate {
                peer: A,
                status: MemberStatus::Active,
            }),
        ));

        let actions = p.handle(Event::PeerLeftNetwork { peer: A });
        assert!(p.is_leader());
        assert_eq!(p.leader(), Some(B));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Notify(Notification::LeaderChanged { leader, .. }) if *leader == B)));
    }

    #[traced_test]
    #[test]
    fn missing_member_is_skipped_in_successor_nomination() {
        let mut p = creator();
        // Admit B all the way to Active.
        p.handle(msg(B, GroupMessage::JoinRequest(JoinRequest::new(B, "bob"))));
        p.handle(Event::SystemOffsetSample {
            peer: B,
            offset_ms: 0,
            lag_ms: 5,
        });
        p.handle(msg(
            B,
            GroupMessage::ClockOffset(ClockOffset {
                peer: B,
                offset_ms: -1,
            }),
        ));

        // B drops off the transport; the epoch still seals, but the only
        // nominee is unreachable, so no handover is scheduled.
        p.handle(Event::PeerMissing { peer: B });
        p.set_time(Duration::from_secs(13));
        let actions = p.handle(Event::Tick);
        let follow_ups = echo_broadcasts(&mut p, &actions);
        assert!(!sent(&follow_ups)
            .iter()
            .any(|m| matches!(m, GroupMessage::SetLeader(_))));
        assert!(p.is_leader());

        // B comes back; the next seal nominates it.
        p.handle(Event::PeerReturned { peer: B });
        p.set_time(Duration::from_secs(26));
        let actions = p.handle(Event::Tick);
        let follow_ups = echo_broadcasts(&mut p, &actions);
        let nominated = sent(&follow_ups).iter().find_map(|m| match m {
            GroupMessage::SetLeader(sl) => Some(sl.new_leader),
            _ => None,
        });
        assert_eq!(nominated, Some(B));
    }

    #[test]
    fn groups_query_collects_until_window_closes() {
        let mut p = creator();
        let actions = p.handle(Event::RequestGroups {
            request_id: RequestId(1),
        });
        assert!(sent(&actions)
            .iter()
            .any(|m| matches!(m, GroupMessage::GroupsRequest(_))));

        p.handle(msg(
            B,
            GroupMessage::GroupAnnounce(GroupAnnounce {
                info: GroupInfo::new(GroupId::new("other"), "other", B),
            }),
        ));

        p.set_time(Duration::from_millis(1_001));
        let actions = p.handle(Event::Tick);
        let discovered = actions.iter().find_map(|a| match a {
            Action::Notify(Notification::GroupsDiscovered { request_id, groups }) => {
                Some((*request_id, groups.len()))
            }
            _ => None,
        });
        assert_eq!(discovered, Some((RequestId(1), 1)));
    }
}
