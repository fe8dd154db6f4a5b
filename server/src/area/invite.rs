//! Pending battle invitations.

use crate::error::Denial;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use towber_protocol::{InviteId, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invite {
    pub id: InviteId,
    pub inviter: PlayerId,
    pub target: PlayerId,
    pub created: Instant,
}

/// Invitations waiting for an answer, evicted after `expiry`.
#[derive(Debug)]
pub struct InviteBoard {
    invites: DashMap<InviteId, Invite>,
    expiry: Duration,
}

impl InviteBoard {
    pub fn new(expiry: Duration) -> Self {
        Self {
            invites: DashMap::new(),
            expiry,
        }
    }

    pub fn create(&self, id: InviteId, inviter: PlayerId, target: PlayerId) -> Invite {
        let invite = Invite {
            id,
            inviter,
            target,
            created: Instant::now(),
        };
        self.invites.insert(id, invite);
        tracing::debug!(invite = %id, %inviter, %target, "Battle invite created");
        invite
    }

    fn is_expired(&self, invite: &Invite, now: Instant) -> bool {
        now.duration_since(invite.created) > self.expiry
    }

    /// Take an invite for acceptance. Only its target may accept it.
    pub fn accept(&self, id: InviteId, acceptor: PlayerId) -> Result<Invite, Denial> {
        let now = Instant::now();
        let (_, invite) = self
            .invites
            .remove_if(&id, |_, invite| invite.target == acceptor)
            .ok_or(Denial::InviteNotFound)?;
        if self.is_expired(&invite, now) {
            return Err(Denial::InviteNotFound);
        }
        Ok(invite)
    }

    /// Decline an invite. Only its target may reject it.
    pub fn reject(&self, id: InviteId, rejector: PlayerId) -> Result<Invite, Denial> {
        self.invites
            .remove_if(&id, |_, invite| invite.target == rejector)
            .map(|(_, invite)| invite)
            .ok_or(Denial::InviteNotFound)
    }

    /// Drop every invite older than the expiry. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.invites.len();
        self.invites.retain(|_, invite| !self.is_expired(invite, now));
        before.saturating_sub(self.invites.len())
    }

    pub fn len(&self) -> usize {
        self.invites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invites.is_empty()
    }

    /// Periodically evict stale invites. Runs until the task is dropped.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            let evicted = self.sweep();
            if evicted > 0 {
                tracing::info!(evicted, "Expired battle invites removed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANN: PlayerId = PlayerId(1);
    const BOB: PlayerId = PlayerId(2);

    #[tokio::test(start_paused = true)]
    async fn test_only_target_can_accept() {
        let board = InviteBoard::new(Duration::from_secs(10));
        board.create(InviteId(1), ANN, BOB);

        assert_eq!(board.accept(InviteId(1), ANN), Err(Denial::InviteNotFound));
        assert_eq!(board.len(), 1);
        let invite = board.accept(InviteId(1), BOB).unwrap();
        assert_eq!(invite.inviter, ANN);
        assert!(board.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_expired_and_late_accept_is_denied() {
        let board = Arc::new(InviteBoard::new(Duration::from_secs(10)));
        board.create(InviteId(1), ANN, BOB);
        tokio::spawn(Arc::clone(&board).run_sweeper(Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(board.len(), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(board.is_empty());
        assert_eq!(board.accept(InviteId(1), BOB), Err(Denial::InviteNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_invite_denied_before_sweep() {
        let board = InviteBoard::new(Duration::from_secs(10));
        board.create(InviteId(4), ANN, BOB);
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(board.accept(InviteId(4), BOB), Err(Denial::InviteNotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_removes_invite() {
        let board = InviteBoard::new(Duration::from_secs(10));
        board.create(InviteId(2), ANN, BOB);
        assert!(board.reject(InviteId(2), ANN).is_err());
        assert!(board.reject(InviteId(2), BOB).is_ok());
        assert!(board.is_empty());
    }
}
