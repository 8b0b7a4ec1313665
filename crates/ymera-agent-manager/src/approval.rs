//! Two-phase approval for the one destructive action the state machine
//! names (spec §4.2/§4.6): `DELETED` is only reachable through a pending
//! record a first admin creates and a second admin redeems with a token
//! neither of them could produce alone.

use std::sync::Arc;

use dashmap::DashMap;
use rand::RngCore;
use sha2::{Digest, Sha256};
use ymera_types::clock::Clock;
use ymera_types::{AgentId, ApprovalId};

#[derive(Debug, Clone)]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    pub action: String,
    pub target: AgentId,
    pub requested_by: String,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: chrono::DateTime<chrono::Utc>,
    token_hash: String,
    consumed: bool,
}

pub enum ApprovalCheck {
    Missing,
    Expired,
    WrongToken,
}

pub struct ApprovalStore {
    approvals: DashMap<ApprovalId, PendingApproval>,
    by_target: DashMap<AgentId, ApprovalId>,
    clock: Arc<dyn Clock>,
}

impl ApprovalStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            approvals: DashMap::new(),
            by_target: DashMap::new(),
            clock,
        }
    }

    /// Creates a pending approval and returns its id plus the raw token —
    /// the token is handed to the caller once and never stored in the
    /// clear; only its hash lives in the record. A fresh request for the
    /// same target replaces any earlier, unconsumed one rather than
    /// stacking, since only the most recent request can be honored anyway.
    pub fn request(&self, action: impl Into<String>, target: AgentId, requested_by: impl Into<String>, ttl_seconds: i64) -> (ApprovalId, String) {
        let raw_token = generate_token();
        let approval_id = ApprovalId::new();
        let now = self.clock.now();
        let record = PendingApproval {
            approval_id,
            action: action.into(),
            target: target.clone(),
            requested_by: requested_by.into(),
            requested_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_seconds),
            token_hash: hash_token(&raw_token),
            consumed: false,
        };
        self.approvals.insert(approval_id, record);
        self.by_target.insert(target, approval_id);
        (approval_id, raw_token)
    }

    pub fn get(&self, approval_id: &ApprovalId) -> Option<PendingApproval> {
        self.approvals.get(approval_id).map(|e| e.clone())
    }

    /// Validates `token` against the named approval, consuming it on
    /// success. Distinguishes why a redemption failed, matching the
    /// "wrong token returns InvalidRequest, missing/expired returns
    /// ApprovalRequired" split in the worked delete-agent example.
    pub fn redeem(&self, approval_id: &ApprovalId, token: &str) -> Result<PendingApproval, ApprovalCheck> {
        let mut entry = self.approvals.get_mut(approval_id).ok_or(ApprovalCheck::Missing)?;
        if entry.consumed {
            return Err(ApprovalCheck::Missing);
        }
        if self.clock.now() > entry.expires_at {
            return Err(ApprovalCheck::Expired);
        }
        if hash_token(token) != entry.token_hash {
            return Err(ApprovalCheck::WrongToken);
        }
        entry.consumed = true;
        Ok(entry.clone())
    }

    /// Redeems whatever pending approval currently addresses `target`,
    /// collapsing every failure mode (no pending record, wrong token,
    /// expired) into one signal — the façade's `transition_agent` only
    /// distinguishes "approved" from "not approved", unlike the dedicated
    /// `approve` call.
    pub fn redeem_for_target(&self, target: &AgentId, token: Option<&str>) -> Result<PendingApproval, ()> {
        let token = token.ok_or(())?;
        let approval_id = self.by_target.get(target).map(|e| *e).ok_or(())?;
        self.redeem(&approval_id, token).map_err(|_| ())
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ymera_types::clock::FixedClock;

    fn store() -> ApprovalStore {
        ApprovalStore::new(Arc::new(FixedClock::new(chrono::Utc::now())))
    }

    #[test]
    fn correct_token_redeems_exactly_once() {
        let store = store();
        let (approval_id, token) = store.request("delete_agent", AgentId::new("a1"), "admin1", 3600);
        assert!(store.redeem(&approval_id, &token).is_ok());
        assert!(matches!(store.redeem(&approval_id, &token), Err(ApprovalCheck::Missing)));
    }

    #[test]
    fn wrong_token_is_distinguished_from_missing_or_expired() {
        let store = store();
        let (approval_id, _token) = store.request("delete_agent", AgentId::new("a1"), "admin1", 3600);
        assert!(matches!(store.redeem(&approval_id, "not-the-token"), Err(ApprovalCheck::WrongToken)));
    }

    #[test]
    fn expired_approval_cannot_be_redeemed() {
        let clock = FixedClock::new(chrono::Utc::now());
        let store = ApprovalStore::new(Arc::new(clock.clone()));
        let (approval_id, token) = store.request("delete_agent", AgentId::new("a1"), "admin1", 10);
        clock.advance(chrono::Duration::seconds(11));
        assert!(matches!(store.redeem(&approval_id, &token), Err(ApprovalCheck::Expired)));
    }

    #[test]
    fn redeem_for_target_finds_the_most_recent_request() {
        let store = store();
        let target = AgentId::new("a1");
        let (_first_id, _first_token) = store.request("delete_agent", target.clone(), "admin1", 3600);
        let (_second_id, second_token) = store.request("delete_agent", target.clone(), "admin1", 3600);
        assert!(store.redeem_for_target(&target, Some(&second_token)).is_ok());
    }
}
