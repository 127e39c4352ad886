//! Redis-backed admission state.
//!
//! Keys:
//! - `active_slots` (SET): users currently allowed into selection
//! - `waiting_queue` (ZSET): waiting users scored by join nanoseconds
//! - `slot_session:{userId}` (STRING with TTL): admission liveness marker
//! - `queue_limit` (STRING): max concurrent users
//! - `promotion_lock` (STRING, 5 s): serializes promotion passes
//!
//! The admit script below is the only production path into `active_slots`.
//! It co-mutates the session marker, so set membership and marker existence
//! never diverge for longer than a marker TTL lapse (which the cleaner
//! reconciles).

use super::StoreError;
use crate::types::UserId;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::str::FromStr;

/// Compare-and-add into the active set: admits the user and writes their
/// session marker only while the set is below the limit. Returns 1 on
/// admission, 0 when full.
const ADMIT_SCRIPT: &str = r"
    local active_key = KEYS[1]
    local session_key = KEYS[2]
    local limit_key = KEYS[3]
    local user_id = ARGV[1]
    local ttl = tonumber(ARGV[2])
    local default_limit = tonumber(ARGV[3])

    local limit = tonumber(redis.call('GET', limit_key) or default_limit)
    local active_count = redis.call('SCARD', active_key)

    if active_count < limit then
        redis.call('SADD', active_key, user_id)
        redis.call('SET', session_key, 'active', 'EX', ttl)
        return 1
    else
        return 0
    end
";

const ACTIVE_SLOTS_KEY: &str = "active_slots";
const WAITING_QUEUE_KEY: &str = "waiting_queue";
const QUEUE_LIMIT_KEY: &str = "queue_limit";
const PROMOTION_LOCK_KEY: &str = "promotion_lock";

/// Redis-backed store for admission state.
#[derive(Clone)]
pub struct AdmissionStore {
    conn: ConnectionManager,
    session_ttl: u64,
    default_limit: i64,
    promotion_lock_ttl: u64,
}

impl AdmissionStore {
    /// Create a store over an existing connection manager.
    #[must_use]
    pub const fn new(
        conn: ConnectionManager,
        session_ttl: u64,
        default_limit: i64,
        promotion_lock_ttl: u64,
    ) -> Self {
        Self {
            conn,
            session_ttl,
            default_limit,
            promotion_lock_ttl,
        }
    }

    fn marker_key(user_id: UserId) -> String {
        format!("slot_session:{user_id}")
    }

    /// Whether the user is a member of the active set.
    pub async fn is_active(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let member: bool = conn
            .sismember(ACTIVE_SLOTS_KEY, user_id.to_string())
            .await?;
        Ok(member)
    }

    /// Cardinality of the active set.
    pub async fn active_count(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.scard(ACTIVE_SLOTS_KEY).await?;
        Ok(count)
    }

    /// All members of the active set. Entries that do not parse as UUIDs are
    /// skipped.
    pub async fn active_members(&self) -> Result<Vec<UserId>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(ACTIVE_SLOTS_KEY).await?;
        Ok(members
            .iter()
            .filter_map(|m| UserId::from_str(m).ok())
            .collect())
    }

    /// Whether the user's session marker still exists.
    pub async fn marker_exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(Self::marker_key(user_id)).await?;
        Ok(exists)
    }

    /// Remaining TTL of the user's session marker in seconds. `None` when
    /// the marker is gone or has no expiry.
    pub async fn marker_ttl(&self, user_id: UserId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(Self::marker_key(user_id)).await?;
        Ok(if ttl > 0 { Some(ttl) } else { None })
    }

    /// Run the atomic admit script. Returns `true` when the user was
    /// admitted (and their marker written), `false` when the set is full.
    ///
    /// This is the sole production mutator of the active set.
    pub async fn try_admit(&self, user_id: UserId) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let admitted: i64 = redis::Script::new(ADMIT_SCRIPT)
            .key(ACTIVE_SLOTS_KEY)
            .key(Self::marker_key(user_id))
            .key(QUEUE_LIMIT_KEY)
            .arg(user_id.to_string())
            .arg(self.session_ttl)
            .arg(self.default_limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(admitted == 1)
    }

    /// Add the user to the waiting queue scored by the supplied monotonic
    /// join timestamp (nanoseconds).
    pub async fn enqueue_waiting(&self, user_id: UserId, score_nanos: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .zadd(WAITING_QUEUE_KEY, user_id.to_string(), score_nanos)
            .await?;
        Ok(())
    }

    /// 1-based position of the user in the waiting queue, if present.
    pub async fn waiting_position(&self, user_id: UserId) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        let rank: Option<i64> = conn.zrank(WAITING_QUEUE_KEY, user_id.to_string()).await?;
        Ok(rank.map(|r| r + 1))
    }

    /// Size of the waiting queue. This is the only source of truth for the
    /// waiting count.
    pub async fn waiting_count(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.zcard(WAITING_QUEUE_KEY).await?;
        Ok(count)
    }

    /// The first `n` waiting users in FIFO (score) order.
    pub async fn waiting_head(&self, n: i64) -> Result<Vec<UserId>, StoreError> {
        if n <= 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .zrange(WAITING_QUEUE_KEY, 0, (n - 1) as isize)
            .await?;
        Ok(members
            .iter()
            .filter_map(|m| UserId::from_str(m).ok())
            .collect())
    }

    /// All waiting users in FIFO (score) order.
    pub async fn waiting_members(&self) -> Result<Vec<UserId>, StoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrange(WAITING_QUEUE_KEY, 0, -1).await?;
        Ok(members
            .iter()
            .filter_map(|m| UserId::from_str(m).ok())
            .collect())
    }

    /// Remove the user from the waiting queue.
    pub async fn remove_waiting(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zrem(WAITING_QUEUE_KEY, user_id.to_string()).await?;
        Ok(())
    }

    /// Remove the user from the active set and delete their marker, as one
    /// atomic pipeline.
    pub async fn remove_active(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(ACTIVE_SLOTS_KEY, user_id.to_string())
            .ignore()
            .del(Self::marker_key(user_id))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove the user from active set, marker and waiting queue, as one
    /// atomic pipeline. Used by leave/logout.
    pub async fn leave(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::pipe()
            .atomic()
            .srem(ACTIVE_SLOTS_KEY, user_id.to_string())
            .ignore()
            .del(Self::marker_key(user_id))
            .ignore()
            .zrem(WAITING_QUEUE_KEY, user_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Current concurrency limit (default when the key is unset or garbled).
    pub async fn limit(&self) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(QUEUE_LIMIT_KEY).await?;
        Ok(raw
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.default_limit))
    }

    /// Store a new concurrency limit.
    pub async fn set_limit(&self, limit: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(QUEUE_LIMIT_KEY, limit).await?;
        Ok(())
    }

    /// Try to acquire the promotion lock. Promotion passes are serialized;
    /// a held lock means another pass is running and the caller skips.
    pub async fn try_promotion_lock(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(PROMOTION_LOCK_KEY)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.promotion_lock_ttl)
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    /// Release the promotion lock.
    pub async fn release_promotion_lock(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(PROMOTION_LOCK_KEY).await?;
        Ok(())
    }

    /// The single-session token the auth collaborator wrote for this user,
    /// if any. Read-only from the gateway's side.
    pub async fn active_token(&self, user_id: UserId) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let token: Option<String> = conn.get(format!("active_token:{user_id}")).await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_script_touches_only_contract_keys() {
        assert!(ADMIT_SCRIPT.contains("SCARD"));
        assert!(ADMIT_SCRIPT.contains("SADD"));
        assert!(ADMIT_SCRIPT.contains("'EX'"));
        // Keys are passed in, never hardcoded in the script body.
        assert!(!ADMIT_SCRIPT.contains("active_slots"));
        assert!(!ADMIT_SCRIPT.contains("slot_session"));
    }

    #[test]
    fn marker_keys_are_per_user() {
        let a = UserId::new();
        let b = UserId::new();
        assert_ne!(AdmissionStore::marker_key(a), AdmissionStore::marker_key(b));
        assert!(AdmissionStore::marker_key(a).starts_with("slot_session:"));
    }
}
