use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    DailyReward,
    Farming,
    Task,
    Wheel,
    FriendReward,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountStats {
    pub daily_rewards: u64,
    pub farming_claims: u64,
    pub tasks_completed: u64,
    pub wheel_spins: u64,
    pub friend_claims: u64,
    pub total_earned: f64,
    pub last_update: Option<DateTime<Utc>>,
}

struct Inner {
    path: PathBuf,
    entries: BTreeMap<String, AccountStats>,
}

/// Cumulative per-account counters, used only for reporting. Shared across
/// group workers; entries are keyed per account so interleaved writes from
/// different workers never clobber each other's accounts.
#[derive(Clone)]
pub struct StatsBook {
    inner: Arc<Mutex<Inner>>,
}

impl StatsBook {
    /// Opening never fails: an unreadable or corrupt file starts an empty
    /// book, as losing statistics should never stop the farm loop.
    pub fn open(path: PathBuf) -> StatsBook {
        let entries = fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        StatsBook {
            inner: Arc::new(Mutex::new(Inner { path, entries })),
        }
    }

    pub fn record(&self, account: &str, kind: ActionKind, amount: f64) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entry = inner.entries.entry(account.to_string()).or_default();
        match kind {
            ActionKind::DailyReward => entry.daily_rewards += 1,
            ActionKind::Farming => entry.farming_claims += 1,
            ActionKind::Task => entry.tasks_completed += 1,
            ActionKind::Wheel => entry.wheel_spins += 1,
            ActionKind::FriendReward => entry.friend_claims += 1,
        }
        entry.total_earned += amount;
        entry.last_update = Some(Utc::now());

        let raw = match serde_json::to_string_pretty(&inner.entries) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to serialize statistics: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&inner.path, raw) {
            warn!("failed to write statistics file: {}", e);
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, AccountStats> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .clone()
    }

    /// Direct user output for the `stats` CLI mode.
    pub fn print(&self) {
        let entries = self.snapshot();
        if entries.is_empty() {
            println!("No statistics recorded yet.");
            return;
        }
        println!("Account statistics");
        println!("==================");
        for (account, stats) in entries {
            println!("\n{}:", account);
            println!("  daily rewards:   {}", stats.daily_rewards);
            println!("  farming claims:  {}", stats.farming_claims);
            println!("  tasks completed: {}", stats.tasks_completed);
            println!("  wheel spins:     {}", stats.wheel_spins);
            println!("  friend claims:   {}", stats.friend_claims);
            println!("  total earned:    {}", stats.total_earned);
            match stats.last_update {
                Some(when) => println!("  last update:     {}", when.to_rfc3339()),
                None => println!("  last update:     never"),
            }
        }
    }
}
