use std::time::Duration;

use log::{error, info, warn};
use rand::Rng;

use crate::config::{Account, Config};
use crate::game::{self, FarmingStatus};
use crate::http_client::{ApiClient, ReqwestTransport};
use crate::session;
use crate::stats::{ActionKind, StatsBook};
use crate::tasks;
use crate::token_store::TokenStore;
use crate::tribe;
use crate::user;

/// Per-run tally, used for the end-of-run summary and the scan totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunReport {
    pub daily_claimed: bool,
    pub farming_claimed: bool,
    pub farming_started: bool,
    pub tasks_claimed: u32,
    pub tasks_started: u32,
    pub wheel_spins: u32,
    pub earned: f64,
    pub failures: u32,
}

pub(crate) async fn random_pause(bounds: (u64, u64)) {
    let (lo, hi) = bounds;
    if hi == 0 {
        return;
    }
    let wait = {
        let mut rng = rand::thread_rng();
        rng.gen_range(lo..=hi.max(lo))
    };
    tokio::time::sleep(Duration::from_secs(wait)).await;
}

/// Builds the per-account transport (with its proxy) and runs one cycle.
/// `None` means the account produced no result this cycle; the scheduler
/// moves on regardless.
pub async fn run_account(
    account: &Account,
    config: &Config,
    store: TokenStore,
    stats: StatsBook,
) -> Option<RunReport> {
    let transport = match ReqwestTransport::new(account.proxy.as_deref()) {
        Ok(transport) => transport,
        Err(e) => {
            error!("{}: failed to build HTTP client: {}", account.name, e);
            return None;
        }
    };
    let mut api = ApiClient::new(
        Box::new(transport),
        store,
        &account.name,
        &config.api_base,
        account.user_agent.as_deref(),
    );
    api.set_retries(config.max_retries);
    run_account_with(&mut api, account, config, &stats).await
}

/// Orchestrates one account run over an already-built client. Sub-flows run
/// strictly in order (daily reward, farming, tasks, wheel, tribe); a failing
/// sub-flow is tallied and never blocks the ones after it.
pub async fn run_account_with(
    api: &mut ApiClient,
    account: &Account,
    config: &Config,
    stats: &StatsBook,
) -> Option<RunReport> {
    info!("{}: starting run", account.name);
    session::hydrate(api, config.token_max_age_hours);
    if !session::ensure_authenticated(api, &account.telegram_data).await {
        error!("{}: authentication failed, skipping account", account.name);
        return None;
    }

    let mut report = RunReport::default();
    if config.use_random_delays {
        random_pause((1, 3)).await;
    }

    if let Some(profile) = user::me(api).await {
        if let Some(username) = profile.username {
            info!("{}: playing as {}", account.name, username);
        }
    }
    let opening_balance = game::balance(api).await;
    if let Some(balance) = &opening_balance {
        info!(
            "{}: balance {} ({} play passes)",
            account.name, balance.available_balance, balance.play_passes
        );
    }

    if config.auto_daily_reward {
        if !daily_reward_flow(api, &mut report, stats).await {
            report.failures += 1;
        }
        random_pause(config.account_delay_bounds()).await;
    }

    if config.auto_farming {
        if !farming_flow(api, &mut report, stats).await {
            report.failures += 1;
        }
        random_pause(config.account_delay_bounds()).await;
    }

    if config.auto_tasks {
        let outcome = tasks::claim_all(api, config.recheck_bounds()).await;
        report.tasks_claimed = outcome.claimed;
        report.tasks_started = outcome.started;
        for _ in 0..outcome.claimed {
            stats.record(&account.name, ActionKind::Task, 0.0);
        }
        if !outcome.completed {
            report.failures += 1;
        }
        random_pause(config.account_delay_bounds()).await;
    }

    if config.auto_wheel {
        if !wheel_flow(api, &mut report, stats).await {
            report.failures += 1;
        }
        random_pause(config.account_delay_bounds()).await;
    }

    if config.auto_tribe {
        tribe_flow(api, config).await;
    }

    if config.auto_friend_claim {
        friend_flow(api, &mut report, stats).await;
    }

    if let (Some(opened), Some(closed)) = (&opening_balance, &game::balance(api).await) {
        let delta = closed.available_balance - opened.available_balance;
        if delta > 0.0 {
            info!("{}: earned {} this session", account.name, delta);
        }
    }

    info!(
        "{}: run finished (daily={}, farming claimed={} started={}, tasks claimed={} started={}, wheel spins={}, failures={})",
        account.name,
        report.daily_claimed,
        report.farming_claimed,
        report.farming_started,
        report.tasks_claimed,
        report.tasks_started,
        report.wheel_spins,
        report.failures
    );
    Some(report)
}

async fn daily_reward_flow(api: &mut ApiClient, report: &mut RunReport, stats: &StatsBook) -> bool {
    let status = match game::daily_reward(api).await {
        Some(status) => status,
        None => return false,
    };
    if !status.can_claim {
        match status.next_claim_time {
            Some(next) => info!("{}: next daily reward at {}", api.account(), next),
            None => info!("{}: daily reward not available yet", api.account()),
        }
        return true;
    }
    match game::claim_daily_reward(api).await {
        Some(outcome) => {
            info!("{}: daily reward claimed (+{})", api.account(), outcome.amount);
            report.daily_claimed = true;
            report.earned += outcome.amount;
            stats.record(api.account(), ActionKind::DailyReward, outcome.amount);
            true
        }
        None => {
            error!("{}: failed to claim daily reward", api.account());
            false
        }
    }
}

/// A claimable cycle is claimed and immediately restarted; the slot never
/// sits idle after a claim.
async fn farming_flow(api: &mut ApiClient, report: &mut RunReport, stats: &StatsBook) -> bool {
    match game::farming_status(api).await {
        FarmingStatus::NotRunning => match game::start_farming(api).await {
            Some(cycle) => {
                match cycle.end_time {
                    Some(end) => info!("{}: farming started, ends at {}", api.account(), end),
                    None => info!("{}: farming started", api.account()),
                }
                report.farming_started = true;
                true
            }
            None => {
                error!("{}: failed to start farming", api.account());
                false
            }
        },
        FarmingStatus::Running { can_claim: true, .. } => {
            match game::claim_farming(api).await {
                Some(outcome) => {
                    info!("{}: farming claimed (+{})", api.account(), outcome.amount);
                    report.farming_claimed = true;
                    report.earned += outcome.amount;
                    stats.record(api.account(), ActionKind::Farming, outcome.amount);
                }
                None => {
                    error!("{}: failed to claim farming", api.account());
                    return false;
                }
            }
            match game::start_farming(api).await {
                Some(cycle) => {
                    match cycle.end_time {
                        Some(end) => {
                            info!("{}: next farming cycle ends at {}", api.account(), end)
                        }
                        None => info!("{}: next farming cycle started", api.account()),
                    }
                    report.farming_started = true;
                }
                None => warn!("{}: failed to restart farming after claim", api.account()),
            }
            true
        }
        FarmingStatus::Running {
            can_claim: false,
            end_time,
        } => {
            match end_time {
                Some(end) => info!("{}: farming in progress, ends at {}", api.account(), end),
                None => info!("{}: farming in progress", api.account()),
            }
            true
        }
    }
}

async fn wheel_flow(api: &mut ApiClient, report: &mut RunReport, stats: &StatsBook) -> bool {
    let state = match game::wheel_state(api).await {
        Some(state) => state,
        None => {
            info!("{}: wheel not available", api.account());
            return true;
        }
    };
    if !state.can_spin || state.spins_left <= 0 {
        match state.next_spin_time {
            Some(next) => info!("{}: next wheel spin at {}", api.account(), next),
            None => info!("{}: no wheel spins left", api.account()),
        }
        return true;
    }
    match game::spin_wheel(api).await {
        Some(prize) => {
            info!(
                "{}: wheel spun, prize {} (+{})",
                api.account(),
                prize.prize.as_deref().unwrap_or("unknown"),
                prize.amount
            );
            report.wheel_spins += 1;
            report.earned += prize.amount;
            stats.record(api.account(), ActionKind::Wheel, prize.amount);
            true
        }
        None => {
            error!("{}: failed to spin wheel", api.account());
            false
        }
    }
}

async fn tribe_flow(api: &mut ApiClient, config: &Config) {
    let current = tribe::my_tribe(api).await;
    match &current {
        Some(tribe) => info!(
            "{}: in tribe '{}'{}",
            api.account(),
            tribe.title.as_deref().unwrap_or("unknown"),
            tribe
                .rank
                .map(|rank| format!(" (rank {})", rank))
                .unwrap_or_default()
        ),
        None => info!("{}: not in a tribe", api.account()),
    }
    if current.is_none() {
        if let Some(target) = config.tribe_chatname.as_deref() {
            if tribe::by_chatname(api, target).await.is_none() {
                warn!("{}: tribe '{}' not found", api.account(), target);
                return;
            }
            if tribe::join(api, target).await {
                info!("{}: joined tribe '{}'", api.account(), target);
            } else {
                warn!("{}: failed to join tribe '{}'", api.account(), target);
            }
        }
    }
}

async fn friend_flow(api: &mut ApiClient, report: &mut RunReport, stats: &StatsBook) {
    let claimable = user::friends_balance(api).await.map_or(false, |balance| {
        balance
            .get("canClaim")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    });
    if !claimable {
        return;
    }
    if let Some(outcome) = user::claim_friend_reward(api).await {
        if outcome.amount > 0.0 {
            info!("{}: friend reward claimed (+{})", api.account(), outcome.amount);
            report.earned += outcome.amount;
            stats.record(api.account(), ActionKind::FriendReward, outcome.amount);
        }
    }
}
