use std::collections::HashSet;
use std::time::Duration;

use log::{error, info, warn};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;

use crate::http_client::{ApiClient, ApiDomain, RequestOptions};

/// One initial walk plus up to three rechecks; beyond that the flow aborts
/// as a failure rather than chasing a server that never stabilizes.
const MAX_PASSES: u32 = 4;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSection {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub sub_sections: Vec<TaskSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskOutcome {
    pub claimed: u32,
    pub started: u32,
    /// False when the fetch failed or the list never settled within the
    /// pass cap.
    pub completed: bool,
}

pub async fn fetch_tasks(api: &mut ApiClient) -> Option<Vec<TaskSection>> {
    let value = api
        .get("/api/v1/tasks", RequestOptions::new(ApiDomain::Earn))
        .await?;
    match serde_json::from_value(value) {
        Ok(sections) => Some(sections),
        Err(e) => {
            error!("{}: malformed task list: {}", api.account(), e);
            None
        }
    }
}

pub async fn start_task(api: &mut ApiClient, id: &str) -> bool {
    api.post(
        &format!("/api/v1/tasks/{}/start", id),
        RequestOptions::new(ApiDomain::Earn),
    )
    .await
    .is_some()
}

pub async fn claim_task(api: &mut ApiClient, id: &str) -> bool {
    api.post(
        &format!("/api/v1/tasks/{}/claim", id),
        RequestOptions::new(ApiDomain::Earn),
    )
    .await
    .is_some()
}

/// Keyword validation for tasks that require an answer before claiming.
pub async fn validate_task(api: &mut ApiClient, id: &str, keyword: Option<&str>) -> bool {
    let mut options = RequestOptions::new(ApiDomain::Earn);
    if let Some(keyword) = keyword {
        options = options.body(json!({ "keyword": keyword }));
    }
    api.post(&format!("/api/v1/tasks/{}/validate", id), options)
        .await
        .is_some()
}

/// Walks the whole task tree, starting NOT_STARTED tasks and claiming
/// READY_FOR_CLAIM ones. Acting on anything schedules a recheck pass after
/// a randomized cooldown, because a just-started task may become claimable
/// and a claim may unlock a dependent task.
///
/// The processed set is keyed by (id, status) and lives for the whole
/// invocation: a task resurfacing unchanged is never acted on twice, while
/// a started task that flips to READY_FOR_CLAIM is still picked up.
pub async fn claim_all(api: &mut ApiClient, cooldown: (u64, u64)) -> TaskOutcome {
    let mut outcome = TaskOutcome::default();
    let mut processed: HashSet<(String, String)> = HashSet::new();
    info!("{}: processing tasks", api.account());

    for pass in 1..=MAX_PASSES {
        let sections = match fetch_tasks(api).await {
            Some(sections) => sections,
            None => return outcome,
        };

        let mut recheck = false;
        let mut tasks = Vec::new();
        for section in &sections {
            collect_tasks(section, &mut tasks);
        }
        for task in tasks {
            handle_task(api, task, &mut processed, &mut recheck, &mut outcome).await;
        }

        if !recheck {
            info!("{}: tasks settled after {} pass(es)", api.account(), pass);
            outcome.completed = true;
            return outcome;
        }
        if pass < MAX_PASSES {
            let wait = {
                let mut rng = rand::thread_rng();
                rng.gen_range(cooldown.0..=cooldown.1.max(cooldown.0))
            };
            info!("{}: rechecking tasks in {}s", api.account(), wait);
            tokio::time::sleep(Duration::from_secs(wait)).await;
        }
    }

    warn!(
        "{}: task list did not settle within {} passes",
        api.account(),
        MAX_PASSES
    );
    outcome
}

fn collect_tasks<'a>(section: &'a TaskSection, out: &mut Vec<&'a Task>) {
    out.extend(section.tasks.iter());
    for sub_section in &section.sub_sections {
        collect_tasks(sub_section, out);
    }
}

async fn handle_task(
    api: &mut ApiClient,
    task: &Task,
    processed: &mut HashSet<(String, String)>,
    recheck: &mut bool,
    outcome: &mut TaskOutcome,
) {
    if task.is_hidden || task.kind.is_none() {
        return;
    }
    let (id, status) = match (&task.id, &task.status) {
        (Some(id), Some(status)) => (id.clone(), status.clone()),
        _ => return,
    };
    if status == "FINISHED" {
        return;
    }
    let title = task.title.as_deref().unwrap_or("unnamed task");

    match status.as_str() {
        "READY_FOR_CLAIM" => {
            if processed.contains(&(id.clone(), status.clone())) {
                return;
            }
            if claim_task(api, &id).await {
                info!("{}: claimed task '{}'", api.account(), title);
                processed.insert((id, status));
                outcome.claimed += 1;
                *recheck = true;
            } else {
                warn!("{}: failed to claim task '{}'", api.account(), title);
            }
        }
        "NOT_STARTED" => {
            if processed.contains(&(id.clone(), status.clone())) {
                return;
            }
            if start_task(api, &id).await {
                info!("{}: started task '{}'", api.account(), title);
                processed.insert((id, status));
                outcome.started += 1;
                *recheck = true;
            } else {
                warn!("{}: failed to start task '{}'", api.account(), title);
            }
        }
        _ => {}
    }
}
