//! Task lifecycle registry
//!
//! Owns every task record from intake to eviction. One coarse lock guards
//! the map; every operation is O(1) and short, so the lock never competes
//! with the I/O-bound solving work. Status transitions are monotonic:
//! Pending -> Processing -> {Ready, Failed}, with Expired reachable only
//! from a terminal state once the TTL elapses. Eviction is lazy, performed
//! under capacity pressure rather than by a background sweep.

use crate::config::RegistryConfig;
use crate::error::{Error, ErrorCode, Result, TaskError};
use crate::proxy::ProxySpec;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Challenge variant selecting the trigger flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Visible checkbox that must be clicked before a challenge can appear
    Normal,
    /// Programmatically triggered, no visible control
    Invisible,
    /// Enterprise flavor: invisible trigger plus an action parameter and a
    /// dedicated callback token path
    Enterprise,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Normal => write!(f, "normal"),
            Variant::Invisible => write!(f, "invisible"),
            Variant::Enterprise => write!(f, "enterprise"),
        }
    }
}

/// Task intake descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Page hosting the challenge
    pub website_url: String,
    /// Challenge site identifier
    pub site_key: String,
    /// Challenge variant
    pub variant: Variant,
    /// Optional egress proxy for every session of this task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySpec>,
    /// Optional user-agent override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Optional cookie header applied before triggering
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    /// Action parameter (invisible/enterprise triggers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Extra enterprise trigger payload (e.g. the `s` token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise_payload: Option<serde_json::Value>,
    /// Owner credential key
    pub client_key: String,
}

impl TaskSpec {
    /// Validate required parameters before any task record exists.
    pub fn validate(&self) -> Result<()> {
        if self.website_url.is_empty() {
            return Err(bad("websiteUrl is required"));
        }
        if !self.website_url.starts_with("http://") && !self.website_url.starts_with("https://") {
            return Err(bad("websiteUrl must be an http(s) URL"));
        }
        if self.site_key.is_empty() {
            return Err(bad("siteKey is required"));
        }
        if self.client_key.is_empty() {
            return Err(bad("clientKey is required"));
        }
        Ok(())
    }
}

fn bad(msg: &str) -> Error {
    Error::Task(TaskError::BadParameters(msg.to_string()))
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, not yet picked up
    Pending,
    /// One solve run in flight
    Processing,
    /// Solved; token available
    Ready,
    /// Terminal failure
    Failed,
    /// Terminal record past its TTL, awaiting eviction
    Expired,
}

impl TaskStatus {
    /// Ready, Failed, or Expired
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Failed | TaskStatus::Expired)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Ready => "ready",
            TaskStatus::Failed => "failed",
            TaskStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// One tracked solve request
#[derive(Debug, Clone)]
pub struct Task {
    /// Unique id handed back to the caller
    pub id: Uuid,
    /// Intake parameters
    pub spec: TaskSpec,
    /// Lifecycle state
    pub status: TaskStatus,
    /// Acceptance time
    pub created_at: DateTime<Utc>,
    /// Transition-to-Processing time
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal-transition time
    pub ended_at: Option<DateTime<Utc>>,
    /// Proof token on success
    pub token: Option<String>,
    /// Method tag on success (`auto`, strategy name, or callback capture)
    pub method: Option<String>,
    /// Stable code + message on failure
    pub error: Option<(ErrorCode, String)>,
    /// Attempts consumed
    pub attempts: u32,
    /// Amount charged
    pub cost: f64,
}

/// The registry's only mutation interface
#[derive(Debug, Clone)]
pub enum Transition {
    /// Pending -> Processing
    Processing,
    /// -> Ready with the solution
    Ready {
        /// Proof token
        token: String,
        /// Method tag
        method: String,
        /// Amount charged
        cost: f64,
        /// Attempts consumed
        attempts: u32,
    },
    /// -> Failed with a stable error
    Failed {
        /// Stable numeric code
        code: ErrorCode,
        /// Short stable message
        message: String,
        /// Attempts consumed
        attempts: u32,
    },
}

impl Transition {
    fn target(&self) -> TaskStatus {
        match self {
            Transition::Processing => TaskStatus::Processing,
            Transition::Ready { .. } => TaskStatus::Ready,
            Transition::Failed { .. } => TaskStatus::Failed,
        }
    }
}

struct Inner {
    tasks: HashMap<Uuid, Task>,
    total_created: u64,
    total_completed: u64,
    total_failed: u64,
}

/// In-memory task registry
pub struct TaskRegistry {
    inner: Mutex<Inner>,
    config: RegistryConfig,
}

impl TaskRegistry {
    /// Create a registry
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: HashMap::new(),
                total_created: 0,
                total_completed: 0,
                total_failed: 0,
            }),
            config,
        }
    }

    /// Accept a task. Validation failures leave no record behind. At
    /// capacity, expired terminal records are evicted first; live work is
    /// never evicted to make room.
    pub fn create(&self, spec: TaskSpec) -> Result<Task> {
        spec.validate()?;

        let mut inner = self.inner.lock();
        if inner.tasks.len() >= self.config.capacity {
            self.evict_expired(&mut inner);
            if inner.tasks.len() >= self.config.capacity {
                return Err(Error::Task(TaskError::RegistryFull(inner.tasks.len())));
            }
        }

        let task = Task {
            id: Uuid::new_v4(),
            spec,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            token: None,
            method: None,
            error: None,
            attempts: 0,
            cost: 0.0,
        };
        inner.tasks.insert(task.id, task.clone());
        inner.total_created += 1;
        debug!(task = %task.id, url = %task.spec.website_url, "task created");
        Ok(task)
    }

    /// Fetch a task, surfacing TTL expiry lazily.
    pub fn get(&self, id: Uuid) -> Result<Task> {
        let mut inner = self.inner.lock();
        let ttl = self.ttl();
        let task = inner.tasks.get_mut(&id).ok_or(Error::Task(TaskError::NotFound))?;
        expire_if_due(task, ttl);
        Ok(task.clone())
    }

    /// Apply a lifecycle transition. The sole mutator; terminal tasks never
    /// move again and Processing cannot be entered twice.
    pub fn update(&self, id: Uuid, transition: Transition) -> Result<Task> {
        let mut inner = self.inner.lock();
        let task = inner.tasks.get_mut(&id).ok_or(Error::Task(TaskError::NotFound))?;

        let allowed = matches!(
            (task.status, &transition),
            (TaskStatus::Pending, Transition::Processing)
                | (TaskStatus::Processing, Transition::Ready { .. })
                | (TaskStatus::Processing, Transition::Failed { .. })
                | (TaskStatus::Pending, Transition::Failed { .. })
        );
        if !allowed {
            return Err(Error::Task(TaskError::InvalidTransition {
                from: task.status.to_string(),
                to: transition.target().to_string(),
            }));
        }

        match transition {
            Transition::Processing => {
                task.status = TaskStatus::Processing;
                task.started_at = Some(Utc::now());
            }
            Transition::Ready {
                token,
                method,
                cost,
                attempts,
            } => {
                task.status = TaskStatus::Ready;
                task.ended_at = Some(Utc::now());
                task.token = Some(token);
                task.method = Some(method);
                task.cost = cost;
                task.attempts = attempts;
            }
            Transition::Failed {
                code,
                message,
                attempts,
            } => {
                task.status = TaskStatus::Failed;
                task.ended_at = Some(Utc::now());
                task.error = Some((code, message));
                task.attempts = attempts;
            }
        }

        let updated = task.clone();
        match updated.status {
            TaskStatus::Ready => inner.total_completed += 1,
            TaskStatus::Failed => inner.total_failed += 1,
            _ => {}
        }
        debug!(task = %id, status = %updated.status, "task updated");
        Ok(updated)
    }

    /// Build the polling result view. Expired records read as not-found.
    pub fn result_view(&self, id: Uuid) -> Result<TaskResultView> {
        let task = self.get(id)?;
        if task.status == TaskStatus::Expired {
            return Err(Error::Task(TaskError::NotFound));
        }
        Ok(TaskResultView::from(&task))
    }

    /// Registry statistics
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        let mut by_status: HashMap<String, usize> = HashMap::new();
        for task in inner.tasks.values() {
            *by_status.entry(task.status.to_string()).or_insert(0) += 1;
        }
        RegistryStats {
            total_tasks: inner.tasks.len(),
            total_created: inner.total_created,
            total_completed: inner.total_completed,
            total_failed: inner.total_failed,
            capacity: self.config.capacity,
            by_status,
        }
    }

    fn ttl(&self) -> ChronoDuration {
        ChronoDuration::from_std(self.config.task_ttl).unwrap_or(ChronoDuration::seconds(300))
    }

    fn evict_expired(&self, inner: &mut Inner) {
        let ttl = self.ttl();
        let now = Utc::now();
        let before = inner.tasks.len();
        inner.tasks.retain(|_, task| {
            let evictable = task.status.is_terminal()
                && task
                    .ended_at
                    .map(|ended| now - ended > ttl)
                    .unwrap_or(false);
            !evictable
        });
        let evicted = before - inner.tasks.len();
        if evicted > 0 {
            info!(evicted, "evicted expired tasks");
        }
    }
}

fn expire_if_due(task: &mut Task, ttl: ChronoDuration) {
    if matches!(task.status, TaskStatus::Ready | TaskStatus::Failed) {
        if let Some(ended) = task.ended_at {
            if Utc::now() - ended > ttl {
                task.status = TaskStatus::Expired;
            }
        }
    }
}

/// Solution portion of a result view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionView {
    /// Proof token
    pub token: String,
    /// Method tag
    pub method: String,
}

/// Caller-facing polling view of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultView {
    /// Stable numeric code (0 while not failed)
    pub error_code: ErrorCode,
    /// Current status string
    pub status: String,
    /// Solution when ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SolutionView>,
    /// Short stable message when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Amount charged when ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Acceptance time
    pub created_at: DateTime<Utc>,
    /// Terminal time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Attempts consumed
    pub attempts: u32,
}

impl From<&Task> for TaskResultView {
    fn from(task: &Task) -> Self {
        let (error_code, error_message) = match (&task.status, &task.error) {
            (TaskStatus::Failed, Some((code, message))) => (*code, Some(message.clone())),
            (TaskStatus::Failed, None) => {
                (ErrorCode::UNSOLVABLE, Some("Task failed".to_string()))
            }
            _ => (ErrorCode::SUCCESS, None),
        };

        let result = match (&task.status, &task.token, &task.method) {
            (TaskStatus::Ready, Some(token), Some(method)) => Some(SolutionView {
                token: token.clone(),
                method: method.clone(),
            }),
            _ => None,
        };

        TaskResultView {
            error_code,
            status: task.status.to_string(),
            result,
            error_message,
            cost: (task.status == TaskStatus::Ready).then_some(task.cost),
            created_at: task.created_at,
            completed_at: task.ended_at,
            attempts: task.attempts,
        }
    }
}

/// Registry statistics
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    /// Records currently held
    pub total_tasks: usize,
    /// Tasks ever accepted
    pub total_created: u64,
    /// Tasks that reached Ready
    pub total_completed: u64,
    /// Tasks that reached Failed
    pub total_failed: u64,
    /// Configured capacity
    pub capacity: usize,
    /// Count per status string
    pub by_status: HashMap<String, usize>,
}
