//! GitHub Actions workflow runs

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::errors::ControllerError;
use crate::http::client::HttpClient;
use crate::models::workflow::{RunHandle, RunStatus};

/// Read-only view of a CI provider
#[async_trait]
pub trait CiProvider: Send + Sync {
    /// Find the run triggered for `revision` on `branch`, if it exists yet
    async fn find_run(
        &self,
        branch: &str,
        revision: &str,
    ) -> Result<Option<RunHandle>, ControllerError>;

    /// Current status of a run, with failing stages once it failed
    async fn run_status(&self, run: &RunHandle) -> Result<RunStatus, ControllerError>;
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    head_sha: String,
    #[serde(default)]
    head_branch: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
    status: Option<String>,
    #[serde(default)]
    conclusion: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    #[serde(default)]
    jobs: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    name: String,
    #[serde(default)]
    conclusion: Option<String>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct Step {
    name: String,
    #[serde(default)]
    conclusion: Option<String>,
}

/// GitHub Actions over the REST API
pub struct GithubActions {
    http: HttpClient,
    repository: String,
    page_size: u32,
}

impl GithubActions {
    /// `repository` is `owner/name`
    pub fn new(http: HttpClient, repository: impl Into<String>) -> Self {
        Self {
            http,
            repository: repository.into(),
            page_size: 20,
        }
    }

    async fn failing_stages(&self, run_id: u64) -> Result<Vec<String>, ControllerError> {
        let path = format!("/repos/{}/actions/runs/{}/jobs", self.repository, run_id);
        let jobs: JobList = self.http.get(&path, &[]).await?;
        Ok(failing_stages(&jobs.jobs))
    }
}

/// Names of failed steps, falling back to the job name when no step is marked
fn failing_stages(jobs: &[Job]) -> Vec<String> {
    let mut stages = Vec::new();
    for job in jobs.iter().filter(|j| j.conclusion.as_deref() == Some("failure")) {
        let steps: Vec<String> = job
            .steps
            .iter()
            .filter(|s| s.conclusion.as_deref() == Some("failure"))
            .map(|s| s.name.clone())
            .collect();
        if steps.is_empty() {
            stages.push(job.name.clone());
        } else {
            stages.extend(steps);
        }
    }
    stages
}

#[async_trait]
impl CiProvider for GithubActions {
    async fn find_run(
        &self,
        branch: &str,
        revision: &str,
    ) -> Result<Option<RunHandle>, ControllerError> {
        let path = format!("/repos/{}/actions/runs", self.repository);
        let list: RunList = self
            .http
            .get(
                &path,
                &[
                    ("branch", branch.to_string()),
                    ("head_sha", revision.to_string()),
                    ("per_page", self.page_size.to_string()),
                ],
            )
            .await?;

        // Runs come newest first; a re-run of the same commit wins
        let run = list
            .workflow_runs
            .into_iter()
            .find(|r| r.head_sha == revision || r.head_sha.starts_with(revision));
        debug!(found = run.is_some(), %revision, "Looked up CI run");

        Ok(run.map(|r| RunHandle {
            id: r.id,
            head_sha: r.head_sha,
            head_branch: r.head_branch,
            html_url: r.html_url,
        }))
    }

    async fn run_status(&self, run: &RunHandle) -> Result<RunStatus, ControllerError> {
        let path = format!("/repos/{}/actions/runs/{}", self.repository, run.id);
        let details: WorkflowRun = self.http.get(&path, &[]).await?;

        let status = details.status.unwrap_or_else(|| "unknown".to_string());
        let failed = status == "completed" && details.conclusion.as_deref() != Some("success");
        let failing_stages = if failed {
            self.failing_stages(run.id).await?
        } else {
            Vec::new()
        };

        Ok(RunStatus {
            status,
            conclusion: details.conclusion,
            failing_stages,
        })
    }
}
