//! Typed endpoints of the study backend.
//!
//! Paths are relative to the configured API prefix. Payloads are the
//! backend's JSON contracts; only the fields the client relies on are typed.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};
use url::Url;

use crate::client::remote::RemoteClient;
use crate::error::Result;
use crate::reconcile::poller::StatusSource;
use crate::types::command::{CommandRecord, NewCommand};
use crate::types::job::JobRecord;
use crate::types::study::{
    LaunchOptions, LaunchResponse, MaintenanceStatus, StudyMetadata, StudyMetadataPatch,
};
use crate::types::task::{TaskDto, TaskListFilter};

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Percent-encodes one path segment. Spaces become `%20`, never `+`.
fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

/// Study backend endpoints.
#[derive(Debug, Clone)]
pub struct StudyApi {
    client: RemoteClient,
}

impl StudyApi {
    /// Wraps a configured client.
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    // ---- studies ----

    /// Lists studies visible to the user.
    pub async fn list_studies(&self) -> Result<Vec<StudyMetadata>> {
        let by_id: IndexMap<String, StudyMetadata> = self.client.get("studies").await?;
        Ok(by_id.into_values().collect())
    }

    /// Fetches one study's metadata.
    pub async fn get_study(&self, study_id: &str) -> Result<StudyMetadata> {
        self.client.get(&format!("studies/{}", segment(study_id))).await
    }

    /// Creates a study and returns its id.
    pub async fn create_study(&self, name: &str, version: Option<&str>) -> Result<String> {
        let mut pairs = vec![("name", name)];
        if let Some(v) = version {
            pairs.push(("version", v));
        }
        self.client.post(&with_query("studies", &pairs), &Value::Null).await
    }

    /// Deletes a study, optionally with its variants.
    pub async fn delete_study(&self, study_id: &str, with_children: bool) -> Result<()> {
        let children = if with_children { "true" } else { "false" };
        let path = with_query(&format!("studies/{}", segment(study_id)), &[("children", children)]);
        self.client.delete(&path).await
    }

    /// Starts a copy task and returns the task id.
    pub async fn copy_study(&self, study_id: &str, destination: &str, with_outputs: bool) -> Result<String> {
        let outputs = if with_outputs { "true" } else { "false" };
        let path = with_query(
            &format!("studies/{}/copy", segment(study_id)),
            &[("dest", destination), ("with_outputs", outputs)],
        );
        self.client.post(&path, &Value::Null).await
    }

    /// Updates metadata fields.
    pub async fn update_metadata(
        &self,
        study_id: &str,
        patch: &StudyMetadataPatch,
    ) -> Result<StudyMetadata> {
        self.client.put(&format!("studies/{}", segment(study_id)), patch).await
    }

    /// Download URL of a study export.
    pub fn export_url(&self, study_id: &str, with_outputs: bool) -> Result<Url> {
        let no_output = if with_outputs { "false" } else { "true" };
        self.client.config().api_url(&with_query(
            &format!("studies/{}/export", segment(study_id)),
            &[("no_output", no_output)],
        ))
    }

    // ---- launcher ----

    /// Launches a simulation job and returns its id.
    pub async fn launch(&self, study_id: &str, options: &LaunchOptions) -> Result<String> {
        let response: LaunchResponse = self
            .client
            .post(&format!("launcher/run/{}", segment(study_id)), options)
            .await?;
        Ok(response.job_id)
    }

    /// Lists jobs of a study.
    pub async fn list_jobs(&self, study_id: &str) -> Result<Vec<JobRecord>> {
        self.client
            .get(&with_query("launcher/jobs", &[("study", study_id)]))
            .await
    }

    /// Fetches one job.
    pub async fn get_job(&self, job_id: &str) -> Result<JobRecord> {
        self.client.get(&format!("launcher/jobs/{}", segment(job_id))).await
    }

    /// Fetches a job's log text.
    pub async fn job_logs(&self, job_id: &str) -> Result<String> {
        self.client
            .get(&format!("launcher/jobs/{}/logs", segment(job_id)))
            .await
    }

    /// Requests a running job to stop.
    pub async fn kill_job(&self, job_id: &str) -> Result<()> {
        let _: Value = self
            .client
            .post(&format!("launcher/jobs/{}/kill", segment(job_id)), &Value::Null)
            .await?;
        Ok(())
    }

    // ---- tasks ----

    /// Lists tasks matching `filter`.
    pub async fn list_tasks(&self, filter: &TaskListFilter) -> Result<Vec<TaskDto>> {
        self.client.post("tasks", filter).await
    }

    /// Fetches one task without waiting for completion.
    pub async fn get_task(&self, task_id: &str) -> Result<TaskDto> {
        self.client
            .get(&with_query(
                &format!("tasks/{}", segment(task_id)),
                &[("wait_for_completion", "false")],
            ))
            .await
    }

    // ---- variant commands ----

    /// Lists commands of a variant study.
    pub async fn list_commands(&self, study_id: &str) -> Result<Vec<CommandRecord>> {
        self.client
            .get(&format!("studies/{}/commands", segment(study_id)))
            .await
    }

    /// Appends commands and returns their ids.
    pub async fn append_commands(&self, study_id: &str, commands: &[NewCommand]) -> Result<Vec<String>> {
        self.client
            .post(&format!("studies/{}/commands", segment(study_id)), commands)
            .await
    }

    /// Saves one command's action and arguments.
    pub async fn update_command(&self, study_id: &str, command: &CommandRecord) -> Result<()> {
        let _: Value = self
            .client
            .put(
                &format!("studies/{}/commands/{}", segment(study_id), segment(&command.id)),
                &NewCommand::from(command),
            )
            .await?;
        Ok(())
    }

    /// Deletes one command.
    pub async fn delete_command(&self, study_id: &str, command_id: &str) -> Result<()> {
        self.client
            .delete(&format!(
                "studies/{}/commands/{}",
                segment(study_id),
                segment(command_id)
            ))
            .await
    }

    /// Moves a command to `index`.
    pub async fn move_command(&self, study_id: &str, command_id: &str, index: usize) -> Result<()> {
        let index = index.to_string();
        let path = with_query(
            &format!(
                "studies/{}/commands/{}/move",
                segment(study_id),
                segment(command_id)
            ),
            &[("index", index.as_str())],
        );
        let _: Value = self.client.put(&path, &Value::Null).await?;
        Ok(())
    }

    /// Replaces the whole command list and returns the new ids.
    pub async fn replace_commands(&self, study_id: &str, commands: &[NewCommand]) -> Result<Vec<String>> {
        self.client
            .put(&format!("studies/{}/commands", segment(study_id)), commands)
            .await
    }

    /// Starts a variant generation and returns its task id.
    pub async fn generate(&self, study_id: &str, denormalize: bool) -> Result<String> {
        let denormalize = if denormalize { "true" } else { "false" };
        let path = with_query(
            &format!("studies/{}/generate", segment(study_id)),
            &[("denormalize", denormalize)],
        );
        self.client.put(&path, &json!({})).await
    }

    /// Latest generation task of a variant study.
    pub async fn generation_task(&self, study_id: &str) -> Result<TaskDto> {
        self.client
            .get(&format!("studies/{}/task", segment(study_id)))
            .await
    }

    // ---- maintenance ----

    /// Maintenance flag and message.
    pub async fn maintenance(&self) -> Result<MaintenanceStatus> {
        let enabled: bool = self.client.get("core/maintenance").await?;
        let message: Option<String> = self.client.get("core/maintenance/message").await?;
        Ok(MaintenanceStatus {
            enabled,
            message: message.filter(|m| !m.is_empty()),
        })
    }
}

#[async_trait]
impl StatusSource for StudyApi {
    async fn fetch_status(&self, id: &str) -> Result<JobRecord> {
        Ok(self.get_task(id).await?.into())
    }
}
