use clipforge_core::error::CoreError;
use clipforge_db::models::job::JobKind;
use clipforge_db::models::project::{CreateProject, Project};
use clipforge_db::EntityStore;

use crate::error::PipelineError;
use crate::queue::{JobQueue, QueueJob};

/// Accept a production request: insert the project, its `plan` job row,
/// and enqueue the plan stage.
pub async fn submit_project(
    store: &dyn EntityStore,
    queue: &dyn JobQueue,
    input: &CreateProject,
) -> Result<Project, PipelineError> {
    if input.topic.trim().is_empty() {
        return Err(CoreError::Validation("topic must not be empty".into()).into());
    }
    if input.target_duration_secs.is_some_and(|secs| secs <= 0) {
        return Err(CoreError::Validation("target duration must be positive".into()).into());
    }

    let project = store.create_project(input).await?;
    let job = QueueJob::new(JobKind::Plan, project.id, None);
    store.create_job(&job.record()).await?;
    queue.enqueue(&job).await?;

    tracing::info!(
        project_id = %project.id,
        topic = %project.topic,
        target_duration_secs = project.target_duration_secs,
        "Project submitted",
    );
    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use clipforge_db::models::status::{JobStatus, ProjectStatus};
    use clipforge_db::MemoryStore;
    use std::time::Duration;

    use crate::queue::MemoryQueue;

    #[tokio::test]
    async fn submit_creates_project_job_and_message() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();

        let project = submit_project(&store, &queue, &CreateProject::new("  volcanic islands "))
            .await
            .unwrap();
        assert_eq!(project.status(), Some(ProjectStatus::Queued));
        assert_eq!(project.topic, "volcanic islands");

        let message = queue
            .dequeue(JobKind::Plan, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.project_id, project.id);

        let job = store.get_job(message.id).await.unwrap();
        assert_eq!(job.status(), Some(JobStatus::Queued));
        assert_eq!(job.kind, "plan");
    }

    #[tokio::test]
    async fn blank_topic_is_rejected() {
        let store = MemoryStore::new();
        let queue = MemoryQueue::new();
        assert_matches!(
            submit_project(&store, &queue, &CreateProject::new("   ")).await,
            Err(PipelineError::Core(CoreError::Validation(_)))
        );
        assert!(queue.pending(JobKind::Plan).is_empty());
    }
}
