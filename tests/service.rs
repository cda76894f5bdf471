// ABOUTME: Integration tests for caller-facing deployment operations.
// ABOUTME: Covers retry, redeploy, cancel, streaming, snapshots, listing, and destroy.

mod support;

use async_trait::async_trait;
use cloudship::logs::StreamEvent;
use cloudship::model::{DeploymentRecord, DeploymentStatus, InstanceRecord};
use cloudship::service::ServiceError;
use cloudship::store::{DeploymentFilter, DeploymentStore, MemoryStore, StoreError};
use cloudship::types::{DeploymentId, InstanceId, ProjectId};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use support::{FakeProvisioner, HarnessBuilder, eventually, new_deployment, project};

async fn collect_until_final(
    service: &cloudship::service::DeploymentService,
    id: &DeploymentId,
) -> Vec<StreamEvent> {
    let mut stream = service.stream(id).await.unwrap();
    let mut events = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = stream.next().await {
            let done = event.is_final();
            events.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("stream should reach a final event");
    events
}

fn text_of(events: &[StreamEvent]) -> String {
    events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Initial { logs, .. } | StreamEvent::Update { logs, .. } => {
                Some(logs.as_str())
            }
            _ => None,
        })
        .collect()
}

/// Reads of deployments never complete; everything else is a memory store.
struct HangingStore(MemoryStore);

#[async_trait]
impl DeploymentStore for HangingStore {
    async fn get_deployment(&self, _id: &DeploymentId) -> Result<DeploymentRecord, StoreError> {
        std::future::pending().await
    }

    async fn save_deployment(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.0.save_deployment(record).await
    }

    async fn query_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> Result<Vec<DeploymentRecord>, StoreError> {
        self.0.query_deployments(filter).await
    }

    async fn delete_deployment(&self, id: &DeploymentId) -> Result<(), StoreError> {
        self.0.delete_deployment(id).await
    }

    async fn save_instance(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        self.0.save_instance(record).await
    }

    async fn get_instance(
        &self,
        deployment_id: &DeploymentId,
    ) -> Result<Option<InstanceRecord>, StoreError> {
        self.0.get_instance(deployment_id).await
    }
}

mod retry {
    use super::*;

    #[tokio::test]
    async fn pending_deployment_cannot_be_retried() {
        let h = HarnessBuilder::new().build().await;
        let record = DeploymentRecord::new(new_deployment());
        h.store.save_deployment(&record).await.unwrap();

        let err = h.service.retry(&record.id, project(), None).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotRetryable {
                status: DeploymentStatus::Pending,
                ..
            }
        ));
        assert_eq!(h.provisioner.calls(), 0);
    }

    #[tokio::test]
    async fn failed_deployment_reruns_from_provisioning() {
        let h = HarnessBuilder::new()
            .provisioner(FakeProvisioner::new("127.0.0.1").fail_first(1))
            .build()
            .await;

        let first = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        let id = first.record.id.clone();
        let report = first.handle.await.unwrap().unwrap();
        assert_eq!(report.status, DeploymentStatus::Failed);

        let second = h.service.retry(&id, project(), None).await.unwrap();
        assert_eq!(second.record.status, DeploymentStatus::Pending);
        assert!(second.record.error_message.is_none());
        assert!(second.record.completed_at.is_none());

        let report = second.handle.await.unwrap().unwrap();
        assert!(report.succeeded());
        assert_eq!(h.provisioner.calls(), 2);

        let record = h.store.get_deployment(&id).await.unwrap();
        assert!(record.error_message.is_none());
        let marker = record.logs.find("Deployment retry initiated").unwrap();
        let failure = record.logs.find("Deployment failed: ").unwrap();
        let success = record.logs.find("Deployment completed in").unwrap();
        assert!(failure < marker && marker < success);
    }

    #[tokio::test]
    async fn concurrent_retries_run_the_deployment_once() {
        let h = HarnessBuilder::new().build().await;
        let mut record = DeploymentRecord::new(new_deployment());
        record.status = DeploymentStatus::Failed;
        h.store.save_deployment(&record).await.unwrap();

        let (a, b) = tokio::join!(
            h.service.retry(&record.id, project(), None),
            h.service.retry(&record.id, project(), None),
        );
        let (started, rejected) = match (a, b) {
            (Ok(started), Err(e)) | (Err(e), Ok(started)) => (started, e),
            (a, b) => panic!("expected one retry to win, got {a:?} and {b:?}"),
        };
        assert!(matches!(rejected, ServiceError::DeploymentActive(_)));

        let report = started.handle.await.unwrap().unwrap();
        assert!(report.succeeded());
        assert_eq!(h.provisioner.calls(), 1);

        let logs = h.store.get_deployment(&record.id).await.unwrap().logs;
        assert_eq!(logs.matches("Deployment retry initiated").count(), 1);
        assert_eq!(logs.matches("Starting deployment pipeline").count(), 1);

        // The claim is released once the run ends.
        assert!(eventually(|| !h.registry.is_running(&record.id)).await);
    }

    #[tokio::test]
    async fn retry_during_grace_period_keeps_the_new_buffer() {
        let h = HarnessBuilder::new()
            .provisioner(FakeProvisioner::new("127.0.0.1").fail_first(1))
            .grace_period(Duration::from_millis(300))
            .build()
            .await;

        let first = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        let id = first.record.id.clone();
        first.handle.await.unwrap().unwrap();

        h.provisioner.hold_calls();
        let second = h.service.retry(&id, project(), None).await.unwrap();
        assert!(eventually(|| h.provisioner.calls() == 2).await);

        // Outlive the first run's disposal.
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(h.registry.is_active(&id));
        let (text, _) = h.registry.read_since(&id, 0);
        assert!(text.contains("Starting deployment pipeline"));
        assert!(!text.contains("Deployment failed"));

        h.provisioner.release();
        let report = second.handle.await.unwrap().unwrap();
        assert!(report.succeeded());
    }
}

mod redeploy {
    use super::*;

    fn existing_with_ip(ip: Option<&str>) -> DeploymentRecord {
        let mut record = DeploymentRecord::new(new_deployment());
        record.status = DeploymentStatus::Success;
        record.instance_id = ip.map(|_| InstanceId::new("i-0abc"));
        record.public_ip = ip.map(str::to_string);
        record
    }

    #[tokio::test]
    async fn redeploy_reuses_host_without_provisioning() {
        let h = HarnessBuilder::new().build().await;
        let existing = existing_with_ip(Some("10.0.0.5"));
        h.store.save_deployment(&existing).await.unwrap();

        let started = h
            .service
            .redeploy(&existing.id, project(), None)
            .await
            .unwrap();
        assert_ne!(started.record.id, existing.id);
        assert_eq!(started.record.public_ip.as_deref(), Some("10.0.0.5"));

        let report = started.handle.await.unwrap().unwrap();
        assert!(report.succeeded());
        assert_eq!(report.public_url.as_deref(), Some("http://10.0.0.5"));
        assert_eq!(h.provisioner.calls(), 0);
        assert!(h.configurator.hosts().iter().all(|host| host == "10.0.0.5"));
        assert_eq!(h.configurator.hosts().len(), 3);

        let record = h.store.get_deployment(&report.deployment_id).await.unwrap();
        assert!(!record.logs.contains("Status updated to: provisioning"));
        assert!(record.logs.contains("Status updated to: configuring"));
        assert_eq!(record.instance_id, existing.instance_id);
    }

    #[tokio::test]
    async fn redeploy_without_address_fails_readably() {
        let h = HarnessBuilder::new().build().await;
        let existing = existing_with_ip(None);
        h.store.save_deployment(&existing).await.unwrap();

        let started = h
            .service
            .redeploy(&existing.id, project(), None)
            .await
            .unwrap();
        let report = started.handle.await.unwrap().unwrap();

        assert_eq!(report.status, DeploymentStatus::Failed);
        let message = report.error_message.unwrap();
        assert!(message.contains("has no public IP"), "{message}");
        assert!(message.contains(existing.id.as_str()));
        assert!(h.configurator.tasks().is_empty());
    }

    #[tokio::test]
    async fn redeploy_of_unknown_deployment_is_not_found() {
        let h = HarnessBuilder::new().build().await;
        let err = h
            .service
            .redeploy(&DeploymentId::new("missing"), project(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}

mod cancel {
    use super::*;

    #[tokio::test]
    async fn orphaned_pending_deployment_can_be_cancelled_and_retried() {
        let h = HarnessBuilder::new().build().await;
        let record = DeploymentRecord::new(new_deployment());
        h.store.save_deployment(&record).await.unwrap();

        let cancelled = h.service.cancel(&record.id).await.unwrap();
        assert_eq!(cancelled.status, DeploymentStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert!(cancelled.logs.contains("Deployment cancelled"));

        let started = h.service.retry(&record.id, project(), None).await.unwrap();
        let report = started.handle.await.unwrap().unwrap();
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn running_deployment_cannot_be_cancelled() {
        let h = HarnessBuilder::new().build().await;
        h.provisioner.hold_calls();

        let started = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        assert!(eventually(|| h.provisioner.calls() == 1).await);

        let err = h.service.cancel(&started.record.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::DeploymentActive(_)));

        h.provisioner.release();
        assert!(started.handle.await.unwrap().unwrap().succeeded());
    }

    #[tokio::test]
    async fn finished_deployment_cannot_be_cancelled() {
        let h = HarnessBuilder::new().build().await;
        let started = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        started.handle.await.unwrap();

        let err = h.service.cancel(&started.record.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::AlreadyTerminal {
                status: DeploymentStatus::Success,
                ..
            }
        ));
    }
}

mod reads {
    use super::*;

    #[tokio::test]
    async fn two_subscribers_see_the_same_final_event() {
        let h = HarnessBuilder::new()
            .grace_period(Duration::from_secs(30))
            .build()
            .await;
        let started = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        let id = started.record.id.clone();

        let (a, b) = tokio::join!(
            collect_until_final(&h.service, &id),
            collect_until_final(&h.service, &id)
        );
        started.handle.await.unwrap();

        let expected = StreamEvent::Final {
            status: DeploymentStatus::Success,
            public_url: Some("http://127.0.0.1".to_string()),
            completed: true,
        };
        assert_eq!(a.last(), Some(&expected));
        assert_eq!(b.last(), Some(&expected));
        assert_eq!(a.iter().filter(|e| e.is_final()).count(), 1);
        assert!(matches!(a.first(), Some(StreamEvent::Initial { .. })));

        for events in [&a, &b] {
            assert!(text_of(events).contains("Status updated to: configuring"));
        }
    }

    #[tokio::test]
    async fn slow_status_read_times_out() {
        let h = HarnessBuilder::new()
            .store(Arc::new(HangingStore(MemoryStore::new())))
            .build()
            .await;

        let err = h.service.status(&DeploymentId::new("d-1")).await.unwrap_err();
        assert!(matches!(err, ServiceError::TimedOut(_)));
    }

    #[tokio::test]
    async fn stream_of_unknown_deployment_is_not_found() {
        let h = HarnessBuilder::new().build().await;
        let result = h.service.stream(&DeploymentId::new("missing")).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn logs_snapshot_reports_completion() {
        let h = HarnessBuilder::new().build().await;
        let started = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        started.handle.await.unwrap();

        let snapshot = h.service.logs(&started.record.id).await.unwrap();
        assert!(snapshot.completed);
        assert_eq!(snapshot.status, DeploymentStatus::Success);
        assert_eq!(snapshot.public_url.as_deref(), Some("http://127.0.0.1"));
        assert!(snapshot.logs.contains("Starting deployment pipeline"));
    }

    #[tokio::test]
    async fn list_filters_by_project_newest_first() {
        let h = HarnessBuilder::new().build().await;
        let older = DeploymentRecord::new(new_deployment());
        h.store.save_deployment(&older).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = DeploymentRecord::new(new_deployment());
        h.store.save_deployment(&newer).await.unwrap();

        let mut other = new_deployment();
        other.project_id = ProjectId::new("blog");
        h.store
            .save_deployment(&DeploymentRecord::new(other))
            .await
            .unwrap();

        let listed = h
            .service
            .list(&DeploymentFilter::for_project(ProjectId::new("shop")))
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }
}

mod destroy {
    use super::*;

    #[tokio::test]
    async fn destroy_marks_instance_destroyed() {
        let h = HarnessBuilder::new().build().await;
        let started = h
            .service
            .start(project(), new_deployment(), None)
            .await
            .unwrap();
        started.handle.await.unwrap();
        let id = started.record.id;

        assert!(h.service.destroy(&id).await);
        assert_eq!(h.provisioner.destroyed.lock().as_slice(), &[id.clone()]);

        let instance = h.store.get_instance(&id).await.unwrap().unwrap();
        assert!(instance.is_destroyed());
    }

    #[tokio::test]
    async fn destroy_without_instance_succeeds() {
        let h = HarnessBuilder::new().build().await;
        let record = DeploymentRecord::new(new_deployment());
        h.store.save_deployment(&record).await.unwrap();

        assert!(h.service.destroy(&record.id).await);
        assert!(h.store.get_instance(&record.id).await.unwrap().is_none());
    }
}
