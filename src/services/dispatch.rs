use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::AllocationEvent;
use crate::services::{OfferNotifier, ProjectClient};

/// Fans allocation events out to the external collaborators
///
/// Collaborator failures are logged and never roll back a match.
pub struct EventDispatcher {
    notifier: Option<Arc<OfferNotifier>>,
    projects: Option<Arc<ProjectClient>>,
}

impl EventDispatcher {
    pub fn new(notifier: Option<Arc<OfferNotifier>>, projects: Option<Arc<ProjectClient>>) -> Self {
        Self { notifier, projects }
    }

    /// Consume the orchestrator's delivery queue until it closes
    pub async fn run(self, mut deliveries: mpsc::UnboundedReceiver<AllocationEvent>) {
        while let Some(event) = deliveries.recv().await {
            self.dispatch(&event).await;
        }

        info!("Event dispatcher stopped");
    }

    pub async fn dispatch(&self, event: &AllocationEvent) {
        match event {
            AllocationEvent::MatchOffered { offer } => {
                let Some(notifier) = &self.notifier else {
                    debug!("No notifier configured, offer {} not pushed", offer.match_id);
                    return;
                };
                if let Err(e) = notifier.publish_offer(offer).await {
                    warn!("Failed to deliver offer {} to {}: {}", offer.match_id, offer.candidate_id, e);
                }
            }
            AllocationEvent::ProjectHandoff {
                request,
                candidate_id,
                match_id,
            } => {
                let Some(projects) = &self.projects else {
                    debug!("No project service configured, handoff for {} skipped", request.request_id);
                    return;
                };
                match projects.create_project(request.request_id, candidate_id, *match_id).await {
                    Ok(created) => info!(
                        "Project created for request {} ({:?})",
                        request.request_id, created.project_id
                    ),
                    Err(e) => warn!("Project creation failed for request {}: {}", request.request_id, e),
                }
            }
            other => debug!("Event for request {} needs no delivery", other.request_id()),
        }
    }
}
