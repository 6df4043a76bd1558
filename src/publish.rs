//! Feature-service publish workflow
//!
//! One linear state machine replaces the old pair of near-identical
//! publish scripts: authenticate, locate the items, build and patch the
//! service-definition draft, stage, upload, publish, optionally share.
//! The whole workflow is retried once end-to-end - but only for failures
//! classified transient. By the time publishing runs the local pipeline
//! has already succeeded, so a publish failure is reported, not raised.

use crate::config::Config;
use crate::console;
use crate::draft::{AnalysisIssue, DraftError, MapDocument, ServiceDraft, Severity};
use crate::portal::{PortalClient, PortalError, PortalTransport};

/// Steps of the workflow, in order. Failures carry the phase they
/// happened in so the operator report says where the attempt died.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    Authenticate,
    LocateItems,
    BuildDraft,
    PatchDraft,
    Stage,
    Upload,
    Publish,
    Share,
}

impl std::fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PublishPhase::Authenticate => "authenticate",
            PublishPhase::LocateItems => "locate items",
            PublishPhase::BuildDraft => "build draft",
            PublishPhase::PatchDraft => "patch draft",
            PublishPhase::Stage => "stage",
            PublishPhase::Upload => "upload",
            PublishPhase::Publish => "publish",
            PublishPhase::Share => "share",
        };
        write!(f, "{}", name)
    }
}

/// What went wrong inside a phase
#[derive(Debug)]
pub enum PublishError {
    Portal(PortalError),
    Draft(DraftError),
    /// Draft analysis reported error-severity issues
    Analysis(Vec<AnalysisIssue>),
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Portal(e) => write!(f, "{}", e),
            PublishError::Draft(e) => write!(f, "{}", e),
            PublishError::Analysis(issues) => {
                write!(f, "Draft analysis reported {} error(s)", issues.len())
            }
        }
    }
}

impl std::error::Error for PublishError {}

/// A failed publish attempt
#[derive(Debug)]
pub struct PublishFailure {
    pub phase: PublishPhase,
    pub error: PublishError,
}

impl PublishFailure {
    /// Only transport-class failures warrant the end-to-end retry;
    /// protocol errors and bad drafts would just fail identically again.
    pub fn is_transient(&self) -> bool {
        match &self.error {
            PublishError::Portal(e) => e.is_transient(),
            PublishError::Draft(_) | PublishError::Analysis(_) => false,
        }
    }
}

impl std::fmt::Display for PublishFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish failed during {}: {}", self.phase, self.error)
    }
}

/// Result of running the workflow, retry included
#[derive(Debug)]
pub enum PublishOutcome {
    Published {
        service_item_id: String,
        attempts: u32,
    },
    /// Both attempts failed; the run carries on regardless
    Abandoned {
        attempts: u32,
        failure: PublishFailure,
    },
}

/// The publish workflow. Owns nothing but borrowed configuration and a
/// transport; all per-run state (token, item ids, draft) lives inside a
/// single attempt.
pub struct PublishWorkflow<'a> {
    config: &'a Config,
    transport: &'a dyn PortalTransport,
}

impl<'a> PublishWorkflow<'a> {
    pub fn new(config: &'a Config, transport: &'a dyn PortalTransport) -> Self {
        Self { config, transport }
    }

    /// Run the workflow with the single-retry discipline
    pub fn run(&self) -> PublishOutcome {
        match self.attempt() {
            Ok(service_item_id) => PublishOutcome::Published {
                service_item_id,
                attempts: 1,
            },
            Err(failure) if failure.is_transient() => {
                console::detail(&format!("{}. Retrying once...", failure));
                match self.attempt() {
                    Ok(service_item_id) => PublishOutcome::Published {
                        service_item_id,
                        attempts: 2,
                    },
                    Err(failure) => PublishOutcome::Abandoned {
                        attempts: 2,
                        failure,
                    },
                }
            }
            Err(failure) => PublishOutcome::Abandoned {
                attempts: 1,
                failure,
            },
        }
    }

    /// One end-to-end pass through every phase
    fn attempt(&self) -> Result<String, PublishFailure> {
        let fail = |phase: PublishPhase| move |error: PortalError| PublishFailure {
            phase,
            error: PublishError::Portal(error),
        };

        console::step("Authenticating against the feature-service host...");
        let mut client = PortalClient::new(self.transport, &self.config.portal);
        client
            .authenticate()
            .map_err(fail(PublishPhase::Authenticate))?;

        console::step("Locating the service items...");
        let service_item = client
            .find_item("Feature Service")
            .map_err(fail(PublishPhase::LocateItems))?;
        console::detail(&format!("found Feature Service: {}", service_item));
        let sd_item = client
            .find_item("Service Definition")
            .map_err(fail(PublishPhase::LocateItems))?;
        console::detail(&format!("found Service Definition: {}", sd_item));

        console::step("Building the service-definition draft...");
        let map_document =
            MapDocument::load(&self.config.workspace.map_document).map_err(|error| {
                PublishFailure {
                    phase: PublishPhase::BuildDraft,
                    error: PublishError::Draft(error),
                }
            })?;
        let mut draft = ServiceDraft::generate(&map_document, &self.config.portal.service_name);

        draft.patch_for_feature_service(self.config.portal.max_record_count);
        let errors: Vec<AnalysisIssue> = draft
            .analyze()
            .into_iter()
            .filter(|issue| issue.severity == Severity::Error)
            .collect();
        if !errors.is_empty() {
            for issue in &errors {
                console::detail(&issue.to_string());
            }
            return Err(PublishFailure {
                phase: PublishPhase::PatchDraft,
                error: PublishError::Analysis(errors),
            });
        }

        console::step("Staging the service definition...");
        let package = draft
            .stage(&self.config.workspace.staging_dir)
            .map_err(|error| PublishFailure {
                phase: PublishPhase::Stage,
                error: PublishError::Draft(error),
            })?;
        console::detail(&format!("Created {}", package.display()));

        console::step("Uploading the service definition...");
        let uploaded = client
            .update_item(&sd_item, &package)
            .map_err(fail(PublishPhase::Upload))?;
        console::detail(&format!("updated SD: {}", uploaded));

        console::step("Publishing the feature service...");
        let new_item = client
            .publish_item(&sd_item)
            .map_err(fail(PublishPhase::Publish))?;
        console::detail(&format!("successfully updated...{}...", new_item));

        if self.config.share.enabled {
            console::step("Sharing the published item...");
            let shared = client
                .share_item(&new_item, &self.config.share)
                .map_err(fail(PublishPhase::Share))?;
            console::detail(&format!("successfully shared...{}...", shared));
        }

        Ok(new_item)
    }
}
