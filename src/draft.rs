//! Service-definition draft documents
//!
//! A draft is generated from the local map document, mutated from a plain
//! map service into an editable feature service, analyzed, and staged as a
//! deployable package. The generator strips the namespace declarations
//! from the document and downstream consumers require them, so patching
//! re-attaches them explicitly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Capability set enabled on the published feature service. Query cannot
/// be disabled on a feature service.
pub const FEATURE_CAPABILITIES: &str = "Query,Create,Update,Delete,Uploads,Editing";

const TYPENS_KEY: &str = "xmlns:typens";
const TYPENS_URI: &str = "http://www.esri.com/schemas/ArcGIS/10.1";
const XS_KEY: &str = "xmlns:xs";
const XS_URI: &str = "http://www.w3.org/2001/XMLSchema";

/// Error type for draft operations
#[derive(Debug)]
pub enum DraftError {
    Io(std::io::Error),
    Parse { path: PathBuf, message: String },
}

impl std::fmt::Display for DraftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DraftError::Io(e) => write!(f, "IO error: {}", e),
            DraftError::Parse { path, message } => {
                write!(f, "Failed to parse {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for DraftError {}

impl From<std::io::Error> for DraftError {
    fn from(e: std::io::Error) -> Self {
        DraftError::Io(e)
    }
}

/// The local map-document source a draft is generated from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDocument {
    pub title: String,
    pub layers: Vec<MapLayer>,
}

/// One layer of the map document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayer {
    pub name: String,
    pub source_table: String,
}

impl MapDocument {
    pub fn load(path: &Path) -> Result<Self, DraftError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| DraftError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Service configuration carried by a draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftProperties {
    pub is_cached: bool,
    pub max_record_count: u32,
}

/// A service-definition draft document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDraft {
    pub service_name: String,
    /// `MapServer` as generated; patched to `FeatureServer`
    pub type_name: String,
    pub properties: DraftProperties,
    /// Web capability set exposed by the service
    pub web_capabilities: String,
    pub layers: Vec<String>,
    /// Namespace declarations; empty straight out of the generator
    pub declarations: BTreeMap<String, String>,
}

/// Severity of one analysis finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One analysis finding
#[derive(Debug, Clone)]
pub struct AnalysisIssue {
    pub severity: Severity,
    pub message: String,
}

impl std::fmt::Display for AnalysisIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        };
        write!(f, "{}: {}", tag, self.message)
    }
}

impl ServiceDraft {
    /// Generate a draft from the local map document. The result describes
    /// a cached map service and carries no namespace declarations - both
    /// are corrected by [`ServiceDraft::patch_for_feature_service`].
    pub fn generate(map_document: &MapDocument, service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            type_name: "MapServer".to_string(),
            properties: DraftProperties {
                is_cached: true,
                max_record_count: 1000,
            },
            web_capabilities: "Map,Query,Data".to_string(),
            layers: map_document.layers.iter().map(|l| l.name.clone()).collect(),
            declarations: BTreeMap::new(),
        }
    }

    /// Rewrite the draft from a map service into an editable feature
    /// service: type tag, caching off, record limit, the feature-editing
    /// capability set, and the stripped namespace declarations.
    pub fn patch_for_feature_service(&mut self, max_record_count: u32) {
        if self.type_name == "MapServer" {
            self.type_name = "FeatureServer".to_string();
        }
        self.properties.is_cached = false;
        self.properties.max_record_count = max_record_count;
        self.web_capabilities = FEATURE_CAPABILITIES.to_string();
        self.declarations
            .insert(TYPENS_KEY.to_string(), TYPENS_URI.to_string());
        self.declarations
            .insert(XS_KEY.to_string(), XS_URI.to_string());
    }

    /// Validate the draft before staging
    pub fn analyze(&self) -> Vec<AnalysisIssue> {
        let mut issues = Vec::new();
        if self.service_name.is_empty() {
            issues.push(AnalysisIssue {
                severity: Severity::Error,
                message: "service name is empty".to_string(),
            });
        }
        if self.layers.is_empty() {
            issues.push(AnalysisIssue {
                severity: Severity::Error,
                message: "draft has no layers".to_string(),
            });
        }
        if self.type_name != "FeatureServer" && self.type_name != "MapServer" {
            issues.push(AnalysisIssue {
                severity: Severity::Error,
                message: format!("unknown service type tag: {}", self.type_name),
            });
        }
        if self.properties.max_record_count == 0 {
            issues.push(AnalysisIssue {
                severity: Severity::Error,
                message: "maxRecordCount is zero".to_string(),
            });
        }
        if !self.declarations.contains_key(TYPENS_KEY) || !self.declarations.contains_key(XS_KEY) {
            issues.push(AnalysisIssue {
                severity: Severity::Error,
                message: "namespace declarations are missing".to_string(),
            });
        }
        if self.type_name == "FeatureServer" && self.properties.is_cached {
            issues.push(AnalysisIssue {
                severity: Severity::Warning,
                message: "caching is enabled on a feature service".to_string(),
            });
        }
        issues
    }

    /// Convert the draft into a deployable package file. Callers are
    /// expected to have analyzed the draft first.
    pub fn stage(&self, staging_dir: &Path) -> Result<PathBuf, DraftError> {
        std::fs::create_dir_all(staging_dir)?;
        let path = staging_dir.join(format!("{}.sd", self.service_name));
        let content = serde_json::to_string_pretty(self).map_err(|e| DraftError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content)?;
        Ok(path)
    }
}
