//! Configuration file support for toxmap
//!
//! One TOML file per deployment. The value is loaded once at startup and
//! passed by reference into the pipeline - nothing reads configuration
//! globally.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration structure
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct Config {
    /// Workspace paths and input artifact
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Batch data settings
    #[serde(default)]
    pub data: DataConfig,

    /// Remote feature-service host
    #[serde(default)]
    pub portal: PortalConfig,

    /// Sharing of the published item
    #[serde(default)]
    pub share: ShareConfig,

    /// Retention of past data and intermediate tables
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Workspace paths
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WorkspaceConfig {
    /// Directory holding the workspace tables
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,

    /// Input artifact consumed (and renamed) each run
    #[serde(default = "default_input_file")]
    pub input_file: PathBuf,

    /// County address locator name inside the workspace
    #[serde(default = "default_locator")]
    pub locator: String,

    /// Where the schema-diff report is written on merge failure
    #[serde(default = "default_diff_report")]
    pub diff_report: PathBuf,

    /// Directory for the service-definition draft and staged package
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Local map-document source the service draft is generated from
    #[serde(default = "default_map_document")]
    pub map_document: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
            input_file: default_input_file(),
            locator: default_locator(),
            diff_report: default_diff_report(),
            staging_dir: default_staging_dir(),
            map_document: default_map_document(),
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("dashboard.gdb")
}

fn default_input_file() -> PathBuf {
    PathBuf::from("call-data/toxdata.json")
}

fn default_locator() -> String {
    "counties".to_string()
}

fn default_diff_report() -> PathBuf {
    PathBuf::from("table-compare-output.txt")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("tempdir")
}

fn default_map_document() -> PathBuf {
    PathBuf::from("dashboard.mapdoc.json")
}

/// Batch data settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataConfig {
    /// Calls from any other state are dropped during cleaning
    #[serde(default = "default_target_state")]
    pub target_state: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            target_state: default_target_state(),
        }
    }
}

fn default_target_state() -> String {
    "WA".to_string()
}

/// Remote feature-service host settings
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PortalConfig {
    /// Host root, e.g. "https://www.arcgis.com"
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Title of the hosted feature service being overwritten
    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub tags: String,

    #[serde(default)]
    pub description: String,

    /// maxRecordCount applied to the published service
    #[serde(default = "default_max_record_count")]
    pub max_record_count: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            username: String::new(),
            password: String::new(),
            service_name: String::new(),
            tags: String::new(),
            description: String::new(),
            max_record_count: default_max_record_count(),
        }
    }
}

fn default_host() -> String {
    "https://www.arcgis.com".to_string()
}

fn default_max_record_count() -> u32 {
    1000
}

/// Sharing of the published item
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ShareConfig {
    /// Master switch; when false the publish workflow stops after publishing
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub everyone: bool,

    #[serde(default)]
    pub org: bool,

    /// Group IDs to share with
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Retention of past data
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetentionConfig {
    /// Keep previous months' master tables instead of deleting them
    #[serde(default)]
    pub keep_past_months: bool,

    /// Earliest local hour at which deletion may run. Before this hour the
    /// new day may not have merged yet, so yesterday's data is protected.
    #[serde(default = "default_deletion_hour")]
    pub deletion_hour: u32,

    /// Keep the intermediate batch tables after a run
    #[serde(default = "default_true")]
    pub keep_intermediate_tables: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_past_months: false,
            deletion_hour: default_deletion_hour(),
            keep_intermediate_tables: default_true(),
        }
    }
}

fn default_deletion_hour() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        toml::from_str(&contents).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.data.target_state, "WA");
        assert_eq!(config.retention.deletion_hour, 1);
        assert!(config.retention.keep_intermediate_tables);
        assert!(!config.share.enabled);
        assert_eq!(config.portal.max_record_count, 1000);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[workspace]
dir = "wapc.gdb"
input_file = "call-data/toxdata.json"

[portal]
username = "dashboard_admin"
password = "hunter2"
service_name = "WAPC_Calls"
max_record_count = 2000

[share]
enabled = true
everyone = false
org = true
groups = ["4ce", "9fa"]

[retention]
keep_past_months = false
deletion_hour = 2
keep_intermediate_tables = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.workspace.dir, PathBuf::from("wapc.gdb"));
        assert_eq!(config.portal.service_name, "WAPC_Calls");
        assert_eq!(config.portal.max_record_count, 2000);
        assert!(config.share.org);
        assert_eq!(config.share.groups.len(), 2);
        assert_eq!(config.retention.deletion_hour, 2);
        assert!(!config.retention.keep_intermediate_tables);
        // Unset values fall back to defaults
        assert_eq!(config.data.target_state, "WA");
        assert_eq!(config.portal.host, "https://www.arcgis.com");
    }
}
