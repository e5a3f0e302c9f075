use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// 單次同步執行的完整設定
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub tracker: TrackerConfig,
    pub mapping: MappingConfig,
    pub enrichment: EnrichmentConfig,
    pub sync: RunConfig,
    pub input: InputConfig,
}

/// 查詢既有票據的策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStrategy {
    /// 只用精確欄位比對；Story 直接採用第一筆搜尋結果
    Exact,
    /// 全文模糊搜尋，並在本地端驗證候選標題
    Fuzzy,
    #[default]
    ExactThenFuzzy,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    pub project_key: String,
    pub search_path: String,
    pub issue_path: String,
    pub epic_issue_type: String,
    pub story_issue_type: String,
    pub epic_name_field: String,
    pub lookup_strategy: LookupStrategy,
    pub search_max_results: usize,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            email: String::new(),
            api_token: String::new(),
            project_key: String::new(),
            search_path: "/rest/api/3/search/jql".to_string(),
            issue_path: "/rest/api/3/issue".to_string(),
            epic_issue_type: "Epic".to_string(),
            story_issue_type: "Story".to_string(),
            epic_name_field: "Epic Name".to_string(),
            lookup_strategy: LookupStrategy::default(),
            search_max_results: 10,
            timeout_seconds: 60,
            retry_attempts: 4,
            retry_delay_ms: 1000,
        }
    }
}

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("base_url", &self.base_url)
            .field("email", &self.email)
            .field("api_token", &redact(&self.api_token))
            .field("project_key", &self.project_key)
            .field("search_path", &self.search_path)
            .field("issue_path", &self.issue_path)
            .field("lookup_strategy", &self.lookup_strategy)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub priority: BTreeMap<String, String>,
    pub labels_from: Vec<String>,
    pub component_from: Option<String>,
    pub story_title_words: usize,
}

impl Default for MappingConfig {
    fn default() -> Self {
        let priority = [
            ("P0", "Highest"),
            ("P1", "High"),
            ("P2", "Medium"),
            ("P3", "Low"),
            ("P4", "Lowest"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        Self {
            priority,
            labels_from: vec![
                "domain".to_string(),
                "sub_domain".to_string(),
                "requirement_type".to_string(),
            ],
            component_from: Some("domain".to_string()),
            story_title_words: 10,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    /// 每個 Epic 只增強前 N 筆記錄；未設定代表不限
    pub max_records_per_epic: Option<usize>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 600,
            timeout_seconds: 30,
            max_records_per_epic: None,
        }
    }
}

impl EnrichmentConfig {
    /// 啟用且有金鑰時才會呼叫外部服務
    pub fn is_active(&self) -> bool {
        self.enabled && !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("enabled", &self.enabled)
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("max_records_per_epic", &self.max_records_per_epic)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub dry_run: bool,
    /// 每個 Epic 最多處理的 Story 數；超出者記為排除
    pub max_stories_per_epic: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub columns: ColumnMapping,
}

/// 表格欄位名稱對應
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub requirement_id: String,
    pub requirement: String,
    pub description: String,
    pub priority: String,
    pub domain: String,
    pub sub_domain: String,
    pub requirement_type: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            requirement_id: "Requirement ID".to_string(),
            requirement: "Requirement".to_string(),
            description: "Description".to_string(),
            priority: "Priority".to_string(),
            domain: "Domain".to_string(),
            sub_domain: "Sub-domain".to_string(),
            requirement_type: "Requirement type".to_string(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl SyncConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SyncError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，${VAR} 由環境變數替換
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::from_toml_str_with(content, |name| std::env::var(name).ok())
    }

    /// 以自訂查詢函式替換變數後解析
    pub fn from_toml_str_with<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let processed_content = substitute_vars(content, lookup)?;

        toml::from_str(&processed_content).map_err(|e| SyncError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    pub fn dry_run(&self) -> bool {
        self.sync.dry_run
    }

    /// 非 dry-run 時必須具備完整的追蹤系統憑證
    pub fn ensure_credentials(&self, dry_run: bool) -> Result<()> {
        if dry_run {
            return Ok(());
        }

        let tracker = &self.tracker;
        let missing: Vec<String> = [
            ("tracker.base_url", &tracker.base_url),
            ("tracker.email", &tracker.email),
            ("tracker.api_token", &tracker.api_token),
            ("tracker.project_key", &tracker.project_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field.to_string())
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::CredentialsMissing { fields: missing })
        }
    }

    /// 執行前的完整檢查：結構驗證加上憑證檢查
    pub fn validate_for_run(&self, dry_run: bool) -> Result<()> {
        self.validate()?;
        self.ensure_credentials(dry_run)
    }
}

/// 替換 ${VAR_NAME}；查不到的變數替換為空字串
fn substitute_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").map_err(|e| SyncError::ConfigError {
        message: format!("Invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_default()
    });

    Ok(result.into_owned())
}

/// 退避基準延遲上限（一分鐘）
pub const MAX_RETRY_DELAY_MS: u64 = 60_000;

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        let tracker = &self.tracker;

        if !tracker.base_url.trim().is_empty() {
            validation::validate_url("tracker.base_url", &tracker.base_url)?;
        }
        for (field, path) in [
            ("tracker.search_path", &tracker.search_path),
            ("tracker.issue_path", &tracker.issue_path),
        ] {
            if !path.starts_with('/') {
                return Err(SyncError::InvalidConfigValueError {
                    field: field.to_string(),
                    value: path.clone(),
                    reason: "Path must start with '/'".to_string(),
                });
            }
        }
        validation::validate_non_empty_string("tracker.epic_issue_type", &tracker.epic_issue_type)?;
        validation::validate_non_empty_string("tracker.story_issue_type", &tracker.story_issue_type)?;
        validation::validate_range("tracker.retry_attempts", tracker.retry_attempts, 1, 10)?;
        validation::validate_range("tracker.search_max_results", tracker.search_max_results, 1, 100)?;
        validation::validate_range(
            "tracker.retry_delay_ms",
            tracker.retry_delay_ms,
            0,
            MAX_RETRY_DELAY_MS,
        )?;
        validation::validate_positive_number(
            "tracker.timeout_seconds",
            tracker.timeout_seconds as usize,
            1,
        )?;

        validation::validate_positive_number(
            "mapping.story_title_words",
            self.mapping.story_title_words,
            1,
        )?;

        if self.enrichment.is_active() {
            validation::validate_url("enrichment.base_url", &self.enrichment.base_url)?;
            validation::validate_non_empty_string("enrichment.model", &self.enrichment.model)?;
        }
        if let Some(cap) = self.enrichment.max_records_per_epic {
            validation::validate_positive_number("enrichment.max_records_per_epic", cap, 1)?;
        }
        if let Some(cap) = self.sync.max_stories_per_epic {
            validation::validate_positive_number("sync.max_stories_per_epic", cap, 1)?;
        }

        tracing::debug!("✅ Sync configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
[tracker]
base_url = "https://acme.atlassian.net"
email = "${JIRA_EMAIL}"
api_token = "${JIRA_API_TOKEN}"
project_key = "REQ"
lookup_strategy = "fuzzy"
retry_attempts = 3

[mapping]
labels_from = ["domain"]
component_from = "sub_domain"
story_title_words = 8

[mapping.priority]
P0 = "Blocker"
P1 = "Critical"

[enrichment]
api_key = "${OPENAI_API_KEY}"
max_records_per_epic = 5

[sync]
max_stories_per_epic = 20

[input.columns]
requirement_id = "Req ID"
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_parse_full_config() {
        let config = SyncConfig::from_toml_str_with(
            FULL_CONFIG,
            env(&[("JIRA_EMAIL", "pm@acme.io"), ("JIRA_API_TOKEN", "tok-123")]),
        )
        .unwrap();

        assert_eq!(config.tracker.email, "pm@acme.io");
        assert_eq!(config.tracker.api_token, "tok-123");
        assert_eq!(config.tracker.lookup_strategy, LookupStrategy::Fuzzy);
        assert_eq!(config.tracker.retry_attempts, 3);
        assert_eq!(config.tracker.search_path, "/rest/api/3/search/jql");
        assert_eq!(config.mapping.priority.get("P0").unwrap(), "Blocker");
        assert_eq!(config.mapping.priority.len(), 2);
        assert_eq!(config.mapping.component_from.as_deref(), Some("sub_domain"));
        assert_eq!(config.enrichment.max_records_per_epic, Some(5));
        assert_eq!(config.sync.max_stories_per_epic, Some(20));
        assert_eq!(config.input.columns.requirement_id, "Req ID");
        assert_eq!(config.input.columns.description, "Description");
        assert!(config.validate_for_run(false).is_ok());
    }

    #[test]
    fn test_unresolved_variables_become_empty() {
        let config = SyncConfig::from_toml_str_with(FULL_CONFIG, env(&[])).unwrap();

        assert!(config.tracker.email.is_empty());
        assert!(!config.enrichment.is_active());
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = SyncConfig::from_toml_str_with("", env(&[])).unwrap();

        assert_eq!(config.tracker.retry_attempts, 4);
        assert_eq!(config.tracker.retry_delay_ms, 1000);
        assert_eq!(config.tracker.lookup_strategy, LookupStrategy::ExactThenFuzzy);
        assert_eq!(config.mapping.story_title_words, 10);
        assert_eq!(config.mapping.priority.get("P2").unwrap(), "Medium");
        assert_eq!(config.enrichment.max_records_per_epic, None);
        assert!(!config.dry_run());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected_outside_dry_run() {
        let config = SyncConfig::from_toml_str_with(
            FULL_CONFIG,
            env(&[("JIRA_EMAIL", "pm@acme.io")]),
        )
        .unwrap();

        match config.validate_for_run(false) {
            Err(SyncError::CredentialsMissing { fields }) => {
                assert_eq!(fields, vec!["tracker.api_token".to_string()]);
            }
            other => panic!("expected CredentialsMissing, got {:?}", other),
        }
        assert!(config.validate_for_run(true).is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_url = SyncConfig::from_toml_str_with(
            "[tracker]\nbase_url = \"acme.atlassian.net\"\n",
            env(&[]),
        )
        .unwrap();
        assert!(bad_url.validate().is_err());

        let bad_retry =
            SyncConfig::from_toml_str_with("[tracker]\nretry_attempts = 0\n", env(&[])).unwrap();
        assert!(bad_retry.validate().is_err());

        let huge_delay = SyncConfig::from_toml_str_with(
            "[tracker]\nretry_delay_ms = 3600000\n",
            env(&[]),
        )
        .unwrap();
        assert!(matches!(
            huge_delay.validate(),
            Err(SyncError::InvalidConfigValueError { ref field, .. }) if field == "tracker.retry_delay_ms"
        ));

        let max_delay =
            SyncConfig::from_toml_str_with("[tracker]\nretry_delay_ms = 60000\n", env(&[])).unwrap();
        assert!(max_delay.validate().is_ok());

        let bad_cap =
            SyncConfig::from_toml_str_with("[sync]\nmax_stories_per_epic = 0\n", env(&[])).unwrap();
        assert!(bad_cap.validate().is_err());
    }

    #[test]
    fn test_unknown_strategy_is_parse_error() {
        let result = SyncConfig::from_toml_str_with(
            "[tracker]\nlookup_strategy = \"regex\"\n",
            env(&[]),
        );
        assert!(matches!(result, Err(SyncError::ConfigValidationError { .. })));
    }

    #[test]
    fn test_debug_output_redacts_secrets() {
        let config = SyncConfig::from_toml_str_with(
            FULL_CONFIG,
            env(&[("JIRA_API_TOKEN", "super-secret"), ("OPENAI_API_KEY", "sk-secret")]),
        )
        .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[tracker]\nproject_key = \"OPS\"\n")
            .unwrap();

        let config = SyncConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.tracker.project_key, "OPS");
    }
}
