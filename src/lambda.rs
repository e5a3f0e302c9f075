use anyhow::Context;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use req_sync::utils::logger;
use req_sync::{
    sync_records, validate_records, RequirementReader, SyncConfig, SyncResult, ValidationReport,
};
use serde::{Deserialize, Serialize};

/// 每次呼叫自帶的輸入與憑證
#[derive(Deserialize)]
pub struct Request {
    pub csv: String,
    #[serde(default)]
    pub dry_run: bool,
    /// 只檢查表格內容，不呼叫追蹤系統
    #[serde(default)]
    pub validate_only: bool,
    pub base_url: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub project_key: Option<String>,
    pub enrichment_api_key: Option<String>,
    pub max_stories_per_epic: Option<usize>,
}

/// 基本設定由 REQ_SYNC_CONFIG 指定的檔案讀取；只讀取，不寫入環境變數
fn base_config() -> req_sync::Result<SyncConfig> {
    match std::env::var("REQ_SYNC_CONFIG") {
        Ok(path) if !path.trim().is_empty() => SyncConfig::from_file(path.trim()),
        _ => Ok(SyncConfig::default()),
    }
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum Response {
    Synced(SyncResult),
    Validated(ValidationReport),
}

fn build_config(request: &Request) -> req_sync::Result<SyncConfig> {
    let mut config = base_config()?;

    let overrides = [
        (&request.base_url, &mut config.tracker.base_url),
        (&request.email, &mut config.tracker.email),
        (&request.api_token, &mut config.tracker.api_token),
        (&request.project_key, &mut config.tracker.project_key),
        (&request.enrichment_api_key, &mut config.enrichment.api_key),
    ];
    for (value, target) in overrides {
        if let Some(value) = value {
            *target = value.clone();
        }
    }

    if request.dry_run {
        config.sync.dry_run = true;
    }
    if request.max_stories_per_epic.is_some() {
        config.sync.max_stories_per_epic = request.max_stories_per_epic;
    }
    Ok(config)
}

async fn function_handler(event: LambdaEvent<Request>) -> Result<Response, Error> {
    tracing::info!("Starting req-sync Lambda function");
    let request = event.payload;

    let config = build_config(&request).context("failed to build sync configuration")?;
    let records = RequirementReader::new(config.input.columns.clone())
        .read_bytes(request.csv.as_bytes())
        .context("failed to read requirements CSV")?;

    if request.validate_only {
        let report = validate_records(&records, &config.mapping.priority);
        tracing::info!(
            "req-sync Lambda validation completed: {} of {} records valid",
            report.valid_records,
            report.total_records
        );
        return Ok(Response::Validated(report));
    }

    let result = sync_records(&config, records).await.map_err(|e| {
        tracing::error!("❌ Sync failed: {} ({})", e, e.recovery_suggestion());
        e
    })?;

    tracing::info!(
        "req-sync Lambda function completed: {} stories created, {} errors",
        result.stories_created,
        result.errors.len()
    );
    Ok(Response::Synced(result))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();
    run(service_fn(function_handler)).await
}
