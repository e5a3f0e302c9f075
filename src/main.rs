use clap::Parser;
use req_sync::utils::error::SyncError;
use req_sync::utils::logger;
use req_sync::{
    sync_records, validate_input_path, validate_records, CliArgs, RequirementReader, SyncConfig,
    SyncResult, ValidationReport,
};

/// 一次執行的結果：同步或僅檢查
enum Outcome {
    Synced(SyncResult),
    Validated(ValidationReport),
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);
    tracing::info!("Starting req-sync CLI");

    match run(&args).await {
        Ok(Outcome::Synced(result)) => {
            report(&result, args.json);
            if !result.is_success() {
                std::process::exit(2);
            }
        }
        Ok(Outcome::Validated(validation)) => {
            report_validation(&validation, args.json);
            if !validation.is_clean() {
                std::process::exit(2);
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Sync failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}

async fn run(args: &CliArgs) -> Result<Outcome, SyncError> {
    let mut config = SyncConfig::from_file(&args.config)?;
    args.apply_overrides(&mut config);
    tracing::debug!("Config: {:?}", config);

    validate_input_path("input", &args.input)?;

    let records = RequirementReader::new(config.input.columns.clone()).read_path(&args.input)?;
    if args.validate_only {
        return Ok(Outcome::Validated(validate_records(&records, &config.mapping.priority)));
    }
    Ok(Outcome::Synced(sync_records(&config, records).await?))
}

fn report_validation(validation: &ValidationReport, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(validation) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("❌ Failed to serialize report: {}", e),
        }
        return;
    }

    println!(
        "🔍 {} of {} records valid",
        validation.valid_records, validation.total_records
    );
    for finding in &validation.findings {
        let id = if finding.id.is_empty() { "(no id)" } else { finding.id.as_str() };
        for issue in &finding.issues {
            eprintln!("  - row {} {}: {}", finding.row, id, issue);
        }
    }
}

fn report(result: &SyncResult, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(result) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("❌ Failed to serialize result: {}", e),
        }
        return;
    }

    let mode = if result.dry_run { " [DRY RUN]" } else { "" };
    println!("✅ Sync completed{}", mode);
    println!("📦 Epics created: {}", result.epics_created);
    println!("📦 Epics resolved: {}", result.epics_resolved);
    println!("📝 Stories created: {}", result.stories_created);
    println!("⏭️  Stories skipped: {}", result.stories_skipped);
    println!("🚫 Stories excluded: {}", result.stories_excluded);
    println!(
        "⏱️  Duration: {} ms",
        (result.finished_at - result.started_at).num_milliseconds()
    );

    if !result.errors.is_empty() {
        eprintln!("⚠️ {} errors:", result.errors.len());
        for error in &result.errors {
            eprintln!("  - {}", error);
        }
    }
}
