use crate::config::toml_config::SyncConfig;
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "req-sync")]
#[command(about = "Sync a requirements sheet into tracker epics and stories")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "req-sync.toml")]
    pub config: String,

    /// Requirements sheet exported as CSV
    #[arg(short, long)]
    pub input: String,

    /// Plan the run without calling the tracker
    #[arg(long)]
    pub dry_run: bool,

    /// Override tracker.project_key from config
    #[arg(long)]
    pub project_key: Option<String>,

    /// Override sync.max_stories_per_epic from config
    #[arg(long)]
    pub max_stories_per_epic: Option<usize>,

    /// Override enrichment.max_records_per_epic from config
    #[arg(long)]
    pub max_enriched_per_epic: Option<usize>,

    /// Disable text enrichment for this run
    #[arg(long)]
    pub no_enrich: bool,

    /// Check the sheet and print a validation report without syncing
    #[arg(long)]
    pub validate_only: bool,

    /// Print the sync result as JSON
    #[arg(long)]
    pub json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliArgs {
    /// 將命令列覆蓋套用到設定上
    pub fn apply_overrides(&self, config: &mut SyncConfig) {
        if self.dry_run {
            config.sync.dry_run = true;
        }
        if let Some(project_key) = &self.project_key {
            config.tracker.project_key = project_key.clone();
        }
        if let Some(cap) = self.max_stories_per_epic {
            config.sync.max_stories_per_epic = Some(cap);
        }
        if let Some(cap) = self.max_enriched_per_epic {
            config.enrichment.max_records_per_epic = Some(cap);
        }
        if self.no_enrich {
            config.enrichment.enabled = false;
        }
    }
}
