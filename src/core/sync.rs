use crate::adapters::http::ReqwestTransport;
use crate::adapters::openai::OpenAiEnricher;
use crate::config::toml_config::{MappingConfig, SyncConfig};
use crate::core::enrichment::EnrichmentResolver;
use crate::core::grouping::group_by_epic;
use crate::core::mapping::{
    aggregate_epic_description, build_components, build_labels, make_fallback_summary,
    map_priority,
};
use crate::core::tracker::TrackerClient;
use crate::domain::model::{
    EpicGroup, ExclusionReason, Reply, RequirementRecord, StoryDraft, StoryOutcome, StoryStatus,
    SyncResult, TicketRef,
};
use crate::domain::ports::{Enricher, Tracker};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};

/// 使用 reqwest 傳輸層的引擎
pub type LiveEngine = SyncEngine<TrackerClient<ReqwestTransport>>;

/// 同步協調器：逐一處理 Epic 與其下的 Story
pub struct SyncEngine<T: Tracker> {
    tracker: T,
    resolver: EnrichmentResolver,
    mapping: MappingConfig,
    max_stories_per_epic: Option<usize>,
    dry_run: bool,
}

/// 執行中的累計狀態，結束時轉成不可變的 SyncResult
struct RunLedger {
    dry_run: bool,
    epics_created: usize,
    epics_resolved: usize,
    stories_created: usize,
    stories_skipped: usize,
    stories_excluded: usize,
    outcomes: Vec<StoryOutcome>,
    errors: Vec<String>,
    started_at: DateTime<Utc>,
}

impl RunLedger {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            epics_created: 0,
            epics_resolved: 0,
            stories_created: 0,
            stories_skipped: 0,
            stories_excluded: 0,
            outcomes: Vec::new(),
            errors: Vec::new(),
            started_at: Utc::now(),
        }
    }

    fn record(&mut self, epic_name: &str, record_id: &str, summary: String, status: StoryStatus) {
        match &status {
            StoryStatus::Created { .. } | StoryStatus::Planned { .. } => self.stories_created += 1,
            StoryStatus::Skipped { .. } => self.stories_skipped += 1,
            StoryStatus::Excluded { .. } => self.stories_excluded += 1,
            StoryStatus::Failed { .. } => {}
        }
        self.outcomes.push(StoryOutcome {
            epic_name: epic_name.to_string(),
            record_id: record_id.to_string(),
            summary,
            status,
        });
    }

    fn finish(self) -> SyncResult {
        SyncResult {
            dry_run: self.dry_run,
            epics_created: self.epics_created,
            epics_resolved: self.epics_resolved,
            stories_created: self.stories_created,
            stories_skipped: self.stories_skipped,
            stories_excluded: self.stories_excluded,
            outcomes: self.outcomes,
            errors: self.errors,
            started_at: self.started_at,
            finished_at: Utc::now(),
        }
    }
}

impl<T: Tracker> SyncEngine<T> {
    pub fn new(tracker: T, resolver: EnrichmentResolver, mapping: MappingConfig, dry_run: bool) -> Self {
        Self {
            tracker,
            resolver,
            mapping,
            max_stories_per_epic: None,
            dry_run,
        }
    }

    pub fn with_story_cap(mut self, cap: Option<usize>) -> Self {
        self.max_stories_per_epic = cap;
        self
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn run(&self, records: Vec<RequirementRecord>) -> SyncResult {
        let mut ledger = RunLedger::new(self.dry_run);
        let groups = group_by_epic(records);

        tracing::info!(
            "🚀 Starting sync of {} epics{}",
            groups.len(),
            if self.dry_run { " [DRY RUN]" } else { "" }
        );

        for group in groups.iter() {
            self.sync_epic(group, &mut ledger).await;
        }

        let result = ledger.finish();
        tracing::info!(
            "🏁 Sync finished: {} epics created, {} stories created, {} skipped, {} excluded, {} errors",
            result.epics_created,
            result.stories_created,
            result.stories_skipped,
            result.stories_excluded,
            result.errors.len()
        );
        result
    }

    async fn sync_epic(&self, group: &EpicGroup, ledger: &mut RunLedger) {
        tracing::info!("📦 Epic '{}' ({} records)", group.name, group.records.len());

        let parent = match self.resolve_epic(group, ledger).await {
            Ok(parent) => parent,
            Err(e) => {
                tracing::error!("❌ Epic '{}' failed: {}", group.name, e);
                ledger.errors.push(format!("Epic '{}': {}", group.name, e));
                for record in &group.records {
                    let summary = make_fallback_summary(
                        &record.id,
                        &record.description,
                        self.mapping.story_title_words,
                    );
                    ledger.record(
                        &group.name,
                        &record.id,
                        summary,
                        StoryStatus::Failed {
                            error: format!("epic '{}' unavailable", group.name),
                        },
                    );
                }
                return;
            }
        };
        ledger.epics_resolved += 1;

        for (position, record) in group.records.iter().enumerate() {
            self.sync_story(&group.name, record, position, parent.as_ref(), ledger)
                .await;
        }
    }

    /// 回傳 Epic 的 ID；dry-run 時沒有實際 ID
    async fn resolve_epic(&self, group: &EpicGroup, ledger: &mut RunLedger) -> Result<Option<TicketRef>> {
        if let Reply::Done(Some(existing)) = self.tracker.search_by_name(&group.name).await? {
            tracing::info!("⏭️ Epic '{}' already exists as {}", group.name, existing.key);
            return Ok(Some(existing));
        }

        let description = aggregate_epic_description(&group.records);
        let created = self.tracker.create_epic(&group.name, &description).await?;
        ledger.epics_created += 1;

        match created {
            Reply::Done(ticket) => {
                tracing::info!("✅ Created epic '{}' as {}", group.name, ticket.key);
                Ok(Some(ticket))
            }
            Reply::DryRun(_) => {
                tracing::info!("🔍 [DRY RUN] Would create epic '{}'", group.name);
                Ok(None)
            }
        }
    }

    async fn sync_story(
        &self,
        epic_name: &str,
        record: &RequirementRecord,
        position: usize,
        parent: Option<&TicketRef>,
        ledger: &mut RunLedger,
    ) {
        let record_id = record.id.trim();
        let fallback_summary =
            make_fallback_summary(record_id, &record.description, self.mapping.story_title_words);

        if record_id.is_empty() {
            tracing::debug!("Excluding record without id in epic '{}'", epic_name);
            ledger.record(
                epic_name,
                record_id,
                fallback_summary,
                StoryStatus::Excluded {
                    reason: ExclusionReason::MissingId,
                },
            );
            return;
        }
        if let Some(cap) = self.max_stories_per_epic {
            if position >= cap {
                tracing::debug!("Excluding '{}': over per-epic cap {}", record_id, cap);
                ledger.record(
                    epic_name,
                    record_id,
                    fallback_summary,
                    StoryStatus::Excluded {
                        reason: ExclusionReason::OverEpicCap,
                    },
                );
                return;
            }
        }

        match self.tracker.search_by_record_id(record_id).await {
            Ok(Reply::Done(Some(existing))) => {
                tracing::info!("⏭️ Story '{}' already exists as {}", record_id, existing.key);
                ledger.record(
                    epic_name,
                    record_id,
                    fallback_summary,
                    StoryStatus::Skipped { existing },
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                self.fail_story(epic_name, record_id, fallback_summary, e.to_string(), ledger);
                return;
            }
        }

        let text = self.resolver.resolve(record, position).await;
        if text.is_insufficient() {
            tracing::info!("📝 Skipping '{}': insufficient data", record_id);
            ledger.record(
                epic_name,
                record_id,
                text.summary,
                StoryStatus::Excluded {
                    reason: ExclusionReason::InsufficientData,
                },
            );
            return;
        }

        let draft = StoryDraft {
            record_id: record_id.to_string(),
            summary: text.summary,
            description: text.description,
            priority: map_priority(&record.priority_code, &self.mapping.priority),
            labels: build_labels(record, &self.mapping.labels_from),
            components: build_components(record, self.mapping.component_from.as_deref()),
            parent_id: parent.map(|p| p.id.clone()).filter(|id| !id.is_empty()),
        };

        match self.tracker.create_story(&draft).await {
            Ok(Reply::Done(ticket)) => {
                tracing::info!("✅ Created story '{}' as {}", record_id, ticket.key);
                ledger.record(epic_name, record_id, draft.summary, StoryStatus::Created { ticket });
            }
            Ok(Reply::DryRun(call)) => {
                tracing::info!("🔍 [DRY RUN] Would create story '{}'", draft.summary);
                ledger.record(epic_name, record_id, draft.summary, StoryStatus::Planned { call });
            }
            Err(e) => self.fail_story(epic_name, record_id, draft.summary, e.to_string(), ledger),
        }
    }

    fn fail_story(
        &self,
        epic_name: &str,
        record_id: &str,
        summary: String,
        error: String,
        ledger: &mut RunLedger,
    ) {
        tracing::error!("❌ Story '{}' failed: {}", record_id, error);
        ledger
            .errors
            .push(format!("Story '{}' (epic '{}'): {}", record_id, epic_name, error));
        ledger.record(epic_name, record_id, summary, StoryStatus::Failed { error });
    }
}

impl LiveEngine {
    /// 依設定建立一次執行專用的引擎；live 模式缺少憑證時直接失敗
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let dry_run = config.dry_run();
        config.validate_for_run(dry_run)?;

        let tracker = if dry_run {
            TrackerClient::dry_run(&config.tracker)
        } else {
            TrackerClient::live(ReqwestTransport::new(&config.tracker)?, &config.tracker)
        };

        let enricher: Option<Box<dyn Enricher>> = if config.enrichment.is_active() {
            Some(Box::new(OpenAiEnricher::new(&config.enrichment)?))
        } else {
            if config.enrichment.enabled {
                tracing::info!("📝 Enrichment disabled: no API key configured");
            }
            None
        };
        let resolver = EnrichmentResolver::new(
            enricher,
            config.mapping.story_title_words,
            config.enrichment.max_records_per_epic,
        );

        Ok(Self::new(tracker, resolver, config.mapping.clone(), dry_run)
            .with_story_cap(config.sync.max_stories_per_epic))
    }
}

/// 以設定執行一次完整同步
pub async fn sync_records(config: &SyncConfig, records: Vec<RequirementRecord>) -> Result<SyncResult> {
    let engine = LiveEngine::from_config(config)?;
    Ok(engine.run(records).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CallDescriptor;
    use crate::utils::error::SyncError;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    /// 記憶體中的追蹤系統，模擬搜尋與建立
    #[derive(Default)]
    struct FakeTracker {
        dry_run: bool,
        state: Mutex<FakeState>,
        failing_stories: HashSet<String>,
        failing_epics: HashSet<String>,
        failing_searches: HashSet<String>,
    }

    #[derive(Default)]
    struct FakeState {
        epics: HashMap<String, TicketRef>,
        stories: HashMap<String, TicketRef>,
        created_stories: Vec<StoryDraft>,
        created_epics: Vec<(String, String)>,
        next_id: usize,
    }

    impl FakeState {
        fn next_ticket(&mut self) -> TicketRef {
            self.next_id += 1;
            TicketRef {
                id: format!("{}", 10000 + self.next_id),
                key: format!("REQ-{}", self.next_id),
            }
        }
    }

    impl FakeTracker {
        fn dry_run() -> Self {
            Self {
                dry_run: true,
                ..Default::default()
            }
        }

        fn descriptor(method: &str, path: &str) -> CallDescriptor {
            CallDescriptor {
                method: method.to_string(),
                path: path.to_string(),
                query: Vec::new(),
                payload: None,
            }
        }

        fn created_stories(&self) -> Vec<StoryDraft> {
            self.state.lock().unwrap().created_stories.clone()
        }

        fn created_epics(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().created_epics.clone()
        }
    }

    #[async_trait]
    impl Tracker for FakeTracker {
        async fn search_by_name(&self, epic_name: &str) -> Result<Reply<Option<TicketRef>>> {
            if self.dry_run {
                return Ok(Reply::DryRun(Self::descriptor("GET", "/search")));
            }
            if self.failing_epics.contains(epic_name) {
                return Err(SyncError::ClientRequestError {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            Ok(Reply::Done(self.state.lock().unwrap().epics.get(epic_name).cloned()))
        }

        async fn search_by_record_id(&self, record_id: &str) -> Result<Reply<Option<TicketRef>>> {
            if self.dry_run {
                return Ok(Reply::DryRun(Self::descriptor("GET", "/search")));
            }
            if self.failing_searches.contains(record_id) {
                return Err(SyncError::ClientRequestError {
                    status: 403,
                    body: "forbidden".to_string(),
                });
            }
            Ok(Reply::Done(self.state.lock().unwrap().stories.get(record_id).cloned()))
        }

        async fn create_epic(&self, name: &str, description: &str) -> Result<Reply<TicketRef>> {
            let mut state = self.state.lock().unwrap();
            state
                .created_epics
                .push((name.to_string(), description.to_string()));
            if self.dry_run {
                return Ok(Reply::DryRun(Self::descriptor("POST", "/issue")));
            }
            let ticket = state.next_ticket();
            state.epics.insert(name.to_string(), ticket.clone());
            Ok(Reply::Done(ticket))
        }

        async fn create_story(&self, story: &StoryDraft) -> Result<Reply<TicketRef>> {
            let mut state = self.state.lock().unwrap();
            state.created_stories.push(story.clone());
            if self.dry_run {
                return Ok(Reply::DryRun(Self::descriptor("POST", "/issue")));
            }
            if self.failing_stories.contains(&story.record_id) {
                return Err(SyncError::RateLimited { attempts: 4 });
            }
            let ticket = state.next_ticket();
            state.stories.insert(story.record_id.clone(), ticket.clone());
            Ok(Reply::Done(ticket))
        }
    }

    fn engine(tracker: FakeTracker) -> SyncEngine<FakeTracker> {
        let dry_run = tracker.dry_run;
        SyncEngine::new(
            tracker,
            EnrichmentResolver::fallback_only(10),
            MappingConfig::default(),
            dry_run,
        )
    }

    fn record(id: &str, epic: &str, description: &str) -> RequirementRecord {
        RequirementRecord {
            id: id.to_string(),
            epic_name: epic.to_string(),
            description: description.to_string(),
            priority_code: "P1".to_string(),
            domain: "Billing".to_string(),
            sub_domain: "Invoices".to_string(),
            requirement_type: "Functional".to_string(),
        }
    }

    fn sample() -> Vec<RequirementRecord> {
        vec![
            record("REQ-1", "Checkout", "Pay with card"),
            record("REQ-2", "Accounts", "Reset password"),
            record("REQ-3", "Checkout", "Pay with wallet"),
        ]
    }

    #[tokio::test]
    async fn test_creates_hierarchy() {
        let engine = engine(FakeTracker::default());
        let result = engine.run(sample()).await;

        assert!(result.is_success());
        assert!(!result.dry_run);
        assert_eq!(result.epics_created, 2);
        assert_eq!(result.epics_resolved, 2);
        assert_eq!(result.stories_created, 3);
        assert_eq!(result.stories_skipped, 0);

        let ids: Vec<&str> = result.outcomes.iter().map(|o| o.record_id.as_str()).collect();
        assert_eq!(ids, vec!["REQ-1", "REQ-3", "REQ-2"]);

        let epics = engine.tracker().created_epics();
        assert_eq!(epics[0], ("Checkout".to_string(), "Pay with card\n\nPay with wallet".to_string()));

        let stories = engine.tracker().created_stories();
        let first = &stories[0];
        assert_eq!(first.summary, "[REQ-1] Pay with card");
        assert_eq!(first.priority.as_deref(), Some("High"));
        assert_eq!(first.labels, vec!["billing", "invoices", "functional"]);
        assert_eq!(first.components[0].name, "Billing");
        assert_eq!(first.parent_id.as_deref(), Some("10001"));
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let engine = engine(FakeTracker::default());
        engine.run(sample()).await;
        let second = engine.run(sample()).await;

        assert_eq!(second.epics_created, 0);
        assert_eq!(second.stories_created, 0);
        assert_eq!(second.stories_skipped, 3);
        assert_eq!(engine.tracker().created_stories().len(), 3);
        assert!(second
            .outcomes
            .iter()
            .all(|o| matches!(o.status, StoryStatus::Skipped { .. })));
    }

    #[tokio::test]
    async fn test_story_failure_does_not_stop_run() {
        let tracker = FakeTracker {
            failing_stories: ["REQ-1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = engine(tracker);
        let result = engine.run(sample()).await;

        assert!(!result.is_success());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("REQ-1"));
        assert_eq!(result.stories_created, 2);
        assert!(matches!(
            result.outcome_for("REQ-1").unwrap().status,
            StoryStatus::Failed { .. }
        ));
        assert!(matches!(
            result.outcome_for("REQ-3").unwrap().status,
            StoryStatus::Created { .. }
        ));
    }

    #[tokio::test]
    async fn test_story_search_failure_skips_create() {
        let tracker = FakeTracker {
            failing_searches: ["REQ-1".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = engine(tracker);
        let result = engine.run(sample()).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("REQ-1"));
        assert_eq!(result.stories_created, 2);
        assert!(matches!(
            result.outcome_for("REQ-1").unwrap().status,
            StoryStatus::Failed { .. }
        ));
        assert!(matches!(
            result.outcome_for("REQ-3").unwrap().status,
            StoryStatus::Created { .. }
        ));
        let created: Vec<String> = engine
            .tracker()
            .created_stories()
            .into_iter()
            .map(|s| s.record_id)
            .collect();
        assert_eq!(created, vec!["REQ-3", "REQ-2"]);
    }

    #[tokio::test]
    async fn test_epic_failure_aborts_only_that_epic() {
        let tracker = FakeTracker {
            failing_epics: ["Checkout".to_string()].into_iter().collect(),
            ..Default::default()
        };
        let engine = engine(tracker);
        let result = engine.run(sample()).await;

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Epic 'Checkout'"));
        assert_eq!(result.epics_resolved, 1);
        assert_eq!(result.stories_created, 1);
        assert!(matches!(
            result.outcome_for("REQ-2").unwrap().status,
            StoryStatus::Created { .. }
        ));
        assert!(matches!(
            result.outcome_for("REQ-3").unwrap().status,
            StoryStatus::Failed { .. }
        ));
        let stories = engine.tracker().created_stories();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].record_id, "REQ-2");
    }

    #[tokio::test]
    async fn test_records_without_id_never_reach_tracker() {
        let engine = engine(FakeTracker::default());
        let result = engine
            .run(vec![record("", "Checkout", ""), record(" ", "Checkout", "Has text")])
            .await;

        assert_eq!(result.stories_excluded, 2);
        assert_eq!(result.stories_created, 0);
        assert!(result.outcomes.iter().all(|o| matches!(
            o.status,
            StoryStatus::Excluded {
                reason: ExclusionReason::MissingId
            }
        )));
        assert!(engine.tracker().created_stories().is_empty());
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_story_cap_excludes_overflow() {
        let engine = engine(FakeTracker::default()).with_story_cap(Some(1));
        let result = engine.run(sample()).await;

        assert_eq!(result.stories_created, 2);
        assert_eq!(result.stories_excluded, 1);
        assert!(matches!(
            result.outcome_for("REQ-3").unwrap().status,
            StoryStatus::Excluded {
                reason: ExclusionReason::OverEpicCap
            }
        ));
    }

    #[tokio::test]
    async fn test_dry_run_plans_same_actions() {
        let live = engine(FakeTracker::default());
        let planned = engine(FakeTracker::dry_run());

        let live_result = live.run(sample()).await;
        let dry_result = planned.run(sample()).await;

        assert!(dry_result.dry_run);
        assert_eq!(dry_result.epics_created, live_result.epics_created);
        assert_eq!(dry_result.stories_created, live_result.stories_created);
        assert!(dry_result
            .outcomes
            .iter()
            .all(|o| matches!(o.status, StoryStatus::Planned { .. })));

        let live_drafts = live.tracker().created_stories();
        let dry_drafts = planned.tracker().created_stories();
        assert_eq!(live_drafts.len(), dry_drafts.len());
        for (live, dry) in live_drafts.iter().zip(&dry_drafts) {
            assert_eq!(live.summary, dry.summary);
            assert_eq!(live.priority, dry.priority);
            assert_eq!(live.labels, dry.labels);
            assert!(dry.parent_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_records_without_epic_are_ignored() {
        let engine = engine(FakeTracker::default());
        let result = engine.run(vec![record("REQ-9", "  ", "Orphan")]).await;

        assert!(result.outcomes.is_empty());
        assert_eq!(result.epics_resolved, 0);
        assert!(engine.tracker().created_epics().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_priority_is_omitted() {
        let mut orphan = record("REQ-5", "Checkout", "Something");
        orphan.priority_code = "P9".to_string();
        let engine = engine(FakeTracker::default());
        let result = engine.run(vec![orphan]).await;

        assert!(result.is_success());
        assert_eq!(engine.tracker().created_stories()[0].priority, None);
    }

    #[test]
    fn test_from_config_requires_credentials_when_live() {
        let config = SyncConfig::default();
        assert!(matches!(
            LiveEngine::from_config(&config),
            Err(crate::utils::error::SyncError::CredentialsMissing { .. })
        ));

        let mut dry = SyncConfig::default();
        dry.sync.dry_run = true;
        let engine = LiveEngine::from_config(&dry).unwrap();
        assert!(engine.is_dry_run());
        assert!(engine.tracker().is_dry_run());
    }
}
