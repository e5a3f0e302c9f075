use crate::core::mapping::{make_fallback_summary, UNTITLED_SUMMARY};
use crate::core::tracker::title_matches_record;
use crate::domain::model::RequirementRecord;
use crate::domain::ports::Enricher;

/// 追蹤系統 summary 欄位的長度上限
const MAX_SUMMARY_CHARS: usize = 255;

/// 最終用於建立 Story 的文字
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedText {
    pub summary: String,
    pub description: String,
    pub enriched: bool,
}

impl ResolvedText {
    /// 標題退化為 "Untitled Story" 的記錄不建立 Story
    pub fn is_insufficient(&self) -> bool {
        self.summary == UNTITLED_SUMMARY
    }
}

/// 選擇性地呼叫外部增強服務，失敗時退回確定性的標題與描述
pub struct EnrichmentResolver {
    enricher: Option<Box<dyn Enricher>>,
    max_words: usize,
    max_records_per_epic: Option<usize>,
}

impl EnrichmentResolver {
    pub fn new(
        enricher: Option<Box<dyn Enricher>>,
        max_words: usize,
        max_records_per_epic: Option<usize>,
    ) -> Self {
        Self {
            enricher,
            max_words,
            max_records_per_epic,
        }
    }

    pub fn fallback_only(max_words: usize) -> Self {
        Self::new(None, max_words, None)
    }

    /// `position` 為記錄在所屬 Epic 中的索引（從 0 開始）
    pub async fn resolve(&self, record: &RequirementRecord, position: usize) -> ResolvedText {
        let fallback = ResolvedText {
            summary: make_fallback_summary(&record.id, &record.description, self.max_words),
            description: record.description.trim().to_string(),
            enriched: false,
        };

        let Some(enricher) = &self.enricher else {
            return fallback;
        };
        if let Some(cap) = self.max_records_per_epic {
            if position >= cap {
                tracing::debug!(
                    "Enrichment cap {} reached, using fallback text for '{}'",
                    cap,
                    record.id
                );
                return fallback;
            }
        }

        let enrichment = match enricher.enrich(record).await {
            Ok(enrichment) => enrichment,
            Err(e) => {
                tracing::warn!("⚠️ Enrichment unavailable for '{}': {}", record.id, e);
                return fallback;
            }
        };

        if !enrichment.is_valid {
            tracing::info!(
                "📝 Enrichment marked '{}' as invalid, keeping original text",
                record.id
            );
            return fallback;
        }

        let summary = usable(enrichment.summary)
            .map(|s| ensure_id_prefix(&record.id, &s))
            .map(|s| truncate_chars(&s, MAX_SUMMARY_CHARS));
        let description = usable(enrichment.description);
        let enriched = summary.is_some() || description.is_some();

        ResolvedText {
            summary: summary.unwrap_or(fallback.summary),
            description: description.unwrap_or(fallback.description),
            enriched,
        }
    }
}

fn usable(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// 沒有帶 ID 的生成標題補上 `[id]`，否則下次執行查不到既有的 Story
fn ensure_id_prefix(id: &str, summary: &str) -> String {
    let id = id.trim();
    if id.is_empty() || title_matches_record(summary, id) {
        summary.to_string()
    } else {
        format!("[{}] {}", id, summary)
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
