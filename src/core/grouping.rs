use crate::domain::model::{EpicGroups, RequirementRecord};

/// 依 Epic 名稱分組；名稱為空白的記錄直接略過
pub fn group_by_epic<I>(records: I) -> EpicGroups
where
    I: IntoIterator<Item = RequirementRecord>,
{
    let mut groups = EpicGroups::new();
    for record in records {
        let epic_name = record.epic_name.trim().to_string();
        if epic_name.is_empty() {
            tracing::debug!("Dropping record '{}' without epic name", record.id);
            continue;
        }
        groups.push(&epic_name, record);
    }
    groups
}
