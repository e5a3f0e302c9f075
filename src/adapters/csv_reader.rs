use crate::config::toml_config::ColumnMapping;
use crate::domain::model::RequirementRecord;
use crate::utils::error::{Result, SyncError};
use crate::utils::validation;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

/// 以逗號分隔讀取的副檔名
pub const INPUT_EXTENSIONS: &[&str] = &["csv", "txt"];

/// 檢查輸入檔路徑與副檔名
pub fn validate_input_path(field_name: &str, path: &str) -> Result<()> {
    validation::validate_path(field_name, path)?;
    validation::validate_file_extensions(field_name, &[path.to_string()], INPUT_EXTENSIONS)
}

/// 將需求表格（CSV）轉成 RequirementRecord
pub struct RequirementReader {
    columns: ColumnMapping,
}

/// 各欄位在表頭中的位置
struct ColumnIndex {
    id: usize,
    epic_name: usize,
    description: Option<usize>,
    priority: Option<usize>,
    domain: Option<usize>,
    sub_domain: Option<usize>,
    requirement_type: Option<usize>,
}

impl RequirementReader {
    pub fn new(columns: ColumnMapping) -> Self {
        Self { columns }
    }

    pub fn read_path<P: AsRef<Path>>(&self, path: P) -> Result<Vec<RequirementRecord>> {
        let file = std::fs::File::open(path.as_ref())?;
        let records = self.read_from(file)?;
        tracing::info!(
            "📄 Read {} requirement records from {}",
            records.len(),
            path.as_ref().display()
        );
        Ok(records)
    }

    pub fn read_bytes(&self, bytes: &[u8]) -> Result<Vec<RequirementRecord>> {
        self.read_from(bytes)
    }

    fn read_from<R: Read>(&self, input: R) -> Result<Vec<RequirementRecord>> {
        let mut reader = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(input);

        let headers = reader.headers()?.clone();
        let index = self.index_columns(&headers)?;

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            if row.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            records.push(index.to_record(&row));
        }
        Ok(records)
    }

    fn index_columns(&self, headers: &StringRecord) -> Result<ColumnIndex> {
        let find = |name: &str| {
            headers.iter().position(|header| {
                header
                    .trim_start_matches('\u{feff}')
                    .trim()
                    .eq_ignore_ascii_case(name.trim())
            })
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| SyncError::ProcessingError {
                message: format!("Missing required column '{}'", name),
            })
        };

        Ok(ColumnIndex {
            id: require(&self.columns.requirement_id)?,
            epic_name: require(&self.columns.requirement)?,
            description: find(&self.columns.description),
            priority: find(&self.columns.priority),
            domain: find(&self.columns.domain),
            sub_domain: find(&self.columns.sub_domain),
            requirement_type: find(&self.columns.requirement_type),
        })
    }
}

impl ColumnIndex {
    fn to_record(&self, row: &StringRecord) -> RequirementRecord {
        let cell = |idx: Option<usize>| -> String {
            idx.and_then(|i| row.get(i)).unwrap_or_default().trim().to_string()
        };

        RequirementRecord {
            id: cell(Some(self.id)),
            epic_name: cell(Some(self.epic_name)),
            description: cell(self.description),
            priority_code: cell(self.priority),
            domain: cell(self.domain),
            sub_domain: cell(self.sub_domain),
            requirement_type: cell(self.requirement_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SHEET: &str = "\
Requirement ID,Requirement,Description,Priority,Domain,Sub-domain,Requirement type
REQ-1,Checkout,\"Pay with card, fast\",P1,Billing,Cards,Functional
,,,,,,
REQ-2,Accounts,Reset password,P2,Identity,,Functional
";

    #[test]
    fn test_reads_default_columns() {
        let records = RequirementReader::new(ColumnMapping::default())
            .read_bytes(SHEET.as_bytes())
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "REQ-1");
        assert_eq!(records[0].epic_name, "Checkout");
        assert_eq!(records[0].description, "Pay with card, fast");
        assert_eq!(records[0].priority_code, "P1");
        assert_eq!(records[0].sub_domain, "Cards");
        assert_eq!(records[1].sub_domain, "");
    }

    #[test]
    fn test_custom_columns_and_missing_optional() {
        let sheet = "\u{feff}Req ID,Epic\nREQ-9,Search\n";
        let columns = ColumnMapping {
            requirement_id: "req id".to_string(),
            requirement: "Epic".to_string(),
            ..Default::default()
        };

        let records = RequirementReader::new(columns).read_bytes(sheet.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "REQ-9");
        assert_eq!(records[0].epic_name, "Search");
        assert!(records[0].description.is_empty());
    }

    #[test]
    fn test_missing_required_column() {
        let result = RequirementReader::new(ColumnMapping::default())
            .read_bytes(b"Requirement,Description\nCheckout,Pay\n");
        assert!(matches!(result, Err(SyncError::ProcessingError { .. })));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let sheet = "Requirement ID,Requirement,Description\nREQ-3,Checkout\n";
        let records = RequirementReader::new(ColumnMapping::default())
            .read_bytes(sheet.as_bytes())
            .unwrap();
        assert_eq!(records[0].description, "");
    }

    #[test]
    fn test_input_extensions() {
        assert!(validate_input_path("input", "reqs.csv").is_ok());
        assert!(validate_input_path("input", "exports/reqs.TXT").is_ok());
        assert!(validate_input_path("input", "reqs.xlsx").is_err());
        assert!(validate_input_path("input", "").is_err());
    }

    #[test]
    fn test_read_txt_path() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        file.write_all(SHEET.as_bytes()).unwrap();
        let path = file.path().to_string_lossy().to_string();

        assert!(validate_input_path("input", &path).is_ok());
        let records = RequirementReader::new(ColumnMapping::default())
            .read_path(&path)
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_read_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SHEET.as_bytes()).unwrap();

        let records = RequirementReader::new(ColumnMapping::default())
            .read_path(file.path())
            .unwrap();
        assert_eq!(records.len(), 2);
    }
}
