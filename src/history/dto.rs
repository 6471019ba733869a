use serde::{Deserialize, Serialize};

use super::aggregate::{AnnotatedDay, RangeSummary};

/// Either bound may be omitted; see `resolve_window`.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub start: Option<String>,
    pub end: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub start: String,
    pub end: String,
    pub days: Vec<AnnotatedDay>,
    pub summary: RangeSummary,
}
