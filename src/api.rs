use serde::{Deserialize, Serialize};

use crate::model::HighlightRecord;
use crate::page::Message;
use crate::restore::RestoreReport;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct APIResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct RenderRequest {
    pub url: String,
    pub html: String,
}

#[derive(Debug, Serialize)]
pub struct RenderResponse {
    pub html: String,
    pub report: RestoreReport,
}

/// One end of a browser selection. The boundary node is the `child`-th child
/// node of the element at `xpath`, and `offset` is in UTF-16 units.
#[derive(Debug, Clone, Deserialize)]
pub struct BoundaryPoint {
    pub xpath: String,
    pub child: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionPayload {
    pub anchor: BoundaryPoint,
    pub focus: BoundaryPoint,
}

#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    pub url: String,
    pub html: String,
    pub selection: SelectionPayload,
    pub color: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptureResponse {
    pub highlight: HighlightRecord,
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    #[serde(flatten)]
    pub message: Message,
    pub url: Option<String>,
    pub html: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub highlights: Vec<HighlightRecord>,
}
