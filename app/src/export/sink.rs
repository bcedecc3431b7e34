use derive_more::derive::{Display, Error};

use super::point::ExportPoint;

#[derive(Debug, Clone, Display, Error)]
pub enum SinkError {
    #[display("Error sending request to {url}: {reason}")]
    Transport { url: String, reason: String },

    #[display("Request to {url} rejected with status {status}: {body}")]
    Rejected { url: String, status: u16, body: String },

    #[display("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// External time-series store receiving the exported points.
pub trait PointSink: Send + Sync {
    /// Single diagnostic round-trip, used once before the export starts.
    fn check_connectivity(&self) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Writes all points in one request. Either the whole batch is stored or
    /// an error is returned.
    fn write(&self, points: Vec<ExportPoint>) -> impl Future<Output = Result<(), SinkError>> + Send;
}
