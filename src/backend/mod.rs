//! Summary email backend -- the remote functions a dispatch invokes.

pub mod http;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::http::HttpBackend;

/// The three daily summaries, in the order a dispatch calls them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Rfp,
    Prospect,
    ClientNeed,
}

impl SummaryKind {
    /// Fixed call order for a dispatch.
    pub const DISPATCH_ORDER: [SummaryKind; 3] =
        [SummaryKind::Rfp, SummaryKind::Prospect, SummaryKind::ClientNeed];

    pub fn label(self) -> &'static str {
        match self {
            SummaryKind::Rfp => "RFP summary",
            SummaryKind::Prospect => "Prospect summary",
            SummaryKind::ClientNeed => "Client-need summary",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryKind::Rfp => write!(f, "rfp"),
            SummaryKind::Prospect => write!(f, "prospect"),
            SummaryKind::ClientNeed => write!(f, "client_need"),
        }
    }
}

/// JSON body sent to a summary function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub auto_trigger: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub manual_trigger: bool,
}

impl TriggerRequest {
    pub fn scheduled() -> Self {
        Self {
            auto_trigger: true,
            manual_trigger: false,
        }
    }

    pub fn manual() -> Self {
        Self {
            auto_trigger: false,
            manual_trigger: true,
        }
    }
}

/// What a summary function reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub emails_sent: Option<u32>,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(String),
}

/// A remote that sends one summary email batch per call.
#[async_trait]
pub trait SummaryBackend: Send + Sync {
    async fn trigger(
        &self,
        kind: SummaryKind,
        request: TriggerRequest,
    ) -> Result<SummaryResponse, DispatchError>;
}
