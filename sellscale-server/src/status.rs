//! Read-only views: the status vocabulary with its transition tables, and
//! the pipeline summary for an SDR.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use sellscale_core::{
    valid_next_email_statuses, valid_next_linkedin_statuses, Prospect,
    ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus, StatusDescriptor,
};

/// One channel status, its descriptor and its legal next statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTableEntry {
    pub status: &'static str,
    #[serde(flatten)]
    pub descriptor: StatusDescriptor,
    pub next: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverallStatusEntry {
    pub status: &'static str,
    pub name: &'static str,
    pub rank: u8,
}

/// Every status of both channels with its transition table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTables {
    pub overall: Vec<OverallStatusEntry>,
    pub linkedin: Vec<StatusTableEntry>,
    pub email: Vec<StatusTableEntry>,
}

impl StatusTables {
    pub fn build() -> Self {
        Self {
            overall: ProspectOverallStatus::ALL
                .iter()
                .map(|s| OverallStatusEntry {
                    status: s.as_str(),
                    name: s.display_name(),
                    rank: s.rank(),
                })
                .collect(),
            linkedin: ProspectStatus::ALL
                .iter()
                .map(|s| StatusTableEntry {
                    status: s.as_str(),
                    descriptor: s.descriptor(),
                    next: valid_next_linkedin_statuses(*s)
                        .iter()
                        .map(|n| n.as_str())
                        .collect(),
                })
                .collect(),
            email: ProspectEmailOutreachStatus::ALL
                .iter()
                .map(|s| StatusTableEntry {
                    status: s.as_str(),
                    descriptor: s.descriptor(),
                    next: valid_next_email_statuses(*s)
                        .iter()
                        .map(|n| n.as_str())
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Counts of an SDR's prospects by stage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineSummary {
    pub total_prospects: usize,
    /// Keyed by overall status wire name; every overall status is present.
    pub overall: BTreeMap<&'static str, usize>,
    /// Keyed by LinkedIn status wire name; only statuses in use appear.
    pub linkedin: BTreeMap<&'static str, usize>,
    /// Prospects currently hidden from outreach queues.
    pub in_purgatory: usize,
}

impl PipelineSummary {
    pub fn from_prospects(prospects: &[Prospect], now: DateTime<Utc>) -> Self {
        let mut summary = PipelineSummary {
            total_prospects: prospects.len(),
            overall: ProspectOverallStatus::ALL
                .iter()
                .map(|s| (s.as_str(), 0))
                .collect(),
            ..Default::default()
        };

        for prospect in prospects {
            *summary
                .overall
                .entry(prospect.overall_status.as_str())
                .or_default() += 1;
            *summary
                .linkedin
                .entry(prospect.status.as_str())
                .or_default() += 1;
            if prospect.in_purgatory(now) {
                summary.in_purgatory += 1;
            }
        }

        summary
    }

    pub fn overall_count(&self, status: ProspectOverallStatus) -> usize {
        self.overall.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn linkedin_count(&self, status: ProspectStatus) -> usize {
        self.linkedin.get(status.as_str()).copied().unwrap_or(0)
    }
}
