//! Bump frameworks: reusable follow-up templates an SDR attaches to a
//! pipeline stage.
//!
//! Rules live here so both repositories share them: which substatus may be
//! paired with which overall status, how a default is made unique within its
//! (SDR, overall status, substatus) group, and which framework a prospect
//! should use next.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ArchetypeId, BumpFrameworkId, ClientSdrId, Prospect};
use crate::status::{ProspectOverallStatus, ProspectStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BumpFramework {
    pub id: BumpFrameworkId,
    pub client_sdr_id: ClientSdrId,
    pub archetype_id: Option<ArchetypeId>,
    pub title: String,
    pub description: String,
    pub overall_status: ProspectOverallStatus,
    pub substatus: Option<ProspectStatus>,
    pub default: bool,
    pub active: bool,
    pub bump_delay_days: i64,
}

impl BumpFramework {
    /// The group within which at most one framework may be the default.
    pub fn default_key(&self) -> (ClientSdrId, ProspectOverallStatus, Option<ProspectStatus>) {
        (self.client_sdr_id, self.overall_status, self.substatus)
    }
}

/// Fields for a new framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBumpFramework {
    #[serde(default)]
    pub archetype_id: Option<ArchetypeId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub overall_status: ProspectOverallStatus,
    #[serde(default)]
    pub substatus: Option<ProspectStatus>,
    #[serde(default)]
    pub default: bool,
    #[serde(default = "default_bump_delay_days")]
    pub bump_delay_days: i64,
}

fn default_bump_delay_days() -> i64 {
    2
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BumpFrameworkUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub overall_status: Option<ProspectOverallStatus>,
    #[serde(default)]
    pub substatus: Option<ProspectStatus>,
    #[serde(default)]
    pub bump_delay_days: Option<i64>,
}

impl BumpFrameworkUpdate {
    /// Apply onto `framework`. A new `overall_status` without a new
    /// `substatus` drops the old substatus, which would no longer match.
    pub fn apply(&self, framework: &mut BumpFramework) {
        if let Some(title) = &self.title {
            framework.title = title.clone();
        }
        if let Some(description) = &self.description {
            framework.description = description.clone();
        }
        if let Some(overall) = self.overall_status {
            if overall != framework.overall_status && self.substatus.is_none() {
                framework.substatus = None;
            }
            framework.overall_status = overall;
        }
        if let Some(substatus) = self.substatus {
            framework.substatus = Some(substatus);
        }
        if let Some(days) = self.bump_delay_days {
            framework.bump_delay_days = days;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BumpFrameworkError {
    #[error("Bump framework title must not be empty")]
    EmptyTitle,

    #[error("Substatus {substatus} does not belong to overall status {overall}")]
    SubstatusMismatch {
        overall: ProspectOverallStatus,
        substatus: ProspectStatus,
    },

    #[error("Bump delay must be non-negative, got {0} days")]
    NegativeDelay(i64),
}

/// Check the fields a framework is about to be stored with.
pub fn validate_bump_framework(
    title: &str,
    overall_status: ProspectOverallStatus,
    substatus: Option<ProspectStatus>,
    bump_delay_days: i64,
) -> Result<(), BumpFrameworkError> {
    if title.trim().is_empty() {
        return Err(BumpFrameworkError::EmptyTitle);
    }
    if let Some(substatus) = substatus {
        if substatus.overall() != overall_status {
            return Err(BumpFrameworkError::SubstatusMismatch {
                overall: overall_status,
                substatus,
            });
        }
    }
    if bump_delay_days < 0 {
        return Err(BumpFrameworkError::NegativeDelay(bump_delay_days));
    }
    Ok(())
}

/// Make `id` the default of its group, unsetting every other default in the
/// same group. Returns false if `id` is not in `frameworks`.
pub fn apply_default(frameworks: &mut [BumpFramework], id: BumpFrameworkId) -> bool {
    let Some(key) = frameworks
        .iter()
        .find(|f| f.id == id)
        .map(BumpFramework::default_key)
    else {
        return false;
    };
    for framework in frameworks.iter_mut() {
        if framework.default_key() == key {
            framework.default = framework.id == id;
        }
    }
    true
}

/// Pick the framework to use for the prospect's next bump.
///
/// Candidates are active frameworks of the prospect's SDR for its overall
/// status, whose substatus is unset or equal to the prospect's status and
/// whose archetype is unset or equal to the prospect's. Among those, prefer
/// an archetype match, then a default, then a substatus match, then the
/// lowest id.
pub fn select_bump_framework<'a>(
    frameworks: &'a [BumpFramework],
    prospect: &Prospect,
) -> Option<&'a BumpFramework> {
    frameworks
        .iter()
        .filter(|f| {
            f.active
                && f.client_sdr_id == prospect.client_sdr_id
                && f.overall_status == prospect.overall_status
                && f.substatus.map_or(true, |s| s == prospect.status)
                && f.archetype_id.map_or(true, |a| Some(a) == prospect.archetype_id)
        })
        .min_by_key(|f| {
            (
                f.archetype_id.is_none(),
                !f.default,
                f.substatus.is_none(),
                f.id,
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProspectId;
    use proptest::prelude::*;

    fn framework(id: i64, overall: ProspectOverallStatus) -> BumpFramework {
        BumpFramework {
            id: BumpFrameworkId(id),
            client_sdr_id: ClientSdrId(1),
            archetype_id: None,
            title: format!("Framework {id}"),
            description: String::new(),
            overall_status: overall,
            substatus: None,
            default: false,
            active: true,
            bump_delay_days: 2,
        }
    }

    fn prospect(status: ProspectStatus) -> Prospect {
        Prospect {
            id: ProspectId(1),
            client_sdr_id: ClientSdrId(1),
            archetype_id: Some(ArchetypeId(10)),
            full_name: "Katherine Johnson".to_string(),
            title: None,
            company: None,
            status,
            overall_status: status.overall(),
            approved_outreach_message_id: None,
            last_linkedin_message_at: None,
            last_email_message_at: None,
            times_bumped: 0,
            hidden_until: None,
            hidden_reason: None,
            version: 0,
        }
    }

    #[test]
    fn test_substatus_must_match_overall() {
        assert!(validate_bump_framework(
            "Follow up",
            ProspectOverallStatus::ActiveConvo,
            Some(ProspectStatus::ActiveConvoQuestion),
            2,
        )
        .is_ok());
        assert_eq!(
            validate_bump_framework(
                "Follow up",
                ProspectOverallStatus::Accepted,
                Some(ProspectStatus::ActiveConvoQuestion),
                2,
            ),
            Err(BumpFrameworkError::SubstatusMismatch {
                overall: ProspectOverallStatus::Accepted,
                substatus: ProspectStatus::ActiveConvoQuestion,
            })
        );
    }

    #[test]
    fn test_validation_rejects_blank_title_and_negative_delay() {
        assert_eq!(
            validate_bump_framework("  ", ProspectOverallStatus::Accepted, None, 2),
            Err(BumpFrameworkError::EmptyTitle)
        );
        assert_eq!(
            validate_bump_framework("x", ProspectOverallStatus::Accepted, None, -1),
            Err(BumpFrameworkError::NegativeDelay(-1))
        );
    }

    #[test]
    fn test_selection_prefers_archetype_then_default() {
        let mut generic_default = framework(1, ProspectOverallStatus::Accepted);
        generic_default.default = true;
        let mut persona = framework(2, ProspectOverallStatus::Accepted);
        persona.archetype_id = Some(ArchetypeId(10));
        let other_persona = BumpFramework {
            archetype_id: Some(ArchetypeId(11)),
            ..framework(3, ProspectOverallStatus::Accepted)
        };
        let frameworks = vec![generic_default, persona, other_persona];

        let chosen = select_bump_framework(&frameworks, &prospect(ProspectStatus::Accepted));
        assert_eq!(chosen.map(|f| f.id), Some(BumpFrameworkId(2)));
    }

    #[test]
    fn test_selection_skips_inactive_and_other_stages() {
        let mut inactive = framework(1, ProspectOverallStatus::Accepted);
        inactive.active = false;
        let wrong_stage = framework(2, ProspectOverallStatus::Bumped);
        let fallback = framework(3, ProspectOverallStatus::Accepted);
        let frameworks = vec![inactive, wrong_stage, fallback];

        let chosen = select_bump_framework(&frameworks, &prospect(ProspectStatus::Accepted));
        assert_eq!(chosen.map(|f| f.id), Some(BumpFrameworkId(3)));
    }

    #[test]
    fn test_selection_matches_substatus() {
        let mut question = framework(1, ProspectOverallStatus::ActiveConvo);
        question.substatus = Some(ProspectStatus::ActiveConvoQuestion);
        let mut objection = framework(2, ProspectOverallStatus::ActiveConvo);
        objection.substatus = Some(ProspectStatus::ActiveConvoObjection);
        let generic = framework(3, ProspectOverallStatus::ActiveConvo);
        let frameworks = vec![question, objection, generic];

        let chosen =
            select_bump_framework(&frameworks, &prospect(ProspectStatus::ActiveConvoObjection));
        assert_eq!(chosen.map(|f| f.id), Some(BumpFrameworkId(2)));

        let chosen = select_bump_framework(&frameworks, &prospect(ProspectStatus::ActiveConvo));
        assert_eq!(chosen.map(|f| f.id), Some(BumpFrameworkId(3)));
    }

    #[test]
    fn test_selection_none_when_no_candidates() {
        let frameworks = vec![framework(1, ProspectOverallStatus::Demo)];
        assert!(select_bump_framework(&frameworks, &prospect(ProspectStatus::Accepted)).is_none());
    }

    #[test]
    fn test_update_changing_stage_drops_stale_substatus() {
        let mut f = framework(1, ProspectOverallStatus::ActiveConvo);
        f.substatus = Some(ProspectStatus::ActiveConvoQuestion);
        BumpFrameworkUpdate {
            overall_status: Some(ProspectOverallStatus::Accepted),
            ..Default::default()
        }
        .apply(&mut f);
        assert_eq!(f.overall_status, ProspectOverallStatus::Accepted);
        assert_eq!(f.substatus, None);
    }

    #[test]
    fn test_apply_default_unknown_id() {
        let mut frameworks = vec![framework(1, ProspectOverallStatus::Accepted)];
        assert!(!apply_default(&mut frameworks, BumpFrameworkId(99)));
        assert!(!frameworks[0].default);
    }

    fn stage() -> impl Strategy<Value = ProspectOverallStatus> {
        proptest::sample::select(vec![
            ProspectOverallStatus::Accepted,
            ProspectOverallStatus::Bumped,
            ProspectOverallStatus::ActiveConvo,
        ])
    }

    proptest! {
        #[test]
        fn at_most_one_default_per_group(
            stages in proptest::collection::vec(stage(), 1..8),
            picks in proptest::collection::vec(0usize..8, 0..16),
        ) {
            let mut frameworks: Vec<_> = stages
                .iter()
                .enumerate()
                .map(|(i, s)| framework(i as i64 + 1, *s))
                .collect();
            for pick in picks {
                let id = BumpFrameworkId((pick % frameworks.len()) as i64 + 1);
                prop_assert!(apply_default(&mut frameworks, id));
                let chosen = frameworks.iter().find(|f| f.id == id).unwrap();
                prop_assert!(chosen.default);
            }
            for f in &frameworks {
                let defaults = frameworks
                    .iter()
                    .filter(|g| g.default && g.default_key() == f.default_key())
                    .count();
                prop_assert!(defaults <= 1);
            }
        }
    }
}
