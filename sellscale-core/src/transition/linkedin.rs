//! LinkedIn channel planner.

use chrono::{DateTime, Utc};

use super::{transition_log, validate_linkedin_transition, DemoSetType, PlannerSettings};
use super::{TransitionError, TransitionRequest};
use crate::effect::{Effect, Notification, NotifyChannel, OutreachChannel, ProspectSummary};
use crate::model::{HiddenReason, NewStatusRecord, Prospect};
use crate::status::{
    overall_status_for, ProspectEmailOutreachStatus, ProspectOverallStatus, ProspectStatus,
};

/// Result of planning a LinkedIn transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Prospect after the transition. `version` is unchanged; the repository
    /// bumps it when the compare-and-swap succeeds.
    pub prospect: Prospect,
    pub record: NewStatusRecord,
    pub effects: Vec<Effect>,
}

/// Plan a LinkedIn status change.
///
/// `email_status` is the prospect's current email-channel status, used to
/// recompute the overall status from both channels.
pub fn plan_linkedin_transition(
    prospect: &Prospect,
    email_status: Option<ProspectEmailOutreachStatus>,
    request: &TransitionRequest<ProspectStatus>,
    now: DateTime<Utc>,
    settings: &PlannerSettings,
) -> Result<TransitionPlan, TransitionError> {
    let from = prospect.status;
    let to = request.new_status;
    validate_linkedin_transition(from, to, request.override_status)?;

    let mut next = prospect.clone();
    next.status = to;
    next.overall_status = overall_status_for(to, email_status);

    match to {
        ProspectStatus::SentOutreach => {
            next.last_linkedin_message_at = Some(now);
        }
        ProspectStatus::Responded => {
            next.times_bumped += 1;
            next.last_linkedin_message_at = Some(now);
            next.send_to_purgatory(
                now,
                settings.bump_purgatory_days,
                HiddenReason::RecentlyBumped,
            )?;
        }
        _ => {}
    }
    if matches!(
        to.overall(),
        ProspectOverallStatus::Removed | ProspectOverallStatus::Demo
    ) {
        next.clear_purgatory();
    }

    let record = NewStatusRecord {
        from_status: from,
        to_status: to,
        automated: request.automated,
    };

    let effects = if request.quietly {
        Vec::new()
    } else {
        linkedin_effects(&next, from, request)
    };

    Ok(TransitionPlan {
        prospect: next,
        record,
        effects,
    })
}

fn linkedin_effects(
    prospect: &Prospect,
    from: ProspectStatus,
    request: &TransitionRequest<ProspectStatus>,
) -> Vec<Effect> {
    let to = request.new_status;
    let mut effects = Vec::new();

    if to.overall() == ProspectOverallStatus::Removed {
        effects.push(Effect::BlockLinkedinMessage {
            prospect_id: prospect.id,
        });
    }

    let summary = || ProspectSummary::from(prospect);
    match to {
        ProspectStatus::Accepted => effects.push(Effect::Notify {
            channel: NotifyChannel::Pipeline,
            notification: Notification::InviteAccepted {
                prospect: summary(),
            },
        }),
        ProspectStatus::ActiveConvo if !from.is_active_convo() => effects.push(Effect::Notify {
            channel: NotifyChannel::Pipeline,
            notification: Notification::ConversationStarted {
                prospect: summary(),
                channel: OutreachChannel::Linkedin,
            },
        }),
        ProspectStatus::DemoSet => {
            effects.extend(demo_set_effects(
                prospect,
                request.demo_set_type,
                request.automated,
                OutreachChannel::Linkedin,
            ));
        }
        ProspectStatus::DemoWon => effects.push(Effect::Notify {
            channel: NotifyChannel::Demos,
            notification: Notification::DemoWon {
                prospect: summary(),
                channel: OutreachChannel::Linkedin,
            },
        }),
        _ => {}
    }

    effects.push(transition_log(
        prospect.id,
        "linkedin",
        from,
        to,
        request.override_status,
    ));
    effects
}

/// Notifications for a booked demo, shared by both channels.
pub(super) fn demo_set_effects(
    prospect: &Prospect,
    demo_set_type: Option<DemoSetType>,
    automated: bool,
    channel: OutreachChannel,
) -> Vec<Effect> {
    let mut effects = Vec::new();
    if demo_set_type == Some(DemoSetType::Handoff) {
        effects.push(Effect::Notify {
            channel: NotifyChannel::Demos,
            notification: Notification::DemoSetHandoff {
                prospect: ProspectSummary::from(prospect),
                channel,
            },
        });
    }
    if automated {
        effects.push(Effect::Notify {
            channel: NotifyChannel::DemoDetection,
            notification: Notification::DemoSetDetected {
                prospect: ProspectSummary::from(prospect),
                channel,
            },
        });
    }
    effects
}
