//! Email channel planner.

use chrono::{DateTime, Utc};

use super::linkedin::demo_set_effects;
use super::{transition_log, validate_email_transition, PlannerSettings};
use super::{TransitionError, TransitionRequest};
use crate::effect::{Effect, Notification, NotifyChannel, OutreachChannel, ProspectSummary};
use crate::model::{NewEmailStatusRecord, Prospect, ProspectEmail};
use crate::status::{overall_status_for, ProspectEmailOutreachStatus, ProspectOverallStatus};

/// Result of planning an email transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTransitionPlan {
    pub prospect: Prospect,
    pub email: ProspectEmail,
    pub record: NewEmailStatusRecord,
    pub effects: Vec<Effect>,
}

/// Plan an email status change. The prospect's overall status is recomputed
/// from both channels.
pub fn plan_email_transition(
    prospect: &Prospect,
    email: Option<&ProspectEmail>,
    request: &TransitionRequest<ProspectEmailOutreachStatus>,
    now: DateTime<Utc>,
    _settings: &PlannerSettings,
) -> Result<EmailTransitionPlan, TransitionError> {
    let email = email.ok_or(TransitionError::NoEmailRecord(prospect.id))?;
    let from = email.outreach_status;
    let to = request.new_status;
    validate_email_transition(from, to, request.override_status)?;

    let mut next_email = email.clone();
    next_email.outreach_status = Some(to);

    let mut next = prospect.clone();
    next.overall_status = overall_status_for(prospect.status, Some(to));
    if to == ProspectEmailOutreachStatus::SentOutreach {
        next.last_email_message_at = Some(now);
    }
    if matches!(
        to.overall(),
        ProspectOverallStatus::Removed | ProspectOverallStatus::Demo
    ) {
        next.clear_purgatory();
    }

    let record = NewEmailStatusRecord {
        from_status: from,
        to_status: to,
        automated: request.automated,
    };

    let effects = if request.quietly {
        Vec::new()
    } else {
        email_effects(&next, from, request)
    };

    Ok(EmailTransitionPlan {
        prospect: next,
        email: next_email,
        record,
        effects,
    })
}

fn email_effects(
    prospect: &Prospect,
    from: Option<ProspectEmailOutreachStatus>,
    request: &TransitionRequest<ProspectEmailOutreachStatus>,
) -> Vec<Effect> {
    use ProspectEmailOutreachStatus as S;

    let to = request.new_status;
    let mut effects = Vec::new();

    if to.overall() == ProspectOverallStatus::Removed {
        effects.push(Effect::BlockEmailMessages {
            prospect_id: prospect.id,
        });
    }

    let was_in_convo = from.is_some_and(|s| s.overall() == ProspectOverallStatus::ActiveConvo);
    match to {
        S::ActiveConvo if !was_in_convo => effects.push(Effect::Notify {
            channel: NotifyChannel::Pipeline,
            notification: Notification::ConversationStarted {
                prospect: ProspectSummary::from(prospect),
                channel: OutreachChannel::Email,
            },
        }),
        S::DemoSet => effects.extend(demo_set_effects(
            prospect,
            request.demo_set_type,
            request.automated,
            OutreachChannel::Email,
        )),
        S::DemoWon => effects.push(Effect::Notify {
            channel: NotifyChannel::Demos,
            notification: Notification::DemoWon {
                prospect: ProspectSummary::from(prospect),
                channel: OutreachChannel::Email,
            },
        }),
        _ => {}
    }

    let from_label = from.map_or("NONE", |s| s.as_str());
    effects.push(transition_log(
        prospect.id,
        "email",
        from_label,
        to,
        request.override_status,
    ));
    effects
}
