//! Transition tables for both channels.
//!
//! Each table is an exhaustive `match` returning an ordered slice, so every
//! status has an entry and a new status without one is a compile error.
//! Terminal statuses map to the empty slice.

use crate::status::{ProspectEmailOutreachStatus, ProspectStatus};

/// Legal next LinkedIn statuses from `status`, in display order.
pub fn valid_next_linkedin_statuses(status: ProspectStatus) -> &'static [ProspectStatus] {
    use ProspectStatus::*;
    match status {
        Prospected => &[
            QueuedForOutreach,
            SentOutreach,
            SendOutreachFailed,
            NotQualified,
        ],
        QueuedForOutreach => &[SentOutreach, SendOutreachFailed, Prospected, NotQualified],
        SendOutreachFailed => &[QueuedForOutreach, Prospected, NotQualified],
        SentOutreach => &[
            Accepted,
            Responded,
            ActiveConvo,
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
        ],
        Accepted => &[
            Responded,
            ActiveConvo,
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
        ],
        Responded => &[
            Responded,
            ActiveConvo,
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
        ],
        ActiveConvo => &[
            ActiveConvoQuestion,
            ActiveConvoQualNeeded,
            ActiveConvoObjection,
            ActiveConvoScheduling,
            ActiveConvoNextSteps,
            ActiveConvoRevival,
            ActiveConvoCircleBack,
            ActiveConvoReferral,
            ActiveConvoQueuedForSnooze,
            ActiveConvoContinueSequence,
            ActiveConvoBreakup,
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
        ],
        // Classification tags: they may park the conversation but never
        // hop sideways to another classification.
        ActiveConvoQuestion
        | ActiveConvoQualNeeded
        | ActiveConvoObjection
        | ActiveConvoScheduling
        | ActiveConvoNextSteps
        | ActiveConvoReferral => &[
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
            ActiveConvoQueuedForSnooze,
            ActiveConvoCircleBack,
            ActiveConvoBreakup,
        ],
        ActiveConvoQueuedForSnooze
        | ActiveConvoCircleBack
        | ActiveConvoContinueSequence
        | ActiveConvoBreakup => &[
            ActiveConvo,
            ActiveConvoRevival,
            Scheduling,
            NotInterested,
            DemoSet,
            NotQualified,
        ],
        ActiveConvoRevival => &[ActiveConvo, Scheduling, NotInterested, DemoSet, NotQualified],
        Scheduling => &[DemoSet, NotInterested, NotQualified, ActiveConvo],
        NotInterested => &[
            ActiveConvo,
            ActiveConvoRevival,
            Scheduling,
            DemoSet,
            NotQualified,
        ],
        DemoSet => &[DemoWon, DemoLoss, NotInterested],
        DemoLoss => &[DemoSet, NotInterested, NotQualified],
        DemoWon | NotQualified => &[],
    }
}

/// Legal next email statuses from `status`, in display order.
pub fn valid_next_email_statuses(
    status: ProspectEmailOutreachStatus,
) -> &'static [ProspectEmailOutreachStatus] {
    use ProspectEmailOutreachStatus::*;
    match status {
        Unknown => &[NotSent, QueuedForOutreach, SentOutreach, Bounced],
        NotSent => &[QueuedForOutreach, SentOutreach],
        QueuedForOutreach => &[SentOutreach, NotSent],
        SentOutreach => &[
            EmailOpened,
            Accepted,
            ActiveConvo,
            Bounced,
            Unsubscribed,
            NotInterested,
            Scheduling,
            DemoSet,
        ],
        EmailOpened => &[
            Accepted,
            ActiveConvo,
            Unsubscribed,
            NotInterested,
            Scheduling,
            DemoSet,
        ],
        Accepted => &[ActiveConvo, Unsubscribed, NotInterested, Scheduling, DemoSet],
        ActiveConvo => &[
            ActiveConvoQuestion,
            ActiveConvoQualNeeded,
            ActiveConvoObjection,
            ActiveConvoScheduling,
            ActiveConvoNextSteps,
            ActiveConvoRevival,
            ActiveConvoOoo,
            Scheduling,
            NotInterested,
            Unsubscribed,
            DemoSet,
        ],
        ActiveConvoQuestion
        | ActiveConvoQualNeeded
        | ActiveConvoObjection
        | ActiveConvoScheduling
        | ActiveConvoNextSteps
        | ActiveConvoRevival
        | ActiveConvoOoo => &[ActiveConvo, Scheduling, NotInterested, Unsubscribed, DemoSet],
        Scheduling => &[DemoSet, NotInterested, ActiveConvo],
        NotInterested => &[ActiveConvoRevival, ActiveConvo, DemoSet],
        DemoSet => &[DemoWon, DemoLost],
        DemoLost => &[DemoSet],
        DemoWon | Unsubscribed | Bounced => &[],
    }
}

impl ProspectStatus {
    /// No outgoing edges.
    pub fn is_terminal(&self) -> bool {
        valid_next_linkedin_statuses(*self).is_empty()
    }
}

impl ProspectEmailOutreachStatus {
    pub fn is_terminal(&self) -> bool {
        valid_next_email_statuses(*self).is_empty()
    }
}
