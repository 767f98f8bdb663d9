use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lifecycle position of a cancel/resume job.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Dispatched,
    OutreachSent,
    Snoozed,
    Active,
    AwaitingOtp,
    CompletedPaid,
    CompletedEventual,
    CompletedReneged,
    UserSkip,
    UserAbandon,
    ImpliedSkip,
    Failed,
}

impl JobStatus {
    pub const ALL: [Self; 13] = [
        Self::Pending,
        Self::Dispatched,
        Self::OutreachSent,
        Self::Snoozed,
        Self::Active,
        Self::AwaitingOtp,
        Self::CompletedPaid,
        Self::CompletedEventual,
        Self::CompletedReneged,
        Self::UserSkip,
        Self::UserAbandon,
        Self::ImpliedSkip,
        Self::Failed,
    ];

    pub(crate) fn as_db(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::OutreachSent => "outreach_sent",
            Self::Snoozed => "snoozed",
            Self::Active => "active",
            Self::AwaitingOtp => "awaiting_otp",
            Self::CompletedPaid => "completed_paid",
            Self::CompletedEventual => "completed_eventual",
            Self::CompletedReneged => "completed_reneged",
            Self::UserSkip => "user_skip",
            Self::UserAbandon => "user_abandon",
            Self::ImpliedSkip => "implied_skip",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::CompletedPaid
                | Self::CompletedEventual
                | Self::CompletedReneged
                | Self::UserSkip
                | Self::UserAbandon
                | Self::ImpliedSkip
                | Self::Failed
        )
    }

    /// Payment has been confirmed; settlement must not run again.
    pub fn is_paid(self) -> bool {
        matches!(self, Self::CompletedPaid | Self::CompletedEventual)
    }

    /// Statuses reachable in one step through the normal lifecycle.
    ///
    /// `completed_reneged -> completed_eventual` is the only edge out of a
    /// terminal status; it belongs to the settlement engine.
    pub fn successors(self) -> &'static [Self] {
        match self {
            Self::Pending => &[
                Self::Dispatched,
                Self::UserSkip,
                Self::ImpliedSkip,
                Self::Failed,
            ],
            Self::Dispatched => &[
                Self::OutreachSent,
                Self::Active,
                Self::CompletedPaid,
                Self::CompletedReneged,
                Self::UserAbandon,
                Self::Failed,
            ],
            Self::OutreachSent => &[
                Self::Active,
                Self::AwaitingOtp,
                Self::Snoozed,
                Self::UserSkip,
                Self::ImpliedSkip,
                Self::UserAbandon,
                Self::Failed,
            ],
            Self::Snoozed => &[
                Self::OutreachSent,
                Self::UserSkip,
                Self::ImpliedSkip,
                Self::Failed,
            ],
            Self::Active => &[
                Self::AwaitingOtp,
                Self::CompletedPaid,
                Self::CompletedReneged,
                Self::UserAbandon,
                Self::Failed,
            ],
            Self::AwaitingOtp => &[Self::Active, Self::UserAbandon, Self::Failed],
            Self::CompletedReneged => &[Self::CompletedEventual],
            Self::CompletedPaid
            | Self::CompletedEventual
            | Self::UserSkip
            | Self::UserAbandon
            | Self::ImpliedSkip
            | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Statuses the agent may report through its callback.
    pub fn is_agent_reportable(self) -> bool {
        matches!(
            self,
            Self::Active | Self::AwaitingOtp | Self::OutreachSent | Self::Snoozed | Self::Failed
        )
    }

    /// Statuses only the settlement engine may write, because reaching them
    /// carries ledger, debt and blocklist writes.
    pub fn is_settlement_owned(self) -> bool {
        matches!(
            self,
            Self::CompletedPaid | Self::CompletedEventual | Self::CompletedReneged
        )
    }

    /// Operator override: any graph edge, or a jump to a terminal status,
    /// except into a settlement-owned status.
    pub fn can_force_to(self, next: Self) -> bool {
        self != next
            && !next.is_settlement_owned()
            && (self.can_transition_to(next) || next.is_terminal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobAction {
    Cancel,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    OnDemand,
    Outreach,
}

/// Who moved a job, recorded in the status history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Actor {
    Scheduler,
    Agent,
    Settlement,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: String,
    pub user_id: String,
    pub service_id: String,
    pub action: JobAction,
    pub trigger: TriggerSource,
    pub status: JobStatus,
    pub status_updated_at: DateTime<Utc>,
    pub billing_date: Option<NaiveDate>,
    pub access_end_date: Option<NaiveDate>,
    pub outreach_count: u32,
    pub next_outreach_at: Option<DateTime<Utc>>,
    pub amount_sats: Option<i64>,
    pub invoice_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub user_id: String,
    pub service_id: String,
    pub action: JobAction,
    pub trigger: TriggerSource,
    #[serde(default)]
    pub billing_date: Option<NaiveDate>,
}

/// Status callback body sent by the agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentReport {
    pub status: JobStatus,
    #[serde(default)]
    pub next_outreach_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub billing_date: Option<NaiveDate>,
    /// Free-text detail, kept in the status history.
    #[serde(default)]
    pub note: Option<String>,
}

/// One row of a job's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub from_status: Option<JobStatus>,
    pub to_status: JobStatus,
    pub actor: Actor,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}
