use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One notification thread as returned by the remote API
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub id: String,
    pub unread: bool,
    pub done: bool,
    pub reason: String,
    pub updated_at: DateTime<Utc>,
    pub subject: Option<Subject>,
}

#[derive(Debug, Clone)]
pub enum Subject {
    PullRequest(Box<PullRequestSubject>),
    /// Issues, releases, discussions, ... carried by typename only
    Other(String),
}

#[derive(Debug, Clone, Default)]
pub struct PullRequestSubject {
    pub id: String,
    pub number: u64,
    pub title: String,
    pub url: String,
    pub branch: Option<String>,
    pub draft: bool,
    pub merged: bool,
    pub closed: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub repository: String,
    pub review_requests: Vec<Reviewer>,
    pub status_check: Option<StatusCheckState>,
    pub latest_reviews: Vec<Review>,
    pub review_threads: Vec<ReviewThread>,
}

/// Who a review was requested from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reviewer {
    User(String),
    Team(String),
}

#[derive(Debug, Clone)]
pub struct Review {
    pub author: Option<String>,
    pub state: ReviewState,
    pub on_behalf_of: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    Pending,
    Unknown,
}

impl ReviewState {
    pub fn from_api_str(s: &str) -> Self {
        match s {
            "APPROVED" => ReviewState::Approved,
            "CHANGES_REQUESTED" => ReviewState::ChangesRequested,
            "COMMENTED" => ReviewState::Commented,
            "DISMISSED" => ReviewState::Dismissed,
            "PENDING" => ReviewState::Pending,
            _ => ReviewState::Unknown,
        }
    }

    /// Approve, request-changes and comment count as a submitted review
    pub fn is_submitted(&self) -> bool {
        matches!(
            self,
            ReviewState::Approved | ReviewState::ChangesRequested | ReviewState::Commented
        )
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewState::Approved => write!(f, "approved"),
            ReviewState::ChangesRequested => write!(f, "requested changes"),
            ReviewState::Commented => write!(f, "commented"),
            ReviewState::Dismissed => write!(f, "dismissed"),
            ReviewState::Pending => write!(f, "pending"),
            ReviewState::Unknown => write!(f, "reviewed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewThread {
    pub comments: Vec<ThreadComment>,
}

#[derive(Debug, Clone)]
pub struct ThreadComment {
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Author of the comment this one replies to
    pub reply_to: Option<String>,
}

/// Status check rollup for the PR head commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCheckState {
    Success,
    Pending,
    Failure,
}

impl StatusCheckState {
    pub fn from_api_str(s: &str) -> Self {
        match s {
            "SUCCESS" => StatusCheckState::Success,
            "FAILURE" | "ERROR" => StatusCheckState::Failure,
            _ => StatusCheckState::Pending,
        }
    }
}

impl fmt::Display for StatusCheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCheckState::Success => write!(f, "✓"),
            StatusCheckState::Failure => write!(f, "✗"),
            StatusCheckState::Pending => write!(f, "○"),
        }
    }
}

/// The authenticated user and the team slugs they belong to
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub login: String,
    pub teams: HashSet<String>,
}

impl ViewerContext {
    pub fn new(login: impl Into<String>, teams: impl IntoIterator<Item = String>) -> Self {
        Self {
            login: login.into(),
            teams: teams.into_iter().collect(),
        }
    }

    pub fn is_viewer(&self, login: Option<&str>) -> bool {
        login == Some(self.login.as_str())
    }
}

/// Classified reason for a notification. Exactly one per notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    // Derived by the classifier
    NeedsReview,
    Replied,
    Reviewed,
    TeamReviewed,
    Merged,
    Closed,
    Draft,

    // Upstream notification reasons
    ApprovalRequested,
    Assign,
    Author,
    CiActivity,
    Comment,
    Invitation,
    Manual,
    MemberFeatureRequested,
    Mention,
    ReadyForReview,
    ReviewRequested,
    SecurityAdvisoryCredit,
    SecurityAlert,
    StateChange,
    Subscribed,
    TeamMention,

    /// Any upstream reason this build does not know about
    Other,
}

impl Reason {
    /// Base reason from the raw upstream string (case-insensitive)
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "approval_requested" => Reason::ApprovalRequested,
            "assign" => Reason::Assign,
            "author" => Reason::Author,
            "ci_activity" => Reason::CiActivity,
            "comment" => Reason::Comment,
            "invitation" => Reason::Invitation,
            "manual" => Reason::Manual,
            "member_feature_requested" => Reason::MemberFeatureRequested,
            "mention" => Reason::Mention,
            "ready_for_review" => Reason::ReadyForReview,
            "review_requested" => Reason::ReviewRequested,
            "security_advisory_credit" => Reason::SecurityAdvisoryCredit,
            "security_alert" => Reason::SecurityAlert,
            "state_change" => Reason::StateChange,
            "subscribed" => Reason::Subscribed,
            "team_mention" => Reason::TeamMention,
            _ => Reason::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::NeedsReview => "needs_review",
            Reason::Replied => "replied",
            Reason::Reviewed => "reviewed",
            Reason::TeamReviewed => "team_reviewed",
            Reason::Merged => "merged",
            Reason::Closed => "closed",
            Reason::Draft => "draft",
            Reason::ApprovalRequested => "approval_requested",
            Reason::Assign => "assign",
            Reason::Author => "author",
            Reason::CiActivity => "ci_activity",
            Reason::Comment => "comment",
            Reason::Invitation => "invitation",
            Reason::Manual => "manual",
            Reason::MemberFeatureRequested => "member_feature_requested",
            Reason::Mention => "mention",
            Reason::ReadyForReview => "ready_for_review",
            Reason::ReviewRequested => "review_requested",
            Reason::SecurityAdvisoryCredit => "security_advisory_credit",
            Reason::SecurityAlert => "security_alert",
            Reason::StateChange => "state_change",
            Reason::Subscribed => "subscribed",
            Reason::TeamMention => "team_mention",
            Reason::Other => "other",
        }
    }

    /// Name of the tab this reason is listed under
    pub fn tab_name(&self) -> &'static str {
        match self {
            Reason::NeedsReview => "needs your review",
            Reason::Replied => "replied to you",
            Reason::Reviewed => "already reviewed",
            Reason::TeamReviewed => "team reviewed",
            Reason::ReviewRequested | Reason::Other => "other",
            Reason::Closed => "merged",
            other => other.as_str(),
        }
    }

    /// Reasons that own a dedicated tab; rows of any other reason show their reason label
    pub fn has_dedicated_tab(&self) -> bool {
        matches!(
            self,
            Reason::NeedsReview
                | Reason::Replied
                | Reason::Reviewed
                | Reason::TeamReviewed
                | Reason::Mention
                | Reason::Comment
                | Reason::Merged
                | Reason::Draft
                | Reason::Closed
        )
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A teammate's review submitted on behalf of one of the viewer's teams
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamReview {
    pub reviewer: String,
    pub team: String,
    pub state: ReviewState,
}

/// A classified pull request notification, ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotification {
    /// Notification thread id, target of read/unread/done
    pub id: String,
    /// Pull request node id, target of unsubscribe/approve
    pub subject_id: String,
    pub repo: String,
    pub title: String,
    pub number: u64,
    pub branch: Option<String>,
    pub author: Option<String>,
    pub url: String,
    pub unread: bool,
    pub updated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reason: Reason,
    pub review_requested_from: Option<String>,
    pub status_check: Option<StatusCheckState>,
    pub is_closed: bool,
    pub team_reviewed_by: Option<TeamReview>,
    pub replied_by: Option<String>,
}

impl ParsedNotification {
    pub fn tab_name(&self) -> &'static str {
        self.reason.tab_name()
    }
}
