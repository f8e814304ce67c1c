//! Turns raw notification threads into classified pull request notifications.
//!
//! The reason is computed as a last-write-wins reduction over [`RULES`]: each
//! rule that holds overwrites the reason produced by the rules before it, so
//! the table order is the priority order (lowest first).

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::seen::{SeenEntry, SeenStore};
use crate::types::{
    ParsedNotification, PullRequestSubject, RawNotification, Reason, ReviewState, Reviewer,
    Subject, TeamReview, ViewerContext,
};

pub const UNSUBSCRIBED_PREFIX: &str = "[unsubscribed]";
pub const APPROVED_PREFIX: &str = "[approved]";

/// `[sc-123]`, `[ABC 42]`, `[jira123]` ...
static TICKET_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*\[[a-z]+[- ]?\d+\]\s*").expect("valid ticket regex"));

/// Everything the rules look at, computed once per notification
#[derive(Debug, Default)]
struct Facts {
    draft: bool,
    viewer_reviewed: bool,
    viewer_approved: bool,
    merged: bool,
    closed_unmerged: bool,
    team_reviewed_by: Option<TeamReview>,
    new_reply_by: Option<String>,
    review_requested_from: Option<String>,
}

struct Rule {
    reason: Reason,
    applies: fn(&Facts) -> bool,
}

const RULES: [Rule; 7] = [
    Rule {
        reason: Reason::Draft,
        applies: |f| f.draft,
    },
    Rule {
        reason: Reason::Reviewed,
        applies: |f| f.viewer_reviewed,
    },
    Rule {
        reason: Reason::Merged,
        applies: |f| f.merged,
    },
    Rule {
        reason: Reason::TeamReviewed,
        applies: |f| f.team_reviewed_by.is_some(),
    },
    Rule {
        reason: Reason::Closed,
        applies: |f| f.closed_unmerged,
    },
    Rule {
        reason: Reason::Replied,
        applies: |f| f.new_reply_by.is_some(),
    },
    // Masks replied/team_reviewed while the viewer still owes a review
    Rule {
        reason: Reason::NeedsReview,
        applies: |f| f.review_requested_from.is_some() && !f.viewer_approved,
    },
];

fn reduce_reason(base: Reason, facts: &Facts) -> Reason {
    RULES.iter().fold(base, |reason, rule| {
        if (rule.applies)(facts) {
            rule.reason
        } else {
            reason
        }
    })
}

/// Classify a whole fetch. Done threads and non-PR subjects are dropped.
pub fn classify_all(
    raw: &[RawNotification],
    viewer: &ViewerContext,
    seen: &SeenStore,
) -> Vec<ParsedNotification> {
    raw.iter()
        .filter_map(|n| classify(n, viewer, seen.get(&n.id)))
        .collect()
}

/// Classify one notification thread. Never fails; missing fields degrade to defaults.
pub fn classify(
    raw: &RawNotification,
    viewer: &ViewerContext,
    seen: Option<&SeenEntry>,
) -> Option<ParsedNotification> {
    if raw.done {
        return None;
    }
    let pr = match &raw.subject {
        Some(Subject::PullRequest(pr)) => pr,
        Some(Subject::Other(typename)) => {
            tracing::debug!(id = %raw.id, %typename, "skipping non-PR notification");
            return None;
        }
        None => return None,
    };

    let reply = latest_reply_to_viewer(pr, viewer);
    let last_done = seen.and_then(SeenEntry::last_done);
    // Equal timestamps count as already triaged
    let new_reply_by = reply
        .filter(|(_, at)| last_done.map_or(true, |done| *at > done))
        .map(|(by, _)| by);

    let facts = Facts {
        draft: pr.draft,
        viewer_reviewed: pr
            .latest_reviews
            .iter()
            .any(|r| viewer.is_viewer(r.author.as_deref()) && r.state.is_submitted()),
        viewer_approved: pr
            .latest_reviews
            .iter()
            .any(|r| viewer.is_viewer(r.author.as_deref()) && r.state == ReviewState::Approved),
        merged: pr.merged,
        closed_unmerged: pr.closed && !pr.merged,
        team_reviewed_by: team_reviewed_by(pr, viewer),
        new_reply_by,
        review_requested_from: review_requested_from(pr, viewer),
    };

    let reason = reduce_reason(Reason::from_raw(&raw.reason), &facts);

    let mut title = clean_title(&pr.title);
    if seen.is_some_and(SeenEntry::is_unsubscribed) {
        title = format!("{} {}", UNSUBSCRIBED_PREFIX, title);
    }

    Some(ParsedNotification {
        id: raw.id.clone(),
        subject_id: pr.id.clone(),
        repo: pr.repository.clone(),
        title,
        number: pr.number,
        branch: pr.branch.clone(),
        author: pr.author.clone(),
        url: pr.url.clone(),
        unread: raw.unread,
        updated_at: raw.updated_at,
        created_at: pr.created_at.unwrap_or(raw.updated_at),
        reason,
        review_requested_from: facts.review_requested_from,
        status_check: pr.status_check,
        is_closed: facts.closed_unmerged,
        team_reviewed_by: facts.team_reviewed_by,
        replied_by: facts.new_reply_by,
    })
}

/// Strip a leading ticket tag and any leading separators.
pub fn clean_title(title: &str) -> String {
    let without_tag = TICKET_TAG.replace(title, "");
    without_tag
        .trim_start_matches(|c: char| c.is_whitespace() || c == '-' || c == ':')
        .trim()
        .to_string()
}

/// Team slug if one of the viewer's teams is requested, otherwise the viewer's
/// login if requested directly. Teams win regardless of request order.
fn review_requested_from(pr: &PullRequestSubject, viewer: &ViewerContext) -> Option<String> {
    let mut user_match = None;
    for reviewer in &pr.review_requests {
        match reviewer {
            Reviewer::Team(slug) if viewer.teams.contains(slug) => return Some(slug.clone()),
            Reviewer::User(login) if *login == viewer.login => user_match = Some(login.clone()),
            _ => {}
        }
    }
    user_match
}

/// First review by someone else on behalf of one of the viewer's teams
fn team_reviewed_by(pr: &PullRequestSubject, viewer: &ViewerContext) -> Option<TeamReview> {
    pr.latest_reviews
        .iter()
        .filter(|r| !viewer.is_viewer(r.author.as_deref()))
        .find_map(|review| {
            let team = review
                .on_behalf_of
                .iter()
                .find(|slug| viewer.teams.contains(*slug))?;
            Some(TeamReview {
                reviewer: review
                    .author
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                team: team.clone(),
                state: review.state,
            })
        })
}

/// Latest comment by someone else that replies to the viewer
fn latest_reply_to_viewer(
    pr: &PullRequestSubject,
    viewer: &ViewerContext,
) -> Option<(String, DateTime<Utc>)> {
    let mut latest: Option<(String, DateTime<Utc>)> = None;
    let replies = pr
        .review_threads
        .iter()
        .flat_map(|thread| &thread.comments)
        .filter(|c| viewer.is_viewer(c.reply_to.as_deref()) && !viewer.is_viewer(c.author.as_deref()));

    for comment in replies {
        if latest.as_ref().map_or(true, |(_, at)| comment.created_at > *at) {
            latest = Some((
                comment
                    .author
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
                comment.created_at,
            ));
        }
    }
    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Review, ReviewThread, ThreadComment};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn viewer() -> ViewerContext {
        ViewerContext::new("me", ["backend".to_string(), "infra".to_string()])
    }

    fn pr() -> PullRequestSubject {
        PullRequestSubject {
            id: "PR_1".into(),
            number: 7,
            title: "Add caching".into(),
            url: "https://github.com/acme/api/pull/7".into(),
            repository: "acme/api".into(),
            ..Default::default()
        }
    }

    fn raw(reason: &str, subject: PullRequestSubject) -> RawNotification {
        RawNotification {
            id: "NT_1".into(),
            unread: true,
            done: false,
            reason: reason.into(),
            updated_at: at(1_000),
            subject: Some(Subject::PullRequest(Box::new(subject))),
        }
    }

    fn review(author: &str, state: ReviewState, teams: &[&str]) -> Review {
        Review {
            author: Some(author.into()),
            state,
            on_behalf_of: teams.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn reply(author: &str, to: &str, secs: i64) -> ReviewThread {
        ReviewThread {
            comments: vec![
                ThreadComment {
                    author: Some(to.into()),
                    created_at: at(secs - 10),
                    reply_to: None,
                },
                ThreadComment {
                    author: Some(author.into()),
                    created_at: at(secs),
                    reply_to: Some(to.into()),
                },
            ],
        }
    }

    fn reason_of(n: &RawNotification, seen: Option<&SeenEntry>) -> Reason {
        classify(n, &viewer(), seen).unwrap().reason
    }

    #[test]
    fn plain_mention_keeps_base_reason() {
        let n = classify(&raw("MENTION", pr()), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::Mention);
        assert_eq!(n.review_requested_from, None);
        assert_eq!(n.replied_by, None);
        assert_eq!(n.team_reviewed_by, None);
        assert!(!n.is_closed);
    }

    #[test]
    fn done_and_non_pr_notifications_are_dropped() {
        let mut done = raw("mention", pr());
        done.done = true;
        assert!(classify(&done, &viewer(), None).is_none());

        let mut issue = raw("mention", pr());
        issue.subject = Some(Subject::Other("Issue".into()));
        assert!(classify(&issue, &viewer(), None).is_none());

        let mut bare = raw("mention", pr());
        bare.subject = None;
        assert!(classify(&bare, &viewer(), None).is_none());
    }

    #[test]
    fn team_review_request_needs_review() {
        let mut subject = pr();
        subject.review_requests = vec![Reviewer::Team("backend".into())];
        let n = classify(&raw("review_requested", subject), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::NeedsReview);
        assert_eq!(n.review_requested_from.as_deref(), Some("backend"));
    }

    #[test]
    fn team_request_wins_over_direct_request() {
        let mut subject = pr();
        subject.review_requests = vec![
            Reviewer::User("me".into()),
            Reviewer::Team("frontend".into()),
            Reviewer::Team("infra".into()),
        ];
        let n = classify(&raw("review_requested", subject), &viewer(), None).unwrap();
        assert_eq!(n.review_requested_from.as_deref(), Some("infra"));
    }

    #[test]
    fn requests_for_other_people_do_not_count() {
        let mut subject = pr();
        subject.review_requests = vec![
            Reviewer::User("someone".into()),
            Reviewer::Team("frontend".into()),
        ];
        assert_eq!(reason_of(&raw("subscribed", subject), None), Reason::Subscribed);
    }

    #[test]
    fn needs_review_masks_merged_and_team_reviewed() {
        let mut subject = pr();
        subject.merged = true;
        subject.closed = true;
        subject.review_requests = vec![Reviewer::User("me".into())];
        subject.latest_reviews = vec![review("alice", ReviewState::Approved, &["backend"])];
        let n = classify(&raw("review_requested", subject), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::NeedsReview);
        // Side data is still derived even though the reason was overwritten
        assert_eq!(n.team_reviewed_by.unwrap().reviewer, "alice");
    }

    #[test]
    fn approval_suppresses_needs_review() {
        let mut subject = pr();
        subject.review_requests = vec![Reviewer::Team("backend".into())];
        subject.latest_reviews = vec![review("me", ReviewState::Approved, &[])];
        assert_eq!(reason_of(&raw("review_requested", subject), None), Reason::Reviewed);
    }

    #[test]
    fn comment_review_does_not_suppress_needs_review() {
        let mut subject = pr();
        subject.review_requests = vec![Reviewer::User("me".into())];
        subject.latest_reviews = vec![review("me", ReviewState::Commented, &[])];
        assert_eq!(
            reason_of(&raw("review_requested", subject), None),
            Reason::NeedsReview
        );
    }

    #[test]
    fn overwrite_order_draft_reviewed_merged() {
        let mut subject = pr();
        subject.draft = true;
        assert_eq!(reason_of(&raw("author", subject.clone()), None), Reason::Draft);

        subject.latest_reviews = vec![review("me", ReviewState::ChangesRequested, &[])];
        assert_eq!(reason_of(&raw("author", subject.clone()), None), Reason::Reviewed);

        subject.merged = true;
        subject.closed = true;
        assert_eq!(reason_of(&raw("author", subject), None), Reason::Merged);
    }

    #[test]
    fn closed_without_merge_beats_team_review() {
        let mut subject = pr();
        subject.closed = true;
        subject.latest_reviews = vec![review("alice", ReviewState::Approved, &["backend"])];
        let n = classify(&raw("author", subject), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::Closed);
        assert!(n.is_closed);
        assert_eq!(n.tab_name(), "merged");
    }

    #[test]
    fn viewer_own_team_review_is_ignored() {
        let mut subject = pr();
        subject.latest_reviews = vec![review("me", ReviewState::Commented, &["backend"])];
        let n = classify(&raw("author", subject), &viewer(), None).unwrap();
        assert_eq!(n.team_reviewed_by, None);
        assert_eq!(n.reason, Reason::Reviewed);
    }

    #[test]
    fn first_matching_team_review_wins() {
        let mut subject = pr();
        subject.latest_reviews = vec![
            review("bob", ReviewState::Commented, &["frontend"]),
            review("alice", ReviewState::ChangesRequested, &["infra"]),
            review("carol", ReviewState::Approved, &["backend"]),
        ];
        let n = classify(&raw("author", subject), &viewer(), None).unwrap();
        assert_eq!(
            n.team_reviewed_by,
            Some(TeamReview {
                reviewer: "alice".into(),
                team: "infra".into(),
                state: ReviewState::ChangesRequested,
            })
        );
        assert_eq!(n.reason, Reason::TeamReviewed);
    }

    #[test]
    fn reply_to_viewer_is_replied() {
        let mut subject = pr();
        subject.merged = true;
        subject.review_threads = vec![reply("alice", "me", 500), reply("bob", "me", 800)];
        let n = classify(&raw("comment", subject), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::Replied);
        assert_eq!(n.replied_by.as_deref(), Some("bob"));
    }

    #[test]
    fn self_replies_and_replies_to_others_are_ignored() {
        let mut subject = pr();
        subject.review_threads = vec![reply("me", "me", 500), reply("alice", "bob", 600)];
        let n = classify(&raw("comment", subject), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::Comment);
        assert_eq!(n.replied_by, None);
    }

    #[test]
    fn reply_older_than_last_done_is_stale() {
        let mut subject = pr();
        subject.review_threads = vec![reply("alice", "me", 500)];
        let n = raw("comment", subject);

        let mut seen = SeenStore::in_memory();
        seen.record_done("NT_1", at(600));
        let parsed = classify(&n, &viewer(), seen.get("NT_1")).unwrap();
        assert_eq!(parsed.reason, Reason::Comment);
        assert_eq!(parsed.replied_by, None);

        seen.record_done("NT_1", at(400));
        // History order does not matter, the latest stamp is used
        assert_eq!(reason_of(&n, seen.get("NT_1")), Reason::Comment);
    }

    #[test]
    fn reply_at_same_instant_as_done_is_stale() {
        let mut subject = pr();
        subject.review_threads = vec![reply("alice", "me", 500)];
        let mut seen = SeenStore::in_memory();
        seen.record_done("NT_1", at(500));
        assert_eq!(reason_of(&raw("comment", subject), seen.get("NT_1")), Reason::Comment);
    }

    #[test]
    fn reply_newer_than_done_resurfaces() {
        let mut subject = pr();
        subject.review_threads = vec![reply("alice", "me", 900)];
        let mut seen = SeenStore::in_memory();
        seen.record_done("NT_1", at(600));
        let n = classify(&raw("comment", subject), &viewer(), seen.get("NT_1")).unwrap();
        assert_eq!(n.reason, Reason::Replied);
        assert_eq!(n.replied_by.as_deref(), Some("alice"));
    }

    #[test]
    fn unsubscribed_entry_prefixes_title() {
        let mut subject = pr();
        subject.title = "[SC-123] - Add caching".into();
        let mut seen = SeenStore::in_memory();
        seen.record_unsubscribed("NT_1", at(1));
        let n = classify(&raw("mention", subject), &viewer(), seen.get("NT_1")).unwrap();
        assert_eq!(n.title, "[unsubscribed] Add caching");
    }

    #[test]
    fn unknown_reason_lands_in_other() {
        let n = classify(&raw("brand_new_reason", pr()), &viewer(), None).unwrap();
        assert_eq!(n.reason, Reason::Other);
        assert_eq!(n.tab_name(), "other");
    }

    #[test]
    fn missing_created_at_falls_back_to_updated_at() {
        let n = classify(&raw("mention", pr()), &viewer(), None).unwrap();
        assert_eq!(n.created_at, at(1_000));
        assert_eq!(n.subject_id, "PR_1");
        assert_eq!(n.id, "NT_1");
    }

    #[test]
    fn clean_title_strips_ticket_tags() {
        assert_eq!(clean_title("[sc-123] Fix login"), "Fix login");
        assert_eq!(clean_title("[SC 42]: Fix login"), "Fix login");
        assert_eq!(clean_title("[abc123] - Fix login"), "Fix login");
        assert_eq!(clean_title(" - : Fix login  "), "Fix login");
        assert_eq!(clean_title("Fix [sc-1] login"), "Fix [sc-1] login");
        assert_eq!(clean_title("[WIP] Fix login"), "[WIP] Fix login");
        assert_eq!(clean_title(""), "");
    }

    #[test]
    fn classify_all_filters_and_keeps_order() {
        let mut done = raw("mention", pr());
        done.id = "NT_done".into();
        done.done = true;
        let mut second = raw("comment", pr());
        second.id = "NT_2".into();

        let parsed = classify_all(
            &[raw("mention", pr()), done, second],
            &viewer(),
            &SeenStore::in_memory(),
        );
        let ids: Vec<_> = parsed.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["NT_1", "NT_2"]);
    }
}
