use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::ParsedNotification;

pub const NEEDS_YOUR_REVIEW: &str = "needs your review";
pub const ALREADY_REVIEWED: &str = "already reviewed";
pub const MERGED: &str = "merged";

/// Tab order; names not listed sort after these, alphabetically
const TAB_ORDER: [&str; 9] = [
    NEEDS_YOUR_REVIEW,
    "replied to you",
    ALREADY_REVIEWED,
    "team reviewed",
    "mention",
    "comment",
    MERGED,
    "draft",
    "other",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tab {
    pub name: &'static str,
    pub count: usize,
}

fn tab_priority(name: &str) -> usize {
    TAB_ORDER
        .iter()
        .position(|t| *t == name)
        .unwrap_or(TAB_ORDER.len())
}

/// One tab per distinct display name, in display order.
pub fn derive_tabs(notifications: &[ParsedNotification]) -> Vec<Tab> {
    let mut counts: HashMap<&'static str, usize> = HashMap::new();
    for n in notifications {
        *counts.entry(n.tab_name()).or_insert(0) += 1;
    }

    let mut tabs: Vec<Tab> = counts
        .into_iter()
        .map(|(name, count)| Tab { name, count })
        .collect();
    tabs.sort_by(|a, b| {
        tab_priority(a.name)
            .cmp(&tab_priority(b.name))
            .then_with(|| a.name.cmp(b.name))
    });
    tabs
}

/// Tab at `index`, clamped to the last tab
pub fn selected_tab(tabs: &[Tab], index: usize) -> Option<&Tab> {
    tabs.get(index.min(tabs.len().checked_sub(1)?))
}

/// Notifications listed under `tab`, sorted for display.
///
/// Unread first, then a tab-specific key, then newest `updated_at` first.
/// The sort is stable so equal items keep their input order.
pub fn filter_for_tab<'a>(
    notifications: &'a [ParsedNotification],
    tab: &str,
) -> Vec<&'a ParsedNotification> {
    let mut filtered: Vec<&ParsedNotification> = notifications
        .iter()
        .filter(|n| n.tab_name() == tab)
        .collect();

    filtered.sort_by(|a, b| {
        b.unread
            .cmp(&a.unread)
            .then_with(|| tab_specific_order(tab, a, b))
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    filtered
}

fn tab_specific_order(tab: &str, a: &ParsedNotification, b: &ParsedNotification) -> Ordering {
    match tab {
        // The viewer's own reviews before teammates' reviews
        ALREADY_REVIEWED => a
            .team_reviewed_by
            .is_some()
            .cmp(&b.team_reviewed_by.is_some()),
        // Grouped by requested team/user; direct or unknown requests last
        NEEDS_YOUR_REVIEW => match (&a.review_requested_from, &b.review_requested_from) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        // Closed without merge before merged
        MERGED => b.is_closed.cmp(&a.is_closed),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Reason, ReviewState, TeamReview};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn item(id: &str, reason: Reason, unread: bool, updated: i64) -> ParsedNotification {
        ParsedNotification {
            id: id.into(),
            subject_id: format!("PR_{}", id),
            repo: "acme/api".into(),
            title: id.into(),
            number: 1,
            branch: None,
            author: None,
            url: String::new(),
            unread,
            updated_at: at(updated),
            created_at: at(updated),
            reason,
            review_requested_from: None,
            status_check: None,
            is_closed: reason == Reason::Closed,
            team_reviewed_by: None,
            replied_by: None,
        }
    }

    fn ids(list: &[&ParsedNotification]) -> Vec<String> {
        list.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn single_mention_makes_one_tab() {
        let tabs = derive_tabs(&[item("a", Reason::Mention, true, 1)]);
        assert_eq!(
            tabs,
            vec![Tab {
                name: "mention",
                count: 1
            }]
        );
    }

    #[test]
    fn tabs_follow_priority_then_alphabetical() {
        let list = vec![
            item("1", Reason::Subscribed, true, 1),
            item("2", Reason::Merged, true, 1),
            item("3", Reason::Author, true, 1),
            item("4", Reason::NeedsReview, true, 1),
            item("5", Reason::ReviewRequested, true, 1),
            item("6", Reason::Replied, true, 1),
            item("7", Reason::Closed, true, 1),
            item("8", Reason::Other, true, 1),
        ];
        let names: Vec<_> = derive_tabs(&list).iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "needs your review",
                "replied to you",
                "merged",
                "other",
                "author",
                "subscribed"
            ]
        );
    }

    #[test]
    fn tab_counts_conserve_notifications() {
        let reasons = [
            Reason::Closed,
            Reason::Merged,
            Reason::Mention,
            Reason::ReviewRequested,
            Reason::Other,
            Reason::Draft,
            Reason::TeamReviewed,
            Reason::Mention,
        ];
        let list: Vec<_> = reasons
            .iter()
            .enumerate()
            .map(|(i, r)| item(&i.to_string(), *r, i % 2 == 0, i as i64))
            .collect();

        let tabs = derive_tabs(&list);
        assert_eq!(tabs.iter().map(|t| t.count).sum::<usize>(), list.len());
        for tab in &tabs {
            assert_eq!(filter_for_tab(&list, tab.name).len(), tab.count);
        }
        let merged = tabs.iter().find(|t| t.name == "merged").unwrap();
        assert_eq!(merged.count, 2);
    }

    #[test]
    fn selected_tab_clamps() {
        let tabs = derive_tabs(&[
            item("a", Reason::Mention, true, 1),
            item("b", Reason::Comment, true, 1),
        ]);
        assert_eq!(selected_tab(&tabs, 9).unwrap().name, "comment");
        assert!(selected_tab(&[], 0).is_none());
    }

    #[test]
    fn unread_first_then_newest() {
        let list = vec![
            item("old-read", Reason::Mention, false, 10),
            item("new-read", Reason::Mention, false, 30),
            item("old-unread", Reason::Mention, true, 5),
            item("new-unread", Reason::Mention, true, 20),
        ];
        assert_eq!(
            ids(&filter_for_tab(&list, "mention")),
            vec!["new-unread", "old-unread", "new-read", "old-read"]
        );
    }

    #[test]
    fn merged_tab_lists_closed_before_merged() {
        let list = vec![
            item("merged-new", Reason::Merged, true, 50),
            item("closed-old", Reason::Closed, true, 10),
            item("merged-read", Reason::Merged, false, 99),
        ];
        assert_eq!(
            ids(&filter_for_tab(&list, "merged")),
            vec!["closed-old", "merged-new", "merged-read"]
        );
    }

    #[test]
    fn already_reviewed_lists_own_reviews_first() {
        let mut teammate = item("teammate", Reason::Reviewed, true, 50);
        teammate.team_reviewed_by = Some(TeamReview {
            reviewer: "alice".into(),
            team: "backend".into(),
            state: ReviewState::Approved,
        });
        let own = item("own", Reason::Reviewed, true, 10);
        let list = vec![teammate, own];
        assert_eq!(
            ids(&filter_for_tab(&list, "already reviewed")),
            vec!["own", "teammate"]
        );
    }

    #[test]
    fn needs_review_groups_by_requester() {
        let mut list = vec![
            item("none", Reason::NeedsReview, true, 90),
            item("infra", Reason::NeedsReview, true, 10),
            item("backend", Reason::NeedsReview, true, 5),
            item("read", Reason::NeedsReview, false, 99),
        ];
        list[0].review_requested_from = None;
        list[1].review_requested_from = Some("infra".into());
        list[2].review_requested_from = Some("backend".into());
        list[3].review_requested_from = Some("backend".into());
        assert_eq!(
            ids(&filter_for_tab(&list, "needs your review")),
            vec!["backend", "infra", "none", "read"]
        );
    }

    #[test]
    fn sort_is_stable_and_order_independent() {
        let base = vec![
            item("a", Reason::Mention, true, 10),
            item("b", Reason::Mention, false, 10),
            item("c", Reason::Mention, true, 30),
            item("d", Reason::Mention, true, 10),
        ];
        // a and d tie on every key and must keep input order
        assert_eq!(ids(&filter_for_tab(&base, "mention")), vec!["c", "a", "d", "b"]);

        let mut reversed = base.clone();
        reversed.reverse();
        assert_eq!(
            ids(&filter_for_tab(&reversed, "mention")),
            vec!["c", "d", "a", "b"]
        );
    }
}
