use async_trait::async_trait;
use chrono::{DateTime, Utc};
use octocrab::Octocrab;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use crate::batch::MutationKind;
use crate::error::{InboxError, Result};
use crate::source::NotificationSource;
use crate::types::{
    PullRequestSubject, RawNotification, Review, ReviewState, ReviewThread, Reviewer,
    StatusCheckState, Subject, ThreadComment, ViewerContext,
};

const VIEWER_QUERY: &str = "query { viewer { login } }";

const NOTIFICATIONS_QUERY: &str = r#"
query($login: String!) {
  viewer {
    login
    organizations(first: 20) {
      nodes {
        teams(first: 50, userLogins: [$login]) {
          nodes { slug }
        }
      }
    }
    notificationThreads(first: 100, filterBy: { statuses: [READ, UNREAD] }) {
      nodes {
        id
        isUnread
        isDone
        reason
        lastUpdatedAt
        optionalSubject {
          __typename
          ... on PullRequest {
            id
            number
            title
            url
            headRefName
            isDraft
            merged
            closed
            createdAt
            author { login }
            repository { nameWithOwner }
            reviewRequests(first: 20) {
              nodes {
                requestedReviewer {
                  ... on User { login }
                  ... on Team { slug }
                }
              }
            }
            statusCheckRollup { state }
            latestReviews(first: 20) {
              nodes {
                author { login }
                state
                onBehalfOf(first: 5) { nodes { slug } }
              }
            }
            reviewThreads(last: 10) {
              nodes {
                comments(last: 5) {
                  nodes {
                    author { login }
                    createdAt
                    replyTo { author { login } }
                  }
                }
              }
            }
          }
        }
      }
    }
  }
}
"#;

const APPROVE_MUTATION: &str = "mutation($prId: ID!) { \
    addPullRequestReview(input: { pullRequestId: $prId, event: APPROVE }) { clientMutationId } }";

fn batch_mutation(kind: MutationKind) -> String {
    format!(
        "mutation($ids: [ID!]!) {{ {}(input: {{ ids: $ids }}) {{ success }} }}",
        kind.mutation_name()
    )
}

// GraphQL wire format. Every field is optional or defaulted so that partial
// responses degrade instead of failing the whole fetch.

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Nodes<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
}

impl<T> Default for Nodes<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> Nodes<T> {
    fn into_items(self) -> impl Iterator<Item = T> {
        self.nodes.into_iter().flatten()
    }
}

#[derive(Debug, Deserialize)]
struct Actor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ViewerLogin {
    viewer: Actor,
}

#[derive(Debug, Deserialize)]
struct InboxData {
    viewer: WireViewer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireViewer {
    login: String,
    #[serde(default)]
    organizations: Nodes<WireOrg>,
    #[serde(default)]
    notification_threads: Nodes<WireThread>,
}

#[derive(Debug, Deserialize)]
struct WireOrg {
    #[serde(default)]
    teams: Nodes<Slug>,
}

#[derive(Debug, Deserialize)]
struct Slug {
    slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireThread {
    id: String,
    #[serde(default)]
    is_unread: bool,
    #[serde(default)]
    is_done: bool,
    reason: Option<String>,
    last_updated_at: Option<String>,
    optional_subject: Option<WireSubject>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSubject {
    #[serde(rename = "__typename")]
    typename: String,
    id: Option<String>,
    number: Option<u64>,
    title: Option<String>,
    url: Option<String>,
    head_ref_name: Option<String>,
    is_draft: Option<bool>,
    merged: Option<bool>,
    closed: Option<bool>,
    created_at: Option<String>,
    author: Option<Actor>,
    repository: Option<WireRepository>,
    review_requests: Option<Nodes<WireReviewRequest>>,
    status_check_rollup: Option<WireRollup>,
    latest_reviews: Option<Nodes<WireReview>>,
    review_threads: Option<Nodes<WireReviewThread>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRepository {
    name_with_owner: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReviewRequest {
    requested_reviewer: Option<WireReviewer>,
}

#[derive(Debug, Deserialize)]
struct WireReviewer {
    login: Option<String>,
    slug: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRollup {
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReview {
    author: Option<Actor>,
    state: Option<String>,
    #[serde(default)]
    on_behalf_of: Nodes<Slug>,
}

#[derive(Debug, Deserialize)]
struct WireReviewThread {
    #[serde(default)]
    comments: Nodes<WireComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireComment {
    author: Option<Actor>,
    created_at: Option<String>,
    reply_to: Option<WireReplyTo>,
}

#[derive(Debug, Deserialize)]
struct WireReplyTo {
    author: Option<Actor>,
}

/// RFC 3339, or the epoch when absent or malformed
fn parse_time(s: Option<&str>) -> DateTime<Utc> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

fn login(actor: Option<Actor>) -> Option<String> {
    actor.map(|a| a.login)
}

impl WireSubject {
    fn into_subject(self) -> Subject {
        if self.typename != "PullRequest" {
            return Subject::Other(self.typename);
        }

        let review_requests = self
            .review_requests
            .unwrap_or_default()
            .into_items()
            .filter_map(|r| {
                let reviewer = r.requested_reviewer?;
                match (reviewer.slug, reviewer.login) {
                    (Some(slug), _) => Some(Reviewer::Team(slug)),
                    (None, Some(login)) => Some(Reviewer::User(login)),
                    (None, None) => None,
                }
            })
            .collect();

        let latest_reviews = self
            .latest_reviews
            .unwrap_or_default()
            .into_items()
            .map(|r| Review {
                author: login(r.author),
                state: r
                    .state
                    .as_deref()
                    .map_or(ReviewState::Unknown, ReviewState::from_api_str),
                on_behalf_of: r.on_behalf_of.into_items().map(|t| t.slug).collect(),
            })
            .collect();

        let review_threads = self
            .review_threads
            .unwrap_or_default()
            .into_items()
            .map(|t| ReviewThread {
                comments: t
                    .comments
                    .into_items()
                    .map(|c| ThreadComment {
                        author: login(c.author),
                        created_at: parse_time(c.created_at.as_deref()),
                        reply_to: c.reply_to.and_then(|r| login(r.author)),
                    })
                    .collect(),
            })
            .collect();

        Subject::PullRequest(Box::new(PullRequestSubject {
            id: self.id.unwrap_or_default(),
            number: self.number.unwrap_or(0),
            title: self.title.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            branch: self.head_ref_name,
            draft: self.is_draft.unwrap_or(false),
            merged: self.merged.unwrap_or(false),
            closed: self.closed.unwrap_or(false),
            created_at: self.created_at.as_deref().map(|s| parse_time(Some(s))),
            author: login(self.author),
            repository: self
                .repository
                .map(|r| r.name_with_owner)
                .unwrap_or_default(),
            review_requests,
            status_check: self
                .status_check_rollup
                .and_then(|r| r.state)
                .map(|s| StatusCheckState::from_api_str(&s)),
            latest_reviews,
            review_threads,
        }))
    }
}

impl WireThread {
    fn into_raw(self) -> RawNotification {
        RawNotification {
            id: self.id,
            unread: self.is_unread,
            done: self.is_done,
            reason: self.reason.unwrap_or_default(),
            updated_at: parse_time(self.last_updated_at.as_deref()),
            subject: self.optional_subject.map(WireSubject::into_subject),
        }
    }
}

impl WireViewer {
    fn into_parts(self) -> (Vec<RawNotification>, ViewerContext) {
        let teams = self
            .organizations
            .into_items()
            .flat_map(|org| org.teams.into_items().map(|t| t.slug));
        let viewer = ViewerContext::new(self.login, teams);
        let notifications = self
            .notification_threads
            .into_items()
            .map(WireThread::into_raw)
            .collect();
        (notifications, viewer)
    }
}

impl From<octocrab::Error> for InboxError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                if source.status_code.as_u16() == 401 {
                    InboxError::AuthRequired
                } else if source.message.to_lowercase().contains("scope") {
                    InboxError::MissingScope("notifications".to_string())
                } else {
                    InboxError::RemoteProtocol(source.message.clone())
                }
            }
            _ => InboxError::RemoteProtocol(err.to_string()),
        }
    }
}

/// Unwrap a GraphQL envelope. A non-empty `errors` array fails the call even
/// when partial data came back.
fn into_data<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    let response: GraphQlResponse<T> = serde_json::from_value(value)
        .map_err(|e| InboxError::RemoteProtocol(format!("unexpected response: {}", e)))?;
    if !response.errors.is_empty() {
        let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
        return Err(InboxError::RemoteProtocol(messages.join(", ")));
    }
    response
        .data
        .ok_or_else(|| InboxError::RemoteProtocol("response carried no data".to_string()))
}

pub struct GitHub {
    client: Octocrab,
}

impl std::fmt::Debug for GitHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHub").finish_non_exhaustive()
    }
}

impl GitHub {
    pub fn new(token: String, api_url: &str) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(token)
            .base_uri(api_url)
            .map_err(|e| InboxError::Unknown(format!("invalid API url {}: {}", api_url, e)))?
            .build()
            .map_err(|e| InboxError::Unknown(e.to_string()))?;

        Ok(Self { client })
    }

    async fn graphql<T: DeserializeOwned>(&self, payload: serde_json::Value) -> Result<T> {
        let value: serde_json::Value = self.client.graphql(&payload).await?;
        into_data(value)
    }
}

#[async_trait]
impl NotificationSource for GitHub {
    async fn fetch(&self) -> Result<(Vec<RawNotification>, ViewerContext)> {
        let login: ViewerLogin = self.graphql(json!({ "query": VIEWER_QUERY })).await?;
        let data: InboxData = self
            .graphql(json!({
                "query": NOTIFICATIONS_QUERY,
                "variables": { "login": login.viewer.login },
            }))
            .await?;
        Ok(data.viewer.into_parts())
    }

    async fn mutate(&self, kind: MutationKind, ids: &[String]) -> Result<()> {
        let _: serde_json::Value = self
            .graphql(json!({
                "query": batch_mutation(kind),
                "variables": { "ids": ids },
            }))
            .await?;
        Ok(())
    }

    async fn approve(&self, subject_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .graphql(json!({
                "query": APPROVE_MUTATION,
                "variables": { "prId": subject_id },
            }))
            .await?;
        Ok(())
    }
}
