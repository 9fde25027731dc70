//! Direct Line channel: post activities, poll for the bot's answer.
//!
//! The conversation is started lazily on first use and reused afterwards. Each
//! exchange holds the conversation lock, so calls from one session never interleave
//! their watermarks.

use super::activity::{is_bot_activity, reply_from_activities, Activity, ChannelAccount};
use super::ConversationBackend;
use crate::config::ConversationConfig;
use crate::error::{ConversationError, ConversationResult};
use crate::message::{BackendReply, TokenExchange};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartConversationResponse {
    conversation_id: String,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostActivityResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivitySet {
    #[serde(default)]
    activities: Vec<Activity>,
    #[serde(default)]
    watermark: Option<String>,
}

/// Whether silence until the reply timeout is a failure.
///
/// A user message must be answered. A token exchange or card submit may be
/// acknowledged with only an invoke response, which leaves nothing to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReplyExpectation {
    Required,
    Optional,
}

#[derive(Debug)]
struct DirectLineConversation {
    id: String,
    token: String,
    watermark: Option<String>,
    seen: HashSet<String>,
}

/// `ConversationBackend` over the Direct Line 3.0 REST API.
pub struct DirectLineBackend {
    endpoint: String,
    secret: String,
    user: ChannelAccount,
    locale: String,
    poll_interval: Duration,
    reply_timeout: Duration,
    client: reqwest::Client,
    conversation: Mutex<Option<DirectLineConversation>>,
}

impl DirectLineBackend {
    /// Build from config. Fails when `DIRECT_LINE_SECRET` is not set.
    pub fn from_config(config: &ConversationConfig) -> ConversationResult<Self> {
        let secret = config.direct_line_secret.clone().ok_or_else(|| {
            ConversationError::Config("Direct Line requires DIRECT_LINE_SECRET".to_string())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ConversationError::Backend(e.to_string()))?;
        Ok(Self {
            endpoint: config.direct_line_endpoint.trim_end_matches('/').to_string(),
            secret,
            user: ChannelAccount {
                id: config.user_id.clone(),
                name: Some(config.user_name.clone()),
                role: Some("user".to_string()),
            },
            locale: config.locale.clone(),
            poll_interval: config.poll_interval(),
            reply_timeout: config.reply_timeout(),
            client,
            conversation: Mutex::new(None),
        })
    }

    /// Id of the active conversation, if one has been started.
    pub async fn conversation_id(&self) -> Option<String> {
        self.conversation.lock().await.as_ref().map(|c| c.id.clone())
    }

    async fn start_conversation(&self) -> ConversationResult<DirectLineConversation> {
        let url = format!("{}/v3/directline/conversations", self.endpoint);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.secret)
            .send()
            .await?;
        let res = check_status(res, "start conversation").await?;
        let started: StartConversationResponse = res.json().await?;
        info!("🔗 Direct Line: conversation {} started", started.conversation_id);
        Ok(DirectLineConversation {
            id: started.conversation_id,
            token: started.token.unwrap_or_else(|| self.secret.clone()),
            watermark: None,
            seen: HashSet::new(),
        })
    }

    /// Post `activity` and wait for the bot's classified reply.
    async fn exchange(
        &self,
        mut activity: Activity,
        expect: ReplyExpectation,
    ) -> ConversationResult<BackendReply> {
        let mut guard = self.conversation.lock().await;
        if guard.is_none() {
            *guard = Some(self.start_conversation().await?);
        }
        let conversation = guard
            .as_mut()
            .ok_or_else(|| ConversationError::Backend("conversation not started".to_string()))?;

        activity.locale = Some(self.locale.clone());
        let sent_id = self.post_activity(conversation, &activity).await?;
        debug!("Direct Line: posted {} activity {:?}", activity.kind, sent_id);

        let activities = self
            .await_reply(conversation, sent_id.as_deref(), expect)
            .await?;
        Ok(reply_from_activities(&activities, &self.user.id))
    }

    async fn post_activity(
        &self,
        conversation: &DirectLineConversation,
        activity: &Activity,
    ) -> ConversationResult<Option<String>> {
        let url = format!(
            "{}/v3/directline/conversations/{}/activities",
            self.endpoint, conversation.id
        );
        let res = self
            .client
            .post(&url)
            .bearer_auth(&conversation.token)
            .json(activity)
            .send()
            .await?;
        let res = check_status(res, "post activity").await?;
        let posted: PostActivityResponse = res.json().await?;
        Ok(posted.id)
    }

    async fn fetch_activities(
        &self,
        conversation: &mut DirectLineConversation,
    ) -> ConversationResult<Vec<Activity>> {
        let url = format!(
            "{}/v3/directline/conversations/{}/activities",
            self.endpoint, conversation.id
        );
        let mut req = self.client.get(&url).bearer_auth(&conversation.token);
        if let Some(ref watermark) = conversation.watermark {
            req = req.query(&[("watermark", watermark)]);
        }
        let res = check_status(req.send().await?, "poll activities").await?;
        let set: ActivitySet = res.json().await?;
        let batch_ids: HashSet<String> =
            set.activities.iter().filter_map(|a| a.id.clone()).collect();
        let fresh = set
            .activities
            .into_iter()
            .filter(|a| match a.id.as_ref() {
                Some(id) => conversation.seen.insert(id.clone()),
                None => true,
            })
            .collect();
        // Anything before the new watermark is never resent; only this batch can repeat.
        if set.watermark.is_some() && set.watermark != conversation.watermark {
            conversation.watermark = set.watermark;
            conversation.seen = batch_ids;
        }
        Ok(fresh)
    }

    /// Poll until bot messages answering `sent_id` arrive and one further poll
    /// brings nothing new, or until the reply timeout.
    async fn await_reply(
        &self,
        conversation: &mut DirectLineConversation,
        sent_id: Option<&str>,
        expect: ReplyExpectation,
    ) -> ConversationResult<Vec<Activity>> {
        let deadline = Instant::now() + self.reply_timeout;
        let mut collected: Vec<Activity> = Vec::new();
        loop {
            let fresh: Vec<Activity> = self
                .fetch_activities(conversation)
                .await?
                .into_iter()
                .filter(|a| a.is_message() && is_bot_activity(a, &self.user.id))
                .filter(|a| match (sent_id, a.reply_to_id.as_deref()) {
                    (Some(sent), Some(reply_to)) => sent == reply_to,
                    _ => true,
                })
                .collect();

            let got_new = !fresh.is_empty();
            collected.extend(fresh);
            if !collected.is_empty() && !got_new {
                return Ok(collected);
            }
            if Instant::now() >= deadline {
                if collected.is_empty() && expect == ReplyExpectation::Optional {
                    debug!("Direct Line: no bot message after consent step; empty reply");
                    return Ok(collected);
                }
                if collected.is_empty() {
                    return Err(ConversationError::Backend(format!(
                        "no bot reply within {:?}",
                        self.reply_timeout
                    )));
                }
                warn!("Direct Line: reply timeout reached, returning partial reply");
                return Ok(collected);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

async fn check_status(res: reqwest::Response, what: &str) -> ConversationResult<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(ConversationError::Backend(format!(
        "Direct Line {} failed {}: {}",
        what, status, body
    )))
}

#[async_trait]
impl ConversationBackend for DirectLineBackend {
    async fn send_message(&self, text: &str) -> ConversationResult<BackendReply> {
        self.exchange(
            Activity::message(self.user.clone(), text),
            ReplyExpectation::Required,
        )
        .await
    }

    async fn exchange_connection_token(
        &self,
        exchange: &TokenExchange,
    ) -> ConversationResult<BackendReply> {
        let activity = Activity::token_exchange(
            self.user.clone(),
            &exchange.resource_id,
            &exchange.connection_name,
            &exchange.token,
        );
        self.exchange(activity, ReplyExpectation::Optional).await
    }

    async fn submit_card_action(
        &self,
        payload: &serde_json::Value,
    ) -> ConversationResult<BackendReply> {
        self.exchange(
            Activity::card_submit(self.user.clone(), payload.clone()),
            ReplyExpectation::Optional,
        )
        .await
    }
}
