//! Data models for WeCom application messages.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// Placeholder title sent with every video message.
pub const VIDEO_TITLE: &str = "Title";
/// Placeholder description sent with every video message.
pub const VIDEO_DESCRIPTION: &str = "Description";

/// The `(corp_id, corp_secret, agent_id)` triple identifying the calling application.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    corp_id: String,
    corp_secret: String,
    agent_id: u64,
}

impl Credential {
    /// Create a credential.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the corp ID or secret is empty.
    pub fn new(
        corp_id: impl Into<String>,
        corp_secret: impl Into<String>,
        agent_id: u64,
    ) -> Result<Self> {
        let corp_id = corp_id.into();
        let corp_secret = corp_secret.into();
        if corp_id.trim().is_empty() {
            return Err(CoreError::Validation("corp_id must not be empty".to_string()));
        }
        if corp_secret.trim().is_empty() {
            return Err(CoreError::Validation(
                "corp_secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            corp_id,
            corp_secret,
            agent_id,
        })
    }

    /// Enterprise ID.
    #[must_use]
    pub fn corp_id(&self) -> &str {
        &self.corp_id
    }

    /// Application secret.
    #[must_use]
    pub fn corp_secret(&self) -> &str {
        &self.corp_secret
    }

    /// Application agent ID.
    #[must_use]
    pub const fn agent_id(&self) -> u64 {
        self.agent_id
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("corp_id", &self.corp_id)
            .field("corp_secret", &"<redacted>")
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

/// Message type accepted by the send endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Plain text.
    Text,
    /// Image by media ID.
    Image,
    /// Voice clip by media ID.
    Voice,
    /// Video by media ID.
    Video,
    /// Arbitrary file by media ID.
    File,
}

impl MessageKind {
    /// All supported kinds.
    pub const ALL: [Self; 5] = [Self::Text, Self::Image, Self::Voice, Self::Video, Self::File];

    /// The `msgtype` value on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    /// The upload type carrying this kind's media, `None` for text.
    #[must_use]
    pub const fn media_kind(self) -> Option<MediaKind> {
        match self {
            Self::Text => None,
            Self::Image => Some(MediaKind::Image),
            Self::Voice => Some(MediaKind::Voice),
            Self::Video => Some(MediaKind::Video),
            Self::File => Some(MediaKind::File),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "unsupported message type '{s}' (expected text, image, voice, video or file)"
                ))
            })
    }
}

/// Temporary media type accepted by the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Image file.
    Image,
    /// Voice file (AMR).
    Voice,
    /// Video file (MP4).
    Video,
    /// Any other file.
    File,
}

impl MediaKind {
    /// The `type` query value on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<MessageKind>()
            .ok()
            .and_then(MessageKind::media_kind)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "unsupported media type '{s}' (expected image, voice, video or file)"
                ))
            })
    }
}

/// Target users, parties (departments) and tags of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    /// User IDs; `@all` addresses everyone.
    pub users: Vec<String>,
    /// Party (department) IDs.
    pub parties: Vec<String>,
    /// Tag IDs.
    pub tags: Vec<String>,
}

impl Recipients {
    /// Create an empty recipient set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add user IDs.
    #[must_use]
    pub fn users<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_ids(&mut self.users, ids);
        self
    }

    /// Add party IDs.
    #[must_use]
    pub fn parties<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_ids(&mut self.parties, ids);
        self
    }

    /// Add tag IDs.
    #[must_use]
    pub fn tags<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        extend_ids(&mut self.tags, ids);
        self
    }

    /// True when no category holds any ID.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.parties.is_empty() && self.tags.is_empty()
    }
}

/// Accepts `a|b` lists as well as single IDs; blank entries are dropped.
fn extend_ids<I, S>(target: &mut Vec<String>, ids: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for id in ids {
        let id: String = id.into();
        target.extend(
            id.split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
    }
}

/// Kind-specific message content, serialized under the `msgtype` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageBody {
    /// Text content.
    Text {
        /// Message text.
        content: String,
    },
    /// Image reference.
    Image {
        /// Uploaded media ID.
        media_id: String,
    },
    /// Voice reference.
    Voice {
        /// Uploaded media ID.
        media_id: String,
    },
    /// Video reference with title and description.
    Video {
        /// Uploaded media ID.
        media_id: String,
        /// Video title.
        title: String,
        /// Video description.
        description: String,
    },
    /// File reference.
    File {
        /// Uploaded media ID.
        media_id: String,
    },
}

impl MessageBody {
    /// Build the body for `kind`, validating the required argument.
    ///
    /// # Errors
    ///
    /// Returns a validation error if text content or the media ID is missing.
    pub fn new(kind: MessageKind, content: Option<&str>, media_id: Option<&str>) -> Result<Self> {
        let require_media = || {
            media_id
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .ok_or_else(|| CoreError::Validation(format!("{kind} message requires a media_id")))
        };

        Ok(match kind {
            MessageKind::Text => Self::Text {
                content: content
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| {
                        CoreError::Validation("text message requires non-empty content".to_string())
                    })?
                    .to_string(),
            },
            MessageKind::Image => Self::Image {
                media_id: require_media()?,
            },
            MessageKind::Voice => Self::Voice {
                media_id: require_media()?,
            },
            MessageKind::Video => Self::Video {
                media_id: require_media()?,
                title: VIDEO_TITLE.to_string(),
                description: VIDEO_DESCRIPTION.to_string(),
            },
            MessageKind::File => Self::File {
                media_id: require_media()?,
            },
        })
    }

    /// The message kind of this body.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::Voice { .. } => MessageKind::Voice,
            Self::Video { .. } => MessageKind::Video,
            Self::File { .. } => MessageKind::File,
        }
    }

    /// Short description for log lines: the text or the media ID.
    #[must_use]
    pub fn summary(&self) -> &str {
        match self {
            Self::Text { content } => content,
            Self::Image { media_id }
            | Self::Voice { media_id }
            | Self::Video { media_id, .. }
            | Self::File { media_id } => media_id,
        }
    }
}

/// A validated message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    recipients: Recipients,
    body: MessageBody,
}

impl OutboundMessage {
    /// Validate and assemble a message.
    ///
    /// # Errors
    ///
    /// Returns a validation error if no recipient is given, text content is
    /// empty, or a media kind lacks its media ID.
    pub fn new(
        kind: MessageKind,
        recipients: Recipients,
        content: Option<&str>,
        media_id: Option<&str>,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(CoreError::Validation(
                "at least one of users, parties or tags is required".to_string(),
            ));
        }
        let body = MessageBody::new(kind, content, media_id)?;
        Ok(Self { recipients, body })
    }

    /// Validate and assemble a text message.
    ///
    /// # Errors
    ///
    /// See [`OutboundMessage::new`].
    pub fn text(recipients: Recipients, content: &str) -> Result<Self> {
        Self::new(MessageKind::Text, recipients, Some(content), None)
    }

    /// Validate and assemble a media message.
    ///
    /// # Errors
    ///
    /// See [`OutboundMessage::new`].
    pub fn media(kind: MessageKind, recipients: Recipients, media_id: &str) -> Result<Self> {
        Self::new(kind, recipients, None, Some(media_id))
    }

    /// Message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Target recipients.
    #[must_use]
    pub const fn recipients(&self) -> &Recipients {
        &self.recipients
    }

    /// Kind-specific content.
    #[must_use]
    pub const fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Build the JSON body for the send endpoint.
    #[must_use]
    pub fn payload(&self, agent_id: u64, safe: bool) -> SendPayload<'_> {
        SendPayload {
            touser: self.recipients.users.join("|"),
            toparty: self.recipients.parties.join("|"),
            totag: self.recipients.tags.join("|"),
            msgtype: self.kind().as_str(),
            agentid: agent_id,
            safe: u8::from(safe),
            body: &self.body,
        }
    }
}

/// Request body of `message/send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendPayload<'a> {
    /// `|`-separated user IDs.
    pub touser: String,
    /// `|`-separated party IDs.
    pub toparty: String,
    /// `|`-separated tag IDs.
    pub totag: String,
    /// Message type.
    pub msgtype: &'static str,
    /// Application agent ID.
    pub agentid: u64,
    /// 1 for confidential messages.
    pub safe: u8,
    /// Kind-specific content keyed by `msgtype`.
    #[serde(flatten)]
    pub body: &'a MessageBody,
}

/// Common `errcode`/`errmsg` envelope of every API response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiStatus {
    /// Zero on success.
    #[serde(default)]
    pub errcode: Option<i64>,
    /// Provider message, `"ok"` on success.
    #[serde(default)]
    pub errmsg: Option<String>,
}

impl ApiStatus {
    /// True only when the provider reported `errcode == 0`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.errcode, Some(0))
    }

    /// Human readable failure description.
    #[must_use]
    pub fn describe(&self) -> String {
        match (self.errcode, self.errmsg.as_deref()) {
            (Some(code), Some(msg)) => format!("errcode {code}: {msg}"),
            (Some(code), None) => format!("errcode {code}"),
            (None, Some(msg)) => format!("missing errcode ({msg})"),
            (None, None) => "missing errcode".to_string(),
        }
    }
}

/// Successful delivery summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Attempt number that succeeded (1-based).
    pub attempts: u32,
    /// Provider message of the successful response.
    pub errmsg: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_user(id: &str) -> Recipients {
        Recipients::new().users([id])
    }

    #[test]
    fn kind_parsing_rejects_unknown_types() {
        assert_eq!("Video".parse::<MessageKind>().expect("video"), MessageKind::Video);
        let err = "markdown".parse::<MessageKind>().expect_err("unsupported");
        assert!(matches!(err, CoreError::Validation(_)));
        assert!("text".parse::<MediaKind>().is_err());
        assert_eq!("file".parse::<MediaKind>().expect("file"), MediaKind::File);
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = OutboundMessage::text(to_user("zhangsan"), "").expect_err("empty text");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn media_kinds_require_media_id() {
        for kind in MessageKind::ALL.into_iter().filter(|k| *k != MessageKind::Text) {
            let err = OutboundMessage::new(kind, to_user("zhangsan"), Some("ignored"), None)
                .expect_err("media id missing");
            assert!(matches!(err, CoreError::Validation(_)), "{kind}");
        }
    }

    #[test]
    fn each_kind_builds_its_own_body() {
        for kind in MessageKind::ALL {
            let body = MessageBody::new(kind, Some("hello"), Some("MEDIA")).expect("body");
            assert_eq!(body.kind(), kind);
        }
        let text = MessageBody::new(MessageKind::Text, Some("hello"), Some("MEDIA")).expect("text");
        assert_eq!(text.summary(), "hello");
    }

    #[test]
    fn recipients_are_required() {
        let err = OutboundMessage::text(Recipients::new().users([" ", ""]), "hi")
            .expect_err("no recipients");
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn text_payload_matches_wire_format() {
        let recipients = Recipients::new()
            .users(["zhangsan|lisi"])
            .parties(["2"])
            .tags(Vec::<String>::new());
        let msg = OutboundMessage::text(recipients, "disk usage above 90%").expect("message");

        let value = serde_json::to_value(msg.payload(1_000_002, false)).expect("serialize");
        assert_eq!(
            value,
            json!({
                "touser": "zhangsan|lisi",
                "toparty": "2",
                "totag": "",
                "msgtype": "text",
                "agentid": 1_000_002,
                "safe": 0,
                "text": { "content": "disk usage above 90%" }
            })
        );
    }

    #[test]
    fn video_payload_carries_placeholders() {
        let msg = OutboundMessage::media(MessageKind::Video, to_user("@all"), "MEDIA_ID")
            .expect("message");
        let value = serde_json::to_value(msg.payload(7, true)).expect("serialize");
        assert_eq!(value["msgtype"], "video");
        assert_eq!(value["safe"], 1);
        assert_eq!(
            value["video"],
            json!({ "media_id": "MEDIA_ID", "title": "Title", "description": "Description" })
        );
    }

    #[test]
    fn credential_debug_hides_secret() {
        let credential = Credential::new("ww1", "topsecret", 1).expect("credential");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("topsecret"));
        assert!(Credential::new("", "s", 1).is_err());
        assert!(Credential::new("ww1", " ", 1).is_err());
    }

    #[test]
    fn api_status_requires_zero_errcode() {
        let ok: ApiStatus = serde_json::from_value(json!({"errcode": 0, "errmsg": "ok"}))
            .expect("status");
        assert!(ok.is_ok());
        let missing: ApiStatus = serde_json::from_value(json!({"errmsg": "ok"})).expect("status");
        assert!(!missing.is_ok());
        assert_eq!(missing.describe(), "missing errcode (ok)");
    }
}
