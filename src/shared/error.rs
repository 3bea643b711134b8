use crate::access::PermissionLevel;
use crate::shared::models::GroupId;

/// Rejections the actor can fix or must accept. Always answered with a reply,
/// never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("You have reached the ticket limit ({limit}) for this server")]
    TicketLimitReached { limit: u8 },
    #[error("Tickets are being opened too quickly, try again shortly")]
    RateLimited,
    #[error("This channel has been renamed too often, try again later")]
    RenameRateLimited,
    #[error("Another ticket is being opened in this server, try again")]
    OpenInProgress,
    #[error("This is not a ticket channel")]
    NotATicketChannel,
    #[error("Ticket #{0} was not found")]
    TicketNotFound(i32),
    #[error("This ticket is already closed")]
    AlreadyClosed,
    #[error("This ticket is not closed")]
    NotClosed,
    #[error("Only thread tickets can be reopened")]
    NotThread,
    #[error("The channel for this ticket has been deleted")]
    ChannelDeleted,
    #[error("You need the {required} permission level to do this")]
    InsufficientPermission { required: PermissionLevel },
    #[error("This ticket is not claimed")]
    NotClaimed,
    #[error("Only the claimer or an administrator can unclaim this ticket")]
    NotClaimer,
    #[error("The target user is not a member of staff")]
    TargetNotStaff,
    #[error("Panel #{0} was not found")]
    PanelNotFound(i32),
    #[error("This panel is disabled")]
    PanelDisabled,
    #[error("This panel has been disabled because the server's premium subscription lapsed")]
    PanelForceDisabled,
    #[error("{}", panel_denied_message(.allowed_groups))]
    PanelAccessDenied { allowed_groups: Vec<GroupId> },
    #[error("There are too many tickets open in this category, and no overflow category is available")]
    TooManyTickets,
    #[error("This server has reached the maximum number of channels")]
    TooManyChannels,
    #[error("The ticket category no longer exists")]
    CategoryMissing,
    #[error("Thread tickets must be opened from a text channel")]
    NoThreadParent,
    #[error("You are blacklisted from opening tickets in this server")]
    Blacklisted,
    #[error("Channel names must be between 1 and {max} characters")]
    InvalidName { max: usize },
}

fn panel_denied_message(allowed_groups: &[GroupId]) -> String {
    if allowed_groups.is_empty() {
        return "You do not have permission to open a ticket with this panel".to_string();
    }

    let mentions: Vec<String> = allowed_groups.iter().map(|id| format!("<@&{id}>")).collect();
    format!(
        "Only members of the following roles can open a ticket with this panel: {}",
        mentions.join(", ")
    )
}

/// Shared store, database or deadline failures. Aborts the current operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InfraError {
    #[error("Shared store error: {0}")]
    Store(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Timed out while {0}")]
    Timeout(String),
}

#[cfg(feature = "cache")]
impl From<redis::RedisError> for InfraError {
    fn from(e: redis::RedisError) -> Self {
        Self::Store(e.to_string())
    }
}

/// A failed call against the chat platform REST API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("Rate limited by platform, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },
    #[error("Network error: {0}")]
    Network(String),
}

impl PlatformError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Network(_) => None,
        }
    }

    /// 403: a permanent permission problem for the bot.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// 404: the resource was deleted out from under us.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("Transcript upload failed: {0}")]
    Upload(String),
    #[error("Transcript too large: {0} bytes")]
    TooLarge(usize),
}

/// Operation-level error returned by every engine entry point.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Infrastructure(#[from] InfraError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl TicketError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(v) => Some(v),
            _ => None,
        }
    }

    /// Text shown to the actor. Infrastructure details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(v) => v.to_string(),
            Self::Platform(e) if e.is_forbidden() => {
                "I do not have permission to do that in this server".to_string()
            }
            Self::Platform(e) => format!("The chat platform returned an error: {e}"),
            Self::Infrastructure(_) | Self::Archive(_) => {
                "An internal error occurred, please try again later".to_string()
            }
        }
    }
}
