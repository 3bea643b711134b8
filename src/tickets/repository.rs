//! Contracts for the relational store (system of record) and the transcript
//! archive.

use async_trait::async_trait;

use crate::channels::Message;
use crate::shared::error::{ArchiveError, InfraError};
use crate::shared::models::{
    ChannelId, CloseMetadata, MessageId, NewTicket, Panel, PanelId, StaffGrants, SupportTeam,
    Ticket, TicketId, UserId, WorkspaceId, WorkspaceSettings,
};

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn workspace_settings(&self, workspace_id: WorkspaceId) -> Result<WorkspaceSettings, InfraError>;

    /// Drops the overflow category reference after the category vanished.
    async fn disable_overflow(&self, workspace_id: WorkspaceId) -> Result<(), InfraError>;

    async fn clear_archive_channel(&self, workspace_id: WorkspaceId) -> Result<(), InfraError>;

    async fn staff_grants(&self, workspace_id: WorkspaceId) -> Result<StaffGrants, InfraError>;

    async fn teams(&self, workspace_id: WorkspaceId) -> Result<Vec<SupportTeam>, InfraError>;

    async fn panel(&self, workspace_id: WorkspaceId, panel_id: PanelId) -> Result<Option<Panel>, InfraError>;

    /// Pending and open tickets opened by `user_id`.
    async fn count_open_tickets(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<usize, InfraError>;

    async fn count_workspace_open(&self, workspace_id: WorkspaceId) -> Result<usize, InfraError>;

    async fn count_workspace_total(&self, workspace_id: WorkspaceId) -> Result<usize, InfraError>;

    /// Inserts a pending row and assigns the next id for the workspace.
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, InfraError>;

    async fn ticket(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<Option<Ticket>, InfraError>;

    async fn ticket_by_channel(
        &self,
        workspace_id: WorkspaceId,
        channel_id: ChannelId,
    ) -> Result<Option<Ticket>, InfraError>;

    async fn set_channel(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        channel_id: ChannelId,
    ) -> Result<(), InfraError>;

    async fn set_claimer(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        claimer: Option<UserId>,
    ) -> Result<(), InfraError>;

    /// Marks the ticket closed and records the metadata. Returns false,
    /// writing nothing, when the ticket was already closed.
    async fn close_ticket(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        metadata: CloseMetadata,
    ) -> Result<bool, InfraError>;

    /// Returns false when the ticket was not closed.
    async fn reopen_ticket(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<bool, InfraError>;

    async fn set_transcript_stored(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError>;

    async fn set_join_message(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        message_id: Option<MessageId>,
    ) -> Result<(), InfraError>;

    async fn delete_close_request(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError>;

    async fn exclude_from_autoclose(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError>;

    async fn exclude_workspace_from_autoclose(&self, workspace_id: WorkspaceId) -> Result<(), InfraError>;
}

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Messages arrive oldest first.
    async fn store(
        &self,
        messages: Vec<Message>,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        premium: bool,
    ) -> Result<(), ArchiveError>;
}
