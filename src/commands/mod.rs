//! Typed command table.
//!
//! Each command declares its parameters up front. The chat shell parses raw
//! input into named [`ArgValue`]s; [`CommandTable::dispatch`] checks them
//! against the descriptor and only then calls the typed handler.

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, warn};
use std::collections::HashMap;

use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::{Actor, ChannelId, PanelId};
use crate::tickets::{CloseRequest, Invocation, OpenRequest, TicketEngine, TicketRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Member,
    Integer,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

const fn required(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
    }
}

const fn optional(name: &'static str, kind: ParamKind) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
    }
}

const OPEN_PARAMS: &[ParamSpec] = &[
    optional("subject", ParamKind::Text),
    optional("panel", ParamKind::Integer),
];
const TRANSFER_PARAMS: &[ParamSpec] = &[required("user", ParamKind::Member)];
const CLOSE_PARAMS: &[ParamSpec] = &[optional("reason", ParamKind::Text)];
const REOPEN_PARAMS: &[ParamSpec] = &[optional("id", ParamKind::Integer)];
const RENAME_PARAMS: &[ParamSpec] = &[required("name", ParamKind::Text)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    /// Resolved by the shell, groups included.
    Member(Actor),
    Integer(i64),
    Text(String),
}

impl ArgValue {
    fn kind(&self) -> ParamKind {
        match self {
            Self::Member(_) => ParamKind::Member,
            Self::Integer(_) => ParamKind::Integer,
            Self::Text(_) => ParamKind::Text,
        }
    }
}

/// Arguments that passed validation against the descriptor.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: HashMap<&'static str, ArgValue>,
}

impl Args {
    pub fn member(&self, name: &str) -> Option<&Actor> {
        match self.values.get(name) {
            Some(ArgValue::Member(actor)) => Some(actor),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ArgValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ArgValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandContext {
    pub invocation: Invocation,
    /// Channel the command was run in.
    pub channel_id: ChannelId,
}

impl CommandContext {
    fn here(&self) -> TicketRef {
        TicketRef::Channel(self.channel_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    Unknown(String),
    #[error("Missing required argument `{0}`")]
    MissingArgument(&'static str),
    #[error("Argument `{name}` must be a {expected:?}")]
    InvalidArgument { name: String, expected: ParamKind },
    #[error("Unexpected argument `{0}`")]
    UnexpectedArgument(String),
    #[error(transparent)]
    Ticket(#[from] TicketError),
}

impl CommandError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Ticket(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

type Handler =
    for<'a> fn(&'a TicketEngine, &'a CommandContext, Args) -> BoxFuture<'a, Result<String, TicketError>>;

pub struct CommandDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    handler: Handler,
}

impl std::fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl CommandDescriptor {
    fn bind(&self, raw: Vec<(String, ArgValue)>) -> Result<Args, CommandError> {
        let mut values = HashMap::new();
        for (name, value) in raw {
            let spec = self
                .params
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| CommandError::UnexpectedArgument(name.clone()))?;
            if value.kind() != spec.kind {
                return Err(CommandError::InvalidArgument {
                    name,
                    expected: spec.kind,
                });
            }
            values.insert(spec.name, value);
        }

        if let Some(missing) = self
            .params
            .iter()
            .find(|p| p.required && !values.contains_key(p.name))
        {
            return Err(CommandError::MissingArgument(missing.name));
        }

        Ok(Args { values })
    }
}

#[derive(Debug)]
pub struct CommandTable {
    commands: HashMap<&'static str, CommandDescriptor>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        let descriptors = [
            CommandDescriptor {
                name: "open",
                description: "Open a new ticket",
                params: OPEN_PARAMS,
                handler: |engine, ctx, args| open(engine, ctx, args).boxed(),
            },
            CommandDescriptor {
                name: "claim",
                description: "Assign this ticket to yourself",
                params: &[],
                handler: |engine, ctx, _| claim(engine, ctx).boxed(),
            },
            CommandDescriptor {
                name: "transfer",
                description: "Hand this ticket to another staff member",
                params: TRANSFER_PARAMS,
                handler: |engine, ctx, args| transfer(engine, ctx, args).boxed(),
            },
            CommandDescriptor {
                name: "unclaim",
                description: "Release your claim on this ticket",
                params: &[],
                handler: |engine, ctx, _| unclaim(engine, ctx).boxed(),
            },
            CommandDescriptor {
                name: "close",
                description: "Close this ticket",
                params: CLOSE_PARAMS,
                handler: |engine, ctx, args| close(engine, ctx, args).boxed(),
            },
            CommandDescriptor {
                name: "reopen",
                description: "Reopen an archived thread ticket",
                params: REOPEN_PARAMS,
                handler: |engine, ctx, args| reopen(engine, ctx, args).boxed(),
            },
            CommandDescriptor {
                name: "rename",
                description: "Rename this ticket's channel",
                params: RENAME_PARAMS,
                handler: |engine, ctx, args| rename(engine, ctx, args).boxed(),
            },
        ];

        Self {
            commands: descriptors.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Validates `raw` against the command's parameters and runs it. The
    /// returned string is the reply for the invoking user.
    pub async fn dispatch(
        &self,
        engine: &TicketEngine,
        ctx: &CommandContext,
        name: &str,
        raw: Vec<(String, ArgValue)>,
    ) -> Result<String, CommandError> {
        let descriptor = self
            .commands
            .get(name)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        let args = descriptor.bind(raw)?;
        debug!(
            "Dispatching /{name} for {} in workspace {}",
            ctx.invocation.actor.user_id, ctx.invocation.workspace_id
        );

        (descriptor.handler)(engine, ctx, args).await.map_err(|e| {
            if !e.is_validation() {
                warn!("/{name} failed in workspace {}: {e}", ctx.invocation.workspace_id);
            }
            CommandError::from(e)
        })
    }
}

fn to_id<T: TryFrom<i64>>(value: i64) -> Option<T> {
    T::try_from(value).ok()
}

async fn open(engine: &TicketEngine, ctx: &CommandContext, args: Args) -> Result<String, TicketError> {
    let request = OpenRequest {
        panel_id: args.integer("panel").and_then(to_id::<PanelId>),
        source_channel: Some(ctx.channel_id),
        subject: args.text("subject").map(str::to_string),
        form_answers: HashMap::new(),
    };
    let opened = engine.open_ticket(&ctx.invocation, request).await?;
    Ok(format!("Opened a new ticket: <#{}>", opened.channel.id))
}

async fn claim(engine: &TicketEngine, ctx: &CommandContext) -> Result<String, TicketError> {
    engine.claim_ticket(&ctx.invocation, ctx.here()).await?;
    Ok(format!("{} has claimed this ticket", ctx.invocation.actor.mention()))
}

async fn transfer(engine: &TicketEngine, ctx: &CommandContext, args: Args) -> Result<String, TicketError> {
    let Some(target) = args.member("user") else {
        return Err(ValidationError::TargetNotStaff.into());
    };
    engine
        .transfer_ticket(&ctx.invocation, ctx.here(), target)
        .await?;
    Ok(format!("Ticket transferred to {}", target.mention()))
}

async fn unclaim(engine: &TicketEngine, ctx: &CommandContext) -> Result<String, TicketError> {
    engine.unclaim_ticket(&ctx.invocation, ctx.here()).await?;
    Ok("This ticket is no longer claimed".to_string())
}

async fn close(engine: &TicketEngine, ctx: &CommandContext, args: Args) -> Result<String, TicketError> {
    let mut request = CloseRequest::new(ctx.here());
    if let Some(reason) = args.text("reason") {
        request = request.with_reason(reason);
    }
    let outcome = engine.close_ticket(&ctx.invocation, request).await?;
    Ok(format!("Ticket #{} closed", outcome.ticket.id))
}

async fn reopen(engine: &TicketEngine, ctx: &CommandContext, args: Args) -> Result<String, TicketError> {
    let target = args
        .integer("id")
        .and_then(to_id)
        .map_or_else(|| ctx.here(), TicketRef::Id);
    let ticket = engine.reopen_ticket(&ctx.invocation, target).await?;
    Ok(format!("Ticket #{} reopened", ticket.id))
}

async fn rename(engine: &TicketEngine, ctx: &CommandContext, args: Args) -> Result<String, TicketError> {
    let name = args.text("name").unwrap_or_default();
    let channel = engine
        .rename_ticket(&ctx.invocation, ctx.here(), name)
        .await?;
    Ok(format!("Renamed to <#{}>", channel.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lists_lifecycle_commands() {
        assert_eq!(
            CommandTable::new().names(),
            vec!["claim", "close", "open", "rename", "reopen", "transfer", "unclaim"]
        );
    }

    #[test]
    fn test_param_lists_live_for_static() {
        let table = CommandTable::new();
        let open: &'static [ParamSpec] = table.get("open").unwrap().params;
        assert_eq!(
            open,
            &[optional("subject", ParamKind::Text), optional("panel", ParamKind::Integer)]
        );
        let rename: &'static [ParamSpec] = table.get("rename").unwrap().params;
        assert_eq!(rename, &[required("name", ParamKind::Text)]);
        assert!(table.get("claim").unwrap().params.is_empty());
    }

    #[test]
    fn test_bind_rejects_missing_required() {
        let table = CommandTable::new();
        let transfer = table.get("transfer").unwrap();
        assert!(matches!(
            transfer.bind(vec![]),
            Err(CommandError::MissingArgument("user"))
        ));
    }

    #[test]
    fn test_bind_rejects_wrong_kind_and_unknown_names() {
        let table = CommandTable::new();
        let rename = table.get("rename").unwrap();
        assert!(matches!(
            rename.bind(vec![("name".to_string(), ArgValue::Integer(5))]),
            Err(CommandError::InvalidArgument { expected: ParamKind::Text, .. })
        ));
        assert!(matches!(
            rename.bind(vec![("colour".to_string(), ArgValue::Text("red".into()))]),
            Err(CommandError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn test_bind_accepts_typed_args() {
        let table = CommandTable::new();
        let args = table
            .get("close")
            .unwrap()
            .bind(vec![("reason".to_string(), ArgValue::Text("done".into()))])
            .unwrap();
        assert_eq!(args.text("reason"), Some("done"));
        assert_eq!(args.integer("reason"), None);
    }
}
