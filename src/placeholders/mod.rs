//! `%key%` template substitution for welcome messages and channel names.
//!
//! Three sources feed one result map: per-key resolvers over ticket data,
//! the identity lookup (one call fills a group of keys) and workspace
//! integrations. They run concurrently; a failing source leaves its keys
//! unresolved or "N/A" without affecting the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::shared::error::InfraError;
use crate::shared::models::{Ticket, UserId, WorkspaceId};
use crate::tickets::repository::TicketRepository;

pub mod integrations;

pub use integrations::{IntegrationClient, IntegrationDefinition, IntegrationRegistry};

pub const NOT_AVAILABLE: &str = "N/A";

static PLACEHOLDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"%([a-zA-Z0-9_:.\-]+)%").ok());

pub const IDENTITY_KEYS: [&str; 5] = [
    "verified_id",
    "verified_username",
    "verified_display_name",
    "verified_profile_url",
    "verified_created",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub profile_url: String,
    pub created: DateTime<Utc>,
}

/// External identity verification. `None` when the user never verified.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup(&self, user_id: UserId) -> Result<Option<VerifiedIdentity>, InfraError>;
}

/// Everything the resolvers may read. Owned so the engine can build it once
/// per message and hand out references.
#[derive(Debug, Clone)]
pub struct SubstitutionContext {
    pub workspace_id: WorkspaceId,
    pub workspace_name: String,
    pub ticket: Ticket,
    pub opener_username: String,
    pub ticket_limit: u8,
    pub form_answers: HashMap<String, String>,
}

type Results = Arc<Mutex<HashMap<String, String>>>;

#[derive(Clone)]
pub struct PlaceholderEngine {
    repo: Arc<dyn TicketRepository>,
    identity: Option<Arc<dyn IdentityLookup>>,
    integrations: Option<(Arc<dyn IntegrationRegistry>, IntegrationClient)>,
    timeout: Duration,
}

impl PlaceholderEngine {
    pub fn new(repo: Arc<dyn TicketRepository>, timeout: Duration) -> Self {
        Self {
            repo,
            identity: None,
            integrations: None,
            timeout,
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityLookup>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_integrations(mut self, registry: Arc<dyn IntegrationRegistry>, client: IntegrationClient) -> Self {
        self.integrations = Some((registry, client));
        self
    }

    /// Distinct keys referenced by `template`, in first-seen order.
    pub fn keys(template: &str) -> Vec<String> {
        let Some(pattern) = PLACEHOLDER.as_ref() else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        pattern
            .captures_iter(template)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    pub async fn substitute(&self, template: &str, ctx: &SubstitutionContext) -> String {
        let keys = Self::keys(template);
        if keys.is_empty() {
            return template.to_string();
        }

        let results: Results = Arc::new(Mutex::new(HashMap::new()));
        let mut tasks: Vec<BoxFuture<'_, ()>> = Vec::new();

        let (identity_keys, other_keys): (Vec<String>, Vec<String>) =
            keys.into_iter().partition(|k| IDENTITY_KEYS.contains(&k.as_str()));

        if !identity_keys.is_empty() {
            tasks.push(self.resolve_identity(ctx, Arc::clone(&results)).boxed());
        }

        if self.integrations.is_some() {
            tasks.push(
                self.resolve_integrations(ctx, other_keys.clone(), Arc::clone(&results))
                    .boxed(),
            );
        }

        for key in other_keys {
            let results = Arc::clone(&results);
            tasks.push(
                async move {
                    let resolved =
                        tokio::time::timeout(self.timeout, self.resolve_single(&key, ctx)).await;
                    match resolved {
                        Ok(Ok(Some(value))) => {
                            results.lock().await.entry(key).or_insert(value);
                        }
                        Ok(Ok(None)) => {}
                        Ok(Err(e)) => warn!("Placeholder %{key}% failed: {e}"),
                        Err(_) => warn!("Placeholder %{key}% timed out"),
                    }
                }
                .boxed(),
            );
        }

        join_all(tasks).await;

        let results = results.lock().await;
        let Some(pattern) = PLACEHOLDER.as_ref() else {
            return template.to_string();
        };
        if results.is_empty() {
            return template.to_string();
        }

        pattern
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let key = &caps[1];
                results
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    async fn resolve_single(&self, key: &str, ctx: &SubstitutionContext) -> Result<Option<String>, InfraError> {
        let ticket = &ctx.ticket;
        let value = match key {
            "user" => Some(format!("<@{}>", ticket.opener_id)),
            "username" => Some(ctx.opener_username.clone()),
            "ticket_id" => Some(ticket.id.to_string()),
            "channel" => ticket.channel_id.map(|id| format!("<#{id}>")),
            "server" => Some(ctx.workspace_name.clone()),
            "open_tickets" => Some(self.repo.count_workspace_open(ctx.workspace_id).await?.to_string()),
            "total_tickets" => Some(self.repo.count_workspace_total(ctx.workspace_id).await?.to_string()),
            "user_open_tickets" => Some(
                self.repo
                    .count_open_tickets(ctx.workspace_id, ticket.opener_id)
                    .await?
                    .to_string(),
            ),
            "ticket_limit" => Some(ctx.ticket_limit.to_string()),
            "claimed_by" => Some(
                ticket
                    .claimed_by
                    .map_or_else(|| "Not claimed".to_string(), |id| format!("<@{id}>")),
            ),
            "date" => Some(ticket.opened_at.format("%Y-%m-%d").to_string()),
            other => ctx.form_answers.get(other).cloned(),
        };
        Ok(value)
    }

    async fn resolve_identity(&self, ctx: &SubstitutionContext, results: Results) {
        let identity = match &self.identity {
            Some(lookup) => {
                match tokio::time::timeout(self.timeout, lookup.lookup(ctx.ticket.opener_id)).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        warn!("Identity lookup for user {} failed: {e}", ctx.ticket.opener_id);
                        None
                    }
                    Err(_) => {
                        warn!("Identity lookup for user {} timed out", ctx.ticket.opener_id);
                        None
                    }
                }
            }
            None => None,
        };

        let values: [String; 5] = match identity {
            Some(v) => [
                v.id,
                v.username,
                v.display_name,
                v.profile_url,
                v.created.format("%Y-%m-%d").to_string(),
            ],
            None => std::array::from_fn(|_| NOT_AVAILABLE.to_string()),
        };

        let mut results = results.lock().await;
        for (key, value) in IDENTITY_KEYS.iter().zip(values) {
            results.insert((*key).to_string(), value);
        }
    }

    async fn resolve_integrations(&self, ctx: &SubstitutionContext, keys: Vec<String>, results: Results) {
        let Some((registry, client)) = &self.integrations else {
            return;
        };

        let definitions = match tokio::time::timeout(self.timeout, registry.integrations(ctx.workspace_id)).await {
            Ok(Ok(defs)) => defs,
            Ok(Err(e)) => {
                warn!("Loading integrations for workspace {} failed: {e}", ctx.workspace_id);
                return;
            }
            Err(_) => {
                warn!("Loading integrations for workspace {} timed out", ctx.workspace_id);
                return;
            }
        };

        let vars = HashMap::from([
            ("user_id".to_string(), ctx.ticket.opener_id.to_string()),
            ("workspace_id".to_string(), ctx.workspace_id.to_string()),
            ("ticket_id".to_string(), ctx.ticket.id.to_string()),
        ]);

        let calls = definitions
            .iter()
            .filter(|def| def.provides_any(&keys))
            .map(|def| {
                let results = Arc::clone(&results);
                let vars = &vars;
                async move {
                    let values = match tokio::time::timeout(self.timeout, client.fetch(def, vars)).await {
                        Ok(Ok(values)) => values,
                        Ok(Err(e)) => {
                            warn!("Integration {} ({}) failed: {e}", def.id, def.name);
                            def.placeholders
                                .iter()
                                .map(|p| (p.name.clone(), NOT_AVAILABLE.to_string()))
                                .collect()
                        }
                        Err(_) => {
                            warn!("Integration {} ({}) timed out", def.id, def.name);
                            def.placeholders
                                .iter()
                                .map(|p| (p.name.clone(), NOT_AVAILABLE.to_string()))
                                .collect()
                        }
                    };
                    debug!("Integration {} resolved {} placeholders", def.id, values.len());
                    // Integration values take precedence over form answers.
                    results.lock().await.extend(values);
                }
            });

        join_all(calls).await;
    }
}
