use ticketcore::assert_ok;
use ticketcore::assert_rejected;
use ticketcore::channels::EntryTarget;
use ticketcore::commands::{ArgValue, CommandContext, CommandError, CommandTable};
use ticketcore::shared::error::ValidationError;
use ticketcore::shared::models::{AccessRule, Actor, Panel, RuleAction, SupportTeam};
use ticketcore::tests::harness::{TestHarness, SUPPORT_GROUP, WS};
use ticketcore::tickets::{Invocation, OpenRequest};

fn context(inv: Invocation, channel_id: u64) -> CommandContext {
    CommandContext {
        invocation: inv,
        channel_id,
    }
}

fn panel(id: i32, rules: Vec<AccessRule>) -> Panel {
    Panel {
        id,
        workspace_id: WS,
        title: "Billing".to_string(),
        category_id: None,
        naming_scheme: None,
        welcome_message: Some("Billing help for %user%".to_string()),
        with_default_team: false,
        team_ids: vec![7],
        access_rules: rules,
        disabled: false,
        force_disabled: false,
    }
}

#[tokio::test]
async fn test_command_flow_open_claim_close() {
    let h = TestHarness::new();
    let table = CommandTable::new();
    let lobby = h.channels.add_text_channel(WS, None, "lobby");

    let reply = assert_ok!(
        table
            .dispatch(
                &h.engine,
                &context(h.customer(100), lobby),
                "open",
                vec![("subject".to_string(), ArgValue::Text("Refund".to_string()))],
            )
            .await
    );
    let ticket = h.repo.tickets(WS).pop().unwrap();
    let channel = ticket.channel_id.unwrap();
    assert_eq!(reply, format!("Opened a new ticket: <#{channel}>"));
    assert!(h.channels.messages(channel)[0].content.contains("**Subject:** Refund"));

    let staff = context(h.support(200), channel);
    let reply = assert_ok!(table.dispatch(&h.engine, &staff, "claim", vec![]).await);
    assert_eq!(reply, "<@200> has claimed this ticket");

    let reply = assert_ok!(
        table
            .dispatch(
                &h.engine,
                &staff,
                "close",
                vec![("reason".to_string(), ArgValue::Text("refunded".to_string()))],
            )
            .await
    );
    assert_eq!(reply, format!("Ticket #{} closed", ticket.id));

    let closed = h.repo.ticket_snapshot(WS, ticket.id).unwrap();
    assert!(!closed.open);
    assert_eq!(closed.claimed_by, Some(200));
    assert_eq!(closed.close_reason.as_deref(), Some("refunded"));
}

#[tokio::test]
async fn test_command_rejections_carry_user_message() {
    let h = TestHarness::new();
    let table = CommandTable::new();
    let lobby = h.channels.add_text_channel(WS, None, "lobby");

    let err = table
        .dispatch(&h.engine, &context(h.support(200), lobby), "claim", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Ticket(_)));
    assert_eq!(err.user_message(), "This is not a ticket channel");

    let err = table
        .dispatch(&h.engine, &context(h.support(200), lobby), "escalate", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Unknown(_)));
}

#[tokio::test]
async fn test_transfer_command_takes_member() {
    let h = TestHarness::new();
    let table = CommandTable::new();
    let opened = assert_ok!(h.engine.open_ticket(&h.customer(100), OpenRequest::default()).await);
    let staff = context(h.support(200), opened.channel.id);

    let target = Actor::new(300, "staff300").with_groups(vec![SUPPORT_GROUP]);
    let reply = assert_ok!(
        table
            .dispatch(
                &h.engine,
                &staff,
                "transfer",
                vec![("user".to_string(), ArgValue::Member(target))],
            )
            .await
    );
    assert_eq!(reply, "Ticket transferred to <@300>");
    assert_eq!(
        h.repo.ticket_snapshot(WS, opened.ticket.id).unwrap().claimed_by,
        Some(300)
    );
}

#[tokio::test]
async fn test_panel_deny_rule_blocks_group() {
    let h = TestHarness::new();
    h.repo.put_panel(panel(
        4,
        vec![
            AccessRule {
                priority: 1,
                group_id: 66,
                action: RuleAction::Deny,
            },
            AccessRule {
                priority: 2,
                group_id: WS,
                action: RuleAction::Allow,
            },
        ],
    ));
    let request = OpenRequest {
        panel_id: Some(4),
        ..OpenRequest::default()
    };

    let banned = Invocation::interactive(WS, Actor::new(100, "banned").with_groups(vec![66]));
    assert_rejected!(
        h.engine.open_ticket(&banned, request.clone()).await,
        ValidationError::PanelAccessDenied { .. }
    );

    let allowed = assert_ok!(h.engine.open_ticket(&h.customer(101), request).await);
    assert_eq!(allowed.ticket.panel_id, Some(4));
}

#[tokio::test]
async fn test_panel_team_replaces_default_staff() {
    let h = TestHarness::new();
    h.repo.add_team(
        WS,
        SupportTeam {
            id: 7,
            name: "Billing".to_string(),
            users: vec![900],
            groups: vec![],
        },
    );
    h.repo.put_panel(panel(5, vec![]));

    let request = OpenRequest {
        panel_id: Some(5),
        ..OpenRequest::default()
    };
    let opened = assert_ok!(h.engine.open_ticket(&h.customer(100), request).await);

    let entries = h.channels.access_entries(opened.channel.id);
    assert!(entries.iter().any(|e| e.target == EntryTarget::User(900)));
    assert!(!entries.iter().any(|e| e.target == EntryTarget::Group(SUPPORT_GROUP)));

    let welcome = &h.channels.messages(opened.channel.id)[0];
    assert_eq!(welcome.content, "Billing help for <@100>");
}

#[tokio::test]
async fn test_unknown_panel_and_disabled_panel() {
    let h = TestHarness::new();
    assert_rejected!(
        h.engine
            .open_ticket(
                &h.customer(100),
                OpenRequest {
                    panel_id: Some(99),
                    ..OpenRequest::default()
                },
            )
            .await,
        ValidationError::PanelNotFound(99)
    );

    let mut disabled = panel(6, vec![]);
    disabled.disabled = true;
    h.repo.put_panel(disabled);
    assert_rejected!(
        h.engine
            .open_ticket(
                &h.customer(100),
                OpenRequest {
                    panel_id: Some(6),
                    ..OpenRequest::default()
                },
            )
            .await,
        ValidationError::PanelDisabled
    );
}
