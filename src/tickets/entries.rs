//! Access-entry lists for ticket channels. Lists are always computed from
//! scratch and written whole, so nothing from an earlier claim survives.

use std::collections::BTreeMap;

use crate::access::AllowedStaff;
use crate::channels::{AccessEntry, EntryTarget, Permissions};
use crate::shared::models::{ClaimVisibility, UserId, WorkspaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimState {
    pub claimer: UserId,
    pub visibility: ClaimVisibility,
}

pub fn ticket_entries(
    workspace_id: WorkspaceId,
    bot_id: UserId,
    opener_id: UserId,
    staff: &AllowedStaff,
    claim: Option<ClaimState>,
) -> Vec<AccessEntry> {
    let mut entries: BTreeMap<EntryTarget, AccessEntry> = BTreeMap::new();
    let mut put = |entry: AccessEntry| {
        entries.insert(entry.target, entry);
    };

    put(AccessEntry::deny(
        EntryTarget::Group(workspace_id),
        Permissions::VIEW_CHANNEL,
    ));

    let visibility = claim.map_or(ClaimVisibility::FullVisibility, |c| c.visibility);
    let staff_targets = staff
        .users
        .iter()
        .map(|&id| (EntryTarget::User(id), staff.admin_users.contains(&id)))
        .chain(
            staff
                .groups
                .iter()
                .map(|&id| (EntryTarget::Group(id), staff.admin_groups.contains(&id))),
        );

    for (target, is_admin) in staff_targets {
        match (visibility, is_admin) {
            (ClaimVisibility::FullVisibility, _) | (_, true) => {
                put(AccessEntry::allow(target, Permissions::participant()))
            }
            (ClaimVisibility::SupportCannotView, false) => {}
            (ClaimVisibility::SupportCannotType, false) => put(AccessEntry {
                target,
                allow: Permissions::observer(),
                deny: Permissions::SEND_MESSAGES,
            }),
        }
    }

    put(AccessEntry::allow(
        EntryTarget::User(opener_id),
        Permissions::participant(),
    ));

    if let Some(claim) = claim {
        put(AccessEntry::allow(
            EntryTarget::User(claim.claimer),
            Permissions::participant(),
        ));
    }

    put(AccessEntry::allow(EntryTarget::User(bot_id), Permissions::bot()));

    entries.into_values().collect()
}
