use crate::models::permission::{Permission, RoleTier};

/// Builds the canonical grant list for each role tier.
///
/// Each tier is the full list of the tier below with its own grants appended, so
/// `user() ⊆ leader() ⊆ owner()` always holds. Duplicates are never removed.
#[derive(Debug, Clone, Copy)]
pub struct RoleComposer<'a> {
    user_id: &'a str,
    company_id: &'a str,
}

impl<'a> RoleComposer<'a> {
    pub fn new(user_id: &'a str, company_id: &'a str) -> Self {
        Self { user_id, company_id }
    }

    pub fn user(&self) -> Vec<Permission> {
        let mut perms = grants(self.user_id, &["password", "email", "name", "avatar", "view"]);
        perms.extend(grants("retro", &["list"]));
        perms.extend(grants("topic", &["list", "create", "edit", "delete"]));
        perms.extend(grants("board", &["list", "view"]));
        perms.extend(grants("leader", &["list"]));
        perms.extend(grants("vote", &["add", "remove"]));

        if !self.company_id.is_empty() {
            perms.extend(grants(self.company_id, &["view"]));
        }

        perms
    }

    pub fn leader(&self) -> Vec<Permission> {
        let mut perms = self.user();
        perms.extend(grants("board", &["edit"]));
        perms.extend(grants("timer", &["start", "stop", "extend"]));
        perms.extend(grants("retro", &["start", "end"]));
        perms.extend(grants("action", &["create", "actioned", "delete", "edit"]));
        perms.extend(grants("leader", &["add", "remove"]));
        perms
    }

    pub fn owner(&self) -> Vec<Permission> {
        let mut perms = self.leader();
        perms.extend(grants("board", &["create", "delete"]));
        perms.extend(grants("company", &["create"]));

        if !self.company_id.is_empty() {
            perms.extend(grants(self.company_id, &["edit", "delete"]));
        }

        perms.extend(grants("billing", &["create", "edit", "delete"]));
        perms
    }

    pub fn for_tier(&self, tier: RoleTier) -> Vec<Permission> {
        match tier {
            RoleTier::User => self.user(),
            RoleTier::Leader => self.leader(),
            RoleTier::Owner => self.owner(),
        }
    }
}

fn grants(resource: &str, actions: &[&str]) -> Vec<Permission> {
    actions
        .iter()
        .map(|action| Permission::unscoped(resource, *action))
        .collect()
}
