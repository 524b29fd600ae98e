//! Caller identity passed in by request-handling code.

use serde::Deserialize;
use uuid::Uuid;

/// Role of the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    #[default]
    User,
    Admin,
}

/// The user on whose behalf a scan operation runs
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    #[serde(default)]
    pub role: ActorRole,
}

impl Actor {
    pub fn new(user_id: Uuid, role: ActorRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// Only the owner or an administrator may start or cancel scans
    pub fn can_manage(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_or_admin_can_manage() {
        let owner = Uuid::new_v4();
        assert!(Actor::new(owner, ActorRole::User).can_manage(owner));
        assert!(Actor::new(Uuid::new_v4(), ActorRole::Admin).can_manage(owner));
        assert!(!Actor::new(Uuid::new_v4(), ActorRole::User).can_manage(owner));
    }

    #[test]
    fn test_role_defaults_to_user() {
        let actor: Actor =
            serde_json::from_str(r#"{"user_id":"5f0c2d1e-8f5a-4a39-9d43-0a4c3c8f1b2a"}"#).unwrap();
        assert_eq!(actor.role, ActorRole::User);
        assert!(!actor.is_admin());
    }
}
