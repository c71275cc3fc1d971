use learn_core::model::UserId;

/// Source of the authenticated learner, if any.
pub trait IdentityProvider: Send + Sync {
    /// `None` means the learner is a guest.
    fn current_user(&self) -> Option<UserId>;
}

/// Identity fixed at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    #[must_use]
    pub fn guest() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self(Some(user_id))
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.0
    }
}
