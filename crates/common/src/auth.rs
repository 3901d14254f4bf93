use serde::{Deserialize, Serialize};

/// Identity of the caller a chart request runs on behalf of.
///
/// Row security predicates are resolved from this context. The roles carried
/// here are merged with whatever the role directory reports for the user.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SecurityContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// True when no caller identity was supplied.
    pub fn is_anonymous(&self) -> bool {
        self.user_id.trim().is_empty()
    }
}
