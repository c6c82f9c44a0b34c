use serde::{Deserialize, Serialize};

/// A user as issued by the identity provider. Never mutated by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            display_name: display_name.into(),
        }
    }

    /// Name to show in the UI, falling back to the email address
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }
}

/// Cached user data stored next to the token.
///
/// Providers may omit email or display name; those come back as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}

impl From<&Identity> for UserSnapshot {
    fn from(identity: &Identity) -> Self {
        Self {
            uid: identity.user_id.clone(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone(),
        }
    }
}

impl From<UserSnapshot> for Identity {
    fn from(snapshot: UserSnapshot) -> Self {
        Self {
            user_id: snapshot.uid,
            email: snapshot.email,
            display_name: snapshot.display_name,
        }
    }
}
