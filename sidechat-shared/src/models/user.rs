use serde::{Deserialize, Serialize};

/// A Sidechat account as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    /// Unique identifier for the user (`user-1`, `user-<uuid>`, ...).
    pub id: String,

    /// Display name.
    pub name: String,

    /// The user's email address.
    pub email: String,

    /// Avatar URL, when one was uploaded or generated.
    #[serde(default)]
    pub avatar: Option<String>,

    /// Presence string (`online`, `away`, ...).
    #[serde(default = "default_status")]
    pub status: String,
}

fn default_status() -> String {
    "online".to_string()
}

/// Email/password credentials for `/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthLoginRequest {
    pub email: String,
    pub password: String,
}

/// Response body of the login and registration endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}
