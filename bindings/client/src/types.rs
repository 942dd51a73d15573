use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// A bearer token issued by the backend.
///
/// Tokens are loaded once and shared between workers, so they are cheap to clone and cannot be
/// changed. The value is never printed by [Debug].
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub struct Token(Arc<str>);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

/// Serializes as the bare token, for writing tokens out to be reused by later runs.
impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Token(<redacted>)")
    }
}

/// The identifier the backend assigns to a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub u64);

impl Display for TeamId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One entry of a team's roster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TeamMember {
    pub username: String,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration<'a> {
    pub username: &'a str,
    pub name: &'a str,
    pub password: &'a str,
}

/// A successful login.
#[derive(Debug, Clone)]
pub struct Login {
    pub token: Token,
    pub user_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_redacted() {
        let token = Token::from("secret-value");

        assert_eq!("Token(<redacted>)", format!("{token:?}"));
        assert_eq!("secret-value", token.as_str());
    }

    #[test]
    fn token_serializes_as_its_value() {
        let token = Token::from("secret-value");

        assert_eq!("\"secret-value\"", serde_json::to_string(&token).unwrap());
    }

    #[test]
    fn deserialize_roster() {
        let members: Vec<TeamMember> = serde_json::from_str(
            r#"[{"username": "user1", "user_id": 1, "name": "One", "last_checkin_time": null},
                {"username": "user2"}]"#,
        )
        .unwrap();

        assert_eq!(2, members.len());
        assert_eq!(Some(1), members[0].user_id);
        assert_eq!(None, members[1].name);
    }

    #[test]
    fn team_id_is_a_bare_number() {
        assert_eq!(TeamId(42), serde_json::from_str::<TeamId>("42").unwrap());
        assert_eq!("42", serde_json::to_string(&TeamId(42)).unwrap());
    }
}
