use std::collections::HashMap;

/// CredentialStore validates username/password pairs for the
/// RFC1929 authenticator. Implementations back onto whatever
/// identity source the deployment uses; lookups must be safe to
/// call concurrently from many connections.
pub trait CredentialStore: Send + Sync {
    fn valid(&self, username: &str, password: &str) -> bool;
}

/// StaticCredentials is a fixed username -> password table.
/// Matches are exact and case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(HashMap<String, String>);

/// StaticCredentials implementation block
impl StaticCredentials {
    /// new constructs an empty credential table
    pub fn new() -> Self {
        Self::default()
    }

    /// insert adds a username/password pair to the table
    pub fn insert(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.0.insert(username.into(), password.into());
    }
}

impl CredentialStore for StaticCredentials {
    fn valid(&self, username: &str, password: &str) -> bool {
        match self.0.get(username) {
            Some(expected) => expected == password,
            None => false,
        }
    }
}

impl From<HashMap<String, String>> for StaticCredentials {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticCredentials {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
