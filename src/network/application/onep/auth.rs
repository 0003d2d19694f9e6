//! Caller identities and the `auth` block of a request.

use serde::{Serialize, Serializer};

/// Who a call is made as.
///
/// Plain CIKs are the common case. The structured variants scope a CIK to a
/// client or resource it owns; [`Token`](Identity::Token) authenticates with a
/// token obtained from a `grant` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// A bare client key.
    CikOnly(String),
    /// A client key acting as one of its descendant clients.
    CikWithClient {
        /// Owner's client key.
        cik: String,
        /// Resource id of the client being acted as.
        client_id: String,
    },
    /// A client key acting on behalf of the owner of a resource.
    CikWithResource {
        /// Owner's client key.
        cik: String,
        /// Resource id being scoped to.
        resource_id: String,
    },
    /// A granted access token.
    Token(String),
}

impl Identity {
    /// Shorthand for [`Identity::CikOnly`].
    pub fn cik(cik: impl Into<String>) -> Self {
        Identity::CikOnly(cik.into())
    }

    /// Shorthand for [`Identity::Token`].
    pub fn token(token: impl Into<String>) -> Self {
        Identity::Token(token.into())
    }

    /// Canonical string used to key per-identity state such as deferred
    /// queues.
    ///
    /// Bare CIKs pass through unchanged. Structured identities render as
    /// `{field:value,...}` with fields sorted by name, so two equal
    /// identities always share a key.
    pub fn queue_key(&self) -> String {
        match self {
            Identity::CikOnly(cik) => cik.clone(),
            Identity::CikWithClient { cik, client_id } => {
                format!("{{cik:{cik},client_id:{client_id}}}")
            }
            Identity::CikWithResource { cik, resource_id } => {
                format!("{{cik:{cik},resource_id:{resource_id}}}")
            }
            Identity::Token(token) => format!("{{token:{token}}}"),
        }
    }

    /// Resolve the identity that actually goes on the wire.
    ///
    /// Only bare CIKs are affected by a connection scope; structured
    /// identities already say who they are.
    pub fn scoped(&self, scope: &Scope) -> Identity {
        match (self, scope) {
            (Identity::CikOnly(cik), Scope::Client(client_id)) => Identity::CikWithClient {
                cik: cik.clone(),
                client_id: client_id.clone(),
            },
            (Identity::CikOnly(cik), Scope::Owner(resource_id)) => Identity::CikWithResource {
                cik: cik.clone(),
                resource_id: resource_id.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl From<&str> for Identity {
    fn from(cik: &str) -> Self {
        Identity::cik(cik)
    }
}

impl From<String> for Identity {
    fn from(cik: String) -> Self {
        Identity::CikOnly(cik)
    }
}

#[derive(Serialize)]
struct AuthBlock<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    cik: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resource_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<&'a str>,
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut block = AuthBlock {
            cik: None,
            client_id: None,
            resource_id: None,
            token: None,
        };
        match self {
            Identity::CikOnly(cik) => block.cik = Some(cik.as_str()),
            Identity::CikWithClient { cik, client_id } => {
                block.cik = Some(cik.as_str());
                block.client_id = Some(client_id.as_str());
            }
            Identity::CikWithResource { cik, resource_id } => {
                block.cik = Some(cik.as_str());
                block.resource_id = Some(resource_id.as_str());
            }
            Identity::Token(token) => block.token = Some(token.as_str()),
        }
        block.serialize(serializer)
    }
}

/// Connection-wide scoping applied to bare CIKs.
///
/// Set through `connect_as` / `connect_owner` on the client; the two are
/// mutually exclusive, so this is a single value rather than two options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    /// Calls act as the CIK's own client.
    #[default]
    Own,
    /// Calls act as the given descendant client.
    Client(String),
    /// Calls act on behalf of the owner of the given resource.
    Owner(String),
}
