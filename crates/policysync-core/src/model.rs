//! Access policy model.
//!
//! The access policy is owned by the partner platform. Its entries are kept as
//! raw JSON so that anything this crate does not model (server-side fields,
//! categories written by other clients, future authentication methods) is
//! carried through a read-modify-write cycle unchanged. Typed views are
//! decoded on demand in two steps: first an envelope holding the identity and
//! the discriminant, then a dispatch on the discriminant.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The target category this engine creates entries under.
pub const MANAGED_TARGET_CATEGORY: &str = "FQDN/IP";

/// Errors decoding an entry into its typed form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("unknown authentication method \"{0}\"")]
    UnknownMethod(String),

    #[error("unknown principal type \"{0}\"")]
    UnknownPrincipalType(String),

    #[error("invalid {kind} entry: {message}")]
    Invalid { kind: &'static str, message: String },
}

impl ShapeError {
    fn invalid(kind: &'static str, err: impl fmt::Display) -> Self {
        Self::Invalid {
            kind,
            message: err.to_string(),
        }
    }
}

// ==================== Principals ====================

/// Kind of principal granted access by a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PrincipalType {
    User,
    Group,
    Role,
}

impl PrincipalType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Group => "GROUP",
            Self::Role => "ROLE",
        }
    }

    /// Users and groups come from an identity directory; roles do not.
    #[must_use]
    pub fn requires_directory(self) -> bool {
        matches!(self, Self::User | Self::Group)
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrincipalType {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Self::User),
            "GROUP" => Ok(Self::Group),
            "ROLE" => Ok(Self::Role),
            other => Err(ShapeError::UnknownPrincipalType(other.to_string())),
        }
    }
}

/// Identity directory a user or group was synced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDirectory {
    pub id: String,
    pub name: String,
}

/// Non-identity attributes of a principal assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalAttributes {
    pub principal_name: String,
    pub source_directory: Option<SourceDirectory>,
}

/// A principal granted access by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: String,
    pub principal_type: PrincipalType,
    pub principal_name: String,
    pub source_directory: Option<SourceDirectory>,
}

#[derive(Deserialize)]
struct PrincipalWire {
    principal_id: String,
    principal_type: PrincipalType,
    principal_name: String,
    #[serde(default)]
    source_directory_id: Option<String>,
    #[serde(default)]
    source_directory_name: Option<String>,
}

impl Principal {
    #[must_use]
    pub fn new(
        principal_id: impl Into<String>,
        principal_type: PrincipalType,
        principal_name: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_type,
            principal_name: principal_name.into(),
            source_directory: None,
        }
    }

    #[must_use]
    pub fn with_directory(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.source_directory = Some(SourceDirectory {
            id: id.into(),
            name: name.into(),
        });
        self
    }

    /// Returns `true` if this principal has the given identity key.
    #[must_use]
    pub fn has_identity(&self, principal_id: &str, principal_type: PrincipalType) -> bool {
        self.principal_id == principal_id && self.principal_type == principal_type
    }

    #[must_use]
    pub fn attributes(&self) -> PrincipalAttributes {
        PrincipalAttributes {
            principal_name: self.principal_name.clone(),
            source_directory: self.source_directory.clone(),
        }
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: PrincipalAttributes) -> Self {
        self.principal_name = attributes.principal_name;
        self.source_directory = attributes.source_directory;
        self
    }

    /// Checks cross-field requirements the backend would otherwise reject.
    pub fn validate(&self) -> Result<(), String> {
        if self.principal_id.is_empty() {
            return Err("principal_id must not be empty".into());
        }
        if self.principal_type.requires_directory() && self.source_directory.is_none() {
            return Err(format!(
                "source directory id and name are required for principal type {}",
                self.principal_type
            ));
        }
        Ok(())
    }

    /// Decodes a raw principal entry.
    pub fn from_entry(entry: &Value) -> Result<Self, ShapeError> {
        let wire: PrincipalWire = serde_json::from_value(entry.clone())
            .map_err(|e| ShapeError::invalid("principal", e))?;
        let source_directory = match (wire.source_directory_id, wire.source_directory_name) {
            (Some(id), Some(name)) => Some(SourceDirectory { id, name }),
            _ => None,
        };
        Ok(Self {
            principal_id: wire.principal_id,
            principal_type: wire.principal_type,
            principal_name: wire.principal_name,
            source_directory,
        })
    }

    /// Encodes the principal as a raw entry.
    #[must_use]
    pub fn to_entry(&self) -> Value {
        let mut entry = json!({
            "principal_id": self.principal_id,
            "principal_type": self.principal_type.as_str(),
            "principal_name": self.principal_name,
        });
        if let (Some(dir), Value::Object(obj)) = (&self.source_directory, &mut entry) {
            obj.insert("source_directory_id".into(), json!(dir.id));
            obj.insert("source_directory_name".into(), json!(dir.name));
        }
        entry
    }
}

/// Identity fields of a raw principal entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrincipalEnvelope {
    pub principal_id: String,
    pub principal_type: String,
}

impl PrincipalEnvelope {
    pub fn from_entry(entry: &Value) -> Result<Self, ShapeError> {
        Self::deserialize(entry).map_err(|e| ShapeError::invalid("principal", e))
    }

    #[must_use]
    pub fn matches(&self, principal_id: &str, principal_type: PrincipalType) -> bool {
        self.principal_id == principal_id && self.principal_type == principal_type.as_str()
    }
}

/// Keys of a principal entry that the engine manages on update.
pub const PRINCIPAL_ATTRIBUTE_KEYS: &[&str] = &[
    "principal_name",
    "source_directory_id",
    "source_directory_name",
];

// ==================== Targets ====================

/// How a principal authenticates against a database target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    DbAuth,
    EphemeralUser,
    PasswordVault,
    IamToken,
    Kerberos,
    ClientCertificate,
}

impl AuthMethod {
    pub const ALL: [Self; 6] = [
        Self::DbAuth,
        Self::EphemeralUser,
        Self::PasswordVault,
        Self::IamToken,
        Self::Kerberos,
        Self::ClientCertificate,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DbAuth => "db_auth",
            Self::EphemeralUser => "ephemeral_user",
            Self::PasswordVault => "password_vault",
            Self::IamToken => "iam_token",
            Self::Kerberos => "kerberos",
            Self::ClientCertificate => "client_certificate",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ShapeError::UnknownMethod(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbAuthProfile {
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EphemeralUserProfile {
    pub roles: Vec<String>,
    #[serde(default)]
    pub schemas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordVaultProfile {
    pub vault_id: String,
    pub secret_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamTokenProfile {
    pub iam_role: String,
    pub db_user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KerberosProfile {
    pub realm: String,
    pub service_principal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCertificateProfile {
    pub certificate_id: String,
    pub username: String,
}

/// Method-specific authentication profile. The variant is the discriminant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProfile {
    DbAuth(DbAuthProfile),
    EphemeralUser(EphemeralUserProfile),
    PasswordVault(PasswordVaultProfile),
    IamToken(IamTokenProfile),
    Kerberos(KerberosProfile),
    ClientCertificate(ClientCertificateProfile),
}

impl AuthProfile {
    #[must_use]
    pub fn method(&self) -> AuthMethod {
        match self {
            Self::DbAuth(_) => AuthMethod::DbAuth,
            Self::EphemeralUser(_) => AuthMethod::EphemeralUser,
            Self::PasswordVault(_) => AuthMethod::PasswordVault,
            Self::IamToken(_) => AuthMethod::IamToken,
            Self::Kerberos(_) => AuthMethod::Kerberos,
            Self::ClientCertificate(_) => AuthMethod::ClientCertificate,
        }
    }

    /// Decodes the profile body for an already-parsed method.
    pub fn decode(method: AuthMethod, profile: &Value) -> Result<Self, ShapeError> {
        fn body<T: serde::de::DeserializeOwned>(profile: &Value) -> Result<T, ShapeError> {
            T::deserialize(profile).map_err(|e| ShapeError::invalid("authentication profile", e))
        }
        Ok(match method {
            AuthMethod::DbAuth => Self::DbAuth(body(profile)?),
            AuthMethod::EphemeralUser => Self::EphemeralUser(body(profile)?),
            AuthMethod::PasswordVault => Self::PasswordVault(body(profile)?),
            AuthMethod::IamToken => Self::IamToken(body(profile)?),
            AuthMethod::Kerberos => Self::Kerberos(body(profile)?),
            AuthMethod::ClientCertificate => Self::ClientCertificate(body(profile)?),
        })
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::DbAuth(p) => json!({ "roles": p.roles }),
            Self::EphemeralUser(p) => json!({ "roles": p.roles, "schemas": p.schemas }),
            Self::PasswordVault(p) => {
                json!({ "vault_id": p.vault_id, "secret_path": p.secret_path })
            }
            Self::IamToken(p) => json!({ "iam_role": p.iam_role, "db_user": p.db_user }),
            Self::Kerberos(p) => {
                json!({ "realm": p.realm, "service_principal": p.service_principal })
            }
            Self::ClientCertificate(p) => {
                json!({ "certificate_id": p.certificate_id, "username": p.username })
            }
        }
    }
}

/// Identity and discriminant of a raw target entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TargetEnvelope {
    pub workspace: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub profile: Value,
}

impl TargetEnvelope {
    pub fn from_entry(entry: &Value) -> Result<Self, ShapeError> {
        Self::deserialize(entry).map_err(|e| ShapeError::invalid("target", e))
    }
}

/// A database target granted by a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub workspace_id: String,
    pub profile: AuthProfile,
}

impl Target {
    #[must_use]
    pub fn new(workspace_id: impl Into<String>, profile: AuthProfile) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            profile,
        }
    }

    #[must_use]
    pub fn method(&self) -> AuthMethod {
        self.profile.method()
    }

    /// Decodes a raw target entry: envelope first, then dispatch on `method`.
    pub fn from_entry(entry: &Value) -> Result<Self, ShapeError> {
        let envelope = TargetEnvelope::from_entry(entry)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: TargetEnvelope) -> Result<Self, ShapeError> {
        let raw_method = envelope.method.ok_or_else(|| ShapeError::Invalid {
            kind: "target",
            message: "missing field `method`".into(),
        })?;
        let method = raw_method.parse::<AuthMethod>()?;
        let profile = AuthProfile::decode(method, &envelope.profile)?;
        Ok(Self {
            workspace_id: envelope.workspace,
            profile,
        })
    }

    #[must_use]
    pub fn to_entry(&self) -> Value {
        json!({
            "workspace": self.workspace_id,
            "method": self.method().as_str(),
            "profile": self.profile.to_value(),
        })
    }
}

/// Keys of a target entry that the engine manages on update.
pub const TARGET_ATTRIBUTE_KEYS: &[&str] = &["method", "profile"];

// ==================== Policy ====================

/// An access policy as returned by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPolicy {
    pub id: String,
    #[serde(default)]
    pub principals: Vec<Value>,
    #[serde(default)]
    pub targets: IndexMap<String, Vec<Value>>,
    /// Every other field, in server order.
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl AccessPolicy {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            principals: Vec::new(),
            targets: IndexMap::new(),
            metadata: Map::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_principal(mut self, entry: Value) -> Self {
        self.principals.push(entry);
        self
    }

    #[must_use]
    pub fn with_target(mut self, category: impl Into<String>, entry: Value) -> Self {
        self.targets.entry(category.into()).or_default().push(entry);
        self
    }
}

/// Body of a whole-object replace call.
///
/// `targets` holds at most one category: the backend rejects requests that
/// mention more than one, and leaves omitted categories as they are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacePayload {
    pub id: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
    pub principals: Vec<Value>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub targets: IndexMap<String, Vec<Value>>,
}

impl ReplacePayload {
    /// The single category written by this payload, if any.
    #[must_use]
    pub fn written_category(&self) -> Option<&str> {
        self.targets.keys().next().map(String::as_str)
    }
}
