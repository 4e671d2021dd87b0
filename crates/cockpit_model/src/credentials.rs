use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Ssh,
    Tacacs,
    Generic,
    Token,
    SshKey,
}

impl CredentialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::Ssh => "ssh",
            CredentialKind::Tacacs => "tacacs",
            CredentialKind::Generic => "generic",
            CredentialKind::Token => "token",
            CredentialKind::SshKey => "ssh_key",
        }
    }
}

impl FromStr for CredentialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ssh" => Ok(CredentialKind::Ssh),
            "tacacs" => Ok(CredentialKind::Tacacs),
            "generic" => Ok(CredentialKind::Generic),
            "token" => Ok(CredentialKind::Token),
            "ssh_key" => Ok(CredentialKind::SshKey),
            other => Err(format!("unknown credential kind '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Expiring,
    Expired,
}

/// Stored credential. Secret fields hold vault tokens, never plaintext.
/// `(name, source)` is unique; `source` is either "general" or the owning
/// username for private credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: i64,
    pub name: String,
    pub source: String,
    pub username: String,
    pub kind: CredentialKind,
    #[serde(default)]
    pub password_encrypted: Option<String>,
    #[serde(default)]
    pub ssh_key_encrypted: Option<String>,
    #[serde(default)]
    pub passphrase_encrypted: Option<String>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    /// active | expiring (within 7 days) | expired, derived from valid_until.
    pub fn status_on(&self, today: NaiveDate) -> CredentialStatus {
        match self.valid_until {
            None => CredentialStatus::Active,
            Some(until) if until < today => CredentialStatus::Expired,
            Some(until) if (until - today).num_days() <= 7 => CredentialStatus::Expiring,
            Some(_) => CredentialStatus::Active,
        }
    }

    pub fn status(&self) -> CredentialStatus {
        self.status_on(Utc::now().date_naive())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("source", &self.source)
            .field("username", &self.username)
            .field("kind", &self.kind)
            .field("password_encrypted", &"******")
            .field("ssh_key_encrypted", &"******")
            .field("passphrase_encrypted", &"******")
            .field("valid_until", &self.valid_until)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(valid_until: Option<NaiveDate>) -> CredentialRecord {
        CredentialRecord {
            id: 1,
            name: "lab".into(),
            source: "general".into(),
            username: "svc".into(),
            kind: CredentialKind::Ssh,
            password_encrypted: Some("AQ...".into()),
            ssh_key_encrypted: None,
            passphrase_encrypted: None,
            valid_until,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn status_derivation() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(record(None).status_on(today), CredentialStatus::Active);
        assert_eq!(
            record(NaiveDate::from_ymd_opt(2025, 6, 14)).status_on(today),
            CredentialStatus::Expired
        );
        assert_eq!(
            record(NaiveDate::from_ymd_opt(2025, 6, 20)).status_on(today),
            CredentialStatus::Expiring
        );
        assert_eq!(
            record(NaiveDate::from_ymd_opt(2025, 7, 20)).status_on(today),
            CredentialStatus::Active
        );
        // Boundary: exactly 7 days out is still expiring.
        assert_eq!(
            record(NaiveDate::from_ymd_opt(2025, 6, 22)).status_on(today),
            CredentialStatus::Expiring
        );
    }

    #[test]
    fn debug_never_prints_ciphertext() {
        let rendered = format!("{:?}", record(None));
        assert!(!rendered.contains("AQ..."));
    }
}
