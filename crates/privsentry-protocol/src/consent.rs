//! Consent check stage: per-user, per-PII-type grants.
//!
//! Lookups go to the primary consent store first and fall back to the
//! built-in table. A type with no record for a known user is denied, and a
//! failed lookup is also a denial.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use privsentry_core::config::validate_identifier;
use privsentry_core::{Error, Fallback, PiiType, PiiTypeSet, Result, Tier};

/// A single consent grant or denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub granted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

impl ConsentRecord {
    pub fn granted() -> Self {
        Self {
            granted: true,
            valid_until: None,
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            valid_until: None,
        }
    }

    /// A grant counts only while it has not expired.
    pub fn is_effective_at(&self, now: DateTime<Utc>) -> bool {
        self.granted && self.valid_until.map_or(true, |until| now < until)
    }
}

pub type UserConsents = HashMap<PiiType, ConsentRecord>;

/// Source of consent records keyed by user.
pub trait ConsentStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// All records for `user_id`, or `None` if the store does not know the user.
    fn get(&self, user_id: &str) -> Result<Option<UserConsents>>;
}

/// Primary consent store: one row per (user, PII type).
pub struct SqliteConsentStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteConsentStore {
    pub fn open(db_path: impl AsRef<Path>, table: &str) -> Result<Self> {
        let table = validate_identifier(table)?.to_string();
        let conn = Connection::open(db_path.as_ref()).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                user_id TEXT NOT NULL,
                pii_type TEXT NOT NULL,
                granted INTEGER NOT NULL,
                valid_until TEXT,
                PRIMARY KEY (user_id, pii_type)
            );"
        ))
        .map_err(|e| Error::Database(e.to_string()))?;
        info!(
            "Consent store opened: {} (table {})",
            db_path.as_ref().display(),
            table
        );
        Ok(Self {
            conn: Mutex::new(conn),
            table,
        })
    }

    pub fn upsert(&self, user_id: &str, pii_type: PiiType, record: &ConsentRecord) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (user_id, pii_type, granted, valid_until) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, pii_type) DO UPDATE SET
                    granted = excluded.granted, valid_until = excluded.valid_until",
                self.table
            ),
            params![
                user_id,
                pii_type.label(),
                record.granted,
                record.valid_until.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}

impl ConsentStore for SqliteConsentStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, user_id: &str) -> Result<Option<UserConsents>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT pii_type, granted, valid_until FROM {} WHERE user_id = ?1",
                self.table
            ))
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut consents = UserConsents::new();
        let mut seen = false;
        for row in rows {
            let (label, granted, valid_until) = row.map_err(|e| Error::Database(e.to_string()))?;
            seen = true;
            let Ok(pii_type) = label.parse::<PiiType>() else {
                debug!("Ignoring consent row with unknown type {}", label);
                continue;
            };
            let record = match valid_until {
                None => ConsentRecord {
                    granted,
                    valid_until: None,
                },
                Some(raw) => match DateTime::parse_from_rfc3339(&raw) {
                    Ok(t) => ConsentRecord {
                        granted,
                        valid_until: Some(t.with_timezone(&Utc)),
                    },
                    // Unreadable expiry: treat as lapsed
                    Err(_) => ConsentRecord::denied(),
                },
            };
            consents.insert(pii_type, record);
        }

        Ok(seen.then_some(consents))
    }
}

/// Built-in consent table, used when the primary store is unavailable.
#[derive(Default)]
pub struct LocalConsentTable {
    users: RwLock<HashMap<String, UserConsents>>,
}

impl LocalConsentTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The default table: `user123` consents to names and emails only.
    pub fn with_defaults() -> Self {
        let table = Self::empty();
        for pii_type in PiiType::all() {
            let granted = matches!(pii_type, PiiType::EmailAddress | PiiType::PersonName);
            table.insert(
                "user123",
                *pii_type,
                if granted {
                    ConsentRecord::granted()
                } else {
                    ConsentRecord::denied()
                },
            );
        }
        table
    }

    pub fn insert(&self, user_id: &str, pii_type: PiiType, record: ConsentRecord) {
        self.users
            .write()
            .entry(user_id.to_string())
            .or_default()
            .insert(pii_type, record);
    }

    pub fn grant(&self, user_id: &str, pii_type: PiiType) {
        self.insert(user_id, pii_type, ConsentRecord::granted());
    }
}

impl ConsentStore for LocalConsentTable {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn get(&self, user_id: &str) -> Result<Option<UserConsents>> {
        Ok(self.users.read().get(user_id).cloned())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsentOutcome {
    pub consent_results: BTreeMap<PiiType, bool>,
    pub status: &'static str,
    pub source: Tier,
}

/// Answer to a single (user, type) verification.
#[derive(Debug, Clone, Serialize)]
pub struct ConsentVerdict {
    pub user_id: String,
    pub data_type: PiiType,
    pub has_consent: bool,
    pub source: Tier,
    pub message: String,
}

pub struct ConsentChecker {
    stores: Fallback<dyn ConsentStore>,
}

impl ConsentChecker {
    pub fn new(stores: Fallback<dyn ConsentStore>) -> Self {
        Self { stores }
    }

    /// Built-in table only.
    pub fn local() -> Self {
        Self::new(Fallback::local(
            "consent",
            Arc::new(LocalConsentTable::with_defaults()),
        ))
    }

    pub fn stores(&self) -> &Fallback<dyn ConsentStore> {
        &self.stores
    }

    /// Look up consent for every finding. Unknown users and types are denied.
    pub fn check(&self, user_id: &str, findings: &PiiTypeSet) -> Result<ConsentOutcome> {
        if user_id.trim().is_empty() {
            return Err(Error::MissingInput("user_id".into()));
        }
        if findings.is_empty() {
            return Err(Error::MissingInput("pii_findings".into()));
        }

        let (consents, source) = self.lookup(user_id);
        let now = Utc::now();
        let consent_results = findings
            .iter()
            .map(|t| {
                let granted = consents
                    .as_ref()
                    .and_then(|c| c.get(t))
                    .map_or(false, |r| r.is_effective_at(now));
                (*t, granted)
            })
            .collect::<BTreeMap<_, _>>();
        info!("Consent for {}: {:?} via {:?}", user_id, consent_results, source);

        Ok(ConsentOutcome {
            consent_results,
            status: "verified",
            source,
        })
    }

    pub fn verify(&self, user_id: &str, pii_type: PiiType) -> Result<ConsentVerdict> {
        let outcome = self.check(user_id, &[pii_type].into())?;
        let has_consent = outcome.consent_results.get(&pii_type).copied().unwrap_or(false);
        let message = if has_consent {
            format!("User {} has consented to {} processing", user_id, pii_type)
        } else {
            format!("User {} has not consented to {} processing", user_id, pii_type)
        };
        Ok(ConsentVerdict {
            user_id: user_id.to_string(),
            data_type: pii_type,
            has_consent,
            source: outcome.source,
            message,
        })
    }

    fn lookup(&self, user_id: &str) -> (Option<UserConsents>, Tier) {
        match self.stores.first_some(|store| store.get(user_id)) {
            Ok(found) => found,
            Err(e) => {
                warn!("Consent lookup for {} failed: {}. Denying.", user_id, e);
                (None, Tier::Fallback)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct Unreachable;

    impl ConsentStore for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn get(&self, _: &str) -> Result<Option<UserConsents>> {
            Err(Error::Unavailable("consent store offline".into()))
        }
    }

    fn set(types: &[PiiType]) -> PiiTypeSet {
        types.iter().copied().collect()
    }

    #[test]
    fn test_builtin_defaults() {
        let checker = ConsentChecker::local();
        let outcome = checker
            .check(
                "user123",
                &set(&[PiiType::EmailAddress, PiiType::PhoneNumber, PiiType::PersonName]),
            )
            .unwrap();
        assert_eq!(outcome.status, "verified");
        assert!(outcome.consent_results[&PiiType::EmailAddress]);
        assert!(outcome.consent_results[&PiiType::PersonName]);
        assert!(!outcome.consent_results[&PiiType::PhoneNumber]);
        assert_eq!(outcome.source, Tier::Fallback);
    }

    #[test]
    fn test_unknown_user_denied() {
        let outcome = ConsentChecker::local()
            .check("nobody", &set(&[PiiType::EmailAddress]))
            .unwrap();
        assert!(!outcome.consent_results[&PiiType::EmailAddress]);
    }

    #[test]
    fn test_unreachable_primary_without_fallback_entry() {
        let checker = ConsentChecker::new(Fallback::new(
            "consent",
            Some(Arc::new(Unreachable)),
            Arc::new(LocalConsentTable::with_defaults()),
        ));
        let outcome = checker.check("u2", &set(&[PiiType::UsSsn])).unwrap();
        assert_eq!(outcome.consent_results.len(), 1);
        assert!(!outcome.consent_results[&PiiType::UsSsn]);
    }

    #[test]
    fn test_missing_inputs() {
        let checker = ConsentChecker::local();
        assert!(matches!(
            checker.check("", &set(&[PiiType::EmailAddress])),
            Err(Error::MissingInput(_))
        ));
        assert!(matches!(
            checker.check("user123", &PiiTypeSet::new()),
            Err(Error::MissingInput(_))
        ));
    }

    #[test]
    fn test_expired_grant_denied() {
        let now = Utc::now();
        let record = ConsentRecord {
            granted: true,
            valid_until: Some(now - Duration::minutes(1)),
        };
        assert!(!record.is_effective_at(now));
        assert!(ConsentRecord::granted().is_effective_at(now));
        assert!(!ConsentRecord::denied().is_effective_at(now));
    }

    #[test]
    fn test_sqlite_primary_answers() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteConsentStore::open(dir.path().join("consents.db"), "user_consents").unwrap();
        store
            .upsert("u9", PiiType::PhoneNumber, &ConsentRecord::granted())
            .unwrap();
        store
            .upsert("u9", PiiType::UsSsn, &ConsentRecord::granted())
            .unwrap();
        store
            .upsert("u9", PiiType::UsSsn, &ConsentRecord::denied())
            .unwrap();

        let checker = ConsentChecker::new(Fallback::new(
            "consent",
            Some(Arc::new(store)),
            Arc::new(LocalConsentTable::with_defaults()),
        ));
        let outcome = checker
            .check("u9", &set(&[PiiType::PhoneNumber, PiiType::UsSsn, PiiType::EmailAddress]))
            .unwrap();
        assert_eq!(outcome.source, Tier::Primary);
        assert!(outcome.consent_results[&PiiType::PhoneNumber]);
        assert!(!outcome.consent_results[&PiiType::UsSsn]);
        assert!(!outcome.consent_results[&PiiType::EmailAddress]);

        // Users the primary does not know fall through to the built-in table
        let outcome = checker.check("user123", &set(&[PiiType::EmailAddress])).unwrap();
        assert_eq!(outcome.source, Tier::Fallback);
        assert!(outcome.consent_results[&PiiType::EmailAddress]);
    }

    #[test]
    fn test_sqlite_expiry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteConsentStore::open(dir.path().join("consents.db"), "user_consents").unwrap();
        let now = Utc::now();
        let future = now + Duration::days(30);
        store
            .upsert(
                "u7",
                PiiType::EmailAddress,
                &ConsentRecord {
                    granted: true,
                    valid_until: Some(now - Duration::days(1)),
                },
            )
            .unwrap();
        store
            .upsert(
                "u7",
                PiiType::PhoneNumber,
                &ConsentRecord {
                    granted: true,
                    valid_until: Some(future),
                },
            )
            .unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO user_consents (user_id, pii_type, granted, valid_until)
                 VALUES ('u7', 'US_SSN', 1, 'not-a-date')",
                [],
            )
            .unwrap();

        let records = store.get("u7").unwrap().unwrap();
        assert_eq!(
            records[&PiiType::PhoneNumber].valid_until.map(|t| t.timestamp()),
            Some(future.timestamp())
        );
        assert_eq!(records[&PiiType::UsSsn], ConsentRecord::denied());

        let checker = ConsentChecker::new(Fallback::new(
            "consent",
            Some(Arc::new(store)),
            Arc::new(LocalConsentTable::empty()),
        ));
        let outcome = checker
            .check("u7", &set(&[PiiType::EmailAddress, PiiType::PhoneNumber, PiiType::UsSsn]))
            .unwrap();
        assert_eq!(outcome.source, Tier::Primary);
        assert!(!outcome.consent_results[&PiiType::EmailAddress]);
        assert!(outcome.consent_results[&PiiType::PhoneNumber]);
        assert!(!outcome.consent_results[&PiiType::UsSsn]);
    }

    #[test]
    fn test_sqlite_rejects_bad_table_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SqliteConsentStore::open(dir.path().join("c.db"), "x; DROP TABLE y").is_err());
    }

    #[test]
    fn test_verify_message() {
        let verdict = ConsentChecker::local()
            .verify("user123", PiiType::CreditCardNumber)
            .unwrap();
        assert!(!verdict.has_consent);
        assert!(verdict.message.contains("has not consented"));
    }
}
