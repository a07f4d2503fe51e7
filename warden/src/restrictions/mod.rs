//! Restriction ledger
//!
//! Bans and mutes bound to one identity axis each: account name, device
//! identifier or network address. A session is checked against every axis it
//! has, and expiry is evaluated at query time; expired rows stay in the table.

pub mod duration;

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::db;
use crate::error::{Error, Result};

pub use duration::{format_remaining, parse_duration};

/// Which ledger an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestrictionClass {
    Ban,
    Mute,
}

impl RestrictionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestrictionClass::Ban => "ban",
            RestrictionClass::Mute => "mute",
        }
    }

    /// Sequence that numbers entries of this class
    fn sequence(&self) -> &'static str {
        match self {
            RestrictionClass::Ban => "bans",
            RestrictionClass::Mute => "mutes",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            RestrictionClass::Ban => "banned",
            RestrictionClass::Mute => "muted",
        }
    }
}

impl FromStr for RestrictionClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ban" => Ok(RestrictionClass::Ban),
            "mute" => Ok(RestrictionClass::Mute),
            other => Err(Error::invalid(format!("Unknown restriction class {}", other))),
        }
    }
}

/// Identity axis an entry is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    AccountName,
    Uuid,
    IpAddress,
}

impl IdentifierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::AccountName => "account",
            IdentifierKind::Uuid => "uuid",
            IdentifierKind::IpAddress => "ip",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "account" | "player" | "name" => Ok(IdentifierKind::AccountName),
            "uuid" => Ok(IdentifierKind::Uuid),
            "ip" => Ok(IdentifierKind::IpAddress),
            other => Err(Error::invalid(format!(
                "Unknown identifier type \"{}\"; expected account, uuid or ip",
                other
            ))),
        }
    }
}

/// The identifiers a session can currently be matched on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionIdentities {
    /// Only present once the session has logged in
    pub account_name: Option<String>,
    pub uuid: Option<String>,
    pub ip_address: Option<String>,
}

impl SessionIdentities {
    /// Populated axes in lookup order
    pub fn axes(&self) -> Vec<(IdentifierKind, &str)> {
        [
            (IdentifierKind::AccountName, self.account_name.as_deref()),
            (IdentifierKind::Uuid, self.uuid.as_deref()),
            (IdentifierKind::IpAddress, self.ip_address.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, value)| match value {
            Some(v) if !v.is_empty() => Some((kind, v)),
            _ => None,
        })
        .collect()
    }
}

/// A single ban or mute entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub id: String,
    /// Sequence number shown to users, unique per class
    pub restriction_id: i64,
    pub class: RestrictionClass,
    pub kind: IdentifierKind,
    pub identifier: String,
    pub reason: String,
    pub issuer: String,
    pub created_at: DateTime<Utc>,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Restriction {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|e| e > now)
    }

    /// "Never", "Expired", or the time left as `dd:hh:mm:ss`
    pub fn expiry_display(&self) -> String {
        let now = Utc::now();
        match self.expires_at {
            None => "Never".to_string(),
            Some(at) if at <= now => "Expired".to_string(),
            Some(at) => format_remaining(at - now),
        }
    }

    /// Message shown to the restricted actor
    pub fn notice(&self) -> String {
        let base = format!(
            "#{} - You are {}: {}",
            self.restriction_id,
            self.class.verb(),
            self.reason
        );
        match self.expires_at {
            None => base,
            Some(_) => format!("{} ({} remaining)", base, self.expiry_display()),
        }
    }
}

/// Addresses entries for removal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(i64),
    Identifier(String),
}

impl Selector {
    /// `#12` or a bare number selects by id, anything else by identifier
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let digits = raw.strip_prefix('#').unwrap_or(raw);
        match digits.parse() {
            Ok(id) => Selector::Id(id),
            Err(_) => Selector::Identifier(raw.to_string()),
        }
    }
}

/// Ledger changes, for subscribers such as session hosts
#[derive(Debug, Clone)]
pub enum RestrictionEvent {
    Added(Restriction),
    Removed(Restriction),
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Expiries are stored as unix milliseconds so they compare numerically
fn expiry_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Validate and normalize an identifier for its axis
fn normalize(kind: IdentifierKind, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::invalid(format!("Empty {} identifier", kind)));
    }
    match kind {
        IdentifierKind::IpAddress => value
            .parse::<IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| {
                Error::invalid(format!(
                    "Invalid IP address \"{}\". It should look like this: 127.0.0.1",
                    value
                ))
            }),
        _ => Ok(value.to_string()),
    }
}

/// Persisted ban and mute entries
#[derive(Debug, Clone)]
pub struct RestrictionLedger {
    pool: SqlitePool,
    events: broadcast::Sender<RestrictionEvent>,
}

impl RestrictionLedger {
    pub fn new(pool: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(64);
        Self { pool, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RestrictionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RestrictionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Record a single entry on one axis
    pub async fn add(
        &self,
        class: RestrictionClass,
        kind: IdentifierKind,
        value: &str,
        reason: &str,
        issuer: &str,
        expiry: Option<Duration>,
    ) -> Result<Restriction> {
        let identifier = normalize(kind, value)?;
        let now = Utc::now();
        let expires_at = match expiry {
            Some(span) => Some(
                now.checked_add_signed(span)
                    .ok_or_else(|| Error::invalid("Restriction expiry is out of range"))?,
            ),
            None => None,
        };

        let restriction = Restriction {
            id: uuid::Uuid::new_v4().to_string(),
            restriction_id: db::next_sequence(&self.pool, class.sequence()).await?,
            class,
            kind,
            identifier,
            reason: reason.to_string(),
            issuer: issuer.to_string(),
            created_at: now,
            expires_at,
        };

        sqlx::query(
            "INSERT INTO restrictions (id, restriction_id, class, identifier_kind, identifier, reason, issuer, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&restriction.id)
        .bind(restriction.restriction_id)
        .bind(class.as_str())
        .bind(kind.as_str())
        .bind(&restriction.identifier)
        .bind(&restriction.reason)
        .bind(&restriction.issuer)
        .bind(timestamp(restriction.created_at))
        .bind(restriction.expires_at.map(expiry_millis))
        .execute(&self.pool)
        .await?;

        info!(
            "{} #{} added for {} {} by {}",
            class.as_str(),
            restriction.restriction_id,
            kind,
            restriction.identifier,
            issuer
        );
        self.emit(RestrictionEvent::Added(restriction.clone()));
        Ok(restriction)
    }

    /// One entry per available axis of a session
    ///
    /// If some writes succeed and others fail the caller gets `Inconsistent`;
    /// the written entries are kept.
    pub async fn restrict_session(
        &self,
        class: RestrictionClass,
        identities: &SessionIdentities,
        reason: &str,
        issuer: &str,
        expiry: Option<Duration>,
    ) -> Result<Vec<Restriction>> {
        let axes = identities.axes();
        if axes.is_empty() {
            return Err(Error::invalid("No identifiers available to restrict"));
        }

        let mut written = Vec::new();
        let mut first_error = None;
        let mut failed = 0;
        for (kind, value) in axes {
            match self.add(class, kind, value, reason, issuer, expiry).await {
                Ok(r) => written.push(r),
                Err(e) => {
                    error!("Failed to write {} entry for {} {}: {}", class.as_str(), kind, value, e);
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(written),
            Some(e) if written.is_empty() => Err(e),
            Some(_) => Err(Error::Inconsistent {
                written: written.len(),
                failed,
            }),
        }
    }

    /// First active entry matching any axis of the session
    pub async fn is_restricted(
        &self,
        class: RestrictionClass,
        identities: &SessionIdentities,
    ) -> Result<Option<Restriction>> {
        let axes = identities.axes();
        if axes.is_empty() {
            return Ok(None);
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM restrictions WHERE class = ");
        query.push_bind(class.as_str());
        query.push(" AND (expires_at IS NULL OR expires_at > ");
        query.push_bind(expiry_millis(Utc::now()));
        query.push(") AND (");
        for (i, (kind, value)) in axes.iter().enumerate() {
            if i > 0 {
                query.push(" OR ");
            }
            query.push("(identifier_kind = ");
            query.push_bind(kind.as_str());
            query.push(" AND identifier = ");
            query.push_bind(value.to_string());
            query.push(")");
        }
        query.push(") ORDER BY restriction_id LIMIT 1");

        let row: Option<RestrictionRow> = query
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;
        row.map(RestrictionRow::into_restriction).transpose()
    }

    pub async fn get(&self, class: RestrictionClass, restriction_id: i64) -> Result<Option<Restriction>> {
        let row: Option<RestrictionRow> =
            sqlx::query_as("SELECT * FROM restrictions WHERE class = ? AND restriction_id = ?")
                .bind(class.as_str())
                .bind(restriction_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(RestrictionRow::into_restriction).transpose()
    }

    /// Entries newest first; `page` starts at 1
    pub async fn list(
        &self,
        class: RestrictionClass,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Restriction>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(per_page);
        let rows: Vec<RestrictionRow> = sqlx::query_as(
            "SELECT * FROM restrictions WHERE class = ? ORDER BY restriction_id DESC LIMIT ? OFFSET ?",
        )
        .bind(class.as_str())
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RestrictionRow::into_restriction).collect()
    }

    pub async fn count(&self, class: RestrictionClass) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM restrictions WHERE class = ?")
            .bind(class.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Remove by id, or every entry bound to an identifier on any axis
    pub async fn remove(&self, class: RestrictionClass, selector: &Selector) -> Result<Vec<Restriction>> {
        let rows: Vec<RestrictionRow> = match selector {
            Selector::Id(id) => {
                sqlx::query_as("SELECT * FROM restrictions WHERE class = ? AND restriction_id = ?")
                    .bind(class.as_str())
                    .bind(id)
                    .fetch_all(&self.pool)
                    .await?
            }
            Selector::Identifier(value) => {
                sqlx::query_as("SELECT * FROM restrictions WHERE class = ? AND identifier = ?")
                    .bind(class.as_str())
                    .bind(value)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        if rows.is_empty() {
            let name = match selector {
                Selector::Id(id) => format!("#{}", id),
                Selector::Identifier(v) => v.clone(),
            };
            return Err(Error::not_found(class.as_str(), name));
        }

        let removed: Vec<Restriction> = rows
            .into_iter()
            .map(RestrictionRow::into_restriction)
            .collect::<Result<_>>()?;

        for restriction in &removed {
            sqlx::query("DELETE FROM restrictions WHERE id = ?")
                .bind(&restriction.id)
                .execute(&self.pool)
                .await?;
            warn!(
                "{} #{} on {} {} removed",
                class.as_str(),
                restriction.restriction_id,
                restriction.kind,
                restriction.identifier
            );
            self.emit(RestrictionEvent::Removed(restriction.clone()));
        }

        Ok(removed)
    }
}

/// Row type for SQLite queries
#[derive(sqlx::FromRow)]
struct RestrictionRow {
    id: String,
    restriction_id: i64,
    class: String,
    identifier_kind: String,
    identifier: String,
    reason: String,
    issuer: String,
    created_at: String,
    expires_at: Option<i64>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(anyhow::anyhow!("bad timestamp {}: {}", raw, e)))
}

fn parse_expiry(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Internal(anyhow::anyhow!("bad expiry {}", millis)))
}

impl RestrictionRow {
    fn into_restriction(self) -> Result<Restriction> {
        Ok(Restriction {
            id: self.id,
            restriction_id: self.restriction_id,
            class: self.class.parse()?,
            kind: self.identifier_kind.parse()?,
            identifier: self.identifier,
            reason: self.reason,
            issuer: self.issuer,
            created_at: parse_timestamp(&self.created_at)?,
            expires_at: self.expires_at.map(parse_expiry).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_pool;
    use chrono::Datelike;

    async fn ledger() -> RestrictionLedger {
        RestrictionLedger::new(test_pool().await)
    }

    fn session(name: Option<&str>, uuid: &str, ip: &str) -> SessionIdentities {
        SessionIdentities {
            account_name: name.map(str::to_string),
            uuid: Some(uuid.to_string()),
            ip_address: Some(ip.to_string()),
        }
    }

    #[tokio::test]
    async fn test_account_ban_follows_the_account() {
        let ledger = ledger().await;
        ledger
            .add(RestrictionClass::Ban, IdentifierKind::AccountName, "Bob", "griefing", "admin", None)
            .await
            .unwrap();

        let found = ledger
            .is_restricted(RestrictionClass::Ban, &session(Some("Bob"), "dev-1", "10.0.0.9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.identifier, "Bob");
        assert_eq!(found.notice(), "#1 - You are banned: griefing");

        // Same device before login does not match a name ban
        assert!(ledger
            .is_restricted(RestrictionClass::Ban, &session(None, "dev-1", "10.0.0.9"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_address_ban_catches_every_account() {
        let ledger = ledger().await;
        ledger
            .add(RestrictionClass::Ban, IdentifierKind::IpAddress, " 10.0.0.5 ", "alts", "admin", None)
            .await
            .unwrap();

        for name in [None, Some("carol"), Some("dave")] {
            let found = ledger
                .is_restricted(RestrictionClass::Ban, &session(name, "dev-x", "10.0.0.5"))
                .await
                .unwrap();
            assert!(found.is_some());
        }
    }

    #[tokio::test]
    async fn test_classes_are_separate() {
        let ledger = ledger().await;
        ledger
            .add(RestrictionClass::Mute, IdentifierKind::Uuid, "dev-1", "spam", "admin", None)
            .await
            .unwrap();

        let identities = session(None, "dev-1", "10.0.0.1");
        assert!(ledger
            .is_restricted(RestrictionClass::Ban, &identities)
            .await
            .unwrap()
            .is_none());
        assert!(ledger
            .is_restricted(RestrictionClass::Mute, &identities)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_expired_entries_are_filtered_not_purged() {
        let ledger = ledger().await;
        let entry = ledger
            .add(RestrictionClass::Ban, IdentifierKind::Uuid, "dev-1", "", "admin", Some(Duration::seconds(60)))
            .await
            .unwrap();
        assert!(entry.notice().contains("remaining"));

        sqlx::query("UPDATE restrictions SET expires_at = ? WHERE id = ?")
            .bind(expiry_millis(Utc::now() - Duration::seconds(5)))
            .bind(&entry.id)
            .execute(&ledger.pool)
            .await
            .unwrap();

        assert!(ledger
            .is_restricted(RestrictionClass::Ban, &session(None, "dev-1", "10.0.0.1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(ledger.count(RestrictionClass::Ban).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_ban_beyond_year_9999_stays_active() {
        let ledger = ledger().await;
        let span = crate::restrictions::parse_duration("3000000d").unwrap();
        let entry = ledger
            .add(RestrictionClass::Ban, IdentifierKind::AccountName, "Bob", "forever-ish", "admin", span)
            .await
            .unwrap();
        assert!(entry.expires_at.unwrap().year() > 9999);

        let found = ledger
            .is_restricted(RestrictionClass::Ban, &session(Some("Bob"), "dev-1", "10.0.0.9"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.restriction_id, entry.restriction_id);
        assert!(found.expires_at.unwrap().year() > 9999);
    }

    #[tokio::test]
    async fn test_restrict_session_writes_every_axis() {
        let ledger = ledger().await;
        let written = ledger
            .restrict_session(
                RestrictionClass::Mute,
                &session(Some("bob"), "dev-1", "10.0.0.1"),
                "spam",
                "admin",
                None,
            )
            .await
            .unwrap();
        assert_eq!(written.len(), 3);

        // The address alone is now muted
        let by_ip = SessionIdentities {
            ip_address: Some("10.0.0.1".into()),
            ..SessionIdentities::default()
        };
        assert!(ledger
            .is_restricted(RestrictionClass::Mute, &by_ip)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_restrict_session_reports_partial_failure() {
        let ledger = ledger().await;
        let result = ledger
            .restrict_session(
                RestrictionClass::Ban,
                &session(Some("bob"), "dev-1", "not-an-address"),
                "",
                "admin",
                None,
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::Inconsistent {
                written: 2,
                failed: 1
            })
        ));
        assert_eq!(ledger.count(RestrictionClass::Ban).await.unwrap(), 2);

        let none = ledger
            .restrict_session(RestrictionClass::Ban, &SessionIdentities::default(), "", "admin", None)
            .await;
        assert!(matches!(none, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_remove_by_id_and_value() {
        let ledger = ledger().await;
        let mut events = ledger.subscribe();

        let first = ledger
            .add(RestrictionClass::Ban, IdentifierKind::AccountName, "bob", "", "admin", None)
            .await
            .unwrap();
        ledger
            .add(RestrictionClass::Ban, IdentifierKind::Uuid, "dev-2", "", "admin", None)
            .await
            .unwrap();
        ledger
            .add(RestrictionClass::Ban, IdentifierKind::Uuid, "dev-2", "", "admin", None)
            .await
            .unwrap();

        let removed = ledger
            .remove(RestrictionClass::Ban, &Selector::parse(&format!("#{}", first.restriction_id)))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);

        let removed = ledger
            .remove(RestrictionClass::Ban, &Selector::parse("dev-2"))
            .await
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(ledger.count(RestrictionClass::Ban).await.unwrap(), 0);

        let missing = ledger.remove(RestrictionClass::Ban, &Selector::Id(99)).await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));

        assert!(matches!(events.recv().await.unwrap(), RestrictionEvent::Added(_)));
    }

    #[tokio::test]
    async fn test_list_pages_newest_first() {
        let ledger = ledger().await;
        for i in 0..5 {
            ledger
                .add(RestrictionClass::Ban, IdentifierKind::Uuid, &format!("dev-{}", i), "", "admin", None)
                .await
                .unwrap();
        }

        let page: Vec<i64> = ledger
            .list(RestrictionClass::Ban, 1, 2)
            .await
            .unwrap()
            .iter()
            .map(|r| r.restriction_id)
            .collect();
        assert_eq!(page, vec![5, 4]);

        let last = ledger.list(RestrictionClass::Ban, 3, 2).await.unwrap();
        assert_eq!(last.len(), 1);
        assert!(ledger.get(RestrictionClass::Ban, 3).await.unwrap().is_some());
    }

    #[test]
    fn test_selector_parse() {
        assert_eq!(Selector::parse("#7"), Selector::Id(7));
        assert_eq!(Selector::parse("7"), Selector::Id(7));
        assert_eq!(
            Selector::parse("10.0.0.1"),
            Selector::Identifier("10.0.0.1".into())
        );
    }

    #[test]
    fn test_identifier_kind_parse() {
        assert_eq!("player".parse::<IdentifierKind>().unwrap(), IdentifierKind::AccountName);
        assert_eq!("IP".parse::<IdentifierKind>().unwrap(), IdentifierKind::IpAddress);
        assert!("mac".parse::<IdentifierKind>().is_err());
    }
}
