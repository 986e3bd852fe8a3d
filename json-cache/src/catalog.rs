//! Album catalog listing and its cached wire shape.
//!
//! The listing is a JSON array of album records in the order the catalog
//! returned them. Prices travel as decimal strings (`"12.99"`) so no value is
//! rounded through a binary float.

use crate::backend::CacheBackend;
use crate::error::Result;
use crate::store::CacheAside;
use async_trait::async_trait;
use cancellation::CancelSignal;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Cache key of today's album listing.
pub const ALBUMS_OF_TODAY: &str = "albums-of-today";

/// Fixed-point price with two decimal places.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price {
    cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid price '{0}'")]
pub struct PriceParseError(pub String);

impl Price {
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub const fn cents(self) -> i64 {
        self.cents
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || PriceParseError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || fraction.len() > 2 || !all_digits(fraction) {
            return Err(err());
        }

        let whole: i64 = whole.parse().map_err(|_| err())?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| err())? * 10,
            _ => fraction.parse().map_err(|_| err())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(fraction))
            .ok_or_else(err)?;

        Ok(Self::from_cents(if negative { -cents } else { cents }))
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One album as it appears in the cached listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub price: Price,
    pub release_date: NaiveDate,
    pub cover_url: String,
}

/// Serialize a listing to its wire bytes.
pub fn encode_listing(albums: &[AlbumRecord]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(albums)?)
}

/// Parse wire bytes back into a listing, preserving order.
pub fn decode_listing(bytes: &[u8]) -> Result<Vec<AlbumRecord>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// The authoritative album query behind the cache.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn all_albums(&self) -> anyhow::Result<Vec<AlbumRecord>>;
}

/// Cache-aside view of the album listing.
///
/// Writers that change the catalog must call [`invalidate`](Self::invalidate);
/// nothing here watches the catalog for changes.
pub struct CatalogCache<B: ?Sized> {
    store: CacheAside<B>,
    ttl: Option<Duration>,
}

impl<B> CatalogCache<B>
where
    B: CacheBackend + ?Sized,
{
    pub fn new(store: CacheAside<B>, ttl: Option<Duration>) -> Self {
        Self { store, ttl }
    }

    pub fn from_backend(backend: Arc<B>, ttl: Option<Duration>) -> Self {
        Self::new(CacheAside::new(backend), ttl)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Today's listing, from the cache or freshly loaded from `source`.
    pub async fn listing(
        &self,
        source: &dyn CatalogSource,
        cancel: &CancelSignal,
    ) -> Result<Vec<AlbumRecord>> {
        self.store
            .get_or_load(ALBUMS_OF_TODAY, self.ttl, cancel, || source.all_albums())
            .await
    }

    /// Drop the cached listing after a catalog write.
    pub async fn invalidate(&self, cancel: &CancelSignal) -> Result<()> {
        self.store.invalidate(ALBUMS_OF_TODAY, cancel).await?;
        info!("Album listing cache invalidated");
        Ok(())
    }
}
