use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::VansweepError;
use crate::parse::{clean_mileage, clean_price, clean_year};

/// Density / activity classification band for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Medium,
    Low,
}

/// One row of the static postcode-area reference table. Loaded once at
/// startup, read-only thereafter.
#[derive(Debug, Clone)]
pub struct Region {
    pub code: &'static str,
    pub city: &'static str,
    pub region_name: &'static str,
    pub density: Level,
    pub activity: Level,
    pub lat: f64,
    pub lon: f64,
}

/// The external listing sources. The core dispatches on the variant without
/// inspecting site internals — those live behind the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    AutoTrader,
    CarGurus,
    Ebay,
    Gumtree,
    Facebook,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::AutoTrader,
        Source::CarGurus,
        Source::Ebay,
        Source::Gumtree,
        Source::Facebook,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::AutoTrader => "autotrader",
            Source::CarGurus => "cargurus",
            Source::Ebay => "ebay",
            Source::Gumtree => "gumtree",
            Source::Facebook => "facebook",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = VansweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "autotrader" => Ok(Source::AutoTrader),
            "cargurus" => Ok(Source::CarGurus),
            "ebay" => Ok(Source::Ebay),
            "gumtree" => Ok(Source::Gumtree),
            "facebook" => Ok(Source::Facebook),
            other => Err(VansweepError::Config(format!("Unknown source: {other}"))),
        }
    }
}

/// Sale format of a listing. Fixed-price covers "buy it now" and dealer ads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingType {
    Auction,
    FixedPrice,
}

impl ListingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingType::Auction => "auction",
            ListingType::FixedPrice => "fixed_price",
        }
    }
}

impl FromStr for ListingType {
    type Err = VansweepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auction" => Ok(ListingType::Auction),
            "fixed_price" | "buy_it_now" => Ok(ListingType::FixedPrice),
            other => Err(VansweepError::Config(format!(
                "Unknown listing type: {other}"
            ))),
        }
    }
}

/// Unstructured bag returned by an upstream adapter, one per listing card.
/// Normalization into a [`ListingRecord`] happens in the collector path.
#[derive(Debug, Clone, Default)]
pub struct RawListing {
    pub title: String,
    pub price_text: String,
    pub mileage_text: String,
    pub year_text: String,
    pub description: String,
    pub image_url: String,
    pub detail_url: String,
    pub listing_type: Option<ListingType>,
    pub vat_included: Option<bool>,
}

/// A normalized, deduplicatable listing row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRecord {
    pub title: String,
    pub year: Option<i32>,
    pub mileage: Option<i64>,
    pub price: Option<f64>,
    pub description: String,
    pub image_url: String,
    pub url: String,
    pub search_key: String,
    pub source: Source,
    pub listing_type: ListingType,
    pub vat_included: Option<bool>,
    pub scraped_at: DateTime<Utc>,
    /// Derived: current year minus model year, when the year is known.
    pub age: Option<i32>,
}

impl ListingRecord {
    /// Normalize a raw adapter result. Field cleaners are forgiving — a
    /// listing with an unparseable price still gets stored.
    pub fn from_raw(
        raw: RawListing,
        search_key: &str,
        source: Source,
        now: DateTime<Utc>,
    ) -> Self {
        let year = clean_year(&raw.year_text, now.year());
        Self {
            title: raw.title,
            year,
            mileage: clean_mileage(&raw.mileage_text),
            price: clean_price(&raw.price_text),
            description: raw.description,
            image_url: raw.image_url,
            url: raw.detail_url,
            search_key: search_key.to_string(),
            source,
            listing_type: raw.listing_type.unwrap_or(ListingType::FixedPrice),
            vat_included: raw.vat_included,
            scraped_at: now,
            age: year.map(|y| now.year() - y),
        }
    }

    /// Stable identity hash for deduplication. The detail URL is the primary
    /// identifier; listings without one fall back to a field-tuple hash.
    /// Two records with equal identity are the same listing.
    pub fn identity(&self) -> String {
        let mut hasher = Sha256::new();
        if !self.url.is_empty() {
            hasher.update(self.url.as_bytes());
        } else {
            let price = self.price.map(|p| p.to_string()).unwrap_or_default();
            let mileage = self.mileage.map(|m| m.to_string()).unwrap_or_default();
            let year = self.year.map(|y| y.to_string()).unwrap_or_default();
            hasher.update(
                format!(
                    "{}|{}|{}|{}|{}",
                    self.title, price, mileage, year, self.source
                )
                .as_bytes(),
            );
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Derive an identity hash from loose column values, for rows persisted
/// before the unique_id column existed.
pub fn identity_from_fields(
    url: &str,
    title: &str,
    price: &str,
    mileage: &str,
    year: &str,
    source: &str,
) -> String {
    let mut hasher = Sha256::new();
    if !url.is_empty() {
        hasher.update(url.as_bytes());
    } else {
        hasher.update(format!("{title}|{price}|{mileage}|{year}|{source}").as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// One observation of how many records a (key, source) invocation produced.
/// Append-only; never mutated after recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldSample {
    pub search_key: String,
    pub source: Source,
    pub record_count: u32,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(url: &str, title: &str) -> ListingRecord {
        ListingRecord {
            title: title.to_string(),
            year: Some(2018),
            mileage: Some(72_000),
            price: Some(12_500.0),
            description: String::new(),
            image_url: String::new(),
            url: url.to_string(),
            search_key: "M1 1AA".to_string(),
            source: Source::AutoTrader,
            listing_type: ListingType::FixedPrice,
            vat_included: None,
            scraped_at: Utc::now(),
            age: None,
        }
    }

    #[test]
    fn identity_prefers_url() {
        let a = record("http://x/1", "Transit LWB");
        let b = record("http://x/1", "Different title, same ad");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn identity_falls_back_to_field_tuple() {
        let a = record("", "Transit LWB");
        let b = record("", "Transit LWB");
        assert_eq!(a.identity(), b.identity());

        let mut c = record("", "Transit LWB");
        c.price = Some(9_999.0);
        assert_ne!(a.identity(), c.identity());
    }

    #[test]
    fn identity_distinguishes_sources_without_url() {
        let a = record("", "Transit LWB");
        let mut b = record("", "Transit LWB");
        b.source = Source::Gumtree;
        // Same physical listing on two sites stays two records (exact-match
        // dedup only).
        assert_ne!(a.identity(), b.identity());
    }

    #[test]
    fn from_raw_derives_age() {
        let now = Utc::now();
        let raw = RawListing {
            title: "2018 Ford Transit".to_string(),
            year_text: "2018".to_string(),
            ..Default::default()
        };
        let rec = ListingRecord::from_raw(raw, "M1 1AA", Source::Ebay, now);
        assert_eq!(rec.year, Some(2018));
        assert_eq!(rec.age, Some(now.year() - 2018));
    }

    #[test]
    fn source_round_trips_through_str() {
        for source in Source::ALL {
            assert_eq!(source.as_str().parse::<Source>().unwrap(), source);
        }
        assert!("craigslist".parse::<Source>().is_err());
    }
}
