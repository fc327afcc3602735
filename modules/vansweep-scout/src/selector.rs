//! Turns (strategy, limit, geo filter) into an ordered list of concrete
//! search keys, ranked by historical effectiveness plus static
//! activity/density bonuses.
//!
//! Ordering discipline: candidates are ranked first, expanded into full
//! postcodes, truncated to the limit, and only then shuffled for
//! request-order diversity. Shuffling before truncation would defeat the
//! ranking entirely.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use vansweep_common::parse::{area_code, format_postcode};
use vansweep_common::{Level, Region, VansweepError};

/// Key-selection strategy. `Custom` short-circuits the reference table.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// High population density regions only.
    Density,
    /// High commercial activity regions only.
    Activity,
    /// Up to 3 regions per distinct region name, best first.
    GeographicSpread,
    /// Every region.
    Mixed,
    /// Caller-supplied keys, used verbatim (after formatting).
    Custom(Vec<String>),
}

impl Strategy {
    /// Parse a CLI strategy name. Custom keys ride alongside the name.
    pub fn parse(name: &str, custom_keys: &[String]) -> Result<Self, VansweepError> {
        match name.trim().to_lowercase().as_str() {
            "density" => Ok(Strategy::Density),
            "activity" => Ok(Strategy::Activity),
            "geographic-spread" | "geographic_spread" => Ok(Strategy::GeographicSpread),
            "mixed" => Ok(Strategy::Mixed),
            "custom" => {
                if custom_keys.is_empty() {
                    Err(VansweepError::MissingCustomKeys)
                } else {
                    Ok(Strategy::Custom(custom_keys.to_vec()))
                }
            }
            other => Err(VansweepError::InvalidStrategy(other.to_string())),
        }
    }
}

/// Keep only regions within `radius_km` of the center key's region.
#[derive(Debug, Clone)]
pub struct GeoFilter {
    pub center: String,
    pub radius_km: f64,
}

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two (lat, lon) points in kilometres.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Inward-code suffixes cycled during key expansion. Deterministic, so the
/// same ranked areas always expand to the same keys.
fn suffix_template() -> Vec<String> {
    const DIGITS: [char; 10] = ['1', '2', '3', '4', '5', '6', '7', '8', '9', '0'];
    const PAIRS: [&str; 10] = ["AA", "AB", "AD", "AE", "AF", "AG", "AH", "AJ", "AL", "AN"];
    DIGITS
        .iter()
        .flat_map(|d| PAIRS.iter().map(move |p| format!("{d}{p}")))
        .collect()
}

pub struct KeySelector {
    regions: Vec<Region>,
    used: HashSet<String>,
    rng: StdRng,
}

impl KeySelector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self::with_rng(regions, StdRng::from_os_rng())
    }

    /// Deterministic selector for tests.
    pub fn with_seed(regions: Vec<Region>, seed: u64) -> Self {
        Self::with_rng(regions, StdRng::seed_from_u64(seed))
    }

    fn with_rng(regions: Vec<Region>, rng: StdRng) -> Self {
        Self {
            regions,
            used: HashSet::new(),
            rng,
        }
    }

    /// Produce up to `limit` search keys. `scores` maps area codes to
    /// persisted effectiveness; unknown areas default to 0.5 (neutral).
    pub fn select(
        &mut self,
        strategy: &Strategy,
        limit: usize,
        exclude_used: bool,
        scores: &HashMap<String, f64>,
        geo: Option<&GeoFilter>,
    ) -> Result<Vec<String>, VansweepError> {
        if let Strategy::Custom(keys) = strategy {
            if keys.is_empty() {
                return Err(VansweepError::MissingCustomKeys);
            }
            return Ok(keys.iter().take(limit).map(|k| format_postcode(k)).collect());
        }

        let mut candidates = self.filter_by_strategy(strategy);

        if let Some(geo) = geo {
            candidates = self.filter_by_geography(candidates, geo);
        }

        if let Strategy::GeographicSpread = strategy {
            candidates = spread_by_region_name(candidates);
        }

        rank_by_effectiveness(&mut candidates, scores);
        debug!(
            strategy = ?strategy,
            candidates = candidates.len(),
            "Ranked candidate regions"
        );

        let mut keys = self.expand(&candidates, limit, exclude_used);
        keys.shuffle(&mut self.rng);

        if exclude_used {
            self.used.extend(keys.iter().cloned());
        }
        Ok(keys)
    }

    /// Keys handed out so far this session.
    pub fn consumed(&self) -> usize {
        self.used.len()
    }

    fn filter_by_strategy(&self, strategy: &Strategy) -> Vec<Region> {
        self.regions
            .iter()
            .filter(|r| match strategy {
                Strategy::Density => r.density == Level::High,
                Strategy::Activity => r.activity == Level::High,
                Strategy::GeographicSpread | Strategy::Mixed => true,
                Strategy::Custom(_) => unreachable!("custom handled above"),
            })
            .cloned()
            .collect()
    }

    fn filter_by_geography(&self, candidates: Vec<Region>, geo: &GeoFilter) -> Vec<Region> {
        let center_code = area_code(&geo.center);
        let center = match self.regions.iter().find(|r| r.code == center_code) {
            Some(region) => (region.lat, region.lon),
            None => {
                warn!(center = %geo.center, "Center key not in reference table, skipping geographic filter");
                return candidates;
            }
        };

        candidates
            .into_iter()
            .filter(|r| haversine_km(center, (r.lat, r.lon)) <= geo.radius_km)
            .collect()
    }

    /// Cycle ranked areas against the suffix template until `limit` keys
    /// exist, skipping keys already consumed this session.
    fn expand(&self, ranked: &[Region], limit: usize, exclude_used: bool) -> Vec<String> {
        if ranked.is_empty() || limit == 0 {
            return Vec::new();
        }
        let suffixes = suffix_template();
        let mut keys = Vec::with_capacity(limit);
        let mut seen = HashSet::new();

        for i in 0..ranked.len() * suffixes.len() {
            if keys.len() >= limit {
                break;
            }
            let key = format!(
                "{} {}",
                ranked[i % ranked.len()].code,
                suffixes[i % suffixes.len()]
            );
            if exclude_used && self.used.contains(&key) {
                continue;
            }
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        keys
    }
}

/// Stable descending sort by persisted score plus static bonuses.
fn rank_by_effectiveness(candidates: &mut [Region], scores: &HashMap<String, f64>) {
    let score = |r: &Region| -> f64 {
        let base = scores.get(r.code).copied().unwrap_or(0.5);
        let activity_bonus = match r.activity {
            Level::High => 0.3,
            Level::Medium => 0.1,
            Level::Low => 0.0,
        };
        let density_bonus = match r.density {
            Level::High => 0.2,
            Level::Medium => 0.1,
            Level::Low => 0.0,
        };
        base + activity_bonus + density_bonus
    };
    candidates.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Up to 3 regions per distinct region name, preferring high activity then
/// high density within each group.
fn spread_by_region_name(candidates: Vec<Region>) -> Vec<Region> {
    let mut groups: BTreeMap<&'static str, Vec<Region>> = BTreeMap::new();
    for region in candidates {
        groups.entry(region.region_name).or_default().push(region);
    }

    let mut spread = Vec::new();
    for (_, mut group) in groups {
        group.sort_by_key(|r| {
            (
                r.activity != Level::High,
                r.density != Level::High,
            )
        });
        spread.extend(group.into_iter().take(3));
    }
    spread
}

#[cfg(test)]
mod tests {
    use super::*;
    use vansweep_common::Level::{High, Low, Medium};

    fn region(
        code: &'static str,
        name: &'static str,
        density: Level,
        activity: Level,
        lat: f64,
        lon: f64,
    ) -> Region {
        Region {
            code,
            city: code,
            region_name: name,
            density,
            activity,
            lat,
            lon,
        }
    }

    fn no_scores() -> HashMap<String, f64> {
        HashMap::new()
    }

    #[test]
    fn activity_strategy_returns_only_high_activity_expansions() {
        // A: high activity, low density. B: low activity, high density.
        let regions = vec![
            region("AA1", "North", Low, High, 53.0, -1.0),
            region("BB1", "South", High, Low, 51.0, -1.0),
        ];
        let mut selector = KeySelector::with_seed(regions, 7);
        let keys = selector
            .select(&Strategy::Activity, 10, false, &no_scores(), None)
            .unwrap();

        assert_eq!(keys.len(), 10);
        assert!(keys.iter().all(|k| k.starts_with("AA1 ")));
    }

    #[test]
    fn density_strategy_filters_on_density() {
        let regions = vec![
            region("AA1", "North", Low, High, 53.0, -1.0),
            region("BB1", "South", High, Low, 51.0, -1.0),
        ];
        let mut selector = KeySelector::with_seed(regions, 7);
        let keys = selector
            .select(&Strategy::Density, 5, false, &no_scores(), None)
            .unwrap();
        assert!(keys.iter().all(|k| k.starts_with("BB1 ")));
    }

    #[test]
    fn ranking_happens_before_truncation() {
        // Equal static bonuses; persisted score should decide who fills the
        // truncated list.
        let regions = vec![
            region("AA1", "North", Medium, Medium, 53.0, -1.0),
            region("BB1", "South", Medium, Medium, 51.0, -1.0),
        ];
        let mut scores = HashMap::new();
        scores.insert("BB1".to_string(), 0.95);
        scores.insert("AA1".to_string(), 0.05);

        let mut selector = KeySelector::with_seed(regions, 7);
        let keys = selector
            .select(&Strategy::Mixed, 1, false, &scores, None)
            .unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("BB1 "), "top-ranked area wins: {keys:?}");
    }

    #[test]
    fn geographic_filter_respects_the_radius() {
        // Manchester center; Leeds ~60 km away, London ~260 km away.
        let regions = vec![
            region("M1", "Greater Manchester", High, High, 53.4808, -2.2426),
            region("LS1", "West Yorkshire", High, High, 53.8008, -1.5491),
            region("SW1A", "London", High, High, 51.5074, -0.1278),
        ];
        let mut selector = KeySelector::with_seed(regions.clone(), 7);
        let geo = GeoFilter {
            center: "M1 1AA".to_string(),
            radius_km: 100.0,
        };
        let keys = selector
            .select(&Strategy::Mixed, 30, false, &no_scores(), Some(&geo))
            .unwrap();

        assert!(keys.iter().any(|k| k.starts_with("M1 ")));
        assert!(keys.iter().any(|k| k.starts_with("LS1 ")), "eligible candidate excluded");
        assert!(keys.iter().all(|k| !k.starts_with("SW1A ")));

        let m1 = (regions[0].lat, regions[0].lon);
        let ls1 = (regions[1].lat, regions[1].lon);
        assert!(haversine_km(m1, ls1) <= 100.0 + 1e-6);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // London to Manchester is roughly 262 km great-circle.
        let d = haversine_km((51.5074, -0.1278), (53.4808, -2.2426));
        assert!((d - 262.0).abs() < 5.0, "got {d}");
    }

    #[test]
    fn unknown_center_skips_the_filter() {
        let regions = vec![region("AA1", "North", Medium, Medium, 53.0, -1.0)];
        let mut selector = KeySelector::with_seed(regions, 7);
        let geo = GeoFilter {
            center: "ZZ9 9ZZ".to_string(),
            radius_km: 1.0,
        };
        let keys = selector
            .select(&Strategy::Mixed, 3, false, &no_scores(), Some(&geo))
            .unwrap();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn geographic_spread_caps_three_per_region_name() {
        let regions = vec![
            region("AA1", "Kent", Medium, High, 51.0, 0.5),
            region("AA2", "Kent", Medium, Medium, 51.1, 0.5),
            region("AA3", "Kent", Medium, Medium, 51.2, 0.5),
            region("AA4", "Kent", Medium, Low, 51.3, 0.5),
            region("BB1", "Wales", Medium, Medium, 51.5, -3.0),
        ];
        let mut selector = KeySelector::with_seed(regions, 7);
        // The limit covers every expandable key, so any area missing from
        // the output was dropped by the spread cap, not the limit.
        let keys = selector
            .select(&Strategy::GeographicSpread, 400, false, &no_scores(), None)
            .unwrap();
        let kent_areas: HashSet<&str> = keys
            .iter()
            .map(|k| k.split(' ').next().unwrap())
            .filter(|a| a.starts_with("AA"))
            .collect();
        assert!(kent_areas.len() <= 3);
        // The dropped area is the lowest-ranked one.
        assert!(!kent_areas.contains("AA4"));
    }

    #[test]
    fn custom_strategy_uses_caller_keys() {
        let mut selector = KeySelector::with_seed(Vec::new(), 7);
        let strategy = Strategy::Custom(vec!["m11aa".to_string(), "ls12bb".to_string()]);
        let keys = selector
            .select(&strategy, 10, false, &no_scores(), None)
            .unwrap();
        assert_eq!(keys, vec!["M1 1AA".to_string(), "LS1 2BB".to_string()]);
    }

    #[test]
    fn custom_without_keys_fails() {
        assert!(matches!(
            Strategy::parse("custom", &[]),
            Err(VansweepError::MissingCustomKeys)
        ));
    }

    #[test]
    fn unknown_strategy_fails() {
        assert!(matches!(
            Strategy::parse("postal-roulette", &[]),
            Err(VansweepError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn exclude_used_never_repeats_keys_across_calls() {
        let regions = vec![region("AA1", "North", Medium, Medium, 53.0, -1.0)];
        let mut selector = KeySelector::with_seed(regions, 7);
        let first: HashSet<String> = selector
            .select(&Strategy::Mixed, 10, true, &no_scores(), None)
            .unwrap()
            .into_iter()
            .collect();
        let second: HashSet<String> = selector
            .select(&Strategy::Mixed, 10, true, &no_scores(), None)
            .unwrap()
            .into_iter()
            .collect();
        assert!(first.is_disjoint(&second));
        assert_eq!(selector.consumed(), 20);
    }

    #[test]
    fn limit_is_respected() {
        let regions = vec![region("AA1", "North", Medium, Medium, 53.0, -1.0)];
        let mut selector = KeySelector::with_seed(regions, 7);
        let keys = selector
            .select(&Strategy::Mixed, 5, false, &no_scores(), None)
            .unwrap();
        assert_eq!(keys.len(), 5);
    }
}
