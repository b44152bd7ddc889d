//! Downstream traffic provider.
//!
//! Stands in for a live road-data API (distance-matrix style lookups against
//! the road segments fed by each lane) with a simulation shaped by time of
//! day, weather, random variation and incidents. Swapping in a real provider
//! means replacing [`MapsAdapter::downstream_traffic`]; everything upstream
//! only sees [`DownstreamData`].
//!
//! The adapter is shared across request handlers, so the cache and incident
//! registry sit behind their own locks and the simulation RNG behind a mutex.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Local, Timelike, Weekday};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::models::{DownstreamData, LaneDirection};
use crate::unix_now;

/// Lookups are cached this long; also the freshness window advertised to the
/// engine via [`DownstreamData::ttl`].
const CACHE_TTL_SECS: f64 = 60.0;

/// Chance of a spontaneous incident appearing on a road, per minute.
const ACCIDENT_CHANCE_PER_MINUTE: f64 = 0.02;

const ACCIDENT_MIN_SECS: f64 = 15.0 * 60.0;
const ACCIDENT_MAX_SECS: f64 = 45.0 * 60.0;

// ---------- Road network ----------

/// Road segment fed by each lane. Real deployments would carry segment ids
/// from the traffic provider here.
fn downstream_road(lane: LaneDirection) -> &'static str {
    match lane {
        LaneDirection::North => "road_north_downtown",
        LaneDirection::South => "road_south_highway",
        LaneDirection::East => "road_east_residential",
        LaneDirection::West => "road_west_industrial",
    }
}

/// Free-flow speed by road character: highway fast, residential slow.
fn base_speed(lane: LaneDirection) -> f64 {
    match lane {
        LaneDirection::North => 45.0,
        LaneDirection::South => 70.0,
        LaneDirection::East => 35.0,
        LaneDirection::West => 50.0,
    }
}

// ---------- Simulation factors ----------

fn time_of_day_factor<R: Rng>(hour: u32, weekend: bool, rng: &mut R) -> f64 {
    if weekend {
        return if (10..=20).contains(&hour) {
            rng.gen_range(0.8..0.95)
        } else {
            rng.gen_range(0.95..1.1)
        };
    }

    match hour {
        7..=9 => rng.gen_range(0.4..0.6),
        17..=19 => rng.gen_range(0.3..0.5),
        10..=16 => rng.gen_range(0.7..0.9),
        h if h >= 22 || h <= 5 => rng.gen_range(1.0..1.2),
        _ => rng.gen_range(0.8..1.0),
    }
}

/// Slowdown from the reported weather condition, matched on substrings so
/// provider phrasings like "Heavy Rain Warning" land in the right band.
fn weather_factor<R: Rng>(condition: Option<&str>, rng: &mut R) -> f64 {
    let Some(condition) = condition else {
        return 1.0;
    };
    let condition = condition.to_lowercase();

    if condition.contains("storm") || condition.contains("heavy rain") {
        rng.gen_range(0.5..0.7)
    } else if condition.contains("rain") || condition.contains("drizzle") {
        rng.gen_range(0.8..0.9)
    } else if condition.contains("fog") {
        rng.gen_range(0.7..0.85)
    } else if condition.contains("snow") {
        rng.gen_range(0.4..0.6)
    } else {
        1.0
    }
}

fn congestion_level(index: f64) -> &'static str {
    if index < 0.3 {
        "Light"
    } else if index < 0.6 {
        "Moderate"
    } else if index < 0.8 {
        "Heavy"
    } else {
        "Gridlock"
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ---------- Adapter ----------

/// One row of the monitoring summary, per downstream road.
#[derive(Debug, Clone, Serialize)]
pub struct LaneTrafficSummary {
    pub speed: f64,
    pub congestion: f64,
    pub level: &'static str,
    pub has_accident: bool,
}

pub struct MapsAdapter {
    rng: Mutex<StdRng>,
    cache: RwLock<HashMap<String, (DownstreamData, f64)>>,
    /// Road id to the incident's end timestamp, Unix seconds.
    accidents: RwLock<HashMap<&'static str, f64>>,
}

impl Default for MapsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MapsAdapter {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic adapter for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            cache: RwLock::new(HashMap::new()),
            accidents: RwLock::new(HashMap::new()),
        }
    }

    /// Current conditions on the road a lane feeds into, cached per
    /// lane-and-weather for the TTL window.
    pub fn downstream_traffic(
        &self,
        lane: LaneDirection,
        weather: Option<&str>,
    ) -> DownstreamData {
        let key = format!("{}_{}", lane, weather.unwrap_or("-"));
        let now = unix_now();

        if let Some((data, stored_at)) = self.cache.read().get(&key) {
            if now - stored_at < CACHE_TTL_SECS {
                return data.clone();
            }
        }

        let data = self.simulate(lane, weather, now);
        self.cache.write().insert(key, (data.clone(), now));
        data
    }

    fn simulate(&self, lane: LaneDirection, weather: Option<&str>, now: f64) -> DownstreamData {
        let local = Local::now();
        let weekend = matches!(local.weekday(), Weekday::Sat | Weekday::Sun);

        let mut rng = self.rng.lock();
        let time_factor = time_of_day_factor(local.hour(), weekend, &mut *rng);
        let weather_factor = weather_factor(weather, &mut *rng);
        let jitter = rng.gen_range(0.85..1.15);
        let accident_factor = self.accident_factor(lane, now, &mut *rng);

        let base = base_speed(lane);
        let speed = (base * time_factor * weather_factor * jitter * accident_factor)
            .clamp(5.0, 100.0);
        // Congestion is the shortfall against the road's best-case speed.
        let congestion = (1.0 - speed / (base * 1.2)).clamp(0.0, 1.0);

        DownstreamData {
            avg_speed: round1(speed),
            congestion_index: round2(congestion),
            ttl: CACHE_TTL_SECS as u32,
        }
    }

    /// Slowdown from incidents on the lane's road. Expired incidents are
    /// dropped on observation; new ones spawn at the per-minute chance spread
    /// across roughly one query per second.
    fn accident_factor<R: Rng>(&self, lane: LaneDirection, now: f64, rng: &mut R) -> f64 {
        let road = downstream_road(lane);
        let mut accidents = self.accidents.write();

        if let Some(&end) = accidents.get(road) {
            if now < end {
                return rng.gen_range(0.2..0.4);
            }
            accidents.remove(road);
            return 1.0;
        }

        if rng.gen::<f64>() < ACCIDENT_CHANCE_PER_MINUTE / 60.0 {
            let duration = rng.gen_range(ACCIDENT_MIN_SECS..=ACCIDENT_MAX_SECS);
            accidents.insert(road, now + duration);
            tracing::debug!("simulated incident on {road}, clears in {duration:.0}s");
            return rng.gen_range(0.2..0.4);
        }

        1.0
    }

    /// Start an incident on the lane's road, for demos and tests.
    pub fn trigger_accident(&self, lane: LaneDirection, duration_minutes: u32) {
        let road = downstream_road(lane);
        self.accidents
            .write()
            .insert(road, unix_now() + f64::from(duration_minutes) * 60.0);
        // Cached lookups would hide the slowdown until they expire.
        self.cache.write().clear();
    }

    pub fn clear_accidents(&self) {
        self.accidents.write().clear();
        self.cache.write().clear();
    }

    pub fn has_accident(&self, lane: LaneDirection) -> bool {
        self.accidents.read().contains_key(downstream_road(lane))
    }

    /// Conditions across all four downstream roads, for monitoring.
    pub fn traffic_summary(&self) -> BTreeMap<LaneDirection, LaneTrafficSummary> {
        LaneDirection::ALL
            .iter()
            .map(|&lane| {
                let data = self.downstream_traffic(lane, None);
                let row = LaneTrafficSummary {
                    speed: data.avg_speed,
                    congestion: data.congestion_index,
                    level: congestion_level(data.congestion_index),
                    has_accident: self.has_accident(lane),
                };
                (lane, row)
            })
            .collect()
    }
}
