//! Signal decision engine.
//!
//! One call per decision cycle: the engine takes a complete snapshot of all
//! lanes and returns which lane gets the green and for how long, with a full
//! reason trace. Hard safety overrides run first (emergency vehicles, then
//! max-wait breaches) and bypass scoring entirely. Otherwise each lane gets a
//! local congestion score shaped by its downstream priority factor and a
//! recency decay; a temperature-scaled softmax over the adjusted priorities
//! yields a selection distribution and one lane is drawn from it. Sampling
//! (rather than an argmax) is what keeps low-priority lanes from starving:
//! every lane always carries strictly positive probability.
//!
//! The engine holds no mutable state, performs no I/O and never mutates its
//! input; all temporal context (wait times, last-green timestamps) arrives in
//! the snapshot, so concurrent calls are independent as long as each one is
//! given its own RNG stream.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DecisionReason, LaneDirection, LaneState, SignalDecision};
use crate::unix_now;

/// Stabilizer added to every priority before the softmax, so a lane with an
/// exactly-zero score still ends up with nonzero selection probability.
const PRIORITY_EPSILON: f64 = 1e-6;

/// Speed (km/h) above which approach traffic no longer counts as congested.
const FREE_FLOW_SPEED: f64 = 60.0;

// ---------- Parameters ----------

/// Per-category weights for the local congestion score. Roughly spatial
/// cost: a truck blocks more road than a bike.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleWeights {
    pub car: f64,
    pub bike: f64,
    pub truck: f64,
    pub bus: f64,
    pub emergency: f64,
    pub pedestrians: f64,
}

impl Default for VehicleWeights {
    fn default() -> Self {
        Self {
            car: 1.0,
            bike: 0.3,
            truck: 1.5,
            bus: 1.5,
            emergency: 10.0,
            pedestrians: 0.5,
        }
    }
}

/// Tunable engine parameters. Defaults are the production constants; a JSON
/// file with any subset of fields can override them (see [`crate::config`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParams {
    /// Hard ceiling on how long a lane may wait before it is forced green.
    pub max_wait_time: f64,
    /// Lower bound on any allocated green phase, in seconds.
    pub min_green: f64,
    /// Upper bound on any allocated green phase, in seconds.
    pub max_green: f64,
    /// Window over which a just-served lane climbs back to full priority.
    pub recent_green_decay_window: f64,
    /// Softmax temperature; lower sharpens preference toward the top lane,
    /// higher flattens toward uniform.
    pub temperature: f64,
    pub vehicle_weights: VehicleWeights,
    /// Bike weight multiplier under rain.
    pub rain_bike_multiplier: f64,
    /// Local score treated as a saturated lane when allocating green time.
    pub saturation_score: f64,
}

impl Default for EngineParams {
    fn default() -> Self {
        Self {
            max_wait_time: 120.0,
            min_green: 5.0,
            max_green: 60.0,
            recent_green_decay_window: 30.0,
            temperature: 0.7,
            vehicle_weights: VehicleWeights::default(),
            rain_bike_multiplier: 2.0,
            saturation_score: 50.0,
        }
    }
}

// ---------- Errors ----------

/// Structural failures outside the validated input domain. The transport
/// answers these with the fixed-time fallback decision; a well-formed
/// snapshot never produces one.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no lane data in snapshot")]
    EmptyIntersection,
    #[error("selection distribution is not finite")]
    DegenerateDistribution,
}

// ---------- Engine ----------

pub struct DecisionEngine {
    params: EngineParams,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(EngineParams::default())
    }
}

impl DecisionEngine {
    pub fn new(params: EngineParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &EngineParams {
        &self.params
    }

    /// Run one decision cycle against the wall clock.
    ///
    /// `rng` drives the categorical draw in the fairness selector; give each
    /// concurrent call its own stream. Tests use [`decide_at`](Self::decide_at)
    /// with a seeded generator instead.
    pub fn decide<R: Rng>(
        &self,
        lanes: &BTreeMap<LaneDirection, LaneState>,
        rng: &mut R,
    ) -> Result<SignalDecision, EngineError> {
        self.decide_at(lanes, unix_now(), rng)
    }

    /// Like [`decide`](Self::decide) with an explicit `now` (Unix seconds),
    /// so recency behavior is testable without sleeping.
    pub fn decide_at<R: Rng>(
        &self,
        lanes: &BTreeMap<LaneDirection, LaneState>,
        now: f64,
        rng: &mut R,
    ) -> Result<SignalDecision, EngineError> {
        if lanes.is_empty() {
            return Err(EngineError::EmptyIntersection);
        }

        // Hard overrides run before any scoring, in lane scan order.
        if let Some(direction) = self.emergency_lane(lanes) {
            return Ok(self.emergency_decision(direction, now));
        }
        if let Some(direction) = self.max_wait_lane(lanes) {
            return Ok(self.forced_decision(direction, &lanes[&direction], now));
        }

        let probabilities = self.selection_probabilities(lanes, now);
        let selected = self.sample_lane(&probabilities, rng)?;
        let lane = &lanes[&selected];
        let probability = probabilities[&selected];

        Ok(SignalDecision {
            selected_lane: selected,
            green_duration: self.green_duration(lane),
            decision_confidence: probability,
            reason_trace: DecisionReason {
                emergency: false,
                max_wait_violation: false,
                downstream_penalty: 1.0 - self.downstream_priority(lane),
                // Decay is already folded into the sampled priorities.
                recent_green_decay: 1.0,
                softmax_probability: probability,
                local_traffic_score: self.local_traffic_score(lane),
            },
            timestamp: now,
        })
    }

    // ---------- Safety overrides ----------

    /// First lane in scan order reporting an emergency vehicle.
    fn emergency_lane(&self, lanes: &BTreeMap<LaneDirection, LaneState>) -> Option<LaneDirection> {
        lanes
            .iter()
            .find(|(_, lane)| lane.vision.ambulance_detected)
            .map(|(direction, _)| *direction)
    }

    /// First lane in scan order whose wait exceeds the hard ceiling.
    fn max_wait_lane(&self, lanes: &BTreeMap<LaneDirection, LaneState>) -> Option<LaneDirection> {
        lanes
            .iter()
            .find(|(_, lane)| lane.wait_time > self.params.max_wait_time)
            .map(|(direction, _)| *direction)
    }

    fn emergency_decision(&self, direction: LaneDirection, now: f64) -> SignalDecision {
        SignalDecision {
            selected_lane: direction,
            green_duration: self.params.max_green,
            decision_confidence: 1.0,
            reason_trace: DecisionReason {
                emergency: true,
                max_wait_violation: false,
                downstream_penalty: 0.0,
                recent_green_decay: 1.0,
                softmax_probability: 1.0,
                // Sentinel for the trace; no score is computed on this path.
                local_traffic_score: 999.0,
            },
            timestamp: now,
        }
    }

    fn forced_decision(
        &self,
        direction: LaneDirection,
        lane: &LaneState,
        now: f64,
    ) -> SignalDecision {
        SignalDecision {
            selected_lane: direction,
            // A short clearing pulse, not a full allocation.
            green_duration: self.params.min_green,
            decision_confidence: 1.0,
            reason_trace: DecisionReason {
                emergency: false,
                max_wait_violation: true,
                downstream_penalty: 0.0,
                recent_green_decay: 1.0,
                softmax_probability: 1.0,
                local_traffic_score: self.local_traffic_score(lane),
            },
            timestamp: now,
        }
    }

    // ---------- Priority scoring ----------

    /// Congestion cost of one lane from its own sensors.
    ///
    /// Weighted vehicle counts (bikes count double under rain), inflated by
    /// slow approach traffic and by occupancy: a standstill doubles the
    /// score, a packed lane doubles it again.
    pub fn local_traffic_score(&self, lane: &LaneState) -> f64 {
        let w = &self.params.vehicle_weights;
        let counts = &lane.vision.vehicle_count_by_type;

        let mut score = f64::from(counts.car) * w.car
            + f64::from(counts.bike) * w.bike
            + f64::from(counts.truck) * w.truck
            + f64::from(counts.bus) * w.bus
            + f64::from(counts.emergency) * w.emergency
            + f64::from(counts.pedestrians) * w.pedestrians;

        if lane.vision.rain_detected {
            score += f64::from(counts.bike) * w.bike * (self.params.rain_bike_multiplier - 1.0);
        }

        // 0 km/h doubles the score; 60 km/h and above adds nothing.
        let speed_factor = (1.0 - lane.vision.avg_speed / FREE_FLOW_SPEED).max(0.0);
        score *= 1.0 + speed_factor;
        score *= 1.0 + lane.vision.lane_occupancy;

        score
    }

    /// Priority multiplier from downstream flow: average downstream speed
    /// normalized by 60 km/h, floored at 0.1 so heavy congestion suppresses a
    /// lane without ever fully zeroing it. Missing data is neutral (1.0).
    pub fn downstream_priority(&self, lane: &LaneState) -> f64 {
        match &lane.downstream {
            Some(downstream) => (downstream.avg_speed / FREE_FLOW_SPEED).max(0.1),
            None => 1.0,
        }
    }

    /// Net priority per lane: local score times the squared downstream
    /// factor. Squaring makes feeding an already-jammed road hurt more than
    /// the equivalent local congestion.
    fn net_priorities(
        &self,
        lanes: &BTreeMap<LaneDirection, LaneState>,
    ) -> BTreeMap<LaneDirection, f64> {
        lanes
            .iter()
            .map(|(direction, lane)| {
                let local = self.local_traffic_score(lane);
                let downstream = self.downstream_priority(lane);
                (*direction, local * downstream * downstream)
            })
            .collect()
    }

    /// Suppress lanes that just had the green. A lane served at `now` is
    /// fully suppressed and climbs linearly back to full priority over the
    /// decay window; this is what stops the green from flapping between two
    /// heavy lanes.
    fn apply_recent_green_decay(
        &self,
        lanes: &BTreeMap<LaneDirection, LaneState>,
        priorities: BTreeMap<LaneDirection, f64>,
        now: f64,
    ) -> BTreeMap<LaneDirection, f64> {
        priorities
            .into_iter()
            .map(|(direction, priority)| {
                let elapsed = now - lanes[&direction].last_green_time;
                let decay = (elapsed / self.params.recent_green_decay_window).clamp(0.0, 1.0);
                (direction, priority * decay)
            })
            .collect()
    }

    // ---------- Fairness selection ----------

    /// Softmax selection distribution over the decayed lane priorities.
    ///
    /// Exposed for auditability: these are exactly the probabilities the
    /// sampler draws from, strictly positive for every lane and summing to 1.
    pub fn selection_probabilities(
        &self,
        lanes: &BTreeMap<LaneDirection, LaneState>,
        now: f64,
    ) -> BTreeMap<LaneDirection, f64> {
        let priorities = self.apply_recent_green_decay(lanes, self.net_priorities(lanes), now);
        self.softmax(&priorities)
    }

    /// Temperature-scaled softmax with max-subtraction for numerical
    /// stability.
    fn softmax(&self, priorities: &BTreeMap<LaneDirection, f64>) -> BTreeMap<LaneDirection, f64> {
        let scaled: Vec<f64> = priorities
            .values()
            .map(|priority| (priority + PRIORITY_EPSILON) / self.params.temperature)
            .collect();
        let max = scaled.iter().fold(f64::NEG_INFINITY, |acc, v| acc.max(*v));
        let exps: Vec<f64> = scaled.iter().map(|v| (v - max).exp()).collect();
        let total: f64 = exps.iter().sum();

        priorities
            .keys()
            .zip(exps)
            .map(|(direction, e)| (*direction, e / total))
            .collect()
    }

    /// Draw one lane from the categorical distribution.
    ///
    /// Cumulative scan in lane order; the final lane absorbs any floating
    /// point slack so the draw always lands.
    fn sample_lane<R: Rng>(
        &self,
        probabilities: &BTreeMap<LaneDirection, f64>,
        rng: &mut R,
    ) -> Result<LaneDirection, EngineError> {
        let total: f64 = probabilities.values().sum();
        if !total.is_finite() || total <= 0.0 {
            return Err(EngineError::DegenerateDistribution);
        }

        let draw = rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut last = None;
        for (direction, probability) in probabilities {
            acc += probability;
            if draw < acc {
                return Ok(*direction);
            }
            last = Some(*direction);
        }
        last.ok_or(EngineError::DegenerateDistribution)
    }

    // ---------- Green time allocation ----------

    /// Green time for the selected lane, in `[min_green, max_green]` seconds.
    ///
    /// The local score is normalized against the saturation reference load,
    /// interpolated linearly across the green range, then shrunk by the
    /// lane's detection confidence and clamped back into bounds.
    pub fn green_duration(&self, lane: &LaneState) -> f64 {
        let p = &self.params;
        let normalized = (self.local_traffic_score(lane) / p.saturation_score).min(1.0);
        let duration = p.min_green + (p.max_green - p.min_green) * normalized;
        (duration * lane.vision.confidence_score).clamp(p.min_green, p.max_green)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownstreamData, VehicleCount, VisionOutput};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const NOW: f64 = 1_700_000_100.0;

    fn lane_with(direction: LaneDirection, counts: VehicleCount) -> LaneState {
        LaneState {
            direction,
            vision: VisionOutput {
                vehicle_count_by_type: counts,
                avg_speed: 60.0,
                lane_occupancy: 0.0,
                ambulance_detected: false,
                rain_detected: false,
                confidence_score: 1.0,
            },
            downstream: None,
            wait_time: 0.0,
            last_green_time: 0.0,
        }
    }

    fn cars(n: u32) -> VehicleCount {
        VehicleCount {
            car: n,
            ..VehicleCount::default()
        }
    }

    fn four_lanes() -> BTreeMap<LaneDirection, LaneState> {
        LaneDirection::ALL
            .iter()
            .map(|&d| (d, lane_with(d, VehicleCount::default())))
            .collect()
    }

    fn rng(seed: u64) -> StdRng {
        StdRng::seed_from_u64(seed)
    }

    #[test]
    fn local_score_is_the_weighted_category_sum() {
        let engine = DecisionEngine::default();
        let lane = lane_with(
            LaneDirection::North,
            VehicleCount {
                car: 2,
                bike: 3,
                truck: 1,
                bus: 1,
                emergency: 0,
                pedestrians: 4,
            },
        );

        // 2*1.0 + 3*0.3 + 1*1.5 + 1*1.5 + 4*0.5 with neutral speed/occupancy
        assert!((engine.local_traffic_score(&lane) - 7.9).abs() < 1e-9);
    }

    #[test]
    fn rain_doubles_the_bike_contribution() {
        let engine = DecisionEngine::default();
        let dry = lane_with(
            LaneDirection::North,
            VehicleCount {
                bike: 10,
                ..VehicleCount::default()
            },
        );
        let mut wet = dry.clone();
        wet.vision.rain_detected = true;

        let dry_score = engine.local_traffic_score(&dry);
        let wet_score = engine.local_traffic_score(&wet);
        assert!((wet_score - dry_score - 10.0 * 0.3).abs() < 1e-9);
    }

    #[test]
    fn empty_lane_scores_zero() {
        let engine = DecisionEngine::default();
        let lane = lane_with(LaneDirection::East, VehicleCount::default());
        assert_eq!(engine.local_traffic_score(&lane), 0.0);
    }

    #[test]
    fn standstill_and_full_occupancy_quadruple_the_score() {
        let engine = DecisionEngine::default();
        let mut lane = lane_with(LaneDirection::West, cars(10));
        lane.vision.avg_speed = 0.0;
        lane.vision.lane_occupancy = 1.0;

        assert!((engine.local_traffic_score(&lane) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn downstream_priority_floors_at_a_tenth() {
        let engine = DecisionEngine::default();
        let mut lane = lane_with(LaneDirection::North, cars(1));
        assert_eq!(engine.downstream_priority(&lane), 1.0, "no data is neutral");

        for (speed, expected) in [(60.0, 1.0), (30.0, 0.5), (3.0, 0.1), (0.0, 0.1)] {
            lane.downstream = Some(DownstreamData {
                avg_speed: speed,
                congestion_index: 0.5,
                ttl: 60,
            });
            assert!((engine.downstream_priority(&lane) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn net_priority_squares_the_downstream_factor() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        let north = lanes.get_mut(&LaneDirection::North).unwrap();
        north.vision.vehicle_count_by_type = cars(10);
        north.downstream = Some(DownstreamData {
            avg_speed: 30.0,
            congestion_index: 0.5,
            ttl: 60,
        });

        let priorities = engine.net_priorities(&lanes);
        // local 10, downstream factor 0.5 squared
        assert!((priorities[&LaneDirection::North] - 2.5).abs() < 1e-9);
    }

    #[test]
    fn recency_decay_rises_linearly_over_the_window() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::East).unwrap().vision.vehicle_count_by_type = cars(8);

        let raw = engine.net_priorities(&lanes);
        for (elapsed, factor) in [(0.0, 0.0), (15.0, 0.5), (30.0, 1.0), (300.0, 1.0)] {
            lanes.get_mut(&LaneDirection::East).unwrap().last_green_time = NOW - elapsed;
            let adjusted = engine.apply_recent_green_decay(&lanes, raw.clone(), NOW);
            assert!(
                (adjusted[&LaneDirection::East] - raw[&LaneDirection::East] * factor).abs() < 1e-9,
                "elapsed {elapsed}s should decay by {factor}"
            );
        }
    }

    #[test]
    fn future_last_green_timestamp_decays_to_zero() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        let east = lanes.get_mut(&LaneDirection::East).unwrap();
        east.vision.vehicle_count_by_type = cars(8);
        east.last_green_time = NOW + 10.0;

        let adjusted = engine.apply_recent_green_decay(&lanes, engine.net_priorities(&lanes), NOW);
        assert_eq!(adjusted[&LaneDirection::East], 0.0);
    }

    #[test]
    fn probabilities_are_positive_and_sum_to_one() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::South).unwrap().vision.vehicle_count_by_type = cars(12);

        let probabilities = engine.selection_probabilities(&lanes, NOW);
        assert_eq!(probabilities.len(), 4);
        let sum: f64 = probabilities.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for (direction, p) in &probabilities {
            assert!(*p > 0.0, "{direction} must stay selectable");
        }
    }

    #[test]
    fn zero_priority_lane_keeps_positive_probability() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::North).unwrap().vision.vehicle_count_by_type = cars(30);
        // South just got served: raw priority times zero decay
        let south = lanes.get_mut(&LaneDirection::South).unwrap();
        south.vision.vehicle_count_by_type = cars(30);
        south.last_green_time = NOW;

        let probabilities = engine.selection_probabilities(&lanes, NOW);
        assert!(probabilities[&LaneDirection::South] > 0.0);
        assert!(probabilities[&LaneDirection::North] > probabilities[&LaneDirection::South]);
    }

    #[test]
    fn emergency_takes_max_green_unconditionally() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::North).unwrap().vision.vehicle_count_by_type = cars(50);
        lanes.get_mut(&LaneDirection::East).unwrap().vision.ambulance_detected = true;

        let decision = engine.decide_at(&lanes, NOW, &mut rng(1)).unwrap();
        assert_eq!(decision.selected_lane, LaneDirection::East);
        assert_eq!(decision.green_duration, 60.0);
        assert_eq!(decision.decision_confidence, 1.0);
        assert!(decision.reason_trace.emergency);
        assert!(!decision.reason_trace.max_wait_violation);
        assert_eq!(decision.reason_trace.local_traffic_score, 999.0);
        assert_eq!(decision.reason_trace.softmax_probability, 1.0);
    }

    #[test]
    fn first_emergency_in_scan_order_wins() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::East).unwrap().vision.ambulance_detected = true;
        lanes.get_mut(&LaneDirection::South).unwrap().vision.ambulance_detected = true;

        let decision = engine.decide_at(&lanes, NOW, &mut rng(2)).unwrap();
        assert_eq!(decision.selected_lane, LaneDirection::South);
    }

    #[test]
    fn emergency_outranks_max_wait() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::North).unwrap().wait_time = 500.0;
        lanes.get_mut(&LaneDirection::West).unwrap().vision.ambulance_detected = true;

        let decision = engine.decide_at(&lanes, NOW, &mut rng(3)).unwrap();
        assert_eq!(decision.selected_lane, LaneDirection::West);
        assert!(decision.reason_trace.emergency);
    }

    #[test]
    fn max_wait_breach_forces_a_clearing_pulse() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        let west = lanes.get_mut(&LaneDirection::West).unwrap();
        west.wait_time = 121.0;
        west.vision.vehicle_count_by_type = cars(4);

        let decision = engine.decide_at(&lanes, NOW, &mut rng(4)).unwrap();
        assert_eq!(decision.selected_lane, LaneDirection::West);
        assert_eq!(decision.green_duration, 5.0);
        assert_eq!(decision.decision_confidence, 1.0);
        assert!(decision.reason_trace.max_wait_violation);
        assert!((decision.reason_trace.local_traffic_score - 4.0).abs() < 1e-9);
    }

    #[test]
    fn wait_of_exactly_the_ceiling_is_not_forced() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::West).unwrap().wait_time = 120.0;

        let decision = engine.decide_at(&lanes, NOW, &mut rng(5)).unwrap();
        assert!(!decision.reason_trace.max_wait_violation);
    }

    #[test]
    fn single_congested_lane_dominates_and_fills_the_green() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        let south = lanes.get_mut(&LaneDirection::South).unwrap();
        south.vision.vehicle_count_by_type = cars(20);
        south.vision.avg_speed = 0.0;
        south.vision.lane_occupancy = 1.0;

        let probabilities = engine.selection_probabilities(&lanes, NOW);
        for direction in [LaneDirection::North, LaneDirection::East, LaneDirection::West] {
            assert!(probabilities[&LaneDirection::South] > probabilities[&direction]);
        }

        // Score 80 against three zero lanes: the softmax gap is so large the
        // draw lands on South for any RNG value.
        let decision = engine.decide_at(&lanes, NOW, &mut rng(6)).unwrap();
        assert_eq!(decision.selected_lane, LaneDirection::South);
        assert_eq!(decision.green_duration, 60.0);
        assert!(decision.reason_trace.softmax_probability > 0.99);
        assert!(!decision.reason_trace.emergency);
    }

    #[test]
    fn duration_scales_with_load_and_confidence() {
        let engine = DecisionEngine::default();

        // Score 20 out of the 50-unit reference: 5 + 55*0.4 = 27
        let mut lane = lane_with(LaneDirection::North, cars(20));
        assert!((engine.green_duration(&lane) - 27.0).abs() < 1e-9);

        lane.vision.confidence_score = 0.5;
        assert!((engine.green_duration(&lane) - 13.5).abs() < 1e-9);

        // Confidence can never push the pulse below the floor.
        lane.vision.confidence_score = 0.0;
        assert_eq!(engine.green_duration(&lane), 5.0);

        // Saturated lane at full confidence fills the ceiling.
        let mut packed = lane_with(LaneDirection::South, cars(200));
        packed.vision.avg_speed = 0.0;
        packed.vision.lane_occupancy = 1.0;
        assert_eq!(engine.green_duration(&packed), 60.0);
    }

    #[test]
    fn empty_intersection_is_rejected() {
        let engine = DecisionEngine::default();
        let lanes = BTreeMap::new();
        assert!(matches!(
            engine.decide_at(&lanes, NOW, &mut rng(7)),
            Err(EngineError::EmptyIntersection)
        ));
    }

    #[test]
    fn nan_poisoned_snapshot_is_rejected_not_panicked() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        let north = lanes.get_mut(&LaneDirection::North).unwrap();
        north.vision.vehicle_count_by_type = cars(5);
        north.vision.lane_occupancy = f64::NAN;

        assert!(matches!(
            engine.decide_at(&lanes, NOW, &mut rng(8)),
            Err(EngineError::DegenerateDistribution)
        ));
    }

    #[test]
    fn partial_snapshots_are_processed_as_given() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.remove(&LaneDirection::West);

        let probabilities = engine.selection_probabilities(&lanes, NOW);
        assert_eq!(probabilities.len(), 3);

        let decision = engine.decide_at(&lanes, NOW, &mut rng(9)).unwrap();
        assert!(lanes.contains_key(&decision.selected_lane));
    }

    #[test]
    fn same_seed_reproduces_the_same_decision() {
        let engine = DecisionEngine::default();
        let mut lanes = four_lanes();
        lanes.get_mut(&LaneDirection::North).unwrap().vision.vehicle_count_by_type = cars(3);
        lanes.get_mut(&LaneDirection::East).unwrap().vision.vehicle_count_by_type = cars(5);

        let first = engine.decide_at(&lanes, NOW, &mut rng(42)).unwrap();
        let second = engine.decide_at(&lanes, NOW, &mut rng(42)).unwrap();
        assert_eq!(first, second);
    }
}
