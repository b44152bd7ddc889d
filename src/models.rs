//! Wire contracts for the decision API.
//!
//! Field names and defaults match the frontend's JSON contract (camelCase),
//! so a request the simulator already sends deserializes without adapters.
//! Range validation lives here too: the transport rejects out-of-range
//! snapshots before the engine ever sees them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------- Lane identity ----------

/// The four fixed approaches of the intersection.
///
/// Declaration order is the documented scan order everywhere an ordering
/// matters: override tie-breaks, the fallback lane search, and the sampling
/// scan all walk North, South, East, West.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LaneDirection {
    North,
    South,
    East,
    West,
}

impl LaneDirection {
    /// All lanes in scan order.
    pub const ALL: [LaneDirection; 4] = [
        LaneDirection::North,
        LaneDirection::South,
        LaneDirection::East,
        LaneDirection::West,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LaneDirection::North => "North",
            LaneDirection::South => "South",
            LaneDirection::East => "East",
            LaneDirection::West => "West",
        }
    }
}

impl fmt::Display for LaneDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown lane name in a query parameter.
#[derive(Debug, Error)]
#[error("invalid lane: {0}; must be North, South, East or West")]
pub struct ParseLaneError(pub String);

impl FromStr for LaneDirection {
    type Err = ParseLaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "north" => Ok(LaneDirection::North),
            "south" => Ok(LaneDirection::South),
            "east" => Ok(LaneDirection::East),
            "west" => Ok(LaneDirection::West),
            _ => Err(ParseLaneError(s.to_string())),
        }
    }
}

// ---------- Vision layer output ----------

/// Vehicle count by category, as reported by the vision layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleCount {
    pub car: u32,
    pub bike: u32,
    pub truck: u32,
    pub bus: u32,
    pub emergency: u32,
    pub pedestrians: u32,
}

/// Per-lane sensor features. The vision system reports only features, never
/// decisions or priorities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionOutput {
    pub vehicle_count_by_type: VehicleCount,
    /// Average approach speed in km/h; drops as the lane congests.
    pub avg_speed: f64,
    /// How full the lane is, 0..1.
    pub lane_occupancy: f64,
    #[serde(default)]
    pub ambulance_detected: bool,
    #[serde(default)]
    pub rain_detected: bool,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
}

fn default_confidence() -> f64 {
    0.95
}

// ---------- Maps layer output ----------

/// Downstream congestion snapshot for the road a lane feeds into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownstreamData {
    /// Downstream average speed in km/h.
    pub avg_speed: f64,
    /// 0 = free flow, 1 = gridlock.
    pub congestion_index: f64,
    /// Data freshness window in seconds.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    60
}

// ---------- Lane state ----------

/// Complete per-cycle state of one lane: vision features, optional downstream
/// data, and the temporal context the caller carries forward between cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneState {
    pub direction: LaneDirection,
    pub vision: VisionOutput,
    #[serde(default)]
    pub downstream: Option<DownstreamData>,
    /// Seconds this lane has waited since its last green.
    #[serde(default)]
    pub wait_time: f64,
    /// Unix timestamp of the lane's last green phase.
    #[serde(default)]
    pub last_green_time: f64,
}

// ---------- Engine output ----------

/// Explainability trace attached to every decision. Pure audit data; nothing
/// downstream branches on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionReason {
    pub emergency: bool,
    pub max_wait_violation: bool,
    /// 1 minus the selected lane's downstream priority factor.
    pub downstream_penalty: f64,
    pub recent_green_decay: f64,
    pub softmax_probability: f64,
    pub local_traffic_score: f64,
}

/// The engine's verdict for one cycle: which lane goes green and for how
/// long. Constructed once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDecision {
    pub selected_lane: LaneDirection,
    /// Green phase length in seconds.
    pub green_duration: f64,
    pub decision_confidence: f64,
    pub reason_trace: DecisionReason,
    pub timestamp: f64,
}

// ---------- Request/response envelopes ----------

/// Complete intersection state sent by the frontend each cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntersectionState {
    pub lanes: BTreeMap<LaneDirection, LaneState>,
    #[serde(default)]
    pub current_signal: Option<LaneDirection>,
    #[serde(default)]
    pub emergency_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Ai,
    Manual,
}

impl Default for ControlMode {
    fn default() -> Self {
        ControlMode::Ai
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub intersection_state: IntersectionState,
    #[serde(default)]
    pub control_mode: ControlMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub decision: SignalDecision,
    pub fallback_mode: bool,
    pub error_message: Option<String>,
}

// ---------- Boundary validation ----------

/// Range violation detected at the transport boundary. The engine assumes
/// these checks have already run.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{lane} lane: {field} = {value}, expected {min} to {max}")]
    OutOfRange {
        lane: LaneDirection,
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{lane} lane: {field} = {value}, expected a finite non-negative value")]
    Negative {
        lane: LaneDirection,
        field: &'static str,
        value: f64,
    },
}

impl IntersectionState {
    /// Range-check every lane against the wire contract bounds.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (direction, lane) in &self.lanes {
            lane.validate(*direction)?;
        }
        Ok(())
    }
}

impl LaneState {
    fn validate(&self, lane: LaneDirection) -> Result<(), ValidationError> {
        range(lane, "avgSpeed", self.vision.avg_speed, 0.0, 100.0)?;
        range(lane, "laneOccupancy", self.vision.lane_occupancy, 0.0, 1.0)?;
        range(lane, "confidenceScore", self.vision.confidence_score, 0.0, 1.0)?;
        non_negative(lane, "waitTime", self.wait_time)?;
        non_negative(lane, "lastGreenTime", self.last_green_time)?;
        if let Some(downstream) = &self.downstream {
            range(lane, "downstream.avgSpeed", downstream.avg_speed, 0.0, 100.0)?;
            range(
                lane,
                "downstream.congestionIndex",
                downstream.congestion_index,
                0.0,
                1.0,
            )?;
        }
        Ok(())
    }
}

fn range(
    lane: LaneDirection,
    field: &'static str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<(), ValidationError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            lane,
            field,
            value,
            min,
            max,
        })
    }
}

fn non_negative(
    lane: LaneDirection,
    field: &'static str,
    value: f64,
) -> Result<(), ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::Negative { lane, field, value })
    }
}
