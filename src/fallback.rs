//! Fixed-time fallback for when the engine rejects a snapshot.
//!
//! The controller must always answer with a usable signal plan, so engine
//! failures degrade to a fixed-time scheme instead of surfacing as errors:
//! the first lane with motorized traffic gets a short green, an idle
//! intersection defaults to North.

use crate::models::{DecisionReason, IntersectionState, LaneDirection, SignalDecision};

/// Green given to the first occupied lane.
const OCCUPIED_FALLBACK_SECS: f64 = 15.0;
/// Green given to North when no lane has motorized traffic.
const IDLE_FALLBACK_SECS: f64 = 10.0;

/// Build the fixed-time decision for a snapshot the engine could not score.
///
/// Only cars, trucks and buses count as occupancy here; bikes and
/// pedestrians never trigger the fallback green on their own.
pub fn fallback_decision(intersection: &IntersectionState, now: f64) -> SignalDecision {
    for (direction, lane) in &intersection.lanes {
        let counts = &lane.vision.vehicle_count_by_type;
        let motorized = counts.car + counts.truck + counts.bus;
        if motorized > 0 {
            return SignalDecision {
                selected_lane: *direction,
                green_duration: OCCUPIED_FALLBACK_SECS,
                decision_confidence: 0.5,
                reason_trace: DecisionReason {
                    emergency: false,
                    max_wait_violation: false,
                    downstream_penalty: 0.0,
                    recent_green_decay: 1.0,
                    softmax_probability: 0.5,
                    local_traffic_score: f64::from(motorized),
                },
                timestamp: now,
            };
        }
    }

    SignalDecision {
        selected_lane: LaneDirection::North,
        green_duration: IDLE_FALLBACK_SECS,
        decision_confidence: 0.5,
        reason_trace: DecisionReason {
            emergency: false,
            max_wait_violation: false,
            downstream_penalty: 0.0,
            recent_green_decay: 1.0,
            softmax_probability: 0.25,
            local_traffic_score: 0.0,
        },
        timestamp: now,
    }
}
