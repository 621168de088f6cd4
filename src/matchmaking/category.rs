//! Rating categories and configured time controls
//!
//! The server keeps one rating pool per variant regardless of time control,
//! and one pool per speed for standard chess. Opponent ratings are always
//! compared within the category the planned game would be rated in.

use crate::config::MatchmakingConfig;
use crate::types::{BotLane, Speed, TimeControl};
use std::collections::HashSet;

/// The rating category a game would be played in.
///
/// Non-standard variants keep their own pool and win over everything else;
/// correspondence wins over the clock for standard chess; the rest classify
/// by `base + 40 * increment` with lower-exclusive boundaries.
pub fn game_category(variant: &str, base_time: i64, increment: i64, days: i64) -> String {
    if variant != "standard" {
        return variant.to_string();
    }
    if days > 0 {
        return "correspondence".to_string();
    }
    Speed::classify(base_time, increment).as_str().to_string()
}

/// All time controls the configuration allows, as the cross product of base
/// times and increments (combinations where both are zero are dropped) plus
/// each configured correspondence day count.
///
/// When `allowed_lanes` is set, real-time controls are kept only if their
/// speed maps into an allowed lane, and correspondence controls require the
/// long lane. Correspondence controls are emitted only when
/// `include_correspondence` is set.
pub fn configured_time_controls(
    config: &MatchmakingConfig,
    allowed_lanes: Option<&HashSet<BotLane>>,
    include_correspondence: bool,
) -> Vec<TimeControl> {
    let base_times: Vec<u32> = if config.challenge_initial_time.is_empty() {
        vec![0]
    } else {
        config.challenge_initial_time.clone()
    };
    let increments: Vec<u32> = if config.challenge_increment.is_empty() {
        vec![0]
    } else {
        config.challenge_increment.clone()
    };

    let lane_allowed = |lane: BotLane| allowed_lanes.is_none_or(|lanes| lanes.contains(&lane));

    let mut controls = Vec::new();
    for &base_time in &base_times {
        for &increment in &increments {
            if base_time == 0 && increment == 0 {
                continue;
            }
            let speed = Speed::classify(base_time as i64, increment as i64);
            if lane_allowed(speed.bot_lane()) {
                controls.push(TimeControl::real_time(base_time, increment));
            }
        }
    }

    if include_correspondence {
        for &days in &config.challenge_days {
            if days == 0 {
                continue;
            }
            if lane_allowed(BotLane::Long) {
                controls.push(TimeControl::correspondence(days));
            }
        }
    }

    controls
}
