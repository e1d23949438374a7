//! Scoreboard record shared by every context, and the patches that change it.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    clock::{self, Timestamp},
    error::StateError,
};

/// Full shot clock in milliseconds.
pub const SHOT_CLOCK_FULL_MS: u64 = 24_000;
/// Shot clock after an offensive rebound reset, in milliseconds.
pub const SHOT_CLOCK_OFFENSIVE_MS: u64 = 14_000;

/// One of the two sides of the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    /// Home side, shown on the left.
    A,
    /// Away side, shown on the right.
    B,
}

impl Team {
    /// The opposing side.
    pub fn other(self) -> Self {
        match self {
            Team::A => Team::B,
            Team::B => Team::A,
        }
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Team::A => f.write_str("A"),
            Team::B => f.write_str("B"),
        }
    }
}

impl FromStr for Team {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "A" | "a" => Ok(Team::A),
            "B" | "b" => Ok(Team::B),
            other => Err(format!("unknown team `{other}` (expected A or B)")),
        }
    }
}

/// Game clock and shot clock, both measured from one shared timestamp.
///
/// The pair is interpreted against `as_of` (persisted as `lastUpdate`), so any
/// write that moves the timestamp must first [`rebase`](Self::rebase) the
/// remaining values or the running clocks would gain or lose time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    /// Game clock remaining at `as_of`, in milliseconds.
    #[serde(rename = "gameTime")]
    pub game_remaining: u64,
    /// Shot clock remaining at `as_of`, in milliseconds.
    #[serde(rename = "shotClock")]
    pub shot_remaining: u64,
    /// Whether the game clock counts down.
    #[serde(rename = "isRunning")]
    pub running_game: bool,
    /// Whether the shot clock counts down.
    #[serde(rename = "isShotRunning")]
    pub running_shot: bool,
    /// Moment both remaining values were last synchronized.
    #[serde(rename = "lastUpdate")]
    pub as_of: Timestamp,
}

impl ClockSnapshot {
    /// Game clock remaining at `now`.
    pub fn game_remaining_at(&self, now: Timestamp) -> u64 {
        clock::current_countdown(self.game_remaining, self.running_game, self.as_of, now)
    }

    /// Shot clock remaining at `now`.
    pub fn shot_remaining_at(&self, now: Timestamp) -> u64 {
        clock::current_countdown(self.shot_remaining, self.running_shot, self.as_of, now)
    }

    /// Fold the time elapsed since `as_of` into both remaining values and
    /// move the shared timestamp to `now`. Running flags are kept.
    pub fn rebase(&self, now: Timestamp) -> Self {
        Self {
            game_remaining: self.game_remaining_at(now),
            shot_remaining: self.shot_remaining_at(now),
            as_of: now,
            ..*self
        }
    }

    /// Same snapshot with new running flags.
    pub fn with_running(self, running_game: bool, running_shot: bool) -> Self {
        Self {
            running_game,
            running_shot,
            ..self
        }
    }
}

/// Configurable starting values for a fresh scoreboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameDefaults {
    pub team_a_name: String,
    pub team_b_name: String,
    pub team_a_color: String,
    pub team_b_color: String,
    /// Timeout length in seconds.
    pub timeout_duration: u32,
    /// Timeouts granted per team on a game reset.
    pub timeouts_per_team: u32,
    /// Timeouts each team starts a brand-new scoreboard with.
    pub initial_timeouts: u32,
    /// Rest between quarters in seconds.
    pub rest_between_quarters: u32,
    /// Quarter length in milliseconds.
    pub default_game_time: u64,
    pub total_quarters: u32,
    /// Overtime period length in milliseconds.
    pub overtime_duration: u64,
    pub foul_limit: u32,
}

impl Default for GameDefaults {
    fn default() -> Self {
        Self {
            team_a_name: "Home Team".into(),
            team_b_name: "Away Team".into(),
            team_a_color: "#1e40af".into(),
            team_b_color: "#dc2626".into(),
            timeout_duration: 60,
            timeouts_per_team: 3,
            initial_timeouts: 2,
            rest_between_quarters: 120,
            default_game_time: 720_000,
            total_quarters: 4,
            overtime_duration: 300_000,
            foul_limit: 5,
        }
    }
}

/// The complete scoreboard as persisted under the shared storage key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreboardState {
    pub team_a_name: String,
    pub team_b_name: String,
    pub team_a_color: String,
    pub team_b_color: String,
    /// Seconds.
    pub timeout_duration: u32,
    pub timeouts_per_team: u32,
    /// Seconds.
    pub rest_between_quarters: u32,
    /// Milliseconds.
    pub default_game_time: u64,
    pub total_quarters: u32,
    /// Milliseconds.
    pub overtime_duration: u64,
    pub foul_limit: u32,

    /// Current period; values above `total_quarters` are overtime periods.
    pub quarter: u32,
    pub team_a_score: u32,
    pub team_b_score: u32,
    pub team_a_fouls: u32,
    pub team_b_fouls: u32,
    pub team_a_timeouts: u32,
    pub team_b_timeouts: u32,
    pub possession: Option<Team>,

    #[serde(flatten)]
    pub clock: ClockSnapshot,

    /// Seconds left when the timeout was stamped.
    pub timeout_time_left: u32,
    pub is_timeout_active: bool,
    pub timeout_team: Option<Team>,
    pub timeout_last_update: Option<Timestamp>,

    /// Milliseconds left when the rest was stamped.
    pub rest_time_left: u64,
    pub rest_active: bool,
    pub rest_last_update: Timestamp,
    pub rest_running: bool,

    /// Keys written by other producers that this model does not know about.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScoreboardState {
    /// Built-in starting state stamped at `now`.
    pub fn with_defaults(defaults: &GameDefaults, now: Timestamp) -> Self {
        Self {
            team_a_name: defaults.team_a_name.clone(),
            team_b_name: defaults.team_b_name.clone(),
            team_a_color: defaults.team_a_color.clone(),
            team_b_color: defaults.team_b_color.clone(),
            timeout_duration: defaults.timeout_duration,
            timeouts_per_team: defaults.timeouts_per_team,
            rest_between_quarters: defaults.rest_between_quarters,
            default_game_time: defaults.default_game_time,
            total_quarters: defaults.total_quarters.max(1),
            overtime_duration: defaults.overtime_duration,
            foul_limit: defaults.foul_limit,
            quarter: 1,
            team_a_score: 0,
            team_b_score: 0,
            team_a_fouls: 0,
            team_b_fouls: 0,
            team_a_timeouts: defaults.initial_timeouts,
            team_b_timeouts: defaults.initial_timeouts,
            possession: Some(Team::A),
            clock: ClockSnapshot {
                game_remaining: defaults.default_game_time,
                shot_remaining: SHOT_CLOCK_FULL_MS,
                running_game: false,
                running_shot: false,
                as_of: now,
            },
            timeout_time_left: 0,
            is_timeout_active: false,
            timeout_team: None,
            timeout_last_update: None,
            rest_time_left: 0,
            rest_active: false,
            rest_last_update: now,
            rest_running: true,
            extra: Map::new(),
        }
    }

    pub fn score(&self, team: Team) -> u32 {
        match team {
            Team::A => self.team_a_score,
            Team::B => self.team_b_score,
        }
    }

    pub fn fouls(&self, team: Team) -> u32 {
        match team {
            Team::A => self.team_a_fouls,
            Team::B => self.team_b_fouls,
        }
    }

    pub fn timeouts(&self, team: Team) -> u32 {
        match team {
            Team::A => self.team_a_timeouts,
            Team::B => self.team_b_timeouts,
        }
    }

    pub fn team_name(&self, team: Team) -> &str {
        match team {
            Team::A => &self.team_a_name,
            Team::B => &self.team_b_name,
        }
    }

    /// Whether `team` is past the foul limit and shooting bonus free throws.
    pub fn in_bonus(&self, team: Team) -> bool {
        self.fouls(team) > self.foul_limit
    }

    pub fn scores_tied(&self) -> bool {
        self.team_a_score == self.team_b_score
    }

    /// Game clock remaining at `now`.
    pub fn current_game_time(&self, now: Timestamp) -> u64 {
        self.clock.game_remaining_at(now)
    }

    /// Shot clock remaining at `now`.
    pub fn current_shot_clock(&self, now: Timestamp) -> u64 {
        self.clock.shot_remaining_at(now)
    }

    /// Rest remaining at `now`; a paused or inactive rest does not move.
    pub fn current_rest(&self, now: Timestamp) -> u64 {
        clock::current_countdown(
            self.rest_time_left,
            self.rest_active && self.rest_running,
            self.rest_last_update,
            now,
        )
    }

    /// Timeout remaining at `now` in whole seconds, `0` when none is active.
    pub fn current_timeout_secs(&self, now: Timestamp) -> u32 {
        if !self.is_timeout_active {
            return 0;
        }
        let stamped = self.timeout_last_update.unwrap_or(self.clock.as_of);
        clock::timeout_remaining_secs(self.timeout_time_left, stamped, now)
    }

    /// Shallow-merge `fields` over this state: every key present in `fields`
    /// replaces the whole value, absent keys keep their current value.
    ///
    /// The merge is all-or-nothing; a value that does not fit the model
    /// leaves `self` untouched and yields an error.
    pub fn merged_with(&self, fields: Map<String, Value>) -> Result<Self, StateError> {
        let mut merged = match serde_json::to_value(self).map_err(StateError::Serialize)? {
            Value::Object(map) => map,
            _ => return Err(StateError::NotAnObject),
        };
        merged.extend(fields);
        serde_json::from_value(Value::Object(merged)).map_err(StateError::Malformed)
    }

    /// Serialize to the persisted JSON form.
    pub fn to_json(&self) -> Result<String, StateError> {
        serde_json::to_string(self).map_err(StateError::Serialize)
    }
}

/// Parse a persisted or broadcast payload into the field map it carries.
pub fn parse_fields(payload: &str) -> Result<Map<String, Value>, StateError> {
    match serde_json::from_str::<Value>(payload).map_err(StateError::Parse)? {
        Value::Object(map) => Ok(map),
        _ => Err(StateError::NotAnObject),
    }
}

/// Partial update of a [`ScoreboardState`]; `None` leaves a field as is.
///
/// Nullable fields use a double option: `Some(None)` writes `null`.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    pub team_a_name: Option<String>,
    pub team_b_name: Option<String>,
    pub team_a_color: Option<String>,
    pub team_b_color: Option<String>,
    pub timeout_duration: Option<u32>,
    pub timeouts_per_team: Option<u32>,
    pub rest_between_quarters: Option<u32>,
    pub default_game_time: Option<u64>,
    pub total_quarters: Option<u32>,
    pub overtime_duration: Option<u64>,
    pub foul_limit: Option<u32>,

    pub quarter: Option<u32>,
    pub team_a_score: Option<u32>,
    pub team_b_score: Option<u32>,
    pub team_a_fouls: Option<u32>,
    pub team_b_fouls: Option<u32>,
    pub team_a_timeouts: Option<u32>,
    pub team_b_timeouts: Option<u32>,
    #[serde(with = "::serde_with::rust::double_option")]
    pub possession: Option<Option<Team>>,

    pub game_time: Option<u64>,
    pub shot_clock: Option<u64>,
    pub is_running: Option<bool>,
    pub is_shot_running: Option<bool>,
    pub last_update: Option<Timestamp>,

    pub timeout_time_left: Option<u32>,
    pub is_timeout_active: Option<bool>,
    #[serde(with = "::serde_with::rust::double_option")]
    pub timeout_team: Option<Option<Team>>,
    #[serde(with = "::serde_with::rust::double_option")]
    pub timeout_last_update: Option<Option<Timestamp>>,

    pub rest_time_left: Option<u64>,
    pub rest_active: Option<bool>,
    pub rest_last_update: Option<Timestamp>,
    pub rest_running: Option<bool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StatePatch {
    /// Write the whole clock snapshot, flags and timestamp included.
    pub fn with_clock(mut self, clock: ClockSnapshot) -> Self {
        self.game_time = Some(clock.game_remaining);
        self.shot_clock = Some(clock.shot_remaining);
        self.is_running = Some(clock.running_game);
        self.is_shot_running = Some(clock.running_shot);
        self.last_update = Some(clock.as_of);
        self
    }

    /// Clear every timeout field.
    pub fn clearing_timeout(mut self) -> Self {
        self.is_timeout_active = Some(false);
        self.timeout_team = Some(None);
        self.timeout_time_left = Some(0);
        self.timeout_last_update = Some(None);
        self
    }

    /// Set a team's score.
    pub fn with_score(mut self, team: Team, value: u32) -> Self {
        match team {
            Team::A => self.team_a_score = Some(value),
            Team::B => self.team_b_score = Some(value),
        }
        self
    }

    /// Set a team's foul count.
    pub fn with_fouls(mut self, team: Team, value: u32) -> Self {
        match team {
            Team::A => self.team_a_fouls = Some(value),
            Team::B => self.team_b_fouls = Some(value),
        }
        self
    }

    /// Set a team's remaining timeouts.
    pub fn with_timeouts(mut self, team: Team, value: u32) -> Self {
        match team {
            Team::A => self.team_a_timeouts = Some(value),
            Team::B => self.team_b_timeouts = Some(value),
        }
        self
    }

    /// The JSON object this patch merges.
    pub fn into_fields(self) -> Result<Map<String, Value>, StateError> {
        match serde_json::to_value(self).map_err(StateError::Serialize)? {
            Value::Object(map) => Ok(map),
            _ => Err(StateError::NotAnObject),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const T: Timestamp = 1_700_000_000_000;

    fn fresh() -> ScoreboardState {
        ScoreboardState::with_defaults(&GameDefaults::default(), T)
    }

    #[test]
    fn serializes_with_flat_storage_keys() {
        let value = serde_json::to_value(fresh()).unwrap();
        assert_eq!(value["gameTime"], json!(720_000));
        assert_eq!(value["shotClock"], json!(24_000));
        assert_eq!(value["isRunning"], json!(false));
        assert_eq!(value["lastUpdate"], json!(T));
        assert_eq!(value["teamAName"], json!("Home Team"));
        assert_eq!(value["teamATimeouts"], json!(2));
        assert_eq!(value["possession"], json!("A"));
        assert_eq!(value["timeoutTeam"], Value::Null);
        assert!(value.get("clock").is_none());
    }

    #[test]
    fn merge_replaces_only_present_keys() {
        let state = fresh();
        let merged = state
            .merged_with(parse_fields(r#"{"teamAScore": 12, "possession": "B"}"#).unwrap())
            .unwrap();
        assert_eq!(merged.team_a_score, 12);
        assert_eq!(merged.possession, Some(Team::B));
        assert_eq!(merged.team_b_score, 0);
        assert_eq!(merged.clock, state.clock);
    }

    #[test]
    fn merge_keeps_unknown_keys() {
        let merged = fresh()
            .merged_with(parse_fields(r#"{"sponsorBanner": {"text": "Go"}}"#).unwrap())
            .unwrap();
        assert_eq!(merged.extra["sponsorBanner"], json!({"text": "Go"}));
        let again: Value = serde_json::from_str(&merged.to_json().unwrap()).unwrap();
        assert_eq!(again["sponsorBanner"]["text"], json!("Go"));
    }

    #[test]
    fn malformed_merge_is_rejected_whole() {
        let state = fresh();
        let err = state
            .merged_with(parse_fields(r#"{"teamAScore": 3, "gameTime": "soon"}"#).unwrap())
            .unwrap_err();
        assert!(matches!(err, StateError::Malformed(_)));
        assert!(matches!(parse_fields("[1, 2]"), Err(StateError::NotAnObject)));
        assert!(matches!(parse_fields("{"), Err(StateError::Parse(_))));
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = StatePatch {
            quarter: Some(3),
            ..StatePatch::default()
        }
        .clearing_timeout();
        let fields = patch.into_fields().unwrap();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields["quarter"], json!(3));
        assert_eq!(fields["timeoutTeam"], Value::Null);
        assert_eq!(fields["timeoutLastUpdate"], Value::Null);
        assert_eq!(fields["isTimeoutActive"], json!(false));
    }

    #[test]
    fn rebase_folds_elapsed_time_into_both_clocks() {
        let clock = ClockSnapshot {
            game_remaining: 10_000,
            shot_remaining: 8_000,
            running_game: true,
            running_shot: false,
            as_of: T,
        };
        let rebased = clock.rebase(T + 3_000);
        assert_eq!(rebased.game_remaining, 7_000);
        assert_eq!(rebased.shot_remaining, 8_000);
        assert_eq!(rebased.as_of, T + 3_000);
        assert_eq!(rebased.game_remaining_at(T + 4_000), clock.game_remaining_at(T + 4_000));
    }

    #[test]
    fn paused_rest_does_not_count_down() {
        let mut state = fresh();
        state.rest_active = true;
        state.rest_time_left = 60_000;
        state.rest_running = false;
        assert_eq!(state.current_rest(T + 10_000), 60_000);
        state.rest_running = true;
        assert_eq!(state.current_rest(T + 10_000), 50_000);
    }

    #[test]
    fn timeout_falls_back_to_shared_timestamp() {
        let mut state = fresh();
        assert_eq!(state.current_timeout_secs(T + 5_000), 0);
        state.is_timeout_active = true;
        state.timeout_time_left = 60;
        assert_eq!(state.current_timeout_secs(T + 5_000), 55);
    }

    #[test]
    fn team_parses_from_console_input() {
        assert_eq!("a".parse::<Team>(), Ok(Team::A));
        assert_eq!(" B ".parse::<Team>(), Ok(Team::B));
        assert!("C".parse::<Team>().is_err());
        assert_eq!(Team::A.other(), Team::B);
    }
}
