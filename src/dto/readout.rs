//! Per-tick view of the scoreboard with every countdown evaluated at `now`.

use serde::Serialize;

use crate::{
    clock::{MILLIS_PER_SECOND, Timestamp},
    state::{ScoreboardState, Team, state_machine::GameStatus},
};

/// What a surface renders on one poll.
///
/// Cheap to build and compare, so a display loop can capture one per tick and
/// redraw only when it differs from the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveReadout {
    pub team_a_name: String,
    pub team_b_name: String,
    pub total_quarters: u32,
    pub team_a_score: u32,
    pub team_b_score: u32,
    pub team_a_fouls: u32,
    pub team_b_fouls: u32,
    pub team_a_timeouts: u32,
    pub team_b_timeouts: u32,
    pub team_a_bonus: bool,
    pub team_b_bonus: bool,
    pub possession: Option<Team>,
    pub game_time_ms: u64,
    pub shot_clock_ms: u64,
    pub game_running: bool,
    pub shot_running: bool,
    /// Present while a rest is active.
    pub rest_ms: Option<u64>,
    /// Present while a timeout is active.
    pub timeout_secs: Option<u32>,
    pub timeout_team: Option<Team>,
    pub status: GameStatus,
}

impl LiveReadout {
    pub fn capture(state: &ScoreboardState, now: Timestamp) -> Self {
        Self {
            team_a_name: state.team_a_name.clone(),
            team_b_name: state.team_b_name.clone(),
            total_quarters: state.total_quarters,
            team_a_score: state.team_a_score,
            team_b_score: state.team_b_score,
            team_a_fouls: state.team_a_fouls,
            team_b_fouls: state.team_b_fouls,
            team_a_timeouts: state.team_a_timeouts,
            team_b_timeouts: state.team_b_timeouts,
            team_a_bonus: state.in_bonus(Team::A),
            team_b_bonus: state.in_bonus(Team::B),
            possession: state.possession,
            game_time_ms: state.current_game_time(now),
            shot_clock_ms: state.current_shot_clock(now),
            game_running: state.clock.running_game,
            shot_running: state.clock.running_shot,
            rest_ms: state.rest_active.then(|| state.current_rest(now)),
            timeout_secs: state
                .is_timeout_active
                .then(|| state.current_timeout_secs(now)),
            timeout_team: state.timeout_team,
            status: GameStatus::of(state, now),
        }
    }

    /// Single console line for the spectator view.
    pub fn render_line(&self) -> String {
        let possession = |team: Team| if self.possession == Some(team) { "◀" } else { " " };
        let bonus = |on: bool| if on { " BONUS" } else { "" };
        let quarter = self.status.phase.quarter();
        let period = if self.status.overtime {
            format!("OT{}", quarter - self.total_quarters)
        } else {
            format!("Q{quarter}")
        };

        let mut line = format!(
            "{period} {game} | shot {shot} | {a} {a_score}{a_pos} F{a_fouls}{a_bonus} T{a_to} - {b_pos}{b_score} {b} F{b_fouls}{b_bonus} T{b_to}",
            game = format_game_time(self.game_time_ms),
            shot = format_shot_clock(self.shot_clock_ms),
            a = self.team_a_name,
            a_score = self.team_a_score,
            a_pos = possession(Team::A),
            a_fouls = self.team_a_fouls,
            a_bonus = bonus(self.team_a_bonus),
            a_to = self.team_a_timeouts,
            b = self.team_b_name,
            b_score = self.team_b_score,
            b_pos = possession(Team::B),
            b_fouls = self.team_b_fouls,
            b_bonus = bonus(self.team_b_bonus),
            b_to = self.team_b_timeouts,
        );
        if let Some(rest) = self.rest_ms {
            line.push_str(&format!(" | rest {}", format_rest_time(rest)));
        }
        if let Some(secs) = self.timeout_secs {
            let team = self.timeout_team.map(|team| team.to_string()).unwrap_or_default();
            line.push_str(&format!(" | timeout {team} {}", format_timeout(secs)));
        }
        if self.status.complete {
            line.push_str(" | FINAL");
        }
        line
    }
}

/// `m:ss` from a minute up, tenths of a second below it.
pub fn format_game_time(ms: u64) -> String {
    let total_secs = ms / MILLIS_PER_SECOND;
    if total_secs >= 60 {
        format!("{}:{:02}", total_secs / 60, total_secs % 60)
    } else {
        format_tenths(ms)
    }
}

/// Whole seconds rounded up from five seconds, tenths below.
pub fn format_shot_clock(ms: u64) -> String {
    let total_secs = ms.div_ceil(MILLIS_PER_SECOND);
    if total_secs >= 5 {
        total_secs.to_string()
    } else {
        format_tenths(ms)
    }
}

/// `m:ss` rounded up, so a rest shows `0:01` until it is really over.
pub fn format_rest_time(ms: u64) -> String {
    let total_secs = ms.div_ceil(MILLIS_PER_SECOND);
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

pub fn format_timeout(secs: u32) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn format_tenths(ms: u64) -> String {
    let tenths = (ms + 50) / 100;
    format!("{}.{}", tenths / 10, tenths % 10)
}
