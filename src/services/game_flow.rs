use tracing::{debug, info};

use crate::{
    clock::{Timestamp, secs_to_ms},
    dto::settings::SettingsUpdate,
    state::{
        ClockSnapshot, ScoreboardState, SharedStore, StatePatch, Team,
        scoreboard::SHOT_CLOCK_FULL_MS,
    },
};

/// Compound scoreboard transitions that keep the clock and period invariants.
///
/// Every operation reads the current state, builds one patch and hands it to
/// [`ScoreboardStore::update_state`](crate::state::ScoreboardStore::update_state);
/// nothing here returns an error. Out-of-range input is clamped and requests
/// that make no sense for the current state are logged and ignored.
#[derive(Clone)]
pub struct GameFlow {
    store: SharedStore,
}

impl GameFlow {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Move to the next regulation quarter and start the break before it.
    ///
    /// Ignored once the last regulation quarter is reached; overtime is
    /// entered through [`start_overtime`](Self::start_overtime).
    pub fn advance_quarter(&self) {
        let state = self.store.get_state();
        if state.quarter >= state.total_quarters {
            debug!(
                quarter = state.quarter,
                total_quarters = state.total_quarters,
                "ignoring quarter advance past the last regulation quarter"
            );
            return;
        }

        self.enter_period(&state, state.default_game_time);
        self.start_rest(state.rest_between_quarters);
    }

    /// Start an overtime period after a tied final period.
    pub fn start_overtime(&self) {
        let state = self.store.get_state();
        if state.quarter < state.total_quarters || !state.scores_tied() {
            debug!(
                quarter = state.quarter,
                team_a = state.team_a_score,
                team_b = state.team_b_score,
                "ignoring overtime request; regulation not over or scores not tied"
            );
            return;
        }

        self.enter_period(&state, state.overtime_duration);
        self.start_rest(state.rest_between_quarters);
    }

    fn enter_period(&self, state: &ScoreboardState, game_time: u64) {
        let now = self.store.now();
        let quarter = state.quarter + 1;
        info!(quarter, "entering next period");

        self.store.update_state(
            StatePatch {
                quarter: Some(quarter),
                team_a_fouls: Some(0),
                team_b_fouls: Some(0),
                ..StatePatch::default()
            }
            .with_clock(fresh_clock(game_time, now))
            .clearing_timeout(),
        );
    }

    /// Reset both clocks and the fouls of the current quarter.
    pub fn reset_quarter(&self) {
        let state = self.store.get_state();
        let now = self.store.now();

        self.store.update_state(
            StatePatch {
                team_a_fouls: Some(0),
                team_b_fouls: Some(0),
                rest_active: Some(false),
                rest_time_left: Some(0),
                rest_last_update: Some(now),
                ..StatePatch::default()
            }
            .with_clock(fresh_clock(state.default_game_time, now)),
        );
    }

    /// Back to the first quarter with a clean sheet; names, colors and
    /// durations are kept.
    pub fn reset_game(&self) {
        let state = self.store.get_state();
        let now = self.store.now();
        info!("resetting game");

        self.store.update_state(
            StatePatch {
                quarter: Some(1),
                team_a_score: Some(0),
                team_b_score: Some(0),
                team_a_fouls: Some(0),
                team_b_fouls: Some(0),
                team_a_timeouts: Some(state.timeouts_per_team),
                team_b_timeouts: Some(state.timeouts_per_team),
                possession: Some(Some(Team::A)),
                rest_active: Some(false),
                rest_time_left: Some(0),
                rest_last_update: Some(now),
                rest_running: Some(true),
                ..StatePatch::default()
            }
            .with_clock(fresh_clock(state.default_game_time, now))
            .clearing_timeout(),
        );
    }

    /// Start a rest of `seconds` and pause both main clocks.
    ///
    /// An active timeout keeps counting.
    pub fn start_rest(&self, seconds: u32) {
        let now = self.store.now();
        let clock = self.store.get_state().clock.rebase(now).with_running(false, false);

        self.store.update_state(
            StatePatch {
                rest_active: Some(true),
                rest_running: Some(true),
                rest_time_left: Some(secs_to_ms(seconds)),
                rest_last_update: Some(now),
                ..StatePatch::default()
            }
            .with_clock(clock),
        );
    }

    /// End the rest early. The main clocks stay paused.
    pub fn stop_rest(&self) {
        self.store.update_state(StatePatch {
            rest_active: Some(false),
            rest_time_left: Some(0),
            rest_last_update: Some(self.store.now()),
            ..StatePatch::default()
        });
    }

    pub fn pause_rest(&self) {
        let state = self.store.get_state();
        if !state.rest_active || !state.rest_running {
            debug!("ignoring rest pause; no running rest");
            return;
        }
        let now = self.store.now();

        self.store.update_state(StatePatch {
            rest_time_left: Some(state.current_rest(now)),
            rest_running: Some(false),
            rest_last_update: Some(now),
            ..StatePatch::default()
        });
    }

    pub fn resume_rest(&self) {
        let state = self.store.get_state();
        if !state.rest_active || state.rest_running {
            debug!("ignoring rest resume; no paused rest");
            return;
        }

        self.store.update_state(StatePatch {
            rest_running: Some(true),
            rest_last_update: Some(self.store.now()),
            ..StatePatch::default()
        });
    }

    /// Charge `team` a timeout and start the timeout countdown.
    pub fn use_timeout(&self, team: Team) {
        let state = self.store.get_state();
        let remaining = state.timeouts(team);
        if remaining == 0 {
            debug!(%team, "ignoring timeout request; none remaining");
            return;
        }

        self.store.update_state(
            StatePatch {
                is_timeout_active: Some(true),
                timeout_team: Some(Some(team)),
                timeout_time_left: Some(state.timeout_duration),
                timeout_last_update: Some(Some(self.store.now())),
                ..StatePatch::default()
            }
            .with_timeouts(team, remaining - 1),
        );
    }

    pub fn end_timeout(&self) {
        self.store.update_state(StatePatch::default().clearing_timeout());
    }

    /// Add `delta` points; a basket hands possession to the other side.
    pub fn change_score(&self, team: Team, delta: i32) {
        let state = self.store.get_state();
        let mut patch = StatePatch::default().with_score(team, apply_delta(state.score(team), delta));
        if delta > 0 {
            patch.possession = Some(Some(team.other()));
        }
        self.store.update_state(patch);
    }

    pub fn change_fouls(&self, team: Team, delta: i32) {
        let state = self.store.get_state();
        self.store.update_state(
            StatePatch::default().with_fouls(team, apply_delta(state.fouls(team), delta)),
        );
    }

    pub fn change_timeouts(&self, team: Team, delta: i32) {
        let state = self.store.get_state();
        self.store.update_state(
            StatePatch::default().with_timeouts(team, apply_delta(state.timeouts(team), delta)),
        );
    }

    /// Set the game clock to `millis`, clamped to the quarter length.
    pub fn apply_game_edit(&self, millis: i64) {
        let state = self.store.get_state();
        let mut clock = state.clock.rebase(self.store.now());
        clock.game_remaining = clamp_millis(millis, state.default_game_time);
        self.store.update_state(StatePatch::default().with_clock(clock));
    }

    /// Set the shot clock to `millis`, clamped to a full shot clock.
    pub fn apply_shot_edit(&self, millis: i64) {
        let mut clock = self.rebased_clock();
        clock.shot_remaining = clamp_millis(millis, SHOT_CLOCK_FULL_MS);
        self.store.update_state(StatePatch::default().with_clock(clock));
    }

    pub fn toggle_game_clock(&self) {
        let clock = self.rebased_clock();
        self.write_clock(clock.with_running(!clock.running_game, clock.running_shot));
    }

    pub fn toggle_shot_clock(&self) {
        let clock = self.rebased_clock();
        self.write_clock(clock.with_running(clock.running_game, !clock.running_shot));
    }

    pub fn start_both_clocks(&self) {
        self.write_clock(self.rebased_clock().with_running(true, true));
    }

    pub fn stop_both_clocks(&self) {
        self.write_clock(self.rebased_clock().with_running(false, false));
    }

    /// Restart the shot clock from `seconds` (24 or 14 in play) and let it
    /// run. The game clock flag is left as it was.
    pub fn reset_shot_clock(&self, seconds: u32) {
        let mut clock = self.rebased_clock();
        clock.shot_remaining = secs_to_ms(seconds).min(SHOT_CLOCK_FULL_MS);
        clock.running_shot = true;
        self.write_clock(clock);
    }

    /// Space bar: stop both clocks when both run, otherwise toggle the game
    /// clock.
    pub fn space_pressed(&self) {
        let clock = self.rebased_clock();
        if clock.running_game && clock.running_shot {
            self.write_clock(clock.with_running(false, false));
        } else {
            self.write_clock(clock.with_running(!clock.running_game, clock.running_shot));
        }
    }

    /// Ctrl: start both clocks when both are stopped, otherwise toggle the
    /// shot clock.
    pub fn ctrl_pressed(&self) {
        let clock = self.rebased_clock();
        if !clock.running_game && !clock.running_shot {
            self.write_clock(clock.with_running(true, true));
        } else {
            self.write_clock(clock.with_running(clock.running_game, !clock.running_shot));
        }
    }

    pub fn set_possession(&self, team: Option<Team>) {
        self.store.update_state(StatePatch {
            possession: Some(team),
            ..StatePatch::default()
        });
    }

    /// Turnover: give the ball to the other side (A when nobody had it).
    pub fn flip_possession(&self) {
        let next = match self.store.get_state().possession {
            Some(team) => team.other(),
            None => Team::A,
        };
        self.set_possession(Some(next));
    }

    /// Exchange everything tied to a side between A and B.
    pub fn swap_sides(&self) {
        let state = self.store.get_state();

        self.store.update_state(StatePatch {
            team_a_name: Some(state.team_b_name),
            team_b_name: Some(state.team_a_name),
            team_a_color: Some(state.team_b_color),
            team_b_color: Some(state.team_a_color),
            team_a_score: Some(state.team_b_score),
            team_b_score: Some(state.team_a_score),
            team_a_fouls: Some(state.team_b_fouls),
            team_b_fouls: Some(state.team_a_fouls),
            team_a_timeouts: Some(state.team_b_timeouts),
            team_b_timeouts: Some(state.team_a_timeouts),
            possession: Some(state.possession.map(Team::other)),
            timeout_team: Some(state.timeout_team.map(Team::other)),
            ..StatePatch::default()
        });
    }

    /// Apply a batch from the settings surface in a single write.
    pub fn apply_settings(&self, settings: SettingsUpdate) {
        let patch = settings.into_patch();
        if patch == StatePatch::default() {
            debug!("ignoring empty settings update");
            return;
        }
        self.store.update_state(patch);
    }

    /// Close countdowns that ran out: an expired timeout is cleared and an
    /// expired running rest is stopped. Returns whether anything was written.
    ///
    /// Surfaces call this from their tick loop; the store never does it on
    /// its own.
    pub fn settle_expired(&self) -> bool {
        let state = self.store.get_state();
        let now = self.store.now();
        let mut settled = false;

        if state.is_timeout_active && state.current_timeout_secs(now) == 0 {
            debug!(team = ?state.timeout_team, "timeout expired");
            self.end_timeout();
            settled = true;
        }
        if state.rest_active && state.rest_running && state.current_rest(now) == 0 {
            debug!(quarter = state.quarter, "rest expired");
            self.stop_rest();
            settled = true;
        }
        settled
    }

    fn rebased_clock(&self) -> ClockSnapshot {
        self.store.get_state().clock.rebase(self.store.now())
    }

    fn write_clock(&self, clock: ClockSnapshot) {
        self.store.update_state(StatePatch::default().with_clock(clock));
    }
}

fn fresh_clock(game_time: u64, now: Timestamp) -> ClockSnapshot {
    ClockSnapshot {
        game_remaining: game_time,
        shot_remaining: SHOT_CLOCK_FULL_MS,
        running_game: false,
        running_shot: false,
        as_of: now,
    }
}

fn apply_delta(value: u32, delta: i32) -> u32 {
    let next = i64::from(value) + i64::from(delta);
    u32::try_from(next.max(0)).unwrap_or(u32::MAX)
}

fn clamp_millis(millis: i64, ceiling: u64) -> u64 {
    u64::try_from(millis).unwrap_or(0).min(ceiling)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        clock::{Clock, ManualClock},
        services::sync_service::StorageOrigin,
        state::{GameDefaults, ScoreboardStore},
    };

    const T: Timestamp = 1_700_000_000_000;

    fn flow() -> (GameFlow, ManualClock) {
        let clock = ManualClock::new(T);
        let store = ScoreboardStore::open(
            StorageOrigin::in_memory(),
            Arc::new(clock.clone()),
            &GameDefaults::default(),
        );
        (GameFlow::new(store), clock)
    }

    fn state(flow: &GameFlow) -> ScoreboardState {
        flow.store().get_state()
    }

    #[test]
    fn three_advances_reach_the_last_quarter_and_stop_there() {
        let (flow, _) = flow();
        for _ in 0..3 {
            flow.advance_quarter();
            flow.stop_rest();
        }
        assert_eq!(state(&flow).quarter, 4);

        let before = flow.store().revision();
        flow.advance_quarter();
        assert_eq!(state(&flow).quarter, 4);
        assert_eq!(flow.store().revision(), before);
    }

    #[test]
    fn advance_resets_period_and_starts_rest() {
        let (flow, clock) = flow();
        flow.start_both_clocks();
        flow.change_fouls(Team::A, 3);
        flow.change_score(Team::B, 2);
        flow.use_timeout(Team::A);
        clock.advance(5_000);

        flow.advance_quarter();
        let s = state(&flow);
        assert_eq!(s.quarter, 2);
        assert_eq!(s.clock.game_remaining, 720_000);
        assert_eq!(s.clock.shot_remaining, 24_000);
        assert!(!s.clock.running_game && !s.clock.running_shot);
        assert_eq!(s.clock.as_of, T + 5_000);
        assert_eq!((s.team_a_fouls, s.team_b_fouls), (0, 0));
        assert!(!s.is_timeout_active);
        assert_eq!(s.team_b_score, 2);
        assert!(s.rest_active);
        assert_eq!(s.rest_time_left, 120_000);
    }

    #[test]
    fn start_rest_pauses_both_clocks() {
        let (flow, clock) = flow();
        flow.start_both_clocks();
        clock.advance(4_000);

        flow.start_rest(60);
        let s = state(&flow);
        assert!(s.rest_active);
        assert_eq!(s.rest_time_left, 60_000);
        assert!(!s.clock.running_game);
        assert!(!s.clock.running_shot);
        assert_eq!(s.clock.game_remaining, 716_000);
        assert_eq!(s.clock.shot_remaining, 20_000);
    }

    #[test]
    fn rest_keeps_an_active_timeout() {
        let (flow, _) = flow();
        flow.use_timeout(Team::B);
        flow.start_rest(30);
        let s = state(&flow);
        assert!(s.is_timeout_active);
        assert_eq!(s.timeout_team, Some(Team::B));
    }

    #[test]
    fn stop_rest_leaves_clocks_paused() {
        let (flow, clock) = flow();
        flow.start_rest(60);
        clock.advance(10_000);
        flow.stop_rest();
        let s = state(&flow);
        assert!(!s.rest_active);
        assert_eq!(s.rest_time_left, 0);
        assert_eq!(s.rest_last_update, T + 10_000);
        assert!(!s.clock.running_game);
    }

    #[test]
    fn paused_rest_holds_its_remaining_time() {
        let (flow, clock) = flow();
        flow.start_rest(60);
        clock.advance(15_000);
        flow.pause_rest();
        clock.advance(30_000);
        assert_eq!(state(&flow).current_rest(clock.now_ms()), 45_000);

        flow.resume_rest();
        clock.advance(5_000);
        assert_eq!(state(&flow).current_rest(clock.now_ms()), 40_000);
    }

    #[test]
    fn timeout_with_none_left_changes_nothing() {
        let (flow, _) = flow();
        flow.change_timeouts(Team::A, -5);
        let before = state(&flow);
        assert_eq!(before.team_a_timeouts, 0);

        flow.use_timeout(Team::A);
        assert_eq!(state(&flow), before);
    }

    #[test]
    fn timeout_counts_down_independently_of_main_clocks() {
        let (flow, clock) = flow();
        flow.start_both_clocks();
        flow.use_timeout(Team::A);
        let s = state(&flow);
        assert!(s.is_timeout_active);
        assert_eq!(s.team_a_timeouts, 1);
        assert_eq!(s.timeout_time_left, 60);
        assert!(s.clock.running_game);

        clock.advance(20_500);
        assert_eq!(state(&flow).current_timeout_secs(clock.now_ms()), 40);

        flow.end_timeout();
        let s = state(&flow);
        assert!(!s.is_timeout_active);
        assert_eq!(s.timeout_team, None);
        assert_eq!(s.timeout_last_update, None);
    }

    #[test]
    fn scoring_flips_possession_but_corrections_do_not() {
        let (flow, _) = flow();
        assert_eq!(state(&flow).possession, Some(Team::A));

        flow.change_score(Team::A, 2);
        let s = state(&flow);
        assert_eq!(s.team_a_score, 2);
        assert_eq!(s.possession, Some(Team::B));

        flow.change_score(Team::A, -1);
        let s = state(&flow);
        assert_eq!(s.team_a_score, 1);
        assert_eq!(s.possession, Some(Team::B));

        flow.change_score(Team::A, -10);
        assert_eq!(state(&flow).team_a_score, 0);
    }

    #[test]
    fn clock_edits_clamp_and_keep_running_flags() {
        let (flow, clock) = flow();
        flow.toggle_game_clock();
        clock.advance(2_000);

        flow.apply_game_edit(900_000);
        let s = state(&flow);
        assert_eq!(s.clock.game_remaining, 720_000);
        assert!(s.clock.running_game);
        assert_eq!(s.clock.as_of, T + 2_000);

        flow.apply_shot_edit(-4);
        assert_eq!(state(&flow).clock.shot_remaining, 0);
        flow.apply_shot_edit(30_000);
        assert_eq!(state(&flow).clock.shot_remaining, 24_000);
    }

    #[test]
    fn editing_one_clock_does_not_rewind_the_other() {
        let (flow, clock) = flow();
        flow.start_both_clocks();
        clock.advance(6_000);

        flow.apply_game_edit(300_000);
        let now = clock.now_ms();
        assert_eq!(state(&flow).current_shot_clock(now), 18_000);
        assert_eq!(state(&flow).current_game_time(now), 300_000);
    }

    #[test]
    fn keyboard_shortcuts_follow_both_clock_rules() {
        let (flow, _) = flow();
        flow.ctrl_pressed();
        let s = state(&flow).clock;
        assert!(s.running_game && s.running_shot);

        flow.space_pressed();
        let s = state(&flow).clock;
        assert!(!s.running_game && !s.running_shot);

        flow.space_pressed();
        let s = state(&flow).clock;
        assert!(s.running_game && !s.running_shot);

        flow.ctrl_pressed();
        assert!(state(&flow).clock.running_shot);
    }

    #[test]
    fn shot_reset_runs_the_shot_clock_only() {
        let (flow, clock) = flow();
        clock.advance(1_000);
        flow.reset_shot_clock(14);
        let s = state(&flow).clock;
        assert_eq!(s.shot_remaining, 14_000);
        assert!(s.running_shot);
        assert!(!s.running_game);

        flow.reset_shot_clock(40);
        assert_eq!(state(&flow).clock.shot_remaining, 24_000);
    }

    #[test]
    fn reset_quarter_keeps_scores_and_quarter() {
        let (flow, clock) = flow();
        flow.advance_quarter();
        flow.change_score(Team::A, 3);
        flow.change_fouls(Team::B, 2);
        flow.use_timeout(Team::B);
        flow.apply_game_edit(1_000);
        flow.start_both_clocks();
        assert!(state(&flow).rest_active);
        clock.advance(3_000);

        flow.reset_quarter();
        let s = state(&flow);
        assert_eq!(s.quarter, 2);
        assert_eq!(s.team_a_score, 3);
        assert_eq!(s.team_b_fouls, 0);
        assert_eq!(s.team_b_timeouts, 1);
        assert_eq!(s.clock.game_remaining, 720_000);
        assert_eq!(s.clock.shot_remaining, 24_000);
        assert!(!s.clock.running_game && !s.clock.running_shot);
        assert_eq!(s.clock.as_of, T + 3_000);
        assert!(!s.rest_active);
        assert_eq!(s.rest_time_left, 0);
        assert_eq!(s.rest_last_update, T + 3_000);
        assert_eq!(s.possession, Some(Team::B));

        clock.advance(10_000);
        assert_eq!(state(&flow).current_game_time(clock.now_ms()), 720_000);
    }

    #[test]
    fn reset_game_restores_a_clean_sheet() {
        let (flow, clock) = flow();
        flow.advance_quarter();
        flow.stop_rest();
        flow.change_score(Team::B, 5);
        flow.start_both_clocks();
        flow.use_timeout(Team::A);
        clock.advance(2_000);
        let s = state(&flow);
        assert!(s.clock.running_game && s.is_timeout_active);

        flow.reset_game();
        let s = state(&flow);
        assert_eq!(s.quarter, 1);
        assert_eq!((s.team_a_score, s.team_b_score), (0, 0));
        assert_eq!((s.team_a_timeouts, s.team_b_timeouts), (3, 3));
        assert!(!s.clock.running_game && !s.clock.running_shot);
        assert_eq!(s.clock.as_of, T + 2_000);
        assert_eq!(s.clock.game_remaining, 720_000);
        assert!(!s.is_timeout_active);
        assert_eq!(s.timeout_team, None);
        assert!(!s.rest_active);
        assert_eq!(s.possession, Some(Team::A));
    }

    #[test]
    fn overtime_requires_a_tie_after_regulation() {
        let (flow, _) = flow();
        flow.start_overtime();
        assert_eq!(state(&flow).quarter, 1);

        flow.store().update_state(StatePatch {
            quarter: Some(4),
            ..StatePatch::default()
        });
        flow.change_score(Team::A, 2);
        flow.start_overtime();
        assert_eq!(state(&flow).quarter, 4);

        flow.change_score(Team::B, 2);
        flow.start_overtime();
        let s = state(&flow);
        assert_eq!(s.quarter, 5);
        assert_eq!(s.clock.game_remaining, 300_000);
        assert!(s.rest_active);
    }

    #[test]
    fn swap_exchanges_sides() {
        let (flow, _) = flow();
        flow.change_score(Team::A, 7);
        flow.use_timeout(Team::A);

        flow.swap_sides();
        let s = state(&flow);
        assert_eq!(s.team_a_name, "Away Team");
        assert_eq!(s.team_b_name, "Home Team");
        assert_eq!((s.team_a_score, s.team_b_score), (0, 7));
        assert_eq!((s.team_a_timeouts, s.team_b_timeouts), (2, 1));
        assert_eq!(s.possession, Some(Team::A));
        assert_eq!(s.timeout_team, Some(Team::B));
    }

    #[test]
    fn flip_possession_defaults_to_a() {
        let (flow, _) = flow();
        flow.set_possession(None);
        flow.flip_possession();
        assert_eq!(state(&flow).possession, Some(Team::A));
        flow.flip_possession();
        assert_eq!(state(&flow).possession, Some(Team::B));
    }

    #[test]
    fn settle_expired_closes_finished_countdowns() {
        let (flow, clock) = flow();
        flow.use_timeout(Team::A);
        flow.start_rest(30);
        assert!(!flow.settle_expired());

        clock.advance(45_000);
        assert!(flow.settle_expired());
        let s = state(&flow);
        assert!(!s.rest_active);
        assert!(s.is_timeout_active);

        clock.advance(15_000);
        assert!(flow.settle_expired());
        assert!(!state(&flow).is_timeout_active);
        assert!(!flow.settle_expired());
    }
}
