//! Line-oriented control surface: one text command per line, executed against
//! a [`GameFlow`].

use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use validator::{Validate, ValidationErrors};

use crate::{
    clock::MILLIS_PER_SECOND,
    dto::{readout::LiveReadout, settings::SettingsUpdate},
    services::game_flow::GameFlow,
    state::{Team, state_machine::QuarterFlow},
};

/// Printed for `help`.
pub const HELP: &str = "\
clocks:    start | stop | space | ctrl | game | shot | shot24 | shot14
score:     score <A|B> <delta> | foul <A|B> <delta> | timeouts <A|B> <delta>
timeouts:  timeout <A|B> | endtimeout
periods:   next | confirm | cancel | overtime | resetq | resetgame
rest:      rest <seconds> | stoprest | pauserest | resumerest
sides:     poss <A|B|none> | turnover | swap
edits:     edit game <m:ss> | edit shot <seconds>
settings:  settings <json> | set <key> <json>
other:     state | status | help | quit";

/// Errors raised while parsing a console line.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("empty command")]
    Empty,
    #[error("unknown command `{0}` (try `help`)")]
    Unknown(String),
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("`{command}`: invalid {argument} `{value}`")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
    #[error("invalid JSON")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Settings(#[from] ValidationErrors),
}

/// One parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartClocks,
    StopClocks,
    Space,
    Ctrl,
    ToggleGame,
    ToggleShot,
    ResetShot(u32),
    Score(Team, i32),
    Fouls(Team, i32),
    Timeouts(Team, i32),
    UseTimeout(Team),
    EndTimeout,
    NextQuarter,
    Confirm,
    Cancel,
    Overtime,
    StartRest(u32),
    StopRest,
    PauseRest,
    ResumeRest,
    ResetQuarter,
    ResetGame,
    Possession(Option<Team>),
    Turnover,
    Swap,
    /// Absolute game clock in milliseconds.
    EditGame(i64),
    /// Absolute shot clock in milliseconds.
    EditShot(i64),
    Settings(SettingsUpdate),
    /// Raw field write, kept verbatim even when the key is unknown.
    Set(String, Value),
    State,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let mut args = rest.split_whitespace();

        let command = match word.to_ascii_lowercase().as_str() {
            "" => return Err(ConsoleError::Empty),
            "start" => Command::StartClocks,
            "stop" => Command::StopClocks,
            "space" => Command::Space,
            "ctrl" => Command::Ctrl,
            "game" => Command::ToggleGame,
            "shot" => Command::ToggleShot,
            "shot24" => Command::ResetShot(24),
            "shot14" => Command::ResetShot(14),
            "score" => {
                let team = parse_team("score", args.next())?;
                Command::Score(team, parse_delta("score", args.next())?)
            }
            "foul" | "fouls" => {
                let team = parse_team("foul", args.next())?;
                Command::Fouls(team, parse_delta("foul", args.next())?)
            }
            "timeouts" => {
                let team = parse_team("timeouts", args.next())?;
                Command::Timeouts(team, parse_delta("timeouts", args.next())?)
            }
            "timeout" => Command::UseTimeout(parse_team("timeout", args.next())?),
            "endtimeout" => Command::EndTimeout,
            "next" => Command::NextQuarter,
            "confirm" => Command::Confirm,
            "cancel" => Command::Cancel,
            "overtime" => Command::Overtime,
            "rest" => {
                let value = args.next().ok_or(ConsoleError::MissingArgument {
                    command: "rest",
                    argument: "a duration in seconds",
                })?;
                let seconds = value.parse().map_err(|_| ConsoleError::InvalidArgument {
                    command: "rest",
                    argument: "seconds",
                    value: value.to_owned(),
                })?;
                Command::StartRest(seconds)
            }
            "stoprest" => Command::StopRest,
            "pauserest" => Command::PauseRest,
            "resumerest" => Command::ResumeRest,
            "resetq" => Command::ResetQuarter,
            "resetgame" => Command::ResetGame,
            "poss" => match args.next() {
                Some(value) if value.eq_ignore_ascii_case("none") => Command::Possession(None),
                value => Command::Possession(Some(parse_team("poss", value)?)),
            },
            "turnover" => Command::Turnover,
            "swap" => Command::Swap,
            "edit" => {
                let target = args.next().ok_or(ConsoleError::MissingArgument {
                    command: "edit",
                    argument: "`game` or `shot`",
                })?;
                let value = args.next().ok_or(ConsoleError::MissingArgument {
                    command: "edit",
                    argument: "a time such as 5:00 or 10",
                })?;
                let millis = parse_clock_input(value).ok_or(ConsoleError::InvalidArgument {
                    command: "edit",
                    argument: "time",
                    value: value.to_owned(),
                })?;
                match target {
                    "game" => Command::EditGame(millis),
                    "shot" => Command::EditShot(millis),
                    other => {
                        return Err(ConsoleError::InvalidArgument {
                            command: "edit",
                            argument: "target",
                            value: other.to_owned(),
                        });
                    }
                }
            }
            "settings" => {
                if rest.is_empty() {
                    return Err(ConsoleError::MissingArgument {
                        command: "settings",
                        argument: "a JSON object",
                    });
                }
                let update: SettingsUpdate = serde_json::from_str(rest)?;
                update.validate()?;
                Command::Settings(update)
            }
            "set" => {
                let (key, json) = rest.split_once(char::is_whitespace).ok_or(
                    ConsoleError::MissingArgument {
                        command: "set",
                        argument: "a key and a JSON value",
                    },
                )?;
                Command::Set(key.to_owned(), serde_json::from_str(json.trim())?)
            }
            "state" => Command::State,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            _ => return Err(ConsoleError::Unknown(word.to_owned())),
        };
        Ok(command)
    }
}

/// Parse `m:ss`, `m:ss.t` or plain seconds (`10`, `4.5`) into milliseconds.
///
/// Negative values are accepted here; the clock edits clamp them.
pub fn parse_clock_input(input: &str) -> Option<i64> {
    let input = input.trim();
    let (negative, input) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (minutes, seconds) = match input.split_once(':') {
        Some((minutes, seconds)) => (minutes.parse::<i64>().ok()?, seconds),
        None => (0, input),
    };
    let seconds: f64 = seconds.parse().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }

    let millis = minutes
        .checked_mul(60 * MILLIS_PER_SECOND as i64)?
        .checked_add((seconds * MILLIS_PER_SECOND as f64).round() as i64)?;
    Some(if negative { -millis } else { millis })
}

fn parse_team(command: &'static str, value: Option<&str>) -> Result<Team, ConsoleError> {
    let value = value.ok_or(ConsoleError::MissingArgument {
        command,
        argument: "a team (A or B)",
    })?;
    value.parse().map_err(|_| ConsoleError::InvalidArgument {
        command,
        argument: "team",
        value: value.to_owned(),
    })
}

fn parse_delta(command: &'static str, value: Option<&str>) -> Result<i32, ConsoleError> {
    let Some(value) = value else {
        return Ok(1);
    };
    value
        .trim_start_matches('+')
        .parse()
        .map_err(|_| ConsoleError::InvalidArgument {
            command,
            argument: "delta",
            value: value.to_owned(),
        })
}

/// What the surface should do after a command ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Done,
    Message(String),
    Quit,
}

/// Control surface state: the flow it drives and its pending confirmation.
pub struct Console {
    flow: GameFlow,
    quarters: QuarterFlow,
}

impl Console {
    pub fn new(flow: GameFlow) -> Self {
        Self {
            flow,
            quarters: QuarterFlow::new(),
        }
    }

    pub fn flow(&self) -> &GameFlow {
        &self.flow
    }

    /// Parse and run one input line; parse errors come back as a message.
    pub fn handle_line(&mut self, line: &str) -> Reply {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command),
            Err(ConsoleError::Empty) => Reply::Done,
            Err(err) => Reply::Message(err.to_string()),
        }
    }

    pub fn execute(&mut self, command: Command) -> Reply {
        debug!(?command, "console command");
        let flow = &self.flow;

        match command {
            Command::StartClocks => flow.start_both_clocks(),
            Command::StopClocks => flow.stop_both_clocks(),
            Command::Space => flow.space_pressed(),
            Command::Ctrl => flow.ctrl_pressed(),
            Command::ToggleGame => flow.toggle_game_clock(),
            Command::ToggleShot => flow.toggle_shot_clock(),
            Command::ResetShot(seconds) => flow.reset_shot_clock(seconds),
            Command::Score(team, delta) => flow.change_score(team, delta),
            Command::Fouls(team, delta) => flow.change_fouls(team, delta),
            Command::Timeouts(team, delta) => flow.change_timeouts(team, delta),
            Command::UseTimeout(team) => flow.use_timeout(team),
            Command::EndTimeout => flow.end_timeout(),
            Command::NextQuarter => {
                let state = flow.store().get_state();
                return match self.quarters.request_advance(&state, flow.store().now()) {
                    Ok(pending) => Reply::Message(format!(
                        "advance to quarter {}? type `confirm` or `cancel`",
                        pending.to_quarter
                    )),
                    Err(err) => Reply::Message(err.to_string()),
                };
            }
            Command::Confirm => {
                let Some(id) = self.quarters.pending().map(|pending| pending.id) else {
                    return Reply::Message("nothing to confirm".into());
                };
                return match self.quarters.confirm(id, flow) {
                    Ok(quarter) => {
                        info!(quarter, "quarter advance confirmed");
                        Reply::Message(format!("rest before quarter {quarter} started"))
                    }
                    Err(err) => Reply::Message(err.to_string()),
                };
            }
            Command::Cancel => {
                let Some(id) = self.quarters.pending().map(|pending| pending.id) else {
                    return Reply::Message("nothing to cancel".into());
                };
                return match self.quarters.cancel(id) {
                    Ok(()) => Reply::Message("quarter advance cancelled".into()),
                    Err(err) => Reply::Message(err.to_string()),
                };
            }
            Command::Overtime => flow.start_overtime(),
            Command::StartRest(seconds) => flow.start_rest(seconds),
            Command::StopRest => flow.stop_rest(),
            Command::PauseRest => flow.pause_rest(),
            Command::ResumeRest => flow.resume_rest(),
            Command::ResetQuarter => flow.reset_quarter(),
            Command::ResetGame => flow.reset_game(),
            Command::Possession(team) => flow.set_possession(team),
            Command::Turnover => flow.flip_possession(),
            Command::Swap => flow.swap_sides(),
            Command::EditGame(millis) => flow.apply_game_edit(millis),
            Command::EditShot(millis) => flow.apply_shot_edit(millis),
            Command::Settings(update) => flow.apply_settings(update),
            Command::Set(key, value) => {
                let mut fields = Map::new();
                fields.insert(key, value);
                flow.store().update_raw(fields);
            }
            Command::State => {
                return match serde_json::to_string_pretty(&flow.store().get_state()) {
                    Ok(json) => Reply::Message(json),
                    Err(err) => Reply::Message(format!("failed to render state: {err}")),
                };
            }
            Command::Status => {
                let readout = LiveReadout::capture(&flow.store().get_state(), flow.store().now());
                return Reply::Message(readout.render_line());
            }
            Command::Help => return Reply::Message(HELP.into()),
            Command::Quit => return Reply::Quit,
        }
        Reply::Done
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        clock::ManualClock,
        services::sync_service::StorageOrigin,
        state::{GameDefaults, ScoreboardStore},
    };

    fn console() -> Console {
        let store = ScoreboardStore::open(
            StorageOrigin::in_memory(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            &GameDefaults::default(),
        );
        Console::new(GameFlow::new(store))
    }

    #[test]
    fn parses_team_commands() {
        assert_eq!("score A 2".parse::<Command>().unwrap(), Command::Score(Team::A, 2));
        assert_eq!("foul b".parse::<Command>().unwrap(), Command::Fouls(Team::B, 1));
        assert_eq!(
            "timeouts A -1".parse::<Command>().unwrap(),
            Command::Timeouts(Team::A, -1)
        );
        assert_eq!("poss none".parse::<Command>().unwrap(), Command::Possession(None));
        assert!(matches!(
            "score C 2".parse::<Command>(),
            Err(ConsoleError::InvalidArgument { argument: "team", .. })
        ));
        assert!(matches!(
            "timeout".parse::<Command>(),
            Err(ConsoleError::MissingArgument { .. })
        ));
    }

    #[test]
    fn parses_clock_edits() {
        assert_eq!(parse_clock_input("5:00"), Some(300_000));
        assert_eq!(parse_clock_input("0:07.5"), Some(7_500));
        assert_eq!(parse_clock_input("10"), Some(10_000));
        assert_eq!(parse_clock_input("-3"), Some(-3_000));
        assert_eq!(parse_clock_input("five"), None);
        assert_eq!(
            "edit game 5:00".parse::<Command>().unwrap(),
            Command::EditGame(300_000)
        );
        assert_eq!("edit shot 10".parse::<Command>().unwrap(), Command::EditShot(10_000));
    }

    #[test]
    fn settings_are_validated_while_parsing() {
        let command: Command = r##"settings {"teamAName": "Hawks", "teamAColor": "#123456"}"##
            .parse()
            .unwrap();
        assert!(matches!(command, Command::Settings(_)));
        assert!(matches!(
            r#"settings {"teamAColor": "red"}"#.parse::<Command>(),
            Err(ConsoleError::Settings(_))
        ));
        assert!(matches!(
            "settings {".parse::<Command>(),
            Err(ConsoleError::Json(_))
        ));
    }

    #[test]
    fn next_quarter_waits_for_confirmation() {
        let mut console = console();
        assert!(matches!(console.handle_line("next"), Reply::Message(_)));
        assert_eq!(console.flow().store().get_state().quarter, 1);

        console.handle_line("confirm");
        let state = console.flow().store().get_state();
        assert_eq!(state.quarter, 2);
        assert!(state.rest_active);

        console.handle_line("next");
        console.handle_line("cancel");
        assert_eq!(console.flow().store().get_state().quarter, 2);
        assert_eq!(
            console.handle_line("confirm"),
            Reply::Message("nothing to confirm".into())
        );
    }

    #[test]
    fn runs_commands_against_the_store() {
        let mut console = console();
        assert_eq!(console.handle_line("score A 3"), Reply::Done);
        assert_eq!(console.handle_line("set sponsor \"Acme\""), Reply::Done);
        assert_eq!(console.handle_line(""), Reply::Done);
        assert_eq!(console.handle_line("quit"), Reply::Quit);

        let state = console.flow().store().get_state();
        assert_eq!(state.team_a_score, 3);
        assert_eq!(state.possession, Some(Team::B));
        assert_eq!(state.extra["sponsor"], json!("Acme"));

        let Reply::Message(line) = console.handle_line("status") else {
            panic!("status should print the readout");
        };
        assert!(line.contains("Home Team 3"));
        assert!(matches!(console.handle_line("dance"), Reply::Message(_)));
    }
}
