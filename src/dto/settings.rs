use serde::Deserialize;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_color, validate_team_name},
    state::StatePatch,
};

/// Batch written by the settings surface.
///
/// Numbers arrive signed and unchecked; [`into_patch`](Self::into_patch)
/// clamps them to the ranges the scoreboard accepts. Names and colors are
/// checked through [`Validate`] before the batch is applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub team_a_name: Option<String>,
    #[serde(default)]
    pub team_b_name: Option<String>,
    #[serde(default)]
    pub team_a_color: Option<String>,
    #[serde(default)]
    pub team_b_color: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub timeout_duration: Option<i64>,
    /// Also resets both teams' remaining timeouts.
    #[serde(default)]
    pub timeouts_per_team: Option<i64>,
    /// Seconds.
    #[serde(default)]
    pub rest_between_quarters: Option<i64>,
    /// Milliseconds.
    #[serde(default)]
    pub default_game_time: Option<i64>,
    #[serde(default)]
    pub total_quarters: Option<i64>,
    /// Milliseconds.
    #[serde(default)]
    pub overtime_duration: Option<i64>,
    #[serde(default)]
    pub foul_limit: Option<i64>,
}

impl Validate for SettingsUpdate {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(ref name) = self.team_a_name {
            if let Err(e) = validate_team_name(name) {
                errors.add("team_a_name", e);
            }
        }
        if let Some(ref name) = self.team_b_name {
            if let Err(e) = validate_team_name(name) {
                errors.add("team_b_name", e);
            }
        }
        if let Some(ref color) = self.team_a_color {
            if let Err(e) = validate_color(color) {
                errors.add("team_a_color", e);
            }
        }
        if let Some(ref color) = self.team_b_color {
            if let Err(e) = validate_color(color) {
                errors.add("team_b_color", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl SettingsUpdate {
    /// Clamp every numeric field and turn the batch into a state patch.
    ///
    /// Negative values become 0 and `totalQuarters` is at least 1.
    pub fn into_patch(self) -> StatePatch {
        let timeouts_per_team = self.timeouts_per_team.map(clamp_u32);

        StatePatch {
            team_a_name: self.team_a_name.map(|name| name.trim().to_owned()),
            team_b_name: self.team_b_name.map(|name| name.trim().to_owned()),
            team_a_color: self.team_a_color,
            team_b_color: self.team_b_color,
            timeout_duration: self.timeout_duration.map(clamp_u32),
            timeouts_per_team,
            team_a_timeouts: timeouts_per_team,
            team_b_timeouts: timeouts_per_team,
            rest_between_quarters: self.rest_between_quarters.map(clamp_u32),
            default_game_time: self.default_game_time.map(clamp_u64),
            total_quarters: self.total_quarters.map(|total| clamp_u32(total).max(1)),
            overtime_duration: self.overtime_duration.map(clamp_u64),
            foul_limit: self.foul_limit.map(clamp_u32),
            ..StatePatch::default()
        }
    }
}

fn clamp_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn clamp_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_numbers_clamp_to_zero() {
        let patch = SettingsUpdate {
            timeout_duration: Some(-30),
            default_game_time: Some(-1),
            total_quarters: Some(0),
            ..SettingsUpdate::default()
        }
        .into_patch();

        assert_eq!(patch.timeout_duration, Some(0));
        assert_eq!(patch.default_game_time, Some(0));
        assert_eq!(patch.total_quarters, Some(1));
        assert_eq!(patch.team_a_name, None);
    }

    #[test]
    fn per_team_timeouts_reset_both_counts() {
        let patch = SettingsUpdate {
            timeouts_per_team: Some(5),
            ..SettingsUpdate::default()
        }
        .into_patch();

        assert_eq!(patch.timeouts_per_team, Some(5));
        assert_eq!(patch.team_a_timeouts, Some(5));
        assert_eq!(patch.team_b_timeouts, Some(5));
    }

    #[test]
    fn parses_camel_case_batch() {
        let update: SettingsUpdate = serde_json::from_str(
            r##"{"teamAName": " Hawks ", "teamBColor": "#fff", "restBetweenQuarters": 90}"##,
        )
        .unwrap();
        assert!(update.validate().is_ok());

        let patch = update.into_patch();
        assert_eq!(patch.team_a_name.as_deref(), Some("Hawks"));
        assert_eq!(patch.rest_between_quarters, Some(90));
        assert!(serde_json::from_str::<SettingsUpdate>(r#"{"quarter": 3}"#).is_err());
    }

    #[test]
    fn rejects_bad_names_and_colors() {
        let update = SettingsUpdate {
            team_a_name: Some("  ".into()),
            team_b_color: Some("red".into()),
            ..SettingsUpdate::default()
        };
        let errors = update.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("team_a_name"));
        assert!(fields.contains_key("team_b_color"));
        assert!(!fields.contains_key("team_b_name"));
    }
}
