//! Validation helpers shared by the settings batch and the configuration file.

use validator::ValidationError;

/// Longest team name the surfaces can lay out.
pub const MAX_TEAM_NAME_LENGTH: usize = 32;

/// Validates a CSS hex color: `#` followed by 3 or 6 hexadecimal digits.
///
/// # Examples
///
/// ```ignore
/// validate_color("#1e40af") // Ok
/// validate_color("#fff")    // Ok
/// validate_color("1e40af")  // Err - missing '#'
/// validate_color("#12345")  // Err - wrong length
/// ```
pub fn validate_color(color: &str) -> Result<(), ValidationError> {
    let Some(digits) = color.strip_prefix('#') else {
        let mut err = ValidationError::new("color_prefix");
        err.message = Some(format!("Color `{color}` must start with '#'").into());
        return Err(err);
    };

    if !matches!(digits.len(), 3 | 6) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        let mut err = ValidationError::new("color_format");
        err.message =
            Some(format!("Color `{color}` must have 3 or 6 hexadecimal digits").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a team name is not blank and fits on the display.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let length = name.trim().chars().count();
    if length == 0 {
        let mut err = ValidationError::new("team_name_empty");
        err.message = Some("Team name must not be empty".into());
        return Err(err);
    }
    if length > MAX_TEAM_NAME_LENGTH {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must be at most {MAX_TEAM_NAME_LENGTH} characters (got {length})")
                .into(),
        );
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_color_valid() {
        assert!(validate_color("#1e40af").is_ok());
        assert!(validate_color("#DC2626").is_ok());
        assert!(validate_color("#fff").is_ok());
    }

    #[test]
    fn test_validate_color_invalid() {
        assert!(validate_color("1e40af").is_err()); // no prefix
        assert!(validate_color("#12345").is_err()); // wrong length
        assert!(validate_color("#gggggg").is_err()); // not hex
        assert!(validate_color("").is_err());
    }

    #[test]
    fn test_validate_team_name() {
        assert!(validate_team_name("Home Team").is_ok());
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name(&"x".repeat(MAX_TEAM_NAME_LENGTH + 1)).is_err());
    }
}
