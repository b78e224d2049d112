//! Pending-input state machine — settings prompts answered by free text.
//!
//! A command puts the session into one of the awaiting states; the user's
//! next free-text message is consumed here instead of reaching the chat
//! path. Invalid input leaves the state armed so the user can just resend.

/// What the next free-text message from a user will be interpreted as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingInput {
    Temperature,
    TopP,
    MaxTokens,
    SystemPrompt,
}

/// A validated value ready to be stored on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingValue {
    Temperature(f64),
    TopP(f64),
    MaxTokens(u32),
    SystemPrompt(String),
}

/// Result of feeding a free-text answer into an awaiting state.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOutcome {
    /// The value was accepted and stored; reply with this confirmation.
    Applied { confirmation: String },
    /// The answer failed validation; the awaiting state stays armed and the
    /// stored value is unchanged.
    Rejected { reason: &'static str },
}

pub const ERR_TEMPERATURE: &str =
    "Invalid temperature. Send a number between 0.0 and 2.0, e.g. 0.7.";
pub const ERR_TOP_P: &str = "Invalid top_p. Send a number between 0.0 and 1.0, e.g. 0.9.";
pub const ERR_MAX_TOKENS: &str =
    "Invalid max_tokens. Send a whole number greater than 0, e.g. 512.";

impl PendingInput {
    /// Validate a free-text answer for this awaiting state.
    ///
    /// Decimal answers accept both `.` and `,` as the separator.
    pub fn resolve(self, text: &str) -> Result<PendingValue, &'static str> {
        match self {
            Self::Temperature => {
                let v = parse_decimal(text).ok_or(ERR_TEMPERATURE)?;
                if (0.0..=2.0).contains(&v) {
                    Ok(PendingValue::Temperature(v))
                } else {
                    Err(ERR_TEMPERATURE)
                }
            }
            Self::TopP => {
                let v = parse_decimal(text).ok_or(ERR_TOP_P)?;
                if (0.0..=1.0).contains(&v) {
                    Ok(PendingValue::TopP(v))
                } else {
                    Err(ERR_TOP_P)
                }
            }
            Self::MaxTokens => match text.trim().parse::<u32>() {
                Ok(v) if v > 0 => Ok(PendingValue::MaxTokens(v)),
                _ => Err(ERR_MAX_TOKENS),
            },
            // Stored verbatim; an empty answer clears the prompt, later
            // turns then omit the system message.
            Self::SystemPrompt => Ok(PendingValue::SystemPrompt(text.to_string())),
        }
    }
}

impl PendingValue {
    /// Confirmation line echoed back to the user on success.
    pub fn confirmation(&self) -> String {
        match self {
            Self::Temperature(v) => format!("temperature = {}", v),
            Self::TopP(v) => format!("top_p = {}", v),
            Self::MaxTokens(v) => format!("max_tokens = {}", v),
            Self::SystemPrompt(s) => {
                if s.is_empty() {
                    "System prompt cleared.".to_string()
                } else {
                    "System prompt set.".to_string()
                }
            }
        }
    }
}

fn parse_decimal(text: &str) -> Option<f64> {
    text.trim().replace(',', ".").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_accepts_period_and_comma() {
        assert_eq!(
            PendingInput::Temperature.resolve("1.5"),
            Ok(PendingValue::Temperature(1.5))
        );
        assert_eq!(
            PendingInput::Temperature.resolve("1,5"),
            Ok(PendingValue::Temperature(1.5))
        );
    }

    #[test]
    fn temperature_rejects_out_of_range() {
        assert_eq!(
            PendingInput::Temperature.resolve("3"),
            Err(ERR_TEMPERATURE)
        );
        assert_eq!(
            PendingInput::Temperature.resolve("-0.1"),
            Err(ERR_TEMPERATURE)
        );
    }

    #[test]
    fn temperature_rejects_unparseable() {
        assert_eq!(
            PendingInput::Temperature.resolve("abc"),
            Err(ERR_TEMPERATURE)
        );
        assert_eq!(PendingInput::Temperature.resolve(""), Err(ERR_TEMPERATURE));
    }

    #[test]
    fn temperature_rejects_nan() {
        assert_eq!(
            PendingInput::Temperature.resolve("NaN"),
            Err(ERR_TEMPERATURE)
        );
    }

    #[test]
    fn temperature_accepts_bounds() {
        assert_eq!(
            PendingInput::Temperature.resolve("0.0"),
            Ok(PendingValue::Temperature(0.0))
        );
        assert_eq!(
            PendingInput::Temperature.resolve("2,0"),
            Ok(PendingValue::Temperature(2.0))
        );
    }

    #[test]
    fn top_p_range_is_tighter() {
        assert_eq!(
            PendingInput::TopP.resolve("0,9"),
            Ok(PendingValue::TopP(0.9))
        );
        assert_eq!(PendingInput::TopP.resolve("1.5"), Err(ERR_TOP_P));
    }

    #[test]
    fn max_tokens_must_be_positive_integer() {
        assert_eq!(
            PendingInput::MaxTokens.resolve("512"),
            Ok(PendingValue::MaxTokens(512))
        );
        assert_eq!(PendingInput::MaxTokens.resolve("0"), Err(ERR_MAX_TOKENS));
        assert_eq!(PendingInput::MaxTokens.resolve("-5"), Err(ERR_MAX_TOKENS));
        assert_eq!(PendingInput::MaxTokens.resolve("1.5"), Err(ERR_MAX_TOKENS));
        assert_eq!(PendingInput::MaxTokens.resolve("abc"), Err(ERR_MAX_TOKENS));
    }

    #[test]
    fn system_prompt_is_verbatim() {
        assert_eq!(
            PendingInput::SystemPrompt.resolve("You are terse."),
            Ok(PendingValue::SystemPrompt("You are terse.".to_string()))
        );
        assert_eq!(
            PendingInput::SystemPrompt.resolve(""),
            Ok(PendingValue::SystemPrompt(String::new()))
        );
    }

    #[test]
    fn confirmations_echo_the_value() {
        assert_eq!(
            PendingValue::Temperature(1.5).confirmation(),
            "temperature = 1.5"
        );
        assert_eq!(PendingValue::MaxTokens(64).confirmation(), "max_tokens = 64");
        assert_eq!(
            PendingValue::SystemPrompt(String::new()).confirmation(),
            "System prompt cleared."
        );
    }
}
