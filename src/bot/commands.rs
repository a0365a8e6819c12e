//! Command parsing for incoming text messages

use lazy_static::lazy_static;
use regex::Regex;

/// Days shown by `/pastmacros` without an argument
pub const DEFAULT_PAST_DAYS: u32 = 3;
/// Largest accepted `/pastmacros` argument
pub const MAX_PAST_DAYS: u32 = 30;

lazy_static! {
    static ref COMMAND_REGEX: Regex = Regex::new(r"^/([A-Za-z_]+)(?:@\w+)?(?:\s+(.*))?$")
        .expect("Command pattern should be valid");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Today,
    /// Raw argument, validated by [`parse_past_days`]
    PastDays(Option<String>),
    Remove,
    Favorites,
    ManageFavorites,
    Unknown(String),
}

/// `None` for plain text that should be treated as a food entry
pub fn parse_command(text: &str) -> Option<Command> {
    let caps = COMMAND_REGEX.captures(text.trim())?;
    let name = caps[1].to_ascii_lowercase();
    let arg = caps
        .get(2)
        .map(|m| m.as_str().trim().to_string())
        .filter(|a| !a.is_empty());

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "todaymacros" | "today" | "t" => Command::Today,
        "pastmacros" | "past" => Command::PastDays(arg),
        "remove" | "r" => Command::Remove,
        "favorites" | "fav" => Command::Favorites,
        "managefavorites" => Command::ManageFavorites,
        _ => Command::Unknown(name),
    };
    Some(command)
}

/// Number of past days requested, or `None` when out of `1..=MAX_PAST_DAYS`
pub fn parse_past_days(arg: Option<&str>) -> Option<u32> {
    match arg {
        None => Some(DEFAULT_PAST_DAYS),
        Some(arg) => arg
            .parse::<u32>()
            .ok()
            .filter(|days| (1..=MAX_PAST_DAYS).contains(days)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(parse_command("100g chicken breast, 50g rice"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("/ oops"), None);
    }

    #[test]
    fn test_commands_and_aliases() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/todaymacros"), Some(Command::Today));
        assert_eq!(parse_command("/t"), Some(Command::Today));
        assert_eq!(parse_command("/r"), Some(Command::Remove));
        assert_eq!(parse_command("/Favorites"), Some(Command::Favorites));
        assert_eq!(parse_command("/managefavorites@MacroMateBot"), Some(Command::ManageFavorites));
        assert_eq!(parse_command("/dance"), Some(Command::Unknown("dance".to_string())));
    }

    #[test]
    fn test_past_days_argument() {
        assert_eq!(parse_command("/pastmacros"), Some(Command::PastDays(None)));
        assert_eq!(
            parse_command("/pastmacros  7 "),
            Some(Command::PastDays(Some("7".to_string())))
        );

        assert_eq!(parse_past_days(None), Some(3));
        assert_eq!(parse_past_days(Some("7")), Some(7));
        assert_eq!(parse_past_days(Some("30")), Some(30));
        assert_eq!(parse_past_days(Some("31")), None);
        assert_eq!(parse_past_days(Some("0")), None);
        assert_eq!(parse_past_days(Some("-2")), None);
        assert_eq!(parse_past_days(Some("week")), None);
    }
}
