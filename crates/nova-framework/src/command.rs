//! Command argument parsing with clap.
//!
//! Command triggers shell-split everything after the command word into the
//! event's `command_args`. [`parse_command`] runs those through a clap
//! parser, so handlers get typed arguments and users get clap's usage text.
//!
//! ```rust,ignore
//! #[derive(clap::Parser)]
//! struct Whitelist {
//!     #[command(subcommand)]
//!     action: Action,
//! }
//!
//! let handler = Handler::single_shot(|event: Arc<MessageEvent>| async move {
//!     match parse_command::<Whitelist>(&event) {
//!         Ok(cmd) => { /* ... */ }
//!         Err(e) => event.set_result(e.to_string()),
//!     }
//! });
//! ```

use clap::Parser;
use clap::error::ErrorKind;
use nova_core::MessageEvent;

use crate::error::CommandError;

/// Parses `args` as the arguments of command `name`.
pub fn parse_args<T: Parser>(name: &str, args: &[String]) -> Result<T, CommandError> {
    let argv = std::iter::once(name).chain(args.iter().map(String::as_str));
    T::try_parse_from(argv).map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            CommandError::Help(err.to_string())
        }
        _ => CommandError::Parse(err.to_string()),
    })
}

/// Parses the event's command arguments. The command word of the
/// wake-stripped text is used as the program name in usage output.
pub fn parse_command<T: Parser>(event: &MessageEvent) -> Result<T, CommandError> {
    let text = event.message_str();
    let name = text.split_whitespace().next().unwrap_or_default();
    parse_args(name, &event.command_args())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::private_event;
    use clap::Subcommand;

    #[derive(Parser, Debug, PartialEq)]
    struct Whitelist {
        #[command(subcommand)]
        action: Action,
    }

    #[derive(Subcommand, Debug, PartialEq)]
    enum Action {
        Add { user: String },
        Remove { user: String },
        List,
    }

    #[test]
    fn test_parse_command_from_event() {
        let event = private_event("spam_whitelist add 42");
        event.set_command_args(vec!["add".into(), "42".into()]);

        let parsed: Whitelist = parse_command(&event).unwrap();
        assert_eq!(parsed.action, Action::Add { user: "42".into() });
    }

    #[test]
    fn test_parse_error_carries_usage() {
        let err = parse_args::<Whitelist>("spam_whitelist", &["frobnicate".into()]).unwrap_err();
        let CommandError::Parse(message) = err else {
            panic!("expected a parse error");
        };
        assert!(message.contains("spam_whitelist"));
    }

    #[test]
    fn test_help_is_distinguished() {
        let err = parse_args::<Whitelist>("spam_whitelist", &["--help".into()]).unwrap_err();
        assert!(matches!(err, CommandError::Help(_)));
    }
}
