use tokio::io::{AsyncBufReadExt, BufReader};

use crate::output::CliOutput;

/// What the user picked after pressing CTRL+C.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterruptAction {
    Exit,
    Continue,
    NextDirectory,
    SkipTarget,
}

pub fn menu(queue_pending: bool, multi_target: bool) -> String {
    let mut menu = String::from("[e]xit / [c]ontinue");
    if queue_pending {
        menu.push_str(" / [n]ext");
    }
    if multi_target {
        menu.push_str(" / [s]kip target");
    }
    menu
}

/// Maps one line of user input to an action. Options that are not on
/// offer read as `None`, and so does anything else.
pub fn parse_choice(input: &str, queue_pending: bool, multi_target: bool) -> Option<InterruptAction> {
    match input.trim().to_lowercase().as_str() {
        "e" => Some(InterruptAction::Exit),
        "c" => Some(InterruptAction::Continue),
        "n" if queue_pending => Some(InterruptAction::NextDirectory),
        "s" if multi_target => Some(InterruptAction::SkipTarget),
        _ => None,
    }
}

/// Prompts until the user gives a valid answer. A second CTRL+C, or stdin
/// closing, exits.
pub(crate) async fn ask(output: &CliOutput, queue_pending: bool, multi_target: bool) -> InterruptAction {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        output.prompt(&format!("{}: ", menu(queue_pending, multi_target)));
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => return InterruptAction::Exit,
        };
        match line {
            Ok(Some(line)) => {
                if let Some(action) = parse_choice(&line, queue_pending, multi_target) {
                    return action;
                }
            }
            Ok(None) | Err(_) => return InterruptAction::Exit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_lists_only_available_options() {
        assert_eq!(menu(false, false), "[e]xit / [c]ontinue");
        assert_eq!(menu(true, true), "[e]xit / [c]ontinue / [n]ext / [s]kip target");
    }

    #[test]
    fn choices_depend_on_context() {
        assert_eq!(parse_choice("E\n", false, false), Some(InterruptAction::Exit));
        assert_eq!(parse_choice(" c ", false, false), Some(InterruptAction::Continue));
        assert_eq!(parse_choice("n", false, true), None);
        assert_eq!(parse_choice("n", true, false), Some(InterruptAction::NextDirectory));
        assert_eq!(parse_choice("s", true, false), None);
        assert_eq!(parse_choice("s", false, true), Some(InterruptAction::SkipTarget));
        assert_eq!(parse_choice("x", true, true), None);
    }
}
