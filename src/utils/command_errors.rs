use crate::errors::OpsError;
use crate::utils::suggest::suggest;

pub fn unknown_command_error(command: &str, known_commands: &[&str]) -> OpsError {
    let suggestions = suggest(command, known_commands, 3);
    let mut err = OpsError::invalid_params(format!("Unknown command: /{}", command));
    if !suggestions.is_empty() {
        let shown: Vec<String> = suggestions.iter().map(|s| format!("/{}", s)).collect();
        err = err.with_hint(format!("Did you mean: {}?", shown.join(", ")));
    } else {
        err = err.with_hint("Send /start to see what the bot can do.");
    }
    err
}
