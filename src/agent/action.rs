//! The `Action: Tool[params]` / `Conclusion:` grammar of model output.

use once_cell::sync::Lazy;
use regex::Regex;

/// `Action: <name>[<params>]` on a line of its own. The name stops at the
/// first `[`; the parameters run to the last `]` on the line.
static ACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\n|^)Action: ([^\[\n]*)\[(.*)\](?:\n|$)").expect("valid regex")
});

static CONCLUSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\n|^)Conclusion:").expect("valid regex"));

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub tool: String,
    pub params: String,
}

impl Action {
    /// The first action in `text`, with name and parameters trimmed.
    pub fn find(text: &str) -> Option<Self> {
        let captures = ACTION.captures(text)?;
        Some(Self {
            tool: captures[1].trim().to_string(),
            params: captures[2].trim().to_string(),
        })
    }
}

pub fn has_conclusion(text: &str) -> bool {
    CONCLUSION.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(tool: &str, params: &str) -> Option<Action> {
        Some(Action {
            tool: tool.to_string(),
            params: params.to_string(),
        })
    }

    #[test]
    fn finds_action_on_its_own_line() {
        assert_eq!(
            Action::find("Thought: add\nAction: Calculate[2+2]\n"),
            action("Calculate", "2+2")
        );
        assert_eq!(Action::find("Action: Calculate[2+2]"), action("Calculate", "2+2"));
    }

    #[test]
    fn incomplete_action_is_not_matched() {
        assert_eq!(Action::find("Thought: add\nAction: Calculate[2+"), None);
        assert_eq!(Action::find("Thought: add\nAction: Calcul"), None);
    }

    #[test]
    fn action_must_start_a_line() {
        assert_eq!(Action::find("I might take Action: Calculate[1]"), None);
    }

    #[test]
    fn trailing_text_on_the_line_blocks_the_match() {
        assert_eq!(Action::find("Action: Calculate[2+2] and then"), None);
    }

    #[test]
    fn params_run_to_the_last_bracket() {
        assert_eq!(
            Action::find("Action: GoogleSearch[ \"list[0] in python\" ]\n"),
            action("GoogleSearch", "\"list[0] in python\"")
        );
    }

    #[test]
    fn only_the_first_action_is_returned() {
        assert_eq!(
            Action::find("Action: A[1]\nAction: B[2]\n"),
            action("A", "1")
        );
    }

    #[test]
    fn conclusion_must_start_a_line() {
        assert!(has_conclusion("Conclusion: 4"));
        assert!(has_conclusion("Thought: done\nConclusion: 4"));
        assert!(!has_conclusion("My Conclusion: 4"));
    }
}
