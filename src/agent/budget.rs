//! Fitting tool results into what is left of the context window.

/// The share of the free context a tool result may take, in tokens.
#[derive(Debug, Clone, Copy)]
pub struct TokenBudget {
    context_size: usize,
    fraction: f64,
}

impl TokenBudget {
    pub fn new(context_size: usize, fraction: f64) -> Self {
        Self {
            context_size,
            fraction,
        }
    }

    /// Tokens available for a result once `used` tokens (system message,
    /// history and prompt) are in the context. Negative when the context is
    /// already over budget.
    pub fn available(&self, used: usize) -> i64 {
        let free = self.context_size as f64 - used as f64;
        (self.fraction * free).floor() as i64
    }
}

/// A tool result cut down to the budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    pub text: String,
    /// Share of the result that was kept, when it had to be cut.
    pub percent_shown: Option<i64>,
}

/// Keep the leading share of `result` that fits in `available` tokens.
///
/// The share is `available / result_tokens`, applied to the character
/// count. A non-positive budget keeps nothing.
pub fn fit_result(result: &str, result_tokens: usize, available: i64) -> Truncation {
    if result_tokens == 0 || result_tokens as i64 <= available {
        return Truncation {
            text: result.to_string(),
            percent_shown: None,
        };
    }

    let kept_tokens = available.max(0) as u128;
    let chars = result.chars().count() as u128;
    let keep = (chars * kept_tokens / result_tokens as u128) as usize;

    Truncation {
        text: result.chars().take(keep).collect(),
        percent_shown: Some(percent_half_even(kept_tokens, result_tokens as u128)),
    }
}

/// `100 * part / whole` rounded to the nearest integer, ties to even.
fn percent_half_even(part: u128, whole: u128) -> i64 {
    let scaled = 100 * part;
    let quotient = scaled / whole;
    let twice_remainder = 2 * (scaled % whole);
    let rounded = if twice_remainder > whole || (twice_remainder == whole && quotient % 2 == 1) {
        quotient + 1
    } else {
        quotient
    };
    rounded as i64
}

/// Shown to the user when a result was cut.
pub fn truncation_note(percent_shown: i64) -> String {
    format!(
        "\n\n*Note:  Only {}% of the result was shown to the model due to context size limits.*",
        percent_shown
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_takes_a_fraction_of_the_free_context() {
        let budget = TokenBudget::new(1000, 0.8);
        assert_eq!(budget.available(0), 800);
        assert_eq!(budget.available(500), 400);
        assert_eq!(budget.available(999), 0);
        assert_eq!(budget.available(1100), -80);
    }

    #[test]
    fn fitting_result_is_untouched() {
        let fit = fit_result("short", 1, 10);
        assert_eq!(fit.text, "short");
        assert_eq!(fit.percent_shown, None);

        let exact = fit_result("abcd", 10, 10);
        assert_eq!(exact.percent_shown, None);
    }

    #[test]
    fn oversized_result_keeps_leading_share() {
        let result = "a".repeat(1000);
        let fit = fit_result(&result, 250, 100);
        assert_eq!(fit.text.len(), 400);
        assert_eq!(fit.percent_shown, Some(40));
        assert!(result.starts_with(&fit.text));
    }

    #[test]
    fn truncation_respects_character_boundaries() {
        let fit = fit_result("éééé", 4, 2);
        assert_eq!(fit.text, "éé");
        assert_eq!(fit.percent_shown, Some(50));
    }

    #[test]
    fn percentage_rounds_half_to_even() {
        assert_eq!(fit_result(&"x".repeat(800), 200, 85).percent_shown, Some(42));
        assert_eq!(fit_result(&"x".repeat(800), 200, 87).percent_shown, Some(44));
        assert_eq!(fit_result(&"x".repeat(12), 3, 1).percent_shown, Some(33));
        assert_eq!(fit_result(&"x".repeat(12), 3, 2).percent_shown, Some(67));
    }

    #[test]
    fn non_positive_budget_keeps_nothing() {
        for available in [0, -50] {
            let fit = fit_result("some text", 10, available);
            assert_eq!(fit.text, "");
            assert_eq!(fit.percent_shown, Some(0));
        }
    }

    #[test]
    fn empty_result_needs_no_budget() {
        let fit = fit_result("", 0, -10);
        assert_eq!(fit.text, "");
        assert_eq!(fit.percent_shown, None);
    }

    #[test]
    fn kept_share_never_exceeds_the_budget_ratio() {
        for tokens in 1..60usize {
            for available in -5..tokens as i64 {
                let result = "x".repeat(tokens * 4);
                let fit = fit_result(&result, tokens, available);
                let kept = fit.text.chars().count() as i64;
                assert!(kept * tokens as i64 <= available.max(0) * (tokens as i64 * 4));
                assert!(fit.percent_shown.is_some());
            }
        }
    }

    #[test]
    fn note_formats_percentage() {
        assert_eq!(
            truncation_note(40),
            "\n\n*Note:  Only 40% of the result was shown to the model due to context size limits.*"
        );
    }
}
