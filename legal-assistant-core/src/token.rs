/// A running token budget for assembling search context
///
/// Tokens are approximated by whitespace-separated words, which is close
/// enough to keep a context blob inside the model's tool-output allowance.
///
/// # Examples
///
/// ```
/// use legal_assistant_core::TokenBudget;
///
/// let mut budget = TokenBudget::new(5);
/// assert!(budget.try_consume("statute of limitations"));
/// assert!(!budget.try_consume("breach of written contract"));
/// assert_eq!(budget.used(), 3);
/// ```
#[derive(Clone, Debug)]
pub struct TokenBudget {
    limit: usize,
    used: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit, used: 0 }
    }

    /// Counts the number of tokens in a string (naive implementation)
    pub fn count_tokens(text: &str) -> usize {
        text.split_whitespace().count()
    }

    /// Reserves room for `text` if it fits in what is left
    ///
    /// Returns `false` and leaves the budget untouched otherwise.
    pub fn try_consume(&mut self, text: &str) -> bool {
        let cost = Self::count_tokens(text);
        if self.used + cost > self.limit {
            return false;
        }
        self.used += cost;
        true
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_tokens() {
        assert_eq!(TokenBudget::count_tokens(""), 0);
        assert_eq!(TokenBudget::count_tokens("  Cal. Civ. Proc. Code § 337 "), 6);
    }

    #[test]
    fn test_rejected_text_does_not_consume() {
        let mut budget = TokenBudget::new(3);
        assert!(!budget.try_consume("one two three four"));
        assert_eq!(budget.remaining(), 3);
        assert!(budget.try_consume("one two three"));
        assert_eq!(budget.remaining(), 0);
    }
}
