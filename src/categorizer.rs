use tracing::debug;

use crate::error::{FlowbookError, Result};
use crate::models::{Categorization, MatchMethod, Transaction};
use crate::patterns::{PatternTable, UNCATEGORIZED};

/// Upper bound on confidence from an approximate match, so a fuzzy hit never
/// ties an exact one.
pub const FUZZY_CONFIDENCE_CEILING: f64 = 0.9;

/// Scores how closely `text` resembles `candidate`, 0 (unrelated) to 100
/// (identical).
pub trait SimilarityScorer {
    fn score(&self, text: &str, candidate: &str) -> f64;
}

/// Normalized edit-distance ratio, taking the best of the whole cleaned text
/// and every run of text tokens as long as the candidate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenRatioScorer;

impl SimilarityScorer for TokenRatioScorer {
    fn score(&self, text: &str, candidate: &str) -> f64 {
        let text_tokens = tokens(text);
        let cand_tokens = tokens(candidate);
        if text_tokens.is_empty() || cand_tokens.is_empty() {
            return 0.0;
        }
        let cand = cand_tokens.join(" ");
        let mut best = ratio(&text_tokens.join(" "), &cand);
        if text_tokens.len() > cand_tokens.len() {
            for window in text_tokens.windows(cand_tokens.len()) {
                best = best.max(ratio(&window.join(" "), &cand));
            }
        }
        best
    }
}

// Store numbers and reference codes carry no merchant identity.
fn tokens(s: &str) -> Vec<String> {
    s.split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_uppercase)
                .collect::<String>()
        })
        .filter(|t| t.chars().any(char::is_alphabetic))
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 100.0;
    }
    let distance = levenshtein(a, b);
    (1.0 - distance as f64 / longest as f64) * 100.0
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub struct Categorizer<'a> {
    table: &'a PatternTable,
    scorer: Box<dyn SimilarityScorer + 'a>,
    fuzzy_threshold: f64,
}

impl<'a> Categorizer<'a> {
    pub fn new(table: &'a PatternTable, fuzzy_threshold: f64) -> Self {
        Self {
            table,
            scorer: Box::new(TokenRatioScorer),
            fuzzy_threshold,
        }
    }

    #[allow(dead_code)]
    pub fn with_scorer(mut self, scorer: impl SimilarityScorer + 'a) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Category and confidence for a classified transaction.
    pub fn categorize(&self, txn: &Transaction) -> Result<Categorization> {
        let flow = txn
            .flow_type
            .ok_or(FlowbookError::NotClassified(txn.source_row_id))?;
        let upper = txn.description.to_uppercase();

        for rule in self.table.custom_rules() {
            if rule.flow_type.is_some_and(|f| f != flow) || !rule.is_match(&upper) {
                continue;
            }
            if let Some(category) = &rule.category {
                return Ok(Categorization {
                    category: category.clone(),
                    confidence: rule.confidence,
                    method: MatchMethod::CustomRule,
                });
            }
        }

        let pattern_match = |text: &str| {
            self.table
                .category_rules(flow)
                .find(|r| r.is_match(text))
                .map(|r| (r.category.clone(), r.base_confidence))
        };

        if let Some((category, confidence)) = pattern_match(&upper) {
            return Ok(Categorization {
                category,
                confidence,
                method: MatchMethod::Pattern,
            });
        }

        let normalized = self.table.normalize(&upper);
        if let Some(text) = &normalized {
            if let Some((category, confidence)) = pattern_match(text) {
                return Ok(Categorization {
                    category,
                    confidence,
                    method: MatchMethod::Alias,
                });
            }
        }

        let text = normalized.as_deref().unwrap_or(&upper);
        let best = self
            .table
            .merchants(flow)
            .map(|m| (m, self.scorer.score(text, &m.name)))
            .fold(None, |best: Option<(_, f64)>, (m, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((m, score)),
            });
        if let Some((merchant, score)) = best {
            if score >= self.fuzzy_threshold {
                return Ok(Categorization {
                    category: merchant.category.clone(),
                    confidence: FUZZY_CONFIDENCE_CEILING * score / 100.0,
                    method: MatchMethod::Fuzzy { score },
                });
            }
        }

        Ok(Categorization {
            category: UNCATEGORIZED.to_string(),
            confidence: 0.0,
            method: MatchMethod::Uncategorized,
        })
    }

    /// Categorize every transaction that has no category yet.
    pub fn categorize_all(&self, txns: &mut [Transaction]) -> Result<()> {
        for txn in txns.iter_mut().filter(|t| t.category.is_none()) {
            let result = self.categorize(txn)?;
            debug!(
                row = txn.source_row_id,
                category = %result.category,
                confidence = result.confidence,
                method = %result.method,
                "categorized"
            );
            txn.assign_category(result);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::FlowClassifier;
    use crate::models::FlowType;
    use crate::settings::{CustomRule, Settings};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn classified(table: &PatternTable, desc: &str, amount: Decimal) -> Transaction {
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let mut t = Transaction::new(7, date, desc, amount, None);
        let (flow, basis) = FlowClassifier::new(table).classify(&t);
        t.assign_flow(flow, basis);
        t
    }

    fn categorize(desc: &str, amount: Decimal) -> Categorization {
        let table = PatternTable::builtin().unwrap();
        let t = classified(&table, desc, amount);
        let result = Categorizer::new(&table, 85.0).categorize(&t).unwrap();
        result
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("KITTEN", "SITTING"), 3);
        assert_eq!(levenshtein("", "ABC"), 3);
        assert_eq!(levenshtein("SAME", "SAME"), 0);
    }

    #[test]
    fn test_token_ratio_ignores_store_numbers() {
        let s = TokenRatioScorer;
        assert_eq!(s.score("STARBUCKS #4411 SEATTLE WA", "STARBUCKS"), 100.0);
        assert!(s.score("STARBCKS #123", "STARBUCKS") >= 85.0);
        assert!(s.score("SHELLYS BOUTIQUE", "SHELL") < 85.0);
        assert_eq!(s.score("1234 5678", "SHELL"), 0.0);
    }

    #[test]
    fn test_unclassified_transaction_is_rejected() {
        let table = PatternTable::builtin().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
        let t = Transaction::new(42, date, "SAFEWAY", dec!(-10), None);
        let err = Categorizer::new(&table, 85.0).categorize(&t).unwrap_err();
        assert!(matches!(err, FlowbookError::NotClassified(42)));
    }

    #[test]
    fn test_zelle_personal_transfer_category() {
        let c = categorize("ZELLE PAYMENT TO JOHN", dec!(-200.00));
        assert_eq!(c.category, "Personal Transfer");
        assert_eq!(c.method, MatchMethod::Pattern);
    }

    #[test]
    fn test_dividend_is_investment_income() {
        let c = categorize("DIVIDEND SCHWAB", dec!(150.00));
        assert_eq!(c.category, "Investment Income");
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn test_pattern_scope_follows_flow() {
        // A refund from a grocer is income, so grocery rules do not apply.
        let c = categorize("SAFEWAY REFUND", dec!(12.50));
        assert_eq!(c.category, "Reimbursement");
        let c = categorize("SAFEWAY #1234", dec!(-64.10));
        assert_eq!(c.category, "Groceries");
    }

    #[test]
    fn test_fuzzy_match_below_ceiling() {
        let c = categorize("STARBCKS #123", dec!(-5.75));
        assert_eq!(c.category, "Dining");
        assert!(matches!(c.method, MatchMethod::Fuzzy { .. }));
        assert!(c.confidence < FUZZY_CONFIDENCE_CEILING);
        assert!(c.confidence > 0.7);
    }

    #[test]
    fn test_unmatched_is_uncategorized_with_zero_confidence() {
        let c = categorize("QQQ ZXVY 0091", dec!(-18.00));
        assert_eq!(c.category, UNCATEGORIZED);
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.method, MatchMethod::Uncategorized);
    }

    #[test]
    fn test_alias_rewrite_then_pattern() {
        let mut settings = Settings::default();
        settings
            .merchant_aliases
            .insert("SBUX".to_string(), "STARBUCKS".to_string());
        let table = PatternTable::from_settings(&settings).unwrap();
        let t = classified(&table, "SBUX 0412 SEATTLE", dec!(-4.10));
        let c = Categorizer::new(&table, 85.0).categorize(&t).unwrap();
        assert_eq!(c.category, "Dining");
        assert_eq!(c.method, MatchMethod::Alias);
    }

    #[test]
    fn test_custom_rule_wins_with_full_confidence() {
        let mut settings = Settings::default();
        settings.custom_rules.push(CustomRule {
            description_contains: "whole foods".to_string(),
            category: Some("Office Snacks".to_string()),
            flow_type: None,
            confidence: None,
        });
        let table = PatternTable::from_settings(&settings).unwrap();
        let t = classified(&table, "WHOLE FOODS MKT 10233", dec!(-40));
        let c = Categorizer::new(&table, 85.0).categorize(&t).unwrap();
        assert_eq!(c.category, "Office Snacks");
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.method, MatchMethod::CustomRule);
    }

    #[test]
    fn test_custom_rule_scoped_to_its_flow_type() {
        let mut settings = Settings::default();
        settings.custom_rules.push(CustomRule {
            description_contains: "ACME".to_string(),
            category: Some("Consulting".to_string()),
            flow_type: Some(FlowType::Income),
            confidence: Some(0.6),
        });
        let table = PatternTable::from_settings(&settings).unwrap();
        let categorizer = Categorizer::new(&table, 85.0);

        let income = classified(&table, "ACME INVOICE 7", dec!(500));
        let c = categorizer.categorize(&income).unwrap();
        assert_eq!(c.category, "Consulting");
        assert_eq!(c.confidence, 0.6);

        // Classified as income by the custom rule, regardless of sign.
        let refund = classified(&table, "ACME CHARGEBACK", dec!(-20));
        assert_eq!(refund.flow_type, Some(FlowType::Income));
    }

    struct Never;
    impl SimilarityScorer for Never {
        fn score(&self, _: &str, _: &str) -> f64 {
            0.0
        }
    }

    #[test]
    fn test_scorer_is_pluggable() {
        let table = PatternTable::builtin().unwrap();
        let t = classified(&table, "STARBCKS #123", dec!(-5.75));
        let c = Categorizer::new(&table, 85.0)
            .with_scorer(Never)
            .categorize(&t)
            .unwrap();
        assert_eq!(c.category, UNCATEGORIZED);
    }

    #[test]
    fn test_categorize_all_skips_already_categorized() {
        let table = PatternTable::builtin().unwrap();
        let mut txns = vec![
            classified(&table, "NETFLIX.COM", dec!(-15.49)),
            classified(&table, "SAFEWAY", dec!(-30)),
        ];
        txns[1].assign_category(Categorization {
            category: "Preset".to_string(),
            confidence: 1.0,
            method: MatchMethod::MortgageSplit,
        });
        Categorizer::new(&table, 85.0).categorize_all(&mut txns).unwrap();
        assert_eq!(txns[0].category_name(), "Subscriptions");
        assert_eq!(txns[1].category_name(), "Preset");
    }
}
