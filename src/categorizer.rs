use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub pattern: String,
    pub category: String,
    #[serde(default = "default_match_type")]
    pub match_type: MatchType,
}

fn default_match_type() -> MatchType {
    MatchType::Contains
}

fn matches(description: &str, pattern: &str, match_type: MatchType) -> bool {
    let desc_upper = description.to_uppercase();
    let pat_upper = pattern.to_uppercase();
    match match_type {
        MatchType::Contains => desc_upper.contains(&pat_upper),
        MatchType::StartsWith => desc_upper.starts_with(&pat_upper),
        MatchType::Regex => Regex::new(&format!("(?i){pattern}"))
            .map(|re| re.is_match(description))
            .unwrap_or(false),
    }
}

// (pattern, category)
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("пятерочка", "Groceries"),
    ("перекресток", "Groceries"),
    ("magnit", "Groceries"),
    ("магнит", "Groceries"),
    ("supermarket", "Groceries"),
    ("grocery", "Groceries"),
    ("coffee", "Restaurants"),
    ("кафе", "Restaurants"),
    ("restaurant", "Restaurants"),
    ("ресторан", "Restaurants"),
    ("taxi", "Transport"),
    ("такси", "Transport"),
    ("uber", "Transport"),
    ("метро", "Transport"),
    ("аптека", "Health"),
    ("pharmacy", "Health"),
    ("зарплата", "Salary"),
    ("salary", "Salary"),
    ("payroll", "Salary"),
    ("перевод", "Transfers"),
    ("transfer", "Transfers"),
    ("мтс", "Communication"),
    ("билайн", "Communication"),
    ("netflix", "Subscriptions"),
    ("spotify", "Subscriptions"),
];

/// Assigns a category from the transaction title. First matching rule wins.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_RULES
                .iter()
                .map(|(pattern, category)| CategoryRule {
                    pattern: pattern.to_string(),
                    category: category.to_string(),
                    match_type: MatchType::Contains,
                })
                .collect(),
        )
    }
}

impl Categorizer {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        Self { rules }
    }

    pub fn detect(&self, title: &str, is_expense: bool) -> String {
        self.rules
            .iter()
            .find(|r| matches(title, &r.pattern, r.match_type))
            .map(|r| r.category.clone())
            .unwrap_or_else(|| fallback_category(is_expense).to_string())
    }
}

pub fn fallback_category(is_expense: bool) -> &'static str {
    if is_expense {
        "Other expense"
    } else {
        "Other income"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, category: &str, match_type: MatchType) -> CategoryRule {
        CategoryRule {
            pattern: pattern.into(),
            category: category.into(),
            match_type,
        }
    }

    #[test]
    fn test_contains_rule() {
        let c = Categorizer::new(vec![rule("adobe", "Software", MatchType::Contains)]);
        assert_eq!(c.detect("ADOBE CREATIVE CLOUD", true), "Software");
    }

    #[test]
    fn test_starts_with_rule() {
        let c = Categorizer::new(vec![rule("STRIPE", "Fees", MatchType::StartsWith)]);
        assert_eq!(c.detect("STRIPE PAYMENT", true), "Fees");
        assert_eq!(c.detect("PAY STRIPE FEE", true), "Other expense");
    }

    #[test]
    fn test_regex_rule() {
        let c = Categorizer::new(vec![rule(r"^AWS.*\d+$", "Hosting", MatchType::Regex)]);
        assert_eq!(c.detect("aws Services 12345", true), "Hosting");
    }

    #[test]
    fn test_first_rule_wins() {
        let c = Categorizer::new(vec![
            rule("PAYMENT", "Client Services", MatchType::Contains),
            rule("PAYMENT", "Fees", MatchType::Contains),
        ]);
        assert_eq!(c.detect("PAYMENT RECEIVED", false), "Client Services");
    }

    #[test]
    fn test_unmatched_falls_back_by_direction() {
        let c = Categorizer::default();
        assert_eq!(c.detect("RANDOM VENDOR XYZ", true), "Other expense");
        assert_eq!(c.detect("RANDOM VENDOR XYZ", false), "Other income");
    }

    #[test]
    fn test_default_rules_cover_cyrillic() {
        let c = Categorizer::default();
        assert_eq!(c.detect("Оплата в АПТЕКА 36.6", true), "Health");
        assert_eq!(c.detect("Coffee shop", true), "Restaurants");
    }
}
