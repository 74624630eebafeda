

use super::models::CategoryPhrases;
use super::terms::{TermSet, Terms};

/// Builds `(P: a OR b) AND (I: c) ...` in fixed category order.
///
/// Each clause holds the category's raw phrases followed by their aggregated
/// terms, deduplicated case-insensitively. Categories without terms are left
/// out, so the result never contains an empty clause. No clause at all yields
/// an empty string.
pub fn synthesize(phrases: &CategoryPhrases, term_set: &TermSet) -> String {
    phrases
        .iter()
        .filter_map(|(category, category_phrases)| {
            let mut clause = Terms::new();
            for phrase in category_phrases {
                clause.insert(phrase);
                if let Some(terms) = term_set.get(phrase) {
                    clause.extend(terms.iter());
                }
            }

            if clause.is_empty() {
                return None;
            }
            Some(format!(
                "({}: {})",
                category.tag(),
                clause.iter().map(quote_term).collect::<Vec<_>>().join(" OR ")
            ))
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

// Boolean operators and parentheses inside a term would change the query structure.
fn quote_term(term: &str) -> String {
    let needs_quotes = term.contains(['(', ')'])
        || term
            .split_whitespace()
            .any(|word| matches!(word, "AND" | "OR" | "NOT"));

    if needs_quotes {
        format!("\"{}\"", term.replace('"', ""))
    } else {
        term.to_string()
    }
}
