//! Ticker directives for the valuation table
//!
//! Free-text instructions such as "Replace SCHW with BLK and add HOOD" are
//! parsed into [`Directive`]s, which [`apply_directives`] folds over the
//! current symbol list. The first symbol is the memo's subject and survives
//! every directive.

use once_cell::sync::Lazy;
use regex::Regex;

static REPLACE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:REPLACE|SWAP)\s+([A-Z]{1,5})\s+(?:WITH|FOR)\s+([A-Z]{1,5})\b")
        .expect("valid regex")
});
static ADD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:ADD|INCLUDE)\s+([A-Z]{1,5})\b").expect("valid regex"));
static REMOVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:REMOVE|DROP|EXCLUDE)\s+([A-Z]{1,5})\b").expect("valid regex")
});

/// One change to the valuation symbol list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Replace { from: String, to: String },
    Add(String),
    Remove(String),
}

/// Directives found in an instruction
///
/// Matching is case-insensitive. The result lists every replace, then every
/// add, then every remove, each group in textual order.
pub fn parse_directives(instruction: &str) -> Vec<Directive> {
    let text = instruction.to_uppercase();

    let replaces = REPLACE_RE.captures_iter(&text).map(|c| Directive::Replace {
        from: c[1].to_string(),
        to: c[2].to_string(),
    });
    let adds = ADD_RE
        .captures_iter(&text)
        .map(|c| Directive::Add(c[1].to_string()));
    let removes = REMOVE_RE
        .captures_iter(&text)
        .map(|c| Directive::Remove(c[1].to_string()));

    replaces.chain(adds).chain(removes).collect()
}

/// Fold directives over a symbol list
///
/// The first symbol is never replaced or removed. Adding a present symbol
/// and removing an absent one are no-ops, and the result never lists a
/// symbol twice.
pub fn apply_directives(current: &[String], directives: &[Directive]) -> Vec<String> {
    let Some(target) = current.first().cloned() else {
        return current.to_vec();
    };

    directives
        .iter()
        .fold(current.to_vec(), |mut symbols, directive| {
            match directive {
                Directive::Replace { from, to } if *from != target && from != to => {
                    // Replacing with a listed symbol only drops the old one
                    if symbols.contains(to) {
                        symbols.retain(|s| s != from);
                    } else if let Some(slot) =
                        symbols.iter_mut().find(|s| s.as_str() == from.as_str())
                    {
                        *slot = to.clone();
                    }
                }
                Directive::Add(symbol) => {
                    if !symbols.contains(symbol) {
                        symbols.push(symbol.clone());
                    }
                }
                Directive::Remove(symbol) if *symbol != target => {
                    symbols.retain(|s| s != symbol);
                }
                _ => {}
            }
            symbols
        })
}
