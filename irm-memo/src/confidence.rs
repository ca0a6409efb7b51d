//! Section confidence rules
//!
//! Confidence is derived from a per-section signal struct through an
//! ordered rule table; the first matching rule wins and every table ends
//! with a catch-all. Signal extraction from drafts lives here too so the
//! pipelines never re-query anything to rate a section.

use chrono::{Datelike, NaiveDate};
use irm_common::events::{Confidence, ConfidenceLevel};
use once_cell::sync::Lazy;
use regex::Regex;

/// One row of a rule table
pub struct Rule<S> {
    pub level: ConfidenceLevel,
    pub applies: fn(&S) -> bool,
    pub reason: fn(&S) -> String,
}

/// First matching rule wins
pub fn evaluate<S>(rules: &[Rule<S>], signals: &S) -> Confidence {
    rules
        .iter()
        .find(|rule| (rule.applies)(signals))
        .map(|rule| Confidence::new(rule.level, (rule.reason)(signals)))
        .unwrap_or_else(|| Confidence::low("No confidence rule matched"))
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

// ---- bio ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BioSignals {
    /// Distinct source domains attached to the section
    pub domains: usize,
    /// Prior employers listed on the draft's "Prior experience" line
    pub prior_firms: usize,
}

pub fn bio_rules() -> [Rule<BioSignals>; 4] {
    [
        Rule {
            level: ConfidenceLevel::High,
            applies: |s| s.domains >= 3 && s.prior_firms >= 3,
            reason: |s| format!("{} sources found", s.domains),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.domains >= 3,
            reason: |_| {
                "Career history may be incomplete (fewer than 3 prior firms identified)".to_string()
            },
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.domains >= 1,
            reason: |s| format!("Only {} source{} found", s.domains, plural(s.domains)),
        },
        Rule {
            level: ConfidenceLevel::Low,
            applies: |_| true,
            reason: |_| "No web sources found".to_string(),
        },
    ]
}

pub fn bio_confidence(signals: &BioSignals) -> Confidence {
    evaluate(&bio_rules(), signals)
}

static SEGMENT_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[;,]").expect("valid regex"));

/// Count of prior employers on the draft's "Prior experience" line
pub fn prior_firm_count(draft: &str) -> usize {
    let Some(line) = draft
        .lines()
        .find(|line| line.to_lowercase().contains("prior experience"))
    else {
        return 0;
    };
    let listed = match line.find(":**") {
        Some(pos) => line[pos + 3..].trim(),
        None => line,
    };
    SEGMENT_SPLIT_RE
        .split(listed)
        .filter(|segment| segment.trim().chars().count() > 2)
        .count()
}

// ---- forecast ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForecastSignals {
    pub stale: bool,
    /// Rows missing the analyst or consensus value
    pub missing: usize,
    pub date_updated: String,
}

pub fn forecast_rules() -> [Rule<ForecastSignals>; 4] {
    [
        Rule {
            level: ConfidenceLevel::Low,
            applies: |s| s.stale && s.missing > 0,
            reason: |s| format!("Data is stale and {} values missing", s.missing),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.stale,
            reason: |s| format!("Data is older than 30 days (updated {})", s.date_updated),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.missing > 2,
            reason: |s| format!("{} forecast values missing", s.missing),
        },
        Rule {
            level: ConfidenceLevel::High,
            applies: |_| true,
            reason: |s| format!("Data current, {} missing values", s.missing),
        },
    ]
}

pub fn forecast_confidence(signals: &ForecastSignals) -> Confidence {
    evaluate(&forecast_rules(), signals)
}

// ---- earnings ----

/// Resolving tier of the bundled transcript file
pub const BUNDLED_TRANSCRIPT_TIER: u8 = 5;

/// Marker in transcripts assembled from search snippets
pub const PARTIAL_TRANSCRIPT_MARKER: &str = "[Partial transcript";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EarningsSignals {
    pub has_transcript: bool,
    pub tier: u8,
    /// Analyst questions quoted in the draft
    pub questions: usize,
    pub snippets_only: bool,
    pub source: String,
}

pub fn earnings_rules() -> [Rule<EarningsSignals>; 5] {
    [
        Rule {
            level: ConfidenceLevel::Low,
            applies: |s| !s.has_transcript,
            reason: |_| "Transcript not available".to_string(),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.questions < 2,
            reason: |_| "Limited analyst participation found in transcript".to_string(),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.tier == BUNDLED_TRANSCRIPT_TIER,
            reason: |_| "Using bundled demo transcript (live sources unavailable)".to_string(),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.snippets_only,
            reason: |_| "Only web search snippets available".to_string(),
        },
        Rule {
            level: ConfidenceLevel::High,
            applies: |_| true,
            reason: |s| format!("Full transcript retrieved from {}", s.source),
        },
    ]
}

pub fn earnings_confidence(signals: &EarningsSignals) -> Confidence {
    evaluate(&earnings_rules(), signals)
}

static QUESTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^>\s*["\u{201c}]"#).expect("valid regex"));

/// Quoted analyst questions (blockquote lines opening with a quote mark)
pub fn question_count(draft: &str) -> usize {
    QUESTION_RE.find_iter(draft).count()
}

// ---- peer ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSignals {
    /// Set when commentary is old or its date unverifiable
    pub stale_note: Option<String>,
    pub peers_with_results: usize,
    pub domains: usize,
}

pub fn peer_rules() -> [Rule<PeerSignals>; 4] {
    [
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.stale_note.is_some(),
            reason: |s| s.stale_note.clone().unwrap_or_default(),
        },
        Rule {
            level: ConfidenceLevel::High,
            applies: |s| s.peers_with_results >= 3 && s.domains >= 2,
            reason: |s| format!("Recent commentary found from {} peers", s.peers_with_results),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.peers_with_results >= 1,
            reason: |s| {
                format!(
                    "Limited results, {} peer{} with data",
                    s.peers_with_results,
                    plural(s.peers_with_results)
                )
            },
        },
        Rule {
            level: ConfidenceLevel::Low,
            applies: |_| true,
            reason: |_| "No peer commentary found".to_string(),
        },
    ]
}

pub fn peer_confidence(signals: &PeerSignals) -> Confidence {
    evaluate(&peer_rules(), signals)
}

static DATE_ROW_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\|\s*\*?\*?Date\*?\*?\s*\|\s*(.+?)\s*\|").expect("valid regex")
});
static DATE_BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*?\*?Date:?\*?\*?\s*(.+)").expect("valid regex"));

/// Publication date text from a `Date` table row or bullet
pub fn publication_date_text(draft: &str) -> Option<String> {
    DATE_ROW_RE
        .captures(draft)
        .or_else(|| DATE_BULLET_RE.captures(draft))
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim()
                .trim_end_matches(['*', '|'])
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
}

/// Parse a publication date in the formats drafts use
///
/// Month-only dates resolve to the first of the month.
pub fn parse_publication_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    ["%B %d, %Y", "%b %d, %Y", "%m/%d/%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            let with_day = format!("1 {}", text);
            ["%d %B %Y", "%d %b %Y"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(&with_day, fmt).ok())
        })
}

/// Calendar months between `date` and `today`
pub fn months_between(date: NaiveDate, today: NaiveDate) -> i32 {
    (today.year() - date.year()) * 12 + (today.month() as i32 - date.month() as i32)
}

/// Staleness note for a peer draft as of `today`
pub fn peer_stale_note(draft: &str, peers_with_results: usize, today: NaiveDate) -> Option<String> {
    let date_text = publication_date_text(draft);
    match date_text
        .as_deref()
        .and_then(parse_publication_date)
        .zip(date_text.as_deref())
    {
        Some((date, text)) => {
            let months = months_between(date, today);
            if months > 6 {
                Some(format!(
                    "Most recent commentary found is from {} and may not reflect current views",
                    text
                ))
            } else if months >= 3 {
                Some(format!("Commentary is {} months old", months))
            } else {
                None
            }
        }
        None if !draft.trim().is_empty() && peers_with_results >= 1 => {
            Some("Publication date could not be verified".to_string())
        }
        None => None,
    }
}

// ---- valuation ----

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuationSignals {
    pub symbols: usize,
    /// Symbols with no price
    pub failed: usize,
}

pub fn valuation_rules() -> [Rule<ValuationSignals>; 3] {
    [
        Rule {
            level: ConfidenceLevel::High,
            applies: |s| s.failed == 0,
            reason: |s| format!("All {} tickers retrieved", s.symbols),
        },
        Rule {
            level: ConfidenceLevel::Medium,
            applies: |s| s.failed <= 2,
            reason: |s| format!("{} of {} tickers failed", s.failed, s.symbols),
        },
        Rule {
            level: ConfidenceLevel::Low,
            applies: |_| true,
            reason: |s| format!("Major data gaps: {} tickers failed", s.failed),
        },
    ]
}

pub fn valuation_confidence(signals: &ValuationSignals) -> Confidence {
    evaluate(&valuation_rules(), signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_bio_rules() {
        let high = bio_confidence(&BioSignals {
            domains: 4,
            prior_firms: 3,
        });
        assert_eq!(high.level, ConfidenceLevel::High);
        assert_eq!(high.reason, "4 sources found");

        let incomplete = bio_confidence(&BioSignals {
            domains: 3,
            prior_firms: 1,
        });
        assert_eq!(incomplete.level, ConfidenceLevel::Medium);
        assert!(incomplete.reason.starts_with("Career history may be incomplete"));

        let one = bio_confidence(&BioSignals {
            domains: 1,
            prior_firms: 5,
        });
        assert_eq!(one.reason, "Only 1 source found");

        let none = bio_confidence(&BioSignals::default());
        assert_eq!(none.level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_prior_firm_count() {
        let draft = "**Current role:** Analyst\n**Prior experience:** Goldman Sachs, UBS; Citi, JP";
        assert_eq!(prior_firm_count(draft), 3);
        assert_eq!(prior_firm_count("no such line"), 0);
        assert_eq!(prior_firm_count("Prior experience - Acme, Beta Corp"), 2);
    }

    #[test]
    fn test_forecast_rules_in_order() {
        let s = |stale, missing| ForecastSignals {
            stale,
            missing,
            date_updated: "January 02, 2025".into(),
        };
        assert_eq!(forecast_confidence(&s(true, 1)).level, ConfidenceLevel::Low);
        assert_eq!(
            forecast_confidence(&s(true, 0)).reason,
            "Data is older than 30 days (updated January 02, 2025)"
        );
        assert_eq!(forecast_confidence(&s(false, 3)).level, ConfidenceLevel::Medium);
        let high = forecast_confidence(&s(false, 2));
        assert_eq!(high.level, ConfidenceLevel::High);
        assert_eq!(high.reason, "Data current, 2 missing values");
    }

    #[test]
    fn test_earnings_rules_priority() {
        let base = EarningsSignals {
            has_transcript: true,
            tier: 1,
            questions: 3,
            snippets_only: false,
            source: "SEC EDGAR (EFTS)".into(),
        };
        assert_eq!(earnings_confidence(&base).level, ConfidenceLevel::High);

        let bundled = EarningsSignals { tier: 5, ..base.clone() };
        assert!(earnings_confidence(&bundled).reason.starts_with("Using bundled"));

        let quiet = EarningsSignals {
            tier: 5,
            questions: 1,
            ..base.clone()
        };
        assert!(earnings_confidence(&quiet).reason.starts_with("Limited analyst"));

        let missing = EarningsSignals {
            has_transcript: false,
            ..base
        };
        assert_eq!(earnings_confidence(&missing).level, ConfidenceLevel::Low);
    }

    #[test]
    fn test_question_count() {
        let draft = "> \"First question?\"\nAnswer.\n>\u{201c}Second?\u{201d}\n> not a quote";
        assert_eq!(question_count(draft), 2);
    }

    #[test]
    fn test_publication_date_text() {
        assert_eq!(
            publication_date_text("| Field | Value |\n|---|---|\n| **Date** | October 2024 |").as_deref(),
            Some("October 2024")
        );
        assert_eq!(
            publication_date_text("- **Date:** March 5, 2025**").as_deref(),
            Some("March 5, 2025")
        );
        assert_eq!(publication_date_text("nothing here"), None);
    }

    #[test]
    fn test_parse_publication_date() {
        assert_eq!(parse_publication_date("October 2024"), Some(date(2024, 10, 1)));
        assert_eq!(parse_publication_date("Oct 2024"), Some(date(2024, 10, 1)));
        assert_eq!(parse_publication_date("March 5, 2025"), Some(date(2025, 3, 5)));
        assert_eq!(parse_publication_date("2025-03-05"), Some(date(2025, 3, 5)));
        assert_eq!(parse_publication_date("recently"), None);
    }

    #[test]
    fn test_peer_stale_note() {
        let today = date(2025, 6, 15);
        let old = peer_stale_note("| **Date** | October 2024 |", 3, today).unwrap();
        assert!(old.starts_with("Most recent commentary found is from October 2024"));
        assert_eq!(
            peer_stale_note("| **Date** | March 2025 |", 3, today).as_deref(),
            Some("Commentary is 3 months old")
        );
        assert_eq!(peer_stale_note("| **Date** | May 2025 |", 3, today), None);
        assert_eq!(
            peer_stale_note("Some text", 1, today).as_deref(),
            Some("Publication date could not be verified")
        );
        assert_eq!(peer_stale_note("Some text", 0, today), None);
    }

    #[test]
    fn test_peer_rules() {
        let stale = peer_confidence(&PeerSignals {
            stale_note: Some("Commentary is 4 months old".into()),
            peers_with_results: 6,
            domains: 5,
        });
        assert_eq!(stale.level, ConfidenceLevel::Medium);
        assert_eq!(stale.reason, "Commentary is 4 months old");

        let high = peer_confidence(&PeerSignals {
            stale_note: None,
            peers_with_results: 3,
            domains: 2,
        });
        assert_eq!(high.level, ConfidenceLevel::High);

        let limited = peer_confidence(&PeerSignals {
            stale_note: None,
            peers_with_results: 1,
            domains: 5,
        });
        assert_eq!(limited.reason, "Limited results, 1 peer with data");

        assert_eq!(
            peer_confidence(&PeerSignals::default()).level,
            ConfidenceLevel::Low
        );
    }

    #[test]
    fn test_valuation_rules() {
        let s = |failed| ValuationSignals { symbols: 7, failed };
        assert_eq!(valuation_confidence(&s(0)).reason, "All 7 tickers retrieved");
        assert_eq!(valuation_confidence(&s(2)).level, ConfidenceLevel::Medium);
        assert_eq!(valuation_confidence(&s(3)).level, ConfidenceLevel::Low);
    }
}
