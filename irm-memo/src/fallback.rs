//! Tiered fallback resolution
//!
//! Tries an ordered list of data sources until one yields a qualifying
//! result. Tiers run strictly in order, at most once each. A tier that
//! errors or comes back empty is logged and skipped; the first qualifying
//! result wins. An exhausted chain resolves to [`Resolution::Unavailable`],
//! never to an error.
//!
//! Acceptance rules (minimum length, required keywords) belong to each
//! tier: the resolver only sees presence or absence.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::tasks::LeafError;

/// Content produced by a successful tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierPayload {
    pub text: String,
    /// Empty when the source has no public URL
    pub source_url: String,
}

/// One data source in a fallback chain
///
/// `Ok(None)` means the source answered but nothing qualified.
#[async_trait]
pub trait TierAttempt<Q: ?Sized + Sync>: Send + Sync {
    /// Source label reported when this tier resolves
    fn label(&self) -> &str;

    async fn attempt(&self, query: &Q) -> Result<Option<TierPayload>, LeafError>;
}

/// Outcome of a fallback chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        payload: TierPayload,
        source_label: String,
        /// 1-based position of the resolving tier
        tier: u8,
    },
    Unavailable,
}

impl Resolution {
    /// Resolving tier, 0 when unavailable
    pub fn tier(&self) -> u8 {
        match self {
            Resolution::Resolved { tier, .. } => *tier,
            Resolution::Unavailable => 0,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved { .. })
    }
}

/// Runs fallback chains
pub struct FallbackResolver;

impl FallbackResolver {
    /// Try each tier in order until one qualifies
    pub async fn resolve<Q: ?Sized + Sync>(
        tiers: &[Box<dyn TierAttempt<Q>>],
        query: &Q,
    ) -> Resolution {
        for (index, tier) in tiers.iter().enumerate() {
            let position = (index + 1) as u8;
            info!(tier = position, source = tier.label(), "Trying fallback tier");

            match tier.attempt(query).await {
                Ok(Some(payload)) => {
                    info!(
                        tier = position,
                        source = tier.label(),
                        chars = payload.text.len(),
                        "Fallback tier resolved"
                    );
                    return Resolution::Resolved {
                        payload,
                        source_label: tier.label().to_string(),
                        tier: position,
                    };
                }
                Ok(None) => {
                    debug!(tier = position, source = tier.label(), "Fallback tier found nothing");
                }
                Err(e) => {
                    warn!(tier = position, source = tier.label(), "Fallback tier failed: {}", e);
                }
            }
        }

        warn!(tiers = tiers.len(), "Fallback chain exhausted");
        Resolution::Unavailable
    }
}
