//! Evidence verification.
//!
//! Each action kind has a predicate over its evidence and the current
//! profile. A bare client-side claim is never enough: the surface must
//! supply whatever the predicate needs, and a failed predicate awards
//! nothing.

use crate::error::EngineError;
use crate::models::{ActionEvidence, UserProfile};

fn is_http_url(source: &str) -> bool {
    source
        .strip_prefix("https://")
        .or_else(|| source.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Check one action's evidence against the profile it would apply to.
pub fn verify(evidence: &ActionEvidence, profile: &UserProfile) -> Result<(), EngineError> {
    match evidence {
        ActionEvidence::WatchEpisode {
            streaming_sources, ..
        } => {
            if streaming_sources.is_empty() {
                return Err(EngineError::verification("no streaming sources provided"));
            }
            if let Some(bad) = streaming_sources.iter().find(|s| !is_http_url(s)) {
                return Err(EngineError::verification(format!(
                    "invalid streaming source URL: {bad}"
                )));
            }
        }
        ActionEvidence::ReadChapter { pages, .. } => {
            if *pages < 1 {
                return Err(EngineError::verification("page count must be at least 1"));
            }
        }
        ActionEvidence::QuoteClaim { quote_id, .. } => {
            if quote_id.is_empty() {
                return Err(EngineError::verification("missing quote id"));
            }
        }
        ActionEvidence::WatchPartyJoin { party_id } => {
            if party_id.is_empty() {
                return Err(EngineError::verification("missing party id"));
            }
        }
        ActionEvidence::WatchPartyHost {
            party_id,
            participant_count,
        } => {
            if party_id.is_empty() {
                return Err(EngineError::verification("missing party id"));
            }
            if *participant_count < 1 {
                return Err(EngineError::verification(
                    "a watch party needs at least one participant",
                ));
            }
        }
        ActionEvidence::AccountLink {
            discord_id,
            website_id,
        } => {
            if discord_id.is_empty() || website_id.is_empty() {
                return Err(EngineError::verification("missing linked identity"));
            }
            if profile.discord_id.is_some() && profile.website_id.is_some() {
                return Err(EngineError::verification("accounts already linked"));
            }
        }
        ActionEvidence::DailyLogin => {}
    }
    Ok(())
}
