//! Tip extraction from post text.
//!
//! A tip is written as an amount followed by the token ticker, e.g.
//! `"sent you 12 $SPACE for the alpha"`. Matching is case-insensitive and the
//! first mention in a post wins. Fractional amounts are truncated.

use regex::Regex;

use crate::types::{allocation_date_of, Post, Tip};

/// Ticker used when none is configured.
pub const DEFAULT_TOKEN_SYMBOL: &str = "SPACE";

/// Why a post produced no tip candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The text has no `<amount> $<SYMBOL>` mention.
    NoMention,
    /// The mention rounds down to zero.
    ZeroAmount,
    /// The post is not a reply to a known author.
    NoRecipient,
}

/// Parses tip mentions for one token ticker.
#[derive(Debug, Clone)]
pub struct TipExtractor {
    symbol: String,
    pattern: Regex,
}

impl TipExtractor {
    /// Build an extractor for `symbol` (without the leading `$`).
    pub fn new(symbol: &str) -> Self {
        let pattern = Regex::new(&format!(
            r"(?i)\b(\d+(?:\.\d+)?)\s+\${}\b",
            regex::escape(symbol)
        ))
        .expect("escaped ticker always forms a valid pattern");
        Self {
            symbol: symbol.to_string(),
            pattern,
        }
    }

    /// The ticker this extractor matches, also used as the feed search query.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The whole-token amount of the first tip mention in `text`.
    pub fn amount(&self, text: &str) -> Result<u64, DropReason> {
        let caps = self.pattern.captures(text).ok_or(DropReason::NoMention)?;
        let whole = caps[1].split('.').next().unwrap_or_default();
        match whole.parse::<u64>() {
            Ok(0) => Err(DropReason::ZeroAmount),
            Ok(amount) => Ok(amount),
            // Wider than u64, not a plausible tip.
            Err(_) => Err(DropReason::NoMention),
        }
    }

    /// Build an unvalidated tip from `post`, recipient fields left empty.
    pub fn extract(&self, post: &Post) -> Result<Tip, DropReason> {
        let amount = self.amount(&post.text)?;
        let to_fid = post.parent_fid.ok_or(DropReason::NoRecipient)?;

        Ok(Tip {
            from_fid: post.author.fid,
            from_username: post.author.username.clone(),
            from_display_name: post.author.display_name.clone(),
            from_pfp_url: post.author.pfp_url.clone(),
            to_fid,
            to_username: None,
            to_display_name: None,
            to_pfp_url: None,
            amount,
            cast_hash: post.hash.clone(),
            cast_text: post.text.clone(),
            casted_at: post.timestamp,
            allocation_date: allocation_date_of(post.timestamp),
            is_valid: None,
        })
    }
}

impl Default for TipExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_SYMBOL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Profile;
    use chrono::{TimeZone, Utc};

    fn post(text: &str, parent: Option<u64>) -> Post {
        Post {
            hash: "0xabc".into(),
            text: text.into(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 9, 30, 0).unwrap(),
            author: Profile {
                fid: 42,
                username: Some("alice".into()),
                display_name: Some("Alice".into()),
                pfp_url: None,
            },
            parent_fid: parent,
        }
    }

    #[test]
    fn extracts_amount_and_parties() {
        let x = TipExtractor::default();
        let tip = x.extract(&post("sent you 12 $SPACE for the alpha", Some(7))).unwrap();
        assert_eq!(tip.amount, 12);
        assert_eq!(tip.from_fid, 42);
        assert_eq!(tip.from_username.as_deref(), Some("alice"));
        assert_eq!(tip.to_fid, 7);
        assert_eq!(tip.cast_hash, "0xabc");
        assert_eq!(tip.allocation_date.to_string(), "2024-07-01");
        assert!(tip.is_valid.is_none());
    }

    #[test]
    fn no_mention() {
        let x = TipExtractor::default();
        assert_eq!(x.extract(&post("no tip here", Some(7))), Err(DropReason::NoMention));
        assert_eq!(x.amount("12 SPACE"), Err(DropReason::NoMention));
        assert_eq!(x.amount("12 $SPACEX"), Err(DropReason::NoMention));
        assert_eq!(x.amount("$SPACE 12"), Err(DropReason::NoMention));
    }

    #[test]
    fn case_insensitive_single_digit_and_first_match() {
        let x = TipExtractor::default();
        assert_eq!(x.amount("5 $space"), Ok(5));
        assert_eq!(x.amount("here's 250 $Space and 10 $SPACE"), Ok(250));
    }

    #[test]
    fn fractional_amount_truncates() {
        let x = TipExtractor::default();
        assert_eq!(x.amount("1.75 $SPACE"), Ok(1));
        assert_eq!(x.amount("0.5 $SPACE"), Err(DropReason::ZeroAmount));
    }

    #[test]
    fn reply_target_required() {
        let x = TipExtractor::default();
        assert_eq!(x.extract(&post("10 $SPACE", None)), Err(DropReason::NoRecipient));
    }

    #[test]
    fn custom_symbol() {
        let x = TipExtractor::new("DEGEN");
        assert_eq!(x.symbol(), "DEGEN");
        assert_eq!(x.amount("100 $degen"), Ok(100));
        assert_eq!(x.amount("100 $SPACE"), Err(DropReason::NoMention));
    }
}
