//! Synthetic comment rows.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use uuid::Builder;
use yci_core::{SentimentLabel, SyntheticRow};

pub const DEFAULT_MAX_BACKDATE_MINUTES: u32 = 180;

const MIN_WORDS: usize = 6;
const MAX_WORDS: usize = 18;

const WORDS: &[&str] = &[
    "about", "actually", "again", "album", "always", "amazing", "audio", "back", "beat", "best",
    "better", "camera", "channel", "clip", "could", "cover", "different", "edit", "editing",
    "ending", "episode", "every", "explain", "finally", "first", "found", "funny", "guitar",
    "honestly", "idea", "intro", "just", "keep", "last", "learned", "like", "listen", "live",
    "long", "love", "made", "minute", "more", "much", "music", "never", "next", "nice", "part",
    "people", "play", "please", "quality", "really", "remember", "review", "right", "said",
    "same", "second", "series", "should", "show", "song", "sound", "still", "stream", "style",
    "thanks", "thing", "think", "time", "today", "tutorial", "upload", "video", "voice", "watch",
    "way", "week", "when", "while", "work", "worth", "would", "year",
];

/// Produces rows backdated up to `max_backdate_minutes` before the batch start.
#[derive(Debug, Clone)]
pub struct RowGenerator<R> {
    rng: R,
    max_backdate_minutes: u32,
}

impl RowGenerator<StdRng> {
    pub fn from_entropy(max_backdate_minutes: u32) -> Self {
        Self::new(StdRng::from_os_rng(), max_backdate_minutes)
    }
}

impl<R: Rng> RowGenerator<R> {
    pub fn new(rng: R, max_backdate_minutes: u32) -> Self {
        Self {
            rng,
            max_backdate_minutes,
        }
    }

    pub fn batch(&mut self, count: u64, ingested_at: DateTime<Utc>) -> Vec<SyntheticRow> {
        (0..count).map(|_| self.row(ingested_at)).collect()
    }

    pub fn row(&mut self, ingested_at: DateTime<Utc>) -> SyntheticRow {
        let backdate = self.rng.random_range(0..=self.max_backdate_minutes);
        let label = SentimentLabel::ALL
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(SentimentLabel::Neutral);
        SyntheticRow {
            comment_id: Builder::from_random_bytes(self.rng.random()).into_uuid(),
            comment_text: self.sentence(),
            published_at: ingested_at - Duration::minutes(i64::from(backdate)),
            sentiment_label: label,
            ingested_at,
        }
    }

    fn sentence(&mut self) -> String {
        let len = self.rng.random_range(MIN_WORDS..=MAX_WORDS);
        let mut words = (0..len)
            .filter_map(|_| WORDS.choose(&mut self.rng).map(|w| w.to_string()))
            .collect::<Vec<_>>();
        if let Some(first) = words.first_mut() {
            let mut chars = first.chars();
            if let Some(c) = chars.next() {
                *first = c.to_uppercase().chain(chars).collect();
            }
        }
        format!("{}.", words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn generator(max_backdate_minutes: u32) -> RowGenerator<StdRng> {
        RowGenerator::new(StdRng::seed_from_u64(7), max_backdate_minutes)
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn published_at_never_follows_ingested_at() {
        let mut rows = generator(DEFAULT_MAX_BACKDATE_MINUTES);
        for row in rows.batch(2_000, start()) {
            assert!(row.published_at <= row.ingested_at);
            assert!(row.ingested_at - row.published_at <= Duration::minutes(180));
            assert_eq!(row.ingested_at, start());
        }
    }

    #[test]
    fn zero_window_stamps_published_at_with_batch_start() {
        let mut rows = generator(0);
        assert!(rows.batch(50, start()).iter().all(|r| r.published_at == r.ingested_at));
    }

    #[test]
    fn ids_are_fresh_v4_uuids() {
        let batch = generator(30).batch(500, start());
        let ids = batch.iter().map(|r| r.comment_id).collect::<HashSet<_>>();
        assert_eq!(ids.len(), 500);
        assert!(batch.iter().all(|r| r.comment_id.get_version_num() == 4));
    }

    #[test]
    fn labels_cover_all_three_buckets() {
        let labels = generator(30)
            .batch(300, start())
            .into_iter()
            .map(|r| r.sentiment_label)
            .collect::<HashSet<_>>();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn sentences_are_capitalized_with_bounded_word_count() {
        for row in generator(30).batch(200, start()) {
            let text = row.comment_text;
            assert!(text.ends_with('.'));
            assert!(text.chars().next().unwrap().is_uppercase());
            let words = text.split_whitespace().count();
            assert!((MIN_WORDS..=MAX_WORDS).contains(&words), "{words} words in {text:?}");
        }
    }

    #[test]
    fn words_and_labels_come_from_the_fixed_vocabulary() {
        for row in generator(30).batch(200, start()) {
            assert!(SentimentLabel::ALL.contains(&row.sentiment_label));
            for word in row.comment_text.trim_end_matches('.').split_whitespace() {
                let word = word.to_lowercase();
                assert!(WORDS.contains(&word.as_str()), "unexpected word {word:?}");
            }
        }
    }

    #[test]
    fn empty_batch_is_empty() {
        assert!(generator(30).batch(0, start()).is_empty());
    }
}
