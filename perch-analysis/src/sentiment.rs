//! Per-tweet sentiment in `[0, 1]`, 0.5 neutral.
use crate::month_key;
use crate::text::TextCleaner;
use chrono::{DateTime, Utc};
use perch_social::twitter::TweetRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

pub const NEUTRAL: f64 = 0.5;

/// Scores already-cleaned text.
pub trait SentimentScorer: Send + Sync {
    /// Return a score in `[0, 1]`; 0 negative, 1 positive.
    fn score(&self, text: &str) -> f64;
}

const ZH_POSITIVE: &[&str] = &[
    "好", "喜欢", "支持", "感谢", "谢谢", "成功", "希望", "开心", "高兴", "精彩", "优秀", "伟大",
    "胜利", "进步", "美好", "自由", "和平", "安全", "幸福", "赞", "棒", "祝贺", "恭喜", "繁荣",
    "强大", "信任", "正义", "光明",
];

const ZH_NEGATIVE: &[&str] = &[
    "坏", "讨厌", "反对", "失败", "失望", "痛苦", "悲伤", "愤怒", "可怕", "危险", "危机", "腐败",
    "谎言", "欺骗", "灾难", "战争", "死亡", "暴力", "威胁", "恐怖", "糟糕", "崩溃", "打压", "压迫",
    "罪", "邪恶", "无耻", "垃圾",
];

const EN_POSITIVE: &[&str] = &[
    "good", "great", "love", "like", "thanks", "thank", "happy", "win", "success", "best",
    "excellent", "amazing", "hope", "support", "proud", "free", "peace", "strong", "congrats",
];

const EN_NEGATIVE: &[&str] = &[
    "bad", "worst", "hate", "fail", "failure", "sad", "angry", "terrible", "awful", "crisis",
    "war", "death", "lie", "lies", "corrupt", "threat", "fear", "danger", "evil", "shame",
];

/// Compounds that contain a polar character but carry no polarity
/// themselves (好像 "seems", 只好 "had to").
const ZH_NEUTRAL: &[&str] = &["好像", "只好", "正好", "刚好", "好多", "好几", "爱好", "好奇"];

/// Checked against the text directly before a hit.
const ZH_NEGATORS: &[&str] = &[
    "不是", "没有", "不太", "并不", "从不", "无法", "不", "没", "别", "非", "无", "未",
];

const EN_NEGATORS: &[&str] = &[
    "not", "no", "never", "don't", "dont", "doesn't", "didn't", "isn't", "wasn't", "aren't",
    "can't", "won't", "nothing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Polarity {
    Positive,
    Negative,
    Neutral,
}

impl Polarity {
    fn flipped(self) -> Self {
        match self {
            Polarity::Positive => Polarity::Negative,
            Polarity::Negative => Polarity::Positive,
            Polarity::Neutral => Polarity::Neutral,
        }
    }
}

/// Polarity lexicon for Chinese and English.
///
/// Chinese text is scanned left to right taking the longest lexicon entry
/// at each position; English entries match whole lower-cased words. A hit
/// directly preceded by a negator (不, 没有, "not", ...) counts for the
/// opposite side. The score is `(pos + 1) / (pos + neg + 2)`, so text
/// without any hit lands exactly on neutral.
#[derive(Debug, Clone)]
pub struct LexiconScorer {
    /// Sorted longest first.
    zh_terms: Vec<(&'static str, Polarity)>,
    en_positive: HashSet<&'static str>,
    en_negative: HashSet<&'static str>,
    en_negators: HashSet<&'static str>,
}

impl Default for LexiconScorer {
    fn default() -> Self {
        let mut zh_terms: Vec<(&'static str, Polarity)> = ZH_POSITIVE
            .iter()
            .map(|w| (*w, Polarity::Positive))
            .chain(ZH_NEGATIVE.iter().map(|w| (*w, Polarity::Negative)))
            .chain(ZH_NEUTRAL.iter().map(|w| (*w, Polarity::Neutral)))
            .collect();
        zh_terms.sort_by_key(|(w, _)| std::cmp::Reverse(w.chars().count()));
        Self {
            zh_terms,
            en_positive: EN_POSITIVE.iter().copied().collect(),
            en_negative: EN_NEGATIVE.iter().copied().collect(),
            en_negators: EN_NEGATORS.iter().copied().collect(),
        }
    }
}

impl LexiconScorer {
    fn zh_term_at(&self, rest: &str) -> Option<(&'static str, Polarity)> {
        self.zh_terms
            .iter()
            .find(|(w, _)| rest.starts_with(*w))
            .copied()
    }

    fn hits(&self, text: &str) -> (usize, usize) {
        let mut pos = 0;
        let mut neg = 0;
        let mut tally = |polarity: Polarity| match polarity {
            Polarity::Positive => pos += 1,
            Polarity::Negative => neg += 1,
            Polarity::Neutral => {}
        };

        let mut i = 0;
        while let Some(c) = text[i..].chars().next() {
            match self.zh_term_at(&text[i..]) {
                Some((term, polarity)) => {
                    let before = &text[..i];
                    let negated = ZH_NEGATORS.iter().any(|n| before.ends_with(n));
                    tally(if negated { polarity.flipped() } else { polarity });
                    i += term.len();
                }
                None => i += c.len_utf8(),
            }
        }

        let lower = text.to_lowercase();
        let mut prev: Option<&str> = None;
        for word in lower
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
        {
            let polarity = if self.en_positive.contains(word) {
                Polarity::Positive
            } else if self.en_negative.contains(word) {
                Polarity::Negative
            } else {
                Polarity::Neutral
            };
            let negated = prev.is_some_and(|p| self.en_negators.contains(p));
            tally(if negated { polarity.flipped() } else { polarity });
            prev = Some(word);
        }
        (pos, neg)
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let (pos, neg) = self.hits(text);
        (pos as f64 + 1.0) / ((pos + neg) as f64 + 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ScoredTweet {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub sentiment: f64,
    pub view_count: u64,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    pub quote_count: u64,
    pub bookmark_count: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MonthSentiment {
    pub month: String,
    pub avg_sentiment: f64,
    pub tweets: usize,
}

/// Score every tweet after stripping links and mentions. Empty text is neutral.
pub fn score_tweets(
    records: &[TweetRecord],
    scorer: &dyn SentimentScorer,
    cleaner: &TextCleaner,
) -> Vec<ScoredTweet> {
    records
        .iter()
        .map(|r| {
            let cleaned = cleaner.strip_links(&r.text);
            let sentiment = if cleaned.is_empty() {
                NEUTRAL
            } else {
                scorer.score(&cleaned).clamp(0.0, 1.0)
            };
            ScoredTweet {
                id: r.id.clone(),
                created_at: r.created_at,
                text: r.text.clone(),
                sentiment,
                view_count: r.view_count,
                like_count: r.like_count,
                repost_count: r.repost_count,
                reply_count: r.reply_count,
                quote_count: r.quote_count,
                bookmark_count: r.bookmark_count,
            }
        })
        .collect()
}

pub fn sentiment_trend(scored: &[ScoredTweet]) -> Vec<MonthSentiment> {
    let mut months: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for s in scored {
        let entry = months.entry(month_key(s.created_at)).or_default();
        entry.0 += s.sentiment;
        entry.1 += 1;
    }
    months
        .into_iter()
        .map(|(month, (sum, tweets))| MonthSentiment {
            month,
            avg_sentiment: sum / tweets as f64,
            tweets,
        })
        .collect()
}

pub fn average(scored: &[ScoredTweet]) -> f64 {
    if scored.is_empty() {
        return NEUTRAL;
    }
    scored.iter().map(|s| s.sentiment).sum::<f64>() / scored.len() as f64
}
