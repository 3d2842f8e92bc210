//! Chinese keyword frequency.
//!
//! Text is reduced to Han runs and segmented into words with jieba.
//! Single characters and common function words are dropped. The most
//! frequent words become the keyword set that individual tweets are
//! matched against.
use crate::text::TextCleaner;
use chrono::{DateTime, Utc};
use jieba_rs::Jieba;
use perch_social::twitter::TweetRecord;
use serde::Serialize;
use std::collections::HashMap;

pub const DEFAULT_TOP_KEYWORDS: usize = 30;

const STOPWORDS: &[&str] = &[
    "我们", "你们", "他们", "因为", "所以", "以及", "就是", "这个", "那个", "可以", "通过",
    "一个", "一些", "同时", "已经", "没有", "那么", "自己", "如果", "不过", "但是", "不是",
    "非常", "还有", "这些", "那些", "什么", "怎么", "为什么", "他的", "她的", "它的", "而且",
    "或者", "就像", "只是", "其实", "然后", "所有", "其他", "之后",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct KeywordTweetCount {
    pub keyword: String,
    pub tweet_count: usize,
}

/// A tweet and the top keywords its text contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetKeywords {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub text: String,
    pub matched: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordReport {
    pub top: Vec<KeywordCount>,
    pub tweets: Vec<TweetKeywords>,
    pub tweet_counts: Vec<KeywordTweetCount>,
}

/// Dictionary word segmentation over the bundled jieba dictionary.
pub struct Segmenter {
    jieba: Jieba,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Segmenter {
    pub fn new() -> Self {
        Self {
            jieba: Jieba::new(),
        }
    }

    /// Split cleaned text into words of two or more characters, stopwords
    /// removed.
    ///
    /// ```
    /// use perch_analysis::keywords::Segmenter;
    ///
    /// let seg = Segmenter::new();
    /// assert_eq!(seg.segment("中国经济 好"), vec!["中国", "经济"]);
    /// ```
    pub fn segment(&self, han_text: &str) -> Vec<String> {
        self.jieba
            .cut(han_text, true)
            .into_iter()
            .map(str::trim)
            .filter(|w| w.chars().count() >= 2 && !STOPWORDS.contains(w))
            .map(str::to_string)
            .collect()
    }
}

/// Most frequent words, ties broken lexicographically.
fn top_words(counts: HashMap<String, usize>, n: usize) -> Vec<KeywordCount> {
    let mut ranked: Vec<KeywordCount> = counts
        .into_iter()
        .map(|(keyword, count)| KeywordCount { keyword, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    ranked.truncate(n);
    ranked
}

pub fn analyze_keywords(
    records: &[TweetRecord],
    cleaner: &TextCleaner,
    segmenter: &Segmenter,
    top_n: usize,
) -> KeywordReport {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for record in records {
        for word in segmenter.segment(&cleaner.han_only(&record.text)) {
            *counts.entry(word).or_insert(0) += 1;
        }
    }
    let top = top_words(counts, top_n);

    let tweets: Vec<TweetKeywords> = records
        .iter()
        .map(|record| {
            let matched: Vec<String> = top
                .iter()
                .filter(|k| record.text.contains(k.keyword.as_str()))
                .map(|k| k.keyword.clone())
                .collect();
            TweetKeywords {
                id: record.id.clone(),
                created_at: record.created_at,
                text: record.text.clone(),
                matched,
            }
        })
        .collect();

    let mut per_keyword: HashMap<&str, usize> = HashMap::new();
    for keyword in tweets.iter().flat_map(|t| &t.matched) {
        *per_keyword.entry(keyword.as_str()).or_insert(0) += 1;
    }
    let mut tweet_counts: Vec<KeywordTweetCount> = per_keyword
        .into_iter()
        .map(|(keyword, tweet_count)| KeywordTweetCount {
            keyword: keyword.to_string(),
            tweet_count,
        })
        .collect();
    tweet_counts.sort_by(|a, b| {
        b.tweet_count
            .cmp(&a.tweet_count)
            .then_with(|| a.keyword.cmp(&b.keyword))
    });

    KeywordReport {
        top,
        tweets,
        tweet_counts,
    }
}
