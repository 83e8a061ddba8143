//! TF-IDF Vectorizer
//!
//! 自由テキスト（メッセージ・生ログ・リクエスト行）の n-gram 袋モデル。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::OnceLock;

/// 英語ストップワード
const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "be", "became", "because", "become", "becomes", "been", "before",
    "beforehand", "behind", "being", "below", "beside", "besides", "between", "beyond", "both",
    "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "done", "down",
    "during", "each", "either", "else", "elsewhere", "enough", "etc", "even", "ever", "every",
    "everyone", "everything", "everywhere", "except", "few", "for", "former", "formerly",
    "from", "further", "had", "has", "have", "having", "he", "hence", "her", "here", "hereby",
    "herein", "hers", "herself", "him", "himself", "his", "how", "however", "i", "if", "in",
    "indeed", "into", "is", "it", "its", "itself", "just", "last", "latter", "least", "less",
    "many", "may", "me", "meanwhile", "might", "mine", "more", "moreover", "most", "mostly",
    "much", "must", "my", "myself", "namely", "neither", "never", "nevertheless", "next", "no",
    "nobody", "none", "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our", "ours",
    "ourselves", "out", "over", "own", "per", "perhaps", "please", "rather", "same", "seem",
    "seemed", "seeming", "seems", "several", "she", "should", "since", "so", "some",
    "somehow", "someone", "something", "sometime", "sometimes", "somewhere", "still", "such",
    "than", "that", "the", "their", "theirs", "them", "themselves", "then", "thence", "there",
    "thereafter", "thereby", "therefore", "therein", "these", "they", "this", "those",
    "though", "through", "throughout", "thru", "thus", "to", "together", "too", "toward",
    "towards", "under", "until", "up", "upon", "us", "very", "via", "was", "we", "well",
    "were", "what", "whatever", "when", "whence", "whenever", "where", "whereas", "whereby",
    "wherein", "whether", "which", "while", "who", "whoever", "whole", "whom", "whose", "why",
    "will", "with", "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b\w\w+\b").expect("static token pattern is valid"))
}

fn stop_words() -> &'static HashSet<&'static str> {
    static WORDS: OnceLock<HashSet<&'static str>> = OnceLock::new();
    WORDS.get_or_init(|| ENGLISH_STOP_WORDS.iter().copied().collect())
}

/// TF-IDF ベクトライザ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    max_features: usize,
    ngram_range: (usize, usize),
    /// 語 → 列番号（アルファベット順）
    vocabulary: BTreeMap<String, usize>,
    /// 列ごとの IDF
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(max_features: usize, ngram_range: (usize, usize)) -> Self {
        Self {
            max_features,
            ngram_range,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    /// 文書集合から語彙と IDF を学習
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) {
        let mut term_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();

        for document in documents {
            let terms = self.analyze(document.as_ref());
            let mut seen = BTreeSet::new();
            for term in terms {
                *term_counts.entry(term.clone()).or_insert(0) += 1;
                seen.insert(term);
            }
            for term in seen {
                *document_frequency.entry(term).or_insert(0) += 1;
            }
        }

        // コーパス頻度の降順、同率はアルファベット順
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.max_features);

        let kept: BTreeSet<String> = ranked.into_iter().map(|(term, _)| term).collect();
        let n_documents = documents.len() as f64;

        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(column, term)| (term.clone(), column))
            .collect();
        self.idf = kept
            .iter()
            .map(|term| {
                let df = document_frequency.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_documents) / (1.0 + df)).ln() + 1.0
            })
            .collect();
    }

    /// 1文書を L2 正規化済み TF-IDF ベクトルに変換
    pub fn transform(&self, document: &str) -> Vec<f64> {
        let mut row = vec![0.0; self.vocabulary.len()];
        for term in self.analyze(document) {
            if let Some(&column) = self.vocabulary.get(&term) {
                row[column] += 1.0;
            }
        }

        for (value, idf) in row.iter_mut().zip(&self.idf) {
            *value *= idf;
        }

        let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for value in row.iter_mut() {
                *value /= norm;
            }
        }
        row
    }

    pub fn len(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// 列順の語彙
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.vocabulary.keys().map(String::as_str)
    }

    /// 特徴量名 (`tfidf:<term>`)
    pub fn feature_names(&self) -> Vec<String> {
        self.terms().map(|term| format!("tfidf:{}", term)).collect()
    }

    fn analyze(&self, document: &str) -> Vec<String> {
        let lowered = document.to_lowercase();
        let tokens: Vec<&str> = token_pattern()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|token| !stop_words().contains(token))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n == 0 || n > tokens.len() {
                continue;
            }
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenization_drops_stop_words_and_short_tokens() {
        let vectorizer = TfidfVectorizer::new(100, (1, 1));
        let terms = vectorizer.analyze("The user a logged IN to the server");
        assert_eq!(terms, vec!["user", "logged", "server"]);
    }

    #[test]
    fn test_bigrams_follow_stop_word_removal() {
        let vectorizer = TfidfVectorizer::new(100, (1, 2));
        let terms = vectorizer.analyze("connection to database refused");
        assert!(terms.contains(&"connection database".to_string()));
        assert!(terms.contains(&"database refused".to_string()));
    }

    #[test]
    fn test_vocabulary_cap_keeps_most_frequent() {
        let mut vectorizer = TfidfVectorizer::new(2, (1, 1));
        vectorizer.fit(&["disk full", "disk error", "disk error", "network down"]);
        let terms: Vec<&str> = vectorizer.terms().collect();
        assert_eq!(terms, vec!["disk", "error"]);
        assert_eq!(vectorizer.feature_names(), vec!["tfidf:disk", "tfidf:error"]);
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 2));
        vectorizer.fit(&["login failed for user", "login ok", "disk error on node"]);

        let row = vectorizer.transform("login failed twice");
        let norm: f64 = row.iter().map(|v| v * v).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-9);

        let empty = vectorizer.transform("completely unseen words");
        assert!(empty.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_smooth_idf() {
        let mut vectorizer = TfidfVectorizer::new(100, (1, 1));
        vectorizer.fit(&["alpha beta", "alpha"]);
        let alpha = vectorizer.vocabulary["alpha"];
        let beta = vectorizer.vocabulary["beta"];
        assert!((vectorizer.idf[alpha] - 1.0).abs() < 1e-12);
        assert!((vectorizer.idf[beta] - ((3.0f64 / 2.0).ln() + 1.0)).abs() < 1e-12);
    }
}
