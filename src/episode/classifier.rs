use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Category assigned when no keyword of any category matches.
pub const UNCATEGORIZED: &str = "uncategorized";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesetError {
    #[error("Category name must not be empty")]
    EmptyCategoryName,

    #[error("Duplicate category: {0}")]
    DuplicateCategory(String),

    #[error("Category {0} contains an empty keyword")]
    EmptyKeyword(String),

    #[error("Fallback category name must not be empty")]
    EmptyFallback,
}

#[derive(Debug, Clone)]
struct Keyword {
    /// Lowercased form used for matching
    needle: String,
    /// Weight per hit: char length of the keyword as configured
    weight: usize,
}

impl Keyword {
    fn new(keyword: &str) -> Self {
        Self {
            needle: keyword.to_lowercase(),
            weight: keyword.chars().count(),
        }
    }
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    keywords: Vec<Keyword>,
}

/// Ordered mapping of category name to keywords, plus a fallback name.
///
/// Immutable once built. Declaration order matters: it decides ties.
#[derive(Debug, Clone)]
pub struct CategoryRuleset {
    categories: Vec<Category>,
    fallback: String,
}

impl CategoryRuleset {
    /// Builds and validates a ruleset.
    ///
    /// # Errors
    ///
    /// Rejects empty or duplicate category names, empty keywords (they would
    /// match everywhere), and an empty fallback.
    pub fn new<N, K>(
        categories: impl IntoIterator<Item = (N, Vec<K>)>,
        fallback: impl Into<String>,
    ) -> Result<Self, RulesetError>
    where
        N: Into<String>,
        K: AsRef<str>,
    {
        let fallback = fallback.into();
        if fallback.trim().is_empty() {
            return Err(RulesetError::EmptyFallback);
        }

        let mut seen = HashSet::new();
        let mut built = Vec::new();

        for (name, keywords) in categories {
            let name: String = name.into();
            if name.trim().is_empty() {
                return Err(RulesetError::EmptyCategoryName);
            }
            if !seen.insert(name.clone()) {
                return Err(RulesetError::DuplicateCategory(name));
            }
            if keywords.iter().any(|k| k.as_ref().is_empty()) {
                return Err(RulesetError::EmptyKeyword(name));
            }
            built.push(Category {
                keywords: keywords.iter().map(|k| Keyword::new(k.as_ref())).collect(),
                name,
            });
        }

        Ok(Self {
            categories: built,
            fallback,
        })
    }

    /// The default table for a sheep-farming podcast: five categories, with
    /// practical shepherd work declared last.
    pub fn builtin() -> Self {
        let table: [(&str, &[&str]); 5] = [
            (
                "技術・AI",
                &[
                    "AI", "ai", "Bot", "ボット", "システム", "技術", "プログラム", "アプリ",
                    "デジタル", "IT", "クローン", "まとめサイト", "自動", "データ",
                    "アルゴリズム", "ツール", "ソフト",
                ],
            ),
            (
                "個人的考察",
                &[
                    "思い", "考え", "感想", "個人的", "私の", "気持ち", "心境", "体験", "経験",
                    "振り返り", "反省", "学び", "だらだら", "ぐだぐだ", "疲れた",
                    "気になっちゃう", "続ける", "試行錯誤",
                ],
            ),
            (
                "ビジネス・販売",
                &[
                    "販売", "経営", "ビジネス", "売上", "収益", "価格", "値段", "商売",
                    "マーケティング", "顧客", "お客", "コンクール", "結果", "経営術",
                    "値を付ける", "アイデア",
                ],
            ),
            (
                "羊への愛情",
                &[
                    "可愛い", "かわいい", "愛", "好き", "癒し", "絆", "繋がり", "人と羊", "景色",
                    "気持ち", "愛情", "夢が叶った", "応援",
                ],
            ),
            (
                "羊飼い実務",
                &[
                    "羊", "ひつじ", "ヒツジ", "毛刈り", "飼育", "牧場", "放牧", "羊毛",
                    "フリース", "原毛", "餌", "えさ", "飼育員", "動物取扱業", "羊飼い", "牧羊",
                    "畜産", "牧草", "柵", "羊舎", "カバー", "汚れる", "飼育ができない",
                    "向いてる人", "幼少期", "地域に根付く", "ハッシュタグ", "毛刈りが嫌い",
                    "イベント", "マルチタスク",
                ],
            ),
        ];

        Self {
            categories: table
                .iter()
                .map(|(name, keywords)| Category {
                    name: (*name).to_string(),
                    keywords: keywords.iter().map(|k| Keyword::new(k)).collect(),
                })
                .collect(),
            fallback: UNCATEGORIZED.to_string(),
        }
    }

    /// Category names in declaration order.
    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Same categories, different fallback name.
    pub fn with_fallback(self, fallback: impl Into<String>) -> Result<Self, RulesetError> {
        let fallback = fallback.into();
        if fallback.trim().is_empty() {
            return Err(RulesetError::EmptyFallback);
        }
        Ok(Self { fallback, ..self })
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl Default for CategoryRuleset {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Keyword-weighted category scoring over a shared, immutable ruleset.
///
/// Cloning is cheap (`Arc`), and the classifier is safe to share across
/// tasks since it never mutates.
#[derive(Debug, Clone)]
pub struct Classifier {
    ruleset: Arc<CategoryRuleset>,
}

impl Classifier {
    pub fn new(ruleset: Arc<CategoryRuleset>) -> Self {
        Self { ruleset }
    }

    pub fn ruleset(&self) -> &CategoryRuleset {
        &self.ruleset
    }

    /// Score of every category for `text`, in declaration order.
    ///
    /// A keyword contributes `occurrences × char length`; occurrences are
    /// counted case-insensitively and without overlap.
    pub fn scores(&self, text: &str) -> Vec<(&str, usize)> {
        let haystack = text.to_lowercase();
        self.ruleset
            .categories
            .iter()
            .map(|category| {
                let score = category
                    .keywords
                    .iter()
                    .map(|k| haystack.matches(k.needle.as_str()).count() * k.weight)
                    .sum();
                (category.name.as_str(), score)
            })
            .collect()
    }

    /// Picks the category with the strictly highest score.
    ///
    /// Ties keep the category declared first; an all-zero result yields the
    /// ruleset's fallback.
    pub fn classify(&self, text: &str) -> &str {
        let mut best = self.ruleset.fallback.as_str();
        let mut best_score = 0;

        for (name, score) in self.scores(text) {
            if score > best_score {
                best_score = score;
                best = name;
            }
        }

        best
    }
}
