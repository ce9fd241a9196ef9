//! Keyword tagging against a controlled vocabulary of fraud-method terms.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::Record;

/// Terms as published in simplified script.
const SIMPLIFIED_TERMS: &[&str] = &[
    "投资", "博彩", "赌博", "中奖", "退款", "退税", "刷单", "兼职", "网购", "网络购物",
    "交友", "贷款", "信用卡", "银行", "冒充", "公检法", "客服", "验证码", "短信", "链接",
    "点击", "下载", "注册", "登录", "密码", "社交媒体", "社交软件", "微信", "支付宝",
    "转账", "汇款", "红包", "个人资料", "身份证", "银行卡", "解冻", "冻结", "安全账户",
    "虚拟货币", "比特币",
];

/// The same terms as they appear on Taiwanese case pages.
const TRADITIONAL_TERMS: &[&str] = &[
    "投資", "賭博", "中獎", "退稅", "刷單", "網購", "網路購物", "貸款", "銀行", "假檢警",
    "驗證碼", "簡訊", "連結", "點擊", "下載", "註冊", "登入", "社群媒體", "社交軟體",
    "LINE", "轉帳", "匯款", "紅包", "個人資料", "身分證", "提款卡", "解除分期", "解凍",
    "凍結", "安全帳戶", "虛擬貨幣", "比特幣",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
}

fn default_vocabulary() -> Vec<String> {
    let mut seen = BTreeSet::new();
    SIMPLIFIED_TERMS
        .iter()
        .chain(TRADITIONAL_TERMS)
        .filter(|term| seen.insert(**term))
        .map(|term| term.to_string())
        .collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_vocabulary(),
        }
    }
}

/// Vocabulary terms occurring in `text`. Case-sensitive substring match.
pub fn tag<S: AsRef<str>>(text: &str, vocabulary: &[S]) -> BTreeSet<String> {
    vocabulary
        .iter()
        .map(|term| term.as_ref())
        .filter(|term| !term.is_empty() && text.contains(term))
        .map(str::to_string)
        .collect()
}

/// Adds matched terms to a record's `keywords`.
pub struct KeywordTagger {
    vocabulary: Vec<String>,
}

impl KeywordTagger {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            vocabulary: config.vocabulary.clone(),
        }
    }

    /// Tag the record's content. Only ever adds keywords.
    pub fn annotate(&self, record: &mut Record) {
        record.keywords.extend(tag(&record.content, &self.vocabulary));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_subset_and_only_present_terms() {
        let vocab = ["投資", "LINE", "比特幣", "貸款"];
        let text = "被害人透過LINE加入投資群組，購買比特幣";
        let tags = tag(text, &vocab);
        assert_eq!(
            tags,
            ["LINE", "投資", "比特幣"].iter().map(|s| s.to_string()).collect()
        );
        assert!(tags.iter().all(|t| vocab.contains(&t.as_str())));
        assert!(!tags.contains("貸款"));
    }

    #[test]
    fn test_tag_is_case_sensitive() {
        assert!(tag("contact via line", &["LINE"]).is_empty());
        assert!(tag("", &["投資"]).is_empty());
        assert!(tag("anything", &[""]).is_empty());
    }

    #[test]
    fn test_annotate_only_adds() {
        let tagger = KeywordTagger::new(&KeywordConfig::default());
        let mut record = Record::without_location("113-01-01", "假投資", "加入投資群組後轉帳");
        record.keywords.insert("existing".to_string());
        tagger.annotate(&mut record);
        assert!(record.keywords.contains("existing"));
        assert!(record.keywords.contains("投資"));
        assert!(record.keywords.contains("轉帳"));
    }

    #[test]
    fn test_default_vocabulary_has_no_duplicates() {
        let vocab = KeywordConfig::default().vocabulary;
        let unique: BTreeSet<_> = vocab.iter().collect();
        assert_eq!(unique.len(), vocab.len());
        assert!(vocab.contains(&"投资".to_string()));
        assert!(vocab.contains(&"投資".to_string()));
    }
}
