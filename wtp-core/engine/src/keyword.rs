//! 关键词目录
//!
//! 支持的步骤关键词是一个封闭的枚举，显式映射到解释器的处理函数，
//! 未知标签以类型化错误拒绝，不做反射式查找。

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// 关键词定义 (供发现端点返回)
#[derive(Debug, Clone, Serialize)]
pub struct KeywordDefinition {
    pub keyword: &'static str,
    pub description: &'static str,
    pub params: &'static [&'static str],
}

/// 步骤关键词
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    /// 跳转到 URL
    Goto,
    /// 点击元素
    Click,
    /// 输入文本
    Fill,
    /// 按键
    Press,
    /// 选择下拉选项
    SelectOption,
    /// 等待元素出现
    WaitForSelector,
    /// 等待 URL 包含片段
    WaitForUrl,
    /// 验证元素文本
    ExpectText,
    /// 验证页面标题
    ExpectTitle,
    /// 截图
    Screenshot,
}

impl Keyword {
    pub const ALL: [Keyword; 10] = [
        Keyword::Goto,
        Keyword::Click,
        Keyword::Fill,
        Keyword::Press,
        Keyword::SelectOption,
        Keyword::WaitForSelector,
        Keyword::WaitForUrl,
        Keyword::ExpectText,
        Keyword::ExpectTitle,
        Keyword::Screenshot,
    ];

    /// 解析关键词标签，未知标签报 UnsupportedKeyword
    pub fn parse(tag: &str) -> Result<Keyword> {
        match tag {
            "goto" => Ok(Keyword::Goto),
            "click" => Ok(Keyword::Click),
            "fill" => Ok(Keyword::Fill),
            "press" => Ok(Keyword::Press),
            "select_option" => Ok(Keyword::SelectOption),
            "wait_for_selector" => Ok(Keyword::WaitForSelector),
            "wait_for_url" => Ok(Keyword::WaitForUrl),
            "expect_text" => Ok(Keyword::ExpectText),
            "expect_title" => Ok(Keyword::ExpectTitle),
            "screenshot" => Ok(Keyword::Screenshot),
            other => Err(EngineError::UnsupportedKeyword {
                keyword: other.to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Goto => "goto",
            Keyword::Click => "click",
            Keyword::Fill => "fill",
            Keyword::Press => "press",
            Keyword::SelectOption => "select_option",
            Keyword::WaitForSelector => "wait_for_selector",
            Keyword::WaitForUrl => "wait_for_url",
            Keyword::ExpectText => "expect_text",
            Keyword::ExpectTitle => "expect_title",
            Keyword::Screenshot => "screenshot",
        }
    }

    /// 关键词是否要求定位器
    pub fn requires_locator(&self) -> bool {
        matches!(
            self,
            Keyword::Click
                | Keyword::Fill
                | Keyword::Press
                | Keyword::SelectOption
                | Keyword::WaitForSelector
                | Keyword::ExpectText
        )
    }

    /// 关键词是否要求参数值
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            Keyword::Goto
                | Keyword::Fill
                | Keyword::Press
                | Keyword::SelectOption
                | Keyword::WaitForUrl
                | Keyword::ExpectText
                | Keyword::ExpectTitle
        )
    }

    /// 可用关键词目录，含中文解释和所需参数
    pub fn definitions() -> Vec<KeywordDefinition> {
        vec![
            KeywordDefinition {
                keyword: "goto",
                description: "跳转",
                params: &["value"],
            },
            KeywordDefinition {
                keyword: "click",
                description: "点击",
                params: &["locator"],
            },
            KeywordDefinition {
                keyword: "fill",
                description: "输入",
                params: &["locator", "value"],
            },
            KeywordDefinition {
                keyword: "press",
                description: "按键",
                params: &["locator", "value"],
            },
            KeywordDefinition {
                keyword: "select_option",
                description: "选择选项",
                params: &["locator", "value"],
            },
            KeywordDefinition {
                keyword: "wait_for_selector",
                description: "等待元素",
                params: &["locator"],
            },
            KeywordDefinition {
                keyword: "wait_for_url",
                description: "等待URL",
                params: &["value"],
            },
            KeywordDefinition {
                keyword: "expect_text",
                description: "验证文本",
                params: &["locator", "value"],
            },
            KeywordDefinition {
                keyword: "expect_title",
                description: "验证标题",
                params: &["value"],
            },
            KeywordDefinition {
                keyword: "screenshot",
                description: "截图",
                params: &["value"],
            },
        ]
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_keywords() {
        for keyword in Keyword::ALL {
            let parsed = Keyword::parse(keyword.as_str()).unwrap();
            assert_eq!(parsed, keyword);
        }
    }

    #[test]
    fn test_parse_unknown_keyword() {
        let err = Keyword::parse("hover").unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedKeyword { .. }));
        assert!(err.to_string().contains("hover"));
    }

    #[test]
    fn test_definitions_cover_all_keywords() {
        let definitions = Keyword::definitions();
        assert_eq!(definitions.len(), Keyword::ALL.len());

        for keyword in Keyword::ALL {
            let def = definitions
                .iter()
                .find(|d| d.keyword == keyword.as_str())
                .expect("每个关键词都应有目录定义");

            // 必需参数必须出现在目录里 (screenshot 的 value 是可选参数)
            if keyword.requires_locator() {
                assert!(def.params.contains(&"locator"));
            }
            if keyword.requires_value() {
                assert!(def.params.contains(&"value"));
            }
        }
    }
}
