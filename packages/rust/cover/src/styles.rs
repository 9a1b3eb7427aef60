//! Style catalogue and keyword-based style auto-selection.

use linkpub_shared::{Category, CoverStyle};

/// Display name and trigger keywords for one style.
#[derive(Debug, Clone, Copy)]
pub struct StyleInfo {
    pub style: CoverStyle,
    pub display_name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Every style, in enumeration order.
pub const CATALOGUE: [StyleInfo; 12] = [
    StyleInfo {
        style: CoverStyle::Swiss,
        display_name: "瑞士国际",
        keywords: &["技术", "工具", "开发", "AI", "编程", "代码", "框架"],
    },
    StyleInfo {
        style: CoverStyle::Acid,
        display_name: "故障酸性",
        keywords: &["设计", "创意", "艺术", "潮流", "前卫"],
    },
    StyleInfo {
        style: CoverStyle::Pop,
        display_name: "波普撞色",
        keywords: &["新闻", "热点", "娱乐", "有趣", "趋势"],
    },
    StyleInfo {
        style: CoverStyle::Shock,
        display_name: "冲击波",
        keywords: &["警告", "重要", "必看", "紧急", "注意"],
    },
    StyleInfo {
        style: CoverStyle::Diffuse,
        display_name: "弥散光",
        keywords: &["生活", "健康", "情感", "故事", "清新"],
    },
    StyleInfo {
        style: CoverStyle::Sticker,
        display_name: "贴纸风",
        keywords: &["可爱", "轻松", "小技巧", "日常", "简单"],
    },
    StyleInfo {
        style: CoverStyle::Journal,
        display_name: "手账感",
        keywords: &["日记", "记录", "思考", "感悟", "文艺"],
    },
    StyleInfo {
        style: CoverStyle::Cinema,
        display_name: "电影感",
        keywords: &["深度", "电影", "故事", "专题", "叙事"],
    },
    StyleInfo {
        style: CoverStyle::Tech,
        display_name: "科技蓝",
        keywords: &["科技", "数据", "分析", "报告", "研究"],
    },
    StyleInfo {
        style: CoverStyle::Minimal,
        display_name: "极简白",
        keywords: &["极简", "设计", "美学", "纯粹"],
    },
    StyleInfo {
        style: CoverStyle::Memo,
        display_name: "备忘录",
        keywords: &["笔记", "清单", "总结", "备忘", "实用"],
    },
    StyleInfo {
        style: CoverStyle::Geek,
        display_name: "极客黑",
        keywords: &["黑客", "极客", "编程", "开发", "系统"],
    },
];

const TITLE_HIT: u32 = 3;
const CATEGORY_HIT: u32 = 2;

/// Title markers that call for an attention-grabbing cover.
const ALARM_MARKERS: &[&str] = &["!", "！", "必看", "警告", "注意"];

pub fn style_info(style: CoverStyle) -> &'static StyleInfo {
    CATALOGUE
        .iter()
        .find(|info| info.style == style)
        .unwrap_or(&CATALOGUE[0])
}

/// Pick a style by keyword score. Ties go to the earlier style.
pub fn auto_select_style(title: &str, categories: &[Category]) -> CoverStyle {
    let mut best: Option<(CoverStyle, u32)> = None;

    for info in &CATALOGUE {
        let score: u32 = info
            .keywords
            .iter()
            .map(|kw| {
                let in_title = if title.contains(kw) { TITLE_HIT } else { 0 };
                let in_categories = categories
                    .iter()
                    .filter(|c| c.label().contains(kw))
                    .count() as u32
                    * CATEGORY_HIT;
                in_title + in_categories
            })
            .sum();

        if score > best.map_or(0, |(_, s)| s) {
            best = Some((info.style, score));
        }
    }

    match best {
        Some((style, _)) => style,
        None if ALARM_MARKERS.iter().any(|m| title.contains(m)) => CoverStyle::Shock,
        None => CoverStyle::Swiss,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_covers_every_style_in_order() {
        let styles: Vec<_> = CATALOGUE.iter().map(|i| i.style).collect();
        assert_eq!(styles, CoverStyle::ALL.to_vec());
    }

    #[test]
    fn title_keywords_win() {
        assert_eq!(auto_select_style("年度科技数据报告", &[]), CoverStyle::Tech);
        assert_eq!(auto_select_style("我的读书笔记与清单", &[]), CoverStyle::Memo);
    }

    #[test]
    fn category_keywords_score() {
        // "设计" appears in both acid and minimal; acid comes first.
        assert_eq!(
            auto_select_style("Untitled", &[Category::ProductDesign]),
            CoverStyle::Acid
        );
    }

    #[test]
    fn title_outweighs_category() {
        assert_eq!(
            auto_select_style("极客的黑客系统", &[Category::ProductDesign]),
            CoverStyle::Geek
        );
    }

    #[test]
    fn fallbacks_without_keywords() {
        assert_eq!(auto_select_style("Hello world!", &[]), CoverStyle::Shock);
        assert_eq!(auto_select_style("Hello world", &[]), CoverStyle::Swiss);
    }
}
