//! 关键词目录命令

use colored::Colorize;
use wtp_engine::Keyword;

/// 打印支持的关键词目录
pub fn list() {
    println!(
        "{:<20}  {:<12}  {}",
        "关键词".bold(),
        "说明".bold(),
        "参数".bold()
    );
    for def in Keyword::definitions() {
        println!(
            "{:<20}  {:<12}  {}",
            def.keyword,
            def.description,
            def.params.join(", ")
        );
    }
}
