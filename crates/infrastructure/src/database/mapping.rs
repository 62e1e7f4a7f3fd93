//! SQLite 行映射辅助函数
//!
//! 属性集合、统计汇总等复合字段以 JSON 文本存储。

use infocache_core::models::AttributeBag;
use infocache_core::{CacheError, CacheResult};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

pub struct MappingHelpers;

impl MappingHelpers {
    pub fn encode_attributes(attributes: &AttributeBag) -> CacheResult<String> {
        serde_json::to_string(attributes)
            .map_err(|e| CacheError::Serialization(format!("序列化属性集合失败: {e}")))
    }

    pub fn parse_attributes(row: &SqliteRow, field_name: &str) -> CacheResult<AttributeBag> {
        let json_str: Option<String> = row.try_get(field_name)?;
        match json_str {
            Some(json_str) if !json_str.is_empty() => serde_json::from_str(&json_str)
                .map_err(|e| CacheError::Serialization(format!("解析属性集合失败: {e}"))),
            _ => Ok(AttributeBag::new()),
        }
    }

    /// 端口以 INTEGER 存储
    pub fn parse_port(row: &SqliteRow, field_name: &str) -> CacheResult<u16> {
        let port: i64 = row.try_get(field_name)?;
        u16::try_from(port)
            .map_err(|_| CacheError::DatabaseOperation(format!("端口超出范围: {port}")))
    }

    /// 字符串列表编码为 `json_each` 可用的 JSON 数组
    pub fn encode_name_list(names: &[String]) -> CacheResult<String> {
        serde_json::to_string(names)
            .map_err(|e| CacheError::Serialization(format!("序列化名称列表失败: {e}")))
    }
}
