use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// 目录查询返回的一条记录：DN + 多值属性，属性名不区分大小写（统一存储为小写）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryRecord {
    pub dn: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryRecord {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// 追加一个属性值
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// 设置多值属性
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 属性的第一个值
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// 属性名统一转为小写，用于外部加载的数据
    pub fn normalized(self) -> Self {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, values) in self.attributes {
            attributes
                .entry(name.to_ascii_lowercase())
                .or_default()
                .extend(values);
        }
        Self {
            dn: self.dn,
            attributes,
        }
    }

    /// 只保留请求的属性；空列表表示全部属性
    pub fn project(&self, attributes: &[String]) -> Self {
        if attributes.is_empty() {
            return self.clone();
        }
        let wanted: Vec<String> = attributes.iter().map(|a| a.to_ascii_lowercase()).collect();
        Self {
            dn: self.dn.clone(),
            attributes: self
                .attributes
                .iter()
                .filter(|(name, _)| wanted.contains(name))
                .map(|(name, values)| (name.clone(), values.clone()))
                .collect(),
        }
    }
}

/// 查询范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// 目录搜索过滤器，Display 输出 RFC 4515 文本形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchFilter {
    Present(String),
    /// 值中的 `*` 作为通配符
    Equals(String, String),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
    And(Vec<SearchFilter>),
    Or(Vec<SearchFilter>),
    Not(Box<SearchFilter>),
}

impl SearchFilter {
    pub fn present(attribute: &str) -> Self {
        SearchFilter::Present(attribute.to_string())
    }

    pub fn equals(attribute: &str, value: impl Into<String>) -> Self {
        SearchFilter::Equals(attribute.to_string(), value.into())
    }

    pub fn object_class(class: &str) -> Self {
        Self::equals("objectClass", class)
    }

    /// 在内存中对记录求值
    pub fn matches(&self, record: &DirectoryRecord) -> bool {
        match self {
            SearchFilter::Present(attr) => record.has_attribute(attr),
            SearchFilter::Equals(attr, value) => record
                .values(attr)
                .iter()
                .any(|candidate| wildcard_match(value, candidate)),
            SearchFilter::GreaterOrEqual(attr, value) => record
                .values(attr)
                .iter()
                .any(|candidate| compare_values(candidate, value) != Ordering::Less),
            SearchFilter::LessOrEqual(attr, value) => record
                .values(attr)
                .iter()
                .any(|candidate| compare_values(candidate, value) != Ordering::Greater),
            SearchFilter::And(filters) => filters.iter().all(|f| f.matches(record)),
            SearchFilter::Or(filters) => filters.iter().any(|f| f.matches(record)),
            SearchFilter::Not(filter) => !filter.matches(record),
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchFilter::Present(attr) => write!(f, "({attr}=*)"),
            SearchFilter::Equals(attr, value) => write!(f, "({attr}={})", escape_value(value)),
            SearchFilter::GreaterOrEqual(attr, value) => {
                write!(f, "({attr}>={})", escape_value(value))
            }
            SearchFilter::LessOrEqual(attr, value) => {
                write!(f, "({attr}<={})", escape_value(value))
            }
            SearchFilter::And(filters) => {
                write!(f, "(&")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                write!(f, ")")
            }
            SearchFilter::Or(filters) => {
                write!(f, "(|")?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                write!(f, ")")
            }
            SearchFilter::Not(filter) => write!(f, "(!{filter})"),
        }
    }
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn compare_values(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<i64>(), right.trim().parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(right),
    }
}

/// 不区分大小写的通配符匹配，只支持 `*`
fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let candidate = candidate.to_ascii_lowercase();

    if !pattern.contains('*') {
        return pattern == candidate;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut rest = candidate.as_str();

    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if index == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }

    true
}

/// DN 规范化：小写并去掉RDN之间的空白
pub fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| rdn.trim().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",")
}

/// 判断 `dn` 是否在 `base` 的查询范围内
pub fn dn_in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let dn = normalize_dn(dn);
    let base = normalize_dn(base);

    match scope {
        SearchScope::Base => dn == base,
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
        SearchScope::OneLevel => match dn.split_once(',') {
            Some((_, parent)) => parent == base,
            None => false,
        },
    }
}
