use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{CacheError, CacheResult};

/// 目录服务的默认端口
pub const DEFAULT_DIRECTORY_PORT: u16 = 2135;

/// 端点标识，(host, port) 唯一确定一个端点
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId {
    pub host: String,
    pub port: u16,
}

impl EndpointId {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// 解析 `host[:port]` 形式的地址，主机名统一为小写
    pub fn parse(spec: &str, default_port: u16) -> CacheResult<Self> {
        let spec = spec.trim();
        let (host, port) = match spec.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    CacheError::Configuration(format!("无效的端口号: {spec}"))
                })?;
                (host, port)
            }
            None => (spec, default_port),
        };

        if host.is_empty() {
            return Err(CacheError::Configuration(format!("主机名不能为空: {spec}")));
        }

        Ok(Self::new(host.to_ascii_lowercase(), port))
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// 端点类型：注册中心或计算资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointKind {
    Registry,
    Resource,
}

/// 拓扑发现得到的端点，从不直接持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub kind: EndpointKind,
    /// 在该端点上查询时使用的base
    pub base: String,
    /// 报告该端点的上级注册中心
    pub parent: Option<EndpointId>,
}

impl Endpoint {
    pub fn registry(id: EndpointId, base: impl Into<String>, parent: Option<EndpointId>) -> Self {
        Self {
            id,
            kind: EndpointKind::Registry,
            base: base.into(),
            parent,
        }
    }

    pub fn resource(id: EndpointId, base: impl Into<String>, parent: Option<EndpointId>) -> Self {
        Self {
            id,
            kind: EndpointKind::Resource,
            base: base.into(),
            parent,
        }
    }

    pub fn host(&self) -> &str {
        &self.id.host
    }
}
