//! 目录信息树的命名约定（NorduGrid 信息模型）

/// 资源端点上本地信息树的根
pub const LOCAL_BASE: &str = "Mds-Vo-name=local,o=grid";

pub const CLUSTER_OBJECT_CLASS: &str = "nordugrid-cluster";
pub const QUEUE_OBJECT_CLASS: &str = "nordugrid-queue";
pub const JOB_OBJECT_CLASS: &str = "nordugrid-job";
pub const AUTHUSER_OBJECT_CLASS: &str = "nordugrid-authuser";

pub const SERVICE_HOST_ATTR: &str = "Mds-Service-hn";
pub const SERVICE_PORT_ATTR: &str = "Mds-Service-port";
pub const SERVICE_SUFFIX_ATTR: &str = "Mds-Service-Ldap-suffix";
pub const AUTHUSER_SN_ATTR: &str = "nordugrid-authuser-sn";

/// 后缀中含有该标记的注册项是计算资源，否则是下级注册中心
pub const RESOURCE_SUFFIX_MARKER: &str = "nordugrid-cluster-name";

pub fn cluster_dn(hostname: &str) -> String {
    format!("nordugrid-cluster-name={hostname},{LOCAL_BASE}")
}

pub fn queue_dn(hostname: &str, queue: &str) -> String {
    format!("nordugrid-queue-name={queue},{}", cluster_dn(hostname))
}

pub fn jobs_base(hostname: &str, queue: &str) -> String {
    format!("nordugrid-info-group-name=jobs,{}", queue_dn(hostname, queue))
}

pub fn users_base(hostname: &str, queue: &str) -> String {
    format!("nordugrid-info-group-name=users,{}", queue_dn(hostname, queue))
}

pub fn job_dn(hostname: &str, queue: &str, global_id: &str) -> String {
    format!("nordugrid-job-globalid={global_id},{}", jobs_base(hostname, queue))
}

pub fn authuser_dn(hostname: &str, queue: &str, index: usize) -> String {
    format!("nordugrid-authuser-name={index},{}", users_base(hostname, queue))
}

/// 判断注册项的后缀是否指向计算资源
pub fn is_resource_suffix(suffix: &str) -> bool {
    suffix.to_ascii_lowercase().contains(RESOURCE_SUFFIX_MARKER)
}
