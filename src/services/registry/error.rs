use thiserror::Error;

/// 注册表操作错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Group not found: {group}")]
    GroupNotFound { group: String },

    #[error("Instance not found: {group}/{id}")]
    InstanceNotFound { group: String, id: String },
}

impl RegistryError {
    pub(crate) fn instance_not_found(group: &str, id: &str) -> Self {
        Self::InstanceNotFound {
            group: group.to_string(),
            id: id.to_string(),
        }
    }
}
