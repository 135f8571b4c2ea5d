/// 协调后端中的键布局
///
/// ```text
/// {prefix}:lock:{job_key}
/// {prefix}:leader:{leader_key}
/// {prefix}:instance:{instance_id}
/// {prefix}:instances
/// {prefix}:assignment:{job_key}
/// {prefix}:assigned:{instance_id}
/// {prefix}:completion:{job_key}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinationKeys {
    prefix: String,
}

impl CoordinationKeys {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn lock(&self, job_key: &str) -> String {
        format!("{}:lock:{}", self.prefix, job_key)
    }

    pub fn leader(&self, leader_key: &str) -> String {
        format!("{}:leader:{}", self.prefix, leader_key)
    }

    pub fn instance(&self, instance_id: &str) -> String {
        format!("{}:instance:{}", self.prefix, instance_id)
    }

    pub fn instances(&self) -> String {
        format!("{}:instances", self.prefix)
    }

    pub fn assignment(&self, job_key: &str) -> String {
        format!("{}:assignment:{}", self.prefix, job_key)
    }

    /// 分配给该实例、尚未报告完成的作业集合
    pub fn assigned(&self, instance_id: &str) -> String {
        format!("{}:assigned:{}", self.prefix, instance_id)
    }

    pub fn completion(&self, job_key: &str) -> String {
        format!("{}:completion:{}", self.prefix, job_key)
    }
}

impl Default for CoordinationKeys {
    fn default() -> Self {
        Self::new("dispatch")
    }
}
