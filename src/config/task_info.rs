use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde_json::Value;

/// Per-run task description handed over by the dispatching side.
///
/// The file is a flat JSON object. Four keys are structural; every
/// other key rides along in `tags` as a string and is interpreted by
/// whichever component knows it (`cloud_type`, `bucket_name`,
/// platform URLs and so on).
#[derive(Debug, Clone, Default)]
pub struct TaskInfo {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub cpu_nums: Option<usize>,
    pub task_id: Option<i64>,
    pub tags: HashMap<String, String>,
}

impl TaskInfo {
    /// Load task info from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read task info file: {}", path.display()))?;

        let value: Value =
            serde_json::from_str(&content).context("Failed to parse task info JSON")?;

        let info = Self::from_value(value)?;
        debug!(
            "Loaded task info from {} ({} tags)",
            path.display(),
            info.tags.len()
        );
        Ok(info)
    }

    fn from_value(value: Value) -> Result<Self> {
        let object = match value {
            Value::Object(map) => map,
            _ => return Err(anyhow!("Task info must be a JSON object")),
        };

        let mut info = TaskInfo::default();

        for (key, value) in object {
            match key.as_str() {
                "input_root" => {
                    info.input_root = PathBuf::from(
                        value
                            .as_str()
                            .ok_or_else(|| anyhow!("input_root must be a string"))?,
                    );
                }
                "output_root" => {
                    info.output_root = PathBuf::from(
                        value
                            .as_str()
                            .ok_or_else(|| anyhow!("output_root must be a string"))?,
                    );
                }
                "cpu_nums" => {
                    info.cpu_nums = number_field(&value);
                }
                "taskId" => {
                    info.task_id = value
                        .as_i64()
                        .or_else(|| value.as_str().and_then(|s| s.parse().ok()));
                }
                _ => {
                    info.tags.insert(key, stringify(&value));
                }
            }
        }

        if info.input_root.as_os_str().is_empty() {
            return Err(anyhow!("Task info is missing input_root"));
        }
        if info.output_root.as_os_str().is_empty() {
            return Err(anyhow!("Task info is missing output_root"));
        }

        Ok(info)
    }

    /// Look up a tag by exact key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(|v| v.as_str())
    }

    /// A tag is truthy only when it spells `true` (any case).
    pub fn bool_tag(&self, key: &str) -> bool {
        self.tags
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Worker pool size: the `cpuNums` tag wins over the structural
    /// `cpu_nums` field, and the machine's logical CPU count is the
    /// last resort.
    pub fn worker_count(&self) -> usize {
        self.tag("cpuNums")
            .and_then(|v| v.parse().ok())
            .or(self.cpu_nums)
            .unwrap_or_else(num_cpus::get)
            .max(1)
    }

    /// Merge overlay values into the tags, overlay winning on conflict.
    pub fn apply_overlay(&mut self, overlay: HashMap<String, String>) {
        self.tags.extend(overlay);
    }
}

fn number_field(value: &Value) -> Option<usize> {
    value
        .as_u64()
        .map(|n| n as usize)
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
