//! Task-manager API: remote package creation and group completion.

use anyhow::{anyhow, Result};
use log::info;
use serde_json::{json, Value};

use crate::config::TaskInfo;
use crate::models::Package;
use crate::platform::{PlatformClient, PlatformUnreachable};

/// Remote coordinates the task manager assigns to a group.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteLocation {
    /// Platform-side job id every package in the group reports under.
    pub task_id: String,
    /// Object key root all package files upload below.
    pub key_root: String,
}

fn manager_url(info: &TaskInfo, suffix: &str) -> Result<String> {
    let base = info
        .tag("cs_task_manager_url")
        .ok_or_else(|| anyhow!("Missing cs_task_manager_url tag"))?;
    Ok(format!("{}/{}", base.trim_end_matches('/'), suffix))
}

/// Register the group's lead package with the platform and obtain its
/// remote location. Called once per group.
pub async fn create_package(
    client: &PlatformClient,
    info: &TaskInfo,
    package: &Package,
) -> Result<RemoteLocation> {
    let files: Vec<Value> = package
        .file_list
        .iter()
        .map(|entry| {
            json!({
                "fileName": entry.rel_path.to_string_lossy(),
                "fileSize": entry.size,
                "md5": "",
            })
        })
        .collect();

    let data_type = package
        .data_type
        .clone()
        .or_else(|| info.tag("data_type").map(str::to_string))
        .unwrap_or_default();
    let payload = json!({
        "tenantId": info.tag("tenant_id").unwrap_or_default(),
        "appId": info.tag("app_id").unwrap_or_default(),
        "mac": data_type,
        "files": files,
    });

    let url = manager_url(info, "package/create")?;
    let body = client
        .post_json(&url, &payload)
        .await
        .ok_or_else(|| {
            anyhow::Error::new(PlatformUnreachable(format!(
                "Create-package call failed for {}",
                package.key
            )))
        })?;

    parse_location(&body, &package.key)
}

/// Register a manifest clip by its lead bag and obtain the data id it
/// uploads under. The key root is preassigned locally for this flavor,
/// so only the id is read from the reply.
pub async fn register_clip(
    client: &PlatformClient,
    info: &TaskInfo,
    lead_bag: &str,
    bag_size: u64,
) -> Result<String> {
    let payload = json!({
        "tenantId": info.tag("tenant_id").unwrap_or_default(),
        "appId": info.tag("app_id").unwrap_or_default(),
        "mac": info.tag("data_type").unwrap_or_default(),
        "files": [{
            "fileName": lead_bag,
            "fileSize": bag_size,
            "md5": "",
        }],
    });

    let url = manager_url(info, "package/create")?;
    let body = client
        .post_json(&url, &payload)
        .await
        .ok_or_else(|| {
            anyhow::Error::new(PlatformUnreachable(format!(
                "Create-package call failed for clip {}",
                lead_bag
            )))
        })?;

    match body.get("data").and_then(|data| data.get("packageId")) {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(anyhow!(
            "Create-package response for clip {} has no packageId",
            lead_bag
        )),
    }
}

fn parse_location(body: &Value, package_key: &str) -> Result<RemoteLocation> {
    let data = body
        .get("data")
        .ok_or_else(|| anyhow!("Create-package response for {} has no data", package_key))?;

    let task_id = match data.get("packageId") {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => {
            return Err(anyhow!(
                "Create-package response for {} has no packageId",
                package_key
            ))
        }
    };

    let key_root = data
        .get("objectKeyRoot")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            anyhow!(
                "Create-package response for {} has no objectKeyRoot",
                package_key
            )
        })?
        .trim_end_matches('/')
        .to_string();

    Ok(RemoteLocation { task_id, key_root })
}

/// Tell the platform every package of the group landed.
pub async fn completion_callback(
    client: &PlatformClient,
    info: &TaskInfo,
    task_id: &str,
) -> Result<()> {
    let payload = json!({
        "tenantId": info.tag("tenant_id").unwrap_or_default(),
        "appId": info.tag("app_id").unwrap_or_default(),
        "id": task_id,
    });

    let url = manager_url(info, "package/complete")?;
    client
        .post_json(&url, &payload)
        .await
        .ok_or_else(|| {
            anyhow::Error::new(PlatformUnreachable(format!(
                "Completion callback failed for task {}",
                task_id
            )))
        })?;

    info!("Reported completion of task {}", task_id);
    Ok(())
}
